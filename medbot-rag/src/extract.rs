//! Incremental extraction of the final answer from a generated token stream.
//!
//! Models are often instructed to emit scaffolding (reasoning, labels) before
//! a sentinel such as `FINAL ANSWER`, followed by the answer body. The
//! [`AnswerExtractor`] holds tokens back until the sentinel token sequence has
//! been seen, then passes every later token straight through so callers can
//! stream the answer as it is produced.

use std::mem;

use crate::config::AnswerConfig;

/// Where the extractor is in the token stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExtractionState {
    /// Buffering tokens until the prefix sequence is matched.
    AwaitingPrefix,
    /// Emitting each token as part of the answer.
    StreamingAnswer,
    /// The token stream has ended.
    Done,
}

/// Finite-state machine that strips a sentinel prefix from a token stream.
///
/// Feed tokens with [`push`](Self::push) and call [`finish`](Self::finish) once
/// the stream is exhausted. If the prefix never appears, `finish` releases the
/// whole buffered stream as the answer.
///
/// # Example
///
/// ```rust
/// use medbot_rag::{AnswerConfig, AnswerExtractor};
///
/// let mut extractor = AnswerExtractor::new(&AnswerConfig::default());
/// let mut streamed = String::new();
/// for token in ["FINAL", "ANSWER", "The", " answer", " is", " 42", "."] {
///     if let Some(delta) = extractor.push(token) {
///         streamed.push_str(&delta);
///     }
/// }
/// assert!(extractor.finish().is_none());
/// assert_eq!(streamed, "The answer is 42.");
/// assert_eq!(extractor.answer(), "The answer is 42.");
/// ```
#[derive(Debug, Clone)]
pub struct AnswerExtractor {
    prefix: Vec<String>,
    strip_tokens: bool,
    state: ExtractionState,
    buffer: Vec<String>,
    answer: String,
}

impl AnswerExtractor {
    /// Create an extractor for the given configuration.
    ///
    /// An empty prefix or `stream_from_start` starts directly in
    /// [`ExtractionState::StreamingAnswer`].
    pub fn new(config: &AnswerConfig) -> Self {
        let state = if config.stream_from_start || config.prefix_tokens.is_empty() {
            ExtractionState::StreamingAnswer
        } else {
            ExtractionState::AwaitingPrefix
        };
        let prefix = config
            .prefix_tokens
            .iter()
            .map(|t| if config.strip_tokens { t.trim().to_string() } else { t.clone() })
            .collect();
        Self {
            prefix,
            strip_tokens: config.strip_tokens,
            state,
            buffer: Vec::new(),
            answer: String::new(),
        }
    }

    /// Current state.
    pub fn state(&self) -> ExtractionState {
        self.state
    }

    /// Answer text emitted so far.
    pub fn answer(&self) -> &str {
        &self.answer
    }

    /// Consume the extractor, returning the accumulated answer.
    pub fn into_answer(self) -> String {
        self.answer
    }

    /// Feed one token; returns the text to emit now, if any.
    pub fn push(&mut self, token: &str) -> Option<String> {
        match self.state {
            ExtractionState::AwaitingPrefix => {
                self.buffer.push(token.to_string());
                if self.prefix_matched() {
                    self.buffer.clear();
                    self.state = ExtractionState::StreamingAnswer;
                }
                None
            }
            ExtractionState::StreamingAnswer => {
                if token.is_empty() {
                    return None;
                }
                self.answer.push_str(token);
                Some(token.to_string())
            }
            ExtractionState::Done => None,
        }
    }

    /// Mark the stream as exhausted.
    ///
    /// Returns the buffered text if the prefix was never matched, which then
    /// becomes the whole answer.
    pub fn finish(&mut self) -> Option<String> {
        let previous = mem::replace(&mut self.state, ExtractionState::Done);
        if previous != ExtractionState::AwaitingPrefix {
            return None;
        }
        let flushed = mem::take(&mut self.buffer).concat();
        if flushed.is_empty() {
            return None;
        }
        self.answer.push_str(&flushed);
        Some(flushed)
    }

    fn prefix_matched(&self) -> bool {
        let n = self.prefix.len();
        if self.buffer.len() < n {
            return false;
        }
        self.buffer[self.buffer.len() - n..].iter().zip(&self.prefix).all(|(token, expected)| {
            if self.strip_tokens { token.trim() == expected } else { token == expected }
        })
    }
}
