//! Prompt assembly from retrieved context and a question.

use crate::document::SearchResult;
use crate::error::{RagError, Result};

const CONTEXT_PLACEHOLDER: &str = "{context}";
const QUESTION_PLACEHOLDER: &str = "{question}";

/// Substituted for `{context}` when retrieval returned nothing.
pub const EMPTY_CONTEXT_MARKER: &str = "(no relevant context found)";

/// The default grounded-answer instruction.
pub const DEFAULT_TEMPLATE: &str = "\
Use the following pieces of information to answer the user's question.
If you don't know the answer, just say that you don't know, don't try to make up an answer.

Context: {context}
Question: {question}

Only return the helpful answer below and nothing else.
Helpful answer:
";

/// A prompt template with `{context}` and `{question}` placeholders.
///
/// Any other braces in the template are copied through literally.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PromptTemplate {
    template: String,
}

impl Default for PromptTemplate {
    fn default() -> Self {
        Self { template: DEFAULT_TEMPLATE.to_string() }
    }
}

impl PromptTemplate {
    /// Create a template, checking that both placeholders are present.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::ConfigError`] if `{context}` or `{question}` is missing.
    pub fn new(template: impl Into<String>) -> Result<Self> {
        let template = template.into();
        for placeholder in [CONTEXT_PLACEHOLDER, QUESTION_PLACEHOLDER] {
            if !template.contains(placeholder) {
                return Err(RagError::ConfigError(format!(
                    "prompt template is missing the {placeholder} placeholder"
                )));
            }
        }
        Ok(Self { template })
    }

    /// The raw template text.
    pub fn as_str(&self) -> &str {
        &self.template
    }

    /// Fill the template with the retrieved chunks and the question.
    ///
    /// Chunk texts are joined with a blank line in retrieval order. Placeholders
    /// are replaced in a single left-to-right pass, so placeholder text that
    /// appears inside the question or the context is left as-is.
    pub fn assemble(&self, retrieved: &[SearchResult], question: &str) -> String {
        let context = if retrieved.is_empty() {
            EMPTY_CONTEXT_MARKER.to_string()
        } else {
            retrieved.iter().map(|r| r.chunk.text.as_str()).collect::<Vec<_>>().join("\n\n")
        };

        let mut prompt =
            String::with_capacity(self.template.len() + context.len() + question.len());
        let mut rest = self.template.as_str();
        while let Some(pos) = rest.find('{') {
            prompt.push_str(&rest[..pos]);
            let tail = &rest[pos..];
            if let Some(after) = tail.strip_prefix(CONTEXT_PLACEHOLDER) {
                prompt.push_str(&context);
                rest = after;
            } else if let Some(after) = tail.strip_prefix(QUESTION_PLACEHOLDER) {
                prompt.push_str(question);
                rest = after;
            } else {
                prompt.push('{');
                rest = &tail[1..];
            }
        }
        prompt.push_str(rest);
        prompt
    }
}
