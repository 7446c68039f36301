//! Per-conversation sessions with single-flight answering.
//!
//! A [`Session`] wraps a shared [`AnswerEngine`] and guarantees at most one
//! in-flight answer: asking a new question cancels the previous one, and
//! closing the session cancels whatever is still running.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{Mutex, RwLock};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};
use uuid::Uuid;

use crate::document::Answer;
use crate::engine::{AnswerEngine, AnswerStream, collect_answer};
use crate::error::{RagError, Result};

/// Identifier of a [`Session`].
pub type SessionId = String;

/// One conversation's handle on an [`AnswerEngine`].
pub struct Session {
    id: SessionId,
    engine: Arc<AnswerEngine>,
    closed: CancellationToken,
    in_flight: Mutex<Option<CancellationToken>>,
}

impl Session {
    /// Start a session over `engine`.
    pub fn new(engine: Arc<AnswerEngine>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            engine,
            closed: CancellationToken::new(),
            in_flight: Mutex::new(None),
        }
    }

    /// This session's identifier.
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Whether [`close`](Self::close) has been called.
    pub fn is_closed(&self) -> bool {
        self.closed.is_cancelled()
    }

    /// Ask a question, superseding any answer still in flight.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::Cancelled`] if the session is closed or this call is
    /// itself superseded before generation starts, plus anything
    /// [`AnswerEngine::stream_answer`] returns.
    pub async fn ask(&self, question: &str) -> Result<AnswerStream> {
        if self.is_closed() {
            return Err(RagError::Cancelled);
        }
        let token = {
            let mut in_flight = self.in_flight.lock().await;
            if let Some(previous) = in_flight.take() {
                if !previous.is_cancelled() {
                    debug!(session.id = %self.id, "superseding in-flight answer");
                }
                previous.cancel();
            }
            let token = self.closed.child_token();
            *in_flight = Some(token.clone());
            token
        };
        self.engine.stream_answer(question, token).await
    }

    /// Ask a question and wait for the complete answer.
    ///
    /// # Errors
    ///
    /// Same as [`ask`](Self::ask); a call superseded mid-generation returns
    /// [`RagError::Cancelled`].
    pub async fn answer(&self, question: &str) -> Result<Answer> {
        collect_answer(self.ask(question).await?).await
    }

    /// Cancel the in-flight answer, if any, leaving the session usable.
    pub async fn cancel_in_flight(&self) {
        if let Some(token) = self.in_flight.lock().await.take() {
            token.cancel();
        }
    }

    /// End the session, cancelling any in-flight answer.
    pub fn close(&self) {
        self.closed.cancel();
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        self.closed.cancel();
    }
}

/// Holds the live sessions of a process, keyed by [`SessionId`].
///
/// Sessions share the engine (and through it the read-only index) but no
/// mutable state.
#[derive(Clone)]
pub struct SessionManager {
    engine: Arc<AnswerEngine>,
    sessions: Arc<RwLock<HashMap<SessionId, Arc<Session>>>>,
}

impl SessionManager {
    /// Create a manager whose sessions all answer with `engine`.
    pub fn new(engine: Arc<AnswerEngine>) -> Self {
        Self { engine, sessions: Arc::new(RwLock::new(HashMap::new())) }
    }

    /// Start a new conversation.
    pub async fn create_session(&self) -> Arc<Session> {
        let session = Arc::new(Session::new(self.engine.clone()));
        self.sessions.write().await.insert(session.id().to_string(), session.clone());
        info!(session.id = %session.id(), "session started");
        session
    }

    /// Look up a live session.
    pub async fn get(&self, session_id: &str) -> Option<Arc<Session>> {
        self.sessions.read().await.get(session_id).cloned()
    }

    /// End a conversation, cancelling its in-flight answer.
    ///
    /// Returns `false` if no such session exists.
    pub async fn end_session(&self, session_id: &str) -> bool {
        let removed = self.sessions.write().await.remove(session_id);
        match removed {
            Some(session) => {
                session.close();
                info!(session.id = %session_id, "session ended");
                true
            }
            None => false,
        }
    }

    /// Number of live sessions.
    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }

    /// Whether there are no live sessions.
    pub async fn is_empty(&self) -> bool {
        self.sessions.read().await.is_empty()
    }
}
