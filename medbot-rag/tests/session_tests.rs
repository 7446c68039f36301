//! Session cancellation and lifecycle tests.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use futures::StreamExt;
use medbot_rag::{
    AnswerEngine, AnswerEvent, Chunk, GenerationProvider, HashingEmbeddingProvider,
    MockGenerationProvider, RagConfig, RagError, Result, SessionManager, TokenStream, VectorIndex,
};

/// Hangs on the first prompt, answers every later one.
struct HangsOnce {
    calls: AtomicUsize,
    hanging: MockGenerationProvider,
    answering: MockGenerationProvider,
}

impl HangsOnce {
    fn new() -> Self {
        Self {
            calls: AtomicUsize::new(0),
            hanging: MockGenerationProvider::new(["FINAL", "ANSWER", "Partial"]).never_finish(),
            answering: MockGenerationProvider::new(["FINAL", "ANSWER", "Aspirin reduces fever."]),
        }
    }
}

#[async_trait::async_trait]
impl GenerationProvider for HangsOnce {
    fn name(&self) -> &str {
        "hangs-once"
    }

    async fn generate(&self, prompt: &str) -> Result<TokenStream> {
        if self.calls.fetch_add(1, Ordering::SeqCst) == 0 {
            self.hanging.generate(prompt).await
        } else {
            self.answering.generate(prompt).await
        }
    }
}

fn chunk(i: usize, text: &str) -> Chunk {
    Chunk {
        id: format!("guide_{i}"),
        text: text.to_string(),
        metadata: HashMap::new(),
        document_id: "guide".to_string(),
        start_offset: 0,
    }
}

async fn engine(generator: Arc<dyn GenerationProvider>) -> Arc<AnswerEngine> {
    let embedder = HashingEmbeddingProvider::new(384).unwrap();
    let chunks =
        vec![chunk(0, "Aspirin reduces fever. "), chunk(1, "Ibuprofen reduces inflammation.")];
    let index = VectorIndex::build(chunks, &embedder).await.unwrap();
    Arc::new(
        AnswerEngine::builder()
            .config(RagConfig::builder().top_k(1).build().unwrap())
            .index(Arc::new(index))
            .embedding_provider(Arc::new(embedder))
            .generation_provider(generator)
            .build()
            .unwrap(),
    )
}

#[tokio::test]
async fn cancelled_answer_leaves_the_session_usable() {
    let manager = SessionManager::new(engine(Arc::new(HangsOnce::new())).await);
    let session = manager.create_session().await;

    let mut first = session.ask("What reduces fever?").await.unwrap();
    assert_eq!(first.next().await.unwrap().unwrap(), AnswerEvent::Delta("Partial".into()));

    session.cancel_in_flight().await;
    assert!(matches!(first.next().await, Some(Err(RagError::Cancelled))));
    assert!(first.next().await.is_none());

    let answer = session.answer("What reduces fever?").await.unwrap();
    assert_eq!(answer.text, "Aspirin reduces fever.");
    assert_eq!(answer.sources.len(), 1);
    assert_eq!(answer.sources[0].id, "guide_0");
}

#[tokio::test]
async fn new_question_supersedes_the_one_in_flight() {
    let manager = SessionManager::new(engine(Arc::new(HangsOnce::new())).await);
    let session = manager.create_session().await;

    let mut first = session.ask("What reduces fever?").await.unwrap();
    assert!(matches!(first.next().await, Some(Ok(AnswerEvent::Delta(_)))));

    let second = session.answer("What reduces fever?").await.unwrap();
    assert_eq!(second.text, "Aspirin reduces fever.");
    assert!(matches!(first.next().await, Some(Err(RagError::Cancelled))));
}

#[tokio::test]
async fn closed_session_refuses_questions_and_cancels_in_flight() {
    let generator = MockGenerationProvider::new(["FINAL", "ANSWER", "x"]).never_finish();
    let manager = SessionManager::new(engine(Arc::new(generator)).await);
    let session = manager.create_session().await;

    let mut in_flight = session.ask("q").await.unwrap();
    assert!(in_flight.next().await.unwrap().is_ok());

    assert!(manager.end_session(session.id()).await);
    assert!(session.is_closed());
    assert!(matches!(in_flight.next().await, Some(Err(RagError::Cancelled))));
    assert!(matches!(session.ask("q").await, Err(RagError::Cancelled)));
}

#[tokio::test]
async fn manager_tracks_live_sessions() {
    let generator = MockGenerationProvider::new(["FINAL", "ANSWER", "ok"]);
    let manager = SessionManager::new(engine(Arc::new(generator)).await);
    assert!(manager.is_empty().await);

    let a = manager.create_session().await;
    let b = manager.create_session().await;
    assert_ne!(a.id(), b.id());
    assert_eq!(manager.len().await, 2);
    assert!(manager.get(a.id()).await.is_some());

    assert!(manager.end_session(a.id()).await);
    assert!(!manager.end_session(a.id()).await);
    assert!(manager.get(a.id()).await.is_none());
    assert_eq!(manager.len().await, 1);

    assert_eq!(b.answer("anything").await.unwrap().text, "ok");
}

#[tokio::test]
async fn sessions_answer_independently_in_parallel() {
    let generator = MockGenerationProvider::new(["FINAL", "ANSWER", "Aspirin reduces fever."]);
    let manager = SessionManager::new(engine(Arc::new(generator)).await);

    let mut handles = Vec::new();
    for _ in 0..4 {
        let session = manager.create_session().await;
        handles.push(tokio::spawn(async move { session.answer("What reduces fever?").await }));
    }
    for handle in handles {
        assert_eq!(handle.await.unwrap().unwrap().text, "Aspirin reduces fever.");
    }
}
