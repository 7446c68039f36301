//! End-to-end tests for streaming retrieval-augmented answers.

use std::sync::Arc;

use futures::StreamExt;
use medbot_rag::{
    AnswerConfig, AnswerEngine, AnswerEvent, Chunker, Document, EmbeddingProvider,
    HashingEmbeddingProvider, MockGenerationProvider, RagConfig, RagError, RecursiveChunker,
    VectorIndex, collect_answer,
};
use tokio_util::sync::CancellationToken;

const CORPUS: &str = "Aspirin reduces fever. Ibuprofen reduces inflammation.";

async fn medical_index(embedder: &HashingEmbeddingProvider) -> Arc<VectorIndex> {
    let document = Document::new("guide", CORPUS).with_metadata("source", "guide.txt");
    let chunks = RecursiveChunker::new(30, 5).chunk(&document);
    Arc::new(VectorIndex::build(chunks, embedder).await.unwrap())
}

async fn engine_with(
    generator: Arc<MockGenerationProvider>,
    answer_config: AnswerConfig,
    top_k: usize,
) -> AnswerEngine {
    let embedder = HashingEmbeddingProvider::new(384).unwrap();
    let index = medical_index(&embedder).await;
    AnswerEngine::builder()
        .config(RagConfig::builder().top_k(top_k).build().unwrap())
        .answer_config(answer_config)
        .index(index)
        .embedding_provider(Arc::new(embedder))
        .generation_provider(generator)
        .build()
        .unwrap()
}

async fn drain(engine: &AnswerEngine, question: &str) -> (Vec<String>, Option<medbot_rag::Answer>) {
    let mut stream = engine.stream_answer(question, CancellationToken::new()).await.unwrap();
    let mut deltas = Vec::new();
    let mut completed = None;
    while let Some(event) = stream.next().await {
        match event.unwrap() {
            AnswerEvent::Delta(text) => deltas.push(text),
            AnswerEvent::Completed(answer) => completed = Some(answer),
        }
    }
    (deltas, completed)
}

#[tokio::test]
async fn grounded_answer_streams_after_prefix_with_retrieved_sources() {
    let generator = Arc::new(MockGenerationProvider::new([
        "Looking at the context.",
        "FINAL",
        "ANSWER",
        "Aspirin",
        " reduces fever.",
    ]));
    let engine = engine_with(generator.clone(), AnswerConfig::default(), 1).await;

    let (deltas, answer) = drain(&engine, "What reduces fever?").await;
    let answer = answer.unwrap();

    assert_eq!(deltas, vec!["Aspirin", " reduces fever."]);
    assert_eq!(answer.text, "Aspirin reduces fever.");
    assert_eq!(answer.sources.len(), 1);
    assert_eq!(answer.sources[0].text, "Aspirin reduces fever. ");

    let prompts = generator.prompts();
    assert_eq!(prompts.len(), 1);
    assert!(prompts[0].contains("Context: Aspirin reduces fever. \n"));
    assert!(prompts[0].contains("Question: What reduces fever?"));
    assert!(!prompts[0].contains("Ibuprofen"));
}

#[tokio::test]
async fn answer_without_prefix_is_released_when_generation_ends() {
    let generator = Arc::new(MockGenerationProvider::new(["I", " don't", " know."]));
    let engine = engine_with(generator, AnswerConfig::default(), 2).await;

    let (deltas, answer) = drain(&engine, "What cures the common cold?").await;
    assert_eq!(deltas, vec!["I don't know."]);
    assert_eq!(answer.unwrap().text, "I don't know.");
}

#[tokio::test]
async fn stream_from_start_forwards_every_token() {
    let generator = Arc::new(MockGenerationProvider::new(["FINAL", "ANSWER", "Rest."]));
    let engine = engine_with(generator, AnswerConfig::stream_from_start(), 2).await;

    let (deltas, answer) = drain(&engine, "What reduces fever?").await;
    assert_eq!(deltas, vec!["FINAL", "ANSWER", "Rest."]);
    assert_eq!(answer.unwrap().sources.len(), 2);
}

#[tokio::test]
async fn completed_event_is_always_last() {
    let generator = Arc::new(MockGenerationProvider::new(["FINAL", "ANSWER", "a", "b"]));
    let engine = engine_with(generator, AnswerConfig::default(), 2).await;

    let events: Vec<_> = engine
        .stream_answer("q", CancellationToken::new())
        .await
        .unwrap()
        .map(|e| e.unwrap())
        .collect()
        .await;
    assert!(matches!(events.last(), Some(AnswerEvent::Completed(_))));
    assert_eq!(events.iter().filter(|e| matches!(e, AnswerEvent::Completed(_))).count(), 1);
}

#[tokio::test]
async fn generation_failure_surfaces_as_generation_error() {
    let generator = Arc::new(
        MockGenerationProvider::new(["FINAL", "ANSWER", "Asp"]).fail_with("model crashed"),
    );
    let engine = engine_with(generator, AnswerConfig::default(), 1).await;

    let stream =
        engine.stream_answer("What reduces fever?", CancellationToken::new()).await.unwrap();
    let err = collect_answer(stream).await.unwrap_err();
    assert!(matches!(
        err,
        RagError::GenerationError { ref message, .. } if message == "model crashed"
    ));
    assert!(err.user_message().unwrap().starts_with("Sorry"));
}

#[tokio::test]
async fn cancelled_token_stops_the_answer_before_generation() {
    let generator = Arc::new(MockGenerationProvider::new(["FINAL", "ANSWER", "x"]));
    let engine = engine_with(generator, AnswerConfig::default(), 1).await;

    let cancel = CancellationToken::new();
    cancel.cancel();
    let err = engine.stream_answer("q", cancel).await.err().unwrap();
    assert!(err.is_cancelled());
}

#[tokio::test]
async fn cancelling_mid_stream_ends_without_completion() {
    let generator =
        Arc::new(MockGenerationProvider::new(["FINAL", "ANSWER", "partial"]).never_finish());
    let engine = engine_with(generator, AnswerConfig::default(), 1).await;

    let cancel = CancellationToken::new();
    let mut stream = engine.stream_answer("q", cancel.clone()).await.unwrap();
    assert_eq!(stream.next().await.unwrap().unwrap(), AnswerEvent::Delta("partial".into()));

    cancel.cancel();
    assert!(matches!(stream.next().await, Some(Err(RagError::Cancelled))));
    assert!(stream.next().await.is_none());
}

#[tokio::test]
async fn answer_display_lists_sources() {
    let generator = Arc::new(MockGenerationProvider::new(["FINAL", "ANSWER", "Aspirin."]));
    let engine = engine_with(generator, AnswerConfig::default(), 1).await;

    let rendered = engine.answer("What reduces fever?").await.unwrap().to_string();
    assert!(rendered.starts_with("Aspirin.\n\nSources:"));
    assert!(rendered.contains("guide.txt"));
}

#[tokio::test]
async fn builder_rejects_embedder_with_other_dimensions() {
    let embedder = HashingEmbeddingProvider::new(384).unwrap();
    let index = medical_index(&embedder).await;
    let other = HashingEmbeddingProvider::new(64).unwrap();
    assert_eq!(other.dimensions(), 64);

    let result = AnswerEngine::builder()
        .index(index)
        .embedding_provider(Arc::new(other))
        .generation_provider(Arc::new(MockGenerationProvider::new(["x"])))
        .build();
    assert!(matches!(result, Err(RagError::DimensionMismatch { expected: 384, actual: 64 })));
}
