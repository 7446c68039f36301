//! Subcommand handlers.

use std::io::{self, Write};
use std::sync::Arc;

use anyhow::{Context, Result, anyhow, bail};
use futures::StreamExt;
use medbot_rag::{
    Answer, AnswerEngine, AnswerEvent, AnswerStream, DirectoryLoader, GenerationProvider,
    IngestPipeline, IngestReport, RagError, Session, SessionManager, VectorIndex, collect_answer,
    embedding_from_config, generation_from_config, read_descriptor,
};
use rustyline::DefaultEditor;
use rustyline::error::ReadlineError;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::cli::{Cli, Command};
use crate::settings::MedbotConfig;

/// First line printed by `medbot chat`.
pub const GREETING: &str = "Hi, Welcome to Medical Bot. What is your query?";

/// Resolve configuration from the file and flags, then run the subcommand.
pub async fn run(cli: Cli) -> Result<()> {
    let mut config = MedbotConfig::load(cli.config.as_deref())?;
    config.apply(cli.overrides());
    config.validate()?;

    match cli.command {
        Command::Ingest { .. } => {
            let report = ingest(&config).await?;
            println!(
                "Indexed {} chunks from {} documents into {}",
                report.chunk_count,
                report.document_count,
                report.index_path.display()
            );
            Ok(())
        }
        Command::Ask { question, json, .. } => {
            let engine = build_engine(&config)?;
            ask(&engine, &question, json, &mut io::stdout()).await
        }
        Command::Chat { .. } => chat(Arc::new(build_engine(&config)?)).await,
        Command::Info => info_command(&config),
    }
}

/// Load the corpus, build the index, and save it.
pub async fn ingest(config: &MedbotConfig) -> Result<IngestReport> {
    let source = DirectoryLoader::new(&config.data_dir, &config.glob)?;
    let embedder = embedding_from_config(&config.embedding)?;

    IngestPipeline::builder()
        .config(config.rag.clone())
        .source(Arc::new(source))
        .embedding_provider(embedder)
        .index_path(&config.index_path)
        .build()?
        .run()
        .await
        .with_context(|| format!("ingestion from {} failed", config.data_dir.display()))
}

/// Load the saved index and wire up the answer engine.
pub fn build_engine(config: &MedbotConfig) -> Result<AnswerEngine> {
    build_engine_with(config, generation_from_config(&config.generation)?)
}

/// Like [`build_engine`], but answering with an already constructed generator.
pub fn build_engine_with(
    config: &MedbotConfig,
    generator: Arc<dyn GenerationProvider>,
) -> Result<AnswerEngine> {
    let embedder = embedding_from_config(&config.embedding)?;
    let index = VectorIndex::load_for(&config.index_path, embedder.as_ref()).with_context(|| {
        format!(
            "failed to load the index at {} (run `medbot ingest` first)",
            config.index_path.display()
        )
    })?;

    let engine = AnswerEngine::builder()
        .config(config.rag.clone())
        .answer_config(config.answer.clone())
        .prompt(config.prompt()?)
        .index(Arc::new(index))
        .embedding_provider(embedder)
        .generation_provider(generator)
        .build()?;
    Ok(engine)
}

/// Answer one question, streaming text to `out` (or printing JSON at the end).
///
/// Failures that have a user-facing message print it before returning the error.
pub async fn ask(
    engine: &AnswerEngine,
    question: &str,
    json: bool,
    out: &mut impl Write,
) -> Result<()> {
    let result = write_answer(engine, question, json, out).await;
    if let Err(e) = &result {
        if let Some(message) = e.downcast_ref::<RagError>().and_then(RagError::user_message) {
            writeln!(out, "{message}")?;
        }
    }
    result
}

async fn write_answer(
    engine: &AnswerEngine,
    question: &str,
    json: bool,
    out: &mut impl Write,
) -> Result<()> {
    let stream = engine.stream_answer(question, CancellationToken::new()).await?;
    if json {
        let answer = collect_answer(stream).await?;
        writeln!(out, "{}", serde_json::to_string_pretty(&answer)?)?;
    } else {
        write_stream(stream, out).await?;
    }
    Ok(())
}

/// Copy an answer stream to `out` as it arrives, followed by its sources.
async fn write_stream(mut stream: AnswerStream, out: &mut impl Write) -> Result<Answer> {
    while let Some(event) = stream.next().await {
        match event? {
            AnswerEvent::Delta(text) => {
                write!(out, "{text}")?;
                out.flush()?;
            }
            AnswerEvent::Completed(answer) => {
                if answer.text.is_empty() {
                    warn!("model produced an empty answer");
                }
                writeln!(out, "\n\n{}", answer.sources_section())?;
                return Ok(answer);
            }
        }
    }
    Err(RagError::Cancelled.into())
}

/// Interactive loop; Ctrl-C while an answer streams cancels just that answer.
pub async fn chat(engine: Arc<AnswerEngine>) -> Result<()> {
    let manager = SessionManager::new(engine);
    let session = manager.create_session().await;
    let mut editor =
        DefaultEditor::new().map_err(|e| anyhow!("failed to start the line editor: {e}"))?;

    println!("{GREETING}");
    loop {
        let line = match editor.readline("> ") {
            Ok(line) => line,
            Err(ReadlineError::Interrupted) => continue,
            Err(ReadlineError::Eof) => break,
            Err(e) => bail!("failed to read input: {e}"),
        };
        let question = line.trim();
        if question.is_empty() {
            continue;
        }
        if matches!(question, "exit" | "quit" | "/exit" | "/quit") {
            break;
        }
        if let Err(e) = editor.add_history_entry(question) {
            warn!(error = %e, "failed to record history entry");
        }

        if let Err(e) = answer_interactively(&session, question).await {
            match e.downcast_ref::<RagError>() {
                Some(RagError::Cancelled) => println!(),
                Some(rag) => println!("{}", rag.user_message().unwrap_or_default()),
                None => println!("Sorry, something went wrong while answering: {e}"),
            }
        }
    }

    manager.end_session(session.id()).await;
    info!("chat ended");
    Ok(())
}

async fn answer_interactively(session: &Session, question: &str) -> Result<()> {
    let mut stream = tokio::select! {
        started = session.ask(question) => started?,
        _ = tokio::signal::ctrl_c() => {
            session.cancel_in_flight().await;
            return Err(RagError::Cancelled.into());
        }
    };

    let mut stdout = io::stdout();
    loop {
        tokio::select! {
            event = stream.next() => match event {
                Some(Ok(AnswerEvent::Delta(text))) => {
                    print!("{text}");
                    stdout.flush()?;
                }
                Some(Ok(AnswerEvent::Completed(answer))) => {
                    println!("\n\n{}\n", answer.sources_section());
                    return Ok(());
                }
                Some(Err(e)) => return Err(e.into()),
                None => return Err(RagError::Cancelled.into()),
            },
            _ = tokio::signal::ctrl_c() => session.cancel_in_flight().await,
        }
    }
}

fn info_command(config: &MedbotConfig) -> Result<()> {
    let descriptor = read_descriptor(&config.index_path)
        .with_context(|| format!("no readable index at {}", config.index_path.display()))?;
    println!("path:            {}", VectorIndex::payload_path(&config.index_path).display());
    println!("format version:  {}", descriptor.format_version);
    println!("embedding model: {}", descriptor.embedding_model);
    println!("dimensions:      {}", descriptor.dimensions);
    println!("metric:          {:?}", descriptor.metric);
    println!("chunks:          {}", descriptor.chunk_count);
    println!("created:         {}", descriptor.created_at.to_rfc3339());
    Ok(())
}
