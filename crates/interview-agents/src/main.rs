//! Terminal interview driver.
//!
//! ```bash
//! # Against a chat completions endpoint and the facts service
//! INTERVIEW_MODEL_URL=http://judge:8000/v1 INTERVIEW_INDEX_URL=http://rag:8001 \
//!     interview-agents --plan plan.toml
//!
//! # Fully offline with the scripted model and in-memory index
//! interview-agents --plan plan.toml --offline
//! ```
//!
//! Each stdin line is one participant message. `/finish` ends the interview
//! early; end of input finishes it too.

use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use interview_agents::{check_endpoint, AgentConfig, HttpSimilarityIndex, InterviewPlan, OpenAiCompatModel};
use interview_orchestration::prompts::{OPENING_TAG, REPLY_TAG};
use interview_orchestration::{
    AnalysisResult, EventBroadcaster, InMemorySessionStore, InMemorySimilarityIndex, Message,
    ScriptedModel, SessionEvent, SessionOrchestrator, SharedModel, SharedSimilarityIndex,
    Subscription,
};
use tokio::io::{stdin, AsyncBufReadExt, BufReader};
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

/// Command-line arguments
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Interview plan (TOML)
    #[arg(long)]
    plan: PathBuf,

    /// Orchestrator config file (overrides INTERVIEW_CONFIG)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Use the scripted model and the in-memory index; no network access
    #[arg(long, default_value_t = false)]
    offline: bool,

    /// Write the final session record here as JSON
    #[arg(long)]
    output: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();
    let mut agent_config = AgentConfig::default();
    if let Some(path) = args.config {
        agent_config.orchestrator_config = Some(path);
    }
    let config = agent_config.load_orchestrator_config()?;
    let plan = InterviewPlan::load(&args.plan)
        .with_context(|| format!("Failed to load interview plan {}", args.plan.display()))?;

    let (model, index) = backends(&agent_config, args.offline).await?;
    info!(
        offline = args.offline,
        model = %agent_config.model.model,
        index = agent_config.index_url.as_deref().unwrap_or("in-memory"),
        "Interview runtime starting"
    );

    let orchestrator = SessionOrchestrator::new(
        model,
        index,
        Arc::new(InMemorySessionStore::new()),
        EventBroadcaster::new().shared(),
        config,
    )
    .shared();

    let session = orchestrator
        .create_session(plan.into_new_session())
        .await
        .context("Failed to create interview session")?;
    let session_id = session.id.clone();
    info!(session_id = %session_id, checklist = session.checklist.len(), "Session created");

    let watcher = tokio::spawn(log_analysis_events(orchestrator.subscribe(&session_id)));
    for message in &session.messages {
        print_message(message);
    }

    let mut scoring: Option<JoinHandle<AnalysisResult>> = None;
    let mut lines = BufReader::new(stdin()).lines();
    loop {
        prompt();
        let Some(line) = lines.next_line().await.context("Failed to read stdin")? else {
            break;
        };
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        if line == "/finish" {
            break;
        }

        match orchestrator.handle_message(&session_id, line).await {
            Ok(outcome) => {
                print_message(&outcome.reply);
                if let Some(finish) = outcome.finish {
                    if let Some(notice) = &finish.notice {
                        print_message(notice);
                    }
                    scoring = finish.scoring;
                    break;
                }
            }
            Err(e) => error!(session_id = %session_id, error = %e, "Turn failed"),
        }
    }

    if scoring.is_none() {
        let finish = orchestrator
            .finish_session(&session_id, None)
            .await
            .context("Failed to finish session")?;
        if let Some(notice) = &finish.notice {
            print_message(notice);
        }
        scoring = finish.scoring;
    }

    if let Some(handle) = scoring {
        let analysis = handle.await.context("Scoring task failed")?;
        println!(
            "{}",
            serde_json::to_string_pretty(&analysis).context("Failed to render analysis")?
        );
    }
    watcher.abort();

    if let Some(path) = args.output {
        let record = orchestrator
            .session(&session_id)
            .await
            .context("Failed to load final session record")?;
        let json = serde_json::to_string_pretty(&record).context("Failed to serialize session")?;
        std::fs::write(&path, json)
            .with_context(|| format!("Failed to write session record to {}", path.display()))?;
        info!(path = %path.display(), "Session record written");
    }

    Ok(())
}

async fn backends(
    config: &AgentConfig,
    offline: bool,
) -> Result<(SharedModel, SharedSimilarityIndex)> {
    if offline {
        return Ok((
            Arc::new(offline_model()),
            Arc::new(InMemorySimilarityIndex::new()),
        ));
    }

    if !check_endpoint(&config.model.url).await {
        warn!(url = %config.model.url, "Model endpoint did not answer /models; continuing anyway");
    }
    let model: SharedModel = Arc::new(
        OpenAiCompatModel::new(config.model.clone()).context("Failed to build model client")?,
    );
    let index: SharedSimilarityIndex = match &config.index_url {
        Some(url) => Arc::new(
            HttpSimilarityIndex::new(url, config.model.timeout)
                .context("Failed to build similarity index client")?,
        ),
        None => Arc::new(InMemorySimilarityIndex::new()),
    };
    Ok((model, index))
}

/// Judges answer `{}` and fall back to their neutral verdicts.
fn offline_model() -> ScriptedModel {
    ScriptedModel::new()
        .respond(OPENING_TAG, "Hello! Let's start. Could you introduce yourself?")
        .respond(REPLY_TAG, "Thank you. Could you tell me more about that?")
        .with_default("{}")
}

async fn log_analysis_events(mut events: Subscription) {
    while let Some(event) = events.recv().await {
        match event {
            SessionEvent::AnalysisProgress {
                item_id,
                status,
                score,
                completed,
                total,
                ..
            } => info!(item_id = %item_id, ?status, ?score, completed, total, "Checklist item scored"),
            SessionEvent::AnalysisError { message, .. } => {
                warn!(error = %message, "Session analysis failed")
            }
            _ => {}
        }
    }
}

fn print_message(message: &Message) {
    let at = message.created_at.with_timezone(&chrono::Local);
    println!("[{}] {}: {}", at.format("%H:%M:%S"), message.role, message.content);
}

fn prompt() {
    print!("> ");
    let _ = std::io::stdout().flush();
}
