//! # strand
//!
//! CLI over a session file: reports the context that would be sent, its token
//! total and the compaction decision, and optionally compacts it with the
//! extractive summarizer.

#![deny(unsafe_code)]
#![allow(missing_docs)]

mod report;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use strand_context::{
    CompactionDeps, CompactionOptions, CompactionOrchestrator, ExtractiveSummarizer, NoopUiSink,
    StaticModelCatalog, annotate_token_counts,
};
use strand_core::Session;
use strand_core::logging::init_subscriber;
use strand_session::{GenerationRegistry, MemorySessionStore, SessionStore};
use strand_settings::{
    StrandSettings, get_settings, init_settings, load_settings, load_settings_from_path,
};
use tracing::{debug, info, warn};

use crate::report::Report;

/// Inspect and compact a strand session file.
#[derive(Parser, Debug)]
#[command(name = "strand", about = "Inspect and compact a strand session file")]
struct Cli {
    /// Session JSON file.
    session: PathBuf,

    /// Settings file (defaults to `~/.strand/settings.json`).
    #[arg(long)]
    settings: Option<PathBuf>,

    /// Log level (overrides settings).
    #[arg(long)]
    log_level: Option<String>,

    /// Context window of the session's model, in tokens.
    #[arg(long)]
    context_window: Option<u64>,

    /// Compact the session with the extractive summarizer.
    #[arg(long)]
    compact: bool,

    /// Compact even when the context is under the threshold.
    #[arg(long, requires = "compact")]
    force: bool,

    /// Write the compacted session here.
    #[arg(long, requires = "compact")]
    output: Option<PathBuf>,
}

fn read_session(path: &Path) -> Result<Session> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read session file: {}", path.display()))?;
    serde_json::from_str(&raw)
        .with_context(|| format!("Failed to parse session file: {}", path.display()))
}

fn write_session(path: &Path, session: &Session) -> Result<()> {
    let json = serde_json::to_string_pretty(session)?;
    std::fs::write(path, json)
        .with_context(|| format!("Failed to write session file: {}", path.display()))
}

fn catalog_for(session: &Session, context_window: Option<u64>) -> StaticModelCatalog {
    let settings = &session.settings;
    match (settings.provider.as_deref(), settings.model.as_deref(), context_window) {
        (Some(provider), Some(model), Some(window)) => {
            StaticModelCatalog::new().with_model(provider, model, window)
        }
        _ => StaticModelCatalog::new(),
    }
}

/// Fill in missing per-message token counts on the live timeline so the
/// compaction check has known counts to sum.
fn annotate_session(session: &mut Session, settings: &StrandSettings) -> usize {
    let kind = session
        .settings
        .tokenizer
        .unwrap_or(settings.context.tokenizer);
    annotate_token_counts(&mut session.timeline.messages, kind)
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let loaded = match &cli.settings {
        Some(path) => load_settings_from_path(path),
        None => load_settings(),
    }
    .context("Failed to load settings")?;
    let already_set = init_settings(loaded).is_err();
    let settings = get_settings();
    let level = cli
        .log_level
        .clone()
        .unwrap_or_else(|| settings.logging.level.clone());
    init_subscriber(&level);
    if already_set {
        warn!("global settings were already initialized, loaded file ignored");
    }

    let mut session = read_session(&cli.session)?;
    let annotated = annotate_session(&mut session, settings);
    debug!(annotated, "token counts estimated");
    let session_id = session.id.clone();
    let catalog = catalog_for(&session, cli.context_window);

    let store = Arc::new(MemorySessionStore::new());
    store.insert(session);
    let orchestrator = CompactionOrchestrator::new(
        CompactionDeps {
            store: store.clone(),
            summarizer: Arc::new(ExtractiveSummarizer::new()),
            catalog: Arc::new(catalog),
            ui: Arc::new(NoopUiSink),
            generations: Arc::new(GenerationRegistry::new()),
        },
        settings.clone(),
    );

    let check = orchestrator.check_compaction(&session_id).await?;
    let context = orchestrator.session_context(&session_id).await?;
    let tokens = orchestrator.context_tokens(&session_id).await?;
    let mut report = Report::new(session_id.clone(), &context, tokens, &check);

    if cli.compact {
        let outcome = orchestrator
            .run_compaction(
                &session_id,
                CompactionOptions {
                    force: cli.force,
                    boundary_message_id: None,
                },
            )
            .await;
        if let (true, Some(path)) = (outcome.compacted, &cli.output) {
            let session = store
                .get_session(&session_id)
                .await?
                .context("Session disappeared from the store")?;
            write_session(path, &session)?;
            info!(path = %path.display(), "compacted session written");
        }
        report.compaction = Some(outcome);
    }

    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use strand_context::ModelCatalog;
    use strand_core::{Message, TokenizerKind};

    #[test]
    fn session_file_round_trips_through_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("session.json");
        let session = Session::with_messages("chat", vec![Message::user("hi")]);

        write_session(&path, &session).unwrap();
        assert_eq!(read_session(&path).unwrap(), session);
    }

    #[test]
    fn unreadable_session_names_the_file() {
        let err = read_session(Path::new("/nonexistent/session.json")).unwrap_err();
        assert!(err.to_string().contains("/nonexistent/session.json"));
    }

    #[test]
    fn catalog_needs_model_and_window() {
        let mut session = Session::new("chat");
        session.settings.provider = Some("local".into());
        session.settings.model = Some("tiny".into());

        assert_eq!(
            catalog_for(&session, Some(4_096)).context_window("local", "tiny"),
            Some(4_096)
        );
        assert_eq!(catalog_for(&session, None).context_window("local", "tiny"), None);
    }

    #[test]
    fn annotation_uses_session_tokenizer() {
        let mut session = Session::with_messages(
            "chat",
            vec![
                Message::user("hello there"),
                Message::assistant("hi").with_token_count(TokenizerKind::Deepseek, 7),
            ],
        );
        session.settings.tokenizer = Some(TokenizerKind::Deepseek);

        assert_eq!(annotate_session(&mut session, &StrandSettings::default()), 1);
        let messages = &session.timeline.messages;
        assert!(messages[0].token_count(TokenizerKind::Deepseek).is_some());
        assert_eq!(messages[1].token_count(TokenizerKind::Deepseek), Some(7));
        assert!(messages[0].token_count(TokenizerKind::Default).is_none());
    }

    #[test]
    fn annotation_falls_back_to_global_tokenizer() {
        let mut session = Session::with_messages("chat", vec![Message::user("hello")]);

        assert_eq!(annotate_session(&mut session, &StrandSettings::default()), 1);
        assert!(session.timeline.messages[0].token_count(TokenizerKind::Default).is_some());
    }

    #[test]
    fn force_requires_compact() {
        assert!(Cli::try_parse_from(["strand", "s.json", "--force"]).is_err());
        let cli = Cli::try_parse_from(["strand", "s.json", "--compact", "--force"]).unwrap();
        assert!(cli.compact && cli.force);
    }
}
