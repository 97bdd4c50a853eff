//! Terminal front-end: send a prompt and stream the answer, or print a
//! session's transcript.

mod cli;
mod surface;

use std::sync::Arc;

use anyhow::{Context as _, bail};
use clap::Parser as _;

use chat_stream_client::{
    HttpChatBackend, Role, SessionId, StreamSession, TranscriptReconciler, TurnOutcome,
    init_observability,
};

use crate::cli::{Cli, Commands};
use crate::surface::{TerminalSurface, preview, role_label};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    init_observability();

    let backend = Arc::new(
        HttpChatBackend::new(cli.client_config()).context("invalid backend configuration")?,
    );
    let reconciler = Arc::new(TranscriptReconciler::new(
        SessionId::new(cli.session.trim()),
        backend,
    ));

    match &cli.command {
        Commands::Send { prompt } => send(&cli, reconciler, &prompt.join(" ")).await,
        Commands::History => history(&reconciler).await,
    }
}

async fn send(cli: &Cli, reconciler: Arc<TranscriptReconciler>, prompt: &str) -> anyhow::Result<()> {
    let session = StreamSession::new(reconciler, Arc::new(TerminalSurface::default()))
        .with_options(cli.session_options());

    let cancel = session.cancel_handle();
    let ctrl_c = tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("interrupt received, cancelling turn");
            cancel.cancel();
        }
    });

    let outcome = session.start(prompt).await;
    ctrl_c.abort();

    match outcome? {
        TurnOutcome::Completed { reconciled } => {
            let transcript = session.reconciler().snapshot();
            eprintln!(
                "{} entries in transcript{}",
                transcript.entries().len(),
                if reconciled { "" } else { " (not refreshed)" }
            );
            Ok(())
        }
        TurnOutcome::Cancelled => Ok(()),
        TurnOutcome::TimedOut => bail!("turn timed out"),
        TurnOutcome::Errored { message } => bail!("turn failed: {message}"),
    }
}

async fn history(reconciler: &TranscriptReconciler) -> anyhow::Result<()> {
    reconciler
        .refresh()
        .await
        .context("failed to fetch transcript")?;
    for entry in reconciler.entries() {
        match (entry.role, &entry.tool_name) {
            (Role::Tool, Some(tool)) => println!("tool:{tool}: {}", preview(&entry.content)),
            (role, _) => println!("{}: {}", role_label(role), entry.content),
        }
    }
    Ok(())
}
