mod backend;
mod config;
mod document;
mod notify;
mod seed;

use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use mindmap_sync_core::{
    CommitBackend, DocumentSnapshot, DocumentSyncBoundary, SaveController, SaveStatus, SaveView,
    UserNotifier,
};
use serde::Serialize;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use backend::SimulatedBackend;
use config::Config;
use document::{MemoryDocument, Viewport};
use notify::TracingNotifier;

const UNLOCKED_MESSAGE: &str = "You can edit now.";

/// Final state of the demo, printed as JSON.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct Report {
    status: SaveStatus,
    message: String,
    editable: bool,
    dirty: bool,
    can_undo: bool,
    can_redo: bool,
    viewport: Viewport,
    fingerprint: String,
    document: DocumentSnapshot,
}

// Single-threaded, like the UI event loop the controller is written for
#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    // Logs go to stderr; stdout carries the report
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let config = Config::parse();

    info!("Starting mindmap-sync-local");
    info!("  Commit mode: {}", config.commit_mode);
    info!("  Commit delay: {} ms", config.commit_delay_ms);
    if let Some(path) = &config.initial_data {
        info!("  Initial data: {}", path.display());
    }

    let seed = seed::load_initial_data(config.initial_data.as_deref())
        .await
        .context("Failed to load initial data")?;
    let document = Arc::new(MemoryDocument::new(seed)?);

    let backend: Arc<dyn CommitBackend> = Arc::new(SimulatedBackend::new(
        config.commit_delay(),
        config.commit_mode,
    ));
    let notifier: Arc<dyn UserNotifier> = Arc::new(TracingNotifier);

    let controller = SaveController::new(backend, notifier);
    controller.attach(document.clone());
    let status_logger = spawn_status_logger(controller.subscribe());

    // The component loads read-only and is unlocked shortly after
    tokio::time::sleep(config.unlock_delay()).await;
    document.set_editable(true);
    controller.set_message(UNLOCKED_MESSAGE);
    info!("Document is now editable");

    for edit in &config.edits {
        edit.apply(&document)
            .with_context(|| format!("Edit {:?} failed", edit))?;
    }

    let outcome = if config.double_click {
        let (first, second) = tokio::join!(controller.trigger_save(), controller.trigger_save());
        match second {
            Ok(_) => warn!("Second save press was not ignored"),
            Err(e) => info!("Second save press ignored: {}", e),
        }
        first
    } else {
        controller.trigger_save().await
    };

    let view = controller.view();
    drop(controller);
    let _ = status_logger.await;

    let report = Report {
        status: view.status,
        message: view.message,
        editable: document.is_editable(),
        dirty: document.is_dirty(),
        can_undo: document.can_undo(),
        can_redo: document.can_redo(),
        viewport: document.viewport(),
        fingerprint: document.capture().fingerprint(),
        document: document.capture(),
    };
    let json = serde_json::to_string_pretty(&report)?;

    match &config.output {
        Some(path) => {
            tokio::fs::write(path, json)
                .await
                .with_context(|| format!("Failed to write report to {}", path.display()))?;
            info!("Report written to {}", path.display());
        }
        None => println!("{}", json),
    }

    outcome.context("Save failed")?;
    info!("Done");
    Ok(())
}

/// Log every status change, as the UI status line would show it.
/// Ends when the controller is dropped.
fn spawn_status_logger(mut rx: watch::Receiver<SaveView>) -> JoinHandle<()> {
    tokio::spawn(async move {
        while rx.changed().await.is_ok() {
            let view = rx.borrow_and_update().clone();
            info!(
                status = %view.status,
                button = view.button_label(),
                "{}",
                view.message
            );
        }
    })
}
