use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;

use crate::document::EditCommand;

/// Configuration for the mindmap-sync-local demo.
#[derive(Parser, Debug, Clone)]
#[command(name = "mindmap-sync-local")]
#[command(about = "Runs the mind map save workflow against a simulated backend")]
pub struct Config {
    /// JSON file with the initial mind map (built-in sample if omitted)
    #[arg(long, env = "MINDMAP_INITIAL_DATA")]
    pub initial_data: Option<PathBuf>,

    /// Simulated network delay of the commit call, in milliseconds
    #[arg(long, default_value = "1000", env = "MINDMAP_COMMIT_DELAY_MS")]
    pub commit_delay_ms: u64,

    /// Delay before the document becomes editable, in milliseconds
    #[arg(long, default_value = "500", env = "MINDMAP_UNLOCK_DELAY_MS")]
    pub unlock_delay_ms: u64,

    /// How the simulated backend answers: accept, decline or reject
    #[arg(long, default_value = "accept", env = "MINDMAP_COMMIT_MODE")]
    pub commit_mode: CommitMode,

    /// User edits applied before saving, in order.
    /// One of: rename:<id>:<name>, add:<parent>:<id>:<name>, remove:<id>,
    /// pan:<x>:<y>:<zoom>, undo, redo
    #[arg(long = "edit", value_name = "EDIT")]
    pub edits: Vec<EditCommand>,

    /// Press save a second time while the first save is still pending
    #[arg(long)]
    pub double_click: bool,

    /// Write the final report here instead of stdout
    #[arg(long)]
    pub output: Option<PathBuf>,
}

impl Config {
    pub fn commit_delay(&self) -> Duration {
        Duration::from_millis(self.commit_delay_ms)
    }

    pub fn unlock_delay(&self) -> Duration {
        Duration::from_millis(self.unlock_delay_ms)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum CommitMode {
    /// Answer with the transformed snapshot
    Accept,
    /// Answer `success: false`
    Decline,
    /// Fail the call itself
    Reject,
}

impl std::fmt::Display for CommitMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CommitMode::Accept => write!(f, "accept"),
            CommitMode::Decline => write!(f, "decline"),
            CommitMode::Reject => write!(f, "reject"),
        }
    }
}
