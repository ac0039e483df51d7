use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Phase of the save workflow.
///
/// `Idle -> Saving -> {Synchronizing -> Success, Failed} -> Idle`. A new save
/// may start from `Idle`, `Success` or `Failed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SaveStatus {
    #[default]
    Idle,
    Saving,
    Synchronizing,
    Success,
    Failed,
}

impl SaveStatus {
    pub fn label(&self) -> &'static str {
        match self {
            SaveStatus::Idle => "idle",
            SaveStatus::Saving => "saving",
            SaveStatus::Synchronizing => "synchronizing",
            SaveStatus::Success => "success",
            SaveStatus::Failed => "failed",
        }
    }

    /// True while a commit round trip is underway.
    pub fn is_in_flight(&self) -> bool {
        matches!(self, SaveStatus::Saving | SaveStatus::Synchronizing)
    }

    /// True once a save has completed, either way.
    pub fn is_settled(&self) -> bool {
        matches!(self, SaveStatus::Success | SaveStatus::Failed)
    }
}

impl std::fmt::Display for SaveStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.label())
    }
}

/// What the surrounding UI observes: the status line and the save button state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SaveView {
    pub status: SaveStatus,
    /// Trigger control is disabled while true
    pub busy: bool,
    /// Human-readable status text
    pub message: String,
    pub changed_at: DateTime<Utc>,
}

impl Default for SaveView {
    fn default() -> Self {
        Self {
            status: SaveStatus::Idle,
            busy: false,
            message: "Edit the nodes, then press save.".to_string(),
            changed_at: Utc::now(),
        }
    }
}

impl SaveView {
    /// Label for the trigger control.
    pub fn button_label(&self) -> &'static str {
        if self.busy {
            "Saving..."
        } else {
            "Save"
        }
    }
}
