//! Core traits and types for the mind map save/sync protocol.
//!
//! This crate defines the pieces shared by every host of the save workflow:
//! - `RawNode` / `DocumentSnapshot`: the serializable mind map tree
//! - `DocumentSyncBoundary`: what the controller needs from the editable component
//! - `CommitBackend`: the asynchronous commit to the authoritative store
//! - `SaveController`: capture, commit, reconcile, lock

mod boundary;
mod controller;
mod error;
mod snapshot;
mod status;

pub use boundary::{CommitBackend, DocumentSyncBoundary, UserNotifier};
pub use controller::SaveController;
pub use error::SyncError;
pub use snapshot::{CommitResponse, DocumentSnapshot, NodeType, RawNode};
pub use status::{SaveStatus, SaveView};
