use std::sync::{Mutex, MutexGuard, PoisonError};

use mindmap_sync_core::{DocumentSnapshot, DocumentSyncBoundary, RawNode, SyncError};
use serde::Serialize;
use tracing::{debug, instrument};

/// Camera position over the mind map canvas.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Viewport {
    pub x: f64,
    pub y: f64,
    pub zoom: f64,
}

impl Default for Viewport {
    fn default() -> Self {
        Self {
            x: 0.0,
            y: 0.0,
            zoom: 1.0,
        }
    }
}

#[derive(Debug)]
struct DocumentState {
    live: DocumentSnapshot,
    editable: bool,
    viewport: Viewport,
    undo: Vec<DocumentSnapshot>,
    redo: Vec<DocumentSnapshot>,
    /// Fingerprint of the last loaded or replaced tree
    baseline: String,
}

/// In-memory mind map component.
///
/// Plays the editable widget in the demo: holds the live tree, gates user
/// edits on the editable flag and keeps undo/redo history. Starts read-only.
#[derive(Debug)]
pub struct MemoryDocument {
    state: Mutex<DocumentState>,
}

impl MemoryDocument {
    /// Load a document from `initial`.
    pub fn new(initial: DocumentSnapshot) -> Result<Self, SyncError> {
        initial.validate()?;
        let baseline = initial.fingerprint();
        Ok(Self {
            state: Mutex::new(DocumentState {
                live: initial,
                editable: false,
                viewport: Viewport::default(),
                undo: Vec::new(),
                redo: Vec::new(),
                baseline,
            }),
        })
    }

    fn state(&self) -> MutexGuard<'_, DocumentState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Apply a user edit to a copy of the live tree and commit it if the result is valid.
    fn edit<T>(
        &self,
        f: impl FnOnce(&mut DocumentSnapshot) -> Result<T, SyncError>,
    ) -> Result<T, SyncError> {
        let mut state = self.state();
        if !state.editable {
            return Err(SyncError::ReadOnly);
        }

        let mut next = state.live.clone();
        let out = f(&mut next)?;
        next.validate()?;

        let previous = std::mem::replace(&mut state.live, next);
        state.undo.push(previous);
        state.redo.clear();
        Ok(out)
    }

    #[instrument(skip(self), level = "debug")]
    pub fn rename_node(&self, id: &str, name: &str) -> Result<(), SyncError> {
        self.edit(|tree| {
            let node = tree
                .find_mut(id)
                .ok_or_else(|| SyncError::NodeNotFound(id.to_string()))?;
            node.name = name.to_string();
            Ok(())
        })
    }

    #[instrument(skip(self, node), level = "debug", fields(child = %node.id))]
    pub fn add_child(&self, parent_id: &str, node: RawNode) -> Result<(), SyncError> {
        self.edit(|tree| {
            let parent = tree
                .find_mut(parent_id)
                .ok_or_else(|| SyncError::NodeNotFound(parent_id.to_string()))?;
            parent.child_node_list.push(node);
            Ok(())
        })
    }

    #[instrument(skip(self), level = "debug")]
    pub fn remove_node(&self, id: &str) -> Result<RawNode, SyncError> {
        self.edit(|tree| {
            if tree.id == id {
                return Err(SyncError::InvalidSnapshot(
                    "the root node cannot be removed".to_string(),
                ));
            }
            tree.remove_descendant(id)
                .ok_or_else(|| SyncError::NodeNotFound(id.to_string()))
        })
    }

    /// Step back one edit. Returns false when there is nothing to undo.
    pub fn undo(&self) -> Result<bool, SyncError> {
        let mut state = self.state();
        if !state.editable {
            return Err(SyncError::ReadOnly);
        }
        let Some(previous) = state.undo.pop() else {
            return Ok(false);
        };
        let current = std::mem::replace(&mut state.live, previous);
        state.redo.push(current);
        Ok(true)
    }

    /// Re-apply the last undone edit. Returns false when there is nothing to redo.
    pub fn redo(&self) -> Result<bool, SyncError> {
        let mut state = self.state();
        if !state.editable {
            return Err(SyncError::ReadOnly);
        }
        let Some(next) = state.redo.pop() else {
            return Ok(false);
        };
        let current = std::mem::replace(&mut state.live, next);
        state.undo.push(current);
        Ok(true)
    }

    /// Move the camera. Allowed while read-only.
    pub fn pan_to(&self, viewport: Viewport) {
        self.state().viewport = viewport;
    }

    pub fn viewport(&self) -> Viewport {
        self.state().viewport
    }

    pub fn can_undo(&self) -> bool {
        !self.state().undo.is_empty()
    }

    pub fn can_redo(&self) -> bool {
        !self.state().redo.is_empty()
    }

    /// Whether the live tree differs from the last loaded baseline.
    pub fn is_dirty(&self) -> bool {
        let state = self.state();
        state.live.fingerprint() != state.baseline
    }
}

impl DocumentSyncBoundary for MemoryDocument {
    fn capture(&self) -> DocumentSnapshot {
        self.state().live.clone()
    }

    fn replace(&self, snapshot: DocumentSnapshot) {
        let mut state = self.state();
        state.baseline = snapshot.fingerprint();
        state.live = snapshot;
        state.undo.clear();
        state.redo.clear();
        debug!(
            nodes = state.live.node_count(),
            "Document replaced, history reset"
        );
    }

    fn set_editable(&self, editable: bool) {
        self.state().editable = editable;
        debug!("Document editable = {}", editable);
    }

    fn is_editable(&self) -> bool {
        self.state().editable
    }
}
