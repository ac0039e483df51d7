use async_trait::async_trait;

use crate::error::SyncError;
use crate::snapshot::{CommitResponse, DocumentSnapshot};

/// The capability surface the save controller needs from an editable document component.
///
/// The controller is the only caller of the mutating operations. Implementations
/// use interior mutability; all methods take `&self`.
pub trait DocumentSyncBoundary: Send + Sync {
    /// Whether the component has finished loading and can serve `capture`.
    fn is_ready(&self) -> bool {
        true
    }

    /// Return the current live state as an independent deep copy.
    ///
    /// Must not mutate the component. Later edits to the live document must
    /// not show up in the returned snapshot.
    fn capture(&self) -> DocumentSnapshot;

    /// Replace the entire live state with `snapshot`.
    ///
    /// Behaves like a fresh load: view state (viewport, zoom) is kept, edit
    /// history is cleared and `snapshot` becomes the new baseline. Not gated
    /// by the editable flag.
    fn replace(&self, snapshot: DocumentSnapshot);

    /// Toggle whether end-user edits are accepted.
    fn set_editable(&self, editable: bool);

    /// Current value of the editable flag.
    fn is_editable(&self) -> bool;
}

/// Backend abstraction for committing a snapshot to the authoritative store.
///
/// `Err(_)` means the call itself failed (rejected). `Ok` with
/// `success: false` means the backend answered but declined the save.
#[async_trait]
pub trait CommitBackend: Send + Sync {
    /// Returns the backend identifier (e.g., "simulated").
    fn backend_name(&self) -> &'static str;

    /// Send `snapshot` to the store and return its answer.
    async fn commit(&self, snapshot: DocumentSnapshot) -> Result<CommitResponse, SyncError>;
}

/// Surfaces failures to the end user (an alert, a toast, a log line).
pub trait UserNotifier: Send + Sync {
    fn notify(&self, message: &str);
}
