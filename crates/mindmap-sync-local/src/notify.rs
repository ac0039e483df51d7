use mindmap_sync_core::UserNotifier;
use tracing::warn;

/// Surfaces user-facing failure notices through the log.
#[derive(Debug, Default)]
pub struct TracingNotifier;

impl UserNotifier for TracingNotifier {
    fn notify(&self, message: &str) {
        warn!(target: "mindmap_sync_local::user", "{}", message);
    }
}
