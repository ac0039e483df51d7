use std::time::Duration;

use async_trait::async_trait;
use mindmap_sync_core::{
    CommitBackend, CommitResponse, DocumentSnapshot, NodeType, RawNode, SyncError,
};
use tracing::{debug, info, instrument};

use crate::config::CommitMode;

const SAVED_SUFFIX: &str = " (已保存)";
const SERVER_NODE_NAME: &str = "✨ 后端添加的节点";

/// Stand-in for the remote store.
///
/// After a fixed delay it answers according to its mode. In `Accept` mode the
/// returned snapshot is the one sent with " (已保存)" appended to the root name
/// and one server-created module node appended to the root's children.
#[derive(Debug, Clone)]
pub struct SimulatedBackend {
    delay: Duration,
    mode: CommitMode,
}

impl SimulatedBackend {
    pub fn new(delay: Duration, mode: CommitMode) -> Self {
        Self { delay, mode }
    }

    /// The node the server adds on every save.
    fn server_node() -> RawNode {
        let mut node = RawNode::new(
            format!("server-id-{}", chrono::Utc::now().timestamp_millis()),
            SERVER_NODE_NAME,
        )
        .with_type(NodeType::ModuleNode)
        .with_uuid(uuid::Uuid::new_v4().to_string());
        node.generate_mode_name = Some("AI".to_string());
        node
    }

    /// Apply the server-side transformation to a received snapshot.
    pub fn transform(mut snapshot: DocumentSnapshot) -> DocumentSnapshot {
        snapshot.name.push_str(SAVED_SUFFIX);
        snapshot.child_node_list.push(Self::server_node());
        snapshot
    }
}

#[async_trait]
impl CommitBackend for SimulatedBackend {
    fn backend_name(&self) -> &'static str {
        "simulated"
    }

    #[instrument(skip(self, snapshot), level = "debug", fields(nodes = snapshot.node_count()))]
    async fn commit(&self, snapshot: DocumentSnapshot) -> Result<CommitResponse, SyncError> {
        info!("Saving data to server (mode={})...", self.mode);
        debug!("Outbound payload: {}", serde_json::to_string(&snapshot)?);

        tokio::time::sleep(self.delay).await;

        match self.mode {
            CommitMode::Accept => {
                let updated = Self::transform(snapshot);
                info!(
                    nodes = updated.node_count(),
                    "Save succeeded, server returned updated data"
                );
                debug!("Inbound payload: {}", serde_json::to_string(&updated)?);
                Ok(CommitResponse::accepted(updated))
            }
            CommitMode::Decline => {
                info!("Server declined the save");
                Ok(CommitResponse::declined())
            }
            CommitMode::Reject => Err(SyncError::Io(
                "connection reset while saving".to_string(),
            )),
        }
    }
}
