use std::path::Path;

use mindmap_sync_core::{DocumentSnapshot, NodeType, RawNode, SyncError};
use tracing::info;

/// Built-in sample mind map used when no seed file is given.
pub fn mock_initial_data() -> DocumentSnapshot {
    RawNode::new("root", "Root")
        .with_type(NodeType::RootNode)
        .with_uuid("00000000-0000-4000-8000-000000000001")
        .with_child(
            RawNode::new("module-login", "Login")
                .with_type(NodeType::ModuleNode)
                .with_uuid("00000000-0000-4000-8000-000000000002")
                .with_child(
                    RawNode::new("case-login-ok", "Valid credentials sign in")
                        .with_type(NodeType::CaseNode)
                        .with_uuid("00000000-0000-4000-8000-000000000003"),
                ),
        )
}

/// Load the initial mind map from a JSON file, or fall back to the sample.
pub async fn load_initial_data(path: Option<&Path>) -> Result<DocumentSnapshot, SyncError> {
    let Some(path) = path else {
        return Ok(mock_initial_data());
    };

    let bytes = tokio::fs::read(path)
        .await
        .map_err(|e| SyncError::Io(format!("Failed to read {}: {}", path.display(), e)))?;
    let data: DocumentSnapshot = serde_json::from_slice(&bytes)?;
    data.validate()?;

    info!(
        "Loaded initial data from {} ({} nodes)",
        path.display(),
        data.node_count()
    );
    Ok(data)
}
