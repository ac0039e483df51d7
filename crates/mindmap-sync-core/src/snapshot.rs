use std::collections::{BTreeMap, HashSet};

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::error::SyncError;

/// Kinds of node a mind map tree may contain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum NodeType {
    RootNode,
    ModuleNode,
    TestPointNode,
    CaseNode,
    PrerequisiteNode,
    StepNode,
    ExpectedResultNode,
    RemarkNode,
}

/// A single node of the mind map tree, as exchanged with the backend.
///
/// Field names follow the component's JSON shape (`nodeType`,
/// `generateModeName`, `childNodeList`). Attributes this type does not
/// model are kept in `extra` so they survive the round trip unchanged.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawNode {
    /// Stable identifier, assigned by whichever side created the node
    pub id: String,
    /// Secondary globally-unique identifier
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uuid: Option<String>,
    /// Display name
    pub name: String,
    /// Node kind
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub node_type: Option<NodeType>,
    /// Generation mode tag (e.g. "AI")
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub generate_mode_name: Option<String>,
    /// Ordered children
    #[serde(default)]
    pub child_node_list: Vec<RawNode>,
    /// Kind-specific attributes not modeled above
    #[serde(flatten)]
    pub extra: BTreeMap<String, serde_json::Value>,
}

/// The full state of the editable tree at one instant: its root node.
pub type DocumentSnapshot = RawNode;

impl RawNode {
    /// Create a leaf node with just an id and a name.
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            uuid: None,
            name: name.into(),
            node_type: None,
            generate_mode_name: None,
            child_node_list: Vec::new(),
            extra: BTreeMap::new(),
        }
    }

    pub fn with_type(mut self, node_type: NodeType) -> Self {
        self.node_type = Some(node_type);
        self
    }

    pub fn with_uuid(mut self, uuid: impl Into<String>) -> Self {
        self.uuid = Some(uuid.into());
        self
    }

    pub fn with_child(mut self, child: RawNode) -> Self {
        self.child_node_list.push(child);
        self
    }

    /// Total number of nodes in this subtree, including itself.
    pub fn node_count(&self) -> usize {
        1 + self
            .child_node_list
            .iter()
            .map(RawNode::node_count)
            .sum::<usize>()
    }

    /// Find a node by id anywhere in this subtree.
    pub fn find(&self, id: &str) -> Option<&RawNode> {
        if self.id == id {
            return Some(self);
        }
        self.child_node_list.iter().find_map(|c| c.find(id))
    }

    /// Find a mutable node by id anywhere in this subtree.
    pub fn find_mut(&mut self, id: &str) -> Option<&mut RawNode> {
        if self.id == id {
            return Some(self);
        }
        self.child_node_list.iter_mut().find_map(|c| c.find_mut(id))
    }

    /// Remove a descendant by id, returning it. The node itself cannot be removed.
    pub fn remove_descendant(&mut self, id: &str) -> Option<RawNode> {
        if let Some(pos) = self.child_node_list.iter().position(|c| c.id == id) {
            return Some(self.child_node_list.remove(pos));
        }
        self.child_node_list
            .iter_mut()
            .find_map(|c| c.remove_descendant(id))
    }

    /// Check that every node id in the tree is unique.
    pub fn validate(&self) -> Result<(), SyncError> {
        let mut seen = HashSet::new();
        let mut stack = vec![self];
        while let Some(node) = stack.pop() {
            if node.id.is_empty() {
                return Err(SyncError::InvalidSnapshot("node with empty id".to_string()));
            }
            if !seen.insert(node.id.as_str()) {
                return Err(SyncError::InvalidSnapshot(format!(
                    "duplicate node id {}",
                    node.id
                )));
            }
            stack.extend(node.child_node_list.iter());
        }
        Ok(())
    }

    /// Hex SHA-256 of the JSON encoding. Equal trees give equal fingerprints.
    pub fn fingerprint(&self) -> String {
        // serde_json writes struct fields in declaration order and `extra` is sorted
        let bytes = serde_json::to_vec(self).unwrap_or_default();
        hex::encode(Sha256::digest(&bytes))
    }
}

/// Response of a commit call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommitResponse {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_data: Option<DocumentSnapshot>,
}

impl CommitResponse {
    pub fn accepted(updated_data: DocumentSnapshot) -> Self {
        Self {
            success: true,
            updated_data: Some(updated_data),
        }
    }

    pub fn declined() -> Self {
        Self {
            success: false,
            updated_data: None,
        }
    }

    /// The authoritative snapshot, if the backend reported success with data.
    pub fn into_authoritative(self) -> Result<DocumentSnapshot, SyncError> {
        match (self.success, self.updated_data) {
            (true, Some(data)) => Ok(data),
            (true, None) => Err(SyncError::CommitDeclined(
                "backend reported success without updated data".to_string(),
            )),
            (false, _) => Err(SyncError::CommitDeclined(
                "backend reported an unsuccessful outcome".to_string(),
            )),
        }
    }
}
