use std::str::FromStr;

use mindmap_sync_core::{NodeType, RawNode, SyncError};
use tracing::info;

use super::memory::{MemoryDocument, Viewport};

/// A scripted user edit, parsed from the command line.
#[derive(Debug, Clone, PartialEq)]
pub enum EditCommand {
    Rename { id: String, name: String },
    Add { parent: String, id: String, name: String },
    Remove { id: String },
    Pan(Viewport),
    Undo,
    Redo,
}

impl EditCommand {
    /// Perform the edit against `document` as the end user would.
    pub fn apply(&self, document: &MemoryDocument) -> Result<(), SyncError> {
        match self {
            EditCommand::Rename { id, name } => document.rename_node(id, name)?,
            EditCommand::Add { parent, id, name } => document.add_child(
                parent,
                RawNode::new(id.as_str(), name.as_str()).with_type(NodeType::ModuleNode),
            )?,
            EditCommand::Remove { id } => {
                document.remove_node(id)?;
            }
            EditCommand::Pan(viewport) => document.pan_to(*viewport),
            EditCommand::Undo => {
                if !document.undo()? {
                    info!("Nothing to undo");
                }
            }
            EditCommand::Redo => {
                if !document.redo()? {
                    info!("Nothing to redo");
                }
            }
        }
        Ok(())
    }
}

fn parse_number(field: &str, value: &str) -> Result<f64, String> {
    value
        .parse()
        .map_err(|e| format!("invalid {} '{}': {}", field, value, e))
}

impl FromStr for EditCommand {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (verb, rest) = s.split_once(':').unwrap_or((s, ""));
        match verb {
            "rename" => match rest.split_once(':') {
                Some((id, name)) if !id.is_empty() => Ok(EditCommand::Rename {
                    id: id.to_string(),
                    name: name.to_string(),
                }),
                _ => Err(format!("expected rename:<id>:<name>, got '{}'", s)),
            },
            "add" => {
                let mut parts = rest.splitn(3, ':');
                match (parts.next(), parts.next(), parts.next()) {
                    (Some(parent), Some(id), Some(name))
                        if !parent.is_empty() && !id.is_empty() =>
                    {
                        Ok(EditCommand::Add {
                            parent: parent.to_string(),
                            id: id.to_string(),
                            name: name.to_string(),
                        })
                    }
                    _ => Err(format!("expected add:<parent>:<id>:<name>, got '{}'", s)),
                }
            }
            "remove" if !rest.is_empty() => Ok(EditCommand::Remove {
                id: rest.to_string(),
            }),
            "pan" => {
                let parts: Vec<&str> = rest.split(':').collect();
                let [x, y, zoom] = parts.as_slice() else {
                    return Err(format!("expected pan:<x>:<y>:<zoom>, got '{}'", s));
                };
                Ok(EditCommand::Pan(Viewport {
                    x: parse_number("x", x)?,
                    y: parse_number("y", y)?,
                    zoom: parse_number("zoom", zoom)?,
                }))
            }
            "undo" if rest.is_empty() => Ok(EditCommand::Undo),
            "redo" if rest.is_empty() => Ok(EditCommand::Redo),
            _ => Err(format!("unknown edit '{}'", s)),
        }
    }
}
