mod edit;
mod memory;

pub use edit::EditCommand;
pub use memory::{MemoryDocument, Viewport};
