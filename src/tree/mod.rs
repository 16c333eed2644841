pub mod node;
pub mod codec;
pub mod mapped;

pub use node::{Node, NodeId, VectorTree};
pub use mapped::MappedTree;
