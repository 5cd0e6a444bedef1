//! Database models.

pub mod block_node;
pub mod component;
pub mod revision;

pub use block_node::{BlockNode, BlockStatus, BlockTree, CreateBlockNode, UpdateBlockNode};
pub use component::{
    ComponentDefinition, ComponentInstance, ContentSnapshot, CreateDefinition, DefinitionPage,
    InstantiateComponent, Instantiation, SnapshotNode, SnapshotTree,
};
pub use revision::{LayoutRevision, RevisionNode};
