//! Pagecraft Kernel Library
//!
//! Block-tree layout engine: placement validation, tree CRUD with cascading
//! delete and depth maintenance, reusable components, and page revisions.
//! The `pagecraft` binary wraps it for command-line maintenance.

pub mod block;
pub mod cache;
pub mod component;
pub mod config;
pub mod db;
pub mod error;
pub mod models;
pub mod page_lock;
pub mod revision;
pub mod state;
pub mod store;
pub mod tree;

pub use block::{BlockSpecRegistry, PlacementValidator};
pub use component::ComponentService;
pub use error::{EngineError, EngineResult};
pub use revision::RevisionService;
pub use state::{EngineSettings, LayoutEngine};
pub use tree::{TreeStore, Visibility};
