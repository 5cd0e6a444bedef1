//! Block placement rules.
//!
//! This module provides:
//! - BlockSpecRegistry: which block types nest where, and content checks
//! - PlacementValidator: registry- and store-backed placement decisions

pub mod registry;
mod validator;

pub use registry::{BlockSpec, BlockSpecRegistry, DynamicSlots, sanitize_html};
pub use validator::{PlacementRejection, PlacementValidator};
