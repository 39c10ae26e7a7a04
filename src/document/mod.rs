//! Document model: immutable node trees, marks, positions, and schemas.
//!
//! This module handles:
//! - The node tree and its integer position model
//! - Schema specs that extensions fold over, and validation against them
//! - The JSON form used for persistence and CRDT replication

mod content;
mod json;
mod node;
mod position;
mod schema;

pub use content::ContentExpr;
pub use node::{Attrs, Mark, MarkKind, Node, NodeKind, find_mark, normalize_inline};
pub use position::{PositionError, ResolvedPos};
pub use schema::{
    AttrSpec, Group, MarkRule, MarkSpec, NodeSpec, Schema, SchemaError, SchemaSpec,
};
