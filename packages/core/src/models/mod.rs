//! Data Models
//!
//! Core data structures for the CareerCanvas hierarchy engine: the universal
//! [`Node`] with its closed [`NodeType`] set and edge-compatibility table,
//! the typed per-type metadata shapes, nested-forest assembly, and the
//! structured outcome of transactional moves.

pub mod meta;
pub mod node;

pub use meta::{
    ActionMeta, CareerTransitionMeta, EducationMeta, EventMeta, JobMeta, NodeMeta, ProjectMeta,
    ProjectStatus,
};
pub use node::{HierarchyStats, MoveOutcome, Node, NodeType, TreeNode};
