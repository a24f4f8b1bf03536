//! Service Layer Error Types
//!
//! The unified error taxonomy every external caller sees. One enum covers
//! all four mutation paths plus the pass-through queries; diagnostic
//! operations never raise on data anomalies (anomalies are their output).

use serde::Serialize;
use std::fmt;
use thiserror::Error;

use crate::db::DatabaseError;
use crate::models::NodeType;

/// One violated metadata field with a human-readable reason.
///
/// `validate_meta` collects these so a caller sees every problem in one
/// response instead of fixing fields one round-trip at a time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FieldViolation {
    pub field: String,
    pub message: String,
}

impl FieldViolation {
    pub fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

impl fmt::Display for FieldViolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

fn join_violations(violations: &[FieldViolation]) -> String {
    violations
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

fn join_types(types: &[NodeType]) -> String {
    if types.is_empty() {
        return "none (terminal leaf)".to_string();
    }
    types
        .iter()
        .map(|t| t.as_db_value().to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

/// Hierarchy engine errors
///
/// Kind → meaning → propagation:
/// - `ValidationFailed` — malformed input, reported unchanged, never retried
/// - `ParentNotFound` — referenced parent id doesn't resolve for the owner
/// - `RuleViolation` — child type not permitted under parent type
/// - `CycleViolation` — the mutation would make a node its own ancestor;
///   fully rejected, no partial state change
/// - `NotFound` — target node missing or not owned by the caller
/// - `VersionConflict` — another writer got there first (move CAS miss)
/// - `Database` / `QueryFailed` — storage failures, logged at the call site
#[derive(Error, Debug)]
pub enum HierarchyError {
    /// Metadata or input validation failed; every violated field listed
    #[error("Validation failed: {}", join_violations(.0))]
    ValidationFailed(Vec<FieldViolation>),

    /// Referenced parent node doesn't resolve for this owner
    #[error("Parent node not found: {parent_id}")]
    ParentNotFound { parent_id: String },

    /// Child type not permitted under parent type
    #[error(
        "{child_type} cannot be a child of {parent_type} (allowed children: {})",
        join_types(.allowed)
    )]
    RuleViolation {
        parent_type: NodeType,
        child_type: NodeType,
        allowed: Vec<NodeType>,
    },

    /// Proposed create/move would make a node its own ancestor
    #[error("Operation would create a cycle: {}", .path.join(" -> "))]
    CycleViolation { path: Vec<String> },

    /// Target node missing or not owned by caller
    #[error("Node not found: {id}")]
    NotFound { id: String },

    /// Optimistic concurrency check failed
    #[error("Version conflict for node {node_id}: expected version {expected}, found {actual}")]
    VersionConflict {
        node_id: String,
        expected: i64,
        actual: i64,
    },

    /// Database operation failed
    #[error("Database operation failed: {0}")]
    Database(#[from] DatabaseError),

    /// Query execution error
    #[error("Query failed: {0}")]
    QueryFailed(String),
}

impl HierarchyError {
    /// Create a not found error
    pub fn not_found(id: impl Into<String>) -> Self {
        Self::NotFound { id: id.into() }
    }

    /// Create a parent not found error
    pub fn parent_not_found(parent_id: impl Into<String>) -> Self {
        Self::ParentNotFound {
            parent_id: parent_id.into(),
        }
    }

    /// Create an edge-rule violation; the allowed set comes from the fixed
    /// compatibility table
    pub fn rule_violation(parent_type: NodeType, child_type: NodeType) -> Self {
        Self::RuleViolation {
            parent_type,
            child_type,
            allowed: parent_type.allowed_children().to_vec(),
        }
    }

    /// Create a cycle violation error
    pub fn cycle_violation(path: Vec<String>) -> Self {
        Self::CycleViolation { path }
    }

    /// Create a version conflict error
    pub fn version_conflict(node_id: impl Into<String>, expected: i64, actual: i64) -> Self {
        Self::VersionConflict {
            node_id: node_id.into(),
            expected,
            actual,
        }
    }

    /// Create a query failed error
    pub fn query_failed(msg: impl Into<String>) -> Self {
        Self::QueryFailed(msg.into())
    }
}
