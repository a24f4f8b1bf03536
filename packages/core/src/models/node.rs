//! Node Data Structures
//!
//! This module defines the core `Node` struct and related types for
//! CareerCanvas career-history forests.
//!
//! # Architecture
//!
//! - **Flat storage**: nodes live in one table keyed by id; the hierarchy is
//!   plain `parent_id` values, never in-memory object references
//! - **Closed type set**: `NodeType` is a fixed enum carrying the
//!   edge-compatibility table
//! - **Open metadata**: per-type shape lives in the `meta` JSON document,
//!   validated by the type rules before any write
//!
//! # Examples
//!
//! ```rust
//! use careercanvas_core::models::{Node, NodeType};
//! use serde_json::json;
//!
//! let job = Node::new(
//!     NodeType::Job,
//!     None,
//!     json!({ "company": "Acme", "position": "Engineer" }),
//!     "owner-1".to_string(),
//! );
//! assert!(job.parent_id.is_none());
//! ```

use std::collections::{BTreeMap, HashMap, HashSet};
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Default version value for serde deserialization (version 1)
fn default_version() -> i64 {
    1
}

/// Closed set of career-history node types.
///
/// The variant order here mirrors the edge-compatibility table in
/// [`NodeType::allowed_children`]; both are fixed and never extended at
/// runtime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum NodeType {
    CareerTransition,
    Job,
    Education,
    Action,
    Event,
    Project,
}

impl NodeType {
    /// Every node type, in table order.
    pub const ALL: [NodeType; 6] = [
        NodeType::CareerTransition,
        NodeType::Job,
        NodeType::Education,
        NodeType::Action,
        NodeType::Event,
        NodeType::Project,
    ];

    pub const fn as_db_value(self) -> &'static str {
        match self {
            NodeType::CareerTransition => "careerTransition",
            NodeType::Job => "job",
            NodeType::Education => "education",
            NodeType::Action => "action",
            NodeType::Event => "event",
            NodeType::Project => "project",
        }
    }

    pub fn from_db_value(value: &str) -> Option<Self> {
        match value {
            "careerTransition" => Some(NodeType::CareerTransition),
            "job" => Some(NodeType::Job),
            "education" => Some(NodeType::Education),
            "action" => Some(NodeType::Action),
            "event" => Some(NodeType::Event),
            "project" => Some(NodeType::Project),
            _ => None,
        }
    }

    /// Fixed edge-compatibility table: the child types this type may contain.
    ///
    /// `Project` is a terminal leaf and never has children.
    pub const fn allowed_children(self) -> &'static [NodeType] {
        match self {
            NodeType::CareerTransition => {
                &[NodeType::Action, NodeType::Event, NodeType::Project]
            }
            NodeType::Job => &[NodeType::Project, NodeType::Event, NodeType::Action],
            NodeType::Education => &[NodeType::Project, NodeType::Event, NodeType::Action],
            NodeType::Action => &[NodeType::Project],
            NodeType::Event => &[NodeType::Project, NodeType::Action],
            NodeType::Project => &[],
        }
    }

    pub fn allows_child(self, child: NodeType) -> bool {
        self.allowed_children().contains(&child)
    }
}

impl fmt::Display for NodeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_db_value())
    }
}

/// One career-history item belonging to exactly one owner.
///
/// # Fields
///
/// - `id`: unique identifier (UUID v4), immutable
/// - `node_type`: one of the closed [`NodeType`] set
/// - `parent_id`: optional reference to another node of the same owner
/// - `owner_id`: the owning user; every operation is scoped by it
/// - `version`: optimistic concurrency counter, bumped on each mutation
/// - `created_at` / `updated_at`: maintained by the store
/// - `meta`: entity-specific fields as an open JSON document, shape
///   constrained per `node_type`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Node {
    /// Unique identifier (UUID v4)
    pub id: String,

    /// Node type from the closed set
    pub node_type: NodeType,

    /// Parent node ID; `None` means this node is a root
    pub parent_id: Option<String>,

    /// Owning user; the sole isolation key
    pub owner_id: String,

    /// Optimistic concurrency control version (incremented on each mutation)
    #[serde(default = "default_version")]
    pub version: i64,

    /// Creation timestamp
    pub created_at: DateTime<Utc>,

    /// Last modification timestamp
    pub updated_at: DateTime<Utc>,

    /// Entity-specific fields (open JSON document)
    pub meta: serde_json::Value,
}

impl Node {
    /// Create a new Node with an auto-generated UUID.
    ///
    /// Timestamps are provisional; the store replaces them with its own
    /// `CURRENT_TIMESTAMP` values on insert.
    pub fn new(
        node_type: NodeType,
        parent_id: Option<String>,
        meta: serde_json::Value,
        owner_id: String,
    ) -> Self {
        let now = Utc::now();

        Self {
            id: Uuid::new_v4().to_string(),
            node_type,
            parent_id,
            owner_id,
            version: 1,
            created_at: now,
            updated_at: now,
            meta,
        }
    }

    pub fn is_root(&self) -> bool {
        self.parent_id.is_none()
    }
}

/// A node with its children nested beneath it, as returned by full-forest
/// assembly.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TreeNode {
    #[serde(flatten)]
    pub node: Node,
    pub children: Vec<TreeNode>,
}

/// Nesting bound for forest assembly; nodes below it are re-promoted to
/// roots so no node is ever dropped.
const MAX_ASSEMBLY_DEPTH: usize = 100;

impl TreeNode {
    /// Assemble a nested forest from a flat, creation-ordered node list.
    ///
    /// Orphan-tolerant: a node whose recorded parent is not in the list is
    /// promoted to a root rather than dropped. Nodes stranded in a cycle
    /// (unreachable from any root) are likewise promoted, so the assembled
    /// forest always contains every input node exactly once and assembly
    /// terminates even over corrupted data.
    pub fn build_forest(nodes: Vec<Node>) -> Vec<TreeNode> {
        let ids: HashSet<String> = nodes.iter().map(|n| n.id.clone()).collect();

        let mut roots: Vec<Node> = Vec::new();
        let mut children_of: HashMap<String, Vec<Node>> = HashMap::new();
        for node in nodes {
            match &node.parent_id {
                Some(parent_id) if ids.contains(parent_id) => {
                    children_of.entry(parent_id.clone()).or_default().push(node);
                }
                // No parent, or a dangling parent reference: promote to root.
                _ => roots.push(node),
            }
        }

        let mut forest: Vec<TreeNode> = roots
            .into_iter()
            .map(|node| Self::attach(node, &mut children_of, 0))
            .collect();

        // Whatever is left was unreachable from every root (cycle members,
        // or children beyond the nesting bound). Re-root the earliest-created
        // leftover and repeat; each pass attaches at least one node, so this
        // terminates.
        while !children_of.is_empty() {
            let mut stranded: Vec<Node> = children_of.drain().flat_map(|(_, v)| v).collect();
            stranded.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
            let mut iter = stranded.into_iter();
            let first = iter.next().expect("stranded set is non-empty");
            for node in iter {
                let key = node.parent_id.clone().unwrap_or_default();
                children_of.entry(key).or_default().push(node);
            }
            forest.push(Self::attach(first, &mut children_of, 0));
        }

        forest
    }

    fn attach(node: Node, children_of: &mut HashMap<String, Vec<Node>>, depth: usize) -> TreeNode {
        let children = if depth < MAX_ASSEMBLY_DEPTH {
            children_of
                .remove(&node.id)
                .unwrap_or_default()
                .into_iter()
                .map(|child| Self::attach(child, children_of, depth + 1))
                .collect()
        } else {
            Vec::new()
        };

        TreeNode { node, children }
    }

    /// Total number of nodes in this subtree, the node itself included.
    pub fn node_count(&self) -> usize {
        1 + self.children.iter().map(TreeNode::node_count).sum::<usize>()
    }
}

/// Diagnostic aggregate over one owner's forest.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HierarchyStats {
    pub total_nodes: usize,
    /// Node counts keyed by the type's DB string
    pub nodes_by_type: BTreeMap<String, usize>,
    pub max_depth: usize,
    pub root_nodes: usize,
}

/// Result of the store's transactional move.
///
/// The store re-validates edge compatibility and acyclicity inside the move
/// transaction; every way that validation can fail is an explicit outcome so
/// the orchestrator maps it onto the error taxonomy without string matching.
#[derive(Debug, Clone, PartialEq)]
pub enum MoveOutcome {
    Moved(Node),
    NodeMissing,
    ParentMissing,
    EdgeIncompatible {
        parent_type: NodeType,
        child_type: NodeType,
    },
    WouldCycle {
        path: Vec<String>,
    },
    Conflict {
        expected: i64,
        actual: i64,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn node(id: &str, parent: Option<&str>) -> Node {
        let mut n = Node::new(
            NodeType::Job,
            parent.map(String::from),
            json!({ "company": "Acme", "position": "Engineer" }),
            "owner-1".to_string(),
        );
        n.id = id.to_string();
        n
    }

    #[test]
    fn db_value_round_trip() {
        for node_type in NodeType::ALL {
            assert_eq!(
                NodeType::from_db_value(node_type.as_db_value()),
                Some(node_type)
            );
        }
        assert_eq!(NodeType::from_db_value("profile"), None);
    }

    #[test]
    fn project_is_terminal() {
        assert!(NodeType::Project.allowed_children().is_empty());
        for node_type in NodeType::ALL {
            assert!(!NodeType::Project.allows_child(node_type));
        }
    }

    #[test]
    fn compatibility_table_matches_fixture() {
        assert!(NodeType::CareerTransition.allows_child(NodeType::Action));
        assert!(NodeType::CareerTransition.allows_child(NodeType::Event));
        assert!(NodeType::CareerTransition.allows_child(NodeType::Project));
        assert!(!NodeType::CareerTransition.allows_child(NodeType::Job));
        assert!(!NodeType::CareerTransition.allows_child(NodeType::Education));

        assert!(NodeType::Action.allows_child(NodeType::Project));
        assert!(!NodeType::Action.allows_child(NodeType::Action));

        assert!(NodeType::Event.allows_child(NodeType::Project));
        assert!(NodeType::Event.allows_child(NodeType::Action));
        assert!(!NodeType::Event.allows_child(NodeType::Event));
    }

    #[test]
    fn node_type_serializes_as_camel_case() {
        let value = serde_json::to_value(NodeType::CareerTransition).unwrap();
        assert_eq!(value, json!("careerTransition"));
        let value = serde_json::to_value(NodeType::Job).unwrap();
        assert_eq!(value, json!("job"));
    }

    #[test]
    fn build_forest_nests_children() {
        let nodes = vec![
            node("root", None),
            node("child-a", Some("root")),
            node("child-b", Some("root")),
            node("grandchild", Some("child-a")),
        ];

        let forest = TreeNode::build_forest(nodes);
        assert_eq!(forest.len(), 1);
        assert_eq!(forest[0].node.id, "root");
        assert_eq!(forest[0].children.len(), 2);
        assert_eq!(forest[0].children[0].children[0].node.id, "grandchild");
        assert_eq!(forest[0].node_count(), 4);
    }

    #[test]
    fn build_forest_promotes_orphans() {
        let nodes = vec![node("root", None), node("orphan", Some("missing-parent"))];

        let forest = TreeNode::build_forest(nodes);
        assert_eq!(forest.len(), 2);
        assert!(forest.iter().any(|t| t.node.id == "orphan"));
    }

    #[test]
    fn build_forest_keeps_every_node_on_cyclic_input() {
        // a -> b -> a plus an ordinary root; cycle members must surface
        // instead of being dropped.
        let nodes = vec![node("root", None), node("a", Some("b")), node("b", Some("a"))];

        let forest = TreeNode::build_forest(nodes);
        let total: usize = forest.iter().map(TreeNode::node_count).sum();
        assert_eq!(total, 3);
    }
}
