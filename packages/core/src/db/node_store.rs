//! NodeStore Trait - Database Abstraction Layer
//!
//! The `NodeStore` trait abstracts persistence for career-history nodes so
//! business logic in the services layer never touches SQL directly. The
//! seam also keeps alternative backends possible without changing the
//! orchestrator.
//!
//! # Design Decisions
//!
//! 1. **Async-first**: every method is async; implementations may hit disk
//!    or the network
//! 2. **Owner scoping**: every method takes `owner_id` and must never
//!    return or touch another owner's rows — the trait is the isolation
//!    boundary
//! 3. **Error handling**: `anyhow::Result` at this boundary; the service
//!    layer maps failures into its own taxonomy
//! 4. **No business rules**: edge-type compatibility and metadata shape are
//!    the caller's job, with one deliberate exception — `move_node`
//!    re-validates inside its transaction, because that is the only place
//!    the check-and-write can be made atomic
//!
//! # Examples
//!
//! ```rust,no_run
//! use careercanvas_core::db::{DatabaseService, NodeStore, TursoStore};
//! use careercanvas_core::models::{Node, NodeType};
//! use serde_json::json;
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let db = Arc::new(DatabaseService::new_in_memory().await?);
//!     let store: Arc<dyn NodeStore> = Arc::new(TursoStore::new(db));
//!
//!     let node = Node::new(
//!         NodeType::Job,
//!         None,
//!         json!({ "company": "Acme", "position": "Engineer" }),
//!         "owner-1".to_string(),
//!     );
//!     let created = store.create_node(node).await?;
//!     println!("Created node: {}", created.id);
//!     Ok(())
//! }
//! ```

use anyhow::Result;
use async_trait::async_trait;
use serde_json::Value;

use crate::models::{HierarchyStats, MoveOutcome, Node, NodeType, TreeNode};

/// Abstraction layer for owner-scoped node persistence
///
/// Implementations must be `Send + Sync` so the trait object can be shared
/// across async tasks.
#[async_trait]
pub trait NodeStore: Send + Sync {
    //
    // CORE CRUD OPERATIONS
    //

    /// Create a new node.
    ///
    /// Fails when `node.parent_id` is set but does not resolve for
    /// `node.owner_id`. Edge-type compatibility is validated by the caller
    /// before this call.
    ///
    /// Takes ownership of the node; the returned node carries the
    /// store-assigned timestamps.
    async fn create_node(&self, node: Node) -> Result<Node>;

    /// Get a node by ID, strictly owner-scoped.
    ///
    /// Returns `Ok(None)` when the node does not exist *or* belongs to a
    /// different owner — callers cannot distinguish the two, by design.
    async fn get_node(&self, id: &str, owner_id: &str) -> Result<Option<Node>>;

    /// Replace a node's metadata document.
    ///
    /// The caller validates the document against the node's type first.
    /// Bumps `version` and `updated_at`. Returns `Ok(None)` when the node is
    /// absent for this owner.
    async fn update_meta(&self, id: &str, owner_id: &str, meta: Value) -> Result<Option<Node>>;

    /// Delete a node, detaching (not deleting) its direct children.
    ///
    /// Children get `parent_id` cleared in the same transaction, so no
    /// child is ever left dangling or silently removed. Returns whether a
    /// node was actually deleted.
    async fn delete_node(&self, id: &str, owner_id: &str) -> Result<bool>;

    //
    // TRAVERSAL
    //

    /// Direct children of a node, ordered by creation time.
    async fn get_children(&self, id: &str, owner_id: &str) -> Result<Vec<Node>>;

    /// Nodes with no parent, ordered by creation time.
    async fn get_root_nodes(&self, owner_id: &str) -> Result<Vec<Node>>;

    /// Chain from the node itself up through every ancestor to its root.
    ///
    /// Must terminate even over malformed data: the walk is bounded by a
    /// maximum traversal depth and deduplicated, as a safety net rather
    /// than a substitute for the write-time acyclicity invariant.
    async fn get_ancestors(&self, id: &str, owner_id: &str) -> Result<Vec<Node>>;

    /// The node plus all descendants down to `max_depth` levels.
    async fn get_subtree(&self, id: &str, owner_id: &str, max_depth: usize) -> Result<Vec<Node>>;

    /// The owner's whole forest with children nested under each node.
    ///
    /// Orphan-tolerant: a node whose recorded parent does not exist among
    /// the owner's nodes is promoted to a root rather than dropped.
    async fn get_full_tree(&self, owner_id: &str) -> Result<Vec<TreeNode>>;

    /// Every node belonging to the owner as a flat list, creation order.
    ///
    /// Feeds whole-forest diagnostics; one scan instead of N traversals.
    async fn get_all_nodes(&self, owner_id: &str) -> Result<Vec<Node>>;

    /// Nodes of one type, optionally restricted to direct children of
    /// `parent_id`.
    async fn get_nodes_by_type(
        &self,
        node_type: NodeType,
        owner_id: &str,
        parent_id: Option<&str>,
    ) -> Result<Vec<Node>>;

    //
    // HIERARCHY MUTATION
    //

    /// Reassign a node's parent (`None` = make it a root).
    ///
    /// Runs as one transaction that re-validates edge-type compatibility
    /// and acyclicity against the locked snapshot and persists with a
    /// `version` compare-and-swap keyed on `expected_version`. Rejections
    /// leave state unchanged and are reported as [`MoveOutcome`] variants,
    /// not errors.
    async fn move_node(
        &self,
        id: &str,
        new_parent_id: Option<&str>,
        owner_id: &str,
        expected_version: i64,
    ) -> Result<MoveOutcome>;

    //
    // DIAGNOSTICS & LIFECYCLE
    //

    /// Aggregate counts and maximum depth for one owner's forest.
    async fn get_hierarchy_stats(&self, owner_id: &str) -> Result<HierarchyStats>;

    /// Flush pending writes and release resources.
    async fn close(&self) -> Result<()>;
}
