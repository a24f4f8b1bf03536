//! TursoStore - NodeStore Implementation for the Turso/libsql Backend
//!
//! A thin wrapper around [`DatabaseService`] that implements the
//! [`NodeStore`] trait: row conversion on the way out, delegation to the
//! extracted `db_*` SQL methods on the way in, zero business logic beyond
//! what the move transaction requires.

use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, NaiveDateTime, Utc};
use libsql::Row;
use serde_json::Value;

use crate::db::database::{DbCreateNodeParams, DbCreateResult, DbMoveResult};
use crate::db::node_store::NodeStore;
use crate::db::DatabaseService;
use crate::models::{HierarchyStats, MoveOutcome, Node, NodeType, TreeNode};

/// NodeStore implementation backed by Turso/libsql
pub struct TursoStore {
    /// Underlying database service (extracted SQL operations)
    db: Arc<DatabaseService>,
}

impl TursoStore {
    pub fn new(db: Arc<DatabaseService>) -> Self {
        Self { db }
    }

    /// Parse timestamp from database - handles both SQLite and RFC3339 formats
    ///
    /// SQLite CURRENT_TIMESTAMP returns: "YYYY-MM-DD HH:MM:SS"
    /// Old data might use RFC3339: "YYYY-MM-DDTHH:MM:SSZ"
    fn parse_timestamp(s: &str) -> Result<DateTime<Utc>> {
        if let Ok(naive) = NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S") {
            return Ok(naive.and_utc());
        }

        if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
            return Ok(dt.with_timezone(&Utc));
        }

        Err(anyhow!(
            "Unable to parse timestamp '{}' as SQLite or RFC3339 format",
            s
        ))
    }

    /// Convert a libsql Row to a Node.
    ///
    /// Expected columns, in order: id, node_type, parent_id, owner_id,
    /// meta (JSON text), version, created_at, updated_at.
    fn row_to_node(row: &Row) -> Result<Node> {
        let id: String = row.get(0).context("Failed to get id")?;
        let type_str: String = row.get(1).context("Failed to get node_type")?;
        let parent_id: Option<String> = row.get(2).context("Failed to get parent_id")?;
        let owner_id: String = row.get(3).context("Failed to get owner_id")?;
        let meta_json: String = row.get(4).context("Failed to get meta")?;
        let version: i64 = row.get(5).context("Failed to get version")?;
        let created_at_str: String = row.get(6).context("Failed to get created_at")?;
        let updated_at_str: String = row.get(7).context("Failed to get updated_at")?;

        let node_type = NodeType::from_db_value(&type_str)
            .ok_or_else(|| anyhow!("Unknown node type '{}' for node {}", type_str, id))?;

        let created_at =
            Self::parse_timestamp(&created_at_str).context("Failed to parse created_at")?;
        let updated_at =
            Self::parse_timestamp(&updated_at_str).context("Failed to parse updated_at")?;

        let meta: Value = serde_json::from_str(&meta_json).context("Failed to parse meta JSON")?;

        Ok(Node {
            id,
            node_type,
            parent_id,
            owner_id,
            version,
            created_at,
            updated_at,
            meta,
        })
    }

    /// Drain a row stream into nodes, preserving query order.
    async fn collect_nodes(mut rows: libsql::Rows) -> Result<Vec<Node>> {
        let mut nodes = Vec::new();
        while let Some(row) = rows.next().await.context("Failed to fetch row")? {
            nodes.push(Self::row_to_node(&row)?);
        }
        Ok(nodes)
    }
}

#[async_trait]
impl NodeStore for TursoStore {
    async fn create_node(&self, node: Node) -> Result<Node> {
        let meta_json = serde_json::to_string(&node.meta).context("Failed to serialize meta")?;

        let params = DbCreateNodeParams {
            id: &node.id,
            node_type: node.node_type.as_db_value(),
            parent_id: node.parent_id.as_deref(),
            owner_id: &node.owner_id,
            meta: &meta_json,
        };

        match self
            .db
            .db_create_node(params)
            .await
            .map_err(|e| anyhow!("Failed to create node: {}", e))?
        {
            DbCreateResult::Created => {}
            DbCreateResult::ParentMissing => {
                return Err(anyhow!(
                    "Parent node {} not found for owner {}",
                    node.parent_id.as_deref().unwrap_or("<none>"),
                    node.owner_id
                ));
            }
        }

        // Fetch back so the caller sees the store-assigned timestamps
        self.get_node(&node.id, &node.owner_id)
            .await?
            .ok_or_else(|| anyhow!("Node not found after creation"))
    }

    async fn get_node(&self, id: &str, owner_id: &str) -> Result<Option<Node>> {
        match self
            .db
            .db_get_node(id, owner_id)
            .await
            .map_err(|e| anyhow!("Failed to get node: {}", e))?
        {
            Some(row) => Ok(Some(Self::row_to_node(&row)?)),
            None => Ok(None),
        }
    }

    async fn update_meta(&self, id: &str, owner_id: &str, meta: Value) -> Result<Option<Node>> {
        let meta_json = serde_json::to_string(&meta).context("Failed to serialize meta")?;

        let rows_affected = self
            .db
            .db_update_meta(id, owner_id, &meta_json)
            .await
            .map_err(|e| anyhow!("Failed to update node meta: {}", e))?;

        if rows_affected == 0 {
            return Ok(None);
        }

        self.get_node(id, owner_id).await
    }

    async fn delete_node(&self, id: &str, owner_id: &str) -> Result<bool> {
        let rows_affected = self
            .db
            .db_delete_node(id, owner_id)
            .await
            .map_err(|e| anyhow!("Failed to delete node: {}", e))?;

        Ok(rows_affected > 0)
    }

    async fn get_children(&self, id: &str, owner_id: &str) -> Result<Vec<Node>> {
        let rows = self
            .db
            .db_get_children(id, owner_id)
            .await
            .map_err(|e| anyhow!("Failed to get children: {}", e))?;

        Self::collect_nodes(rows).await
    }

    async fn get_root_nodes(&self, owner_id: &str) -> Result<Vec<Node>> {
        let rows = self
            .db
            .db_get_root_nodes(owner_id)
            .await
            .map_err(|e| anyhow!("Failed to get root nodes: {}", e))?;

        Self::collect_nodes(rows).await
    }

    async fn get_ancestors(&self, id: &str, owner_id: &str) -> Result<Vec<Node>> {
        let mut rows = self
            .db
            .db_get_ancestors(id, owner_id)
            .await
            .map_err(|e| anyhow!("Failed to get ancestors: {}", e))?;

        // The CTE is depth-bounded, not cycle-aware; stop at the first
        // repeated id so a corrupted chain yields each member once.
        let mut seen = std::collections::HashSet::new();
        let mut nodes = Vec::new();
        while let Some(row) = rows.next().await.context("Failed to fetch row")? {
            let node = Self::row_to_node(&row)?;
            if !seen.insert(node.id.clone()) {
                break;
            }
            nodes.push(node);
        }

        Ok(nodes)
    }

    async fn get_subtree(&self, id: &str, owner_id: &str, max_depth: usize) -> Result<Vec<Node>> {
        let mut rows = self
            .db
            .db_get_subtree(id, owner_id, max_depth)
            .await
            .map_err(|e| anyhow!("Failed to get subtree: {}", e))?;

        let mut seen = std::collections::HashSet::new();
        let mut nodes = Vec::new();
        while let Some(row) = rows.next().await.context("Failed to fetch row")? {
            let node = Self::row_to_node(&row)?;
            if seen.insert(node.id.clone()) {
                nodes.push(node);
            }
        }

        Ok(nodes)
    }

    async fn get_full_tree(&self, owner_id: &str) -> Result<Vec<TreeNode>> {
        let nodes = self.get_all_nodes(owner_id).await?;
        Ok(TreeNode::build_forest(nodes))
    }

    async fn get_all_nodes(&self, owner_id: &str) -> Result<Vec<Node>> {
        let rows = self
            .db
            .db_get_all_nodes(owner_id)
            .await
            .map_err(|e| anyhow!("Failed to get all nodes: {}", e))?;

        Self::collect_nodes(rows).await
    }

    async fn get_nodes_by_type(
        &self,
        node_type: NodeType,
        owner_id: &str,
        parent_id: Option<&str>,
    ) -> Result<Vec<Node>> {
        let rows = self
            .db
            .db_get_nodes_by_type(node_type.as_db_value(), owner_id, parent_id)
            .await
            .map_err(|e| anyhow!("Failed to get nodes by type: {}", e))?;

        Self::collect_nodes(rows).await
    }

    async fn move_node(
        &self,
        id: &str,
        new_parent_id: Option<&str>,
        owner_id: &str,
        expected_version: i64,
    ) -> Result<MoveOutcome> {
        let result = self
            .db
            .db_move_node(id, new_parent_id, owner_id, expected_version)
            .await
            .map_err(|e| anyhow!("Failed to move node: {}", e))?;

        Ok(match result {
            DbMoveResult::Moved => {
                let node = self
                    .get_node(id, owner_id)
                    .await?
                    .ok_or_else(|| anyhow!("Node not found after move"))?;
                MoveOutcome::Moved(node)
            }
            DbMoveResult::NodeMissing => MoveOutcome::NodeMissing,
            DbMoveResult::ParentMissing => MoveOutcome::ParentMissing,
            DbMoveResult::EdgeIncompatible {
                parent_type,
                child_type,
            } => MoveOutcome::EdgeIncompatible {
                parent_type,
                child_type,
            },
            DbMoveResult::WouldCycle { path } => MoveOutcome::WouldCycle { path },
            DbMoveResult::Conflict { expected, actual } => {
                MoveOutcome::Conflict { expected, actual }
            }
        })
    }

    async fn get_hierarchy_stats(&self, owner_id: &str) -> Result<HierarchyStats> {
        let (by_type, max_depth, root_nodes) = self
            .db
            .db_get_hierarchy_stats(owner_id)
            .await
            .map_err(|e| anyhow!("Failed to get hierarchy stats: {}", e))?;

        let mut nodes_by_type = std::collections::BTreeMap::new();
        let mut total_nodes = 0;
        for (node_type, count) in by_type {
            total_nodes += count;
            nodes_by_type.insert(node_type, count);
        }

        Ok(HierarchyStats {
            total_nodes,
            nodes_by_type,
            max_depth,
            root_nodes,
        })
    }

    async fn close(&self) -> Result<()> {
        self.db
            .db_close()
            .await
            .map_err(|e| anyhow!("Failed to close database: {}", e))
    }
}
