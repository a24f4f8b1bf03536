//! HierarchyService - Operation Orchestration
//!
//! The only entry point external callers use. Thin composition over the
//! type rules, the cycle guard, and the node store: every mutating
//! operation validates fully (metadata, then edge rules, then
//! cycle-freedom) before issuing any write, so no operation ever performs a
//! partial mutation that must be rolled back.
//!
//! Lifecycle per node: Created → {Updated, Moved}* → Deleted, where every
//! Moved transition is gated by the cycle and edge-type checks.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::db::NodeStore;
use crate::models::{HierarchyStats, MoveOutcome, Node, NodeType, TreeNode};
use crate::services::cycle_guard::{CycleGuard, HierarchyAnalysis, RecoverySuggestion};
use crate::services::error::{FieldViolation, HierarchyError};
use crate::services::type_rules;

/// Payload for node creation.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewNode {
    pub node_type: NodeType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<String>,
    #[serde(default = "default_meta")]
    pub meta: Value,
}

fn default_meta() -> Value {
    Value::Object(serde_json::Map::new())
}

/// Whole-forest diagnostics with the derived repair suggestions, as one
/// payload.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HierarchyReport {
    pub analysis: HierarchyAnalysis,
    pub suggestions: Vec<RecoverySuggestion>,
}

/// Orchestrates hierarchy mutations and queries with one error taxonomy.
#[derive(Clone)]
pub struct HierarchyService {
    store: Arc<dyn NodeStore>,
    cycle_guard: CycleGuard,
}

impl HierarchyService {
    pub fn new(store: Arc<dyn NodeStore>) -> Self {
        let cycle_guard = CycleGuard::new(store.clone());
        Self { store, cycle_guard }
    }

    /// Direct access for diagnostic callers that bypass the orchestrator.
    pub fn cycle_guard(&self) -> &CycleGuard {
        &self.cycle_guard
    }

    /// Create a node, optionally under a parent.
    ///
    /// Validation order: metadata shape → parent resolution → edge-type
    /// compatibility → persist. Acyclicity cannot be violated by a create
    /// (the new node has no children yet).
    pub async fn create_node(
        &self,
        owner_id: &str,
        new_node: NewNode,
    ) -> Result<Node, HierarchyError> {
        type_rules::validate_meta(new_node.node_type, &new_node.meta)
            .map_err(HierarchyError::ValidationFailed)?;

        if let Some(parent_id) = new_node.parent_id.as_deref() {
            let parent = self
                .store
                .get_node(parent_id, owner_id)
                .await
                .map_err(|e| HierarchyError::query_failed(e.to_string()))?
                .ok_or_else(|| HierarchyError::parent_not_found(parent_id))?;

            type_rules::validate_edge(parent.node_type, new_node.node_type)?;
        }

        let node = Node::new(
            new_node.node_type,
            new_node.parent_id,
            new_node.meta,
            owner_id.to_string(),
        );

        let created = self
            .store
            .create_node(node)
            .await
            .map_err(|e| HierarchyError::query_failed(e.to_string()))?;

        tracing::debug!(
            node_id = %created.id,
            node_type = %created.node_type,
            owner_id,
            "created node"
        );

        Ok(created)
    }

    /// Update a node's metadata.
    ///
    /// The patch is shallow-merged over the existing document (`null`
    /// removes a key) and the merged result is re-validated against the
    /// node's own type before persisting.
    pub async fn update_node(
        &self,
        id: &str,
        meta_patch: Value,
        owner_id: &str,
    ) -> Result<Node, HierarchyError> {
        if !meta_patch.is_object() {
            return Err(HierarchyError::ValidationFailed(vec![FieldViolation::new(
                "meta",
                "metadata patch must be a JSON object",
            )]));
        }

        let existing = self
            .store
            .get_node(id, owner_id)
            .await
            .map_err(|e| HierarchyError::query_failed(e.to_string()))?
            .ok_or_else(|| HierarchyError::not_found(id))?;

        let merged = Self::merge_meta(&existing.meta, &meta_patch);
        type_rules::validate_meta(existing.node_type, &merged)
            .map_err(HierarchyError::ValidationFailed)?;

        self.store
            .update_meta(id, owner_id, merged)
            .await
            .map_err(|e| HierarchyError::query_failed(e.to_string()))?
            .ok_or_else(|| HierarchyError::not_found(id))
    }

    /// Reassign a node's parent; `None` makes it a root (always allowed).
    ///
    /// Pre-checks run against a read snapshot for early, descriptive
    /// rejections; the store's move transaction re-validates under its
    /// write lock, so a racing writer surfaces as `VersionConflict` rather
    /// than a corrupted hierarchy.
    pub async fn move_node(
        &self,
        id: &str,
        new_parent_id: Option<&str>,
        owner_id: &str,
    ) -> Result<Node, HierarchyError> {
        let node = self
            .store
            .get_node(id, owner_id)
            .await
            .map_err(|e| HierarchyError::query_failed(e.to_string()))?
            .ok_or_else(|| HierarchyError::not_found(id))?;

        if let Some(parent_id) = new_parent_id {
            let parent = self
                .store
                .get_node(parent_id, owner_id)
                .await
                .map_err(|e| HierarchyError::query_failed(e.to_string()))?
                .ok_or_else(|| HierarchyError::not_found(parent_id))?;

            let check = self
                .cycle_guard
                .detect_cycle_for_move(id, parent_id, owner_id)
                .await;
            if check.would_create_cycle {
                return Err(HierarchyError::cycle_violation(
                    check.cycle_path.unwrap_or_else(|| vec![id.to_string()]),
                ));
            }

            type_rules::validate_edge(parent.node_type, node.node_type)?;
        }

        let outcome = self
            .store
            .move_node(id, new_parent_id, owner_id, node.version)
            .await
            .map_err(|e| HierarchyError::query_failed(e.to_string()))?;

        match outcome {
            MoveOutcome::Moved(moved) => {
                tracing::debug!(
                    node_id = %moved.id,
                    new_parent_id = new_parent_id.unwrap_or("<root>"),
                    owner_id,
                    "moved node"
                );
                Ok(moved)
            }
            MoveOutcome::NodeMissing => Err(HierarchyError::not_found(id)),
            MoveOutcome::ParentMissing => {
                Err(HierarchyError::not_found(new_parent_id.unwrap_or(id)))
            }
            MoveOutcome::EdgeIncompatible {
                parent_type,
                child_type,
            } => Err(HierarchyError::rule_violation(parent_type, child_type)),
            MoveOutcome::WouldCycle { path } => Err(HierarchyError::cycle_violation(path)),
            MoveOutcome::Conflict { expected, actual } => {
                Err(HierarchyError::version_conflict(id, expected, actual))
            }
        }
    }

    /// Delete a node; its direct children are detached, never deleted.
    pub async fn delete_node(&self, id: &str, owner_id: &str) -> Result<bool, HierarchyError> {
        let deleted = self
            .store
            .delete_node(id, owner_id)
            .await
            .map_err(|e| HierarchyError::query_failed(e.to_string()))?;

        if deleted {
            tracing::debug!(node_id = id, owner_id, "deleted node, children detached");
        }

        Ok(deleted)
    }

    pub async fn get_node(&self, id: &str, owner_id: &str) -> Result<Option<Node>, HierarchyError> {
        self.store
            .get_node(id, owner_id)
            .await
            .map_err(|e| HierarchyError::query_failed(e.to_string()))
    }

    /// List nodes, optionally filtered by type and/or direct parent.
    pub async fn list_nodes(
        &self,
        owner_id: &str,
        node_type: Option<NodeType>,
        parent_id: Option<&str>,
    ) -> Result<Vec<Node>, HierarchyError> {
        let result = match (node_type, parent_id) {
            (Some(node_type), parent_id) => {
                self.store
                    .get_nodes_by_type(node_type, owner_id, parent_id)
                    .await
            }
            (None, Some(parent_id)) => self.store.get_children(parent_id, owner_id).await,
            (None, None) => self.store.get_all_nodes(owner_id).await,
        };

        result.map_err(|e| HierarchyError::query_failed(e.to_string()))
    }

    pub async fn get_children(
        &self,
        id: &str,
        owner_id: &str,
    ) -> Result<Vec<Node>, HierarchyError> {
        self.store
            .get_children(id, owner_id)
            .await
            .map_err(|e| HierarchyError::query_failed(e.to_string()))
    }

    pub async fn get_ancestors(
        &self,
        id: &str,
        owner_id: &str,
    ) -> Result<Vec<Node>, HierarchyError> {
        self.store
            .get_ancestors(id, owner_id)
            .await
            .map_err(|e| HierarchyError::query_failed(e.to_string()))
    }

    pub async fn get_subtree(
        &self,
        id: &str,
        owner_id: &str,
        max_depth: usize,
    ) -> Result<Vec<Node>, HierarchyError> {
        self.store
            .get_subtree(id, owner_id, max_depth)
            .await
            .map_err(|e| HierarchyError::query_failed(e.to_string()))
    }

    pub async fn get_full_tree(&self, owner_id: &str) -> Result<Vec<TreeNode>, HierarchyError> {
        self.store
            .get_full_tree(owner_id)
            .await
            .map_err(|e| HierarchyError::query_failed(e.to_string()))
    }

    pub async fn get_root_nodes(&self, owner_id: &str) -> Result<Vec<Node>, HierarchyError> {
        self.store
            .get_root_nodes(owner_id)
            .await
            .map_err(|e| HierarchyError::query_failed(e.to_string()))
    }

    pub async fn get_stats(&self, owner_id: &str) -> Result<HierarchyStats, HierarchyError> {
        self.store
            .get_hierarchy_stats(owner_id)
            .await
            .map_err(|e| HierarchyError::query_failed(e.to_string()))
    }

    /// Whole-forest diagnostics plus repair suggestions.
    ///
    /// Never raises on data anomalies — those are the findings.
    pub async fn validate_hierarchy(
        &self,
        owner_id: &str,
    ) -> Result<HierarchyReport, HierarchyError> {
        let analysis = self.cycle_guard.analyze_hierarchy(owner_id).await?;
        if analysis.has_cycles {
            tracing::warn!(
                owner_id,
                cycles = analysis.cycles.len(),
                orphans = analysis.orphaned_nodes.len(),
                "hierarchy analysis found structural anomalies"
            );
        }
        let suggestions = CycleGuard::suggestions_for(&analysis);

        Ok(HierarchyReport {
            analysis,
            suggestions,
        })
    }

    /// The child types allowed under a parent of `parent_type`.
    pub fn allowed_children(parent_type: NodeType) -> &'static [NodeType] {
        type_rules::allowed_children(parent_type)
    }

    /// Metadata shape description for one node type.
    pub fn meta_schema(node_type: NodeType) -> Value {
        type_rules::meta_schema(node_type)
    }

    /// Shallow merge of a patch over an existing metadata document.
    ///
    /// Patch keys overwrite, `null` removes the key, untouched keys
    /// survive.
    fn merge_meta(existing: &Value, patch: &Value) -> Value {
        let mut merged = existing
            .as_object()
            .cloned()
            .unwrap_or_else(serde_json::Map::new);

        if let Some(patch) = patch.as_object() {
            for (key, value) in patch {
                if value.is_null() {
                    merged.remove(key);
                } else {
                    merged.insert(key.clone(), value.clone());
                }
            }
        }

        Value::Object(merged)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn merge_overwrites_removes_and_preserves() {
        let existing = json!({
            "company": "Acme",
            "position": "Engineer",
            "location": "Berlin"
        });
        let patch = json!({
            "position": "Staff Engineer",
            "location": null,
            "startDate": "2022-01-10"
        });

        let merged = HierarchyService::merge_meta(&existing, &patch);
        assert_eq!(merged["company"], "Acme");
        assert_eq!(merged["position"], "Staff Engineer");
        assert_eq!(merged["startDate"], "2022-01-10");
        assert!(merged.get("location").is_none());
    }

    #[test]
    fn empty_patch_is_identity() {
        let existing = json!({ "title": "Launch" });
        let merged = HierarchyService::merge_meta(&existing, &json!({}));
        assert_eq!(merged, existing);
    }
}
