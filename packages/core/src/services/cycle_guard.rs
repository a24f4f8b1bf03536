//! CycleGuard - Hierarchy Safety Algorithm
//!
//! Stateless checks over data fetched from the store: the single-edge cycle
//! check gating every move, whole-forest analysis for hierarchies corrupted
//! by means other than this engine (direct data edits, partial restores),
//! and repair suggestions derived from the findings.
//!
//! The single-edge check is **fail-closed**: a storage failure during the
//! ancestor walk blocks the operation rather than risking a committed
//! cycle. Diagnostic operations never raise on data anomalies — anomalies
//! are their output.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::db::NodeStore;
use crate::models::Node;
use crate::services::error::HierarchyError;

/// Hard bound on every recursive traversal, independent of the write-time
/// acyclicity invariant. Kept deliberately as a second line of defense
/// against externally-mutated data.
pub const MAX_TRAVERSAL_DEPTH: usize = 100;

/// Forest depth beyond which a flattening suggestion is emitted
pub const DEPTH_SOFT_LIMIT: usize = 10;

/// Cycles with more members than this are classified `Major`
pub const MAJOR_CYCLE_THRESHOLD: usize = 5;

/// Batches larger than this warn (without invalidating)
pub const BATCH_WARN_THRESHOLD: usize = 50;

/// Result of the diagnostic single-edge check.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CycleCheck {
    pub would_create_cycle: bool,
    /// The offending path (node down to the proposed parent), when known
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cycle_path: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

impl CycleCheck {
    fn clear() -> Self {
        Self {
            would_create_cycle: false,
            cycle_path: None,
            reason: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CycleSeverity {
    Minor,
    Major,
}

/// One cycle found by whole-forest analysis.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CycleFinding {
    /// Member node ids, in parent-chain order
    pub node_ids: Vec<String>,
    pub severity: CycleSeverity,
}

/// Whole-forest analysis, independent of any single proposed edit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HierarchyAnalysis {
    pub has_cycles: bool,
    pub cycles: Vec<CycleFinding>,
    /// Nodes whose recorded parent id does not resolve for the owner
    pub orphaned_nodes: Vec<String>,
    pub max_depth: usize,
}

/// One proposed parent reassignment in a batch pre-check.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HierarchyChange {
    pub node_id: String,
    pub new_parent_id: Option<String>,
}

/// Outcome of a batch pre-check: errors invalidate, warnings do not.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchValidation {
    pub is_valid: bool,
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SuggestionSeverity {
    Low,
    Medium,
    High,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum SuggestionAction {
    /// Break a cycle by detaching one member from its parent
    DetachFromParent,
    /// Clear a dangling parent reference
    ClearParentReference,
    /// Advisory only; no automatic fix is offered
    FlattenHierarchy,
}

/// One proposed repair for a detected anomaly.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RecoverySuggestion {
    pub action: SuggestionAction,
    /// The node the action applies to; absent for forest-wide advisories
    #[serde(skip_serializing_if = "Option::is_none")]
    pub node_id: Option<String>,
    pub severity: SuggestionSeverity,
    pub description: String,
}

/// Cycle detection and hierarchy diagnostics over a [`NodeStore`].
#[derive(Clone)]
pub struct CycleGuard {
    store: Arc<dyn NodeStore>,
}

impl CycleGuard {
    pub fn new(store: Arc<dyn NodeStore>) -> Self {
        Self { store }
    }

    /// Would re-parenting `node_id` under `proposed_parent_id` close a
    /// cycle?
    ///
    /// True when the node is its own proposed parent, or appears anywhere
    /// in the proposed parent's ancestor chain. Fail-closed: a storage
    /// failure blocks the operation.
    pub async fn would_create_cycle(
        &self,
        node_id: &str,
        proposed_parent_id: &str,
        owner_id: &str,
    ) -> bool {
        if node_id == proposed_parent_id {
            return true;
        }

        match self.store.get_ancestors(proposed_parent_id, owner_id).await {
            Ok(chain) => chain.iter().any(|ancestor| ancestor.id == node_id),
            Err(e) => {
                tracing::warn!(
                    node_id,
                    proposed_parent_id,
                    error = %e,
                    "ancestor walk failed during cycle check; blocking the move"
                );
                true
            }
        }
    }

    /// Same check, additionally reconstructing the offending path for
    /// diagnostics and logging.
    pub async fn detect_cycle_for_move(
        &self,
        node_id: &str,
        proposed_parent_id: &str,
        owner_id: &str,
    ) -> CycleCheck {
        if node_id == proposed_parent_id {
            return CycleCheck {
                would_create_cycle: true,
                cycle_path: Some(vec![node_id.to_string()]),
                reason: Some("a node cannot be its own parent".to_string()),
            };
        }

        match self.store.get_ancestors(proposed_parent_id, owner_id).await {
            Ok(chain) => {
                let Some(pos) = chain.iter().position(|ancestor| ancestor.id == node_id) else {
                    return CycleCheck::clear();
                };
                // chain runs proposed parent -> root; reversing the slice up
                // to the hit yields node -> ... -> proposed parent.
                let mut path: Vec<String> =
                    chain[..=pos].iter().map(|n| n.id.clone()).collect();
                path.reverse();
                CycleCheck {
                    would_create_cycle: true,
                    cycle_path: Some(path),
                    reason: Some(format!(
                        "{} is an ancestor of {}",
                        node_id, proposed_parent_id
                    )),
                }
            }
            Err(e) => {
                tracing::warn!(
                    node_id,
                    proposed_parent_id,
                    error = %e,
                    "ancestor walk failed during cycle check; blocking the move"
                );
                CycleCheck {
                    would_create_cycle: true,
                    cycle_path: None,
                    reason: Some(format!("cycle check failed ({}); refusing the move", e)),
                }
            }
        }
    }

    /// Whole-forest cycle/orphan/depth analysis for one owner.
    pub async fn analyze_hierarchy(
        &self,
        owner_id: &str,
    ) -> Result<HierarchyAnalysis, HierarchyError> {
        let nodes = self
            .store
            .get_all_nodes(owner_id)
            .await
            .map_err(|e| HierarchyError::query_failed(e.to_string()))?;

        Ok(Self::analyze_nodes(&nodes))
    }

    /// Pure analysis over a flat node list.
    ///
    /// Depth-first walk of the parent-pointer graph with an explicit
    /// recursion stack: any node re-encountered while still on the active
    /// stack closes a cycle, and its stack suffix becomes one finding.
    pub fn analyze_nodes(nodes: &[Node]) -> HierarchyAnalysis {
        let parent_of: HashMap<&str, Option<&str>> = nodes
            .iter()
            .map(|n| (n.id.as_str(), n.parent_id.as_deref()))
            .collect();

        const UNVISITED: u8 = 0;
        const ACTIVE: u8 = 1;
        const DONE: u8 = 2;

        let mut state: HashMap<&str, u8> = HashMap::with_capacity(nodes.len());
        let mut cycles: Vec<CycleFinding> = Vec::new();

        for node in nodes {
            if state.get(node.id.as_str()).copied().unwrap_or(UNVISITED) != UNVISITED {
                continue;
            }

            let mut stack: Vec<&str> = Vec::new();
            let mut current = Some(node.id.as_str());
            while let Some(id) = current {
                match state.get(id).copied().unwrap_or(UNVISITED) {
                    DONE => break,
                    ACTIVE => {
                        // Everything from the first occurrence onward is on
                        // the active stack, so it is the cycle itself.
                        let pos = stack
                            .iter()
                            .position(|&stacked| stacked == id)
                            .expect("active node must be on the current stack");
                        let node_ids: Vec<String> =
                            stack[pos..].iter().map(|s| s.to_string()).collect();
                        let severity = if node_ids.len() > MAJOR_CYCLE_THRESHOLD {
                            CycleSeverity::Major
                        } else {
                            CycleSeverity::Minor
                        };
                        cycles.push(CycleFinding { node_ids, severity });
                        break;
                    }
                    _ => {
                        state.insert(id, ACTIVE);
                        stack.push(id);
                        // A dangling parent ends the chain here; the orphan
                        // listing below reports it.
                        current = parent_of
                            .get(id)
                            .copied()
                            .flatten()
                            .filter(|parent| parent_of.contains_key(parent));
                    }
                }
            }
            for id in stack {
                state.insert(id, DONE);
            }
        }

        let orphaned_nodes: Vec<String> = nodes
            .iter()
            .filter(|n| {
                n.parent_id
                    .as_deref()
                    .is_some_and(|parent| !parent_of.contains_key(parent))
            })
            .map(|n| n.id.clone())
            .collect();

        let max_depth = Self::max_depth(nodes);

        HierarchyAnalysis {
            has_cycles: !cycles.is_empty(),
            cycles,
            orphaned_nodes,
            max_depth,
        }
    }

    /// Deepest leaf level reached from any root (a lone root has depth 0).
    fn max_depth(nodes: &[Node]) -> usize {
        let mut children_of: HashMap<&str, Vec<&str>> = HashMap::new();
        for node in nodes {
            if let Some(parent) = node.parent_id.as_deref() {
                children_of.entry(parent).or_default().push(node.id.as_str());
            }
        }

        let mut max_depth = 0;
        let mut visited: HashSet<&str> = HashSet::new();
        for root in nodes.iter().filter(|n| n.parent_id.is_none()) {
            let mut stack: Vec<(&str, usize)> = vec![(root.id.as_str(), 0)];
            while let Some((id, depth)) = stack.pop() {
                if !visited.insert(id) || depth >= MAX_TRAVERSAL_DEPTH {
                    continue;
                }
                max_depth = max_depth.max(depth);
                if let Some(children) = children_of.get(id) {
                    for child in children {
                        stack.push((child, depth + 1));
                    }
                }
            }
        }

        max_depth
    }

    /// Batch pre-check for a proposed set of parent reassignments.
    ///
    /// Runs the single-edge check per change; duplicate node ids in the
    /// batch are invalid, oversized batches warn without invalidating.
    pub async fn validate_hierarchy_change(
        &self,
        changes: &[HierarchyChange],
        owner_id: &str,
    ) -> BatchValidation {
        let mut errors = Vec::new();
        let mut warnings = Vec::new();

        if changes.len() > BATCH_WARN_THRESHOLD {
            warnings.push(format!(
                "batch of {} changes is large; consider splitting it",
                changes.len()
            ));
        }

        let mut seen: HashSet<&str> = HashSet::new();
        for change in changes {
            if !seen.insert(change.node_id.as_str()) {
                errors.push(format!(
                    "node {} appears more than once in the batch",
                    change.node_id
                ));
            }
        }

        for change in changes {
            let Some(new_parent_id) = change.new_parent_id.as_deref() else {
                // Detaching to root is always structurally safe
                continue;
            };
            let check = self
                .detect_cycle_for_move(&change.node_id, new_parent_id, owner_id)
                .await;
            if check.would_create_cycle {
                let detail = check
                    .cycle_path
                    .map(|path| path.join(" -> "))
                    .or(check.reason)
                    .unwrap_or_else(|| "cycle detected".to_string());
                errors.push(format!(
                    "moving {} under {} would create a cycle: {}",
                    change.node_id, new_parent_id, detail
                ));
            }
        }

        BatchValidation {
            is_valid: errors.is_empty(),
            errors,
            warnings,
        }
    }

    /// Repair suggestions for everything the analyzer found.
    pub async fn recovery_suggestions(
        &self,
        owner_id: &str,
    ) -> Result<Vec<RecoverySuggestion>, HierarchyError> {
        let analysis = self.analyze_hierarchy(owner_id).await?;
        Ok(Self::suggestions_for(&analysis))
    }

    /// Derive suggestions from an analysis result.
    pub fn suggestions_for(analysis: &HierarchyAnalysis) -> Vec<RecoverySuggestion> {
        let mut suggestions = Vec::new();

        for cycle in &analysis.cycles {
            let Some(last) = cycle.node_ids.last() else {
                continue;
            };
            let severity = match cycle.severity {
                CycleSeverity::Major => SuggestionSeverity::High,
                CycleSeverity::Minor => SuggestionSeverity::Medium,
            };
            suggestions.push(RecoverySuggestion {
                action: SuggestionAction::DetachFromParent,
                node_id: Some(last.clone()),
                severity,
                description: format!(
                    "Detach node {} from its parent to break a {}-node cycle",
                    last,
                    cycle.node_ids.len()
                ),
            });
        }

        for orphan in &analysis.orphaned_nodes {
            suggestions.push(RecoverySuggestion {
                action: SuggestionAction::ClearParentReference,
                node_id: Some(orphan.clone()),
                severity: SuggestionSeverity::Medium,
                description: format!(
                    "Clear the dangling parent reference on node {} to promote it to a root",
                    orphan
                ),
            });
        }

        if analysis.max_depth > DEPTH_SOFT_LIMIT {
            suggestions.push(RecoverySuggestion {
                action: SuggestionAction::FlattenHierarchy,
                node_id: None,
                severity: SuggestionSeverity::Low,
                description: format!(
                    "Hierarchy depth {} exceeds the recommended {}; consider flattening",
                    analysis.max_depth, DEPTH_SOFT_LIMIT
                ),
            });
        }

        suggestions
    }
}
