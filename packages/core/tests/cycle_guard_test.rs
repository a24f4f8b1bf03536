//! Integration tests for CycleGuard diagnostics
//!
//! Hierarchies corrupted by direct data edits are the analyzer's reason to
//! exist, so these tests reach under the service and mutate rows with raw
//! SQL before asking the guard what it sees.

use std::sync::Arc;

use careercanvas_core::db::{DatabaseService, NodeStore, TursoStore};
use careercanvas_core::models::{Node, NodeType};
use careercanvas_core::services::{
    CycleGuard, CycleSeverity, HierarchyChange, HierarchyService, SuggestionAction,
    SuggestionSeverity,
};
use serde_json::json;
use tempfile::TempDir;

const OWNER: &str = "owner-1";

struct Fixture {
    db: Arc<DatabaseService>,
    store: Arc<TursoStore>,
    guard: CycleGuard,
    _temp: TempDir,
}

async fn create_fixture() -> Fixture {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
    let temp = TempDir::new().unwrap();
    let db = Arc::new(DatabaseService::new(temp.path().join("test.db")).await.unwrap());
    let store = Arc::new(TursoStore::new(db.clone()));
    let guard = CycleGuard::new(store.clone());
    Fixture {
        db,
        store,
        guard,
        _temp: temp,
    }
}

impl Fixture {
    async fn create_root(&self, title: &str) -> Node {
        self.store
            .create_node(Node::new(
                NodeType::CareerTransition,
                None,
                json!({ "title": title }),
                OWNER.to_string(),
            ))
            .await
            .unwrap()
    }

    /// Rewire a parent pointer behind the engine's back.
    async fn force_parent(&self, id: &str, parent_id: Option<&str>) {
        let conn = self.db.connect_with_timeout().await.unwrap();
        conn.execute(
            "UPDATE nodes SET parent_id = ? WHERE id = ?",
            (parent_id, id),
        )
        .await
        .unwrap();
    }
}

#[tokio::test]
async fn test_would_create_cycle_matches_ancestry() {
    let fixture = create_fixture().await;

    let root = fixture.create_root("Root transition").await;
    let child = fixture
        .store
        .create_node(Node::new(
            NodeType::Event,
            Some(root.id.clone()),
            json!({ "title": "Milestone", "date": "2024-01-15" }),
            OWNER.to_string(),
        ))
        .await
        .unwrap();

    // n == p
    assert!(fixture.guard.would_create_cycle(&root.id, &root.id, OWNER).await);
    // n ∈ ancestors(p)
    assert!(fixture.guard.would_create_cycle(&root.id, &child.id, OWNER).await);
    // p ∈ ancestors(n) is fine the other way around
    assert!(!fixture.guard.would_create_cycle(&child.id, &root.id, OWNER).await);

    let unrelated = fixture.create_root("Unrelated").await;
    assert!(!fixture.guard.would_create_cycle(&unrelated.id, &child.id, OWNER).await);
}

#[tokio::test]
async fn test_detect_cycle_reconstructs_the_path() {
    let fixture = create_fixture().await;

    let a = fixture.create_root("A").await;
    let b = fixture
        .store
        .create_node(Node::new(
            NodeType::Event,
            Some(a.id.clone()),
            json!({ "title": "B", "date": "2024-02-01" }),
            OWNER.to_string(),
        ))
        .await
        .unwrap();
    let c = fixture
        .store
        .create_node(Node::new(
            NodeType::Project,
            Some(b.id.clone()),
            json!({ "title": "C" }),
            OWNER.to_string(),
        ))
        .await
        .unwrap();

    let check = fixture.guard.detect_cycle_for_move(&a.id, &c.id, OWNER).await;
    assert!(check.would_create_cycle);
    let path = check.cycle_path.expect("path must be reconstructed");
    assert_eq!(path, vec![a.id.clone(), b.id.clone(), c.id.clone()]);

    let clear = fixture.guard.detect_cycle_for_move(&c.id, &a.id, OWNER).await;
    assert!(!clear.would_create_cycle);
    assert!(clear.cycle_path.is_none());
}

// Scenario E: a hand-inserted 3-node cycle is found as exactly one minor
// finding, with a detach suggestion inside the cycle.
#[tokio::test]
async fn test_injected_three_node_cycle_is_found_and_repairable() {
    let fixture = create_fixture().await;

    let a = fixture.create_root("A").await;
    let b = fixture.create_root("B").await;
    let c = fixture.create_root("C").await;
    let bystander = fixture.create_root("Bystander").await;

    // A -> B -> C -> A via direct data manipulation
    fixture.force_parent(&a.id, Some(&b.id)).await;
    fixture.force_parent(&b.id, Some(&c.id)).await;
    fixture.force_parent(&c.id, Some(&a.id)).await;

    let analysis = fixture.guard.analyze_hierarchy(OWNER).await.unwrap();
    assert!(analysis.has_cycles);
    assert_eq!(analysis.cycles.len(), 1);
    assert_eq!(analysis.cycles[0].severity, CycleSeverity::Minor);

    let mut members = analysis.cycles[0].node_ids.clone();
    members.sort();
    let mut expected = vec![a.id.clone(), b.id.clone(), c.id.clone()];
    expected.sort();
    assert_eq!(members, expected);
    assert!(!members.contains(&bystander.id));

    let suggestions = fixture.guard.recovery_suggestions(OWNER).await.unwrap();
    let detach = suggestions
        .iter()
        .find(|s| s.action == SuggestionAction::DetachFromParent)
        .expect("a detach suggestion must be offered");
    assert_eq!(detach.severity, SuggestionSeverity::Medium);
    assert!(expected.contains(detach.node_id.as_ref().unwrap()));
}

#[tokio::test]
async fn test_orphans_are_reported_with_clear_suggestions() {
    let fixture = create_fixture().await;

    let _root = fixture.create_root("Root").await;
    let lost = fixture.create_root("Lost").await;
    fixture.force_parent(&lost.id, Some("vanished-node")).await;

    let analysis = fixture.guard.analyze_hierarchy(OWNER).await.unwrap();
    assert!(!analysis.has_cycles);
    assert_eq!(analysis.orphaned_nodes, vec![lost.id.clone()]);

    let suggestions = fixture.guard.recovery_suggestions(OWNER).await.unwrap();
    assert_eq!(suggestions.len(), 1);
    assert_eq!(suggestions[0].action, SuggestionAction::ClearParentReference);
    assert_eq!(suggestions[0].node_id.as_deref(), Some(lost.id.as_str()));
}

// Scenario C at integration scale: independent roots analyze clean.
#[tokio::test]
async fn test_flat_forest_analyzes_clean() {
    let fixture = create_fixture().await;

    for i in 0..100 {
        fixture.create_root(&format!("Transition {}", i)).await;
    }

    let analysis = fixture.guard.analyze_hierarchy(OWNER).await.unwrap();
    assert!(!analysis.has_cycles);
    assert!(analysis.cycles.is_empty());
    assert!(analysis.orphaned_nodes.is_empty());
    assert_eq!(analysis.max_depth, 0);
}

#[tokio::test]
async fn test_batch_validation_flags_duplicates_and_cycles() {
    let fixture = create_fixture().await;

    let root = fixture.create_root("Root").await;
    let child = fixture
        .store
        .create_node(Node::new(
            NodeType::Event,
            Some(root.id.clone()),
            json!({ "title": "Child", "date": "2024-03-01" }),
            OWNER.to_string(),
        ))
        .await
        .unwrap();

    let changes = vec![
        HierarchyChange {
            node_id: root.id.clone(),
            new_parent_id: Some(child.id.clone()),
        },
        HierarchyChange {
            node_id: root.id.clone(),
            new_parent_id: None,
        },
    ];

    let result = fixture.guard.validate_hierarchy_change(&changes, OWNER).await;
    assert!(!result.is_valid);
    // one duplicate-id error, one cycle error
    assert_eq!(result.errors.len(), 2);
    assert!(result.warnings.is_empty());
}

#[tokio::test]
async fn test_large_batch_warns_without_invalidating() {
    let fixture = create_fixture().await;

    let changes: Vec<HierarchyChange> = (0..51)
        .map(|i| HierarchyChange {
            node_id: format!("node-{}", i),
            new_parent_id: None,
        })
        .collect();

    let result = fixture.guard.validate_hierarchy_change(&changes, OWNER).await;
    assert!(result.is_valid);
    assert!(result.errors.is_empty());
    assert_eq!(result.warnings.len(), 1);
}

#[tokio::test]
async fn test_validate_hierarchy_report_combines_analysis_and_suggestions() {
    let fixture = create_fixture().await;
    let service = HierarchyService::new(fixture.store.clone());

    let a = fixture.create_root("A").await;
    let b = fixture.create_root("B").await;
    fixture.force_parent(&a.id, Some(&b.id)).await;
    fixture.force_parent(&b.id, Some(&a.id)).await;

    let report = service.validate_hierarchy(OWNER).await.unwrap();
    assert!(report.analysis.has_cycles);
    assert_eq!(report.analysis.cycles.len(), 1);
    assert!(report
        .suggestions
        .iter()
        .any(|s| s.action == SuggestionAction::DetachFromParent));
}
