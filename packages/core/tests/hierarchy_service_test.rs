//! Integration tests for HierarchyService
//!
//! Exercises the orchestrator end-to-end against a real temp database:
//! creation with edge-rule enforcement, metadata patching, cycle-gated
//! moves, detach-on-delete, and strict owner isolation.

use std::sync::Arc;

use careercanvas_core::db::{DatabaseService, TursoStore};
use careercanvas_core::models::NodeType;
use careercanvas_core::services::{HierarchyError, HierarchyService, NewNode};
use serde_json::{json, Value};
use tempfile::TempDir;

const OWNER: &str = "owner-1";

async fn create_test_service() -> (HierarchyService, Arc<DatabaseService>, TempDir) {
    let temp_dir = TempDir::new().unwrap();
    let db_path = temp_dir.path().join("test.db");
    let db = Arc::new(DatabaseService::new(db_path).await.unwrap());
    let store = Arc::new(TursoStore::new(db.clone()));
    (HierarchyService::new(store), db, temp_dir)
}

fn new_node(node_type: NodeType, parent_id: Option<&str>, meta: Value) -> NewNode {
    NewNode {
        node_type,
        parent_id: parent_id.map(String::from),
        meta,
    }
}

fn transition_meta() -> Value {
    json!({ "title": "Pivot into infrastructure" })
}

fn event_meta() -> Value {
    json!({ "title": "Conference talk", "date": "2024-09-12" })
}

fn project_meta() -> Value {
    json!({ "title": "Storage engine rewrite" })
}

#[tokio::test]
async fn test_create_round_trip_preserves_meta() {
    let (service, _db, _temp) = create_test_service().await;

    let meta = json!({
        "company": "Acme",
        "position": "Engineer",
        "startDate": "2021-03-01",
        "endDate": "present",
        "notes": "open field survives"
    });

    let created = service
        .create_node(OWNER, new_node(NodeType::Job, None, meta.clone()))
        .await
        .unwrap();

    let fetched = service
        .get_node(&created.id, OWNER)
        .await
        .unwrap()
        .expect("node must exist");

    assert_eq!(fetched.node_type, NodeType::Job);
    assert_eq!(fetched.meta, meta);
    assert!(fetched.parent_id.is_none());
}

#[tokio::test]
async fn test_create_with_missing_parent_is_parent_not_found() {
    let (service, _db, _temp) = create_test_service().await;

    let err = service
        .create_node(
            OWNER,
            new_node(NodeType::Project, Some("no-such-parent"), project_meta()),
        )
        .await
        .unwrap_err();

    assert!(matches!(err, HierarchyError::ParentNotFound { parent_id } if parent_id == "no-such-parent"));
}

#[tokio::test]
async fn test_create_with_other_owners_parent_is_parent_not_found() {
    let (service, _db, _temp) = create_test_service().await;

    let foreign = service
        .create_node("owner-2", new_node(NodeType::Job, None, json!({
            "company": "Acme", "position": "Engineer"
        })))
        .await
        .unwrap();

    let err = service
        .create_node(
            OWNER,
            new_node(NodeType::Project, Some(&foreign.id), project_meta()),
        )
        .await
        .unwrap_err();

    assert!(matches!(err, HierarchyError::ParentNotFound { .. }));
}

#[tokio::test]
async fn test_create_rejects_invalid_meta_with_all_violations() {
    let (service, _db, _temp) = create_test_service().await;

    let err = service
        .create_node(
            OWNER,
            new_node(NodeType::Job, None, json!({ "startDate": "not-a-date" })),
        )
        .await
        .unwrap_err();

    let HierarchyError::ValidationFailed(violations) = err else {
        panic!("expected validation failure");
    };
    let fields: Vec<&str> = violations.iter().map(|v| v.field.as_str()).collect();
    assert!(fields.contains(&"company"));
    assert!(fields.contains(&"position"));
    assert!(fields.contains(&"startDate"));
}

// Scenario B: project is a terminal leaf.
#[tokio::test]
async fn test_action_under_project_violates_edge_rules() {
    let (service, _db, _temp) = create_test_service().await;

    let project = service
        .create_node(OWNER, new_node(NodeType::Project, None, project_meta()))
        .await
        .unwrap();

    let err = service
        .create_node(
            OWNER,
            new_node(
                NodeType::Action,
                Some(&project.id),
                json!({ "title": "Impossible child" }),
            ),
        )
        .await
        .unwrap_err();

    let HierarchyError::RuleViolation {
        parent_type,
        child_type,
        allowed,
    } = err
    else {
        panic!("expected rule violation");
    };
    assert_eq!(parent_type, NodeType::Project);
    assert_eq!(child_type, NodeType::Action);
    assert!(allowed.is_empty());
}

// Scenario A (types adjusted to the compatibility table): moving a root
// under its own grandchild must fail with the offending path.
#[tokio::test]
async fn test_move_under_own_descendant_is_a_cycle_violation() {
    let (service, _db, _temp) = create_test_service().await;

    let ct1 = service
        .create_node(OWNER, new_node(NodeType::CareerTransition, None, transition_meta()))
        .await
        .unwrap();
    let e1 = service
        .create_node(OWNER, new_node(NodeType::Event, Some(&ct1.id), event_meta()))
        .await
        .unwrap();
    let p1 = service
        .create_node(OWNER, new_node(NodeType::Project, Some(&e1.id), project_meta()))
        .await
        .unwrap();

    let err = service.move_node(&ct1.id, Some(&p1.id), OWNER).await.unwrap_err();

    let HierarchyError::CycleViolation { path } = err else {
        panic!("expected cycle violation");
    };
    assert!(path.contains(&ct1.id));
    assert!(path.contains(&p1.id));

    // Fully rejected: no partial state change
    let unchanged = service.get_node(&ct1.id, OWNER).await.unwrap().unwrap();
    assert!(unchanged.parent_id.is_none());
}

#[tokio::test]
async fn test_move_onto_itself_is_a_cycle_violation() {
    let (service, _db, _temp) = create_test_service().await;

    let node = service
        .create_node(OWNER, new_node(NodeType::Project, None, project_meta()))
        .await
        .unwrap();

    let err = service.move_node(&node.id, Some(&node.id), OWNER).await.unwrap_err();
    assert!(matches!(err, HierarchyError::CycleViolation { .. }));
}

#[tokio::test]
async fn test_move_to_incompatible_parent_is_a_rule_violation() {
    let (service, _db, _temp) = create_test_service().await;

    let action = service
        .create_node(OWNER, new_node(NodeType::Action, None, json!({ "title": "Write docs" })))
        .await
        .unwrap();
    let event = service
        .create_node(OWNER, new_node(NodeType::Event, None, event_meta()))
        .await
        .unwrap();

    // event may contain an action...
    service.move_node(&action.id, Some(&event.id), OWNER).await.unwrap();

    // ...but an action may only contain projects
    let other_action = service
        .create_node(OWNER, new_node(NodeType::Action, None, json!({ "title": "Review PRs" })))
        .await
        .unwrap();
    let err = service
        .move_node(&event.id, Some(&other_action.id), OWNER)
        .await
        .unwrap_err();
    assert!(matches!(err, HierarchyError::RuleViolation { .. }));
}

#[tokio::test]
async fn test_move_to_root_is_always_allowed() {
    let (service, _db, _temp) = create_test_service().await;

    let job = service
        .create_node(OWNER, new_node(NodeType::Job, None, json!({
            "company": "Acme", "position": "Engineer"
        })))
        .await
        .unwrap();
    let project = service
        .create_node(OWNER, new_node(NodeType::Project, Some(&job.id), project_meta()))
        .await
        .unwrap();

    let moved = service.move_node(&project.id, None, OWNER).await.unwrap();
    assert!(moved.parent_id.is_none());
}

#[tokio::test]
async fn test_move_missing_node_is_not_found() {
    let (service, _db, _temp) = create_test_service().await;

    let err = service.move_node("ghost", None, OWNER).await.unwrap_err();
    assert!(matches!(err, HierarchyError::NotFound { id } if id == "ghost"));
}

#[tokio::test]
async fn test_update_patches_and_removes_keys() {
    let (service, _db, _temp) = create_test_service().await;

    let job = service
        .create_node(OWNER, new_node(NodeType::Job, None, json!({
            "company": "Acme",
            "position": "Engineer",
            "location": "Berlin"
        })))
        .await
        .unwrap();

    let updated = service
        .update_node(
            &job.id,
            json!({ "position": "Staff Engineer", "location": null }),
            OWNER,
        )
        .await
        .unwrap();

    assert_eq!(updated.meta["company"], "Acme");
    assert_eq!(updated.meta["position"], "Staff Engineer");
    assert!(updated.meta.get("location").is_none());
    assert_eq!(updated.version, job.version + 1);
}

#[tokio::test]
async fn test_update_revalidates_merged_meta() {
    let (service, _db, _temp) = create_test_service().await;

    let job = service
        .create_node(OWNER, new_node(NodeType::Job, None, json!({
            "company": "Acme", "position": "Engineer"
        })))
        .await
        .unwrap();

    // Removing a required field must fail the merged document
    let err = service
        .update_node(&job.id, json!({ "company": null }), OWNER)
        .await
        .unwrap_err();
    assert!(matches!(err, HierarchyError::ValidationFailed(_)));

    // And the stored document is untouched
    let unchanged = service.get_node(&job.id, OWNER).await.unwrap().unwrap();
    assert_eq!(unchanged.meta["company"], "Acme");
}

#[tokio::test]
async fn test_update_missing_node_is_not_found() {
    let (service, _db, _temp) = create_test_service().await;

    let err = service
        .update_node("ghost", json!({}), OWNER)
        .await
        .unwrap_err();
    assert!(matches!(err, HierarchyError::NotFound { .. }));
}

#[tokio::test]
async fn test_delete_detaches_children_without_cascade() {
    let (service, _db, _temp) = create_test_service().await;

    let job = service
        .create_node(OWNER, new_node(NodeType::Job, None, json!({
            "company": "Acme", "position": "Engineer"
        })))
        .await
        .unwrap();
    let p1 = service
        .create_node(OWNER, new_node(NodeType::Project, Some(&job.id), project_meta()))
        .await
        .unwrap();
    let p2 = service
        .create_node(OWNER, new_node(NodeType::Project, Some(&job.id), json!({ "title": "Hiring pipeline" })))
        .await
        .unwrap();

    assert!(service.delete_node(&job.id, OWNER).await.unwrap());
    assert!(!service.delete_node(&job.id, OWNER).await.unwrap());

    for id in [&p1.id, &p2.id] {
        let child = service
            .get_node(id, OWNER)
            .await
            .unwrap()
            .expect("children survive deletion");
        assert!(child.parent_id.is_none());
    }
}

// Scenario D: strict owner isolation.
#[tokio::test]
async fn test_owner_isolation_hides_foreign_nodes() {
    let (service, _db, _temp) = create_test_service().await;

    let node = service
        .create_node("owner-a", new_node(NodeType::Job, None, json!({
            "company": "Acme", "position": "Engineer"
        })))
        .await
        .unwrap();

    assert!(service.get_node(&node.id, "owner-b").await.unwrap().is_none());
    assert!(service
        .list_nodes("owner-b", None, None)
        .await
        .unwrap()
        .is_empty());

    let err = service.move_node(&node.id, None, "owner-b").await.unwrap_err();
    assert!(matches!(err, HierarchyError::NotFound { .. }));
    assert!(!service.delete_node(&node.id, "owner-b").await.unwrap());
}

#[tokio::test]
async fn test_list_nodes_filters_by_type_and_parent() {
    let (service, _db, _temp) = create_test_service().await;

    let job = service
        .create_node(OWNER, new_node(NodeType::Job, None, json!({
            "company": "Acme", "position": "Engineer"
        })))
        .await
        .unwrap();
    let in_job = service
        .create_node(OWNER, new_node(NodeType::Project, Some(&job.id), project_meta()))
        .await
        .unwrap();
    let _top_level = service
        .create_node(OWNER, new_node(NodeType::Project, None, json!({ "title": "Side project" })))
        .await
        .unwrap();

    let all = service.list_nodes(OWNER, None, None).await.unwrap();
    assert_eq!(all.len(), 3);

    let projects = service
        .list_nodes(OWNER, Some(NodeType::Project), None)
        .await
        .unwrap();
    assert_eq!(projects.len(), 2);

    let under_job = service
        .list_nodes(OWNER, Some(NodeType::Project), Some(&job.id))
        .await
        .unwrap();
    assert_eq!(under_job.len(), 1);
    assert_eq!(under_job[0].id, in_job.id);

    let children = service.list_nodes(OWNER, None, Some(&job.id)).await.unwrap();
    assert_eq!(children.len(), 1);
}

#[tokio::test]
async fn test_acyclicity_holds_after_mutation_sequence() {
    let (service, _db, _temp) = create_test_service().await;

    let ct = service
        .create_node(OWNER, new_node(NodeType::CareerTransition, None, transition_meta()))
        .await
        .unwrap();
    let event = service
        .create_node(OWNER, new_node(NodeType::Event, Some(&ct.id), event_meta()))
        .await
        .unwrap();
    let project = service
        .create_node(OWNER, new_node(NodeType::Project, Some(&event.id), project_meta()))
        .await
        .unwrap();

    service.move_node(&project.id, Some(&ct.id), OWNER).await.unwrap();
    service.move_node(&event.id, None, OWNER).await.unwrap();

    // n is never in ancestors(n)'s tail for any node
    for id in [&ct.id, &event.id, &project.id] {
        let ancestors = service.get_ancestors(id, OWNER).await.unwrap();
        assert_eq!(ancestors.iter().filter(|n| &n.id == id).count(), 1);
        assert_eq!(&ancestors[0].id, id);
    }

    let report = service.validate_hierarchy(OWNER).await.unwrap();
    assert!(!report.analysis.has_cycles);
    assert!(report.suggestions.is_empty());
}

#[tokio::test]
async fn test_allowed_children_and_schema_surface() {
    assert_eq!(
        HierarchyService::allowed_children(NodeType::Event),
        &[NodeType::Project, NodeType::Action]
    );
    assert!(HierarchyService::allowed_children(NodeType::Project).is_empty());

    let schema = HierarchyService::meta_schema(NodeType::Job);
    assert_eq!(schema["nodeType"], "job");
    assert!(schema["required"]
        .as_array()
        .unwrap()
        .contains(&json!("company")));
}
