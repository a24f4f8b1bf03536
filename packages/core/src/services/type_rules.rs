//! Type Rules - Stateless Validation
//!
//! Pure functions, no I/O: per-type metadata shape validation (reporting
//! every violated field, not just the first), the fixed parent→child
//! edge-compatibility lookup, and the label/date constraints shared by all
//! shapes. The orchestrator runs these before any write; the store's move
//! transaction re-runs the edge lookup under its lock.

use chrono::NaiveDate;
use serde_json::{json, Map, Value};

use crate::models::{NodeMeta, NodeType, ProjectStatus};
use crate::services::error::{FieldViolation, HierarchyError};

/// Label length bounds, counted in characters after no trimming is needed
pub const LABEL_MIN_CHARS: usize = 2;
pub const LABEL_MAX_CHARS: usize = 255;

/// Sentinel accepted as an end date for ongoing items
pub const ONGOING: &str = "present";

/// Validate a human-visible label: non-empty after trimming, 2–255
/// characters, no leading or trailing whitespace.
pub fn validate_label(field: &str, text: &str) -> Result<(), FieldViolation> {
    if text.trim().is_empty() {
        return Err(FieldViolation::new(field, "must not be blank"));
    }
    if text != text.trim() {
        return Err(FieldViolation::new(
            field,
            "must not have leading or trailing whitespace",
        ));
    }
    let chars = text.chars().count();
    if !(LABEL_MIN_CHARS..=LABEL_MAX_CHARS).contains(&chars) {
        return Err(FieldViolation::new(
            field,
            format!(
                "must be between {} and {} characters",
                LABEL_MIN_CHARS, LABEL_MAX_CHARS
            ),
        ));
    }
    Ok(())
}

/// Validate a `YYYY-MM-DD` date string.
pub fn validate_date(field: &str, text: &str) -> Result<NaiveDate, FieldViolation> {
    NaiveDate::parse_from_str(text, "%Y-%m-%d")
        .map_err(|_| FieldViolation::new(field, "must be a YYYY-MM-DD date"))
}

/// When both ends are present, the range must not run backwards.
///
/// [`ONGOING`] is accepted as an end date. Unparseable values are ignored
/// here; the per-field format checks report those.
pub fn validate_date_range(start: Option<&str>, end: Option<&str>) -> Result<(), FieldViolation> {
    let (Some(start), Some(end)) = (start, end) else {
        return Ok(());
    };
    if end == ONGOING {
        return Ok(());
    }
    let (Ok(start), Ok(end)) = (
        NaiveDate::parse_from_str(start, "%Y-%m-%d"),
        NaiveDate::parse_from_str(end, "%Y-%m-%d"),
    ) else {
        return Ok(());
    };
    if start > end {
        return Err(FieldViolation::new(
            "endDate",
            "must not precede startDate",
        ));
    }
    Ok(())
}

/// Look up the fixed edge-compatibility table.
///
/// The error names both types and lists the allowed alternatives.
pub fn validate_edge(parent_type: NodeType, child_type: NodeType) -> Result<(), HierarchyError> {
    if parent_type.allows_child(child_type) {
        return Ok(());
    }
    Err(HierarchyError::rule_violation(parent_type, child_type))
}

/// The child types a parent of `parent_type` may contain.
pub fn allowed_children(parent_type: NodeType) -> &'static [NodeType] {
    parent_type.allowed_children()
}

/// Validate a metadata document against its type's shape.
///
/// Dispatches exhaustively on `node_type` and collects every violation
/// before returning. On success the typed [`NodeMeta`] view is handed back.
pub fn validate_meta(node_type: NodeType, meta: &Value) -> Result<NodeMeta, Vec<FieldViolation>> {
    let Some(map) = meta.as_object() else {
        return Err(vec![FieldViolation::new(
            "meta",
            "metadata must be a JSON object",
        )]);
    };

    let mut violations = Vec::new();

    match node_type {
        NodeType::CareerTransition => {
            require_label(map, "title", &mut violations);
            optional_string(map, "fromRole", &mut violations);
            optional_string(map, "toRole", &mut violations);
            optional_date(map, "startDate", &mut violations);
            optional_end_date(map, "endDate", &mut violations);
            check_date_range(map, &mut violations);
        }
        NodeType::Job => {
            require_label(map, "company", &mut violations);
            require_label(map, "position", &mut violations);
            optional_date(map, "startDate", &mut violations);
            optional_end_date(map, "endDate", &mut violations);
            optional_string(map, "location", &mut violations);
            check_date_range(map, &mut violations);
        }
        NodeType::Education => {
            require_label(map, "institution", &mut violations);
            require_label(map, "degree", &mut violations);
            optional_string(map, "field", &mut violations);
            optional_date(map, "startDate", &mut violations);
            optional_end_date(map, "endDate", &mut violations);
            check_date_range(map, &mut violations);
        }
        NodeType::Action => {
            require_label(map, "title", &mut violations);
            optional_date(map, "completedAt", &mut violations);
        }
        NodeType::Event => {
            require_label(map, "title", &mut violations);
            require_date(map, "date", &mut violations);
            optional_string(map, "location", &mut violations);
        }
        NodeType::Project => {
            require_label(map, "title", &mut violations);
            check_technologies(map, &mut violations);
            check_status(map, &mut violations);
        }
    }
    optional_string(map, "description", &mut violations);

    if !violations.is_empty() {
        return Err(violations);
    }

    NodeMeta::from_value(node_type, meta)
        .map_err(|e| vec![FieldViolation::new("meta", e.to_string())])
}

/// Shape description for one node type, as exposed by the upward API.
pub fn meta_schema(node_type: NodeType) -> Value {
    match node_type {
        NodeType::CareerTransition => json!({
            "nodeType": "careerTransition",
            "required": ["title"],
            "optional": ["fromRole", "toRole", "startDate", "endDate", "description"],
        }),
        NodeType::Job => json!({
            "nodeType": "job",
            "required": ["company", "position"],
            "optional": ["startDate", "endDate", "location", "description"],
        }),
        NodeType::Education => json!({
            "nodeType": "education",
            "required": ["institution", "degree"],
            "optional": ["field", "startDate", "endDate", "description"],
        }),
        NodeType::Action => json!({
            "nodeType": "action",
            "required": ["title"],
            "optional": ["description", "completedAt"],
        }),
        NodeType::Event => json!({
            "nodeType": "event",
            "required": ["title", "date"],
            "optional": ["location", "description"],
        }),
        NodeType::Project => json!({
            "nodeType": "project",
            "required": ["title"],
            "optional": ["description", "technologies", "status"],
            "statusValues": ProjectStatus::ALL
                .iter()
                .map(|s| s.as_str())
                .collect::<Vec<_>>(),
        }),
    }
}

fn require_label(map: &Map<String, Value>, field: &str, violations: &mut Vec<FieldViolation>) {
    match map.get(field) {
        None | Some(Value::Null) => {
            violations.push(FieldViolation::new(field, "is required"));
        }
        Some(Value::String(text)) => {
            if let Err(violation) = validate_label(field, text) {
                violations.push(violation);
            }
        }
        Some(_) => violations.push(FieldViolation::new(field, "must be a string")),
    }
}

fn require_date(map: &Map<String, Value>, field: &str, violations: &mut Vec<FieldViolation>) {
    match map.get(field) {
        None | Some(Value::Null) => {
            violations.push(FieldViolation::new(field, "is required"));
        }
        Some(Value::String(text)) => {
            if let Err(violation) = validate_date(field, text) {
                violations.push(violation);
            }
        }
        Some(_) => violations.push(FieldViolation::new(field, "must be a string")),
    }
}

fn optional_string(map: &Map<String, Value>, field: &str, violations: &mut Vec<FieldViolation>) {
    match map.get(field) {
        None | Some(Value::Null) | Some(Value::String(_)) => {}
        Some(_) => violations.push(FieldViolation::new(field, "must be a string")),
    }
}

fn optional_date(map: &Map<String, Value>, field: &str, violations: &mut Vec<FieldViolation>) {
    match map.get(field) {
        None | Some(Value::Null) => {}
        Some(Value::String(text)) => {
            if let Err(violation) = validate_date(field, text) {
                violations.push(violation);
            }
        }
        Some(_) => violations.push(FieldViolation::new(field, "must be a string")),
    }
}

/// Like [`optional_date`], but the [`ONGOING`] sentinel is accepted.
fn optional_end_date(map: &Map<String, Value>, field: &str, violations: &mut Vec<FieldViolation>) {
    match map.get(field) {
        None | Some(Value::Null) => {}
        Some(Value::String(text)) if text == ONGOING => {}
        Some(Value::String(text)) => {
            if let Err(violation) = validate_date(field, text) {
                violations.push(FieldViolation::new(
                    field,
                    format!("{} or \"{}\"", violation.message, ONGOING),
                ));
            }
        }
        Some(_) => violations.push(FieldViolation::new(field, "must be a string")),
    }
}

fn check_date_range(map: &Map<String, Value>, violations: &mut Vec<FieldViolation>) {
    let start = map.get("startDate").and_then(Value::as_str);
    let end = map.get("endDate").and_then(Value::as_str);
    if let Err(violation) = validate_date_range(start, end) {
        violations.push(violation);
    }
}

fn check_technologies(map: &Map<String, Value>, violations: &mut Vec<FieldViolation>) {
    match map.get("technologies") {
        None | Some(Value::Null) => {}
        Some(Value::Array(items)) => {
            if items.iter().any(|item| !item.is_string()) {
                violations.push(FieldViolation::new(
                    "technologies",
                    "must be an array of strings",
                ));
            }
        }
        Some(_) => violations.push(FieldViolation::new(
            "technologies",
            "must be an array of strings",
        )),
    }
}

fn check_status(map: &Map<String, Value>, violations: &mut Vec<FieldViolation>) {
    match map.get("status") {
        None | Some(Value::Null) => {}
        Some(Value::String(text))
            if ProjectStatus::ALL.iter().any(|s| s.as_str() == text.as_str()) => {}
        Some(_) => violations.push(FieldViolation::new(
            "status",
            format!(
                "must be one of: {}",
                ProjectStatus::ALL
                    .iter()
                    .map(|s| s.as_str())
                    .collect::<Vec<_>>()
                    .join(", ")
            ),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn label_rejects_blank_and_padded_text() {
        assert!(validate_label("title", "Senior Engineer").is_ok());
        assert!(validate_label("title", "").is_err());
        assert!(validate_label("title", "   ").is_err());
        assert!(validate_label("title", " padded").is_err());
        assert!(validate_label("title", "padded ").is_err());
        assert!(validate_label("title", "x").is_err());
        assert!(validate_label("title", &"x".repeat(255)).is_ok());
        assert!(validate_label("title", &"x".repeat(256)).is_err());
    }

    #[test]
    fn date_range_accepts_ongoing_sentinel() {
        assert!(validate_date_range(Some("2023-01-01"), Some("present")).is_ok());
        assert!(validate_date_range(Some("2023-01-01"), Some("2024-06-30")).is_ok());
        assert!(validate_date_range(Some("2024-06-30"), Some("2023-01-01")).is_err());
        assert!(validate_date_range(Some("2023-01-01"), None).is_ok());
        assert!(validate_date_range(None, Some("2023-01-01")).is_ok());
    }

    #[test]
    fn edge_table_rejects_action_under_project() {
        let err = validate_edge(NodeType::Project, NodeType::Action).unwrap_err();
        assert!(matches!(
            err,
            HierarchyError::RuleViolation {
                parent_type: NodeType::Project,
                child_type: NodeType::Action,
                ..
            }
        ));
        assert!(validate_edge(NodeType::Event, NodeType::Action).is_ok());
    }

    #[test]
    fn meta_validation_reports_every_violation() {
        let meta = json!({
            "position": 42,
            "startDate": "January 2023"
        });

        let violations = validate_meta(NodeType::Job, &meta).unwrap_err();
        let fields: Vec<&str> = violations.iter().map(|v| v.field.as_str()).collect();
        assert!(fields.contains(&"company"));
        assert!(fields.contains(&"position"));
        assert!(fields.contains(&"startDate"));
        assert_eq!(violations.len(), 3);
    }

    #[test]
    fn valid_job_meta_yields_typed_view() {
        let meta = json!({
            "company": "Acme",
            "position": "Engineer",
            "startDate": "2021-03-01",
            "endDate": "present"
        });

        let parsed = validate_meta(NodeType::Job, &meta).unwrap();
        assert_eq!(parsed.node_type(), NodeType::Job);
    }

    #[test]
    fn event_requires_a_date() {
        let meta = json!({ "title": "RustConf talk" });
        let violations = validate_meta(NodeType::Event, &meta).unwrap_err();
        assert_eq!(violations.len(), 1);
        assert_eq!(violations[0].field, "date");
    }

    #[test]
    fn project_constrains_technologies_and_status() {
        let meta = json!({
            "title": "Search rewrite",
            "technologies": ["rust", 3],
            "status": "paused"
        });
        let violations = validate_meta(NodeType::Project, &meta).unwrap_err();
        let fields: Vec<&str> = violations.iter().map(|v| v.field.as_str()).collect();
        assert!(fields.contains(&"technologies"));
        assert!(fields.contains(&"status"));

        let meta = json!({
            "title": "Search rewrite",
            "technologies": ["rust", "sqlite"],
            "status": "active"
        });
        assert!(validate_meta(NodeType::Project, &meta).is_ok());
    }

    #[test]
    fn meta_must_be_an_object() {
        let violations = validate_meta(NodeType::Action, &json!("not a map")).unwrap_err();
        assert_eq!(violations[0].field, "meta");
    }

    #[test]
    fn unknown_extra_fields_are_allowed() {
        let meta = json!({
            "title": "Ship the launch post",
            "assignedBy": "mentor"
        });
        assert!(validate_meta(NodeType::Action, &meta).is_ok());
    }
}
