//! Typed Metadata Shapes
//!
//! One concrete record shape per [`NodeType`](crate::models::NodeType)
//! variant, forming the tagged union behind the open `meta` document. The
//! tag lives on the node's `node_type` column rather than inside the JSON,
//! so conversion dispatches on the enum (exhaustively) instead of on a serde
//! tag. Every shape flattens unrecognized fields into `extra` — metadata is
//! an open attribute map, the shapes only pin down the constrained part.
//!
//! Field-level validation (reporting every violation, not just the first)
//! happens in [`services::type_rules`](crate::services::type_rules) before a
//! shape is ever constructed; these types are the typed view handed back on
//! success.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::models::NodeType;

/// Lifecycle of a project node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProjectStatus {
    Planned,
    Active,
    Completed,
    Archived,
}

impl ProjectStatus {
    pub const ALL: [ProjectStatus; 4] = [
        ProjectStatus::Planned,
        ProjectStatus::Active,
        ProjectStatus::Completed,
        ProjectStatus::Archived,
    ];

    pub const fn as_str(self) -> &'static str {
        match self {
            ProjectStatus::Planned => "planned",
            ProjectStatus::Active => "active",
            ProjectStatus::Completed => "completed",
            ProjectStatus::Archived => "archived",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CareerTransitionMeta {
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub from_role: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub to_role: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_date: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_date: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobMeta {
    pub company: String,
    pub position: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_date: Option<String>,
    /// `"present"` marks an ongoing job
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_date: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EducationMeta {
    pub institution: String,
    pub degree: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub field: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_date: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_date: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActionMeta {
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventMeta {
    pub title: String,
    pub date: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectMeta {
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub technologies: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<ProjectStatus>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// The tagged union over all per-type metadata shapes.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum NodeMeta {
    CareerTransition(CareerTransitionMeta),
    Job(JobMeta),
    Education(EducationMeta),
    Action(ActionMeta),
    Event(EventMeta),
    Project(ProjectMeta),
}

impl NodeMeta {
    /// Deserialize the open document into the shape matching `node_type`.
    ///
    /// Dispatch is an exhaustive match over the closed type set; adding a
    /// node type without a shape fails to compile.
    pub fn from_value(node_type: NodeType, meta: &Value) -> Result<Self, serde_json::Error> {
        Ok(match node_type {
            NodeType::CareerTransition => {
                NodeMeta::CareerTransition(serde_json::from_value(meta.clone())?)
            }
            NodeType::Job => NodeMeta::Job(serde_json::from_value(meta.clone())?),
            NodeType::Education => NodeMeta::Education(serde_json::from_value(meta.clone())?),
            NodeType::Action => NodeMeta::Action(serde_json::from_value(meta.clone())?),
            NodeType::Event => NodeMeta::Event(serde_json::from_value(meta.clone())?),
            NodeType::Project => NodeMeta::Project(serde_json::from_value(meta.clone())?),
        })
    }

    pub const fn node_type(&self) -> NodeType {
        match self {
            NodeMeta::CareerTransition(_) => NodeType::CareerTransition,
            NodeMeta::Job(_) => NodeType::Job,
            NodeMeta::Education(_) => NodeType::Education,
            NodeMeta::Action(_) => NodeType::Action,
            NodeMeta::Event(_) => NodeType::Event,
            NodeMeta::Project(_) => NodeType::Project,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn job_meta_keeps_extra_fields() {
        let meta = json!({
            "company": "Acme",
            "position": "Engineer",
            "endDate": "present",
            "teamSize": 7
        });

        let parsed = NodeMeta::from_value(NodeType::Job, &meta).unwrap();
        let NodeMeta::Job(job) = &parsed else {
            panic!("expected job shape");
        };
        assert_eq!(job.company, "Acme");
        assert_eq!(job.end_date.as_deref(), Some("present"));
        assert_eq!(job.extra["teamSize"], json!(7));
        assert_eq!(parsed.node_type(), NodeType::Job);

        // Round-trip preserves the open fields
        let back = serde_json::to_value(&parsed).unwrap();
        assert_eq!(back["teamSize"], json!(7));
        assert_eq!(back["company"], json!("Acme"));
    }

    #[test]
    fn project_status_rejects_unknown_value() {
        let meta = json!({ "title": "Side project", "status": "paused" });
        assert!(NodeMeta::from_value(NodeType::Project, &meta).is_err());
    }

    #[test]
    fn missing_required_field_is_an_error() {
        let meta = json!({ "position": "Engineer" });
        assert!(NodeMeta::from_value(NodeType::Job, &meta).is_err());
    }
}
