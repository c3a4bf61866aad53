use serde::{Deserialize, Serialize};
use std::fmt;

/// Entity types that can be part of a user selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EntityType {
    #[serde(rename = "Project")]
    Project,
    #[serde(rename = "TypedContext")]
    Context,
    #[serde(rename = "assetversion")]
    Version,
    #[serde(rename = "Component")]
    Component,
}

impl EntityType {
    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "Project" | "project" => Some(Self::Project),
            "TypedContext" | "context" => Some(Self::Context),
            "assetversion" | "AssetVersion" | "version" => Some(Self::Version),
            "Component" | "component" => Some(Self::Component),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Project => "Project",
            Self::Context => "TypedContext",
            Self::Version => "assetversion",
            Self::Component => "Component",
        }
    }
}

impl fmt::Display for EntityType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single entity highlighted by the user when triggering an action.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SelectionItem {
    #[serde(rename = "entityType")]
    pub entity_type: EntityType,
    #[serde(rename = "entityId")]
    pub entity_id: String,
}

impl SelectionItem {
    pub fn new(entity_type: EntityType, entity_id: impl Into<String>) -> Self {
        Self {
            entity_type,
            entity_id: entity_id.into(),
        }
    }

    /// Parse a `type:id` pair as given on the command line.
    pub fn parse(s: &str) -> Option<Self> {
        let (kind, id) = s.split_once(':')?;
        let id = id.trim();
        if id.is_empty() {
            return None;
        }
        Some(Self::new(EntityType::from_str(kind.trim())?, id))
    }
}

/// A storable unit tracked by the catalog.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Component {
    pub id: String,
    pub name: String,
    pub file_type: String,
    pub version_id: String,
    pub size: Option<u64>,
}

impl PartialEq for Component {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for Component {}

impl std::hash::Hash for Component {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

impl fmt::Display for Component {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{} ({})", self.name, self.file_type, self.id)
    }
}

/// Catalog row for a storage location. Accessor and structure live on the
/// session side, see [`crate::core::location::Location`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LocationRecord {
    pub id: String,
    pub name: String,
    pub label: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Running,
    Done,
    Failed,
}

impl JobStatus {
    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "running" => Some(Self::Running),
            "done" => Some(Self::Done),
            "failed" => Some(Self::Failed),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Running => "running",
            Self::Done => "done",
            Self::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Running)
    }

    /// Running may move to any terminal status; terminal statuses are final.
    pub fn can_transition_to(&self, next: JobStatus) -> bool {
        match self {
            Self::Running => true,
            _ => *self == next,
        }
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Persisted progress record shown to the user while a transfer runs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Job {
    pub id: String,
    pub user_id: Option<String>,
    pub status: JobStatus,
    pub description: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub created_at: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<String>,
}

/// One committed state of a job, in commit order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobStatusEntry {
    pub status: JobStatus,
    pub description: String,
    pub created_at: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobWithHistory {
    #[serde(flatten)]
    pub job: Job,
    pub history: Vec<JobStatusEntry>,
}

/// The JSON blob stored in a job's `data` column.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobData {
    pub description: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn selection_item_uses_wire_names() {
        let json = r#"{"entityType":"assetversion","entityId":"v1"}"#;
        let item: SelectionItem = serde_json::from_str(json).unwrap();
        assert_eq!(item.entity_type, EntityType::Version);
        assert_eq!(item.entity_id, "v1");

        let back = serde_json::to_string(&SelectionItem::new(EntityType::Context, "c1")).unwrap();
        assert!(back.contains(r#""entityType":"TypedContext""#));
    }

    #[test]
    fn selection_item_parse_cli_pair() {
        let item = SelectionItem::parse("version:abc").unwrap();
        assert_eq!(item, SelectionItem::new(EntityType::Version, "abc"));
        assert!(SelectionItem::parse("bogus:abc").is_none());
        assert!(SelectionItem::parse("project:").is_none());
        assert!(SelectionItem::parse("project").is_none());
    }

    #[test]
    fn terminal_statuses_are_final() {
        assert!(JobStatus::Running.can_transition_to(JobStatus::Done));
        assert!(JobStatus::Running.can_transition_to(JobStatus::Failed));
        assert!(!JobStatus::Done.can_transition_to(JobStatus::Failed));
        assert!(!JobStatus::Failed.can_transition_to(JobStatus::Running));
        assert!(!JobStatus::Done.can_transition_to(JobStatus::Running));
    }

    #[test]
    fn components_compare_by_id() {
        let a = Component {
            id: "c1".into(),
            name: "main".into(),
            file_type: ".exr".into(),
            version_id: "v1".into(),
            size: Some(10),
        };
        let mut b = a.clone();
        b.name = "other".into();
        assert_eq!(a, b);
    }
}
