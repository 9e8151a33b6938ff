use chrono::{DateTime, Utc};
use clap::ValueEnum;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

// =============================================================================
// Item kinds
// =============================================================================

/// Kind of configuration object tracked by the inventory.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, ValueEnum,
)]
pub enum ItemKind {
    Application,
    Script,
    Remediation,
}

impl ItemKind {
    pub const ALL: [ItemKind; 3] = [ItemKind::Application, ItemKind::Script, ItemKind::Remediation];

    pub fn as_str(&self) -> &'static str {
        match self {
            ItemKind::Application => "application",
            ItemKind::Script => "script",
            ItemKind::Remediation => "remediation",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "application" => Some(ItemKind::Application),
            "script" => Some(ItemKind::Script),
            "remediation" => Some(ItemKind::Remediation),
            _ => None,
        }
    }

    /// Graph collection path, relative to the API root.
    pub fn api_collection(&self) -> &'static str {
        match self {
            ItemKind::Application => "deviceAppManagement/mobileApps",
            ItemKind::Script => "deviceManagement/deviceManagementScripts",
            ItemKind::Remediation => "deviceManagement/deviceHealthScripts",
        }
    }

    /// Name of the collection file and of the `source-code/` sub-directory.
    pub fn collection_name(&self) -> &'static str {
        match self {
            ItemKind::Application => "applications",
            ItemKind::Script => "scripts",
            ItemKind::Remediation => "remediations",
        }
    }

    /// Whether items of this kind carry script content.
    pub fn carries_content(&self) -> bool {
        !matches!(self, ItemKind::Application)
    }
}

impl std::fmt::Display for ItemKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ItemKind::Application => write!(f, "Application"),
            ItemKind::Script => write!(f, "Script"),
            ItemKind::Remediation => write!(f, "Remediation"),
        }
    }
}

// =============================================================================
// Inventory records
// =============================================================================

/// A normalized configuration object.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InventoryRecord {
    /// External identifier, stable across inventory runs.
    pub id: String,
    pub kind: ItemKind,
    pub display_name: String,
    /// Allow-listed source fields, keyed by their source names.
    #[serde(default)]
    pub metadata: BTreeMap<String, serde_json::Value>,
    /// Decoded script source, when fetched or added manually.
    pub content: Option<String>,
    pub has_content: bool,
    pub last_seen_at: DateTime<Utc>,
    /// Set by the store on every upsert.
    pub last_updated: Option<DateTime<Utc>>,
    /// Inventory run that last wrote this record, if any.
    pub run_id: Option<String>,
}

impl InventoryRecord {
    pub fn new(kind: ItemKind, id: impl Into<String>, display_name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            kind,
            display_name: display_name.into(),
            metadata: BTreeMap::new(),
            content: None,
            has_content: false,
            last_seen_at: Utc::now(),
            last_updated: None,
            run_id: None,
        }
    }

    pub fn with_content(mut self, content: impl Into<String>) -> Self {
        let content = content.into();
        self.has_content = !content.is_empty();
        self.content = Some(content);
        self
    }

    pub fn with_run(mut self, run_id: impl Into<String>) -> Self {
        self.run_id = Some(run_id.into());
        self
    }

    pub fn metadata_str(&self, key: &str) -> Option<&str> {
        self.metadata.get(key).and_then(|v| v.as_str())
    }
}

// =============================================================================
// Assignments
// =============================================================================

/// Scope an assignment applies to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TargetKind {
    AllUsers,
    AllDevices,
    Group,
    ExclusionGroup,
    /// Source discriminator not in the mapping table.
    Unknown,
}

impl TargetKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TargetKind::AllUsers => "all_users",
            TargetKind::AllDevices => "all_devices",
            TargetKind::Group => "group",
            TargetKind::ExclusionGroup => "exclusion_group",
            TargetKind::Unknown => "unknown",
        }
    }

    /// Maps a Graph `@odata.type` target discriminator.
    pub fn from_discriminator(odata_type: &str) -> Self {
        match odata_type {
            "#microsoft.graph.allLicensedUsersAssignmentTarget" => TargetKind::AllUsers,
            "#microsoft.graph.allDevicesAssignmentTarget" => TargetKind::AllDevices,
            "#microsoft.graph.groupAssignmentTarget" => TargetKind::Group,
            "#microsoft.graph.exclusionGroupAssignmentTarget" => TargetKind::ExclusionGroup,
            _ => TargetKind::Unknown,
        }
    }

    pub fn references_group(&self) -> bool {
        matches!(self, TargetKind::Group | TargetKind::ExclusionGroup)
    }
}

pub const UNKNOWN_TARGET_LABEL: &str = "Unknown Target";

/// Links an inventory record to a target scope.
///
/// `target_group_id` is set exactly when `target_kind` references a group.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssignmentRecord {
    pub id: String,
    pub object_id: String,
    pub object_type: ItemKind,
    pub target_kind: TargetKind,
    pub target_group_id: Option<String>,
    pub resolved_group_name: Option<String>,
    /// Install intent for app assignments (`required`, `available`, ...).
    pub intent: Option<String>,
    pub run_id: Option<String>,
}

impl AssignmentRecord {
    /// Human readable description of the target.
    pub fn target_label(&self) -> String {
        let group_name = || {
            self.resolved_group_name
                .clone()
                .or_else(|| self.target_group_id.clone())
                .unwrap_or_else(|| UNKNOWN_TARGET_LABEL.to_string())
        };
        match self.target_kind {
            TargetKind::AllUsers => "All Users".to_string(),
            TargetKind::AllDevices => "All Devices".to_string(),
            TargetKind::Group => group_name(),
            TargetKind::ExclusionGroup => format!("Excluded: {}", group_name()),
            TargetKind::Unknown => self
                .resolved_group_name
                .clone()
                .unwrap_or_else(|| UNKNOWN_TARGET_LABEL.to_string()),
        }
    }
}

// =============================================================================
// Content history
// =============================================================================

/// One content addition or edit. Entries are never rewritten.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContentHistoryEntry {
    pub item_id: String,
    pub item_type: ItemKind,
    pub content: String,
    pub added_by: String,
    pub added_at: DateTime<Utc>,
    pub comment: Option<String>,
    pub version: String,
}

/// A content change requested through the content-management path.
#[derive(Debug, Clone, Default)]
pub struct ContentEdit {
    pub content: String,
    pub added_by: String,
    pub comment: Option<String>,
    /// Defaults to the next sequence number for the item.
    pub version: Option<String>,
}

// =============================================================================
// Inventory runs
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RunStatus {
    Running,
    Completed,
    CompletedWithErrors,
    Failed,
}

impl RunStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RunStatus::Running => "running",
            RunStatus::Completed => "completed",
            RunStatus::CompletedWithErrors => "completed_with_errors",
            RunStatus::Failed => "failed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "running" => Some(RunStatus::Running),
            "completed" => Some(RunStatus::Completed),
            "completed_with_errors" => Some(RunStatus::CompletedWithErrors),
            "failed" => Some(RunStatus::Failed),
            _ => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, RunStatus::Running)
    }
}

/// Audit record of one inventory run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunRecord {
    pub id: String,
    pub run_type: ItemKind,
    pub started_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
    pub status: RunStatus,
    pub items_processed: usize,
    pub error_count: usize,
    #[serde(default)]
    pub error_messages: Vec<String>,
}

impl RunRecord {
    pub fn start(run_type: ItemKind) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            run_type,
            started_at: Utc::now(),
            ended_at: None,
            status: RunStatus::Running,
            items_processed: 0,
            error_count: 0,
            error_messages: Vec::new(),
        }
    }

    pub fn duration(&self) -> Option<chrono::Duration> {
        self.ended_at.map(|end| end - self.started_at)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_item_kind_roundtrip_names() {
        for kind in ItemKind::ALL {
            assert_eq!(ItemKind::parse(kind.as_str()), Some(kind));
        }
        assert_eq!(ItemKind::parse("applications"), None);
    }

    #[test]
    fn test_collection_names_are_distinct() {
        let names: std::collections::HashSet<_> =
            ItemKind::ALL.iter().map(|k| k.collection_name()).collect();
        assert_eq!(names.len(), ItemKind::ALL.len());
    }

    #[test]
    fn test_target_kind_mapping() {
        assert_eq!(
            TargetKind::from_discriminator("#microsoft.graph.allDevicesAssignmentTarget"),
            TargetKind::AllDevices
        );
        assert_eq!(
            TargetKind::from_discriminator("#microsoft.graph.exclusionGroupAssignmentTarget"),
            TargetKind::ExclusionGroup
        );
        assert_eq!(
            TargetKind::from_discriminator("#microsoft.graph.somethingNew"),
            TargetKind::Unknown
        );
    }

    #[test]
    fn test_target_label() {
        let mut assignment = AssignmentRecord {
            id: "as1".to_string(),
            object_id: "s1".to_string(),
            object_type: ItemKind::Script,
            target_kind: TargetKind::ExclusionGroup,
            target_group_id: Some("g1".to_string()),
            resolved_group_name: Some("Kiosks".to_string()),
            intent: None,
            run_id: None,
        };
        assert_eq!(assignment.target_label(), "Excluded: Kiosks");

        assignment.target_kind = TargetKind::AllUsers;
        assert_eq!(assignment.target_label(), "All Users");

        assignment.target_kind = TargetKind::Unknown;
        assignment.resolved_group_name = None;
        assert_eq!(assignment.target_label(), UNKNOWN_TARGET_LABEL);
    }

    #[test]
    fn test_run_status_terminal() {
        assert!(!RunStatus::Running.is_terminal());
        assert!(RunStatus::CompletedWithErrors.is_terminal());
        assert_eq!(
            RunStatus::parse(RunStatus::Failed.as_str()),
            Some(RunStatus::Failed)
        );
    }

    #[test]
    fn test_with_content_sets_flag() {
        let record = InventoryRecord::new(ItemKind::Script, "s1", "Script").with_content("");
        assert!(!record.has_content);
        let record = record.with_content("Write-Host hi");
        assert!(record.has_content);
    }
}
