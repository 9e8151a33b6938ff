//! Maps source API payloads into inventory records.
//!
//! Every kind has an explicit allow-list: fields not named in the source
//! structs below are dropped. Base64 content fields are decoded to text.

use std::collections::BTreeMap;

use base64::{engine::general_purpose::STANDARD, Engine as _};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use super::groups::{GroupDirectory, GroupNameCache};
use super::models::{
    AssignmentRecord, InventoryRecord, ItemKind, TargetKind, UNKNOWN_TARGET_LABEL,
};

#[derive(Debug, Error)]
pub enum NormalizeError {
    #[error("Missing required field `{0}`")]
    MissingField(&'static str),

    #[error("Field `{field}` is not valid base64 text: {message}")]
    InvalidContent {
        field: &'static str,
        message: String,
    },

    #[error("Assignment {assignment_id} targets a group but carries no group id")]
    MissingGroupId { assignment_id: String },

    #[error("Malformed payload: {0}")]
    Payload(#[from] serde_json::Error),
}

// =============================================================================
// Source schemas (allow-lists)
// =============================================================================

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ApplicationSource {
    id: Option<String>,
    display_name: Option<String>,
    #[serde(rename = "@odata.type")]
    odata_type: Option<String>,
    description: Option<String>,
    publisher: Option<String>,
    developer: Option<String>,
    owner: Option<String>,
    notes: Option<String>,
    display_version: Option<String>,
    file_name: Option<String>,
    size: Option<i64>,
    publishing_state: Option<String>,
    is_assigned: Option<bool>,
    is_featured: Option<bool>,
    information_url: Option<String>,
    privacy_information_url: Option<String>,
    created_date_time: Option<String>,
    last_modified_date_time: Option<String>,
    role_scope_tag_ids: Option<Vec<String>>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ScriptSource {
    id: Option<String>,
    display_name: Option<String>,
    description: Option<String>,
    file_name: Option<String>,
    run_as_account: Option<String>,
    enforce_signature_check: Option<bool>,
    #[serde(rename = "runAs32Bit")]
    run_as_32_bit: Option<bool>,
    created_date_time: Option<String>,
    last_modified_date_time: Option<String>,
    role_scope_tag_ids: Option<Vec<String>>,
    script_content: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RemediationSource {
    id: Option<String>,
    display_name: Option<String>,
    description: Option<String>,
    publisher: Option<String>,
    version: Option<String>,
    run_as_account: Option<String>,
    enforce_signature_check: Option<bool>,
    #[serde(rename = "runAs32Bit")]
    run_as_32_bit: Option<bool>,
    is_global_script: Option<bool>,
    highest_available_version: Option<String>,
    created_date_time: Option<String>,
    last_modified_date_time: Option<String>,
    role_scope_tag_ids: Option<Vec<String>>,
    detection_script_content: Option<String>,
    remediation_script_content: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AssignmentSource {
    id: Option<String>,
    intent: Option<String>,
    #[serde(default)]
    target: TargetSource,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TargetSource {
    #[serde(rename = "@odata.type")]
    odata_type: Option<String>,
    group_id: Option<String>,
    #[serde(default)]
    group_ids: Vec<String>,
}

/// Metadata key under which a remediation's fix-up script is kept.
pub const REMEDIATION_SCRIPT_KEY: &str = "remediationScript";

struct MetadataBuilder(BTreeMap<String, Value>);

impl MetadataBuilder {
    fn new() -> Self {
        Self(BTreeMap::new())
    }

    fn put<T: Serialize>(mut self, key: &str, value: Option<T>) -> Self {
        if let Some(value) = value {
            if let Ok(value) = serde_json::to_value(value) {
                self.0.insert(key.to_string(), value);
            }
        }
        self
    }

    fn build(self) -> BTreeMap<String, Value> {
        self.0
    }
}

/// Decodes a base64 content field. `None` when the field is absent.
fn decode_content(
    field: &'static str,
    encoded: Option<&str>,
) -> Result<Option<String>, NormalizeError> {
    let Some(encoded) = encoded else {
        return Ok(None);
    };
    let bytes = STANDARD
        .decode(encoded.trim())
        .map_err(|e| NormalizeError::InvalidContent {
            field,
            message: e.to_string(),
        })?;
    let text = String::from_utf8(bytes).map_err(|e| NormalizeError::InvalidContent {
        field,
        message: e.to_string(),
    })?;
    Ok(Some(text.trim_start_matches('\u{feff}').to_string()))
}

fn required_id(id: Option<String>) -> Result<String, NormalizeError> {
    id.filter(|id| !id.trim().is_empty())
        .ok_or(NormalizeError::MissingField("id"))
}

fn base_record(
    kind: ItemKind,
    id: String,
    display_name: Option<String>,
    metadata: BTreeMap<String, Value>,
    content: Option<String>,
) -> InventoryRecord {
    let mut record = InventoryRecord::new(kind, id, display_name.unwrap_or_default());
    record.metadata = metadata;
    record.has_content = content.as_deref().is_some_and(|c| !c.is_empty());
    record.content = content;
    record
}

/// Converts a raw source object into an inventory record of `kind`.
pub fn normalize(raw: &Value, kind: ItemKind) -> Result<InventoryRecord, NormalizeError> {
    match kind {
        ItemKind::Application => {
            let src = ApplicationSource::deserialize(raw)?;
            let app_type = src
                .odata_type
                .map(|t| t.trim_start_matches("#microsoft.graph.").to_string());
            let metadata = MetadataBuilder::new()
                .put("appType", app_type)
                .put("description", src.description)
                .put("publisher", src.publisher)
                .put("developer", src.developer)
                .put("owner", src.owner)
                .put("notes", src.notes)
                .put("displayVersion", src.display_version)
                .put("fileName", src.file_name)
                .put("size", src.size)
                .put("publishingState", src.publishing_state)
                .put("isAssigned", src.is_assigned)
                .put("isFeatured", src.is_featured)
                .put("informationUrl", src.information_url)
                .put("privacyInformationUrl", src.privacy_information_url)
                .put("createdDateTime", src.created_date_time)
                .put("lastModifiedDateTime", src.last_modified_date_time)
                .put("roleScopeTagIds", src.role_scope_tag_ids)
                .build();
            Ok(base_record(kind, required_id(src.id)?, src.display_name, metadata, None))
        }
        ItemKind::Script => {
            let src = ScriptSource::deserialize(raw)?;
            let id = required_id(src.id)?;
            let content = decode_content("scriptContent", src.script_content.as_deref())?;
            let metadata = MetadataBuilder::new()
                .put("description", src.description)
                .put("fileName", src.file_name)
                .put("runAsAccount", src.run_as_account)
                .put("enforceSignatureCheck", src.enforce_signature_check)
                .put("runAs32Bit", src.run_as_32_bit)
                .put("createdDateTime", src.created_date_time)
                .put("lastModifiedDateTime", src.last_modified_date_time)
                .put("roleScopeTagIds", src.role_scope_tag_ids)
                .build();
            Ok(base_record(kind, id, src.display_name, metadata, content))
        }
        ItemKind::Remediation => {
            let src = RemediationSource::deserialize(raw)?;
            let id = required_id(src.id)?;
            let detection =
                decode_content("detectionScriptContent", src.detection_script_content.as_deref())?;
            let remediation = decode_content(
                "remediationScriptContent",
                src.remediation_script_content.as_deref(),
            )?;
            let metadata = MetadataBuilder::new()
                .put("description", src.description)
                .put("publisher", src.publisher)
                .put("version", src.version)
                .put("runAsAccount", src.run_as_account)
                .put("enforceSignatureCheck", src.enforce_signature_check)
                .put("runAs32Bit", src.run_as_32_bit)
                .put("isGlobalScript", src.is_global_script)
                .put("highestAvailableVersion", src.highest_available_version)
                .put("createdDateTime", src.created_date_time)
                .put("lastModifiedDateTime", src.last_modified_date_time)
                .put("roleScopeTagIds", src.role_scope_tag_ids)
                .put(REMEDIATION_SCRIPT_KEY, remediation.filter(|s| !s.is_empty()))
                .build();
            Ok(base_record(kind, id, src.display_name, metadata, detection))
        }
    }
}

// =============================================================================
// Assignments
// =============================================================================

/// A parsed assignment whose group names are not resolved yet.
#[derive(Debug, Clone, PartialEq)]
pub struct SourceAssignment {
    pub id: String,
    pub object_id: String,
    pub object_type: ItemKind,
    pub target_kind: TargetKind,
    /// Group ids referenced by the target, in source order.
    pub group_ids: Vec<String>,
    pub intent: Option<String>,
}

/// Parses one raw assignment of the record `(object_type, object_id)`.
pub fn parse_assignment(
    raw: &Value,
    object_type: ItemKind,
    object_id: &str,
) -> Result<SourceAssignment, NormalizeError> {
    let src = AssignmentSource::deserialize(raw)?;
    let id = required_id(src.id)?;
    let target_kind = src
        .target
        .odata_type
        .as_deref()
        .map(TargetKind::from_discriminator)
        .unwrap_or(TargetKind::Unknown);

    let mut group_ids: Vec<String> = src.target.group_id.into_iter().collect();
    for group_id in src.target.group_ids {
        if !group_ids.contains(&group_id) {
            group_ids.push(group_id);
        }
    }

    if target_kind.references_group() && group_ids.is_empty() {
        return Err(NormalizeError::MissingGroupId { assignment_id: id });
    }

    Ok(SourceAssignment {
        id,
        object_id: object_id.to_string(),
        object_type,
        target_kind,
        group_ids,
        intent: src.intent,
    })
}

/// Turns source payloads into records and resolves assignment target names.
///
/// Group names are memoized for the lifetime of the normalizer, so one
/// normalizer should cover one batch (an inventory run).
pub struct Normalizer<'a> {
    groups: GroupNameCache<'a>,
}

impl<'a> Normalizer<'a> {
    pub fn new(directory: &'a dyn GroupDirectory) -> Self {
        Self {
            groups: GroupNameCache::new(directory),
        }
    }

    pub fn normalize(
        &self,
        raw: &Value,
        kind: ItemKind,
    ) -> Result<InventoryRecord, NormalizeError> {
        normalize(raw, kind)
    }

    /// Attaches display names to every assignment. Lookup failures become
    /// sentinel names and never fail the batch.
    pub fn resolve_assignment_targets(
        &mut self,
        assignments: Vec<SourceAssignment>,
    ) -> Vec<AssignmentRecord> {
        assignments
            .into_iter()
            .map(|assignment| self.resolve_one(assignment))
            .collect()
    }

    fn resolve_one(&mut self, assignment: SourceAssignment) -> AssignmentRecord {
        let (target_group_id, resolved_group_name) = if assignment.target_kind.references_group() {
            let group_id = assignment.group_ids[0].clone();
            let name = self.groups.resolve(&group_id);
            (Some(group_id), Some(name))
        } else if assignment.target_kind == TargetKind::Unknown {
            let names: Vec<String> = assignment
                .group_ids
                .iter()
                .map(|id| self.groups.resolve(id))
                .collect();
            let label = if names.is_empty() {
                UNKNOWN_TARGET_LABEL.to_string()
            } else {
                names.join(", ")
            };
            (None, Some(label))
        } else {
            (None, None)
        };

        AssignmentRecord {
            id: assignment.id,
            object_id: assignment.object_id,
            object_type: assignment.object_type,
            target_kind: assignment.target_kind,
            target_group_id,
            resolved_group_name,
            intent: assignment.intent,
            run_id: None,
        }
    }

    /// Number of distinct groups looked up so far.
    pub fn resolved_groups(&self) -> usize {
        self.groups.resolved_count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::inventory::groups::MockGroupDirectory;
    use serde_json::json;

    fn encode(text: &str) -> String {
        STANDARD.encode(text)
    }

    #[test]
    fn test_application_allow_list_drops_unknown_fields() {
        let raw = json!({
            "@odata.type": "#microsoft.graph.win32LobApp",
            "id": "a1",
            "displayName": "App One",
            "publisher": "Contoso",
            "isAssigned": true,
            "largeIcon": {"type": "image/png", "value": "AAAA"},
            "someFutureField": 42
        });

        let record = normalize(&raw, ItemKind::Application).unwrap();

        assert_eq!(record.id, "a1");
        assert_eq!(record.kind, ItemKind::Application);
        assert_eq!(record.display_name, "App One");
        assert_eq!(record.metadata_str("appType"), Some("win32LobApp"));
        assert_eq!(record.metadata_str("publisher"), Some("Contoso"));
        assert_eq!(record.metadata.get("isAssigned"), Some(&json!(true)));
        assert!(!record.metadata.contains_key("largeIcon"));
        assert!(!record.metadata.contains_key("someFutureField"));
        assert!(!record.has_content);
        assert!(record.content.is_none());
    }

    #[test]
    fn test_script_content_is_decoded() {
        let raw = json!({
            "id": "s1",
            "displayName": "Set Wallpaper",
            "fileName": "wallpaper.ps1",
            "runAsAccount": "system",
            "runAs32Bit": false,
            "scriptContent": encode("\u{feff}Write-Host 'hello'")
        });

        let record = normalize(&raw, ItemKind::Script).unwrap();

        assert_eq!(record.content.as_deref(), Some("Write-Host 'hello'"));
        assert!(record.has_content);
        assert_eq!(record.metadata_str("fileName"), Some("wallpaper.ps1"));
        assert_eq!(record.metadata.get("runAs32Bit"), Some(&json!(false)));
        assert!(!record.metadata.contains_key("scriptContent"));
    }

    #[test]
    fn test_empty_content_does_not_set_flag() {
        let raw = json!({"id": "s1", "displayName": "Empty", "scriptContent": ""});
        let record = normalize(&raw, ItemKind::Script).unwrap();
        assert_eq!(record.content.as_deref(), Some(""));
        assert!(!record.has_content);
    }

    #[test]
    fn test_remediation_keeps_both_scripts() {
        let raw = json!({
            "id": "r1",
            "displayName": "Fix Time Sync",
            "publisher": "IT",
            "detectionScriptContent": encode("exit 1"),
            "remediationScriptContent": encode("w32tm /resync")
        });

        let record = normalize(&raw, ItemKind::Remediation).unwrap();

        assert_eq!(record.content.as_deref(), Some("exit 1"));
        assert!(record.has_content);
        assert_eq!(record.metadata_str(REMEDIATION_SCRIPT_KEY), Some("w32tm /resync"));
    }

    #[test]
    fn test_invalid_base64_is_an_error() {
        let raw = json!({"id": "s1", "displayName": "Broken", "scriptContent": "@@not base64@@"});
        let err = normalize(&raw, ItemKind::Script).unwrap_err();
        assert!(matches!(
            err,
            NormalizeError::InvalidContent {
                field: "scriptContent",
                ..
            }
        ));
    }

    #[test]
    fn test_missing_id_is_an_error() {
        let raw = json!({"displayName": "No Id"});
        assert!(matches!(
            normalize(&raw, ItemKind::Application).unwrap_err(),
            NormalizeError::MissingField("id")
        ));
        let raw = json!({"id": "  ", "displayName": "Blank Id"});
        assert!(normalize(&raw, ItemKind::Script).is_err());
    }

    #[test]
    fn test_non_object_payload_is_an_error() {
        let raw = json!(["not", "an", "object"]);
        assert!(matches!(
            normalize(&raw, ItemKind::Application).unwrap_err(),
            NormalizeError::Payload(_)
        ));
    }

    #[test]
    fn test_parse_group_assignment() {
        let raw = json!({
            "id": "as1",
            "intent": "required",
            "target": {
                "@odata.type": "#microsoft.graph.groupAssignmentTarget",
                "groupId": "g1"
            }
        });

        let parsed = parse_assignment(&raw, ItemKind::Application, "a1").unwrap();

        assert_eq!(parsed.target_kind, TargetKind::Group);
        assert_eq!(parsed.group_ids, vec!["g1".to_string()]);
        assert_eq!(parsed.intent.as_deref(), Some("required"));
        assert_eq!(parsed.object_id, "a1");
    }

    #[test]
    fn test_group_target_without_group_id_is_rejected() {
        let raw = json!({
            "id": "as1",
            "target": {"@odata.type": "#microsoft.graph.exclusionGroupAssignmentTarget"}
        });
        assert!(matches!(
            parse_assignment(&raw, ItemKind::Script, "s1").unwrap_err(),
            NormalizeError::MissingGroupId { .. }
        ));
    }

    #[test]
    fn test_resolve_targets_memoizes_group_lookups() {
        let mut directory = MockGroupDirectory::new();
        directory
            .expect_group_display_name()
            .times(2)
            .returning(|id| match id {
                "g1" => Ok(Some("Pilot Devices".to_string())),
                _ => Ok(None),
            });

        let assignments: Vec<SourceAssignment> = vec![
            json!({"id": "1", "target": {"@odata.type": "#microsoft.graph.groupAssignmentTarget", "groupId": "g1"}}),
            json!({"id": "2", "target": {"@odata.type": "#microsoft.graph.exclusionGroupAssignmentTarget", "groupId": "g1"}}),
            json!({"id": "3", "target": {"@odata.type": "#microsoft.graph.groupAssignmentTarget", "groupId": "gone"}}),
            json!({"id": "4", "target": {"@odata.type": "#microsoft.graph.allDevicesAssignmentTarget"}}),
        ]
        .iter()
        .map(|raw| parse_assignment(raw, ItemKind::Script, "s1").unwrap())
        .collect();

        let mut normalizer = Normalizer::new(&directory);
        let resolved = normalizer.resolve_assignment_targets(assignments);

        assert_eq!(resolved.len(), 4);
        assert_eq!(resolved[0].resolved_group_name.as_deref(), Some("Pilot Devices"));
        assert_eq!(resolved[1].target_kind, TargetKind::ExclusionGroup);
        assert_eq!(resolved[1].target_label(), "Excluded: Pilot Devices");
        assert_eq!(resolved[2].resolved_group_name.as_deref(), Some("Unknown Group (gone)"));
        assert_eq!(resolved[3].target_kind, TargetKind::AllDevices);
        assert_eq!(resolved[3].target_group_id, None);
        assert_eq!(resolved[3].resolved_group_name, None);
        assert_eq!(normalizer.resolved_groups(), 2);
    }

    #[test]
    fn test_unknown_discriminator_fallback() {
        let mut directory = MockGroupDirectory::new();
        directory
            .expect_group_display_name()
            .returning(|id| Ok(Some(format!("Name-{}", id))));

        let with_groups = parse_assignment(
            &json!({"id": "1", "target": {"@odata.type": "#microsoft.graph.futureTarget", "groupIds": ["x", "y"]}}),
            ItemKind::Remediation,
            "r1",
        )
        .unwrap();
        let without_groups = parse_assignment(
            &json!({"id": "2", "target": {"@odata.type": "#microsoft.graph.futureTarget"}}),
            ItemKind::Remediation,
            "r1",
        )
        .unwrap();

        let mut normalizer = Normalizer::new(&directory);
        let resolved = normalizer.resolve_assignment_targets(vec![with_groups, without_groups]);

        assert_eq!(resolved[0].target_kind, TargetKind::Unknown);
        assert_eq!(resolved[0].target_group_id, None);
        assert_eq!(resolved[0].target_label(), "Name-x, Name-y");
        assert_eq!(resolved[1].target_label(), UNKNOWN_TARGET_LABEL);
    }
}
