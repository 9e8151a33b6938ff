//! Graph-shaped payload builders.

#![allow(dead_code)]

use base64::{engine::general_purpose::STANDARD, Engine as _};
use mdm_inventory::graph::HttpResponse;
use serde_json::{json, Value};

pub fn json_response(value: Value) -> HttpResponse {
    HttpResponse::new(200, value.to_string())
}

pub fn status(code: u16) -> HttpResponse {
    HttpResponse::new(
        code,
        json!({"error": {"code": "Scripted", "message": format!("status {}", code)}}).to_string(),
    )
}

/// One collection page, with an optional `@odata.nextLink`.
pub fn page(items: Vec<Value>, next_link: Option<&str>) -> HttpResponse {
    let mut body = json!({ "value": items });
    if let Some(link) = next_link {
        body["@odata.nextLink"] = json!(link);
    }
    json_response(body)
}

pub fn application(id: &str, name: &str) -> Value {
    json!({
        "@odata.type": "#microsoft.graph.win32LobApp",
        "id": id,
        "displayName": name,
        "publisher": "Contoso",
        "largeIcon": {"type": "image/png", "value": "iVBORw0KGgo="}
    })
}

pub fn script(id: &str, name: &str) -> Value {
    json!({
        "id": id,
        "displayName": name,
        "fileName": format!("{}.ps1", id),
        "runAsAccount": "system"
    })
}

pub fn script_detail(id: &str, name: &str, content: &str) -> Value {
    let mut detail = script(id, name);
    detail["scriptContent"] = json!(STANDARD.encode(content));
    detail
}

pub fn remediation_detail(id: &str, name: &str, detection: &str, remediation: &str) -> Value {
    json!({
        "id": id,
        "displayName": name,
        "publisher": "IT",
        "detectionScriptContent": STANDARD.encode(detection),
        "remediationScriptContent": STANDARD.encode(remediation)
    })
}

pub fn group_assignment(id: &str, group_id: &str) -> Value {
    json!({
        "id": id,
        "intent": "required",
        "target": {
            "@odata.type": "#microsoft.graph.groupAssignmentTarget",
            "groupId": group_id
        }
    })
}

pub fn exclusion_assignment(id: &str, group_id: &str) -> Value {
    json!({
        "id": id,
        "target": {
            "@odata.type": "#microsoft.graph.exclusionGroupAssignmentTarget",
            "groupId": group_id
        }
    })
}

pub fn all_devices_assignment(id: &str) -> Value {
    json!({
        "id": id,
        "intent": "available",
        "target": {"@odata.type": "#microsoft.graph.allDevicesAssignmentTarget"}
    })
}

pub fn group(id: &str, name: &str) -> HttpResponse {
    json_response(json!({"id": id, "displayName": name}))
}

pub fn token(access_token: &str) -> HttpResponse {
    json_response(json!({
        "token_type": "Bearer",
        "expires_in": 3599,
        "access_token": access_token
    }))
}
