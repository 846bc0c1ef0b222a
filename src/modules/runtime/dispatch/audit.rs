//! Audit events for action runs

use serde::Serialize;
use switchyard_types::Options;
use tracing::info;

/// One completed `run_action` call
#[derive(Debug, Clone, Serialize)]
pub struct AuditEvent {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub action_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resource_id: Option<String>,
    pub resource_type: String,
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_kind: Option<&'static str>,
    /// Copy of the action template as it was dispatched
    pub template: Options,
}

/// Receives one event per action run
pub trait AuditSink: Send + Sync {
    fn record(&self, event: &AuditEvent);
}

/// Emits audit events as structured `tracing` events
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingAuditSink;

impl AuditSink for TracingAuditSink {
    fn record(&self, event: &AuditEvent) {
        let template = serde_json::to_string(&event.template).unwrap_or_default();
        info!(
            target: "switchyard::audit",
            action_id = event.action_id.as_deref().unwrap_or(""),
            resource_id = event.resource_id.as_deref().unwrap_or(""),
            resource_type = %event.resource_type,
            success = event.success,
            error_kind = event.error_kind.unwrap_or(""),
            template = %template,
            "Action run"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_event_serializes_without_empty_ids() {
        let event = AuditEvent {
            action_id: Some("a-1".to_string()),
            resource_id: None,
            resource_type: "restapi".to_string(),
            success: true,
            error_kind: None,
            template: json!({"url": "/x"}).as_object().cloned().unwrap(),
        };
        let value = serde_json::to_value(&event).unwrap();
        assert_eq!(value["action_id"], json!("a-1"));
        assert!(value.get("resource_id").is_none());
        assert_eq!(value["template"]["url"], json!("/x"));

        TracingAuditSink.record(&event);
    }
}
