use tracing::info;

use signoff_core::audit::{AuditEvent, AuditSink};

/// Writes audit events to the structured log.
#[derive(Clone, Copy, Debug, Default)]
pub struct TracingAuditSink;

impl AuditSink for TracingAuditSink {
    fn emit(&self, event: AuditEvent) {
        let metadata = serde_json::to_string(&event.metadata).unwrap_or_default();
        info!(
            event_name = "audit.event",
            audit_event_id = %event.event_id,
            audit_event_type = %event.event_type,
            category = ?event.category,
            outcome = ?event.outcome,
            actor = %event.actor,
            approval_id = event.approval_id.as_ref().map(|id| id.0.as_str()).unwrap_or("none"),
            code = event.code.as_ref().map(|code| code.0.as_str()).unwrap_or("none"),
            occurred_at = %event.occurred_at.to_rfc3339(),
            metadata = %metadata,
            "audit event"
        );
    }
}
