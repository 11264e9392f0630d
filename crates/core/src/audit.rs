use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::approval::{ApprovalCode, ApprovalId};

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum AuditCategory {
    Lifecycle,
    Verification,
    Sweep,
    Delivery,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum AuditOutcome {
    Success,
    Rejected,
    Failed,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditEvent {
    pub event_id: String,
    pub approval_id: Option<ApprovalId>,
    pub code: Option<ApprovalCode>,
    pub event_type: String,
    pub category: AuditCategory,
    pub actor: String,
    pub outcome: AuditOutcome,
    pub metadata: BTreeMap<String, String>,
    pub occurred_at: DateTime<Utc>,
}

impl AuditEvent {
    pub fn new(
        event_type: impl Into<String>,
        category: AuditCategory,
        actor: impl Into<String>,
        outcome: AuditOutcome,
    ) -> Self {
        Self {
            event_id: Uuid::new_v4().to_string(),
            approval_id: None,
            code: None,
            event_type: event_type.into(),
            category,
            actor: actor.into(),
            outcome,
            metadata: BTreeMap::new(),
            occurred_at: Utc::now(),
        }
    }

    pub fn for_record(mut self, id: &ApprovalId, code: &ApprovalCode) -> Self {
        self.approval_id = Some(id.clone());
        self.code = Some(code.clone());
        self
    }

    pub fn with_code(mut self, code: &ApprovalCode) -> Self {
        self.code = Some(code.clone());
        self
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }
}

pub trait AuditSink: Send + Sync {
    fn emit(&self, event: AuditEvent);
}

#[derive(Clone, Default)]
pub struct InMemoryAuditSink {
    events: Arc<Mutex<Vec<AuditEvent>>>,
}

impl InMemoryAuditSink {
    pub fn events(&self) -> Vec<AuditEvent> {
        match self.events.lock() {
            Ok(events) => events.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    pub fn events_of_type(&self, event_type: &str) -> Vec<AuditEvent> {
        self.events().into_iter().filter(|event| event.event_type == event_type).collect()
    }
}

impl AuditSink for InMemoryAuditSink {
    fn emit(&self, event: AuditEvent) {
        match self.events.lock() {
            Ok(mut events) => events.push(event),
            Err(poisoned) => poisoned.into_inner().push(event),
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::{
        audit::{AuditCategory, AuditEvent, AuditOutcome, AuditSink, InMemoryAuditSink},
        domain::approval::{ApprovalCode, ApprovalId},
    };

    #[test]
    fn in_memory_sink_records_events_with_record_fields() {
        let sink = InMemoryAuditSink::default();
        sink.emit(
            AuditEvent::new(
                "approval.canceled",
                AuditCategory::Lifecycle,
                "u-alice",
                AuditOutcome::Success,
            )
            .for_record(&ApprovalId("rec-1".to_owned()), &ApprovalCode("A-7K3MQX".to_owned()))
            .with_metadata("from", "pending")
            .with_metadata("to", "canceled"),
        );

        let events = sink.events();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].actor, "u-alice");
        assert_eq!(events[0].approval_id.as_ref().map(|id| id.0.as_str()), Some("rec-1"));
        assert_eq!(events[0].code.as_ref().map(|code| code.0.as_str()), Some("A-7K3MQX"));
        assert_eq!(events[0].metadata.get("to").map(String::as_str), Some("canceled"));
    }

    #[test]
    fn events_of_type_filters_by_event_name() {
        let sink = InMemoryAuditSink::default();
        sink.emit(AuditEvent::new("a", AuditCategory::Sweep, "system", AuditOutcome::Success));
        sink.emit(AuditEvent::new("b", AuditCategory::Delivery, "system", AuditOutcome::Failed));

        assert_eq!(sink.events_of_type("b").len(), 1);
        assert!(sink.events_of_type("c").is_empty());
    }
}
