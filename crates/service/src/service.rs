use std::sync::Arc;

use tracing::{error, info, warn};
use uuid::Uuid;

use signoff_core::audit::{AuditCategory, AuditEvent, AuditOutcome, AuditSink};
use signoff_core::clock::Clock;
use signoff_core::code::{generate_unique_code, parse_code};
use signoff_core::domain::approval::{
    ApprovalId, ApprovalRecord, Decision, NewApproval, Party, UserSnapshot,
};
use signoff_core::errors::{ApprovalError, ErrorKind};
use signoff_db::repositories::{ApprovalRepository, RecordListing};

use crate::notify::{classify_delivery_error, Notification, NotificationEvent, Notifier};

/// Reason recorded when the sweeper cancels a request nobody answered.
pub const TIMEOUT_REASON: &str = "no response within the timeout window";
/// Actor recorded in audit events for system-initiated transitions.
pub const SYSTEM_ACTOR: &str = "system";

/// Who asked for a cancellation.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CancelOrigin {
    Requester,
    Timeout,
}

impl CancelOrigin {
    fn as_str(&self) -> &'static str {
        match self {
            Self::Requester => "requester",
            Self::Timeout => "timeout",
        }
    }
}

/// State transitions for approval records.
///
/// Every transition validates its inputs before touching the store, checks the actor and
/// the current status, persists, and only then attempts notifications. Notification and
/// delivery-tracking failures are logged and never change the result.
pub struct ApprovalService {
    repository: Arc<dyn ApprovalRepository>,
    notifier: Arc<dyn Notifier>,
    audit: Arc<dyn AuditSink>,
    clock: Arc<dyn Clock>,
}

fn required(field: &'static str, value: &str) -> Result<String, ApprovalError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        Err(ApprovalError::missing(field))
    } else {
        Ok(trimmed.to_string())
    }
}

fn optional(value: Option<&str>) -> Option<String> {
    value.map(str::trim).filter(|value| !value.is_empty()).map(str::to_string)
}

fn outcome_for(error: &ApprovalError) -> AuditOutcome {
    match error.kind() {
        ErrorKind::Persistence | ErrorKind::CodeGenerationExhausted => AuditOutcome::Failed,
        _ => AuditOutcome::Rejected,
    }
}

impl ApprovalService {
    pub fn new(
        repository: Arc<dyn ApprovalRepository>,
        notifier: Arc<dyn Notifier>,
        audit: Arc<dyn AuditSink>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self { repository, notifier, audit, clock }
    }

    pub fn now_millis(&self) -> i64 {
        self.clock.now_millis()
    }

    pub fn repository(&self) -> &Arc<dyn ApprovalRepository> {
        &self.repository
    }

    pub async fn create(&self, request: NewApproval) -> Result<ApprovalRecord, ApprovalError> {
        let request = NewApproval {
            requester: normalize_user("requester", request.requester)?,
            approver: normalize_user("approver", request.approver)?,
            description: required("description", &request.description)?,
            channel_id: request.channel_id.trim().to_string(),
            team_id: request.team_id.trim().to_string(),
        };
        let actor = request.requester.id.clone();

        let repository = Arc::clone(&self.repository);
        let allocated = generate_unique_code(move |candidate| {
            let repository = Arc::clone(&repository);
            async move { repository.code_exists(&candidate).await }
        })
        .await;
        let code = match allocated {
            Ok(code) => code,
            Err(error) => {
                error!(
                    event_name = "approval.create.code_failed",
                    actor = %actor,
                    error = %error,
                    "could not allocate an approval code"
                );
                self.audit.emit(
                    AuditEvent::new(
                        "approval.created",
                        AuditCategory::Lifecycle,
                        &actor,
                        outcome_for(&error),
                    )
                    .with_metadata("error", error.to_string()),
                );
                return Err(error);
            }
        };

        let record = ApprovalRecord::new_pending(
            ApprovalId(Uuid::new_v4().to_string()),
            code,
            request,
            self.clock.now_millis(),
        );

        if let Err(error) = self.repository.save(&record).await {
            self.report_failure(
                "approval.created",
                AuditCategory::Lifecycle,
                &actor,
                &record,
                &error,
            );
            return Err(error);
        }

        info!(
            event_name = "approval.create.persisted",
            approval_id = %record.id,
            code = %record.code,
            requester_id = %record.requester.id,
            approver_id = %record.approver.id,
            "approval request created"
        );
        self.audit.emit(
            AuditEvent::new(
                "approval.created",
                AuditCategory::Lifecycle,
                &actor,
                AuditOutcome::Success,
            )
            .for_record(&record.id, &record.code),
        );

        Ok(self.announce_request(record).await)
    }

    /// Cancels a pending request on behalf of its requester.
    pub async fn cancel_approval(
        &self,
        code: &str,
        requester_id: &str,
        reason: &str,
        details: Option<&str>,
    ) -> Result<ApprovalRecord, ApprovalError> {
        self.cancel(code, requester_id, reason, details, CancelOrigin::Requester).await
    }

    /// Cancels a stale pending request through the same guarded path users go through.
    pub async fn cancel_expired(
        &self,
        record: &ApprovalRecord,
    ) -> Result<ApprovalRecord, ApprovalError> {
        let code = record.code.0.as_str();
        self.cancel(code, &record.requester.id, TIMEOUT_REASON, None, CancelOrigin::Timeout).await
    }

    async fn cancel(
        &self,
        code: &str,
        requester_id: &str,
        reason: &str,
        details: Option<&str>,
        origin: CancelOrigin,
    ) -> Result<ApprovalRecord, ApprovalError> {
        let code = parse_code(code)?;
        let requester_id = required("requester_id", requester_id)?;
        let reason = required("reason", reason)?;
        let details = optional(details);
        let actor = match origin {
            CancelOrigin::Requester => requester_id.clone(),
            CancelOrigin::Timeout => SYSTEM_ACTOR.to_string(),
        };

        let mut record = self.repository.get_by_code(&code).await?;
        let checked = record
            .ensure_actor(Party::Requester, &requester_id)
            .and_then(|()| record.cancel(reason, details, self.clock.now_millis()));
        if let Err(error) = checked {
            self.report_failure(
                "approval.canceled",
                AuditCategory::Lifecycle,
                &actor,
                &record,
                &error,
            );
            return Err(error);
        }

        if let Err(error) = self.repository.save(&record).await {
            self.report_failure(
                "approval.canceled",
                AuditCategory::Lifecycle,
                &actor,
                &record,
                &error,
            );
            return Err(error);
        }

        info!(
            event_name = "approval.cancel.persisted",
            approval_id = %record.id,
            code = %record.code,
            origin = origin.as_str(),
            "approval request canceled"
        );
        self.audit.emit(
            AuditEvent::new(
                "approval.canceled",
                AuditCategory::Lifecycle,
                &actor,
                AuditOutcome::Success,
            )
            .for_record(&record.id, &record.code)
            .with_metadata("origin", origin.as_str())
            .with_metadata("from", "pending")
            .with_metadata("to", record.status.as_str()),
        );

        let (event, recipient) = match origin {
            CancelOrigin::Requester => (NotificationEvent::Canceled, record.approver.id.clone()),
            CancelOrigin::Timeout => (NotificationEvent::TimedOut, record.requester.id.clone()),
        };
        Ok(self.announce_outcome(record, event, recipient).await)
    }

    pub async fn record_decision(
        &self,
        id: &str,
        approver_id: &str,
        decision: &str,
        comment: Option<&str>,
    ) -> Result<ApprovalRecord, ApprovalError> {
        let id = ApprovalId(required("id", id)?);
        let approver_id = required("approver_id", approver_id)?;
        let decision = Decision::parse(decision)?;
        let comment = optional(comment);

        let mut record = self.repository.get_by_id(&id).await?;
        let checked = record
            .ensure_actor(Party::Approver, &approver_id)
            .and_then(|()| record.decide(decision, comment, self.clock.now_millis()));
        if let Err(error) = checked {
            self.report_failure(
                "approval.decided",
                AuditCategory::Lifecycle,
                &approver_id,
                &record,
                &error,
            );
            return Err(error);
        }

        if let Err(error) = self.repository.save(&record).await {
            self.report_failure(
                "approval.decided",
                AuditCategory::Lifecycle,
                &approver_id,
                &record,
                &error,
            );
            return Err(error);
        }

        info!(
            event_name = "approval.decision.persisted",
            approval_id = %record.id,
            code = %record.code,
            status = %record.status,
            "approval decision recorded"
        );
        self.audit.emit(
            AuditEvent::new(
                "approval.decided",
                AuditCategory::Lifecycle,
                &approver_id,
                AuditOutcome::Success,
            )
            .for_record(&record.id, &record.code)
            .with_metadata("from", "pending")
            .with_metadata("to", record.status.as_str()),
        );

        let event = match decision {
            Decision::Approved => NotificationEvent::Approved,
            Decision::Denied => NotificationEvent::Denied,
        };
        let recipient = record.requester.id.clone();
        Ok(self.announce_outcome(record, event, recipient).await)
    }

    pub async fn verify_request(
        &self,
        code: &str,
        requester_id: &str,
        comment: Option<&str>,
    ) -> Result<ApprovalRecord, ApprovalError> {
        let code = parse_code(code)?;
        let requester_id = required("requester_id", requester_id)?;
        let comment = optional(comment);

        let mut record = self.repository.get_by_code(&code).await?;
        let checked = record
            .ensure_actor(Party::Requester, &requester_id)
            .and_then(|()| record.verify(comment, self.clock.now_millis()));
        if let Err(error) = checked {
            self.report_failure(
                "approval.verified",
                AuditCategory::Verification,
                &requester_id,
                &record,
                &error,
            );
            return Err(error);
        }

        if let Err(error) = self.repository.amend(&record).await {
            self.report_failure(
                "approval.verified",
                AuditCategory::Verification,
                &requester_id,
                &record,
                &error,
            );
            return Err(error);
        }

        info!(
            event_name = "approval.verify.persisted",
            approval_id = %record.id,
            code = %record.code,
            "approval verified by requester"
        );
        self.audit.emit(
            AuditEvent::new(
                "approval.verified",
                AuditCategory::Verification,
                &requester_id,
                AuditOutcome::Success,
            )
            .for_record(&record.id, &record.code),
        );

        if self.notifier.is_enabled() {
            let approver_id = record.approver.id.clone();
            let notification =
                Notification::for_record(NotificationEvent::Verified, &record, approver_id);
            if let Err(error) = self.notifier.notify(&notification).await {
                self.report_delivery_failure("notify", &record, &error.to_string());
            }
        }

        Ok(record)
    }

    pub async fn get_by_id(&self, id: &str) -> Result<ApprovalRecord, ApprovalError> {
        let id = ApprovalId(required("id", id)?);
        self.repository.get_by_id(&id).await
    }

    pub async fn get_by_code(&self, code: &str) -> Result<ApprovalRecord, ApprovalError> {
        let code = parse_code(code)?;
        self.repository.get_by_code(&code).await
    }

    pub async fn list_by_user(&self, user_id: &str) -> Result<RecordListing, ApprovalError> {
        let user_id = required("user_id", user_id)?;
        self.repository.list_by_user(&user_id).await
    }

    /// Tells the approver about a new request and remembers the post for later edits.
    async fn announce_request(&self, mut record: ApprovalRecord) -> ApprovalRecord {
        if !self.notifier.is_enabled() {
            return record;
        }

        let approver_id = record.approver.id.clone();
        let notification =
            Notification::for_record(NotificationEvent::Requested, &record, approver_id);
        match self.notifier.notify(&notification).await {
            Ok(post_id) => {
                let mut tracked = record.clone();
                tracked.notification_sent = true;
                tracked.notification_post_id = post_id;
                self.persist_tracking(&mut record, tracked).await;
            }
            Err(error) => self.report_delivery_failure("notify", &record, &error.to_string()),
        }
        record
    }

    /// Notifies `recipient` of a final outcome and retires the approver's original post.
    async fn announce_outcome(
        &self,
        mut record: ApprovalRecord,
        event: NotificationEvent,
        recipient: String,
    ) -> ApprovalRecord {
        if !self.notifier.is_enabled() || record.outcome_notified {
            return record;
        }

        let notification = Notification::for_record(event, &record, recipient);
        let delivered = match self.notifier.notify(&notification).await {
            Ok(_) => true,
            Err(error) => {
                self.report_delivery_failure("notify", &record, &error.to_string());
                false
            }
        };

        if let Some(post_id) = record.notification_post_id.clone() {
            let approver_id = record.approver.id.clone();
            let approver_view = Notification::for_record(event, &record, approver_id);
            if let Err(error) = self.notifier.edit(&post_id, &approver_view).await {
                self.report_delivery_failure("edit", &record, &error.to_string());
            }
        }

        if delivered {
            let mut tracked = record.clone();
            tracked.outcome_notified = true;
            self.persist_tracking(&mut record, tracked).await;
        }
        record
    }

    async fn persist_tracking(&self, record: &mut ApprovalRecord, tracked: ApprovalRecord) {
        match self.repository.amend(&tracked).await {
            Ok(()) => *record = tracked,
            Err(error) => warn!(
                event_name = "approval.delivery.tracking_failed",
                approval_id = %record.id,
                code = %record.code,
                error = %error,
                "could not persist notification tracking"
            ),
        }
    }

    fn report_failure(
        &self,
        event_type: &'static str,
        category: AuditCategory,
        actor: &str,
        record: &ApprovalRecord,
        error: &ApprovalError,
    ) {
        if error.kind() == ErrorKind::Persistence {
            error!(
                event_name = "approval.persist.failed",
                transition = event_type,
                approval_id = %record.id,
                code = %record.code,
                error = %error,
                "approval transition could not be persisted"
            );
        }
        self.audit.emit(
            AuditEvent::new(event_type, category, actor, outcome_for(error))
                .for_record(&record.id, &record.code)
                .with_metadata("error", error.to_string()),
        );
    }

    fn report_delivery_failure(&self, effect: &'static str, record: &ApprovalRecord, error: &str) {
        let issue = classify_delivery_error(error);
        warn!(
            event_name = "approval.delivery.failed",
            effect,
            approval_id = %record.id,
            code = %record.code,
            issue = issue.as_str(),
            hint = issue.hint(),
            error,
            "best-effort notification failed"
        );
        self.audit.emit(
            AuditEvent::new(
                "approval.delivery",
                AuditCategory::Delivery,
                SYSTEM_ACTOR,
                AuditOutcome::Failed,
            )
            .for_record(&record.id, &record.code)
            .with_metadata("effect", effect)
            .with_metadata("issue", issue.as_str()),
        );
    }
}

fn normalize_user(field: &'static str, user: UserSnapshot) -> Result<UserSnapshot, ApprovalError> {
    let id = required(field, &user.id)?;
    Ok(UserSnapshot {
        id,
        username: user.username.trim().to_string(),
        display_name: user.display_name.trim().to_string(),
    })
}
