pub mod audit;
pub mod notify;
pub mod service;
pub mod sweeper;

pub use audit::TracingAuditSink;
pub use notify::{
    classify_delivery_error, notifier_from_config, DeliveryIssue, NoopNotifier, Notification,
    NotificationEvent, Notifier, NotifyError, WebhookNotifier,
};
pub use service::{ApprovalService, CancelOrigin, SYSTEM_ACTOR, TIMEOUT_REASON};
pub use sweeper::{RetryPolicy, SweepReport, SweeperSettings, TimeoutSweeper};
