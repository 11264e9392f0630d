//! Outbound notification boundary.
//!
//! Notifications carry data only (what happened, to which record, for whom); turning that
//! into human-readable text is the receiving adapter's job. Every call made from the
//! approval service is best-effort.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde::Serialize;
use serde_json::Value;
use thiserror::Error;

use signoff_core::config::NotificationConfig;
use signoff_core::domain::approval::{ApprovalCode, ApprovalId, ApprovalRecord, ApprovalStatus};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationEvent {
    Requested,
    Approved,
    Denied,
    Canceled,
    TimedOut,
    Verified,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Notification {
    pub event: NotificationEvent,
    pub approval_id: ApprovalId,
    pub code: ApprovalCode,
    pub recipient_id: String,
    pub status: ApprovalStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    pub channel_id: String,
    pub team_id: String,
}

impl Notification {
    pub fn for_record(
        event: NotificationEvent,
        record: &ApprovalRecord,
        recipient_id: impl Into<String>,
    ) -> Self {
        let reason = match event {
            NotificationEvent::Canceled | NotificationEvent::TimedOut => {
                record.canceled_reason.clone()
            }
            NotificationEvent::Approved | NotificationEvent::Denied => {
                record.decision_comment.clone()
            }
            NotificationEvent::Verified => record.verification_comment.clone(),
            NotificationEvent::Requested => None,
        };

        Self {
            event,
            approval_id: record.id.clone(),
            code: record.code.clone(),
            recipient_id: recipient_id.into(),
            status: record.status,
            reason,
            channel_id: record.channel_id.clone(),
            team_id: record.team_id.clone(),
        }
    }
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum NotifyError {
    #[error("notification transport failed: {0}")]
    Transport(String),
    #[error("notification rejected with status {status}: {body}")]
    Rejected { status: u16, body: String },
    #[error("notification response could not be decoded: {0}")]
    Decode(String),
}

#[async_trait]
pub trait Notifier: Send + Sync {
    /// Sends `notification`; returns the external post id when the receiver reports one.
    async fn notify(&self, notification: &Notification) -> Result<Option<String>, NotifyError>;

    /// Rewrites a previously sent post so it no longer offers stale actions.
    async fn edit(&self, post_id: &str, notification: &Notification) -> Result<(), NotifyError>;

    fn is_enabled(&self) -> bool {
        true
    }
}

#[derive(Clone, Copy, Debug, Default)]
pub struct NoopNotifier;

#[async_trait]
impl Notifier for NoopNotifier {
    async fn notify(&self, _notification: &Notification) -> Result<Option<String>, NotifyError> {
        Ok(None)
    }

    async fn edit(&self, _post_id: &str, _notification: &Notification) -> Result<(), NotifyError> {
        Ok(())
    }

    fn is_enabled(&self) -> bool {
        false
    }
}

/// Posts notifications as JSON to a single webhook endpoint.
pub struct WebhookNotifier {
    client: Client,
    url: String,
    bot_token: Option<SecretString>,
}

#[derive(Serialize)]
struct WebhookPayload<'a> {
    action: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    post_id: Option<&'a str>,
    #[serde(flatten)]
    notification: &'a Notification,
}

impl WebhookNotifier {
    pub fn new(
        url: impl Into<String>,
        bot_token: Option<SecretString>,
        timeout: Duration,
    ) -> Result<Self, NotifyError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|error| NotifyError::Transport(error.to_string()))?;
        Ok(Self { client, url: url.into(), bot_token })
    }

    async fn post(&self, payload: &WebhookPayload<'_>) -> Result<String, NotifyError> {
        let mut request = self.client.post(&self.url).json(payload);
        if let Some(token) = &self.bot_token {
            request = request.bearer_auth(token.expose_secret());
        }

        let response =
            request.send().await.map_err(|error| NotifyError::Transport(error.to_string()))?;
        let status = response.status();
        let body =
            response.text().await.map_err(|error| NotifyError::Transport(error.to_string()))?;

        if !status.is_success() {
            return Err(NotifyError::Rejected { status: status.as_u16(), body });
        }
        Ok(body)
    }
}

fn post_id_from_body(body: &str) -> Result<Option<String>, NotifyError> {
    if body.trim().is_empty() {
        return Ok(None);
    }
    let value: Value =
        serde_json::from_str(body).map_err(|error| NotifyError::Decode(error.to_string()))?;
    Ok(value
        .get("post_id")
        .or_else(|| value.get("id"))
        .and_then(Value::as_str)
        .filter(|id| !id.is_empty())
        .map(str::to_string))
}

#[async_trait]
impl Notifier for WebhookNotifier {
    async fn notify(&self, notification: &Notification) -> Result<Option<String>, NotifyError> {
        let body =
            self.post(&WebhookPayload { action: "notify", post_id: None, notification }).await?;
        post_id_from_body(&body)
    }

    async fn edit(&self, post_id: &str, notification: &Notification) -> Result<(), NotifyError> {
        self.post(&WebhookPayload { action: "edit", post_id: Some(post_id), notification })
            .await
            .map(|_| ())
    }
}

/// Builds the notifier described by `[notifications]`.
pub fn notifier_from_config(
    config: &NotificationConfig,
) -> Result<Arc<dyn Notifier>, NotifyError> {
    let url = config.webhook_url.as_deref().map(str::trim).filter(|url| !url.is_empty());
    match (config.enabled, url) {
        (true, Some(url)) => Ok(Arc::new(WebhookNotifier::new(
            url,
            config.bot_token.clone(),
            Duration::from_secs(config.timeout_secs.max(1)),
        )?)),
        _ => Ok(Arc::new(NoopNotifier)),
    }
}

/// Known reasons a notification could not reach its recipient.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DeliveryIssue {
    DirectMessagesDisabled,
    Blocked,
    RecipientNotFound,
    Other,
}

impl DeliveryIssue {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::DirectMessagesDisabled => "direct_messages_disabled",
            Self::Blocked => "blocked",
            Self::RecipientNotFound => "recipient_not_found",
            Self::Other => "other",
        }
    }

    /// Operator-facing next step.
    pub fn hint(&self) -> &'static str {
        match self {
            Self::DirectMessagesDisabled => {
                "recipient has direct messages disabled; ask them to allow messages from the bot"
            }
            Self::Blocked => "recipient has blocked the bot; they must unblock it to be notified",
            Self::RecipientNotFound => {
                "recipient account was not found; it may be deactivated or the id is stale"
            }
            Self::Other => "check the notification webhook logs for details",
        }
    }
}

/// Classifies a delivery failure from its error text. Never affects control flow.
pub fn classify_delivery_error(text: &str) -> DeliveryIssue {
    let text = text.to_ascii_lowercase();
    let mentions = |needles: &[&str]| needles.iter().any(|needle| text.contains(needle));

    if mentions(&["direct messages", "dm disabled", "dms disabled", "messages_disabled"]) {
        DeliveryIssue::DirectMessagesDisabled
    } else if mentions(&["blocked"]) {
        DeliveryIssue::Blocked
    } else if mentions(&["not found", "not_found", "unknown user", "status 404"]) {
        DeliveryIssue::RecipientNotFound
    } else {
        DeliveryIssue::Other
    }
}
