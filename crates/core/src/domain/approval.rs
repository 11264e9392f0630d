use std::fmt;

use serde::{Deserialize, Serialize};

use crate::errors::ApprovalError;

/// Bumped whenever the persisted shape of [`ApprovalRecord`] changes.
///
/// Version 1 records predate verification and delivery tracking; every field added since
/// then deserializes to its default, so older records load without a migration pass.
pub const SCHEMA_VERSION: u32 = 2;

#[derive(Clone, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ApprovalId(pub String);

impl fmt::Display for ApprovalId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ApprovalCode(pub String);

impl fmt::Display for ApprovalCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApprovalStatus {
    #[default]
    Pending,
    Approved,
    Denied,
    Canceled,
}

impl ApprovalStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Approved => "approved",
            Self::Denied => "denied",
            Self::Canceled => "canceled",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "pending" => Some(Self::Pending),
            "approved" => Some(Self::Approved),
            "denied" => Some(Self::Denied),
            "canceled" => Some(Self::Canceled),
            _ => None,
        }
    }

    pub fn is_final(&self) -> bool {
        !matches!(self, Self::Pending)
    }
}

impl fmt::Display for ApprovalStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The two outcomes an approver may record.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Decision {
    Approved,
    Denied,
}

impl Decision {
    pub fn parse(value: &str) -> Result<Self, ApprovalError> {
        match value.trim().to_ascii_lowercase().as_str() {
            "approved" => Ok(Self::Approved),
            "denied" => Ok(Self::Denied),
            "" => Err(ApprovalError::missing("decision")),
            other => Err(ApprovalError::InvalidInput {
                field: "decision",
                reason: format!("unsupported decision `{other}` (expected approved|denied)"),
            }),
        }
    }

    pub fn status(&self) -> ApprovalStatus {
        match self {
            Self::Approved => ApprovalStatus::Approved,
            Self::Denied => ApprovalStatus::Denied,
        }
    }
}

/// Which side of a request an actor must be on for an operation.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Party {
    Requester,
    Approver,
}

impl fmt::Display for Party {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Requester => f.write_str("requester"),
            Self::Approver => f.write_str("approver"),
        }
    }
}

/// A user profile as it looked when the request was created.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct UserSnapshot {
    pub id: String,
    pub username: String,
    pub display_name: String,
}

impl UserSnapshot {
    pub fn new(
        id: impl Into<String>,
        username: impl Into<String>,
        display_name: impl Into<String>,
    ) -> Self {
        Self { id: id.into(), username: username.into(), display_name: display_name.into() }
    }
}

/// Caller-resolved input for a new request.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NewApproval {
    pub requester: UserSnapshot,
    pub approver: UserSnapshot,
    pub description: String,
    pub channel_id: String,
    pub team_id: String,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ApprovalRecord {
    pub id: ApprovalId,
    pub code: ApprovalCode,
    pub requester: UserSnapshot,
    pub approver: UserSnapshot,
    pub description: String,
    pub status: ApprovalStatus,
    pub decision_comment: Option<String>,
    pub created_at: i64,
    pub decided_at: i64,
    pub canceled_reason: Option<String>,
    pub canceled_details: Option<String>,
    pub canceled_at: i64,
    pub verified: bool,
    pub verified_at: i64,
    pub verification_comment: Option<String>,
    pub channel_id: String,
    pub team_id: String,
    pub notification_sent: bool,
    pub notification_post_id: Option<String>,
    pub outcome_notified: bool,
    pub schema_version: u32,
}

impl ApprovalRecord {
    pub fn new_pending(
        id: ApprovalId,
        code: ApprovalCode,
        request: NewApproval,
        created_at: i64,
    ) -> Self {
        Self {
            id,
            code,
            requester: request.requester,
            approver: request.approver,
            description: request.description,
            status: ApprovalStatus::Pending,
            created_at: created_at.max(1),
            channel_id: request.channel_id,
            team_id: request.team_id,
            schema_version: SCHEMA_VERSION,
            ..Self::default()
        }
    }

    pub fn is_pending(&self) -> bool {
        self.status == ApprovalStatus::Pending
    }

    /// Checks that `actor_id` is the user on the `party` side of this request.
    pub fn ensure_actor(&self, party: Party, actor_id: &str) -> Result<(), ApprovalError> {
        let expected = match party {
            Party::Requester => &self.requester.id,
            Party::Approver => &self.approver.id,
        };
        if expected == actor_id {
            Ok(())
        } else {
            Err(ApprovalError::PermissionDenied {
                id: self.id.clone(),
                actor: actor_id.to_string(),
                required: party,
            })
        }
    }

    pub fn cancel(
        &mut self,
        reason: impl Into<String>,
        details: Option<String>,
        now: i64,
    ) -> Result<(), ApprovalError> {
        self.ensure_pending()?;
        let at = self.clamp(now);
        self.status = ApprovalStatus::Canceled;
        self.decided_at = at;
        self.canceled_at = at;
        self.canceled_reason = Some(reason.into());
        self.canceled_details = details;
        Ok(())
    }

    pub fn decide(
        &mut self,
        decision: Decision,
        comment: Option<String>,
        now: i64,
    ) -> Result<(), ApprovalError> {
        self.ensure_pending()?;
        self.status = decision.status();
        self.decided_at = self.clamp(now);
        self.decision_comment = comment;
        Ok(())
    }

    pub fn verify(&mut self, comment: Option<String>, now: i64) -> Result<(), ApprovalError> {
        if self.status != ApprovalStatus::Approved {
            return Err(ApprovalError::NotApproved { id: self.id.clone(), status: self.status });
        }
        if self.verified {
            return Err(ApprovalError::AlreadyVerified { id: self.id.clone() });
        }
        self.verified = true;
        self.verified_at = self.clamp(now);
        self.verification_comment = comment;
        Ok(())
    }

    /// True when everything except verification and delivery tracking is identical.
    pub fn same_decision_state(&self, other: &Self) -> bool {
        self.id == other.id
            && self.code == other.code
            && self.requester == other.requester
            && self.approver == other.approver
            && self.description == other.description
            && self.status == other.status
            && self.decision_comment == other.decision_comment
            && self.created_at == other.created_at
            && self.decided_at == other.decided_at
            && self.canceled_reason == other.canceled_reason
            && self.canceled_details == other.canceled_details
            && self.canceled_at == other.canceled_at
            && self.channel_id == other.channel_id
            && self.team_id == other.team_id
    }

    fn ensure_pending(&self) -> Result<(), ApprovalError> {
        if self.is_pending() {
            Ok(())
        } else {
            Err(ApprovalError::Immutable { id: self.id.clone(), status: self.status })
        }
    }

    // Event timestamps never precede creation, even if the wall clock steps backwards.
    fn clamp(&self, now: i64) -> i64 {
        now.max(self.created_at)
    }
}
