use async_trait::async_trait;

use signoff_core::domain::approval::{ApprovalCode, ApprovalId, ApprovalRecord};
use signoff_core::errors::ApprovalError;

pub mod approval;

pub use approval::ApprovalStore;

/// A record an index pointed at but which could not be loaded.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SkippedRecord {
    pub id: ApprovalId,
    pub error: ApprovalError,
}

/// Result of an index-driven listing: everything that loaded, plus what did not.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RecordListing {
    pub records: Vec<ApprovalRecord>,
    pub skipped: Vec<SkippedRecord>,
}

#[async_trait]
pub trait ApprovalRepository: Send + Sync {
    /// Writes the whole record and its indexes. Refuses to overwrite a finalized record.
    async fn save(&self, record: &ApprovalRecord) -> Result<(), ApprovalError>;

    /// Like `save`, but a finalized record may still change its verification and
    /// delivery-tracking fields.
    async fn amend(&self, record: &ApprovalRecord) -> Result<(), ApprovalError>;

    async fn get_by_id(&self, id: &ApprovalId) -> Result<ApprovalRecord, ApprovalError>;

    async fn get_by_code(&self, code: &ApprovalCode) -> Result<ApprovalRecord, ApprovalError>;

    async fn code_exists(&self, code: &ApprovalCode) -> Result<bool, ApprovalError>;

    /// Records where `user_id` is requester or approver, newest first.
    async fn list_by_user(&self, user_id: &str) -> Result<RecordListing, ApprovalError>;

    /// Every record reachable from the approver index, newest first.
    async fn list_approver_indexed(&self) -> Result<RecordListing, ApprovalError>;

    /// Removes the primary key only. Index entries are left dangling.
    async fn delete(&self, id: &ApprovalId) -> Result<(), ApprovalError>;
}
