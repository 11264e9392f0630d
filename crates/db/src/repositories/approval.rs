use std::collections::HashSet;
use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, warn};

use signoff_core::domain::approval::{ApprovalCode, ApprovalId, ApprovalRecord, ApprovalStatus};
use signoff_core::errors::ApprovalError;

use super::{ApprovalRepository, RecordListing, SkippedRecord};
use crate::keys;
use crate::kv::{scan_prefix, KeyValueStore};

pub const DEFAULT_PAGE_SIZE: usize = 1_000;

/// Approval records over a bare key/value store, with code, requester and approver
/// indexes maintained alongside each write.
///
/// Writes are not atomic as a group. `save` writes the primary record first and the
/// indexes after it, so an index entry may briefly (or, after a crash, permanently) point
/// at nothing; readers report that as not-found. The finalized-record check is a plain
/// read before the write, so two concurrent finalizations of one pending record can both
/// succeed and the later write wins.
pub struct ApprovalStore {
    kv: Arc<dyn KeyValueStore>,
    page_size: usize,
}

impl ApprovalStore {
    pub fn new(kv: Arc<dyn KeyValueStore>) -> Self {
        Self { kv, page_size: DEFAULT_PAGE_SIZE }
    }

    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    async fn read(&self, id: &ApprovalId) -> Result<Option<ApprovalRecord>, ApprovalError> {
        let key = keys::record(id);
        let bytes =
            self.kv.get(&key).await.map_err(|err| ApprovalError::persistence("get", &key, err))?;
        bytes.map(|bytes| decode(&key, &bytes)).transpose()
    }

    async fn put(
        &self,
        operation: &'static str,
        key: String,
        value: Vec<u8>,
    ) -> Result<(), ApprovalError> {
        self.kv
            .set(&key, value)
            .await
            .map_err(|err| ApprovalError::persistence(operation, key, err))
    }

    async fn write_primary(&self, record: &ApprovalRecord) -> Result<(), ApprovalError> {
        let key = keys::record(&record.id);
        let bytes = serde_json::to_vec(record)
            .map_err(|err| ApprovalError::persistence("encode", &key, err))?;
        self.put("save", key, bytes).await
    }

    async fn write_indexes(&self, record: &ApprovalRecord) -> Result<(), ApprovalError> {
        let id_bytes = record.id.0.as_bytes().to_vec();
        self.put("index_code", keys::code(&record.code), id_bytes.clone()).await?;
        self.put(
            "index_requester",
            keys::requester_index(&record.requester.id, record.created_at, &record.id),
            id_bytes.clone(),
        )
        .await?;
        self.put(
            "index_approver",
            keys::approver_index(&record.approver.id, record.created_at, &record.id),
            id_bytes,
        )
        .await
    }

    async fn write_all(&self, record: &ApprovalRecord) -> Result<(), ApprovalError> {
        self.write_primary(record).await?;
        self.write_indexes(record).await
    }

    async fn scan(&self, prefix: &str) -> Result<Vec<String>, ApprovalError> {
        scan_prefix(self.kv.as_ref(), prefix, self.page_size)
            .await
            .map_err(|err| ApprovalError::persistence("list", prefix, err))
    }

    async fn load_listing(&self, ids: Vec<ApprovalId>) -> RecordListing {
        let mut listing = RecordListing::default();

        for id in ids {
            let loaded = match self.read(&id).await {
                Ok(Some(record)) => Ok(record),
                Ok(None) => Err(ApprovalError::NotFound {
                    reference: id.0.clone(),
                    dangling_id: Some(id.0.clone()),
                }),
                Err(error) => Err(error),
            };

            match loaded {
                Ok(record) => listing.records.push(record),
                Err(error) => {
                    warn!(
                        event_name = "approval.store.record_skipped",
                        approval_id = %id,
                        error = %error,
                        "skipping indexed approval record that failed to load"
                    );
                    listing.skipped.push(SkippedRecord { id, error });
                }
            }
        }

        listing.records.sort_by(|left, right| {
            right.created_at.cmp(&left.created_at).then_with(|| left.id.cmp(&right.id))
        });
        listing
    }
}

fn decode(key: &str, bytes: &[u8]) -> Result<ApprovalRecord, ApprovalError> {
    serde_json::from_slice(bytes)
        .map_err(|err| ApprovalError::Corrupt { key: key.to_string(), message: err.to_string() })
}

fn validate(record: &ApprovalRecord) -> Result<(), ApprovalError> {
    if record.id.0.trim().is_empty() {
        return Err(ApprovalError::missing("id"));
    }
    if record.code.0.trim().is_empty() {
        return Err(ApprovalError::missing("code"));
    }
    if record.requester.id.trim().is_empty() {
        return Err(ApprovalError::missing("requester"));
    }
    if record.approver.id.trim().is_empty() {
        return Err(ApprovalError::missing("approver"));
    }
    if record.created_at <= 0 {
        return Err(ApprovalError::InvalidInput {
            field: "created_at",
            reason: "must be a positive epoch-millisecond timestamp".to_string(),
        });
    }
    if record.verified && record.status != ApprovalStatus::Approved {
        return Err(ApprovalError::NotApproved { id: record.id.clone(), status: record.status });
    }
    Ok(())
}

/// Finalized records may only gain verification once and update delivery tracking.
fn check_amendment(
    existing: &ApprovalRecord,
    proposed: &ApprovalRecord,
) -> Result<(), ApprovalError> {
    if !existing.same_decision_state(proposed) {
        return Err(ApprovalError::Immutable { id: existing.id.clone(), status: existing.status });
    }

    if existing.verified {
        let unchanged = proposed.verified
            && proposed.verified_at == existing.verified_at
            && proposed.verification_comment == existing.verification_comment;
        if !unchanged {
            return Err(ApprovalError::AlreadyVerified { id: existing.id.clone() });
        }
    }

    Ok(())
}

fn dedup(ids: impl IntoIterator<Item = ApprovalId>) -> Vec<ApprovalId> {
    let mut seen = HashSet::new();
    ids.into_iter().filter(|id| seen.insert(id.clone())).collect()
}

#[async_trait]
impl ApprovalRepository for ApprovalStore {
    async fn save(&self, record: &ApprovalRecord) -> Result<(), ApprovalError> {
        validate(record)?;

        if let Some(existing) = self.read(&record.id).await? {
            if existing.status.is_final() {
                return Err(ApprovalError::Immutable {
                    id: existing.id.clone(),
                    status: existing.status,
                });
            }
        }

        self.write_all(record).await
    }

    async fn amend(&self, record: &ApprovalRecord) -> Result<(), ApprovalError> {
        validate(record)?;

        let Some(existing) = self.read(&record.id).await? else {
            return Err(ApprovalError::not_found(record.id.0.clone()));
        };

        if existing.is_pending() {
            return self.write_all(record).await;
        }

        check_amendment(&existing, record)?;
        self.write_primary(record).await
    }

    async fn get_by_id(&self, id: &ApprovalId) -> Result<ApprovalRecord, ApprovalError> {
        self.read(id).await?.ok_or_else(|| ApprovalError::not_found(id.0.clone()))
    }

    async fn get_by_code(&self, code: &ApprovalCode) -> Result<ApprovalRecord, ApprovalError> {
        let key = keys::code(code);
        let pointer =
            self.kv.get(&key).await.map_err(|err| ApprovalError::persistence("get", &key, err))?;
        let Some(bytes) = pointer else {
            return Err(ApprovalError::not_found(code.0.clone()));
        };

        let id = String::from_utf8(bytes)
            .map(ApprovalId)
            .map_err(|err| ApprovalError::Corrupt { key: key.clone(), message: err.to_string() })?;

        match self.read(&id).await? {
            Some(record) => Ok(record),
            None => {
                warn!(
                    event_name = "approval.store.dangling_code_index",
                    code = %code,
                    approval_id = %id,
                    "code index points at a missing record"
                );
                Err(ApprovalError::NotFound { reference: code.0.clone(), dangling_id: Some(id.0) })
            }
        }
    }

    async fn code_exists(&self, code: &ApprovalCode) -> Result<bool, ApprovalError> {
        let key = keys::code(code);
        self.kv
            .get(&key)
            .await
            .map(|value| value.is_some())
            .map_err(|err| ApprovalError::persistence("get", key, err))
    }

    async fn list_by_user(&self, user_id: &str) -> Result<RecordListing, ApprovalError> {
        let user_id = user_id.trim();
        if user_id.is_empty() {
            return Err(ApprovalError::missing("user_id"));
        }

        let requester_prefix = keys::requester_prefix(user_id);
        let approver_prefix = keys::approver_prefix(user_id);
        let requested = self.scan(&requester_prefix).await?;
        let approving = self.scan(&approver_prefix).await?;

        let ids = requested
            .iter()
            .filter_map(|key| keys::id_under_prefix(key, &requester_prefix))
            .chain(approving.iter().filter_map(|key| keys::id_under_prefix(key, &approver_prefix)));

        let mut listing = self.load_listing(dedup(ids)).await;
        listing.records.retain(|record| {
            let involved = record.requester.id == user_id || record.approver.id == user_id;
            if !involved {
                debug!(
                    event_name = "approval.store.stale_user_index",
                    approval_id = %record.id,
                    user_id,
                    "user index entry no longer matches the record's parties"
                );
            }
            involved
        });
        Ok(listing)
    }

    async fn list_approver_indexed(&self) -> Result<RecordListing, ApprovalError> {
        let index_keys = self.scan(&keys::approver_root()).await?;
        let ids = index_keys.iter().filter_map(|key| keys::id_from_index_key(key));
        Ok(self.load_listing(dedup(ids)).await)
    }

    async fn delete(&self, id: &ApprovalId) -> Result<(), ApprovalError> {
        let key = keys::record(id);
        self.kv.delete(&key).await.map_err(|err| ApprovalError::persistence("delete", key, err))
    }
}
