//! Key layout for approval records and their indexes.
//!
//! Existing persisted data uses exactly these shapes, so they must not change.

use signoff_core::domain::approval::{ApprovalCode, ApprovalId};

const PREFIX: &str = "approval";

/// Width of the zero-padded inverted timestamp; `i64::MAX` has 19 digits.
const INVERTED_TS_WIDTH: usize = 19;

pub fn record(id: &ApprovalId) -> String {
    format!("{PREFIX}:record:{id}")
}

pub fn code(code: &ApprovalCode) -> String {
    format!("{PREFIX}:code:{code}")
}

pub fn requester_index(user_id: &str, created_at: i64, id: &ApprovalId) -> String {
    format!("{}{}:{id}", requester_prefix(user_id), inverted_timestamp(created_at))
}

pub fn approver_index(user_id: &str, created_at: i64, id: &ApprovalId) -> String {
    format!("{}{}:{id}", approver_prefix(user_id), inverted_timestamp(created_at))
}

pub fn requester_prefix(user_id: &str) -> String {
    format!("{PREFIX}:index:requester:{user_id}:")
}

pub fn approver_prefix(user_id: &str) -> String {
    format!("{PREFIX}:index:approver:{user_id}:")
}

/// Prefix shared by every approver index entry, regardless of user.
pub fn approver_root() -> String {
    format!("{PREFIX}:index:approver:")
}

/// `i64::MAX - created_at`, zero-padded so lexicographic order is newest-first.
pub fn inverted_timestamp(created_at: i64) -> String {
    format!("{:0width$}", i64::MAX - created_at.max(0), width = INVERTED_TS_WIDTH)
}

/// Record id embedded at the tail of an index key.
///
/// User ids are opaque and may contain `:`, so the id is located relative to the
/// fixed-width timestamp segment rather than by splitting from the front.
pub fn id_from_index_key(key: &str) -> Option<ApprovalId> {
    let (head, id) = key.rsplit_once(':')?;
    let (_, timestamp) = head.rsplit_once(':')?;
    let well_formed = !id.is_empty()
        && timestamp.len() == INVERTED_TS_WIDTH
        && timestamp.bytes().all(|byte| byte.is_ascii_digit());
    well_formed.then(|| ApprovalId(id.to_string()))
}

/// Record id of an index key that belongs exactly to `prefix`.
///
/// Rejects keys of a different user whose id merely starts with the same characters
/// followed by `:`.
pub fn id_under_prefix(key: &str, prefix: &str) -> Option<ApprovalId> {
    let rest = key.strip_prefix(prefix)?;
    let (timestamp, id) = rest.split_once(':')?;
    let well_formed = !id.is_empty()
        && timestamp.len() == INVERTED_TS_WIDTH
        && timestamp.bytes().all(|byte| byte.is_ascii_digit());
    well_formed.then(|| ApprovalId(id.to_string()))
}
