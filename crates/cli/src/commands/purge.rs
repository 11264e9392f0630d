use serde_json::json;
use signoff_core::domain::approval::ApprovalRecord;
use signoff_db::{keys, ApprovalRepository};
use tracing::warn;

use crate::commands::{open_pool, service_for, session, CommandResult, Failure};

/// Deletes the primary record only. Code and user index entries are left behind and
/// resolve as not found afterwards.
pub fn run(id: &str, confirmed: bool) -> CommandResult {
    let id = id.trim();
    if !confirmed {
        return CommandResult::failure(
            "purge",
            "confirmation_required",
            format!("refusing to delete approval `{id}` without --yes"),
            1,
        );
    }

    let session = match session() {
        Ok(session) => session,
        Err(failure) => return failure.into_result("purge"),
    };

    let result = session.runtime.block_on(async {
        let pool = open_pool(&session.config).await?;
        let service = service_for(&session.config, &pool)?;
        let outcome = async {
            let record = service.get_by_id(id).await?;
            service.repository().delete(&record.id).await?;
            Ok::<_, Failure>(record)
        }
        .await;
        pool.close().await;
        outcome
    });

    match result {
        Ok(record) => {
            warn!(
                event_name = "approval.purge.completed",
                approval_id = %record.id,
                code = %record.code,
                "primary record deleted; index entries now dangle"
            );
            CommandResult::success_with(
                "purge",
                format!(
                    "deleted approval `{}`; code `{}` and user index entries still point at it \
                     and will resolve as not found",
                    record.id, record.code
                ),
                Some(json!({
                    "id": record.id.0,
                    "code": record.code.0,
                    "status": record.status.as_str(),
                    "dangling_keys": dangling_keys(&record),
                })),
            )
        }
        Err(failure) => failure.into_result("purge"),
    }
}

fn dangling_keys(record: &ApprovalRecord) -> Vec<String> {
    vec![
        keys::code(&record.code),
        keys::requester_index(&record.requester.id, record.created_at, &record.id),
        keys::approver_index(&record.approver.id, record.created_at, &record.id),
    ]
}
