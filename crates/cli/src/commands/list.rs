use serde_json::json;

use crate::commands::{
    open_pool, service_for, session, skipped_json, to_json, CommandResult, Failure,
};

pub fn run(user_id: &str) -> CommandResult {
    let session = match session() {
        Ok(session) => session,
        Err(failure) => return failure.into_result("list"),
    };

    let result = session.runtime.block_on(async {
        let pool = open_pool(&session.config).await?;
        let listing = service_for(&session.config, &pool)?.list_by_user(user_id).await;
        pool.close().await;
        Ok::<_, Failure>(listing?)
    });

    let listing = match result {
        Ok(listing) => listing,
        Err(failure) => return failure.into_result("list"),
    };

    let records = match to_json(&listing.records) {
        Ok(records) => records,
        Err(failure) => return failure.into_result("list"),
    };
    let mut message = format!("{} approval(s) for `{}`", listing.records.len(), user_id.trim());
    if !listing.skipped.is_empty() {
        message.push_str(&format!("; {} record(s) could not be loaded", listing.skipped.len()));
    }

    CommandResult::success_with(
        "list",
        message,
        Some(json!({ "records": records, "skipped": skipped_json(&listing.skipped) })),
    )
}
