use signoff_core::code::is_well_formed;

use crate::commands::{open_pool, service_for, session, to_json, CommandResult, Failure};

/// Looks a record up by approval code when `reference` looks like one, by id otherwise.
pub fn run(reference: &str) -> CommandResult {
    let session = match session() {
        Ok(session) => session,
        Err(failure) => return failure.into_result("show"),
    };

    let reference = reference.trim();
    let result = session.runtime.block_on(async {
        let pool = open_pool(&session.config).await?;
        let service = service_for(&session.config, &pool)?;
        let lookup = if is_well_formed(reference) {
            service.get_by_code(reference).await
        } else {
            service.get_by_id(reference).await
        };
        pool.close().await;
        let record = lookup?;
        Ok::<_, Failure>((record.status, to_json(&record)?))
    });

    match result {
        Ok((status, record)) => CommandResult::success_with(
            "show",
            format!("approval `{reference}` is {status}"),
            Some(record),
        ),
        Err(failure) => failure.into_result("show"),
    }
}
