use signoff_service::{SweeperSettings, TimeoutSweeper};

use crate::commands::{open_pool, service_for, session, to_json, CommandResult, Failure};

/// Runs one timeout pass now, with the configured window and retry policy.
pub fn run() -> CommandResult {
    let session = match session() {
        Ok(session) => session,
        Err(failure) => return failure.into_result("sweep"),
    };

    let result = session.runtime.block_on(async {
        let pool = open_pool(&session.config).await?;
        let sweeper = TimeoutSweeper::new(
            service_for(&session.config, &pool)?,
            SweeperSettings::from_config(&session.config.approvals),
        );
        let report = sweeper.sweep_once().await;
        pool.close().await;
        Ok::<_, Failure>(report)
    });

    let report = match result {
        Ok(report) => report,
        Err(failure) => return failure.into_result("sweep"),
    };
    let data = match to_json(&report) {
        Ok(data) => data,
        Err(failure) => return failure.into_result("sweep"),
    };

    let message = format!(
        "canceled {} of {} timed-out approval(s) ({} superseded, {} failed)",
        report.canceled, report.eligible, report.superseded, report.failed
    );
    if report.failed > 0 {
        return CommandResult::failure_with("sweep", "partial_sweep", message, 1, Some(data));
    }
    CommandResult::success_with("sweep", message, Some(data))
}
