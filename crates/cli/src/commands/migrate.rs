use crate::commands::{open_pool, session, CommandResult, Failure};

pub fn run() -> CommandResult {
    let session = match session() {
        Ok(session) => session,
        Err(failure) => return failure.into_result("migrate"),
    };

    let result = session.runtime.block_on(async {
        let pool = open_pool(&session.config).await?;
        pool.close().await;
        Ok::<(), Failure>(())
    });

    match result {
        Ok(()) => CommandResult::success("migrate", "applied pending migrations"),
        Err(failure) => failure.into_result("migrate"),
    }
}
