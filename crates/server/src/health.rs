use std::sync::Arc;

use axum::{extract::State, http::StatusCode, routing::get, Json, Router};
use chrono::Utc;
use serde::Serialize;
use signoff_db::{ping, DbPool};
use signoff_service::TimeoutSweeper;
use tracing::{error, info};

#[derive(Clone)]
pub struct HealthState {
    db_pool: DbPool,
    sweeper: Arc<TimeoutSweeper>,
}

impl HealthState {
    pub fn new(db_pool: DbPool, sweeper: Arc<TimeoutSweeper>) -> Self {
        Self { db_pool, sweeper }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct HealthCheck {
    pub status: &'static str,
    pub detail: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub database: HealthCheck,
    pub sweeper: HealthCheck,
    pub checked_at: String,
}

pub fn router(state: HealthState) -> Router {
    Router::new().route("/health", get(health)).with_state(state)
}

pub async fn spawn(bind_address: &str, port: u16, state: HealthState) -> std::io::Result<()> {
    let address = format!("{bind_address}:{port}");
    let listener = tokio::net::TcpListener::bind(&address).await?;

    info!(event_name = "system.health.start", bind_address = %address, "health endpoint started");

    tokio::spawn(async move {
        if let Err(error) = axum::serve(listener, router(state)).await {
            error!(
                event_name = "system.health.error",
                error = %error,
                "health endpoint server terminated unexpectedly"
            );
        }
    });

    Ok(())
}

pub async fn health(State(state): State<HealthState>) -> (StatusCode, Json<HealthResponse>) {
    let database = database_check(&state.db_pool).await;
    let sweeper = sweeper_check(&state.sweeper);
    let ready = database.status == "ready" && sweeper.status == "ready";

    let payload = HealthResponse {
        status: if ready { "ready" } else { "degraded" },
        database,
        sweeper,
        checked_at: Utc::now().to_rfc3339(),
    };

    let status_code = if ready { StatusCode::OK } else { StatusCode::SERVICE_UNAVAILABLE };
    (status_code, Json(payload))
}

async fn database_check(pool: &DbPool) -> HealthCheck {
    match ping(pool).await {
        Ok(()) => HealthCheck { status: "ready", detail: "database query succeeded".to_string() },
        Err(error) => {
            HealthCheck { status: "degraded", detail: format!("database query failed: {error}") }
        }
    }
}

fn sweeper_check(sweeper: &TimeoutSweeper) -> HealthCheck {
    if sweeper.is_running() {
        HealthCheck {
            status: "ready",
            detail: format!(
                "timeout sweeper running every {}s",
                sweeper.settings().interval.as_secs()
            ),
        }
    } else {
        HealthCheck { status: "degraded", detail: "timeout sweeper is not running".to_string() }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use axum::{
        body::{to_bytes, Body},
        extract::State,
        http::{Request, StatusCode},
        Json,
    };
    use signoff_core::audit::InMemoryAuditSink;
    use signoff_core::clock::SystemClock;
    use signoff_db::{connect_with_settings, ApprovalStore, InMemoryKeyValueStore};
    use signoff_service::{ApprovalService, NoopNotifier, SweeperSettings, TimeoutSweeper};
    use tower::ServiceExt;

    use crate::health::{health, router, HealthState};

    fn sweeper() -> Arc<TimeoutSweeper> {
        let service = ApprovalService::new(
            Arc::new(ApprovalStore::new(Arc::new(InMemoryKeyValueStore::default()))),
            Arc::new(NoopNotifier),
            Arc::new(InMemoryAuditSink::default()),
            Arc::new(SystemClock),
        );
        Arc::new(TimeoutSweeper::new(Arc::new(service), SweeperSettings::default()))
    }

    #[tokio::test]
    async fn health_is_ready_with_database_and_running_sweeper() {
        let pool = connect_with_settings("sqlite::memory:?cache=shared", 1, 5)
            .await
            .expect("pool should connect");
        let sweeper = sweeper();
        assert!(sweeper.start());

        let (status, Json(payload)) =
            health(State(HealthState::new(pool.clone(), Arc::clone(&sweeper)))).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(payload.status, "ready");
        assert_eq!(payload.database.status, "ready");
        assert_eq!(payload.sweeper.status, "ready");
        assert!(payload.sweeper.detail.contains("300s"));

        sweeper.stop().await;
        pool.close().await;
    }

    #[tokio::test]
    async fn stopped_sweeper_degrades_health() {
        let pool = connect_with_settings("sqlite::memory:?cache=shared", 1, 5)
            .await
            .expect("pool should connect");

        let (status, Json(payload)) =
            health(State(HealthState::new(pool.clone(), sweeper()))).await;

        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(payload.status, "degraded");
        assert_eq!(payload.database.status, "ready");
        assert_eq!(payload.sweeper.status, "degraded");

        pool.close().await;
    }

    #[tokio::test]
    async fn closed_database_degrades_health_over_http() {
        let pool = connect_with_settings("sqlite::memory:?cache=shared", 1, 5)
            .await
            .expect("pool should connect");
        pool.close().await;
        let sweeper = sweeper();
        assert!(sweeper.start());

        let response = router(HealthState::new(pool, Arc::clone(&sweeper)))
            .oneshot(Request::builder().uri("/health").body(Body::empty()).expect("request"))
            .await
            .expect("response");

        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
        let body = to_bytes(response.into_body(), 64 * 1024).await.expect("body");
        let payload: serde_json::Value = serde_json::from_slice(&body).expect("json body");
        assert_eq!(payload["database"]["status"], "degraded");
        assert_eq!(payload["sweeper"]["status"], "ready");

        sweeper.stop().await;
    }
}
