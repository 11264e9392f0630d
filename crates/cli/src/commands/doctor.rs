use std::sync::Arc;

use serde::Serialize;
use signoff_core::config::{AppConfig, LoadOptions};
use signoff_db::{
    connect_from_config, ping, ApprovalRepository, ApprovalStore, SqlKeyValueStore,
};

use crate::commands::{open_pool, CommandResult};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
enum CheckStatus {
    Pass,
    Fail,
    Skipped,
}

#[derive(Debug, Serialize)]
struct DoctorCheck {
    name: &'static str,
    status: CheckStatus,
    details: String,
}

#[derive(Debug, Serialize)]
struct DoctorReport {
    overall_status: CheckStatus,
    summary: String,
    checks: Vec<DoctorCheck>,
}

pub fn run(json_output: bool) -> CommandResult {
    let report = build_report();
    let exit_code = if report.overall_status == CheckStatus::Pass { 0 } else { 1 };

    let output = if json_output {
        serde_json::to_string_pretty(&report).unwrap_or_else(|error| {
            format!(
                "{{\"overall_status\":\"fail\",\"summary\":\"doctor serialization failed\",\
                 \"error\":\"{}\"}}",
                escape_json(&error.to_string())
            )
        })
    } else {
        render_human(&report)
    };

    CommandResult { exit_code, output }
}

fn build_report() -> DoctorReport {
    let mut checks = Vec::new();

    match AppConfig::load(LoadOptions::default()) {
        Ok(config) => {
            checks.push(DoctorCheck {
                name: "config_validation",
                status: CheckStatus::Pass,
                details: "configuration loaded and validated".to_string(),
            });
            checks.push(check_notifications(&config));
            checks.extend(check_database(&config));
        }
        Err(error) => {
            checks.push(DoctorCheck {
                name: "config_validation",
                status: CheckStatus::Fail,
                details: error.to_string(),
            });
            for name in ["notification_delivery", "database_connectivity", "approval_store"] {
                checks.push(DoctorCheck {
                    name,
                    status: CheckStatus::Skipped,
                    details: "skipped because configuration did not load".to_string(),
                });
            }
        }
    }

    let any_failed = checks.iter().any(|check| check.status == CheckStatus::Fail);
    let overall_status = if any_failed { CheckStatus::Fail } else { CheckStatus::Pass };
    let summary = if any_failed {
        "doctor: one or more readiness checks failed".to_string()
    } else {
        "doctor: all readiness checks passed".to_string()
    };

    DoctorReport { overall_status, summary, checks }
}

fn check_notifications(config: &AppConfig) -> DoctorCheck {
    let notifications = &config.notifications;
    if !notifications.enabled {
        return DoctorCheck {
            name: "notification_delivery",
            status: CheckStatus::Skipped,
            details: "notifications disabled; outcomes are recorded but not delivered".to_string(),
        };
    }

    let webhook = notifications.webhook_url.as_deref().unwrap_or("<unset>");
    let auth =
        if notifications.bot_token.is_some() { "with bearer token" } else { "unauthenticated" };
    DoctorCheck {
        name: "notification_delivery",
        status: CheckStatus::Pass,
        details: format!("posting to `{webhook}` ({auth})"),
    }
}

fn check_database(config: &AppConfig) -> Vec<DoctorCheck> {
    let runtime = match tokio::runtime::Builder::new_current_thread().enable_all().build() {
        Ok(runtime) => runtime,
        Err(error) => {
            return vec![DoctorCheck {
                name: "database_connectivity",
                status: CheckStatus::Fail,
                details: format!("failed to initialize async runtime: {error}"),
            }];
        }
    };

    runtime.block_on(async {
        let connectivity = match connect_from_config(&config.database).await {
            Ok(pool) => {
                let reachable = ping(&pool).await;
                pool.close().await;
                match reachable {
                    Ok(()) => DoctorCheck {
                        name: "database_connectivity",
                        status: CheckStatus::Pass,
                        details: format!("connected using `{}`", config.database.url),
                    },
                    Err(error) => DoctorCheck {
                        name: "database_connectivity",
                        status: CheckStatus::Fail,
                        details: format!("database query failed: {error}"),
                    },
                }
            }
            Err(error) => DoctorCheck {
                name: "database_connectivity",
                status: CheckStatus::Fail,
                details: format!("failed to connect to database: {error}"),
            },
        };
        if connectivity.status != CheckStatus::Pass {
            let skipped = DoctorCheck {
                name: "approval_store",
                status: CheckStatus::Skipped,
                details: "skipped because the database is unreachable".to_string(),
            };
            return vec![connectivity, skipped];
        }

        vec![connectivity, check_approval_store(config).await]
    })
}

/// Walks the approver index the way the sweeper does and reports records that no longer load.
async fn check_approval_store(config: &AppConfig) -> DoctorCheck {
    let pool = match open_pool(config).await {
        Ok(pool) => pool,
        Err(failure) => {
            return DoctorCheck {
                name: "approval_store",
                status: CheckStatus::Fail,
                details: failure.message,
            };
        }
    };

    let store = ApprovalStore::new(Arc::new(SqlKeyValueStore::new(pool.clone())))
        .with_page_size(config.approvals.list_page_size);
    let scan = store.list_approver_indexed().await;
    pool.close().await;

    match scan {
        Ok(listing) if listing.skipped.is_empty() => {
            let pending = listing.records.iter().filter(|record| record.is_pending()).count();
            DoctorCheck {
                name: "approval_store",
                status: CheckStatus::Pass,
                details: format!(
                    "{} approval(s) indexed, {pending} pending",
                    listing.records.len()
                ),
            }
        }
        Ok(listing) => DoctorCheck {
            name: "approval_store",
            status: CheckStatus::Fail,
            details: format!(
                "{} indexed approval(s) could not be loaded (first: `{}`: {})",
                listing.skipped.len(),
                listing.skipped[0].id,
                listing.skipped[0].error
            ),
        },
        Err(error) => DoctorCheck {
            name: "approval_store",
            status: CheckStatus::Fail,
            details: format!("approver index scan failed: {error}"),
        },
    }
}

fn render_human(report: &DoctorReport) -> String {
    let mut lines = Vec::new();
    lines.push(report.summary.clone());

    for check in &report.checks {
        let marker = match check.status {
            CheckStatus::Pass => "ok",
            CheckStatus::Fail => "fail",
            CheckStatus::Skipped => "skip",
        };
        lines.push(format!("- [{marker}] {}: {}", check.name, check.details));
    }

    lines.join("\n")
}

fn escape_json(value: &str) -> String {
    value.replace('\\', "\\\\").replace('"', "\\\"")
}
