use crewrate_core::config::{AppConfig, LoadOptions};
use crewrate_db::connect_with_settings;
use serde::Serialize;

#[derive(Debug, Serialize)]
struct DoctorCheck {
    name: &'static str,
    passed: bool,
    detail: String,
}

#[derive(Debug, Serialize)]
struct DoctorReport {
    status: &'static str,
    checks: Vec<DoctorCheck>,
}

pub fn run(json: bool) -> String {
    let mut checks = Vec::new();

    let config = match AppConfig::load(LoadOptions::default()) {
        Ok(config) => {
            checks.push(DoctorCheck {
                name: "config",
                passed: true,
                detail: format!("database.url = {}", config.database.url),
            });
            Some(config)
        }
        Err(error) => {
            checks.push(DoctorCheck { name: "config", passed: false, detail: error.to_string() });
            None
        }
    };

    if let Some(config) = &config {
        let detail = check_database(config);
        checks.push(DoctorCheck {
            name: "database",
            passed: detail.is_ok(),
            detail: match detail {
                Ok(message) | Err(message) => message,
            },
        });
    }

    let all_passed = checks.iter().all(|check| check.passed);
    let report = DoctorReport { status: if all_passed { "ok" } else { "error" }, checks };

    if json {
        serde_json::to_string_pretty(&report)
            .unwrap_or_else(|error| format!("{{\"status\":\"error\",\"message\":\"{error}\"}}"))
    } else {
        let mut lines = vec![format!("doctor: {}", report.status)];
        for check in &report.checks {
            let marker = if check.passed { "ok" } else { "FAIL" };
            lines.push(format!("  [{marker}] {} - {}", check.name, check.detail));
        }
        lines.join("\n")
    }
}

fn check_database(config: &AppConfig) -> Result<String, String> {
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .map_err(|error| format!("failed to initialize async runtime: {error}"))?;

    runtime.block_on(async {
        let pool = connect_with_settings(
            &config.database.url,
            config.database.max_connections,
            config.database.timeout_secs,
        )
        .await
        .map_err(|error| format!("connection failed: {error}"))?;

        let probe = pool.acquire().await.map(drop);
        pool.close().await;
        probe
            .map(|_| "connection established".to_string())
            .map_err(|error| format!("connection probe failed: {error}"))
    })
}
