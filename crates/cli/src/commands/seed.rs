use crate::commands::CommandResult;
use crewrate_core::config::{AppConfig, LoadOptions};
use crewrate_db::{connect_with_settings, migrations, BootstrapSeed};

pub fn run() -> CommandResult {
    let config = match AppConfig::load(LoadOptions::default()) {
        Ok(config) => config,
        Err(error) => {
            return CommandResult::failure(
                "seed",
                "config_validation",
                format!("configuration issue: {error}"),
                2,
            );
        }
    };

    let runtime = match tokio::runtime::Builder::new_current_thread().enable_all().build() {
        Ok(runtime) => runtime,
        Err(error) => {
            return CommandResult::failure(
                "seed",
                "runtime_init",
                format!("failed to initialize async runtime: {error}"),
                3,
            );
        }
    };

    let result = runtime.block_on(async {
        let pool = connect_with_settings(
            &config.database.url,
            config.database.max_connections,
            config.database.timeout_secs,
        )
        .await
        .map_err(|error| ("db_connectivity", error.to_string(), 4u8))?;

        migrations::run_pending(&pool)
            .await
            .map_err(|error| ("migration", error.to_string(), 5u8))?;

        let report = BootstrapSeed::run(&pool)
            .await
            .map_err(|error| ("seed_execution", error.to_string(), 5u8))?;

        let verification = BootstrapSeed::verify(&pool)
            .await
            .map_err(|error| ("seed_verification", error.to_string(), 6u8))?;

        let run_result = if verification.all_present {
            Ok(report)
        } else {
            let failed_checks = verification
                .checks
                .iter()
                .filter_map(|(check, passed)| (!passed).then_some(check.as_str()))
                .collect::<Vec<_>>();
            Err(("seed_verification", format!("failed checks: {}", failed_checks.join(", ")), 6u8))
        };

        pool.close().await;
        run_result
    });

    match result {
        Ok(report) => {
            let inserted: Vec<&str> =
                report.inserted.iter().map(|category| category.as_str()).collect();
            let skipped: Vec<&str> =
                report.skipped.iter().map(|category| category.as_str()).collect();
            CommandResult::success(
                "seed",
                format!(
                    "seed complete: inserted [{}], skipped [{}]",
                    inserted.join(", "),
                    skipped.join(", ")
                ),
            )
        }
        Err((error_class, message, exit_code)) => {
            CommandResult::failure("seed", error_class, message, exit_code)
        }
    }
}
