use std::time::Instant;

use crewrate_core::burden::BurdenResolver;
use crewrate_db::repositories::{
    SqlBurdenRateRepository, SqlCustomerRepository, SqlEconomicsRepository, SqlQuoteRepository,
};
use crewrate_db::{connect_with_settings, migrations, BootstrapSeed};
use rust_decimal::Decimal;

use crate::commands::CommandResult;

/// End-to-end readiness probe against a throwaway in-memory database:
/// migrate, seed, create a customer and quote, generate economics twice
/// (second pass must hit the snapshot cache).
pub fn run() -> CommandResult {
    let runtime = match tokio::runtime::Builder::new_current_thread().enable_all().build() {
        Ok(runtime) => runtime,
        Err(error) => {
            return CommandResult::failure(
                "smoke",
                "runtime_init",
                format!("failed to initialize async runtime: {error}"),
                3,
            );
        }
    };

    match runtime.block_on(execute("sqlite::memory:")) {
        Ok(steps) => {
            let summary = steps
                .iter()
                .map(|(step, millis)| format!("{step} ({millis}ms)"))
                .collect::<Vec<_>>()
                .join(", ");
            CommandResult::success("smoke", format!("all checks passed: {summary}"))
        }
        Err((error_class, message)) => CommandResult::failure("smoke", error_class, message, 5),
    }
}

pub async fn execute(
    database_url: &str,
) -> Result<Vec<(&'static str, u128)>, (&'static str, String)> {
    let mut steps = Vec::new();
    let started = Instant::now();

    let pool = connect_with_settings(database_url, 1, 30)
        .await
        .map_err(|error| ("db_connectivity", error.to_string()))?;
    steps.push(("connect", started.elapsed().as_millis()));

    let step = Instant::now();
    migrations::run_pending(&pool).await.map_err(|error| ("migration", error.to_string()))?;
    steps.push(("migrate", step.elapsed().as_millis()));

    let step = Instant::now();
    BootstrapSeed::run(&pool).await.map_err(|error| ("seed", error.to_string()))?;
    steps.push(("seed", step.elapsed().as_millis()));

    let step = Instant::now();
    let customer = SqlCustomerRepository::new(pool.clone())
        .create("Smoke Check Industrial", "KY")
        .await
        .map_err(|error| ("customer", error.to_string()))?;
    let quotes = SqlQuoteRepository::new(pool.clone());
    let quote = quotes
        .create(&customer.id, "Smoke check crew", "KY")
        .await
        .map_err(|error| ("quote", error.to_string()))?;
    quotes
        .upsert_line(&quote.id, "millwright", Decimal::new(85, 0))
        .await
        .map_err(|error| ("quote_line", error.to_string()))?;
    steps.push(("quote", step.elapsed().as_millis()));

    let step = Instant::now();
    let resolver = BurdenResolver::new(SqlBurdenRateRepository::new(pool.clone()));
    let economics = SqlEconomicsRepository::new(pool.clone());
    let first = economics
        .generate(&quote.id, &resolver)
        .await
        .map_err(|error| ("generate", error.to_string()))?;
    let second = economics
        .generate(&quote.id, &resolver)
        .await
        .map_err(|error| ("regenerate", error.to_string()))?;
    if first.id != second.id {
        return Err((
            "idempotency",
            format!("regeneration produced a new snapshot: {} != {}", first.id, second.id),
        ));
    }
    steps.push(("generate", step.elapsed().as_millis()));

    pool.close().await;
    Ok(steps)
}
