use crewrate_core::config::{AppConfig, LoadOptions, LogFormat};
use serde::Serialize;

#[derive(Debug, Serialize)]
struct EffectiveConfig {
    database: DatabaseSection,
    server: ServerSection,
    logging: LoggingSection,
}

#[derive(Debug, Serialize)]
struct DatabaseSection {
    url: String,
    max_connections: u32,
    timeout_secs: u64,
}

#[derive(Debug, Serialize)]
struct ServerSection {
    bind_address: String,
    port: u16,
    graceful_shutdown_secs: u64,
}

#[derive(Debug, Serialize)]
struct LoggingSection {
    level: String,
    format: LogFormat,
}

pub fn run() -> String {
    match AppConfig::load(LoadOptions::default()) {
        Ok(config) => {
            let effective = EffectiveConfig {
                database: DatabaseSection {
                    url: config.database.url,
                    max_connections: config.database.max_connections,
                    timeout_secs: config.database.timeout_secs,
                },
                server: ServerSection {
                    bind_address: config.server.bind_address,
                    port: config.server.port,
                    graceful_shutdown_secs: config.server.graceful_shutdown_secs,
                },
                logging: LoggingSection {
                    level: config.logging.level,
                    format: config.logging.format,
                },
            };
            serde_json::to_string_pretty(&effective)
                .unwrap_or_else(|error| format!("failed to render config: {error}"))
        }
        Err(error) => format!("configuration issue: {error}"),
    }
}
