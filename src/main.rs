//! db-facade - Main entry point.
//!
//! Runs one SQL command through the data-access facade and prints the result
//! as JSON on stdout.

use clap::Parser;
use db_facade::config::{Config, ExecutionMode};
use db_facade::{Database, DbResult};
use serde_json::{Value as JsonValue, json};
use tracing::{error, info};
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

/// Initialize the tracing subscriber for logging.
///
/// Logs go to stderr so they never mix with the JSON written to stdout.
fn init_tracing(config: &Config) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level));

    let subscriber = tracing_subscriber::registry().with(filter);

    if config.json_logs {
        subscriber
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        subscriber
            .with(
                fmt::layer()
                    .with_target(true)
                    .with_thread_ids(false)
                    .with_writer(std::io::stderr),
            )
            .init();
    }
}

async fn run(config: &Config) -> DbResult<JsonValue> {
    let descriptor = config.descriptor()?;
    info!(
        provider = %descriptor.provider(),
        connection = %descriptor.masked_connection_string(),
        mode = %config.mode,
        "Running command"
    );

    let db = Database::with_options(descriptor, config.options())?;
    let mut command = db.create_command(&config.sql, false);
    for (name, value) in config.parameters()? {
        command.add_parameter(name, value);
    }

    let output = match config.mode {
        ExecutionMode::Query => db.fill_table(&command).await?.to_json(),
        ExecutionMode::NonQuery => json!({ "rows_affected": db.execute_non_query(&command).await? }),
        ExecutionMode::Scalar => db.execute_scalar(&command).await?.to_json(),
    };
    Ok(output)
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Parse configuration from command line and environment
    let config = Config::parse();

    init_tracing(&config);

    match run(&config).await {
        Ok(output) => {
            println!("{}", serde_json::to_string_pretty(&output)?);
            Ok(())
        }
        Err(e) => {
            error!(error = %e, "Command failed");
            eprintln!("Error: {}", e);
            if let Some(suggestion) = e.suggestion() {
                eprintln!("Hint: {}", suggestion);
            }
            std::process::exit(1);
        }
    }
}
