//! mysql-keeper - Main entry point.
//!
//! Connects to MySQL, optionally runs one statement and prints its result as
//! JSON, then sweeps zombie sessions with `end()` and closes the connection.
//! Suitable for running from cron.

use clap::Parser;
use mysql_keeper::config::{Config, RuntimeConfig};
use mysql_keeper::db::Database;
use mysql_keeper::models::ConnectionConfig;
use tracing::{error, info};
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

/// Initialize the tracing subscriber for logging.
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
            .with(fmt::layer().with_target(true).with_writer(std::io::stderr))
            .init();
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config = Config::parse();
    init_tracing(&config);

    let connection_config = ConnectionConfig::from_url(&config.url)?;
    let runtime_config = RuntimeConfig::resolve(&config.runtime)?;

    info!(
        url = %connection_config.masked_url(),
        "Starting mysql-keeper v{}",
        env!("CARGO_PKG_VERSION")
    );

    let db = Database::mysql(connection_config, runtime_config);

    if let Some(sql) = &config.execute {
        match db.query(sql, &[]).await {
            Ok(output) => println!("{}", serde_json::to_string_pretty(&output)?),
            Err(e) => {
                error!(error = %e, "Statement failed");
                db.close().await?;
                return Err(e.into());
            }
        }
    } else {
        db.connect().await?;
    }

    db.end().await?;
    db.close().await?;

    info!(errors = db.error_count(), "Done");
    Ok(())
}
