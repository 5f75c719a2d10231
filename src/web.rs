#![cfg(not(tarpaulin_include))]

use registration_desk::app;
use registration_desk::config::AppConfig;

/// Main entry point for the registration server
///
/// Reads the configuration from the environment (see `AppConfig::from_env`)
/// and serves the HTTP API until the process is stopped.
///
/// # Returns
/// * `Result<(), Box<dyn std::error::Error>>` - Success or error object
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let config = AppConfig::from_env()?;
    app::run(config).await
}
