use std::process::ExitCode;

use anyhow::Context;
use reqwest::Client;

use sheets_quickstart::auth::{Authorizer, CredentialStore, LoopbackConsent};
use sheets_quickstart::config::Config;
use sheets_quickstart::error::{AppError, Result};
use sheets_quickstart::list_majors;
use sheets_quickstart::sheets::SheetsClient;

#[tokio::main]
async fn main() -> ExitCode {
    match run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("{}", e);
            eprintln!("{}", e);
            ExitCode::from(&e)
        }
    }
}

async fn run() -> Result<()> {
    let config = Config::load().map_err(|e| AppError::Config(format!("{:#}", e)))?;

    // Initialize logging with the configured level; stdout is reserved for the report
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(config.log_level.to_lowercase()));

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(true)
        .with_line_number(true)
        .init();

    config
        .validate()
        .map_err(|e| AppError::Config(format!("{:#}", e)))?;

    tracing::debug!(
        spreadsheet_id = %config.spreadsheet_id,
        range = %config.range,
        token_file = %config.token_file.display(),
        credentials_file = %config.credentials_file.display(),
        "Configuration loaded"
    );

    let http = Client::builder()
        .timeout(config.http_timeout)
        .build()
        .context("Failed to create HTTP client")?;

    let store = CredentialStore::new(
        config.token_file.clone(),
        config.credentials_file.clone(),
        http.clone(),
    );
    let consent = LoopbackConsent::new(
        http.clone(),
        config.callback_port,
        config.consent_timeout,
        config.open_browser,
    );
    let authorizer = Authorizer::new(store, consent);
    let sheets = SheetsClient::new(http, &config.sheets_endpoint)?;

    let stdout = std::io::stdout();
    let mut out = stdout.lock();
    list_majors(
        &authorizer,
        &sheets,
        &config.spreadsheet_id,
        &config.range,
        &mut out,
    )
    .await
}
