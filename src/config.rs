use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::time::Duration;

use crate::sheets::DEFAULT_ENDPOINT;

/// Sample spreadsheet listing students and their majors
pub const DEFAULT_SPREADSHEET_ID: &str = "1NQIubBfbqCUq9h1Dx3B-dwQNptXxe56e6oTgL769lJg";

/// Sheets quickstart - list names and majors from a spreadsheet
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct CliArgs {
    /// OAuth client secret file downloaded from the Cloud console
    #[arg(short = 'c', long, env = "SHEETS_CREDENTIALS_FILE", default_value = "credentials.json")]
    pub credentials_file: String,

    /// Where the authorized credential is cached (delete it to re-consent)
    #[arg(short = 't', long, env = "SHEETS_TOKEN_FILE", default_value = "token.json")]
    pub token_file: String,

    /// Spreadsheet to read
    #[arg(short = 's', long, env = "SHEETS_SPREADSHEET_ID", default_value = DEFAULT_SPREADSHEET_ID)]
    pub spreadsheet_id: String,

    /// A1 range to read
    #[arg(short = 'r', long, env = "SHEETS_RANGE", default_value = "A1:H5")]
    pub range: String,

    /// Sheets API endpoint
    #[arg(long, env = "SHEETS_ENDPOINT", default_value = DEFAULT_ENDPOINT)]
    pub sheets_endpoint: String,

    /// Loopback port for the consent redirect (0 = any free port)
    #[arg(long, env = "OAUTH_CALLBACK_PORT", default_value = "0")]
    pub callback_port: u16,

    /// Seconds to wait for the user to finish consent
    #[arg(long, env = "OAUTH_CONSENT_TIMEOUT", default_value = "300")]
    pub consent_timeout: u64,

    /// HTTP request timeout in seconds
    #[arg(long, env = "HTTP_REQUEST_TIMEOUT", default_value = "30")]
    pub http_timeout: u64,

    /// Print the consent URL instead of opening a browser
    #[arg(long, env = "NO_BROWSER", default_value = "false")]
    pub no_browser: bool,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "LOG_LEVEL", default_value = "warn")]
    pub log_level: String,
}

#[derive(Clone, Debug)]
pub struct Config {
    // Files
    pub credentials_file: PathBuf,
    pub token_file: PathBuf,

    // Data to fetch
    pub spreadsheet_id: String,
    pub range: String,
    pub sheets_endpoint: String,

    // Consent
    pub callback_port: u16,
    pub consent_timeout: Duration,
    pub open_browser: bool,

    // HTTP client
    pub http_timeout: Duration,

    pub log_level: String,
}

impl Config {
    /// Load configuration with priority: CLI > ENV (.env included) > defaults
    pub fn load() -> Result<Self> {
        // Load .env file if it exists
        dotenvy::dotenv().ok();

        let args = CliArgs::parse();
        Ok(Self::from_args(args))
    }

    pub fn from_args(args: CliArgs) -> Self {
        Config {
            credentials_file: expand_tilde(&args.credentials_file),
            token_file: expand_tilde(&args.token_file),
            spreadsheet_id: args.spreadsheet_id,
            range: args.range,
            sheets_endpoint: args.sheets_endpoint,
            callback_port: args.callback_port,
            consent_timeout: Duration::from_secs(args.consent_timeout),
            open_browser: !args.no_browser,
            http_timeout: Duration::from_secs(args.http_timeout),
            log_level: args.log_level,
        }
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if self.spreadsheet_id.trim().is_empty() {
            anyhow::bail!("Spreadsheet id must not be empty");
        }
        if self.range.trim().is_empty() {
            anyhow::bail!("Range must not be empty");
        }
        url::Url::parse(&self.sheets_endpoint)
            .with_context(|| format!("Invalid SHEETS_ENDPOINT: {}", self.sheets_endpoint))?;
        if self.consent_timeout.is_zero() {
            anyhow::bail!("OAUTH_CONSENT_TIMEOUT must be greater than zero");
        }

        Ok(())
    }
}

/// Expand tilde (~) in file paths to user's home directory
fn expand_tilde(path: &str) -> PathBuf {
    if let Some(rest) = path.strip_prefix("~/") {
        if let Some(home) = dirs::home_dir() {
            return home.join(rest);
        }
    }
    PathBuf::from(path)
}
