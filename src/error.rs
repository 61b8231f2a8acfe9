// Error handling module
// Defines the error taxonomy and its mapping to process exit codes

use std::process::ExitCode;

use thiserror::Error;

/// Errors that can end a run
#[derive(Error, Debug)]
pub enum AppError {
    /// Client secret file missing or malformed, or invalid settings
    #[error("Configuration error: {0}")]
    Config(String),

    /// Interactive consent denied, timed out, or the code exchange failed
    #[error("Consent failed: {0}")]
    Consent(String),

    /// The credential cache could not be written
    #[error("Failed to persist credentials: {0}")]
    Persistence(String),

    /// Access token could not be obtained from the refresh token
    #[error("Authentication failed: {0}")]
    Auth(String),

    /// Error from the Sheets API
    #[error("Sheets API error: {status} - {message}")]
    Fetch { status: u16, message: String },

    /// Anything else
    #[error("Internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl AppError {
    /// Process exit code for this error
    pub fn exit_code(&self) -> u8 {
        match self {
            AppError::Internal(_) => 1,
            AppError::Config(_) => 2,
            AppError::Consent(_) => 3,
            AppError::Persistence(_) => 4,
            AppError::Auth(_) => 5,
            AppError::Fetch { .. } => 6,
        }
    }
}

impl From<&AppError> for ExitCode {
    fn from(err: &AppError) -> Self {
        ExitCode::from(err.exit_code())
    }
}

/// Result type alias for fallible operations
pub type Result<T> = std::result::Result<T, AppError>;
