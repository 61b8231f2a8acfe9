// Authentication types

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Tag written into the credential cache
pub const AUTHORIZED_USER: &str = "authorized_user";

/// Google's default authorization endpoint
pub const DEFAULT_AUTH_URI: &str = "https://accounts.google.com/o/oauth2/auth";

/// Google's default token endpoint
pub const DEFAULT_TOKEN_URI: &str = "https://oauth2.googleapis.com/token";

/// Read-only access to spreadsheet values
pub const SPREADSHEETS_READONLY_SCOPE: &str =
    "https://www.googleapis.com/auth/spreadsheets.readonly";

/// Persisted credential cache (token.json)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredCredential {
    #[serde(rename = "type")]
    pub kind: String,
    pub client_id: String,
    pub client_secret: String,
    pub refresh_token: String,
}

/// One OAuth client registration from credentials.json
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ApplicationSecret {
    pub client_id: String,
    pub client_secret: String,
    #[serde(default = "default_auth_uri")]
    pub auth_uri: String,
    #[serde(default = "default_token_uri")]
    pub token_uri: String,
    #[serde(default)]
    pub redirect_uris: Vec<String>,
}

fn default_auth_uri() -> String {
    DEFAULT_AUTH_URI.to_string()
}

fn default_token_uri() -> String {
    DEFAULT_TOKEN_URI.to_string()
}

/// Client secret file contents
///
/// The file holds exactly one of `installed` (desktop app registration)
/// or `web` (web app registration).
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ClientSecret {
    Installed(ApplicationSecret),
    Web(ApplicationSecret),
}

impl ClientSecret {
    /// The registration that is present
    pub fn application(&self) -> &ApplicationSecret {
        match self {
            ClientSecret::Installed(app) | ClientSecret::Web(app) => app,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            ClientSecret::Installed(_) => "installed",
            ClientSecret::Web(_) => "web",
        }
    }
}

/// Token data from a token endpoint response
#[derive(Debug, Clone)]
pub struct TokenData {
    pub access_token: String,
    pub refresh_token: Option<String>,
    pub expires_at: DateTime<Utc>,
}

/// Token endpoint response (authorization_code and refresh_token grants)
#[derive(Deserialize)]
pub struct TokenResponse {
    pub access_token: String,
    pub refresh_token: Option<String>,
    pub expires_in: Option<u64>,
    #[allow(dead_code)]
    pub scope: Option<String>,
    #[allow(dead_code)]
    pub token_type: Option<String>,
}

/// OAuth error body returned by the token endpoint
#[derive(Deserialize)]
pub struct TokenErrorResponse {
    pub error: String,
    pub error_description: Option<String>,
}
