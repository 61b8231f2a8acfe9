//! Interactive OAuth consent
//!
//! Runs the installed-application flow: a one-shot listener on the loopback
//! interface receives the authorization code after the user approves access
//! in the browser, and the code is exchanged (with a PKCE verifier) for
//! tokens at the registration's token endpoint.

use async_trait::async_trait;
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use rand::RngCore;
use reqwest::Client;
use sha2::{Digest, Sha256};
use std::path::PathBuf;
use std::time::Duration;
use url::Url;

use super::callback::CallbackListener;
use super::client::AuthorizedClient;
use super::credentials::load_client_secret;
use super::refresh;
use super::types::ApplicationSecret;
use crate::error::{AppError, Result};

/// What the consent flow is asked to authorize
#[derive(Debug, Clone, PartialEq)]
pub struct ConsentRequest {
    pub scopes: Vec<String>,
    pub keyfile_path: PathBuf,
}

/// Obtains an authorized client by asking the user
#[async_trait]
pub trait ConsentFlow: Send + Sync {
    async fn authenticate(&self, request: &ConsentRequest) -> Result<AuthorizedClient>;
}

/// PKCE S256 verifier with its CSRF state
#[derive(Debug, Clone)]
pub struct PkceVerifier {
    verifier: String,
    state: String,
}

impl PkceVerifier {
    pub fn new() -> Self {
        let mut rng = rand::thread_rng();

        let mut verifier_bytes = [0u8; 32];
        rng.fill_bytes(&mut verifier_bytes);

        let mut state_bytes = [0u8; 16];
        rng.fill_bytes(&mut state_bytes);

        Self {
            verifier: URL_SAFE_NO_PAD.encode(verifier_bytes),
            state: URL_SAFE_NO_PAD.encode(state_bytes),
        }
    }

    pub fn verifier(&self) -> &str {
        &self.verifier
    }

    pub fn state(&self) -> &str {
        &self.state
    }

    /// BASE64URL(SHA256(verifier))
    pub fn challenge(&self) -> String {
        let mut hasher = Sha256::new();
        hasher.update(self.verifier.as_bytes());
        URL_SAFE_NO_PAD.encode(hasher.finalize())
    }
}

impl Default for PkceVerifier {
    fn default() -> Self {
        Self::new()
    }
}

/// Build the authorization URL the user is sent to
pub fn build_auth_url(
    app: &ApplicationSecret,
    redirect_uri: &str,
    scopes: &[String],
    pkce: &PkceVerifier,
) -> Result<String> {
    let mut url = Url::parse(&app.auth_uri)
        .map_err(|e| AppError::Config(format!("Invalid auth_uri {}: {}", app.auth_uri, e)))?;

    url.query_pairs_mut()
        .append_pair("client_id", &app.client_id)
        .append_pair("redirect_uri", redirect_uri)
        .append_pair("response_type", "code")
        .append_pair("scope", &scopes.join(" "))
        .append_pair("access_type", "offline")
        .append_pair("prompt", "consent")
        .append_pair("state", pkce.state())
        .append_pair("code_challenge", &pkce.challenge())
        .append_pair("code_challenge_method", "S256");

    Ok(url.to_string())
}

/// Port and path of the redirect URI registered for the client
///
/// Only loopback redirects can be served by this process.
fn loopback_redirect(app: &ApplicationSecret, fallback_port: u16) -> Result<(u16, String)> {
    let raw = app
        .redirect_uris
        .first()
        .map(String::as_str)
        .unwrap_or("http://localhost");

    let uri = Url::parse(raw)
        .map_err(|e| AppError::Config(format!("Invalid redirect URI {}: {}", raw, e)))?;

    match uri.host_str() {
        Some("localhost") | Some("127.0.0.1") => {}
        _ => {
            return Err(AppError::Config(format!(
                "Redirect URI must point at localhost for interactive consent: {}",
                raw
            )))
        }
    }

    Ok((uri.port().unwrap_or(fallback_port), uri.path().to_string()))
}

/// Browser-based consent with a loopback redirect
#[derive(Debug, Clone)]
pub struct LoopbackConsent {
    http: Client,
    callback_port: u16,
    timeout: Duration,
    open_browser: bool,
}

impl LoopbackConsent {
    pub fn new(http: Client, callback_port: u16, timeout: Duration, open_browser: bool) -> Self {
        Self {
            http,
            callback_port,
            timeout,
            open_browser,
        }
    }

    fn present_url(&self, auth_url: &str) {
        if self.open_browser && open::that(auth_url).is_ok() {
            eprintln!("Opened the browser for authorization. If nothing appeared, visit:\n{auth_url}");
        } else {
            eprintln!("Authorize this app by visiting:\n{auth_url}");
        }
    }
}

#[async_trait]
impl ConsentFlow for LoopbackConsent {
    async fn authenticate(&self, request: &ConsentRequest) -> Result<AuthorizedClient> {
        let secret = load_client_secret(&request.keyfile_path)
            .map_err(|e| AppError::Config(format!("{:#}", e)))?;
        let app = secret.application();

        let (port, path) = loopback_redirect(app, self.callback_port)?;
        let listener = CallbackListener::bind(port, &path)
            .await
            .map_err(|e| AppError::Consent(format!("{:#}", e)))?;
        let redirect_uri = listener.redirect_uri();

        let pkce = PkceVerifier::new();
        let auth_url = build_auth_url(app, &redirect_uri, &request.scopes, &pkce)?;

        tracing::info!(
            kind = secret.kind(),
            port = listener.port(),
            "Waiting for interactive consent"
        );
        self.present_url(&auth_url);

        let payload = listener
            .wait_for_callback(pkce.state(), self.timeout)
            .await
            .map_err(|e| AppError::Consent(format!("{:#}", e)))?;

        if let Some(error) = payload.error {
            let message = match payload.error_description {
                Some(description) => format!("{} ({})", error, description),
                None => error,
            };
            return Err(AppError::Consent(message));
        }

        let code = payload
            .code
            .ok_or_else(|| AppError::Consent("authorization code missing".to_string()))?;

        let token = refresh::exchange_code(
            &self.http,
            &app.token_uri,
            &app.client_id,
            &app.client_secret,
            &code,
            pkce.verifier(),
            &redirect_uri,
        )
        .await
        .map_err(|e| AppError::Consent(format!("{:#}", e)))?;

        tracing::info!("Interactive consent completed");

        Ok(AuthorizedClient::from_consent(
            app.client_id.clone(),
            app.client_secret.clone(),
            app.token_uri.clone(),
            token,
            self.http.clone(),
        ))
    }
}
