// Token endpoint grants

use anyhow::{Context, Result};
use chrono::{DateTime, Duration, Utc};
use reqwest::{Client, Response};

use super::types::{TokenData, TokenErrorResponse, TokenResponse};

/// Lifetime assumed when the token endpoint omits `expires_in`
const DEFAULT_EXPIRES_IN: i64 = 3600;

/// Exchange a refresh token for a new access token
pub async fn refresh_access_token(
    client: &Client,
    token_uri: &str,
    client_id: &str,
    client_secret: &str,
    refresh_token: &str,
) -> Result<TokenData> {
    tracing::debug!(token_uri = %token_uri, "Refreshing access token");

    let form = [
        ("grant_type", "refresh_token"),
        ("client_id", client_id),
        ("client_secret", client_secret),
        ("refresh_token", refresh_token),
    ];

    let response = client
        .post(token_uri)
        .form(&form)
        .send()
        .await
        .context("Failed to send refresh request")?;

    let token = read_token_response(response, "refresh").await?;

    tracing::info!(
        "Access token refreshed, expires: {}",
        token.expires_at.to_rfc3339()
    );

    Ok(token)
}

/// Exchange an authorization code (with its PKCE verifier) for tokens
pub async fn exchange_code(
    client: &Client,
    token_uri: &str,
    client_id: &str,
    client_secret: &str,
    code: &str,
    code_verifier: &str,
    redirect_uri: &str,
) -> Result<TokenData> {
    tracing::debug!(token_uri = %token_uri, "Exchanging authorization code for tokens");

    let form = [
        ("grant_type", "authorization_code"),
        ("client_id", client_id),
        ("client_secret", client_secret),
        ("code", code),
        ("code_verifier", code_verifier),
        ("redirect_uri", redirect_uri),
    ];

    let response = client
        .post(token_uri)
        .form(&form)
        .send()
        .await
        .context("Failed to send code exchange request")?;

    read_token_response(response, "code exchange").await
}

/// Parse a token endpoint response, turning OAuth error bodies into errors
async fn read_token_response(response: Response, grant: &str) -> Result<TokenData> {
    let status = response.status();
    if !status.is_success() {
        let error_text = response.text().await.unwrap_or_default();

        if let Ok(error) = serde_json::from_str::<TokenErrorResponse>(&error_text) {
            tracing::error!(
                "Token {} failed: status={}, error={}",
                grant,
                status,
                error.error
            );
            match error.error_description {
                Some(description) => {
                    anyhow::bail!("Token {} failed: {} ({})", grant, error.error, description)
                }
                None => anyhow::bail!("Token {} failed: {}", grant, error.error),
            }
        }

        anyhow::bail!("Token {} failed: {} - {}", grant, status, error_text);
    }

    let data: TokenResponse = response
        .json()
        .await
        .with_context(|| format!("Failed to parse token {} response", grant))?;

    if data.access_token.is_empty() {
        anyhow::bail!("Token {} response does not contain access_token", grant);
    }

    let expires_at = expiry_from(data.expires_in);

    Ok(TokenData {
        access_token: data.access_token,
        refresh_token: data.refresh_token,
        expires_at,
    })
}

/// Absolute expiry for a relative lifetime; out-of-range values fall back to the default
fn expiry_from(expires_in: Option<u64>) -> DateTime<Utc> {
    let now = Utc::now();
    expires_in
        .and_then(|secs| i64::try_from(secs).ok())
        .and_then(Duration::try_seconds)
        .and_then(|lifetime| now.checked_add_signed(lifetime))
        .unwrap_or_else(|| now + Duration::seconds(DEFAULT_EXPIRES_IN))
}
