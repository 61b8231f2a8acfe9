use chrono::{DateTime, Duration, Utc};
use reqwest::Client;

use super::refresh;
use super::types::{StoredCredential, TokenData, DEFAULT_TOKEN_URI};
use crate::error::{AppError, Result};

/// Seconds before expiry at which a cached access token is no longer used
const EXPIRY_THRESHOLD_SECS: i64 = 60;

/// Authorized user session
///
/// Holds the client registration and the user's tokens. Produced either by
/// rehydrating the credential cache or by completing interactive consent,
/// and handed by value to whoever performs API calls.
#[derive(Debug)]
pub struct AuthorizedClient {
    client_id: String,
    client_secret: String,
    token_uri: String,
    refresh_token: Option<String>,
    access_token: Option<String>,
    expires_at: Option<DateTime<Utc>>,
    http: Client,
}

impl AuthorizedClient {
    /// Rebuild a session from the credential cache
    ///
    /// Only the refresh token is known; the first API call refreshes.
    pub fn from_stored(stored: StoredCredential, http: Client) -> Self {
        Self {
            client_id: stored.client_id,
            client_secret: stored.client_secret,
            token_uri: DEFAULT_TOKEN_URI.to_string(),
            refresh_token: Some(stored.refresh_token),
            access_token: None,
            expires_at: None,
            http,
        }
    }

    /// Build a session from a freshly completed consent
    pub fn from_consent(
        client_id: String,
        client_secret: String,
        token_uri: String,
        token: TokenData,
        http: Client,
    ) -> Self {
        Self {
            client_id,
            client_secret,
            token_uri,
            refresh_token: token.refresh_token,
            access_token: Some(token.access_token),
            expires_at: Some(token.expires_at),
            http,
        }
    }

    /// Point token refreshes at a different endpoint
    pub fn with_token_uri(mut self, token_uri: impl Into<String>) -> Self {
        self.token_uri = token_uri.into();
        self
    }

    pub fn client_id(&self) -> &str {
        &self.client_id
    }

    pub fn refresh_token(&self) -> Option<&str> {
        self.refresh_token.as_deref()
    }

    pub fn has_refresh_token(&self) -> bool {
        self.refresh_token.is_some()
    }

    /// Check if the cached access token is missing or about to expire
    fn needs_refresh(&self) -> bool {
        match (&self.access_token, self.expires_at) {
            (Some(_), Some(exp)) => exp <= Utc::now() + Duration::seconds(EXPIRY_THRESHOLD_SECS),
            _ => true,
        }
    }

    /// Get a valid access token, refreshing if necessary
    pub async fn access_token(&mut self) -> Result<String> {
        if self.needs_refresh() {
            let refresh_token = self.refresh_token.as_deref().ok_or_else(|| {
                AppError::Auth("access token expired and no refresh token is available".to_string())
            })?;

            let token = refresh::refresh_access_token(
                &self.http,
                &self.token_uri,
                &self.client_id,
                &self.client_secret,
                refresh_token,
            )
            .await
            .map_err(|e| AppError::Auth(format!("{:#}", e)))?;

            if let Some(rotated) = token.refresh_token {
                tracing::debug!("Token endpoint rotated the refresh token");
                self.refresh_token = Some(rotated);
            }
            self.access_token = Some(token.access_token);
            self.expires_at = Some(token.expires_at);
        }

        self.access_token
            .clone()
            .ok_or_else(|| AppError::Auth("No access token available".to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::types::AUTHORIZED_USER;

    fn stored() -> StoredCredential {
        StoredCredential {
            kind: AUTHORIZED_USER.to_string(),
            client_id: "id".to_string(),
            client_secret: "secret".to_string(),
            refresh_token: "refresh".to_string(),
        }
    }

    #[test]
    fn test_from_stored_needs_refresh() {
        let client = AuthorizedClient::from_stored(stored(), Client::new());
        assert!(client.needs_refresh());
        assert_eq!(client.client_id(), "id");
        assert_eq!(client.refresh_token(), Some("refresh"));
        assert!(client.has_refresh_token());
    }

    #[test]
    fn test_expiring_token_needs_refresh() {
        let token = TokenData {
            access_token: "access".to_string(),
            refresh_token: None,
            expires_at: Utc::now() + Duration::seconds(30),
        };
        let client = AuthorizedClient::from_consent(
            "id".to_string(),
            "secret".to_string(),
            DEFAULT_TOKEN_URI.to_string(),
            token,
            Client::new(),
        );

        assert!(client.needs_refresh());
        assert!(!client.has_refresh_token());
        assert!(client.refresh_token().is_none());
    }

    #[tokio::test]
    async fn test_valid_token_is_reused() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/token")
            .expect(0)
            .create_async()
            .await;

        let token = TokenData {
            access_token: "cached".to_string(),
            refresh_token: Some("refresh".to_string()),
            expires_at: Utc::now() + Duration::hours(1),
        };
        let mut client = AuthorizedClient::from_consent(
            "id".to_string(),
            "secret".to_string(),
            format!("{}/token", server.url()),
            token,
            Client::new(),
        );

        assert_eq!(client.access_token().await.unwrap(), "cached");
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_refresh_adopts_rotated_token() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/token")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"access_token":"fresh","refresh_token":"rotated","expires_in":3600}"#)
            .expect(1)
            .create_async()
            .await;

        let mut client = AuthorizedClient::from_stored(stored(), Client::new())
            .with_token_uri(format!("{}/token", server.url()));

        assert_eq!(client.access_token().await.unwrap(), "fresh");
        assert_eq!(client.refresh_token(), Some("rotated"));

        // Second call uses the cached token
        assert_eq!(client.access_token().await.unwrap(), "fresh");
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_refresh_failure_is_auth_error() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/token")
            .with_status(400)
            .with_header("content-type", "application/json")
            .with_body(r#"{"error":"invalid_grant"}"#)
            .create_async()
            .await;

        let mut client = AuthorizedClient::from_stored(stored(), Client::new())
            .with_token_uri(format!("{}/token", server.url()));

        let err = client.access_token().await.unwrap_err();
        assert!(matches!(err, AppError::Auth(ref msg) if msg.contains("invalid_grant")));
    }

    #[tokio::test]
    async fn test_no_refresh_token_is_auth_error() {
        let token = TokenData {
            access_token: "expired".to_string(),
            refresh_token: None,
            expires_at: Utc::now() - Duration::seconds(10),
        };
        let mut client = AuthorizedClient::from_consent(
            "id".to_string(),
            "secret".to_string(),
            DEFAULT_TOKEN_URI.to_string(),
            token,
            Client::new(),
        );

        assert!(matches!(
            client.access_token().await,
            Err(AppError::Auth(_))
        ));
    }
}
