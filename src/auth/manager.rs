use std::path::PathBuf;

use super::client::AuthorizedClient;
use super::consent::{ConsentFlow, ConsentRequest};
use super::credentials::CredentialStore;
use super::types::SPREADSHEETS_READONLY_SCOPE;
use crate::error::Result;

/// Authorization orchestrator
/// Reuses the credential cache when possible, otherwise asks the user and
/// caches the outcome for the next run
pub struct Authorizer<C> {
    /// Credential cache
    store: CredentialStore,

    /// Interactive consent flow
    consent: C,

    /// Scopes requested during consent
    scopes: Vec<String>,
}

impl<C: ConsentFlow> Authorizer<C> {
    /// Authorizer for read-only spreadsheet access
    pub fn new(store: CredentialStore, consent: C) -> Self {
        Self {
            store,
            consent,
            scopes: vec![SPREADSHEETS_READONLY_SCOPE.to_string()],
        }
    }

    fn consent_request(&self) -> ConsentRequest {
        ConsentRequest {
            scopes: self.scopes.clone(),
            keyfile_path: PathBuf::from(self.store.client_secret_path()),
        }
    }

    /// Load or request authorization
    pub async fn authorize(&self) -> Result<AuthorizedClient> {
        if let Some(client) = self.store.load_if_exists() {
            return Ok(client);
        }

        tracing::info!("No cached credentials, starting interactive consent");
        let client = self.consent.authenticate(&self.consent_request()).await?;

        if client.has_refresh_token() {
            self.store.save(&client)?;
        } else {
            tracing::warn!(
                "Consent returned no refresh token; credentials will not be cached and the next run will ask again"
            );
        }

        Ok(client)
    }
}
