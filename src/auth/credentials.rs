// Credential cache and client secret loading

use anyhow::{Context, Result};
use reqwest::Client;
use std::path::{Path, PathBuf};

use super::client::AuthorizedClient;
use super::types::{ClientSecret, StoredCredential, AUTHORIZED_USER, DEFAULT_TOKEN_URI};
use crate::error::AppError;

/// Load and parse the client secret file (credentials.json)
pub fn load_client_secret(path: &Path) -> Result<ClientSecret> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read client secret file: {}", path.display()))?;

    let secret: ClientSecret = serde_json::from_str(&content).with_context(|| {
        format!(
            "Client secret file must contain exactly one of \"installed\" or \"web\": {}",
            path.display()
        )
    })?;

    tracing::debug!(kind = secret.kind(), "Loaded client secret");
    Ok(secret)
}

/// Read and validate the credential cache (token.json)
fn read_stored(path: &Path) -> Result<StoredCredential> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read credential cache: {}", path.display()))?;

    let stored: StoredCredential =
        serde_json::from_str(&content).context("Failed to parse credential cache")?;

    if stored.kind != AUTHORIZED_USER {
        anyhow::bail!("Unsupported credential type: {}", stored.kind);
    }
    if stored.refresh_token.is_empty() {
        anyhow::bail!("Credential cache does not contain a refresh token");
    }

    Ok(stored)
}

/// File-backed credential cache
#[derive(Debug, Clone)]
pub struct CredentialStore {
    /// Persisted credential (token.json)
    token_path: PathBuf,

    /// Pre-provisioned client secret (credentials.json)
    client_secret_path: PathBuf,

    /// Token endpoint given to rehydrated clients
    token_uri: String,

    /// HTTP client handed to rehydrated clients
    http: Client,
}

impl CredentialStore {
    pub fn new(token_path: PathBuf, client_secret_path: PathBuf, http: Client) -> Self {
        Self {
            token_path,
            client_secret_path,
            token_uri: DEFAULT_TOKEN_URI.to_string(),
            http,
        }
    }

    /// Use a different token endpoint for rehydrated clients
    pub fn with_token_uri(mut self, token_uri: impl Into<String>) -> Self {
        self.token_uri = token_uri.into();
        self
    }

    pub fn token_path(&self) -> &Path {
        &self.token_path
    }

    pub fn client_secret_path(&self) -> &Path {
        &self.client_secret_path
    }

    /// Rehydrate a client from the credential cache
    ///
    /// Any read or parse problem is treated as "not yet authorized".
    pub fn load_if_exists(&self) -> Option<AuthorizedClient> {
        match read_stored(&self.token_path) {
            Ok(stored) => {
                tracing::info!(
                    "Using cached credentials from {}",
                    self.token_path.display()
                );
                Some(
                    AuthorizedClient::from_stored(stored, self.http.clone())
                        .with_token_uri(self.token_uri.clone()),
                )
            }
            Err(e) => {
                tracing::debug!("No usable cached credentials: {:#}", e);
                None
            }
        }
    }

    /// Persist the client's refresh token alongside the client registration
    pub fn save(&self, client: &AuthorizedClient) -> crate::error::Result<()> {
        let secret = load_client_secret(&self.client_secret_path)
            .map_err(|e| AppError::Config(format!("{:#}", e)))?;
        let app = secret.application();

        let refresh_token = client.refresh_token().ok_or_else(|| {
            AppError::Persistence("client does not hold a refresh token".to_string())
        })?;

        let stored = StoredCredential {
            kind: AUTHORIZED_USER.to_string(),
            client_id: app.client_id.clone(),
            client_secret: app.client_secret.clone(),
            refresh_token: refresh_token.to_string(),
        };

        self.write_stored(&stored)
            .map_err(|e| AppError::Persistence(format!("{:#}", e)))?;

        tracing::info!("Credentials saved to {}", self.token_path.display());
        Ok(())
    }

    fn write_stored(&self, stored: &StoredCredential) -> Result<()> {
        if let Some(parent) = self.token_path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).with_context(|| {
                    format!("Failed to create directory: {}", parent.display())
                })?;
            }
        }

        let data = serde_json::to_string(stored).context("Failed to serialize credentials")?;
        std::fs::write(&self.token_path, data)
            .with_context(|| format!("Failed to write {}", self.token_path.display()))?;

        // Set file permissions to 0600 on Unix
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(&self.token_path, std::fs::Permissions::from_mode(0o600))
                .with_context(|| {
                    format!("Failed to set permissions on {}", self.token_path.display())
                })?;
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::types::TokenData;
    use chrono::{Duration, Utc};
    use tempfile::TempDir;

    const INSTALLED_SECRET: &str =
        r#"{"installed":{"client_id":"installed-id","client_secret":"installed-secret","redirect_uris":["http://localhost"]}}"#;
    const WEB_SECRET: &str =
        r#"{"web":{"client_id":"web-id","client_secret":"web-secret"}}"#;

    fn store_in(dir: &TempDir) -> CredentialStore {
        CredentialStore::new(
            dir.path().join("token.json"),
            dir.path().join("credentials.json"),
            Client::new(),
        )
    }

    fn consented_client(refresh_token: Option<&str>) -> AuthorizedClient {
        AuthorizedClient::from_consent(
            "consent-id".to_string(),
            "consent-secret".to_string(),
            DEFAULT_TOKEN_URI.to_string(),
            TokenData {
                access_token: "access".to_string(),
                refresh_token: refresh_token.map(str::to_string),
                expires_at: Utc::now() + Duration::hours(1),
            },
            Client::new(),
        )
    }

    #[test]
    fn test_load_missing_file() {
        let dir = TempDir::new().unwrap();
        assert!(store_in(&dir).load_if_exists().is_none());
    }

    #[test]
    fn test_load_malformed_file() {
        let dir = TempDir::new().unwrap();
        let store = store_in(&dir);

        for content in ["", "not json", "{}", "[1,2,3]", r#"{"type":"authorized_user"}"#] {
            std::fs::write(store.token_path(), content).unwrap();
            assert!(store.load_if_exists().is_none(), "content: {content}");
        }
    }

    #[test]
    fn test_load_wrong_type() {
        let dir = TempDir::new().unwrap();
        let store = store_in(&dir);
        std::fs::write(
            store.token_path(),
            r#"{"type":"service_account","client_id":"a","client_secret":"b","refresh_token":"c"}"#,
        )
        .unwrap();

        assert!(store.load_if_exists().is_none());
    }

    #[test]
    fn test_load_unreadable_path() {
        let dir = TempDir::new().unwrap();
        // A directory where a file is expected
        let store = CredentialStore::new(
            dir.path().to_path_buf(),
            dir.path().join("credentials.json"),
            Client::new(),
        );
        assert!(store.load_if_exists().is_none());
    }

    #[test]
    fn test_load_valid_file() {
        let dir = TempDir::new().unwrap();
        let store = store_in(&dir);
        std::fs::write(
            store.token_path(),
            r#"{"type":"authorized_user","client_id":"a","client_secret":"b","refresh_token":"c"}"#,
        )
        .unwrap();

        let client = store.load_if_exists().unwrap();
        assert_eq!(client.client_id(), "a");
        assert_eq!(client.refresh_token(), Some("c"));
    }

    #[test]
    fn test_save_then_load_round_trip() {
        let dir = TempDir::new().unwrap();
        let store = store_in(&dir);
        std::fs::write(store.client_secret_path(), INSTALLED_SECRET).unwrap();

        store.save(&consented_client(Some("refresh-xyz"))).unwrap();

        let client = store.load_if_exists().unwrap();
        assert_eq!(client.refresh_token(), Some("refresh-xyz"));
        assert_eq!(client.client_id(), "installed-id");
    }

    #[test]
    fn test_save_selects_installed() {
        let dir = TempDir::new().unwrap();
        let store = store_in(&dir);
        std::fs::write(store.client_secret_path(), INSTALLED_SECRET).unwrap();

        store.save(&consented_client(Some("r"))).unwrap();

        let written: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(store.token_path()).unwrap()).unwrap();
        assert_eq!(written["type"], "authorized_user");
        assert_eq!(written["client_id"], "installed-id");
        assert_eq!(written["client_secret"], "installed-secret");
        assert_eq!(written["refresh_token"], "r");
    }

    #[test]
    fn test_save_selects_web() {
        let dir = TempDir::new().unwrap();
        let store = store_in(&dir);
        std::fs::write(store.client_secret_path(), WEB_SECRET).unwrap();

        store.save(&consented_client(Some("r"))).unwrap();

        let written: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(store.token_path()).unwrap()).unwrap();
        assert_eq!(written["client_id"], "web-id");
        assert_eq!(written["client_secret"], "web-secret");
    }

    #[test]
    fn test_save_overwrites_existing_file() {
        let dir = TempDir::new().unwrap();
        let store = store_in(&dir);
        std::fs::write(store.client_secret_path(), WEB_SECRET).unwrap();
        std::fs::write(store.token_path(), "stale garbage").unwrap();

        store.save(&consented_client(Some("new"))).unwrap();
        assert_eq!(store.load_if_exists().unwrap().refresh_token(), Some("new"));
    }

    #[test]
    fn test_save_missing_client_secret() {
        let dir = TempDir::new().unwrap();
        let store = store_in(&dir);

        let err = store.save(&consented_client(Some("r"))).unwrap_err();
        assert!(matches!(err, AppError::Config(_)));
        assert!(!store.token_path().exists());
    }

    #[test]
    fn test_save_malformed_client_secret() {
        let dir = TempDir::new().unwrap();
        let store = store_in(&dir);
        std::fs::write(store.client_secret_path(), r#"{"other":{}}"#).unwrap();

        let err = store.save(&consented_client(Some("r"))).unwrap_err();
        assert!(matches!(err, AppError::Config(_)));
    }

    #[test]
    fn test_save_without_refresh_token() {
        let dir = TempDir::new().unwrap();
        let store = store_in(&dir);
        std::fs::write(store.client_secret_path(), INSTALLED_SECRET).unwrap();

        let err = store.save(&consented_client(None)).unwrap_err();
        assert!(matches!(err, AppError::Persistence(_)));
    }

    #[test]
    fn test_save_creates_parent_directories() {
        let dir = TempDir::new().unwrap();
        let store = CredentialStore::new(
            dir.path().join("nested/dir/token.json"),
            dir.path().join("credentials.json"),
            Client::new(),
        );
        std::fs::write(store.client_secret_path(), INSTALLED_SECRET).unwrap();

        store.save(&consented_client(Some("r"))).unwrap();
        assert!(store.token_path().exists());
    }

    #[cfg(unix)]
    #[test]
    fn test_saved_file_is_private() {
        use std::os::unix::fs::PermissionsExt;

        let dir = TempDir::new().unwrap();
        let store = store_in(&dir);
        std::fs::write(store.client_secret_path(), INSTALLED_SECRET).unwrap();

        store.save(&consented_client(Some("r"))).unwrap();

        let mode = std::fs::metadata(store.token_path())
            .unwrap()
            .permissions()
            .mode();
        assert_eq!(mode & 0o777, 0o600);
    }
}
