// Authentication module
// Credential caching, interactive consent and access token lifecycle

mod callback;
mod client;
mod consent;
mod credentials;
mod manager;
mod refresh;
mod types;

pub use client::AuthorizedClient;
pub use consent::{ConsentFlow, ConsentRequest, LoopbackConsent};
pub use credentials::{load_client_secret, CredentialStore};
pub use manager::Authorizer;
pub use types::{
    ApplicationSecret, ClientSecret, StoredCredential, TokenData, AUTHORIZED_USER,
    DEFAULT_TOKEN_URI, SPREADSHEETS_READONLY_SCOPE,
};
