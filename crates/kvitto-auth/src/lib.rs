//! OAuth credential lifecycle: authorization-code exchange, storage, and
//! single-flight token refresh.

mod error;
mod oauth;
mod store;

pub use error::AuthError;
pub use oauth::OauthClient;
pub use store::{CredentialStats, CredentialStore, ProviderCredential};
