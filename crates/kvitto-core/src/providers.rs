//! Provider app registry loaded from YAML.
//!
//! Holds the merchant-independent half of each provider integration: OAuth
//! client id/secret, API and token endpoints, and the webhook signing
//! secret. Per-merchant credentials live in the credential store, not here.

use std::collections::HashSet;
use std::path::Path;

use serde::Deserialize;

use crate::types::ProviderId;
use crate::ConfigError;

/// Registration of one provider app.
#[derive(Clone, Deserialize)]
pub struct ProviderAppConfig {
    pub provider: ProviderId,
    pub client_id: String,
    pub client_secret: String,
    pub api_base_url: String,
    pub token_url: String,
    /// HMAC key for inbound webhook signatures.
    pub webhook_secret: String,
}

impl std::fmt::Debug for ProviderAppConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderAppConfig")
            .field("provider", &self.provider)
            .field("client_id", &self.client_id)
            .field("client_secret", &"[redacted]")
            .field("api_base_url", &self.api_base_url)
            .field("token_url", &self.token_url)
            .field("webhook_secret", &"[redacted]")
            .finish()
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ProviderRegistry {
    pub providers: Vec<ProviderAppConfig>,
}

impl ProviderRegistry {
    #[must_use]
    pub fn get(&self, provider: ProviderId) -> Option<&ProviderAppConfig> {
        self.providers.iter().find(|p| p.provider == provider)
    }
}

/// Load and validate the provider registry from a YAML file.
///
/// # Errors
///
/// Returns `ConfigError` if the file cannot be read, parsed, or fails validation.
pub fn load_providers(path: &Path) -> Result<ProviderRegistry, ConfigError> {
    let content = std::fs::read_to_string(path).map_err(|e| ConfigError::RegistryIo {
        path: path.display().to_string(),
        source: e,
    })?;

    let registry: ProviderRegistry = serde_yaml::from_str(&content)?;
    validate_registry(&registry)?;
    Ok(registry)
}

fn validate_registry(registry: &ProviderRegistry) -> Result<(), ConfigError> {
    let mut seen = HashSet::new();

    for entry in &registry.providers {
        if !seen.insert(entry.provider) {
            return Err(ConfigError::Validation(format!(
                "duplicate provider entry: {}",
                entry.provider
            )));
        }
        if entry.client_id.trim().is_empty() || entry.client_secret.trim().is_empty() {
            return Err(ConfigError::Validation(format!(
                "provider {} is missing client credentials",
                entry.provider
            )));
        }
        for (field, value) in [
            ("api_base_url", &entry.api_base_url),
            ("token_url", &entry.token_url),
        ] {
            if !value.starts_with("https://") && !value.starts_with("http://") {
                return Err(ConfigError::Validation(format!(
                    "provider {}: {field} must be an http(s) URL, got \"{value}\"",
                    entry.provider
                )));
            }
        }
        if entry.webhook_secret.trim().is_empty() {
            return Err(ConfigError::Validation(format!(
                "provider {} has an empty webhook_secret",
                entry.provider
            )));
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(yaml: &str) -> Result<ProviderRegistry, ConfigError> {
        let registry: ProviderRegistry = serde_yaml::from_str(yaml)?;
        validate_registry(&registry)?;
        Ok(registry)
    }

    const VALID: &str = r"
providers:
  - provider: zettle
    client_id: abc123
    client_secret: shh
    api_base_url: https://purchase.izettle.com
    token_url: https://oauth.zettle.com/token
    webhook_secret: whsec_1
  - provider: sumup
    client_id: def456
    client_secret: shh2
    api_base_url: https://api.sumup.com
    token_url: https://api.sumup.com/token
    webhook_secret: whsec_2
";

    #[test]
    fn valid_registry_parses_and_resolves() {
        let registry = parse(VALID).expect("valid registry");
        assert_eq!(registry.providers.len(), 2);
        let zettle = registry.get(ProviderId::Zettle).expect("zettle entry");
        assert_eq!(zettle.client_id, "abc123");
        assert!(registry.get(ProviderId::SumUp).is_some());
    }

    #[test]
    fn duplicate_provider_is_rejected() {
        let yaml = r"
providers:
  - provider: zettle
    client_id: a
    client_secret: b
    api_base_url: https://x
    token_url: https://y
    webhook_secret: z
  - provider: zettle
    client_id: a2
    client_secret: b2
    api_base_url: https://x
    token_url: https://y
    webhook_secret: z
";
        assert!(matches!(parse(yaml), Err(ConfigError::Validation(_))));
    }

    #[test]
    fn empty_client_secret_is_rejected() {
        let yaml = r"
providers:
  - provider: sumup
    client_id: a
    client_secret: '  '
    api_base_url: https://x
    token_url: https://y
    webhook_secret: z
";
        assert!(matches!(parse(yaml), Err(ConfigError::Validation(_))));
    }

    #[test]
    fn non_http_url_is_rejected() {
        let yaml = r"
providers:
  - provider: sumup
    client_id: a
    client_secret: b
    api_base_url: ftp://x
    token_url: https://y
    webhook_secret: z
";
        assert!(matches!(parse(yaml), Err(ConfigError::Validation(_))));
    }

    #[test]
    fn debug_redacts_secrets() {
        let registry = parse(VALID).expect("valid registry");
        let debug = format!("{:?}", registry.providers[0]);
        assert!(debug.contains("[redacted]"));
        assert!(!debug.contains("shh"));
        assert!(!debug.contains("whsec_1"));
    }
}
