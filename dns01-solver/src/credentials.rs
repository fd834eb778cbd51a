use std::fmt;

use tracing::debug;

use crate::challenge::ProviderConfig;
use crate::error::{Result, SolverError};
use crate::secret_store::{self, SecretClient, SecretStore};

/// Everything needed to talk to the provider for one operation.
#[derive(Clone, PartialEq, Eq)]
pub struct ResolvedCredentials {
    pub api_key: String,
    pub domain_name: String,
    pub api_url: String,
}

impl fmt::Debug for ResolvedCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResolvedCredentials")
            .field("api_key", &"<redacted>")
            .field("domain_name", &self.domain_name)
            .field("api_url", &self.api_url)
            .finish()
    }
}

/// Look up the API key referenced by `config` in `namespace`.
pub async fn resolve(
    store: &SecretClient,
    namespace: &str,
    config: &ProviderConfig,
) -> Result<ResolvedCredentials> {
    if config.secret_ref.is_empty() {
        return Err(SolverError::InvalidConfig("secretName must be set".into()));
    }
    if config.secret_key_ref.is_empty() {
        return Err(SolverError::InvalidConfig("secretKeyName must be set".into()));
    }
    secret_store::validate_namespace(namespace)?;
    secret_store::validate_name(&config.secret_ref)?;

    let data = store.get_secret(namespace, &config.secret_ref).await?;
    let raw = data
        .get(&config.secret_key_ref)
        .ok_or_else(|| SolverError::SecretKeyMissing {
            namespace: namespace.to_string(),
            name: config.secret_ref.clone(),
            key: config.secret_key_ref.clone(),
        })?;
    let api_key = String::from_utf8(raw.clone()).map_err(|_| SolverError::SecretKeyEncoding {
        namespace: namespace.to_string(),
        name: config.secret_ref.clone(),
        key: config.secret_key_ref.clone(),
    })?;
    debug!(
        namespace,
        secret = %config.secret_ref,
        key = %config.secret_key_ref,
        "resolved provider credentials"
    );

    Ok(ResolvedCredentials {
        api_key,
        domain_name: config.domain_name.clone(),
        api_url: config.api_url.clone(),
    })
}
