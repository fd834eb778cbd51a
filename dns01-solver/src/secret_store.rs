use std::collections::BTreeMap;

use enum_dispatch::enum_dispatch;
use tracing::debug;

use crate::config::StoreConnectionConfig;
use crate::error::{Result, SolverError};

pub use kube::KubeSecretStore;
pub use memory::MemorySecretStore;

mod kube;
mod memory;

/// Key name to raw value, as stored in a secret.
pub type SecretData = BTreeMap<String, Vec<u8>>;

#[enum_dispatch]
#[allow(async_fn_in_trait)]
pub trait SecretStore {
    /// Load the secret `name` from `namespace`.
    ///
    /// Fails with `SecretNotFound` when the secret (or the namespace) does not
    /// exist, and with `SecretStore` for every other failure.
    async fn get_secret(&self, namespace: &str, name: &str) -> Result<SecretData>;

    /// Check that the store can be reached with the configured credentials.
    async fn probe(&self) -> Result<()>;
}

/// A secret store client.
#[derive(Debug)]
#[enum_dispatch(SecretStore)]
pub enum SecretClient {
    Kubernetes(KubeSecretStore),
    Memory(MemorySecretStore),
}

impl SecretClient {
    /// Build the client described by `config` and verify it is usable.
    pub async fn connect(config: &StoreConnectionConfig) -> Result<Self> {
        let client: SecretClient = match config {
            StoreConnectionConfig::Kubernetes(kube) => KubeSecretStore::new(kube)?.into(),
            StoreConnectionConfig::Static { secrets } => {
                MemorySecretStore::from_static(secrets).into()
            }
        };
        client.probe().await?;
        debug!(store = client.kind(), "secret store client ready");
        Ok(client)
    }

    pub fn kind(&self) -> &'static str {
        match self {
            SecretClient::Kubernetes(_) => "kubernetes",
            SecretClient::Memory(_) => "memory",
        }
    }
}

const MAX_LABEL_LEN: usize = 63;
const MAX_SUBDOMAIN_LEN: usize = 253;

fn is_dns1123_label(label: &str) -> bool {
    let bytes = label.as_bytes();
    match (bytes.first(), bytes.last()) {
        (Some(first), Some(last)) => {
            bytes.len() <= MAX_LABEL_LEN
                && first.is_ascii_alphanumeric()
                && last.is_ascii_alphanumeric()
                && bytes
                    .iter()
                    .all(|b| b.is_ascii_lowercase() || b.is_ascii_digit() || *b == b'-')
        }
        _ => false,
    }
}

/// Namespaces must be RFC 1123 labels.
pub fn validate_namespace(namespace: &str) -> Result<()> {
    if is_dns1123_label(namespace) {
        return Ok(());
    }
    Err(SolverError::InvalidConfig(format!(
        "namespace {namespace:?} is not a valid RFC 1123 label"
    )))
}

/// Secret names must be RFC 1123 subdomains, so they stay a single path segment.
pub fn validate_name(name: &str) -> Result<()> {
    if name.len() <= MAX_SUBDOMAIN_LEN && name.split('.').all(is_dns1123_label) {
        return Ok(());
    }
    Err(SolverError::InvalidConfig(format!(
        "secret name {name:?} is not a valid RFC 1123 subdomain"
    )))
}
