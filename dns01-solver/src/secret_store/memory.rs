use std::{
    collections::BTreeMap,
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    },
};

use crate::config::StaticSecret;
use crate::error::{Result, SolverError};

use super::{SecretData, SecretStore};

/// A fixed set of secrets held in memory.
///
/// Clones share the lookup counter, so a caller can keep a handle while the
/// solver owns the store.
#[derive(Debug, Clone, Default)]
pub struct MemorySecretStore {
    secrets: BTreeMap<(String, String), SecretData>,
    lookups: Arc<AtomicUsize>,
}

impl MemorySecretStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_static(secrets: &[StaticSecret]) -> Self {
        secrets.iter().fold(Self::new(), |store, secret| {
            store.with_secret(
                &secret.namespace,
                &secret.name,
                secret
                    .data
                    .iter()
                    .map(|(key, value)| (key.as_str(), value.as_bytes())),
            )
        })
    }

    pub fn with_secret<'a>(
        mut self,
        namespace: &str,
        name: &str,
        data: impl IntoIterator<Item = (&'a str, &'a [u8])>,
    ) -> Self {
        let data = data
            .into_iter()
            .map(|(key, value)| (key.to_string(), value.to_vec()))
            .collect();
        self.secrets
            .insert((namespace.to_string(), name.to_string()), data);
        self
    }

    /// Number of `get_secret` calls served so far, hits and misses alike.
    pub fn lookups(&self) -> usize {
        self.lookups.load(Ordering::SeqCst)
    }
}

impl SecretStore for MemorySecretStore {
    async fn get_secret(&self, namespace: &str, name: &str) -> Result<SecretData> {
        self.lookups.fetch_add(1, Ordering::SeqCst);
        self.secrets
            .get(&(namespace.to_string(), name.to_string()))
            .cloned()
            .ok_or_else(|| SolverError::SecretNotFound {
                namespace: namespace.to_string(),
                name: name.to_string(),
            })
    }

    async fn probe(&self) -> Result<()> {
        Ok(())
    }
}
