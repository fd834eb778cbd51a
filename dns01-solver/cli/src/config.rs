use std::{path::Path, path::PathBuf, time::Duration};

use anyhow::{bail, Context, Result};
use dns01_solver::config::{duration, DEFAULT_REQUEST_TIMEOUT, DEFAULT_STORE_TIMEOUT};
use dns01_solver::{
    KubeConnectionConfig, ProviderErrorPolicy, SolverConfig, StaticSecret, StoreConnectionConfig,
};
use documented::DocumentedFields;
use figment::{
    providers::{Env, Format, Json, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use toml_edit::ser::to_document;
use tracing::info;

pub const CONFIG_NAME: &str = "dns01-solver";
const ENV_PREFIX: &str = "DNS01_SOLVER_";

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreKind {
    #[default]
    Kubernetes,
    Static,
}

#[derive(Debug, Deserialize, Serialize, DocumentedFields)]
pub struct Config {
    /// What to do when the provider rejects a record change.
    /// "propagate" fails the operation, "log-only" logs and reports success.
    pub provider_error_policy: ProviderErrorPolicy,
    /// Timeout for a single provider API call
    #[serde(with = "duration")]
    pub request_timeout: Duration,
    /// Secret store backend, "kubernetes" or "static"
    pub store: StoreKind,
    /// Kubernetes API server URL. Leave empty to use the in-cluster service account.
    pub kube_server: String,
    /// Bearer token for the Kubernetes API. Takes precedence over kube_token_file.
    pub kube_token: String,
    /// File holding the Kubernetes bearer token
    pub kube_token_file: String,
    /// PEM bundle of extra roots to trust for the Kubernetes API
    pub kube_ca_cert_file: String,
    /// Skip TLS verification of the Kubernetes API server
    pub kube_insecure_skip_tls_verify: bool,
    /// Timeout for secret store requests
    #[serde(with = "duration")]
    pub kube_timeout: Duration,
    /// Secrets served when store = "static"
    #[serde(default)]
    pub static_secrets: Vec<StaticSecret>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            provider_error_policy: ProviderErrorPolicy::default(),
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            store: StoreKind::default(),
            kube_server: String::new(),
            kube_token: String::new(),
            kube_token_file: String::new(),
            kube_ca_cert_file: String::new(),
            kube_insecure_skip_tls_verify: false,
            kube_timeout: DEFAULT_STORE_TIMEOUT,
            static_secrets: Vec::new(),
        }
    }
}

fn non_empty(value: &str) -> Option<String> {
    (!value.is_empty()).then(|| value.to_string())
}

impl Config {
    pub fn to_commented_toml(&self) -> Result<String> {
        let mut doc = to_document(self)?;

        for (mut key, _value) in doc.iter_mut() {
            let Ok(docstring) = Self::get_field_docs(key.get()) else {
                continue;
            };
            let mut comment = String::new();
            for line in docstring.lines() {
                let line = if line.is_empty() {
                    String::from("#\n")
                } else {
                    format!("# {line}\n")
                };
                comment.push_str(&line);
            }
            key.leaf_decor_mut().set_prefix(comment);
        }
        Ok(doc.to_string())
    }

    pub fn solver_config(&self) -> SolverConfig {
        SolverConfig::builder()
            .provider_error_policy(self.provider_error_policy)
            .request_timeout(self.request_timeout)
            .build()
    }

    pub fn store_config(&self) -> StoreConnectionConfig {
        match self.store {
            StoreKind::Kubernetes => StoreConnectionConfig::Kubernetes(
                KubeConnectionConfig::builder()
                    .maybe_server(non_empty(&self.kube_server))
                    .maybe_token(non_empty(&self.kube_token))
                    .maybe_token_file(non_empty(&self.kube_token_file).map(PathBuf::from))
                    .maybe_ca_cert_file(non_empty(&self.kube_ca_cert_file).map(PathBuf::from))
                    .insecure_skip_tls_verify(self.kube_insecure_skip_tls_verify)
                    .timeout(self.kube_timeout)
                    .build(),
            ),
            StoreKind::Static => StoreConnectionConfig::Static {
                secrets: self.static_secrets.clone(),
            },
        }
    }
}

fn merge_file(figment: Figment, path: &Path) -> Figment {
    match path.extension().and_then(|ext| ext.to_str()) {
        Some("toml") => figment.merge(Toml::file(path)),
        _ => figment.merge(Json::file(path)),
    }
}

fn merge_dir(mut figment: Figment, dir: &Path) -> Figment {
    for ext in ["toml", "json"] {
        let file = dir.join(format!("{CONFIG_NAME}.{ext}"));
        if file.exists() {
            info!("Loading config file: {}", file.display());
            figment = merge_file(figment, &file);
        }
    }
    figment
}

/// Built-in defaults, then each search dir, then `leaf`, then the environment.
fn layered(search_dirs: &[PathBuf], leaf: Option<&Path>) -> Result<Figment> {
    let mut figment = Figment::from(Serialized::defaults(Config::default()));
    for dir in search_dirs {
        figment = merge_dir(figment, dir);
    }
    if let Some(leaf) = leaf {
        if !leaf.exists() {
            bail!("config file {} does not exist", leaf.display());
        }
        info!("Loading config file: {}", leaf.display());
        figment = merge_file(figment, leaf);
    }
    Ok(figment.merge(Env::prefixed(ENV_PREFIX)))
}

pub fn load(leaf: Option<&Path>) -> Result<Config> {
    let search_dirs = [Path::new("/etc").join(CONFIG_NAME), PathBuf::from(".")];
    layered(&search_dirs, leaf)?
        .extract()
        .context("Failed to load configuration")
}
