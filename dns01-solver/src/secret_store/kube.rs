use std::{collections::BTreeMap, fmt, path::Path};

use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use fs_err as fs;
use reqwest::{Client, Certificate, RequestBuilder, StatusCode};
use serde::Deserialize;
use tracing::debug;

use crate::config::KubeConnectionConfig;
use crate::error::{Result, SolverError};

use super::{validate_name, validate_namespace, SecretData, SecretStore};

const SERVICE_ACCOUNT_TOKEN: &str = "/var/run/secrets/kubernetes.io/serviceaccount/token";
const SERVICE_ACCOUNT_CA: &str = "/var/run/secrets/kubernetes.io/serviceaccount/ca.crt";

/// Reads secrets through the Kubernetes core v1 API.
pub struct KubeSecretStore {
    client: Client,
    server: String,
    token: Option<String>,
}

impl fmt::Debug for KubeSecretStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KubeSecretStore")
            .field("server", &self.server)
            .field("authenticated", &self.token.is_some())
            .finish()
    }
}

impl KubeSecretStore {
    pub fn new(config: &KubeConnectionConfig) -> Result<Self> {
        let in_cluster = config.server.is_none();
        let server = match &config.server {
            Some(server) => server.trim_end_matches('/').to_string(),
            None => in_cluster_server()?,
        };

        // TODO: re-read projected service account tokens when they rotate.
        let token = match (&config.token, &config.token_file) {
            (Some(token), _) => Some(token.clone()),
            (None, Some(path)) => Some(read_token(path)?),
            (None, None) if in_cluster => Some(read_token(Path::new(SERVICE_ACCOUNT_TOKEN))?),
            (None, None) => None,
        };

        let ca_cert_file = match &config.ca_cert_file {
            Some(path) => Some(path.as_path()),
            None if in_cluster => Some(Path::new(SERVICE_ACCOUNT_CA)),
            None => None,
        };

        let mut builder = Client::builder()
            .timeout(config.timeout)
            .danger_accept_invalid_certs(config.insecure_skip_tls_verify);
        if let Some(path) = ca_cert_file {
            let pem = fs::read(path).map_err(|err| {
                SolverError::StoreClientInit(format!("failed to read CA bundle: {err}"))
            })?;
            let certs = Certificate::from_pem_bundle(&pem).map_err(|err| {
                SolverError::StoreClientInit(format!(
                    "failed to parse CA bundle {}: {err}",
                    path.display()
                ))
            })?;
            for cert in certs {
                builder = builder.add_root_certificate(cert);
            }
        }
        let client = builder.build().map_err(|err| {
            SolverError::StoreClientInit(format!("failed to create HTTP client: {err}"))
        })?;

        Ok(Self {
            client,
            server,
            token,
        })
    }

    pub fn server(&self) -> &str {
        &self.server
    }

    fn get(&self, url: &str) -> RequestBuilder {
        let request = self.client.get(url);
        match &self.token {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }
}

impl SecretStore for KubeSecretStore {
    async fn get_secret(&self, namespace: &str, name: &str) -> Result<SecretData> {
        validate_namespace(namespace)?;
        validate_name(name)?;
        let store_error = |status: Option<StatusCode>, message: String| SolverError::SecretStore {
            namespace: namespace.to_string(),
            name: name.to_string(),
            status,
            message,
        };

        let url = format!(
            "{}/api/v1/namespaces/{}/secrets/{}",
            self.server, namespace, name
        );
        debug!(%url, namespace, name, "fetching secret");
        let response = self.get(&url).send().await.map_err(|err| {
            store_error(None, format!("request to Kubernetes API failed: {err}"))
        })?;

        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            return Err(SolverError::SecretNotFound {
                namespace: namespace.to_string(),
                name: name.to_string(),
            });
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(store_error(
                Some(status),
                format!("Kubernetes API returned {status}: {body}"),
            ));
        }

        #[derive(Deserialize)]
        struct Secret {
            #[serde(default)]
            data: Option<BTreeMap<String, String>>,
        }

        let secret: Secret = response
            .json()
            .await
            .map_err(|err| store_error(Some(status), format!("failed to parse secret: {err}")))?;
        secret
            .data
            .unwrap_or_default()
            .into_iter()
            .map(|(key, encoded)| {
                let value = BASE64.decode(encoded.as_bytes()).map_err(|err| {
                    store_error(
                        Some(status),
                        format!("value of key {key:?} is not valid base64: {err}"),
                    )
                })?;
                Ok::<_, SolverError>((key, value))
            })
            .collect()
    }

    async fn probe(&self) -> Result<()> {
        let url = format!("{}/version", self.server);
        let response = self.get(&url).send().await.map_err(|err| {
            SolverError::StoreClientInit(format!(
                "secret store at {} is unreachable: {err}",
                self.server
            ))
        })?;
        let status = response.status();
        if !status.is_success() {
            return Err(SolverError::StoreClientInit(format!(
                "secret store at {} answered {status}",
                self.server
            )));
        }
        Ok(())
    }
}

fn in_cluster_server() -> Result<String> {
    let host = std::env::var("KUBERNETES_SERVICE_HOST").map_err(|_| {
        SolverError::StoreClientInit(
            "no API server configured and KUBERNETES_SERVICE_HOST is not set".into(),
        )
    })?;
    let port = std::env::var("KUBERNETES_SERVICE_PORT").unwrap_or_else(|_| "443".into());
    // IPv6 service hosts need brackets in the authority.
    if host.contains(':') {
        Ok(format!("https://[{host}]:{port}"))
    } else {
        Ok(format!("https://{host}:{port}"))
    }
}

fn read_token(path: &Path) -> Result<String> {
    let token = fs::read_to_string(path).map_err(|err| {
        SolverError::StoreClientInit(format!("failed to read service account token: {err}"))
    })?;
    let token = token.trim();
    if token.is_empty() {
        return Err(SolverError::StoreClientInit(format!(
            "token file {} is empty",
            path.display()
        )));
    }
    Ok(token.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use std::path::PathBuf;
    use tempfile::NamedTempFile;

    #[test]
    fn explicit_server_is_normalized() {
        let config = KubeConnectionConfig::builder()
            .server("https://10.0.0.1:6443/".to_string())
            .token("abc".to_string())
            .build();
        let store = KubeSecretStore::new(&config).unwrap();
        assert_eq!(store.server(), "https://10.0.0.1:6443");
        assert!(!format!("{store:?}").contains("abc"));
    }

    #[test]
    fn token_is_read_from_file() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "  file-token  ").unwrap();
        let config = KubeConnectionConfig::builder()
            .server("http://127.0.0.1:8080".to_string())
            .token_file(file.path().to_path_buf())
            .build();
        let store = KubeSecretStore::new(&config).unwrap();
        assert_eq!(store.token.as_deref(), Some("file-token"));
    }

    #[test]
    fn empty_token_file_fails_init() {
        let file = NamedTempFile::new().unwrap();
        let config = KubeConnectionConfig::builder()
            .server("http://127.0.0.1:8080".to_string())
            .token_file(file.path().to_path_buf())
            .build();
        let err = KubeSecretStore::new(&config).unwrap_err();
        assert!(matches!(err, SolverError::StoreClientInit(_)));
    }

    #[test]
    fn missing_ca_bundle_fails_init() {
        let config = KubeConnectionConfig::builder()
            .server("https://10.0.0.1:6443".to_string())
            .ca_cert_file(PathBuf::from("/nonexistent/ca.crt"))
            .build();
        assert!(matches!(
            KubeSecretStore::new(&config).unwrap_err(),
            SolverError::StoreClientInit(_)
        ));
    }
}
