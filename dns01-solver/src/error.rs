use reqwest::{Method, StatusCode};
use thiserror::Error;

pub type Result<T, E = SolverError> = std::result::Result<T, E>;

/// Errors produced while fulfilling a DNS-01 challenge.
#[derive(Debug, Error)]
pub enum SolverError {
    #[error("error decoding solver config: {0}")]
    ConfigDecode(#[source] serde_json::Error),

    #[error("invalid solver config: {0}")]
    InvalidConfig(String),

    #[error("secret `{namespace}/{name}` not found")]
    SecretNotFound { namespace: String, name: String },

    #[error("key {key:?} not found in secret `{namespace}/{name}`")]
    SecretKeyMissing {
        namespace: String,
        name: String,
        key: String,
    },

    #[error("key {key:?} in secret `{namespace}/{name}` is not valid UTF-8")]
    SecretKeyEncoding {
        namespace: String,
        name: String,
        key: String,
    },

    /// `status` is `None` when the store never answered.
    #[error("failed to read secret `{namespace}/{name}`: {message}")]
    SecretStore {
        namespace: String,
        name: String,
        status: Option<StatusCode>,
        message: String,
    },

    #[error("failed to initialize secret store client: {0}")]
    StoreClientInit(String),

    /// Credential resolution failed; `source` holds the root cause.
    #[error("unable to get secret `{namespace}`; {source}")]
    Credentials {
        namespace: String,
        #[source]
        source: Box<SolverError>,
    },

    #[error("unable to execute request {method} {url}: {source}")]
    Transport {
        url: String,
        method: Method,
        #[source]
        source: reqwest::Error,
    },

    #[error("Error calling API status: {status} url: {url} method: {method}")]
    ProviderApi {
        status: StatusCode,
        url: String,
        method: Method,
    },

    #[error("deadline exceeded calling {method} {url}")]
    DeadlineExceeded { url: String, method: Method },

    #[error("operation cancelled")]
    Cancelled,

    #[error("solver is not initialized")]
    NotInitialized,
}

impl SolverError {
    pub(crate) fn credentials(namespace: &str, source: SolverError) -> Self {
        Self::Credentials {
            namespace: namespace.to_string(),
            source: Box::new(source),
        }
    }

    /// The root cause with any credential-resolution wrapper removed.
    pub fn innermost(&self) -> &SolverError {
        match self {
            SolverError::Credentials { source, .. } => source.innermost(),
            other => other,
        }
    }

    /// Whether the host may reasonably retry the operation later.
    ///
    /// Nothing in this crate retries on its own.
    pub fn is_retryable(&self) -> bool {
        match self.innermost() {
            SolverError::Transport { .. }
            | SolverError::DeadlineExceeded { .. }
            | SolverError::SecretStore { status: None, .. }
            | SolverError::StoreClientInit(_) => true,
            SolverError::SecretStore {
                status: Some(status),
                ..
            }
            | SolverError::ProviderApi { status, .. } => transient_status(*status),
            _ => false,
        }
    }
}

fn transient_status(status: StatusCode) -> bool {
    status.is_server_error() || status == StatusCode::TOO_MANY_REQUESTS
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn provider_api_error_names_status_and_url() {
        let err = SolverError::ProviderApi {
            status: StatusCode::SERVICE_UNAVAILABLE,
            url: "https://acme.test/v1/acmeChallengeSets/example.com:rotateChallenges".into(),
            method: Method::POST,
        };
        let text = err.to_string();
        assert!(text.contains("503 Service Unavailable"));
        assert!(text.contains("acmeChallengeSets/example.com:rotateChallenges"));
        assert!(text.contains("POST"));
        assert!(err.is_retryable());
    }

    #[test]
    fn credentials_wrapper_unwraps_to_root_cause() {
        let err = SolverError::credentials(
            "cert-manager",
            SolverError::SecretNotFound {
                namespace: "cert-manager".into(),
                name: "gd-secret".into(),
            },
        );
        assert!(err.to_string().starts_with("unable to get secret `cert-manager`"));
        assert!(matches!(
            err.innermost(),
            SolverError::SecretNotFound { name, .. } if name == "gd-secret"
        ));
        assert!(!err.is_retryable());
    }

    #[test]
    fn client_errors_are_not_retryable() {
        let err = SolverError::ProviderApi {
            status: StatusCode::FORBIDDEN,
            url: "https://acme.test".into(),
            method: Method::POST,
        };
        assert!(!err.is_retryable());
        assert!(!SolverError::Cancelled.is_retryable());
    }

    #[test]
    fn store_denials_are_not_retryable() {
        let store_error = |status| SolverError::SecretStore {
            namespace: "cert-manager".into(),
            name: "gd-secret".into(),
            status,
            message: "boom".into(),
        };
        assert!(!store_error(Some(StatusCode::FORBIDDEN)).is_retryable());
        assert!(!store_error(Some(StatusCode::UNAUTHORIZED)).is_retryable());
        assert!(!store_error(Some(StatusCode::OK)).is_retryable());
        assert!(store_error(Some(StatusCode::INTERNAL_SERVER_ERROR)).is_retryable());
        assert!(store_error(Some(StatusCode::TOO_MANY_REQUESTS)).is_retryable());
        assert!(store_error(None).is_retryable());
    }
}
