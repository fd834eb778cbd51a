use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{Result, SolverError};

/// One ACME DNS-01 challenge, as handed over by the host.
#[derive(Clone, Debug, Default, Deserialize, Serialize, bon::Builder)]
#[builder(on(String, into))]
#[serde(rename_all = "camelCase")]
pub struct ChallengeRequest {
    /// Namespace the issuing resource lives in. Secrets are looked up here.
    #[serde(default)]
    pub resource_namespace: String,
    /// Zone the challenge record belongs to, e.g. `example.com.`
    #[serde(default)]
    pub resolved_zone: String,
    /// Exact record name, e.g. `_acme-challenge.example.com.`
    #[serde(default, rename = "resolvedFQDN")]
    pub resolved_fqdn: String,
    /// Key authorization digest to publish as the TXT value.
    #[serde(default)]
    pub key: String,
    /// Provider-specific solver config, opaque to the host.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub config: Option<Value>,
}

impl ChallengeRequest {
    /// Decode the provider config carried by this request.
    pub fn provider_config(&self) -> Result<ProviderConfig> {
        ProviderConfig::load(self.config.as_ref())
    }
}

/// Provider settings decoded from [`ChallengeRequest::config`].
#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProviderConfig {
    #[serde(default)]
    pub api_url: String,
    #[serde(default)]
    pub domain_name: String,
    /// Name of the secret holding the API key.
    #[serde(default, rename = "secretName")]
    pub secret_ref: String,
    /// Key inside that secret.
    #[serde(default, rename = "secretKeyName")]
    pub secret_key_ref: String,
}

impl ProviderConfig {
    /// Decode the opaque config blob.
    ///
    /// A missing (or JSON `null`) config is the base case and yields an
    /// empty config rather than an error.
    pub fn load(config: Option<&Value>) -> Result<Self> {
        match config {
            None | Some(Value::Null) => Ok(Self::default()),
            Some(value) => Self::deserialize(value).map_err(SolverError::ConfigDecode),
        }
    }

    /// Decode a raw JSON config document.
    pub fn from_slice(raw: &[u8]) -> Result<Self> {
        if raw.iter().all(u8::is_ascii_whitespace) {
            return Ok(Self::default());
        }
        serde_json::from_slice(raw).map_err(SolverError::ConfigDecode)
    }
}
