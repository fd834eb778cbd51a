use std::{collections::BTreeMap, fmt, path::PathBuf, time::Duration};

use serde::{Deserialize, Serialize};

pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);
pub const DEFAULT_STORE_TIMEOUT: Duration = Duration::from_secs(10);

/// What to do when the DNS provider rejects a record mutation.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum ProviderErrorPolicy {
    /// Log the failure and report the operation as succeeded.
    ///
    /// Compatibility mode for hosts that relied on the historical behavior.
    LogOnly,
    /// Return the provider failure as the operation's result.
    #[default]
    Propagate,
}

#[derive(Clone, Debug, Deserialize, Serialize, bon::Builder)]
pub struct SolverConfig {
    #[serde(default)]
    #[builder(default)]
    pub provider_error_policy: ProviderErrorPolicy,
    /// Upper bound for a single provider API call.
    #[serde(default = "default_request_timeout", with = "duration")]
    #[builder(default = DEFAULT_REQUEST_TIMEOUT)]
    pub request_timeout: Duration,
}

impl Default for SolverConfig {
    fn default() -> Self {
        Self {
            provider_error_policy: ProviderErrorPolicy::default(),
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
        }
    }
}

/// How to reach the secret store. Passed to `Solver::initialize`.
#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum StoreConnectionConfig {
    Kubernetes(KubeConnectionConfig),
    Static {
        #[serde(default)]
        secrets: Vec<StaticSecret>,
    },
}

impl Default for StoreConnectionConfig {
    fn default() -> Self {
        Self::Kubernetes(KubeConnectionConfig::default())
    }
}

/// Connection settings for the Kubernetes API server.
///
/// With no `server`, the in-cluster service account environment is used.
#[derive(Clone, Deserialize, Serialize, bon::Builder)]
#[builder(on(String, into), on(PathBuf, into))]
pub struct KubeConnectionConfig {
    #[serde(default)]
    pub server: Option<String>,
    /// Bearer token. Takes precedence over `token_file`.
    #[serde(default)]
    pub token: Option<String>,
    #[serde(default)]
    pub token_file: Option<PathBuf>,
    /// PEM bundle of extra roots to trust for the API server.
    #[serde(default)]
    pub ca_cert_file: Option<PathBuf>,
    #[serde(default)]
    #[builder(default)]
    pub insecure_skip_tls_verify: bool,
    #[serde(default = "default_store_timeout", with = "duration")]
    #[builder(default = DEFAULT_STORE_TIMEOUT)]
    pub timeout: Duration,
}

impl Default for KubeConnectionConfig {
    fn default() -> Self {
        Self {
            server: None,
            token: None,
            token_file: None,
            ca_cert_file: None,
            insecure_skip_tls_verify: false,
            timeout: DEFAULT_STORE_TIMEOUT,
        }
    }
}

impl fmt::Debug for KubeConnectionConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KubeConnectionConfig")
            .field("server", &self.server)
            .field("token", &self.token.as_ref().map(|_| "<redacted>"))
            .field("token_file", &self.token_file)
            .field("ca_cert_file", &self.ca_cert_file)
            .field("insecure_skip_tls_verify", &self.insecure_skip_tls_verify)
            .field("timeout", &self.timeout)
            .finish()
    }
}

/// A secret served by the static store.
#[derive(Clone, Debug, Default, Deserialize, Serialize)]
pub struct StaticSecret {
    pub namespace: String,
    pub name: String,
    #[serde(default)]
    pub data: BTreeMap<String, String>,
}

fn default_request_timeout() -> Duration {
    DEFAULT_REQUEST_TIMEOUT
}

fn default_store_timeout() -> Duration {
    DEFAULT_STORE_TIMEOUT
}

/// Serde helpers for durations written as `500ms`, `30s`, `5m`, `1h` or `2d`.
pub mod duration {
    use serde::{de::Error as _, Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&format(*duration))
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        parse(&s).map_err(D::Error::custom)
    }

    pub fn format(duration: Duration) -> String {
        let millis = duration.as_millis();
        if millis % 1000 != 0 {
            return format!("{millis}ms");
        }
        let secs = duration.as_secs();
        let (value, unit) = if secs != 0 && secs % (24 * 3600) == 0 {
            (secs / (24 * 3600), "d")
        } else if secs != 0 && secs % 3600 == 0 {
            (secs / 3600, "h")
        } else if secs != 0 && secs % 60 == 0 {
            (secs / 60, "m")
        } else {
            (secs, "s")
        };
        format!("{value}{unit}")
    }

    pub fn parse(s: &str) -> Result<Duration, String> {
        let s = s.trim();
        if s.is_empty() {
            return Err("duration string cannot be empty".into());
        }
        let split = s
            .find(|c: char| !c.is_ascii_digit())
            .ok_or_else(|| format!("duration {s:?} is missing a unit (ms, s, m, h or d)"))?;
        let (value, unit) = s.split_at(split);
        let value = value
            .parse::<u64>()
            .map_err(|err| format!("invalid duration {s:?}: {err}"))?;
        let secs_per_unit = match unit {
            "ms" => return Ok(Duration::from_millis(value)),
            "s" => 1,
            "m" => 60,
            "h" => 3600,
            "d" => 24 * 3600,
            _ => return Err(format!("invalid time unit {unit:?}, use ms, s, m, h or d")),
        };
        value
            .checked_mul(secs_per_unit)
            .map(Duration::from_secs)
            .ok_or_else(|| format!("duration {s:?} is too large"))
    }
}
