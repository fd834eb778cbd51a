//! A DNS-01 challenge solver for the Google Domains ACME DNS API.
//!
//! A challenge host (such as cert-manager) hands the solver a
//! [`ChallengeRequest`] naming the TXT record to publish and the secret that
//! holds the provider API key. The solver loads the key from a secret store,
//! then adds or removes the record through the provider's
//! `rotateChallenges` call.
//!
//! # Usage
//!
//! ```rust,no_run
//! use dns01_solver::{
//!     ChallengeRequest, GoogleDomainsSolver, Solver, SolverConfig, StoreConnectionConfig,
//! };
//! use tokio_util::sync::CancellationToken;
//!
//! # async fn run() -> dns01_solver::Result<()> {
//! let mut solver = GoogleDomainsSolver::new(SolverConfig::default());
//! solver
//!     .initialize(StoreConnectionConfig::default(), CancellationToken::new())
//!     .await?;
//!
//! let request: ChallengeRequest = serde_json::from_str(
//!     r#"{
//!         "resourceNamespace": "cert-manager",
//!         "resolvedZone": "example.com.",
//!         "resolvedFQDN": "_acme-challenge.example.com.",
//!         "key": "digest",
//!         "config": {
//!             "apiUrl": "https://acmedns.googleapis.com/v1",
//!             "domainName": "example.com",
//!             "secretName": "google-domains",
//!             "secretKeyName": "api-key"
//!         }
//!     }"#,
//! )
//! .map_err(dns01_solver::SolverError::ConfigDecode)?;
//! solver.present(&request).await?;
//! solver.cleanup(&request).await?;
//! # Ok(())
//! # }
//! ```
pub use challenge::{ChallengeRequest, ProviderConfig};
pub use config::{
    KubeConnectionConfig, ProviderErrorPolicy, SolverConfig, StaticSecret, StoreConnectionConfig,
};
pub use credentials::ResolvedCredentials;
pub use error::{Result, SolverError};
pub use secret_store::{KubeSecretStore, MemorySecretStore, SecretClient, SecretData, SecretStore};
pub use solver::{GoogleDomainsSolver, Solver, PROVIDER_NAME};
pub use workflow::{ChallengeWorkflow, RecordAction};

pub mod config;
pub mod credentials;
pub mod dns_api;
pub mod workflow;

mod challenge;
mod error;
mod secret_store;
mod solver;
