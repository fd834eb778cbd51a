use std::sync::Arc;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;
use tracing::{info, info_span, warn, Instrument, Span};

use crate::challenge::ChallengeRequest;
use crate::config::{SolverConfig, StoreConnectionConfig};
use crate::error::{Result, SolverError};
use crate::secret_store::SecretClient;
use crate::workflow::ChallengeWorkflow;

/// The contract a challenge host drives.
///
/// `initialize` runs once; `present` and `cleanup` may then run concurrently
/// for unrelated challenges.
#[async_trait]
pub trait Solver: Send + Sync {
    /// Identifier the host uses to route challenges to this solver.
    fn name(&self) -> &'static str;

    /// Connect to the secret store. `stop` is cancelled when the host shuts
    /// down and aborts any operation still in flight.
    async fn initialize(
        &mut self,
        config: StoreConnectionConfig,
        stop: CancellationToken,
    ) -> Result<()>;

    /// Publish the TXT record for `request`.
    async fn present(&self, request: &ChallengeRequest) -> Result<()>;

    /// Remove the TXT record for `request`.
    async fn cleanup(&self, request: &ChallengeRequest) -> Result<()>;
}

pub const PROVIDER_NAME: &str = "google-domains";

/// Solver for the Google Domains ACME DNS API.
#[derive(Debug)]
pub struct GoogleDomainsSolver {
    store: Option<Arc<SecretClient>>,
    workflow: ChallengeWorkflow,
    stop: CancellationToken,
    span: Span,
}

impl GoogleDomainsSolver {
    pub fn new(config: SolverConfig) -> Self {
        Self::with_span(config, info_span!("solver", provider = PROVIDER_NAME))
    }

    /// Create a solver that logs under `span`.
    pub fn with_span(config: SolverConfig, span: Span) -> Self {
        Self {
            store: None,
            workflow: ChallengeWorkflow::new(&config, span.clone()),
            stop: CancellationToken::new(),
            span,
        }
    }

    /// Use an already connected store instead of calling `initialize`.
    pub fn with_store(mut self, store: SecretClient, stop: CancellationToken) -> Self {
        self.store = Some(Arc::new(store));
        self.stop = stop;
        self
    }

    pub fn is_initialized(&self) -> bool {
        self.store.is_some()
    }

    fn store(&self) -> Result<&SecretClient> {
        self.store.as_deref().ok_or(SolverError::NotInitialized)
    }
}

#[async_trait]
impl Solver for GoogleDomainsSolver {
    fn name(&self) -> &'static str {
        PROVIDER_NAME
    }

    async fn initialize(
        &mut self,
        config: StoreConnectionConfig,
        stop: CancellationToken,
    ) -> Result<()> {
        if stop.is_cancelled() {
            return Err(SolverError::Cancelled);
        }
        let connect = SecretClient::connect(&config).instrument(self.span.clone());
        let client = tokio::select! {
            biased;
            _ = stop.cancelled() => return Err(SolverError::Cancelled),
            client = connect => client.map_err(|err| match err {
                SolverError::StoreClientInit(_) => err,
                other => SolverError::StoreClientInit(other.to_string()),
            })?,
        };
        self.span.in_scope(|| {
            info!(store = client.kind(), policy = ?self.workflow.policy(), "solver initialized")
        });
        self.store = Some(Arc::new(client));
        self.stop = stop;
        Ok(())
    }

    async fn present(&self, request: &ChallengeRequest) -> Result<()> {
        let store = self.store()?;
        self.workflow
            .present(store, request, &self.stop.child_token())
            .await
    }

    async fn cleanup(&self, request: &ChallengeRequest) -> Result<()> {
        let store = self.store()?;
        let result = self
            .workflow
            .cleanup(store, request, &self.stop.child_token())
            .await;
        if let Err(SolverError::Cancelled) = &result {
            self.span
                .in_scope(|| warn!(fqdn = %request.resolved_fqdn, "cleanup cancelled, record may remain"));
        }
        result
    }
}
