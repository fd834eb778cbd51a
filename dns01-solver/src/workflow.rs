use std::fmt;

use reqwest::Method;
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, info_span, warn, Instrument, Span};

use crate::challenge::ChallengeRequest;
use crate::config::{ProviderErrorPolicy, SolverConfig};
use crate::credentials::{self, ResolvedCredentials};
use crate::dns_api::DnsApiClient;
use crate::error::{Result, SolverError};
use crate::secret_store::SecretClient;

/// The record mutation an operation performs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordAction {
    Add,
    Remove,
}

impl fmt::Display for RecordAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RecordAction::Add => f.write_str("add"),
            RecordAction::Remove => f.write_str("remove"),
        }
    }
}

#[derive(Debug, Serialize, PartialEq, Eq)]
pub struct ChallengeRecord<'a> {
    pub digest: &'a str,
    pub fqdn: &'a str,
}

/// Body of the `acmeChallengeSets/{domain}:rotateChallenges` call.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RotateChallengesRequest<'a> {
    pub access_token: &'a str,
    /// The API takes this flag as a string.
    pub keep_expired_records: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub records_to_add: Option<Vec<ChallengeRecord<'a>>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub records_to_remove: Option<Vec<ChallengeRecord<'a>>>,
}

impl<'a> RotateChallengesRequest<'a> {
    pub fn new(action: RecordAction, access_token: &'a str, record: ChallengeRecord<'a>) -> Self {
        let (records_to_add, records_to_remove) = match action {
            RecordAction::Add => (Some(vec![record]), None),
            RecordAction::Remove => (None, Some(vec![record])),
        };
        Self {
            access_token,
            keep_expired_records: "true",
            records_to_add,
            records_to_remove,
        }
    }
}

/// `{api_url}/acmeChallengeSets/{domain_name}:rotateChallenges`
pub fn rotate_challenges_url(credentials: &ResolvedCredentials) -> String {
    format!(
        "{}/acmeChallengeSets/{}:rotateChallenges",
        credentials.api_url.trim_end_matches('/'),
        credentials.domain_name
    )
}

/// Runs present and cleanup against the provider.
///
/// Holds no per-challenge state; every operation resolves credentials anew.
#[derive(Debug, Clone)]
pub struct ChallengeWorkflow {
    api: DnsApiClient,
    policy: ProviderErrorPolicy,
    span: Span,
}

impl ChallengeWorkflow {
    pub fn new(config: &SolverConfig, span: Span) -> Self {
        Self {
            api: DnsApiClient::new(config.request_timeout, span.clone()),
            policy: config.provider_error_policy,
            span,
        }
    }

    pub fn policy(&self) -> ProviderErrorPolicy {
        self.policy
    }

    pub async fn present(
        &self,
        store: &SecretClient,
        request: &ChallengeRequest,
        cancel: &CancellationToken,
    ) -> Result<()> {
        self.run(RecordAction::Add, store, request, cancel).await
    }

    pub async fn cleanup(
        &self,
        store: &SecretClient,
        request: &ChallengeRequest,
        cancel: &CancellationToken,
    ) -> Result<()> {
        self.run(RecordAction::Remove, store, request, cancel).await
    }

    async fn run(
        &self,
        action: RecordAction,
        store: &SecretClient,
        request: &ChallengeRequest,
        cancel: &CancellationToken,
    ) -> Result<()> {
        let span = info_span!(
            parent: &self.span,
            "challenge",
            %action,
            namespace = %request.resource_namespace,
            zone = %request.resolved_zone,
            fqdn = %request.resolved_fqdn,
        );
        self.run_inner(action, store, request, cancel)
            .instrument(span)
            .await
    }

    async fn run_inner(
        &self,
        action: RecordAction,
        store: &SecretClient,
        request: &ChallengeRequest,
        cancel: &CancellationToken,
    ) -> Result<()> {
        info!("handling challenge");
        let namespace = &request.resource_namespace;
        let credentials = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                warn!("credential lookup cancelled");
                return Err(SolverError::Cancelled);
            }
            result = self.credentials(store, request) => {
                result.map_err(|err| SolverError::credentials(namespace, err))?
            }
        };

        let payload = RotateChallengesRequest::new(
            action,
            &credentials.api_key,
            ChallengeRecord {
                digest: &request.key,
                fqdn: &request.resolved_fqdn,
            },
        );
        let body = serde_json::to_vec(&payload)
            .map_err(|err| SolverError::InvalidConfig(format!("unencodable payload: {err}")))?;
        let url = rotate_challenges_url(&credentials);

        match self.api.call(&url, Method::POST, body, cancel).await {
            Ok(_) => {
                info!("{action} txt record done");
                Ok(())
            }
            // Cancellation always reaches the host, whatever the policy.
            Err(SolverError::Cancelled) => Err(SolverError::Cancelled),
            Err(err) => match self.policy {
                ProviderErrorPolicy::LogOnly => {
                    error!("{action} txt record failed, reporting success anyway: {err}");
                    Ok(())
                }
                ProviderErrorPolicy::Propagate => Err(err),
            },
        }
    }

    async fn credentials(
        &self,
        store: &SecretClient,
        request: &ChallengeRequest,
    ) -> Result<ResolvedCredentials> {
        let config = request.provider_config()?;
        credentials::resolve(store, &request.resource_namespace, &config).await
    }
}

#[cfg(test)]
mod tests;
