use std::time::Duration;

use bytes::Bytes;
use reqwest::{header::CONTENT_TYPE, Client, Method, StatusCode};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, info_span, warn, Instrument, Span};

use crate::error::{Result, SolverError};

/// Thin client for the provider's REST endpoints.
///
/// Every call is a single attempt. Nothing here retries, since all calls
/// made by the solver mutate records.
#[derive(Debug, Clone)]
pub struct DnsApiClient {
    client: Client,
    request_timeout: Duration,
    span: Span,
}

impl DnsApiClient {
    pub fn new(request_timeout: Duration, span: Span) -> Self {
        Self {
            client: Client::new(),
            request_timeout,
            span,
        }
    }

    /// Send `body` to `url` and return the response body of a 200 reply.
    pub async fn call(
        &self,
        url: &str,
        method: Method,
        body: Vec<u8>,
        cancel: &CancellationToken,
    ) -> Result<Bytes> {
        let span = info_span!(parent: &self.span, "provider_call", %url, %method);
        self.call_inner(url, method, body, cancel)
            .instrument(span)
            .await
    }

    async fn call_inner(
        &self,
        url: &str,
        method: Method,
        body: Vec<u8>,
        cancel: &CancellationToken,
    ) -> Result<Bytes> {
        let request = self
            .client
            .request(method.clone(), url)
            .header(CONTENT_TYPE, "application/json")
            .timeout(self.request_timeout)
            .body(body);

        let exchange = async {
            let response = request
                .send()
                .await
                .map_err(|err| classify(err, url, &method))?;
            let status = response.status();
            let body = response
                .bytes()
                .await
                .map_err(|err| classify(err, url, &method))?;
            Ok::<_, SolverError>((status, body))
        };

        debug!("calling provider API");
        let (status, body) = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                warn!("provider call cancelled");
                return Err(SolverError::Cancelled);
            }
            result = exchange => result.inspect_err(|err| error!("{err}"))?,
        };

        if status == StatusCode::OK {
            info!(response = %String::from_utf8_lossy(&body), "provider call succeeded");
            return Ok(body);
        }

        let err = SolverError::ProviderApi {
            status,
            url: url.to_string(),
            method,
        };
        error!(response = %String::from_utf8_lossy(&body), "{err}");
        Err(err)
    }
}

fn classify(err: reqwest::Error, url: &str, method: &Method) -> SolverError {
    if err.is_timeout() {
        SolverError::DeadlineExceeded {
            url: url.to_string(),
            method: method.clone(),
        }
    } else {
        SolverError::Transport {
            url: url.to_string(),
            method: method.clone(),
            source: err,
        }
    }
}
