use serde_json::{json, Value};
use wiremock::matchers::{body_json, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use super::*;
use crate::secret_store::MemorySecretStore;

const ROTATE_PATH: &str = "/v1/acmeChallengeSets/example.com:rotateChallenges";

fn request(api_url: &str) -> ChallengeRequest {
    ChallengeRequest::builder()
        .resource_namespace("cert-manager")
        .resolved_zone("example.com.")
        .resolved_fqdn("_acme-challenge.example.com.")
        .key("abc123")
        .config(json!({
            "apiUrl": api_url,
            "domainName": "example.com",
            "secretName": "gd-secret",
            "secretKeyName": "api-key",
        }))
        .build()
}

fn store() -> MemorySecretStore {
    MemorySecretStore::new().with_secret(
        "cert-manager",
        "gd-secret",
        [("api-key", b"tok-123".as_slice())],
    )
}

fn workflow(policy: ProviderErrorPolicy) -> ChallengeWorkflow {
    let config = SolverConfig::builder().provider_error_policy(policy).build();
    ChallengeWorkflow::new(&config, Span::none())
}

#[test]
fn add_payload_matches_wire_format() {
    let payload = RotateChallengesRequest::new(
        RecordAction::Add,
        "tok-123",
        ChallengeRecord {
            digest: "abc123",
            fqdn: "_acme-challenge.example.com.",
        },
    );
    let value: Value = serde_json::to_value(&payload).unwrap();
    assert_eq!(
        value,
        json!({
            "accessToken": "tok-123",
            "keepExpiredRecords": "true",
            "recordsToAdd": [{ "digest": "abc123", "fqdn": "_acme-challenge.example.com." }],
        })
    );
    let text = serde_json::to_string(&payload).unwrap();
    assert!(text.contains(
        r#""recordsToAdd":[{"digest":"abc123","fqdn":"_acme-challenge.example.com."}]"#
    ));
    assert!(text.contains(r#""keepExpiredRecords":"true""#));
    assert!(!text.contains("recordsToRemove"));
}

#[test]
fn remove_payload_only_lists_removals() {
    let payload = RotateChallengesRequest::new(
        RecordAction::Remove,
        "tok-123",
        ChallengeRecord {
            digest: "abc123",
            fqdn: "_acme-challenge.example.com.",
        },
    );
    let value: Value = serde_json::to_value(&payload).unwrap();
    assert_eq!(
        value["recordsToRemove"],
        json!([{ "digest": "abc123", "fqdn": "_acme-challenge.example.com." }])
    );
    assert!(value.get("recordsToAdd").is_none());
}

#[test]
fn url_does_not_double_slashes() {
    let credentials = ResolvedCredentials {
        api_key: String::new(),
        domain_name: "example.com".into(),
        api_url: "https://acmedns.googleapis.com/v1/".into(),
    };
    assert_eq!(
        rotate_challenges_url(&credentials),
        "https://acmedns.googleapis.com/v1/acmeChallengeSets/example.com:rotateChallenges"
    );
}

#[tokio::test]
async fn present_then_cleanup_sends_one_call_each() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(ROTATE_PATH))
        .and(body_json(json!({
            "accessToken": "tok-123",
            "keepExpiredRecords": "true",
            "recordsToAdd": [{ "digest": "abc123", "fqdn": "_acme-challenge.example.com." }],
        })))
        .respond_with(ResponseTemplate::new(200).set_body_string(r#"{"status":"ok"}"#))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path(ROTATE_PATH))
        .and(body_json(json!({
            "accessToken": "tok-123",
            "keepExpiredRecords": "true",
            "recordsToRemove": [{ "digest": "abc123", "fqdn": "_acme-challenge.example.com." }],
        })))
        .respond_with(ResponseTemplate::new(200).set_body_string(r#"{"status":"ok"}"#))
        .expect(1)
        .mount(&server)
        .await;

    let memory = store();
    let client = SecretClient::Memory(memory.clone());
    let request = request(&format!("{}/v1", server.uri()));
    let workflow = workflow(ProviderErrorPolicy::Propagate);
    let cancel = CancellationToken::new();

    workflow.present(&client, &request, &cancel).await.unwrap();
    assert_eq!(memory.lookups(), 1);
    workflow.cleanup(&client, &request, &cancel).await.unwrap();
    assert_eq!(memory.lookups(), 2);
}

#[tokio::test]
async fn repeated_present_is_not_deduplicated() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(ROTATE_PATH))
        .respond_with(ResponseTemplate::new(200))
        .expect(2)
        .mount(&server)
        .await;

    let client = SecretClient::Memory(store());
    let request = request(&format!("{}/v1", server.uri()));
    let workflow = workflow(ProviderErrorPolicy::Propagate);
    let cancel = CancellationToken::new();
    workflow.present(&client, &request, &cancel).await.unwrap();
    workflow.present(&client, &request, &cancel).await.unwrap();
}

#[tokio::test]
async fn missing_secret_fails_before_any_provider_call() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let client = SecretClient::Memory(MemorySecretStore::new());
    let request = request(&format!("{}/v1", server.uri()));
    let workflow = workflow(ProviderErrorPolicy::LogOnly);
    let cancel = CancellationToken::new();

    for result in [
        workflow.present(&client, &request, &cancel).await,
        workflow.cleanup(&client, &request, &cancel).await,
    ] {
        let err = result.unwrap_err();
        assert!(matches!(err, SolverError::Credentials { .. }));
        assert!(matches!(err.innermost(), SolverError::SecretNotFound { .. }));
        assert!(err.to_string().contains("unable to get secret `cert-manager`"));
    }
}

#[tokio::test]
async fn missing_key_fails_both_operations() {
    let client = SecretClient::Memory(MemorySecretStore::new().with_secret(
        "cert-manager",
        "gd-secret",
        [("token", b"tok-123".as_slice())],
    ));
    let request = request("http://127.0.0.1:1/v1");
    let workflow = workflow(ProviderErrorPolicy::Propagate);
    let cancel = CancellationToken::new();

    let err = workflow.present(&client, &request, &cancel).await.unwrap_err();
    assert!(matches!(err.innermost(), SolverError::SecretKeyMissing { .. }));
    let err = workflow.cleanup(&client, &request, &cancel).await.unwrap_err();
    assert!(matches!(err.innermost(), SolverError::SecretKeyMissing { .. }));
}

#[tokio::test]
async fn undecodable_config_is_a_credential_failure() {
    let client = SecretClient::Memory(store());
    let mut request = request("http://127.0.0.1:1/v1");
    request.config = Some(json!({ "secretName": ["not", "a", "string"] }));
    let err = workflow(ProviderErrorPolicy::Propagate)
        .present(&client, &request, &CancellationToken::new())
        .await
        .unwrap_err();
    assert!(matches!(err.innermost(), SolverError::ConfigDecode(_)));
}

#[tokio::test]
async fn provider_failure_is_logged_only_in_compat_mode() {
    tracing_subscriber::fmt::try_init().ok();

    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(ROTATE_PATH))
        .respond_with(ResponseTemplate::new(503))
        .expect(1)
        .mount(&server)
        .await;

    let client = SecretClient::Memory(store());
    let request = request(&format!("{}/v1", server.uri()));
    workflow(ProviderErrorPolicy::LogOnly)
        .present(&client, &request, &CancellationToken::new())
        .await
        .unwrap();
}

#[tokio::test]
async fn provider_failure_propagates_in_hardened_mode() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(ROTATE_PATH))
        .respond_with(ResponseTemplate::new(503))
        .expect(1)
        .mount(&server)
        .await;

    let client = SecretClient::Memory(store());
    let request = request(&format!("{}/v1", server.uri()));
    let err = workflow(ProviderErrorPolicy::Propagate)
        .present(&client, &request, &CancellationToken::new())
        .await
        .unwrap_err();
    let SolverError::ProviderApi { status, url, method } = &err else {
        panic!("expected a provider API error, got {err:?}");
    };
    assert_eq!(status.as_u16(), 503);
    assert!(url.ends_with(ROTATE_PATH));
    assert_eq!(*method, Method::POST);
    assert!(err.to_string().contains("503"));
}

#[tokio::test]
async fn cancellation_is_reported_even_in_compat_mode() {
    let client = SecretClient::Memory(store());
    let request = request("http://127.0.0.1:1/v1");
    let cancel = CancellationToken::new();
    cancel.cancel();
    let err = workflow(ProviderErrorPolicy::LogOnly)
        .present(&client, &request, &cancel)
        .await
        .unwrap_err();
    assert!(matches!(err, SolverError::Cancelled));
}

#[tokio::test]
async fn fired_token_skips_credential_lookup() {
    let memory = store();
    let client = SecretClient::Memory(memory.clone());
    let cancel = CancellationToken::new();
    cancel.cancel();
    let err = workflow(ProviderErrorPolicy::Propagate)
        .cleanup(&client, &request("http://127.0.0.1:1/v1"), &cancel)
        .await
        .unwrap_err();
    assert!(matches!(err, SolverError::Cancelled));
    assert_eq!(memory.lookups(), 0);
}
