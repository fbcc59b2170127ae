//! Integration tests for the check runner
//!
//! These tests verify that:
//! - A reachable plain-http endpoint is OPERATIONAL
//! - A TLS endpoint that fails the handshake is LIMITED with the TLS message
//! - An expired certificate is LIMITED, a trusted one OPERATIONAL
//! - A completed handshake counts as OPERATIONAL even if the HTTP exchange fails
//! - Refused connections and unresolvable hosts are OFFLINE with the generic message

use std::time::Duration;

use assert_matches::assert_matches;
use reqwest::Url;
use statuswatch::Status;
use statuswatch::checker::{
    CONNECT_FAILURE_MESSAGE, CheckRunner, FailureCause, HttpCheckRunner, ProbeOutcome,
};
use wiremock::matchers::any;
use wiremock::{Mock, MockServer, ResponseTemplate};

use crate::helpers::*;

fn runner() -> HttpCheckRunner {
    HttpCheckRunner::new(Duration::from_secs(2)).unwrap()
}

/// Runner that trusts the test CA
fn trusting_runner() -> HttpCheckRunner {
    HttpCheckRunner::with_root_certificates(Duration::from_secs(2), vec![test_ca()]).unwrap()
}

fn local_https(port: u16) -> Url {
    Url::parse(&format!("https://127.0.0.1:{port}/")).unwrap()
}

#[tokio::test]
async fn test_reachable_http_endpoint_is_operational() {
    let mock_server = MockServer::start().await;
    Mock::given(any())
        .respond_with(ResponseTemplate::new(200))
        .mount(&mock_server)
        .await;

    let endpoint = Url::parse(&format!("{}/health", mock_server.uri())).unwrap();
    let outcome = runner().check(&endpoint).await;

    assert_eq!(outcome.status, Status::Operational);
    assert_eq!(outcome.error, None);
    assert_eq!(outcome.possible_cause, None);
}

#[tokio::test]
async fn test_http_error_status_still_counts_as_reachable() {
    let mock_server = MockServer::start().await;
    Mock::given(any())
        .respond_with(ResponseTemplate::new(503))
        .mount(&mock_server)
        .await;

    let endpoint = Url::parse(&mock_server.uri()).unwrap();
    assert_eq!(runner().check(&endpoint).await.status, Status::Operational);
}

#[tokio::test]
async fn test_failed_handshake_is_limited() {
    let port = spawn_plaintext_server().await;
    let endpoint = Url::parse(&format!("https://127.0.0.1:{port}/")).unwrap();

    let probe = runner().probe(&endpoint).await;
    assert_matches!(probe, ProbeOutcome::TlsRejected { .. });

    let outcome = runner().check(&endpoint).await;
    assert_eq!(outcome.status, Status::Limited);
    let error = outcome.error.expect("limited outcome carries the TLS error");
    assert!(!error.is_empty());
    assert_ne!(error, CONNECT_FAILURE_MESSAGE);
}

#[tokio::test]
async fn test_handshake_dropped_by_peer_is_limited() {
    let port = spawn_handshake_dropping_server().await;

    let probe = runner().probe(&local_https(port)).await;
    assert_matches!(
        probe,
        ProbeOutcome::TlsRejected {
            cause: FailureCause::HandshakeFailed,
            ..
        }
    );

    let outcome = runner().check(&local_https(port)).await;
    assert_eq!(outcome.status, Status::Limited);
    let error = outcome.error.expect("limited outcome carries the TLS error");
    assert!(!error.is_empty());
    assert_ne!(error, CONNECT_FAILURE_MESSAGE);
    assert_eq!(outcome.possible_cause.as_deref(), Some("handshake failed"));
}

#[tokio::test]
async fn test_expired_certificate_is_limited() {
    let port = spawn_tls_server(EXPIRED_LEAF, AfterHandshake::Respond);

    let outcome = trusting_runner().check(&local_https(port)).await;

    assert_eq!(outcome.status, Status::Limited);
    let error = outcome.error.expect("limited outcome carries the TLS error");
    assert!(error.contains("xpired"), "unexpected TLS error: {error}");
    assert_eq!(outcome.possible_cause.as_deref(), Some("certificate rejected"));
}

#[tokio::test]
async fn test_trusted_certificate_is_operational() {
    let port = spawn_tls_server(VALID_LEAF, AfterHandshake::Respond);

    let outcome = trusting_runner().check(&local_https(port)).await;

    assert_eq!(outcome.status, Status::Operational);
    assert_eq!(outcome.error, None);
}

#[tokio::test]
async fn test_unknown_issuer_is_limited() {
    let port = spawn_tls_server(VALID_LEAF, AfterHandshake::Respond);

    // Without the test CA the chain cannot be validated.
    let outcome = runner().check(&local_https(port)).await;

    assert_eq!(outcome.status, Status::Limited);
    assert_eq!(outcome.possible_cause.as_deref(), Some("certificate rejected"));
}

#[tokio::test]
async fn test_failed_exchange_after_handshake_is_operational() {
    let port = spawn_tls_server(VALID_LEAF, AfterHandshake::HangUp);

    let probe = trusting_runner().probe(&local_https(port)).await;

    assert_eq!(probe, ProbeOutcome::Reachable);
}

#[tokio::test]
async fn test_refused_connection_is_offline() {
    let port = closed_port().await;
    let endpoint = Url::parse(&format!("https://127.0.0.1:{port}/")).unwrap();

    let probe = runner().probe(&endpoint).await;
    assert_eq!(
        probe,
        ProbeOutcome::Unreachable(FailureCause::ConnectionRefused)
    );

    let outcome = runner().check(&endpoint).await;
    assert_eq!(outcome.status, Status::Offline);
    assert_eq!(outcome.error.as_deref(), Some("Failed to connect to server."));
    assert_eq!(outcome.possible_cause.as_deref(), Some("connection refused"));
}

#[tokio::test]
async fn test_unresolvable_host_is_offline() {
    let endpoint = Url::parse("https://unreachable.invalid:9999").unwrap();

    let outcome = runner().check(&endpoint).await;

    assert_eq!(outcome.status, Status::Offline);
    assert_eq!(outcome.error.as_deref(), Some(CONNECT_FAILURE_MESSAGE));
}

#[tokio::test]
#[ignore = "requires outbound network access"]
async fn test_public_endpoint_with_valid_certificate_is_operational() {
    let endpoint = Url::parse("https://example.com").unwrap();
    let outcome = runner().check(&endpoint).await;
    assert_eq!(outcome.status, Status::Operational);
    assert_eq!(outcome.error, None);
}

#[tokio::test]
#[ignore = "requires outbound network access"]
async fn test_public_endpoint_with_expired_certificate_is_limited() {
    let endpoint = Url::parse("https://expired.badssl.com").unwrap();
    let outcome = runner().check(&endpoint).await;
    assert_eq!(outcome.status, Status::Limited);
    assert!(outcome.error.unwrap().to_lowercase().contains("expired"));
}
