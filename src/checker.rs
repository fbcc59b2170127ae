//! Check runner - probes one endpoint and classifies the result
//!
//! ## Layers
//!
//! ```text
//! resolve + TCP connect ──fail──> OFFLINE  ("Failed to connect to server.")
//!        │ ok
//!        ├── http  ─────────────> OPERATIONAL
//!        └── https ─ TLS handshake + chain validation
//!                      ├── ok ────────> OPERATIONAL (even if the HTTP exchange fails)
//!                      ├── failed ────> LIMITED  (error = underlying TLS message)
//!                      └── timed out ─> OFFLINE
//! ```
//!
//! The transport layer is probed first so that a host with a broken
//! certificate is never reported as unreachable. Certificate validity
//! (expired / not yet valid) is enforced by the rustls webpki verifier for
//! every certificate on the path to a trusted root.
//!
//! Probing and classification are split: `HttpCheckRunner` produces a
//! `ProbeOutcome`, and `classify` turns it into a `CheckOutcome` without
//! touching the network.

use std::error::Error as StdError;
use std::fmt;
use std::io;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::redirect::Policy;
use reqwest::{Certificate, Url};
use tokio::net::{TcpStream, lookup_host};
use tokio::time::timeout;
use tracing::{debug, instrument, trace};

use crate::storage::Status;

/// Error recorded for every transport-level failure
pub const CONNECT_FAILURE_MESSAGE: &str = "Failed to connect to server.";

/// Coarse reason for a failed probe, stored as the entry's possible cause
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureCause {
    NameResolution,
    ConnectionRefused,
    TimedOut,
    Unreachable,
    CertificateRejected,
    HandshakeFailed,
}

impl fmt::Display for FailureCause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            FailureCause::NameResolution => "name resolution failed",
            FailureCause::ConnectionRefused => "connection refused",
            FailureCause::TimedOut => "timed out",
            FailureCause::Unreachable => "unreachable",
            FailureCause::CertificateRejected => "certificate rejected",
            FailureCause::HandshakeFailed => "handshake failed",
        };
        f.write_str(text)
    }
}

/// What happened on the wire, before classification
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProbeOutcome {
    /// Connected, and the TLS handshake (if any) succeeded
    Reachable,

    /// Connected, but the TLS layer refused the peer
    TlsRejected { message: String, cause: FailureCause },

    /// Could not reach the endpoint at the transport level
    Unreachable(FailureCause),
}

/// Classified result of one check
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckOutcome {
    pub status: Status,
    pub error: Option<String>,
    pub possible_cause: Option<String>,
}

/// Map a probe outcome to a status
pub fn classify(outcome: ProbeOutcome) -> CheckOutcome {
    match outcome {
        ProbeOutcome::Reachable => CheckOutcome {
            status: Status::Operational,
            error: None,
            possible_cause: None,
        },
        ProbeOutcome::TlsRejected { message, cause } => CheckOutcome {
            status: Status::Limited,
            error: Some(message),
            possible_cause: Some(cause.to_string()),
        },
        ProbeOutcome::Unreachable(cause) => CheckOutcome {
            status: Status::Offline,
            error: Some(CONNECT_FAILURE_MESSAGE.to_string()),
            possible_cause: Some(cause.to_string()),
        },
    }
}

/// Something that can check an endpoint
///
/// Implementations never fail: every problem is folded into the outcome.
#[async_trait]
pub trait CheckRunner: Send + Sync {
    async fn check(&self, endpoint: &Url) -> CheckOutcome;
}

/// Production check runner: raw TCP connect, then a rustls handshake for https
pub struct HttpCheckRunner {
    client: reqwest::Client,
    timeout: Duration,
}

impl HttpCheckRunner {
    /// Create a runner whose connect and handshake are each bounded by `timeout`
    pub fn new(timeout: Duration) -> anyhow::Result<Self> {
        Self::with_root_certificates(timeout, Vec::new())
    }

    /// Same as `new`, additionally trusting the given root certificates
    pub fn with_root_certificates(
        timeout: Duration,
        roots: Vec<Certificate>,
    ) -> anyhow::Result<Self> {
        // The whole request gets more time than the connect phase, so a
        // timeout during the handshake is always reported as a connect error.
        let mut builder = reqwest::Client::builder()
            .use_rustls_tls()
            .connect_timeout(timeout)
            .timeout(timeout * 2)
            .redirect(Policy::none());
        for root in roots {
            builder = builder.add_root_certificate(root);
        }

        Ok(Self {
            client: builder.build()?,
            timeout,
        })
    }

    /// Probe the endpoint without classifying
    #[instrument(skip(self), fields(endpoint = %endpoint))]
    pub async fn probe(&self, endpoint: &Url) -> ProbeOutcome {
        if let Err(cause) = self.connect(endpoint).await {
            return ProbeOutcome::Unreachable(cause);
        }

        if endpoint.scheme() != "https" {
            return ProbeOutcome::Reachable;
        }

        // reqwest reports everything up to and including the handshake as a
        // connect error. Anything after that means the handshake and chain
        // validation passed.
        match self.client.head(endpoint.clone()).send().await {
            Ok(response) => {
                trace!("handshake ok, status {}", response.status());
                ProbeOutcome::Reachable
            }
            Err(e) if e.is_connect() && e.is_timeout() => {
                debug!("handshake timed out: {e:#}");
                ProbeOutcome::Unreachable(FailureCause::TimedOut)
            }
            Err(e) if e.is_connect() => handshake_failure(&e),
            Err(e) => {
                debug!("handshake ok, request failed: {e:#}");
                ProbeOutcome::Reachable
            }
        }
    }

    async fn connect(&self, endpoint: &Url) -> Result<(), FailureCause> {
        let host = endpoint
            .host_str()
            .map(|h| h.trim_start_matches('[').trim_end_matches(']'))
            .ok_or(FailureCause::NameResolution)?;
        let port = endpoint
            .port_or_known_default()
            .ok_or(FailureCause::Unreachable)?;

        let addrs: Vec<_> = match timeout(self.timeout, lookup_host((host, port))).await {
            Err(_) => return Err(FailureCause::TimedOut),
            Ok(Err(e)) => {
                debug!("failed to resolve {host}: {e}");
                return Err(FailureCause::NameResolution);
            }
            Ok(Ok(addrs)) => addrs.collect(),
        };
        if addrs.is_empty() {
            return Err(FailureCause::NameResolution);
        }

        match timeout(self.timeout, TcpStream::connect(addrs.as_slice())).await {
            Err(_) => Err(FailureCause::TimedOut),
            Ok(Err(e)) => {
                debug!("failed to connect to {host}:{port}: {e}");
                Err(io_failure_cause(&e))
            }
            Ok(Ok(_stream)) => Ok(()),
        }
    }
}

#[async_trait]
impl CheckRunner for HttpCheckRunner {
    async fn check(&self, endpoint: &Url) -> CheckOutcome {
        classify(self.probe(endpoint).await)
    }
}

fn io_failure_cause(err: &io::Error) -> FailureCause {
    match err.kind() {
        io::ErrorKind::ConnectionRefused => FailureCause::ConnectionRefused,
        io::ErrorKind::TimedOut => FailureCause::TimedOut,
        _ => FailureCause::Unreachable,
    }
}

/// Classify a failure that happened after the TCP connect but before any response
///
/// The transport was reachable a moment ago, so unless the connection is now
/// refused outright this is a TLS problem.
fn handshake_failure(err: &(dyn StdError + 'static)) -> ProbeOutcome {
    if let Some(tls) = find_rustls_error(err) {
        return ProbeOutcome::TlsRejected {
            message: tls.to_string(),
            cause: match tls {
                rustls::Error::InvalidCertificate(_) => FailureCause::CertificateRejected,
                _ => FailureCause::HandshakeFailed,
            },
        };
    }

    let chain = error_chain(err);
    let refused = chain.iter().any(|e| {
        e.downcast_ref::<io::Error>()
            .is_some_and(|io| io.kind() == io::ErrorKind::ConnectionRefused)
    });
    if refused {
        return ProbeOutcome::Unreachable(FailureCause::ConnectionRefused);
    }

    let message = chain
        .last()
        .map(|e| e.to_string())
        .unwrap_or_else(|| err.to_string());
    ProbeOutcome::TlsRejected {
        message,
        cause: FailureCause::HandshakeFailed,
    }
}

/// Every error in a chain, outermost first
///
/// TLS failures reach us wrapped in one or more `io::Error`s, whose `source()`
/// skips the wrapped error itself, so those are unwrapped by hand.
fn error_chain<'a>(err: &'a (dyn StdError + 'static)) -> Vec<&'a (dyn StdError + 'static)> {
    let mut chain = Vec::new();
    let mut next = Some(err);

    while let Some(current) = next {
        chain.push(current);
        next = match current.downcast_ref::<io::Error>().and_then(io::Error::get_ref) {
            Some(inner) => Some(inner as &(dyn StdError + 'static)),
            None => current.source(),
        };
    }

    chain
}

/// Find a rustls error anywhere in an error chain
fn find_rustls_error<'a>(err: &'a (dyn StdError + 'static)) -> Option<&'a rustls::Error> {
    error_chain(err)
        .into_iter()
        .find_map(|e| e.downcast_ref::<rustls::Error>())
}
