//! Row types persisted by the storage layer
//!
//! ## Tables
//!
//! Two tables are maintained, both named after the configured prefix:
//!
//! - `<prefix>services` - one row per monitored service, keyed by a surrogate id.
//!   `(name, group)` is the business key.
//! - `<prefix>history` - one row per completed probe. Rows reference their service
//!   with `ON DELETE CASCADE`, so removing a service removes its history.
//!
//! Timestamps are stored as UTC milliseconds.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Surrogate identifier assigned by storage when a service is inserted
pub type ServiceId = i64;

/// A monitored target as persisted by the registry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Service {
    pub id: ServiceId,
    pub name: String,
    pub group: String,
    /// Endpoint exactly as configured (always parses as a URI, see `config::Config::validate`)
    pub endpoint: String,
    /// Display hint only; probing ignores it
    pub hidden: bool,
}

/// Classified state of a service at one point in time
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Status {
    /// Reachable and, for TLS endpoints, presenting a valid certificate chain
    Operational,

    /// Reachable at the transport level, but the TLS handshake or certificate check failed
    Limited,

    /// Not reachable at all
    Offline,

    /// No check has completed yet
    Unknown,
}

impl Status {
    pub fn as_str(&self) -> &'static str {
        match self {
            Status::Operational => "OPERATIONAL",
            Status::Limited => "LIMITED",
            Status::Offline => "OFFLINE",
            Status::Unknown => "UNKNOWN",
        }
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Status {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "OPERATIONAL" => Ok(Status::Operational),
            "LIMITED" => Ok(Status::Limited),
            "OFFLINE" => Ok(Status::Offline),
            "UNKNOWN" => Ok(Status::Unknown),
            other => Err(format!("unknown status '{other}'")),
        }
    }
}

/// One persisted probe outcome
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryEntry {
    /// Monotonically increasing in insertion order; breaks timestamp ties
    pub id: i64,
    pub service_id: ServiceId,
    pub timestamp: DateTime<Utc>,
    pub status: Status,
    pub error: Option<String>,
    pub possible_cause: Option<String>,
}

/// A history row that has not been written yet
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewHistoryEntry {
    pub service_id: ServiceId,
    pub timestamp: DateTime<Utc>,
    pub status: Status,
    pub error: Option<String>,
    pub possible_cause: Option<String>,
}
