use std::collections::HashSet;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, bail};
use reqwest::Url;
use tracing::trace;

use crate::storage::Service;
use crate::storage::sqlite::TableNames;

/// Database configuration
#[derive(Debug, Clone, serde::Deserialize)]
pub struct DatabaseConfig {
    /// Path to the SQLite database file (in-memory if absent)
    pub path: Option<PathBuf>,

    /// Prefix for both table names
    #[serde(default = "default_table_prefix")]
    pub table_prefix: String,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        DatabaseConfig {
            path: None,
            table_prefix: default_table_prefix(),
        }
    }
}

fn default_table_prefix() -> String {
    String::from("statuswatch_")
}

/// History retention configuration
#[derive(Debug, Clone, serde::Deserialize)]
pub struct HistoryConfig {
    /// Maximum number of history rows kept per service
    #[serde(default = "default_retention")]
    pub retention: usize,
}

impl Default for HistoryConfig {
    fn default() -> Self {
        HistoryConfig {
            retention: default_retention(),
        }
    }
}

fn default_retention() -> usize {
    1000
}

/// Probe configuration shared by all services
#[derive(Debug, Clone, serde::Deserialize)]
pub struct CheckConfig {
    /// Upper bound for connecting and for the TLS handshake, in seconds
    #[serde(default = "default_timeout")]
    pub timeout: u64,
}

impl Default for CheckConfig {
    fn default() -> Self {
        CheckConfig {
            timeout: default_timeout(),
        }
    }
}

fn default_timeout() -> u64 {
    5
}

impl CheckConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout)
    }
}

#[derive(Debug, Clone, Default, serde::Deserialize)]
pub struct Config {
    #[serde(default)]
    pub database: DatabaseConfig,

    #[serde(default)]
    pub history: HistoryConfig,

    #[serde(default)]
    pub check: CheckConfig,

    #[serde(default)]
    pub services: Vec<ServiceConfig>,
}

/// A service as written in the configuration file
#[derive(Debug, Clone, serde::Deserialize)]
pub struct ServiceConfig {
    pub name: String,
    pub group: String,
    pub endpoint: String,
    /// Seconds between two checks
    #[serde(default = "default_interval")]
    pub interval: u64,
    #[serde(default)]
    pub hidden: bool,
}

pub fn default_interval() -> u64 {
    5
}

/// Fallback cadence for a persisted service without a matching configuration entry
pub const DEFAULT_INTERVAL: Duration = Duration::from_secs(5);

/// A validated service specification
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceSpec {
    pub name: String,
    pub group: String,
    pub endpoint: Url,
    pub interval: Duration,
    pub hidden: bool,
}

/// Identity used by reconciliation: a change to any field means a different service
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ServiceKey {
    pub name: String,
    pub group: String,
    pub endpoint: String,
}

impl ServiceSpec {
    pub fn key(&self) -> ServiceKey {
        ServiceKey {
            name: self.name.clone(),
            group: self.group.clone(),
            endpoint: self.endpoint.as_str().to_string(),
        }
    }
}

impl From<&Service> for ServiceKey {
    fn from(service: &Service) -> Self {
        ServiceKey {
            name: service.name.clone(),
            group: service.group.clone(),
            endpoint: service.endpoint.clone(),
        }
    }
}

/// Parse an endpoint, accepting only absolute http(s) URIs with a host
pub fn parse_endpoint(endpoint: &str) -> anyhow::Result<Url> {
    let url = Url::parse(endpoint).with_context(|| format!("malformed endpoint '{endpoint}'"))?;

    if !matches!(url.scheme(), "http" | "https") {
        bail!(
            "endpoint '{endpoint}' uses unsupported scheme '{}'",
            url.scheme()
        );
    }
    if url.host_str().is_none_or(str::is_empty) {
        bail!("endpoint '{endpoint}' has no host");
    }

    Ok(url)
}

impl ServiceConfig {
    pub fn resolve(&self) -> anyhow::Result<ServiceSpec> {
        if self.name.trim().is_empty() {
            bail!("service in group '{}' has an empty name", self.group);
        }
        if self.interval == 0 {
            bail!("service {}/{} has an interval of zero", self.group, self.name);
        }

        let endpoint = parse_endpoint(&self.endpoint)
            .with_context(|| format!("invalid service {}/{}", self.group, self.name))?;

        Ok(ServiceSpec {
            name: self.name.clone(),
            group: self.group.clone(),
            endpoint,
            interval: Duration::from_secs(self.interval),
            hidden: self.hidden,
        })
    }
}

impl Config {
    /// Check everything that must hold before any service is scheduled
    ///
    /// Returns the resolved services in configuration order.
    pub fn validate(&self) -> anyhow::Result<Vec<ServiceSpec>> {
        TableNames::from_prefix(&self.database.table_prefix)?;

        if self.history.retention == 0 {
            bail!("history retention must be at least 1");
        }
        if self.check.timeout == 0 {
            bail!("check timeout must be at least 1 second");
        }

        let mut seen = HashSet::new();
        let mut specs = Vec::with_capacity(self.services.len());
        for service in &self.services {
            let spec = service.resolve()?;
            if !seen.insert((spec.name.clone(), spec.group.clone())) {
                bail!("duplicate service {}/{}", spec.group, spec.name);
            }
            specs.push(spec);
        }

        trace!("validated {} services", specs.len());
        Ok(specs)
    }
}

pub fn read_config_file(path: &str) -> anyhow::Result<Config> {
    let file_content =
        std::fs::read_to_string(path).with_context(|| format!("failed to read {path}"))?;
    serde_json::from_str(&file_content)
        .with_context(|| format!("invalid configuration file {path}"))
        .inspect(|config| trace!("loaded config: {config:?}"))
}
