//! SQLite storage backend implementation
//!
//! This module provides a SQLite-based implementation of the `StorageBackend` trait.
//!
//! ## Features
//!
//! - **Embedded**: No separate database server required
//! - **WAL mode**: Reads proceed while a write is in progress (file databases)
//! - **Single writer**: All writes go through one async mutex
//! - **Prefixed tables**: Both tables are named after the configured prefix,
//!   including in retention queries
//!
//! ## In-memory databases
//!
//! Every SQLite in-memory connection is its own database, so the in-memory
//! variant uses a pool of exactly one connection that never expires. All
//! access is serialized through that connection.

use std::collections::HashMap;
use std::path::Path;
use std::sync::LazyLock;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use regex::Regex;
use sqlx::sqlite::{
    SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteRow, SqliteSynchronous,
};
use sqlx::{Pool, Row, Sqlite};
use tokio::sync::Mutex;
use tracing::{debug, info, instrument, trace, warn};

use super::backend::{HealthStatus, NewService, StorageBackend};
use super::error::{StorageError, StorageResult};
use super::schema::{HistoryEntry, NewHistoryEntry, Service, ServiceId, Status};

/// Pattern a table prefix must match; identifiers cannot be bound as parameters
const TABLE_PREFIX_PATTERN: &str = r"^[A-Za-z_][A-Za-z0-9_]*$";

static TABLE_PREFIX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(TABLE_PREFIX_PATTERN).expect("table prefix pattern is valid"));

/// Names of the two tables, derived from the configured prefix
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableNames {
    pub services: String,
    pub history: String,
}

impl TableNames {
    /// Derive table names from a prefix
    ///
    /// An empty prefix is allowed. Anything else must be a plain SQL identifier.
    pub fn from_prefix(prefix: &str) -> StorageResult<Self> {
        if !prefix.is_empty() && !TABLE_PREFIX.is_match(prefix) {
            return Err(StorageError::InvalidConfig(format!(
                "table prefix '{prefix}' must match {TABLE_PREFIX_PATTERN}"
            )));
        }

        Ok(Self {
            services: format!("{prefix}services"),
            history: format!("{prefix}history"),
        })
    }
}

/// SQLite storage backend
pub struct SqliteBackend {
    pool: Pool<Sqlite>,
    tables: TableNames,
    location: String,
    write_gate: Mutex<()>,
}

impl SqliteBackend {
    /// Open (or create) a database file
    ///
    /// This will:
    /// 1. Create the database file if it doesn't exist
    /// 2. Create both tables if they are missing
    /// 3. Configure SQLite for concurrent reads (WAL mode, etc.)
    ///
    /// ## Example
    ///
    /// ```no_run
    /// # use statuswatch::storage::sqlite::SqliteBackend;
    /// # async fn example() -> anyhow::Result<()> {
    /// let backend = SqliteBackend::new("./status.db", "statuswatch_").await?;
    /// # Ok(())
    /// # }
    /// ```
    #[instrument(skip_all)]
    pub async fn new(db_path: impl AsRef<Path>, table_prefix: &str) -> StorageResult<Self> {
        let tables = TableNames::from_prefix(table_prefix)?;
        let location = db_path.as_ref().to_string_lossy().to_string();

        info!("initializing SQLite backend at: {}", location);

        let options = SqliteConnectOptions::new()
            .filename(&location)
            .create_if_missing(true)
            .foreign_keys(true)
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal)
            .busy_timeout(Duration::from_secs(30));

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await
            .map_err(|e| StorageError::ConnectionFailed(e.to_string()))?;

        Self::with_pool(pool, tables, location).await
    }

    /// Open a private in-memory database
    #[instrument(skip_all)]
    pub async fn in_memory(table_prefix: &str) -> StorageResult<Self> {
        let tables = TableNames::from_prefix(table_prefix)?;

        debug!("initializing in-memory SQLite backend");

        let options = SqliteConnectOptions::new()
            .in_memory(true)
            .foreign_keys(true);

        let pool = SqlitePoolOptions::new()
            .min_connections(1)
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(options)
            .await
            .map_err(|e| StorageError::ConnectionFailed(e.to_string()))?;

        Self::with_pool(pool, tables, ":memory:".to_string()).await
    }

    async fn with_pool(pool: Pool<Sqlite>, tables: TableNames, location: String) -> StorageResult<Self> {
        let backend = Self {
            pool,
            tables,
            location,
            write_gate: Mutex::new(()),
        };
        backend.create_tables().await?;
        info!(
            "SQLite backend ready (tables: {}, {})",
            backend.tables.services, backend.tables.history
        );
        Ok(backend)
    }

    /// Table names in use
    pub fn tables(&self) -> &TableNames {
        &self.tables
    }

    async fn create_tables(&self) -> StorageResult<()> {
        let TableNames { services, history } = &self.tables;

        let statements = [
            format!(
                r#"
                CREATE TABLE IF NOT EXISTS "{services}" (
                    id INTEGER PRIMARY KEY AUTOINCREMENT NOT NULL,
                    "group" TEXT NOT NULL,
                    name TEXT NOT NULL,
                    endpoint TEXT NOT NULL,
                    hidden BOOLEAN NOT NULL,
                    UNIQUE (name, "group")
                )
                "#
            ),
            format!(
                r#"
                CREATE TABLE IF NOT EXISTS "{history}" (
                    id INTEGER PRIMARY KEY AUTOINCREMENT NOT NULL,
                    service_id INTEGER NOT NULL REFERENCES "{services}"(id) ON DELETE CASCADE,
                    timestamp INTEGER NOT NULL,
                    status TEXT NOT NULL
                        CHECK (status IN ('OPERATIONAL', 'LIMITED', 'OFFLINE', 'UNKNOWN')),
                    error TEXT,
                    possible_cause TEXT
                )
                "#
            ),
            format!(
                r#"
                CREATE INDEX IF NOT EXISTS "{history}_recent"
                ON "{history}" (service_id, timestamp DESC, id DESC)
                "#
            ),
        ];

        for statement in statements {
            sqlx::query(&statement)
                .execute(&self.pool)
                .await
                .map_err(|e| StorageError::MigrationFailed(e.to_string()))?;
        }

        debug!("schema ready");
        Ok(())
    }

    /// Helper to convert timestamp to Unix milliseconds for SQLite
    fn timestamp_to_millis(dt: &DateTime<Utc>) -> i64 {
        dt.timestamp_millis()
    }

    /// Helper to convert Unix milliseconds from SQLite to DateTime
    fn millis_to_timestamp(millis: i64) -> StorageResult<DateTime<Utc>> {
        DateTime::from_timestamp_millis(millis).ok_or_else(|| {
            warn!("stored timestamp {millis} is out of range");
            StorageError::QueryFailed(format!("timestamp {millis} is out of range"))
        })
    }

    fn bound_count(count: usize) -> i64 {
        i64::try_from(count).unwrap_or(i64::MAX)
    }

    fn service_from_row(row: &SqliteRow) -> StorageResult<Service> {
        Ok(Service {
            id: row.try_get("id")?,
            name: row.try_get("name")?,
            group: row.try_get("group")?,
            endpoint: row.try_get("endpoint")?,
            hidden: row.try_get("hidden")?,
        })
    }

    fn history_from_row(row: &SqliteRow) -> StorageResult<HistoryEntry> {
        let status: String = row.try_get("status")?;
        let status = status.parse::<Status>().map_err(StorageError::QueryFailed)?;

        Ok(HistoryEntry {
            id: row.try_get("id")?,
            service_id: row.try_get("service_id")?,
            timestamp: Self::millis_to_timestamp(row.try_get("timestamp")?)?,
            status,
            error: row.try_get("error")?,
            possible_cause: row.try_get("possible_cause")?,
        })
    }
}

#[async_trait]
impl StorageBackend for SqliteBackend {
    #[instrument(skip(self))]
    async fn list_services(&self) -> StorageResult<Vec<Service>> {
        let sql = format!(
            r#"SELECT id, name, "group", endpoint, hidden FROM "{}""#,
            self.tables.services
        );

        let rows = sqlx::query(&sql).fetch_all(&self.pool).await?;
        let services = rows
            .iter()
            .map(Self::service_from_row)
            .collect::<StorageResult<Vec<_>>>()?;

        trace!("listed {} services", services.len());
        Ok(services)
    }

    #[instrument(skip(self))]
    async fn find_service_id(&self, name: &str, group: &str) -> StorageResult<ServiceId> {
        let sql = format!(
            r#"SELECT id FROM "{}" WHERE name = ? AND "group" = ?"#,
            self.tables.services
        );

        let row: Option<(i64,)> = sqlx::query_as(&sql)
            .bind(name)
            .bind(group)
            .fetch_optional(&self.pool)
            .await?;

        row.map(|(id,)| id)
            .ok_or_else(|| StorageError::NotFound(format!("service {group}/{name}")))
    }

    #[instrument(skip(self), fields(name = %service.name, group = %service.group))]
    async fn insert_service(&self, service: NewService) -> StorageResult<ServiceId> {
        let sql = format!(
            r#"INSERT INTO "{}" (name, "group", endpoint, hidden) VALUES (?, ?, ?, ?)"#,
            self.tables.services
        );

        let _guard = self.write_gate.lock().await;
        let result = sqlx::query(&sql)
            .bind(&service.name)
            .bind(&service.group)
            .bind(&service.endpoint)
            .bind(service.hidden)
            .execute(&self.pool)
            .await?;

        Ok(result.last_insert_rowid())
    }

    #[instrument(skip(self))]
    async fn delete_service(&self, id: ServiceId) -> StorageResult<bool> {
        let sql = format!(r#"DELETE FROM "{}" WHERE id = ?"#, self.tables.services);

        let _guard = self.write_gate.lock().await;
        let result = sqlx::query(&sql).bind(id).execute(&self.pool).await?;

        Ok(result.rows_affected() > 0)
    }

    #[instrument(skip(self))]
    async fn delete_all_services(&self) -> StorageResult<usize> {
        let sql = format!(r#"DELETE FROM "{}""#, self.tables.services);

        let _guard = self.write_gate.lock().await;
        let result = sqlx::query(&sql).execute(&self.pool).await?;

        Ok(result.rows_affected() as usize)
    }

    #[instrument(skip(self, entry), fields(service_id = entry.service_id, status = %entry.status))]
    async fn insert_history(&self, entry: NewHistoryEntry) -> StorageResult<i64> {
        let sql = format!(
            r#"
            INSERT INTO "{}" (service_id, timestamp, status, error, possible_cause)
            VALUES (?, ?, ?, ?, ?)
            "#,
            self.tables.history
        );

        let _guard = self.write_gate.lock().await;
        let result = sqlx::query(&sql)
            .bind(entry.service_id)
            .bind(Self::timestamp_to_millis(&entry.timestamp))
            .bind(entry.status.as_str())
            .bind(entry.error.as_deref())
            .bind(entry.possible_cause.as_deref())
            .execute(&self.pool)
            .await?;

        Ok(result.last_insert_rowid())
    }

    #[instrument(skip(self))]
    async fn latest_history(
        &self,
        service_id: ServiceId,
        limit: usize,
    ) -> StorageResult<Vec<HistoryEntry>> {
        let sql = format!(
            r#"
            SELECT id, service_id, timestamp, status, error, possible_cause
            FROM "{}"
            WHERE service_id = ?
            ORDER BY timestamp DESC, id DESC
            LIMIT ?
            "#,
            self.tables.history
        );

        let rows = sqlx::query(&sql)
            .bind(service_id)
            .bind(Self::bound_count(limit))
            .fetch_all(&self.pool)
            .await?;

        let entries = rows
            .iter()
            .map(Self::history_from_row)
            .collect::<StorageResult<Vec<_>>>()?;

        trace!("query returned {} history rows", entries.len());
        Ok(entries)
    }

    #[instrument(skip(self))]
    async fn retain_history(&self, service_id: ServiceId, cap: usize) -> StorageResult<usize> {
        let history = &self.tables.history;
        let sql = format!(
            r#"
            DELETE FROM "{history}"
            WHERE service_id = ?
              AND id NOT IN (
                SELECT id FROM "{history}"
                WHERE service_id = ?
                ORDER BY timestamp DESC, id DESC
                LIMIT ?
              )
            "#
        );

        let _guard = self.write_gate.lock().await;
        let result = sqlx::query(&sql)
            .bind(service_id)
            .bind(service_id)
            .bind(Self::bound_count(cap))
            .execute(&self.pool)
            .await?;

        let deleted = result.rows_affected() as usize;
        if deleted > 0 {
            debug!("retention removed {} rows", deleted);
        }
        Ok(deleted)
    }

    #[instrument(skip(self))]
    async fn count_history(&self, service_id: ServiceId) -> StorageResult<usize> {
        let sql = format!(
            r#"SELECT COUNT(*) FROM "{}" WHERE service_id = ?"#,
            self.tables.history
        );

        let (count,): (i64,) = sqlx::query_as(&sql)
            .bind(service_id)
            .fetch_one(&self.pool)
            .await?;

        Ok(count.max(0) as usize)
    }

    #[instrument(skip(self))]
    async fn health_check(&self) -> StorageResult<HealthStatus> {
        match sqlx::query("SELECT 1").fetch_one(&self.pool).await {
            Ok(_) => {
                let mut metadata = HashMap::new();
                metadata.insert("backend".to_string(), "sqlite".to_string());
                metadata.insert("location".to_string(), self.location.clone());
                metadata.insert("services_table".to_string(), self.tables.services.clone());
                metadata.insert("history_table".to_string(), self.tables.history.clone());

                Ok(HealthStatus {
                    healthy: true,
                    message: "SQLite backend operational".to_string(),
                    metadata,
                })
            }
            Err(e) => {
                warn!("health check failed: {}", e);
                Ok(HealthStatus {
                    healthy: false,
                    message: format!("health check failed: {}", e),
                    metadata: HashMap::new(),
                })
            }
        }
    }

    async fn close(&self) -> StorageResult<()> {
        info!("closing SQLite backend");
        self.pool.close().await;
        Ok(())
    }
}
