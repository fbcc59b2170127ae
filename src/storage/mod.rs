//! Storage for the service registry and per-service check history
//!
//! This module provides a trait-based abstraction over the database that holds
//! the registered services and their check history.
//!
//! ## Design
//!
//! - **Trait-based**: `StorageBackend` is what the registry and history store depend on
//! - **Async**: All operations are async for compatibility with the Tokio actors
//! - **Parameterized**: Values are always bound, never spliced into SQL text
//!
//! ## Usage
//!
//! ```no_run
//! use statuswatch::storage::{StorageBackend, sqlite::SqliteBackend};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let backend = SqliteBackend::new("./status.db", "statuswatch_").await?;
//!     let services = backend.list_services().await?;
//!     Ok(())
//! }
//! ```

pub mod backend;
pub mod error;
pub mod schema;
pub mod sqlite;

pub use backend::{HealthStatus, NewService, StorageBackend};
pub use error::{StorageError, StorageResult};
pub use schema::{HistoryEntry, NewHistoryEntry, Service, ServiceId, Status};
