//! # SeaTable MySync
//!
//! A Rust library and CLI for replacing the contents of SeaTable tables with
//! the results of configured MySQL queries.
//!
//! ## Features
//!
//! - **Full-replace sync**: the destination table is cleared and reloaded on
//!   every run, so repeated runs converge to the same state
//! - **Resilient clearing**: paginated listing and batch deletion with
//!   per-row fallback and an explicit verify-empty termination check
//! - **Multi-query tasks**: one primary dataset plus any number of auxiliary
//!   datasets merged into it by key
//! - **Value shaping**: MySQL DECIMAL amounts become grouped two-decimal
//!   strings, dates and datetimes become `YYYY-MM-DD`
//! - **Batch loading**: chunked appends sized to stay under the store's
//!   payload limits
//! - **Metrics**: built-in counters for observability
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use seatable_mysync::{AppConfig, SyncClient};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = AppConfig::from_env()?;
//!     let client = SyncClient::new(config);
//!
//!     let report = client.run_task("contract").await?;
//!     println!("Loaded {} rows into {}", report.rows_loaded, report.table_name);
//!     Ok(())
//! }
//! ```
//!
//! ## Task configuration
//!
//! Each task is a JSON document naming the destination table, the chunk size
//! and the query set:
//!
//! ```json
//! {
//!   "seatable": { "table_name": "Contracts" },
//!   "chunk_size": 100,
//!   "data_mappings": [
//!     {
//!       "description": "contracts",
//!       "sql_query": "SELECT id, amount, signed_at FROM contract",
//!       "field_mappings": { "id": "ID", "amount": "Amount", "signed_at": "Signed" }
//!     },
//!     {
//!       "description": "payments",
//!       "sql_query": ["SELECT id, paid", "FROM payment"],
//!       "field_mappings": { "id": "ID", "paid": "Paid" },
//!       "merge_rules": { "on": "ID", "target_field": "Paid" }
//!     }
//!   ]
//! }
//! ```

#![cfg_attr(docsrs, feature(doc_cfg))]
#![warn(missing_docs)]
#![warn(rustdoc::missing_crate_level_docs)]
#![deny(unsafe_code)]

pub mod clear;
pub mod config;
pub mod error;
pub mod load;
pub mod merge;
pub mod metrics;
pub mod mysql;
pub mod seatable;
pub mod sync;
pub mod transform;

// Re-exports for convenience
pub use clear::{ClearOutcome, DeleteOutcome};
pub use config::{AppConfig, MergeRule, QuerySpec, TaskConfig, TaskEntry};
pub use error::{Error, Result};
pub use seatable::{RemoteRow, SeaTableClient};
pub use sync::{SyncClient, SyncSummary, TaskReport};
pub use transform::{Record, SourceValue};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
