//! # sqltrace
//!
//! OpenTelemetry-compatible tracing instrumentation for pluggable SQL drivers.
//!
//! This crate wraps any driver implementing the [`driver`] contract and emits a
//! `tracing` span for every statement execution, with proper parent-child
//! relationships that integrate with your existing tracing infrastructure
//! (like HTTP request spans from axum or actix-web).
//!
//! ## Features
//!
//! - **Transparent Proxy**: A traced driver is itself a driver; callers cannot tell the difference
//! - **OpenTelemetry Compatible**: Spans follow the database semantic conventions
//! - **Proper Span Nesting**: Spans are children of the span carried by the [`Context`]
//! - **SQL Visibility**: Optionally include the SQL text and bound arguments in spans
//! - **Rich Errors**: Server diagnostics (detail, hint, constraint...) recorded as span fields
//! - **Cancellation**: Context cancellation and deadlines reach the wrapped driver
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use sqltrace::prelude::*;
//!
//! // Wrap your existing driver
//! let driver: Arc<dyn Driver> = Arc::new(MyPostgresDriver::default());
//! let traced = driver.with_tracing();
//!
//! // Use it exactly like the wrapped driver
//! let ctx = Context::current();
//! let mut conn = traced.open_traced("host=localhost dbname=app")?;
//! let mut stmt = conn.prepare_traced(&ctx, "SELECT id FROM users WHERE id = $1").await?;
//! let rows = stmt.query_context(&ctx, &NamedValue::positional([42_i64])).await?;
//! ```
//!
//! ## Configuration
//!
//! ```rust,ignore
//! use sqltrace::{TracedDriver, TracingConfig};
//!
//! let config = TracingConfig::default()
//!     .with_query(true)  // Include SQL in spans (default: false for security)
//!     .with_args(false)  // Include bound arguments (default: false)
//!     .with_slow_query_threshold(Duration::from_millis(100));
//!
//! let traced = TracedDriver::new(driver, config);
//! ```
//!
//! ## Span Names
//!
//! | Span | Ends |
//! |------|------|
//! | `SQL.Stmt.Exec` | When the prepared statement's exec returns |
//! | `SQL.Stmt.Query` | On failure, or when the returned rows are exhausted, closed or dropped |
//! | `SQL.Conn.Exec` | When a direct exec returns |
//! | `SQL.Conn.Query` | Like `SQL.Stmt.Query` |
//!
//! Opening connections, preparing statements and transactions are not traced.
//!
//! ## Span Attributes
//!
//! | Attribute | Description |
//! |-----------|-------------|
//! | `db.system` | Database system name, "postgresql" unless configured |
//! | `db.operation` | SQL operation (SELECT, INSERT, UPDATE, DELETE, ...) |
//! | `db.sql.table` | Target table name (when detectable) |
//! | `sql.statement` | Full SQL query (when enabled) |
//! | `sql.args` | Bound arguments (when enabled) |
//! | `server.address`, `server.port`, `db.name`, `db.user` | From the connection descriptor |
//! | `db.connection` | All non-secret descriptor attributes |
//! | `db.rows_affected` / `db.rows_returned` | Row counts (when enabled) |
//! | `otel.status_code` | "OK", or "ERROR" on failure |
//! | `error`, `error.message` | Set on failure |
//! | `db.error.*` | Server diagnostics (on failure, when present) |

mod attributes;
mod config;
mod connection;
mod connector;
mod context;
mod diagnostics;
pub mod driver;
mod error;
mod parser;
mod rows;
mod span;
mod statement;
#[cfg(test)]
mod testing;
mod traced_driver;

pub use attributes::ConnectionAttributes;
pub use config::TracingConfig;
pub use connection::{Capabilities, TracedConn};
pub use connector::TracedConnector;
pub use context::Context;
pub use diagnostics::{condition_name, extract as extract_diagnostics, Diagnose, Diagnosed, Diagnostics};
pub use error::{BoxError, DbError, Error, Result};
pub use parser::{SqlOperation, SqlSummary};
pub use rows::TracedRows;
pub use statement::TracedStmt;
pub use traced_driver::{TracedDriver, TracingExt};

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::driver::{
        Conn, Driver, NamedValue, Rows, Stmt, StmtExecContext, StmtQueryContext, Value,
    };
    pub use crate::{Context, TracedDriver, TracingConfig, TracingExt};
}
