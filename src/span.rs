//! Span recording shared by statements, connections and rows.

use std::sync::Arc;
use std::time::Instant;

use tracing::Span;

use crate::attributes::ConnectionAttributes;
use crate::config::TracingConfig;
use crate::diagnostics;
use crate::driver::{render_args, NamedValue};
use crate::error::Error;
use crate::parser::SqlSummary;

/// Create a span for a SQL operation as a child of the context's span.
///
/// The name must be a literal; every field the recorder may fill later is
/// declared empty here.
macro_rules! sql_span {
    ($name:literal, $ctx:expr, $shared:expr) => {
        ::tracing::info_span!(
            parent: &$ctx.span(),
            $name,
            otel.kind = "client",
            db.system = $shared.config.db_system,
            db.operation = ::tracing::field::Empty,
            db.sql.table = ::tracing::field::Empty,
            sql.statement = ::tracing::field::Empty,
            sql.args = ::tracing::field::Empty,
            server.address = ::tracing::field::Empty,
            server.port = ::tracing::field::Empty,
            db.name = ::tracing::field::Empty,
            db.user = ::tracing::field::Empty,
            db.connection = ::tracing::field::Empty,
            db.rows_affected = ::tracing::field::Empty,
            db.rows_returned = ::tracing::field::Empty,
            db.duration_ms = ::tracing::field::Empty,
            slow_query = ::tracing::field::Empty,
            otel.status_code = ::tracing::field::Empty,
            error = ::tracing::field::Empty,
            error.message = ::tracing::field::Empty,
            db.error.detail = ::tracing::field::Empty,
            db.error.hint = ::tracing::field::Empty,
            db.error.code_name = ::tracing::field::Empty,
            db.error.code = ::tracing::field::Empty,
            db.error.table = ::tracing::field::Empty,
            db.error.constraint = ::tracing::field::Empty,
            "db.error.where" = ::tracing::field::Empty,
            db.error.column = ::tracing::field::Empty,
        )
    };
}

pub(crate) use sql_span;

/// Configuration and attributes of one connection, shared with everything
/// it creates.
#[derive(Debug)]
pub(crate) struct Shared {
    pub(crate) config: Arc<TracingConfig>,
    pub(crate) attrs: Arc<ConnectionAttributes>,
}

/// Owns an open span and guarantees it is ended exactly once.
///
/// The span ends on [`QuerySpan::end`] or on drop, whichever comes first.
#[derive(Debug)]
pub(crate) struct QuerySpan {
    span: Option<Span>,
    shared: Arc<Shared>,
    started: Instant,
    failed: bool,
}

impl QuerySpan {
    pub(crate) fn new(span: Span, shared: Arc<Shared>) -> Self {
        Self {
            span: Some(span),
            shared,
            started: Instant::now(),
            failed: false,
        }
    }

    /// The open span, or a disabled one after [`QuerySpan::end`].
    pub(crate) fn span(&self) -> Span {
        self.span.clone().unwrap_or_else(Span::none)
    }

    pub(crate) fn is_ended(&self) -> bool {
        self.span.is_none()
    }

    /// Record the statement, arguments and connection attributes.
    pub(crate) fn annotate(&self, query: &str, args: &[NamedValue]) {
        let Some(span) = &self.span else { return };
        let config = &self.shared.config;

        let summary = SqlSummary::parse(query);
        span.record("db.operation", summary.operation.as_str());
        if let Some(table) = &summary.table {
            span.record("db.sql.table", table.as_str());
        }
        if config.include_query {
            span.record("sql.statement", query);
        }
        if config.include_args {
            span.record("sql.args", render_args(args).as_str());
        }

        let attrs = &self.shared.attrs;
        if let Some(host) = attrs.get("host") {
            span.record("server.address", host);
        }
        if let Some(port) = attrs.get("port") {
            match port.parse::<u16>() {
                Ok(port) => span.record("server.port", port),
                Err(_) => span.record("server.port", port),
            };
        }
        if let Some(dbname) = attrs.get("dbname") {
            span.record("db.name", dbname);
        }
        if let Some(user) = attrs.get("user") {
            span.record("db.user", user);
        }
        if !attrs.is_empty() {
            span.record("db.connection", attrs.to_string().as_str());
        }
    }

    /// Record a failed call. The end-of-rows sentinel is not a failure.
    pub(crate) fn record_error(&mut self, err: &Error) {
        if err.is_end_of_rows() {
            return;
        }
        let Some(span) = &self.span else { return };
        self.failed = true;

        span.record("error", true);
        span.record("otel.status_code", "ERROR");
        span.record("error.message", err.to_string().as_str());
        if let Some(diagnostics) = diagnostics::extract(err) {
            for (field, value) in diagnostics.fields() {
                span.record(field, value);
            }
        }
        tracing::error!(parent: span, error = %err, "Database query failed");
    }

    pub(crate) fn record_rows_affected(&self, rows: u64) {
        if let Some(span) = &self.span {
            if self.shared.config.record_row_counts {
                span.record("db.rows_affected", rows);
            }
        }
    }

    pub(crate) fn record_rows_returned(&self, rows: u64) {
        if let Some(span) = &self.span {
            if self.shared.config.record_row_counts {
                span.record("db.rows_returned", rows);
            }
        }
    }

    /// End the span, marking it OK unless an error was recorded. Later calls
    /// do nothing.
    pub(crate) fn end(&mut self) {
        let Some(span) = self.span.take() else { return };

        if !self.failed {
            span.record("otel.status_code", "OK");
        }

        let elapsed = self.started.elapsed();
        span.record("db.duration_ms", elapsed.as_millis() as u64);
        let threshold = self.shared.config.slow_query_threshold;
        if elapsed > threshold {
            span.record("slow_query", true);
            tracing::warn!(
                parent: &span,
                duration_ms = elapsed.as_millis() as u64,
                threshold_ms = threshold.as_millis() as u64,
                "Slow query detected"
            );
        }
    }
}

impl Drop for QuerySpan {
    fn drop(&mut self) {
        self.end();
    }
}
