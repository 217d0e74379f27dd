//! Traced prepared statements.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::Instrument;

use crate::context::Context;
use crate::driver::{
    self, ExecResult, NamedValue, NamedValueChecker, Rows, Stmt, StmtExecContext,
    StmtQueryContext, Value,
};
use crate::error::Result;
use crate::rows::TracedRows;
use crate::span::{sql_span, QuerySpan, Shared};

/// A prepared statement whose `exec` and `query` calls are traced.
///
/// Exec spans (`SQL.Stmt.Exec`) end when the call returns. Query spans
/// (`SQL.Stmt.Query`) end on failure, or are handed to the returned
/// [`TracedRows`] on success.
///
/// The context-aware methods are always available: when the wrapped
/// statement only supports blocking execution the context is dropped and the
/// call cannot be cancelled.
pub struct TracedStmt {
    inner: Box<dyn Stmt>,
    query: String,
    shared: Arc<Shared>,
}

impl std::fmt::Debug for TracedStmt {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TracedStmt")
            .field("query", &self.query)
            .finish_non_exhaustive()
    }
}

impl TracedStmt {
    pub(crate) fn new(inner: Box<dyn Stmt>, query: &str, shared: Arc<Shared>) -> Self {
        Self {
            inner,
            query: query.to_string(),
            shared,
        }
    }

    /// The SQL text this statement was prepared from.
    pub fn query_text(&self) -> &str {
        &self.query
    }

    /// Get a mutable reference to the wrapped statement.
    pub fn inner_mut(&mut self) -> &mut dyn Stmt {
        self.inner.as_mut()
    }

    /// Consume the wrapper and return the wrapped statement.
    pub fn into_inner(self) -> Box<dyn Stmt> {
        self.inner
    }
}

#[async_trait]
impl StmtExecContext for TracedStmt {
    async fn exec_context(&mut self, ctx: &Context, args: &[NamedValue]) -> Result<ExecResult> {
        let mut span = QuerySpan::new(sql_span!("SQL.Stmt.Exec", ctx, self.shared), self.shared.clone());
        span.annotate(&self.query, args);

        let child = ctx.scoped();
        let result = driver::stmt_exec(self.inner.as_mut(), &child, args)
            .instrument(span.span())
            .await;

        match &result {
            Ok(res) => span.record_rows_affected(res.rows_affected),
            Err(e) => span.record_error(e),
        }
        result
    }
}

#[async_trait]
impl StmtQueryContext for TracedStmt {
    async fn query_context(&mut self, ctx: &Context, args: &[NamedValue]) -> Result<Box<dyn Rows>> {
        let mut span = QuerySpan::new(sql_span!("SQL.Stmt.Query", ctx, self.shared), self.shared.clone());
        span.annotate(&self.query, args);

        let child = ctx.scoped();
        let result = driver::stmt_query(self.inner.as_mut(), &child, args)
            .instrument(span.span())
            .await;

        match result {
            Ok(rows) => Ok(Box::new(TracedRows::new(rows, span))),
            Err(e) => {
                span.record_error(&e);
                Err(e)
            }
        }
    }
}

impl Stmt for TracedStmt {
    fn close(&mut self) -> Result<()> {
        self.inner.close()
    }

    fn num_input(&self) -> Option<usize> {
        self.inner.num_input()
    }

    /// Blocking exec, traced under the caller's current span.
    fn exec(&mut self, args: &[Value]) -> Result<ExecResult> {
        let ctx = Context::current();
        let mut span = QuerySpan::new(sql_span!("SQL.Stmt.Exec", ctx, self.shared), self.shared.clone());
        span.annotate(&self.query, &NamedValue::positional(args.iter().cloned()));

        let result = span.span().in_scope(|| self.inner.exec(args));
        match &result {
            Ok(res) => span.record_rows_affected(res.rows_affected),
            Err(e) => span.record_error(e),
        }
        result
    }

    /// Blocking query, traced under the caller's current span.
    fn query(&mut self, args: &[Value]) -> Result<Box<dyn Rows>> {
        let ctx = Context::current();
        let mut span = QuerySpan::new(sql_span!("SQL.Stmt.Query", ctx, self.shared), self.shared.clone());
        span.annotate(&self.query, &NamedValue::positional(args.iter().cloned()));

        match span.span().in_scope(|| self.inner.query(args)) {
            Ok(rows) => Ok(Box::new(TracedRows::new(rows, span))),
            Err(e) => {
                span.record_error(&e);
                Err(e)
            }
        }
    }

    fn as_exec_context(&mut self) -> Option<&mut dyn StmtExecContext> {
        Some(self)
    }

    fn as_query_context(&mut self) -> Option<&mut dyn StmtQueryContext> {
        Some(self)
    }

    fn as_named_value_checker(&mut self) -> Option<&mut dyn NamedValueChecker> {
        self.inner.as_named_value_checker()
    }
}
