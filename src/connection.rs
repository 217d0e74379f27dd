//! Traced database connection wrapper.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::Instrument;

use crate::attributes::ConnectionAttributes;
use crate::config::TracingConfig;
use crate::context::Context;
use crate::driver::{
    self, Conn, ConnBeginTx, ConnPrepareContext, ExecResult, Execer, ExecerContext, NamedValue,
    NamedValueChecker, Pinger, Queryer, QueryerContext, Rows, SessionResetter, Stmt, Tx,
    TxOptions, Value,
};
use crate::error::{Error, Result};
use crate::rows::TracedRows;
use crate::span::{sql_span, QuerySpan, Shared};
use crate::statement::TracedStmt;

/// Optional capabilities of the wrapped connection, probed once at wrap time.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Capabilities {
    pub prepare_context: bool,
    pub begin_tx: bool,
    pub execer: bool,
    pub execer_context: bool,
    pub queryer: bool,
    pub queryer_context: bool,
    pub pinger: bool,
    pub session_resetter: bool,
    pub named_value_checker: bool,
}

impl Capabilities {
    pub fn probe(conn: &mut dyn Conn) -> Self {
        Self {
            prepare_context: conn.as_prepare_context().is_some(),
            begin_tx: conn.as_begin_tx().is_some(),
            execer: conn.as_execer().is_some(),
            execer_context: conn.as_execer_context().is_some(),
            queryer: conn.as_queryer().is_some(),
            queryer_context: conn.as_queryer_context().is_some(),
            pinger: conn.as_pinger().is_some(),
            session_resetter: conn.as_session_resetter().is_some(),
            named_value_checker: conn.as_named_value_checker().is_some(),
        }
    }

    /// Direct, non-prepared execution in either form.
    pub fn direct_exec(&self) -> bool {
        self.execer || self.execer_context
    }

    /// Direct, non-prepared query in either form.
    pub fn direct_query(&self) -> bool {
        self.queryer || self.queryer_context
    }
}

/// A traced wrapper around a driver connection.
///
/// Statements and cursors created through it share its [`TracingConfig`] and
/// [`ConnectionAttributes`]. Preparing a statement is not traced; executing
/// it is. Direct `exec`/`query` are traced as `SQL.Conn.Exec` /
/// `SQL.Conn.Query` and are only offered when the wrapped connection supports
/// them. Transactions are forwarded untraced.
///
/// Calling a capability method the wrapped connection lacks (direct
/// exec/query, `begin_tx`, `ping`, `reset_session`) returns [`Error::Skip`]
/// without touching the backend.
pub struct TracedConn {
    inner: Box<dyn Conn>,
    shared: Arc<Shared>,
    caps: Capabilities,
}

impl std::fmt::Debug for TracedConn {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TracedConn")
            .field("attributes", &self.shared.attrs)
            .field("capabilities", &self.caps)
            .finish_non_exhaustive()
    }
}

impl TracedConn {
    pub(crate) fn new(
        mut inner: Box<dyn Conn>,
        config: Arc<TracingConfig>,
        attrs: Arc<ConnectionAttributes>,
    ) -> Self {
        let caps = Capabilities::probe(inner.as_mut());
        tracing::debug!(
            attributes = %attrs,
            capabilities = ?caps,
            "Wrapped database connection"
        );
        Self {
            inner,
            shared: Arc::new(Shared { config, attrs }),
            caps,
        }
    }

    /// Get the tracing configuration.
    pub fn config(&self) -> &TracingConfig {
        &self.shared.config
    }

    /// Attributes parsed from the connection descriptor.
    pub fn attributes(&self) -> &ConnectionAttributes {
        &self.shared.attrs
    }

    /// Capabilities of the wrapped connection.
    pub fn capabilities(&self) -> Capabilities {
        self.caps
    }

    /// Get a mutable reference to the wrapped connection.
    pub fn inner_mut(&mut self) -> &mut dyn Conn {
        self.inner.as_mut()
    }

    /// Consume the wrapper and return the wrapped connection.
    pub fn into_inner(self) -> Box<dyn Conn> {
        self.inner
    }

    /// Prepare a statement, returning the concrete traced type.
    ///
    /// Uses the context-aware prepare when available, else the blocking one.
    pub async fn prepare_traced(&mut self, ctx: &Context, query: &str) -> Result<TracedStmt> {
        let stmt = driver::prepare(self.inner.as_mut(), ctx, query).await?;
        Ok(TracedStmt::new(stmt, query, self.shared.clone()))
    }

    fn direct_span_exec(&self, ctx: &Context, query: &str, args: &[NamedValue]) -> QuerySpan {
        let span = QuerySpan::new(sql_span!("SQL.Conn.Exec", ctx, self.shared), self.shared.clone());
        span.annotate(query, args);
        span
    }

    fn direct_span_query(&self, ctx: &Context, query: &str, args: &[NamedValue]) -> QuerySpan {
        let span = QuerySpan::new(sql_span!("SQL.Conn.Query", ctx, self.shared), self.shared.clone());
        span.annotate(query, args);
        span
    }
}

impl Conn for TracedConn {
    fn prepare(&mut self, query: &str) -> Result<Box<dyn Stmt>> {
        let stmt = self.inner.prepare(query)?;
        Ok(Box::new(TracedStmt::new(stmt, query, self.shared.clone())))
    }

    fn close(&mut self) -> Result<()> {
        self.inner.close()
    }

    fn begin(&mut self) -> Result<Box<dyn Tx>> {
        self.inner.begin()
    }

    fn as_prepare_context(&mut self) -> Option<&mut dyn ConnPrepareContext> {
        Some(self)
    }

    fn as_begin_tx(&mut self) -> Option<&mut dyn ConnBeginTx> {
        if self.caps.begin_tx {
            Some(self)
        } else {
            None
        }
    }

    fn as_execer(&mut self) -> Option<&mut dyn Execer> {
        if self.caps.execer {
            Some(self)
        } else {
            None
        }
    }

    fn as_execer_context(&mut self) -> Option<&mut dyn ExecerContext> {
        if self.caps.direct_exec() {
            Some(self)
        } else {
            None
        }
    }

    fn as_queryer(&mut self) -> Option<&mut dyn Queryer> {
        if self.caps.queryer {
            Some(self)
        } else {
            None
        }
    }

    fn as_queryer_context(&mut self) -> Option<&mut dyn QueryerContext> {
        if self.caps.direct_query() {
            Some(self)
        } else {
            None
        }
    }

    fn as_pinger(&mut self) -> Option<&mut dyn Pinger> {
        if self.caps.pinger {
            Some(self)
        } else {
            None
        }
    }

    fn as_session_resetter(&mut self) -> Option<&mut dyn SessionResetter> {
        if self.caps.session_resetter {
            Some(self)
        } else {
            None
        }
    }

    fn as_named_value_checker(&mut self) -> Option<&mut dyn NamedValueChecker> {
        self.inner.as_named_value_checker()
    }
}

#[async_trait]
impl ConnPrepareContext for TracedConn {
    async fn prepare_context(&mut self, ctx: &Context, query: &str) -> Result<Box<dyn Stmt>> {
        Ok(Box::new(self.prepare_traced(ctx, query).await?))
    }
}

#[async_trait]
impl ConnBeginTx for TracedConn {
    async fn begin_tx(&mut self, ctx: &Context, opts: TxOptions) -> Result<Box<dyn Tx>> {
        match self.inner.as_begin_tx() {
            Some(bt) => bt.begin_tx(ctx, opts).await,
            None => Err(Error::Skip),
        }
    }
}

#[async_trait]
impl ExecerContext for TracedConn {
    async fn exec_context(
        &mut self,
        ctx: &Context,
        query: &str,
        args: &[NamedValue],
    ) -> Result<ExecResult> {
        if !self.caps.direct_exec() {
            return Err(Error::Skip);
        }
        let mut span = self.direct_span_exec(ctx, query, args);

        let child = ctx.scoped();
        let result = driver::conn_exec(self.inner.as_mut(), &child, query, args)
            .instrument(span.span())
            .await;

        match &result {
            Ok(res) => span.record_rows_affected(res.rows_affected),
            Err(e) => span.record_error(e),
        }
        result
    }
}

impl Execer for TracedConn {
    fn exec(&mut self, query: &str, args: &[Value]) -> Result<ExecResult> {
        let Some(execer) = self.inner.as_execer() else {
            return Err(Error::Skip);
        };
        let ctx = Context::current();
        let mut span = QuerySpan::new(sql_span!("SQL.Conn.Exec", ctx, self.shared), self.shared.clone());
        span.annotate(query, &NamedValue::positional(args.iter().cloned()));

        let result = span.span().in_scope(|| execer.exec(query, args));
        match &result {
            Ok(res) => span.record_rows_affected(res.rows_affected),
            Err(e) => span.record_error(e),
        }
        result
    }
}

#[async_trait]
impl QueryerContext for TracedConn {
    async fn query_context(
        &mut self,
        ctx: &Context,
        query: &str,
        args: &[NamedValue],
    ) -> Result<Box<dyn Rows>> {
        if !self.caps.direct_query() {
            return Err(Error::Skip);
        }
        let mut span = self.direct_span_query(ctx, query, args);

        let child = ctx.scoped();
        let result = driver::conn_query(self.inner.as_mut(), &child, query, args)
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

impl Queryer for TracedConn {
    fn query(&mut self, query: &str, args: &[Value]) -> Result<Box<dyn Rows>> {
        let Some(queryer) = self.inner.as_queryer() else {
            return Err(Error::Skip);
        };
        let ctx = Context::current();
        let mut span = QuerySpan::new(sql_span!("SQL.Conn.Query", ctx, self.shared), self.shared.clone());
        span.annotate(query, &NamedValue::positional(args.iter().cloned()));

        match span.span().in_scope(|| queryer.query(query, args)) {
            Ok(rows) => Ok(Box::new(TracedRows::new(rows, span))),
            Err(e) => {
                span.record_error(&e);
                Err(e)
            }
        }
    }
}

#[async_trait]
impl Pinger for TracedConn {
    async fn ping(&mut self, ctx: &Context) -> Result<()> {
        match self.inner.as_pinger() {
            Some(pinger) => pinger.ping(ctx).await,
            None => Err(Error::Skip),
        }
    }
}

#[async_trait]
impl SessionResetter for TracedConn {
    async fn reset_session(&mut self, ctx: &Context) -> Result<()> {
        match self.inner.as_session_resetter() {
            Some(resetter) => resetter.reset_session(ctx).await,
            None => Err(Error::Skip),
        }
    }
}
