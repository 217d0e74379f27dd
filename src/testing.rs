//! Mock driver and span capture used by the unit tests.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tracing::field::{Field, Visit};
use tracing::span::{Attributes, Id, Record};
use tracing::subscriber::DefaultGuard;
use tracing::{Event, Level, Subscriber};
use tracing_subscriber::layer::{Context as LayerContext, SubscriberExt};
use tracing_subscriber::registry::LookupSpan;
use tracing_subscriber::Layer;

use crate::context::Context;
use crate::driver::{
    Conn, ConnBeginTx, ConnPrepareContext, Connector, Driver, DriverContext, ExecResult, Execer,
    ExecerContext, NamedValue, NamedValueChecker, Pinger, Queryer, QueryerContext, Rows,
    RowsColumnTypeDatabaseTypeName, RowsNextResultSet, Stmt, StmtExecContext, StmtQueryContext,
    Tx, TxOptions, Value,
};
use crate::error::{DbError, Error, Result};

/// How direct (non-prepared) execution is offered by a mock connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direct {
    None,
    Blocking,
    Context,
}

/// Capabilities a mock driver advertises.
#[derive(Debug, Clone, Copy)]
pub struct MockCaps {
    pub context: bool,
    pub direct: Direct,
    pub connector: bool,
    pub begin_tx: bool,
    pub ping: bool,
}

impl MockCaps {
    /// Every optional capability.
    pub fn full() -> Self {
        Self {
            context: true,
            direct: Direct::Context,
            connector: true,
            begin_tx: true,
            ping: true,
        }
    }

    /// Only the mandatory, blocking surface.
    pub fn blocking() -> Self {
        Self {
            context: false,
            direct: Direct::None,
            connector: false,
            begin_tx: false,
            ping: false,
        }
    }

    pub fn with_direct(mut self, direct: Direct) -> Self {
        self.direct = direct;
        self
    }
}

/// Names of the mock methods that were invoked, in order.
#[derive(Debug, Clone, Default)]
pub struct CallLog(Arc<Mutex<Vec<String>>>);

impl CallLog {
    fn push(&self, call: &str) {
        self.0.lock().unwrap().push(call.to_string());
    }

    pub fn calls(&self) -> Vec<String> {
        self.0.lock().unwrap().clone()
    }

    pub fn contains(&self, call: &str) -> bool {
        self.0.lock().unwrap().iter().any(|c| c == call)
    }
}

/// The unique-violation error returned for queries mentioning `duplicate`.
pub fn unique_violation() -> DbError {
    DbError::new("23505", "duplicate key value violates unique constraint \"users_email_key\"")
        .with_detail("d")
        .with_hint("h")
        .with_table("users")
        .with_constraint("users_email_key")
}

#[derive(Debug, thiserror::Error)]
#[error("insert user: {source}")]
pub struct InsertUserError {
    #[source]
    source: DbError,
}

/// Canned behavior keyed on the query text.
fn outcome(query: &str) -> Result<()> {
    if query.contains("duplicate") {
        Err(Error::backend(InsertUserError {
            source: unique_violation(),
        }))
    } else if query.contains("broken") {
        Err(Error::backend("write: broken pipe"))
    } else if query.contains("exhausted") {
        Err(Error::EndOfRows)
    } else {
        Ok(())
    }
}

async fn context_outcome(ctx: &Context, query: &str) -> Result<()> {
    if query.contains("pg_sleep") {
        tokio::select! {
            _ = ctx.done() => return Err(ctx.err().unwrap_or(Error::Canceled)),
            _ = tokio::time::sleep(Duration::from_secs(10)) => {}
        }
    }
    outcome(query)
}

/// Two user rows. Queries mentioning `flaky` fail after the first row, those
/// mentioning `close_fails` fail on close. The context, when given, is kept
/// for the lifetime of the cursor.
fn user_rows(query: &str, ctx: Option<&Context>) -> Box<dyn Rows> {
    Box::new(MockRows {
        columns: vec!["id".to_string(), "name".to_string()],
        data: vec![
            vec![Value::Int(1), Value::from("alice")],
            vec![Value::Int(2), Value::from("bob")],
        ],
        pos: 0,
        fail_at: query.contains("flaky").then_some(1),
        fail_close: query.contains("close_fails"),
        ctx: ctx.cloned(),
        log: CallLog::default(),
    })
}

pub struct MockDriver {
    pub caps: MockCaps,
    pub log: CallLog,
}

impl MockDriver {
    pub fn new(caps: MockCaps) -> Self {
        Self {
            caps,
            log: CallLog::default(),
        }
    }

    fn conn(&self) -> MockConn {
        MockConn {
            caps: self.caps,
            log: self.log.clone(),
        }
    }
}

impl Driver for MockDriver {
    fn open(&self, descriptor: &str) -> Result<Box<dyn Conn>> {
        self.log.push("open");
        if descriptor.contains("host=unreachable") {
            return Err(Error::backend("dial tcp: connection refused"));
        }
        Ok(Box::new(self.conn()))
    }

    fn as_driver_context(&self) -> Option<&dyn DriverContext> {
        if self.caps.connector {
            Some(self)
        } else {
            None
        }
    }
}

impl DriverContext for MockDriver {
    fn open_connector(&self, descriptor: &str) -> Result<Box<dyn Connector>> {
        self.log.push("open_connector");
        Ok(Box::new(MockConnector {
            caps: self.caps,
            log: self.log.clone(),
            refuse: descriptor.contains("host=unreachable"),
        }))
    }
}

struct MockConnector {
    caps: MockCaps,
    log: CallLog,
    refuse: bool,
}

#[async_trait]
impl Connector for MockConnector {
    async fn connect(&self, _ctx: &Context) -> Result<Box<dyn Conn>> {
        self.log.push("connect");
        if self.refuse {
            return Err(Error::backend("dial tcp: connection refused"));
        }
        Ok(Box::new(MockConn {
            caps: self.caps,
            log: self.log.clone(),
        }))
    }
}

pub struct MockConn {
    caps: MockCaps,
    log: CallLog,
}

impl MockConn {
    fn stmt(&self, query: &str) -> MockStmt {
        MockStmt {
            query: query.to_string(),
            caps: self.caps,
            log: self.log.clone(),
            kept: None,
        }
    }
}

impl Conn for MockConn {
    fn prepare(&mut self, query: &str) -> Result<Box<dyn Stmt>> {
        self.log.push("prepare");
        Ok(Box::new(self.stmt(query)))
    }

    fn close(&mut self) -> Result<()> {
        self.log.push("conn.close");
        Ok(())
    }

    fn begin(&mut self) -> Result<Box<dyn Tx>> {
        self.log.push("begin");
        Ok(Box::new(MockTx))
    }

    fn as_prepare_context(&mut self) -> Option<&mut dyn ConnPrepareContext> {
        if self.caps.context {
            Some(self)
        } else {
            None
        }
    }

    fn as_begin_tx(&mut self) -> Option<&mut dyn ConnBeginTx> {
        if self.caps.begin_tx {
            Some(self)
        } else {
            None
        }
    }

    fn as_execer(&mut self) -> Option<&mut dyn Execer> {
        if self.caps.direct == Direct::Blocking {
            Some(self)
        } else {
            None
        }
    }

    fn as_execer_context(&mut self) -> Option<&mut dyn ExecerContext> {
        if self.caps.direct == Direct::Context {
            Some(self)
        } else {
            None
        }
    }

    fn as_queryer(&mut self) -> Option<&mut dyn Queryer> {
        if self.caps.direct == Direct::Blocking {
            Some(self)
        } else {
            None
        }
    }

    fn as_queryer_context(&mut self) -> Option<&mut dyn QueryerContext> {
        if self.caps.direct == Direct::Context {
            Some(self)
        } else {
            None
        }
    }

    fn as_pinger(&mut self) -> Option<&mut dyn Pinger> {
        if self.caps.ping {
            Some(self)
        } else {
            None
        }
    }

    fn as_named_value_checker(&mut self) -> Option<&mut dyn NamedValueChecker> {
        if self.caps.context {
            Some(self)
        } else {
            None
        }
    }
}

#[async_trait]
impl ConnPrepareContext for MockConn {
    async fn prepare_context(&mut self, _ctx: &Context, query: &str) -> Result<Box<dyn Stmt>> {
        self.log.push("prepare_context");
        Ok(Box::new(self.stmt(query)))
    }
}

#[async_trait]
impl ConnBeginTx for MockConn {
    async fn begin_tx(&mut self, _ctx: &Context, _opts: TxOptions) -> Result<Box<dyn Tx>> {
        self.log.push("begin_tx");
        Ok(Box::new(MockTx))
    }
}

impl Execer for MockConn {
    fn exec(&mut self, query: &str, _args: &[Value]) -> Result<ExecResult> {
        self.log.push("conn.exec");
        outcome(query).map(|_| ExecResult {
            rows_affected: 1,
            last_insert_id: None,
        })
    }
}

#[async_trait]
impl ExecerContext for MockConn {
    async fn exec_context(
        &mut self,
        ctx: &Context,
        query: &str,
        _args: &[NamedValue],
    ) -> Result<ExecResult> {
        self.log.push("conn.exec_context");
        context_outcome(ctx, query).await.map(|_| ExecResult {
            rows_affected: 1,
            last_insert_id: None,
        })
    }
}

impl Queryer for MockConn {
    fn query(&mut self, query: &str, _args: &[Value]) -> Result<Box<dyn Rows>> {
        self.log.push("conn.query");
        outcome(query).map(|_| user_rows(query, None))
    }
}

#[async_trait]
impl QueryerContext for MockConn {
    async fn query_context(
        &mut self,
        ctx: &Context,
        query: &str,
        _args: &[NamedValue],
    ) -> Result<Box<dyn Rows>> {
        self.log.push("conn.query_context");
        context_outcome(ctx, query).await.map(|_| user_rows(query, Some(ctx)))
    }
}

#[async_trait]
impl Pinger for MockConn {
    async fn ping(&mut self, _ctx: &Context) -> Result<()> {
        self.log.push("ping");
        Ok(())
    }
}

impl NamedValueChecker for MockConn {
    fn check_named_value(&mut self, value: &mut NamedValue) -> Result<()> {
        self.log.push("check_named_value");
        if let Value::Bool(b) = value.value {
            value.value = Value::Int(i64::from(b));
        }
        Ok(())
    }
}

struct MockTx;

impl Tx for MockTx {
    fn commit(&mut self) -> Result<()> {
        Ok(())
    }

    fn rollback(&mut self) -> Result<()> {
        Ok(())
    }
}

/// Keeps the last context it was called with, as drivers watching for
/// cancellation do.
pub struct MockStmt {
    query: String,
    caps: MockCaps,
    log: CallLog,
    kept: Option<Context>,
}

impl Stmt for MockStmt {
    fn close(&mut self) -> Result<()> {
        self.log.push("stmt.close");
        Ok(())
    }

    fn num_input(&self) -> Option<usize> {
        Some(self.query.matches('$').count())
    }

    fn exec(&mut self, _args: &[Value]) -> Result<ExecResult> {
        self.log.push("stmt.exec");
        outcome(&self.query).map(|_| ExecResult {
            rows_affected: 3,
            last_insert_id: Some(7),
        })
    }

    fn query(&mut self, _args: &[Value]) -> Result<Box<dyn Rows>> {
        self.log.push("stmt.query");
        outcome(&self.query).map(|_| user_rows(&self.query, None))
    }

    fn as_exec_context(&mut self) -> Option<&mut dyn StmtExecContext> {
        if self.caps.context {
            Some(self)
        } else {
            None
        }
    }

    fn as_query_context(&mut self) -> Option<&mut dyn StmtQueryContext> {
        if self.caps.context {
            Some(self)
        } else {
            None
        }
    }
}

#[async_trait]
impl StmtExecContext for MockStmt {
    async fn exec_context(&mut self, ctx: &Context, _args: &[NamedValue]) -> Result<ExecResult> {
        self.log.push("stmt.exec_context");
        self.kept = Some(ctx.clone());
        context_outcome(ctx, &self.query).await.map(|_| ExecResult {
            rows_affected: 3,
            last_insert_id: Some(7),
        })
    }
}

#[async_trait]
impl StmtQueryContext for MockStmt {
    async fn query_context(&mut self, ctx: &Context, _args: &[NamedValue]) -> Result<Box<dyn Rows>> {
        self.log.push("stmt.query_context");
        self.kept = Some(ctx.clone());
        context_outcome(ctx, &self.query)
            .await
            .map(|_| user_rows(&self.query, Some(ctx)))
    }
}

pub struct MockRows {
    columns: Vec<String>,
    data: Vec<Vec<Value>>,
    pos: usize,
    fail_at: Option<usize>,
    fail_close: bool,
    ctx: Option<Context>,
    log: CallLog,
}

impl Rows for MockRows {
    fn columns(&self) -> Vec<String> {
        self.columns.clone()
    }

    fn next(&mut self, dest: &mut [Value]) -> Result<()> {
        if self.fail_at == Some(self.pos) {
            return Err(Error::backend("read: connection reset by peer"));
        }
        if let Some(err) = self.ctx.as_ref().and_then(Context::err) {
            return Err(err);
        }
        let Some(row) = self.data.get(self.pos) else {
            return Err(Error::EndOfRows);
        };
        for (slot, value) in dest.iter_mut().zip(row) {
            *slot = value.clone();
        }
        self.pos += 1;
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        self.log.push("rows.close");
        if self.fail_close {
            return Err(Error::backend("close: bad connection"));
        }
        Ok(())
    }

    fn as_next_result_set(&mut self) -> Option<&mut dyn RowsNextResultSet> {
        Some(self)
    }

    fn as_column_type_database_type_name(&self) -> Option<&dyn RowsColumnTypeDatabaseTypeName> {
        Some(self)
    }
}

impl RowsNextResultSet for MockRows {
    fn has_next_result_set(&self) -> bool {
        false
    }

    fn next_result_set(&mut self) -> Result<()> {
        Err(Error::EndOfRows)
    }
}

impl RowsColumnTypeDatabaseTypeName for MockRows {
    fn column_type_database_type_name(&self, index: usize) -> String {
        match index {
            0 => "INT8".to_string(),
            _ => "TEXT".to_string(),
        }
    }
}

/// A span as seen by the [`Capture`] layer.
#[derive(Debug, Clone)]
pub struct CapturedSpan {
    pub name: &'static str,
    pub parent: Option<String>,
    pub fields: BTreeMap<String, String>,
    pub closed: usize,
}

impl CapturedSpan {
    pub fn field(&self, name: &str) -> Option<&str> {
        self.fields.get(name).map(String::as_str)
    }
}

/// An event as seen by the [`Capture`] layer.
#[derive(Debug, Clone)]
pub struct CapturedEvent {
    pub level: Level,
    pub span: Option<String>,
    pub fields: BTreeMap<String, String>,
}

impl CapturedEvent {
    pub fn message(&self) -> Option<&str> {
        self.fields.get("message").map(String::as_str)
    }
}

/// Layer recording every span, its fields and how often it closed, plus
/// every event.
#[derive(Debug, Clone, Default)]
pub struct Capture {
    spans: Arc<Mutex<Vec<CapturedSpan>>>,
    events: Arc<Mutex<Vec<CapturedEvent>>>,
}

struct SpanIndex(usize);

impl Capture {
    /// Install a capturing subscriber for the current thread.
    pub fn install() -> (Self, DefaultGuard) {
        let capture = Self::default();
        let subscriber = tracing_subscriber::registry().with(capture.clone());
        let guard = tracing::subscriber::set_default(subscriber);
        (capture, guard)
    }

    pub fn spans(&self) -> Vec<CapturedSpan> {
        self.spans.lock().unwrap().clone()
    }

    pub fn named(&self, name: &str) -> Vec<CapturedSpan> {
        self.spans().into_iter().filter(|s| s.name == name).collect()
    }

    pub fn events(&self) -> Vec<CapturedEvent> {
        self.events.lock().unwrap().clone()
    }

    /// The single span called `name`.
    pub fn one(&self, name: &str) -> CapturedSpan {
        let mut spans = self.named(name);
        assert_eq!(spans.len(), 1, "expected exactly one {name} span");
        spans.remove(0)
    }
}

struct FieldVisitor<'a>(&'a mut BTreeMap<String, String>);

impl Visit for FieldVisitor<'_> {
    fn record_str(&mut self, field: &Field, value: &str) {
        self.0.insert(field.name().to_string(), value.to_string());
    }

    fn record_debug(&mut self, field: &Field, value: &dyn fmt::Debug) {
        self.0.insert(field.name().to_string(), format!("{value:?}"));
    }
}

impl<S> Layer<S> for Capture
where
    S: Subscriber + for<'a> LookupSpan<'a>,
{
    fn on_new_span(&self, attrs: &Attributes<'_>, id: &Id, ctx: LayerContext<'_, S>) {
        let mut fields = BTreeMap::new();
        attrs.record(&mut FieldVisitor(&mut fields));
        let Some(span) = ctx.span(id) else { return };
        let parent = span.parent().map(|p| p.name().to_string());

        let mut spans = self.spans.lock().unwrap();
        spans.push(CapturedSpan {
            name: attrs.metadata().name(),
            parent,
            fields,
            closed: 0,
        });
        span.extensions_mut().insert(SpanIndex(spans.len() - 1));
    }

    fn on_record(&self, id: &Id, values: &Record<'_>, ctx: LayerContext<'_, S>) {
        let Some(span) = ctx.span(id) else { return };
        let Some(index) = span.extensions().get::<SpanIndex>().map(|i| i.0) else {
            return;
        };
        let mut spans = self.spans.lock().unwrap();
        values.record(&mut FieldVisitor(&mut spans[index].fields));
    }

    fn on_event(&self, event: &Event<'_>, ctx: LayerContext<'_, S>) {
        let mut fields = BTreeMap::new();
        event.record(&mut FieldVisitor(&mut fields));
        let span = ctx.event_span(event).map(|s| s.name().to_string());
        self.events.lock().unwrap().push(CapturedEvent {
            level: *event.metadata().level(),
            span,
            fields,
        });
    }

    fn on_close(&self, id: Id, ctx: LayerContext<'_, S>) {
        let Some(span) = ctx.span(&id) else { return };
        let Some(index) = span.extensions().get::<SpanIndex>().map(|i| i.0) else {
            return;
        };
        self.spans.lock().unwrap()[index].closed += 1;
    }
}
