//! The pluggable driver contract consumed (and re-exposed) by the tracing proxy.
//!
//! Mandatory behavior lives on [`Driver`], [`Conn`], [`Stmt`], [`Rows`] and
//! [`Tx`]. Optional capabilities are separate traits discovered through the
//! `as_*` accessors, which return `None` unless the implementation overrides
//! them. The free functions at the bottom of this module dispatch to a
//! context-aware capability when present and fall back to the blocking
//! equivalent otherwise.

use std::fmt;

use async_trait::async_trait;
use chrono::NaiveDateTime;

use crate::context::Context;
use crate::error::{Error, Result};

/// A value bound as a parameter or read from a row.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
    Bytes(Vec<u8>),
    Timestamp(NaiveDateTime),
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => f.write_str("NULL"),
            Value::Bool(v) => write!(f, "{v}"),
            Value::Int(v) => write!(f, "{v}"),
            Value::Float(v) => write!(f, "{v}"),
            Value::Text(v) => write!(f, "{v:?}"),
            Value::Bytes(v) => {
                f.write_str("\\x")?;
                v.iter().try_for_each(|b| write!(f, "{b:02x}"))
            }
            Value::Timestamp(v) => write!(f, "{v}"),
        }
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Int(v)
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Float(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Text(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::Text(v)
    }
}

impl From<Vec<u8>> for Value {
    fn from(v: Vec<u8>) -> Self {
        Value::Bytes(v)
    }
}

impl From<NaiveDateTime> for Value {
    fn from(v: NaiveDateTime) -> Self {
        Value::Timestamp(v)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map_or(Value::Null, Into::into)
    }
}

/// A bound parameter with its 1-based position and optional name.
#[derive(Debug, Clone, PartialEq)]
pub struct NamedValue {
    pub name: Option<String>,
    pub ordinal: usize,
    pub value: Value,
}

impl NamedValue {
    /// Positional parameters numbered from 1.
    pub fn positional<I, V>(values: I) -> Vec<NamedValue>
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        values
            .into_iter()
            .enumerate()
            .map(|(i, value)| NamedValue {
                name: None,
                ordinal: i + 1,
                value: value.into(),
            })
            .collect()
    }

    pub fn named(name: impl Into<String>, ordinal: usize, value: impl Into<Value>) -> Self {
        NamedValue {
            name: Some(name.into()),
            ordinal,
            value: value.into(),
        }
    }
}

impl fmt::Display for NamedValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.name {
            Some(name) => write!(f, "{name}={}", self.value),
            None => write!(f, "{}", self.value),
        }
    }
}

/// Strip names and positions, keeping only the values.
pub fn values(args: &[NamedValue]) -> Vec<Value> {
    args.iter().map(|arg| arg.value.clone()).collect()
}

/// Render an argument list as `[a, b, c]`.
pub fn render_args(args: &[NamedValue]) -> String {
    let rendered: Vec<String> = args.iter().map(ToString::to_string).collect();
    format!("[{}]", rendered.join(", "))
}

/// Outcome of an exec call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ExecResult {
    pub rows_affected: u64,
    pub last_insert_id: Option<i64>,
}

/// Transaction isolation levels understood by [`ConnBeginTx`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum IsolationLevel {
    #[default]
    Default,
    ReadUncommitted,
    ReadCommitted,
    RepeatableRead,
    Serializable,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TxOptions {
    pub isolation: IsolationLevel,
    pub read_only: bool,
}

/// Entry point of a database driver.
pub trait Driver: Send + Sync {
    /// Open a connection, blocking until it is established.
    fn open(&self, descriptor: &str) -> Result<Box<dyn Conn>>;

    fn as_driver_context(&self) -> Option<&dyn DriverContext> {
        None
    }
}

/// Drivers able to hand out reusable connectors.
pub trait DriverContext: Send + Sync {
    fn open_connector(&self, descriptor: &str) -> Result<Box<dyn Connector>>;
}

/// A fixed connection configuration that can open many connections.
#[async_trait]
pub trait Connector: Send + Sync {
    async fn connect(&self, ctx: &Context) -> Result<Box<dyn Conn>>;
}

/// One physical connection, used by a single caller at a time.
pub trait Conn: Send {
    fn prepare(&mut self, query: &str) -> Result<Box<dyn Stmt>>;
    fn close(&mut self) -> Result<()>;
    fn begin(&mut self) -> Result<Box<dyn Tx>>;

    fn as_prepare_context(&mut self) -> Option<&mut dyn ConnPrepareContext> {
        None
    }
    fn as_begin_tx(&mut self) -> Option<&mut dyn ConnBeginTx> {
        None
    }
    fn as_execer(&mut self) -> Option<&mut dyn Execer> {
        None
    }
    fn as_execer_context(&mut self) -> Option<&mut dyn ExecerContext> {
        None
    }
    fn as_queryer(&mut self) -> Option<&mut dyn Queryer> {
        None
    }
    fn as_queryer_context(&mut self) -> Option<&mut dyn QueryerContext> {
        None
    }
    fn as_pinger(&mut self) -> Option<&mut dyn Pinger> {
        None
    }
    fn as_session_resetter(&mut self) -> Option<&mut dyn SessionResetter> {
        None
    }
    fn as_named_value_checker(&mut self) -> Option<&mut dyn NamedValueChecker> {
        None
    }
}

#[async_trait]
pub trait ConnPrepareContext: Send {
    async fn prepare_context(&mut self, ctx: &Context, query: &str) -> Result<Box<dyn Stmt>>;
}

#[async_trait]
pub trait ConnBeginTx: Send {
    async fn begin_tx(&mut self, ctx: &Context, opts: TxOptions) -> Result<Box<dyn Tx>>;
}

/// Direct, non-prepared execution. May return [`Error::Skip`].
pub trait Execer: Send {
    fn exec(&mut self, query: &str, args: &[Value]) -> Result<ExecResult>;
}

#[async_trait]
pub trait ExecerContext: Send {
    async fn exec_context(
        &mut self,
        ctx: &Context,
        query: &str,
        args: &[NamedValue],
    ) -> Result<ExecResult>;
}

/// Direct, non-prepared query. May return [`Error::Skip`].
pub trait Queryer: Send {
    fn query(&mut self, query: &str, args: &[Value]) -> Result<Box<dyn Rows>>;
}

#[async_trait]
pub trait QueryerContext: Send {
    async fn query_context(
        &mut self,
        ctx: &Context,
        query: &str,
        args: &[NamedValue],
    ) -> Result<Box<dyn Rows>>;
}

#[async_trait]
pub trait Pinger: Send {
    async fn ping(&mut self, ctx: &Context) -> Result<()>;
}

#[async_trait]
pub trait SessionResetter: Send {
    async fn reset_session(&mut self, ctx: &Context) -> Result<()>;
}

/// Validates or converts bound parameters before they reach the statement.
/// Returning [`Error::Skip`] defers to the default conversion.
pub trait NamedValueChecker: Send {
    fn check_named_value(&mut self, value: &mut NamedValue) -> Result<()>;
}

/// A prepared statement.
pub trait Stmt: Send {
    fn close(&mut self) -> Result<()>;

    /// Number of placeholders, or `None` if the driver cannot tell.
    fn num_input(&self) -> Option<usize>;

    fn exec(&mut self, args: &[Value]) -> Result<ExecResult>;
    fn query(&mut self, args: &[Value]) -> Result<Box<dyn Rows>>;

    fn as_exec_context(&mut self) -> Option<&mut dyn StmtExecContext> {
        None
    }
    fn as_query_context(&mut self) -> Option<&mut dyn StmtQueryContext> {
        None
    }
    fn as_named_value_checker(&mut self) -> Option<&mut dyn NamedValueChecker> {
        None
    }
}

#[async_trait]
pub trait StmtExecContext: Send {
    async fn exec_context(&mut self, ctx: &Context, args: &[NamedValue]) -> Result<ExecResult>;
}

#[async_trait]
pub trait StmtQueryContext: Send {
    async fn query_context(&mut self, ctx: &Context, args: &[NamedValue]) -> Result<Box<dyn Rows>>;
}

/// A result cursor. `next` returns [`Error::EndOfRows`] once exhausted.
pub trait Rows: Send {
    fn columns(&self) -> Vec<String>;
    fn next(&mut self, dest: &mut [Value]) -> Result<()>;
    fn close(&mut self) -> Result<()>;

    fn as_next_result_set(&mut self) -> Option<&mut dyn RowsNextResultSet> {
        None
    }
    fn as_column_type_database_type_name(&self) -> Option<&dyn RowsColumnTypeDatabaseTypeName> {
        None
    }
}

pub trait RowsNextResultSet: Send {
    fn has_next_result_set(&self) -> bool;
    /// Advance to the next result set, or [`Error::EndOfRows`] if there is none.
    fn next_result_set(&mut self) -> Result<()>;
}

pub trait RowsColumnTypeDatabaseTypeName {
    fn column_type_database_type_name(&self, index: usize) -> String;
}

pub trait Tx: Send {
    fn commit(&mut self) -> Result<()>;
    fn rollback(&mut self) -> Result<()>;
}

macro_rules! opaque_debug {
    ($($name:ident),*) => {
        $(
            impl fmt::Debug for dyn $name {
                fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                    f.write_str(concat!("dyn ", stringify!($name)))
                }
            }
        )*
    };
}

opaque_debug!(Connector, Conn, Stmt, Rows, Tx);

/// Prepare through the context-aware capability, else the blocking method.
pub async fn prepare(conn: &mut dyn Conn, ctx: &Context, query: &str) -> Result<Box<dyn Stmt>> {
    match conn.as_prepare_context() {
        Some(pc) => pc.prepare_context(ctx, query).await,
        None => conn.prepare(query),
    }
}


pub async fn stmt_exec(
    stmt: &mut dyn Stmt,
    ctx: &Context,
    args: &[NamedValue],
) -> Result<ExecResult> {
    match stmt.as_exec_context() {
        Some(sec) => sec.exec_context(ctx, args).await,
        None => stmt.exec(&values(args)),
    }
}

pub async fn stmt_query(
    stmt: &mut dyn Stmt,
    ctx: &Context,
    args: &[NamedValue],
) -> Result<Box<dyn Rows>> {
    match stmt.as_query_context() {
        Some(sqc) => sqc.query_context(ctx, args).await,
        None => stmt.query(&values(args)),
    }
}

/// Direct exec on a connection; [`Error::Skip`] when it has no such capability.
pub async fn conn_exec(
    conn: &mut dyn Conn,
    ctx: &Context,
    query: &str,
    args: &[NamedValue],
) -> Result<ExecResult> {
    if let Some(ec) = conn.as_execer_context() {
        return ec.exec_context(ctx, query, args).await;
    }
    match conn.as_execer() {
        Some(e) => e.exec(query, &values(args)),
        None => Err(Error::Skip),
    }
}

/// Direct query on a connection; [`Error::Skip`] when it has no such capability.
pub async fn conn_query(
    conn: &mut dyn Conn,
    ctx: &Context,
    query: &str,
    args: &[NamedValue],
) -> Result<Box<dyn Rows>> {
    if let Some(qc) = conn.as_queryer_context() {
        return qc.query_context(ctx, query, args).await;
    }
    match conn.as_queryer() {
        Some(q) => q.query(query, &values(args)),
        None => Err(Error::Skip),
    }
}
