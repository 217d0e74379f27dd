//! Basic example showing how to use sqltrace.
//!
//! Run with: cargo run --example basic

use std::sync::Arc;

use sqltrace::driver::{ExecResult, Tx};
use sqltrace::prelude::*;
use sqltrace::{Error, Result};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// A driver serving one fixed table from memory.
struct MemoryDriver;

struct MemoryConn;

struct MemoryStmt {
    query: String,
}

struct MemoryRows {
    rows: std::vec::IntoIter<Vec<Value>>,
}

struct NoopTx;

impl Driver for MemoryDriver {
    fn open(&self, _descriptor: &str) -> Result<Box<dyn Conn>> {
        Ok(Box::new(MemoryConn))
    }
}

impl Conn for MemoryConn {
    fn prepare(&mut self, query: &str) -> Result<Box<dyn Stmt>> {
        Ok(Box::new(MemoryStmt {
            query: query.to_string(),
        }))
    }

    fn close(&mut self) -> Result<()> {
        Ok(())
    }

    fn begin(&mut self) -> Result<Box<dyn Tx>> {
        Ok(Box::new(NoopTx))
    }
}

impl Stmt for MemoryStmt {
    fn close(&mut self) -> Result<()> {
        Ok(())
    }

    fn num_input(&self) -> Option<usize> {
        None
    }

    fn exec(&mut self, _args: &[Value]) -> Result<ExecResult> {
        if self.query.contains("missing_table") {
            return Err(Error::backend("relation \"missing_table\" does not exist"));
        }
        Ok(ExecResult {
            rows_affected: 1,
            last_insert_id: None,
        })
    }

    fn query(&mut self, _args: &[Value]) -> Result<Box<dyn Rows>> {
        let rows = vec![
            vec![Value::Int(1), Value::from("alice")],
            vec![Value::Int(2), Value::from("bob")],
        ];
        Ok(Box::new(MemoryRows {
            rows: rows.into_iter(),
        }))
    }
}

impl Rows for MemoryRows {
    fn columns(&self) -> Vec<String> {
        vec!["id".to_string(), "name".to_string()]
    }

    fn next(&mut self, dest: &mut [Value]) -> Result<()> {
        let row = self.rows.next().ok_or(Error::EndOfRows)?;
        for (slot, value) in dest.iter_mut().zip(row) {
            *slot = value;
        }
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        Ok(())
    }
}

impl Tx for NoopTx {
    fn commit(&mut self) -> Result<()> {
        Ok(())
    }

    fn rollback(&mut self) -> Result<()> {
        Ok(())
    }
}

#[tokio::main]
async fn main() -> std::result::Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing subscriber
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info,sqltrace=debug".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let driver: Arc<dyn Driver> = Arc::new(MemoryDriver);

    // Option 1: Simple wrapping with defaults
    // let traced = driver.with_tracing();

    // Option 2: Development config (records SQL and arguments)
    let traced = driver.with_tracing_config(TracingConfig::development());

    let request = tracing::info_span!("handle_request", user.id = 42);
    let ctx = Context::background().with_parent(request);

    let mut conn = traced.open_traced("host=localhost port=5432 dbname=app user=demo")?;

    let mut stmt = conn
        .prepare_traced(&ctx, "SELECT id, name FROM users WHERE active = $1")
        .await?;
    let mut rows = stmt
        .query_context(&ctx, &NamedValue::positional([true]))
        .await?;

    let mut dest = vec![Value::Null; rows.columns().len()];
    loop {
        match rows.next(&mut dest) {
            Ok(()) => tracing::info!(id = %dest[0], name = %dest[1], "Fetched user"),
            Err(e) if e.is_end_of_rows() => break,
            Err(e) => return Err(e.into()),
        }
    }
    rows.close()?;

    let mut failing = conn
        .prepare_traced(&ctx, "DELETE FROM missing_table")
        .await?;
    if let Err(e) = failing.exec_context(&ctx, &[]).await {
        tracing::info!(error = %e, "Recorded failure on the span");
    }

    Ok(())
}
