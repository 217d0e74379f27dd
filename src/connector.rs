//! Traced connectors.

use std::sync::Arc;

use async_trait::async_trait;

use crate::attributes::ConnectionAttributes;
use crate::config::TracingConfig;
use crate::connection::TracedConn;
use crate::context::Context;
use crate::driver::{Conn, Connector, Driver};
use crate::error::Result;

enum Source {
    /// The wrapped driver's own connector.
    Native(Box<dyn Connector>),
    /// Opens connections through `Driver::open` with a fixed descriptor.
    Open {
        driver: Arc<dyn Driver>,
        descriptor: String,
    },
}

/// A connector handing out [`TracedConn`]s.
///
/// The descriptor is parsed once when the connector is created; every
/// connection it establishes shares the resulting attributes.
pub struct TracedConnector {
    source: Source,
    config: Arc<TracingConfig>,
    attrs: Arc<ConnectionAttributes>,
}

impl std::fmt::Debug for TracedConnector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let source = match self.source {
            Source::Native(_) => "native",
            Source::Open { .. } => "open",
        };
        f.debug_struct("TracedConnector")
            .field("source", &source)
            .field("attributes", &self.attrs)
            .finish_non_exhaustive()
    }
}

impl TracedConnector {
    pub(crate) fn native(
        connector: Box<dyn Connector>,
        config: Arc<TracingConfig>,
        attrs: Arc<ConnectionAttributes>,
    ) -> Self {
        Self {
            source: Source::Native(connector),
            config,
            attrs,
        }
    }

    pub(crate) fn open(
        driver: Arc<dyn Driver>,
        descriptor: &str,
        config: Arc<TracingConfig>,
        attrs: Arc<ConnectionAttributes>,
    ) -> Self {
        Self {
            source: Source::Open {
                driver,
                descriptor: descriptor.to_string(),
            },
            config,
            attrs,
        }
    }

    /// Whether connections come from the wrapped driver's own connector.
    pub fn is_native(&self) -> bool {
        matches!(self.source, Source::Native(_))
    }

    pub fn attributes(&self) -> &ConnectionAttributes {
        &self.attrs
    }

    /// Establish a connection, returning the concrete traced type.
    ///
    /// Errors from the wrapped driver are returned as they are.
    pub async fn connect_traced(&self, ctx: &Context) -> Result<TracedConn> {
        let conn = match &self.source {
            Source::Native(connector) => connector.connect(ctx).await?,
            Source::Open { driver, descriptor } => driver.open(descriptor)?,
        };
        Ok(TracedConn::new(conn, self.config.clone(), self.attrs.clone()))
    }
}

#[async_trait]
impl Connector for TracedConnector {
    async fn connect(&self, ctx: &Context) -> Result<Box<dyn Conn>> {
        Ok(Box::new(self.connect_traced(ctx).await?))
    }
}
