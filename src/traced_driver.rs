//! Traced driver, the entry point of the crate.

use std::sync::Arc;

use crate::attributes::ConnectionAttributes;
use crate::config::TracingConfig;
use crate::connection::TracedConn;
use crate::connector::TracedConnector;
use crate::driver::{Conn, Connector, Driver, DriverContext};
use crate::error::Result;

/// A driver whose connections emit a span for every statement execution.
///
/// Opening connections is not traced. The descriptor is parsed before the
/// wrapped driver is contacted; a malformed descriptor fails with
/// [`crate::Error::MalformedDescriptor`].
///
/// `TracedDriver` is itself a [`Driver`] and always offers connectors, so it
/// can be handed to anything that expects a driver.
#[derive(Clone)]
pub struct TracedDriver {
    inner: Arc<dyn Driver>,
    config: Arc<TracingConfig>,
}

impl std::fmt::Debug for TracedDriver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TracedDriver")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl TracedDriver {
    /// Wrap a driver with custom tracing configuration.
    pub fn new(inner: Arc<dyn Driver>, config: TracingConfig) -> Self {
        tracing::debug!(
            db.system = config.db_system,
            include_query = config.include_query,
            include_args = config.include_args,
            "Creating traced database driver"
        );
        Self {
            inner,
            config: Arc::new(config),
        }
    }

    /// Wrap a driver with default tracing configuration.
    pub fn wrap(inner: Arc<dyn Driver>) -> Self {
        Self::new(inner, TracingConfig::default())
    }

    /// Get the tracing configuration.
    pub fn config(&self) -> &TracingConfig {
        &self.config
    }

    /// Get the wrapped driver.
    pub fn inner(&self) -> &Arc<dyn Driver> {
        &self.inner
    }

    /// Open a connection, returning the concrete traced type.
    pub fn open_traced(&self, descriptor: &str) -> Result<TracedConn> {
        let attrs = Arc::new(ConnectionAttributes::parse(descriptor)?);
        let conn = self.inner.open(descriptor)?;
        Ok(TracedConn::new(conn, self.config.clone(), attrs))
    }

    /// Create a connector for `descriptor`, returning the concrete traced type.
    ///
    /// Uses the wrapped driver's connector when it has one. Otherwise the
    /// connector opens connections through [`Driver::open`] on demand.
    pub fn open_connector_traced(&self, descriptor: &str) -> Result<TracedConnector> {
        let attrs = Arc::new(ConnectionAttributes::parse(descriptor)?);
        match self.inner.as_driver_context() {
            Some(dc) => {
                let connector = dc.open_connector(descriptor)?;
                Ok(TracedConnector::native(connector, self.config.clone(), attrs))
            }
            None => Ok(TracedConnector::open(
                self.inner.clone(),
                descriptor,
                self.config.clone(),
                attrs,
            )),
        }
    }
}

impl Driver for TracedDriver {
    fn open(&self, descriptor: &str) -> Result<Box<dyn Conn>> {
        Ok(Box::new(self.open_traced(descriptor)?))
    }

    fn as_driver_context(&self) -> Option<&dyn DriverContext> {
        Some(self)
    }
}

impl DriverContext for TracedDriver {
    fn open_connector(&self, descriptor: &str) -> Result<Box<dyn Connector>> {
        Ok(Box::new(self.open_connector_traced(descriptor)?))
    }
}

/// Extension trait for adding tracing to any driver.
pub trait TracingExt {
    /// Wrap this driver with tracing instrumentation.
    fn with_tracing(self) -> TracedDriver;

    /// Wrap this driver with custom tracing configuration.
    fn with_tracing_config(self, config: TracingConfig) -> TracedDriver;
}

impl TracingExt for Arc<dyn Driver> {
    fn with_tracing(self) -> TracedDriver {
        TracedDriver::wrap(self)
    }

    fn with_tracing_config(self, config: TracingConfig) -> TracedDriver {
        TracedDriver::new(self, config)
    }
}
