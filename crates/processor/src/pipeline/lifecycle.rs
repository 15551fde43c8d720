//! Query lifecycle hooks

use super::context::QueryId;
use crate::error::Result;
use slicestream_types::OriginId;
use std::fmt::Debug;
use tracing::{error, info};

/// Callbacks around the life of a query
///
/// `on_setup` runs before any worker starts; an error aborts the start.
/// `on_failure` runs on the merge thread when a worker hits a fatal error.
/// `on_close` runs once after every thread has exited.
pub trait QueryLifecycle: Send + Sync + Debug {
    fn on_setup(&self, _query: QueryId) -> Result<()> {
        Ok(())
    }

    fn on_close(&self, _query: QueryId) {}

    fn on_failure(&self, _query: QueryId, _origin: Option<OriginId>, _reason: &str) {}
}

/// Lifecycle that only logs
#[derive(Debug, Clone, Copy, Default)]
pub struct LoggingLifecycle;

impl QueryLifecycle for LoggingLifecycle {
    fn on_setup(&self, query: QueryId) -> Result<()> {
        info!(query = %query, "query starting");
        Ok(())
    }

    fn on_close(&self, query: QueryId) {
        info!(query = %query, "query closed");
    }

    fn on_failure(&self, query: QueryId, origin: Option<OriginId>, reason: &str) {
        match origin {
            Some(origin) => error!(query = %query, origin = %origin, reason, "query failed"),
            None => error!(query = %query, reason, "query failed"),
        }
    }
}
