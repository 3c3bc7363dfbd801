//! Per-call connection handling.
//!
//! Every execution asks the [`ConnectionLifecycleManager`] for a lease. The
//! lease records how the connection was obtained so that releasing it puts
//! the connection back in the state the caller left it:
//!
//! | Command connection | Plan | On release |
//! |--------------------|------|------------|
//! | none | `Transient` | close |
//! | bound, closed | `OpenedForCall` | close |
//! | bound, open | `AlreadyOpen` | leave open |
//!
//! A transient connection is never stored on the command.

use crate::db::connection::{Connection, ConnectionHandle};
use crate::db::driver::DriverFactory;
use crate::error::{DbError, DbResult};
use crate::models::{Command, ConnectionDescriptor};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// How a lease obtained its connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionPlan {
    /// Created and opened for this call only
    Transient,
    /// Caller's connection, opened for this call
    OpenedForCall,
    /// Caller's connection, already open
    AlreadyOpen,
}

impl ConnectionPlan {
    /// Whether releasing the lease closes the connection.
    pub fn closes_on_release(&self) -> bool {
        matches!(self, Self::Transient | Self::OpenedForCall)
    }
}

/// A connection borrowed for the duration of one call.
///
/// Call [`ConnectionLease::release`] when done. Dropping an unreleased lease
/// discards connections the call opened.
#[derive(Debug)]
pub struct ConnectionLease {
    handle: ConnectionHandle,
    plan: ConnectionPlan,
    released: bool,
}

impl ConnectionLease {
    pub fn handle(&self) -> &ConnectionHandle {
        &self.handle
    }

    pub fn plan(&self) -> ConnectionPlan {
        self.plan
    }

    /// Restore the connection state the call found.
    ///
    /// Close failures are logged rather than returned, so they never mask the
    /// outcome of the call itself.
    pub async fn release(mut self) {
        self.released = true;
        if !self.plan.closes_on_release() {
            return;
        }
        if let Err(e) = self.handle.close().await {
            warn!(plan = ?self.plan, error = %e, "Failed to close connection after call");
        } else {
            debug!(plan = ?self.plan, "Connection closed after call");
        }
    }
}

impl Drop for ConnectionLease {
    fn drop(&mut self) {
        if self.released || !self.plan.closes_on_release() {
            return;
        }

        if let Some(mut conn) = self.handle.try_lock() {
            conn.discard();
            return;
        }

        // Someone else holds the lock, finish the close in the background
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            warn!(plan = ?self.plan, "Connection lease dropped outside a runtime - connection left open");
            return;
        };
        let handle = self.handle.clone();
        let plan = self.plan;
        runtime.spawn(async move {
            if let Err(e) = handle.close().await {
                warn!(plan = ?plan, error = %e, "Failed to close connection of dropped lease");
            }
        });
    }
}

/// Decides per call which connection a command runs on.
#[derive(Clone)]
pub struct ConnectionLifecycleManager {
    descriptor: Arc<ConnectionDescriptor>,
    factory: Arc<dyn DriverFactory>,
    connect_timeout: Option<Duration>,
}

impl std::fmt::Debug for ConnectionLifecycleManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionLifecycleManager")
            .field("provider", &self.descriptor.provider())
            .field("factory", &self.factory.type_name())
            .field("connect_timeout", &self.connect_timeout)
            .finish()
    }
}

impl ConnectionLifecycleManager {
    pub fn new(
        descriptor: Arc<ConnectionDescriptor>,
        factory: Arc<dyn DriverFactory>,
        connect_timeout: Option<Duration>,
    ) -> Self {
        Self {
            descriptor,
            factory,
            connect_timeout,
        }
    }

    /// Create a new, closed connection handle.
    pub fn create_connection(&self) -> ConnectionHandle {
        ConnectionHandle::new(Connection::new(
            Arc::clone(&self.descriptor),
            Arc::clone(&self.factory),
            self.connect_timeout,
        ))
    }

    /// Obtain the connection a command runs on.
    pub async fn acquire(&self, command: &Command) -> DbResult<ConnectionLease> {
        if let Some(transaction) = &command.transaction {
            if !transaction.is_active() {
                return Err(DbError::transaction(
                    "Command is enlisted in a transaction that is no longer active",
                    transaction.id(),
                ));
            }
            let connection_open = match &command.connection {
                Some(handle) => handle.is_open().await,
                None => false,
            };
            if !connection_open {
                return Err(DbError::transaction(
                    "Connection of an enlisted command must be open",
                    transaction.id(),
                ));
            }
        }

        let (handle, plan) = match &command.connection {
            None => {
                let handle = self.create_connection();
                handle.open().await?;
                (handle, ConnectionPlan::Transient)
            }
            Some(handle) => {
                let mut conn = handle.lock().await;
                if conn.state().is_open() {
                    (handle.clone(), ConnectionPlan::AlreadyOpen)
                } else {
                    conn.open().await?;
                    (handle.clone(), ConnectionPlan::OpenedForCall)
                }
            }
        };

        debug!(plan = ?plan, "Connection acquired");
        Ok(ConnectionLease {
            handle,
            plan,
            released: false,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plan_close_policy() {
        assert!(ConnectionPlan::Transient.closes_on_release());
        assert!(ConnectionPlan::OpenedForCall.closes_on_release());
        assert!(!ConnectionPlan::AlreadyOpen.closes_on_release());
    }
}
