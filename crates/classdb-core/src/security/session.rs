//! Per-caller session handle.
//!
//! Every public catalog call takes a `SessionHandle`. The handle carries the
//! caller's identity, its permission checker and its transaction state, and
//! is checked once at the call boundary.

use super::checker::{AllowAll, Permission, ResourceGeneric, SecurityChecker};
use crate::error::{Error, Result};
use crate::transaction::{LocalTransactions, TransactionCoordinator};
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Capability object passed to catalog operations.
pub struct SessionHandle {
    /// Session identifier, used in logs.
    pub session_id: String,
    active: AtomicBool,
    checker: Arc<dyn SecurityChecker>,
    transactions: Arc<dyn TransactionCoordinator>,
}

impl SessionHandle {
    /// Create a new session handle.
    pub fn new(
        session_id: impl Into<String>,
        checker: Arc<dyn SecurityChecker>,
        transactions: Arc<dyn TransactionCoordinator>,
    ) -> Self {
        Self {
            session_id: session_id.into(),
            active: AtomicBool::new(true),
            checker,
            transactions,
        }
    }

    /// Create an unrestricted session with its own transaction state.
    pub fn embedded(session_id: impl Into<String>) -> Self {
        Self::new(
            session_id,
            Arc::new(AllowAll),
            Arc::new(LocalTransactions::new()),
        )
    }

    /// Whether the session is still open.
    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::SeqCst)
    }

    /// Close the session. Later catalog calls fail with `SessionClosed`.
    pub fn close(&self) {
        self.active.store(false, Ordering::SeqCst);
    }

    /// Fail unless the session is open.
    pub fn ensure_active(&self) -> Result<()> {
        if self.is_active() {
            Ok(())
        } else {
            Err(Error::SessionClosed)
        }
    }

    /// Check that the session is open and allowed to perform the operation.
    pub fn check(
        &self,
        resource: ResourceGeneric,
        permission: Permission,
        target: Option<&str>,
    ) -> Result<()> {
        self.ensure_active()?;
        self.checker.check(resource, permission, target)?;
        Ok(())
    }

    /// Fail with `TransactionState` if a data transaction is open.
    pub fn ensure_no_transaction(&self, action: &str) -> Result<()> {
        if self.transactions.is_active_transaction() {
            Err(Error::TransactionState(format!(
                "cannot {} inside a transaction",
                action
            )))
        } else {
            Ok(())
        }
    }

    /// Transaction coordinator of this session.
    pub fn transactions(&self) -> &dyn TransactionCoordinator {
        self.transactions.as_ref()
    }
}

impl fmt::Debug for SessionHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionHandle")
            .field("session_id", &self.session_id)
            .field("active", &self.is_active())
            .finish()
    }
}
