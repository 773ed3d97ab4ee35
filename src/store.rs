//! # Store Access and Transaction Lifecycle
//!
//! Abstracts the backing store behind two traits: [`StoreProvider`] hands
//! out transactional [`Accessor`]s, and the accessor runs parameterized
//! statements inside its transaction until it is committed or rolled back.
//!
//! The per-request transaction lives in a [`TxSlot`] on the request
//! context. The slot is a small state machine: it starts `Idle`, is opened
//! by the transaction stage before the handler runs, and is finished
//! exactly once (commit on success, rollback on failure). Any use outside
//! the `Open` state is an internal error rather than a silent no-op.

use serde_json::Value;
use tracing::debug;

use crate::errors::ServiceError;
use crate::query::Params;

/// Named bound parameters for a statement, as produced by
/// [`crate::query::translate`].
pub type BoundParams = Params;

/// A live transaction against the backing store. Dropped without a commit,
/// the implementation must roll back.
pub trait Accessor: Send {
    /// Run a query and return its rows as JSON objects.
    fn query(&mut self, sql: &str, params: &BoundParams) -> Result<Vec<Value>, ServiceError>;

    /// Run a statement and return the number of affected rows.
    fn execute(&mut self, sql: &str, params: &BoundParams) -> Result<u64, ServiceError>;

    /// Commit the transaction. The accessor must not be used afterwards.
    fn commit(&mut self) -> Result<(), ServiceError>;

    /// Roll the transaction back. The accessor must not be used afterwards.
    fn rollback(&mut self) -> Result<(), ServiceError>;
}

/// Opens transactions. One provider is shared by the whole service.
pub trait StoreProvider: Send + Sync {
    /// Begin a new transaction.
    ///
    /// # Errors
    ///
    /// Returns [`ServiceError::Unavailable`] when the store cannot be
    /// reached or has no capacity for another transaction.
    fn begin(&self) -> Result<Box<dyn Accessor>, ServiceError>;
}

#[derive(Default)]
enum TxState {
    #[default]
    Idle,
    Open(Box<dyn Accessor>),
    Committed,
    RolledBack,
}

impl TxState {
    fn name(&self) -> &'static str {
        match self {
            TxState::Idle => "idle",
            TxState::Open(_) => "open",
            TxState::Committed => "committed",
            TxState::RolledBack => "rolled_back",
        }
    }
}

/// Per-request transaction slot. Handlers reach the store only through
/// this, so a request can never touch more than one transaction and the
/// pipeline always knows whether a commit or rollback is still owed.
#[derive(Default)]
pub struct TxSlot {
    state: TxState,
}

impl TxSlot {
    pub fn new() -> Self {
        Self::default()
    }

    /// True while a transaction is open and usable.
    pub fn is_open(&self) -> bool {
        matches!(self.state, TxState::Open(_))
    }

    /// Install a freshly begun transaction. Only valid from `Idle`.
    pub(crate) fn open(&mut self, accessor: Box<dyn Accessor>) -> Result<(), ServiceError> {
        if matches!(self.state, TxState::Idle) {
            self.state = TxState::Open(accessor);
            Ok(())
        } else {
            Err(ServiceError::Internal(format!(
                "transaction opened twice (slot was {})",
                self.state.name()
            )))
        }
    }

    /// Run a query on the open transaction.
    ///
    /// # Errors
    ///
    /// [`ServiceError::Internal`] if no transaction is open, otherwise
    /// whatever the accessor returns.
    pub fn query(&mut self, sql: &str, params: &BoundParams) -> Result<Vec<Value>, ServiceError> {
        match &mut self.state {
            TxState::Open(accessor) => accessor.query(sql, params),
            other => Err(ServiceError::Internal(format!(
                "query outside an open transaction (slot is {})",
                other.name()
            ))),
        }
    }

    /// Run a statement on the open transaction.
    pub fn execute(&mut self, sql: &str, params: &BoundParams) -> Result<u64, ServiceError> {
        match &mut self.state {
            TxState::Open(accessor) => accessor.execute(sql, params),
            other => Err(ServiceError::Internal(format!(
                "execute outside an open transaction (slot is {})",
                other.name()
            ))),
        }
    }

    /// Commit and retire the transaction. Only valid from `Open`.
    pub(crate) fn commit(&mut self) -> Result<(), ServiceError> {
        match std::mem::take(&mut self.state) {
            TxState::Open(mut accessor) => {
                accessor.commit()?;
                self.state = TxState::Committed;
                debug!("Transaction committed");
                Ok(())
            }
            other => {
                self.state = other;
                Err(ServiceError::Internal(format!(
                    "commit outside an open transaction (slot is {})",
                    self.state.name()
                )))
            }
        }
    }

    /// Roll back and retire the transaction. Only valid from `Open`.
    pub(crate) fn rollback(&mut self) -> Result<(), ServiceError> {
        match std::mem::take(&mut self.state) {
            TxState::Open(mut accessor) => {
                accessor.rollback()?;
                self.state = TxState::RolledBack;
                debug!("Transaction rolled back");
                Ok(())
            }
            other => {
                self.state = other;
                Err(ServiceError::Internal(format!(
                    "rollback outside an open transaction (slot is {})",
                    self.state.name()
                )))
            }
        }
    }
}

impl std::fmt::Debug for TxSlot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TxSlot").field("state", &self.state.name()).finish()
    }
}
