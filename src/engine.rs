//! Interface to the query engine below the statement layer. Parsing, planning and producing rows
//! happen behind these traits; this crate only drives them.

use std::{error::Error as StdError, sync::Arc};

use crate::{
    chunk::Chunk,
    driver::{SessionExtensions, TlsState},
    exec_context::ExecContext,
    result_set::FetchNotifier,
    types::{ColumnInfo, Datum},
};

/// Error reported by the engine. Wrapped into [`crate::Error::Execution`] by this crate, so the
/// root cause stays accessible via [`std::error::Error::source`].
pub type EngineError = Box<dyn StdError + Send + Sync>;

/// Everything the engine needs to know to open a session for a client connection.
#[derive(Clone, Debug, Default)]
pub struct SessionConfig {
    pub conn_id: u64,
    /// Client capability flags as negotiated by the protocol layer.
    pub capability: u32,
    /// `None` if the client connected without a secure channel.
    pub tls_state: Option<TlsState>,
    pub extensions: Option<SessionExtensions>,
}

/// Reasons an engine refuses to open a session.
#[derive(Debug)]
pub enum SessionOpenError {
    Auth { message: String },
    Connection(EngineError),
}

/// Opens sessions. Implemented by the query engine.
pub trait Engine {
    fn open_session(&self, config: &SessionConfig) -> Result<Arc<dyn Session>, SessionOpenError>;
}

/// Result of preparing a statement.
#[derive(Clone, Debug, PartialEq)]
pub struct PreparedPlan {
    /// Handle of the plan within the session. Passed back to [`Session::execute_prepared`].
    pub plan_id: u64,
    /// Number of parameter markers.
    pub num_params: usize,
    /// Columns of the result set, empty for statements which do not produce one.
    pub columns: Vec<ColumnInfo>,
}

/// Engine side state of one connection. Shared between the connection context and all its
/// statements, therefore every method takes `&self`.
pub trait Session: Send + Sync {
    /// `collation` is the collation id sent by the client during the handshake.
    fn set_collation(&self, collation: u8) -> Result<(), EngineError>;

    fn use_database(&self, dbname: &str) -> Result<(), EngineError>;

    fn prepare(&self, sql: &str) -> Result<PreparedPlan, EngineError>;

    /// Executes a prepared plan. `None` for statements without a result set (e.g. `INSERT`).
    /// Implementations must observe `ctx` and return promptly once it is canceled.
    fn execute_prepared(
        &self,
        ctx: &ExecContext,
        plan_id: u64,
        args: &[Datum],
    ) -> Result<Option<Box<dyn RecordSet>>, EngineError>;

    /// Releases the plan. Called once the statement is closed.
    fn drop_prepared(&self, plan_id: u64) -> Result<(), EngineError>;

    fn close(&self);
}

/// Rows produced by one execution, as returned by the engine.
pub trait RecordSet: Send {
    /// Appends rows to `chunk` until it is full or the rows are exhausted. Leaving the chunk empty
    /// signals the end of the data.
    fn next(&mut self, ctx: &ExecContext, chunk: &mut Chunk) -> Result<(), EngineError>;

    fn close(&mut self) -> Result<(), EngineError>;

    /// Engines which want to learn about completed cursor fetches (e.g. to release locks between
    /// fetches) return `Some` here.
    fn fetch_notifier(&self) -> Option<&dyn FetchNotifier> {
        None
    }
}
