use std::io;

use thiserror::Error as ThisError;

use crate::{engine::EngineError, exec_context::ExecContext};

#[derive(Debug, ThisError)]
/// Error type used by every fallible operation of statements, result sets, row containers and
/// connection contexts.
pub enum Error {
    /// Number of arguments passed to execute does not match the number of parameter markers of the
    /// prepared statement.
    #[error(
        "The prepared statement expects {expected} parameters, but {actual} arguments have been \
        supplied."
    )]
    ParamMismatch { expected: usize, actual: usize },
    /// An argument is not consistent with the type declared for its parameter.
    #[error(
        "Argument for parameter {index} does not match the declared parameter type 0x{declared:02x}. \
        Supplied value: {actual}"
    )]
    ParamTypeMismatch {
        /// Zero based parameter index.
        index: usize,
        /// Raw type code as declared by the client. Not necessarily a known code.
        declared: u8,
        /// Short description of the supplied value.
        actual: String,
    },
    /// The declared parameter types do not describe exactly one type per parameter. Each parameter
    /// takes two bytes: the type code and a flag byte.
    #[error(
        "Declared parameter types are {len} bytes long, but the statement has {num_params} \
        parameters, which require twice as many bytes."
    )]
    InvalidParamsType { len: usize, num_params: usize },
    /// Parameter index passed to `append_param` is outside of `[0, num_params)`.
    #[error("Parameter index {param_id} is out of range. The statement has {num_params} parameters.")]
    ParamOutOfRange { param_id: usize, num_params: usize },
    /// The requested operation would violate the ownership invariants of a statement, e.g. storing
    /// a second result set, or activating a cursor without a row container.
    #[error("Invalid state: {0}")]
    InvalidState(&'static str),
    /// Operation on a statement, result set, row container or reader which has already been closed.
    #[error("Operation on closed {0}.")]
    Closed(&'static str),
    /// The execution engine failed executing the statement or producing rows. The error of the
    /// engine is kept as source.
    #[error("Execution failed: {source}")]
    Execution {
        #[source]
        source: EngineError,
    },
    /// The execution context had been canceled.
    #[error("Operation canceled.")]
    Canceled,
    /// The deadline of the execution context passed before the operation completed.
    #[error("Deadline exceeded.")]
    DeadlineExceeded,
    /// The engine refused to open a session for the connection.
    #[error("Authentication failed: {message}")]
    Auth { message: String },
    /// Opening the session for the connection failed for reasons other than authentication.
    #[error("Failed to set up connection: {source}")]
    Connection {
        #[source]
        source: EngineError,
    },
    /// No live statement with this id exists in the connection.
    #[error("Unknown prepared statement handler (id {id}).")]
    UnknownStatement { id: u32 },
    /// Reading or writing the temporary file of a spilled row container failed.
    #[error("Row container failed to access its spill file:\n{0}")]
    SpillIo(#[from] io::Error),
    /// A row could not be encoded for, or decoded from, the spill file.
    #[error("Row container failed to encode or decode a spilled row:\n{0}")]
    SpillEncoding(#[from] bincode::Error),
}

impl Error {
    /// Wraps an error emitted by the execution engine.
    pub fn execution(source: impl Into<EngineError>) -> Self {
        Error::Execution {
            source: source.into(),
        }
    }
}

/// Maps an engine failure to an error. Engines usually fail as a consequence of cancellation, in
/// which case the cancellation is reported rather than the engine error.
pub(crate) fn engine_failure(ctx: &ExecContext, source: EngineError) -> Error {
    match ctx.check() {
        Err(cancellation) => cancellation,
        Ok(()) => Error::execution(source),
    }
}
