//! # Statement cursors
//!
//! Statement layer of a SQL server speaking a binary client protocol. Sits between the protocol
//! layer, which decodes client requests, and a query engine, which produces rows.
//!
//! For each connection the [`Driver`] opens a [`Context`]. The context owns the prepared
//! statements of the connection and the session of the engine. Executing a statement either
//! streams its rows from the engine ([`EngineResultSet`]) or materializes them into a
//! [`RowContainer`] backing a server side cursor, which the client then reads in batches via
//! [`Context::fetch`]. Row containers move their rows into a temporary file once they grow beyond
//! a configurable threshold (see [`Options`]).
//!
//! The engine is plugged in by implementing the traits in [`engine`].

mod chunk;
mod connection;
mod driver;
mod error;
mod exec_context;
mod options;
mod prepared;
mod result_set;
mod row_container;

pub mod engine;
pub mod types;

pub use self::{
    chunk::{Chunk, ChunkAllocator, DefaultAllocator, Row},
    connection::{Context, ExecuteOutcome, FetchOutcome},
    driver::{Driver, EngineDriver, SessionExtensions, TlsState},
    error::Error,
    exec_context::{CancelHandle, ExecContext},
    options::Options,
    prepared::{PreparedStatement, UNSIGNED_PARAM_FLAG},
    result_set::{
        CursorResultSet, CursorWrapper, EngineResultSet, FetchNotifier, ResultSet,
        wrap_with_cursor,
    },
    row_container::{Reader, RowContainer},
};
