mod cursor;

use std::thread::panicking;

use log::warn;

use crate::{
    Error,
    chunk::{Chunk, ChunkAllocator},
    engine::{EngineError, RecordSet},
    error::engine_failure,
    exec_context::ExecContext,
    types::{ColumnInfo, FieldType},
};

pub use self::cursor::{CursorResultSet, CursorWrapper, wrap_with_cursor};

/// Rows produced by one execution of a statement. Produced lazily, chunk by chunk.
///
/// Column metadata and field types are fixed for the whole lifetime of the result set and stay
/// available after it has been closed.
pub trait ResultSet: Send {
    fn columns(&self) -> &[ColumnInfo];

    /// Semantic types of the columns, in column order. Used by the protocol layer to encode rows.
    fn field_types(&self) -> &[FieldType];

    /// Allocates an empty chunk suitable for [`Self::next`]. Does not advance the result set.
    fn new_chunk(&self, allocator: &dyn ChunkAllocator) -> Chunk;

    /// Replaces the contents of `chunk` with the next batch of rows. An empty chunk after the call
    /// signals the end of the data.
    ///
    /// Fails with [`Error::Closed`] after [`Self::close`]. Errors of the engine are wrapped in
    /// [`Error::Execution`], unless `ctx` has been canceled. On error the chunk is left empty.
    fn next(&mut self, ctx: &ExecContext, chunk: &mut Chunk) -> Result<(), Error>;

    /// Releases the resources held by the engine. Idempotent.
    fn close(&mut self) -> Result<(), Error>;

    fn is_closed(&self) -> bool;

    /// `Some` if the engine wants to be told about each completed cursor fetch.
    fn fetch_notifier(&self) -> Option<&dyn FetchNotifier> {
        None
    }
}

/// Called by the server side cursor after each batch of rows has been returned to the client.
/// Lets the engine do bookkeeping between fetches.
pub trait FetchNotifier {
    /// Failures are logged, but never fail the fetch itself.
    fn on_fetch_returned(&self) -> Result<(), EngineError>;
}

/// Invokes the notifier of `result_set`, if any, and logs its failure.
pub(crate) fn notify_fetch_returned(result_set: &(impl ResultSet + ?Sized)) {
    if let Some(notifier) = result_set.fetch_notifier() {
        if let Err(error) = notifier.on_fetch_returned() {
            warn!("Fetch notifier failed after a cursor fetch returned: {error}");
        }
    }
}

/// [`ResultSet`] over the rows of an engine [`RecordSet`]. Returned by
/// [`crate::PreparedStatement::execute`].
pub struct EngineResultSet {
    columns: Vec<ColumnInfo>,
    field_types: Vec<FieldType>,
    record_set: Box<dyn RecordSet>,
    init_chunk_size: usize,
    max_chunk_size: usize,
    closed: bool,
}

impl EngineResultSet {
    /// `max_chunk_size` is the number of rows `next` fetches at most. Values of `0` are treated as
    /// `1`.
    pub fn new(
        columns: Vec<ColumnInfo>,
        record_set: Box<dyn RecordSet>,
        init_chunk_size: usize,
        max_chunk_size: usize,
    ) -> Self {
        let field_types = columns.iter().map(|c| c.field_type.clone()).collect();
        let max_chunk_size = max_chunk_size.max(1);
        Self {
            columns,
            field_types,
            record_set,
            init_chunk_size: init_chunk_size.clamp(1, max_chunk_size),
            max_chunk_size,
            closed: false,
        }
    }
}

impl ResultSet for EngineResultSet {
    fn columns(&self) -> &[ColumnInfo] {
        &self.columns
    }

    fn field_types(&self) -> &[FieldType] {
        &self.field_types
    }

    fn new_chunk(&self, allocator: &dyn ChunkAllocator) -> Chunk {
        allocator.alloc(&self.field_types, self.init_chunk_size, self.max_chunk_size)
    }

    fn next(&mut self, ctx: &ExecContext, chunk: &mut Chunk) -> Result<(), Error> {
        chunk.reset();
        if self.closed {
            return Err(Error::Closed("result set"));
        }
        ctx.check()?;
        self.record_set.next(ctx, chunk).map_err(|source| {
            chunk.reset();
            engine_failure(ctx, source)
        })
    }

    fn close(&mut self) -> Result<(), Error> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        self.record_set.close().map_err(Error::execution)
    }

    fn is_closed(&self) -> bool {
        self.closed
    }

    fn fetch_notifier(&self) -> Option<&dyn FetchNotifier> {
        self.record_set.fetch_notifier()
    }
}

impl Drop for EngineResultSet {
    fn drop(&mut self) {
        if let Err(e) = self.close() {
            // Avoid flooding the log with secondary errors during a panic.
            if !panicking() {
                warn!("Failed to close result set: {e}");
            }
        }
    }
}
