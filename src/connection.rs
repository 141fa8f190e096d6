use std::{collections::HashMap, sync::Arc, thread::panicking};

use log::{debug, warn};

use crate::{
    Error,
    chunk::{Chunk, DefaultAllocator},
    driver::TlsState,
    engine::Session,
    exec_context::ExecContext,
    options::Options,
    prepared::PreparedStatement,
    result_set::{
        CursorResultSet, EngineResultSet, ResultSet, notify_fetch_returned, wrap_with_cursor,
    },
    row_container::RowContainer,
    types::{ColumnInfo, Datum},
};

/// Outcome of [`Context::execute`].
pub enum ExecuteOutcome {
    /// The statement did not produce a result set, e.g. an `INSERT`.
    NoResult,
    /// Rows are streamed directly from the engine. The caller owns the result set.
    Rows(EngineResultSet),
    /// The rows have been materialized into a server side cursor of the statement. Fetch them with
    /// [`Context::fetch`].
    CursorOpened {
        columns: Vec<ColumnInfo>,
        num_rows: usize,
    },
}

/// A batch of rows returned by [`Context::fetch`].
#[derive(Debug)]
pub struct FetchOutcome {
    pub chunk: Chunk,
    /// `true` once every row of the cursor has been fetched.
    pub last_row_sent: bool,
}

/// Execution context of one client connection. Owns the engine session and every prepared
/// statement of the connection. Obtained via [`crate::Driver::open_ctx`].
///
/// Statement ids are allocated per connection, starting at `1`, and are never reused while the
/// context lives.
pub struct Context {
    conn_id: u64,
    capability: u32,
    collation: u8,
    current_db: String,
    tls_state: Option<TlsState>,
    session: Arc<dyn Session>,
    options: Options,
    statements: HashMap<u32, PreparedStatement>,
    next_statement_id: u32,
    closed: bool,
}

impl Context {
    /// Users are encouraged to obtain contexts by calling [`crate::Driver::open_ctx`] instead.
    pub fn new(
        conn_id: u64,
        capability: u32,
        collation: u8,
        current_db: String,
        tls_state: Option<TlsState>,
        session: Arc<dyn Session>,
        options: Options,
    ) -> Self {
        Self {
            conn_id,
            capability,
            collation,
            current_db,
            tls_state,
            session,
            options,
            statements: HashMap::new(),
            next_statement_id: 1,
            closed: false,
        }
    }

    pub fn conn_id(&self) -> u64 {
        self.conn_id
    }

    pub fn capability(&self) -> u32 {
        self.capability
    }

    pub fn collation(&self) -> u8 {
        self.collation
    }

    /// Database selected for the session. Empty if none.
    pub fn current_db(&self) -> &str {
        &self.current_db
    }

    pub fn tls_state(&self) -> Option<&TlsState> {
        self.tls_state.as_ref()
    }

    pub fn options(&self) -> &Options {
        &self.options
    }

    /// Number of live prepared statements.
    pub fn num_statements(&self) -> usize {
        self.statements.len()
    }

    /// Prepares an SQL statement for repeated execution.
    ///
    /// # Parameters
    ///
    /// * `sql`: Text of the statement. `?` may be used as a placeholder, to be replaced with
    ///   arguments during execution.
    ///
    /// # Return
    ///
    /// Id of the new statement. Pass it to the other methods of this context.
    pub fn prepare(&mut self, sql: &str) -> Result<u32, Error> {
        let plan = self.session.prepare(sql).map_err(Error::execution)?;
        let id = self.allocate_statement_id();
        debug!(
            "Connection {} prepared statement {id} with {} parameters.",
            self.conn_id, plan.num_params
        );
        let statement =
            PreparedStatement::new(id, sql, self.session.clone(), plan, &self.options);
        self.statements.insert(id, statement);
        Ok(id)
    }

    /// Fails with [`Error::UnknownStatement`] if no live statement has this id.
    pub fn statement(&self, id: u32) -> Result<&PreparedStatement, Error> {
        self.statements
            .get(&id)
            .ok_or(Error::UnknownStatement { id })
    }

    /// Fails with [`Error::UnknownStatement`] if no live statement has this id.
    pub fn statement_mut(&mut self, id: u32) -> Result<&mut PreparedStatement, Error> {
        self.statements
            .get_mut(&id)
            .ok_or(Error::UnknownStatement { id })
    }

    /// Appends long data to a parameter of the statement. See [`PreparedStatement::append_param`].
    pub fn append_param(&mut self, id: u32, param_id: usize, data: &[u8]) -> Result<(), Error> {
        self.statement_mut(id)?.append_param(param_id, data)
    }

    /// See [`PreparedStatement::set_params_type`].
    pub fn set_params_type(&mut self, id: u32, params_type: Vec<u8>) -> Result<(), Error> {
        self.statement_mut(id)?.set_params_type(params_type)
    }

    /// Executes a prepared statement.
    ///
    /// # Parameters
    ///
    /// * `id`: Statement returned by [`Self::prepare`].
    /// * `ctx`: Cancellation and deadline of the execution. Also observed while the rows are
    ///   materialized for a cursor.
    /// * `args`: One argument per parameter.
    /// * `use_cursor`: If `true` the rows are read to completion and kept in a row container
    ///   attached to the statement. The client fetches them in batches via [`Self::fetch`].
    pub fn execute(
        &mut self,
        id: u32,
        ctx: &ExecContext,
        args: Vec<Datum>,
        use_cursor: bool,
    ) -> Result<ExecuteOutcome, Error> {
        let statement = self
            .statements
            .get_mut(&id)
            .ok_or(Error::UnknownStatement { id })?;
        if !use_cursor {
            return Ok(match statement.execute(ctx, args)? {
                Some(result_set) => ExecuteOutcome::Rows(result_set),
                None => ExecuteOutcome::NoResult,
            });
        }
        // A previous cursor survives until the new one has been materialized successfully
        let Some(result_set) = statement.execute_retaining_cursor(ctx, args)? else {
            statement.discard_cursor();
            return Ok(ExecuteOutcome::NoResult);
        };
        open_cursor(statement, ctx, result_set, &self.options)
    }

    /// Fetches the next batch of at most `max_rows` rows from the cursor of the statement.
    ///
    /// Fails with [`Error::InvalidState`] if the statement has not been executed with a cursor.
    /// Once every row has been fetched the returned chunk is empty and `last_row_sent` is `true`.
    /// The fetch notifier of the engine is invoked for every fetch which returned rows.
    pub fn fetch(
        &mut self,
        id: u32,
        ctx: &ExecContext,
        max_rows: usize,
    ) -> Result<FetchOutcome, Error> {
        let statement = self.statement_mut(id)?;
        let result_set = statement
            .result_set_mut()?
            .ok_or(Error::InvalidState("statement has no open cursor"))?;
        let num_cols = result_set.field_types().len();
        let reader = result_set
            .row_container_reader_mut()
            .ok_or(Error::InvalidState(
                "result set of the statement is not backed by a row container",
            ))?;
        let chunk = reader
            .next_chunk(ctx, max_rows)?
            .unwrap_or_else(|| Chunk::new(num_cols, 0, 0));
        let last_row_sent = reader.is_exhausted();
        if !chunk.is_empty() {
            notify_fetch_returned(&*result_set);
        }
        if last_row_sent {
            statement.set_cursor_active(false)?;
        }
        Ok(FetchOutcome {
            chunk,
            last_row_sent,
        })
    }

    /// Resets the statement to its just prepared state. See [`PreparedStatement::reset`].
    pub fn reset_statement(&mut self, id: u32) -> Result<(), Error> {
        self.statement_mut(id)?.reset()
    }

    /// Closes the statement and forgets its id. Later calls with this id fail with
    /// [`Error::UnknownStatement`].
    pub fn close_statement(&mut self, id: u32) -> Result<(), Error> {
        let mut statement = self
            .statements
            .remove(&id)
            .ok_or(Error::UnknownStatement { id })?;
        statement.close()
    }

    /// Closes every statement and then the session. The first error encountered is returned, yet
    /// all resources are released regardless.
    pub fn close(mut self) -> Result<(), Error> {
        self.close_all()
    }

    fn close_all(&mut self) -> Result<(), Error> {
        self.closed = true;
        let mut result = Ok(());
        for (_, mut statement) in self.statements.drain() {
            if let Err(e) = statement.close() {
                if result.is_ok() {
                    result = Err(e);
                }
            }
        }
        self.session.close();
        debug!("Closed connection {}.", self.conn_id);
        result
    }

    fn allocate_statement_id(&mut self) -> u32 {
        loop {
            let id = self.next_statement_id;
            self.next_statement_id = self.next_statement_id.checked_add(1).unwrap_or(1);
            if !self.statements.contains_key(&id) {
                return id;
            }
        }
    }
}

impl Drop for Context {
    fn drop(&mut self) {
        if self.closed {
            return;
        }
        if let Err(e) = self.close_all() {
            // Avoid flooding the log with secondary errors during a panic.
            if !panicking() {
                warn!("Failed to close connection {}: {e}", self.conn_id);
            }
        }
    }
}

/// Drains `result_set` into a row container and attaches both to `statement`, replacing its
/// previous cursor. If any step fails, the new rows are released and the previous cursor is kept.
fn open_cursor(
    statement: &mut PreparedStatement,
    ctx: &ExecContext,
    result_set: EngineResultSet,
    options: &Options,
) -> Result<ExecuteOutcome, Error> {
    let container = RowContainer::new(result_set.field_types().to_vec(), options);
    let mut cursor = wrap_with_cursor(result_set);

    let materialized = drain_into(ctx, &mut cursor, &container).and_then(|()| {
        container.freeze();
        cursor.close()?;
        cursor.store_row_container_reader(container.reader())
    });
    if let Err(e) = materialized {
        container.close();
        if let Err(close_error) = cursor.close() {
            warn!("Failed to close result set of abandoned cursor: {close_error}");
        }
        return Err(e);
    }

    let columns = cursor.columns().to_vec();
    let num_rows = container.num_rows();
    debug!(
        "Opened cursor for statement {} with {num_rows} rows. Spilled to disk: {}",
        statement.id(),
        container.is_spilled()
    );
    statement.replace_cursor(Box::new(cursor), container)?;
    Ok(ExecuteOutcome::CursorOpened { columns, num_rows })
}

fn drain_into(
    ctx: &ExecContext,
    result_set: &mut impl ResultSet,
    container: &RowContainer,
) -> Result<(), Error> {
    let mut chunk = result_set.new_chunk(&DefaultAllocator);
    loop {
        result_set.next(ctx, &mut chunk)?;
        if chunk.is_empty() {
            return Ok(());
        }
        container.add_chunk(ctx, &chunk)?;
    }
}
