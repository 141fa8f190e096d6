use std::{sync::Arc, thread::panicking};

use log::{debug, warn};

use crate::{
    Error,
    engine::{PreparedPlan, Session},
    error::engine_failure,
    exec_context::ExecContext,
    options::Options,
    result_set::{CursorResultSet, EngineResultSet, ResultSet},
    row_container::RowContainer,
    types::{ColumnInfo, Datum, FieldKind},
};

/// Bit in the flag byte of a declared parameter type marking the parameter as unsigned.
pub const UNSIGNED_PARAM_FLAG: u8 = 0x80;

/// A prepared statement of a connection, addressed by its id.
///
/// The statement owns its bound parameters, at most one stored cursor result set and at most one
/// row container. Stored resources are released by [`Self::reset`], [`Self::close`], a
/// successful [`Self::execute`] (if they are no longer in use) or when the statement is dropped.
///
/// Lifecycle of a server side cursor:
///
/// 1. `execute` returns a result set.
/// 2. The caller drains it into a [`RowContainer`], wraps it with
///    [`crate::wrap_with_cursor`] and stores a reader of the container on the wrapper.
/// 3. [`Self::store_result_set`], [`Self::store_row_container`] and
///    [`Self::set_cursor_active`] attach the cursor to the statement.
/// 4. Fetches advance the reader. Once it is exhausted the cursor becomes inactive, the container
///    is retained until `reset` or `close`.
///
/// [`crate::Context`] implements this protocol.
pub struct PreparedStatement {
    id: u32,
    sql: String,
    session: Arc<dyn Session>,
    plan: PreparedPlan,
    init_chunk_size: usize,
    max_chunk_size: usize,
    /// One slot per parameter. An empty slot means no long data has been sent for it.
    bound_params: Vec<Vec<u8>>,
    /// Two bytes per parameter: type code and flags. Empty if the client did not declare types.
    params_type: Vec<u8>,
    result_set: Option<Box<dyn CursorResultSet>>,
    row_container: Option<RowContainer>,
    cursor_active: bool,
    closed: bool,
}

impl PreparedStatement {
    /// Users are encouraged to obtain statements by calling [`crate::Context::prepare`] instead.
    pub fn new(
        id: u32,
        sql: impl Into<String>,
        session: Arc<dyn Session>,
        plan: PreparedPlan,
        options: &Options,
    ) -> Self {
        let (init_chunk_size, max_chunk_size) = options.chunk_sizes();
        Self {
            id,
            sql: sql.into(),
            session,
            bound_params: vec![Vec::new(); plan.num_params],
            plan,
            init_chunk_size,
            max_chunk_size,
            params_type: Vec::new(),
            result_set: None,
            row_container: None,
            cursor_active: false,
            closed: false,
        }
    }

    /// Identifier of the statement within its connection. Stable, also after close.
    pub fn id(&self) -> u32 {
        self.id
    }

    pub fn sql(&self) -> Result<&str, Error> {
        self.ensure_open()?;
        Ok(&self.sql)
    }

    /// Number of parameter markers. Fixed at prepare time.
    pub fn num_params(&self) -> Result<usize, Error> {
        self.ensure_open()?;
        Ok(self.plan.num_params)
    }

    /// Columns of the result set produced by executing the statement. Empty for statements which
    /// do not produce rows.
    pub fn columns(&self) -> Result<&[ColumnInfo], Error> {
        self.ensure_open()?;
        Ok(&self.plan.columns)
    }

    /// Appends `data` to the long data bound for the parameter at `param_id`. Large values may be
    /// sent in several pieces, which are concatenated. Bound long data takes precedence over the
    /// argument passed to [`Self::execute`] for the same parameter.
    ///
    /// Fails with [`Error::ParamOutOfRange`] if `param_id` is not in `[0, num_params)`. Other slots
    /// are never affected.
    pub fn append_param(&mut self, param_id: usize, data: &[u8]) -> Result<(), Error> {
        self.ensure_open()?;
        let num_params = self.bound_params.len();
        let slot = self
            .bound_params
            .get_mut(param_id)
            .ok_or(Error::ParamOutOfRange {
                param_id,
                num_params,
            })?;
        slot.extend_from_slice(data);
        Ok(())
    }

    /// Long data bound so far, one slot per parameter.
    pub fn bound_params(&self) -> Result<&[Vec<u8>], Error> {
        self.ensure_open()?;
        Ok(&self.bound_params)
    }

    /// Declares the types of the parameters: two bytes per parameter, the type code (see
    /// [`FieldKind`]) followed by a flag byte (see [`UNSIGNED_PARAM_FLAG`]). The shape is validated
    /// on execution.
    pub fn set_params_type(&mut self, params_type: Vec<u8>) -> Result<(), Error> {
        self.ensure_open()?;
        self.params_type = params_type;
        Ok(())
    }

    pub fn params_type(&self) -> Result<&[u8], Error> {
        self.ensure_open()?;
        Ok(&self.params_type)
    }

    /// Executes the statement with `args`, one argument per parameter.
    ///
    /// # Return
    ///
    /// `None` if the statement does not produce a result set.
    ///
    /// On success a previously stored cursor (whose result set has already been closed) is
    /// released. On failure the statement is left as it was.
    pub fn execute(
        &mut self,
        ctx: &ExecContext,
        args: Vec<Datum>,
    ) -> Result<Option<EngineResultSet>, Error> {
        let result_set = self.execute_retaining_cursor(ctx, args)?;
        self.discard_cursor();
        Ok(result_set)
    }

    /// Same as [`Self::execute`], but a previously stored cursor stays in place. It is released
    /// by [`Self::replace_cursor`] once the rows of the new result set have been materialized.
    pub(crate) fn execute_retaining_cursor(
        &mut self,
        ctx: &ExecContext,
        args: Vec<Datum>,
    ) -> Result<Option<EngineResultSet>, Error> {
        self.ensure_open()?;
        if self.result_set.as_ref().is_some_and(|rs| !rs.is_closed()) {
            return Err(Error::InvalidState(
                "statement still holds an open result set, reset it before executing again",
            ));
        }
        if args.len() != self.plan.num_params {
            return Err(Error::ParamMismatch {
                expected: self.plan.num_params,
                actual: args.len(),
            });
        }
        let args: Vec<Datum> = args
            .into_iter()
            .zip(&self.bound_params)
            .map(|(arg, long_data)| {
                if long_data.is_empty() {
                    arg
                } else {
                    Datum::Bytes(long_data.clone())
                }
            })
            .collect();
        self.check_param_types(&args)?;

        ctx.check()?;
        debug!("Executing prepared statement {}.", self.id);
        let record_set = self
            .session
            .execute_prepared(ctx, self.plan.plan_id, &args)
            .map_err(|source| engine_failure(ctx, source))?;

        Ok(record_set.map(|record_set| {
            EngineResultSet::new(
                self.plan.columns.clone(),
                record_set,
                self.init_chunk_size,
                self.max_chunk_size,
            )
        }))
    }

    /// Releases the stored cursor, if any, and attaches `result_set` and `container` in its
    /// place. `result_set` must hold a reader of `container`.
    pub(crate) fn replace_cursor(
        &mut self,
        result_set: Box<dyn CursorResultSet>,
        container: RowContainer,
    ) -> Result<(), Error> {
        self.ensure_open()?;
        self.discard_cursor();
        self.result_set = Some(result_set);
        self.row_container = Some(container);
        let has_rows = self
            .result_set
            .as_ref()
            .and_then(|rs| rs.row_container_reader())
            .is_some_and(|reader| !reader.is_exhausted());
        self.set_cursor_active(has_rows)
    }

    /// Attaches the cursor result set for subsequent fetches. The statement takes ownership and
    /// closes it on reset or close.
    ///
    /// Fails with [`Error::InvalidState`] if a result set is already attached.
    pub fn store_result_set(&mut self, result_set: Box<dyn CursorResultSet>) -> Result<(), Error> {
        self.ensure_open()?;
        if self.result_set.is_some() {
            return Err(Error::InvalidState(
                "statement already holds a result set",
            ));
        }
        self.result_set = Some(result_set);
        Ok(())
    }

    pub fn result_set(&self) -> Result<Option<&dyn CursorResultSet>, Error> {
        self.ensure_open()?;
        Ok(self.result_set.as_deref())
    }

    pub fn result_set_mut(
        &mut self,
    ) -> Result<Option<&mut (dyn CursorResultSet + 'static)>, Error> {
        self.ensure_open()?;
        Ok(self.result_set.as_deref_mut())
    }

    /// Detaches the stored result set without closing it. Ownership passes to the caller.
    pub fn take_result_set(&mut self) -> Result<Option<Box<dyn CursorResultSet>>, Error> {
        self.ensure_open()?;
        Ok(self.result_set.take())
    }

    /// Attaches the row container backing the cursor. It is not read through the statement (a
    /// reader is stored on the result set), but the statement is responsible for closing it.
    ///
    /// Fails with [`Error::InvalidState`] if a container is already attached.
    pub fn store_row_container(&mut self, container: RowContainer) -> Result<(), Error> {
        self.ensure_open()?;
        if self.row_container.is_some() {
            return Err(Error::InvalidState(
                "statement already holds a row container",
            ));
        }
        self.row_container = Some(container);
        Ok(())
    }

    pub fn row_container(&self) -> Result<Option<&RowContainer>, Error> {
        self.ensure_open()?;
        Ok(self.row_container.as_ref())
    }

    /// `true` while the statement has a cursor with unread rows.
    pub fn cursor_active(&self) -> Result<bool, Error> {
        self.ensure_open()?;
        Ok(self.cursor_active)
    }

    /// Marks the cursor as active or inactive. The caller driving fetches keeps the flag in sync
    /// with the reader.
    ///
    /// Activating fails with [`Error::InvalidState`] unless a row container is attached and the
    /// reader of the stored result set (if any) still has rows.
    pub fn set_cursor_active(&mut self, active: bool) -> Result<(), Error> {
        self.ensure_open()?;
        if active {
            if self.row_container.is_none() {
                return Err(Error::InvalidState(
                    "cursor can not be active without a row container",
                ));
            }
            let exhausted = self
                .result_set
                .as_ref()
                .and_then(|rs| rs.row_container_reader())
                .is_some_and(|reader| reader.is_exhausted());
            if exhausted {
                return Err(Error::InvalidState(
                    "cursor can not be active with an exhausted reader",
                ));
            }
        }
        self.cursor_active = active;
        Ok(())
    }

    /// Returns the statement to its just prepared state: closes result set, reader and row
    /// container, clears the bound parameters and deactivates the cursor. Declared parameter types
    /// are kept. Calling it again is a no-op.
    pub fn reset(&mut self) -> Result<(), Error> {
        self.ensure_open()?;
        for slot in &mut self.bound_params {
            slot.clear();
        }
        self.release_cursor()
    }

    /// Releases every resource of the statement and tells the engine to drop the plan. Every method
    /// except [`Self::id`] fails with [`Error::Closed`] afterwards, including `close` itself.
    pub fn close(&mut self) -> Result<(), Error> {
        self.ensure_open()?;
        self.closed = true;
        self.bound_params = Vec::new();
        let released = self.release_cursor();
        debug!("Closing prepared statement {}.", self.id);
        self.session
            .drop_prepared(self.plan.plan_id)
            .map_err(Error::execution)?;
        released
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// Releases the stored cursor, logging failures.
    pub(crate) fn discard_cursor(&mut self) {
        if self.result_set.is_none() && self.row_container.is_none() {
            return;
        }
        if let Err(e) = self.release_cursor() {
            warn!(
                "Failed to release previous cursor of statement {}: {e}",
                self.id
            );
        }
    }

    /// Closes reader, result set and container. Everything is released even if closing the result
    /// set fails, in which case that error is returned.
    fn release_cursor(&mut self) -> Result<(), Error> {
        self.cursor_active = false;
        let mut result = Ok(());
        if let Some(mut result_set) = self.result_set.take() {
            if let Some(reader) = result_set.row_container_reader_mut() {
                reader.close();
            }
            result = result_set.close();
        }
        if let Some(container) = self.row_container.take() {
            container.close();
        }
        result
    }

    fn check_param_types(&self, args: &[Datum]) -> Result<(), Error> {
        if self.params_type.is_empty() {
            return Ok(());
        }
        if self.params_type.len() != 2 * args.len() {
            return Err(Error::InvalidParamsType {
                len: self.params_type.len(),
                num_params: args.len(),
            });
        }
        for (index, (arg, declared)) in args
            .iter()
            .zip(self.params_type.chunks_exact(2))
            .enumerate()
        {
            let (code, flags) = (declared[0], declared[1]);
            let unsigned = flags & UNSIGNED_PARAM_FLAG != 0;
            let accepted =
                FieldKind::from_code(code).is_some_and(|kind| kind.accepts(arg, unsigned));
            if !accepted {
                return Err(Error::ParamTypeMismatch {
                    index,
                    declared: code,
                    actual: arg.kind_name().to_owned(),
                });
            }
        }
        Ok(())
    }

    fn ensure_open(&self) -> Result<(), Error> {
        if self.closed {
            Err(Error::Closed("prepared statement"))
        } else {
            Ok(())
        }
    }
}

impl Drop for PreparedStatement {
    fn drop(&mut self) {
        if self.closed {
            return;
        }
        if let Err(e) = self.close() {
            // Avoid flooding the log with secondary errors during a panic.
            if !panicking() {
                warn!("Failed to release prepared statement {}: {e}", self.id);
            }
        }
    }
}
