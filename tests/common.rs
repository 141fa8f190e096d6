//! In memory engine answering canned queries. Shared by the integration tests.
#![allow(dead_code)]

use std::{
    collections::HashMap,
    sync::{
        Arc, Mutex,
        atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering},
    },
};

use stmt_cursor::{
    CancelHandle, Chunk, ExecContext, FetchNotifier, Row,
    engine::{
        Engine, EngineError, PreparedPlan, RecordSet, Session, SessionConfig, SessionOpenError,
    },
    types::{ColumnInfo, Datum, FieldKind, FieldType},
};

/// Statement text the engine fails to prepare.
pub const SYNTAX_ERROR: &str = "SELEC oops";
/// Statement which prepares fine, but fails during execution.
pub const FAILING_QUERY: &str = "SELECT * FROM broken";
/// Statement which fails while its rows are produced.
pub const FAILING_SCAN: &str = "SELECT * FROM flaky";
/// Database the engine does not know.
pub const MISSING_DB: &str = "missing";

pub fn init() {
    // Set environment to something like:
    // RUST_LOG=stmt_cursor=debug cargo test
    let _ = env_logger::builder().is_test(true).try_init();
}

/// Rows returned by a query.
#[derive(Clone, Debug)]
pub struct Canned {
    pub columns: Vec<ColumnInfo>,
    pub rows: Vec<Row>,
}

impl Canned {
    /// Table of `(id BIGINT, name VARCHAR)` with `num_rows` rows.
    pub fn people(num_rows: i64) -> Self {
        Self {
            columns: vec![
                ColumnInfo::new("id", FieldType::new(FieldKind::LongLong)),
                ColumnInfo::new("name", FieldType::new(FieldKind::VarString)),
            ],
            rows: (0..num_rows)
                .map(|i| vec![Datum::Int(i), Datum::from(format!("person {i}").as_str())])
                .collect(),
        }
    }
}

/// How the engine reacts to requests for a new session.
#[derive(Clone, Debug)]
pub enum Refusal {
    Auth(String),
    Connection(String),
}

/// Observations of the sessions opened by a [`MockEngine`], plus switches changing the behaviour
/// of record sets created afterwards.
#[derive(Default)]
pub struct EngineLog {
    /// Record sets fail once they produced their first chunk.
    pub fail_scans: AtomicBool,
    /// Canceled by the next record set right after it produced its first chunk.
    pub cancel_after_first_chunk: Mutex<Option<CancelHandle>>,
    pub configs: Mutex<Vec<SessionConfig>>,
    pub collations: Mutex<Vec<u8>>,
    pub databases: Mutex<Vec<String>>,
    pub executions: Mutex<Vec<Vec<Datum>>>,
    pub dropped_plans: Mutex<Vec<u64>>,
    pub closed_record_sets: AtomicUsize,
    pub closed_sessions: AtomicUsize,
}

/// Counts completed cursor fetches. Optionally fails every notification.
#[derive(Default)]
pub struct CountingNotifier {
    pub calls: AtomicUsize,
    pub fail: AtomicBool,
}

impl FetchNotifier for CountingNotifier {
    fn on_fetch_returned(&self) -> Result<(), EngineError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail.load(Ordering::SeqCst) {
            Err("lock table unavailable".into())
        } else {
            Ok(())
        }
    }
}

#[derive(Default)]
pub struct MockEngine {
    queries: HashMap<String, Canned>,
    refusal: Option<Refusal>,
    notifier: Option<Arc<CountingNotifier>>,
    pub log: Arc<EngineLog>,
}

impl MockEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Answer `sql` with `canned`.
    pub fn with_query(mut self, sql: &str, canned: Canned) -> Self {
        self.queries.insert(sql.to_owned(), canned);
        self
    }

    pub fn refusing(mut self, refusal: Refusal) -> Self {
        self.refusal = Some(refusal);
        self
    }

    /// Every record set produced by the engine reports to `notifier`.
    pub fn with_notifier(mut self, notifier: Arc<CountingNotifier>) -> Self {
        self.notifier = Some(notifier);
        self
    }
}

impl Engine for MockEngine {
    fn open_session(&self, config: &SessionConfig) -> Result<Arc<dyn Session>, SessionOpenError> {
        match &self.refusal {
            Some(Refusal::Auth(message)) => {
                return Err(SessionOpenError::Auth {
                    message: message.clone(),
                });
            }
            Some(Refusal::Connection(message)) => {
                return Err(SessionOpenError::Connection(message.clone().into()));
            }
            None => (),
        }
        self.log.configs.lock().unwrap().push(config.clone());
        Ok(Arc::new(MockSession {
            queries: self.queries.clone(),
            notifier: self.notifier.clone(),
            log: self.log.clone(),
            next_plan: AtomicU64::new(100),
            plans: Mutex::new(HashMap::new()),
        }))
    }
}

struct MockSession {
    queries: HashMap<String, Canned>,
    notifier: Option<Arc<CountingNotifier>>,
    log: Arc<EngineLog>,
    next_plan: AtomicU64,
    plans: Mutex<HashMap<u64, String>>,
}

impl Session for MockSession {
    fn set_collation(&self, collation: u8) -> Result<(), EngineError> {
        self.log.collations.lock().unwrap().push(collation);
        Ok(())
    }

    fn use_database(&self, dbname: &str) -> Result<(), EngineError> {
        if dbname == MISSING_DB {
            return Err(format!("Unknown database '{dbname}'").into());
        }
        self.log.databases.lock().unwrap().push(dbname.to_owned());
        Ok(())
    }

    fn prepare(&self, sql: &str) -> Result<PreparedPlan, EngineError> {
        if sql == SYNTAX_ERROR {
            return Err("You have an error in your SQL syntax".into());
        }
        let plan_id = self.next_plan.fetch_add(1, Ordering::SeqCst);
        self.plans.lock().unwrap().insert(plan_id, sql.to_owned());
        Ok(PreparedPlan {
            plan_id,
            num_params: sql.matches('?').count(),
            columns: self
                .queries
                .get(sql)
                .map(|canned| canned.columns.clone())
                .unwrap_or_default(),
        })
    }

    fn execute_prepared(
        &self,
        _ctx: &ExecContext,
        plan_id: u64,
        args: &[Datum],
    ) -> Result<Option<Box<dyn RecordSet>>, EngineError> {
        let sql = self
            .plans
            .lock()
            .unwrap()
            .get(&plan_id)
            .cloned()
            .ok_or("unknown plan")?;
        if sql == FAILING_QUERY {
            return Err("table 'broken' is corrupt".into());
        }
        self.log.executions.lock().unwrap().push(args.to_vec());
        let Some(canned) = self.queries.get(&sql) else {
            return Ok(None);
        };
        Ok(Some(Box::new(MockRecordSet {
            rows: canned.rows.clone().into_iter(),
            fail_after_first_chunk: sql == FAILING_SCAN
                || self.log.fail_scans.load(Ordering::SeqCst),
            chunks_produced: 0,
            notifier: self.notifier.clone(),
            log: self.log.clone(),
        })))
    }

    fn drop_prepared(&self, plan_id: u64) -> Result<(), EngineError> {
        self.plans.lock().unwrap().remove(&plan_id);
        self.log.dropped_plans.lock().unwrap().push(plan_id);
        Ok(())
    }

    fn close(&self) {
        self.log.closed_sessions.fetch_add(1, Ordering::SeqCst);
    }
}

struct MockRecordSet {
    rows: std::vec::IntoIter<Row>,
    fail_after_first_chunk: bool,
    chunks_produced: usize,
    notifier: Option<Arc<CountingNotifier>>,
    log: Arc<EngineLog>,
}

impl RecordSet for MockRecordSet {
    fn next(&mut self, ctx: &ExecContext, chunk: &mut Chunk) -> Result<(), EngineError> {
        if self.fail_after_first_chunk && self.chunks_produced > 0 {
            return Err("storage node went away".into());
        }
        while !chunk.is_full() {
            if ctx.is_canceled() {
                return Err("query interrupted".into());
            }
            match self.rows.next() {
                Some(row) => chunk.append_row(row),
                None => break,
            }
        }
        self.chunks_produced += 1;
        if let Some(handle) = self.log.cancel_after_first_chunk.lock().unwrap().take() {
            handle.cancel();
        }
        Ok(())
    }

    fn close(&mut self) -> Result<(), EngineError> {
        self.log.closed_record_sets.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn fetch_notifier(&self) -> Option<&dyn FetchNotifier> {
        self.notifier
            .as_deref()
            .map(|notifier| notifier as &dyn FetchNotifier)
    }
}
