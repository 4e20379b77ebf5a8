//! In-memory `QueryRunner` for unit tests.
//!
//! Records every statement, serves canned rows for queries matching a regex
//! and fails statements matching a regex. Clones share state, so a test can
//! hand one clone to the code under test and inspect another.

use std::sync::{Arc, Mutex};

use regex_lite::Regex;

use crate::db::{QueryFuture, QueryRunner, Row, Value};
use crate::dialect::Dialect;
use crate::error::{Result, ShiftError};

/// Marker recorded for `start_transaction`.
pub const BEGIN: &str = "BEGIN";
/// Marker recorded for `commit_transaction`.
pub const COMMIT: &str = "COMMIT";
/// Marker recorded for `rollback_transaction`.
pub const ROLLBACK: &str = "ROLLBACK";

/// Mock query runner.
///
/// # Example
///
/// ```ignore
/// let mock = MockQueryRunner::new(Dialect::Postgres);
/// mock.on_query("FROM \"migrations\"", vec![]);
/// mock.fail_on("DROP TABLE", "permission denied");
///
/// let mut runner = mock.clone();
/// do_work(&mut runner).await?;
/// mock.assert_executed("CREATE TABLE");
/// ```
#[derive(Clone)]
pub struct MockQueryRunner {
    dialect: Dialect,
    state: Arc<Mutex<MockState>>,
}

#[derive(Default)]
struct MockState {
    responses: Vec<(Regex, Vec<Row>)>,
    failures: Vec<(Regex, String)>,
    log: Vec<String>,
    transaction_active: bool,
    released: bool,
}

impl MockQueryRunner {
    /// Create a new mock speaking the given dialect.
    pub fn new(dialect: Dialect) -> Self {
        Self {
            dialect,
            state: Arc::new(Mutex::new(MockState::default())),
        }
    }

    /// Serve `rows` for queries matching `pattern`. Earlier registrations win.
    pub fn on_query(&self, pattern: &str, rows: Vec<Row>) {
        let re = Regex::new(pattern).unwrap();
        self.state.lock().unwrap().responses.push((re, rows));
    }

    /// Fail statements matching `pattern` with `message`.
    pub fn fail_on(&self, pattern: &str, message: &str) {
        let re = Regex::new(pattern).unwrap();
        self.state
            .lock()
            .unwrap()
            .failures
            .push((re, message.to_string()));
    }

    /// Stop failing statements.
    pub fn clear_failures(&self) {
        self.state.lock().unwrap().failures.clear();
    }

    /// Every statement and transaction marker, in order.
    pub fn statements(&self) -> Vec<String> {
        self.state.lock().unwrap().log.clone()
    }

    /// Statements matching `pattern`.
    pub fn statements_matching(&self, pattern: &str) -> Vec<String> {
        let re = Regex::new(pattern).unwrap();
        self.statements()
            .into_iter()
            .filter(|s| re.is_match(s))
            .collect()
    }

    pub fn clear_statements(&self) {
        self.state.lock().unwrap().log.clear();
    }

    pub fn is_released(&self) -> bool {
        self.state.lock().unwrap().released
    }

    /// Assert that a statement matching `pattern` ran.
    pub fn assert_executed(&self, pattern: &str) {
        assert!(
            !self.statements_matching(pattern).is_empty(),
            "Expected a statement matching '{}', recorded: {:?}",
            pattern,
            self.statements()
        );
    }

    /// Assert that no statement matching `pattern` ran.
    pub fn assert_not_executed(&self, pattern: &str) {
        let matching = self.statements_matching(pattern);
        assert!(
            matching.is_empty(),
            "Expected no statement matching '{}', found {:?}",
            pattern,
            matching
        );
    }

    fn record(&self, sql: &str) -> Result<Vec<Row>> {
        let mut state = self.state.lock().unwrap();
        if state.released {
            return Err(ShiftError::InvalidState(
                "query runner already released".into(),
            ));
        }
        state.log.push(sql.to_string());
        if let Some((_, message)) = state.failures.iter().find(|(re, _)| re.is_match(sql)) {
            return Err(ShiftError::statement(sql, message));
        }
        Ok(state
            .responses
            .iter()
            .find(|(re, _)| re.is_match(sql))
            .map(|(_, rows)| rows.clone())
            .unwrap_or_default())
    }

    fn set_transaction(&self, marker: &str, active: bool) -> Result<()> {
        self.record(marker)?;
        self.state.lock().unwrap().transaction_active = active;
        Ok(())
    }
}

impl QueryRunner for MockQueryRunner {
    fn dialect(&self) -> Dialect {
        self.dialect
    }

    fn query<'a>(&'a mut self, sql: &'a str, _params: &'a [Value]) -> QueryFuture<'a, Vec<Row>> {
        Box::pin(async move { self.record(sql) })
    }

    fn execute<'a>(&'a mut self, sql: &'a str) -> QueryFuture<'a, u64> {
        Box::pin(async move { self.record(sql).map(|_| 0) })
    }

    fn start_transaction(&mut self) -> QueryFuture<'_, ()> {
        Box::pin(async move {
            if self.is_transaction_active() {
                return Err(ShiftError::InvalidState("transaction already active".into()));
            }
            self.set_transaction(BEGIN, true)
        })
    }

    fn commit_transaction(&mut self) -> QueryFuture<'_, ()> {
        Box::pin(async move { self.set_transaction(COMMIT, false) })
    }

    fn rollback_transaction(&mut self) -> QueryFuture<'_, ()> {
        Box::pin(async move { self.set_transaction(ROLLBACK, false) })
    }

    fn is_transaction_active(&self) -> bool {
        self.state.lock().unwrap().transaction_active
    }

    fn release(&mut self) -> QueryFuture<'_, ()> {
        Box::pin(async move {
            self.state.lock().unwrap().released = true;
            Ok(())
        })
    }
}
