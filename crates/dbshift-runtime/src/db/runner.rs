use sqlx::any::{Any, AnyArguments, AnyRow};
use sqlx::AnyConnection;
use sqlx::pool::PoolConnection;
use sqlx::query::Query;
use sqlx::{Column as _, Row as _};
use tracing::{debug, warn};

use dbshift_core::db::{QueryFuture, QueryRunner, Row, Value};
use dbshift_core::dialect::Dialect;
use dbshift_core::error::{Result, ShiftError};

/// A [`QueryRunner`] over one pooled sqlx connection.
///
/// The connection is held until [`QueryRunner::release`] or drop, so every
/// statement of a run, including `BEGIN` and `COMMIT`, uses the same session.
pub struct SqlxQueryRunner {
    conn: Option<PoolConnection<Any>>,
    dialect: Dialect,
    transaction_active: bool,
}

impl SqlxQueryRunner {
    pub(crate) fn new(conn: PoolConnection<Any>, dialect: Dialect) -> Self {
        Self {
            conn: Some(conn),
            dialect,
            transaction_active: false,
        }
    }

    fn conn(&mut self) -> Result<&mut PoolConnection<Any>> {
        self.conn
            .as_mut()
            .ok_or_else(|| ShiftError::InvalidState("query runner already released".into()))
    }

    /// Execute a single statement without parameters.
    pub(crate) async fn run_raw(&mut self, sql: &str) -> Result<u64> {
        debug!(statement = %sql, "Executing");
        let conn: &mut AnyConnection = self.conn()?;
        let result = sqlx::query(sql)
            .execute(&mut *conn)
            .await
            .map_err(|e| ShiftError::statement(sql, e))?;
        Ok(result.rows_affected())
    }
}

impl QueryRunner for SqlxQueryRunner {
    fn dialect(&self) -> Dialect {
        self.dialect
    }

    fn query<'a>(&'a mut self, sql: &'a str, params: &'a [Value]) -> QueryFuture<'a, Vec<Row>> {
        Box::pin(async move {
            let conn: &mut AnyConnection = self.conn()?;
            let mut query = sqlx::query(sql);
            for value in params {
                query = bind(query, value);
            }
            let rows = query
                .fetch_all(&mut *conn)
                .await
                .map_err(|e| ShiftError::statement(sql, e))?;
            rows.iter().map(decode_row).collect()
        })
    }

    fn execute<'a>(&'a mut self, sql: &'a str) -> QueryFuture<'a, u64> {
        Box::pin(self.run_raw(sql))
    }

    fn start_transaction(&mut self) -> QueryFuture<'_, ()> {
        Box::pin(async move {
            if self.transaction_active {
                return Err(ShiftError::InvalidState("transaction already active".into()));
            }
            self.run_raw("BEGIN").await?;
            self.transaction_active = true;
            Ok(())
        })
    }

    fn commit_transaction(&mut self) -> QueryFuture<'_, ()> {
        Box::pin(async move {
            self.run_raw("COMMIT").await?;
            self.transaction_active = false;
            Ok(())
        })
    }

    fn rollback_transaction(&mut self) -> QueryFuture<'_, ()> {
        Box::pin(async move {
            // The session is out of the transaction even if ROLLBACK reports
            // an error, e.g. after the server already aborted it.
            self.transaction_active = false;
            self.run_raw("ROLLBACK").await?;
            Ok(())
        })
    }

    fn is_transaction_active(&self) -> bool {
        self.transaction_active
    }

    fn release(&mut self) -> QueryFuture<'_, ()> {
        Box::pin(async move {
            if self.transaction_active {
                if let Err(e) = self.rollback_transaction().await {
                    warn!(error = %e, "Rollback on release failed");
                }
            }
            self.conn = None;
            Ok(())
        })
    }
}

impl Drop for SqlxQueryRunner {
    fn drop(&mut self) {
        if self.transaction_active {
            if let Some(conn) = self.conn.as_mut() {
                conn.close_on_drop();
            }
        }
    }
}

fn bind<'q>(
    query: Query<'q, Any, AnyArguments<'q>>,
    value: &Value,
) -> Query<'q, Any, AnyArguments<'q>> {
    match value {
        Value::Null => query.bind(Option::<String>::None),
        Value::Bool(b) => query.bind(*b),
        Value::Int(i) => query.bind(*i),
        Value::Float(f) => query.bind(*f),
        Value::Text(s) => query.bind(s.clone()),
        Value::Bytes(b) => query.bind(b.clone()),
    }
}

/// Decode a driver row into dialect-neutral values. Cells are tried from the
/// most to the least specific type.
fn decode_row(row: &AnyRow) -> Result<Row> {
    let mut columns = Vec::with_capacity(row.len());
    let mut values = Vec::with_capacity(row.len());
    for (i, column) in row.columns().iter().enumerate() {
        columns.push(column.name().to_string());
        values.push(decode_cell(row, i)?);
    }
    Ok(Row::new(columns, values))
}

fn decode_cell(row: &AnyRow, i: usize) -> Result<Value> {
    if let Ok(v) = row.try_get::<Option<i64>, _>(i) {
        return Ok(v.map(Value::Int).unwrap_or(Value::Null));
    }
    if let Ok(v) = row.try_get::<f64, _>(i) {
        return Ok(Value::Float(v));
    }
    if let Ok(v) = row.try_get::<bool, _>(i) {
        return Ok(Value::Bool(v));
    }
    if let Ok(v) = row.try_get::<String, _>(i) {
        return Ok(Value::Text(v));
    }
    row.try_get::<Vec<u8>, _>(i)
        .map(Value::Bytes)
        .map_err(|e| ShiftError::Database(format!("Cannot decode column {}: {}", i, e)))
}
