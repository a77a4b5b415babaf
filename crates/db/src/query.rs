use async_trait::async_trait;
use serde_json::{Map, Number, Value};
use sqlx::sqlite::{Sqlite, SqliteArguments, SqliteRow};
use sqlx::{Column, Row as _, TypeInfo, ValueRef};
use thiserror::Error;
use tracing::debug;

use crate::guard::{QueryGuard, RejectedQuery};
use crate::DbPool;

/// One result row keyed by column name.
pub type Row = Map<String, Value>;
/// Named parameters, referenced as `:name` in query text.
pub type QueryParams = Map<String, Value>;

#[derive(Debug, Error)]
pub enum DataAccessError {
    #[error("database connection failed: {0}")]
    Connection(String),
    #[error("query rejected: {0}")]
    Rejected(#[from] RejectedQuery),
    #[error("query execution failed: {0}")]
    Execution(String),
}

impl From<sqlx::Error> for DataAccessError {
    fn from(error: sqlx::Error) -> Self {
        match &error {
            sqlx::Error::PoolTimedOut
            | sqlx::Error::PoolClosed
            | sqlx::Error::WorkerCrashed
            | sqlx::Error::Io(_)
            | sqlx::Error::Tls(_)
            | sqlx::Error::Configuration(_) => Self::Connection(error.to_string()),
            _ => Self::Execution(error.to_string()),
        }
    }
}

#[async_trait]
pub trait DataAccess: Send + Sync {
    /// Validates, caps, binds and runs a read-only query. `row_limit` falls
    /// back to the guard policy default.
    async fn query(
        &self,
        sql: &str,
        params: &QueryParams,
        row_limit: Option<u32>,
    ) -> Result<Vec<Row>, DataAccessError>;
}

pub struct SqlDataAccess {
    pool: DbPool,
    guard: QueryGuard,
}

impl SqlDataAccess {
    pub fn new(pool: DbPool, guard: QueryGuard) -> Self {
        Self { pool, guard }
    }

    pub fn guard(&self) -> &QueryGuard {
        &self.guard
    }

    pub fn pool(&self) -> &DbPool {
        &self.pool
    }
}

#[async_trait]
impl DataAccess for SqlDataAccess {
    async fn query(
        &self,
        sql: &str,
        params: &QueryParams,
        row_limit: Option<u32>,
    ) -> Result<Vec<Row>, DataAccessError> {
        self.guard.validate(sql)?;

        let limit = row_limit.unwrap_or_else(|| self.guard.policy().default_row_limit());
        let capped = self.guard.enforce_row_cap(sql, limit);
        let prepared = bind_named_parameters(&capped, params)?;

        let mut query = sqlx::query(&prepared.sql);
        for value in prepared.values {
            query = bind_value(query, value);
        }

        let rows = query.fetch_all(&self.pool).await?;
        let mapped = rows.iter().map(decode_row).collect::<Result<Vec<_>, _>>()?;

        debug!(
            event_name = "db.query.executed",
            row_limit = limit,
            rows_count = mapped.len(),
            "guarded query executed"
        );
        Ok(mapped)
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct PreparedQuery {
    pub sql: String,
    pub values: Vec<Value>,
}

/// Rewrites `:name` placeholders to positional `?` and collects their values in
/// order of appearance. Text inside quotes and `::` casts is left untouched.
pub fn bind_named_parameters(
    sql: &str,
    params: &QueryParams,
) -> Result<PreparedQuery, DataAccessError> {
    let mut output = String::with_capacity(sql.len());
    let mut values = Vec::new();
    let mut quote: Option<char> = None;
    let mut chars = sql.chars().peekable();

    while let Some(ch) = chars.next() {
        if let Some(open) = quote {
            output.push(ch);
            if ch == open {
                quote = None;
            }
            continue;
        }

        match ch {
            '\'' | '"' => {
                quote = Some(ch);
                output.push(ch);
            }
            ':' if matches!(chars.peek(), Some(':')) => {
                output.push_str("::");
                chars.next();
            }
            ':' if chars.peek().is_some_and(|next| next.is_ascii_alphabetic() || *next == '_') => {
                let mut name = String::new();
                while let Some(next) = chars.peek().copied() {
                    if !(next.is_ascii_alphanumeric() || next == '_') {
                        break;
                    }
                    name.push(next);
                    chars.next();
                }

                let value = params.get(&name).ok_or_else(|| {
                    DataAccessError::Execution(format!("missing value for parameter `:{name}`"))
                })?;
                values.push(value.clone());
                output.push('?');
            }
            _ => output.push(ch),
        }
    }

    Ok(PreparedQuery { sql: output, values })
}

type SqliteQuery<'q> = sqlx::query::Query<'q, Sqlite, SqliteArguments<'q>>;

fn bind_value(query: SqliteQuery<'_>, value: Value) -> SqliteQuery<'_> {
    match value {
        Value::Null => query.bind(None::<String>),
        Value::Bool(flag) => query.bind(flag),
        Value::Number(number) => match number.as_i64() {
            Some(integer) => query.bind(integer),
            None => query.bind(number.as_f64().unwrap_or_default()),
        },
        Value::String(text) => query.bind(text),
        nested @ (Value::Array(_) | Value::Object(_)) => query.bind(nested.to_string()),
    }
}

fn decode_row(row: &SqliteRow) -> Result<Row, DataAccessError> {
    let mut mapped = Row::new();

    for column in row.columns() {
        let index = column.ordinal();
        let storage_class = {
            let raw = row.try_get_raw(index)?;
            if raw.is_null() {
                None
            } else {
                Some(raw.type_info().name().to_string())
            }
        };

        let value = match storage_class.as_deref() {
            None => Value::Null,
            Some("INTEGER") => Value::from(row.try_get::<i64, _>(index)?),
            Some("REAL") => {
                Number::from_f64(row.try_get::<f64, _>(index)?).map_or(Value::Null, Value::Number)
            }
            Some("BLOB") => Value::String(to_hex(&row.try_get::<Vec<u8>, _>(index)?)),
            Some(_) => Value::String(row.try_get::<String, _>(index)?),
        };

        mapped.insert(column.name().to_string(), value);
    }

    Ok(mapped)
}

fn to_hex(bytes: &[u8]) -> String {
    bytes.iter().map(|byte| format!("{byte:02x}")).collect()
}

#[cfg(test)]
mod tests {
    use copilot_core::config::RowCapStyle;
    use serde_json::{json, Value};
    use sqlx::sqlite::{SqliteConnectOptions, SqliteConnection};
    use sqlx::Connection;
    use tempfile::TempDir;

    use super::{bind_named_parameters, DataAccess, DataAccessError, QueryParams, SqlDataAccess};
    use crate::guard::{GuardPolicy, QueryGuard, RejectedQuery};
    use crate::{connect_with_settings, DbPool};

    async fn seeded_pool() -> (TempDir, DbPool) {
        let dir = TempDir::new().expect("temp dir");
        let path = dir.path().join("copilot.db");

        let options = SqliteConnectOptions::new().filename(&path).create_if_missing(true);
        let mut conn = SqliteConnection::connect_with(&options).await.expect("open seed db");
        sqlx::query(
            "CREATE TABLE promo (
                id INTEGER PRIMARY KEY,
                name TEXT NOT NULL,
                discount REAL,
                region TEXT,
                badge BLOB
            )",
        )
        .execute(&mut conn)
        .await
        .expect("create promo");
        sqlx::query("CREATE TABLE vendor (id INTEGER PRIMARY KEY, name TEXT NOT NULL)")
            .execute(&mut conn)
            .await
            .expect("create vendor");

        for (id, name, discount, region) in [
            (1_i64, "Spring Sale", 0.15_f64, Some("north")),
            (2, "Clearance", 0.40, Some("south")),
            (3, "Member Week", 0.10, None),
        ] {
            sqlx::query("INSERT INTO promo (id, name, discount, region) VALUES (?, ?, ?, ?)")
                .bind(id)
                .bind(name)
                .bind(discount)
                .bind(region)
                .execute(&mut conn)
                .await
                .expect("insert promo");
        }
        sqlx::query("UPDATE promo SET badge = x'cafe' WHERE id = 1")
            .execute(&mut conn)
            .await
            .expect("set badge");
        conn.close().await.expect("close seed connection");

        let url = format!("sqlite://{}", path.display());
        let pool = connect_with_settings(&url, 2, 5).await.expect("pool should connect");
        (dir, pool)
    }

    fn access(pool: DbPool, allowed: &[&str], default_limit: u32) -> SqlDataAccess {
        SqlDataAccess::new(
            pool,
            QueryGuard::new(GuardPolicy::new(allowed.iter().copied(), default_limit, RowCapStyle::Limit)),
        )
    }

    fn params(value: Value) -> QueryParams {
        value.as_object().cloned().unwrap_or_default()
    }

    #[tokio::test]
    async fn rows_are_mapped_by_column_name_in_result_order() {
        let (_dir, pool) = seeded_pool().await;
        let data = access(pool, &[], 500);

        let rows = data
            .query("SELECT id, name, discount, region FROM promo ORDER BY id", &QueryParams::new(), None)
            .await
            .expect("query should succeed");

        assert_eq!(rows.len(), 3);
        assert_eq!(rows[0]["id"], json!(1));
        assert_eq!(rows[0]["name"], json!("Spring Sale"));
        assert_eq!(rows[0]["discount"], json!(0.15));
        assert_eq!(rows[2]["region"], Value::Null);
        assert_eq!(
            rows.iter().map(|row| row["name"].clone()).collect::<Vec<_>>(),
            vec![json!("Spring Sale"), json!("Clearance"), json!("Member Week")]
        );
    }

    #[tokio::test]
    async fn named_parameters_are_bound() {
        let (_dir, pool) = seeded_pool().await;
        let data = access(pool, &["promo"], 500);

        let rows = data
            .query(
                "SELECT name FROM promo WHERE region = :region AND discount >= :min_discount",
                &params(json!({ "region": "south", "min_discount": 0.2 })),
                None,
            )
            .await
            .expect("query should succeed");

        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0]["name"], json!("Clearance"));
    }

    #[tokio::test]
    async fn default_and_explicit_row_caps_are_applied() {
        let (_dir, pool) = seeded_pool().await;
        let data = access(pool, &[], 2);

        let default_capped = data
            .query("SELECT id FROM promo ORDER BY id", &QueryParams::new(), None)
            .await
            .expect("default cap query");
        assert_eq!(default_capped.len(), 2);

        let explicit = data
            .query("SELECT id FROM promo ORDER BY id", &QueryParams::new(), Some(1))
            .await
            .expect("explicit cap query");
        assert_eq!(explicit.len(), 1);
    }

    #[tokio::test]
    async fn blobs_decode_as_hex() {
        let (_dir, pool) = seeded_pool().await;
        let data = access(pool, &[], 500);

        let rows = data
            .query("SELECT badge FROM promo WHERE id = :id", &params(json!({ "id": 1 })), None)
            .await
            .expect("blob query");
        assert_eq!(rows[0]["badge"], json!("cafe"));
    }

    #[tokio::test]
    async fn guard_rejections_propagate() {
        let (_dir, pool) = seeded_pool().await;
        let data = access(pool, &["promo"], 500);

        let write = data.query("DELETE FROM promo", &QueryParams::new(), None).await;
        assert!(matches!(write, Err(DataAccessError::Rejected(RejectedQuery::NotReadOnly))));

        let other_table = data.query("SELECT * FROM vendor", &QueryParams::new(), None).await;
        assert!(matches!(
            other_table,
            Err(DataAccessError::Rejected(RejectedQuery::DisallowedObject { ref object }))
                if object == "vendor"
        ));
    }

    #[tokio::test]
    async fn backend_faults_surface_as_execution_errors() {
        let (_dir, pool) = seeded_pool().await;
        let data = access(pool, &[], 500);

        let bad_column = data.query("SELECT missing_column FROM promo", &QueryParams::new(), None).await;
        assert!(matches!(bad_column, Err(DataAccessError::Execution(_))));

        let missing_param =
            data.query("SELECT * FROM promo WHERE id = :id", &QueryParams::new(), None).await;
        assert!(matches!(
            missing_param,
            Err(DataAccessError::Execution(ref message)) if message.contains(":id")
        ));
    }

    #[tokio::test]
    async fn closed_pool_surfaces_as_connection_error() {
        let (_dir, pool) = seeded_pool().await;
        pool.close().await;
        let data = access(pool, &[], 500);

        let result = data.query("SELECT id FROM promo", &QueryParams::new(), None).await;
        assert!(matches!(result, Err(DataAccessError::Connection(_))));
    }

    #[test]
    fn placeholders_inside_literals_and_casts_are_left_alone() {
        let prepared = bind_named_parameters(
            "SELECT ':skip' AS label, amount::text FROM promo WHERE id = :id OR code = :code",
            &params(json!({ "id": 3, "code": "X" })),
        )
        .expect("prepare");

        assert_eq!(
            prepared.sql,
            "SELECT ':skip' AS label, amount::text FROM promo WHERE id = ? OR code = ?"
        );
        assert_eq!(prepared.values, vec![json!(3), json!("X")]);
    }
}
