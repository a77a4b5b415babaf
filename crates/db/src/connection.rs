use std::time::Duration;

use sqlx::sqlite::SqlitePoolOptions;

pub type DbPool = sqlx::SqlitePool;

/// Opens the shared read-only pool. Every connection runs with `query_only`
/// so the backend refuses writes even if a statement slips past the guard.
pub async fn connect_with_settings(
    database_url: &str,
    max_connections: u32,
    timeout_secs: u64,
) -> Result<DbPool, sqlx::Error> {
    SqlitePoolOptions::new()
        .max_connections(max_connections.max(1))
        .acquire_timeout(Duration::from_secs(timeout_secs.max(1)))
        .after_connect(|conn, _meta| {
            Box::pin(async move {
                sqlx::query("PRAGMA busy_timeout = 5000").execute(&mut *conn).await?;
                sqlx::query("PRAGMA query_only = ON").execute(&mut *conn).await?;
                Ok(())
            })
        })
        .connect(database_url)
        .await
}

/// Round-trips `SELECT 1` on one pooled connection.
pub async fn probe(pool: &DbPool) -> Result<(), sqlx::Error> {
    sqlx::query_scalar::<_, i64>("SELECT 1").fetch_one(pool).await.map(|_| ())
}

#[cfg(test)]
mod tests {
    use super::{connect_with_settings, probe};

    #[tokio::test]
    async fn pooled_connections_refuse_writes() {
        let pool = connect_with_settings("sqlite::memory:", 1, 5).await.expect("pool should connect");

        let result = sqlx::query("CREATE TABLE promo (id INTEGER)").execute(&pool).await;
        assert!(result.is_err(), "query_only connections must reject DDL");

        let (one,): (i64,) = sqlx::query_as("SELECT 1").fetch_one(&pool).await.expect("select");
        assert_eq!(one, 1);

        pool.close().await;
    }

    #[tokio::test]
    async fn probe_fails_once_the_pool_is_closed() {
        let pool = connect_with_settings("sqlite::memory:", 1, 5).await.expect("pool should connect");
        assert!(probe(&pool).await.is_ok());

        pool.close().await;
        assert!(matches!(probe(&pool).await, Err(sqlx::Error::PoolClosed)));
    }
}
