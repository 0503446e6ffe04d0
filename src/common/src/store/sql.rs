use std::path::Path;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::{PgPoolOptions, PgRow};
use sqlx::sqlite::{SqlitePoolOptions, SqliteRow};
use sqlx::{PgPool, Row, SqlitePool, query};

use super::{BucketStore, StoreError, StoreResult};
use crate::config::DatabaseConfig;
use crate::interval::Interval;
use crate::model::{Bucket, BucketDate, DateRepresentation, Measurement};

/// Bucket store backed by PostgreSQL or SQLite.
///
/// Calendar dates are `TIMESTAMPTZ` in PostgreSQL and integer microseconds
/// since the epoch in SQLite. Epoch dates are `BIGINT` in both. Measurements are stored as JSON text.
#[derive(Debug, Clone)]
pub enum SqlBucketStore {
    Postgres(PgPool),
    Sqlite(SqlitePool),
}

/// Calendar date column value in SQLite. Integers order correctly across the
/// whole chrono range, including years past 9999.
fn sqlite_instant(instant: &DateTime<Utc>) -> i64 {
    instant.timestamp_micros()
}

fn encode_measurements(measurements: &[Measurement]) -> StoreResult<String> {
    serde_json::to_string(measurements).map_err(|e| StoreError::Corrupt {
        collection: "measurements",
        message: e.to_string(),
    })
}

fn decode_measurements(
    representation: DateRepresentation,
    text: &str,
) -> StoreResult<Vec<Measurement>> {
    serde_json::from_str(text).map_err(|e| StoreError::Corrupt {
        collection: representation.collection(),
        message: e.to_string(),
    })
}

fn decode_sqlite_row(representation: DateRepresentation, row: &SqliteRow) -> StoreResult<Bucket> {
    let corrupt = |e: sqlx::Error| StoreError::Corrupt {
        collection: representation.collection(),
        message: e.to_string(),
    };

    let id: i64 = row.try_get("id").map_err(corrupt)?;
    let date = match representation {
        DateRepresentation::Calendar => {
            let micros: i64 = row.try_get("date").map_err(corrupt)?;
            let instant =
                DateTime::from_timestamp_micros(micros).ok_or_else(|| StoreError::Corrupt {
                    collection: representation.collection(),
                    message: format!("date {micros} out of range"),
                })?;
            BucketDate::Calendar(instant)
        }
        DateRepresentation::Epoch => BucketDate::Epoch(row.try_get("date").map_err(corrupt)?),
    };
    let measurements: String = row.try_get("measurements").map_err(corrupt)?;

    Ok(Bucket {
        id: Some(id),
        date,
        measurements: decode_measurements(representation, &measurements)?,
    })
}

fn decode_pg_row(representation: DateRepresentation, row: &PgRow) -> StoreResult<Bucket> {
    let corrupt = |e: sqlx::Error| StoreError::Corrupt {
        collection: representation.collection(),
        message: e.to_string(),
    };

    let id: i64 = row.try_get("id").map_err(corrupt)?;
    let date = match representation {
        DateRepresentation::Calendar => {
            BucketDate::Calendar(row.try_get::<DateTime<Utc>, _>("date").map_err(corrupt)?)
        }
        DateRepresentation::Epoch => BucketDate::Epoch(row.try_get("date").map_err(corrupt)?),
    };
    let measurements: String = row.try_get("measurements").map_err(corrupt)?;

    Ok(Bucket {
        id: Some(id),
        date,
        measurements: decode_measurements(representation, &measurements)?,
    })
}

impl SqlBucketStore {
    /// Connect to the database named by the DSN and initialize the schema.
    pub async fn connect(config: &DatabaseConfig) -> StoreResult<Self> {
        let dsn = config.dsn.as_str();
        log::info!("Connecting to bucket store with DSN: {dsn}");

        let store = if dsn.starts_with("sqlite:") {
            let in_memory = dsn.contains(":memory:");
            if !in_memory {
                ensure_parent_dir(dsn).await?;
            }

            // Add mode=rwc to create the database file if it doesn't exist
            let dsn_with_create = if dsn.contains('?') {
                if dsn.contains("mode=") {
                    dsn.to_string()
                } else {
                    format!("{dsn}&mode=rwc")
                }
            } else {
                format!("{dsn}?mode=rwc")
            };

            // Every connection to `:memory:` opens a fresh database, so keep
            // exactly one alive for the lifetime of the pool
            let options = if in_memory {
                SqlitePoolOptions::new()
                    .max_connections(1)
                    .min_connections(1)
                    .idle_timeout(None)
                    .max_lifetime(None)
            } else {
                SqlitePoolOptions::new().max_connections(config.max_connections)
            };

            let pool = options
                .acquire_timeout(config.acquire_timeout)
                .connect(&dsn_with_create)
                .await
                .map_err(|e| {
                    log::error!(
                        "Failed to connect to SQLite database with DSN '{dsn_with_create}': {e}"
                    );
                    StoreError::from(e)
                })?;
            SqlBucketStore::Sqlite(pool)
        } else {
            let pool = PgPoolOptions::new()
                .max_connections(config.max_connections)
                .acquire_timeout(config.acquire_timeout)
                .connect(dsn)
                .await
                .map_err(|e| {
                    log::error!("Failed to connect to PostgreSQL database with DSN '{dsn}': {e}");
                    StoreError::from(e)
                })?;
            SqlBucketStore::Postgres(pool)
        };

        store.init().await.map_err(|e| {
            log::error!("Failed to initialize bucket schema: {e}");
            e
        })?;
        log::info!("Bucket store schema initialized successfully");
        Ok(store)
    }

    /// Create bucket tables if they do not exist.
    async fn init(&self) -> StoreResult<()> {
        match self {
            SqlBucketStore::Sqlite(pool) => {
                let create_buckets = r#"
                CREATE TABLE IF NOT EXISTS buckets (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    date INTEGER NOT NULL,
                    measurements TEXT NOT NULL
                )"#;
                query(create_buckets).execute(pool).await?;

                let create_buckets_unix = r#"
                CREATE TABLE IF NOT EXISTS buckets_unix (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    date INTEGER NOT NULL,
                    measurements TEXT NOT NULL
                )"#;
                query(create_buckets_unix).execute(pool).await?;

                query("CREATE INDEX IF NOT EXISTS buckets_date_idx ON buckets (date)")
                    .execute(pool)
                    .await?;
                query("CREATE INDEX IF NOT EXISTS buckets_unix_date_idx ON buckets_unix (date)")
                    .execute(pool)
                    .await?;
            }
            SqlBucketStore::Postgres(pool) => {
                let create_buckets = r#"
                CREATE TABLE IF NOT EXISTS buckets (
                    id BIGSERIAL PRIMARY KEY,
                    date TIMESTAMPTZ NOT NULL,
                    measurements TEXT NOT NULL
                )"#;
                query(create_buckets).execute(pool).await?;

                let create_buckets_unix = r#"
                CREATE TABLE IF NOT EXISTS buckets_unix (
                    id BIGSERIAL PRIMARY KEY,
                    date BIGINT NOT NULL,
                    measurements TEXT NOT NULL
                )"#;
                query(create_buckets_unix).execute(pool).await?;

                query("CREATE INDEX IF NOT EXISTS buckets_date_idx ON buckets (date)")
                    .execute(pool)
                    .await?;
                query("CREATE INDEX IF NOT EXISTS buckets_unix_date_idx ON buckets_unix (date)")
                    .execute(pool)
                    .await?;
            }
        }

        Ok(())
    }
}

/// Create the directory holding a file-backed SQLite database.
async fn ensure_parent_dir(dsn: &str) -> StoreResult<()> {
    let path = dsn
        .trim_start_matches("sqlite://")
        .trim_start_matches("sqlite:");
    let path = path.split('?').next().unwrap_or(path);

    if let Some(parent) = Path::new(path).parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent).await.map_err(|e| {
            StoreError::Unavailable(format!(
                "cannot create database directory {}: {e}",
                parent.display()
            ))
        })?;
    }
    Ok(())
}

#[async_trait]
impl BucketStore for SqlBucketStore {
    async fn find_in_range(
        &self,
        representation: DateRepresentation,
        interval: &Interval,
    ) -> StoreResult<Vec<Bucket>> {
        let table = representation.collection();

        match self {
            SqlBucketStore::Sqlite(pool) => {
                let stmt = format!(
                    "SELECT id, date, measurements FROM {table} \
                     WHERE date >= ? AND date < ? ORDER BY date, id"
                );
                let rows = match representation {
                    DateRepresentation::Calendar => {
                        query(&stmt)
                            .bind(sqlite_instant(&interval.start))
                            .bind(sqlite_instant(&interval.end))
                            .fetch_all(pool)
                            .await?
                    }
                    DateRepresentation::Epoch => {
                        let epoch = interval.to_epoch();
                        query(&stmt)
                            .bind(epoch.start_ms)
                            .bind(epoch.end_ms)
                            .fetch_all(pool)
                            .await?
                    }
                };
                rows.iter()
                    .map(|row| decode_sqlite_row(representation, row))
                    .collect()
            }
            SqlBucketStore::Postgres(pool) => {
                let stmt = format!(
                    "SELECT id, date, measurements FROM {table} \
                     WHERE date >= $1 AND date < $2 ORDER BY date, id"
                );
                let rows = match representation {
                    DateRepresentation::Calendar => {
                        query(&stmt)
                            .bind(interval.start)
                            .bind(interval.end)
                            .fetch_all(pool)
                            .await?
                    }
                    DateRepresentation::Epoch => {
                        let epoch = interval.to_epoch();
                        query(&stmt)
                            .bind(epoch.start_ms)
                            .bind(epoch.end_ms)
                            .fetch_all(pool)
                            .await?
                    }
                };
                rows.iter()
                    .map(|row| decode_pg_row(representation, row))
                    .collect()
            }
        }
    }

    async fn insert(&self, mut bucket: Bucket) -> StoreResult<Bucket> {
        let table = bucket.representation().collection();
        let measurements = encode_measurements(&bucket.measurements)?;

        let id = match self {
            SqlBucketStore::Sqlite(pool) => {
                let stmt = format!("INSERT INTO {table} (date, measurements) VALUES (?, ?)");
                let insert = match bucket.date {
                    BucketDate::Calendar(instant) => query(&stmt).bind(sqlite_instant(&instant)),
                    BucketDate::Epoch(millis) => query(&stmt).bind(millis),
                };
                insert
                    .bind(measurements)
                    .execute(pool)
                    .await?
                    .last_insert_rowid()
            }
            SqlBucketStore::Postgres(pool) => {
                let stmt = format!(
                    "INSERT INTO {table} (date, measurements) VALUES ($1, $2) RETURNING id"
                );
                let insert = match bucket.date {
                    BucketDate::Calendar(instant) => query(&stmt).bind(instant),
                    BucketDate::Epoch(millis) => query(&stmt).bind(millis),
                };
                let row = insert.bind(measurements).fetch_one(pool).await?;
                row.try_get::<i64, _>("id")?
            }
        };

        bucket.id = Some(id);
        Ok(bucket)
    }

    async fn delete_in_range(
        &self,
        representation: DateRepresentation,
        interval: &Interval,
    ) -> StoreResult<u64> {
        let table = representation.collection();

        let result = match self {
            SqlBucketStore::Sqlite(pool) => {
                let stmt = format!("DELETE FROM {table} WHERE date >= ? AND date < ?");
                match representation {
                    DateRepresentation::Calendar => {
                        query(&stmt)
                            .bind(sqlite_instant(&interval.start))
                            .bind(sqlite_instant(&interval.end))
                            .execute(pool)
                            .await?
                            .rows_affected()
                    }
                    DateRepresentation::Epoch => {
                        let epoch = interval.to_epoch();
                        query(&stmt)
                            .bind(epoch.start_ms)
                            .bind(epoch.end_ms)
                            .execute(pool)
                            .await?
                            .rows_affected()
                    }
                }
            }
            SqlBucketStore::Postgres(pool) => {
                let stmt = format!("DELETE FROM {table} WHERE date >= $1 AND date < $2");
                match representation {
                    DateRepresentation::Calendar => {
                        query(&stmt)
                            .bind(interval.start)
                            .bind(interval.end)
                            .execute(pool)
                            .await?
                            .rows_affected()
                    }
                    DateRepresentation::Epoch => {
                        let epoch = interval.to_epoch();
                        query(&stmt)
                            .bind(epoch.start_ms)
                            .bind(epoch.end_ms)
                            .execute(pool)
                            .await?
                            .rows_affected()
                    }
                }
            }
        };

        Ok(result)
    }

    async fn count(&self, representation: DateRepresentation) -> StoreResult<u64> {
        let stmt = format!("SELECT COUNT(*) AS n FROM {}", representation.collection());
        let n: i64 = match self {
            SqlBucketStore::Sqlite(pool) => query(&stmt).fetch_one(pool).await?.try_get("n")?,
            SqlBucketStore::Postgres(pool) => query(&stmt).fetch_one(pool).await?.try_get("n")?,
        };
        Ok(n as u64)
    }

    async fn close(&self) {
        match self {
            SqlBucketStore::Sqlite(pool) => pool.close().await,
            SqlBucketStore::Postgres(pool) => pool.close().await,
        }
        log::info!("Bucket store connections closed");
    }
}
