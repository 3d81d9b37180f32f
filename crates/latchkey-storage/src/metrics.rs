//! Monthly SQLite aggregate store.
//!
//! Every access event is mirrored into a database partitioned by calendar
//! month at `<base>/<YYYY>/<YYYY-MM>.db`, so a month can be archived or
//! deleted as a single file. The schema lives in `migrations/`.

use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use chrono::{DateTime, Datelike, Local};
use latchkey_core::{AccessEvent, EventType};
use serde::Serialize;
use sqlx::ConnectOptions;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions};
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::access_log::read_log_file;
use crate::aggregate::AggregateStore;
use crate::error::{StorageError, StorageResult};

/// Timestamp layout stored in the `ts` column; sorts lexically.
const TS_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.6f";

/// Calendar month key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct Month {
    pub year: i32,
    pub month: u32,
}

impl Month {
    pub fn new(year: i32, month: u32) -> StorageResult<Self> {
        if !(1..=12).contains(&month) {
            return Err(StorageError::InvalidData(format!(
                "month must be 1-12, got {month}"
            )));
        }
        Ok(Self { year, month })
    }

    pub fn of(at: &DateTime<Local>) -> Self {
        Self {
            year: at.year(),
            month: at.month(),
        }
    }

    fn label(&self) -> String {
        format!("{:04}-{:02}", self.year, self.month)
    }
}

/// Row of the `events` table.
#[derive(Debug, Clone, PartialEq, Eq, sqlx::FromRow, Serialize)]
pub struct StoredEvent {
    pub id: i64,
    pub ts: String,
    pub event_type: String,
    pub badge_id: Option<String>,
    pub status: String,
    pub raw_message: String,
}

/// Event counts for one month.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct MonthSummary {
    pub total: i64,
    pub by_type: BTreeMap<String, i64>,
    pub by_status: BTreeMap<String, i64>,
    pub unique_badges: i64,
}

/// Aggregate store with one SQLite database per month.
#[derive(Debug)]
pub struct MonthlyMetricsStore {
    base_dir: PathBuf,
    pools: Mutex<HashMap<Month, SqlitePool>>,
}

impl MonthlyMetricsStore {
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: base_dir.into(),
            pools: Mutex::new(HashMap::new()),
        }
    }

    /// Database file for `month`.
    pub fn database_path(&self, month: Month) -> PathBuf {
        self.base_dir
            .join(format!("{:04}", month.year))
            .join(format!("{}.db", month.label()))
    }

    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    async fn pool_for(&self, month: Month) -> StorageResult<SqlitePool> {
        let mut pools = self.pools.lock().await;
        if let Some(pool) = pools.get(&month) {
            return Ok(pool.clone());
        }

        let path = self.database_path(month);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| StorageError::io(parent, e))?;
        }

        let options = SqliteConnectOptions::from_str(&format!("sqlite://{}", path.display()))
            .map_err(|e| StorageError::Configuration(format!("Invalid database path: {e}")))?
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .busy_timeout(Duration::from_secs(5))
            .disable_statement_logging();

        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(options)
            .await?;
        sqlx::migrate!("./migrations").run(&pool).await?;
        info!(path = %path.display(), "Opened monthly metrics database");

        // Only the current month is written in steady state; release the rest.
        for (_, old) in pools.drain() {
            old.close().await;
        }
        pools.insert(month, pool.clone());
        Ok(pool)
    }

    /// Insert one event. Returns `false` if an identical event was already stored.
    pub async fn insert(&self, event: &AccessEvent) -> StorageResult<bool> {
        let pool = self.pool_for(Month::of(&event.timestamp)).await?;
        let badge_id =
            (event.event_type == EventType::BadgeScan).then_some(event.subject_id.as_str());

        let result = sqlx::query(
            r#"
            INSERT OR IGNORE INTO events (ts, event_type, badge_id, status, raw_message)
            VALUES (?, ?, ?, ?, ?)
            "#,
        )
        .bind(event.timestamp.format(TS_FORMAT).to_string())
        .bind(event.event_type.as_str())
        .bind(badge_id)
        .bind(event.status.as_str())
        .bind(&event.raw_message)
        .execute(&pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    /// Every event stored for `month`, oldest first.
    pub async fn events_for_month(&self, month: Month) -> StorageResult<Vec<StoredEvent>> {
        if !self.database_path(month).exists() {
            return Ok(Vec::new());
        }
        let pool = self.pool_for(month).await?;

        let events = sqlx::query_as::<_, StoredEvent>(
            r#"
            SELECT id, ts, event_type, badge_id, status, raw_message
            FROM events
            ORDER BY ts ASC, id ASC
            "#,
        )
        .fetch_all(&pool)
        .await?;

        Ok(events)
    }

    /// Count events for `month` by type and status.
    pub async fn summary(&self, month: Month) -> StorageResult<MonthSummary> {
        if !self.database_path(month).exists() {
            return Ok(MonthSummary::default());
        }
        let pool = self.pool_for(month).await?;

        let by_type: Vec<(String, i64)> =
            sqlx::query_as("SELECT event_type, COUNT(*) FROM events GROUP BY event_type")
                .fetch_all(&pool)
                .await?;
        let by_status: Vec<(String, i64)> =
            sqlx::query_as("SELECT status, COUNT(*) FROM events GROUP BY status")
                .fetch_all(&pool)
                .await?;
        let (unique_badges,): (i64,) = sqlx::query_as(
            "SELECT COUNT(DISTINCT badge_id) FROM events WHERE badge_id IS NOT NULL",
        )
        .fetch_one(&pool)
        .await?;

        let by_type: BTreeMap<_, _> = by_type.into_iter().collect();
        Ok(MonthSummary {
            total: by_type.values().sum(),
            by_type,
            by_status: by_status.into_iter().collect(),
            unique_badges,
        })
    }

    /// Backfill from a local JSON-lines access log file.
    ///
    /// Events already present are skipped, so a file can be ingested again
    /// after a partial run. Returns the number of newly inserted events.
    pub async fn ingest_log_file(&self, path: &Path) -> StorageResult<usize> {
        let events = read_log_file(path)?;
        let mut inserted = 0;
        for event in &events {
            if self.insert(event).await? {
                inserted += 1;
            }
        }
        debug!(
            path = %path.display(),
            read = events.len(),
            inserted,
            "Ingested access log into metrics store"
        );
        Ok(inserted)
    }

    /// Close every open database.
    pub async fn close(&self) {
        let mut pools = self.pools.lock().await;
        for (_, pool) in pools.drain() {
            pool.close().await;
        }
    }
}

impl AggregateStore for MonthlyMetricsStore {
    async fn record_event(&self, event: &AccessEvent) -> StorageResult<()> {
        self.insert(event).await.map(|_| ())
    }
}
