//! SQLite store

use crate::{ClaimOutcome, ScoreInsert, StorageError, TripStore};
use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions, SqliteRow};
use sqlx::{Row, SqliteConnection};
use std::str::FromStr;
use std::time::Duration;
use tracing::{debug, info};
use trip_model::{DriverScore, Trip, TripMetrics, TripStatus};
use uuid::Uuid;

/// How long a writer waits for another connection's write lock
const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

const SCHEMA: [&str; 3] = [
    r#"
    CREATE TABLE IF NOT EXISTS trips (
        id TEXT PRIMARY KEY,
        vehicle_id TEXT NOT NULL,
        driver_id TEXT NOT NULL,
        start_time TEXT NOT NULL,
        end_time TEXT,
        samples TEXT NOT NULL,
        status TEXT NOT NULL,
        status_changed_at TEXT NOT NULL
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS driver_scores (
        trip_id TEXT PRIMARY KEY REFERENCES trips(id),
        vehicle_id TEXT NOT NULL,
        driver_id TEXT NOT NULL,
        safety_score INTEGER NOT NULL,
        harsh_braking_count INTEGER NOT NULL,
        rapid_accel_count INTEGER NOT NULL,
        harsh_cornering_count INTEGER NOT NULL,
        speeding_count INTEGER NOT NULL,
        total_penalty INTEGER NOT NULL,
        max_speed REAL NOT NULL,
        avg_speed REAL NOT NULL,
        total_distance REAL NOT NULL,
        total_duration_hrs REAL NOT NULL,
        utilization_pct REAL NOT NULL,
        weather_summary TEXT NOT NULL,
        created_at TEXT NOT NULL
    )
    "#,
    "CREATE INDEX IF NOT EXISTS idx_trips_status ON trips (status, status_changed_at)",
];

/// Fixed-width UTC timestamps so text comparison orders correctly
fn ts(dt: DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn parse_ts(raw: &str) -> Result<DateTime<Utc>, StorageError> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| StorageError::SerializationError(format!("bad timestamp {raw:?}: {e}")))
}

fn parse_uuid(raw: &str) -> Result<Uuid, StorageError> {
    Uuid::parse_str(raw).map_err(|e| StorageError::SerializationError(format!("bad uuid {raw:?}: {e}")))
}

fn parse_status(raw: &str) -> Result<TripStatus, StorageError> {
    raw.parse()
        .map_err(|e: trip_model::ModelError| StorageError::SerializationError(e.to_string()))
}

fn trip_from_row(row: &SqliteRow) -> Result<Trip, StorageError> {
    let end_time: Option<String> = row.try_get("end_time")?;
    let samples: String = row.try_get("samples")?;

    Ok(Trip {
        id: parse_uuid(row.try_get("id")?)?,
        vehicle_id: parse_uuid(row.try_get("vehicle_id")?)?,
        driver_id: parse_uuid(row.try_get("driver_id")?)?,
        start_time: parse_ts(row.try_get("start_time")?)?,
        end_time: end_time.as_deref().map(parse_ts).transpose()?,
        samples: serde_json::from_str(&samples)?,
        status: parse_status(row.try_get("status")?)?,
    })
}

fn score_from_row(row: &SqliteRow) -> Result<DriverScore, StorageError> {
    let count = |name: &str| -> Result<u32, StorageError> { Ok(row.try_get::<i64, _>(name)? as u32) };
    let weather: String = row.try_get("weather_summary")?;

    Ok(DriverScore {
        trip_id: parse_uuid(row.try_get("trip_id")?)?,
        vehicle_id: parse_uuid(row.try_get("vehicle_id")?)?,
        driver_id: parse_uuid(row.try_get("driver_id")?)?,
        metrics: TripMetrics {
            safety_score: count("safety_score")?,
            harsh_braking_count: count("harsh_braking_count")?,
            rapid_accel_count: count("rapid_accel_count")?,
            harsh_cornering_count: count("harsh_cornering_count")?,
            speeding_count: count("speeding_count")?,
            total_penalty: count("total_penalty")?,
            max_speed: row.try_get("max_speed")?,
            avg_speed: row.try_get("avg_speed")?,
            total_distance: row.try_get("total_distance")?,
            total_duration_hrs: row.try_get("total_duration_hrs")?,
            utilization_pct: row.try_get("utilization_pct")?,
            weather_summary: serde_json::from_str(&weather)?,
        },
        created_at: parse_ts(row.try_get("created_at")?)?,
    })
}

/// Store backed by a SQLite connection pool
#[derive(Clone)]
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    /// Connect and create the schema if needed.
    ///
    /// In-memory databases are pinned to a single long-lived connection.
    pub async fn connect(url: &str, max_connections: u32) -> Result<Self, StorageError> {
        let in_memory = url.contains(":memory:");
        let mut options = SqliteConnectOptions::from_str(url)?
            .create_if_missing(true)
            .busy_timeout(BUSY_TIMEOUT);
        if !in_memory {
            options = options.journal_mode(SqliteJournalMode::Wal);
        }

        let pool_options = if in_memory {
            SqlitePoolOptions::new()
                .max_connections(1)
                .min_connections(1)
                .idle_timeout(None)
                .max_lifetime(None)
        } else {
            SqlitePoolOptions::new().max_connections(max_connections.max(1))
        };

        let pool = pool_options.connect_with(options).await?;
        let store = Self { pool };
        store.migrate().await?;

        info!("Connected to SQLite trip store at {}", url);
        Ok(store)
    }

    pub fn from_pool(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn migrate(&self) -> Result<(), StorageError> {
        for statement in SCHEMA {
            sqlx::query(statement).execute(&self.pool).await?;
        }
        Ok(())
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }

    /// Compare-and-set `expected -> next`, optionally stamping `end_time`.
    ///
    /// Returns `false` when the trip was no longer in `expected`. As the first statement
    /// of a transaction it takes the write lock before anything is read.
    async fn swap_status(
        conn: &mut SqliteConnection,
        trip_id: Uuid,
        expected: TripStatus,
        next: TripStatus,
        end_time: Option<DateTime<Utc>>,
    ) -> Result<bool, StorageError> {
        let result = sqlx::query(
            r#"
            UPDATE trips
            SET status = ?, status_changed_at = ?, end_time = COALESCE(?, end_time)
            WHERE id = ? AND status = ?
            "#,
        )
        .bind(next.as_str())
        .bind(ts(Utc::now()))
        .bind(end_time.map(ts))
        .bind(trip_id.to_string())
        .bind(expected.as_str())
        .execute(&mut *conn)
        .await?;
        Ok(result.rows_affected() == 1)
    }

    /// Read the status and check `next` is reachable from it
    async fn expect_transition(&self, trip_id: Uuid, next: TripStatus) -> Result<TripStatus, StorageError> {
        let current = self
            .trip_status(trip_id)
            .await?
            .ok_or(StorageError::NotFound(trip_id))?;
        if !current.can_transition_to(next) {
            return Err(StorageError::transition(trip_id, current, next));
        }
        Ok(current)
    }

    /// Trips that entered `status` before `cutoff`
    async fn in_status_since(&self, status: TripStatus, cutoff: DateTime<Utc>) -> Result<Vec<Uuid>, StorageError> {
        let rows = sqlx::query("SELECT id FROM trips WHERE status = ? AND status_changed_at < ? ORDER BY status_changed_at")
            .bind(status.as_str())
            .bind(ts(cutoff))
            .fetch_all(&self.pool)
            .await?;

        rows.iter()
            .map(|r| parse_uuid(r.try_get("id")?))
            .collect()
    }

    /// Error for a compare-and-set that lost to a concurrent writer
    async fn lost_race(&self, trip_id: Uuid, next: TripStatus) -> StorageError {
        match self.trip_status(trip_id).await {
            Ok(Some(now)) => StorageError::transition(trip_id, now, next),
            Ok(None) => StorageError::NotFound(trip_id),
            Err(e) => e,
        }
    }

    async fn insert_score_in(
        conn: &mut SqliteConnection,
        score: &DriverScore,
    ) -> Result<ScoreInsert, StorageError> {
        let m = &score.metrics;
        let result = sqlx::query(
            r#"
            INSERT INTO driver_scores (
                trip_id, vehicle_id, driver_id, safety_score,
                harsh_braking_count, rapid_accel_count, harsh_cornering_count, speeding_count,
                total_penalty, max_speed, avg_speed, total_distance, total_duration_hrs,
                utilization_pct, weather_summary, created_at
            )
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT (trip_id) DO NOTHING
            "#,
        )
        .bind(score.trip_id.to_string())
        .bind(score.vehicle_id.to_string())
        .bind(score.driver_id.to_string())
        .bind(m.safety_score as i64)
        .bind(m.harsh_braking_count as i64)
        .bind(m.rapid_accel_count as i64)
        .bind(m.harsh_cornering_count as i64)
        .bind(m.speeding_count as i64)
        .bind(m.total_penalty as i64)
        .bind(m.max_speed)
        .bind(m.avg_speed)
        .bind(m.total_distance)
        .bind(m.total_duration_hrs)
        .bind(m.utilization_pct)
        .bind(serde_json::to_string(&m.weather_summary)?)
        .bind(ts(score.created_at))
        .execute(&mut *conn)
        .await?;

        Ok(if result.rows_affected() == 0 {
            ScoreInsert::AlreadyExists
        } else {
            ScoreInsert::Inserted
        })
    }
}

#[async_trait]
impl TripStore for SqliteStore {
    async fn insert_trip(&self, trip: &Trip) -> Result<(), StorageError> {
        let samples = serde_json::to_string(&trip.samples)?;
        let result = sqlx::query(
            r#"
            INSERT INTO trips (id, vehicle_id, driver_id, start_time, end_time, samples, status, status_changed_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT (id) DO NOTHING
            "#,
        )
        .bind(trip.id.to_string())
        .bind(trip.vehicle_id.to_string())
        .bind(trip.driver_id.to_string())
        .bind(ts(trip.start_time))
        .bind(trip.end_time.map(ts))
        .bind(samples)
        .bind(trip.status.as_str())
        .bind(ts(Utc::now()))
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(StorageError::DuplicateTrip(trip.id));
        }
        debug!("Inserted trip {} with {} samples", trip.id, trip.samples.len());
        Ok(())
    }

    async fn fetch_trip(&self, trip_id: Uuid) -> Result<Option<Trip>, StorageError> {
        let row = sqlx::query("SELECT * FROM trips WHERE id = ?")
            .bind(trip_id.to_string())
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(trip_from_row).transpose()
    }

    async fn trip_status(&self, trip_id: Uuid) -> Result<Option<TripStatus>, StorageError> {
        let row = sqlx::query("SELECT status FROM trips WHERE id = ?")
            .bind(trip_id.to_string())
            .fetch_optional(&self.pool)
            .await?;
        row.map(|r| parse_status(r.try_get("status")?)).transpose()
    }

    async fn claim_trip(&self, trip_id: Uuid) -> Result<ClaimOutcome, StorageError> {
        let mut conn = self.pool.acquire().await?;
        if Self::swap_status(&mut conn, trip_id, TripStatus::PendingAnalysis, TripStatus::Processing, None).await? {
            return Ok(ClaimOutcome::Claimed);
        }
        drop(conn);

        Ok(match self.trip_status(trip_id).await? {
            Some(status) => ClaimOutcome::NotClaimable(status),
            None => ClaimOutcome::Missing,
        })
    }

    async fn update_status(&self, trip_id: Uuid, next: TripStatus) -> Result<TripStatus, StorageError> {
        let current = self.expect_transition(trip_id, next).await?;

        let mut conn = self.pool.acquire().await?;
        if !Self::swap_status(&mut conn, trip_id, current, next, None).await? {
            drop(conn);
            return Err(self.lost_race(trip_id, next).await);
        }
        Ok(current)
    }

    async fn insert_score_if_absent(&self, score: &DriverScore) -> Result<ScoreInsert, StorageError> {
        // Trips are never deleted, so the existence check cannot go stale
        if self.trip_status(score.trip_id).await?.is_none() {
            return Err(StorageError::NotFound(score.trip_id));
        }
        let mut conn = self.pool.acquire().await?;
        Self::insert_score_in(&mut conn, score).await
    }

    async fn complete_trip(
        &self,
        score: &DriverScore,
        end_time: Option<DateTime<Utc>>,
    ) -> Result<ScoreInsert, StorageError> {
        let trip_id = score.trip_id;
        let current = self.expect_transition(trip_id, TripStatus::Completed).await?;

        // Dropping `tx` on any early return rolls back the status change
        let mut tx = self.pool.begin().await?;
        if !Self::swap_status(&mut tx, trip_id, current, TripStatus::Completed, end_time).await? {
            drop(tx);
            return Err(self.lost_race(trip_id, TripStatus::Completed).await);
        }
        let outcome = Self::insert_score_in(&mut tx, score).await?;
        tx.commit().await?;

        Ok(outcome)
    }

    async fn fetch_score(&self, trip_id: Uuid) -> Result<Option<DriverScore>, StorageError> {
        let row = sqlx::query("SELECT * FROM driver_scores WHERE trip_id = ?")
            .bind(trip_id.to_string())
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(score_from_row).transpose()
    }

    async fn stale_processing(&self, cutoff: DateTime<Utc>) -> Result<Vec<Uuid>, StorageError> {
        self.in_status_since(TripStatus::Processing, cutoff).await
    }

    async fn stale_pending(&self, cutoff: DateTime<Utc>) -> Result<Vec<Uuid>, StorageError> {
        self.in_status_since(TripStatus::PendingAnalysis, cutoff).await
    }
}
