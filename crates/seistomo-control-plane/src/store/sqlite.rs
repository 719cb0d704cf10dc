//! SQLite-backed [`TaskStore`].

use std::collections::HashMap;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use seistomo_core::{
    AcquisitionRequest, BoundingBox, CoreError, Detection, Event, FailureReason, ObservationBatch,
    ObservationSet, SolverArtifact, Station, Task, TaskId, TomographyParameters, Transition,
};
use sqlx::sqlite::{
    SqliteConnectOptions, SqliteConnection, SqlitePool, SqlitePoolOptions, SqliteRow,
};
use sqlx::Row;
use tracing::{debug, info};

use super::{StoreError, TaskStore};

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS tasks (
    id              TEXT PRIMARY KEY,
    state           TEXT NOT NULL,
    step            TEXT NOT NULL,
    created_at      TEXT NOT NULL,
    completed_in    TEXT,
    failure_kind    TEXT,
    failure_stage   TEXT,
    failure_message TEXT
);

CREATE INDEX IF NOT EXISTS idx_tasks_state ON tasks(state);

CREATE TABLE IF NOT EXISTS acquisition_requests (
    task_id       TEXT PRIMARY KEY REFERENCES tasks(id) ON DELETE CASCADE,
    start_time    TEXT NOT NULL,
    end_time      TEXT NOT NULL,
    network       TEXT NOT NULL,
    min_latitude  REAL,
    max_latitude  REAL,
    min_longitude REAL,
    max_longitude REAL
);

CREATE TABLE IF NOT EXISTS tomography_parameters (
    task_id    TEXT PRIMARY KEY REFERENCES tasks(id) ON DELETE CASCADE,
    parameters TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS stations (
    id      INTEGER PRIMARY KEY AUTOINCREMENT,
    task_id TEXT NOT NULL REFERENCES tasks(id) ON DELETE CASCADE,
    network TEXT NOT NULL,
    code    TEXT NOT NULL,
    x       REAL NOT NULL,
    y       REAL NOT NULL,
    z       REAL NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_stations_task ON stations(task_id);

CREATE TABLE IF NOT EXISTS events (
    id        INTEGER PRIMARY KEY AUTOINCREMENT,
    task_id   TEXT NOT NULL REFERENCES tasks(id) ON DELETE CASCADE,
    name      TEXT NOT NULL,
    time      TEXT NOT NULL,
    magnitude REAL,
    network   TEXT NOT NULL,
    x         REAL NOT NULL,
    y         REAL NOT NULL,
    z         REAL NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_events_task ON events(task_id);

CREATE TABLE IF NOT EXISTS detections (
    id             INTEGER PRIMARY KEY AUTOINCREMENT,
    event_id       INTEGER NOT NULL REFERENCES events(id) ON DELETE CASCADE,
    station_id     INTEGER NOT NULL REFERENCES stations(id) ON DELETE CASCADE,
    phase          TEXT NOT NULL,
    arrival_offset REAL NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_detections_event ON detections(event_id);

CREATE TABLE IF NOT EXISTS solver_artifacts (
    task_id     TEXT PRIMARY KEY REFERENCES tasks(id) ON DELETE CASCADE,
    input_path  TEXT NOT NULL,
    output_path TEXT NOT NULL,
    export_path TEXT,
    created_at  TEXT NOT NULL
);
"#;

/// Task store on a SQLite connection pool.
#[derive(Debug, Clone)]
pub struct SqliteTaskStore {
    pool: SqlitePool,
}

impl SqliteTaskStore {
    /// Open (creating if needed) the database at `url` and apply the schema.
    pub async fn connect(url: &str) -> Result<Self, StoreError> {
        let options = SqliteConnectOptions::from_str(url)?
            .create_if_missing(true)
            .foreign_keys(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .acquire_timeout(Duration::from_secs(5))
            .connect_with(options)
            .await?;
        info!(url = %url, "Connected to database");
        Self::from_pool(pool).await
    }

    /// Private in-memory database, for tests and throwaway runs.
    pub async fn in_memory() -> Result<Self, StoreError> {
        let options = SqliteConnectOptions::from_str("sqlite::memory:")?.foreign_keys(true);
        // Every connection to :memory: is a separate database; keep exactly one alive.
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(options)
            .await?;
        Self::from_pool(pool).await
    }

    /// Wrap an existing pool and apply the schema.
    pub async fn from_pool(pool: SqlitePool) -> Result<Self, StoreError> {
        sqlx::raw_sql(SCHEMA).execute(&pool).await?;
        Ok(Self { pool })
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

fn corrupt(err: CoreError) -> StoreError {
    StoreError::Integrity(err.to_string())
}

fn task_from_row(row: &SqliteRow) -> Result<Task, StoreError> {
    let state: String = row.try_get("state")?;
    let step: String = row.try_get("step")?;

    let failure_kind: Option<String> = row.try_get("failure_kind")?;
    let failure = match failure_kind {
        Some(kind) => {
            let stage: Option<String> = row.try_get("failure_stage")?;
            let message: Option<String> = row.try_get("failure_message")?;
            Some(FailureReason {
                kind: kind.parse().map_err(corrupt)?,
                stage: stage.unwrap_or_default().parse().map_err(corrupt)?,
                message: message.unwrap_or_default(),
            })
        }
        None => None,
    };

    Ok(Task {
        id: TaskId::new(row.try_get::<String, _>("id")?),
        state: state.parse().map_err(corrupt)?,
        step: step.parse().map_err(corrupt)?,
        created_at: row.try_get("created_at")?,
        completed_in: row.try_get("completed_in")?,
        failure,
    })
}

async fn fetch_task(conn: &mut SqliteConnection, id: &TaskId) -> Result<Option<Task>, StoreError> {
    let row = sqlx::query("SELECT * FROM tasks WHERE id = ?")
        .bind(id.as_str())
        .fetch_optional(&mut *conn)
        .await?;
    row.as_ref().map(task_from_row).transpose()
}

/// Compare-and-set a transition on one connection (usually a transaction).
async fn apply_transition(
    conn: &mut SqliteConnection,
    id: &TaskId,
    transition: Transition,
    failure: Option<&FailureReason>,
) -> Result<Task, StoreError> {
    let (expected_state, expected_step) = transition.precondition();
    let (state, step) = transition.target();
    let completed_in = transition.completes().then(Utc::now);

    let result = sqlx::query(
        "UPDATE tasks
         SET state = ?, step = ?, completed_in = COALESCE(?, completed_in),
             failure_kind = ?, failure_stage = ?, failure_message = ?
         WHERE id = ? AND state = ? AND step = ?",
    )
    .bind(state.as_str())
    .bind(step.as_str())
    .bind(completed_in)
    .bind(failure.map(|f| f.kind.as_str()))
    .bind(failure.map(|f| f.stage.as_str()))
    .bind(failure.map(|f| f.message.as_str()))
    .bind(id.as_str())
    .bind(expected_state.as_str())
    .bind(expected_step.as_str())
    .execute(&mut *conn)
    .await?;

    let task = fetch_task(conn, id)
        .await?
        .ok_or_else(|| StoreError::NotFound(id.clone()))?;

    if result.rows_affected() == 0 {
        return Err(StoreError::Precondition(CoreError::PreconditionFailed {
            task_id: id.to_string(),
            expected_state,
            expected_step,
            actual_state: task.state,
            actual_step: task.step,
        }));
    }

    debug!(task_id = %id, state = %task.state, step = %task.step, "Task transitioned");
    Ok(task)
}

#[async_trait]
impl TaskStore for SqliteTaskStore {
    async fn create_task(&self, task: &Task) -> Result<(), StoreError> {
        sqlx::query(
            "INSERT INTO tasks (id, state, step, created_at, completed_in) VALUES (?, ?, ?, ?, ?)",
        )
        .bind(task.id.as_str())
        .bind(task.state.as_str())
        .bind(task.step.as_str())
        .bind(task.created_at)
        .bind(task.completed_in)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn get_task(&self, id: &TaskId) -> Result<Option<Task>, StoreError> {
        let mut conn = self.pool.acquire().await?;
        fetch_task(&mut conn, id).await
    }

    async fn list_tasks(&self, limit: u32) -> Result<Vec<Task>, StoreError> {
        let rows = sqlx::query("SELECT * FROM tasks ORDER BY created_at DESC, rowid DESC LIMIT ?")
            .bind(i64::from(limit))
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(task_from_row).collect()
    }

    async fn count_tasks(&self) -> Result<u64, StoreError> {
        let count: i64 = sqlx::query("SELECT COUNT(*) AS count FROM tasks")
            .fetch_one(&self.pool)
            .await?
            .try_get("count")?;
        Ok(count as u64)
    }

    async fn delete_task(&self, id: &TaskId) -> Result<bool, StoreError> {
        let result = sqlx::query("DELETE FROM tasks WHERE id = ?")
            .bind(id.as_str())
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn in_flight_tasks(&self) -> Result<Vec<Task>, StoreError> {
        let rows = sqlx::query("SELECT * FROM tasks WHERE state = ? ORDER BY created_at, rowid")
            .bind(seistomo_core::TaskState::InProgress.as_str())
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(task_from_row).collect()
    }

    async fn transition(
        &self,
        id: &TaskId,
        transition: Transition,
        failure: Option<&FailureReason>,
    ) -> Result<Task, StoreError> {
        let mut tx = self.pool.begin().await?;
        let task = apply_transition(&mut tx, id, transition, failure).await?;
        tx.commit().await?;
        Ok(task)
    }

    async fn submit_acquisition(
        &self,
        id: &TaskId,
        request: &AcquisitionRequest,
    ) -> Result<Task, StoreError> {
        let mut tx = self.pool.begin().await?;
        let task = apply_transition(&mut tx, id, Transition::SubmitAcquisition, None).await?;

        sqlx::query(
            "INSERT OR REPLACE INTO acquisition_requests
             (task_id, start_time, end_time, network,
              min_latitude, max_latitude, min_longitude, max_longitude)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(id.as_str())
        .bind(request.start_time)
        .bind(request.end_time)
        .bind(&request.network)
        .bind(request.bbox.min_latitude)
        .bind(request.bbox.max_latitude)
        .bind(request.bbox.min_longitude)
        .bind(request.bbox.max_longitude)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(task)
    }

    async fn get_acquisition_request(
        &self,
        id: &TaskId,
    ) -> Result<Option<AcquisitionRequest>, StoreError> {
        let row = sqlx::query("SELECT * FROM acquisition_requests WHERE task_id = ?")
            .bind(id.as_str())
            .fetch_optional(&self.pool)
            .await?;

        let Some(row) = row else {
            return Ok(None);
        };
        Ok(Some(AcquisitionRequest {
            start_time: row.try_get("start_time")?,
            end_time: row.try_get("end_time")?,
            network: row.try_get("network")?,
            bbox: BoundingBox {
                min_latitude: row.try_get("min_latitude")?,
                max_latitude: row.try_get("max_latitude")?,
                min_longitude: row.try_get("min_longitude")?,
                max_longitude: row.try_get("max_longitude")?,
            },
        }))
    }

    async fn submit_tomography(
        &self,
        id: &TaskId,
        parameters: &TomographyParameters,
    ) -> Result<Task, StoreError> {
        let json = serde_json::to_string(parameters)?;

        let mut tx = self.pool.begin().await?;
        let task = apply_transition(&mut tx, id, Transition::SubmitTomography, None).await?;

        sqlx::query(
            "INSERT OR REPLACE INTO tomography_parameters (task_id, parameters) VALUES (?, ?)",
        )
        .bind(id.as_str())
        .bind(json)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(task)
    }

    async fn get_tomography_parameters(
        &self,
        id: &TaskId,
    ) -> Result<Option<TomographyParameters>, StoreError> {
        let json: Option<String> =
            sqlx::query_scalar("SELECT parameters FROM tomography_parameters WHERE task_id = ?")
                .bind(id.as_str())
                .fetch_optional(&self.pool)
                .await?;
        json.map(|j| serde_json::from_str(&j))
            .transpose()
            .map_err(StoreError::from)
    }

    async fn commit_observations(
        &self,
        id: &TaskId,
        batch: &ObservationBatch,
    ) -> Result<Task, StoreError> {
        let mut tx = self.pool.begin().await?;

        let mut station_ids: HashMap<(&str, &str), i64> = HashMap::new();
        for station in &batch.stations {
            let key = (station.network.as_str(), station.code.as_str());
            if station_ids.contains_key(&key) {
                return Err(StoreError::Integrity(format!(
                    "duplicate station {}.{}",
                    station.network, station.code
                )));
            }
            let row_id = sqlx::query(
                "INSERT INTO stations (task_id, network, code, x, y, z) VALUES (?, ?, ?, ?, ?, ?)",
            )
            .bind(id.as_str())
            .bind(&station.network)
            .bind(&station.code)
            .bind(station.longitude)
            .bind(station.latitude)
            .bind(station.elevation_km)
            .execute(&mut *tx)
            .await?
            .last_insert_rowid();
            station_ids.insert(key, row_id);
        }

        let mut events = 0usize;
        let mut detections = 0usize;
        for observed in &batch.events {
            let event = &observed.origin;
            let event_row = sqlx::query(
                "INSERT INTO events (task_id, name, time, magnitude, network, x, y, z)
                 VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
            )
            .bind(id.as_str())
            .bind(&observed.name)
            .bind(event.time)
            .bind(event.magnitude)
            .bind(&event.network)
            .bind(event.longitude)
            .bind(event.latitude)
            .bind(event.depth_km)
            .execute(&mut *tx)
            .await?
            .last_insert_rowid();
            events += 1;

            for pick in &observed.picks {
                let key = (pick.network.as_str(), pick.station_code.as_str());
                let station_id = *station_ids.get(&key).ok_or_else(|| {
                    StoreError::Integrity(format!(
                        "detection references unknown station {}.{}",
                        pick.network, pick.station_code
                    ))
                })?;
                sqlx::query(
                    "INSERT INTO detections (event_id, station_id, phase, arrival_offset)
                     VALUES (?, ?, ?, ?)",
                )
                .bind(event_row)
                .bind(station_id)
                .bind(pick.phase.as_str())
                .bind(pick.arrival_offset)
                .execute(&mut *tx)
                .await?;
                detections += 1;
            }
        }

        let task = apply_transition(&mut tx, id, Transition::AcquisitionSucceeded, None).await?;
        tx.commit().await?;

        info!(
            task_id = %id,
            stations = station_ids.len(),
            events,
            detections,
            "Observations committed"
        );
        Ok(task)
    }

    async fn get_observations(&self, id: &TaskId) -> Result<ObservationSet, StoreError> {
        let mut conn = self.pool.acquire().await?;

        let stations = sqlx::query("SELECT * FROM stations WHERE task_id = ? ORDER BY id")
            .bind(id.as_str())
            .fetch_all(&mut *conn)
            .await?
            .iter()
            .map(|row| {
                Ok(Station {
                    id: row.try_get("id")?,
                    task_id: id.clone(),
                    network: row.try_get("network")?,
                    code: row.try_get("code")?,
                    x: row.try_get("x")?,
                    y: row.try_get("y")?,
                    z: row.try_get("z")?,
                })
            })
            .collect::<Result<Vec<_>, StoreError>>()?;

        let events = sqlx::query("SELECT * FROM events WHERE task_id = ? ORDER BY id")
            .bind(id.as_str())
            .fetch_all(&mut *conn)
            .await?
            .iter()
            .map(|row| {
                Ok(Event {
                    id: row.try_get("id")?,
                    task_id: id.clone(),
                    name: row.try_get("name")?,
                    time: row.try_get("time")?,
                    magnitude: row.try_get("magnitude")?,
                    network: row.try_get("network")?,
                    x: row.try_get("x")?,
                    y: row.try_get("y")?,
                    z: row.try_get("z")?,
                })
            })
            .collect::<Result<Vec<_>, StoreError>>()?;

        let detections = sqlx::query(
            "SELECT d.id, d.event_id, d.station_id, d.phase, d.arrival_offset
             FROM detections d JOIN events e ON d.event_id = e.id
             WHERE e.task_id = ?
             ORDER BY d.id",
        )
        .bind(id.as_str())
        .fetch_all(&mut *conn)
        .await?
        .iter()
        .map(|row| {
            let phase: String = row.try_get("phase")?;
            Ok(Detection {
                id: row.try_get("id")?,
                event_id: row.try_get("event_id")?,
                station_id: row.try_get("station_id")?,
                phase: phase.parse().map_err(corrupt)?,
                arrival_offset: row.try_get("arrival_offset")?,
            })
        })
        .collect::<Result<Vec<_>, StoreError>>()?;

        Ok(ObservationSet {
            stations,
            events,
            detections,
        })
    }

    async fn complete_tomography(
        &self,
        id: &TaskId,
        artifact: &SolverArtifact,
    ) -> Result<Task, StoreError> {
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            "INSERT OR REPLACE INTO solver_artifacts
             (task_id, input_path, output_path, export_path, created_at)
             VALUES (?, ?, ?, ?, ?)",
        )
        .bind(id.as_str())
        .bind(artifact.input_path.to_string_lossy().into_owned())
        .bind(artifact.output_path.to_string_lossy().into_owned())
        .bind(
            artifact
                .export_path
                .as_ref()
                .map(|p| p.to_string_lossy().into_owned()),
        )
        .bind(artifact.created_at)
        .execute(&mut *tx)
        .await?;

        let task = apply_transition(&mut tx, id, Transition::TomographySucceeded, None).await?;
        tx.commit().await?;
        Ok(task)
    }

    async fn get_artifact(&self, id: &TaskId) -> Result<Option<SolverArtifact>, StoreError> {
        let row = sqlx::query("SELECT * FROM solver_artifacts WHERE task_id = ?")
            .bind(id.as_str())
            .fetch_optional(&self.pool)
            .await?;

        let Some(row) = row else {
            return Ok(None);
        };
        let export_path: Option<String> = row.try_get("export_path")?;
        Ok(Some(SolverArtifact {
            input_path: PathBuf::from(row.try_get::<String, _>("input_path")?),
            output_path: PathBuf::from(row.try_get::<String, _>("output_path")?),
            export_path: export_path.map(PathBuf::from),
            created_at: row.try_get("created_at")?,
        }))
    }
}
