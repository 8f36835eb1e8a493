//! `SQLite`-backed storage.

use std::collections::BTreeMap;
use std::path::Path;

use chrono::{DateTime, SecondsFormat, Utc};
use parking_lot::Mutex;
use rusqlite::{Connection, OptionalExtension, params};

use super::{ResolvedExperiment, Storage, next_run_number, validate_trial};
use crate::error::{Error, Result};
use crate::experiment::{Compute, Experiment};
use crate::parameter::{ParamType, Parameter, ParameterConfig};
use crate::trial::Trial;

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS experiments (
    id               INTEGER PRIMARY KEY AUTOINCREMENT,
    hash             TEXT NOT NULL UNIQUE,
    tool_name        TEXT NOT NULL,
    command_template TEXT NOT NULL,
    setup_template   TEXT,
    finish_template  TEXT,
    compute_type     TEXT NOT NULL,
    compute          TEXT NOT NULL
);
CREATE TABLE IF NOT EXISTS parameters (
    id            INTEGER PRIMARY KEY AUTOINCREMENT,
    experiment_id INTEGER NOT NULL REFERENCES experiments(id),
    position      INTEGER NOT NULL,
    name          TEXT NOT NULL,
    type          TEXT NOT NULL,
    minimum       REAL NOT NULL,
    maximum       REAL NOT NULL,
    UNIQUE (experiment_id, name)
);
CREATE TABLE IF NOT EXISTS trials (
    id             INTEGER PRIMARY KEY AUTOINCREMENT,
    experiment_id  INTEGER NOT NULL REFERENCES experiments(id),
    run_number     INTEGER NOT NULL,
    outcome        REAL NOT NULL,
    obj_parameters TEXT NOT NULL,
    timestamp      TEXT NOT NULL
);
CREATE TABLE IF NOT EXISTS parameter_configs (
    trial_id     INTEGER NOT NULL REFERENCES trials(id),
    parameter_id INTEGER NOT NULL REFERENCES parameters(id),
    value        REAL NOT NULL,
    PRIMARY KEY (trial_id, parameter_id)
);
CREATE TABLE IF NOT EXISTS runs (
    experiment_id INTEGER NOT NULL REFERENCES experiments(id),
    run_number    INTEGER NOT NULL,
    started_at    TEXT NOT NULL,
    PRIMARY KEY (experiment_id, run_number)
);
CREATE INDEX IF NOT EXISTS trials_by_experiment ON trials (experiment_id, id);
";

/// Relational storage in a `SQLite` database file.
///
/// Experiments, parameters, trials and parameter configurations live in
/// separate tables. The compute descriptor is stored as a JSON payload next
/// to an explicit `compute_type` column and checked against it on load.
///
/// WAL mode is enabled so other processes can read the database while a run
/// writes to it. Every write runs in its own transaction.
///
/// # Examples
///
/// ```no_run
/// use paropt::storage::{SqliteStorage, Storage};
/// use paropt::experiment::Experiment;
///
/// let storage = SqliteStorage::open("paropt.db").unwrap();
/// let resolved = storage
///     .get_or_create_experiment(&Experiment::new("sleep", "sleep 1"))
///     .unwrap();
/// println!("experiment {:?}", resolved.experiment.id);
/// ```
pub struct SqliteStorage {
    conn: Mutex<Connection>,
}

impl SqliteStorage {
    /// Opens or creates a database at `path`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Storage`] if the file cannot be opened or the schema
    /// cannot be created.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let conn = Connection::open(path)?;
        conn.pragma_update(None, "journal_mode", "WAL")?;
        Self::init(conn)
    }

    /// Opens a private in-memory database.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Storage`] if the schema cannot be created.
    pub fn in_memory() -> Result<Self> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> Result<Self> {
        conn.pragma_update(None, "foreign_keys", "ON")?;
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }
}

fn to_sql_id(id: u64) -> Result<i64> {
    i64::try_from(id).map_err(|_| Error::Storage(format!("id {id} out of range")))
}

fn from_sql_id(id: i64) -> Result<u64> {
    u64::try_from(id).map_err(|_| Error::Storage(format!("negative id {id}")))
}

fn json_err(e: &serde_json::Error) -> Error {
    Error::Storage(e.to_string())
}

fn parse_type(s: &str) -> Result<ParamType> {
    match s {
        "int" => Ok(ParamType::Int),
        "float" => Ok(ParamType::Float),
        other => Err(Error::Storage(format!("unknown parameter type '{other}'"))),
    }
}

fn decode_compute(kind: &str, payload: &str) -> Result<Compute> {
    let compute: Compute = serde_json::from_str(payload).map_err(|e| json_err(&e))?;
    if compute.kind() != kind {
        return Err(Error::Storage(format!(
            "compute payload is '{}' but row says '{kind}'",
            compute.kind()
        )));
    }
    Ok(compute)
}

/// Parameters of an experiment with their row ids, in declaration order.
fn load_parameters(conn: &Connection, experiment_id: i64) -> Result<Vec<(i64, Parameter)>> {
    let mut stmt = conn.prepare(
        "SELECT id, name, type, minimum, maximum FROM parameters
         WHERE experiment_id = ?1 ORDER BY position",
    )?;
    let rows = stmt.query_map([experiment_id], |row| {
        Ok((
            row.get::<_, i64>(0)?,
            row.get::<_, String>(1)?,
            row.get::<_, String>(2)?,
            row.get::<_, f64>(3)?,
            row.get::<_, f64>(4)?,
        ))
    })?;

    let mut parameters = Vec::new();
    for row in rows {
        let (id, name, kind, minimum, maximum) = row?;
        parameters.push((
            id,
            Parameter {
                name,
                kind: parse_type(&kind)?,
                minimum,
                maximum,
            },
        ));
    }
    Ok(parameters)
}

fn load_experiment(conn: &Connection, id: i64) -> Result<Option<Experiment>> {
    let row = conn
        .query_row(
            "SELECT tool_name, command_template, setup_template, finish_template,
                    compute_type, compute
             FROM experiments WHERE id = ?1",
            [id],
            |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, Option<String>>(2)?,
                    row.get::<_, Option<String>>(3)?,
                    row.get::<_, String>(4)?,
                    row.get::<_, String>(5)?,
                ))
            },
        )
        .optional()?;

    let Some((tool_name, command_template, setup_template, finish_template, kind, payload)) = row
    else {
        return Ok(None);
    };

    Ok(Some(Experiment {
        id: Some(from_sql_id(id)?),
        tool_name,
        command_template,
        setup_template,
        finish_template,
        parameters: load_parameters(conn, id)?
            .into_iter()
            .map(|(_, p)| p)
            .collect(),
        compute: decode_compute(&kind, &payload)?,
    }))
}

fn last_run_number(conn: &Connection, experiment_id: i64) -> Result<Option<u64>> {
    let max: Option<i64> = conn.query_row(
        "SELECT MAX(n) FROM (
            SELECT run_number AS n FROM trials WHERE experiment_id = ?1
            UNION ALL
            SELECT run_number FROM runs WHERE experiment_id = ?1
         )",
        [experiment_id],
        |row| row.get(0),
    )?;
    max.map(from_sql_id).transpose()
}

impl Storage for SqliteStorage {
    fn get_or_create_experiment(&self, experiment: &Experiment) -> Result<ResolvedExperiment> {
        let hash = experiment.content_hash();
        let mut conn = self.conn.lock();
        let tx = conn.transaction()?;

        let existing: Option<i64> = tx
            .query_row("SELECT id FROM experiments WHERE hash = ?1", [&hash], |row| {
                row.get(0)
            })
            .optional()?;

        if let Some(id) = existing {
            let stored = load_experiment(&tx, id)?
                .ok_or_else(|| Error::Storage(format!("experiment {id} vanished")))?;
            let last_run_number = last_run_number(&tx, id)?;
            tx.commit()?;
            return Ok(ResolvedExperiment {
                experiment: stored,
                last_run_number,
                created: false,
            });
        }

        experiment.search_space()?;
        let compute = serde_json::to_string(&experiment.compute).map_err(|e| json_err(&e))?;
        tx.execute(
            "INSERT INTO experiments
                (hash, tool_name, command_template, setup_template, finish_template,
                 compute_type, compute)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                hash,
                experiment.tool_name,
                experiment.command_template,
                experiment.setup_template,
                experiment.finish_template,
                experiment.compute.kind(),
                compute,
            ],
        )?;
        let id = tx.last_insert_rowid();

        for (position, p) in experiment.parameters.iter().enumerate() {
            tx.execute(
                "INSERT INTO parameters (experiment_id, position, name, type, minimum, maximum)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![
                    id,
                    to_sql_id(position as u64)?,
                    p.name,
                    p.kind.to_string(),
                    p.minimum,
                    p.maximum,
                ],
            )?;
        }
        tx.commit()?;

        tracing::debug!(experiment_id = id, tool = %experiment.tool_name, "created experiment");

        let mut stored = experiment.clone();
        stored.id = Some(from_sql_id(id)?);
        Ok(ResolvedExperiment {
            experiment: stored,
            last_run_number: None,
            created: true,
        })
    }

    fn save_result(&self, mut trial: Trial) -> Result<Trial> {
        let experiment_id = to_sql_id(trial.experiment_id)?;
        let mut conn = self.conn.lock();
        let tx = conn.transaction()?;

        let experiment = load_experiment(&tx, experiment_id)?
            .ok_or_else(|| Error::Storage(format!("unknown experiment {}", trial.experiment_id)))?;
        validate_trial(&experiment, &trial)?;
        let parameter_ids: BTreeMap<String, i64> = load_parameters(&tx, experiment_id)?
            .into_iter()
            .map(|(id, p)| (p.name, id))
            .collect();

        let obj_parameters =
            serde_json::to_string(&trial.obj_parameters).map_err(|e| json_err(&e))?;
        tx.execute(
            "INSERT INTO trials (experiment_id, run_number, outcome, obj_parameters, timestamp)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                experiment_id,
                to_sql_id(trial.run_number)?,
                trial.outcome,
                obj_parameters,
                trial
                    .timestamp
                    .to_rfc3339_opts(SecondsFormat::Nanos, true),
            ],
        )?;
        let trial_id = tx.last_insert_rowid();

        for config in &trial.parameter_configs {
            let parameter_id = parameter_ids
                .get(config.name())
                .ok_or_else(|| Error::UnknownParameter(config.name().to_string()))?;
            tx.execute(
                "INSERT INTO parameter_configs (trial_id, parameter_id, value) VALUES (?1, ?2, ?3)",
                params![trial_id, parameter_id, config.value],
            )?;
        }
        tx.commit()?;

        trial.id = Some(from_sql_id(trial_id)?);
        Ok(trial)
    }

    fn start_run(&self, experiment_id: u64) -> Result<u64> {
        let sql_experiment_id = to_sql_id(experiment_id)?;
        let mut conn = self.conn.lock();
        let tx = conn.transaction()?;

        let known: Option<i64> = tx
            .query_row(
                "SELECT id FROM experiments WHERE id = ?1",
                [sql_experiment_id],
                |row| row.get(0),
            )
            .optional()?;
        if known.is_none() {
            return Err(Error::Storage(format!("unknown experiment {experiment_id}")));
        }

        let run_number = next_run_number(last_run_number(&tx, sql_experiment_id)?);
        tx.execute(
            "INSERT INTO runs (experiment_id, run_number, started_at) VALUES (?1, ?2, ?3)",
            params![
                sql_experiment_id,
                to_sql_id(run_number)?,
                Utc::now().to_rfc3339_opts(SecondsFormat::Nanos, true),
            ],
        )?;
        tx.commit()?;
        Ok(run_number)
    }

    fn trials(&self, experiment_id: u64) -> Result<Vec<Trial>> {
        let sql_experiment_id = to_sql_id(experiment_id)?;
        let conn = self.conn.lock();
        let parameters: BTreeMap<i64, Parameter> = load_parameters(&conn, sql_experiment_id)?
            .into_iter()
            .collect();

        let mut trial_stmt = conn.prepare(
            "SELECT id, run_number, outcome, obj_parameters, timestamp FROM trials
             WHERE experiment_id = ?1 ORDER BY id",
        )?;
        let mut config_stmt = conn.prepare(
            "SELECT pc.parameter_id, pc.value FROM parameter_configs pc
             JOIN parameters p ON p.id = pc.parameter_id
             WHERE pc.trial_id = ?1 ORDER BY p.position",
        )?;

        let rows = trial_stmt.query_map([sql_experiment_id], |row| {
            Ok((
                row.get::<_, i64>(0)?,
                row.get::<_, i64>(1)?,
                row.get::<_, f64>(2)?,
                row.get::<_, String>(3)?,
                row.get::<_, String>(4)?,
            ))
        })?;

        let mut trials = Vec::new();
        for row in rows {
            let (id, run_number, outcome, obj_parameters, timestamp) = row?;

            let configs = config_stmt.query_map([id], |r| {
                Ok((r.get::<_, i64>(0)?, r.get::<_, f64>(1)?))
            })?;
            let mut parameter_configs = Vec::new();
            for config in configs {
                let (parameter_id, value) = config?;
                let parameter = parameters.get(&parameter_id).ok_or_else(|| {
                    Error::Storage(format!("trial {id} references unknown parameter {parameter_id}"))
                })?;
                parameter_configs.push(ParameterConfig::new(parameter.clone(), value));
            }

            trials.push(Trial {
                id: Some(from_sql_id(id)?),
                experiment_id,
                run_number: from_sql_id(run_number)?,
                parameter_configs,
                outcome,
                obj_parameters: serde_json::from_str(&obj_parameters)
                    .map_err(|e| json_err(&e))?,
                timestamp: DateTime::parse_from_rfc3339(&timestamp)
                    .map_err(|e| Error::Storage(format!("bad timestamp '{timestamp}': {e}")))?
                    .with_timezone(&Utc),
            });
        }
        Ok(trials)
    }

    fn experiment(&self, id: u64) -> Result<Option<Experiment>> {
        let conn = self.conn.lock();
        load_experiment(&conn, to_sql_id(id)?)
    }
}
