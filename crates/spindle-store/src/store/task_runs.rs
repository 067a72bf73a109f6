use async_trait::async_trait;
use rusqlite::{Connection, OptionalExtension, Row, params, params_from_iter};
use tracing::debug;

use super::codec::PayloadCodec;
use super::sql::{Assignments, WhereClause};
use super::{SqliteStore, status_counts};
use crate::domain::ids::{IdMarker, TaskRunKind};
use crate::domain::{Filter, NewTaskRun, TaskRun, TaskRunId, TaskRunPatch};
use crate::error::StoreError;
use crate::observability::StatusCounts;
use crate::ports::TaskRunRegistry;

const TABLE: &str = "task_runs";
const COLUMNS: &str = "id, task_identifier, status, input, result, error, created_at, updated_at";
const FILTERABLE: &[&str] = &["id", "task_identifier", "status"];

/// A `task_runs` row as stored, before payload decoding.
struct TaskRunRow {
    id: TaskRunId,
    task_identifier: String,
    status: String,
    input: Option<String>,
    result: Option<String>,
    error: Option<String>,
    created_at: String,
    updated_at: String,
}

impl TaskRunRow {
    fn read(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            task_identifier: row.get(1)?,
            status: row.get(2)?,
            input: row.get(3)?,
            result: row.get(4)?,
            error: row.get(5)?,
            created_at: row.get(6)?,
            updated_at: row.get(7)?,
        })
    }

    fn decode(self) -> Result<TaskRun, StoreError> {
        Ok(TaskRun {
            id: self.id,
            task_identifier: self.task_identifier,
            status: PayloadCodec::decode_status(&self.status)?,
            input: PayloadCodec::decode_payload("input", self.input)?,
            result: PayloadCodec::decode_payload("result", self.result)?,
            error: PayloadCodec::decode_payload("error", self.error)?,
            created_at: PayloadCodec::decode_timestamp("created_at", &self.created_at)?,
            updated_at: PayloadCodec::decode_timestamp("updated_at", &self.updated_at)?,
        })
    }
}

pub(crate) fn fetch(conn: &Connection, id: &TaskRunId) -> Result<Option<TaskRun>, StoreError> {
    conn.query_row(
        &format!("SELECT {COLUMNS} FROM {TABLE} WHERE id = ?1"),
        [id],
        TaskRunRow::read,
    )
    .optional()?
    .map(TaskRunRow::decode)
    .transpose()
}

pub(crate) fn exists(conn: &Connection, id: &TaskRunId) -> Result<bool, StoreError> {
    Ok(conn
        .query_row(&format!("SELECT 1 FROM {TABLE} WHERE id = ?1"), [id], |_| Ok(()))
        .optional()?
        .is_some())
}

fn insert(conn: &Connection, run: &TaskRun) -> Result<(), StoreError> {
    conn.execute(
        &format!("INSERT INTO {TABLE} ({COLUMNS}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)"),
        params![
            run.id,
            run.task_identifier,
            run.status.as_str(),
            PayloadCodec::encode_payload(run.input.as_ref()),
            PayloadCodec::encode_payload(run.result.as_ref()),
            PayloadCodec::encode_payload(run.error.as_ref()),
            PayloadCodec::encode_timestamp(run.created_at),
            PayloadCodec::encode_timestamp(run.updated_at),
        ],
    )?;
    Ok(())
}

fn select(conn: &Connection, clause: WhereClause) -> Result<Vec<TaskRun>, StoreError> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {COLUMNS} FROM {TABLE}{} ORDER BY rowid",
        clause.sql
    ))?;
    let rows = stmt
        .query_map(params_from_iter(clause.params), TaskRunRow::read)?
        .collect::<Result<Vec<_>, _>>()?;
    rows.into_iter().map(TaskRunRow::decode).collect()
}

#[async_trait]
impl TaskRunRegistry for SqliteStore {
    async fn create_task_run(&self, new: NewTaskRun) -> Result<TaskRun, StoreError> {
        new.validate()?;
        let now = self.now();
        let run = TaskRun {
            id: self.ids.generate_task_run_id(),
            task_identifier: new.task_identifier,
            status: new.status,
            input: new.input,
            result: new.result,
            error: new.error,
            created_at: now,
            updated_at: now,
        };
        self.with_conn(|conn| insert(conn, &run)).await?;
        debug!(id = %run.id, task = %run.task_identifier, status = %run.status, "task run created");
        Ok(run)
    }

    async fn get_task_run(&self, id: TaskRunId) -> Result<Option<TaskRun>, StoreError> {
        self.with_conn(|conn| fetch(conn, &id)).await
    }

    async fn update_task_run(
        &self,
        id: TaskRunId,
        patch: TaskRunPatch,
    ) -> Result<TaskRun, StoreError> {
        patch.validate()?;
        let now = self.now();
        self.with_conn(move |conn| {
            let tx = conn.transaction()?;
            let current = fetch(&tx, &id)?
                .ok_or_else(|| StoreError::not_found(TaskRunKind::entity(), id))?;
            if let Some(to) = patch.status {
                current.status.check_transition(to)?;
            }

            let mut set = Assignments::new();
            if let Some(task_identifier) = patch.task_identifier {
                set.set("task_identifier", task_identifier);
            }
            if let Some(status) = patch.status {
                set.set("status", status.as_str().to_string());
            }
            if let Some(input) = patch.input {
                set.set_optional("input", PayloadCodec::encode_payload(input.as_ref()));
            }
            if let Some(result) = patch.result {
                set.set_optional("result", PayloadCodec::encode_payload(result.as_ref()));
            }
            if let Some(error) = patch.error {
                set.set_optional("error", PayloadCodec::encode_payload(error.as_ref()));
            }
            set.set("updated_at", PayloadCodec::encode_timestamp(now));
            set.execute(&tx, TABLE, id.to_string())?;

            let updated = fetch(&tx, &id)?
                .ok_or_else(|| StoreError::not_found(TaskRunKind::entity(), id))?;
            tx.commit()?;
            Ok(updated)
        })
        .await
    }

    async fn query_task_runs(&self, filter: &Filter) -> Result<Vec<TaskRun>, StoreError> {
        let clause = WhereClause::build(filter, TABLE, FILTERABLE)?;
        self.with_conn(|conn| select(conn, clause)).await
    }

    async fn task_run_counts(&self) -> Result<StatusCounts, StoreError> {
        self.with_conn(|conn| status_counts(conn, TABLE)).await
    }
}
