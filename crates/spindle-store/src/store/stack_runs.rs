//! StackRunHierarchy over the `stack_runs` table.
//!
//! Frames are stored flat with a parent pointer. The write path is the one
//! place hierarchy rules are enforced: a new frame's parent must exist, must
//! belong to the same task run, and must have a sound ancestor chain (no
//! revisits, bounded depth). After creation the owning task run and parent
//! cannot change, so a chain that was sound stays sound.

use async_trait::async_trait;
use rusqlite::{Connection, OptionalExtension, Row, params, params_from_iter};
use std::collections::HashSet;
use tracing::{debug, warn};

use super::codec::PayloadCodec;
use super::sql::{Assignments, WhereClause};
use super::{SqliteStore, status_counts, task_runs};
use crate::domain::ids::{IdMarker, StackRunKind, TaskRunKind};
use crate::domain::{Filter, NewStackRun, RunStatus, StackRun, StackRunId, StackRunPatch};
use crate::error::{HierarchyViolation, StoreError};
use crate::observability::StatusCounts;
use crate::ports::StackRunHierarchy;

const TABLE: &str = "stack_runs";
const COLUMNS: &str = "id, task_run_id, parent_stack_run_id, operation, status, input, result, \
                       error, suspended_at, resume_payload, created_at, updated_at";
const FILTERABLE: &[&str] = &[
    "id",
    "task_run_id",
    "parent_stack_run_id",
    "operation",
    "status",
];

struct StackRunRow {
    id: StackRunId,
    task_run_id: crate::domain::TaskRunId,
    parent_stack_run_id: Option<StackRunId>,
    operation: String,
    status: String,
    input: Option<String>,
    result: Option<String>,
    error: Option<String>,
    suspended_at: Option<String>,
    resume_payload: Option<String>,
    created_at: String,
    updated_at: String,
}

impl StackRunRow {
    fn read(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            task_run_id: row.get(1)?,
            parent_stack_run_id: row.get(2)?,
            operation: row.get(3)?,
            status: row.get(4)?,
            input: row.get(5)?,
            result: row.get(6)?,
            error: row.get(7)?,
            suspended_at: row.get(8)?,
            resume_payload: row.get(9)?,
            created_at: row.get(10)?,
            updated_at: row.get(11)?,
        })
    }

    fn decode(self) -> Result<StackRun, StoreError> {
        Ok(StackRun {
            id: self.id,
            task_run_id: self.task_run_id,
            parent_stack_run_id: self.parent_stack_run_id,
            operation: self.operation,
            status: PayloadCodec::decode_status(&self.status)?,
            input: PayloadCodec::decode_payload("input", self.input)?,
            result: PayloadCodec::decode_payload("result", self.result)?,
            error: PayloadCodec::decode_payload("error", self.error)?,
            suspended_at: PayloadCodec::decode_optional_timestamp(
                "suspended_at",
                self.suspended_at,
            )?,
            resume_payload: PayloadCodec::decode_payload("resume_payload", self.resume_payload)?,
            created_at: PayloadCodec::decode_timestamp("created_at", &self.created_at)?,
            updated_at: PayloadCodec::decode_timestamp("updated_at", &self.updated_at)?,
        })
    }
}

fn fetch(conn: &Connection, id: &StackRunId) -> Result<Option<StackRun>, StoreError> {
    conn.query_row(
        &format!("SELECT {COLUMNS} FROM {TABLE} WHERE id = ?1"),
        [id],
        StackRunRow::read,
    )
    .optional()?
    .map(StackRunRow::decode)
    .transpose()
}

fn fetch_existing(conn: &Connection, id: &StackRunId) -> Result<StackRun, StoreError> {
    fetch(conn, id)?.ok_or_else(|| StoreError::not_found(StackRunKind::entity(), id))
}

fn insert(conn: &Connection, run: &StackRun) -> Result<(), StoreError> {
    conn.execute(
        &format!(
            "INSERT INTO {TABLE} ({COLUMNS}) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)"
        ),
        params![
            run.id,
            run.task_run_id,
            run.parent_stack_run_id,
            run.operation,
            run.status.as_str(),
            PayloadCodec::encode_payload(run.input.as_ref()),
            PayloadCodec::encode_payload(run.result.as_ref()),
            PayloadCodec::encode_payload(run.error.as_ref()),
            run.suspended_at.map(PayloadCodec::encode_timestamp),
            PayloadCodec::encode_payload(run.resume_payload.as_ref()),
            PayloadCodec::encode_timestamp(run.created_at),
            PayloadCodec::encode_timestamp(run.updated_at),
        ],
    )?;
    Ok(())
}

/// Rows matching `clause`, oldest first. Ties on `created_at` (a coarse or
/// fixed clock) fall back to insertion order.
fn select(conn: &Connection, clause: WhereClause) -> Result<Vec<StackRun>, StoreError> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {COLUMNS} FROM {TABLE}{} ORDER BY created_at, rowid",
        clause.sql
    ))?;
    let rows = stmt
        .query_map(params_from_iter(clause.params), StackRunRow::read)?
        .collect::<Result<Vec<_>, _>>()?;
    rows.into_iter().map(StackRunRow::decode).collect()
}

/// Ancestors of `frame`, nearest first.
///
/// Fails if the chain revisits a frame, leaves the frame's task run, or has
/// more than `max_depth` links.
fn ancestor_chain(
    conn: &Connection,
    frame: &StackRun,
    max_depth: usize,
) -> Result<Vec<StackRun>, StoreError> {
    let mut chain: Vec<StackRun> = Vec::new();
    let mut visited = HashSet::from([frame.id]);
    let mut next = frame.parent_stack_run_id;

    while let Some(id) = next {
        if !visited.insert(id) {
            warn!(start = %frame.id, revisited = %id, "cycle in stack run ancestry");
            return Err(HierarchyViolation::Cycle {
                start: frame.id.to_string(),
                revisited: id.to_string(),
            }
            .into());
        }
        if chain.len() == max_depth {
            return Err(HierarchyViolation::DepthExceeded {
                start: frame.id.to_string(),
                max_depth,
            }
            .into());
        }

        let parent = fetch_existing(conn, &id)?;
        if parent.task_run_id != frame.task_run_id {
            return Err(HierarchyViolation::ParentInOtherTaskRun {
                parent: parent.id.to_string(),
                parent_task_run: parent.task_run_id.to_string(),
                task_run: frame.task_run_id.to_string(),
            }
            .into());
        }
        next = parent.parent_stack_run_id;
        chain.push(parent);
    }
    Ok(chain)
}

#[async_trait]
impl StackRunHierarchy for SqliteStore {
    async fn create_stack_run(&self, new: NewStackRun) -> Result<StackRun, StoreError> {
        new.validate()?;
        let now = self.now();
        let run = StackRun {
            id: self.ids.generate_stack_run_id(),
            task_run_id: new.task_run_id,
            parent_stack_run_id: new.parent_stack_run_id,
            operation: new.operation,
            status: new.status,
            input: new.input,
            result: new.result,
            error: new.error,
            suspended_at: None,
            resume_payload: None,
            created_at: now,
            updated_at: now,
        };
        let max_depth = self.max_stack_depth;

        self.with_conn(|conn| {
            let tx = conn.transaction()?;
            if !task_runs::exists(&tx, &run.task_run_id)? {
                return Err(StoreError::not_found(TaskRunKind::entity(), run.task_run_id));
            }
            if let Some(parent_id) = &run.parent_stack_run_id {
                let parent = fetch_existing(&tx, parent_id)?;
                if parent.task_run_id != run.task_run_id {
                    return Err(HierarchyViolation::ParentInOtherTaskRun {
                        parent: parent.id.to_string(),
                        parent_task_run: parent.task_run_id.to_string(),
                        task_run: run.task_run_id.to_string(),
                    }
                    .into());
                }
                // walking from the new frame checks the parent's whole chain
                // plus the extra link
                ancestor_chain(&tx, &run, max_depth)?;
            }
            insert(&tx, &run)?;
            tx.commit()?;
            Ok(())
        })
        .await?;

        debug!(
            id = %run.id,
            task_run = %run.task_run_id,
            parent = ?run.parent_stack_run_id.map(|p| p.to_string()),
            operation = %run.operation,
            "stack run created"
        );
        Ok(run)
    }

    async fn get_stack_run(&self, id: StackRunId) -> Result<Option<StackRun>, StoreError> {
        self.with_conn(|conn| fetch(conn, &id)).await
    }

    async fn update_stack_run(
        &self,
        id: StackRunId,
        patch: StackRunPatch,
    ) -> Result<StackRun, StoreError> {
        patch.validate()?;
        let now = self.now();
        self.with_conn(move |conn| {
            let tx = conn.transaction()?;
            let current = fetch_existing(&tx, &id)?;
            if let Some(to) = patch.status {
                current.status.check_transition(to)?;
            }

            let mut set = Assignments::new();
            if let Some(operation) = patch.operation {
                set.set("operation", operation);
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
            if let Some(suspended_at) = patch.suspended_at {
                set.set_optional(
                    "suspended_at",
                    suspended_at.map(PayloadCodec::encode_timestamp),
                );
            }
            if let Some(payload) = patch.resume_payload {
                set.set_optional(
                    "resume_payload",
                    PayloadCodec::encode_payload(payload.as_ref()),
                );
            }
            set.set("updated_at", PayloadCodec::encode_timestamp(now));
            set.execute(&tx, TABLE, id.to_string())?;

            let updated = fetch_existing(&tx, &id)?;
            tx.commit()?;
            if current.status != updated.status {
                debug!(%id, from = %current.status, to = %updated.status, "stack run transition");
            }
            Ok(updated)
        })
        .await
    }

    async fn query_stack_runs(&self, filter: &Filter) -> Result<Vec<StackRun>, StoreError> {
        let clause = WhereClause::build(filter, TABLE, FILTERABLE)?;
        self.with_conn(|conn| select(conn, clause)).await
    }

    async fn pending_work(&self) -> Result<Vec<StackRun>, StoreError> {
        let filter = Filter::new().status_in(RunStatus::PENDING_WORK);
        self.query_stack_runs(&filter).await
    }

    async fn children(&self, id: StackRunId) -> Result<Vec<StackRun>, StoreError> {
        let clause = WhereClause::build(
            &Filter::new().eq("parent_stack_run_id", id),
            TABLE,
            FILTERABLE,
        )?;
        self.with_conn(|conn| {
            fetch_existing(conn, &id)?;
            select(conn, clause)
        })
        .await
    }

    async fn ancestors(&self, id: StackRunId) -> Result<Vec<StackRun>, StoreError> {
        let max_depth = self.max_stack_depth;
        self.with_conn(|conn| {
            let frame = fetch_existing(conn, &id)?;
            ancestor_chain(conn, &frame, max_depth)
        })
        .await
    }

    async fn stack_run_counts(&self) -> Result<StatusCounts, StoreError> {
        self.with_conn(|conn| status_counts(conn, TABLE)).await
    }
}
