//! SqliteStore - the embedded record store behind every port.
//!
//! # Working copy
//! All reads and writes go to an in-memory SQLite connection. A file-backed
//! store fills it from disk on [`SqliteStore::initialize`] and writes it back
//! on [`SqliteStore::checkpoint`] and [`SqliteStore::close`]. Writes made
//! after the last checkpoint are lost if the process dies.
//!
//! # Lifecycle
//! `Uninitialized -> Open -> Closed`, and `Closed -> Open` again through
//! `initialize()`. Data operations outside `Open` fail with
//! [`StoreError::Uninitialized`] or [`StoreError::Closed`].
//!
//! # Concurrency
//! One mutex guards the connection. Each operation takes it, runs its
//! statements synchronously, and releases it; nothing awaits while a
//! statement is alive.

mod builder;
mod codec;
mod engine;
mod keystore;
mod location;
mod report;
mod schema;
mod snapshot;
mod sql;
mod stack_runs;
mod task_functions;
mod task_runs;

pub use builder::{BuildError, DEFAULT_MAX_STACK_DEPTH, StoreBuilder, StoreConfig};
pub use engine::{Engine, bootstrap_count, engine};
pub use location::{EPHEMERAL, STORE_PATH_ENV, StoreLocation};
pub use report::{CloseReport, InitReport, StoreWarning};

use chrono::{DateTime, SubsecRound, Utc};
use rusqlite::Connection;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, error, info};

use crate::error::StoreError;
use crate::observability::StatusCounts;
use crate::ports::{Clock, IdGenerator};
use codec::PayloadCodec;

enum StoreState {
    Uninitialized,
    Open(Connection),
    Closed,
}

pub struct SqliteStore {
    location: StoreLocation,
    clock: Arc<dyn Clock>,
    ids: Arc<dyn IdGenerator>,
    max_stack_depth: usize,
    state: Mutex<StoreState>,
}

impl SqliteStore {
    /// Construction does no I/O; call [`initialize`](Self::initialize) next.
    pub fn new(config: StoreConfig) -> Self {
        Self {
            location: config.location,
            clock: config.clock,
            ids: config.id_generator,
            max_stack_depth: config.max_stack_depth,
            state: Mutex::new(StoreState::Uninitialized),
        }
    }

    pub fn builder() -> StoreBuilder {
        StoreBuilder::new()
    }

    pub fn at(location: StoreLocation) -> Self {
        Self::new(StoreConfig::new(location))
    }

    pub fn ephemeral() -> Self {
        Self::at(StoreLocation::Ephemeral)
    }

    pub fn location(&self) -> &StoreLocation {
        &self.location
    }

    pub fn is_ephemeral(&self) -> bool {
        self.location.is_ephemeral()
    }

    pub async fn is_open(&self) -> bool {
        matches!(*self.state.lock().await, StoreState::Open(_))
    }

    /// Open the store: bootstrap the shared engine, load the file (if any)
    /// and make sure the schema exists.
    ///
    /// A file that cannot be loaded does not fail initialization. The store
    /// starts empty and the report carries [`StoreWarning::LoadFailed`].
    /// Calling this on an open store does nothing.
    pub async fn initialize(&self) -> Result<InitReport, StoreError> {
        let engine = engine().await?;

        let mut state = self.state.lock().await;
        if matches!(*state, StoreState::Open(_)) {
            debug!(location = %self.location, "store already open");
            return Ok(InitReport::default());
        }

        let mut report = InitReport {
            opened: true,
            ..InitReport::default()
        };

        let conn = match self.location.path() {
            None => Connection::open_in_memory()?,
            Some(path) => {
                snapshot::prepare_parent(path)?;
                match snapshot::load(path) {
                    Ok(conn) => conn,
                    Err(err) => {
                        error!(path = %path.display(), %err, "store file unreadable, starting empty");
                        report.warnings.push(StoreWarning::LoadFailed {
                            path: path.to_path_buf(),
                            reason: err.to_string(),
                        });
                        Connection::open_in_memory()?
                    }
                }
            }
        };
        conn.pragma_update(None, "foreign_keys", true)?;
        report.warnings.extend(schema::ensure(&conn));

        *state = StoreState::Open(conn);
        info!(
            location = %self.location,
            sqlite = engine.sqlite_version(),
            warnings = report.warnings.len(),
            "store initialized"
        );
        Ok(report)
    }

    /// Write the working copy to the store file now. Does nothing for an
    /// ephemeral store.
    pub async fn checkpoint(&self) -> Result<(), StoreError> {
        let state = self.state.lock().await;
        let conn = match &*state {
            StoreState::Open(conn) => conn,
            StoreState::Uninitialized => return Err(StoreError::Uninitialized),
            StoreState::Closed => return Err(StoreError::Closed),
        };
        let Some(path) = self.location.path() else {
            return Ok(());
        };
        snapshot::write(conn, path)?;
        info!(path = %path.display(), "checkpoint written");
        Ok(())
    }

    /// Write the working copy (file-backed stores) and release the
    /// connection.
    ///
    /// A failed write is reported, not raised: the connection is released
    /// either way and unwritten changes are gone. Closing a store that is not
    /// open does nothing.
    pub async fn close(&self) -> CloseReport {
        let mut state = self.state.lock().await;
        if !matches!(*state, StoreState::Open(_)) {
            debug!(location = %self.location, "close on a store that is not open");
            return CloseReport::default();
        }
        let StoreState::Open(conn) = std::mem::replace(&mut *state, StoreState::Closed) else {
            return CloseReport::default();
        };

        let mut report = CloseReport {
            closed: true,
            ..CloseReport::default()
        };
        if let Some(path) = self.location.path() {
            match snapshot::write(&conn, path) {
                Ok(()) => report.checkpointed = true,
                Err(err) => {
                    error!(path = %path.display(), %err, "final checkpoint failed, changes lost");
                    report.warnings.push(StoreWarning::CheckpointFailed {
                        path: path.to_path_buf(),
                        reason: err.to_string(),
                    });
                }
            }
        }
        if let Err((_, err)) = conn.close() {
            error!(%err, "sqlite connection did not close cleanly");
        }

        info!(
            location = %self.location,
            checkpointed = report.checkpointed,
            "store closed"
        );
        report
    }

    /// Current time at the precision the store persists, so a returned
    /// record equals the same record read back.
    pub(crate) fn now(&self) -> DateTime<Utc> {
        self.clock.now().trunc_subsecs(6)
    }

    /// Run `op` against the open connection.
    pub(crate) async fn with_conn<T, F>(&self, op: F) -> Result<T, StoreError>
    where
        F: FnOnce(&mut Connection) -> Result<T, StoreError> + Send,
    {
        let mut state = self.state.lock().await;
        match &mut *state {
            StoreState::Open(conn) => op(conn),
            StoreState::Uninitialized => Err(StoreError::Uninitialized),
            StoreState::Closed => Err(StoreError::Closed),
        }
    }
}

/// Records per status in a run table.
fn status_counts(conn: &Connection, table: &str) -> Result<StatusCounts, StoreError> {
    let mut stmt = conn.prepare(&format!(
        "SELECT status, COUNT(*) FROM {table} GROUP BY status"
    ))?;
    let rows = stmt
        .query_map([], |row| Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?)))?
        .collect::<Result<Vec<_>, _>>()?;

    let mut counts = StatusCounts::default();
    for (status, n) in rows {
        let status = PayloadCodec::decode_status(&status)?;
        counts.add(status, usize::try_from(n).unwrap_or_default());
    }
    Ok(counts)
}


#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{
        Filter, NewStackRun, NewTaskFunction, NewTaskRun, RunStatus, StackRunPatch, TaskRunPatch,
    };
    use crate::ports::{FunctionCatalog, Keystore, StackRunHierarchy, TaskRunRegistry};
    use chrono::Duration;
    use serde_json::json;
    use tempfile::tempdir;

    #[tokio::test]
    async fn operations_before_initialize_fail_fast() {
        let store = SqliteStore::ephemeral();
        let err = store
            .create_task_run(NewTaskRun::new("sync-inventory"))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Uninitialized));
        assert!(matches!(
            store.checkpoint().await,
            Err(StoreError::Uninitialized)
        ));
    }

    #[tokio::test]
    async fn initialize_twice_is_a_no_op() {
        let store = SqliteStore::ephemeral();
        assert!(store.initialize().await.unwrap().opened);
        store
            .create_task_run(NewTaskRun::new("sync-inventory"))
            .await
            .unwrap();

        let again = store.initialize().await.unwrap();
        assert!(!again.opened);
        let all = store.query_task_runs(&Filter::new()).await.unwrap();
        assert_eq!(all.len(), 1);
    }

    #[tokio::test]
    async fn close_is_idempotent_and_blocks_further_use() {
        let store = SqliteStore::ephemeral();
        assert!(!store.close().await.closed);

        store.initialize().await.unwrap();
        let first = store.close().await;
        assert!(first.closed && !first.checkpointed && !first.degraded());
        assert!(!store.close().await.closed);

        let err = store.get_task_run(crate::domain::TaskRunId::from(ulid::Ulid::new())).await;
        assert!(matches!(err, Err(StoreError::Closed)));
    }

    #[tokio::test]
    async fn ephemeral_stores_are_isolated() {
        let (a, _) = testing::open_store().await;
        let (b, _) = testing::open_store().await;
        let run = a.create_task_run(NewTaskRun::new("only-in-a")).await.unwrap();

        assert!(b.get_task_run(run.id).await.unwrap().is_none());
        assert!(b.query_task_runs(&Filter::new()).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn file_store_survives_close_and_reopen() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("state").join("spindle.db");

        let store = SqliteStore::at(StoreLocation::file(&path));
        store.initialize().await.unwrap();
        let run = store
            .create_task_run(NewTaskRun::new("sync-inventory").with_input(serde_json::json!({"sku": 7})))
            .await
            .unwrap();
        let report = store.close().await;
        assert!(report.checkpointed);
        assert!(path.exists());

        let reopened = SqliteStore::at(StoreLocation::file(&path));
        let init = reopened.initialize().await.unwrap();
        assert!(!init.degraded());
        let loaded = reopened.get_task_run(run.id).await.unwrap().unwrap();
        assert_eq!(loaded, run);
    }

    #[tokio::test]
    async fn suspended_hierarchy_and_catalog_survive_restart() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("spindle.db");
        let (store, clock) = testing::open_store_with(StoreBuilder::new().path(&path)).await;

        let task = store
            .create_task_run(NewTaskRun::new("build-report").with_input(json!({"pages": 2})))
            .await
            .unwrap();
        let parent = store
            .create_stack_run(NewStackRun::new(task.id, "report").with_status(RunStatus::Running))
            .await
            .unwrap();
        clock.advance(Duration::seconds(1));
        let parent = store
            .update_stack_run(parent.id, StackRunPatch::suspend_waiting_child(clock.now()))
            .await
            .unwrap();
        clock.advance(Duration::seconds(1));
        let child = store
            .create_stack_run(
                NewStackRun::child_of(task.id, parent.id, "fetch").with_input(json!({"page": 1})),
            )
            .await
            .unwrap();
        clock.advance(Duration::seconds(1));
        let resumed = store
            .create_stack_run(NewStackRun::new(task.id, "approve").with_status(RunStatus::Running))
            .await
            .unwrap();
        let resumed = store
            .update_stack_run(resumed.id, StackRunPatch::suspend(clock.now()))
            .await
            .unwrap();
        let resumed = store
            .update_stack_run(resumed.id, StackRunPatch::resume(json!({"approved_by": "ops"})))
            .await
            .unwrap();
        let function = store
            .store_task_function(
                NewTaskFunction::new("fetch", "return page")
                    .with_metadata(json!({"timeout_ms": 2500, "ratio": 0.1})),
            )
            .await
            .unwrap();
        store
            .set_keystore("api", json!({"base": "https://example.test", "retries": 3}))
            .await
            .unwrap();

        let pending_before = store.pending_work().await.unwrap();
        assert_eq!(
            pending_before.iter().map(|frame| frame.id).collect::<Vec<_>>(),
            [parent.id, child.id]
        );
        assert!(store.close().await.checkpointed);

        let reopened = SqliteStore::at(StoreLocation::file(&path));
        assert!(!reopened.initialize().await.unwrap().degraded());

        assert_eq!(reopened.get_task_run(task.id).await.unwrap(), Some(task));
        assert_eq!(reopened.get_stack_run(parent.id).await.unwrap(), Some(parent.clone()));
        assert_eq!(reopened.get_stack_run(child.id).await.unwrap(), Some(child.clone()));
        assert_eq!(reopened.get_stack_run(resumed.id).await.unwrap(), Some(resumed.clone()));
        assert!(parent.suspended_at.is_some());
        assert_eq!(child.parent_stack_run_id, Some(parent.id));
        assert_eq!(resumed.resume_payload, Some(json!({"approved_by": "ops"})));

        assert_eq!(reopened.get_task_function("fetch").await.unwrap(), Some(function));
        assert_eq!(
            reopened.get_keystore("api").await.unwrap(),
            Some(json!({"base": "https://example.test", "retries": 3}))
        );
        assert_eq!(reopened.pending_work().await.unwrap(), pending_before);
        assert_eq!(reopened.children(parent.id).await.unwrap(), [child]);
    }

    #[tokio::test]
    async fn closed_store_reopens_from_its_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("spindle.db");
        let store = SqliteStore::at(StoreLocation::file(&path));
        store.initialize().await.unwrap();
        let run = store.create_task_run(NewTaskRun::new("t")).await.unwrap();
        store.close().await;

        assert!(store.initialize().await.unwrap().opened);
        assert!(store.get_task_run(run.id).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn checkpoint_persists_without_closing() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("spindle.db");
        let store = SqliteStore::at(StoreLocation::file(&path));
        store.initialize().await.unwrap();
        let run = store.create_task_run(NewTaskRun::new("t")).await.unwrap();
        store.checkpoint().await.unwrap();

        // still open and writable
        store
            .update_task_run(run.id, TaskRunPatch::new().status(RunStatus::Running))
            .await
            .unwrap();

        let other = SqliteStore::at(StoreLocation::file(&path));
        other.initialize().await.unwrap();
        let seen = other.get_task_run(run.id).await.unwrap().unwrap();
        assert_eq!(seen.status, RunStatus::Pending);
    }

    #[tokio::test]
    async fn corrupt_file_degrades_to_empty_store_with_warning() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("spindle.db");
        std::fs::write(&path, vec![0x5A_u8; 8192]).unwrap();

        let store = SqliteStore::at(StoreLocation::file(&path));
        let report = store.initialize().await.unwrap();
        assert!(report.degraded() && report.load_failed());
        assert!(store.query_task_runs(&Filter::new()).await.unwrap().is_empty());

        // the store is usable and the next close replaces the bad file
        store.create_task_run(NewTaskRun::new("t")).await.unwrap();
        assert!(store.close().await.checkpointed);
        let fresh = SqliteStore::at(StoreLocation::file(&path));
        assert!(!fresh.initialize().await.unwrap().degraded());
    }

    #[tokio::test]
    async fn failed_final_checkpoint_still_closes() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("spindle.db");
        let store = SqliteStore::at(StoreLocation::file(&path));
        store.initialize().await.unwrap();

        // a directory where the file should go makes the rename fail
        std::fs::create_dir(&path).unwrap();
        let report = store.close().await;
        assert!(report.closed && !report.checkpointed);
        assert!(matches!(
            report.warnings.as_slice(),
            [StoreWarning::CheckpointFailed { .. }]
        ));
        assert!(!store.is_open().await);
    }
}
