//! Table and index definitions.
//!
//! Every statement is idempotent. Statements run one at a time so a failure
//! names the object it was creating and the rest still get a chance.

use rusqlite::Connection;
use tracing::{debug, error};

use super::report::StoreWarning;

const STATEMENTS: &[(&str, &str)] = &[
    (
        "task_runs",
        "CREATE TABLE IF NOT EXISTS task_runs (
            id              TEXT PRIMARY KEY NOT NULL,
            task_identifier TEXT NOT NULL,
            status          TEXT NOT NULL DEFAULT 'pending',
            input           TEXT,
            result          TEXT,
            error           TEXT,
            created_at      TEXT NOT NULL,
            updated_at      TEXT NOT NULL
        )",
    ),
    (
        "stack_runs",
        "CREATE TABLE IF NOT EXISTS stack_runs (
            id                  TEXT PRIMARY KEY NOT NULL,
            task_run_id         TEXT NOT NULL REFERENCES task_runs(id),
            parent_stack_run_id TEXT REFERENCES stack_runs(id),
            operation           TEXT NOT NULL,
            status              TEXT NOT NULL DEFAULT 'pending',
            input               TEXT,
            result              TEXT,
            error               TEXT,
            suspended_at        TEXT,
            resume_payload      TEXT,
            created_at          TEXT NOT NULL,
            updated_at          TEXT NOT NULL
        )",
    ),
    (
        "task_functions",
        "CREATE TABLE IF NOT EXISTS task_functions (
            id         TEXT PRIMARY KEY NOT NULL,
            identifier TEXT NOT NULL UNIQUE,
            code       TEXT NOT NULL,
            metadata   TEXT,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL
        )",
    ),
    (
        "keystore",
        "CREATE TABLE IF NOT EXISTS keystore (
            key        TEXT PRIMARY KEY NOT NULL,
            value      TEXT NOT NULL,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL
        )",
    ),
    (
        "idx_task_runs_task_identifier",
        "CREATE INDEX IF NOT EXISTS idx_task_runs_task_identifier ON task_runs(task_identifier)",
    ),
    (
        "idx_task_runs_status",
        "CREATE INDEX IF NOT EXISTS idx_task_runs_status ON task_runs(status)",
    ),
    (
        "idx_stack_runs_task_run_id",
        "CREATE INDEX IF NOT EXISTS idx_stack_runs_task_run_id ON stack_runs(task_run_id)",
    ),
    (
        "idx_stack_runs_status",
        "CREATE INDEX IF NOT EXISTS idx_stack_runs_status ON stack_runs(status)",
    ),
    (
        "idx_stack_runs_parent",
        "CREATE INDEX IF NOT EXISTS idx_stack_runs_parent ON stack_runs(parent_stack_run_id)",
    ),
    (
        "idx_stack_runs_pending_work",
        "CREATE INDEX IF NOT EXISTS idx_stack_runs_pending_work ON stack_runs(status, created_at)",
    ),
];

/// Create whatever is missing. Failures other than "already exists" are
/// logged and returned as warnings; they never abort initialization.
pub(crate) fn ensure(conn: &Connection) -> Vec<StoreWarning> {
    let mut warnings = Vec::new();
    for &(object, sql) in STATEMENTS {
        match conn.execute_batch(sql) {
            Ok(()) => {}
            Err(err) if err.to_string().contains("already exists") => {
                debug!(object, "schema object already exists");
            }
            Err(err) => {
                error!(object, %err, "schema setup failed");
                warnings.push(StoreWarning::SchemaSetupFailed {
                    object,
                    reason: err.to_string(),
                });
            }
        }
    }
    warnings
}
