//! Process-wide engine bootstrap.
//!
//! The first `initialize()` of any store probes the linked SQLite library.
//! Every later caller, from any store instance, gets the same `Engine`.
//! Concurrent first callers all await the one in-flight bootstrap.

use rusqlite::Connection;
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::sync::OnceCell;
use tracing::info;

use crate::error::StoreError;

/// 3.24.0 added `ON CONFLICT ... DO UPDATE`, used by the keystore upsert.
const MIN_SQLITE_VERSION: i32 = 3_024_000;

static ENGINE: OnceCell<Engine> = OnceCell::const_new();
static BOOTSTRAPS: AtomicUsize = AtomicUsize::new(0);

#[derive(Debug)]
pub struct Engine {
    sqlite_version: &'static str,
    sqlite_version_number: i32,
    compile_options: Vec<String>,
}

impl Engine {
    fn bootstrap() -> Result<Self, StoreError> {
        BOOTSTRAPS.fetch_add(1, Ordering::SeqCst);

        let sqlite_version_number = rusqlite::version_number();
        if sqlite_version_number < MIN_SQLITE_VERSION {
            return Err(StoreError::Engine(format!(
                "sqlite {} is too old, need {MIN_SQLITE_VERSION} or newer",
                rusqlite::version()
            )));
        }

        let probe = Connection::open_in_memory()?;
        probe.pragma_update(None, "foreign_keys", true)?;
        let foreign_keys: bool = probe.pragma_query_value(None, "foreign_keys", |row| row.get(0))?;
        if !foreign_keys {
            return Err(StoreError::Engine(
                "sqlite build does not enforce foreign keys".to_string(),
            ));
        }

        let mut stmt = probe.prepare("PRAGMA compile_options")?;
        let compile_options = stmt
            .query_map([], |row| row.get::<_, String>(0))?
            .collect::<Result<Vec<_>, _>>()?;

        let engine = Self {
            sqlite_version: rusqlite::version(),
            sqlite_version_number,
            compile_options,
        };
        info!(
            sqlite = engine.sqlite_version,
            options = engine.compile_options.len(),
            "storage engine ready"
        );
        Ok(engine)
    }

    pub fn sqlite_version(&self) -> &'static str {
        self.sqlite_version
    }

    pub fn sqlite_version_number(&self) -> i32 {
        self.sqlite_version_number
    }

    pub fn compile_options(&self) -> &[String] {
        &self.compile_options
    }
}

/// The shared engine, bootstrapping it on first use.
pub async fn engine() -> Result<&'static Engine, StoreError> {
    ENGINE
        .get_or_try_init(|| async { Engine::bootstrap() })
        .await
}

/// How many times a bootstrap has run in this process.
pub fn bootstrap_count() -> usize {
    BOOTSTRAPS.load(Ordering::SeqCst)
}
