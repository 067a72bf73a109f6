//! Moving the working copy between memory and disk.
//!
//! The file is a plain SQLite database. Loading copies it page by page into
//! a fresh in-memory connection; writing copies the connection into a
//! sibling temp file and renames it over the target, so a crash mid-write
//! leaves the previous checkpoint intact.

use rusqlite::backup::Progress;
use rusqlite::{Connection, DatabaseName};
use std::ffi::OsString;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::error::StoreError;

/// Create missing parent directories of `path`.
pub(crate) fn prepare_parent(path: &Path) -> Result<(), StoreError> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        fs::create_dir_all(parent)?;
    }
    Ok(())
}

/// An in-memory connection holding the contents of `path`, or an empty one
/// when nothing exists there yet.
pub(crate) fn load(path: &Path) -> Result<Connection, StoreError> {
    let mut conn = Connection::open_in_memory()?;
    if !path.exists() {
        debug!(path = %path.display(), "no store file yet, starting empty");
        return Ok(conn);
    }

    conn.restore(DatabaseName::Main, path, None::<fn(Progress)>)?;
    let verdict: String = conn.query_row("PRAGMA quick_check", [], |row| row.get(0))?;
    if verdict != "ok" {
        return Err(StoreError::Engine(format!("integrity check failed: {verdict}")));
    }
    debug!(path = %path.display(), "store file loaded");
    Ok(conn)
}

/// Write the whole of `conn` to `path`, replacing what was there.
pub(crate) fn write(conn: &Connection, path: &Path) -> Result<(), StoreError> {
    let staging = staging_path(path);
    if staging.exists() {
        fs::remove_file(&staging)?;
    }
    if let Err(err) = conn.backup(DatabaseName::Main, &staging, None) {
        let _ = fs::remove_file(&staging);
        return Err(err.into());
    }
    fs::rename(&staging, path)?;
    Ok(())
}

fn staging_path(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map(OsString::from)
        .unwrap_or_else(|| OsString::from("store"));
    name.push(".checkpoint");
    path.with_file_name(name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn missing_file_loads_empty() {
        let dir = tempdir().unwrap();
        let conn = load(&dir.path().join("absent.db")).unwrap();
        let tables: i64 = conn
            .query_row("SELECT COUNT(*) FROM sqlite_master", [], |row| row.get(0))
            .unwrap();
        assert_eq!(tables, 0);
    }

    #[test]
    fn written_file_loads_back() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested").join("spindle.db");
        prepare_parent(&path).unwrap();

        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch("CREATE TABLE t (v TEXT); INSERT INTO t VALUES ('kept');")
            .unwrap();
        write(&conn, &path).unwrap();
        assert!(!staging_path(&path).exists());

        let loaded = load(&path).unwrap();
        let v: String = loaded.query_row("SELECT v FROM t", [], |row| row.get(0)).unwrap();
        assert_eq!(v, "kept");
    }

    #[test]
    fn garbage_file_fails_to_load() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("garbage.db");
        fs::write(&path, vec![0xAB_u8; 4096]).unwrap();
        assert!(load(&path).is_err());
    }

    #[test]
    fn staging_path_is_a_sibling() {
        let staged = staging_path(Path::new("/var/lib/spindle.db"));
        assert_eq!(staged, Path::new("/var/lib/spindle.db.checkpoint"));
    }
}
