//! Outcome reports for initialize and close.
//!
//! Loading a corrupt file or failing a schema statement does not stop a
//! store from opening, and a failed final checkpoint does not stop it from
//! closing. Those events come back here as warnings so callers can tell a
//! clean start from one that lost data.

use std::fmt;
use std::path::PathBuf;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreWarning {
    /// The file could not be loaded; the store started empty.
    LoadFailed { path: PathBuf, reason: String },

    /// A schema statement failed for a reason other than "already exists".
    SchemaSetupFailed { object: &'static str, reason: String },

    /// The working copy could not be written; changes since the last
    /// checkpoint are lost.
    CheckpointFailed { path: PathBuf, reason: String },
}

impl fmt::Display for StoreWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StoreWarning::LoadFailed { path, reason } => write!(
                f,
                "could not load {}, started empty: {reason}",
                path.display()
            ),
            StoreWarning::SchemaSetupFailed { object, reason } => {
                write!(f, "schema setup for {object} failed: {reason}")
            }
            StoreWarning::CheckpointFailed { path, reason } => {
                write!(f, "could not write {}: {reason}", path.display())
            }
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InitReport {
    pub warnings: Vec<StoreWarning>,

    /// False when initialize found the store already open.
    pub opened: bool,
}

impl InitReport {
    /// The store is usable but may be missing data or schema.
    pub fn degraded(&self) -> bool {
        !self.warnings.is_empty()
    }

    pub fn load_failed(&self) -> bool {
        self.warnings
            .iter()
            .any(|warning| matches!(warning, StoreWarning::LoadFailed { .. }))
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CloseReport {
    pub warnings: Vec<StoreWarning>,

    /// The working copy was written to the store file.
    pub checkpointed: bool,

    /// False when close found nothing open.
    pub closed: bool,
}

impl CloseReport {
    pub fn degraded(&self) -> bool {
        !self.warnings.is_empty()
    }
}
