use std::fmt;
use std::path::{Path, PathBuf};

use crate::error::StoreError;

/// Location text that selects an in-memory store.
pub const EPHEMERAL: &str = ":memory:";

/// Environment variable read by [`StoreLocation::from_env`].
pub const STORE_PATH_ENV: &str = "SPINDLE_STORE_PATH";

/// Where a store keeps its data between checkpoints.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreLocation {
    /// In memory only; everything is gone when the store is dropped.
    Ephemeral,

    /// Loaded from and checkpointed to this file.
    File(PathBuf),
}

impl StoreLocation {
    pub fn file(path: impl Into<PathBuf>) -> Self {
        StoreLocation::File(path.into())
    }

    /// `:memory:` selects an ephemeral store, anything else is a file path.
    pub fn parse(text: &str) -> Result<Self, StoreError> {
        let text = text.trim();
        if text.is_empty() {
            return Err(StoreError::InvalidArgument(
                "store location must not be empty".to_string(),
            ));
        }
        if text == EPHEMERAL {
            return Ok(StoreLocation::Ephemeral);
        }
        Ok(StoreLocation::File(PathBuf::from(text)))
    }

    /// Read [`STORE_PATH_ENV`]. Unset means ephemeral.
    pub fn from_env() -> Result<Self, StoreError> {
        Self::from_env_var(STORE_PATH_ENV)
    }

    pub fn from_env_var(name: &str) -> Result<Self, StoreError> {
        match std::env::var(name) {
            Ok(value) => Self::parse(&value),
            Err(std::env::VarError::NotPresent) => Ok(StoreLocation::Ephemeral),
            Err(err) => Err(StoreError::InvalidArgument(format!("{name}: {err}"))),
        }
    }

    pub fn path(&self) -> Option<&Path> {
        match self {
            StoreLocation::Ephemeral => None,
            StoreLocation::File(path) => Some(path),
        }
    }

    pub fn is_ephemeral(&self) -> bool {
        matches!(self, StoreLocation::Ephemeral)
    }
}

impl fmt::Display for StoreLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StoreLocation::Ephemeral => f.write_str(EPHEMERAL),
            StoreLocation::File(path) => write!(f, "{}", path.display()),
        }
    }
}
