//! StoreBuilder - configuring and wiring a store.
//!
//! Nothing here touches the filesystem; problems are caught at `build()` so
//! a misconfigured store never gets as far as `initialize()`.

use std::sync::Arc;

use super::SqliteStore;
use super::location::StoreLocation;
use crate::error::StoreError;
use crate::ports::{Clock, IdGenerator, SystemClock, UlidGenerator};

/// Longest ancestor chain a stack run may have unless configured otherwise.
pub const DEFAULT_MAX_STACK_DEPTH: usize = 1024;

/// Everything a store needs, fully resolved.
pub struct StoreConfig {
    pub location: StoreLocation,
    pub clock: Arc<dyn Clock>,
    pub id_generator: Arc<dyn IdGenerator>,
    pub max_stack_depth: usize,
}

impl StoreConfig {
    /// System clock and ULID ids.
    pub fn new(location: StoreLocation) -> Self {
        let clock: Arc<dyn Clock> = Arc::new(SystemClock);
        Self {
            location,
            id_generator: Arc::new(UlidGenerator::new(clock.clone())),
            clock,
            max_stack_depth: DEFAULT_MAX_STACK_DEPTH,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum BuildError {
    #[error("no store location given; use .ephemeral(), .path(..) or .location_from_env()")]
    MissingLocation,

    #[error("invalid store location: {0}")]
    InvalidLocation(#[source] StoreError),

    #[error("max stack depth must be at least 1")]
    ZeroStackDepth,
}

/// Builds a [`SqliteStore`].
///
/// ```ignore
/// let store = StoreBuilder::new()
///     .path("data/spindle.db")
///     .clock(clock.clone())
///     .build()?;
/// ```
///
/// When only a clock is given, ids are generated from that clock too.
#[derive(Default)]
pub struct StoreBuilder {
    location: Option<Result<StoreLocation, StoreError>>,
    clock: Option<Arc<dyn Clock>>,
    id_generator: Option<Arc<dyn IdGenerator>>,
    max_stack_depth: Option<usize>,
}

impl StoreBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn location(mut self, location: StoreLocation) -> Self {
        self.location = Some(Ok(location));
        self
    }

    pub fn ephemeral(self) -> Self {
        self.location(StoreLocation::Ephemeral)
    }

    pub fn path(self, path: impl Into<std::path::PathBuf>) -> Self {
        self.location(StoreLocation::file(path))
    }

    /// Read the location from `SPINDLE_STORE_PATH`; unset means ephemeral.
    pub fn location_from_env(mut self) -> Self {
        self.location = Some(StoreLocation::from_env());
        self
    }

    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    pub fn id_generator(mut self, id_generator: Arc<dyn IdGenerator>) -> Self {
        self.id_generator = Some(id_generator);
        self
    }

    pub fn max_stack_depth(mut self, depth: usize) -> Self {
        self.max_stack_depth = Some(depth);
        self
    }

    pub fn config(self) -> Result<StoreConfig, BuildError> {
        let location = self
            .location
            .ok_or(BuildError::MissingLocation)?
            .map_err(BuildError::InvalidLocation)?;

        let max_stack_depth = self.max_stack_depth.unwrap_or(DEFAULT_MAX_STACK_DEPTH);
        if max_stack_depth == 0 {
            return Err(BuildError::ZeroStackDepth);
        }

        let clock = self.clock.unwrap_or_else(|| Arc::new(SystemClock));
        let id_generator = self
            .id_generator
            .unwrap_or_else(|| Arc::new(UlidGenerator::new(clock.clone())));

        Ok(StoreConfig {
            location,
            clock,
            id_generator,
            max_stack_depth,
        })
    }

    pub fn build(self) -> Result<SqliteStore, BuildError> {
        Ok(SqliteStore::new(self.config()?))
    }
}
