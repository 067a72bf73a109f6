//! Strongly-typed identifiers for stored records.
//!
//! Every id is a ULID wrapped in `Id<T>`, where `T` is a zero-sized marker.
//! The marker costs nothing at runtime but keeps a `StackRunId` from being
//! passed where a `TaskRunId` is expected.
//!
//! The textual form is `<prefix><ulid>` (for example `taskrun-01HV...`). That
//! text is what the store persists and what callers parse back; parsing
//! rejects anything structurally different.

use rusqlite::types::{FromSql, FromSqlError, FromSqlResult, ToSql, ToSqlOutput, ValueRef};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::marker::PhantomData;
use std::str::FromStr;
use ulid::Ulid;

use crate::error::StoreError;

/// Marker trait for id kinds.
pub trait IdMarker: Send + Sync + 'static {
    /// Prefix used by `Display` and required by `FromStr` (e.g. "taskrun-").
    fn prefix() -> &'static str;

    /// Human-readable record kind, used in error messages.
    fn entity() -> &'static str;
}

#[repr(transparent)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Id<T: IdMarker> {
    ulid: Ulid,
    _marker: PhantomData<T>,
}

impl<T: IdMarker> Id<T> {
    pub fn from_ulid(ulid: Ulid) -> Self {
        Self {
            ulid,
            _marker: PhantomData,
        }
    }

    pub fn as_ulid(&self) -> Ulid {
        self.ulid
    }

    /// Parse `<prefix><ulid>` text.
    ///
    /// Fails with [`StoreError::InvalidArgument`] when the prefix is missing or
    /// the remainder is not a ULID.
    pub fn parse(text: &str) -> Result<Self, StoreError> {
        let rest = text.strip_prefix(T::prefix()).ok_or_else(|| {
            StoreError::InvalidArgument(format!(
                "{} id must start with '{}', got '{text}'",
                T::entity(),
                T::prefix()
            ))
        })?;
        let ulid = Ulid::from_string(rest).map_err(|err| {
            StoreError::InvalidArgument(format!("malformed {} id '{text}': {err}", T::entity()))
        })?;
        Ok(Self::from_ulid(ulid))
    }
}

impl<T: IdMarker> From<Ulid> for Id<T> {
    fn from(ulid: Ulid) -> Self {
        Self::from_ulid(ulid)
    }
}

impl<T: IdMarker> fmt::Display for Id<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", T::prefix(), self.ulid)
    }
}

impl<T: IdMarker> FromStr for Id<T> {
    type Err = StoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl<T: IdMarker> Serialize for Id<T> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de, T: IdMarker> Deserialize<'de> for Id<T> {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let text = String::deserialize(deserializer)?;
        Self::parse(&text).map_err(serde::de::Error::custom)
    }
}

impl<T: IdMarker> ToSql for Id<T> {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(ToSqlOutput::from(self.to_string()))
    }
}

impl<T: IdMarker> FromSql for Id<T> {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        let text = value.as_str()?;
        Self::parse(text).map_err(|err| FromSqlError::Other(Box::new(err)))
    }
}

// ========================================
// Markers
// ========================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum TaskRunKind {}

impl IdMarker for TaskRunKind {
    fn prefix() -> &'static str {
        "taskrun-"
    }

    fn entity() -> &'static str {
        "task run"
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum StackRunKind {}

impl IdMarker for StackRunKind {
    fn prefix() -> &'static str {
        "stackrun-"
    }

    fn entity() -> &'static str {
        "stack run"
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum TaskFunctionKind {}

impl IdMarker for TaskFunctionKind {
    fn prefix() -> &'static str {
        "taskfn-"
    }

    fn entity() -> &'static str {
        "task function"
    }
}

/// Identifier of a top-level task invocation.
pub type TaskRunId = Id<TaskRunKind>;

/// Identifier of one frame in a task run's persisted call stack.
pub type StackRunId = Id<StackRunKind>;

/// Identifier of a stored task function record.
pub type TaskFunctionId = Id<TaskFunctionKind>;
