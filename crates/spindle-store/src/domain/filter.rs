//! Query filters: field name -> exact value, or field name -> set of values.
//!
//! Conditions on different fields are ANDed. A set condition matches when the
//! field equals any member. Which field names are legal depends on the table
//! being queried and is checked by the store.

use serde_json::Value;
use std::collections::BTreeMap;

use super::ids::{Id, IdMarker};
use super::state::RunStatus;
use crate::error::StoreError;

/// A filterable value. `Null` matches an absent (SQL NULL) column.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Scalar {
    Null,
    Text(String),
    Integer(i64),
}

impl From<&str> for Scalar {
    fn from(value: &str) -> Self {
        Scalar::Text(value.to_string())
    }
}

impl From<String> for Scalar {
    fn from(value: String) -> Self {
        Scalar::Text(value)
    }
}

impl From<i64> for Scalar {
    fn from(value: i64) -> Self {
        Scalar::Integer(value)
    }
}

impl From<RunStatus> for Scalar {
    fn from(value: RunStatus) -> Self {
        Scalar::Text(value.as_str().to_string())
    }
}

impl<T: IdMarker> From<Id<T>> for Scalar {
    fn from(value: Id<T>) -> Self {
        Scalar::Text(value.to_string())
    }
}

impl<T: Into<Scalar>> From<Option<T>> for Scalar {
    fn from(value: Option<T>) -> Self {
        value.map_or(Scalar::Null, Into::into)
    }
}

impl TryFrom<&Value> for Scalar {
    type Error = StoreError;

    fn try_from(value: &Value) -> Result<Self, Self::Error> {
        match value {
            Value::Null => Ok(Scalar::Null),
            Value::String(text) => Ok(Scalar::Text(text.clone())),
            Value::Number(number) => number.as_i64().map(Scalar::Integer).ok_or_else(|| {
                StoreError::InvalidArgument(format!("filter number {number} is not an integer"))
            }),
            other => Err(StoreError::InvalidArgument(format!(
                "filter values must be scalars, got {other}"
            ))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Condition {
    Equals(Scalar),
    AnyOf(Vec<Scalar>),
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Filter {
    conditions: BTreeMap<String, Condition>,
}

impl Filter {
    /// An empty filter matches every record.
    pub fn new() -> Self {
        Self::default()
    }

    /// `field == value`. A later condition on the same field replaces this one.
    pub fn eq(mut self, field: impl Into<String>, value: impl Into<Scalar>) -> Self {
        self.conditions
            .insert(field.into(), Condition::Equals(value.into()));
        self
    }

    /// `field` is any of `values`. An empty set matches nothing.
    pub fn any_of<I, V>(mut self, field: impl Into<String>, values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Scalar>,
    {
        let values = values.into_iter().map(Into::into).collect();
        self.conditions
            .insert(field.into(), Condition::AnyOf(values));
        self
    }

    pub fn status(self, status: RunStatus) -> Self {
        self.eq("status", status)
    }

    pub fn status_in(self, statuses: impl IntoIterator<Item = RunStatus>) -> Self {
        self.any_of("status", statuses)
    }

    pub fn is_empty(&self) -> bool {
        self.conditions.is_empty()
    }

    pub fn conditions(&self) -> impl Iterator<Item = (&str, &Condition)> {
        self.conditions
            .iter()
            .map(|(field, condition)| (field.as_str(), condition))
    }
}

/// Build a filter from a JSON object such as
/// `{"status": ["pending", "suspended_waiting_child"], "operation": "fetch"}`.
impl TryFrom<&Value> for Filter {
    type Error = StoreError;

    fn try_from(value: &Value) -> Result<Self, Self::Error> {
        let Value::Object(map) = value else {
            return Err(StoreError::InvalidArgument(
                "filter must be a JSON object".to_string(),
            ));
        };
        let mut filter = Filter::new();
        for (field, value) in map {
            filter = match value {
                Value::Array(items) => {
                    let values = items
                        .iter()
                        .map(Scalar::try_from)
                        .collect::<Result<Vec<_>, _>>()?;
                    filter.any_of(field.clone(), values)
                }
                scalar => filter.eq(field.clone(), Scalar::try_from(scalar)?),
            };
        }
        Ok(filter)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn later_condition_on_same_field_wins() {
        let filter = Filter::new()
            .status(RunStatus::Pending)
            .status(RunStatus::Running);
        let conditions: Vec<_> = filter.conditions().collect();
        assert_eq!(
            conditions,
            vec![("status", &Condition::Equals(Scalar::from("running")))]
        );
    }

    #[test]
    fn option_maps_none_to_null() {
        let none: Option<&str> = None;
        assert_eq!(Scalar::from(none), Scalar::Null);
        assert_eq!(Scalar::from(Some("x")), Scalar::Text("x".into()));
    }

    #[test]
    fn json_object_becomes_filter() {
        let filter = Filter::try_from(&json!({
            "status": ["pending", "suspended_waiting_child"],
            "operation": "fetch",
            "parent_stack_run_id": null,
        }))
        .unwrap();
        let expected = Filter::new()
            .status_in(RunStatus::PENDING_WORK)
            .eq("operation", "fetch")
            .eq("parent_stack_run_id", Scalar::Null);
        assert_eq!(filter, expected);
    }

    #[test]
    fn json_rejects_nested_values() {
        let err = Filter::try_from(&json!({"input": {"a": 1}})).unwrap_err();
        assert!(matches!(err, StoreError::InvalidArgument(_)));
        let err = Filter::try_from(&json!(["status"])).unwrap_err();
        assert!(matches!(err, StoreError::InvalidArgument(_)));
    }
}
