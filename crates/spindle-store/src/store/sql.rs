//! SQL composition for filters and partial updates.
//!
//! Column names never come from callers verbatim: filter fields are matched
//! against a per-table whitelist first, and update columns are static.

use rusqlite::types::Value as SqlValue;
use rusqlite::{Connection, params_from_iter};

use crate::domain::{Condition, Filter, RunStatus, Scalar};
use crate::error::StoreError;

impl From<&Scalar> for SqlValue {
    fn from(scalar: &Scalar) -> Self {
        match scalar {
            Scalar::Null => SqlValue::Null,
            Scalar::Text(text) => SqlValue::Text(text.clone()),
            Scalar::Integer(n) => SqlValue::Integer(*n),
        }
    }
}

/// `WHERE ...` text (empty for an empty filter) plus positional parameters.
#[derive(Debug, Default, PartialEq)]
pub(crate) struct WhereClause {
    pub(crate) sql: String,
    pub(crate) params: Vec<SqlValue>,
}

impl WhereClause {
    pub(crate) fn build(
        filter: &Filter,
        table: &str,
        filterable: &[&'static str],
    ) -> Result<Self, StoreError> {
        let mut terms = Vec::new();
        let mut params = Vec::new();

        for (field, condition) in filter.conditions() {
            let column = filterable
                .iter()
                .find(|column| **column == field)
                .ok_or_else(|| {
                    StoreError::InvalidArgument(format!(
                        "{table} cannot be filtered by '{field}' (allowed: {})",
                        filterable.join(", ")
                    ))
                })?;
            if *column == "status" {
                check_status_values(condition)?;
            }

            match condition {
                Condition::Equals(Scalar::Null) => terms.push(format!("{column} IS NULL")),
                Condition::Equals(value) => {
                    params.push(SqlValue::from(value));
                    terms.push(format!("{column} = ?{}", params.len()));
                }
                Condition::AnyOf(values) => {
                    let mut placeholders = Vec::new();
                    let mut include_null = false;
                    for value in values {
                        if *value == Scalar::Null {
                            include_null = true;
                            continue;
                        }
                        params.push(SqlValue::from(value));
                        placeholders.push(format!("?{}", params.len()));
                    }
                    let mut alternatives = Vec::new();
                    if !placeholders.is_empty() {
                        alternatives.push(format!("{column} IN ({})", placeholders.join(", ")));
                    }
                    if include_null {
                        alternatives.push(format!("{column} IS NULL"));
                    }
                    if alternatives.is_empty() {
                        // empty set
                        terms.push("0".to_string());
                    } else {
                        terms.push(format!("({})", alternatives.join(" OR ")));
                    }
                }
            }
        }

        let sql = if terms.is_empty() {
            String::new()
        } else {
            format!(" WHERE {}", terms.join(" AND "))
        };
        Ok(Self { sql, params })
    }
}

/// Status conditions must name known statuses; a typo would otherwise
/// silently match nothing.
fn check_status_values(condition: &Condition) -> Result<(), StoreError> {
    let values = match condition {
        Condition::Equals(value) => std::slice::from_ref(value),
        Condition::AnyOf(values) => values.as_slice(),
    };
    for value in values {
        match value {
            Scalar::Null => {}
            Scalar::Text(text) => {
                text.parse::<RunStatus>()?;
            }
            Scalar::Integer(n) => {
                return Err(StoreError::InvalidArgument(format!(
                    "status must be text, got {n}"
                )));
            }
        }
    }
    Ok(())
}

/// Column assignments for an `UPDATE ... WHERE id = ?`.
#[derive(Debug, Default)]
pub(crate) struct Assignments {
    columns: Vec<&'static str>,
    values: Vec<SqlValue>,
}

impl Assignments {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn set(&mut self, column: &'static str, value: impl Into<SqlValue>) {
        self.columns.push(column);
        self.values.push(value.into());
    }

    pub(crate) fn set_optional(&mut self, column: &'static str, value: Option<String>) {
        self.set(column, value.map_or(SqlValue::Null, SqlValue::Text));
    }

    pub(crate) fn sql(&self, table: &str) -> String {
        let sets: Vec<String> = self
            .columns
            .iter()
            .enumerate()
            .map(|(i, column)| format!("{column} = ?{}", i + 1))
            .collect();
        format!(
            "UPDATE {table} SET {} WHERE id = ?{}",
            sets.join(", "),
            self.columns.len() + 1
        )
    }

    /// Returns the number of rows changed.
    pub(crate) fn execute(
        self,
        conn: &Connection,
        table: &str,
        id: String,
    ) -> Result<usize, StoreError> {
        let sql = self.sql(table);
        let mut values = self.values;
        values.push(SqlValue::Text(id));
        Ok(conn.execute(&sql, params_from_iter(values))?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const FIELDS: &[&str] = &["status", "operation", "parent_stack_run_id"];

    #[test]
    fn empty_filter_has_no_where() {
        let clause = WhereClause::build(&Filter::new(), "stack_runs", FIELDS).unwrap();
        assert_eq!(clause, WhereClause::default());
    }

    #[test]
    fn equality_and_sets_are_anded() {
        let filter = Filter::new()
            .status_in(RunStatus::PENDING_WORK)
            .eq("operation", "fetch");
        let clause = WhereClause::build(&filter, "stack_runs", FIELDS).unwrap();
        assert_eq!(clause.sql, " WHERE operation = ?1 AND (status IN (?2, ?3))");
        assert_eq!(
            clause.params,
            vec![
                SqlValue::Text("fetch".into()),
                SqlValue::Text("pending".into()),
                SqlValue::Text("suspended_waiting_child".into()),
            ]
        );
    }

    #[test]
    fn null_matches_with_is_null() {
        let filter = Filter::new()
            .eq("parent_stack_run_id", Scalar::Null)
            .any_of("status", [Scalar::Null, Scalar::from("running")]);
        let clause = WhereClause::build(&filter, "stack_runs", FIELDS).unwrap();
        assert_eq!(
            clause.sql,
            " WHERE parent_stack_run_id IS NULL AND (status IN (?1) OR status IS NULL)"
        );
        assert_eq!(clause.params.len(), 1);
    }

    #[test]
    fn empty_set_matches_nothing() {
        let filter = Filter::new().any_of("status", Vec::<Scalar>::new());
        let clause = WhereClause::build(&filter, "stack_runs", FIELDS).unwrap();
        assert_eq!(clause.sql, " WHERE 0");
    }

    #[test]
    fn unknown_field_is_rejected() {
        let filter = Filter::new().eq("status; DROP TABLE stack_runs", "x");
        let err = WhereClause::build(&filter, "stack_runs", FIELDS).unwrap_err();
        assert!(matches!(err, StoreError::InvalidArgument(_)));
    }

    #[test]
    fn unknown_status_value_is_rejected() {
        let filter = Filter::new().any_of("status", ["pending", "paused"]);
        let err = WhereClause::build(&filter, "stack_runs", FIELDS).unwrap_err();
        assert!(matches!(err, StoreError::InvalidArgument(_)));
    }

    #[test]
    fn assignments_number_placeholders_in_order() {
        let mut set = Assignments::new();
        set.set("status", "running".to_string());
        set.set_optional("result", None);
        assert_eq!(
            set.sql("stack_runs"),
            "UPDATE stack_runs SET status = ?1, result = ?2 WHERE id = ?3"
        );
    }
}
