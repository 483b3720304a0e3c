pub mod table;

use std::collections::HashSet;
use std::fmt;

use thiserror::Error;

use crate::value::{DataType, Value};

#[derive(PartialEq, Debug, Error)]
pub enum TableError {
    #[error("{0}")]
    InvalidSchema(String),
    #[error("Type tag '{0}' is not supported")]
    UnsupportedType(String),
    #[error("Column '{column}' only accepts '{expected}' values, got '{actual}'")]
    InvalidType {
        column: String,
        expected: DataType,
        actual: DataType,
    },
    #[error("Column '{0}' does not allow null values")]
    NullValue(String),
    #[error("Value '{value}' already exists in unique column '{column}'")]
    DuplicateValue { column: String, value: Value },
    #[error("{0}")]
    MissingData(String),
}

/// A named, typed column slot with its constraint flags.
///
/// A unique column owns the set of values currently present in the table,
/// so duplicate checks are a single set lookup.
#[derive(Debug)]
pub struct Column {
    name: String,
    data_type: DataType,
    nullable: bool,
    primary_key: bool,
    unique: bool,
    indexed: bool,
    default: Option<Value>,
    unique_values: HashSet<Value>,
}

impl Column {
    pub fn new(name: &str, data_type: DataType) -> Self {
        Self {
            name: name.to_string(),
            data_type,
            nullable: false,
            primary_key: false,
            unique: false,
            indexed: false,
            default: None,
            unique_values: HashSet::new(),
        }
    }

    pub fn nullable(mut self) -> Self {
        self.nullable = true;
        self
    }

    pub fn unique(mut self) -> Self {
        self.unique = true;
        self
    }

    pub fn indexed(mut self) -> Self {
        self.indexed = true;
        self
    }

    /// Marking a column as primary silently forces `nullable=false`,
    /// `unique=true` and `indexed=true`. This is a normalization, not an
    /// error; `Table::new` applies the same normalization again so setter
    /// order cannot subvert it.
    pub fn primary_key(mut self) -> Self {
        self.primary_key = true;
        self.force_primary_flags();
        self
    }

    pub fn with_default(mut self, value: Value) -> Self {
        self.default = Some(value);
        self
    }

    pub(crate) fn force_primary_flags(&mut self) {
        self.nullable = false;
        self.unique = true;
        self.indexed = true;
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn data_type(&self) -> DataType {
        self.data_type
    }

    pub fn is_nullable(&self) -> bool {
        self.nullable
    }

    pub fn is_primary_key(&self) -> bool {
        self.primary_key
    }

    pub fn is_unique(&self) -> bool {
        self.unique
    }

    pub fn is_indexed(&self) -> bool {
        self.indexed
    }

    pub fn has_default(&self) -> bool {
        self.default.is_some()
    }

    pub fn default_value(&self) -> Result<&Value, TableError> {
        self.default.as_ref().ok_or_else(|| {
            TableError::MissingData(format!("Column '{}' has no default value", self.name))
        })
    }

    /// Check a candidate value against the column's type and constraints.
    /// Does not mutate any state.
    pub fn validate(&self, value: &Value) -> Result<(), TableError> {
        if !value.is_null() && value.data_type() != self.data_type {
            return Err(TableError::InvalidType {
                column: self.name.clone(),
                expected: self.data_type,
                actual: value.data_type(),
            });
        }

        if value.is_null() && !self.nullable {
            return Err(TableError::NullValue(self.name.clone()));
        }

        if self.unique {
            // Nulls are exempt from duplicate checking only when the column
            // is also nullable.
            let exempt = value.is_null() && self.nullable;
            if !exempt && self.unique_values.contains(value) {
                return Err(TableError::DuplicateValue {
                    column: self.name.clone(),
                    value: value.clone(),
                });
            }
        }

        Ok(())
    }

    /// Record a value in the unique membership set. Must only be called
    /// after `validate` succeeded, as part of a row-level commit.
    pub fn commit(&mut self, value: &Value) {
        if self.unique {
            self.unique_values.insert(value.clone());
        }
    }

    /// Remove a value from the unique membership set. A missing value means
    /// the table's bookkeeping and the column's set have diverged, which the
    /// commit/release discipline is supposed to rule out.
    pub fn release(&mut self, value: &Value) -> Result<(), TableError> {
        if self.unique && !self.unique_values.remove(value) {
            return Err(TableError::MissingData(format!(
                "Value '{value}' cannot be released, it is not present in column '{}'",
                self.name
            )));
        }
        Ok(())
    }

    /// Copy of the schema with an empty membership set, for building a fresh
    /// table over the same column definitions.
    pub fn clone_schema(&self) -> Self {
        Self {
            name: self.name.clone(),
            data_type: self.data_type,
            nullable: self.nullable,
            primary_key: self.primary_key,
            unique: self.unique,
            indexed: self.indexed,
            default: self.default.clone(),
            unique_values: HashSet::new(),
        }
    }
}

impl fmt::Display for Column {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} <{}>", self.name, self.data_type)?;
        if self.primary_key {
            write!(f, " primary")?;
        }
        if self.nullable {
            write!(f, " nullable")?;
        }
        if self.unique {
            write!(f, " unique")?;
        }
        if self.indexed {
            write!(f, " indexed")?;
        }
        if let Some(default) = &self.default {
            write!(f, " default={default}")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn primary_key_should_force_constraint_flags() {
        let column = Column::new("id", DataType::Integer).nullable().primary_key();

        assert!(column.is_primary_key());
        assert!(!column.is_nullable());
        assert!(column.is_unique());
        assert!(column.is_indexed());
    }

    #[test]
    fn should_reject_value_of_wrong_type() {
        let column = Column::new("age", DataType::Integer);

        let result = column.validate(&Value::Str("old".to_string()));
        assert_eq!(
            result,
            Err(TableError::InvalidType {
                column: "age".to_string(),
                expected: DataType::Integer,
                actual: DataType::Text,
            })
        );
    }

    #[test]
    fn should_reject_null_for_non_nullable_column() {
        let column = Column::new("age", DataType::Integer);

        let result = column.validate(&Value::Null);
        assert_eq!(result, Err(TableError::NullValue("age".to_string())));
    }

    #[test]
    fn should_accept_null_for_nullable_column() {
        let column = Column::new("age", DataType::Integer).nullable();
        assert!(column.validate(&Value::Null).is_ok());
    }

    #[test]
    fn should_reject_duplicate_in_unique_column() {
        let mut column = Column::new("email", DataType::Text).unique();
        column.commit(&Value::Str("a@b".to_string()));

        let result = column.validate(&Value::Str("a@b".to_string()));
        assert_eq!(
            result,
            Err(TableError::DuplicateValue {
                column: "email".to_string(),
                value: Value::Str("a@b".to_string()),
            })
        );
    }

    #[test]
    fn nulls_should_be_exempt_from_uniqueness_when_nullable() {
        let mut column = Column::new("email", DataType::Text).unique().nullable();
        column.commit(&Value::Null);

        assert!(column.validate(&Value::Null).is_ok());
    }

    #[test]
    fn release_should_make_value_usable_again() {
        let mut column = Column::new("email", DataType::Text).unique();
        let value = Value::Str("a@b".to_string());

        column.commit(&value);
        assert!(column.validate(&value).is_err());

        column.release(&value).unwrap();
        assert!(column.validate(&value).is_ok());
    }

    #[test]
    fn release_of_absent_value_should_fail() {
        let mut column = Column::new("email", DataType::Text).unique();

        let result = column.release(&Value::Str("a@b".to_string()));
        assert!(matches!(result, Err(TableError::MissingData(_))));
    }

    #[test]
    fn default_value_should_fail_without_default() {
        let column = Column::new("age", DataType::Integer);
        assert!(matches!(
            column.default_value(),
            Err(TableError::MissingData(_))
        ));

        let column = Column::new("age", DataType::Integer).with_default(Value::Int(18));
        assert_eq!(column.default_value().unwrap(), &Value::Int(18));
    }
}
