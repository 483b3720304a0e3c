use std::collections::{HashMap, HashSet};

use crate::table::{Column, TableError};
use crate::value::Value;

/// Borrowed view of one row, pairing the cells with the column schema so
/// callers can look cells up by column name.
#[derive(Clone, Copy)]
pub struct RowRef<'a> {
    columns: &'a [Column],
    cells: &'a [Value],
}

impl<'a> RowRef<'a> {
    pub fn get(&self, column: &str) -> Option<&'a Value> {
        let position = self.columns.iter().position(|c| c.name() == column)?;
        self.cells.get(position)
    }

    pub fn cells(&self) -> &'a [Value] {
        self.cells
    }

    pub fn to_map(&self) -> HashMap<String, Value> {
        self.columns
            .iter()
            .zip(self.cells)
            .map(|(column, value)| (column.name().to_string(), value.clone()))
            .collect()
    }
}

/// In-memory row store keyed by primary key, with secondary indexes for
/// columns marked indexed and an explicit display order.
///
/// Rows are fixed-shape: cells are stored in column order, not as open
/// key-value maps. Every mutating operation validates everything before
/// committing anything, so a failed call leaves the table untouched.
pub struct Table {
    columns: Vec<Column>,
    primary_idx: usize,
    rows: HashMap<Value, Vec<Value>>,
    index: HashMap<String, HashMap<Value, HashSet<Value>>>,
    row_order: Vec<Value>,
}

fn missing_index(column: &str) -> TableError {
    TableError::MissingData(format!("No index maintained for column '{column}'"))
}

fn missing_row(key: &Value) -> TableError {
    TableError::MissingData(format!("No row with primary key '{key}' found"))
}

impl Table {
    /// Build a table over the given columns. Exactly one column must be
    /// marked primary; its constraint flags are normalized and every column
    /// default is validated against its own column.
    pub fn new(mut columns: Vec<Column>) -> Result<Self, TableError> {
        let primaries: Vec<usize> = columns
            .iter()
            .enumerate()
            .filter(|(_, column)| column.is_primary_key())
            .map(|(i, _)| i)
            .collect();

        let primary_idx = match primaries.as_slice() {
            [single] => *single,
            _ => {
                return Err(TableError::InvalidSchema(format!(
                    "Expected exactly one primary column, found {}",
                    primaries.len()
                )));
            }
        };
        columns[primary_idx].force_primary_flags();

        for column in &columns {
            if column.has_default() {
                column.validate(column.default_value()?)?;
            }
        }

        let index = columns
            .iter()
            .filter(|column| column.is_indexed() && !column.is_primary_key())
            .map(|column| (column.name().to_string(), HashMap::new()))
            .collect();

        Ok(Self {
            columns,
            primary_idx,
            rows: HashMap::new(),
            index,
            row_order: Vec::new(),
        })
    }

    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    pub fn primary_column(&self) -> &Column {
        &self.columns[self.primary_idx]
    }

    pub fn row_order(&self) -> &[Value] {
        &self.row_order
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn row(&self, key: &Value) -> Option<RowRef<'_>> {
        let cells = self.rows.get(key)?;
        Some(RowRef {
            columns: &self.columns,
            cells,
        })
    }

    /// The secondary-index buckets for a column, mapping each value to the
    /// set of primary keys currently holding it. `None` for columns without
    /// a secondary index (unindexed or primary).
    pub fn index(&self, column: &str) -> Option<&HashMap<Value, HashSet<Value>>> {
        self.index.get(column)
    }

    /// Rows in display order.
    pub fn iter_rows(&self) -> impl Iterator<Item = RowRef<'_>> {
        self.row_order.iter().map(|key| RowRef {
            columns: &self.columns,
            cells: &self.rows[key],
        })
    }

    /// Insert a row given as a column-name to value map. A column missing
    /// from the map takes its default when `use_defaults` is set, otherwise
    /// the call fails. Keys naming no column are dropped; rows are
    /// fixed-shape and have no slot for them.
    pub fn add_row(
        &mut self,
        mut values: HashMap<String, Value>,
        use_defaults: bool,
    ) -> Result<(), TableError> {
        let mut cells = Vec::with_capacity(self.columns.len());
        for column in &self.columns {
            let value = match values.remove(column.name()) {
                Some(value) => value,
                None if use_defaults => column.default_value()?.clone(),
                None => {
                    return Err(TableError::MissingData(format!(
                        "Missing value for column '{}'",
                        column.name()
                    )));
                }
            };
            cells.push(value);
        }

        for (column, cell) in self.columns.iter().zip(&cells) {
            column.validate(cell)?;
        }

        for (column, cell) in self.columns.iter_mut().zip(&cells) {
            column.commit(cell);
        }

        let key = cells[self.primary_idx].clone();
        for (i, column) in self.columns.iter().enumerate() {
            if column.is_indexed() && !column.is_primary_key() {
                let buckets = self
                    .index
                    .get_mut(column.name())
                    .ok_or_else(|| missing_index(column.name()))?;
                buckets
                    .entry(cells[i].clone())
                    .or_default()
                    .insert(key.clone());
            }
        }

        self.row_order.push(key.clone());
        self.rows.insert(key, cells);
        Ok(())
    }

    /// Remove the row stored under the given primary key, releasing every
    /// column's uniqueness bookkeeping and pruning secondary-index buckets
    /// that become empty.
    pub fn delete_row(&mut self, key: &Value) -> Result<(), TableError> {
        // the row leaves the store only after every release succeeded, so a
        // failed release never strands the key in row_order
        let cells = self.rows.get(key).cloned().ok_or_else(|| missing_row(key))?;

        for (column, cell) in self.columns.iter_mut().zip(&cells) {
            column.release(cell)?;
        }

        for (i, column) in self.columns.iter().enumerate() {
            if column.is_indexed() && !column.is_primary_key() {
                let buckets = self
                    .index
                    .get_mut(column.name())
                    .ok_or_else(|| missing_index(column.name()))?;
                if let Some(bucket) = buckets.get_mut(&cells[i]) {
                    bucket.remove(key);
                    if bucket.is_empty() {
                        buckets.remove(&cells[i]);
                    }
                }
            }
        }

        self.rows.remove(key);
        self.row_order.retain(|k| k != key);
        Ok(())
    }

    /// Merge the given values over the existing row. The primary key is
    /// fixed: a value supplied for the primary column is ignored. Only
    /// columns whose value actually changes are validated and rebooked;
    /// the row keeps its position in the display order.
    pub fn update_row(
        &mut self,
        key: &Value,
        mut changes: HashMap<String, Value>,
    ) -> Result<(), TableError> {
        if !self.rows.contains_key(key) {
            return Err(missing_row(key));
        }
        changes.remove(self.columns[self.primary_idx].name());

        let mut changed: Vec<(usize, Value)> = Vec::new();
        let current = &self.rows[key];
        for (i, column) in self.columns.iter().enumerate() {
            if let Some(new_value) = changes.remove(column.name()) {
                if current[i] != new_value {
                    changed.push((i, new_value));
                }
            }
        }

        for (i, new_value) in &changed {
            self.columns[*i].validate(new_value)?;
        }

        for (i, new_value) in changed {
            let old_value = self.rows[key][i].clone();

            let column = &mut self.columns[i];
            if column.is_unique() {
                column.release(&old_value)?;
                column.commit(&new_value);
            }

            let column = &self.columns[i];
            if column.is_indexed() && !column.is_primary_key() {
                let buckets = self
                    .index
                    .get_mut(column.name())
                    .ok_or_else(|| missing_index(column.name()))?;
                buckets
                    .entry(new_value.clone())
                    .or_default()
                    .insert(key.clone());
                if let Some(old_bucket) = buckets.get_mut(&old_value) {
                    old_bucket.remove(key);
                    if old_bucket.is_empty() {
                        buckets.remove(&old_value);
                    }
                }
            }

            if let Some(row) = self.rows.get_mut(key) {
                row[i] = new_value;
            }
        }

        Ok(())
    }

    /// Stable reorder of the display order by a per-row key. Storage and
    /// indexes are untouched; the key is computed once per row. `reverse`
    /// flips the comparison, which keeps equal keys in their current order.
    pub fn sort_rows_by_key<K: Ord>(&mut self, key: impl Fn(RowRef<'_>) -> K, reverse: bool) {
        let mut keyed: Vec<(K, Value)> = self
            .row_order
            .iter()
            .map(|pk| {
                let row = RowRef {
                    columns: &self.columns,
                    cells: &self.rows[pk],
                };
                (key(row), pk.clone())
            })
            .collect();
        keyed.sort_by(|a, b| if reverse { b.0.cmp(&a.0) } else { a.0.cmp(&b.0) });
        self.row_order = keyed.into_iter().map(|(_, pk)| pk).collect();
    }

    /// Matching rows, in display order, as owned name-to-value snapshots.
    /// The source table is not mutated.
    pub fn filter_to_rows(
        &self,
        predicate: impl Fn(RowRef<'_>) -> bool,
    ) -> Vec<HashMap<String, Value>> {
        self.iter_rows()
            .filter(|row| predicate(*row))
            .map(|row| row.to_map())
            .collect()
    }

    /// Matching rows as a new table over a fresh copy of the schema. Rows
    /// re-enter through `add_row`, so every constraint re-validates.
    pub fn filter_to_table(
        &self,
        predicate: impl Fn(RowRef<'_>) -> bool,
    ) -> Result<Table, TableError> {
        let mut filtered = Table::new(self.columns.iter().map(Column::clone_schema).collect())?;
        for row in self.iter_rows() {
            if predicate(row) {
                filtered.add_row(row.to_map(), false)?;
            }
        }
        Ok(filtered)
    }

    // Snapshot loading restores the recorded display order verbatim.
    pub(crate) fn restore_row_order(&mut self, order: Vec<Value>) {
        self.row_order = order;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::DataType;

    fn tag_table() -> Table {
        Table::new(vec![
            Column::new("id", DataType::Integer).primary_key(),
            Column::new("tag", DataType::Text).indexed(),
        ])
        .unwrap()
    }

    fn tag_row(id: i64, tag: &str) -> HashMap<String, Value> {
        HashMap::from([
            ("id".to_string(), Value::Int(id)),
            ("tag".to_string(), Value::Str(tag.to_string())),
        ])
    }

    fn keys(table: &Table, column: &str, value: &Value) -> HashSet<Value> {
        table.index(column).unwrap()[value].clone()
    }

    #[test]
    fn should_require_exactly_one_primary_column() {
        let none = Table::new(vec![Column::new("id", DataType::Integer)]);
        assert!(matches!(none, Err(TableError::InvalidSchema(_))));

        let two = Table::new(vec![
            Column::new("id", DataType::Integer).primary_key(),
            Column::new("uuid", DataType::Text).primary_key(),
        ]);
        assert!(matches!(two, Err(TableError::InvalidSchema(_))));
    }

    #[test]
    fn should_normalize_primary_column_flags() {
        let table = tag_table();
        let primary = table.primary_column();
        assert!(!primary.is_nullable());
        assert!(primary.is_unique());
        assert!(primary.is_indexed());
    }

    #[test]
    fn should_reject_invalid_default_at_construction() {
        let result = Table::new(vec![
            Column::new("id", DataType::Integer).primary_key(),
            Column::new("age", DataType::Integer).with_default(Value::Str("?".to_string())),
        ]);
        assert!(matches!(result, Err(TableError::InvalidType { .. })));
    }

    #[test]
    fn should_build_index_buckets_on_add() {
        let mut table = tag_table();
        table.add_row(tag_row(1, "a"), false).unwrap();
        table.add_row(tag_row(2, "a"), false).unwrap();
        table.add_row(tag_row(3, "b"), false).unwrap();

        assert_eq!(
            keys(&table, "tag", &Value::Str("a".to_string())),
            HashSet::from([Value::Int(1), Value::Int(2)])
        );
        assert_eq!(
            keys(&table, "tag", &Value::Str("b".to_string())),
            HashSet::from([Value::Int(3)])
        );
    }

    #[test]
    fn delete_should_prune_emptied_buckets() {
        let mut table = tag_table();
        table.add_row(tag_row(1, "a"), false).unwrap();
        table.add_row(tag_row(2, "a"), false).unwrap();
        table.add_row(tag_row(3, "b"), false).unwrap();

        table.delete_row(&Value::Int(1)).unwrap();
        assert_eq!(
            keys(&table, "tag", &Value::Str("a".to_string())),
            HashSet::from([Value::Int(2)])
        );

        table.delete_row(&Value::Int(2)).unwrap();
        // bucket gone entirely, not present as an empty set
        assert!(
            !table
                .index("tag")
                .unwrap()
                .contains_key(&Value::Str("a".to_string()))
        );
        assert_eq!(table.len(), 1);
        assert_eq!(table.row_order(), &[Value::Int(3)]);
    }

    #[test]
    fn duplicate_primary_key_should_leave_table_unchanged() {
        let mut table = tag_table();
        table.add_row(tag_row(1, "a"), false).unwrap();

        let result = table.add_row(tag_row(1, "b"), false);
        assert!(matches!(result, Err(TableError::DuplicateValue { .. })));

        assert_eq!(table.len(), 1);
        let row = table.row(&Value::Int(1)).unwrap();
        assert_eq!(row.get("tag"), Some(&Value::Str("a".to_string())));
        // the failed row's tag never reached the index
        assert!(
            !table
                .index("tag")
                .unwrap()
                .contains_key(&Value::Str("b".to_string()))
        );
    }

    #[test]
    fn failed_add_should_not_poison_unique_sets() {
        let mut table = Table::new(vec![
            Column::new("id", DataType::Integer).primary_key(),
            Column::new("email", DataType::Text).unique(),
        ])
        .unwrap();
        let row = |id: i64, email: &str| {
            HashMap::from([
                ("id".to_string(), Value::Int(id)),
                ("email".to_string(), Value::Str(email.to_string())),
            ])
        };

        table.add_row(row(1, "a@b"), false).unwrap();
        assert!(table.add_row(row(2, "a@b"), false).is_err());

        // id 2 was never committed anywhere, so it is free to be reused
        table.add_row(row(2, "c@d"), false).unwrap();
        assert_eq!(table.len(), 2);
    }

    #[test]
    fn update_should_move_index_bucket() {
        let mut table = tag_table();
        table.add_row(tag_row(1, "a"), false).unwrap();
        table.add_row(tag_row(2, "a"), false).unwrap();
        table.add_row(tag_row(3, "b"), false).unwrap();

        table
            .update_row(
                &Value::Int(3),
                HashMap::from([("tag".to_string(), Value::Str("c".to_string()))]),
            )
            .unwrap();

        assert!(
            !table
                .index("tag")
                .unwrap()
                .contains_key(&Value::Str("b".to_string()))
        );
        assert_eq!(
            keys(&table, "tag", &Value::Str("c".to_string())),
            HashSet::from([Value::Int(3)])
        );
    }

    #[test]
    fn update_should_preserve_row_order() {
        let mut table = tag_table();
        table.add_row(tag_row(1, "a"), false).unwrap();
        table.add_row(tag_row(2, "b"), false).unwrap();
        table.add_row(tag_row(3, "c"), false).unwrap();

        table
            .update_row(
                &Value::Int(2),
                HashMap::from([("tag".to_string(), Value::Str("z".to_string()))]),
            )
            .unwrap();

        assert_eq!(
            table.row_order(),
            &[Value::Int(1), Value::Int(2), Value::Int(3)]
        );
    }

    #[test]
    fn update_should_not_change_primary_key() {
        let mut table = tag_table();
        table.add_row(tag_row(1, "a"), false).unwrap();

        table
            .update_row(
                &Value::Int(1),
                HashMap::from([
                    ("id".to_string(), Value::Int(9)),
                    ("tag".to_string(), Value::Str("b".to_string())),
                ]),
            )
            .unwrap();

        assert!(table.row(&Value::Int(9)).is_none());
        let row = table.row(&Value::Int(1)).unwrap();
        assert_eq!(row.get("tag"), Some(&Value::Str("b".to_string())));
    }

    #[test]
    fn update_with_current_value_should_be_a_no_op() {
        let mut table = tag_table();
        table.add_row(tag_row(1, "a"), false).unwrap();

        // re-supplying the current value of a unique column must not trip
        // the duplicate check against the row's own entry
        table.update_row(&Value::Int(1), tag_row(1, "a")).unwrap();
        assert_eq!(
            keys(&table, "tag", &Value::Str("a".to_string())),
            HashSet::from([Value::Int(1)])
        );
    }

    #[test]
    fn failed_update_should_leave_table_unchanged() {
        let mut table = Table::new(vec![
            Column::new("id", DataType::Integer).primary_key(),
            Column::new("email", DataType::Text).unique(),
            Column::new("nick", DataType::Text).unique().indexed(),
        ])
        .unwrap();
        let row = |id: i64, email: &str, nick: &str| {
            HashMap::from([
                ("id".to_string(), Value::Int(id)),
                ("email".to_string(), Value::Str(email.to_string())),
                ("nick".to_string(), Value::Str(nick.to_string())),
            ])
        };

        table.add_row(row(1, "a@b", "anna"), false).unwrap();
        table.add_row(row(2, "c@d", "carl"), false).unwrap();

        // nick collides, so the email change must not be committed either
        let result = table.update_row(
            &Value::Int(1),
            HashMap::from([
                ("email".to_string(), Value::Str("e@f".to_string())),
                ("nick".to_string(), Value::Str("carl".to_string())),
            ]),
        );
        assert!(matches!(result, Err(TableError::DuplicateValue { .. })));

        let current = table.row(&Value::Int(1)).unwrap();
        assert_eq!(current.get("email"), Some(&Value::Str("a@b".to_string())));
        assert_eq!(current.get("nick"), Some(&Value::Str("anna".to_string())));

        // "e@f" was never committed to the unique set
        table.add_row(row(3, "e@f", "erik"), false).unwrap();
    }

    #[test]
    fn update_and_delete_should_fail_for_absent_key() {
        let mut table = tag_table();

        let update = table.update_row(&Value::Int(1), HashMap::new());
        assert!(matches!(update, Err(TableError::MissingData(_))));

        let delete = table.delete_row(&Value::Int(1));
        assert!(matches!(delete, Err(TableError::MissingData(_))));
    }

    #[test]
    fn add_should_fail_for_missing_column_without_defaults() {
        let mut table = tag_table();
        let result = table.add_row(
            HashMap::from([("id".to_string(), Value::Int(1))]),
            false,
        );
        assert!(matches!(result, Err(TableError::MissingData(_))));
        assert!(table.is_empty());
    }

    #[test]
    fn add_should_substitute_defaults_when_asked() {
        let mut table = Table::new(vec![
            Column::new("id", DataType::Integer).primary_key(),
            Column::new("tag", DataType::Text).with_default(Value::Str("-".to_string())),
        ])
        .unwrap();

        table
            .add_row(HashMap::from([("id".to_string(), Value::Int(1))]), true)
            .unwrap();

        let row = table.row(&Value::Int(1)).unwrap();
        assert_eq!(row.get("tag"), Some(&Value::Str("-".to_string())));

        // defaulting over a column without a default still fails
        let result = table.add_row(
            HashMap::from([("tag".to_string(), Value::Str("x".to_string()))]),
            true,
        );
        assert!(matches!(result, Err(TableError::MissingData(_))));
    }

    #[test]
    fn add_should_drop_keys_naming_no_column() {
        let mut table = tag_table();
        let mut values = tag_row(1, "a");
        values.insert("junk".to_string(), Value::Bool(true));

        table.add_row(values, false).unwrap();
        let row = table.row(&Value::Int(1)).unwrap();
        assert_eq!(row.cells().len(), 2);
        assert_eq!(row.get("junk"), None);
    }

    #[test]
    fn add_should_reject_wrong_value_type() {
        let mut table = tag_table();
        let result = table.add_row(
            HashMap::from([
                ("id".to_string(), Value::Str("one".to_string())),
                ("tag".to_string(), Value::Str("a".to_string())),
            ]),
            false,
        );
        assert!(matches!(result, Err(TableError::InvalidType { .. })));
    }

    #[test]
    fn nullable_unique_column_should_accept_repeated_nulls() {
        let mut table = Table::new(vec![
            Column::new("id", DataType::Integer).primary_key(),
            Column::new("email", DataType::Text).unique().nullable(),
        ])
        .unwrap();
        let row = |id: i64| {
            HashMap::from([
                ("id".to_string(), Value::Int(id)),
                ("email".to_string(), Value::Null),
            ])
        };

        table.add_row(row(1), false).unwrap();
        table.add_row(row(2), false).unwrap();
        assert_eq!(table.len(), 2);
    }

    #[test]
    fn failed_delete_should_keep_row_iterable() {
        let mut table = Table::new(vec![
            Column::new("id", DataType::Integer).primary_key(),
            Column::new("email", DataType::Text).unique().nullable(),
        ])
        .unwrap();
        let row = |id: i64| {
            HashMap::from([
                ("id".to_string(), Value::Int(id)),
                ("email".to_string(), Value::Null),
            ])
        };

        table.add_row(row(1), false).unwrap();
        table.add_row(row(2), false).unwrap();

        // both rows share the single null held by the membership set, so
        // the second delete's release reports the divergence
        table.delete_row(&Value::Int(1)).unwrap();
        let result = table.delete_row(&Value::Int(2));
        assert!(matches!(result, Err(TableError::MissingData(_))));

        // the row is still stored and the display order still resolves
        assert_eq!(table.len(), 1);
        assert_eq!(table.row_order(), &[Value::Int(2)]);
        let remaining: Vec<_> = table.iter_rows().collect();
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].get("id"), Some(&Value::Int(2)));
    }

    #[test]
    fn sort_should_be_stable_and_reversible() {
        let mut table = tag_table();
        table.add_row(tag_row(1, "b"), false).unwrap();
        table.add_row(tag_row(2, "a"), false).unwrap();
        table.add_row(tag_row(3, "a"), false).unwrap();

        table.sort_rows_by_key(|row| row.get("tag").unwrap().to_string(), false);
        // equal tags keep insertion order
        assert_eq!(
            table.row_order(),
            &[Value::Int(2), Value::Int(3), Value::Int(1)]
        );

        table.sort_rows_by_key(|row| row.get("tag").unwrap().to_string(), true);
        assert_eq!(
            table.row_order(),
            &[Value::Int(1), Value::Int(2), Value::Int(3)]
        );
    }

    #[test]
    fn filter_to_rows_should_snapshot_in_order() {
        let mut table = tag_table();
        table.add_row(tag_row(1, "a"), false).unwrap();
        table.add_row(tag_row(2, "b"), false).unwrap();
        table.add_row(tag_row(3, "a"), false).unwrap();

        let rows =
            table.filter_to_rows(|row| row.get("tag") == Some(&Value::Str("a".to_string())));

        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0]["id"], Value::Int(1));
        assert_eq!(rows[1]["id"], Value::Int(3));
        // the source is untouched
        assert_eq!(table.len(), 3);
    }

    #[test]
    fn filter_to_table_should_rebuild_indexes() {
        let mut table = tag_table();
        table.add_row(tag_row(1, "a"), false).unwrap();
        table.add_row(tag_row(2, "b"), false).unwrap();
        table.add_row(tag_row(3, "a"), false).unwrap();

        let filtered = table
            .filter_to_table(|row| row.get("tag") == Some(&Value::Str("a".to_string())))
            .unwrap();

        assert_eq!(filtered.len(), 2);
        assert_eq!(filtered.row_order(), &[Value::Int(1), Value::Int(3)]);
        assert_eq!(
            filtered.index("tag").unwrap()[&Value::Str("a".to_string())],
            HashSet::from([Value::Int(1), Value::Int(3)])
        );
    }
}
