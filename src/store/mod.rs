pub mod codec;

use std::collections::HashMap;
use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::Path;

use serde_json::{Map, Value as Json, json};
use thiserror::Error;

use crate::table::table::Table;
use crate::table::{Column, TableError};
use crate::value::DataType;

#[derive(Error, Debug)]
pub enum SnapshotError {
    #[error("SnapshotError - I/O error: {0}")]
    Io(String),
    #[error("SnapshotError - malformed JSON: {0}")]
    Json(String),
    #[error("SnapshotError - invalid snapshot: {0}")]
    Format(String),
    #[error(transparent)]
    Table(#[from] TableError),
}

impl From<std::io::Error> for SnapshotError {
    fn from(err: std::io::Error) -> Self {
        SnapshotError::Io(err.to_string())
    }
}

impl From<serde_json::Error> for SnapshotError {
    fn from(err: serde_json::Error) -> Self {
        SnapshotError::Json(err.to_string())
    }
}

fn malformed(message: &str) -> SnapshotError {
    SnapshotError::Format(message.to_string())
}

/// Snapshot of the full table: column schemas, rows and display order.
pub fn to_json(table: &Table) -> Json {
    let columns: Vec<Json> = table.columns().iter().map(column_to_json).collect();

    let rows: Vec<Json> = table
        .iter_rows()
        .map(|row| {
            let mut object = Map::new();
            for (column, cell) in table.columns().iter().zip(row.cells()) {
                object.insert(column.name().to_string(), codec::encode(cell));
            }
            Json::Object(object)
        })
        .collect();

    let row_order: Vec<Json> = table.row_order().iter().map(codec::encode).collect();

    json!({
        "columns": columns,
        "rows": rows,
        "row_order": row_order,
    })
}

/// Rebuild a table from a snapshot. Rows re-enter through the normal add
/// path, so constraint violations in stored data surface as load errors.
/// The recorded display order is restored verbatim afterwards.
pub fn from_json(json: &Json) -> Result<Table, SnapshotError> {
    let root = json
        .as_object()
        .ok_or_else(|| malformed("Snapshot root must be an object"))?;

    let columns_json = root
        .get("columns")
        .and_then(Json::as_array)
        .ok_or_else(|| malformed("Snapshot is missing the 'columns' array"))?;
    let mut columns = Vec::with_capacity(columns_json.len());
    for entry in columns_json {
        columns.push(column_from_json(entry)?);
    }

    let specs: Vec<(String, DataType)> = columns
        .iter()
        .map(|column| (column.name().to_string(), column.data_type()))
        .collect();
    let mut table = Table::new(columns)?;

    let rows = root
        .get("rows")
        .and_then(Json::as_array)
        .ok_or_else(|| malformed("Snapshot is missing the 'rows' array"))?;
    for row in rows {
        let object = row
            .as_object()
            .ok_or_else(|| malformed("Snapshot rows must be objects"))?;
        let mut values = HashMap::new();
        for (name, data_type) in &specs {
            if let Some(cell) = object.get(name) {
                values.insert(name.clone(), codec::decode(*data_type, cell)?);
            }
        }
        table.add_row(values, false)?;
    }

    let order_json = root
        .get("row_order")
        .and_then(Json::as_array)
        .ok_or_else(|| malformed("Snapshot is missing the 'row_order' array"))?;
    let primary_type = table.primary_column().data_type();
    let mut order = Vec::with_capacity(order_json.len());
    for key in order_json {
        order.push(codec::decode(primary_type, key)?);
    }
    table.restore_row_order(order);

    Ok(table)
}

/// Write a snapshot file. The write is ordinary blocking I/O with no
/// partial-write recovery; a crash mid-write can corrupt the file.
pub fn save(table: &Table, path: &Path) -> Result<(), SnapshotError> {
    let file = File::create(path)?;
    let mut writer = BufWriter::new(file);
    serde_json::to_writer(&mut writer, &to_json(table))?;
    writer.flush()?;
    Ok(())
}

pub fn load(path: &Path) -> Result<Table, SnapshotError> {
    let file = File::open(path)?;
    let json: Json = serde_json::from_reader(BufReader::new(file))?;
    from_json(&json)
}

fn column_to_json(column: &Column) -> Json {
    let mut object = Map::new();
    object.insert("name".to_string(), json!(column.name()));
    object.insert("data_type".to_string(), json!(column.data_type().tag()));
    object.insert("is_nullable".to_string(), json!(column.is_nullable()));
    object.insert("is_primary_key".to_string(), json!(column.is_primary_key()));
    object.insert("is_unique".to_string(), json!(column.is_unique()));
    object.insert("is_indexed".to_string(), json!(column.is_indexed()));
    object.insert("has_default".to_string(), json!(column.has_default()));
    if let Ok(default) = column.default_value() {
        object.insert("default_data".to_string(), codec::encode(default));
    }
    Json::Object(object)
}

fn column_from_json(entry: &Json) -> Result<Column, SnapshotError> {
    let object = entry
        .as_object()
        .ok_or_else(|| malformed("Snapshot columns must be objects"))?;
    let name = object
        .get("name")
        .and_then(Json::as_str)
        .ok_or_else(|| malformed("Column entry is missing 'name'"))?;
    let tag = object
        .get("data_type")
        .and_then(Json::as_str)
        .ok_or_else(|| malformed("Column entry is missing 'data_type'"))?;
    let data_type =
        DataType::from_tag(tag).ok_or_else(|| TableError::UnsupportedType(tag.to_string()))?;

    let flag = |key: &str| object.get(key).and_then(Json::as_bool).unwrap_or(false);

    let mut column = Column::new(name, data_type);
    if flag("is_nullable") {
        column = column.nullable();
    }
    if flag("is_unique") {
        column = column.unique();
    }
    if flag("is_indexed") {
        column = column.indexed();
    }
    if flag("is_primary_key") {
        column = column.primary_key();
    }
    if flag("has_default") {
        let default = object
            .get("default_data")
            .ok_or_else(|| malformed("Column entry has 'has_default' but no 'default_data'"))?;
        column = column.with_default(codec::decode(data_type, default)?);
    }
    Ok(column)
}
