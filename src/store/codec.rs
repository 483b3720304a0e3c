use std::collections::BTreeMap;

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use rust_decimal::Decimal;
use serde_json::{Map, Value as Json, json};

use crate::store::SnapshotError;
use crate::value::{DATE_FORMAT, DATETIME_FORMAT, DataType, TIME_FORMAT, Value};

/// Wire form of a value. Scalars map to native JSON; dates, times and
/// decimals become strings, binary values become base64 strings, ordered
/// maps become arrays of pairs (JSON objects do not guarantee key order).
pub fn encode(value: &Value) -> Json {
    match value {
        Value::Int(i) => json!(i),
        Value::Float(f) => json!(f),
        Value::Str(s) => json!(s),
        Value::List(items) | Value::Tuple(items) => {
            Json::Array(items.iter().map(encode).collect())
        }
        Value::Map(entries) => Json::Object(
            entries
                .iter()
                .map(|(k, v)| (k.clone(), encode(v)))
                .collect::<Map<String, Json>>(),
        ),
        Value::Bool(b) => json!(b),
        Value::Null => Json::Null,
        Value::DateTime(dt) => json!(dt.format(DATETIME_FORMAT).to_string()),
        Value::Date(d) => json!(d.format(DATE_FORMAT).to_string()),
        Value::Time(t) => json!(t.format(TIME_FORMAT).to_string()),
        Value::Decimal(d) => json!(d.to_string()),
        Value::Bytes(b) | Value::ByteArray(b) => json!(BASE64.encode(b)),
        Value::Counter(entries) => Json::Object(
            entries
                .iter()
                .map(|(k, n)| (k.clone(), json!(n)))
                .collect::<Map<String, Json>>(),
        ),
        Value::OrderedMap(entries) => Json::Array(
            entries
                .iter()
                .map(|(k, v)| Json::Array(vec![json!(k), encode(v)]))
                .collect(),
        ),
    }
}

fn mismatch(data_type: DataType, json: &Json) -> SnapshotError {
    SnapshotError::Format(format!("Cannot decode {json} as '{data_type}'"))
}

/// Decode a wire value for a column of the given declared type. JSON null
/// always decodes to a null value; whether that is acceptable is the
/// column's decision, not the codec's.
pub fn decode(data_type: DataType, json: &Json) -> Result<Value, SnapshotError> {
    if json.is_null() {
        return Ok(Value::Null);
    }

    let value = match data_type {
        DataType::Integer => Value::Int(json.as_i64().ok_or_else(|| mismatch(data_type, json))?),
        DataType::Float => Value::Float(json.as_f64().ok_or_else(|| mismatch(data_type, json))?),
        DataType::Text => Value::Str(
            json.as_str()
                .ok_or_else(|| mismatch(data_type, json))?
                .to_string(),
        ),
        DataType::Boolean => Value::Bool(json.as_bool().ok_or_else(|| mismatch(data_type, json))?),
        // non-null wire data for a null-typed column
        DataType::Null => return Err(mismatch(data_type, json)),
        DataType::List => Value::List(decode_elements(data_type, json)?),
        DataType::Tuple => Value::Tuple(decode_elements(data_type, json)?),
        DataType::Map => {
            let object = json.as_object().ok_or_else(|| mismatch(data_type, json))?;
            Value::Map(
                object
                    .iter()
                    .map(|(k, v)| (k.clone(), decode_any(v)))
                    .collect(),
            )
        }
        DataType::Counter => {
            let object = json.as_object().ok_or_else(|| mismatch(data_type, json))?;
            let mut counts = BTreeMap::new();
            for (k, v) in object {
                counts.insert(k.clone(), v.as_i64().ok_or_else(|| mismatch(data_type, json))?);
            }
            Value::Counter(counts)
        }
        DataType::OrderedMap => {
            let pairs = json.as_array().ok_or_else(|| mismatch(data_type, json))?;
            let mut entries = Vec::with_capacity(pairs.len());
            for pair in pairs {
                let entry = pair
                    .as_array()
                    .filter(|p| p.len() == 2)
                    .ok_or_else(|| mismatch(data_type, json))?;
                let key = entry[0].as_str().ok_or_else(|| mismatch(data_type, json))?;
                entries.push((key.to_string(), decode_any(&entry[1])));
            }
            Value::OrderedMap(entries)
        }
        DataType::DateTime => {
            let text = json.as_str().ok_or_else(|| mismatch(data_type, json))?;
            Value::DateTime(
                NaiveDateTime::parse_from_str(text, DATETIME_FORMAT)
                    .map_err(|_| mismatch(data_type, json))?,
            )
        }
        DataType::Date => {
            let text = json.as_str().ok_or_else(|| mismatch(data_type, json))?;
            Value::Date(
                NaiveDate::parse_from_str(text, DATE_FORMAT)
                    .map_err(|_| mismatch(data_type, json))?,
            )
        }
        DataType::Time => {
            let text = json.as_str().ok_or_else(|| mismatch(data_type, json))?;
            Value::Time(
                NaiveTime::parse_from_str(text, TIME_FORMAT)
                    .map_err(|_| mismatch(data_type, json))?,
            )
        }
        DataType::Decimal => {
            let text = json.as_str().ok_or_else(|| mismatch(data_type, json))?;
            Value::Decimal(
                text.parse::<Decimal>()
                    .map_err(|_| mismatch(data_type, json))?,
            )
        }
        DataType::Bytes => Value::Bytes(decode_base64(data_type, json)?),
        DataType::ByteArray => Value::ByteArray(decode_base64(data_type, json)?),
    };

    Ok(value)
}

fn decode_elements(data_type: DataType, json: &Json) -> Result<Vec<Value>, SnapshotError> {
    let items = json.as_array().ok_or_else(|| mismatch(data_type, json))?;
    Ok(items.iter().map(decode_any).collect())
}

fn decode_base64(data_type: DataType, json: &Json) -> Result<Vec<u8>, SnapshotError> {
    let text = json.as_str().ok_or_else(|| mismatch(data_type, json))?;
    BASE64.decode(text).map_err(|_| mismatch(data_type, json))
}

// Values nested inside collections carry no declared type, so they decode
// structurally: arrays become lists, numbers become ints or floats. A tuple
// nested inside a list therefore reloads as a list.
fn decode_any(json: &Json) -> Value {
    match json {
        Json::Null => Value::Null,
        Json::Bool(b) => Value::Bool(*b),
        Json::Number(n) => {
            if let Some(i) = n.as_i64() {
                Value::Int(i)
            } else {
                n.as_f64().map(Value::Float).unwrap_or(Value::Null)
            }
        }
        Json::String(s) => Value::Str(s.clone()),
        Json::Array(items) => Value::List(items.iter().map(decode_any).collect()),
        Json::Object(entries) => Value::Map(
            entries
                .iter()
                .map(|(k, v)| (k.clone(), decode_any(v)))
                .collect(),
        ),
    }
}
