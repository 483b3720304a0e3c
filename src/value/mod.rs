use std::collections::BTreeMap;
use std::fmt;
use std::hash::{Hash, Hasher};

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use rust_decimal::Decimal;

pub(crate) const DATETIME_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.f";
pub(crate) const DATE_FORMAT: &str = "%Y-%m-%d";
pub(crate) const TIME_FORMAT: &str = "%H:%M:%S%.f";

/// The closed set of semantic types a column can be declared with.
///
/// Every variant carries a stable string tag used in the snapshot format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DataType {
    Integer,
    Float,
    Text,
    List,
    Tuple,
    Map,
    Boolean,
    Null,
    DateTime,
    Date,
    Time,
    Decimal,
    Bytes,
    ByteArray,
    Counter,
    OrderedMap,
}

impl DataType {
    pub fn tag(&self) -> &'static str {
        match self {
            DataType::Integer => "int",
            DataType::Float => "float",
            DataType::Text => "str",
            DataType::List => "list",
            DataType::Tuple => "tuple",
            DataType::Map => "map",
            DataType::Boolean => "bool",
            DataType::Null => "null",
            DataType::DateTime => "datetime",
            DataType::Date => "date",
            DataType::Time => "time",
            DataType::Decimal => "decimal",
            DataType::Bytes => "bytes",
            DataType::ByteArray => "bytearray",
            DataType::Counter => "counter",
            DataType::OrderedMap => "ordered_map",
        }
    }

    pub fn from_tag(tag: &str) -> Option<Self> {
        Some(match tag {
            "int" => DataType::Integer,
            "float" => DataType::Float,
            "str" => DataType::Text,
            "list" => DataType::List,
            "tuple" => DataType::Tuple,
            "map" => DataType::Map,
            "bool" => DataType::Boolean,
            "null" => DataType::Null,
            "datetime" => DataType::DateTime,
            "date" => DataType::Date,
            "time" => DataType::Time,
            "decimal" => DataType::Decimal,
            "bytes" => DataType::Bytes,
            "bytearray" => DataType::ByteArray,
            "counter" => DataType::Counter,
            "ordered_map" => DataType::OrderedMap,
            _ => return None,
        })
    }
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.tag())
    }
}

/// A runtime value held in a table cell.
#[derive(Debug, Clone)]
pub enum Value {
    Int(i64),
    Float(f64),
    Str(String),
    List(Vec<Value>),
    Tuple(Vec<Value>),
    Map(BTreeMap<String, Value>),
    Bool(bool),
    Null,
    DateTime(NaiveDateTime),
    Date(NaiveDate),
    Time(NaiveTime),
    Decimal(Decimal),
    Bytes(Vec<u8>),
    ByteArray(Vec<u8>),
    Counter(BTreeMap<String, i64>),
    OrderedMap(Vec<(String, Value)>),
}

impl Value {
    pub fn data_type(&self) -> DataType {
        match self {
            Value::Int(_) => DataType::Integer,
            Value::Float(_) => DataType::Float,
            Value::Str(_) => DataType::Text,
            Value::List(_) => DataType::List,
            Value::Tuple(_) => DataType::Tuple,
            Value::Map(_) => DataType::Map,
            Value::Bool(_) => DataType::Boolean,
            Value::Null => DataType::Null,
            Value::DateTime(_) => DataType::DateTime,
            Value::Date(_) => DataType::Date,
            Value::Time(_) => DataType::Time,
            Value::Decimal(_) => DataType::Decimal,
            Value::Bytes(_) => DataType::Bytes,
            Value::ByteArray(_) => DataType::ByteArray,
            Value::Counter(_) => DataType::Counter,
            Value::OrderedMap(_) => DataType::OrderedMap,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }
}

// Floats are compared and hashed by canonical bit pattern so Value can key
// hash maps and sets: -0.0 folds to 0.0 and all NaNs fold together.
fn canonical_f64_bits(v: f64) -> u64 {
    if v == 0.0 {
        0.0f64.to_bits()
    } else if v.is_nan() {
        f64::NAN.to_bits()
    } else {
        v.to_bits()
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Int(a), Value::Int(b)) => a == b,
            (Value::Float(a), Value::Float(b)) => {
                canonical_f64_bits(*a) == canonical_f64_bits(*b)
            }
            (Value::Str(a), Value::Str(b)) => a == b,
            (Value::List(a), Value::List(b)) => a == b,
            (Value::Tuple(a), Value::Tuple(b)) => a == b,
            (Value::Map(a), Value::Map(b)) => a == b,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Null, Value::Null) => true,
            (Value::DateTime(a), Value::DateTime(b)) => a == b,
            (Value::Date(a), Value::Date(b)) => a == b,
            (Value::Time(a), Value::Time(b)) => a == b,
            (Value::Decimal(a), Value::Decimal(b)) => a == b,
            (Value::Bytes(a), Value::Bytes(b)) => a == b,
            (Value::ByteArray(a), Value::ByteArray(b)) => a == b,
            (Value::Counter(a), Value::Counter(b)) => a == b,
            (Value::OrderedMap(a), Value::OrderedMap(b)) => a == b,
            _ => false,
        }
    }
}

impl Eq for Value {}

impl Hash for Value {
    fn hash<H: Hasher>(&self, state: &mut H) {
        std::mem::discriminant(self).hash(state);
        match self {
            Value::Int(i) => i.hash(state),
            Value::Float(f) => canonical_f64_bits(*f).hash(state),
            Value::Str(s) => s.hash(state),
            Value::List(items) | Value::Tuple(items) => items.hash(state),
            Value::Map(entries) => entries.hash(state),
            Value::Bool(b) => b.hash(state),
            Value::Null => {}
            Value::DateTime(dt) => dt.hash(state),
            Value::Date(d) => d.hash(state),
            Value::Time(t) => t.hash(state),
            Value::Decimal(d) => d.hash(state),
            Value::Bytes(b) | Value::ByteArray(b) => b.hash(state),
            Value::Counter(entries) => entries.hash(state),
            Value::OrderedMap(entries) => entries.hash(state),
        }
    }
}

fn write_joined<T>(
    f: &mut fmt::Formatter<'_>,
    items: impl Iterator<Item = T>,
    mut each: impl FnMut(&mut fmt::Formatter<'_>, T) -> fmt::Result,
) -> fmt::Result {
    for (i, item) in items.enumerate() {
        if i > 0 {
            f.write_str(", ")?;
        }
        each(f, item)?;
    }
    Ok(())
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Int(i) => write!(f, "{i}"),
            Value::Float(v) => write!(f, "{v}"),
            Value::Str(s) => f.write_str(s),
            Value::List(items) => {
                f.write_str("[")?;
                write_joined(f, items.iter(), |f, v| write!(f, "{v}"))?;
                f.write_str("]")
            }
            Value::Tuple(items) => {
                f.write_str("(")?;
                write_joined(f, items.iter(), |f, v| write!(f, "{v}"))?;
                f.write_str(")")
            }
            Value::Map(entries) => {
                f.write_str("{")?;
                write_joined(f, entries.iter(), |f, (k, v)| write!(f, "{k}: {v}"))?;
                f.write_str("}")
            }
            Value::Bool(b) => write!(f, "{b}"),
            Value::Null => f.write_str("null"),
            Value::DateTime(dt) => write!(f, "{}", dt.format(DATETIME_FORMAT)),
            Value::Date(d) => write!(f, "{}", d.format(DATE_FORMAT)),
            Value::Time(t) => write!(f, "{}", t.format(TIME_FORMAT)),
            Value::Decimal(d) => write!(f, "{d}"),
            Value::Bytes(b) | Value::ByteArray(b) => f.write_str(&BASE64.encode(b)),
            Value::Counter(entries) => {
                f.write_str("{")?;
                write_joined(f, entries.iter(), |f, (k, n)| write!(f, "{k}: {n}"))?;
                f.write_str("}")
            }
            Value::OrderedMap(entries) => {
                f.write_str("{")?;
                write_joined(f, entries.iter(), |f, (k, v)| write!(f, "{k}: {v}"))?;
                f.write_str("}")
            }
        }
    }
}
