use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

/// An engine-neutral database value.
///
/// Both the relational driver and the document driver convert their native
/// row/document representations into this type so the query builder, the
/// migration DSL, and application code never need to branch on which engine
/// produced a value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
    Bytes(Vec<u8>),
    /// JSON/JSONB, stored as a string for exact round-trip preservation.
    Json(String),
    /// Decimal stored as a string to preserve exact precision.
    Decimal(String),
    DateTime(DateTime<Utc>),
    Date(NaiveDate),
    Time(NaiveTime),
    /// Homogeneous or heterogeneous array — a Postgres `ARRAY` or a BSON array.
    Array(Vec<Value>),
    /// A nested document — a `jsonb` object or a BSON document.
    Document(serde_json::Map<String, serde_json::Value>),
    /// A MongoDB ObjectId, carried as its 24-character hex string.
    ObjectId(String),
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn as_display_string(&self) -> String {
        self.as_display_string_truncated(1000)
    }

    pub fn as_display_string_truncated(&self, max_len: usize) -> String {
        match self {
            Value::Null => "NULL".to_string(),
            Value::Bool(b) => b.to_string(),
            Value::Int(i) => i.to_string(),
            Value::Float(f) => f.to_string(),
            Value::Text(s) | Value::Json(s) | Value::Decimal(s) => truncate(s, max_len),
            Value::Bytes(b) => format!("<{} bytes>", b.len()),
            Value::DateTime(dt) => dt.format("%Y-%m-%d %H:%M:%S").to_string(),
            Value::Date(d) => d.format("%Y-%m-%d").to_string(),
            Value::Time(t) => t.format("%H:%M:%S").to_string(),
            Value::Array(items) => {
                let rendered: Vec<String> =
                    items.iter().map(|v| v.as_display_string()).collect();
                truncate(&format!("[{}]", rendered.join(", ")), max_len)
            }
            Value::Document(map) => {
                let json = serde_json::Value::Object(map.clone());
                truncate(&json.to_string(), max_len)
            }
            Value::ObjectId(id) => id.clone(),
        }
    }
}

fn truncate(s: &str, max_len: usize) -> String {
    if s.len() <= max_len {
        s.to_string()
    } else {
        let truncated: String = s.chars().take(max_len).collect();
        format!("{}...", truncated)
    }
}

impl std::fmt::Display for Value {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_display_string())
    }
}

impl Value {
    fn type_order(&self) -> u8 {
        match self {
            Value::Bool(_) => 0,
            Value::Int(_) => 1,
            Value::Float(_) => 2,
            Value::Decimal(_) => 3,
            Value::Text(_) => 4,
            Value::Json(_) => 5,
            Value::DateTime(_) => 6,
            Value::Date(_) => 7,
            Value::Time(_) => 8,
            Value::Bytes(_) => 9,
            Value::Array(_) => 10,
            Value::Document(_) => 11,
            Value::ObjectId(_) => 12,
            Value::Null => 13,
        }
    }
}

impl PartialOrd for Value {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Value {
    fn cmp(&self, other: &Self) -> Ordering {
        use Value::*;

        match (self, other) {
            // Nulls sort last, matching SQL's NULLS LAST default.
            (Null, Null) => Ordering::Equal,
            (Null, _) => Ordering::Greater,
            (_, Null) => Ordering::Less,

            (Bool(a), Bool(b)) => a.cmp(b),
            (Int(a), Int(b)) => a.cmp(b),
            (Float(a), Float(b)) => a.total_cmp(b),
            (Text(a), Text(b)) => a.cmp(b),
            (Bytes(a), Bytes(b)) => a.cmp(b),
            (Json(a), Json(b)) => a.cmp(b),
            (Decimal(a), Decimal(b)) => a.cmp(b),
            (DateTime(a), DateTime(b)) => a.cmp(b),
            (Date(a), Date(b)) => a.cmp(b),
            (Time(a), Time(b)) => a.cmp(b),
            (ObjectId(a), ObjectId(b)) => a.cmp(b),
            (Array(a), Array(b)) => a.cmp(b),

            // Numeric cross-promotion so `1 < 1.5` holds regardless of variant.
            (Int(a), Float(b)) => (*a as f64).total_cmp(b),
            (Float(a), Int(b)) => a.total_cmp(&(*b as f64)),

            _ => self.type_order().cmp(&other.type_order()),
        }
    }
}

impl Eq for Value {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn nulls_sort_last() {
        let mut values = vec![Value::Int(2), Value::Null, Value::Int(1)];
        values.sort();
        assert_eq!(values, vec![Value::Int(1), Value::Int(2), Value::Null]);
    }

    #[test]
    fn int_and_float_compare_numerically() {
        assert!(Value::Int(1) < Value::Float(1.5));
        assert!(Value::Float(2.0) > Value::Int(1));
    }

    #[test]
    fn array_display_is_bracketed() {
        let v = Value::Array(vec![Value::Int(1), Value::Int(2)]);
        assert_eq!(v.as_display_string(), "[1, 2]");
    }
}
