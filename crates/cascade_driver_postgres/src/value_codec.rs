use std::error::Error as StdError;

use bytes::BytesMut;
use cascade_core::Value;
use postgres_types::{FromSql, IsNull, ToSql, Type};
use tokio_postgres::Row as PgRow;

/// Bridges `cascade_core::Value` to `tokio_postgres`'s dynamic bind/decode
/// traits. The relational driver binds every placeholder through `ToSql for
/// Value` and decodes every returned column through `pg_row_to_cascade_row`,
/// so no other module in this crate touches `postgres_types` directly.
impl ToSql for Value {
    fn to_sql(
        &self,
        ty: &Type,
        out: &mut BytesMut,
    ) -> Result<IsNull, Box<dyn StdError + Sync + Send>> {
        match self {
            Value::Null => Ok(IsNull::Yes),
            Value::Bool(b) => b.to_sql(ty, out),
            Value::Int(i) => match *ty {
                Type::INT2 => (*i as i16).to_sql(ty, out),
                Type::INT4 => (*i as i32).to_sql(ty, out),
                _ => i.to_sql(ty, out),
            },
            Value::Float(f) => match *ty {
                Type::FLOAT4 => (*f as f32).to_sql(ty, out),
                _ => f.to_sql(ty, out),
            },
            // JSON/JSONB placeholders are always cast explicitly in the
            // generated SQL (`$n::jsonb`), so binding as plain text avoids
            // hand-rolling the jsonb wire format's version-byte prefix.
            Value::Text(s) | Value::Json(s) | Value::Decimal(s) => s.as_str().to_sql(ty, out),
            Value::Bytes(b) => b.as_slice().to_sql(ty, out),
            Value::DateTime(dt) => dt.to_sql(ty, out),
            Value::Date(d) => d.to_sql(ty, out),
            Value::Time(t) => t.to_sql(ty, out),
            Value::ObjectId(id) => id.as_str().to_sql(ty, out),
            Value::Array(items) => encode_array(items, ty, out),
            Value::Document(map) => {
                serde_json::Value::Object(map.clone()).to_string().to_sql(ty, out)
            }
        }
    }

    fn accepts(_ty: &Type) -> bool {
        true
    }

    postgres_types::to_sql_checked!();
}

/// Arrays bind element-by-element through the matching typed `Vec<T>`
/// encoder so `= ANY($n)` sees a real Postgres array, not a text blob. The
/// element type is taken from the first item; a `WhereIn`/`whereIn` list is
/// always homogeneous coming out of the query builder.
fn encode_array(
    items: &[Value],
    ty: &Type,
    out: &mut BytesMut,
) -> Result<IsNull, Box<dyn StdError + Sync + Send>> {
    match items.first() {
        None => Vec::<i64>::new().to_sql(ty, out),
        Some(Value::Int(_)) => {
            let ints: Vec<i64> = items
                .iter()
                .map(|v| match v {
                    Value::Int(i) => *i,
                    _ => 0,
                })
                .collect();
            ints.to_sql(ty, out)
        }
        Some(Value::Float(_)) => {
            let floats: Vec<f64> = items
                .iter()
                .map(|v| match v {
                    Value::Float(f) => *f,
                    Value::Int(i) => *i as f64,
                    _ => 0.0,
                })
                .collect();
            floats.to_sql(ty, out)
        }
        Some(Value::Bool(_)) => {
            let bools: Vec<bool> = items
                .iter()
                .map(|v| matches!(v, Value::Bool(true)))
                .collect();
            bools.to_sql(ty, out)
        }
        _ => {
            let strings: Vec<String> = items.iter().map(|v| v.as_display_string()).collect();
            strings.to_sql(ty, out)
        }
    }
}

/// Converts one returned row into the engine-neutral `(name, Value)` list.
pub fn pg_row_to_cascade_row(row: &PgRow) -> Vec<(String, Value)> {
    row.columns()
        .iter()
        .enumerate()
        .map(|(idx, col)| (col.name().to_string(), decode_column(row, idx, col.type_())))
        .collect()
}

fn decode_column(row: &PgRow, idx: usize, ty: &Type) -> Value {
    match *ty {
        Type::BOOL => get_or_null(row, idx, Value::Bool),
        Type::INT2 => get_or_null::<i16, _>(row, idx, |v| Value::Int(v as i64)),
        Type::INT4 => get_or_null::<i32, _>(row, idx, |v| Value::Int(v as i64)),
        Type::INT8 => get_or_null(row, idx, Value::Int),
        Type::FLOAT4 => get_or_null::<f32, _>(row, idx, |v| Value::Float(v as f64)),
        Type::FLOAT8 => get_or_null(row, idx, Value::Float),
        Type::TEXT | Type::VARCHAR | Type::BPCHAR | Type::NAME => {
            get_or_null(row, idx, Value::Text)
        }
        Type::UUID => get_or_null::<uuid::Uuid, _>(row, idx, |v| Value::Text(v.to_string())),
        Type::BYTEA => get_or_null(row, idx, Value::Bytes),
        Type::JSON | Type::JSONB => get_or_null::<serde_json::Value, _>(row, idx, |v| {
            Value::Json(v.to_string())
        }),
        Type::NUMERIC => match row.try_get::<_, Option<PgNumeric>>(idx) {
            Ok(Some(numeric)) => Value::Decimal(numeric.0),
            _ => Value::Null,
        },
        Type::TIMESTAMP => {
            get_or_null::<chrono::NaiveDateTime, _>(row, idx, |v| {
                Value::DateTime(chrono::DateTime::from_naive_utc_and_offset(v, chrono::Utc))
            })
        }
        Type::TIMESTAMPTZ => get_or_null::<chrono::DateTime<chrono::Utc>, _>(row, idx, Value::DateTime),
        Type::DATE => get_or_null(row, idx, Value::Date),
        Type::TIME => get_or_null(row, idx, Value::Time),
        _ => match row.try_get::<_, Option<String>>(idx) {
            Ok(Some(text)) => Value::Text(text),
            _ => Value::Null,
        },
    }
}

fn get_or_null<'a, T, F>(row: &'a PgRow, idx: usize, wrap: F) -> Value
where
    T: FromSql<'a>,
    F: FnOnce(T) -> Value,
{
    match row.try_get::<_, Option<T>>(idx) {
        Ok(Some(value)) => wrap(value),
        _ => Value::Null,
    }
}

/// Decodes Postgres's binary `NUMERIC` wire format into its base-10 text
/// representation. The driver stack carries no decimal crate, so this reads
/// the format directly: a `u16` digit count, `i16` weight (in base-10000
/// groups), `u16` sign, `u16` display scale, then `ndigits` base-10000
/// digit groups.
struct PgNumeric(String);

impl<'a> FromSql<'a> for PgNumeric {
    fn from_sql(_ty: &Type, raw: &'a [u8]) -> Result<Self, Box<dyn StdError + Sync + Send>> {
        if raw.len() < 8 {
            return Err("numeric payload too short".into());
        }
        let ndigits = u16::from_be_bytes([raw[0], raw[1]]) as usize;
        let weight = i16::from_be_bytes([raw[2], raw[3]]);
        let sign = u16::from_be_bytes([raw[4], raw[5]]);
        let dscale = u16::from_be_bytes([raw[6], raw[7]]) as usize;

        let mut digits = Vec::with_capacity(ndigits);
        for i in 0..ndigits {
            let offset = 8 + i * 2;
            if raw.len() < offset + 2 {
                return Err("numeric payload truncated".into());
            }
            digits.push(u16::from_be_bytes([raw[offset], raw[offset + 1]]));
        }

        let mut integer_part = String::new();
        let mut exponent = weight;
        for digit in &digits {
            if !integer_part.is_empty() || exponent >= 0 {
                integer_part.push_str(&format!("{:04}", digit));
            }
            exponent -= 1;
        }
        if integer_part.is_empty() {
            integer_part.push('0');
        } else {
            integer_part = integer_part.trim_start_matches('0').to_string();
            if integer_part.is_empty() {
                integer_part.push('0');
            }
        }

        let mut text = if sign == 0x4000 {
            format!("-{}", integer_part)
        } else {
            integer_part
        };

        if dscale > 0 {
            let mut fractional = String::new();
            let mut exponent = weight;
            for digit in &digits {
                if exponent < 0 {
                    fractional.push_str(&format!("{:04}", digit));
                }
                exponent -= 1;
            }
            fractional.truncate(dscale);
            while fractional.len() < dscale {
                fractional.push('0');
            }
            text.push('.');
            text.push_str(&fractional);
        }

        Ok(PgNumeric(text))
    }

    fn accepts(ty: &Type) -> bool {
        *ty == Type::NUMERIC
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn value_to_sql_accepts_any_type() {
        assert!(<Value as ToSql>::accepts(&Type::TEXT));
        assert!(<Value as ToSql>::accepts(&Type::INT8));
    }
}
