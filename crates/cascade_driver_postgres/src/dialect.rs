use cascade_core::{ColumnType, Dialect, LikeClause};

/// The only `Dialect` this crate implements. Kept as a unit struct — nothing
/// about Postgres's lexical rendering rules depends on runtime state — so a
/// `QueryParser`/`MigrationDriver` pair can hold a `&'static PostgresDialect`
/// instead of threading an `Arc` through every call.
#[derive(Debug, Default, Clone, Copy)]
pub struct PostgresDialect;

impl Dialect for PostgresDialect {
    fn placeholder(&self, index: usize) -> String {
        format!("${}", index)
    }

    fn quote_identifier(&self, name: &str) -> String {
        name.split('.')
            .map(|segment| format!("\"{}\"", segment.replace('"', "\"\"")))
            .collect::<Vec<_>>()
            .join(".")
    }

    fn boolean_literal(&self, value: bool) -> &'static str {
        if value { "TRUE" } else { "FALSE" }
    }

    fn limit_offset(&self, limit: Option<u64>, offset: Option<u64>) -> Option<String> {
        if limit.is_none() && offset.is_none() {
            return None;
        }
        let mut fragment = String::new();
        if let Some(limit) = limit {
            fragment.push_str(&format!("LIMIT {}", limit));
        }
        if let Some(offset) = offset {
            if !fragment.is_empty() {
                fragment.push(' ');
            }
            fragment.push_str(&format!("OFFSET {}", offset));
        }
        Some(fragment)
    }

    fn like_pattern(&self, needle: &str, case_insensitive: bool) -> LikeClause {
        let mut escaped = String::with_capacity(needle.len());
        for ch in needle.chars() {
            match ch {
                '\\' => escaped.push_str("\\\\"),
                '%' => escaped.push_str("\\%"),
                '_' => escaped.push_str("\\_"),
                other => escaped.push(other),
            }
        }
        LikeClause {
            operator: if case_insensitive { "ILIKE" } else { "LIKE" },
            pattern: escaped,
        }
    }

    fn json_extract(&self, column: &str, path: &str, as_text: bool) -> String {
        let keys: Vec<&str> = path.split('.').filter(|k| !k.is_empty()).collect();
        if keys.is_empty() {
            return self.quote_identifier(column);
        }
        let mut expr = self.quote_identifier(column);
        for (i, key) in keys.iter().enumerate() {
            let is_last = i == keys.len() - 1;
            let op = if is_last && as_text { "->>" } else { "->" };
            expr.push_str(&format!("{}'{}'", op, key.replace('\'', "''")));
        }
        expr
    }

    fn json_contains(&self, column: &str, value_placeholder: &str) -> String {
        format!(
            "{} @> {}::jsonb",
            self.quote_identifier(column),
            value_placeholder
        )
    }

    fn array_contains(&self, column: &str, value_placeholder: &str) -> String {
        format!("{} = ANY({})", value_placeholder, self.quote_identifier(column))
    }

    fn sql_type(&self, ty: &ColumnType) -> String {
        match ty {
            ColumnType::Id => "BIGSERIAL".to_string(),
            ColumnType::TinyInt => "SMALLINT".to_string(),
            ColumnType::SmallInt => "SMALLINT".to_string(),
            ColumnType::Integer => "INTEGER".to_string(),
            ColumnType::BigInt => "BIGINT".to_string(),
            ColumnType::Float => "REAL".to_string(),
            ColumnType::Double => "DOUBLE PRECISION".to_string(),
            ColumnType::Decimal { precision, scale } => format!("NUMERIC({}, {})", precision, scale),
            ColumnType::Boolean => "BOOLEAN".to_string(),
            ColumnType::Char(len) => format!("CHAR({})", len),
            ColumnType::String(len) => format!("VARCHAR({})", len),
            ColumnType::Text => "TEXT".to_string(),
            // Postgres has no medium/long text distinction; both coarsen to
            // TEXT, documented as the round-trip's one lossy mapping (§8).
            ColumnType::MediumText => "TEXT".to_string(),
            ColumnType::LongText => "TEXT".to_string(),
            ColumnType::Json => "JSON".to_string(),
            ColumnType::Jsonb => "JSONB".to_string(),
            ColumnType::Uuid => "UUID".to_string(),
            ColumnType::Ulid => "CHAR(26)".to_string(),
            ColumnType::Date => "DATE".to_string(),
            ColumnType::DateTime => "TIMESTAMP".to_string(),
            ColumnType::Time => "TIME".to_string(),
            ColumnType::Year => "SMALLINT".to_string(),
            ColumnType::Timestamp => "TIMESTAMP".to_string(),
            ColumnType::TimestampTz => "TIMESTAMP WITH TIME ZONE".to_string(),
            ColumnType::Binary => "BYTEA".to_string(),
            ColumnType::IpAddress => "INET".to_string(),
            ColumnType::MacAddress => "MACADDR".to_string(),
            ColumnType::Point => "POINT".to_string(),
            ColumnType::Polygon => "POLYGON".to_string(),
            ColumnType::LineString => "PATH".to_string(),
            ColumnType::Geometry => "GEOMETRY".to_string(),
            ColumnType::Array(inner) => format!("{}[]", self.sql_type(inner)),
            ColumnType::Vector(dimensions) => format!("vector({})", dimensions),
            ColumnType::Enum(_) => "TEXT".to_string(),
            ColumnType::Set(_) => "TEXT".to_string(),
        }
    }
}

/// The `information_schema.columns` facts needed to reverse `sql_type`.
/// `char_length`/`numeric_precision`/`numeric_scale` are `NULL` in the
/// catalog for types they don't apply to, hence `Option`.
#[derive(Debug, Clone, Copy, Default)]
pub struct PgTypeFacts<'a> {
    pub data_type: &'a str,
    pub udt_name: &'a str,
    pub char_length: Option<i32>,
    pub numeric_precision: Option<i32>,
    pub numeric_scale: Option<i32>,
}

/// Reverses `PostgresDialect::sql_type`: maps the catalog's reported type
/// back to the closest abstract `ColumnType`, for the §8 round-trip
/// property (`addColumn -> listColumns -> mapPostgresTypeToColumnType`).
///
/// A few mappings are intentionally lossy, same as `sql_type`'s own
/// coarsening: `mediumText`/`longText` both render as (and so both read
/// back as) `TEXT`/`Text`; `tinyInteger`/`year` both render as (and read
/// back as) `SMALLINT`/`SmallInt`. A 26-character fixed `CHAR` is read back
/// as `Ulid` specifically, since that's the only abstract type this crate
/// renders at that exact width; any other `CHAR(n)` round-trips as `Char`.
pub fn map_postgres_type_to_column_type(facts: PgTypeFacts<'_>) -> ColumnType {
    let data_type = facts.data_type.to_ascii_lowercase();
    let udt_name = facts.udt_name.to_ascii_lowercase();

    if data_type == "array" {
        let element_udt = udt_name.strip_prefix('_').unwrap_or(&udt_name);
        let element_facts = PgTypeFacts {
            data_type: element_udt,
            udt_name: element_udt,
            ..facts
        };
        return ColumnType::Array(Box::new(map_postgres_type_to_column_type(element_facts)));
    }

    match data_type.as_str() {
        "smallint" | "int2" => ColumnType::SmallInt,
        "integer" | "int" | "int4" => ColumnType::Integer,
        "bigint" | "int8" => ColumnType::BigInt,
        "real" | "float4" => ColumnType::Float,
        "double precision" | "float8" => ColumnType::Double,
        "numeric" | "decimal" => ColumnType::Decimal {
            precision: facts.numeric_precision.unwrap_or(0).max(0) as u32,
            scale: facts.numeric_scale.unwrap_or(0).max(0) as u32,
        },
        "boolean" | "bool" => ColumnType::Boolean,
        "character" | "bpchar" => match facts.char_length {
            Some(26) => ColumnType::Ulid,
            Some(len) => ColumnType::Char(len.max(0) as u32),
            None => ColumnType::Char(0),
        },
        "character varying" | "varchar" => {
            ColumnType::String(facts.char_length.unwrap_or(0).max(0) as u32)
        }
        "text" => ColumnType::Text,
        "json" => ColumnType::Json,
        "jsonb" => ColumnType::Jsonb,
        "uuid" => ColumnType::Uuid,
        "date" => ColumnType::Date,
        "time" | "time without time zone" | "time with time zone" => ColumnType::Time,
        "timestamp" | "timestamp without time zone" => ColumnType::DateTime,
        "timestamp with time zone" | "timestamptz" => ColumnType::TimestampTz,
        "bytea" => ColumnType::Binary,
        "inet" => ColumnType::IpAddress,
        "macaddr" | "macaddr8" => ColumnType::MacAddress,
        "point" => ColumnType::Point,
        "polygon" => ColumnType::Polygon,
        "path" => ColumnType::LineString,
        "geometry" => ColumnType::Geometry,
        _ if udt_name == "vector" => ColumnType::Vector(facts.numeric_precision.unwrap_or(0).max(0) as u32),
        // Enum/set values aren't recoverable from `information_schema.columns`
        // alone (they live in `pg_enum`); report the underlying storage type
        // rather than guessing at a label set.
        _ => ColumnType::Text,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quote_identifier_doubles_and_preserves_segments() {
        let dialect = PostgresDialect;
        assert_eq!(dialect.quote_identifier("users"), "\"users\"");
        assert_eq!(
            dialect.quote_identifier("users.email"),
            "\"users\".\"email\""
        );
        assert_eq!(dialect.quote_identifier("a\"b"), "\"a\"\"b\"");
    }

    #[test]
    fn like_pattern_escapes_wildcards() {
        let clause = PostgresDialect.like_pattern("50%_off", true);
        assert_eq!(clause.operator, "ILIKE");
        assert_eq!(clause.pattern, "50\\%\\_off");
    }

    #[test]
    fn json_extract_uses_arrow_then_double_arrow() {
        let dialect = PostgresDialect;
        assert_eq!(
            dialect.json_extract("meta", "address.city", true),
            "\"meta\"->'address'->>'city'"
        );
    }
}
