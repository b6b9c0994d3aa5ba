use cascade_core::{ColumnInfo, ColumnType, ForeignKeyInfo, IndexInfo, TableInfo, Value};

/// Builds a `ColumnInfo` fixture for seeding a `FakeDriver`'s blueprint or
/// asserting against one returned from a live driver. `type_name` is the
/// engine's raw catalog string (kept for display); `abstract_type` is what
/// a real `Blueprint` impl's reverse-mapping function would have produced
/// from it — callers pick both explicitly rather than this crate guessing,
/// since this crate stays engine-neutral and has no reverse-mapping
/// function of its own to call.
pub fn column(
    name: impl Into<String>,
    type_name: impl Into<String>,
    abstract_type: ColumnType,
    nullable: bool,
) -> ColumnInfo {
    ColumnInfo {
        name: name.into(),
        type_name: type_name.into(),
        abstract_type,
        nullable,
        is_primary_key: false,
        default_value: None,
    }
}

pub fn primary_key_column(
    name: impl Into<String>,
    type_name: impl Into<String>,
    abstract_type: ColumnType,
) -> ColumnInfo {
    ColumnInfo {
        is_primary_key: true,
        ..column(name, type_name, abstract_type, false)
    }
}

pub fn index(name: impl Into<String>, columns: Vec<String>, is_unique: bool) -> IndexInfo {
    IndexInfo {
        name: name.into(),
        columns,
        is_unique,
        is_primary: false,
    }
}

pub fn foreign_key(
    name: impl Into<String>,
    columns: Vec<String>,
    references_table: impl Into<String>,
    references_columns: Vec<String>,
) -> ForeignKeyInfo {
    ForeignKeyInfo {
        name: name.into(),
        columns,
        references_table: references_table.into(),
        references_columns,
    }
}

/// A table fixture with a single auto-increment `id` primary key, the
/// common starting point for a test that only cares about one or two
/// additional columns.
pub fn table_with_id(name: impl Into<String>, extra_columns: Vec<ColumnInfo>) -> TableInfo {
    let mut columns = vec![primary_key_column("id", "bigint", ColumnType::BigInt)];
    columns.extend(extra_columns);
    TableInfo {
        name: name.into(),
        columns,
        indexes: Vec::new(),
        foreign_keys: Vec::new(),
    }
}

pub fn row(pairs: Vec<(&str, Value)>) -> Vec<(String, Value)> {
    pairs.into_iter().map(|(k, v)| (k.to_string(), v)).collect()
}

pub fn int_cell(value: i64) -> Value {
    Value::Int(value)
}

pub fn text_cell(value: impl Into<String>) -> Value {
    Value::Text(value.into())
}
