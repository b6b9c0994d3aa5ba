use async_trait::async_trait;

use crate::{ColumnType, DbError};

#[derive(Debug, Clone)]
pub struct ColumnInfo {
    pub name: String,
    /// The engine's own raw type name, exactly as its catalog reports it
    /// (e.g. `"character varying"`), kept for diagnostics/display.
    pub type_name: String,
    /// `type_name` mapped back to the engine-neutral `ColumnType`, so the
    /// §8 round-trip (`addColumn -> listColumns -> mapPostgresTypeToColumnType`)
    /// has a typed accessor rather than forcing callers to re-parse
    /// `type_name` themselves. Each `Blueprint` implementation computes this
    /// with its own reverse-mapping function when it builds a `ColumnInfo`.
    pub abstract_type: ColumnType,
    pub nullable: bool,
    pub is_primary_key: bool,
    pub default_value: Option<String>,
}

#[derive(Debug, Clone)]
pub struct IndexInfo {
    pub name: String,
    pub columns: Vec<String>,
    pub is_unique: bool,
    pub is_primary: bool,
}

#[derive(Debug, Clone)]
pub struct ForeignKeyInfo {
    pub name: String,
    pub columns: Vec<String>,
    pub references_table: String,
    pub references_columns: Vec<String>,
}

#[derive(Debug, Clone, Default)]
pub struct TableInfo {
    pub name: String,
    pub columns: Vec<ColumnInfo>,
    pub indexes: Vec<IndexInfo>,
    pub foreign_keys: Vec<ForeignKeyInfo>,
}

/// Read-only schema introspection, implemented once per engine.
///
/// A table/collection that doesn't exist yields an empty `TableInfo`
/// (empty column/index/foreign-key lists), never an error — mirroring how
/// the relational driver's `information_schema` queries simply return no
/// rows for a name that isn't there.
#[async_trait]
pub trait Blueprint: Send + Sync {
    async fn has_table(&self, name: &str) -> Result<bool, DbError>;
    async fn table(&self, name: &str) -> Result<TableInfo, DbError>;
    async fn tables(&self) -> Result<Vec<String>, DbError>;
    async fn has_column(&self, table: &str, column: &str) -> Result<bool, DbError>;
}
