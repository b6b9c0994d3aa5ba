use async_trait::async_trait;

use crate::{ColumnDefinition, DbError, ForeignKeyDefinition, IndexDefinition};

/// One DDL atom queued by the migration DSL (`migration.rs`) and rendered
/// by a concrete `MigrationDriver`. This is a closed set: every fluent
/// method on a migration `Blueprint` pushes exactly one variant.
#[derive(Debug, Clone)]
pub enum SchemaOperation {
    CreateTable {
        table: String,
        columns: Vec<ColumnDefinition>,
    },
    DropTable {
        table: String,
        if_exists: bool,
    },
    RenameTable {
        from: String,
        to: String,
    },
    AddColumn {
        table: String,
        column: ColumnDefinition,
    },
    DropColumn {
        table: String,
        column: String,
    },
    /// Split by the driver into up to three `ALTER COLUMN` statements
    /// (type, nullability, default) since Postgres requires each as a
    /// separate clause when more than one changes at once.
    ModifyColumn {
        table: String,
        column: ColumnDefinition,
    },
    RenameColumn {
        table: String,
        from: String,
        to: String,
    },
    CreateIndex {
        table: String,
        index: IndexDefinition,
    },
    DropIndex {
        table: String,
        name: String,
    },
    AddForeignKey {
        table: String,
        name: Option<String>,
        foreign_key: ForeignKeyDefinition,
    },
    DropForeignKey {
        table: String,
        name: String,
    },
    AddPrimaryKey {
        table: String,
        columns: Vec<String>,
    },
    AddCheckConstraint {
        table: String,
        name: String,
        expression: String,
    },
    DropConstraint {
        table: String,
        name: String,
    },
    /// Validated only where the engine supports it; a no-op elsewhere
    /// (e.g. a relational driver asked to validate a document-schema
    /// rule) rather than an error.
    ValidateSchema {
        table: String,
        rule: String,
    },
    /// An engine-native statement/command for anything the closed atom
    /// set above doesn't cover. This is this crate's resolution for the
    /// original `raw(callback)` shape: a callback given a live native
    /// connection handle doesn't fit an object-safe async trait without
    /// boxed per-call futures, so `raw` instead carries the engine-native
    /// statement text and is dispatched by the driver like any other atom.
    Raw(String),
}

/// One row of the `_migrations` batch ledger.
#[derive(Debug, Clone)]
pub struct MigrationRecord {
    pub name: String,
    pub batch: i64,
}

/// Renders and executes `SchemaOperation`s against one engine, and owns the
/// `_migrations` batch ledger (a table on the relational engine, a
/// collection on the document engine).
#[async_trait]
pub trait MigrationDriver: Send + Sync {
    async fn apply(&self, operations: &[SchemaOperation]) -> Result<(), DbError>;

    /// Whether `operations` should run inside a single transaction. Most
    /// relational DDL is transactional; document-engine collection/index
    /// creation generally is not, so document drivers return `false`.
    fn supports_transactional_ddl(&self) -> bool;

    /// Create the `_migrations` ledger if it doesn't already exist.
    async fn ensure_ledger(&self) -> Result<(), DbError>;

    async fn recorded_migrations(&self) -> Result<Vec<MigrationRecord>, DbError>;

    async fn record_migration(&self, name: &str, batch: i64) -> Result<(), DbError>;

    async fn remove_migration_record(&self, name: &str) -> Result<(), DbError>;
}
