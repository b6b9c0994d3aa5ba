use async_trait::async_trait;

use crate::{
    ColumnDefault, ColumnDefinition, ColumnType, DbError, ForeignKeyDefinition, IndexDefinition,
    MigrationDriver, OnDelete, SchemaOperation,
};

/// A fluent table builder. Every method here QUEUES a `SchemaOperation`
/// rather than executing it immediately; nothing happens until
/// `SchemaBuilder::execute` flushes the queue, in the order operations were
/// pushed.
pub struct TableBuilder<'a> {
    table: String,
    queue: &'a mut Vec<SchemaOperation>,
}

impl<'a> TableBuilder<'a> {
    fn new(table: impl Into<String>, queue: &'a mut Vec<SchemaOperation>) -> Self {
        Self {
            table: table.into(),
            queue,
        }
    }

    pub fn column(&mut self, name: impl Into<String>, ty: ColumnType) -> ColumnHandle<'_> {
        let column = ColumnDefinition::new(name, ty);
        ColumnHandle {
            table: &self.table,
            queue: self.queue,
            column,
            kind: ColumnOpKind::Add,
        }
    }

    pub fn id(&mut self) {
        self.queue.push(SchemaOperation::AddColumn {
            table: self.table.clone(),
            column: ColumnDefinition::new("id", ColumnType::Id)
                .primary_key()
                .auto_increment(),
        });
    }

    pub fn timestamps(&mut self) {
        for name in ["created_at", "updated_at"] {
            self.queue.push(SchemaOperation::AddColumn {
                table: self.table.clone(),
                column: ColumnDefinition::new(name, ColumnType::TimestampTz)
                    .nullable()
                    .default_value(ColumnDefault::CurrentTimestamp),
            });
        }
    }

    pub fn drop_column(&mut self, name: impl Into<String>) {
        self.queue.push(SchemaOperation::DropColumn {
            table: self.table.clone(),
            column: name.into(),
        });
    }

    pub fn rename_column(&mut self, from: impl Into<String>, to: impl Into<String>) {
        self.queue.push(SchemaOperation::RenameColumn {
            table: self.table.clone(),
            from: from.into(),
            to: to.into(),
        });
    }

    pub fn index(&mut self, index: IndexDefinition) {
        self.queue.push(SchemaOperation::CreateIndex {
            table: self.table.clone(),
            index,
        });
    }

    pub fn drop_index(&mut self, name: impl Into<String>) {
        self.queue.push(SchemaOperation::DropIndex {
            table: self.table.clone(),
            name: name.into(),
        });
    }

    pub fn foreign_key(
        &mut self,
        columns: Vec<String>,
        references_table: impl Into<String>,
        references_columns: Vec<String>,
    ) -> ForeignKeyHandle<'_> {
        ForeignKeyHandle {
            table: &self.table,
            queue: self.queue,
            name: None,
            definition: ForeignKeyDefinition {
                columns,
                references_table: references_table.into(),
                references_columns,
                on_delete: OnDelete::NoAction,
                on_update: OnDelete::NoAction,
            },
        }
    }

    pub fn drop_foreign_key(&mut self, name: impl Into<String>) {
        self.queue.push(SchemaOperation::DropForeignKey {
            table: self.table.clone(),
            name: name.into(),
        });
    }

    pub fn primary_key(&mut self, columns: Vec<String>) {
        self.queue.push(SchemaOperation::AddPrimaryKey {
            table: self.table.clone(),
            columns,
        });
    }

    pub fn check(&mut self, name: impl Into<String>, expression: impl Into<String>) {
        self.queue.push(SchemaOperation::AddCheckConstraint {
            table: self.table.clone(),
            name: name.into(),
            expression: expression.into(),
        });
    }
}

enum ColumnOpKind {
    Add,
    Modify,
}

/// Returned by `TableBuilder::column`; queues its `AddColumn`/`ModifyColumn`
/// operation when dropped, after the caller has chained modifiers like
/// `.nullable()`.
pub struct ColumnHandle<'a> {
    table: &'a str,
    queue: &'a mut Vec<SchemaOperation>,
    column: ColumnDefinition,
    kind: ColumnOpKind,
}

impl<'a> ColumnHandle<'a> {
    pub fn nullable(mut self) -> Self {
        self.column.nullable = true;
        self
    }

    pub fn unique(mut self) -> Self {
        self.column.unique = true;
        self
    }

    pub fn default_value(mut self, default: ColumnDefault) -> Self {
        self.column.default = Some(default);
        self
    }

    pub fn comment(mut self, comment: impl Into<String>) -> Self {
        self.column.comment = Some(comment.into());
        self
    }

    pub fn modify(mut self) -> Self {
        self.kind = ColumnOpKind::Modify;
        self
    }
}

impl<'a> Drop for ColumnHandle<'a> {
    fn drop(&mut self) {
        let column = self.column.clone();
        let op = match self.kind {
            ColumnOpKind::Add => SchemaOperation::AddColumn {
                table: self.table.to_string(),
                column,
            },
            ColumnOpKind::Modify => SchemaOperation::ModifyColumn {
                table: self.table.to_string(),
                column,
            },
        };
        self.queue.push(op);
    }
}

pub struct ForeignKeyHandle<'a> {
    table: &'a str,
    queue: &'a mut Vec<SchemaOperation>,
    name: Option<String>,
    definition: ForeignKeyDefinition,
}

impl<'a> ForeignKeyHandle<'a> {
    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn on_delete(mut self, action: OnDelete) -> Self {
        self.definition.on_delete = action;
        self
    }

    pub fn on_update(mut self, action: OnDelete) -> Self {
        self.definition.on_update = action;
        self
    }
}

impl<'a> Drop for ForeignKeyHandle<'a> {
    fn drop(&mut self) {
        self.queue.push(SchemaOperation::AddForeignKey {
            table: self.table.to_string(),
            name: self.name.take(),
            foreign_key: self.definition.clone(),
        });
    }
}

/// Accumulates `SchemaOperation`s for one migration's `up`/`down` body and
/// flushes them, in queue order, to a `MigrationDriver`.
#[derive(Default)]
pub struct SchemaBuilder {
    queue: Vec<SchemaOperation>,
}

impl SchemaBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn create_table(
        &mut self,
        table: impl Into<String>,
        build: impl FnOnce(&mut TableBuilder),
    ) {
        let table = table.into();
        self.queue.push(SchemaOperation::CreateTable {
            table: table.clone(),
            columns: Vec::new(),
        });
        let mut builder = TableBuilder::new(table, &mut self.queue);
        build(&mut builder);
    }

    pub fn alter_table(&mut self, table: impl Into<String>, build: impl FnOnce(&mut TableBuilder)) {
        let mut builder = TableBuilder::new(table, &mut self.queue);
        build(&mut builder);
    }

    pub fn drop_table(&mut self, table: impl Into<String>) {
        self.queue.push(SchemaOperation::DropTable {
            table: table.into(),
            if_exists: false,
        });
    }

    pub fn drop_table_if_exists(&mut self, table: impl Into<String>) {
        self.queue.push(SchemaOperation::DropTable {
            table: table.into(),
            if_exists: true,
        });
    }

    pub fn rename_table(&mut self, from: impl Into<String>, to: impl Into<String>) {
        self.queue.push(SchemaOperation::RenameTable {
            from: from.into(),
            to: to.into(),
        });
    }

    pub fn raw(&mut self, statement: impl Into<String>) {
        self.queue.push(SchemaOperation::Raw(statement.into()));
    }

    pub fn pending(&self) -> &[SchemaOperation] {
        &self.queue
    }

    /// Flush the queue to `driver`, in the order operations were pushed,
    /// and clear it.
    pub async fn execute(&mut self, driver: &dyn MigrationDriver) -> Result<(), DbError> {
        let ops = std::mem::take(&mut self.queue);
        driver.apply(&ops).await
    }
}

/// One registered migration. `name()` is its stable identity in the
/// `_migrations` batch ledger; `order()` only breaks ties among migrations
/// that would otherwise sort equal by name.
#[async_trait]
pub trait Migration: Send + Sync {
    fn name(&self) -> String;

    fn order(&self) -> Option<i64> {
        None
    }

    /// Whether `up`/`down` should run inside a single transaction. Ignored
    /// where the target `MigrationDriver::supports_transactional_ddl` is
    /// `false`.
    fn transactional(&self) -> bool {
        true
    }

    /// The registered data source name to run against, or `None` to use
    /// the registry's default.
    fn data_source(&self) -> Option<String> {
        None
    }

    async fn up(&self, schema: &mut SchemaBuilder);
    async fn down(&self, schema: &mut SchemaBuilder);
}
