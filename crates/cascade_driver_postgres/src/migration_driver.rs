use async_trait::async_trait;
use deadpool_postgres::Pool;

use cascade_core::{
    ColumnDefault, ColumnDefinition, ColumnType, DbError, Dialect, ForeignKeyDefinition,
    IndexDefinition, IndexKind, MigrationDriver, MigrationRecord, OnDelete, SchemaOperation,
    VectorMetric,
};

use crate::dialect::PostgresDialect;
use crate::error::format_pg_error;

/// Renders and executes `SchemaOperation` atoms against Postgres, and owns
/// the `_migrations` batch ledger table.
pub struct PostgresMigrationDriver {
    pool: Pool,
    dialect: PostgresDialect,
    ledger_table: String,
}

impl PostgresMigrationDriver {
    pub fn new(pool: Pool) -> Self {
        Self {
            pool,
            dialect: PostgresDialect,
            ledger_table: "_migrations".to_string(),
        }
    }

    pub fn with_ledger_table(mut self, name: impl Into<String>) -> Self {
        self.ledger_table = name.into();
        self
    }

    fn q(&self, name: &str) -> String {
        self.dialect.quote_identifier(name)
    }

    fn render(&self, op: &SchemaOperation) -> String {
        match op {
            SchemaOperation::CreateTable { table, columns } => {
                let cols: Vec<String> = columns.iter().map(|c| self.render_column(c)).collect();
                format!("CREATE TABLE {} ({})", self.q(table), cols.join(", "))
            }
            SchemaOperation::DropTable { table, if_exists } => format!(
                "DROP TABLE {}{}",
                if *if_exists { "IF EXISTS " } else { "" },
                self.q(table)
            ),
            SchemaOperation::RenameTable { from, to } => {
                format!("ALTER TABLE {} RENAME TO {}", self.q(from), self.q(to))
            }
            SchemaOperation::AddColumn { table, column } => format!(
                "ALTER TABLE {} ADD COLUMN {}",
                self.q(table),
                self.render_column(column)
            ),
            SchemaOperation::DropColumn { table, column } => {
                format!("ALTER TABLE {} DROP COLUMN {}", self.q(table), self.q(column))
            }
            SchemaOperation::RenameColumn { table, from, to } => format!(
                "ALTER TABLE {} RENAME COLUMN {} TO {}",
                self.q(table),
                self.q(from),
                self.q(to)
            ),
            // ModifyColumn is handled by `render_many` since it expands to
            // up to three statements; this branch only covers the common
            // single-statement case used when called standalone.
            SchemaOperation::ModifyColumn { table, column } => self.render_modify(table, column).join("; "),
            SchemaOperation::CreateIndex { table, index } => self.render_create_index(table, index),
            SchemaOperation::DropIndex { table: _, name } => {
                format!("DROP INDEX IF EXISTS {}", self.q(name))
            }
            SchemaOperation::AddForeignKey {
                table,
                name,
                foreign_key,
            } => self.render_add_foreign_key(table, name.as_deref(), foreign_key),
            SchemaOperation::DropForeignKey { table, name } => format!(
                "ALTER TABLE {} DROP CONSTRAINT IF EXISTS {}",
                self.q(table),
                self.q(name)
            ),
            SchemaOperation::AddPrimaryKey { table, columns } => {
                let cols: Vec<String> = columns.iter().map(|c| self.q(c)).collect();
                format!(
                    "ALTER TABLE {} ADD PRIMARY KEY ({})",
                    self.q(table),
                    cols.join(", ")
                )
            }
            SchemaOperation::AddCheckConstraint {
                table,
                name,
                expression,
            } => format!(
                "ALTER TABLE {} ADD CONSTRAINT {} CHECK ({})",
                self.q(table),
                self.q(name),
                expression
            ),
            SchemaOperation::DropConstraint { table, name } => format!(
                "ALTER TABLE {} DROP CONSTRAINT IF EXISTS {}",
                self.q(table),
                self.q(name)
            ),
            // Schema validation is a document-engine concept; a no-op here
            // that still logs the attempt, per §4.5.
            SchemaOperation::ValidateSchema { table, rule } => {
                log::debug!("schema validation '{}' on '{}' is a no-op on Postgres", rule, table);
                String::new()
            }
            SchemaOperation::Raw(statement) => statement.clone(),
        }
    }

    fn render_column(&self, column: &ColumnDefinition) -> String {
        let mut parts = vec![self.q(&column.name)];

        // SERIAL/BIGSERIAL auto-generates; NOT NULL is implicit and the
        // source skips it explicitly in that case (§4.5).
        let is_auto_increment_integer = column.auto_increment
            && matches!(
                column.ty,
                ColumnType::Integer | ColumnType::BigInt | ColumnType::Id
            );

        if is_auto_increment_integer {
            parts.push(match column.ty {
                ColumnType::Integer => "SERIAL".to_string(),
                _ => "BIGSERIAL".to_string(),
            });
        } else {
            parts.push(self.dialect.sql_type(&column.ty));
        }

        if column.primary_key {
            parts.push("PRIMARY KEY".to_string());
        }
        if !column.nullable && !is_auto_increment_integer {
            parts.push("NOT NULL".to_string());
        }
        if column.unique {
            parts.push("UNIQUE".to_string());
        }
        if let Some(default) = &column.default {
            parts.push(format!("DEFAULT {}", self.render_default(default)));
        }

        parts.join(" ")
    }

    fn render_default(&self, default: &ColumnDefault) -> String {
        match default {
            ColumnDefault::CurrentTimestamp => "NOW()".to_string(),
            ColumnDefault::Raw(expr) => expr.clone(),
            ColumnDefault::Literal(value) => render_default_literal(value),
        }
    }

    /// `modifyColumn` splits into up to three `ALTER COLUMN` statements:
    /// TYPE, nullability, and default (§4.5).
    fn render_modify(&self, table: &str, column: &ColumnDefinition) -> Vec<String> {
        let mut statements = Vec::new();
        let table_q = self.q(table);
        let col_q = self.q(&column.name);

        statements.push(format!(
            "ALTER TABLE {} ALTER COLUMN {} TYPE {}",
            table_q,
            col_q,
            self.dialect.sql_type(&column.ty)
        ));
        statements.push(format!(
            "ALTER TABLE {} ALTER COLUMN {} {}",
            table_q,
            col_q,
            if column.nullable { "DROP NOT NULL" } else { "SET NOT NULL" }
        ));
        if let Some(default) = &column.default {
            statements.push(format!(
                "ALTER TABLE {} ALTER COLUMN {} SET DEFAULT {}",
                table_q,
                col_q,
                self.render_default(default)
            ));
        }
        statements
    }

    fn render_create_index(&self, table: &str, index: &IndexDefinition) -> String {
        let name = index.name.clone().unwrap_or_else(|| {
            if index.columns.is_empty() && !index.expressions.is_empty() {
                format!("{}_{}_idx", table, sanitize_for_index_name(&index.expressions.join("_")))
            } else {
                format!("{}_{}_idx", table, index.columns.join("_"))
            }
        });

        match &index.kind {
            IndexKind::Vector { metric, lists } => return self.render_vector_index(table, index, &name, *metric, *lists),
            IndexKind::FullText => {
                let expr = index
                    .columns
                    .iter()
                    .map(|c| format!("to_tsvector('english', {})", self.q(c)))
                    .collect::<Vec<_>>()
                    .join(" || ");
                return format!(
                    "CREATE INDEX {} ON {} USING gin (({}))",
                    self.q(&name),
                    self.q(table),
                    expr
                );
            }
            IndexKind::Geo => {
                let cols: Vec<String> = index.columns.iter().map(|c| self.q(c)).collect();
                return format!(
                    "CREATE INDEX {} ON {} USING gist ({})",
                    self.q(&name),
                    self.q(table),
                    cols.join(", ")
                );
            }
            // A relational-engine TTL index is emulated with a partial
            // B-tree index; actual expiration is an external scheduled job
            // (§4.5) — recorded in DESIGN.md.
            IndexKind::Ttl { after_seconds } => {
                let cols: Vec<String> = index.columns.iter().map(|c| self.q(c)).collect();
                return format!(
                    "CREATE INDEX {} ON {} ({}) -- TTL emulation: expire rows older than {}s via an external job",
                    self.q(&name),
                    self.q(table),
                    cols.join(", "),
                    after_seconds
                );
            }
            IndexKind::Plain | IndexKind::Unique => {}
        }

        let unique = matches!(index.kind, IndexKind::Unique);
        let concurrently = if index.concurrently { "CONCURRENTLY " } else { "" };
        // Expression-based indexes (§4.5's `(expr)` list) render their
        // expressions verbatim rather than quoting them as identifiers;
        // mutually exclusive with plain `columns`.
        let cols: Vec<String> = if !index.expressions.is_empty() {
            index.expressions.clone()
        } else {
            index.columns.iter().map(|c| self.q(c)).collect()
        };

        let mut sql = format!(
            "CREATE {}INDEX {}{} ON {} ({})",
            if unique { "UNIQUE " } else { "" },
            concurrently,
            self.q(&name),
            self.q(table),
            cols.join(", ")
        );
        if !index.include.is_empty() {
            let include: Vec<String> = index.include.iter().map(|c| self.q(c)).collect();
            sql.push_str(&format!(" INCLUDE ({})", include.join(", ")));
        }
        if let Some(condition) = &index.condition {
            sql.push_str(&format!(" WHERE {}", condition));
        }
        sql
    }

    fn render_vector_index(
        &self,
        table: &str,
        index: &IndexDefinition,
        name: &str,
        metric: VectorMetric,
        lists: u32,
    ) -> String {
        let op_class = match metric {
            VectorMetric::Cosine => "vector_cosine_ops",
            VectorMetric::Euclidean => "vector_l2_ops",
            VectorMetric::DotProduct => "vector_ip_ops",
        };
        let lists = if lists == 0 { 100 } else { lists };
        let cols: Vec<String> = index.columns.iter().map(|c| self.q(c)).collect();
        format!(
            "CREATE INDEX {} ON {} USING ivfflat ({} {}) WITH (lists = {})",
            self.q(name),
            self.q(table),
            cols.join(", "),
            op_class,
            lists
        )
    }

    fn render_add_foreign_key(
        &self,
        table: &str,
        name: Option<&str>,
        fk: &ForeignKeyDefinition,
    ) -> String {
        let name = name
            .map(str::to_string)
            .unwrap_or_else(|| format!("{}_{}_fkey", table, fk.columns.join("_")));
        let columns: Vec<String> = fk.columns.iter().map(|c| self.q(c)).collect();
        let ref_columns: Vec<String> = fk.references_columns.iter().map(|c| self.q(c)).collect();
        format!(
            "ALTER TABLE {} ADD CONSTRAINT {} FOREIGN KEY ({}) REFERENCES {} ({}) ON DELETE {} ON UPDATE {}",
            self.q(table),
            self.q(&name),
            columns.join(", "),
            self.q(&fk.references_table),
            ref_columns.join(", "),
            on_action_sql(&fk.on_delete),
            on_action_sql(&fk.on_update)
        )
    }
}

/// Collapses an expression list into something safe for an index's default
/// auto-generated name, e.g. `"lower(email)"` -> `"lower_email_"`.
fn sanitize_for_index_name(raw: &str) -> String {
    raw.chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
        .collect()
}

fn on_action_sql(action: &OnDelete) -> &'static str {
    match action {
        OnDelete::Cascade => "CASCADE",
        OnDelete::Restrict => "RESTRICT",
        OnDelete::SetNull => "SET NULL",
        OnDelete::NoAction => "NO ACTION",
    }
}

fn render_default_literal(value: &cascade_core::Value) -> String {
    use cascade_core::Value;
    match value {
        Value::Null => "NULL".to_string(),
        Value::Bool(b) => if *b { "TRUE" } else { "FALSE" }.to_string(),
        Value::Int(i) => i.to_string(),
        Value::Float(f) => f.to_string(),
        Value::Text(s) => format!("'{}'", s.replace('\'', "''")),
        other => format!("'{}'", other.as_display_string().replace('\'', "''")),
    }
}

#[async_trait]
impl MigrationDriver for PostgresMigrationDriver {
    async fn apply(&self, operations: &[SchemaOperation]) -> Result<(), DbError> {
        let client = self.pool.get().await.map_err(|e| {
            DbError::connect_failed(format!("failed to acquire connection from pool: {}", e))
        })?;

        for op in operations {
            let statements: Vec<String> = match op {
                SchemaOperation::ModifyColumn { table, column } => self.render_modify(table, column),
                other => {
                    let sql = self.render(other);
                    if sql.is_empty() {
                        Vec::new()
                    } else {
                        vec![sql]
                    }
                }
            };
            for sql in statements {
                client
                    .execute(sql.as_str(), &[])
                    .await
                    .map_err(|e| format_pg_error(e, &sql, Vec::new()))?;
            }
        }
        Ok(())
    }

    fn supports_transactional_ddl(&self) -> bool {
        true
    }

    async fn ensure_ledger(&self) -> Result<(), DbError> {
        let client = self.pool.get().await.map_err(|e| {
            DbError::connect_failed(format!("failed to acquire connection from pool: {}", e))
        })?;
        let sql = format!(
            "CREATE TABLE IF NOT EXISTS {} (
                id BIGSERIAL PRIMARY KEY,
                name TEXT NOT NULL UNIQUE,
                batch INTEGER NOT NULL,
                executed_at TIMESTAMP WITH TIME ZONE NOT NULL DEFAULT NOW(),
                created_at TIMESTAMP WITH TIME ZONE NULL
            )",
            self.q(&self.ledger_table)
        );
        client
            .execute(sql.as_str(), &[])
            .await
            .map_err(|e| format_pg_error(e, &sql, Vec::new()))?;
        Ok(())
    }

    async fn recorded_migrations(&self) -> Result<Vec<MigrationRecord>, DbError> {
        let client = self.pool.get().await.map_err(|e| {
            DbError::connect_failed(format!("failed to acquire connection from pool: {}", e))
        })?;
        let sql = format!("SELECT name, batch FROM {} ORDER BY batch, name", self.q(&self.ledger_table));
        let rows = client
            .query(sql.as_str(), &[])
            .await
            .map_err(|e| format_pg_error(e, &sql, Vec::new()))?;
        Ok(rows
            .into_iter()
            .map(|row| MigrationRecord {
                name: row.get::<_, String>("name"),
                batch: row.get::<_, i32>("batch") as i64,
            })
            .collect())
    }

    async fn record_migration(&self, name: &str, batch: i64) -> Result<(), DbError> {
        let client = self.pool.get().await.map_err(|e| {
            DbError::connect_failed(format!("failed to acquire connection from pool: {}", e))
        })?;
        let sql = format!(
            "INSERT INTO {} (name, batch) VALUES ($1, $2)",
            self.q(&self.ledger_table)
        );
        client
            .execute(sql.as_str(), &[&name, &(batch as i32)])
            .await
            .map_err(|e| format_pg_error(e, &sql, vec![name.to_string(), batch.to_string()]))?;
        Ok(())
    }

    async fn remove_migration_record(&self, name: &str) -> Result<(), DbError> {
        let client = self.pool.get().await.map_err(|e| {
            DbError::connect_failed(format!("failed to acquire connection from pool: {}", e))
        })?;
        let sql = format!("DELETE FROM {} WHERE name = $1", self.q(&self.ledger_table));
        client
            .execute(sql.as_str(), &[&name])
            .await
            .map_err(|e| format_pg_error(e, &sql, vec![name.to_string()]))?;
        Ok(())
    }
}
