use async_trait::async_trait;
use deadpool_postgres::Pool;

use cascade_core::{Blueprint, ColumnInfo, DbError, ForeignKeyInfo, IndexInfo, TableInfo};

use crate::dialect::{map_postgres_type_to_column_type, PgTypeFacts};
use crate::error::format_pg_error;

/// Read-only schema introspection over `information_schema`/`pg_catalog`.
/// A missing table yields an empty `TableInfo`, never an error (§4.6).
pub struct PostgresBlueprint {
    pool: Pool,
}

impl PostgresBlueprint {
    pub fn new(pool: Pool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl Blueprint for PostgresBlueprint {
    async fn has_table(&self, name: &str) -> Result<bool, DbError> {
        let client = self.pool.get().await.map_err(|e| {
            DbError::connect_failed(format!("failed to acquire connection from pool: {}", e))
        })?;
        let sql = "SELECT 1 FROM information_schema.tables WHERE table_schema = 'public' AND table_name = $1";
        let rows = client
            .query(sql, &[&name])
            .await
            .map_err(|e| format_pg_error(e, sql, vec![name.to_string()]))?;
        Ok(!rows.is_empty())
    }

    async fn table(&self, name: &str) -> Result<TableInfo, DbError> {
        let client = self.pool.get().await.map_err(|e| {
            DbError::connect_failed(format!("failed to acquire connection from pool: {}", e))
        })?;

        if !self.has_table(name).await? {
            return Ok(TableInfo::default());
        }

        let columns_sql = "
            SELECT c.column_name, c.data_type, c.udt_name, c.is_nullable, c.column_default,
                   c.character_maximum_length, c.numeric_precision, c.numeric_scale,
                   EXISTS (
                       SELECT 1 FROM information_schema.table_constraints tc
                       JOIN information_schema.key_column_usage kcu
                         ON tc.constraint_name = kcu.constraint_name
                        AND tc.table_schema = kcu.table_schema
                       WHERE tc.constraint_type = 'PRIMARY KEY'
                         AND tc.table_name = c.table_name
                         AND kcu.column_name = c.column_name
                   ) AS is_primary_key
            FROM information_schema.columns c
            WHERE c.table_schema = 'public' AND c.table_name = $1
            ORDER BY c.ordinal_position";
        let column_rows = client
            .query(columns_sql, &[&name])
            .await
            .map_err(|e| format_pg_error(e, columns_sql, vec![name.to_string()]))?;

        let columns = column_rows
            .into_iter()
            .map(|row| {
                let data_type: String = row.get("data_type");
                let udt_name: String = row.get("udt_name");
                let facts = PgTypeFacts {
                    data_type: &data_type,
                    udt_name: &udt_name,
                    char_length: row.get("character_maximum_length"),
                    numeric_precision: row.get("numeric_precision"),
                    numeric_scale: row.get("numeric_scale"),
                };
                ColumnInfo {
                    name: row.get("column_name"),
                    abstract_type: map_postgres_type_to_column_type(facts),
                    type_name: data_type,
                    nullable: row.get::<_, String>("is_nullable") == "YES",
                    is_primary_key: row.get("is_primary_key"),
                    default_value: row.get("column_default"),
                }
            })
            .collect();

        let indexes_sql = "
            SELECT i.relname AS index_name, ix.indisunique, ix.indisprimary,
                   array_agg(a.attname ORDER BY array_position(ix.indkey, a.attnum)) AS columns
            FROM pg_index ix
            JOIN pg_class t ON t.oid = ix.indrelid
            JOIN pg_class i ON i.oid = ix.indexrelid
            JOIN pg_attribute a ON a.attrelid = t.oid AND a.attnum = ANY(ix.indkey)
            WHERE t.relname = $1
            GROUP BY i.relname, ix.indisunique, ix.indisprimary";
        let index_rows = client
            .query(indexes_sql, &[&name])
            .await
            .map_err(|e| format_pg_error(e, indexes_sql, vec![name.to_string()]))?;

        let indexes = index_rows
            .into_iter()
            .map(|row| IndexInfo {
                name: row.get("index_name"),
                columns: row.get("columns"),
                is_unique: row.get("indisunique"),
                is_primary: row.get("indisprimary"),
            })
            .collect();

        let fk_sql = "
            SELECT tc.constraint_name,
                   array_agg(DISTINCT kcu.column_name) AS columns,
                   ccu.table_name AS references_table,
                   array_agg(DISTINCT ccu.column_name) AS references_columns
            FROM information_schema.table_constraints tc
            JOIN information_schema.key_column_usage kcu
              ON tc.constraint_name = kcu.constraint_name AND tc.table_schema = kcu.table_schema
            JOIN information_schema.constraint_column_usage ccu
              ON tc.constraint_name = ccu.constraint_name AND tc.table_schema = ccu.table_schema
            WHERE tc.constraint_type = 'FOREIGN KEY' AND tc.table_schema = 'public' AND tc.table_name = $1
            GROUP BY tc.constraint_name, ccu.table_name";
        let fk_rows = client
            .query(fk_sql, &[&name])
            .await
            .map_err(|e| format_pg_error(e, fk_sql, vec![name.to_string()]))?;

        let foreign_keys = fk_rows
            .into_iter()
            .map(|row| ForeignKeyInfo {
                name: row.get("constraint_name"),
                columns: row.get("columns"),
                references_table: row.get("references_table"),
                references_columns: row.get("references_columns"),
            })
            .collect();

        Ok(TableInfo {
            name: name.to_string(),
            columns,
            indexes,
            foreign_keys,
        })
    }

    async fn tables(&self) -> Result<Vec<String>, DbError> {
        let client = self.pool.get().await.map_err(|e| {
            DbError::connect_failed(format!("failed to acquire connection from pool: {}", e))
        })?;
        let sql = "SELECT table_name FROM information_schema.tables WHERE table_schema = 'public' ORDER BY table_name";
        let rows = client
            .query(sql, &[])
            .await
            .map_err(|e| format_pg_error(e, sql, Vec::new()))?;
        Ok(rows.into_iter().map(|row| row.get("table_name")).collect())
    }

    async fn has_column(&self, table: &str, column: &str) -> Result<bool, DbError> {
        let client = self.pool.get().await.map_err(|e| {
            DbError::connect_failed(format!("failed to acquire connection from pool: {}", e))
        })?;
        let sql = "SELECT 1 FROM information_schema.columns WHERE table_schema = 'public' AND table_name = $1 AND column_name = $2";
        let rows = client
            .query(sql, &[&table, &column])
            .await
            .map_err(|e| format_pg_error(e, sql, vec![table.to_string(), column.to_string()]))?;
        Ok(!rows.is_empty())
    }
}
