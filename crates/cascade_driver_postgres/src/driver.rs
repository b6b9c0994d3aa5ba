use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use deadpool_postgres::{ManagerConfig, Pool, PoolConfig, RecyclingMethod, Runtime};
use postgres_types::ToSql;
use tokio_postgres::NoTls;

use cascade_core::{
    Blueprint, Capability, CompiledQuery, Connection, DataSourceOptions, DbError, Driver,
    DriverKind, MigrationDriver, PoolStatus, QueryParser, QueryResult, Transaction,
};

use crate::blueprint::PostgresBlueprint;
use crate::error::format_pg_error;
use crate::migration_driver::PostgresMigrationDriver;
use crate::query_parser::PostgresQueryParser;
use crate::value_codec::pg_row_to_cascade_row;

/// The engine-neutral `Driver` over `tokio_postgres`/`deadpool_postgres`.
pub struct PostgresDriver {
    pool: Pool,
    query_parser: PostgresQueryParser,
    migration_driver: PostgresMigrationDriver,
    blueprint: PostgresBlueprint,
    connected: AtomicBool,
}

impl PostgresDriver {
    /// Builds the pool eagerly (no I/O yet — the manager lazily dials on
    /// first checkout) from a data source's connection options.
    pub fn new(options: &DataSourceOptions) -> Result<Self, DbError> {
        let mut config = deadpool_postgres::Config::new();
        config.url = Some(options.uri.clone());
        config.manager = Some(ManagerConfig {
            recycling_method: RecyclingMethod::Fast,
        });
        config.pool = Some(PoolConfig::new(options.pool_size as usize));

        let pool: Pool = config
            .create_pool(Some(Runtime::Tokio1), NoTls)
            .map_err(|e| DbError::connect_failed(format!("failed to build connection pool: {}", e)))?;

        Ok(Self {
            query_parser: PostgresQueryParser::default(),
            migration_driver: PostgresMigrationDriver::new(pool.clone()),
            blueprint: PostgresBlueprint::new(pool.clone()),
            pool,
            connected: AtomicBool::new(false),
        })
    }
}

#[async_trait]
impl Driver for PostgresDriver {
    fn kind(&self) -> DriverKind {
        DriverKind::Postgres
    }

    fn capabilities(&self) -> Capability {
        Capability::TRANSACTIONS
            | Capability::JSONB
            | Capability::FULL_TEXT
            | Capability::RETURNING
            | Capability::VECTOR_INDEX
    }

    async fn connect(&self) -> Result<(), DbError> {
        let client = self.pool.get().await.map_err(|e| {
            DbError::connect_failed(format!("failed to acquire connection from pool: {}", e))
        })?;
        client
            .query_one("SELECT 1", &[])
            .await
            .map_err(|e| format_pg_error(e, "SELECT 1", Vec::new()))?;
        self.connected.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn disconnect(&self) -> Result<(), DbError> {
        self.pool.close();
        self.connected.store(false, Ordering::SeqCst);
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    async fn connection(&self) -> Result<Box<dyn Connection>, DbError> {
        let client = self.pool.get().await.map_err(|e| {
            DbError::connect_failed(format!("failed to acquire connection from pool: {}", e))
        })?;
        Ok(Box::new(PostgresConnection {
            client,
            pool: self.pool.clone(),
        }))
    }

    async fn pool_status(&self) -> PoolStatus {
        let status = self.pool.status();
        PoolStatus {
            size: status.size,
            available: status.available.max(0) as usize,
            in_use: status.size.saturating_sub(status.available.max(0) as usize),
        }
    }

    fn query_parser(&self) -> &dyn QueryParser {
        &self.query_parser
    }

    fn migration_driver(&self) -> &dyn MigrationDriver {
        &self.migration_driver
    }

    fn blueprint(&self) -> &dyn Blueprint {
        &self.blueprint
    }
}

/// A single pooled client, leased for one `DataSource::connection()` call.
pub struct PostgresConnection {
    client: deadpool_postgres::Object,
    pool: Pool,
}

#[async_trait]
impl Connection for PostgresConnection {
    async fn execute(&self, query: &CompiledQuery) -> Result<QueryResult, DbError> {
        run_compiled(&self.client, query).await
    }

    /// Acquires a second, dedicated client for the transaction's lifetime
    /// rather than reusing `self.client`: `tokio_postgres::Transaction`
    /// borrows its client, which doesn't fit `Box<dyn Transaction>`'s
    /// `'static` object-safety requirement, so the transaction is modeled
    /// as plain `BEGIN`/`COMMIT`/`ROLLBACK` statements on an owned client.
    async fn begin(&self) -> Result<Box<dyn Transaction>, DbError> {
        let client = self.pool.get().await.map_err(|e| {
            DbError::connect_failed(format!("failed to acquire connection from pool: {}", e))
        })?;
        client
            .batch_execute("BEGIN")
            .await
            .map_err(|e| format_pg_error(e, "BEGIN", Vec::new()))?;
        Ok(Box::new(PostgresTransaction { client }))
    }
}

pub struct PostgresTransaction {
    client: deadpool_postgres::Object,
}

#[async_trait]
impl Transaction for PostgresTransaction {
    async fn execute(&self, query: &CompiledQuery) -> Result<QueryResult, DbError> {
        run_compiled(&self.client, query).await
    }

    async fn commit(self: Box<Self>) -> Result<(), DbError> {
        self.client
            .batch_execute("COMMIT")
            .await
            .map_err(|e| format_pg_error(e, "COMMIT", Vec::new()))
    }

    async fn rollback(self: Box<Self>) -> Result<(), DbError> {
        self.client
            .batch_execute("ROLLBACK")
            .await
            .map_err(|e| format_pg_error(e, "ROLLBACK", Vec::new()))
    }
}

async fn run_compiled(
    client: &deadpool_postgres::Object,
    query: &CompiledQuery,
) -> Result<QueryResult, DbError> {
    let (sql, params) = match query {
        CompiledQuery::Sql { sql, params } => (sql, params),
        CompiledQuery::Pipeline { .. } => {
            return Err(DbError::NotSupported(
                "aggregation pipelines are not supported by the Postgres driver".to_string(),
            ));
        }
    };

    let bound: Vec<&(dyn ToSql + Sync)> = params.iter().map(|p| p as &(dyn ToSql + Sync)).collect();

    if wants_rows(sql) {
        let rows = client
            .query(sql.as_str(), &bound[..])
            .await
            .map_err(|e| format_pg_error(e, sql, param_strings(params)))?;
        let affected_rows = rows.len() as u64;
        Ok(QueryResult {
            rows: rows.iter().map(pg_row_to_cascade_row).collect(),
            affected_rows,
        })
    } else {
        let affected_rows = client
            .execute(sql.as_str(), &bound[..])
            .await
            .map_err(|e| format_pg_error(e, sql, param_strings(params)))?;
        Ok(QueryResult {
            rows: Vec::new(),
            affected_rows,
        })
    }
}

fn wants_rows(sql: &str) -> bool {
    let upper = sql.trim_start().to_uppercase();
    upper.starts_with("SELECT") || upper.starts_with("WITH") || upper.contains("RETURNING")
}

fn param_strings(params: &[cascade_core::Value]) -> Vec<String> {
    params.iter().map(|v| v.as_display_string()).collect()
}
