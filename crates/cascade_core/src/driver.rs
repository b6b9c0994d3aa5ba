use async_trait::async_trait;
use bitflags::bitflags;

use crate::{
    Blueprint, CompiledQuery, DbError, MigrationDriver, Operation, QueryParser, Value,
};

bitflags! {
    /// What a driver's underlying engine can do, so `QueryBuilder` and
    /// `MigrationDriver` callers can branch on capability instead of
    /// matching a closed "which engine is this" enum everywhere.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct Capability: u16 {
        const TRANSACTIONS         = 0b0000_0001;
        const AGGREGATION_PIPELINE = 0b0000_0010;
        const JSONB                = 0b0000_0100;
        const FULL_TEXT            = 0b0000_1000;
        const RETURNING            = 0b0001_0000;
        const VECTOR_INDEX         = 0b0010_0000;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DriverKind {
    Postgres,
    MongoDb,
}

/// A single returned row (relational) or document (document engine),
/// flattened to an ordered column-name/value list.
pub type Row = Vec<(String, Value)>;

#[derive(Debug, Clone, Default)]
pub struct QueryResult {
    pub rows: Vec<Row>,
    pub affected_rows: u64,
}

impl QueryResult {
    pub fn empty() -> Self {
        Self::default()
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct PoolStatus {
    pub size: usize,
    pub available: usize,
    pub in_use: usize,
}

/// A live connection (or pooled-connection lease) capable of running a
/// compiled query and participating in a transaction.
#[async_trait]
pub trait Connection: Send + Sync {
    async fn execute(&self, query: &CompiledQuery) -> Result<QueryResult, DbError>;

    /// Begin a transaction, returning a handle scoped to the current task
    /// via `crate::transaction::in_transaction`.
    async fn begin(&self) -> Result<Box<dyn Transaction>, DbError>;
}

/// An open transaction. `commit`/`rollback` consume `self` so a caller
/// cannot accidentally act on it twice.
#[async_trait]
pub trait Transaction: Send + Sync {
    async fn execute(&self, query: &CompiledQuery) -> Result<QueryResult, DbError>;
    async fn commit(self: Box<Self>) -> Result<(), DbError>;
    async fn rollback(self: Box<Self>) -> Result<(), DbError>;
}

/// The engine-neutral contract every Cascade driver implements. A
/// `DataSource` wraps exactly one `Driver`.
#[async_trait]
pub trait Driver: Send + Sync {
    fn kind(&self) -> DriverKind;
    fn capabilities(&self) -> Capability;

    async fn connect(&self) -> Result<(), DbError>;
    async fn disconnect(&self) -> Result<(), DbError>;
    fn is_connected(&self) -> bool;

    /// Acquire a connection from the pool (or the ambient transaction
    /// connection, if the calling task is inside one).
    async fn connection(&self) -> Result<Box<dyn Connection>, DbError>;

    async fn pool_status(&self) -> PoolStatus;

    fn query_parser(&self) -> &dyn QueryParser;
    fn migration_driver(&self) -> &dyn MigrationDriver;
    fn blueprint(&self) -> &dyn Blueprint;

    /// Compile and run one operation list directly, the path every
    /// `QueryBuilder` execution method ultimately takes.
    async fn run(&self, table: &str, operations: &[Operation]) -> Result<QueryResult, DbError> {
        let compiled = self.query_parser().parse(table, operations)?;
        let conn = self.connection().await?;
        conn.execute(&compiled).await
    }
}
