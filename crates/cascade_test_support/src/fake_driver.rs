use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use cascade_core::{
    Blueprint, Capability, CompiledQuery, Connection, DbError, Driver, DriverKind,
    MigrationDriver, MigrationRecord, Operation, PoolStatus, QueryParser, QueryResult,
    SchemaOperation, TableInfo, Transaction, UpdateOp, Value,
};

/// One canned response a [`FakeDriver`] hands back to the next `execute`
/// call, in FIFO order. Lets a test script a sequence of round trips — e.g.
/// an insert returning one row, then a later select returning three.
#[derive(Debug, Clone)]
pub enum FakeQueryOutcome {
    Rows(Vec<Vec<(String, Value)>>),
    Affected(u64),
    Error(String),
}

impl FakeQueryOutcome {
    fn into_result(self) -> Result<QueryResult, DbError> {
        match self {
            FakeQueryOutcome::Rows(rows) => Ok(QueryResult {
                affected_rows: rows.len() as u64,
                rows,
            }),
            FakeQueryOutcome::Affected(n) => Ok(QueryResult {
                rows: Vec::new(),
                affected_rows: n,
            }),
            FakeQueryOutcome::Error(message) => {
                Err(DbError::query_failed(message, String::new(), Vec::new()))
            }
        }
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct FakeDriverStats {
    pub connect_calls: u64,
    pub disconnect_calls: u64,
    pub execute_calls: u64,
    pub transactions_begun: u64,
    pub transactions_committed: u64,
    pub transactions_rolled_back: u64,
}

#[derive(Default)]
struct Shared {
    outcomes: Mutex<VecDeque<FakeQueryOutcome>>,
    recorded: Mutex<Vec<CompiledQuery>>,
    connect_calls: AtomicU64,
    disconnect_calls: AtomicU64,
    execute_calls: AtomicU64,
    transactions_begun: AtomicU64,
    transactions_committed: AtomicU64,
    transactions_rolled_back: AtomicU64,
    connected: AtomicBool,
}

/// A deterministic, in-memory stand-in for a real `Driver`, for testing
/// code above the driver layer (`QueryBuilder`, `MigrationRunner`,
/// `DataSourceRegistry`) without a live database.
pub struct FakeDriver {
    shared: Arc<Shared>,
    kind: DriverKind,
    capabilities: Capability,
    query_parser: FakeQueryParser,
    migration_driver: FakeMigrationDriver,
    blueprint: FakeBlueprint,
}

impl FakeDriver {
    pub fn new(kind: DriverKind, capabilities: Capability) -> Self {
        Self {
            shared: Arc::new(Shared::default()),
            kind,
            capabilities,
            query_parser: FakeQueryParser,
            migration_driver: FakeMigrationDriver::default(),
            blueprint: FakeBlueprint::default(),
        }
    }

    /// Queues one response for the next `execute` call on any connection
    /// this driver hands out.
    pub fn push_outcome(&self, outcome: FakeQueryOutcome) {
        self.shared.outcomes.lock().unwrap().push_back(outcome);
    }

    /// Every compiled query that has been executed so far, in call order.
    pub fn recorded_queries(&self) -> Vec<CompiledQuery> {
        self.shared.recorded.lock().unwrap().clone()
    }

    pub fn stats(&self) -> FakeDriverStats {
        FakeDriverStats {
            connect_calls: self.shared.connect_calls.load(Ordering::SeqCst),
            disconnect_calls: self.shared.disconnect_calls.load(Ordering::SeqCst),
            execute_calls: self.shared.execute_calls.load(Ordering::SeqCst),
            transactions_begun: self.shared.transactions_begun.load(Ordering::SeqCst),
            transactions_committed: self.shared.transactions_committed.load(Ordering::SeqCst),
            transactions_rolled_back: self.shared.transactions_rolled_back.load(Ordering::SeqCst),
        }
    }

    /// Seeds the fake `Blueprint` so `has_table`/`table`/`tables` calls
    /// against this driver see the given table as already existing.
    pub fn with_table(self, table: TableInfo) -> Self {
        self.blueprint.tables.lock().unwrap().push(table);
        self
    }
}

#[async_trait]
impl Driver for FakeDriver {
    fn kind(&self) -> DriverKind {
        self.kind
    }

    fn capabilities(&self) -> Capability {
        self.capabilities
    }

    async fn connect(&self) -> Result<(), DbError> {
        self.shared.connect_calls.fetch_add(1, Ordering::SeqCst);
        self.shared.connected.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn disconnect(&self) -> Result<(), DbError> {
        self.shared.disconnect_calls.fetch_add(1, Ordering::SeqCst);
        self.shared.connected.store(false, Ordering::SeqCst);
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.shared.connected.load(Ordering::SeqCst)
    }

    async fn connection(&self) -> Result<Box<dyn Connection>, DbError> {
        Ok(Box::new(FakeConnection {
            shared: self.shared.clone(),
        }))
    }

    async fn pool_status(&self) -> PoolStatus {
        PoolStatus {
            size: 1,
            available: 1,
            in_use: 0,
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

struct FakeConnection {
    shared: Arc<Shared>,
}

#[async_trait]
impl Connection for FakeConnection {
    async fn execute(&self, query: &CompiledQuery) -> Result<QueryResult, DbError> {
        run_against_shared(&self.shared, query)
    }

    async fn begin(&self) -> Result<Box<dyn Transaction>, DbError> {
        self.shared.transactions_begun.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(FakeTransaction {
            shared: self.shared.clone(),
        }))
    }
}

struct FakeTransaction {
    shared: Arc<Shared>,
}

#[async_trait]
impl Transaction for FakeTransaction {
    async fn execute(&self, query: &CompiledQuery) -> Result<QueryResult, DbError> {
        run_against_shared(&self.shared, query)
    }

    async fn commit(self: Box<Self>) -> Result<(), DbError> {
        self.shared.transactions_committed.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> Result<(), DbError> {
        self.shared.transactions_rolled_back.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

fn run_against_shared(shared: &Arc<Shared>, query: &CompiledQuery) -> Result<QueryResult, DbError> {
    shared.execute_calls.fetch_add(1, Ordering::SeqCst);
    shared.recorded.lock().unwrap().push(query.clone());
    match shared.outcomes.lock().unwrap().pop_front() {
        Some(outcome) => outcome.into_result(),
        None => Ok(QueryResult::empty()),
    }
}

/// Renders the operation/change list into a human-readable placeholder
/// rather than real SQL or a pipeline — enough for tests to assert "a where
/// on `age` was applied" without depending on a concrete engine's syntax.
struct FakeQueryParser;

impl QueryParser for FakeQueryParser {
    fn parse(&self, table: &str, operations: &[Operation]) -> Result<CompiledQuery, DbError> {
        Ok(CompiledQuery::Sql {
            sql: format!("FAKE SELECT FROM {} ({} ops)", table, operations.len()),
            params: Vec::new(),
        })
    }

    fn parse_update(
        &self,
        table: &str,
        _operations: &[Operation],
        changes: &[(String, UpdateOp)],
    ) -> Result<CompiledQuery, DbError> {
        Ok(CompiledQuery::Sql {
            sql: format!("FAKE UPDATE {} ({} changes)", table, changes.len()),
            params: Vec::new(),
        })
    }

    fn parse_delete(&self, table: &str, _operations: &[Operation]) -> Result<CompiledQuery, DbError> {
        Ok(CompiledQuery::Sql {
            sql: format!("FAKE DELETE FROM {}", table),
            params: Vec::new(),
        })
    }

    fn parse_insert(
        &self,
        table: &str,
        rows: &[Vec<(String, Value)>],
    ) -> Result<CompiledQuery, DbError> {
        Ok(CompiledQuery::Sql {
            sql: format!("FAKE INSERT INTO {} ({} rows)", table, rows.len()),
            params: Vec::new(),
        })
    }
}

#[derive(Default)]
struct FakeMigrationDriver {
    applied: Mutex<Vec<SchemaOperation>>,
    records: Mutex<Vec<MigrationRecord>>,
}

#[async_trait]
impl MigrationDriver for FakeMigrationDriver {
    async fn apply(&self, operations: &[SchemaOperation]) -> Result<(), DbError> {
        self.applied.lock().unwrap().extend(operations.iter().cloned());
        Ok(())
    }

    fn supports_transactional_ddl(&self) -> bool {
        true
    }

    async fn ensure_ledger(&self) -> Result<(), DbError> {
        Ok(())
    }

    async fn recorded_migrations(&self) -> Result<Vec<MigrationRecord>, DbError> {
        Ok(self.records.lock().unwrap().clone())
    }

    async fn record_migration(&self, name: &str, batch: i64) -> Result<(), DbError> {
        self.records.lock().unwrap().push(MigrationRecord {
            name: name.to_string(),
            batch,
        });
        Ok(())
    }

    async fn remove_migration_record(&self, name: &str) -> Result<(), DbError> {
        self.records.lock().unwrap().retain(|r| r.name != name);
        Ok(())
    }
}

#[derive(Default)]
struct FakeBlueprint {
    tables: Mutex<Vec<TableInfo>>,
}

#[async_trait]
impl Blueprint for FakeBlueprint {
    async fn has_table(&self, name: &str) -> Result<bool, DbError> {
        Ok(self.tables.lock().unwrap().iter().any(|t| t.name == name))
    }

    async fn table(&self, name: &str) -> Result<TableInfo, DbError> {
        Ok(self
            .tables
            .lock()
            .unwrap()
            .iter()
            .find(|t| t.name == name)
            .cloned()
            .unwrap_or_default())
    }

    async fn tables(&self) -> Result<Vec<String>, DbError> {
        Ok(self.tables.lock().unwrap().iter().map(|t| t.name.clone()).collect())
    }

    async fn has_column(&self, table: &str, column: &str) -> Result<bool, DbError> {
        Ok(self
            .tables
            .lock()
            .unwrap()
            .iter()
            .find(|t| t.name == table)
            .map(|t| t.columns.iter().any(|c| c.name == column))
            .unwrap_or(false))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn queued_outcomes_are_returned_fifo() {
        let driver = FakeDriver::new(DriverKind::Postgres, Capability::TRANSACTIONS);
        driver.push_outcome(FakeQueryOutcome::Affected(1));
        driver.push_outcome(FakeQueryOutcome::Rows(vec![vec![(
            "id".to_string(),
            Value::Int(1),
        )]]));

        let conn = driver.connection().await.unwrap();
        let query = CompiledQuery::Sql {
            sql: "irrelevant".to_string(),
            params: Vec::new(),
        };

        let first = conn.execute(&query).await.unwrap();
        assert_eq!(first.affected_rows, 1);
        assert!(first.rows.is_empty());

        let second = conn.execute(&query).await.unwrap();
        assert_eq!(second.rows.len(), 1);

        assert_eq!(driver.stats().execute_calls, 2);
        assert_eq!(driver.recorded_queries().len(), 2);
    }

    #[tokio::test]
    async fn transaction_commit_updates_stats() {
        let driver = FakeDriver::new(DriverKind::Postgres, Capability::TRANSACTIONS);
        let conn = driver.connection().await.unwrap();
        let txn = conn.begin().await.unwrap();
        txn.commit().await.unwrap();

        let stats = driver.stats();
        assert_eq!(stats.transactions_begun, 1);
        assert_eq!(stats.transactions_committed, 1);
    }
}
