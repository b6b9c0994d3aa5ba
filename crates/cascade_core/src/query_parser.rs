use crate::{DbError, Operation, Value};

/// One neutral update operator a driver's `parse_update` must translate into
/// its engine's native mutation idiom (relational `SET` clauses vs. a
/// document update operator document). See `Driver` §4.8: `$set → col =
/// $k`, `$unset → col = NULL`, `$inc`/`$dec → col = COALESCE(col,0) ± $k`.
/// `$push`/`$pull` are left to the driver: the source declares them
/// "NoSQL only, SQL drivers may ignore" without specifying whether that
/// means a silent no-op, an error, or JSONB emulation — each relational
/// driver records its choice in DESIGN.md rather than guessing a shared one.
#[derive(Debug, Clone)]
pub enum UpdateOp {
    Set(Value),
    Unset,
    Inc(Value),
    Dec(Value),
    Push(Value),
    Pull(Value),
}

/// The result of compiling an accumulated `Operation` list against a
/// concrete engine.
#[derive(Debug, Clone)]
pub enum CompiledQuery {
    /// Native SQL plus its positional `$n` bind parameters, produced by the
    /// relational driver.
    Sql { sql: String, params: Vec<Value> },
    /// An aggregation pipeline, produced by the document driver. Stages are
    /// kept as `serde_json::Value` here so this crate never depends on
    /// `bson`; the Mongo driver converts each stage to a `bson::Document`
    /// immediately before dispatch.
    Pipeline {
        collection: String,
        stages: Vec<serde_json::Value>,
    },
}

/// Compiles an ordered `Operation` list into something a `Driver` can run.
///
/// Each engine implements exactly one of these. The parser never mutates or
/// reorders the operation list — it is a one-way, order-preserving walk, so
/// the same `QueryBuilder` output compiles deterministically regardless of
/// how many times it's parsed.
pub trait QueryParser: Send + Sync {
    fn parse(&self, table: &str, operations: &[Operation]) -> Result<CompiledQuery, DbError>;

    /// Compile an `UPDATE`/equivalent against the rows `operations`
    /// filters to. The default rejects the call so a driver that hasn't
    /// implemented mutation compilation yet fails loudly instead of
    /// silently no-op'ing.
    fn parse_update(
        &self,
        _table: &str,
        _operations: &[Operation],
        _changes: &[(String, UpdateOp)],
    ) -> Result<CompiledQuery, DbError> {
        Err(DbError::NotSupported("update compilation".to_string()))
    }

    fn parse_delete(&self, _table: &str, _operations: &[Operation]) -> Result<CompiledQuery, DbError> {
        Err(DbError::NotSupported("delete compilation".to_string()))
    }

    fn parse_insert(
        &self,
        _table: &str,
        _rows: &[Vec<(String, Value)>],
    ) -> Result<CompiledQuery, DbError> {
        Err(DbError::NotSupported("insert compilation".to_string()))
    }
}

/// Shared, 1-based bind-parameter counter threaded through a single parse
/// pass so every `$n` placeholder a relational parser emits is unique and
/// in encounter order — the source of the "placeholder ordering" testable
/// property.
#[derive(Debug, Default)]
pub struct ParamCounter(usize);

impl ParamCounter {
    pub fn new() -> Self {
        Self(0)
    }

    /// Returns the next 1-based index and advances the counter.
    pub fn next(&mut self) -> usize {
        self.0 += 1;
        self.0
    }

    pub fn count(&self) -> usize {
        self.0
    }
}
