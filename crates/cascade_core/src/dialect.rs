use crate::ColumnType;

/// Engine-specific SQL/shell syntax, implemented once per relational driver.
///
/// `QueryParser` and `MigrationDriver` both compile against this trait
/// rather than assuming Postgres syntax directly, so a second relational
/// backend only needs a new `Dialect` + parser pair, not a rewrite of the
/// operation-walking logic.
pub trait Dialect: Send + Sync {
    /// Render the `i`-th (1-based) bind parameter placeholder.
    fn placeholder(&self, index: usize) -> String;

    /// Quote an identifier (table or column name) for safe interpolation.
    fn quote_identifier(&self, name: &str) -> String;

    /// Render a SQL boolean literal.
    fn boolean_literal(&self, value: bool) -> &'static str;

    /// Render a `LIMIT`/`OFFSET` clause fragment, or `None` if both are unset.
    fn limit_offset(&self, limit: Option<u64>, offset: Option<u64>) -> Option<String>;

    /// Build a `LIKE`/`ILIKE` pattern, escaping the dialect's wildcard
    /// characters (`%`, `_`) that appear literally in `needle`.
    fn like_pattern(&self, needle: &str, case_insensitive: bool) -> LikeClause;

    /// Render a JSON path extraction expression (`column->path` /
    /// `column->>path`).
    fn json_extract(&self, column: &str, path: &str, as_text: bool) -> String;

    /// Render a JSON containment test (`column @> value_placeholder`).
    fn json_contains(&self, column: &str, value_placeholder: &str) -> String;

    /// Render an array-membership test (`value = ANY(column)`).
    fn array_contains(&self, column: &str, value_placeholder: &str) -> String;

    /// Map an abstract column type to this engine's concrete type name.
    fn sql_type(&self, ty: &ColumnType) -> String;
}

/// A rendered `LIKE`-family clause: the operator keyword plus the escaped
/// pattern, kept separate so the caller can still bind the pattern as a
/// parameter instead of interpolating it.
pub struct LikeClause {
    pub operator: &'static str,
    pub pattern: String,
}
