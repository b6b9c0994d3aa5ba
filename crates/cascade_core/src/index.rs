/// Vector-index similarity metric, mapped by the Postgres driver to a
/// pgvector operator class (`cosine_ops`/`l2_ops`/`ip_ops`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VectorMetric {
    Cosine,
    Euclidean,
    DotProduct,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IndexKind {
    Plain,
    Unique,
    FullText,
    Geo,
    Vector { metric: VectorMetric, lists: u32 },
    /// A document-engine TTL index; a no-op capability gap on the relational
    /// driver, which renders it as a comment rather than erroring (schema
    /// validation is a no-op where the underlying engine doesn't support it).
    Ttl { after_seconds: i64 },
}

/// An index-definition DSL call inside a `Blueprint` table/collection block.
#[derive(Debug, Clone)]
pub struct IndexDefinition {
    pub name: Option<String>,
    /// Plain column names to index. Mutually exclusive with `expressions` —
    /// an expression-based index sets that instead and leaves this empty.
    pub columns: Vec<String>,
    /// Expressions to index (`lower(email)`, `(meta->>'slug')`), rendered
    /// as the index's key list instead of `columns` when non-empty.
    pub expressions: Vec<String>,
    pub kind: IndexKind,
    /// A partial-index predicate, e.g. `"deleted_at IS NULL"`.
    pub condition: Option<String>,
    /// Extra columns carried for an `INCLUDE (...)` covering index.
    pub include: Vec<String>,
    pub concurrently: bool,
}

impl IndexDefinition {
    pub fn new(columns: Vec<String>) -> Self {
        Self {
            name: None,
            columns,
            expressions: Vec::new(),
            kind: IndexKind::Plain,
            condition: None,
            include: Vec::new(),
            concurrently: false,
        }
    }

    /// An expression-based index, e.g. `IndexDefinition::on_expressions(vec!["lower(email)".into()])`.
    pub fn on_expressions(expressions: Vec<String>) -> Self {
        Self {
            name: None,
            columns: Vec::new(),
            expressions,
            kind: IndexKind::Plain,
            condition: None,
            include: Vec::new(),
            concurrently: false,
        }
    }

    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn unique(mut self) -> Self {
        self.kind = IndexKind::Unique;
        self
    }

    pub fn where_clause(mut self, condition: impl Into<String>) -> Self {
        self.condition = Some(condition.into());
        self
    }

    pub fn including(mut self, columns: Vec<String>) -> Self {
        self.include = columns;
        self
    }

    pub fn concurrently(mut self) -> Self {
        self.concurrently = true;
        self
    }
}
