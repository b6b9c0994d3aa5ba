use crate::{QueryBuilder, Value};

/// Whether a boolean clause joins the previous one with `AND` or `OR`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Connector {
    And,
    Or,
}

/// A binary comparison operator usable in a `where`/`having`/join-on clause.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ComparisonOperator {
    Eq,
    Ne,
    Lt,
    Lte,
    Gt,
    Gte,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortDirection {
    Asc,
    Desc,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinKind {
    Inner,
    Left,
    Right,
    Full,
    Cross,
}

/// One accumulated step of a [`QueryBuilder`] chain.
///
/// `QueryParser` implementations walk a `Vec<Operation>` in the order the
/// builder produced them and never need a catch-all arm: every fluent method
/// on `QueryBuilder` pushes exactly one variant here.
///
/// `doesntHave`/`whereDoesntHave` from the fluent API are not separate
/// variants; they're `Has`/`WhereHas` with `negate: true`. `whereNot`/
/// `orWhereNot` compile to `Where` with the operator's negated form applied
/// by the builder before the operation is pushed (see `query_builder.rs`) —
/// the original source left these two as unimplemented stubs, so the
/// negate-at-push-time behavior is this crate's own resolution, recorded in
/// DESIGN.md.
#[derive(Debug, Clone)]
pub enum Operation {
    Where {
        connector: Connector,
        column: String,
        operator: ComparisonOperator,
        value: Value,
    },
    WhereRaw {
        connector: Connector,
        sql: String,
        bindings: Vec<Value>,
    },
    WhereIn {
        connector: Connector,
        column: String,
        values: Vec<Value>,
        negate: bool,
    },
    WhereNull {
        connector: Connector,
        column: String,
        negate: bool,
    },
    WhereBetween {
        connector: Connector,
        column: String,
        low: Value,
        high: Value,
        negate: bool,
    },
    WhereLike {
        connector: Connector,
        column: String,
        pattern: String,
        case_insensitive: bool,
        negate: bool,
    },
    WhereColumn {
        connector: Connector,
        first: String,
        operator: ComparisonOperator,
        second: String,
    },
    WhereJsonContains {
        connector: Connector,
        column: String,
        path: Option<String>,
        value: Value,
    },
    WhereJsonLength {
        connector: Connector,
        column: String,
        path: Option<String>,
        operator: ComparisonOperator,
        value: i64,
    },
    WhereFullText {
        connector: Connector,
        columns: Vec<String>,
        query: String,
    },
    WhereExists {
        connector: Connector,
        subquery: Box<QueryBuilder>,
        negate: bool,
    },

    Select(Vec<String>),
    SelectRaw(String),
    Deselect(Vec<String>),
    /// `row_to_json(alias.*) AS "alias"` (relational) or a `$lookup`-merged
    /// embedded document (document engine), injected for an eagerly-loaded
    /// relation alias.
    SelectRelatedColumns {
        relation: String,
        alias: String,
    },
    /// A relational-only capability gap: document engines have no concept
    /// of a raw driver-level column projection expression. Always a no-op
    /// on the document driver (see DESIGN.md Open Questions).
    SelectDriverProjection(String),

    Join {
        kind: JoinKind,
        table: String,
        first: String,
        operator: ComparisonOperator,
        second: String,
        alias: Option<String>,
    },
    JoinRaw(String),

    OrderBy {
        column: String,
        direction: SortDirection,
    },
    OrderByRaw(String),
    GroupBy(Vec<String>),
    Having {
        column: String,
        operator: ComparisonOperator,
        value: Value,
    },
    HavingRaw(String),

    Limit(u64),
    Offset(u64),
    Distinct(bool),

    /// `has('relation')` — filter to rows with at least one related row.
    Has { relation: String, negate: bool },
    /// `whereHas('relation', |q| ...)` — as `Has`, with an extra constraint.
    WhereHas {
        connector: Connector,
        relation: String,
        constraint: Option<Box<QueryBuilder>>,
        negate: bool,
    },
}
