use std::collections::{HashMap, HashSet};

use crate::driver::Row;
use crate::operation::{ComparisonOperator, Connector, JoinKind, SortDirection};
use crate::query_parser::UpdateOp;
use crate::relation::RelationDefinition;
use crate::scope::{NamedScope, Scope, ScopePlacement};
use crate::{CompiledQuery, DataSource, DbError, Operation, Value};

/// Accumulates an ordered list of engine-neutral [`Operation`]s and, on
/// execution, hands them to the target `DataSource`'s `QueryParser`.
///
/// `QueryBuilder` is a mutable builder — each fluent method mutates `self`
/// in place and returns `&mut Self` — plus an explicit `Clone`, rather than
/// an immutable builder that clones on every call. `count()`/`paginate()`
/// both need to run the accumulated filters once for a `COUNT` and again
/// for the page of rows, and a mutable builder lets them clone the
/// operation list once at the branch point instead of paying a clone on
/// every single intermediate mutator call.
#[derive(Debug, Clone, Default)]
pub struct QueryBuilder {
    table: String,
    operations: Vec<Operation>,
    /// Pending `Model::global_scopes()`, not yet spliced into `operations`.
    /// Set once by `Model::query()`; consumed (and not re-applied) the
    /// first time this builder executes — see `apply_scopes`.
    global_scopes: Vec<NamedScope>,
    disabled_scopes: HashSet<String>,
    scopes_applied: bool,
}

impl QueryBuilder {
    pub fn new(table: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            operations: Vec::new(),
            global_scopes: Vec::new(),
            disabled_scopes: HashSet::new(),
            scopes_applied: false,
        }
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    pub fn operations(&self) -> &[Operation] {
        &self.operations
    }

    fn push(&mut self, op: Operation) -> &mut Self {
        self.operations.push(op);
        self
    }

    // --- scopes -----------------------------------------------

    /// Installs this model's global scopes as pending; called once by
    /// `Model::query()`. Not idempotent by design — a second call replaces
    /// the pending set rather than appending to it.
    pub fn with_global_scopes(&mut self, scopes: Vec<NamedScope>) -> &mut Self {
        self.global_scopes = scopes;
        self
    }

    /// Disables one named global scope for this call only. Has no effect
    /// once scopes have already been applied (i.e. after this builder has
    /// executed once) — call it before the execution method, not after.
    pub fn without_global_scope(&mut self, name: impl Into<String>) -> &mut Self {
        self.disabled_scopes.insert(name.into());
        self
    }

    pub fn without_global_scopes(&mut self) -> &mut Self {
        for scope in &self.global_scopes {
            self.disabled_scopes.insert(scope.name.clone());
        }
        self
    }

    /// Applies a local (opt-in) scope directly, immediately, at the current
    /// position in the operation list — local scopes have no `before`/
    /// `after` splicing, they're just another chained call.
    pub fn apply_local_scope(&mut self, scope: &NamedScope) -> &mut Self {
        scope.scope.apply(self);
        self
    }

    /// Splices enabled global scopes' operations around the operations
    /// accumulated so far: `Before`-timed scopes go in front, `After`-timed
    /// scopes go at the back. Idempotent — a builder that has already
    /// applied its scopes (tracked by `scopes_applied`) is untouched by a
    /// second call, so cloning a builder mid-pipeline (e.g. `count()`
    /// cloning before `paginate()`'s row fetch) never double-applies them.
    fn apply_scopes(&mut self) {
        if self.scopes_applied {
            return;
        }
        self.scopes_applied = true;
        if self.global_scopes.is_empty() {
            return;
        }
        let user_ops = std::mem::take(&mut self.operations);
        let mut before = Vec::new();
        let mut after = Vec::new();
        for scope in self.global_scopes.clone() {
            if self.disabled_scopes.contains(&scope.name) {
                continue;
            }
            let mut fragment = QueryBuilder::new(self.table.clone());
            scope.scope.apply(&mut fragment);
            match scope.scope.placement() {
                ScopePlacement::Before => before.extend(fragment.operations),
                ScopePlacement::After => after.extend(fragment.operations),
            }
        }
        before.extend(user_ops);
        before.extend(after);
        self.operations = before;
    }

    /// A clone with pending global scopes spliced in, used by every
    /// execution method so scopes apply exactly once regardless of which
    /// method (or which clone branch, e.g. `paginate`'s count + fetch) runs
    /// first.
    fn scoped(&self) -> Self {
        let mut scoped = self.clone();
        scoped.apply_scopes();
        scoped
    }

    // --- relations -----------------------------------------------

    /// Eager-loads a declared relation in the same query: a `LEFT JOIN` on
    /// an alias named `_rel_<relation-name>` plus a `row_to_json` projection
    /// of that alias, later unpacked by `get_with_relations`/
    /// `first_with_relations` into a per-row side map.
    pub fn join_with(&mut self, relation: &RelationDefinition) -> &mut Self {
        let alias = format!("_rel_{}", relation.name);
        self.push(Operation::Join {
            kind: JoinKind::Left,
            table: relation.related_table.clone(),
            first: format!("{}.{}", self.table, relation.local_key),
            operator: ComparisonOperator::Eq,
            second: format!("{}.{}", alias, relation.foreign_key),
            alias: Some(alias.clone()),
        });
        self.push(Operation::SelectRelatedColumns {
            relation: relation.name.clone(),
            alias,
        })
    }

    // --- where family -----------------------------------------------

    pub fn where_(&mut self, column: impl Into<String>, operator: ComparisonOperator, value: Value) -> &mut Self {
        self.push(Operation::Where {
            connector: Connector::And,
            column: column.into(),
            operator,
            value,
        })
    }

    pub fn or_where(&mut self, column: impl Into<String>, operator: ComparisonOperator, value: Value) -> &mut Self {
        self.push(Operation::Where {
            connector: Connector::Or,
            column: column.into(),
            operator,
            value,
        })
    }

    /// `whereNot` — a negated equality test, implemented by flipping `Eq`
    /// to `Ne` (and a non-equality operator to its complement) at push
    /// time. The original source left `whereNot`/`orWhereNot` as
    /// unimplemented stubs with no defined semantics; this is this crate's
    /// resolution, recorded in DESIGN.md.
    pub fn where_not(&mut self, column: impl Into<String>, operator: ComparisonOperator, value: Value) -> &mut Self {
        self.push(Operation::Where {
            connector: Connector::And,
            column: column.into(),
            operator: negate(operator),
            value,
        })
    }

    pub fn or_where_not(&mut self, column: impl Into<String>, operator: ComparisonOperator, value: Value) -> &mut Self {
        self.push(Operation::Where {
            connector: Connector::Or,
            column: column.into(),
            operator: negate(operator),
            value,
        })
    }

    pub fn where_raw(&mut self, sql: impl Into<String>, bindings: Vec<Value>) -> &mut Self {
        self.push(Operation::WhereRaw {
            connector: Connector::And,
            sql: sql.into(),
            bindings,
        })
    }

    pub fn where_in(&mut self, column: impl Into<String>, values: Vec<Value>) -> &mut Self {
        self.push(Operation::WhereIn {
            connector: Connector::And,
            column: column.into(),
            values,
            negate: false,
        })
    }

    pub fn where_not_in(&mut self, column: impl Into<String>, values: Vec<Value>) -> &mut Self {
        self.push(Operation::WhereIn {
            connector: Connector::And,
            column: column.into(),
            values,
            negate: true,
        })
    }

    pub fn where_null(&mut self, column: impl Into<String>) -> &mut Self {
        self.push(Operation::WhereNull {
            connector: Connector::And,
            column: column.into(),
            negate: false,
        })
    }

    pub fn where_not_null(&mut self, column: impl Into<String>) -> &mut Self {
        self.push(Operation::WhereNull {
            connector: Connector::And,
            column: column.into(),
            negate: true,
        })
    }

    pub fn where_between(&mut self, column: impl Into<String>, low: Value, high: Value) -> &mut Self {
        self.push(Operation::WhereBetween {
            connector: Connector::And,
            column: column.into(),
            low,
            high,
            negate: false,
        })
    }

    pub fn where_like(&mut self, column: impl Into<String>, pattern: impl Into<String>, case_insensitive: bool) -> &mut Self {
        self.push(Operation::WhereLike {
            connector: Connector::And,
            column: column.into(),
            pattern: pattern.into(),
            case_insensitive,
            negate: false,
        })
    }

    pub fn where_column(&mut self, first: impl Into<String>, operator: ComparisonOperator, second: impl Into<String>) -> &mut Self {
        self.push(Operation::WhereColumn {
            connector: Connector::And,
            first: first.into(),
            operator,
            second: second.into(),
        })
    }

    pub fn where_json_contains(&mut self, column: impl Into<String>, path: Option<String>, value: Value) -> &mut Self {
        self.push(Operation::WhereJsonContains {
            connector: Connector::And,
            column: column.into(),
            path,
            value,
        })
    }

    pub fn where_json_length(&mut self, column: impl Into<String>, path: Option<String>, operator: ComparisonOperator, value: i64) -> &mut Self {
        self.push(Operation::WhereJsonLength {
            connector: Connector::And,
            column: column.into(),
            path,
            operator,
            value,
        })
    }

    pub fn where_full_text(&mut self, columns: Vec<String>, query: impl Into<String>) -> &mut Self {
        self.push(Operation::WhereFullText {
            connector: Connector::And,
            columns,
            query: query.into(),
        })
    }

    pub fn where_exists(&mut self, subquery: QueryBuilder) -> &mut Self {
        self.push(Operation::WhereExists {
            connector: Connector::And,
            subquery: Box::new(subquery),
            negate: false,
        })
    }

    pub fn where_doesnt_exist(&mut self, subquery: QueryBuilder) -> &mut Self {
        self.push(Operation::WhereExists {
            connector: Connector::And,
            subquery: Box::new(subquery),
            negate: true,
        })
    }

    // --- projection -----------------------------------------------

    pub fn select(&mut self, columns: Vec<String>) -> &mut Self {
        self.push(Operation::Select(columns))
    }

    pub fn select_raw(&mut self, expression: impl Into<String>) -> &mut Self {
        self.push(Operation::SelectRaw(expression.into()))
    }

    pub fn deselect(&mut self, columns: Vec<String>) -> &mut Self {
        self.push(Operation::Deselect(columns))
    }

    pub fn select_related_columns(&mut self, relation: impl Into<String>, alias: impl Into<String>) -> &mut Self {
        self.push(Operation::SelectRelatedColumns {
            relation: relation.into(),
            alias: alias.into(),
        })
    }

    /// A relational-only capability; a no-op on the document driver (see
    /// DESIGN.md Open Questions).
    pub fn select_driver_projection(&mut self, expression: impl Into<String>) -> &mut Self {
        self.push(Operation::SelectDriverProjection(expression.into()))
    }

    pub fn distinct(&mut self) -> &mut Self {
        self.push(Operation::Distinct(true))
    }

    // --- joins -----------------------------------------------

    fn join_impl(&mut self, kind: JoinKind, table: impl Into<String>, first: impl Into<String>, operator: ComparisonOperator, second: impl Into<String>) -> &mut Self {
        self.push(Operation::Join {
            kind,
            table: table.into(),
            first: first.into(),
            operator,
            second: second.into(),
            alias: None,
        })
    }

    pub fn join(&mut self, table: impl Into<String>, first: impl Into<String>, operator: ComparisonOperator, second: impl Into<String>) -> &mut Self {
        self.join_impl(JoinKind::Inner, table, first, operator, second)
    }

    pub fn left_join(&mut self, table: impl Into<String>, first: impl Into<String>, operator: ComparisonOperator, second: impl Into<String>) -> &mut Self {
        self.join_impl(JoinKind::Left, table, first, operator, second)
    }

    pub fn right_join(&mut self, table: impl Into<String>, first: impl Into<String>, operator: ComparisonOperator, second: impl Into<String>) -> &mut Self {
        self.join_impl(JoinKind::Right, table, first, operator, second)
    }

    pub fn full_join(&mut self, table: impl Into<String>, first: impl Into<String>, operator: ComparisonOperator, second: impl Into<String>) -> &mut Self {
        self.join_impl(JoinKind::Full, table, first, operator, second)
    }

    pub fn cross_join(&mut self, table: impl Into<String>) -> &mut Self {
        self.push(Operation::Join {
            kind: JoinKind::Cross,
            table: table.into(),
            first: String::new(),
            operator: ComparisonOperator::Eq,
            second: String::new(),
            alias: None,
        })
    }

    pub fn join_raw(&mut self, sql: impl Into<String>) -> &mut Self {
        self.push(Operation::JoinRaw(sql.into()))
    }

    // --- ordering / grouping -----------------------------------------------

    pub fn order_by(&mut self, column: impl Into<String>, direction: SortDirection) -> &mut Self {
        self.push(Operation::OrderBy {
            column: column.into(),
            direction,
        })
    }

    pub fn order_by_raw(&mut self, expression: impl Into<String>) -> &mut Self {
        self.push(Operation::OrderByRaw(expression.into()))
    }

    pub fn group_by(&mut self, columns: Vec<String>) -> &mut Self {
        self.push(Operation::GroupBy(columns))
    }

    pub fn having(&mut self, column: impl Into<String>, operator: ComparisonOperator, value: Value) -> &mut Self {
        self.push(Operation::Having {
            column: column.into(),
            operator,
            value,
        })
    }

    pub fn having_raw(&mut self, expression: impl Into<String>) -> &mut Self {
        self.push(Operation::HavingRaw(expression.into()))
    }

    pub fn limit(&mut self, limit: u64) -> &mut Self {
        self.push(Operation::Limit(limit))
    }

    pub fn offset(&mut self, offset: u64) -> &mut Self {
        self.push(Operation::Offset(offset))
    }

    // --- relation existence -----------------------------------------------

    pub fn has(&mut self, relation: impl Into<String>) -> &mut Self {
        self.push(Operation::Has {
            relation: relation.into(),
            negate: false,
        })
    }

    pub fn doesnt_have(&mut self, relation: impl Into<String>) -> &mut Self {
        self.push(Operation::Has {
            relation: relation.into(),
            negate: true,
        })
    }

    pub fn where_has(&mut self, relation: impl Into<String>, constraint: Option<QueryBuilder>) -> &mut Self {
        self.push(Operation::WhereHas {
            connector: Connector::And,
            relation: relation.into(),
            constraint: constraint.map(Box::new),
            negate: false,
        })
    }

    pub fn where_doesnt_have(&mut self, relation: impl Into<String>, constraint: Option<QueryBuilder>) -> &mut Self {
        self.push(Operation::WhereHas {
            connector: Connector::And,
            relation: relation.into(),
            constraint: constraint.map(Box::new),
            negate: true,
        })
    }

    // --- compilation -----------------------------------------------

    pub fn parse(&self, source: &DataSource) -> Result<CompiledQuery, DbError> {
        let scoped = self.scoped();
        source
            .driver()
            .query_parser()
            .parse(&scoped.table, &scoped.operations)
    }

    pub fn pretty(&self, source: &DataSource) -> Result<String, DbError> {
        Ok(match self.parse(source)? {
            CompiledQuery::Sql { sql, params } => {
                let rendered: Vec<String> = params.iter().map(|v| v.as_display_string()).collect();
                format!("{}  -- params: [{}]", sql, rendered.join(", "))
            }
            CompiledQuery::Pipeline { collection, stages } => {
                let rendered: Vec<String> = stages.iter().map(|s| s.to_string()).collect();
                format!("db.{}.aggregate([{}])", collection, rendered.join(", "))
            }
        })
    }

    // --- execution -----------------------------------------------

    async fn run(&self, source: &DataSource) -> Result<Vec<Row>, DbError> {
        let compiled = self.parse(source)?;
        let conn = source.connection().await?;
        let result = conn.execute(&compiled).await?;
        Ok(result.rows)
    }

    pub async fn get(&self, source: &DataSource) -> Result<Vec<Row>, DbError> {
        self.run(source).await
    }

    pub async fn first(&self, source: &DataSource) -> Result<Option<Row>, DbError> {
        let mut limited = self.clone();
        limited.limit(1);
        Ok(limited.run(source).await?.into_iter().next())
    }

    /// As `get`, but splits each row's `_rel_<name>` columns (injected by a
    /// prior `join_with` call) out of the base row into a side map keyed by
    /// relation name, `None` when every field of the joined row was null
    /// (no matching related row).
    pub async fn get_with_relations(
        &self,
        source: &DataSource,
    ) -> Result<Vec<(Row, HashMap<String, Option<Value>>)>, DbError> {
        Ok(self.run(source).await?.into_iter().map(extract_relations).collect())
    }

    pub async fn first_with_relations(
        &self,
        source: &DataSource,
    ) -> Result<Option<(Row, HashMap<String, Option<Value>>)>, DbError> {
        let mut limited = self.clone();
        limited.limit(1);
        Ok(limited
            .run(source)
            .await?
            .into_iter()
            .next()
            .map(extract_relations))
    }

    pub async fn first_or_fail(&self, source: &DataSource) -> Result<Row, DbError> {
        self.first(source)
            .await?
            .ok_or_else(|| DbError::QueryFailed {
                source: crate::FormattedError::new("no matching row"),
                sql: self.table.clone(),
                params: Vec::new(),
            })
    }

    pub async fn find(&self, source: &DataSource, id: Value) -> Result<Option<Row>, DbError> {
        let mut query = self.clone();
        query.where_("id", ComparisonOperator::Eq, id);
        query.first(source).await
    }

    pub async fn count(&self, source: &DataSource) -> Result<i64, DbError> {
        let mut query = self.clone();
        query.select_raw("COUNT(*) AS aggregate");
        let rows = query.run(source).await?;
        Ok(extract_i64(&rows))
    }

    pub async fn count_distinct(&self, source: &DataSource, column: &str) -> Result<i64, DbError> {
        let mut query = self.clone();
        query.select_raw(format!("COUNT(DISTINCT {}) AS aggregate", column));
        let rows = query.run(source).await?;
        Ok(extract_i64(&rows))
    }

    pub async fn sum(&self, source: &DataSource, column: &str) -> Result<Value, DbError> {
        self.aggregate(source, "SUM", column).await
    }

    pub async fn avg(&self, source: &DataSource, column: &str) -> Result<Value, DbError> {
        self.aggregate(source, "AVG", column).await
    }

    pub async fn min(&self, source: &DataSource, column: &str) -> Result<Value, DbError> {
        self.aggregate(source, "MIN", column).await
    }

    pub async fn max(&self, source: &DataSource, column: &str) -> Result<Value, DbError> {
        self.aggregate(source, "MAX", column).await
    }

    async fn aggregate(&self, source: &DataSource, func: &str, column: &str) -> Result<Value, DbError> {
        let mut query = self.clone();
        query.select_raw(format!("{}({}) AS aggregate", func, column));
        let rows = query.run(source).await?;
        Ok(rows
            .into_iter()
            .next()
            .and_then(|row| row.into_iter().next())
            .map(|(_, value)| value)
            .unwrap_or(Value::Null))
    }

    pub async fn pluck(&self, source: &DataSource, column: &str) -> Result<Vec<Value>, DbError> {
        let mut query = self.clone();
        query.select(vec![column.to_string()]);
        let rows = query.run(source).await?;
        Ok(rows
            .into_iter()
            .filter_map(|row| row.into_iter().next().map(|(_, value)| value))
            .collect())
    }

    pub async fn value(&self, source: &DataSource, column: &str) -> Result<Option<Value>, DbError> {
        Ok(self.pluck(source, column).await?.into_iter().next())
    }

    pub async fn exists(&self, source: &DataSource) -> Result<bool, DbError> {
        Ok(self.count(source).await? > 0)
    }

    pub async fn not_exists(&self, source: &DataSource) -> Result<bool, DbError> {
        Ok(!self.exists(source).await?)
    }

    /// Fetches rows `chunk_size` at a time, calling `visit` on each page,
    /// stopping early if `visit` returns `false`.
    pub async fn chunk<F>(&self, source: &DataSource, chunk_size: u64, mut visit: F) -> Result<(), DbError>
    where
        F: FnMut(Vec<Row>) -> bool,
    {
        let mut offset = 0;
        loop {
            let mut page = self.clone();
            page.limit(chunk_size).offset(offset);
            let rows = page.run(source).await?;
            if rows.is_empty() {
                break;
            }
            let fetched = rows.len() as u64;
            if !visit(rows) {
                break;
            }
            if fetched < chunk_size {
                break;
            }
            offset += chunk_size;
        }
        Ok(())
    }

    pub async fn paginate(&self, source: &DataSource, page: u64, per_page: u64) -> Result<Page, DbError> {
        let total = self.count(source).await?;
        let mut query = self.clone();
        query.limit(per_page).offset(page.saturating_sub(1) * per_page);
        let rows = query.run(source).await?;
        Ok(Page {
            rows,
            total,
            page,
            per_page,
        })
    }

    /// Keyset pagination on `id` order, for use where offset pagination's
    /// cost grows with how deep into the result set a caller pages.
    pub async fn cursor_paginate(&self, source: &DataSource, cursor: Option<Value>, per_page: u64) -> Result<CursorPage, DbError> {
        let mut query = self.clone();
        if let Some(cursor) = cursor {
            query.where_("id", ComparisonOperator::Gt, cursor);
        }
        query.order_by("id", SortDirection::Asc);
        query.limit(per_page + 1);
        let mut rows = query.run(source).await?;
        let has_more = rows.len() as u64 > per_page;
        if has_more {
            rows.truncate(per_page as usize);
        }
        let next_cursor = rows.last().and_then(|row| {
            row.iter()
                .find(|(name, _)| name == "id")
                .map(|(_, value)| value.clone())
        });
        Ok(CursorPage {
            rows,
            next_cursor,
            has_more,
        })
    }

    pub async fn increment(&self, source: &DataSource, column: &str, by: i64) -> Result<u64, DbError> {
        self.bump(source, column, by).await
    }

    pub async fn decrement(&self, source: &DataSource, column: &str, by: i64) -> Result<u64, DbError> {
        self.bump(source, column, -by).await
    }

    async fn bump(&self, source: &DataSource, column: &str, delta: i64) -> Result<u64, DbError> {
        let op = if delta >= 0 {
            UpdateOp::Inc(Value::Int(delta))
        } else {
            UpdateOp::Dec(Value::Int(-delta))
        };
        let scoped = self.scoped();
        let compiled = source.driver().query_parser().parse_update(
            &scoped.table,
            &scoped.operations,
            &[(column.to_string(), op)],
        )?;
        let conn = source.connection().await?;
        let result = conn.execute(&compiled).await?;
        Ok(result.affected_rows)
    }

    pub async fn update(&mut self, source: &DataSource, changes: Vec<(String, Value)>) -> Result<u64, DbError> {
        let changes: Vec<(String, UpdateOp)> = changes
            .into_iter()
            .map(|(column, value)| (column, UpdateOp::Set(value)))
            .collect();
        self.update_ops(source, changes).await
    }

    /// The full `$set`/`$unset`/`$inc`/`$dec`/`$push`/`$pull` surface, for
    /// callers that need an operator other than a plain `$set`.
    pub async fn update_ops(&mut self, source: &DataSource, changes: Vec<(String, UpdateOp)>) -> Result<u64, DbError> {
        let scoped = self.scoped();
        let compiled = source
            .driver()
            .query_parser()
            .parse_update(&scoped.table, &scoped.operations, &changes)?;
        let conn = source.connection().await?;
        let result = conn.execute(&compiled).await?;
        self.operations.clear();
        Ok(result.affected_rows)
    }

    /// Sets the given columns to `NULL`.
    pub async fn unset(&mut self, source: &DataSource, columns: Vec<String>) -> Result<u64, DbError> {
        let changes = columns.into_iter().map(|c| (c, UpdateOp::Unset)).collect();
        self.update_ops(source, changes).await
    }

    pub async fn delete(&mut self, source: &DataSource) -> Result<u64, DbError> {
        let scoped = self.scoped();
        let compiled = source
            .driver()
            .query_parser()
            .parse_delete(&scoped.table, &scoped.operations)?;
        let conn = source.connection().await?;
        let result = conn.execute(&compiled).await?;
        self.operations.clear();
        Ok(result.affected_rows)
    }

    pub async fn explain(&self, source: &DataSource) -> Result<String, DbError> {
        let compiled = self.parse(source)?;
        let explain = match compiled {
            CompiledQuery::Sql { sql, params } => CompiledQuery::Sql {
                sql: format!("EXPLAIN (FORMAT JSON) {}", sql),
                params,
            },
            CompiledQuery::Pipeline { collection, stages } => {
                let mut wrapped = stages.clone();
                wrapped.insert(0, serde_json::json!({"$explain": true}));
                CompiledQuery::Pipeline {
                    collection,
                    stages: wrapped,
                }
            }
        };
        let conn = source.connection().await?;
        let result = conn.execute(&explain).await?;
        Ok(result
            .rows
            .into_iter()
            .next()
            .map(|row| {
                row.into_iter()
                    .map(|(_, v)| v.as_display_string())
                    .collect::<Vec<_>>()
                    .join(" ")
            })
            .unwrap_or_default())
    }
}

fn negate(operator: ComparisonOperator) -> ComparisonOperator {
    match operator {
        ComparisonOperator::Eq => ComparisonOperator::Ne,
        ComparisonOperator::Ne => ComparisonOperator::Eq,
        ComparisonOperator::Lt => ComparisonOperator::Gte,
        ComparisonOperator::Lte => ComparisonOperator::Gt,
        ComparisonOperator::Gt => ComparisonOperator::Lte,
        ComparisonOperator::Gte => ComparisonOperator::Lt,
    }
}

/// Splits a `_rel_<name>` column out of a fetched row, per step 5 of
/// `QueryBuilder`'s execution contract ("extract joined relation data"). A
/// `Value::Document` whose fields are all null means the `LEFT JOIN` found
/// no matching row, so the relation is reported absent (`None`) rather than
/// a document of nulls.
fn extract_relations(row: Row) -> (Row, HashMap<String, Option<Value>>) {
    let mut base = Row::new();
    let mut relations = HashMap::new();
    for (name, value) in row {
        match name.strip_prefix("_rel_") {
            Some(relation_name) => {
                let present = match &value {
                    Value::Null => false,
                    Value::Document(map) => map.values().any(|v| !v.is_null()),
                    _ => true,
                };
                relations.insert(relation_name.to_string(), present.then_some(value));
            }
            None => base.push((name, value)),
        }
    }
    (base, relations)
}

fn extract_i64(rows: &[Row]) -> i64 {
    rows.first()
        .and_then(|row| row.first())
        .map(|(_, value)| match value {
            Value::Int(i) => *i,
            Value::Float(f) => *f as i64,
            _ => 0,
        })
        .unwrap_or(0)
}

#[derive(Debug, Clone)]
pub struct Page {
    pub rows: Vec<Row>,
    pub total: i64,
    pub page: u64,
    pub per_page: u64,
}

#[derive(Debug, Clone)]
pub struct CursorPage {
    pub rows: Vec<Row>,
    pub next_cursor: Option<Value>,
    pub has_more: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builder_accumulates_operations_in_call_order() {
        let mut query = QueryBuilder::new("users");
        query
            .where_("active", ComparisonOperator::Eq, Value::Bool(true))
            .order_by("created_at", SortDirection::Desc)
            .limit(10);

        assert_eq!(query.operations().len(), 3);
        assert!(matches!(query.operations()[0], Operation::Where { .. }));
        assert!(matches!(query.operations()[1], Operation::OrderBy { .. }));
        assert!(matches!(query.operations()[2], Operation::Limit(10)));
    }

    #[test]
    fn where_not_flips_the_operator() {
        let mut query = QueryBuilder::new("users");
        query.where_not("age", ComparisonOperator::Gt, Value::Int(18));
        match &query.operations()[0] {
            Operation::Where { operator, .. } => assert_eq!(*operator, ComparisonOperator::Lte),
            _ => panic!("expected a Where operation"),
        }
    }

    #[test]
    fn clone_is_independent_of_the_original() {
        let mut original = QueryBuilder::new("users");
        original.where_("id", ComparisonOperator::Eq, Value::Int(1));
        let mut cloned = original.clone();
        cloned.limit(1);

        assert_eq!(original.operations().len(), 1);
        assert_eq!(cloned.operations().len(), 2);
    }

    #[test]
    fn join_with_emits_left_join_and_related_columns_aliased_by_relation_name() {
        let relation =
            RelationDefinition::conventional("author", crate::RelationKind::BelongsTo, "users", "posts");
        let mut query = QueryBuilder::new("posts");
        query.join_with(&relation);

        match &query.operations()[0] {
            Operation::Join { kind, table, first, second, alias, .. } => {
                assert_eq!(*kind, JoinKind::Left);
                assert_eq!(table, "users");
                assert_eq!(first, "posts.authorId");
                assert_eq!(second, "_rel_author.id");
                assert_eq!(alias.as_deref(), Some("_rel_author"));
            }
            other => panic!("expected a Join operation, got {other:?}"),
        }
        assert!(matches!(
            &query.operations()[1],
            Operation::SelectRelatedColumns { relation, alias }
                if relation == "author" && alias == "_rel_author"
        ));
    }

    #[test]
    fn extract_relations_reports_absent_when_every_joined_field_is_null() {
        let mut present = serde_json::Map::new();
        present.insert("id".to_string(), serde_json::Value::Null);
        present.insert("name".to_string(), serde_json::Value::Null);
        let row: Row = vec![
            ("id".to_string(), Value::Int(1)),
            ("_rel_author".to_string(), Value::Document(present)),
        ];

        let (base, relations) = extract_relations(row);
        assert_eq!(base.len(), 1);
        assert_eq!(relations.get("author"), Some(&None));
    }

    #[test]
    fn extract_relations_reports_present_when_any_joined_field_is_non_null() {
        let mut doc = serde_json::Map::new();
        doc.insert("id".to_string(), serde_json::Value::from(7));
        let row: Row = vec![("_rel_author".to_string(), Value::Document(doc))];

        let (_, relations) = extract_relations(row);
        assert!(relations.get("author").unwrap().is_some());
    }

    struct ActiveOnly;
    impl Scope for ActiveOnly {
        fn apply(&self, builder: &mut QueryBuilder) {
            builder.where_("active", ComparisonOperator::Eq, Value::Bool(true));
        }
    }

    #[test]
    fn global_scope_splices_before_user_operations_by_default() {
        let mut query = QueryBuilder::new("users");
        query.with_global_scopes(vec![NamedScope::new("active_only", ActiveOnly)]);
        query.where_("id", ComparisonOperator::Eq, Value::Int(1));
        query.apply_scopes();

        assert_eq!(query.operations().len(), 2);
        match &query.operations()[0] {
            Operation::Where { column, .. } => assert_eq!(column, "active"),
            other => panic!("expected the scope's Where first, got {other:?}"),
        }
    }

    #[test]
    fn without_global_scope_disables_it_for_this_call() {
        let mut query = QueryBuilder::new("users");
        query.with_global_scopes(vec![NamedScope::new("active_only", ActiveOnly)]);
        query.without_global_scope("active_only");
        query.where_("id", ComparisonOperator::Eq, Value::Int(1));
        query.apply_scopes();

        assert_eq!(query.operations().len(), 1);
    }

    #[test]
    fn apply_scopes_is_idempotent() {
        let mut query = QueryBuilder::new("users");
        query.with_global_scopes(vec![NamedScope::new("active_only", ActiveOnly)]);
        query.apply_scopes();
        query.apply_scopes();

        assert_eq!(query.operations().len(), 1);
    }
}
