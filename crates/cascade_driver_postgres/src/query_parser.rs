use std::collections::HashSet;

use cascade_core::{
    ComparisonOperator, CompiledQuery, Connector, DbError, Dialect, JoinKind, Operation,
    ParamCounter, QueryBuilder, QueryParser, SortDirection, UpdateOp, Value,
};

use crate::dialect::PostgresDialect;

/// Compiles an `Operation` list into a single SQL string plus its
/// positional `$n` bindings.
///
/// One `Compiler` is built per `parse` call; it owns the shared
/// [`ParamCounter`] and the running set of joined-table names that the
/// "smart JOIN field" rule (§4.2 item 7) consults, so neither has to be
/// threaded through every helper as an extra argument.
pub struct PostgresQueryParser {
    dialect: PostgresDialect,
}

impl Default for PostgresQueryParser {
    fn default() -> Self {
        Self {
            dialect: PostgresDialect,
        }
    }
}

impl QueryParser for PostgresQueryParser {
    fn parse(&self, table: &str, operations: &[Operation]) -> Result<CompiledQuery, DbError> {
        let mut compiler = Compiler::new(&self.dialect, table);
        compiler.walk(operations)?;
        Ok(compiler.finish_select())
    }

    fn parse_update(
        &self,
        table: &str,
        operations: &[Operation],
        changes: &[(String, UpdateOp)],
    ) -> Result<CompiledQuery, DbError> {
        let mut compiler = Compiler::new(&self.dialect, table);
        compiler.walk(operations)?;

        if changes.is_empty() {
            return Err(DbError::InvalidOperationPayload(
                "update called with no changes".to_string(),
            ));
        }

        let mut assignments = Vec::with_capacity(changes.len());
        for (column, op) in changes {
            let quoted = self.dialect.quote_identifier(column);
            let assignment = match op {
                UpdateOp::Set(value) => {
                    format!("{} = {}", quoted, compiler.bind(value.clone()))
                }
                UpdateOp::Unset => format!("{} = NULL", quoted),
                UpdateOp::Inc(value) => format!(
                    "{quoted} = COALESCE({quoted}, 0) + {}",
                    compiler.bind(value.clone()),
                    quoted = quoted
                ),
                UpdateOp::Dec(value) => format!(
                    "{quoted} = COALESCE({quoted}, 0) - {}",
                    compiler.bind(value.clone()),
                    quoted = quoted
                ),
                // `$push`/`$pull` are document-engine operators the source
                // leaves unspecified on the relational side (§9 Open
                // Questions). This driver's resolution: silently drop them
                // rather than error, so a caller sharing one update-ops call
                // across both engines degrades instead of failing outright.
                // Recorded in DESIGN.md.
                UpdateOp::Push(_) | UpdateOp::Pull(_) => continue,
            };
            assignments.push(assignment);
        }

        if assignments.is_empty() {
            return Err(DbError::NotSupported(
                "update contained only $push/$pull operators, which the relational driver ignores".to_string(),
            ));
        }

        let mut sql = format!(
            "UPDATE {} SET {}",
            self.dialect.quote_identifier(table),
            assignments.join(", ")
        );
        if let Some(where_clause) = compiler.where_clause() {
            sql.push_str(" WHERE ");
            sql.push_str(&where_clause);
        }
        sql.push_str(" RETURNING *");

        Ok(CompiledQuery::Sql {
            sql,
            params: compiler.into_params(),
        })
    }

    fn parse_delete(&self, table: &str, operations: &[Operation]) -> Result<CompiledQuery, DbError> {
        let mut compiler = Compiler::new(&self.dialect, table);
        compiler.walk(operations)?;

        let mut sql = format!("DELETE FROM {}", self.dialect.quote_identifier(table));
        if let Some(where_clause) = compiler.where_clause() {
            sql.push_str(" WHERE ");
            sql.push_str(&where_clause);
        }

        Ok(CompiledQuery::Sql {
            sql,
            params: compiler.into_params(),
        })
    }

    fn parse_insert(
        &self,
        table: &str,
        rows: &[Vec<(String, Value)>],
    ) -> Result<CompiledQuery, DbError> {
        if rows.is_empty() {
            return Err(DbError::InvalidOperationPayload(
                "insert called with no rows".to_string(),
            ));
        }

        // The union of keys across all rows, in first-seen order, so a
        // single INSERT can cover heterogeneous documents (insertMany)
        // the way §4.8 requires, substituting DEFAULT for rows missing a
        // given key.
        let mut columns: Vec<String> = Vec::new();
        let mut seen = HashSet::new();
        for row in rows {
            for (key, _) in row {
                if seen.insert(key.clone()) {
                    columns.push(key.clone());
                }
            }
        }

        // `insert` drops `id` keys that are null/undefined so identity
        // columns auto-generate (§4.8). A row simply omitting the key
        // already gets this for free via DEFAULT; we only need to guard a
        // row that explicitly carries `Value::Null` for `id`.
        let mut counter = ParamCounter::new();
        let mut params = Vec::new();
        let mut tuples = Vec::with_capacity(rows.len());

        for row in rows {
            let mut placeholders = Vec::with_capacity(columns.len());
            for column in &columns {
                let value = row.iter().find(|(key, _)| key == column).map(|(_, v)| v);
                match value {
                    Some(Value::Null) if column == "id" => placeholders.push("DEFAULT".to_string()),
                    Some(value) => {
                        placeholders.push(self.dialect.placeholder(counter.next()));
                        params.push(value.clone());
                    }
                    None => placeholders.push("DEFAULT".to_string()),
                }
            }
            tuples.push(format!("({})", placeholders.join(", ")));
        }

        let quoted_columns: Vec<String> = columns
            .iter()
            .map(|c| self.dialect.quote_identifier(c))
            .collect();

        let sql = format!(
            "INSERT INTO {} ({}) VALUES {} RETURNING *",
            self.dialect.quote_identifier(table),
            quoted_columns.join(", "),
            tuples.join(", ")
        );

        Ok(CompiledQuery::Sql { sql, params })
    }
}

struct JoinFragment {
    sql: String,
}

struct Compiler<'d> {
    dialect: &'d PostgresDialect,
    root_table: String,
    counter: ParamCounter,
    params: Vec<Value>,
    select_cols: Vec<String>,
    deselect: Vec<String>,
    root_star_injected: bool,
    joins: Vec<JoinFragment>,
    joined_tables: HashSet<String>,
    where_parts: Vec<(Connector, String)>,
    group_by: Vec<String>,
    having_parts: Vec<String>,
    order_by: Vec<String>,
    limit: Option<u64>,
    offset: Option<u64>,
    distinct: bool,
}

impl<'d> Compiler<'d> {
    fn new(dialect: &'d PostgresDialect, root_table: &str) -> Self {
        let mut joined_tables = HashSet::new();
        joined_tables.insert(root_table.to_string());
        Self {
            dialect,
            root_table: root_table.to_string(),
            counter: ParamCounter::new(),
            params: Vec::new(),
            select_cols: Vec::new(),
            deselect: Vec::new(),
            root_star_injected: false,
            joins: Vec::new(),
            joined_tables,
            where_parts: Vec::new(),
            group_by: Vec::new(),
            having_parts: Vec::new(),
            order_by: Vec::new(),
            limit: None,
            offset: None,
            distinct: false,
        }
    }

    fn q(&self, name: &str) -> String {
        self.dialect.quote_identifier(name)
    }

    /// Binds `value` to the next placeholder and returns it rendered.
    fn bind(&mut self, value: Value) -> String {
        let placeholder = self.dialect.placeholder(self.counter.next());
        self.params.push(value);
        placeholder
    }

    fn into_params(self) -> Vec<Value> {
        self.params
    }

    fn where_clause(&self) -> Option<String> {
        render_connector_chain(&self.where_parts)
    }

    fn walk(&mut self, operations: &[Operation]) -> Result<(), DbError> {
        for op in operations {
            self.apply(op)?;
        }
        Ok(())
    }

    fn apply(&mut self, op: &Operation) -> Result<(), DbError> {
        match op {
            Operation::Where {
                connector,
                column,
                operator,
                value,
            } => {
                let placeholder = self.bind(value.clone());
                let fragment = format!("{} {} {}", self.q(column), operator_sql(*operator), placeholder);
                self.where_parts.push((*connector, fragment));
            }
            Operation::WhereRaw {
                connector,
                sql,
                bindings,
            } => {
                let fragment = self.substitute_raw(sql, bindings);
                self.where_parts.push((*connector, fragment));
            }
            Operation::WhereIn {
                connector,
                column,
                values,
                negate,
            } => {
                let placeholder = self.bind(Value::Array(values.clone()));
                let fragment = if *negate {
                    format!("NOT ({} = ANY({}))", self.q(column), placeholder)
                } else {
                    format!("{} = ANY({})", self.q(column), placeholder)
                };
                self.where_parts.push((*connector, fragment));
            }
            Operation::WhereNull { connector, column, negate } => {
                let fragment = format!(
                    "{} IS {}NULL",
                    self.q(column),
                    if *negate { "NOT " } else { "" }
                );
                self.where_parts.push((*connector, fragment));
            }
            Operation::WhereBetween {
                connector,
                column,
                low,
                high,
                negate,
            } => {
                let low_p = self.bind(low.clone());
                let high_p = self.bind(high.clone());
                let fragment = format!(
                    "{} {}BETWEEN {} AND {}",
                    self.q(column),
                    if *negate { "NOT " } else { "" },
                    low_p,
                    high_p
                );
                self.where_parts.push((*connector, fragment));
            }
            Operation::WhereLike {
                connector,
                column,
                pattern,
                case_insensitive,
                negate,
            } => {
                let clause = self.dialect.like_pattern(pattern, *case_insensitive);
                let placeholder = self.bind(Value::Text(clause.pattern));
                let fragment = format!(
                    "{}{} {} {}",
                    if *negate { "NOT " } else { "" },
                    self.q(column),
                    clause.operator,
                    placeholder
                );
                self.where_parts.push((*connector, fragment));
            }
            Operation::WhereColumn {
                connector,
                first,
                operator,
                second,
            } => {
                let fragment = format!(
                    "{} {} {}",
                    self.q(first),
                    operator_sql(*operator),
                    self.q(second)
                );
                self.where_parts.push((*connector, fragment));
            }
            Operation::WhereJsonContains {
                connector,
                column,
                path,
                value,
            } => {
                let encoded = serde_json::to_string(&value_to_json(value)).unwrap_or_else(|_| "null".to_string());
                let placeholder = self.bind(Value::Json(encoded));
                let fragment = match path {
                    Some(path) => format!(
                        "{} @> {}::jsonb",
                        self.dialect.json_extract(column, path, false),
                        placeholder
                    ),
                    None => self.dialect.json_contains(column, &placeholder),
                };
                self.where_parts.push((*connector, fragment));
            }
            Operation::WhereJsonLength {
                connector,
                column,
                path,
                operator,
                value,
            } => {
                let target = match path {
                    Some(path) => self.dialect.json_extract(column, path, false),
                    None => self.q(column),
                };
                let placeholder = self.bind(Value::Int(*value));
                let fragment = format!(
                    "jsonb_array_length({}) {} {}",
                    target,
                    operator_sql(*operator),
                    placeholder
                );
                self.where_parts.push((*connector, fragment));
            }
            Operation::WhereFullText {
                connector,
                columns,
                query,
            } => {
                let vectors: Vec<String> = columns
                    .iter()
                    .map(|c| format!("to_tsvector('english', {})", self.q(c)))
                    .collect();
                let placeholder = self.bind(Value::Text(query.clone()));
                let fragment = format!(
                    "{} @@ plainto_tsquery('english', {})",
                    vectors.join(" || "),
                    placeholder
                );
                self.where_parts.push((*connector, fragment));
            }
            Operation::WhereExists {
                connector,
                subquery,
                negate,
            } => {
                let fragment = self.render_subquery(subquery, *negate)?;
                self.where_parts.push((*connector, fragment));
            }
            Operation::Select(columns) => {
                for column in columns {
                    self.select_cols.push(self.q(column));
                }
            }
            Operation::SelectRaw(expr) => self.select_cols.push(expr.clone()),
            Operation::Deselect(columns) => self.deselect.extend(columns.iter().cloned()),
            Operation::SelectRelatedColumns { relation: _, alias } => {
                if !self.root_star_injected {
                    self.select_cols.push(format!("{}.*", self.q(&self.root_table)));
                    self.root_star_injected = true;
                }
                self.select_cols.push(format!(
                    "row_to_json({}.*) AS {}",
                    self.q(alias),
                    self.q(alias)
                ));
            }
            // A relational-only capability the source never actually wires
            // up (§9 Open Questions): treated as an intentional no-op here
            // too, rather than guessed at.
            Operation::SelectDriverProjection(_) => {}
            Operation::Join {
                kind,
                table,
                first,
                operator,
                second,
                alias,
            } => {
                let joined_name = alias.clone().unwrap_or_else(|| table.clone());
                let on = if matches!(kind, JoinKind::Cross) {
                    String::new()
                } else {
                    format!(
                        " ON {} {} {}",
                        self.render_join_field(first),
                        operator_sql(*operator),
                        self.render_join_field(second)
                    )
                };
                let alias_sql = match alias {
                    Some(alias) => format!(" AS {}", self.q(alias)),
                    None => String::new(),
                };
                self.joined_tables.insert(joined_name);
                self.joins.push(JoinFragment {
                    sql: format!("{} JOIN {}{}{}", join_kind_sql(*kind), self.q(table), alias_sql, on),
                });
            }
            Operation::JoinRaw(sql) => self.joins.push(JoinFragment { sql: sql.clone() }),
            Operation::OrderBy { column, direction } => {
                self.order_by
                    .push(format!("{} {}", self.q(column), direction_sql(*direction)));
            }
            Operation::OrderByRaw(expr) => self.order_by.push(expr.clone()),
            Operation::GroupBy(columns) => {
                self.group_by.extend(columns.iter().map(|c| self.q(c)));
            }
            Operation::Having { column, operator, value } => {
                let placeholder = self.bind(value.clone());
                self.having_parts
                    .push(format!("{} {} {}", self.q(column), operator_sql(*operator), placeholder));
            }
            Operation::HavingRaw(expr) => self.having_parts.push(expr.clone()),
            Operation::Limit(n) => self.limit = Some(*n),
            Operation::Offset(n) => self.offset = Some(*n),
            Operation::Distinct(flag) => self.distinct = *flag,
            // No relation registry reaches this parser (it lives above the
            // query builder, on the model layer), so `has`/`whereHas` fall
            // back to the same naive convention the document driver's
            // `$lookup` stage already applies: the relation name doubles as
            // the related table, and the join key follows the belongsTo
            // default (`<name>_id` on the root table, `id` on the related
            // one).
            Operation::Has { relation, negate } => {
                let fragment = self.render_relation_exists(relation, None, *negate)?;
                self.where_parts.push((Connector::And, fragment));
            }
            Operation::WhereHas {
                connector,
                relation,
                constraint,
                negate,
            } => {
                let fragment = self.render_relation_exists(relation, constraint.as_deref(), *negate)?;
                self.where_parts.push((*connector, fragment));
            }
        }
        Ok(())
    }

    /// §4.2 item 7: decide between a plain `"table"."column"` reference and
    /// a JSONB path extraction, based on whether the field's first dotted
    /// segment names the root table, a previously joined table, or an
    /// alias.
    fn render_join_field(&self, field: &str) -> String {
        let parts: Vec<&str> = field.split('.').collect();
        if parts.len() < 2 {
            return self.q(field);
        }

        let owner = parts[0];
        if !self.joined_tables.contains(owner) {
            return self.q(field);
        }

        let remainder = &parts[1..];
        if remainder.len() == 1 {
            return format!("{}.{}", self.q(owner), self.q(remainder[0]));
        }

        // More than one trailing segment: the second segment is a JSONB
        // column, the rest are nested keys.
        let json_column = remainder[0];
        let keys = &remainder[1..];
        let mut expr = format!("{}.{}", self.q(owner), self.q(json_column));
        for (i, key) in keys.iter().enumerate() {
            let is_last = i == keys.len() - 1;
            let op = if is_last { "->>" } else { "->" };
            expr.push_str(&format!("{}'{}'", op, key.replace('\'', "''")));
        }
        let terminal = keys.last().copied().unwrap_or_default();
        if terminal == "id" || terminal.ends_with("id") {
            expr = format!("({})::integer", expr);
        }
        expr
    }

    fn substitute_raw(&mut self, sql: &str, bindings: &[Value]) -> String {
        let mut out = String::with_capacity(sql.len());
        let mut binding_iter = bindings.iter();
        for ch in sql.chars() {
            if ch == '?' {
                if let Some(value) = binding_iter.next() {
                    out.push_str(&self.bind(value.clone()));
                    continue;
                }
            }
            out.push(ch);
        }
        out
    }

    fn render_subquery(&mut self, subquery: &QueryBuilder, negate: bool) -> Result<String, DbError> {
        let mut nested = Compiler::new(self.dialect, subquery.table());
        // Share the parent's parameter numbering so placeholders across the
        // whole statement stay contiguous and strictly increasing.
        let start = self.counter.count();
        for _ in 0..start {
            nested.counter.next();
        }
        nested.walk(subquery.operations())?;
        let added = nested.counter.count() - start;
        let sql = nested.finish_select_sql();
        self.params.extend(nested.params);
        for _ in 0..added {
            self.counter.next();
        }
        Ok(format!("{}EXISTS ({})", if negate { "NOT " } else { "" }, sql))
    }

    /// Renders `has`/`whereHas`/`doesntHave`/`whereDoesntHave` as a
    /// correlated `EXISTS (SELECT 1 FROM <relation> WHERE ...)`, the
    /// relational equivalent of `render_subquery`'s handling of an
    /// explicit `WhereExists` subquery. `constraint`'s operations (if any)
    /// are walked into the same nested `WHERE` clause as extra `AND`ed
    /// conditions.
    fn render_relation_exists(
        &mut self,
        relation: &str,
        constraint: Option<&QueryBuilder>,
        negate: bool,
    ) -> Result<String, DbError> {
        let related_table = relation.to_string();
        let local_column = format!("{}_id", singular(relation));

        let mut nested = Compiler::new(self.dialect, &related_table);
        nested.select_cols.push("1".to_string());
        let start = self.counter.count();
        for _ in 0..start {
            nested.counter.next();
        }
        nested.where_parts.push((
            Connector::And,
            format!(
                "{} = {}",
                nested.q(&format!("{}.id", related_table)),
                self.q(&format!("{}.{}", self.root_table, local_column))
            ),
        ));
        if let Some(constraint) = constraint {
            nested.walk(constraint.operations())?;
        }
        let added = nested.counter.count() - start;
        let sql = nested.finish_select_sql();
        self.params.extend(nested.params);
        for _ in 0..added {
            self.counter.next();
        }
        Ok(format!("{}EXISTS ({})", if negate { "NOT " } else { "" }, sql))
    }

    fn finish_select_sql(&self) -> String {
        let distinct = if self.distinct { "DISTINCT " } else { "" };
        let cols = self.render_select_cols();

        let mut sql = format!("SELECT {}{} FROM {}", distinct, cols, self.q(&self.root_table));
        for join in &self.joins {
            sql.push(' ');
            sql.push_str(&join.sql);
        }
        if let Some(where_clause) = self.where_clause() {
            sql.push_str(" WHERE ");
            sql.push_str(&where_clause);
        }
        if !self.group_by.is_empty() {
            sql.push_str(" GROUP BY ");
            sql.push_str(&self.group_by.join(", "));
        }
        if !self.having_parts.is_empty() {
            sql.push_str(" HAVING ");
            sql.push_str(&self.having_parts.join(" AND "));
        }
        if !self.order_by.is_empty() {
            sql.push_str(" ORDER BY ");
            sql.push_str(&self.order_by.join(", "));
        }
        if let Some(limit_offset) = self.dialect.limit_offset(self.limit, self.offset) {
            sql.push(' ');
            sql.push_str(&limit_offset);
        }
        sql
    }

    fn render_select_cols(&self) -> String {
        if !self.select_cols.is_empty() {
            if self.deselect.is_empty() {
                return self.select_cols.join(", ");
            }
            let filtered: Vec<&String> = self
                .select_cols
                .iter()
                .filter(|c| !self.deselect.iter().any(|d| self.q(d) == **c))
                .collect();
            return if filtered.is_empty() {
                "*".to_string()
            } else {
                filtered
                    .into_iter()
                    .cloned()
                    .collect::<Vec<_>>()
                    .join(", ")
            };
        }
        // No explicit projection and a deselect list: the engine has no way
        // to exclude columns without first knowing the table's full column
        // set, which the parser doesn't introspect. Falls back to `*`
        // rather than guessing the schema; see DESIGN.md.
        "*".to_string()
    }

    fn finish_select(self) -> CompiledQuery {
        let sql = self.finish_select_sql();
        CompiledQuery::Sql {
            sql,
            params: self.params,
        }
    }
}

fn render_connector_chain(parts: &[(Connector, String)]) -> Option<String> {
    if parts.is_empty() {
        return None;
    }
    let mut out = String::new();
    for (i, (connector, fragment)) in parts.iter().enumerate() {
        if i == 0 {
            out.push_str(fragment);
        } else {
            out.push_str(match connector {
                Connector::And => " AND ",
                Connector::Or => " OR ",
            });
            out.push_str(fragment);
        }
    }
    Some(out)
}

fn operator_sql(op: ComparisonOperator) -> &'static str {
    match op {
        ComparisonOperator::Eq => "=",
        ComparisonOperator::Ne => "<>",
        ComparisonOperator::Lt => "<",
        ComparisonOperator::Lte => "<=",
        ComparisonOperator::Gt => ">",
        ComparisonOperator::Gte => ">=",
    }
}

fn direction_sql(direction: SortDirection) -> &'static str {
    match direction {
        SortDirection::Asc => "ASC",
        SortDirection::Desc => "DESC",
    }
}

fn join_kind_sql(kind: JoinKind) -> &'static str {
    match kind {
        JoinKind::Inner => "INNER",
        JoinKind::Left => "LEFT",
        JoinKind::Right => "RIGHT",
        JoinKind::Full => "FULL",
        JoinKind::Cross => "CROSS",
    }
}

fn value_to_json(value: &Value) -> serde_json::Value {
    match value {
        Value::Null => serde_json::Value::Null,
        Value::Bool(b) => serde_json::Value::Bool(*b),
        Value::Int(i) => serde_json::json!(i),
        Value::Float(f) => serde_json::json!(f),
        Value::Text(s) | Value::Decimal(s) => serde_json::Value::String(s.clone()),
        Value::Json(s) => serde_json::from_str(s).unwrap_or(serde_json::Value::Null),
        Value::Bytes(b) => serde_json::Value::String(hex_encode(b)),
        Value::DateTime(dt) => serde_json::Value::String(dt.to_rfc3339()),
        Value::Date(d) => serde_json::Value::String(d.to_string()),
        Value::Time(t) => serde_json::Value::String(t.to_string()),
        Value::Array(items) => serde_json::Value::Array(items.iter().map(value_to_json).collect()),
        Value::Document(map) => serde_json::Value::Object(map.clone()),
        Value::ObjectId(id) => serde_json::Value::String(id.clone()),
    }
}

fn hex_encode(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{:02x}", b)).collect()
}

/// Naive singularization (`posts` -> `post`), matching the heuristic
/// `RelationDefinition::conventional` and the document driver's `$lookup`
/// stage both use for default foreign-key-name derivation.
fn singular(table: &str) -> &str {
    table.strip_suffix('s').unwrap_or(table)
}

#[cfg(test)]
mod tests {
    use super::*;
    use cascade_core::{ComparisonOperator, QueryBuilder, SortDirection};

    fn compiled_sql(builder: &QueryBuilder) -> (String, Vec<Value>) {
        let parser = PostgresQueryParser::default();
        match parser.parse(builder.table(), builder.operations()).unwrap() {
            CompiledQuery::Sql { sql, params } => (sql, params),
            _ => panic!("expected a SQL query"),
        }
    }

    #[test]
    fn simple_where_order_limit() {
        let mut builder = QueryBuilder::new("users");
        builder
            .where_("age", ComparisonOperator::Gt, Value::Int(18))
            .order_by("created_at", SortDirection::Desc)
            .limit(10);

        let (sql, params) = compiled_sql(&builder);
        assert_eq!(
            sql,
            "SELECT * FROM \"users\" WHERE \"age\" > $1 ORDER BY \"created_at\" DESC LIMIT 10"
        );
        assert_eq!(params, vec![Value::Int(18)]);
    }

    #[test]
    fn where_in_binds_a_single_array_param() {
        let mut builder = QueryBuilder::new("users");
        builder.where_in("status", vec![Value::Text("a".into()), Value::Text("b".into())]);
        builder.select_raw("COUNT(*) AS \"count\"");

        let (sql, params) = compiled_sql(&builder);
        assert_eq!(
            sql,
            "SELECT COUNT(*) AS \"count\" FROM \"users\" WHERE \"status\" = ANY($1)"
        );
        assert_eq!(params.len(), 1);
        assert!(matches!(params[0], Value::Array(_)));
    }

    #[test]
    fn placeholders_increase_strictly_across_clauses() {
        let mut builder = QueryBuilder::new("posts");
        builder
            .where_("published", ComparisonOperator::Eq, Value::Bool(true))
            .having("views", ComparisonOperator::Gt, Value::Int(100))
            .group_by(vec!["author_id".to_string()]);

        let (sql, params) = compiled_sql(&builder);
        assert!(sql.contains("$1"));
        assert!(sql.contains("$2"));
        assert_eq!(params.len(), 2);
    }

    #[test]
    fn smart_join_field_uses_table_column_when_prefix_matches() {
        let mut builder = QueryBuilder::new("posts");
        builder.left_join(
            "users",
            "posts.author_id",
            ComparisonOperator::Eq,
            "users.id",
        );
        let (sql, _) = compiled_sql(&builder);
        assert!(sql.contains("\"posts\".\"author_id\" = \"users\".\"id\""));
    }

    #[test]
    fn has_emits_a_correlated_exists_subquery() {
        let mut builder = QueryBuilder::new("posts");
        builder.has("comments");
        let (sql, params) = compiled_sql(&builder);
        assert_eq!(
            sql,
            "SELECT * FROM \"posts\" WHERE EXISTS (SELECT 1 FROM \"comments\" WHERE \"comments\".\"id\" = \"posts\".\"comment_id\")"
        );
        assert!(params.is_empty());
    }

    #[test]
    fn doesnt_have_negates_the_exists_subquery() {
        let mut builder = QueryBuilder::new("posts");
        builder.doesnt_have("comments");
        let (sql, _) = compiled_sql(&builder);
        assert!(sql.contains("WHERE NOT EXISTS (SELECT 1 FROM \"comments\""));
    }

    #[test]
    fn where_has_folds_the_constraint_into_the_exists_subquery() {
        let mut builder = QueryBuilder::new("posts");
        let mut constraint = QueryBuilder::new("comments");
        constraint.where_("approved", ComparisonOperator::Eq, Value::Bool(true));
        builder.where_has("comments", Some(constraint));

        let (sql, params) = compiled_sql(&builder);
        assert_eq!(
            sql,
            "SELECT * FROM \"posts\" WHERE EXISTS (SELECT 1 FROM \"comments\" WHERE \"comments\".\"id\" = \"posts\".\"comment_id\" AND \"approved\" = $1)"
        );
        assert_eq!(params, vec![Value::Bool(true)]);
    }

    #[test]
    fn smart_join_field_falls_back_to_json_path_extraction() {
        let mut builder = QueryBuilder::new("posts");
        builder.left_join(
            "users",
            "posts.meta.author.id",
            ComparisonOperator::Eq,
            "users.id",
        );
        let (sql, _) = compiled_sql(&builder);
        assert!(sql.contains("\"posts\".\"meta\"->'author'->>'id')::integer"));
    }
}
