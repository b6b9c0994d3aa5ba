use cascade_core::{
    ComparisonOperator, CompiledQuery, Connector, DbError, JoinKind, Operation, QueryParser,
    SortDirection, UpdateOp, Value,
};
use serde_json::{Map, Value as Json, json};

use crate::value_codec::value_to_json;

/// Compiles an accumulated `Operation` chain into a MongoDB aggregation
/// pipeline. Filters become `$match`, joins become `$lookup`, and every
/// other clause maps onto the matching native stage — see `Driver` §4.8:
/// "the document driver MUST emit aggregation pipeline stages using native
/// dotted-path field references."
///
/// `update`/`delete`/`insert` have no pipeline stage of their own; the
/// driver needs to know which native command to issue instead of running
/// `aggregate`. Since `CompiledQuery::Pipeline` only carries a collection
/// name and a stage list, this parser prepends a marker stage —
/// `{"$cascadeOp": "update"|"delete"|"insert", ...}` — that never reaches
/// MongoDB: `cascade_driver_mongodb::driver::run_compiled` strips it off
/// first and dispatches to `update_many`/`delete_many`/`insert_many`
/// instead of `aggregate`. This is purely an internal wire convention
/// between this parser and this crate's `Connection` impl.
#[derive(Debug, Default)]
pub struct MongoQueryParser;

impl QueryParser for MongoQueryParser {
    fn parse(&self, table: &str, operations: &[Operation]) -> Result<CompiledQuery, DbError> {
        let mut builder = PipelineBuilder::new(table);
        builder.apply(operations)?;
        Ok(CompiledQuery::Pipeline {
            collection: table.to_string(),
            stages: builder.finish(),
        })
    }

    fn parse_update(
        &self,
        table: &str,
        operations: &[Operation],
        changes: &[(String, UpdateOp)],
    ) -> Result<CompiledQuery, DbError> {
        let filter = build_filter(operations)?;
        let update = build_update_document(changes)?;

        let marker = json!({
            "$cascadeOp": "update",
            "filter": filter,
            "update": update,
        });

        Ok(CompiledQuery::Pipeline {
            collection: table.to_string(),
            stages: vec![marker],
        })
    }

    fn parse_delete(&self, table: &str, operations: &[Operation]) -> Result<CompiledQuery, DbError> {
        let filter = build_filter(operations)?;
        let marker = json!({
            "$cascadeOp": "delete",
            "filter": filter,
        });

        Ok(CompiledQuery::Pipeline {
            collection: table.to_string(),
            stages: vec![marker],
        })
    }

    fn parse_insert(
        &self,
        table: &str,
        rows: &[Vec<(String, Value)>],
    ) -> Result<CompiledQuery, DbError> {
        let documents: Vec<Json> = rows
            .iter()
            .map(|row| {
                let mut doc = Map::new();
                for (column, value) in row {
                    doc.insert(column.clone(), value_to_json(value));
                }
                Json::Object(doc)
            })
            .collect();

        let marker = json!({
            "$cascadeOp": "insert",
            "documents": documents,
        });

        Ok(CompiledQuery::Pipeline {
            collection: table.to_string(),
            stages: vec![marker],
        })
    }
}

/// Builds the `{"$set": {...}, "$unset": {...}, ...}` native update document
/// MongoDB's `updateMany` takes directly. Unlike the relational driver,
/// `$push`/`$pull` are passed through untouched rather than dropped — the
/// source leaves their SQL behavior unspecified but is explicit that they
/// are native document-engine operators (see DESIGN.md).
fn build_update_document(changes: &[(String, UpdateOp)]) -> Result<Json, DbError> {
    let mut set = Map::new();
    let mut unset = Map::new();
    let mut inc = Map::new();
    let mut push = Map::new();
    let mut pull = Map::new();

    for (column, op) in changes {
        match op {
            UpdateOp::Set(value) => {
                set.insert(column.clone(), value_to_json(value));
            }
            UpdateOp::Unset => {
                unset.insert(column.clone(), json!(""));
            }
            UpdateOp::Inc(value) => {
                inc.insert(column.clone(), value_to_json(value));
            }
            UpdateOp::Dec(value) => {
                inc.insert(column.clone(), negate_json_number(value));
            }
            UpdateOp::Push(value) => {
                push.insert(column.clone(), value_to_json(value));
            }
            UpdateOp::Pull(value) => {
                pull.insert(column.clone(), value_to_json(value));
            }
        }
    }

    let mut update = Map::new();
    if !set.is_empty() {
        update.insert("$set".to_string(), Json::Object(set));
    }
    if !unset.is_empty() {
        update.insert("$unset".to_string(), Json::Object(unset));
    }
    if !inc.is_empty() {
        update.insert("$inc".to_string(), Json::Object(inc));
    }
    if !push.is_empty() {
        update.insert("$push".to_string(), Json::Object(push));
    }
    if !pull.is_empty() {
        update.insert("$pull".to_string(), Json::Object(pull));
    }

    if update.is_empty() {
        return Err(DbError::InvalidOperationPayload(
            "update must change at least one field".to_string(),
        ));
    }

    Ok(Json::Object(update))
}

fn negate_json_number(value: &Value) -> Json {
    match value_to_json(value) {
        Json::Number(n) => {
            if let Some(i) = n.as_i64() {
                json!(-i)
            } else if let Some(f) = n.as_f64() {
                json!(-f)
            } else {
                Json::Number(n)
            }
        }
        other => other,
    }
}

/// Top-level entry point shared by `parse_update`/`parse_delete`: runs the
/// `Where*` operations through the same clause compiler `parse` uses for
/// `$match`, but returns the filter document directly rather than wrapping
/// it in a stage.
fn build_filter(operations: &[Operation]) -> Result<Json, DbError> {
    let mut builder = PipelineBuilder::new("");
    builder.collect_filter_groups(operations)?;
    Ok(builder.filter_document())
}

/// Accumulates pipeline stages for a single `parse()` pass. Clauses that
/// narrow rows (`Where*`) are gathered into precedence-respecting groups and
/// flushed as one `$match` stage as soon as a non-filter operation breaks
/// the run, mirroring how SQL evaluates `AND` before `OR` rather than
/// emitting one `$match` per clause.
struct PipelineBuilder {
    table: String,
    stages: Vec<Json>,
    groups: Vec<Vec<Json>>,
    select: Vec<String>,
    deselect: Vec<String>,
    sorts: Vec<(String, i32)>,
    group_by: Vec<String>,
    having: Vec<Json>,
    distinct: bool,
}

impl PipelineBuilder {
    fn new(table: &str) -> Self {
        Self {
            table: table.to_string(),
            stages: Vec::new(),
            groups: vec![Vec::new()],
            select: Vec::new(),
            deselect: Vec::new(),
            sorts: Vec::new(),
            group_by: Vec::new(),
            having: Vec::new(),
            distinct: false,
        }
    }

    fn apply(&mut self, operations: &[Operation]) -> Result<(), DbError> {
        for operation in operations {
            match operation {
                Operation::Where { .. }
                | Operation::WhereRaw { .. }
                | Operation::WhereIn { .. }
                | Operation::WhereNull { .. }
                | Operation::WhereBetween { .. }
                | Operation::WhereLike { .. }
                | Operation::WhereColumn { .. }
                | Operation::WhereJsonContains { .. }
                | Operation::WhereJsonLength { .. }
                | Operation::WhereFullText { .. }
                | Operation::WhereExists { .. } => {
                    self.push_filter_operation(operation)?;
                }
                Operation::Select(columns) => self.select.extend(columns.clone()),
                Operation::SelectRaw(raw) => {
                    self.flush_match();
                    self.stages.push(parse_raw_stage(raw)?);
                }
                Operation::Deselect(columns) => self.deselect.extend(columns.clone()),
                Operation::SelectRelatedColumns { relation, alias } => {
                    self.flush_match();
                    self.stages.push(lookup_stage(relation, alias));
                }
                Operation::SelectDriverProjection(_) => {
                    // Relational-only capability; always a no-op here (DESIGN.md).
                }
                Operation::Join {
                    kind,
                    table,
                    first,
                    operator,
                    second,
                    alias,
                } => {
                    self.flush_match();
                    self.push_join(*kind, table, first, *operator, second, alias.as_deref())?;
                }
                Operation::JoinRaw(raw) => {
                    self.flush_match();
                    self.stages.push(parse_raw_stage(raw)?);
                }
                Operation::OrderBy { column, direction } => {
                    self.sorts.push((
                        column.clone(),
                        match direction {
                            SortDirection::Asc => 1,
                            SortDirection::Desc => -1,
                        },
                    ));
                }
                Operation::OrderByRaw(raw) => {
                    self.flush_match();
                    self.flush_project();
                    self.flush_sort();
                    self.stages.push(parse_raw_stage(raw)?);
                }
                Operation::GroupBy(columns) => self.group_by.extend(columns.clone()),
                Operation::Having {
                    column,
                    operator,
                    value,
                } => {
                    self.having
                        .push(comparison_document(column, *operator, value));
                }
                Operation::HavingRaw(raw) => {
                    self.having.push(parse_raw_document(raw)?);
                }
                Operation::Limit(count) => {
                    self.flush_match();
                    self.flush_group();
                    self.flush_project();
                    self.flush_sort();
                    self.stages.push(json!({ "$limit": count }));
                }
                Operation::Offset(count) => {
                    self.flush_match();
                    self.flush_group();
                    self.flush_project();
                    self.flush_sort();
                    self.stages.push(json!({ "$skip": count }));
                }
                Operation::Distinct(enabled) => self.distinct = *enabled,
                Operation::Has { relation, negate } => {
                    self.flush_match();
                    self.stages.push(lookup_stage(relation, relation));
                    self.stages.push(json!({
                        "$match": { format!("{}.0", relation): if *negate { json!({ "$exists": false }) } else { json!({ "$exists": true }) } }
                    }));
                    self.stages.push(json!({ "$unset": relation }));
                }
                Operation::WhereHas {
                    relation,
                    constraint,
                    negate,
                    ..
                } => {
                    self.flush_match();
                    self.stages.push(lookup_stage(relation, relation));
                    if constraint.is_some() {
                        return Err(DbError::NotSupported(
                            "whereHas with an inline constraint closure is not supported by the Mongo driver yet"
                                .to_string(),
                        ));
                    }
                    self.stages.push(json!({
                        "$match": { format!("{}.0", relation): if *negate { json!({ "$exists": false }) } else { json!({ "$exists": true }) } }
                    }));
                    self.stages.push(json!({ "$unset": relation }));
                }
            }
        }
        Ok(())
    }

    /// Same filter-accumulation pass as `apply`, but used by
    /// `parse_update`/`parse_delete`, which only ever see `Where*`
    /// operations and need the raw filter document, not a pipeline stage.
    fn collect_filter_groups(&mut self, operations: &[Operation]) -> Result<(), DbError> {
        for operation in operations {
            self.push_filter_operation(operation)?;
        }
        Ok(())
    }

    fn push_filter_operation(&mut self, operation: &Operation) -> Result<(), DbError> {
        let (connector, document) = filter_clause(operation)?;
        if matches!(connector, Connector::Or) && !self.groups.last().unwrap().is_empty() {
            self.groups.push(Vec::new());
        }
        self.groups.last_mut().unwrap().push(document);
        Ok(())
    }

    /// Combines the accumulated precedence groups into one filter document,
    /// grouping consecutive `AND`-joined clauses together before `OR`-ing
    /// the groups — the same precedence SQL gives `AND`/`OR` natively.
    fn filter_document(&self) -> Json {
        let non_empty: Vec<&Vec<Json>> = self.groups.iter().filter(|g| !g.is_empty()).collect();
        if non_empty.is_empty() {
            return Json::Object(Map::new());
        }
        if non_empty.len() == 1 {
            return fold_and(non_empty[0]);
        }
        let branches: Vec<Json> = non_empty.iter().map(|g| fold_and(g)).collect();
        json!({ "$or": branches })
    }

    fn flush_match(&mut self) {
        let filter = self.filter_document();
        if let Json::Object(map) = &filter {
            if !map.is_empty() {
                self.stages.push(json!({ "$match": filter }));
            }
        }
        self.groups = vec![Vec::new()];
    }

    fn flush_project(&mut self) {
        if self.select.is_empty() && self.deselect.is_empty() {
            return;
        }
        let mut projection = Map::new();
        for column in &self.select {
            projection.insert(column.clone(), json!(1));
        }
        for column in &self.deselect {
            projection.insert(column.clone(), json!(0));
        }
        self.stages.push(json!({ "$project": projection }));
        self.select.clear();
        self.deselect.clear();
    }

    fn flush_sort(&mut self) {
        if self.sorts.is_empty() {
            return;
        }
        let mut sort = Map::new();
        for (column, direction) in &self.sorts {
            sort.insert(column.clone(), json!(direction));
        }
        self.stages.push(json!({ "$sort": sort }));
        self.sorts.clear();
    }

    fn flush_group(&mut self) {
        if self.group_by.is_empty() {
            if self.distinct && !self.stages.is_empty() {
                self.stages.push(json!({
                    "$group": { "_id": "$$ROOT" }
                }));
                self.stages.push(json!({ "$replaceRoot": { "newRoot": "$_id" } }));
                self.distinct = false;
            }
            return;
        }

        let mut id = Map::new();
        for column in &self.group_by {
            id.insert(column.clone(), json!(format!("${}", column)));
        }
        self.stages.push(json!({
            "$group": { "_id": id, "doc": { "$first": "$$ROOT" } }
        }));
        self.stages
            .push(json!({ "$replaceRoot": { "newRoot": "$doc" } }));
        self.group_by.clear();

        if !self.having.is_empty() {
            let filter = fold_and(&self.having);
            self.stages.push(json!({ "$match": filter }));
            self.having.clear();
        }
    }

    fn push_join(
        &mut self,
        kind: JoinKind,
        table: &str,
        first: &str,
        operator: ComparisonOperator,
        second: &str,
        alias: Option<&str>,
    ) -> Result<(), DbError> {
        if matches!(kind, JoinKind::Right | JoinKind::Full | JoinKind::Cross) {
            return Err(DbError::NotSupported(format!(
                "{:?} joins have no native aggregation-pipeline equivalent",
                kind
            )));
        }

        let as_field = alias.unwrap_or(table).to_string();
        let local_field = strip_table_prefix(&self.table, first);
        let foreign_field = strip_table_prefix(table, second);

        if !matches!(operator, ComparisonOperator::Eq) {
            self.stages.push(json!({
                "$lookup": {
                    "from": table,
                    "let": { "local_join_value": format!("${}", local_field) },
                    "pipeline": [
                        { "$match": { "$expr": comparison_expr(operator, "$$local_join_value", format!("${}", foreign_field)) } }
                    ],
                    "as": as_field,
                }
            }));
        } else {
            self.stages.push(json!({
                "$lookup": {
                    "from": table,
                    "localField": local_field,
                    "foreignField": foreign_field,
                    "as": as_field,
                }
            }));
        }

        if matches!(kind, JoinKind::Inner) {
            self.stages
                .push(json!({ "$unwind": format!("${}", as_field) }));
        } else {
            self.stages.push(json!({
                "$unwind": { "path": format!("${}", as_field), "preserveNullAndEmptyArrays": true }
            }));
        }

        Ok(())
    }

    fn finish(mut self) -> Vec<Json> {
        self.flush_match();
        self.flush_group();
        self.flush_project();
        self.flush_sort();
        if self.distinct {
            self.stages.push(json!({ "$group": { "_id": "$$ROOT" } }));
            self.stages
                .push(json!({ "$replaceRoot": { "newRoot": "$_id" } }));
        }
        self.stages
    }
}

fn fold_and(clauses: &[Json]) -> Json {
    if clauses.len() == 1 {
        return clauses[0].clone();
    }
    json!({ "$and": clauses })
}

fn comparison_document(column: &str, operator: ComparisonOperator, value: &Value) -> Json {
    let rendered = value_to_json(value);
    match operator {
        ComparisonOperator::Eq => json!({ column: rendered }),
        ComparisonOperator::Ne => json!({ column: { "$ne": rendered } }),
        ComparisonOperator::Lt => json!({ column: { "$lt": rendered } }),
        ComparisonOperator::Lte => json!({ column: { "$lte": rendered } }),
        ComparisonOperator::Gt => json!({ column: { "$gt": rendered } }),
        ComparisonOperator::Gte => json!({ column: { "$gte": rendered } }),
    }
}

fn comparison_expr(operator: ComparisonOperator, left: impl Into<Json>, right: impl Into<Json>) -> Json {
    let op = match operator {
        ComparisonOperator::Eq => "$eq",
        ComparisonOperator::Ne => "$ne",
        ComparisonOperator::Lt => "$lt",
        ComparisonOperator::Lte => "$lte",
        ComparisonOperator::Gt => "$gt",
        ComparisonOperator::Gte => "$gte",
    };
    json!({ op: [left.into(), right.into()] })
}

/// Compiles one `Where*` operation into a `(connector, match-fragment)`
/// pair. The connector says how this fragment joins the previous one; the
/// fragment itself never carries `$and`/`$or` — that's applied by the
/// caller once the whole group is known.
fn filter_clause(operation: &Operation) -> Result<(Connector, Json), DbError> {
    match operation {
        Operation::Where {
            connector,
            column,
            operator,
            value,
        } => Ok((*connector, comparison_document(column, *operator, value))),
        Operation::WhereRaw {
            connector,
            sql,
            bindings,
        } => Ok((*connector, substitute_raw_filter(sql, bindings)?)),
        Operation::WhereIn {
            connector,
            column,
            values,
            negate,
        } => {
            let rendered: Vec<Json> = values.iter().map(value_to_json).collect();
            let op = if *negate { "$nin" } else { "$in" };
            Ok((*connector, json!({ column: { op: rendered } })))
        }
        Operation::WhereNull {
            connector,
            column,
            negate,
        } => {
            let condition = if *negate {
                json!({ "$ne": Json::Null })
            } else {
                json!({ "$eq": Json::Null })
            };
            Ok((*connector, json!({ column: condition })))
        }
        Operation::WhereBetween {
            connector,
            column,
            low,
            high,
            negate,
        } => {
            let range = json!({ "$gte": value_to_json(low), "$lte": value_to_json(high) });
            if *negate {
                Ok((*connector, json!({ column: { "$not": range } })))
            } else {
                Ok((*connector, json!({ column: range })))
            }
        }
        Operation::WhereLike {
            connector,
            column,
            pattern,
            case_insensitive,
            negate,
        } => {
            let regex = like_pattern_to_regex(pattern);
            let options = if *case_insensitive { "i" } else { "" };
            let condition = json!({ "$regex": regex, "$options": options });
            if *negate {
                Ok((*connector, json!({ column: { "$not": condition } })))
            } else {
                Ok((*connector, json!({ column: condition })))
            }
        }
        Operation::WhereColumn {
            connector,
            first,
            operator,
            second,
        } => Ok((
            *connector,
            json!({ "$expr": comparison_expr(*operator, format!("${}", first), format!("${}", second)) }),
        )),
        Operation::WhereJsonContains {
            connector,
            column,
            path,
            value,
        } => {
            let field = match path {
                Some(p) => format!("{}.{}", column, p),
                None => column.clone(),
            };
            Ok((*connector, json!({ field: value_to_json(value) })))
        }
        Operation::WhereJsonLength {
            connector,
            column,
            path,
            operator,
            value,
        } => {
            let field = match path {
                Some(p) => format!("{}.{}", column, p),
                None => column.clone(),
            };
            Ok((
                *connector,
                json!({ "$expr": comparison_expr(*operator, json!({ "$size": format!("${}", field) }), json!(value)) }),
            ))
        }
        Operation::WhereFullText {
            connector,
            columns: _,
            query,
        } => Ok((*connector, json!({ "$text": { "$search": query } }))),
        Operation::WhereExists { .. } => Err(DbError::NotSupported(
            "whereExists subqueries are not supported by the Mongo driver; use whereHas instead".to_string(),
        )),
        other => Err(DbError::InvalidOperationPayload(format!(
            "{:?} is not a filter operation",
            other
        ))),
    }
}

/// Translates a SQL `LIKE` pattern (`%`/`_` wildcards, no native escaping in
/// the source grammar) into an anchored regex.
fn like_pattern_to_regex(pattern: &str) -> String {
    let mut regex = String::from("^");
    for ch in pattern.chars() {
        match ch {
            '%' => regex.push_str(".*"),
            '_' => regex.push('.'),
            c if "\\.*+?()[]{}|^$".contains(c) => {
                regex.push('\\');
                regex.push(c);
            }
            c => regex.push(c),
        }
    }
    regex.push('$');
    regex
}

fn lookup_stage(relation: &str, alias: &str) -> Json {
    json!({
        "$lookup": {
            "from": relation,
            "localField": format!("{}_id", singularize(relation)),
            "foreignField": "_id",
            "as": alias,
        }
    })
}

fn singularize(table: &str) -> &str {
    table.strip_suffix('s').unwrap_or(table)
}

fn strip_table_prefix(table: &str, field: &str) -> String {
    field
        .strip_prefix(&format!("{}.", table))
        .unwrap_or(field)
        .to_string()
}

/// Parses a `*Raw` operation's text as literal JSON, substituting `?`
/// placeholders positionally the same way the relational parser splices
/// raw SQL bindings — mirrors `Compiler::substitute_raw` but for JSON
/// instead of SQL text (DESIGN.md Open Questions).
fn parse_raw_stage(text: &str) -> Result<Json, DbError> {
    serde_json::from_str(text)
        .map_err(|e| DbError::InvalidOperationPayload(format!("invalid raw pipeline stage: {}", e)))
}

fn parse_raw_document(text: &str) -> Result<Json, DbError> {
    parse_raw_stage(text)
}

fn substitute_raw_filter(sql: &str, bindings: &[Value]) -> Result<Json, DbError> {
    if bindings.is_empty() {
        return parse_raw_stage(sql);
    }
    let mut rendered = String::new();
    let mut binding_iter = bindings.iter();
    for ch in sql.chars() {
        if ch == '?' {
            let value = binding_iter
                .next()
                .ok_or_else(|| DbError::InvalidOperationPayload("not enough bindings for raw filter".to_string()))?;
            rendered.push_str(&value_to_json(value).to_string());
        } else {
            rendered.push(ch);
        }
    }
    parse_raw_stage(&rendered)
}

#[cfg(test)]
mod tests {
    use super::*;
    use cascade_core::QueryBuilder;

    #[test]
    fn simple_where_compiles_to_match_stage() {
        let parser = MongoQueryParser;
        let mut builder = QueryBuilder::new("users");
        builder.where_("status", ComparisonOperator::Eq, Value::Text("active".into()));
        let compiled = parser.parse("users", builder.operations()).unwrap();
        match compiled {
            CompiledQuery::Pipeline { collection, stages } => {
                assert_eq!(collection, "users");
                assert_eq!(stages.len(), 1);
                assert_eq!(stages[0]["$match"]["status"], json!("active"));
            }
            _ => panic!("expected pipeline"),
        }
    }

    #[test]
    fn or_clauses_group_by_precedence() {
        let parser = MongoQueryParser;
        let mut builder = QueryBuilder::new("t");
        builder
            .where_("a", ComparisonOperator::Eq, Value::Int(1))
            .or_where("b", ComparisonOperator::Eq, Value::Int(2))
            .where_("c", ComparisonOperator::Eq, Value::Int(3));
        let compiled = parser.parse("t", builder.operations()).unwrap();
        match compiled {
            CompiledQuery::Pipeline { stages, .. } => {
                let filter = &stages[0]["$match"];
                assert!(filter.get("$or").is_some());
            }
            _ => panic!("expected pipeline"),
        }
    }

    #[test]
    fn update_uses_marker_stage() {
        let parser = MongoQueryParser;
        let mut builder = QueryBuilder::new("users");
        builder.where_("id", ComparisonOperator::Eq, Value::Int(1));
        let changes = vec![("name".to_string(), UpdateOp::Set(Value::Text("a".into())))];
        let compiled = parser
            .parse_update("users", builder.operations(), &changes)
            .unwrap();
        match compiled {
            CompiledQuery::Pipeline { stages, .. } => {
                assert_eq!(stages[0]["$cascadeOp"], json!("update"));
                assert_eq!(stages[0]["update"]["$set"]["name"], json!("a"));
            }
            _ => panic!("expected pipeline"),
        }
    }

    #[test]
    fn like_pattern_translates_to_anchored_regex() {
        assert_eq!(like_pattern_to_regex("foo%"), "^foo.*$");
        assert_eq!(like_pattern_to_regex("f_o"), "^f.o$");
    }
}
