//! Builds parameterized SELECT, INSERT, UPDATE, DELETE and aggregate statements from entity declarations.

use crate::error::AppError;
use crate::query::{FindOperator, FindOptions, Where};
use crate::schema::{quoted, ColumnDef, EntityDef, Generated, JoinSide, Model, RelationDef};
use serde_json::Value;

const MAIN_ALIAS: &str = "main";
const REL_ALIAS: &str = "r";
const JOIN_ALIAS: &str = "j";

#[derive(Debug)]
pub struct QueryBuf {
    pub sql: String,
    pub params: Vec<Value>,
}

impl QueryBuf {
    fn new() -> Self {
        QueryBuf {
            sql: String::new(),
            params: Vec::new(),
        }
    }

    fn push_param(&mut self, v: Value) -> u32 {
        let n = self.params.len() as u32 + 1;
        self.params.push(v);
        n
    }

    /// Placeholder with a cast to the column type, e.g. `$2::integer`.
    fn placeholder(&mut self, v: Value, cast: &str) -> String {
        let n = self.push_param(v);
        format!("${}::{}", n, cast)
    }
}

/// One column value written by INSERT or UPDATE.
#[derive(Clone, Debug)]
pub struct Assignment {
    pub column: &'static str,
    pub cast: String,
    pub value: Value,
}

impl Assignment {
    pub fn for_column(c: &ColumnDef, value: Value) -> Self {
        Assignment {
            column: c.column,
            cast: c.ty.cast(),
            value,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Aggregate {
    Sum,
    Average,
    Minimum,
    Maximum,
}

impl Aggregate {
    fn sql_fn(&self) -> &'static str {
        match self {
            Aggregate::Sum => "SUM",
            Aggregate::Average => "AVG",
            Aggregate::Minimum => "MIN",
            Aggregate::Maximum => "MAX",
        }
    }
}

fn qualified(alias: &str, column: &str) -> String {
    format!("{}.{}", alias, quoted(column))
}

fn column_or_err<'a>(entity: &'a EntityDef, property: &str) -> Result<&'a ColumnDef, AppError> {
    entity
        .find_column(property)
        .ok_or_else(|| AppError::Validation(format!("{} has no field '{}'", entity.name, property)))
}

/// `json_build_object('id', r."id", ...)` over the given columns.
fn json_object(alias: &str, cols: &[&ColumnDef]) -> String {
    let pairs: Vec<String> = cols
        .iter()
        .map(|c| format!("'{}', {}", c.property, qualified(alias, c.column)))
        .collect();
    format!("json_build_object({})", pairs.join(", "))
}

fn predicate(q: &mut QueryBuf, col: &str, cast: &str, op: &FindOperator) -> String {
    match op {
        FindOperator::Equal(v) => format!("{} = {}", col, q.placeholder(v.clone(), cast)),
        FindOperator::Not(inner) => format!("NOT ({})", predicate(q, col, cast, inner)),
        FindOperator::LessThan(v) => format!("{} < {}", col, q.placeholder(v.clone(), cast)),
        FindOperator::LessThanOrEqual(v) => format!("{} <= {}", col, q.placeholder(v.clone(), cast)),
        FindOperator::MoreThan(v) => format!("{} > {}", col, q.placeholder(v.clone(), cast)),
        FindOperator::MoreThanOrEqual(v) => format!("{} >= {}", col, q.placeholder(v.clone(), cast)),
        FindOperator::Like(p) => format!(
            "{}::text LIKE {}",
            col,
            q.placeholder(Value::String(p.clone()), "text")
        ),
        FindOperator::ILike(p) => format!(
            "{}::text ILIKE {}",
            col,
            q.placeholder(Value::String(p.clone()), "text")
        ),
        FindOperator::Between(lo, hi) => {
            let lo = q.placeholder(lo.clone(), cast);
            let hi = q.placeholder(hi.clone(), cast);
            format!("{} BETWEEN {} AND {}", col, lo, hi)
        }
        FindOperator::In(values) => {
            if values.is_empty() {
                return "FALSE".into();
            }
            let phs: Vec<String> = values.iter().map(|v| q.placeholder(v.clone(), cast)).collect();
            format!("{} IN ({})", col, phs.join(", "))
        }
        FindOperator::IsNull => format!("{} IS NULL", col),
    }
}

/// Comparison values must cast to the column type. Patterns are matched against the text form.
fn check_operands(c: &ColumnDef, op: &FindOperator) -> Result<(), AppError> {
    match op {
        FindOperator::Equal(v)
        | FindOperator::LessThan(v)
        | FindOperator::LessThanOrEqual(v)
        | FindOperator::MoreThan(v)
        | FindOperator::MoreThanOrEqual(v) => c.check_operand(v),
        FindOperator::Between(lo, hi) => {
            c.check_operand(lo)?;
            c.check_operand(hi)
        }
        FindOperator::In(values) => values.iter().try_for_each(|v| c.check_operand(v)),
        FindOperator::Not(inner) => check_operands(c, inner),
        FindOperator::Like(_) | FindOperator::ILike(_) | FindOperator::IsNull => Ok(()),
    }
}

/// ` WHERE (a AND b) OR (c)`, or empty when there is nothing to filter.
fn where_clause(q: &mut QueryBuf, entity: &EntityDef, filter: &Where) -> Result<String, AppError> {
    let mut groups = Vec::new();
    for group in filter.0.iter().filter(|g| !g.0.is_empty()) {
        let mut parts = Vec::new();
        for (field, op) in &group.0 {
            let c = column_or_err(entity, field)?;
            check_operands(c, op)?;
            parts.push(predicate(q, &qualified(MAIN_ALIAS, c.column), &c.ty.cast(), op));
        }
        groups.push(format!("({})", parts.join(" AND ")));
    }
    Ok(if groups.is_empty() {
        String::new()
    } else {
        format!(" WHERE {}", groups.join(" OR "))
    })
}

/// Relations to load and the columns to return for the root and each relation.
struct Projection<'a> {
    root: Vec<&'a ColumnDef>,
    relations: Vec<(&'a RelationDef, &'a EntityDef, Vec<&'a ColumnDef>)>,
}

fn projection<'a>(model: &'a Model, entity: &'a EntityDef, opts: &FindOptions) -> Result<Projection<'a>, AppError> {
    let mut loaded: Vec<&RelationDef> = Vec::new();
    for name in &opts.relations {
        let rel = entity
            .find_relation(name)
            .ok_or_else(|| AppError::Validation(format!("{} has no relation '{}'", entity.name, name)))?;
        loaded.push(rel);
    }
    for rel in entity.relations.iter().filter(|r| r.eager) {
        if !loaded.iter().any(|l| l.name == rel.name) {
            loaded.push(rel);
        }
    }

    let mut root = Vec::new();
    let mut nested: Vec<(&RelationDef, Option<Vec<&ColumnDef>>)> = loaded.iter().map(|r| (*r, None)).collect();
    match &opts.select {
        None => root.extend(entity.default_projection()),
        Some(paths) => {
            for path in paths {
                if let Some((rel_name, prop)) = path.split_once('.') {
                    let slot = nested.iter_mut().find(|(r, _)| r.name == rel_name).ok_or_else(|| {
                        AppError::Validation(format!("select '{}' requires relation '{}'", path, rel_name))
                    })?;
                    let target = model.target(slot.0)?;
                    let c = column_or_err(target, prop)?;
                    slot.1.get_or_insert_with(Vec::new).push(c);
                } else if nested.iter().any(|(r, _)| r.name == path.as_str()) {
                    continue;
                } else {
                    root.push(column_or_err(entity, path)?);
                }
            }
        }
    }

    let mut relations = Vec::new();
    for (rel, cols) in nested {
        let target = model.target(rel)?;
        let cols = cols.unwrap_or_else(|| target.default_projection().collect());
        relations.push((rel, target, cols));
    }
    Ok(Projection { root, relations })
}

/// Scalar subquery rendering one relation of the main row as JSON.
fn relation_subquery(entity: &EntityDef, rel: &RelationDef, target: &EntityDef, cols: &[&ColumnDef]) -> String {
    let object = json_object(REL_ALIAS, cols);
    let table = quoted(target.table);
    let target_pk = qualified(REL_ALIAS, target.primary().column);
    let own_pk = qualified(MAIN_ALIAS, entity.primary().column);
    let (from, cond) = match &rel.join {
        JoinSide::Owner { column } => (
            format!("{} {}", table, REL_ALIAS),
            format!("{} = {}", target_pk, qualified(MAIN_ALIAS, column)),
        ),
        JoinSide::Inverse { column } => (
            format!("{} {}", table, REL_ALIAS),
            format!("{} = {}", qualified(REL_ALIAS, column), own_pk),
        ),
        JoinSide::Table {
            table: join_table,
            own_column,
            target_column,
        } => (
            format!(
                "{} {} JOIN {} {} ON {} = {}",
                table,
                REL_ALIAS,
                quoted(join_table),
                JOIN_ALIAS,
                qualified(JOIN_ALIAS, target_column),
                target_pk
            ),
            format!("{} = {}", qualified(JOIN_ALIAS, own_column), own_pk),
        ),
    };
    if rel.is_to_many() {
        format!(
            "(SELECT COALESCE(json_agg({} ORDER BY {}), '[]'::json) FROM {} WHERE {})",
            object, target_pk, from, cond
        )
    } else {
        format!("(SELECT {} FROM {} WHERE {} LIMIT 1)", object, from, cond)
    }
}

/// SELECT one JSON object per matching row, with requested and eager relations embedded.
pub fn select_find(model: &Model, entity: &EntityDef, opts: &FindOptions) -> Result<QueryBuf, AppError> {
    let mut q = QueryBuf::new();
    let proj = projection(model, entity, opts)?;

    let mut pairs: Vec<String> = proj
        .root
        .iter()
        .map(|c| format!("'{}', {}", c.property, qualified(MAIN_ALIAS, c.column)))
        .collect();
    for (rel, target, cols) in &proj.relations {
        pairs.push(format!("'{}', {}", rel.name, relation_subquery(entity, rel, target, cols)));
    }

    let where_sql = where_clause(&mut q, entity, &opts.filter)?;

    let mut order_parts = Vec::new();
    for (field, dir) in &opts.order {
        let c = column_or_err(entity, field)?;
        order_parts.push(format!("{} {}", qualified(MAIN_ALIAS, c.column), dir.as_sql()));
    }
    if order_parts.is_empty() {
        order_parts.push(format!("{} ASC", qualified(MAIN_ALIAS, entity.primary().column)));
    }

    let limit_clause = if opts.take > 0 {
        format!(" LIMIT {}", opts.take)
    } else {
        String::new()
    };
    let offset_clause = if opts.skip > 0 {
        format!(" OFFSET {}", opts.skip)
    } else {
        String::new()
    };

    q.sql = format!(
        "SELECT json_build_object({}) AS \"row\" FROM {} {}{} ORDER BY {}{}{}",
        pairs.join(", "),
        quoted(entity.table),
        MAIN_ALIAS,
        where_sql,
        order_parts.join(", "),
        limit_clause,
        offset_clause
    );
    Ok(q)
}

/// SELECT COUNT(*) over the filter, ignoring pagination.
pub fn count(entity: &EntityDef, filter: &Where) -> Result<QueryBuf, AppError> {
    let mut q = QueryBuf::new();
    let where_sql = where_clause(&mut q, entity, filter)?;
    q.sql = format!("SELECT COUNT(*) FROM {} {}{}", quoted(entity.table), MAIN_ALIAS, where_sql);
    Ok(q)
}

/// Aggregate over a numeric field. SUM of nothing is 0; the others stay NULL.
pub fn aggregate(entity: &EntityDef, func: Aggregate, field: &str, filter: &Where) -> Result<QueryBuf, AppError> {
    let c = column_or_err(entity, field)?;
    if !c.ty.is_numeric() {
        return Err(AppError::Validation(format!("{} is not numeric", field)));
    }
    let mut q = QueryBuf::new();
    let where_sql = where_clause(&mut q, entity, filter)?;
    let expr = format!("{}({})", func.sql_fn(), qualified(MAIN_ALIAS, c.column));
    let expr = if func == Aggregate::Sum {
        format!("COALESCE({}, 0)", expr)
    } else {
        expr
    };
    q.sql = format!(
        "SELECT ({})::float8 FROM {} {}{}",
        expr,
        quoted(entity.table),
        MAIN_ALIAS,
        where_sql
    );
    Ok(q)
}

/// INSERT the given values, letting the database fill the rest. Returns the new primary key.
pub fn insert(entity: &EntityDef, values: &[Assignment]) -> QueryBuf {
    let mut q = QueryBuf::new();
    let table = quoted(entity.table);
    let pk = quoted(entity.primary().column);
    if values.is_empty() {
        q.sql = format!("INSERT INTO {} DEFAULT VALUES RETURNING {}", table, pk);
        return q;
    }
    let mut cols = Vec::new();
    let mut placeholders = Vec::new();
    for a in values {
        cols.push(quoted(a.column));
        placeholders.push(q.placeholder(a.value.clone(), &a.cast));
    }
    q.sql = format!(
        "INSERT INTO {} ({}) VALUES ({}) RETURNING {}",
        table,
        cols.join(", "),
        placeholders.join(", "),
        pk
    );
    q
}

/// SET clauses that every update carries: version bump and update timestamp.
fn generated_sets(entity: &EntityDef) -> Vec<String> {
    let mut sets = Vec::new();
    if let Some(v) = entity.find_column_by_generated(Generated::Version) {
        let col = quoted(v.column);
        sets.push(format!("{} = {} + 1", col, qualified(MAIN_ALIAS, v.column)));
    }
    if let Some(u) = entity.find_column_by_generated(Generated::UpdateDate) {
        sets.push(format!("{} = NOW()", quoted(u.column)));
    }
    sets
}

/// UPDATE by id. With `expected_version`, only a row still at that version is touched.
/// Returns the primary key when a row was updated.
pub fn update(entity: &EntityDef, id: &Value, values: &[Assignment], expected_version: Option<i64>) -> QueryBuf {
    let mut q = QueryBuf::new();
    let pk = entity.primary();
    let mut sets: Vec<String> = values
        .iter()
        .map(|a| format!("{} = {}", quoted(a.column), q.placeholder(a.value.clone(), &a.cast)))
        .collect();
    sets.extend(generated_sets(entity));
    let mut cond = format!(
        "{} = {}",
        qualified(MAIN_ALIAS, pk.column),
        q.placeholder(id.clone(), &pk.ty.cast())
    );
    if let (Some(expected), Some(v)) = (expected_version, entity.find_column_by_generated(Generated::Version)) {
        cond.push_str(&format!(
            " AND {} = {}",
            qualified(MAIN_ALIAS, v.column),
            q.placeholder(Value::from(expected), "integer")
        ));
    }
    q.sql = format!(
        "UPDATE {} AS {} SET {} WHERE {} RETURNING {}",
        quoted(entity.table),
        MAIN_ALIAS,
        sets.join(", "),
        cond,
        qualified(MAIN_ALIAS, pk.column)
    );
    q
}

/// Add `by` to a numeric field of every matching row.
pub fn increment(entity: &EntityDef, field: &str, by: i32, filter: &Where) -> Result<QueryBuf, AppError> {
    let c = column_or_err(entity, field)?;
    if !c.ty.is_numeric() || !c.is_writable() {
        return Err(AppError::Validation(format!("{} cannot be incremented", field)));
    }
    let mut q = QueryBuf::new();
    let mut sets = vec![format!(
        "{} = {} + {}",
        quoted(c.column),
        qualified(MAIN_ALIAS, c.column),
        q.placeholder(Value::from(by), &c.ty.cast())
    )];
    sets.extend(generated_sets(entity));
    let where_sql = where_clause(&mut q, entity, filter)?;
    q.sql = format!(
        "UPDATE {} AS {} SET {}{}",
        quoted(entity.table),
        MAIN_ALIAS,
        sets.join(", "),
        where_sql
    );
    Ok(q)
}

/// DELETE by id. Caller binds the id as sole param.
pub fn delete(entity: &EntityDef, id: &Value) -> QueryBuf {
    let mut q = QueryBuf::new();
    let pk = entity.primary();
    let ph = q.placeholder(id.clone(), &pk.ty.cast());
    q.sql = format!("DELETE FROM {} WHERE {} = {}", quoted(entity.table), quoted(pk.column), ph);
    q
}

pub fn exists(entity: &EntityDef, id: &Value) -> QueryBuf {
    let mut q = QueryBuf::new();
    let pk = entity.primary();
    let ph = q.placeholder(id.clone(), &pk.ty.cast());
    q.sql = format!(
        "SELECT EXISTS(SELECT 1 FROM {} WHERE {} = {})",
        quoted(entity.table),
        quoted(pk.column),
        ph
    );
    q
}

/// Point `column` of the target row at `value` (used for inverse relations).
pub fn set_foreign_key(target: &EntityDef, target_id: &Value, column: &str, value: &Value, cast: &str) -> QueryBuf {
    let mut q = QueryBuf::new();
    let pk = target.primary();
    let set = q.placeholder(value.clone(), cast);
    let id = q.placeholder(target_id.clone(), &pk.ty.cast());
    q.sql = format!(
        "UPDATE {} SET {} = {} WHERE {} = {}",
        quoted(target.table),
        quoted(column),
        set,
        quoted(pk.column),
        id
    );
    q
}

/// Link two rows through a join table; existing links are kept.
pub fn link(table: &str, own_column: &str, target_column: &str, own_id: &Value, target_id: &Value) -> QueryBuf {
    let mut q = QueryBuf::new();
    let own = q.placeholder(own_id.clone(), "integer");
    let target = q.placeholder(target_id.clone(), "integer");
    q.sql = format!(
        "INSERT INTO {} ({}, {}) VALUES ({}, {}) ON CONFLICT DO NOTHING",
        quoted(table),
        quoted(own_column),
        quoted(target_column),
        own,
        target
    );
    q
}

/// Remove every join-table link of one row.
pub fn unlink_all(table: &str, own_column: &str, own_id: &Value) -> QueryBuf {
    let mut q = QueryBuf::new();
    let own = q.placeholder(own_id.clone(), "integer");
    q.sql = format!("DELETE FROM {} WHERE {} = {}", quoted(table), quoted(own_column), own);
    q
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::{Direction, WhereGroup};
    use crate::schema::{standard_model, POST, PROFILE, TAG, USER};
    use serde_json::json;

    fn find(entity: &str, opts: FindOptions) -> QueryBuf {
        let model = standard_model().unwrap();
        let e = model.entity(entity).unwrap();
        select_find(&model, e, &opts).unwrap()
    }

    fn find_err(entity: &str, opts: FindOptions) -> AppError {
        let model = standard_model().unwrap();
        let e = model.entity(entity).unwrap();
        select_find(&model, e, &opts).unwrap_err()
    }

    #[test]
    fn default_find_selects_every_selectable_column_ordered_by_pk() {
        let q = find(PROFILE, FindOptions::new());
        assert_eq!(
            q.sql,
            "SELECT json_build_object('id', main.\"id\", 'profileImg', main.\"profile_img\") AS \"row\" \
             FROM \"profile\" main ORDER BY main.\"id\" ASC"
        );
        assert!(q.params.is_empty());
    }

    #[test]
    fn take_zero_means_no_limit() {
        let q = find(USER, FindOptions::new().take(0).skip(0));
        assert!(!q.sql.contains("LIMIT"));
        assert!(!q.sql.contains("OFFSET"));

        let q = find(USER, FindOptions::new().take(1).skip(2).order_by("id", Direction::Desc));
        assert!(q.sql.ends_with("ORDER BY main.\"id\" DESC LIMIT 1 OFFSET 2"), "{}", q.sql);
    }

    #[test]
    fn projection_returns_exactly_the_named_fields() {
        let q = find(
            USER,
            FindOptions::new().select(["id", "email", "profile.id"]).relation("profile"),
        );
        assert!(q.sql.starts_with(
            "SELECT json_build_object('id', main.\"id\", 'email', main.\"email\", 'profile', \
             (SELECT json_build_object('id', r.\"id\") FROM \"profile\" r WHERE r.\"id\" = main.\"profile_id\" LIMIT 1))"
        ), "{}", q.sql);
        assert!(!q.sql.contains("version"));
    }

    #[test]
    fn hidden_columns_are_left_out_by_default() {
        let q = find("Teacher", FindOptions::new());
        assert!(!q.sql.contains("salary"));
        let q = find("Teacher", FindOptions::new().select(["id", "salary"]));
        assert!(q.sql.contains("'salary', main.\"salary\""));
    }

    #[test]
    fn nested_select_requires_the_relation() {
        let err = find_err(USER, FindOptions::new().select(["profile.id"]));
        assert!(matches!(err, AppError::Validation(_)));
    }

    #[test]
    fn relations_are_only_loaded_when_asked() {
        let q = find(USER, FindOptions::new());
        assert!(!q.sql.contains("'profile'"));
        assert!(!q.sql.contains("'posts'"));

        let q = find(USER, FindOptions::new().relation("posts"));
        assert!(q.sql.contains(
            "'posts', (SELECT COALESCE(json_agg(json_build_object('id', r.\"id\", 'title', r.\"title\") \
             ORDER BY r.\"id\"), '[]'::json) FROM \"post\" r WHERE r.\"author_id\" = main.\"id\")"
        ), "{}", q.sql);
    }

    #[test]
    fn eager_relations_are_always_loaded() {
        let q = find(POST, FindOptions::new());
        assert!(q.sql.contains(
            "'tags', (SELECT COALESCE(json_agg(json_build_object('id', r.\"id\", 'name', r.\"name\") \
             ORDER BY r.\"id\"), '[]'::json) FROM \"tag\" r JOIN \"post_tags\" j ON j.\"tag_id\" = r.\"id\" \
             WHERE j.\"post_id\" = main.\"id\")"
        ), "{}", q.sql);
    }

    #[test]
    fn many_to_many_works_from_the_other_side() {
        let q = find(TAG, FindOptions::new().relation("posts"));
        assert!(q.sql.contains("JOIN \"post_tags\" j ON j.\"post_id\" = r.\"id\" WHERE j.\"tag_id\" = main.\"id\""));
    }

    #[test]
    fn inverse_one_to_one_uses_the_owner_column() {
        let q = find(PROFILE, FindOptions::new().relation("user").select(["id", "user.email"]));
        assert!(q.sql.contains(
            "(SELECT json_build_object('email', r.\"email\") FROM \"user\" r WHERE r.\"profile_id\" = main.\"id\" LIMIT 1)"
        ), "{}", q.sql);
    }

    #[test]
    fn unknown_fields_are_validation_errors() {
        assert!(matches!(find_err(USER, FindOptions::new().select(["nope"])), AppError::Validation(_)));
        assert!(matches!(find_err(USER, FindOptions::new().relation("nope")), AppError::Validation(_)));
        assert!(matches!(
            find_err(USER, FindOptions::new().order_by("nope", Direction::Asc)),
            AppError::Validation(_)
        ));
        assert!(matches!(
            find_err(USER, FindOptions::new().filter(WhereGroup::new().and("nope", FindOperator::IsNull))),
            AppError::Validation(_)
        ));
    }

    #[test]
    fn every_operator_renders_with_casts() {
        let g = WhereGroup::new()
            .and("id", FindOperator::not(FindOperator::Equal(json!(3))))
            .and("version", FindOperator::Between(json!(1), json!(4)))
            .and("count", FindOperator::In(vec![json!(1), json!(3)]))
            .and("email", FindOperator::ILike("%ai0".into()))
            .and("role", FindOperator::Equal(json!("admin")))
            .and("createdAt", FindOperator::LessThan(json!("2030-01-01T00:00:00Z")))
            .and("updatedAt", FindOperator::IsNull);
        let q = find(USER, FindOptions::new().select(["id"]).filter(g));
        // BTreeMap keys are visited in order: count, createdAt, email, id, role, updatedAt, version.
        assert!(q.sql.contains(
            " WHERE (main.\"count\" IN ($1::integer, $2::integer) \
             AND main.\"created_at\" < $3::timestamptz \
             AND main.\"email\"::text ILIKE $4::text \
             AND NOT (main.\"id\" = $5::integer) \
             AND main.\"role\" = $6::\"user_role_enum\" \
             AND main.\"updated_at\" IS NULL \
             AND main.\"version\" BETWEEN $7::integer AND $8::integer)"
        ), "{}", q.sql);
        assert_eq!(q.params.len(), 8);
        assert_eq!(q.params[4], json!(3));
    }

    #[test]
    fn comparison_operators() {
        let cases = [
            (FindOperator::LessThanOrEqual(json!(4)), "main.\"id\" <= $1::integer"),
            (FindOperator::MoreThan(json!(3)), "main.\"id\" > $1::integer"),
            (FindOperator::MoreThanOrEqual(json!(3)), "main.\"id\" >= $1::integer"),
            (FindOperator::Like("%1".into()), "main.\"id\"::text LIKE $1::text"),
        ];
        for (op, expected) in cases {
            let q = find(USER, FindOptions::new().filter(WhereGroup::new().and("id", op)));
            assert!(q.sql.contains(expected), "{}", q.sql);
        }
    }

    #[test]
    fn groups_are_ored() {
        let w = Where(vec![
            WhereGroup::new().and("id", FindOperator::Equal(json!(1))),
            WhereGroup::new().and("version", FindOperator::Equal(json!(1))),
        ]);
        let q = find(USER, FindOptions::new().select(["id"]).filter(w));
        assert!(q
            .sql
            .contains(" WHERE (main.\"id\" = $1::integer) OR (main.\"version\" = $2::integer)"));
    }

    #[test]
    fn empty_in_matches_nothing() {
        let g = WhereGroup::new().and("id", FindOperator::In(vec![]));
        let q = find(USER, FindOptions::new().select(["id"]).filter(g));
        assert!(q.sql.contains(" WHERE (FALSE)"));
        assert!(q.params.is_empty());
    }

    #[test]
    fn filter_values_must_fit_the_column_type() {
        let bad = [
            ("id", FindOperator::Equal(json!("abc"))),
            ("id", FindOperator::Equal(json!(true))),
            ("count", FindOperator::Between(json!(1.5), json!(2))),
            ("count", FindOperator::In(vec![json!(1), json!("two")])),
            ("id", FindOperator::not(FindOperator::LessThan(json!(i64::from(i32::MAX) + 1)))),
            ("role", FindOperator::Equal(json!("root"))),
            ("createdAt", FindOperator::MoreThan(json!("yesterday"))),
            ("additionalId", FindOperator::Equal(json!("not-a-uuid"))),
        ];
        for (field, op) in bad {
            let err = find_err(USER, FindOptions::new().filter(WhereGroup::new().and(field, op.clone())));
            assert!(matches!(err, AppError::Validation(_)), "{} {:?}", field, op);
        }

        let ok = WhereGroup::new()
            .and("id", FindOperator::Like("1%".into()))
            .and("email", FindOperator::Equal(json!("a@b.c")));
        assert_eq!(find(USER, FindOptions::new().filter(ok)).params.len(), 2);
        let long_title = WhereGroup::new().and("title", FindOperator::Equal(json!("x".repeat(400))));
        assert_eq!(find(POST, FindOptions::new().filter(long_title)).params.len(), 1);
    }

    #[test]
    fn aggregates_handle_empty_sets_explicitly() {
        let model = standard_model().unwrap();
        let user = model.entity(USER).unwrap();
        let sum = aggregate(user, Aggregate::Sum, "count", &Where::all()).unwrap();
        assert_eq!(sum.sql, "SELECT (COALESCE(SUM(main.\"count\"), 0))::float8 FROM \"user\" main");
        let avg = aggregate(user, Aggregate::Average, "count", &Where::all()).unwrap();
        assert_eq!(avg.sql, "SELECT (AVG(main.\"count\"))::float8 FROM \"user\" main");
        assert!(aggregate(user, Aggregate::Maximum, "email", &Where::all()).is_err());

        let c = count(user, &WhereGroup::new().and("id", FindOperator::LessThan(json!(4))).into()).unwrap();
        assert_eq!(c.sql, "SELECT COUNT(*) FROM \"user\" main WHERE (main.\"id\" < $1::integer)");
    }

    #[test]
    fn insert_without_values_uses_defaults() {
        let model = standard_model().unwrap();
        let q = insert(model.entity(PROFILE).unwrap(), &[]);
        assert_eq!(q.sql, "INSERT INTO \"profile\" DEFAULT VALUES RETURNING \"id\"");
    }

    #[test]
    fn insert_casts_every_value() {
        let model = standard_model().unwrap();
        let user = model.entity(USER).unwrap();
        let values = vec![
            Assignment::for_column(user.find_column("email").unwrap(), json!("a@b.c")),
            Assignment::for_column(user.find_column("role").unwrap(), json!("user")),
        ];
        let q = insert(user, &values);
        assert_eq!(
            q.sql,
            "INSERT INTO \"user\" (\"email\", \"role\") VALUES ($1::text, $2::\"user_role_enum\") RETURNING \"id\""
        );
    }

    #[test]
    fn update_bumps_version_and_checks_the_expected_one() {
        let model = standard_model().unwrap();
        let user = model.entity(USER).unwrap();
        let values = vec![Assignment::for_column(user.find_column("email").unwrap(), json!("x0"))];
        let q = update(user, &json!(7), &values, Some(2));
        assert_eq!(
            q.sql,
            "UPDATE \"user\" AS main SET \"email\" = $1::text, \"version\" = main.\"version\" + 1, \
             \"updated_at\" = NOW() WHERE main.\"id\" = $2::integer AND main.\"version\" = $3::integer \
             RETURNING main.\"id\""
        );
        assert_eq!(q.params, vec![json!("x0"), json!(7), json!(2)]);
    }

    #[test]
    fn entities_without_version_just_set_values() {
        let model = standard_model().unwrap();
        let tag = model.entity(TAG).unwrap();
        let values = vec![Assignment::for_column(tag.find_column("name").unwrap(), json!("rust"))];
        let q = update(tag, &json!(1), &values, Some(5));
        assert_eq!(
            q.sql,
            "UPDATE \"tag\" AS main SET \"name\" = $1::text WHERE main.\"id\" = $2::integer RETURNING main.\"id\""
        );
    }

    #[test]
    fn increment_rejects_generated_and_text_fields() {
        let model = standard_model().unwrap();
        let user = model.entity(USER).unwrap();
        let w: Where = WhereGroup::new().and("id", FindOperator::Equal(json!(1))).into();
        let q = increment(user, "count", -2, &w).unwrap();
        assert!(q.sql.starts_with("UPDATE \"user\" AS main SET \"count\" = main.\"count\" + $1::integer"));
        assert!(q.sql.ends_with(" WHERE (main.\"id\" = $2::integer)"));
        assert!(increment(user, "version", 1, &w).is_err());
        assert!(increment(user, "email", 1, &w).is_err());
    }

    #[test]
    fn link_statements() {
        let q = link("post_tags", "tag_id", "post_id", &json!(1), &json!(2));
        assert_eq!(
            q.sql,
            "INSERT INTO \"post_tags\" (\"tag_id\", \"post_id\") VALUES ($1::integer, $2::integer) ON CONFLICT DO NOTHING"
        );
        let q = unlink_all("post_tags", "post_id", &json!(3));
        assert_eq!(q.sql, "DELETE FROM \"post_tags\" WHERE \"post_id\" = $1::integer");
    }
}
