//! Development schema synchronization: DDL for enum types, tables, join tables and foreign keys,
//! derived from the entity declarations. Every statement is idempotent.

use crate::error::AppError;
use crate::schema::{quoted, ColumnType, EntityDef, JoinSide, Model, RelationKind};
use sqlx::PgPool;
use std::collections::HashSet;

fn column_def(name: &str, ty: &str, nullable: bool, default: Option<&str>, unique: bool) -> String {
    let mut def = format!("{} {}", quoted(name), ty);
    if !nullable {
        def.push_str(" NOT NULL");
    }
    if let Some(d) = default {
        def.push_str(" DEFAULT ");
        def.push_str(d);
    }
    if unique {
        def.push_str(" UNIQUE");
    }
    def
}

/// Runs `body` and swallows `duplicate_object`, so re-running is harmless.
fn guarded(body: &str) -> String {
    format!(
        "DO $$ BEGIN {}; EXCEPTION WHEN duplicate_object THEN NULL; END $$",
        body
    )
}

fn enum_types(model: &Model) -> Vec<String> {
    let mut seen = HashSet::new();
    let mut out = Vec::new();
    for e in &model.entities {
        for c in &e.columns {
            if let ColumnType::Enum { type_name, labels } = c.ty {
                if seen.insert(type_name) {
                    let values: Vec<String> = labels.iter().map(|v| format!("'{}'", v.replace('\'', "''"))).collect();
                    out.push(guarded(&format!(
                        "CREATE TYPE {} AS ENUM ({})",
                        quoted(type_name),
                        values.join(", ")
                    )));
                }
            }
        }
    }
    out
}

fn create_table(model: &Model, e: &EntityDef) -> Result<String, AppError> {
    let mut defs = Vec::new();
    for c in &e.columns {
        defs.push(column_def(c.column, &c.ty.ddl(), c.nullable, c.db_default, c.unique));
    }
    for r in &e.relations {
        if let JoinSide::Owner { column } = r.join {
            let target = model.target(r)?;
            let fk_ty = match target.primary().ty {
                ColumnType::Serial => ColumnType::Integer.ddl(),
                other => other.ddl(),
            };
            defs.push(column_def(
                column,
                &fk_ty,
                r.nullable,
                None,
                r.kind == RelationKind::OneToOne,
            ));
        }
    }
    defs.push(format!("PRIMARY KEY ({})", quoted(e.primary().column)));
    Ok(format!(
        "CREATE TABLE IF NOT EXISTS {} (\n  {}\n)",
        quoted(e.table),
        defs.join(",\n  ")
    ))
}

fn join_tables(model: &Model) -> Result<Vec<String>, AppError> {
    let mut seen = HashSet::new();
    let mut out = Vec::new();
    for e in &model.entities {
        for r in &e.relations {
            let JoinSide::Table {
                table,
                own_column,
                target_column,
            } = r.join
            else {
                continue;
            };
            if !seen.insert(table) {
                continue;
            }
            let target = model.target(r)?;
            out.push(format!(
                "CREATE TABLE IF NOT EXISTS {} (\n  {} INTEGER NOT NULL REFERENCES {} ({}) ON DELETE CASCADE,\n  \
                 {} INTEGER NOT NULL REFERENCES {} ({}) ON DELETE CASCADE,\n  PRIMARY KEY ({}, {})\n)",
                quoted(table),
                quoted(own_column),
                quoted(e.table),
                quoted(e.primary().column),
                quoted(target_column),
                quoted(target.table),
                quoted(target.primary().column),
                quoted(own_column),
                quoted(target_column)
            ));
        }
    }
    Ok(out)
}

fn foreign_keys(model: &Model) -> Result<Vec<String>, AppError> {
    let mut out = Vec::new();
    for e in &model.entities {
        for r in &e.relations {
            let JoinSide::Owner { column } = r.join else {
                continue;
            };
            let target = model.target(r)?;
            let constraint = format!("fk_{}_{}", e.table, column);
            out.push(guarded(&format!(
                "ALTER TABLE {} ADD CONSTRAINT {} FOREIGN KEY ({}) REFERENCES {} ({}) ON DELETE {}",
                quoted(e.table),
                quoted(&constraint),
                quoted(column),
                quoted(target.table),
                quoted(target.primary().column),
                r.on_delete.as_sql()
            )));
        }
    }
    Ok(out)
}

/// Statements in dependency order: enum types, tables, join tables, foreign keys.
pub fn ddl_statements(model: &Model) -> Result<Vec<String>, AppError> {
    let mut out = enum_types(model);
    for e in &model.entities {
        out.push(create_table(model, e)?);
    }
    out.extend(join_tables(model)?);
    out.extend(foreign_keys(model)?);
    Ok(out)
}

/// Bring the database in line with the model. Meant for development; there is no down path.
pub async fn synchronize(pool: &PgPool, model: &Model) -> Result<(), AppError> {
    let statements = ddl_statements(model)?;
    for sql in &statements {
        tracing::debug!(sql = %sql, "ddl");
        sqlx::query(sql).execute(pool).await?;
    }
    tracing::info!(statements = statements.len(), "schema synchronized");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::standard_model;

    fn ddl() -> Vec<String> {
        ddl_statements(&standard_model().unwrap()).unwrap()
    }

    #[test]
    fn enum_type_comes_first_and_is_guarded() {
        let stmts = ddl();
        assert_eq!(
            stmts[0],
            "DO $$ BEGIN CREATE TYPE \"user_role_enum\" AS ENUM ('user', 'admin'); \
             EXCEPTION WHEN duplicate_object THEN NULL; END $$"
        );
    }

    #[test]
    fn user_table_carries_generated_columns_and_profile_fk_column() {
        let stmts = ddl();
        let user = stmts
            .iter()
            .find(|s| s.starts_with("CREATE TABLE IF NOT EXISTS \"user\""))
            .unwrap();
        assert!(user.contains("\"id\" SERIAL NOT NULL"));
        assert!(user.contains("\"email\" TEXT NOT NULL DEFAULT ''"));
        assert!(user.contains("\"role\" \"user_role_enum\" NOT NULL DEFAULT 'user'"));
        assert!(user.contains("\"version\" INTEGER NOT NULL DEFAULT 1"));
        assert!(user.contains("\"additional_id\" UUID NOT NULL DEFAULT gen_random_uuid() UNIQUE"));
        assert!(user.contains("\"profile_id\" INTEGER UNIQUE"));
        assert!(user.contains("PRIMARY KEY (\"id\")"));
    }

    #[test]
    fn join_table_is_created_once() {
        let stmts = ddl();
        let joins: Vec<_> = stmts
            .iter()
            .filter(|s| s.starts_with("CREATE TABLE IF NOT EXISTS \"post_tags\""))
            .collect();
        assert_eq!(joins.len(), 1);
        assert!(joins[0].contains("\"post_id\" INTEGER NOT NULL REFERENCES \"post\" (\"id\") ON DELETE CASCADE"));
        assert!(joins[0].contains("\"tag_id\" INTEGER NOT NULL REFERENCES \"tag\" (\"id\") ON DELETE CASCADE"));
        assert!(joins[0].contains("PRIMARY KEY (\"post_id\", \"tag_id\")"));
    }

    #[test]
    fn profile_fk_restricts_delete() {
        let stmts = ddl();
        assert!(stmts.iter().any(|s| s.contains(
            "ALTER TABLE \"user\" ADD CONSTRAINT \"fk_user_profile_id\" FOREIGN KEY (\"profile_id\") \
             REFERENCES \"profile\" (\"id\") ON DELETE RESTRICT"
        )));
        assert!(stmts.iter().any(|s| s.contains(
            "ALTER TABLE \"post\" ADD CONSTRAINT \"fk_post_author_id\" FOREIGN KEY (\"author_id\") \
             REFERENCES \"user\" (\"id\") ON DELETE NO ACTION"
        )));
    }

    #[test]
    fn foreign_keys_follow_tables() {
        let stmts = ddl();
        let last_table = stmts.iter().rposition(|s| s.starts_with("CREATE TABLE")).unwrap();
        let first_fk = stmts.iter().position(|s| s.contains("ADD CONSTRAINT")).unwrap();
        assert!(last_table < first_fk);
    }
}
