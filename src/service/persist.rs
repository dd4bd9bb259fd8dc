//! Write a patch and its nested relations inside one connection (normally a transaction).
//!
//! Owning-side relations are written first so their keys can fill the foreign key columns;
//! inverse and join-table relations follow once the row's own key is known.

use crate::error::AppError;
use crate::schema::{EntityDef, Generated, JoinSide, Model, RelationDef};
use crate::service::exec;
use crate::service::patch::{Patch, RelationValue, WriteMode};
use crate::sql::{self, Assignment};
use serde_json::Value;
use sqlx::PgConnection;
use std::future::Future;
use std::pin::Pin;

type PersistFuture<'a> = Pin<Box<dyn Future<Output = Result<Value, AppError>> + Send + 'a>>;

/// Insert or update the row described by `patch`, cascading into nested patches. Returns its primary key.
pub fn persist<'a>(
    model: &'a Model,
    conn: &'a mut PgConnection,
    entity: &'a EntityDef,
    patch: &'a Patch,
) -> PersistFuture<'a> {
    Box::pin(async move {
        let mode = patch.mode();
        patch.validate(entity, mode)?;
        let expected_version = patch
            .expected_version
            .filter(|_| entity.find_column_by_generated(Generated::Version).is_some());

        let mut values = Vec::new();
        for (name, rv) in &patch.relations {
            let rel = relation(entity, name)?;
            let JoinSide::Owner { column } = rel.join else {
                continue;
            };
            let target = model.target(rel)?;
            let fk = match rv {
                RelationValue::One(None) => Value::Null,
                RelationValue::One(Some(child)) => related_id(model, &mut *conn, rel, target, child).await?,
                RelationValue::Many(_) => {
                    return Err(AppError::Validation(format!("{} takes a single object", name)));
                }
            };
            values.push(Assignment {
                column,
                cast: target.primary().ty.cast(),
                value: fk,
            });
        }
        for (prop, v) in &patch.fields {
            if let Some(c) = entity.find_column(prop) {
                values.push(Assignment::for_column(c, v.clone()));
            }
        }

        let id = match &patch.id {
            None => {
                values.extend(insert_defaults(entity, patch));
                let row = exec::fetch_one(&mut *conn, &sql::insert(entity, &values)).await?;
                exec::id_of(&row)?
            }
            Some(id) if values.is_empty() && expected_version.is_none() => {
                ensure_exists(&mut *conn, entity, id).await?;
                id.clone()
            }
            Some(id) => {
                let q = sql::update(entity, id, &values, expected_version);
                match exec::fetch_optional(&mut *conn, &q).await? {
                    Some(_) => id.clone(),
                    None => {
                        ensure_exists(&mut *conn, entity, id).await?;
                        return Err(AppError::Conflict(format!(
                            "{} {} was modified concurrently (expected version {})",
                            entity.name,
                            id,
                            expected_version.unwrap_or_default()
                        )));
                    }
                }
            }
        };

        for (name, rv) in &patch.relations {
            let rel = relation(entity, name)?;
            let target = model.target(rel)?;
            let children: Vec<&Patch> = match rv {
                RelationValue::One(child) => child.iter().collect(),
                RelationValue::Many(items) => items.iter().collect(),
            };
            match rel.join {
                JoinSide::Owner { .. } => {}
                JoinSide::Inverse { column } => {
                    for child in children {
                        let child_id = related_id(model, &mut *conn, rel, target, child).await?;
                        let q = sql::set_foreign_key(target, &child_id, column, &id, &entity.primary().ty.cast());
                        exec::execute(&mut *conn, &q).await?;
                    }
                }
                JoinSide::Table {
                    table,
                    own_column,
                    target_column,
                } => {
                    if mode == WriteMode::Update {
                        exec::execute(&mut *conn, &sql::unlink_all(table, own_column, &id)).await?;
                    }
                    for child in children {
                        let child_id = related_id(model, &mut *conn, rel, target, child).await?;
                        exec::execute(&mut *conn, &sql::link(table, own_column, target_column, &id, &child_id)).await?;
                    }
                }
            }
        }

        tracing::debug!(entity = entity.name, id = %id, ?mode, "persisted");
        Ok(id)
    })
}

fn relation<'e>(entity: &'e EntityDef, name: &str) -> Result<&'e RelationDef, AppError> {
    entity
        .find_relation(name)
        .ok_or_else(|| AppError::Validation(format!("{} has no relation '{}'", entity.name, name)))
}

/// Key of a related row: references are checked, cascading relations persist the nested patch.
async fn related_id(
    model: &Model,
    conn: &mut PgConnection,
    rel: &RelationDef,
    target: &EntityDef,
    child: &Patch,
) -> Result<Value, AppError> {
    match &child.id {
        Some(id) if child.is_reference() || !rel.cascade => {
            ensure_exists(conn, target, id).await?;
            Ok(id.clone())
        }
        None if !rel.cascade => Err(AppError::Validation(format!(
            "{} does not cascade; pass the id of an existing {}",
            rel.name, target.name
        ))),
        _ => persist(model, conn, target, child).await,
    }
}

async fn ensure_exists(conn: &mut PgConnection, entity: &EntityDef, id: &Value) -> Result<(), AppError> {
    if exec::exists(conn, &sql::exists(entity, id)).await? {
        Ok(())
    } else {
        Err(AppError::NotFound(format!("{} {}", entity.name, id)))
    }
}

/// Values the row constructor fills in: declared defaults and generated UUIDs.
fn insert_defaults(entity: &EntityDef, patch: &Patch) -> Vec<Assignment> {
    let mut out = Vec::new();
    for c in &entity.columns {
        if patch.fields.contains_key(c.property) {
            continue;
        }
        if c.generated == Some(Generated::Uuid) {
            out.push(Assignment::for_column(c, Value::String(uuid::Uuid::new_v4().to_string())));
        } else if let Some(v) = &c.default {
            out.push(Assignment::for_column(c, v.clone()));
        }
    }
    out
}
