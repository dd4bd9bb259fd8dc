//! Per-entity data access: find, save, delete, aggregates and counters.

use crate::error::{AppError, SchemaError};
use crate::query::{FindOperator, FindOptions, Where, WhereGroup};
use crate::schema::{EntityDef, Model};
use crate::service::exec;
use crate::service::patch::Patch;
use crate::service::persist::persist;
use crate::sql::{self, Aggregate, QueryBuf};
use serde_json::Value;
use sqlx::{PgConnection, PgPool, Row};
use std::sync::Arc;

/// Handle for one entity, built once at startup and cloned into handlers.
#[derive(Clone)]
pub struct Repository {
    pool: PgPool,
    model: Arc<Model>,
    entity: &'static str,
}

impl Repository {
    pub fn new(pool: PgPool, model: Arc<Model>, entity: &'static str) -> Result<Self, SchemaError> {
        if model.entity(entity).is_none() {
            return Err(SchemaError::MissingReference {
                kind: "entity",
                id: entity.to_string(),
            });
        }
        Ok(Repository { pool, model, entity })
    }

    pub fn def(&self) -> Result<&EntityDef, AppError> {
        self.model.entity(self.entity).ok_or_else(|| {
            AppError::Schema(SchemaError::MissingReference {
                kind: "entity",
                id: self.entity.to_string(),
            })
        })
    }

    /// Parse a JSON payload into a patch for this entity.
    pub fn patch_from_json(&self, v: Value) -> Result<Patch, AppError> {
        Patch::from_json(&self.model, self.def()?, v)
    }

    pub async fn find(&self, opts: &FindOptions) -> Result<Vec<Value>, AppError> {
        let q = sql::select_find(&self.model, self.def()?, opts)?;
        let mut conn = self.pool.acquire().await?;
        exec::fetch_json(&mut conn, &q).await
    }

    pub async fn find_in(&self, conn: &mut PgConnection, opts: &FindOptions) -> Result<Vec<Value>, AppError> {
        let q = sql::select_find(&self.model, self.def()?, opts)?;
        exec::fetch_json(conn, &q).await
    }

    /// Page of rows plus the number of matches ignoring skip/take.
    pub async fn find_and_count(&self, opts: &FindOptions) -> Result<(Vec<Value>, i64), AppError> {
        let e = self.def()?;
        let rows_q = sql::select_find(&self.model, e, opts)?;
        let count_q = sql::count(e, &opts.filter)?;
        let mut conn = self.pool.acquire().await?;
        let rows = exec::fetch_json(&mut conn, &rows_q).await?;
        let total = count_of(&mut conn, &count_q).await?;
        Ok((rows, total))
    }

    pub async fn find_one_by_id(&self, id: &Value, relations: &[&str]) -> Result<Option<Value>, AppError> {
        let mut conn = self.pool.acquire().await?;
        self.find_by_id_in(&mut conn, id, relations).await
    }

    async fn find_by_id_in(
        &self,
        conn: &mut PgConnection,
        id: &Value,
        relations: &[&str],
    ) -> Result<Option<Value>, AppError> {
        let e = self.def()?;
        let mut opts = FindOptions::new()
            .filter(WhereGroup::new().and(e.primary().property, FindOperator::Equal(id.clone())))
            .take(1);
        for r in relations {
            opts = opts.relation(r);
        }
        Ok(self.find_in(conn, &opts).await?.into_iter().next())
    }

    /// Persist a patch with its cascades in one transaction and return the stored entity.
    pub async fn save(&self, patch: &Patch) -> Result<Value, AppError> {
        let mut tx = self.pool.begin().await?;
        let saved = self.save_in(&mut tx, patch).await?;
        tx.commit().await?;
        Ok(saved)
    }

    /// Like `save`, on a caller-owned connection or transaction.
    /// The result carries the relations named in the patch.
    pub async fn save_in(&self, conn: &mut PgConnection, patch: &Patch) -> Result<Value, AppError> {
        let e = self.def()?;
        let id = persist(&self.model, &mut *conn, e, patch).await?;
        let relations: Vec<&str> = patch.relations.keys().map(String::as_str).collect();
        self.find_by_id_in(conn, &id, &relations)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("{} {}", e.name, id)))
    }

    /// Delete by primary key. Returns the rows removed; an absent id removes nothing.
    pub async fn delete(&self, id: &Value) -> Result<u64, AppError> {
        let mut conn = self.pool.acquire().await?;
        let removed = exec::execute(&mut conn, &sql::delete(self.def()?, id)).await?;
        tracing::info!(entity = self.entity, id = %id, removed, "delete");
        Ok(removed)
    }

    pub async fn count(&self, filter: &Where) -> Result<i64, AppError> {
        let q = sql::count(self.def()?, filter)?;
        let mut conn = self.pool.acquire().await?;
        count_of(&mut conn, &q).await
    }

    async fn aggregate(&self, func: Aggregate, field: &str, filter: &Where) -> Result<Option<f64>, AppError> {
        let q = sql::aggregate(self.def()?, func, field, filter)?;
        let mut conn = self.pool.acquire().await?;
        let row = exec::fetch_one(&mut conn, &q).await?;
        Ok(row.try_get::<Option<f64>, _>(0)?)
    }

    /// Zero when nothing matches.
    pub async fn sum(&self, field: &str, filter: &Where) -> Result<f64, AppError> {
        Ok(self.aggregate(Aggregate::Sum, field, filter).await?.unwrap_or(0.0))
    }

    pub async fn average(&self, field: &str, filter: &Where) -> Result<Option<f64>, AppError> {
        self.aggregate(Aggregate::Average, field, filter).await
    }

    pub async fn minimum(&self, field: &str, filter: &Where) -> Result<Option<f64>, AppError> {
        self.aggregate(Aggregate::Minimum, field, filter).await
    }

    pub async fn maximum(&self, field: &str, filter: &Where) -> Result<Option<f64>, AppError> {
        self.aggregate(Aggregate::Maximum, field, filter).await
    }

    /// Add `by` to `field` on every matching row. Returns the rows affected.
    pub async fn increment(&self, filter: &Where, field: &str, by: i32) -> Result<u64, AppError> {
        let q = sql::increment(self.def()?, field, by, filter)?;
        let mut conn = self.pool.acquire().await?;
        exec::execute(&mut conn, &q).await
    }

    pub async fn decrement(&self, filter: &Where, field: &str, by: i32) -> Result<u64, AppError> {
        let by = by
            .checked_neg()
            .ok_or_else(|| AppError::Validation(format!("cannot decrement by {}", by)))?;
        self.increment(filter, field, by).await
    }
}

async fn count_of(conn: &mut PgConnection, q: &QueryBuf) -> Result<i64, AppError> {
    let row = exec::fetch_one(conn, q).await?;
    Ok(row.try_get::<i64, _>(0)?)
}

/// One repository per entity the API serves.
#[derive(Clone)]
pub struct Repositories {
    pub users: Repository,
    pub profiles: Repository,
    pub posts: Repository,
    pub tags: Repository,
    pub students: Repository,
    pub teachers: Repository,
}

impl Repositories {
    pub fn new(pool: PgPool, model: Arc<Model>) -> Result<Self, SchemaError> {
        use crate::schema::{POST, PROFILE, STUDENT, TAG, TEACHER, USER};
        let repo = |name| Repository::new(pool.clone(), model.clone(), name);
        Ok(Repositories {
            users: repo(USER)?,
            profiles: repo(PROFILE)?,
            posts: repo(POST)?,
            tags: repo(TAG)?,
            students: repo(STUDENT)?,
            teachers: repo(TEACHER)?,
        })
    }
}
