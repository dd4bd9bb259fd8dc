//! Run built queries on a connection, binding every parameter as text.

use crate::error::AppError;
use crate::sql::{PgBindValue, QueryBuf};
use serde_json::Value;
use sqlx::postgres::{PgArguments, PgRow};
use sqlx::query::Query;
use sqlx::{PgConnection, Postgres, Row};

fn bound(q: &QueryBuf) -> Query<'_, Postgres, PgArguments> {
    tracing::debug!(sql = %q.sql, params = ?q.params, "query");
    let mut query = sqlx::query(&q.sql);
    for p in &q.params {
        query = query.bind(PgBindValue::from_json(p));
    }
    query
}

pub async fn fetch_all(conn: &mut PgConnection, q: &QueryBuf) -> Result<Vec<PgRow>, AppError> {
    Ok(bound(q).fetch_all(conn).await?)
}

pub async fn fetch_optional(conn: &mut PgConnection, q: &QueryBuf) -> Result<Option<PgRow>, AppError> {
    Ok(bound(q).fetch_optional(conn).await?)
}

pub async fn fetch_one(conn: &mut PgConnection, q: &QueryBuf) -> Result<PgRow, AppError> {
    Ok(bound(q).fetch_one(conn).await?)
}

/// Rows affected.
pub async fn execute(conn: &mut PgConnection, q: &QueryBuf) -> Result<u64, AppError> {
    Ok(bound(q).execute(conn).await?.rows_affected())
}

/// First column of each row, rendered by the database as JSON.
pub async fn fetch_json(conn: &mut PgConnection, q: &QueryBuf) -> Result<Vec<Value>, AppError> {
    fetch_all(conn, q)
        .await?
        .iter()
        .map(|r| r.try_get::<Value, _>(0).map_err(AppError::from))
        .collect()
}

/// Serial primary keys come back as int4.
pub fn id_of(row: &PgRow) -> Result<Value, AppError> {
    Ok(Value::from(row.try_get::<i32, _>(0)?))
}

pub async fn exists(conn: &mut PgConnection, q: &QueryBuf) -> Result<bool, AppError> {
    Ok(fetch_one(conn, q).await?.try_get::<bool, _>(0)?)
}
