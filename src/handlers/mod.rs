//! HTTP handlers: users and their relations, posts and tags, students and teachers.

pub mod people;
pub mod posts;
pub mod users;

use crate::error::AppError;
use crate::extractors::ListQuery;
use crate::query::FindOptions;
use crate::response::{listed, ListResponse};
use crate::service::Repository;
use serde_json::Value;

/// Serial ids arrive as path segments.
fn parse_id(id_str: &str) -> Result<Value, AppError> {
    let n: i32 = id_str
        .parse()
        .map_err(|_| AppError::BadRequest(format!("invalid id: {}", id_str)))?;
    Ok(Value::from(n))
}

/// List with the request's options over the endpoint defaults; `withCount` adds the total.
async fn list(
    repo: &Repository,
    query: &ListQuery,
    defaults: FindOptions,
) -> Result<ListResponse<Value>, AppError> {
    fetch_list(repo, &query.options(defaults)?, query.with_count()).await
}

async fn fetch_list(
    repo: &Repository,
    opts: &FindOptions,
    with_count: bool,
) -> Result<ListResponse<Value>, AppError> {
    if with_count {
        let (rows, total) = repo.find_and_count(opts).await?;
        Ok(listed(rows, Some(total)))
    } else {
        Ok(listed(repo.find(opts).await?, None))
    }
}

/// Primary key of a row returned by a repository.
fn row_id(row: &Value) -> Result<Value, AppError> {
    row.get("id")
        .cloned()
        .filter(|v| !v.is_null())
        .ok_or_else(|| AppError::Validation("saved row has no id".into()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn ids_must_be_integers() {
        assert_eq!(parse_id("123").unwrap(), json!(123));
        assert!(matches!(parse_id("abc"), Err(AppError::BadRequest(_))));
        assert!(parse_id("99999999999").is_err());
    }

    #[test]
    fn row_id_reads_the_primary_key() {
        assert_eq!(row_id(&json!({"id": 4, "email": ""})).unwrap(), json!(4));
        assert!(row_id(&json!({"email": ""})).is_err());
    }
}
