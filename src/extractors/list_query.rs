//! Extract list options (`select`, `where`, `relations`, `order`, `skip`, `take`, `withCount`) from the query string.

use crate::error::AppError;
use crate::query::{FindOptions, ListParams};
use async_trait::async_trait;
use axum::{
    extract::{FromRequestParts, Query},
    http::request::Parts,
};

/// Raw list parameters; malformed query strings are rejected with 400.
#[derive(Clone, Debug, Default)]
pub struct ListQuery(pub ListParams);

impl ListQuery {
    /// Overlay the request's parameters on the endpoint defaults.
    pub fn options(&self, defaults: FindOptions) -> Result<FindOptions, AppError> {
        self.0.apply(defaults).map_err(AppError::BadRequest)
    }

    pub fn with_count(&self) -> bool {
        self.0.with_count
    }
}

#[async_trait]
impl<S> FromRequestParts<S> for ListQuery
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let Query(params) =
            Query::<ListParams>::try_from_uri(&parts.uri).map_err(|e| AppError::BadRequest(e.body_text()))?;
        Ok(ListQuery(params))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::{Direction, FindOperator};
    use axum::http::Request;
    use serde_json::json;

    async fn extract(uri: &str) -> Result<ListQuery, AppError> {
        let (mut parts, _) = Request::builder().uri(uri).body(()).unwrap().into_parts();
        ListQuery::from_request_parts(&mut parts, &()).await
    }

    #[tokio::test]
    async fn absent_parameters_keep_defaults() {
        let q = extract("/users").await.unwrap();
        let defaults = FindOptions::new().relation("profile").order_by("id", Direction::Desc);
        assert_eq!(q.options(defaults.clone()).unwrap(), defaults);
        assert!(!q.with_count());
    }

    #[tokio::test]
    async fn query_string_overrides_defaults() {
        let uri = "/users?take=1&skip=2&order=email:desc,id&relations=posts&select=id,email&withCount=true\
                   &where=%7B%22id%22%3A%7B%22lt%22%3A4%7D%7D";
        let q = extract(uri).await.unwrap();
        assert!(q.with_count());
        let opts = q.options(FindOptions::new().relation("profile")).unwrap();
        assert_eq!(opts.take, 1);
        assert_eq!(opts.skip, 2);
        assert_eq!(
            opts.order,
            vec![("email".to_string(), Direction::Desc), ("id".to_string(), Direction::Asc)]
        );
        assert_eq!(opts.relations, vec!["posts".to_string()]);
        assert_eq!(opts.select, Some(vec!["id".to_string(), "email".to_string()]));
        assert_eq!(opts.filter.0[0].0.get("id"), Some(&FindOperator::LessThan(json!(4))));
    }

    #[tokio::test]
    async fn malformed_values_are_bad_requests() {
        assert!(matches!(extract("/users?take=many").await, Err(AppError::BadRequest(_))));
        let q = extract("/users?where=%7Bnope").await.unwrap();
        assert!(matches!(q.options(FindOptions::new()), Err(AppError::BadRequest(_))));
        let q = extract("/users?order=id:sideways").await.unwrap();
        assert!(matches!(q.options(FindOptions::new()), Err(AppError::BadRequest(_))));
    }
}
