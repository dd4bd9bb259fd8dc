//! Application routes: users and relations, posts and tags, students and teachers.

use crate::handlers::{people, posts, users};
use crate::state::AppState;
use axum::{
    routing::{delete, get, patch, post},
    Router,
};

pub fn api_routes(state: AppState) -> Router {
    Router::new()
        .route("/users", get(users::list_users).post(users::create_user))
        .route("/users/stats", get(users::user_stats))
        .route("/users/:id", patch(users::patch_user).delete(users::delete_user))
        .route("/users/:id/increment", post(users::increment_user))
        .route("/users/:id/decrement", post(users::decrement_user))
        .route("/sample", post(users::sample))
        .route("/user/profile", post(users::create_user_and_profile))
        .route("/user/profile/:id", delete(users::delete_profile))
        .route("/user/post", post(users::create_user_and_posts))
        .route("/posts", get(posts::list_posts))
        .route("/posts/tags", post(posts::create_posts_and_tags))
        .route("/tags", get(posts::list_tags))
        .route("/students", get(people::list_students).post(people::create_student))
        .route("/teachers", get(people::list_teachers).post(people::create_teacher))
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::standard_model;
    use axum::{
        body::{to_bytes, Body},
        http::{header::CONTENT_TYPE, Request, StatusCode},
    };
    use serde_json::Value;
    use sqlx::postgres::PgPoolOptions;
    use std::time::Duration;
    use tower::ServiceExt;

    // Every request below is rejected before a connection is needed.
    fn offline_app() -> Router {
        let pool = PgPoolOptions::new()
            .acquire_timeout(Duration::from_millis(200))
            .connect_lazy("postgres://nobody@127.0.0.1:1/none")
            .unwrap();
        api_routes(AppState::new(pool, standard_model().unwrap()).unwrap())
    }

    async fn send(method: &str, uri: &str, content_type: Option<&str>, body: &'static str) -> (StatusCode, Value) {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(ct) = content_type {
            builder = builder.header(CONTENT_TYPE, ct);
        }
        let res = offline_app()
            .oneshot(builder.body(Body::from(body)).unwrap())
            .await
            .unwrap();
        let status = res.status();
        let bytes = to_bytes(res.into_body(), usize::MAX).await.unwrap();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    const JSON: Option<&str> = Some("application/json");

    #[tokio::test]
    async fn counter_steps_of_the_wrong_type_are_rejected() {
        for body in [r#"{"by":"ten"}"#, r#"{"by":2.5}"#, r#"{"by":4294967296}"#, r#"{"field":7}"#] {
            let (status, v) = send("POST", "/users/1/increment", JSON, body).await;
            assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY, "{}", body);
            assert_eq!(v["error"]["code"], "validation_error");
        }
        let (status, _) = send("POST", "/users/1/decrement", JSON, r#"{"by":"#).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn malformed_user_payloads_never_fall_back_to_defaults() {
        let (status, v) = send("POST", "/users", JSON, r#"{"email": "#).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(v["error"]["code"], "bad_request");

        let (status, _) = send("POST", "/users", Some("text/plain"), r#"{"email": "a@b.c"}"#).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, _) = send("POST", "/users", JSON, r#"["a@b.c"]"#).await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);

        let (status, _) = send("POST", "/users", JSON, r#"{"id": 5}"#).await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    }

    #[tokio::test]
    async fn students_need_a_body() {
        let (status, v) = send("POST", "/students", None, "").await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(v["error"]["message"], "validation: request body is required");
    }

    #[tokio::test]
    async fn filter_values_of_the_wrong_type_are_422() {
        // where={"id":"abc"}, then where={"count":{"between":[1.5,2]}}
        let (status, v) = send("GET", "/users?where=%7B%22id%22%3A%22abc%22%7D", None, "").await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(v["error"]["message"], "validation: id must be a 32-bit integer");

        let uri = "/users/stats?where=%7B%22count%22%3A%7B%22between%22%3A%5B1.5%2C2%5D%7D%7D";
        let (status, _) = send("GET", uri, None, "").await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    }

    #[tokio::test]
    async fn pagination_beyond_a_bigint_is_a_bad_request() {
        let (status, _) = send("GET", "/users?take=9223372036854775808", None, "").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        let (status, _) = send("GET", "/posts?skip=18446744073709551615", None, "").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }
}
