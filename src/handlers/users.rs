//! User endpoints, including the profile and post composites and the counter/aggregate helpers.

use super::{list, parse_id, row_id};
use crate::error::AppError;
use crate::extractors::{ListQuery, OptionalJson};
use crate::query::{Direction, FindOperator, FindOptions, Where, WhereGroup};
use crate::response::{created, listed, ok};
use crate::service::Patch;
use crate::state::AppState;
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

/// `GET /users` returns these unless the query string says otherwise.
pub fn user_list_defaults() -> FindOptions {
    FindOptions::new()
        .select(["id", "createdAt", "updatedAt", "version", "email", "profile.id", "count"])
        .relation("profile")
        .order_by("id", Direction::Desc)
        .skip(0)
        .take(0)
}

/// POST /users: insert a user from the body; an empty body stores all defaults.
pub async fn create_user(
    State(state): State<AppState>,
    body: OptionalJson<Value>,
) -> Result<impl IntoResponse, AppError> {
    let patch = match body.into_inner() {
        Some(v) => state.repos.users.patch_from_json(v)?,
        None => Patch::new(),
    };
    if patch.id.is_some() {
        return Err(AppError::Validation("id is generated; use PATCH to change a user".into()));
    }
    let saved = state.repos.users.save(&patch).await?;
    Ok(created(saved))
}

pub async fn list_users(State(state): State<AppState>, query: ListQuery) -> Result<impl IntoResponse, AppError> {
    list(&state.repos.users, &query, user_list_defaults()).await
}

/// PATCH /users/:id: append "0" to the email, guarded by the version that was read.
pub async fn patch_user(
    State(state): State<AppState>,
    Path(id_str): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    let id = parse_id(&id_str)?;
    let users = &state.repos.users;
    let user = users
        .find_one_by_id(&id, &[])
        .await?
        .ok_or_else(|| AppError::NotFound(format!("User {}", id_str)))?;
    let email = format!("{}0", user.get("email").and_then(Value::as_str).unwrap_or_default());
    let mut patch = Patch::new().with_id(id).set("email", email);
    if let Some(v) = user.get("version").and_then(Value::as_i64) {
        patch = patch.expect_version(v);
    }
    let saved = users.save(&patch).await?;
    Ok(ok(saved))
}

pub async fn delete_user(
    State(state): State<AppState>,
    Path(id_str): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    let id = parse_id(&id_str)?;
    state.repos.users.delete(&id).await?;
    Ok(StatusCode::NO_CONTENT)
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct CounterBody {
    pub field: String,
    /// Step applied to an integer column; must itself fit one.
    pub by: i32,
}

impl Default for CounterBody {
    fn default() -> Self {
        CounterBody {
            field: "count".into(),
            by: 1,
        }
    }
}

async fn adjust(state: &AppState, id_str: &str, body: OptionalJson<CounterBody>, up: bool) -> Result<u64, AppError> {
    let id = parse_id(id_str)?;
    let body = body.into_inner().unwrap_or_default();
    let filter: Where = WhereGroup::new().and("id", FindOperator::Equal(id)).into();
    let users = &state.repos.users;
    let affected = if up {
        users.increment(&filter, &body.field, body.by).await?
    } else {
        users.decrement(&filter, &body.field, body.by).await?
    };
    if affected == 0 {
        return Err(AppError::NotFound(format!("User {}", id_str)));
    }
    Ok(affected)
}

/// POST /users/:id/increment with `{"field": "count", "by": 2}`; both keys are optional.
pub async fn increment_user(
    State(state): State<AppState>,
    Path(id_str): Path<String>,
    body: OptionalJson<CounterBody>,
) -> Result<impl IntoResponse, AppError> {
    let affected = adjust(&state, &id_str, body, true).await?;
    Ok(ok(json!({ "affected": affected })))
}

pub async fn decrement_user(
    State(state): State<AppState>,
    Path(id_str): Path<String>,
    body: OptionalJson<CounterBody>,
) -> Result<impl IntoResponse, AppError> {
    let affected = adjust(&state, &id_str, body, false).await?;
    Ok(ok(json!({ "affected": affected })))
}

#[derive(Debug, Default, Deserialize)]
pub struct StatsParams {
    pub field: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct UserStats {
    pub field: String,
    pub count: i64,
    pub sum: f64,
    pub average: Option<f64>,
    pub minimum: Option<f64>,
    pub maximum: Option<f64>,
}

/// GET /users/stats?field=count&where=...
pub async fn user_stats(
    State(state): State<AppState>,
    Query(params): Query<StatsParams>,
    query: ListQuery,
) -> Result<impl IntoResponse, AppError> {
    let field = params.field.unwrap_or_else(|| "count".into());
    let filter = query.options(FindOptions::new())?.filter;
    let users = &state.repos.users;
    let stats = UserStats {
        count: users.count(&filter).await?,
        sum: users.sum(&field, &filter).await?,
        average: users.average(&field, &filter).await?,
        minimum: users.minimum(&field, &filter).await?,
        maximum: users.maximum(&field, &filter).await?,
        field,
    };
    Ok(ok(stats))
}

/// POST /sample: first user by id plus the total number of users.
pub async fn sample(State(state): State<AppState>) -> Result<impl IntoResponse, AppError> {
    let (rows, total) = state.repos.users.find_and_count(&FindOptions::new().take(1)).await?;
    Ok(listed(rows, Some(total)))
}

/// DELETE /user/profile/:id. Rejected while a user still points at the profile.
pub async fn delete_profile(
    State(state): State<AppState>,
    Path(id_str): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    let id = parse_id(&id_str)?;
    state.repos.profiles.delete(&id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// POST /user/profile: user and profile inserted together through the cascade.
pub async fn create_user_and_profile(State(state): State<AppState>) -> Result<impl IntoResponse, AppError> {
    let patch = Patch::new()
        .set("email", "test@codefactory.ai")
        .relate_one("profile", Some(Patch::new().set("profileImg", "asd.jpg")));
    let saved = state.repos.users.save(&patch).await?;
    Ok(created(saved))
}

/// POST /user/post: a user and two posts authored by it, in one transaction.
pub async fn create_user_and_posts(State(state): State<AppState>) -> Result<impl IntoResponse, AppError> {
    let repos = &state.repos;
    let mut tx = state.pool.begin().await?;
    let user = repos
        .users
        .save_in(&mut tx, &Patch::new().set("email", "postuser@codefactory.ai"))
        .await?;
    let user_id = row_id(&user)?;
    for title in ["post 1", "post 2"] {
        let post = Patch::new()
            .set("title", title)
            .relate_one("author", Some(Patch::reference(user_id.clone())));
        repos.posts.save_in(&mut tx, &post).await?;
    }
    tx.commit().await?;
    Ok(created(user))
}
