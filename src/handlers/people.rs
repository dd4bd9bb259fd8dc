//! Students and teachers: plain list/create over tables sharing base and name columns.

use super::list;
use crate::error::AppError;
use crate::extractors::{ListQuery, OptionalJson};
use crate::query::FindOptions;
use crate::response::created;
use crate::service::Repository;
use crate::state::AppState;
use axum::{extract::State, response::IntoResponse};
use serde_json::Value;

async fn create(repo: &Repository, body: OptionalJson<Value>) -> Result<Value, AppError> {
    let body = body
        .into_inner()
        .ok_or_else(|| AppError::Validation("request body is required".into()))?;
    let patch = repo.patch_from_json(body)?;
    if patch.id.is_some() {
        return Err(AppError::Validation("id is generated".into()));
    }
    repo.save(&patch).await
}

pub async fn list_students(State(state): State<AppState>, query: ListQuery) -> Result<impl IntoResponse, AppError> {
    list(&state.repos.students, &query, FindOptions::new()).await
}

pub async fn create_student(
    State(state): State<AppState>,
    body: OptionalJson<Value>,
) -> Result<impl IntoResponse, AppError> {
    Ok(created(create(&state.repos.students, body).await?))
}

/// Salary is left out unless selected explicitly.
pub async fn list_teachers(State(state): State<AppState>, query: ListQuery) -> Result<impl IntoResponse, AppError> {
    list(&state.repos.teachers, &query, FindOptions::new()).await
}

pub async fn create_teacher(
    State(state): State<AppState>,
    body: OptionalJson<Value>,
) -> Result<impl IntoResponse, AppError> {
    Ok(created(create(&state.repos.teachers, body).await?))
}
