//! Post and tag endpoints.

use super::{fetch_list, list, row_id};
use crate::error::AppError;
use crate::extractors::ListQuery;
use crate::query::FindOptions;
use crate::response::created;
use crate::service::Patch;
use crate::state::AppState;
use axum::{extract::State, response::IntoResponse};
use serde_json::Value;

fn references(rows: &[&Value]) -> Result<Vec<Patch>, AppError> {
    rows.iter().map(|r| row_id(r).map(Patch::reference)).collect()
}

/// POST /posts/tags: posts and tags linked both ways through the join table, in one transaction.
pub async fn create_posts_and_tags(State(state): State<AppState>) -> Result<impl IntoResponse, AppError> {
    let repos = &state.repos;
    let mut tx = state.pool.begin().await?;

    let post1 = repos
        .posts
        .save_in(&mut tx, &Patch::new().set("title", "NestJS Lecture"))
        .await?;
    let post2 = repos
        .posts
        .save_in(&mut tx, &Patch::new().set("title", "Programming Lecture"))
        .await?;

    let tag1 = repos
        .tags
        .save_in(
            &mut tx,
            &Patch::new()
                .set("name", "Javascript")
                .relate_many("posts", references(&[&post1, &post2])?),
        )
        .await?;
    let tag2 = repos
        .tags
        .save_in(
            &mut tx,
            &Patch::new()
                .set("name", "Typescript")
                .relate_many("posts", references(&[&post1])?),
        )
        .await?;

    repos
        .posts
        .save_in(
            &mut tx,
            &Patch::new()
                .set("title", "NextJS Lecture")
                .relate_many("tags", references(&[&tag1, &tag2])?),
        )
        .await?;

    tx.commit().await?;
    tracing::info!("created sample posts and tags");
    Ok(created(true))
}

/// GET /posts. Tags are eager, so every post carries them.
pub async fn list_posts(State(state): State<AppState>, query: ListQuery) -> Result<impl IntoResponse, AppError> {
    list(&state.repos.posts, &query, FindOptions::new().relation("tags")).await
}

/// GET /tags, always with their posts.
pub async fn list_tags(State(state): State<AppState>, query: ListQuery) -> Result<impl IntoResponse, AppError> {
    let defaults = FindOptions::new().relation("posts");
    let opts = query.options(defaults)?.relation("posts");
    fetch_list(&state.repos.tags, &opts, query.with_count()).await
}
