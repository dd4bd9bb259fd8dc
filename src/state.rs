//! Shared application state for all routes.

use crate::error::SchemaError;
use crate::schema::Model;
use crate::service::Repositories;
use sqlx::PgPool;
use std::sync::Arc;

#[derive(Clone)]
pub struct AppState {
    pub pool: PgPool,
    pub repos: Repositories,
}

impl AppState {
    pub fn new(pool: PgPool, model: Model) -> Result<Self, SchemaError> {
        let repos = Repositories::new(pool.clone(), Arc::new(model))?;
        Ok(AppState { pool, repos })
    }
}
