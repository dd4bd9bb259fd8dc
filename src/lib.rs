//! Relations API: users, profiles, posts and tags over PostgreSQL, with a small
//! repository layer driven by entity declarations.

pub mod error;
pub mod extractors;
pub mod handlers;
pub mod migration;
pub mod query;
pub mod response;
pub mod routes;
pub mod schema;
pub mod service;
pub mod settings;
pub mod sql;
pub mod state;
pub mod store;

pub use error::{AppError, ConfigError, SchemaError};
pub use migration::synchronize;
pub use routes::{api_routes, app, common_routes_with_ready};
pub use schema::standard_model;
pub use service::{Patch, Repositories, Repository};
pub use settings::Settings;
pub use state::AppState;
pub use store::{connect, ensure_database_exists};
