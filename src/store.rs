//! Database bootstrap: create the target database when missing, then open the pool.

use crate::error::{AppError, ConfigError};
use crate::schema::quoted;
use crate::settings::Settings;
use sqlx::postgres::{PgConnectOptions, PgPoolOptions};
use sqlx::{ConnectOptions, PgPool};

/// Always present; CREATE DATABASE is issued from here.
const MAINTENANCE_DB: &str = "postgres";

/// SQLSTATE duplicate_database, raised when another process created it first.
const DUPLICATE_DATABASE: &str = "42P04";

fn connect_options(settings: &Settings) -> Result<PgConnectOptions, AppError> {
    settings.database_url.parse::<PgConnectOptions>().map_err(|e| {
        AppError::Config(ConfigError::Invalid {
            key: "DATABASE_URL",
            value: e.to_string(),
        })
    })
}

/// Database the service needs created, if any.
fn target_database(opts: &PgConnectOptions) -> Option<&str> {
    opts.get_database().filter(|db| !db.is_empty() && *db != MAINTENANCE_DB)
}

/// Create the database named in `DATABASE_URL` unless it exists. Returns whether it was created.
pub async fn ensure_database_exists(settings: &Settings) -> Result<bool, AppError> {
    let opts = connect_options(settings)?;
    let Some(db_name) = target_database(&opts) else {
        return Ok(false);
    };
    let admin = opts.clone().database(MAINTENANCE_DB);
    let mut conn = admin.connect().await?;
    let exists: bool = sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM pg_database WHERE datname = $1)")
        .bind(db_name)
        .fetch_one(&mut conn)
        .await?;
    if exists {
        tracing::debug!(database = db_name, "database present");
        return Ok(false);
    }
    match sqlx::query(&format!("CREATE DATABASE {}", quoted(db_name)))
        .execute(&mut conn)
        .await
    {
        Ok(_) => {
            tracing::info!(database = db_name, "created database");
            Ok(true)
        }
        Err(sqlx::Error::Database(e)) if e.code().as_deref() == Some(DUPLICATE_DATABASE) => Ok(false),
        Err(e) => Err(e.into()),
    }
}

pub async fn connect(settings: &Settings) -> Result<PgPool, AppError> {
    let pool = PgPoolOptions::new()
        .max_connections(settings.max_connections)
        .connect_with(connect_options(settings)?)
        .await?;
    Ok(pool)
}
