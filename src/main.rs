//! Relations API server: reads settings, prepares the database, serves the routes.

use relations_api::{app, connect, ensure_database_exists, standard_model, synchronize, AppState, Settings};
use tokio::net::TcpListener;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("relations_api=info".parse()?))
        .init();

    let settings = Settings::from_env()?;
    ensure_database_exists(&settings).await?;
    let pool = connect(&settings).await?;

    let model = standard_model()?;
    if settings.synchronize {
        synchronize(&pool, &model).await?;
    }
    let state = AppState::new(pool, model)?;

    let listener = TcpListener::bind(settings.bind_addr).await?;
    tracing::info!("listening on {}", listener.local_addr()?);
    axum::serve(listener, app(state, settings.body_limit_bytes)).await?;
    Ok(())
}
