//! Operational routes: liveness, readiness against the synchronized schema, build info.

use crate::state::AppState;
use axum::{extract::State, http::StatusCode, routing::get, Json, Router};
use serde::Serialize;

#[derive(Serialize)]
struct HealthBody {
    status: &'static str,
}

#[derive(Serialize)]
struct ReadyBody {
    status: &'static str,
    database: &'static str,
    schema: &'static str,
}

async fn health() -> Json<HealthBody> {
    Json(HealthBody { status: "ok" })
}

/// The join table is created after every entity table, so its presence means the schema was synchronized.
const SCHEMA_SYNCED: &str = "SELECT to_regclass('public.post_tags') IS NOT NULL";

async fn ready(State(state): State<AppState>) -> (StatusCode, Json<ReadyBody>) {
    let body = match sqlx::query_scalar::<_, bool>(SCHEMA_SYNCED).fetch_one(&state.pool).await {
        Ok(true) => ReadyBody {
            status: "ok",
            database: "ok",
            schema: "ok",
        },
        Ok(false) => {
            tracing::warn!("readiness: tables missing, run with SYNCHRONIZE=true");
            ReadyBody {
                status: "degraded",
                database: "ok",
                schema: "missing",
            }
        }
        Err(e) => {
            tracing::warn!(error = %e, "readiness: database unavailable");
            ReadyBody {
                status: "degraded",
                database: "unavailable",
                schema: "unknown",
            }
        }
    };
    let status = if body.status == "ok" {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    (status, Json(body))
}

async fn version() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "name": env!("CARGO_PKG_NAME"),
        "version": env!("CARGO_PKG_VERSION")
    }))
}

/// GET /health, GET /ready (database and schema), GET /version.
pub fn common_routes_with_ready(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/ready", get(ready))
        .route("/version", get(version))
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::standard_model;
    use axum::{body::to_bytes, body::Body, http::Request};
    use sqlx::postgres::PgPoolOptions;
    use std::time::Duration;
    use tower::ServiceExt;

    fn unreachable_state() -> AppState {
        let pool = PgPoolOptions::new()
            .acquire_timeout(Duration::from_millis(200))
            .connect_lazy("postgres://nobody@127.0.0.1:1/none")
            .unwrap();
        AppState::new(pool, standard_model().unwrap()).unwrap()
    }

    async fn get_json(app: Router, uri: &str) -> (StatusCode, serde_json::Value) {
        let res = app
            .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();
        let status = res.status();
        let bytes = to_bytes(res.into_body(), usize::MAX).await.unwrap();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    #[tokio::test]
    async fn health_needs_no_database() {
        let (status, body) = get_json(common_routes_with_ready(unreachable_state()), "/health").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "ok");
    }

    #[tokio::test]
    async fn version_reports_the_package() {
        let (_, body) = get_json(common_routes_with_ready(unreachable_state()), "/version").await;
        assert_eq!(body["name"], "relations-api");
    }

    #[tokio::test]
    async fn ready_degrades_without_database() {
        let (status, body) = get_json(common_routes_with_ready(unreachable_state()), "/ready").await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(body["status"], "degraded");
        assert_eq!(body["database"], "unavailable");
        assert_eq!(body["schema"], "unknown");
    }
}
