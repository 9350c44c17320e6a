//! Optional `/healthz` surface.
//!
//! Only started when `MH_DAEMON_ADDR` is set (spec.md treats the harness
//! as an embedded subsystem, not a service with its own public API); when
//! it is, this mirrors the teacher's health endpoint shape, reporting
//! pool reachability and the configured worker cohort size rather than a
//! bare 200.

use std::sync::Arc;

use axum::{extract::State, http::StatusCode, response::IntoResponse, routing::get, Json, Router};
use serde::Serialize;
use sqlx::PgPool;
use tower_http::trace::TraceLayer;

#[derive(Clone)]
pub struct HealthState {
    pub pool: PgPool,
    pub worker_count: u32,
}

#[derive(Serialize)]
struct HealthResponse {
    db_reachable: bool,
    worker_count: u32,
}

pub fn build_router(state: Arc<HealthState>) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
}

async fn healthz(State(st): State<Arc<HealthState>>) -> impl IntoResponse {
    let db_reachable = sqlx::query("select 1").fetch_one(&st.pool).await.is_ok();
    let status = if db_reachable { StatusCode::OK } else { StatusCode::SERVICE_UNAVAILABLE };
    (status, Json(HealthResponse { db_reachable, worker_count: st.worker_count }))
}
