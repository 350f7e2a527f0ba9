// handlers/system.rs - GET / and GET /health

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json};
use serde_json::{json, Value};

use crate::database::DatabaseManager;
use crate::state::AppState;

pub async fn root() -> Json<Value> {
    let version = env!("CARGO_PKG_VERSION");

    Json(json!({
        "success": true,
        "data": {
            "name": "Microfinance API",
            "version": version,
            "description": "Back office for microfinance lending: geography, members, groups and loans",
            "endpoints": {
                "geography": "/api/v1/{countries,regions,counties,sub-counties,wards,locations,sub-locations,villages,roads,plots,units}",
                "users": "/api/v1/users",
                "access": "/api/v1/roles, /api/v1/permissions",
                "people": "/api/v1/agents, /api/v1/officers, /api/v1/members",
                "lending": "/api/v1/groups, /api/v1/loans",
                "media": "/api/v1/media",
                "mpesa": "/api/v1/mpesa",
                "create_only": "/api/v2/*"
            }
        }
    }))
}

pub async fn health(State(state): State<AppState>) -> impl IntoResponse {
    let now = chrono::Utc::now();

    match DatabaseManager::health_check(&state.pool).await {
        Ok(_) => (
            StatusCode::OK,
            Json(json!({
                "success": true,
                "data": {
                    "status": "ok",
                    "timestamp": now,
                    "database": "ok"
                }
            })),
        ),
        Err(e) => {
            tracing::warn!("Health check failed: {}", e);
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(json!({
                    "success": false,
                    "error": "database unavailable",
                    "data": {
                        "status": "degraded",
                        "timestamp": now
                    }
                })),
            )
        }
    }
}
