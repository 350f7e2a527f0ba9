mod common;

use anyhow::Result;
use axum::http::StatusCode;
use serde_json::json;

use microfinance_api::auth::TokenKind;

#[tokio::test]
async fn root_describes_service() -> Result<()> {
    let (app, _) = common::offline_app();
    let (status, body) = common::call(&app, common::get("/")).await?;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["name"], "Microfinance API");
    Ok(())
}

#[tokio::test]
async fn health_degrades_without_database() -> Result<()> {
    let (app, _) = common::offline_app();
    let (status, body) = common::call(&app, common::get("/health")).await?;

    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body["success"], false);
    assert_eq!(body["data"]["status"], "degraded");
    Ok(())
}

#[tokio::test]
async fn protected_route_requires_bearer_token() -> Result<()> {
    let (app, _) = common::offline_app();
    let (status, body) = common::call(&app, common::get("/api/v1/users/paginate")).await?;

    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body, json!({ "error": "not authorized to access this resource" }));
    Ok(())
}

#[tokio::test]
async fn gate_runs_before_query_normalizer() -> Result<()> {
    let (app, _) = common::offline_app();
    let (status, _) = common::call(&app, common::get("/api/v1/loans/paginate?filters=%7Boops")).await?;

    assert_eq!(status, StatusCode::UNAUTHORIZED);
    Ok(())
}

#[tokio::test]
async fn garbage_token_is_rejected() -> Result<()> {
    let (app, _) = common::offline_app();
    let (status, body) = common::call(&app, common::get_with_token("/api/v1/roles/all", "not-a-jwt")).await?;

    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"], "invalid or expired token");
    Ok(())
}

#[tokio::test]
async fn refresh_token_cannot_authorize_requests() -> Result<()> {
    let (app, state) = common::offline_app();
    let refresh = state.auth.issue(TokenKind::Refresh, 1, None)?;
    let (status, _) = common::call(&app, common::get_with_token("/api/v1/users/permissions", &refresh)).await?;

    assert_eq!(status, StatusCode::UNAUTHORIZED);
    Ok(())
}

#[tokio::test]
async fn v2_create_routes_are_gated() -> Result<()> {
    let (app, _) = common::offline_app();
    for uri in ["/api/v2/roles/roles", "/api/v2/agents/create", "/api/v2/loans/create", "/api/v2/media/new"] {
        let (status, _) = common::call(&app, common::post_json(uri, &json!({}))).await?;
        assert_eq!(status, StatusCode::UNAUTHORIZED, "{} should require a token", uri);
    }
    Ok(())
}

#[tokio::test]
async fn stk_push_requires_caller_but_webhooks_do_not() -> Result<()> {
    let (app, _) = common::offline_app();

    let (status, _) = common::call(&app, common::post_json("/api/v1/mpesa/stk-push", &json!({}))).await?;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    // Malformed webhook body fails on parsing, not on auth.
    let (status, body) = common::call(&app, common::post_json("/api/v1/mpesa/b2c-result", &json!({}))).await?;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body, json!({ "error": "Invalid request" }));
    Ok(())
}
