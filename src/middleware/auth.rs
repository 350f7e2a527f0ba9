use axum::{
    extract::{Request, State},
    http::HeaderMap,
    middleware::{from_fn_with_state, Next},
    response::Response,
    routing::MethodRouter,
};

use crate::auth::TokenKind;
use crate::database::models::{Permission, User};
use crate::database::{DatabaseError, Repository};
use crate::error::ApiError;
use crate::state::AppState;

pub const NOT_AUTHORIZED: &str = "not authorized to access this resource";
pub const FORBIDDEN: &str = "you do not have the required permissions to access this resource";

/// Authenticated caller with the union of their roles' permissions
#[derive(Clone, Debug)]
pub struct CurrentUser {
    pub id: i64,
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub mobile_number: String,
    pub permissions: Vec<String>,
}

impl CurrentUser {
    pub fn has(&self, permission: &str) -> bool {
        self.permissions.iter().any(|p| p == permission)
    }
}

/// Middleware state: the app plus the permissions a route requires
#[derive(Clone)]
pub struct Gate {
    state: AppState,
    required: &'static [&'static str],
}

/// Wraps a route so it runs only for callers holding every listed permission;
/// an empty list admits any authenticated caller.
pub fn guarded(route: MethodRouter<AppState>, state: &AppState, required: &'static [&'static str]) -> MethodRouter<AppState> {
    route.route_layer(from_fn_with_state(Gate { state: state.clone(), required }, authorize))
}

pub async fn authorize(State(gate): State<Gate>, headers: HeaderMap, mut request: Request, next: Next) -> Result<Response, ApiError> {
    let token = extract_bearer(&headers).ok_or_else(|| ApiError::unauthorized(NOT_AUTHORIZED))?;

    let claims = gate
        .state
        .auth
        .decode(TokenKind::Access, token)
        .map_err(|_| ApiError::unauthorized("invalid or expired token"))?;
    let user_id = claims
        .user_id()
        .map_err(|_| ApiError::unauthorized("Invalid user ID in token"))?;

    let user = load_user(&gate.state, user_id).await?;

    if let Some(missing) = gate.required.iter().find(|p| !user.has(p)) {
        tracing::debug!(user_id, permission = missing, "Permission check failed");
        return Err(ApiError::forbidden(FORBIDDEN));
    }

    request.extensions_mut().insert(user);
    Ok(next.run(request).await)
}

async fn load_user(state: &AppState, user_id: i64) -> Result<CurrentUser, ApiError> {
    let lookup_failed = |e: DatabaseError| {
        tracing::error!("Failed to load user {}: {}", user_id, e);
        ApiError::internal_server_error("Failed to fetch user details")
    };

    let user = Repository::<User>::of(&state.pool)
        .find(user_id)
        .await
        .map_err(lookup_failed)?
        .ok_or_else(|| ApiError::not_found("User not found"))?;
    let permissions = Permission::names_for_user(&state.pool, user_id).await.map_err(lookup_failed)?;

    Ok(CurrentUser {
        id: user.id,
        first_name: user.first_name,
        last_name: user.last_name,
        email: user.email,
        mobile_number: user.mobile_number,
        permissions,
    })
}

/// Token from `Authorization: Bearer <token>`
fn extract_bearer(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(axum::http::header::AUTHORIZATION)?
        .to_str()
        .ok()?
        .strip_prefix("Bearer ")
        .map(str::trim)
        .filter(|token| !token.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn headers(value: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(axum::http::header::AUTHORIZATION, HeaderValue::from_str(value).unwrap());
        headers
    }

    #[test]
    fn bearer_token_is_extracted() {
        assert_eq!(extract_bearer(&headers("Bearer abc.def")), Some("abc.def"));
        assert_eq!(extract_bearer(&headers("Bearer ")), None);
        assert_eq!(extract_bearer(&headers("Basic abc")), None);
        assert_eq!(extract_bearer(&HeaderMap::new()), None);
    }

    #[test]
    fn permission_lookup_is_exact() {
        let user = CurrentUser {
            id: 1,
            first_name: "A".into(),
            last_name: "B".into(),
            email: "a@b.c".into(),
            mobile_number: "0700".into(),
            permissions: vec!["view_loans".into()],
        };
        assert!(user.has("view_loans"));
        assert!(!user.has("view_loan"));
    }
}
