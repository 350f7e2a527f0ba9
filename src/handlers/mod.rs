// handlers/mod.rs - HTTP handlers, one module per resource
//
// Handlers receive already-authorized requests: the gate and the query
// normalizer run as route layers (see routes.rs) and leave `CurrentUser` and
// `PageRequest` in the request extensions.

pub mod geo;
pub mod groups;
pub mod loans;
pub mod media;
pub mod members;
pub mod mpesa;
pub mod permissions;
pub mod profiles;
pub mod roles;
pub mod system;
pub mod users;

use crate::error::ApiError;
use crate::services::notifier::Email;
use crate::state::AppState;

/// Sends through the configured mail alias; a failed send is a 500 with `failure` as the message.
pub(crate) async fn deliver(state: &AppState, email: &Email, failure: &'static str) -> Result<(), ApiError> {
    state.notifier.send(state.config.mail_alias(), email).await.map_err(|e| {
        tracing::error!(to = %email.to, "{}: {}", failure, e);
        ApiError::internal_server_error(failure)
    })
}
