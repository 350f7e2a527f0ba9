// handlers/users/mod.rs - /api/v1/users
//
// account: registration, activation and password recovery (public)
// session: login and token refresh (public)
// admin:   listing, statistics, role assignment and the caller's permissions

pub mod account;
pub mod admin;
pub mod session;

pub use account::{activate_put, forgot_password_post, register_post, reset_password_put};
pub use admin::{count_get, monthly_get, permissions_get, user_get, user_patch, users_get};
pub use session::{login_post, refresh_post};
