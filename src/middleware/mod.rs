pub mod auth;
pub mod normalize;
pub mod response;

pub use auth::{guarded, CurrentUser, Gate};
pub use normalize::paged;
pub use response::{ApiResponse, ApiResult, ItemBody, PageBody, ACTION_OK};
