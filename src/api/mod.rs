pub mod extract;
pub mod transform;
pub mod validation;

pub use extract::{parse_id, Body, Id, Valid};
pub use transform::{choices, project, project_one, Choice, Field};
