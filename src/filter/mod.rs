pub mod types;
pub mod params;
pub mod filter;
pub mod filter_where;
pub mod filter_order;
pub mod error;

pub use types::*;
pub use params::{PageRequest, QueryRules};
pub use filter::Filter;
