// Common types and utilities shared across the application

pub mod approx_date;
pub mod entity_ids;
pub mod id;

pub use approx_date::ApproximateDate;
pub use entity_ids::*;
pub use id::Id;
