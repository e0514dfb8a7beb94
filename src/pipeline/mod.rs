//! Pipeline module - normalization, aggregation and reshaping stages

pub mod aggregate;
pub mod buckets;
pub mod error;
pub mod loader;
pub mod model;
pub mod reshape;
pub mod schema;

pub use aggregate::*;
pub use buckets::*;
pub use error::*;
pub use loader::*;
pub use model::*;
pub use reshape::*;
pub use schema::*;
