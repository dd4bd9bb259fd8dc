mod exec;
pub mod patch;
mod persist;
pub mod repository;

pub use patch::{Patch, RelationValue, WriteMode};
pub use repository::{Repositories, Repository};
