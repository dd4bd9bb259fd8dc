//! Request extractors.

mod json_body;
mod list_query;

pub use json_body::OptionalJson;
pub use list_query::ListQuery;
