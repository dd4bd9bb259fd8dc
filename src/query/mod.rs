//! Find options: the query description handed to repositories.

mod options;
pub use options::*;
