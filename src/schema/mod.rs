//! Entity/relationship schema declared in code.

pub mod entities;
pub mod types;
pub mod validator;

pub use entities::*;
pub use types::*;
pub use validator::*;
