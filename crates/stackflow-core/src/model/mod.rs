//! Stack model
//!
//! Typed entities produced from the parsed configuration tree. Every type
//! here is immutable once `parser::load` returns.

mod resource;
mod scope;
mod stack;

pub use resource::*;
pub use scope::*;
pub use stack::*;
