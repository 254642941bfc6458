//! Data models for the project synchronization service.
//!
//! Wire names are camelCase to match the frontend Project interface.

mod member;
mod project;
mod state;
pub mod timestamp;

pub use member::*;
pub use project::*;
pub use state::*;
