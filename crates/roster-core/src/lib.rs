//! Roster Core Library
//!
//! Domain error taxonomy and the repository port shared by every storage
//! backend.

// Re-export pure types from roster-types
pub use roster_types::*;

pub mod error;
pub mod ports;

pub use error::{ConflictField, Result, RosterError};
pub use ports::Repository;
