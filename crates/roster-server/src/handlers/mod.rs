//! HTTP handlers

pub mod groups;
pub mod health;
pub mod users;

pub use health::health;
