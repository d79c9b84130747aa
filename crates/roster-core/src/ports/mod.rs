//! Port traits (interfaces) for dependency injection

pub mod repository;

pub use repository::Repository;
