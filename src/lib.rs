pub mod config;
pub mod error;
pub mod hierarchy;
pub mod models;
pub mod openapi;
pub mod path;
pub mod query;
pub mod repo;
pub mod routes;
pub mod tree;

// Re-export commonly used items for tests / external users
pub use routes::{config, AppState};
