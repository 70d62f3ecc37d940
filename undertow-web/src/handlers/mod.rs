//! HTTP request handlers organized by functionality

pub mod health;
pub mod sources;

// Re-export handler functions
pub use health::health;
pub use sources::{ServerQuery, embed_all, embed_one, list_servers};
