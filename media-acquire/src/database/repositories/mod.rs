//! Repository layer for database access.

pub mod media_item;

pub use media_item::{InMemoryMediaItemRepository, MediaItemRepository, SqlxMediaItemRepository};
