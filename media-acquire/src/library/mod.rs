//! Library placement and media-center refresh.

pub mod media_center;
pub mod publisher;

pub use media_center::{JellyfinMediaCenter, MediaCenter, MediaCenterConfig, PlexMediaCenter};
pub use publisher::{LibraryPublisher, PublishedPayload};
