//! Domain layer: media items, candidates and the acquisition state machine.

pub mod acquisition;
pub mod candidate;
pub mod media;

pub use acquisition::{AcquisitionItem, AcquisitionState};
pub use candidate::Candidate;
pub use media::{EpisodeInfo, LibraryRoots, LibraryTarget, MediaItem, MediaKind, MovieInfo};
