//! Acquisition domain: state machine and per-item record.

pub mod entity;
pub mod state;

pub use entity::AcquisitionItem;
pub use state::AcquisitionState;
