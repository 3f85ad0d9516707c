//! media-acquire library crate.
//!
//! Supervises torrent acquisition of tracked episodes and movies: candidate
//! discovery, submission to a download backend, transfer monitoring, and
//! publication into a media library.

pub mod acquisition;
pub mod config;
pub mod database;
pub mod discovery;
pub mod domain;
pub mod downloader;
pub mod error;
pub mod library;
pub mod logging;
pub mod notification;
pub mod scheduler;
pub mod services;
pub mod utils;

pub use error::{Error, Result};
