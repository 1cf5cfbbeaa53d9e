//! Reelhunt - playable source resolution
//!
//! This library crate exposes the core functionality for integration testing.

pub mod bandwidth;
pub mod cache;
pub mod config;
pub mod jobs;
pub mod playback;
pub mod resolver;
pub mod server;
