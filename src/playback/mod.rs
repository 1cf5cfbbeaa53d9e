//! Client side of playback: throughput measurement, stutter detection and
//! fallback to a lower-bitrate stream.
//!
//! A player owns one [`PlaybackSession`] and feeds buffering events to a
//! [`FallbackController`]. The controller asks a [`FallbackSource`] (the
//! in-process resolver or a remote server via [`ApiClient`]) for an alternate
//! at most once per session until the session is reset.

pub mod client;
pub mod meter;
pub mod session;
pub mod stutter;

pub use client::ApiClient;
pub use meter::{measure, Measurement};
pub use session::{FallbackController, FallbackSource, NowPlaying, PlaybackSession};
pub use stutter::{StutterConfig, StutterWindow};
