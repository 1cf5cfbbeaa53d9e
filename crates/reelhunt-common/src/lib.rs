//! Reelhunt-Common: Shared types, identifiers, and errors.
//!
//! This crate provides functionality used across reelhunt:
//!
//! - **Typed IDs**: UUID wrapper for resolution jobs
//! - **Core Types**: media type, resolution tier, source kind and cache keys
//! - **Path Utilities**: video file detection by extension
//! - **Error Handling**: the resolution error taxonomy and result alias
//!
//! # Examples
//!
//! ```
//! use reelhunt_common::{ContentKey, Error, JobId, MediaType, Result};
//! use reelhunt_common::paths::is_video_file;
//! use std::path::Path;
//!
//! let job_id = JobId::new();
//! let key = ContentKey::episode("tt0386676", 2, 5);
//! assert_eq!(key.media_type, MediaType::Episode);
//!
//! assert!(is_video_file(Path::new("movie.mkv")));
//!
//! fn example() -> Result<()> {
//!     Err(Error::job_not_found(JobId::new()))
//! }
//! assert!(example().is_err());
//! # let _ = job_id;
//! ```

pub mod error;
pub mod ids;
pub mod paths;
pub mod types;

pub use error::{Error, ErrorKind, Result};
pub use ids::*;
pub use types::*;
