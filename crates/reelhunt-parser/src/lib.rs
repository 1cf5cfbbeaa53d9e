//! # reelhunt-parser
//!
//! Pure functions for reasoning about media release names.
//!
//! - [`variants`] expands a requested title into an ordered list of probe strings
//! - [`quality`] infers a [`ResolutionTier`] from a file name and rejects files
//!   that are implausibly small for their claimed tier
//! - [`audio`] scores a release by its language and subtitle markers
//! - [`release`] tokenizes file names and matches them against title variants
//!
//! ## Quick Start
//!
//! ```
//! use reelhunt_parser::{audio, quality, variants};
//! use reelhunt_common::ResolutionTier;
//!
//! let probes = variants::title_variants("The Office (US)", Some(2005));
//! assert_eq!(probes[0], "The Office (US)");
//! assert_eq!(probes[1], "The Office");
//!
//! let tier = quality::classify_resolution("The.Office.US.S01E01.1080p.WEB-DL.mkv");
//! assert_eq!(tier, ResolutionTier::P1080);
//!
//! assert_eq!(audio::score("Movie.2019.1080p.ENG+DUAL"), 50);
//! ```
//!
//! Nothing in this crate performs I/O or fails; every function is total.

pub mod audio;
pub mod quality;
pub mod release;
pub mod variants;

pub use reelhunt_common::ResolutionTier;
pub use release::{ReleaseName, TitleMatch};
