//! Database query modules.
//!
//! - resolved_links: append-only cache of resolved stream links

pub mod resolved_links;
