//! In-memory media directory index.
//!
//! This crate maintains a hierarchical index of a directory subtree for a
//! media-serving process:
//! - stable opaque item ids preserved across filesystem changes,
//! - debounced change notifications coalesced into whole-tree rescans,
//! - identity-preserving reconciliation between index generations,
//! - opportunistic background cover enrichment that never blocks lookups.
//!
//! The wire protocol serving the index, the cover cache's storage format,
//! and cover pixel extraction are all external collaborators; see
//! [`CoverStore`] and [`CoverSource`].

pub mod debounce;
pub mod enrich;
pub mod error;
pub mod index;
pub mod item;
pub mod registry;
pub mod tree;
pub mod types;
pub mod watch;

// Re-export main types
pub use enrich::{CoverSource, CoverStore};
pub use error::{IndexError, Result};
pub use index::{IndexEvent, MediaIndex, MediaIndexBuilder};
pub use item::Item;
pub use registry::{Fingerprint, Generation, IdentityRegistry, ROOT_ID};
pub use types::{Cover, MediaKind, MediaTypes};
