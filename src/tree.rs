//! Tree construction for the media index.
//!
//! A rescan builds an unlinked skeleton tree first: plain owned
//! [`FolderEntry`]/[`FileEntry`] nodes mirroring the directory structure,
//! filtered by accepted media kinds. View transformations then restructure
//! the skeleton, empty branches are pruned, and the configured sort order is
//! applied. Identity assignment happens afterwards, in the registry.
//!
//! ## Module structure
//!
//! - `build` - Skeleton node types, the filesystem walk, cleanup and sort
//! - `sort` - `ItemComparer` trait plus the named built-in orders
//! - `views` - `ViewTransform` trait plus the named built-in views

pub mod build;
pub mod sort;
pub mod views;

pub use build::{build_tree, FileEntry, FolderEntry};
pub use sort::ItemComparer;
pub use views::ViewTransform;
