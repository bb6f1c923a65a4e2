//! Named sort orders for folder children.
//!
//! Comparators are looked up by name at configuration time, mirroring the
//! view registry. Folders always compare by title; the named order applies
//! to files, with title as the tie-breaker for stable output.

use std::cmp::Ordering;

use crate::error::{IndexError, Result};
use crate::tree::build::{FileEntry, FolderEntry};

/// A named, pluggable sort strategy.
pub trait ItemComparer: Send + Sync {
    fn name(&self) -> &'static str;

    fn compare_files(&self, a: &FileEntry, b: &FileEntry) -> Ordering;

    fn compare_folders(&self, a: &FolderEntry, b: &FolderEntry) -> Ordering {
        title_cmp(&a.name, &b.name)
    }
}

/// The order applied when none is configured.
pub(crate) fn default_order() -> Box<dyn ItemComparer> {
    Box::new(TitleComparer)
}

/// Looks up a comparator by name.
pub fn lookup(name: &str) -> Result<Box<dyn ItemComparer>> {
    match name {
        "title" => Ok(Box::new(TitleComparer)),
        "date" => Ok(Box::new(DateComparer)),
        "size" => Ok(Box::new(SizeComparer)),
        other => Err(IndexError::UnknownOrder(other.to_string())),
    }
}

fn title_cmp(a: &str, b: &str) -> Ordering {
    a.to_lowercase().cmp(&b.to_lowercase()).then_with(|| a.cmp(b))
}

/// Case-insensitive title order.
struct TitleComparer;

impl ItemComparer for TitleComparer {
    fn name(&self) -> &'static str {
        "title"
    }

    fn compare_files(&self, a: &FileEntry, b: &FileEntry) -> Ordering {
        title_cmp(&a.name, &b.name)
    }
}

/// Last-modified order, oldest first.
struct DateComparer;

impl ItemComparer for DateComparer {
    fn name(&self) -> &'static str {
        "date"
    }

    fn compare_files(&self, a: &FileEntry, b: &FileEntry) -> Ordering {
        a.modified
            .cmp(&b.modified)
            .then_with(|| title_cmp(&a.name, &b.name))
    }
}

/// File size order, smallest first.
struct SizeComparer;

impl ItemComparer for SizeComparer {
    fn name(&self) -> &'static str {
        "size"
    }

    fn compare_files(&self, a: &FileEntry, b: &FileEntry) -> Ordering {
        a.size
            .cmp(&b.size)
            .then_with(|| title_cmp(&a.name, &b.name))
    }
}
