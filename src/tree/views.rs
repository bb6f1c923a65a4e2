//! Named view transformations.
//!
//! A view rewrites the skeleton tree after the walk and before cleanup,
//! allowing synthetic restructuring of the hierarchy. Views are looked up
//! by name and applied in registration order.
//!
//! Synthetic folders take their path under the root so they can carry a
//! stable identity across rescans like any real folder.

use chrono::{DateTime, Datelike, Utc};

use crate::error::{IndexError, Result};
use crate::tree::build::{FileEntry, FolderEntry};
use crate::types::MediaKind;

/// A named, pluggable tree-rewrite strategy.
pub trait ViewTransform: Send + Sync {
    fn name(&self) -> &'static str;

    fn transform(&self, root: &mut FolderEntry);
}

/// Looks up a view by name.
pub fn lookup(name: &str) -> Result<Box<dyn ViewTransform>> {
    match name {
        "flatten" => Ok(Box::new(FlattenView)),
        "bytype" => Ok(Box::new(ByTypeView)),
        "bydate" => Ok(Box::new(ByDateView)),
        other => Err(IndexError::UnknownView(other.to_string())),
    }
}

/// Moves every file in the subtree into `out`, leaving folders empty.
fn drain_files(folder: &mut FolderEntry, out: &mut Vec<FileEntry>) {
    out.append(&mut folder.files);
    for child in &mut folder.folders {
        drain_files(child, out);
    }
    folder.folders.clear();
}

/// Collapses the whole hierarchy into a single flat folder of files.
struct FlattenView;

impl ViewTransform for FlattenView {
    fn name(&self) -> &'static str {
        "flatten"
    }

    fn transform(&self, root: &mut FolderEntry) {
        let mut files = Vec::new();
        drain_files(root, &mut files);
        root.files = files;
    }
}

/// Regroups all files into one synthetic folder per media kind.
struct ByTypeView;

impl ViewTransform for ByTypeView {
    fn name(&self) -> &'static str {
        "bytype"
    }

    fn transform(&self, root: &mut FolderEntry) {
        let mut files = Vec::new();
        drain_files(root, &mut files);

        for kind in [MediaKind::Audio, MediaKind::Image, MediaKind::Video] {
            let group: Vec<FileEntry> = files
                .iter()
                .filter(|file| file.kind == kind)
                .cloned()
                .collect();
            if group.is_empty() {
                continue;
            }
            let mut folder =
                FolderEntry::new(kind.as_str().to_string(), root.path.join(kind.as_str()));
            folder.files = group;
            root.folders.push(folder);
        }
    }
}

/// Regroups all files into one synthetic folder per modification year.
struct ByDateView;

impl ViewTransform for ByDateView {
    fn name(&self) -> &'static str {
        "bydate"
    }

    fn transform(&self, root: &mut FolderEntry) {
        let mut files = Vec::new();
        drain_files(root, &mut files);

        let mut years: Vec<i32> = files
            .iter()
            .map(|file| DateTime::<Utc>::from(file.modified).year())
            .collect();
        years.sort_unstable();
        years.dedup();

        for year in years {
            let group: Vec<FileEntry> = files
                .iter()
                .filter(|file| DateTime::<Utc>::from(file.modified).year() == year)
                .cloned()
                .collect();
            let label = year.to_string();
            let mut folder = FolderEntry::new(label.clone(), root.path.join(&label));
            folder.files = group;
            root.folders.push(folder);
        }
    }
}
