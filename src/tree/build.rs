//! Filesystem walk and skeleton tree construction.
//!
//! The walk reads directory entries sorted by name so that identical
//! filesystem state always produces an identical skeleton. Unreadable
//! entries are logged and skipped; only an unreadable root is fatal to the
//! build.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use crate::error::Result;
use crate::tree::sort::ItemComparer;
use crate::tree::views::ViewTransform;
use crate::types::{MediaKind, MediaTypes};

/// A folder node of the skeleton tree built during a rescan.
#[derive(Debug)]
pub struct FolderEntry {
    pub name: String,
    pub path: PathBuf,
    pub folders: Vec<FolderEntry>,
    pub files: Vec<FileEntry>,
}

impl FolderEntry {
    pub fn new(name: String, path: PathBuf) -> Self {
        Self {
            name,
            path,
            folders: Vec::new(),
            files: Vec::new(),
        }
    }

    /// True if this folder holds no files and no folders.
    pub fn is_empty(&self) -> bool {
        self.files.is_empty() && self.folders.is_empty()
    }
}

/// A file node of the skeleton tree, with the metadata fingerprint used
/// for identity reconciliation.
#[derive(Debug, Clone)]
pub struct FileEntry {
    pub name: String,
    pub path: PathBuf,
    pub size: u64,
    pub modified: SystemTime,
    pub kind: MediaKind,
}

/// Builds the skeleton tree for one rescan.
///
/// Walks the directory tree under `root`, keeping files whose kind is in
/// `types`, then applies `views` in order, prunes empty branches, and sorts
/// all children recursively with `order`.
pub fn build_tree(
    root: &Path,
    types: MediaTypes,
    views: &[Box<dyn ViewTransform>],
    order: &dyn ItemComparer,
    descending: bool,
) -> Result<FolderEntry> {
    let name = root
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| root.display().to_string());
    let mut tree = walk(root, name, types)?;

    for view in views {
        view.transform(&mut tree);
    }
    prune_empty(&mut tree);
    sort_tree(&mut tree, order, descending);
    Ok(tree)
}

/// Walks one directory. Errors on child entries are logged and skipped;
/// only failure to read `dir` itself is returned.
fn walk(dir: &Path, name: String, types: MediaTypes) -> Result<FolderEntry> {
    let mut folder = FolderEntry::new(name, dir.to_path_buf());

    let mut children: Vec<PathBuf> = fs::read_dir(dir)?
        .filter_map(|entry| match entry {
            Ok(entry) => Some(entry.path()),
            Err(error) => {
                log::warn!("skipping unreadable entry in {}: {}", dir.display(), error);
                None
            }
        })
        .collect();
    children.sort();

    for path in children {
        let metadata = match fs::metadata(&path) {
            Ok(metadata) => metadata,
            Err(error) => {
                log::warn!("skipping {}: {}", path.display(), error);
                continue;
            }
        };
        let child_name = match path.file_name() {
            Some(name) => name.to_string_lossy().into_owned(),
            None => continue,
        };

        if metadata.is_dir() {
            match walk(&path, child_name, types) {
                Ok(child) => folder.folders.push(child),
                Err(error) => {
                    log::warn!("skipping unreadable directory {}: {}", path.display(), error);
                }
            }
        } else if metadata.is_file() {
            let Some(kind) = MediaKind::from_path(&path) else {
                continue;
            };
            if !types.accepts(kind) {
                continue;
            }
            folder.files.push(FileEntry {
                name: child_name,
                path,
                size: metadata.len(),
                modified: metadata.modified().unwrap_or(SystemTime::UNIX_EPOCH),
                kind,
            });
        }
    }

    Ok(folder)
}

/// Removes child folders that end up with no files and no non-empty
/// subfolders, recursively. The root itself is never removed.
pub fn prune_empty(folder: &mut FolderEntry) {
    folder.folders.retain_mut(|child| {
        prune_empty(child);
        !child.is_empty()
    });
}

/// Applies the sort order to all folder children, recursively.
pub fn sort_tree(folder: &mut FolderEntry, order: &dyn ItemComparer, descending: bool) {
    folder
        .folders
        .sort_by(|a, b| order.compare_folders(a, b));
    folder.files.sort_by(|a, b| order.compare_files(a, b));
    if descending {
        folder.folders.reverse();
        folder.files.reverse();
    }
    for child in &mut folder.folders {
        sort_tree(child, order, descending);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tree::sort;
    use std::fs::File;
    use std::io::Write;
    use tempfile::TempDir;

    fn build(temp: &TempDir, types: MediaTypes) -> FolderEntry {
        let order = sort::lookup("title").unwrap();
        build_tree(temp.path(), types, &[], order.as_ref(), false).unwrap()
    }

    #[test]
    fn walk_filters_by_accepted_types() {
        let temp = TempDir::new().unwrap();
        File::create(temp.path().join("song.mp3")).unwrap();
        File::create(temp.path().join("clip.mkv")).unwrap();
        File::create(temp.path().join("notes.txt")).unwrap();

        let tree = build(&temp, MediaTypes::AUDIO);
        let names: Vec<_> = tree.files.iter().map(|f| f.name.as_str()).collect();
        assert_eq!(names, vec!["song.mp3"]);
    }

    #[test]
    fn walk_mirrors_directory_structure() {
        let temp = TempDir::new().unwrap();
        fs::create_dir(temp.path().join("album")).unwrap();
        File::create(temp.path().join("album/track.flac")).unwrap();

        let tree = build(&temp, MediaTypes::AUDIO);
        assert_eq!(tree.folders.len(), 1);
        assert_eq!(tree.folders[0].name, "album");
        assert_eq!(tree.folders[0].files[0].name, "track.flac");
    }

    #[test]
    fn empty_branches_are_pruned() {
        let temp = TempDir::new().unwrap();
        fs::create_dir_all(temp.path().join("empty/nested")).unwrap();
        fs::create_dir(temp.path().join("full")).unwrap();
        File::create(temp.path().join("full/a.mp3")).unwrap();

        let tree = build(&temp, MediaTypes::AUDIO);
        let names: Vec<_> = tree.folders.iter().map(|f| f.name.as_str()).collect();
        assert_eq!(names, vec!["full"]);
    }

    #[test]
    fn file_entries_carry_fingerprint_metadata() {
        let temp = TempDir::new().unwrap();
        let mut file = File::create(temp.path().join("a.mp3")).unwrap();
        file.write_all(&[0u8; 64]).unwrap();
        drop(file);

        let tree = build(&temp, MediaTypes::AUDIO);
        let entry = &tree.files[0];
        assert_eq!(entry.size, 64);
        assert!(entry.modified > SystemTime::UNIX_EPOCH);
        assert_eq!(entry.kind, MediaKind::Audio);
    }

    #[test]
    fn descending_reverses_order() {
        let temp = TempDir::new().unwrap();
        for name in ["a.mp3", "b.mp3", "c.mp3"] {
            File::create(temp.path().join(name)).unwrap();
        }

        let order = sort::lookup("title").unwrap();
        let tree = build_tree(temp.path(), MediaTypes::AUDIO, &[], order.as_ref(), true).unwrap();
        let names: Vec<_> = tree.files.iter().map(|f| f.name.as_str()).collect();
        assert_eq!(names, vec!["c.mp3", "b.mp3", "a.mp3"]);
    }

    #[test]
    fn unreadable_root_is_fatal() {
        let temp = TempDir::new().unwrap();
        let missing = temp.path().join("gone");
        let order = sort::lookup("title").unwrap();
        let result = build_tree(&missing, MediaTypes::all(), &[], order.as_ref(), false);
        assert!(result.is_err());
    }
}
