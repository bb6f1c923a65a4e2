//! Index tree nodes.
//!
//! An [`Item`] is one node of a swapped-in generation: either a folder with
//! ordered children or a media file with its metadata fingerprint. Items are
//! shared via `Arc` between the tree and the generation's id map; parent
//! links are `Weak` back-references set once during linking.
//!
//! Everything on an item is immutable after the generation is built, except
//! the file cover slot, which the enrichment pass fills in later.

use std::path::{Path, PathBuf};
use std::sync::{Arc, OnceLock, Weak};
use std::time::SystemTime;

use parking_lot::Mutex;

use crate::types::{Cover, MediaKind};

/// One node of the index tree.
#[derive(Debug)]
pub struct Item {
    id: String,
    name: String,
    path: PathBuf,
    parent: OnceLock<Weak<Item>>,
    payload: ItemPayload,
}

#[derive(Debug)]
enum ItemPayload {
    Folder {
        folders: Vec<Arc<Item>>,
        files: Vec<Arc<Item>>,
    },
    File {
        size: u64,
        modified: SystemTime,
        kind: MediaKind,
        cover: Mutex<Option<Arc<Cover>>>,
    },
}

impl Item {
    /// Creates a folder item and links its children's parent references.
    pub(crate) fn folder(
        id: String,
        name: String,
        path: PathBuf,
        folders: Vec<Arc<Item>>,
        files: Vec<Arc<Item>>,
    ) -> Arc<Self> {
        let item = Arc::new(Self {
            id,
            name,
            path,
            parent: OnceLock::new(),
            payload: ItemPayload::Folder { folders, files },
        });
        if let ItemPayload::Folder { folders, files } = &item.payload {
            for child in folders.iter().chain(files.iter()) {
                let _ = child.parent.set(Arc::downgrade(&item));
            }
        }
        item
    }

    /// Creates a file item, optionally seeded with a carried-over cover.
    pub(crate) fn file(
        id: String,
        name: String,
        path: PathBuf,
        size: u64,
        modified: SystemTime,
        kind: MediaKind,
        cover: Option<Arc<Cover>>,
    ) -> Arc<Self> {
        Arc::new(Self {
            id,
            name,
            path,
            parent: OnceLock::new(),
            payload: ItemPayload::File {
                size,
                modified,
                kind,
                cover: Mutex::new(cover),
            },
        })
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// The containing folder, or `None` for the root.
    pub fn parent(&self) -> Option<Arc<Item>> {
        self.parent.get().and_then(Weak::upgrade)
    }

    pub fn is_folder(&self) -> bool {
        matches!(self.payload, ItemPayload::Folder { .. })
    }

    pub fn is_file(&self) -> bool {
        matches!(self.payload, ItemPayload::File { .. })
    }

    /// Child folders, in sorted order. Empty for files.
    pub fn folders(&self) -> &[Arc<Item>] {
        match &self.payload {
            ItemPayload::Folder { folders, .. } => folders,
            ItemPayload::File { .. } => &[],
        }
    }

    /// Child files, in sorted order. Empty for files.
    pub fn files(&self) -> &[Arc<Item>] {
        match &self.payload {
            ItemPayload::Folder { files, .. } => files,
            ItemPayload::File { .. } => &[],
        }
    }

    pub fn size(&self) -> Option<u64> {
        match &self.payload {
            ItemPayload::File { size, .. } => Some(*size),
            ItemPayload::Folder { .. } => None,
        }
    }

    pub fn modified(&self) -> Option<SystemTime> {
        match &self.payload {
            ItemPayload::File { modified, .. } => Some(*modified),
            ItemPayload::Folder { .. } => None,
        }
    }

    pub fn kind(&self) -> Option<MediaKind> {
        match &self.payload {
            ItemPayload::File { kind, .. } => Some(*kind),
            ItemPayload::Folder { .. } => None,
        }
    }

    /// The enrichment data for this file, if any has been loaded.
    pub fn cover(&self) -> Option<Arc<Cover>> {
        match &self.payload {
            ItemPayload::File { cover, .. } => cover.lock().clone(),
            ItemPayload::Folder { .. } => None,
        }
    }

    /// Sets the cover on a file item. No-op on folders.
    pub fn set_cover(&self, cover: Arc<Cover>) {
        if let ItemPayload::File { cover: slot, .. } = &self.payload {
            *slot.lock() = Some(cover);
        }
    }
}
