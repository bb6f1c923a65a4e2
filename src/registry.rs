//! Identity registry and generations.
//!
//! A [`Generation`] is one complete index snapshot: the linked item tree
//! plus the id→item and path→id maps valid for it. Reconciliation maps a
//! freshly built skeleton tree onto the previous generation's identities:
//! a file keeps its id (and its enrichment data) only when path, modified
//! time, and size all match the prior entry; folders keep their id by path
//! alone. Everything else gets a fresh random id.
//!
//! The (mtime, size) fingerprint is a heuristic, not a content hash: a file
//! rewritten with identical size within the clock resolution is
//! indistinguishable from unchanged. That is a documented limitation, kept
//! deliberately so rescans never have to read file content.

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::SystemTime;

use rand::Rng;

use crate::error::{IndexError, Result};
use crate::item::Item;
use crate::tree::build::{FileEntry, FolderEntry};
use crate::types::Cover;

/// The root folder always carries this id.
pub const ROOT_ID: &str = "0";

/// The (mtime, size) pair used to detect unchanged files across rescans.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Fingerprint {
    pub modified: SystemTime,
    pub size: u64,
}

impl Fingerprint {
    fn of(entry: &FileEntry) -> Self {
        Self {
            modified: entry.modified,
            size: entry.size,
        }
    }
}

/// One complete, immutable-once-built index snapshot.
#[derive(Debug)]
pub struct Generation {
    serial: u64,
    root: Arc<Item>,
    ids: HashMap<String, Arc<Item>>,
    paths: HashMap<PathBuf, String>,
}

impl Generation {
    /// Monotonic generation number, used to detect retirement.
    pub fn serial(&self) -> u64 {
        self.serial
    }

    pub fn root(&self) -> &Arc<Item> {
        &self.root
    }

    pub fn item(&self, id: &str) -> Option<Arc<Item>> {
        self.ids.get(id).cloned()
    }

    pub fn id_for_path(&self, path: &Path) -> Option<&str> {
        self.paths.get(path).map(String::as_str)
    }

    /// Number of items (folders and files) in this generation.
    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    /// A frozen snapshot of all file items, for the enrichment pass.
    pub fn files(&self) -> Vec<Arc<Item>> {
        let mut files: Vec<Arc<Item>> = self
            .ids
            .values()
            .filter(|item| item.is_file())
            .cloned()
            .collect();
        files.sort_by(|a, b| a.path().cmp(b.path()));
        files
    }
}

/// What survives from the previous generation for one path.
struct RetainedEntry {
    id: String,
    fingerprint: Option<Fingerprint>,
    cover: Option<Arc<Cover>>,
}

/// Allocates stable identities and produces generations.
#[derive(Debug, Default)]
pub struct IdentityRegistry {
    serial: AtomicU64,
}

impl IdentityRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reconciles a freshly built skeleton against the previous generation.
    ///
    /// Returns the new, fully linked generation with both lookup maps
    /// populated. Fails only on an id/path map divergence in the previous
    /// generation, which indicates the registry itself is broken.
    pub fn reconcile(&self, old: Option<&Generation>, tree: FolderEntry) -> Result<Generation> {
        let mut retained = HashMap::new();
        let mut reserved = HashSet::new();
        if let Some(old) = old {
            prune_previous(old, &mut retained, &mut reserved)?;
        }

        let mut ctx = LinkCtx {
            retained: &retained,
            reserved: &reserved,
            ids: HashMap::new(),
            paths: HashMap::new(),
            rng: rand::thread_rng(),
        };
        let root = link_folder(tree, true, &mut ctx);

        let serial = self.serial.fetch_add(1, Ordering::Relaxed) + 1;
        log::debug!(
            "reconciled generation {}: {} items ({} retained from previous)",
            serial,
            ctx.ids.len(),
            retained.len(),
        );
        Ok(Generation {
            serial,
            root,
            ids: ctx.ids,
            paths: ctx.paths,
        })
    }
}

/// Carries forward entries from the old generation whose backing path still
/// exists, verifying the old maps agree on every pair. All old ids stay
/// reserved so a fresh id never silently takes over a retired identity.
fn prune_previous(
    old: &Generation,
    retained: &mut HashMap<PathBuf, RetainedEntry>,
    reserved: &mut HashSet<String>,
) -> Result<()> {
    for (id, item) in &old.ids {
        reserved.insert(id.clone());
        if item.is_file() && !item.path().exists() {
            continue;
        }
        match old.paths.get(item.path()) {
            Some(mapped) if mapped == id => {
                let fingerprint = item
                    .modified()
                    .zip(item.size())
                    .map(|(modified, size)| Fingerprint { modified, size });
                retained.insert(
                    item.path().to_path_buf(),
                    RetainedEntry {
                        id: id.clone(),
                        fingerprint,
                        cover: item.cover(),
                    },
                );
            }
            mapped => {
                log::error!(
                    "id/path maps diverged: id={} path={} mapped={:?}",
                    id,
                    item.path().display(),
                    mapped,
                );
                return Err(IndexError::Inconsistent {
                    id: id.clone(),
                    path: item.path().to_path_buf(),
                });
            }
        }
    }
    Ok(())
}

struct LinkCtx<'a> {
    retained: &'a HashMap<PathBuf, RetainedEntry>,
    reserved: &'a HashSet<String>,
    ids: HashMap<String, Arc<Item>>,
    paths: HashMap<PathBuf, String>,
    rng: rand::rngs::ThreadRng,
}

impl LinkCtx<'_> {
    /// Allocates an id not used by this generation and not reserved by the
    /// previous one. The id space is large enough that this terminates
    /// after a handful of draws at worst.
    fn fresh_id(&mut self) -> String {
        loop {
            let candidate = self.rng.gen_range(1000..u32::MAX).to_string();
            if !self.ids.contains_key(&candidate) && !self.reserved.contains(&candidate) {
                return candidate;
            }
        }
    }

    /// Folders reuse their prior id by path alone.
    fn folder_id(&mut self, path: &Path) -> String {
        match self.retained.get(path) {
            Some(entry) if entry.fingerprint.is_none() && !self.ids.contains_key(&entry.id) => {
                entry.id.clone()
            }
            _ => self.fresh_id(),
        }
    }

    /// Files reuse their prior id, and carry their cover over, only when
    /// the fingerprint matches exactly.
    fn file_identity(&mut self, entry: &FileEntry) -> (String, Option<Arc<Cover>>) {
        match self.retained.get(&entry.path) {
            Some(old)
                if old.fingerprint == Some(Fingerprint::of(entry))
                    && !self.ids.contains_key(&old.id) =>
            {
                (old.id.clone(), old.cover.clone())
            }
            _ => (self.fresh_id(), None),
        }
    }
}

fn link_folder(entry: FolderEntry, is_root: bool, ctx: &mut LinkCtx<'_>) -> Arc<Item> {
    let FolderEntry {
        name,
        path,
        folders,
        files,
    } = entry;
    let folders = folders
        .into_iter()
        .map(|child| link_folder(child, false, ctx))
        .collect();
    let files = files
        .into_iter()
        .map(|child| link_file(child, ctx))
        .collect();

    let id = if is_root {
        ROOT_ID.to_string()
    } else {
        ctx.folder_id(&path)
    };
    let item = Item::folder(id.clone(), name, path.clone(), folders, files);
    ctx.ids.insert(id.clone(), item.clone());
    ctx.paths.insert(path, id);
    item
}

fn link_file(entry: FileEntry, ctx: &mut LinkCtx<'_>) -> Arc<Item> {
    let (id, cover) = ctx.file_identity(&entry);
    let item = Item::file(
        id.clone(),
        entry.name,
        entry.path.clone(),
        entry.size,
        entry.modified,
        entry.kind,
        cover,
    );
    ctx.ids.insert(id.clone(), item.clone());
    ctx.paths.insert(entry.path, id);
    item
}
