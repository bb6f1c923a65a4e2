//! The media index facade.
//!
//! [`MediaIndex`] owns the whole maintenance pipeline: the watcher feeds
//! change signals into the debounce actor, the actor runs rescans (build →
//! reconcile → swap), listeners hear about completed swaps, and the
//! enrichment scheduler is kicked after every swap. The current generation
//! sits behind a single lock and is only ever replaced wholesale, so
//! lookups never observe a partially built index.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::{Mutex, RwLock};
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use uuid::Uuid;

use crate::debounce::{self, DEFAULT_QUIET_PERIOD};
use crate::enrich::{CoverSource, CoverStore, EnrichContext, EnrichmentScheduler};
use crate::error::{IndexError, Result};
use crate::item::Item;
use crate::registry::{Generation, IdentityRegistry};
use crate::tree::{self, sort, views, ItemComparer, ViewTransform};
use crate::types::{Cover, MediaTypes};
use crate::watch;

/// Notification sent to subscribers once per completed rescan, after the
/// new generation is swapped in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexEvent {
    Changed,
}

/// Configures and creates a [`MediaIndex`].
pub struct MediaIndexBuilder {
    root: PathBuf,
    types: MediaTypes,
    views: Vec<Box<dyn ViewTransform>>,
    order: Box<dyn ItemComparer>,
    descending: bool,
    quiet: Duration,
    store: Option<Arc<dyn CoverStore>>,
    source: Option<Arc<dyn CoverSource>>,
}

impl MediaIndexBuilder {
    /// Restricts which media kinds are indexed. Defaults to all kinds.
    pub fn media_types(mut self, types: MediaTypes) -> Self {
        self.types = types;
        self
    }

    /// Adds a view transformation by name; views apply in registration
    /// order.
    pub fn view(mut self, name: &str) -> Result<Self> {
        self.views.push(views::lookup(name)?);
        Ok(self)
    }

    /// Sets the sort order by name. Defaults to ascending title order.
    pub fn order(mut self, name: &str, descending: bool) -> Result<Self> {
        self.order = sort::lookup(name)?;
        self.descending = descending;
        Ok(self)
    }

    /// Debounce quiet period for filesystem changes. Defaults to 20 s.
    pub fn quiet_period(mut self, quiet: Duration) -> Self {
        self.quiet = quiet;
        self
    }

    /// Persistent cover cache collaborator.
    pub fn cover_store(mut self, store: Arc<dyn CoverStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Cover derivation collaborator; without one, no enrichment runs.
    pub fn cover_source(mut self, source: Arc<dyn CoverSource>) -> Self {
        self.source = Some(source);
        self
    }

    pub fn build(self) -> Result<MediaIndex> {
        let metadata = std::fs::metadata(&self.root)?;
        if !metadata.is_dir() {
            return Err(IndexError::NotADirectory(self.root));
        }

        let name = self
            .root
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| self.root.display().to_string());
        let friendly_name = match self.root.parent() {
            Some(parent) => format!("{} ({})", name, parent.display()),
            None => name,
        };

        let (change_tx, change_rx) = mpsc::unbounded_channel();
        let (changed_tx, _) = broadcast::channel(16);
        Ok(MediaIndex {
            inner: Arc::new(IndexInner {
                root_dir: self.root,
                friendly_name,
                uuid: Uuid::new_v4(),
                types: self.types,
                views: self.views,
                order: self.order,
                descending: self.descending,
                quiet: self.quiet,
                store: self.store,
                source: self.source,
                registry: IdentityRegistry::new(),
                current: RwLock::new(None),
                current_serial: Arc::new(AtomicU64::new(0)),
                scheduler: Arc::new(EnrichmentScheduler::new()),
                changed_tx,
                change_tx,
                change_rx: Mutex::new(Some(change_rx)),
                watcher: Mutex::new(None),
                actor: Mutex::new(None),
            }),
        })
    }
}

/// In-memory index of a directory subtree for a media-serving process.
pub struct MediaIndex {
    inner: Arc<IndexInner>,
}

struct IndexInner {
    root_dir: PathBuf,
    friendly_name: String,
    uuid: Uuid,
    types: MediaTypes,
    views: Vec<Box<dyn ViewTransform>>,
    order: Box<dyn ItemComparer>,
    descending: bool,
    quiet: Duration,
    store: Option<Arc<dyn CoverStore>>,
    source: Option<Arc<dyn CoverSource>>,
    registry: IdentityRegistry,
    current: RwLock<Option<Arc<Generation>>>,
    current_serial: Arc<AtomicU64>,
    scheduler: Arc<EnrichmentScheduler>,
    changed_tx: broadcast::Sender<IndexEvent>,
    change_tx: mpsc::UnboundedSender<()>,
    change_rx: Mutex<Option<mpsc::UnboundedReceiver<()>>>,
    watcher: Mutex<Option<notify::RecommendedWatcher>>,
    actor: Mutex<Option<JoinHandle<()>>>,
}

impl MediaIndex {
    pub fn builder(root: impl Into<PathBuf>) -> MediaIndexBuilder {
        MediaIndexBuilder {
            root: root.into(),
            types: MediaTypes::default(),
            views: Vec::new(),
            order: sort::default_order(),
            descending: false,
            quiet: DEFAULT_QUIET_PERIOD,
            store: None,
            source: None,
        }
    }

    /// Performs the initial scan, starts the watcher and the debounce
    /// actor. Failure of the initial scan or of watcher setup is fatal.
    pub async fn start(&self) -> Result<()> {
        let inner = self.inner.clone();
        tokio::task::spawn_blocking(move || inner.rescan())
            .await
            .map_err(|error| IndexError::Internal(format!("initial scan task failed: {error}")))??;
        self.inner.kick_enrichment();

        let store_file = self
            .inner
            .store
            .as_ref()
            .map(|store| store.store_file().to_path_buf());
        let watcher = watch::spawn_change_source(
            &self.inner.root_dir,
            store_file,
            self.inner.change_tx.clone(),
        )?;
        *self.inner.watcher.lock() = Some(watcher);

        if let Some(signals) = self.inner.change_rx.lock().take() {
            let weak = Arc::downgrade(&self.inner);
            let quiet = self.inner.quiet;
            let actor = tokio::spawn(async move {
                let result = debounce::run(signals, quiet, move || {
                    let weak = weak.clone();
                    async move {
                        let Some(inner) = weak.upgrade() else {
                            return Ok(());
                        };
                        inner.rescan_round().await
                    }
                })
                .await;
                if let Err(error) = result {
                    log::error!("index maintenance stopped: {error}");
                }
            });
            *self.inner.actor.lock() = Some(actor);
        }
        Ok(())
    }

    /// Stops watching and rescanning. Lookups keep serving the current
    /// generation.
    pub fn shutdown(&self) {
        *self.inner.watcher.lock() = None;
        if let Some(actor) = self.inner.actor.lock().take() {
            actor.abort();
        }
    }

    /// Looks up an item by its stable id in the current generation.
    pub fn item(&self, id: &str) -> Option<Arc<Item>> {
        self.inner
            .current
            .read()
            .as_ref()
            .and_then(|generation| generation.item(id))
    }

    /// The current root folder, once the initial scan has completed.
    pub fn root(&self) -> Option<Arc<Item>> {
        self.inner
            .current
            .read()
            .as_ref()
            .map(|generation| generation.root().clone())
    }

    /// Subscribes to change notifications.
    pub fn subscribe(&self) -> broadcast::Receiver<IndexEvent> {
        self.inner.changed_tx.subscribe()
    }

    pub fn friendly_name(&self) -> &str {
        &self.inner.friendly_name
    }

    /// Process-unique identifier for this index instance.
    pub fn uuid(&self) -> Uuid {
        self.inner.uuid
    }

    /// Injects a manual change signal, debounced like any filesystem event.
    pub fn refresh(&self) {
        let _ = self.inner.change_tx.send(());
    }

    /// The cover for a file item, consulting the persistent store if the
    /// item has none loaded yet.
    pub fn cover_for(&self, item: &Item) -> Option<Arc<Cover>> {
        if let Some(cover) = item.cover() {
            return Some(cover);
        }
        let store = self.inner.store.as_ref()?;
        let cover = store.maybe_get_cover(item)?;
        item.set_cover(cover.clone());
        Some(cover)
    }

    #[cfg(test)]
    pub(crate) fn rescan_now(&self) -> Result<()> {
        self.inner.rescan()?;
        self.inner.notify_changed();
        Ok(())
    }
}

impl IndexInner {
    /// One full rescan: build, reconcile, swap. Blocking.
    fn rescan(&self) -> Result<()> {
        let started = Instant::now();
        log::info!("rescanning {}", self.root_dir.display());
        let tree = tree::build_tree(
            &self.root_dir,
            self.types,
            &self.views,
            self.order.as_ref(),
            self.descending,
        )?;
        let old = self.current.read().clone();
        let generation = Arc::new(self.registry.reconcile(old.as_deref(), tree)?);
        let serial = generation.serial();
        let entries = generation.len();
        *self.current.write() = Some(generation);
        self.current_serial.store(serial, Ordering::Release);
        log::info!(
            "rescan of {} complete: {} items, generation {}, {} ms",
            self.root_dir.display(),
            entries,
            serial,
            started.elapsed().as_millis(),
        );
        Ok(())
    }

    /// One debounced rescan round, with the containment policy applied:
    /// only a reconciliation inconsistency escapes; any other failure keeps
    /// the previous generation, emits no notification, and leaves the loop
    /// running.
    async fn rescan_round(self: Arc<Self>) -> Result<()> {
        let inner = self.clone();
        let result = tokio::task::spawn_blocking(move || inner.rescan()).await;
        match result {
            Ok(Ok(())) => {
                self.notify_changed();
                self.kick_enrichment();
                Ok(())
            }
            Ok(Err(error @ IndexError::Inconsistent { .. })) => Err(error),
            Ok(Err(error)) => {
                log::error!(
                    "rescan of {} failed, keeping previous generation: {}",
                    self.root_dir.display(),
                    error,
                );
                Ok(())
            }
            Err(join_error) => {
                log::error!("rescan task failed: {join_error}");
                Ok(())
            }
        }
    }

    fn notify_changed(&self) {
        let _ = self.changed_tx.send(IndexEvent::Changed);
    }

    fn kick_enrichment(&self) {
        let Some(source) = self.source.clone() else {
            return;
        };
        let Some(generation) = self.current.read().clone() else {
            return;
        };
        self.scheduler.clone().kick(EnrichContext {
            items: generation.files(),
            serial: generation.serial(),
            current_serial: self.current_serial.clone(),
            store: self.store.clone(),
            source,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::ROOT_ID;
    use std::fs::{self, File};
    use std::io::Write;
    use tempfile::TempDir;

    fn write_file(path: &Path, bytes: &[u8]) {
        let mut file = File::create(path).unwrap();
        file.write_all(bytes).unwrap();
    }

    fn built(temp: &TempDir) -> MediaIndex {
        MediaIndex::builder(temp.path())
            .media_types(MediaTypes::AUDIO)
            .build()
            .unwrap()
    }

    #[test]
    fn build_rejects_files_and_missing_roots() {
        let temp = TempDir::new().unwrap();
        let file_path = temp.path().join("f.mp3");
        write_file(&file_path, b"x");
        assert!(matches!(
            MediaIndex::builder(&file_path).build(),
            Err(IndexError::NotADirectory(_))
        ));
        assert!(MediaIndex::builder(temp.path().join("gone")).build().is_err());
    }

    #[test]
    fn unknown_names_fail_at_configuration_time() {
        assert!(MediaIndex::builder("/tmp").view("music").is_err());
        assert!(MediaIndex::builder("/tmp").order("shuffle", false).is_err());
    }

    #[tokio::test]
    async fn lookup_serves_the_current_generation() {
        let temp = TempDir::new().unwrap();
        fs::create_dir(temp.path().join("album")).unwrap();
        write_file(&temp.path().join("album/track.mp3"), &[0u8; 20]);

        let index = built(&temp);
        assert!(index.root().is_none());
        index.rescan_now().unwrap();

        let root = index.root().unwrap();
        assert_eq!(root.id(), ROOT_ID);
        let album = &root.folders()[0];
        let track = &album.files()[0];
        assert_eq!(track.name(), "track.mp3");
        assert_eq!(
            index.item(track.id()).unwrap().path(),
            temp.path().join("album/track.mp3"),
        );
    }

    #[tokio::test]
    async fn stable_id_until_the_file_actually_changes() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("a.mp3");
        write_file(&path, &[0u8; 100]);

        let index = built(&temp);
        index.rescan_now().unwrap();
        let g1_id = {
            let root = index.root().unwrap();
            root.files()[0].id().to_string()
        };
        index.item(&g1_id).unwrap().set_cover(Arc::new(Cover {
            mime: "image/jpeg".into(),
            data: vec![9],
        }));

        // Untouched file: same id, cover carried over.
        index.rescan_now().unwrap();
        let g2_item = index.item(&g1_id).expect("id survives rescan");
        assert_eq!(g2_item.path(), path);
        assert!(g2_item.cover().is_some());

        // Rewritten file: new id, enrichment data discarded.
        write_file(&path, &[0u8; 150]);
        index.rescan_now().unwrap();
        let root = index.root().unwrap();
        let g3_item = &root.files()[0];
        assert_ne!(g3_item.id(), g1_id);
        assert!(g3_item.cover().is_none());
        assert!(index.item(&g1_id).is_none());
    }

    #[tokio::test]
    async fn notification_fires_after_swap() {
        let temp = TempDir::new().unwrap();
        write_file(&temp.path().join("a.mp3"), &[0u8; 10]);

        let index = built(&temp);
        let mut events = index.subscribe();
        index.rescan_now().unwrap();
        assert_eq!(events.recv().await.unwrap(), IndexEvent::Changed);
        // The generation observed after the event is fully consistent.
        assert!(index.root().is_some());
    }

    #[tokio::test]
    async fn views_and_order_are_applied() {
        let temp = TempDir::new().unwrap();
        fs::create_dir(temp.path().join("sub")).unwrap();
        write_file(&temp.path().join("sub/z.mp3"), &[0u8; 1]);
        write_file(&temp.path().join("a.mkv"), &[0u8; 1]);

        let index = MediaIndex::builder(temp.path())
            .view("bytype")
            .unwrap()
            .order("title", false)
            .unwrap()
            .build()
            .unwrap();
        index.rescan_now().unwrap();

        let root = index.root().unwrap();
        let names: Vec<_> = root
            .folders()
            .iter()
            .map(|folder| folder.name().to_string())
            .collect();
        assert_eq!(names, vec!["audio", "video"]);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn watcher_driven_rescan_end_to_end() {
        let temp = TempDir::new().unwrap();
        write_file(&temp.path().join("a.mp3"), &[0u8; 10]);

        let index = MediaIndex::builder(temp.path())
            .media_types(MediaTypes::AUDIO)
            .quiet_period(Duration::from_millis(100))
            .build()
            .unwrap();
        index.start().await.unwrap();
        let mut events = index.subscribe();
        assert_eq!(index.root().unwrap().files().len(), 1);

        write_file(&temp.path().join("b.mp3"), &[0u8; 10]);
        index.refresh(); // belt and braces on platforms with slow watchers

        tokio::time::timeout(Duration::from_secs(10), events.recv())
            .await
            .expect("change notification within deadline")
            .unwrap();
        assert_eq!(index.root().unwrap().files().len(), 2);
        index.shutdown();
    }

    #[tokio::test]
    async fn friendly_name_and_uuid_are_exposed() {
        let temp = TempDir::new().unwrap();
        let index = built(&temp);
        assert!(index.friendly_name().contains(
            temp.path().file_name().unwrap().to_str().unwrap()
        ));
        assert!(!index.uuid().is_nil());
    }
}
