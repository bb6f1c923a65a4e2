//! Background enrichment of file items.
//!
//! After a generation swap, at most one pass walks a frozen snapshot of the
//! generation's file items and fills in covers that are still missing,
//! consulting the persistent cache collaborator first. The pass runs on its
//! own blocking task, strictly lower priority than rescans: it never holds
//! the generation lock and a rescan never waits for it.
//!
//! Cancellation is cooperative via generation tagging: the pass carries the
//! serial it was started for and stops as soon as that generation is no
//! longer current. A kick arriving while a pass runs is remembered and
//! honored once the running pass winds down, so the completion/restart race
//! of a nullable task handle cannot occur.

use std::io;
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

use crate::item::Item;
use crate::types::Cover;

/// Persistent cache collaborator for derived cover data.
///
/// The store is identified by its own backing file, whose change events are
/// filtered out of the watch stream.
pub trait CoverStore: Send + Sync {
    /// Path of the store's backing file.
    fn store_file(&self) -> &Path;

    /// Cheap membership check, consulted before any extraction.
    fn has_cover(&self, item: &Item) -> bool;

    /// Fetches previously stored cover data, if any.
    fn maybe_get_cover(&self, item: &Item) -> Option<Arc<Cover>>;

    /// Stores freshly derived cover data. Best-effort.
    fn maybe_store(&self, item: &Item, cover: &Cover);
}

/// The externally supplied derivation operation.
pub trait CoverSource: Send + Sync {
    fn extract(&self, item: &Item) -> io::Result<Cover>;
}

/// Everything one enrichment pass needs, frozen at kick time.
pub struct EnrichContext {
    /// File items of the generation being enriched.
    pub items: Vec<Arc<Item>>,
    /// Serial of that generation.
    pub serial: u64,
    /// Live view of the current generation's serial, shared with the index.
    pub current_serial: Arc<AtomicU64>,
    pub store: Option<Arc<dyn CoverStore>>,
    pub source: Arc<dyn CoverSource>,
}

#[derive(Default)]
struct SchedulerState {
    running: bool,
    /// Context for the pass to run after the current one, if a kick arrived
    /// while running.
    pending: Option<EnrichContext>,
}

/// Runs at most one enrichment pass at a time.
#[derive(Default)]
pub struct EnrichmentScheduler {
    state: Mutex<SchedulerState>,
}

impl EnrichmentScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Requests a pass over the given context.
    ///
    /// Starts one immediately when idle; otherwise the request replaces any
    /// previously pending one and runs when the current pass completes.
    /// Must be called from within a tokio runtime.
    pub fn kick(self: Arc<Self>, ctx: EnrichContext) {
        {
            let mut state = self.state.lock();
            if state.running {
                state.pending = Some(ctx);
                return;
            }
            state.running = true;
        }

        let scheduler = self;
        tokio::task::spawn_blocking(move || {
            let mut next = Some(ctx);
            while let Some(ctx) = next {
                run_pass(&ctx);
                let mut state = scheduler.state.lock();
                next = state.pending.take();
                if next.is_none() {
                    state.running = false;
                }
            }
        });
    }
}

/// One pass over a frozen item list. Per-item failures are logged and
/// skipped; the pass itself never fails.
pub fn run_pass(ctx: &EnrichContext) {
    log::debug!(
        "enrichment pass over {} items (generation {})",
        ctx.items.len(),
        ctx.serial,
    );
    for item in &ctx.items {
        if ctx.current_serial.load(Ordering::Acquire) != ctx.serial {
            log::debug!(
                "generation {} retired, ending enrichment pass early",
                ctx.serial,
            );
            return;
        }
        if item.cover().is_some() {
            continue;
        }
        if let Some(store) = &ctx.store {
            if store.has_cover(item) {
                continue;
            }
        }
        match ctx.source.extract(item) {
            Ok(cover) => {
                let cover = Arc::new(cover);
                if let Some(store) = &ctx.store {
                    store.maybe_store(item, &cover);
                }
                item.set_cover(cover);
            }
            Err(error) => {
                log::debug!("cover extraction failed for {}: {}", item.path().display(), error);
            }
        }
    }
    log::debug!("enrichment pass complete (generation {})", ctx.serial);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::MediaKind;
    use parking_lot::RwLock;
    use std::collections::HashSet;
    use std::path::PathBuf;
    use std::sync::atomic::AtomicUsize;
    use std::time::SystemTime;

    struct CountingSource {
        calls: AtomicUsize,
        fail_for: Option<String>,
    }

    impl CountingSource {
        fn new() -> Self {
            Self {
                calls: AtomicUsize::new(0),
                fail_for: None,
            }
        }

        fn failing_for(name: &str) -> Self {
            Self {
                calls: AtomicUsize::new(0),
                fail_for: Some(name.to_string()),
            }
        }
    }

    impl CoverSource for CountingSource {
        fn extract(&self, item: &Item) -> io::Result<Cover> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail_for.as_deref() == Some(item.name()) {
                return Err(io::Error::new(io::ErrorKind::InvalidData, "no cover"));
            }
            Ok(Cover {
                mime: "image/jpeg".into(),
                data: vec![0xff],
            })
        }
    }

    #[derive(Default)]
    struct MemoryStore {
        file: PathBuf,
        covers: RwLock<HashSet<PathBuf>>,
    }

    impl CoverStore for MemoryStore {
        fn store_file(&self) -> &Path {
            &self.file
        }

        fn has_cover(&self, item: &Item) -> bool {
            self.covers.read().contains(item.path())
        }

        fn maybe_get_cover(&self, item: &Item) -> Option<Arc<Cover>> {
            self.covers.read().contains(item.path()).then(|| {
                Arc::new(Cover {
                    mime: "image/jpeg".into(),
                    data: vec![0xee],
                })
            })
        }

        fn maybe_store(&self, item: &Item, _cover: &Cover) {
            self.covers.write().insert(item.path().to_path_buf());
        }
    }

    fn file_item(name: &str) -> Arc<Item> {
        Item::file(
            "5000".into(),
            name.into(),
            PathBuf::from("/m").join(name),
            10,
            SystemTime::UNIX_EPOCH,
            MediaKind::Audio,
            None,
        )
    }

    fn ctx(
        items: Vec<Arc<Item>>,
        serial: u64,
        current: u64,
        store: Option<Arc<dyn CoverStore>>,
        source: Arc<dyn CoverSource>,
    ) -> EnrichContext {
        EnrichContext {
            items,
            serial,
            current_serial: Arc::new(AtomicU64::new(current)),
            store,
            source,
        }
    }

    #[test]
    fn second_pass_performs_no_extra_derivations() {
        let source = Arc::new(CountingSource::new());
        let items = vec![file_item("a.mp3"), file_item("b.mp3")];

        let pass = ctx(items.clone(), 1, 1, None, source.clone());
        run_pass(&pass);
        assert_eq!(source.calls.load(Ordering::SeqCst), 2);

        run_pass(&pass);
        assert_eq!(source.calls.load(Ordering::SeqCst), 2);
        assert!(items.iter().all(|item| item.cover().is_some()));
    }

    #[test]
    fn retired_generation_is_skipped() {
        let source = Arc::new(CountingSource::new());
        let items = vec![file_item("a.mp3")];

        let pass = ctx(items.clone(), 1, 2, None, source.clone());
        run_pass(&pass);
        assert_eq!(source.calls.load(Ordering::SeqCst), 0);
        assert!(items[0].cover().is_none());
    }

    #[test]
    fn store_hits_skip_extraction() {
        let source = Arc::new(CountingSource::new());
        let store = Arc::new(MemoryStore::default());
        let cached = file_item("cached.mp3");
        store.covers.write().insert(cached.path().to_path_buf());

        let pass = ctx(
            vec![cached, file_item("fresh.mp3")],
            1,
            1,
            Some(store.clone()),
            source.clone(),
        );
        run_pass(&pass);
        // Only the uncached item is derived, and the result is stored.
        assert_eq!(source.calls.load(Ordering::SeqCst), 1);
        assert_eq!(store.covers.read().len(), 2);
    }

    #[test]
    fn one_failure_does_not_abort_the_pass() {
        let source = Arc::new(CountingSource::failing_for("bad.mp3"));
        let good = file_item("good.mp3");
        let bad = file_item("bad.mp3");

        let pass = ctx(vec![bad.clone(), good.clone()], 1, 1, None, source.clone());
        run_pass(&pass);
        assert_eq!(source.calls.load(Ordering::SeqCst), 2);
        assert!(bad.cover().is_none());
        assert!(good.cover().is_some());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn kick_while_running_schedules_one_follow_up() {
        struct SlowSource {
            calls: AtomicUsize,
        }
        impl CoverSource for SlowSource {
            fn extract(&self, _item: &Item) -> io::Result<Cover> {
                self.calls.fetch_add(1, Ordering::SeqCst);
                std::thread::sleep(std::time::Duration::from_millis(50));
                Ok(Cover {
                    mime: "image/jpeg".into(),
                    data: vec![1],
                })
            }
        }

        let source = Arc::new(SlowSource {
            calls: AtomicUsize::new(0),
        });
        let scheduler = Arc::new(EnrichmentScheduler::new());
        let current = Arc::new(AtomicU64::new(1));

        let first = EnrichContext {
            items: vec![file_item("a.mp3")],
            serial: 1,
            current_serial: current.clone(),
            store: None,
            source: source.clone(),
        };
        // The pending pass targets a different item so it performs work.
        let second = EnrichContext {
            items: vec![file_item("b.mp3")],
            serial: 1,
            current_serial: current,
            store: None,
            source: source.clone(),
        };

        scheduler.clone().kick(first);
        scheduler.clone().kick(second);

        tokio::time::sleep(std::time::Duration::from_millis(500)).await;
        assert_eq!(source.calls.load(Ordering::SeqCst), 2);
        assert!(!scheduler.state.lock().running);
    }
}
