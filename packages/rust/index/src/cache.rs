//! Keyed index cache with single-flight builds.
//!
//! The cache maps a normalized URL-set key to a built [`ChunkIndex`]. A miss
//! starts exactly one build per key on a detached task; concurrent callers
//! for the same key subscribe to that build's outcome instead of starting
//! their own. A failed build leaves no entry, so a later request retries.
//! Completed entries live in a bounded LRU.

use std::collections::HashMap;
use std::num::NonZeroUsize;
use std::sync::{Arc, Mutex};

use lru::LruCache;
use tokio::sync::broadcast;
use tokio::task::AbortHandle;
use tracing::{debug, info, warn};
use url::Url;

use docqa_ingest::Fetcher;
use docqa_shared::{DocqaError, Result};

use crate::chunk_index::{ChunkIndex, IndexOptions};
use crate::embedder::EmbeddingClient;

/// Build result broadcast to every waiter. The error is carried as a
/// string because broadcast values must be `Clone`.
type BuildOutcome = std::result::Result<Arc<ChunkIndex>, String>;

/// Normalize a URL set into its cache key: sorted, deduplicated, joined
/// with a separator that cannot occur inside a URL.
pub fn normalized_key(urls: &[Url]) -> String {
    normalized_urls(urls)
        .iter()
        .map(Url::as_str)
        .collect::<Vec<_>>()
        .join("\n")
}

/// Sorted, deduplicated copy of the URL set; the build operates on this so
/// equivalent requests produce identical indexes.
fn normalized_urls(urls: &[Url]) -> Vec<Url> {
    let mut sorted: Vec<Url> = urls.to_vec();
    sorted.sort_by(|a, b| a.as_str().cmp(b.as_str()));
    sorted.dedup();
    sorted
}

// ---------------------------------------------------------------------------
// IndexCache
// ---------------------------------------------------------------------------

/// Process-lifetime cache of built chunk indexes.
pub struct IndexCache {
    shared: Arc<Mutex<CacheInner>>,
    fetcher: Arc<Fetcher>,
    embedder: Arc<dyn EmbeddingClient>,
    opts: IndexOptions,
    detach_builds: bool,
}

struct CacheInner {
    ready: LruCache<String, Arc<ChunkIndex>>,
    in_flight: HashMap<String, broadcast::Sender<BuildOutcome>>,
}

/// What the lock inspection decided for this caller.
enum Claim {
    Hit(Arc<ChunkIndex>),
    Wait(broadcast::Receiver<BuildOutcome>),
    Lead(broadcast::Receiver<BuildOutcome>),
}

impl IndexCache {
    /// Create a cache that builds indexes with the given collaborators.
    ///
    /// `detach_builds` preserves the documented behavior that a requester
    /// timing out does not cancel the build it started; disable it to have
    /// an abandoned leader abort its build instead.
    pub fn new(
        fetcher: Arc<Fetcher>,
        embedder: Arc<dyn EmbeddingClient>,
        opts: IndexOptions,
        max_indexes: usize,
        detach_builds: bool,
    ) -> Self {
        let capacity = NonZeroUsize::new(max_indexes.max(1)).expect("max(1) is nonzero");
        Self {
            shared: Arc::new(Mutex::new(CacheInner {
                ready: LruCache::new(capacity),
                in_flight: HashMap::new(),
            })),
            fetcher,
            embedder,
            opts,
            detach_builds,
        }
    }

    /// Whether a completed index exists for this URL set.
    ///
    /// In-flight builds count as cold: a caller arriving now may wait the
    /// full build duration, so it gets the cold deadline.
    pub fn is_warm(&self, urls: &[Url]) -> bool {
        let key = normalized_key(urls);
        self.shared
            .lock()
            .expect("cache lock poisoned")
            .ready
            .contains(&key)
    }

    /// Return the cached index for this URL set, building it if needed.
    ///
    /// Concurrent callers for the same key share one build and all observe
    /// its outcome. The await may be raced against a deadline by the
    /// caller; with detached builds (the default) losing that race leaves
    /// the build running to warm the cache for later requests.
    pub async fn get_or_build(&self, urls: &[Url]) -> Result<Arc<ChunkIndex>> {
        let build_urls = normalized_urls(urls);
        let key = normalized_key(urls);

        let (claim, abort_handle) = {
            let mut inner = self.shared.lock().expect("cache lock poisoned");

            if let Some(index) = inner.ready.get(&key) {
                debug!(key_urls = build_urls.len(), "index cache hit");
                (Claim::Hit(index.clone()), None)
            } else if let Some(tx) = inner.in_flight.get(&key) {
                debug!(key_urls = build_urls.len(), "joining in-flight build");
                (Claim::Wait(tx.subscribe()), None)
            } else {
                let (tx, rx) = broadcast::channel(1);
                inner.in_flight.insert(key.clone(), tx.clone());

                let handle = tokio::spawn(run_build(
                    self.shared.clone(),
                    self.fetcher.clone(),
                    self.embedder.clone(),
                    self.opts,
                    key.clone(),
                    build_urls,
                    tx,
                ));
                (Claim::Lead(rx), Some(handle.abort_handle()))
            }
        };

        match claim {
            Claim::Hit(index) => Ok(index),
            Claim::Wait(rx) => await_outcome(rx).await,
            Claim::Lead(rx) => {
                // When builds are not detached, dropping this future (a
                // lost deadline race) aborts the build and clears the slot.
                let mut guard = AbandonGuard {
                    shared: self.shared.clone(),
                    key,
                    handle: abort_handle.expect("leader always has a handle"),
                    armed: !self.detach_builds,
                };
                let outcome = await_outcome(rx).await;
                guard.armed = false;
                outcome
            }
        }
    }
}

/// Wait for the broadcast outcome and map it back into an error type.
async fn await_outcome(
    mut rx: broadcast::Receiver<BuildOutcome>,
) -> Result<Arc<ChunkIndex>> {
    match rx.recv().await {
        Ok(Ok(index)) => Ok(index),
        Ok(Err(message)) => Err(DocqaError::Build(message)),
        Err(_) => Err(DocqaError::Build(
            "index build was cancelled before completion".into(),
        )),
    }
}

/// The detached build task: construct the index, record the outcome, and
/// notify every waiter. Removal and delivery happen under one lock so no
/// subscriber can slip between them.
async fn run_build(
    shared: Arc<Mutex<CacheInner>>,
    fetcher: Arc<Fetcher>,
    embedder: Arc<dyn EmbeddingClient>,
    opts: IndexOptions,
    key: String,
    urls: Vec<Url>,
    tx: broadcast::Sender<BuildOutcome>,
) {
    let outcome: BuildOutcome = ChunkIndex::build(&urls, &fetcher, embedder, opts)
        .await
        .map(Arc::new)
        .map_err(|e| e.to_string());

    let mut inner = shared.lock().expect("cache lock poisoned");
    inner.in_flight.remove(&key);

    match &outcome {
        Ok(index) => {
            info!(chunks = index.len(), "index build complete, cache warmed");
            inner.ready.push(key, index.clone());
        }
        Err(message) => {
            warn!(error = %message, "index build failed, leaving cache cold");
        }
    }

    let _ = tx.send(outcome);
}

/// Aborts an in-flight build when the leading requester disappears and
/// detached builds are disabled.
struct AbandonGuard {
    shared: Arc<Mutex<CacheInner>>,
    key: String,
    handle: AbortHandle,
    armed: bool,
}

impl Drop for AbandonGuard {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        self.handle.abort();
        let mut inner = self.shared.lock().expect("cache lock poisoned");
        inner.in_flight.remove(&self.key);
        warn!("abandoned index build aborted (detach_background_builds = false)");
    }
}
