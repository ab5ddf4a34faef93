//! Prefetch engine: per-file access-pattern detection, chunked
//! speculative fetch, and a byte-budgeted chunk cache.
//!
//! File address space is partitioned into fixed-size chunks. Every read
//! updates a per-file stream hypothesis; once a handle has issued enough
//! consecutive sequential reads it enters streaming state and the engine
//! fetches a window of chunks ahead of it through a bounded worker pool.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                     PrefetchEngine                          │
//! │  ┌─────────────────────────────────────────────────────┐    │
//! │  │  cache:  blocks HashMap<ChunkKey, Arc<Vec<u8>>>     │    │
//! │  │          pending HashMap<ChunkKey, Shared<Future>>  │    │
//! │  │          lru VecDeque<ChunkKey> (front = oldest)    │    │
//! │  │  files:  HashMap<inode, Arc<FileState>>             │    │
//! │  │  permits: Semaphore(HTTP_CLIENT_POOL_SIZE)          │    │
//! │  └─────────────────────────────────────────────────────┘    │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Thread safety
//!
//! - Chunk data lives in `Arc<Vec<u8>>`; readers copy out without locks.
//! - The cache map and the pending map share one mutex (the cache byte
//!   budget), distinct from the metadata lock so the two are never held
//!   together.
//! - Concurrent requests for the same chunk coalesce on a shared future;
//!   each chunk's completion is broadcast exactly once.
//! - In-flight chunks are not in the LRU and can never be evicted.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};

use futures::future::{BoxFuture, Shared};
use futures::FutureExt;
use tokio::sync::{oneshot, Semaphore};
use tracing::{debug, warn};

use skymount_client::{DownloadUrl, PlatformClient};
use skymount_common::{FsError, HTTP_CLIENT_POOL_SIZE};
use skymount_metadb::FileRow;

use crate::options::PrefetchTuning;

/// A chunk of one open file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ChunkKey {
    pub inode: u64,
    pub index: u64,
}

type FetchResult = Result<Arc<Vec<u8>>, String>;
type SharedFetch = Shared<BoxFuture<'static, FetchResult>>;

/// Outcome of trying to claim a chunk fetch.
enum Registration {
    /// Someone else is already fetching; await their broadcast.
    InFlight(SharedFetch),
    /// The caller owns the fetch and holds the broadcast sender.
    Owner(oneshot::Sender<FetchResult>),
}

/// Stream hypothesis for one open file, updated on every read.
#[derive(Debug)]
struct StreamState {
    next_expected_offset: u64,
    consecutive_hits: u32,
    streaming: bool,
    /// Current speculative window, in chunks.
    window: u64,
    /// Download URL, obtained lazily and refreshed on expiry.
    url: Option<Arc<DownloadUrl>>,
}

/// Per-file engine state, created on first open and dropped on last close.
pub struct FileState {
    inode: u64,
    file_id: String,
    proj_id: String,
    size: u64,
    stream: Mutex<StreamState>,
    handles: AtomicU32,
}

/// Cache maps plus the LRU, all under the cache-budget mutex.
struct CacheInner {
    blocks: HashMap<ChunkKey, Arc<Vec<u8>>>,
    pending: HashMap<ChunkKey, SharedFetch>,
    /// Front = least recently used, evicted first.
    lru: VecDeque<ChunkKey>,
    current_size: u64,
}

impl CacheInner {
    fn new() -> Self {
        Self {
            blocks: HashMap::new(),
            pending: HashMap::new(),
            lru: VecDeque::new(),
            current_size: 0,
        }
    }

    fn lookup(&mut self, key: &ChunkKey) -> Option<Arc<Vec<u8>>> {
        let data: Arc<Vec<u8>> = self.blocks.get(key)?.clone();
        self.touch(*key);
        Some(data)
    }

    fn touch(&mut self, key: ChunkKey) {
        self.lru.retain(|k| *k != key);
        self.lru.push_back(key);
    }

    fn insert(&mut self, key: ChunkKey, data: Arc<Vec<u8>>, budget: u64) {
        let size: u64 = data.len() as u64;
        while self.current_size + size > budget {
            match self.lru.pop_front() {
                Some(old) => {
                    if let Some(evicted) = self.blocks.remove(&old) {
                        self.current_size -= evicted.len() as u64;
                    }
                }
                None => break,
            }
        }
        if self.blocks.insert(key, data).is_none() {
            self.current_size += size;
            self.lru.push_back(key);
        }
    }

    fn remove_file(&mut self, inode: u64) {
        let removed: Vec<ChunkKey> = self
            .blocks
            .keys()
            .filter(|k| k.inode == inode)
            .copied()
            .collect();
        for key in removed {
            if let Some(data) = self.blocks.remove(&key) {
                self.current_size -= data.len() as u64;
            }
        }
        self.lru.retain(|k| k.inode != inode);
    }
}

/// Snapshot of the cache for logging and tests.
#[derive(Debug, Clone)]
pub struct CacheStats {
    pub cached_chunks: usize,
    pub cached_bytes: u64,
    pub pending_fetches: usize,
}

/// The prefetch engine shared by every open file of a mount.
pub struct PrefetchEngine {
    client: Arc<dyn PlatformClient>,
    tuning: PrefetchTuning,
    cache: Mutex<CacheInner>,
    files: Mutex<HashMap<u64, Arc<FileState>>>,
    /// Worker pool shared by speculative and demand fetches.
    permits: Arc<Semaphore>,
}

impl PrefetchEngine {
    pub fn new(client: Arc<dyn PlatformClient>, tuning: PrefetchTuning) -> Self {
        Self {
            client,
            tuning,
            cache: Mutex::new(CacheInner::new()),
            files: Mutex::new(HashMap::new()),
            permits: Arc::new(Semaphore::new(HTTP_CLIENT_POOL_SIZE)),
        }
    }

    /// Register an open handle for a remote-backed file.
    pub fn open(&self, file: &FileRow) {
        let mut files = self.files.lock().unwrap();
        let state: &Arc<FileState> = files.entry(file.inode).or_insert_with(|| {
            Arc::new(FileState {
                inode: file.inode,
                file_id: file.object_id.clone(),
                proj_id: file.proj_id.clone(),
                size: file.size,
                stream: Mutex::new(StreamState {
                    next_expected_offset: 0,
                    consecutive_hits: 0,
                    streaming: false,
                    window: 0,
                    url: None,
                }),
                handles: AtomicU32::new(0),
            })
        });
        state.handles.fetch_add(1, Ordering::AcqRel);
    }

    /// Drop an open handle; the last close discards the file's state and
    /// every chunk it had cached.
    pub fn close(&self, inode: u64) {
        let mut files = self.files.lock().unwrap();
        let last: bool = match files.get(&inode) {
            Some(state) => state.handles.fetch_sub(1, Ordering::AcqRel) == 1,
            None => return,
        };
        if last {
            files.remove(&inode);
            drop(files);
            self.cache.lock().unwrap().remove_file(inode);
            debug!(inode, "last close; dropped prefetch state");
        }
    }

    /// Whether the file is currently classified as streaming.
    pub fn is_streaming(&self, inode: u64) -> bool {
        let files = self.files.lock().unwrap();
        match files.get(&inode) {
            Some(state) => state.stream.lock().unwrap().streaming,
            None => false,
        }
    }

    pub fn cache_stats(&self) -> CacheStats {
        let cache = self.cache.lock().unwrap();
        CacheStats {
            cached_chunks: cache.blocks.len(),
            cached_bytes: cache.current_size,
            pending_fetches: cache.pending.len(),
        }
    }

    /// Serve a kernel read.
    ///
    /// Required chunks are taken from cache, awaited if in flight, or
    /// fetched on the calling task. Reads at or past EOF return no bytes.
    pub async fn read(
        self: &Arc<Self>,
        inode: u64,
        offset: u64,
        len: u64,
    ) -> Result<Vec<u8>, FsError> {
        let state: Arc<FileState> = self
            .files
            .lock()
            .unwrap()
            .get(&inode)
            .cloned()
            .ok_or_else(|| FsError::Io(format!("inode {} is not open", inode)))?;

        if offset >= state.size || len == 0 {
            return Ok(Vec::new());
        }
        let len: u64 = len.min(state.size - offset);

        let streaming: bool = self.classify(&state, offset, len);

        let chunk_size: u64 = self.tuning.chunk_size;
        let first: u64 = offset / chunk_size;
        let last: u64 = (offset + len - 1) / chunk_size;

        let mut data: Vec<u8> = Vec::with_capacity(len as usize);
        for index in first..=last {
            let chunk: Arc<Vec<u8>> = self.acquire_chunk(&state, index).await?;
            let chunk_start: u64 = index * chunk_size;
            let begin: u64 = offset.max(chunk_start) - chunk_start;
            let end: u64 = (offset + len).min(chunk_start + chunk.len() as u64) - chunk_start;
            if begin < end {
                data.extend_from_slice(&chunk[begin as usize..end as usize]);
            }
        }

        if streaming {
            self.spawn_window(&state, last);
        }
        Ok(data)
    }

    /// Update the stream hypothesis for a read at `offset`.
    /// Returns whether the file is in streaming state afterwards.
    fn classify(&self, state: &FileState, offset: u64, len: u64) -> bool {
        let mut s = state.stream.lock().unwrap();
        if offset == s.next_expected_offset {
            s.consecutive_hits += 1;
            if s.streaming {
                // Reward continued sequential access with a wider window.
                s.window = (s.window * 2).min(self.tuning.window_max);
            }
        } else {
            s.consecutive_hits = 0;
            s.streaming = false;
            s.window = 0;
        }
        s.next_expected_offset = offset + len;
        if !s.streaming && s.consecutive_hits >= self.tuning.streaming_threshold {
            s.streaming = true;
            s.window = self.tuning.window_start;
            debug!(inode = state.inode, offset, "entering streaming state");
        }
        s.streaming
    }

    /// Get one chunk: from cache, from an in-flight fetch, or by
    /// fetching it here and now.
    async fn acquire_chunk(
        self: &Arc<Self>,
        state: &Arc<FileState>,
        index: u64,
    ) -> Result<Arc<Vec<u8>>, FsError> {
        let key = ChunkKey {
            inode: state.inode,
            index,
        };

        let pending: Option<SharedFetch> = {
            let mut cache = self.cache.lock().unwrap();
            if let Some(data) = cache.lookup(&key) {
                return Ok(data);
            }
            cache.pending.get(&key).cloned()
        };
        if let Some(shared) = pending {
            return shared.await.map_err(FsError::Io);
        }

        // Fetch on the calling task, still broadcasting to any reader
        // that arrives while we are at it.
        match self.register_pending(key) {
            // Lost the race; someone else registered first.
            Registration::InFlight(existing) => existing.await.map_err(FsError::Io),
            Registration::Owner(tx) => {
                let result: FetchResult = self
                    .fetch_chunk(state, index)
                    .await
                    .map(Arc::new)
                    .map_err(|e| e.to_string());
                self.complete_fetch(key, tx, result.clone());
                result.map_err(FsError::Io)
            }
        }
    }

    /// Register `key` as in flight.
    ///
    /// Returns the existing shared future if another task got there
    /// first; otherwise the caller owns the fetch and must broadcast its
    /// completion through the returned sender.
    fn register_pending(&self, key: ChunkKey) -> Registration {
        let (tx, rx) = oneshot::channel::<FetchResult>();
        let shared: SharedFetch = async move {
            rx.await
                .unwrap_or_else(|_| Err("fetch abandoned".to_string()))
        }
        .boxed()
        .shared();

        let mut cache = self.cache.lock().unwrap();
        if let Some(existing) = cache.pending.get(&key) {
            return Registration::InFlight(existing.clone());
        }
        cache.pending.insert(key, shared);
        Registration::Owner(tx)
    }

    /// Broadcast a finished fetch and move it from pending into the
    /// cache (unless the file was closed while it was in flight).
    fn complete_fetch(&self, key: ChunkKey, tx: oneshot::Sender<FetchResult>, result: FetchResult) {
        let still_open: bool = self.files.lock().unwrap().contains_key(&key.inode);

        let _ = tx.send(result.clone());

        let mut cache = self.cache.lock().unwrap();
        cache.pending.remove(&key);
        if let Ok(data) = result {
            if still_open {
                cache.insert(key, data, self.tuning.cache_budget);
            }
        }
    }

    /// Enqueue speculative fetches for the window ahead of `last_chunk`.
    fn spawn_window(self: &Arc<Self>, state: &Arc<FileState>, last_chunk: u64) {
        if state.size == 0 {
            return;
        }
        let max_chunk: u64 = (state.size - 1) / self.tuning.chunk_size;
        let window: u64 = state.stream.lock().unwrap().window;
        let upper: u64 = (last_chunk + window).min(max_chunk);

        for index in last_chunk + 1..=upper {
            let key = ChunkKey {
                inode: state.inode,
                index,
            };
            {
                let cache = self.cache.lock().unwrap();
                if cache.blocks.contains_key(&key) || cache.pending.contains_key(&key) {
                    continue;
                }
            }
            let tx: oneshot::Sender<FetchResult> = match self.register_pending(key) {
                Registration::Owner(tx) => tx,
                Registration::InFlight(_) => continue,
            };
            let engine: Arc<PrefetchEngine> = Arc::clone(self);
            let state: Arc<FileState> = Arc::clone(state);
            tokio::spawn(async move {
                let result: FetchResult = engine
                    .fetch_chunk(&state, index)
                    .await
                    .map(Arc::new)
                    .map_err(|e| e.to_string());
                if let Err(msg) = &result {
                    // Speculation is best effort; a reader that actually
                    // needs this chunk will retry and surface the error.
                    warn!(inode = state.inode, index, error = %msg, "prefetch failed");
                }
                engine.complete_fetch(key, tx, result);
            });
        }
    }

    /// Fetch one chunk's byte range, refreshing the download URL once if
    /// the platform reports it expired.
    async fn fetch_chunk(&self, state: &FileState, index: u64) -> Result<Vec<u8>, FsError> {
        let offset: u64 = index * self.tuning.chunk_size;
        let len: u64 = self.tuning.chunk_size.min(state.size - offset);

        let _permit = self
            .permits
            .acquire()
            .await
            .map_err(|_| FsError::Io("prefetch pool closed".to_string()))?;

        let url: Arc<DownloadUrl> = self.download_url(state).await?;
        match self.client.fetch_url_range(&url, offset, len).await {
            Ok(data) => Ok(data),
            Err(e) if e.is_url_expiry() => {
                warn!(inode = state.inode, "download URL expired; refreshing");
                state.stream.lock().unwrap().url = None;
                let fresh: Arc<DownloadUrl> = self.download_url(state).await?;
                self.client
                    .fetch_url_range(&fresh, offset, len)
                    .await
                    .map_err(|e| e.into_fs_error())
            }
            Err(e) => Err(e.into_fs_error()),
        }
    }

    /// The file's download URL, requested lazily and cached on its state.
    async fn download_url(&self, state: &FileState) -> Result<Arc<DownloadUrl>, FsError> {
        if let Some(url) = state.stream.lock().unwrap().url.clone() {
            return Ok(url);
        }
        let url: DownloadUrl = self
            .client
            .get_download_url(&state.file_id, &state.proj_id)
            .await
            .map_err(|e| e.into_fs_error())?;
        let url: Arc<DownloadUrl> = Arc::new(url);
        state.stream.lock().unwrap().url = Some(url.clone());
        Ok(url)
    }
}
