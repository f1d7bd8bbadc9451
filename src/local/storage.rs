//! Backup store implementation.

use super::format::{decode_record, encode_record, read_manifest, write_atomic, write_manifest};
use crate::error::{Result, StoreError};
use crate::types::{Collection, CollectionRecord, StoreStats};
use fs2::FileExt;
use lru::LruCache;
use parking_lot::Mutex;
use sha2::{Digest, Sha256};
use std::fs::{self, File};
use std::num::NonZeroUsize;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::OnceCell;
use tracing::{debug, info, warn};

/// Current schema version. Version 1 created `images`; version 2 added `notes`.
pub const SCHEMA_VERSION: u8 = 2;

/// Backup store configuration.
#[derive(Clone, Debug)]
pub struct LocalStoreConfig {
    /// Directory holding the store.
    pub path: PathBuf,

    /// When false the store never opens, as if local storage were disabled.
    pub enabled: bool,

    /// Record cache size (number of records).
    pub cache_size: usize,
}

impl Default for LocalStoreConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("./annotations-backup"),
            enabled: true,
            cache_size: 256,
        }
    }
}

/// Observable state of the lazy open.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Availability {
    NotOpened,
    Ready,
    Unavailable(String),
}

enum OpenState {
    Ready(Backend),
    Unavailable(String),
}

struct Backend {
    root: PathBuf,

    /// Lock file for exclusive access.
    _lock_file: File,

    /// LRU cache of encoded payloads.
    cache: Mutex<LruCache<(Collection, String), Vec<u8>>>,
}

#[derive(Default)]
struct Counters {
    open_attempts: AtomicU64,
    gets: AtomicU64,
    puts: AtomicU64,
    deletes: AtomicU64,
    clears: AtomicU64,
}

/// Asynchronous key-value backup with one directory per collection.
///
/// Nothing touches the disk until the first operation. The first caller runs
/// the open; every other caller, concurrent or later, awaits that same open.
/// A failed open is remembered and turns every later call into
/// [`StoreError::StoreUnavailable`].
pub struct LocalStore {
    config: LocalStoreConfig,
    state: OnceCell<OpenState>,
    counters: Counters,
}

impl LocalStore {
    /// Create a handle. Performs no I/O.
    pub fn new(config: LocalStoreConfig) -> Self {
        Self {
            config,
            state: OnceCell::new(),
            counters: Counters::default(),
        }
    }

    pub fn config(&self) -> &LocalStoreConfig {
        &self.config
    }

    /// Open the store if that has not happened yet.
    pub async fn open(&self) -> Result<()> {
        self.backend().await.map(|_| ())
    }

    pub fn availability(&self) -> Availability {
        match self.state.get() {
            None => Availability::NotOpened,
            Some(OpenState::Ready(_)) => Availability::Ready,
            Some(OpenState::Unavailable(reason)) => Availability::Unavailable(reason.clone()),
        }
    }

    pub fn stats(&self) -> StoreStats {
        StoreStats {
            open_attempts: self.counters.open_attempts.load(Ordering::Relaxed),
            gets: self.counters.gets.load(Ordering::Relaxed),
            puts: self.counters.puts.load(Ordering::Relaxed),
            deletes: self.counters.deletes.load(Ordering::Relaxed),
            clears: self.counters.clears.load(Ordering::Relaxed),
        }
    }

    /// Insert or overwrite the record under its key.
    pub async fn put<R: CollectionRecord>(&self, record: &R) -> Result<()> {
        let backend = self.backend().await?;
        self.counters.puts.fetch_add(1, Ordering::Relaxed);

        let key = record.key().to_string();
        let payload = rmp_serde::to_vec_named(record)?;
        let bytes = encode_record(&key, &payload)?;
        let path = backend.record_path(R::COLLECTION, &key);

        blocking(move || write_atomic(&path, &bytes)).await?;

        backend.cache.lock().put((R::COLLECTION, key.clone()), payload);
        debug!(collection = %R::COLLECTION, key = %key, "backup record written");
        Ok(())
    }

    /// Fetch a record. Absence is `Ok(None)`, never an error.
    pub async fn get<R: CollectionRecord>(&self, key: &str) -> Result<Option<R>> {
        let backend = self.backend().await?;
        self.counters.gets.fetch_add(1, Ordering::Relaxed);

        let cache_key = (R::COLLECTION, key.to_string());
        let cached = backend.cache.lock().get(&cache_key).cloned();
        let payload = match cached {
            Some(payload) => payload,
            None => {
                let path = backend.record_path(R::COLLECTION, key);
                let Some(bytes) = blocking(move || read_if_exists(&path)).await? else {
                    return Ok(None);
                };
                let (stored_key, payload) = decode_record(&bytes)?;
                if stored_key != key {
                    warn!(expected = %key, found = %stored_key, "record key hash collision");
                    return Ok(None);
                }
                backend.cache_read(cache_key, payload)
            }
        };

        Ok(Some(rmp_serde::from_slice(&payload)?))
    }

    /// Remove one record. Returns whether it existed.
    pub async fn delete(&self, collection: Collection, key: &str) -> Result<bool> {
        let backend = self.backend().await?;
        self.counters.deletes.fetch_add(1, Ordering::Relaxed);

        backend.cache.lock().pop(&(collection, key.to_string()));
        let path = backend.record_path(collection, key);
        blocking(move || {
            if path.exists() {
                fs::remove_file(&path)?;
                Ok(true)
            } else {
                Ok(false)
            }
        })
        .await
    }

    /// Wipe a collection. Returns the number of records removed.
    pub async fn clear(&self, collection: Collection) -> Result<usize> {
        let backend = self.backend().await?;
        self.counters.clears.fetch_add(1, Ordering::Relaxed);

        backend.cache.lock().clear();
        let dir = backend.collection_path(collection);
        let removed = blocking(move || {
            let count = record_files(&dir)?.len();
            if dir.exists() {
                fs::remove_dir_all(&dir)?;
            }
            fs::create_dir_all(&dir)?;
            Ok(count)
        })
        .await?;

        info!(collection = %collection, removed, "backup collection cleared");
        Ok(removed)
    }

    /// Keys of every record in a collection, sorted.
    pub async fn keys(&self, collection: Collection) -> Result<Vec<String>> {
        let backend = self.backend().await?;
        let dir = backend.collection_path(collection);
        blocking(move || {
            let mut keys = Vec::new();
            for path in record_files(&dir)? {
                let bytes = fs::read(&path)?;
                match decode_record(&bytes) {
                    Ok((key, _)) => keys.push(key),
                    Err(e) => warn!(path = %path.display(), error = %e, "skipping unreadable record"),
                }
            }
            keys.sort();
            Ok(keys)
        })
        .await
    }

    async fn backend(&self) -> Result<&Backend> {
        let state = self.state.get_or_init(|| self.open_backend()).await;
        match state {
            OpenState::Ready(backend) => Ok(backend),
            OpenState::Unavailable(reason) => Err(StoreError::StoreUnavailable(reason.clone())),
        }
    }

    async fn open_backend(&self) -> OpenState {
        self.counters.open_attempts.fetch_add(1, Ordering::Relaxed);

        if !self.config.enabled {
            warn!("local backup storage is disabled");
            return OpenState::Unavailable("local storage disabled".into());
        }

        let config = self.config.clone();
        match blocking(move || Backend::open(&config)).await {
            Ok(backend) => {
                info!(path = %backend.root.display(), "backup store opened");
                OpenState::Ready(backend)
            }
            Err(e) => {
                warn!(path = %self.config.path.display(), error = %e, "backup store unavailable");
                OpenState::Unavailable(e.to_string())
            }
        }
    }
}

impl Backend {
    fn open(config: &LocalStoreConfig) -> Result<Self> {
        let root = config.path.clone();
        fs::create_dir_all(&root)?;

        let lock_file = Self::acquire_lock(&root)?;

        let existing = read_manifest(&root)?;
        if let Some(version) = existing {
            if version > SCHEMA_VERSION {
                return Err(StoreError::InvalidFormat(format!(
                    "Unsupported store version: {version}"
                )));
            }
        }

        // Upgrades only ever add collections.
        let from = existing.unwrap_or(0);
        for collection in Collection::ALL {
            let dir = root.join(collection.name());
            if !dir.exists() {
                debug!(collection = %collection, since = collection.introduced_in(), "creating collection");
                fs::create_dir_all(&dir)?;
            }
        }
        if existing != Some(SCHEMA_VERSION) {
            write_manifest(&root, SCHEMA_VERSION)?;
            info!(from, to = SCHEMA_VERSION, "backup schema upgraded");
        }

        let cache_size = NonZeroUsize::new(config.cache_size.max(1)).unwrap_or(NonZeroUsize::MIN);

        Ok(Self {
            root,
            _lock_file: lock_file,
            cache: Mutex::new(LruCache::new(cache_size)),
        })
    }

    fn acquire_lock(root: &Path) -> Result<File> {
        let lock_file = File::create(root.join("LOCK"))?;
        lock_file
            .try_lock_exclusive()
            .map_err(|_| StoreError::Locked)?;
        Ok(lock_file)
    }

    /// Cache a payload read from disk, unless a write landed while the read
    /// was in flight. Returns the payload the caller should use.
    fn cache_read(&self, cache_key: (Collection, String), payload: Vec<u8>) -> Vec<u8> {
        let mut cache = self.cache.lock();
        if let Some(newer) = cache.get(&cache_key) {
            return newer.clone();
        }
        cache.put(cache_key, payload.clone());
        payload
    }

    fn collection_path(&self, collection: Collection) -> PathBuf {
        self.root.join(collection.name())
    }

    /// Records are sharded by the first byte of the key's SHA-256.
    fn record_path(&self, collection: Collection, key: &str) -> PathBuf {
        let digest = hex::encode(Sha256::digest(key.as_bytes()));
        self.collection_path(collection)
            .join(&digest[..2])
            .join(&digest)
    }
}

fn read_if_exists(path: &Path) -> Result<Option<Vec<u8>>> {
    match fs::read(path) {
        Ok(bytes) => Ok(Some(bytes)),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e.into()),
    }
}

/// Record files under a collection directory, temp files excluded.
fn record_files(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    if !dir.exists() {
        return Ok(files);
    }
    for shard in fs::read_dir(dir)? {
        let shard = shard?;
        if !shard.file_type()?.is_dir() {
            continue;
        }
        for entry in fs::read_dir(shard.path())? {
            let entry = entry?;
            if entry.file_name().to_string_lossy().starts_with('.') {
                continue;
            }
            files.push(entry.path());
        }
    }
    Ok(files)
}

async fn blocking<T, F>(f: F) -> Result<T>
where
    F: FnOnce() -> Result<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| StoreError::Io(std::io::Error::other(e)))?
}
