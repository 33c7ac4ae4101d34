//! This module provides a virtual hierarchical file system that lives in a flat key-value store.

use std::sync::mpsc::Receiver;

use chrono::Utc;
use serde_json::Value;

use crate::config::VfsConfig;
use crate::core::{KvStore, utils};
use crate::error::{VfsError, VfsResult};
use crate::event::{EventBus, VfsEvent};
use crate::vfs::entry::{Entry, MetaOverrides, Metadata};
use crate::vfs::journal::{self, Intent};

/// Counts and sizes of everything stored under one namespace.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StorageUsage {
    pub file_count: u64,
    pub directory_count: u64,
    /// Serialized size of all entries, in bytes.
    pub used_bytes: u64,
}

/// A virtual file system that emulates directories and files on top of a [`KvStore`].
///
/// ### Internal state
///
/// * `store` — the injected persistence substrate. It is the only source of truth:
///   there is no in-memory tree, every hierarchy query is a prefix scan over its keys.
/// * `config` — namespace, bootstrap directories, strict type checks, journaling.
/// * `events` — subscribers of out-of-band notifications (see [`VfsEvent`]).
///
/// ### Invariants
///
/// 1. **Path identity**: An entry is stored under `namespace + path`, where `path` is
///    normalized (absolute, no `..`, no `//`, no trailing `/` except for the root).
///    The key is authoritative; a stored `path` field that disagrees is corrected on load.
/// 2. **Uniqueness**: Each path maps to at most one entry.
/// 3. **No parent requirement**: An entry may exist without its parent directory;
///    `list()` and `exists()` work regardless.
/// 4. **Children before parent**: Recursive `delete()` never removes a directory while
///    descendants are still stored; recursive `rename()` moves descendants before the
///    directory itself.
///
/// ### Failure model
///
/// The store is atomic per key only. A recursive operation interrupted by a failing
/// write (or a crash) leaves part of the subtree moved or removed. When journaling is on,
/// an intent record is written first and [`recover()`](Self::recover) finishes the
/// operation on the next startup. Nothing is rolled back or retried.
///
/// ### Thread Safety
///
/// Every mutating operation takes `&mut self`. To share an instance between threads wrap it
/// in one `Mutex` (or `RwLock`); recursive operations read and write many keys and must not
/// interleave.
///
/// ### Example
///
/// ```
/// use kv_vfs::{MapStore, VirtualFileSystem};
///
/// let mut fs = VirtualFileSystem::open(MapStore::new()).unwrap();
///
/// fs.mkdir("/docs").unwrap();
/// fs.write("/docs/note.txt", "Hello", None).unwrap();
/// assert_eq!(fs.read("/docs/note.txt").unwrap().text(), Some("Hello"));
///
/// fs.rename("/docs", "/archive").unwrap();
/// assert!(fs.exists("/archive/note.txt"));
/// ```
pub struct VirtualFileSystem<S: KvStore> {
    store: S,
    config: VfsConfig,
    events: EventBus,
}

impl<S: KvStore> VirtualFileSystem<S> {
    /// Opens a file system over `store` with default settings.
    pub fn open(store: S) -> VfsResult<Self> {
        Self::new(store, VfsConfig::default())
    }

    /// Opens a file system over `store`.
    ///
    /// Finishes any interrupted rename/delete, then creates the bootstrap directories.
    /// A failed recovery is logged and reported as [`VfsEvent::RecoveryFailed`]; the file
    /// system still opens.
    pub fn new(store: S, config: VfsConfig) -> VfsResult<Self> {
        let mut fs = Self {
            store,
            config,
            events: EventBus::default(),
        };
        if let Err(err) = fs.recover() {
            tracing::error!("recovery failed, opening anyway: {}", err);
            fs.events.emit(VfsEvent::RecoveryFailed {
                reason: err.to_string(),
            });
        }
        fs.bootstrap()?;
        Ok(fs)
    }

    pub fn config(&self) -> &VfsConfig {
        &self.config
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Direct access to the store. Writing keys under this file system's namespace
    /// bypasses every invariant.
    pub fn store_mut(&mut self) -> &mut S {
        &mut self.store
    }

    pub fn into_store(self) -> S {
        self.store
    }

    /// Returns a channel receiving every future [`VfsEvent`].
    pub fn subscribe(&mut self) -> Receiver<VfsEvent> {
        self.events.subscribe()
    }

    /// Creates every configured root-level directory that is missing.
    pub fn bootstrap(&mut self) -> VfsResult<()> {
        let dirs = self.config.bootstrap_dirs.clone();
        for dir in dirs {
            self.mkdir(&dir)?;
        }
        Ok(())
    }

    /// Rolls forward a rename or delete that was interrupted before it could finish.
    ///
    /// Returns `true` if there was something to recover. A quota failure drops the
    /// intent, so the operation is not attempted again.
    pub fn recover(&mut self) -> VfsResult<bool> {
        let namespace = self.config.namespace.clone();
        let Some(intent) = journal::pending(&self.store, &namespace)
            .map_err(|e| VfsError::from_store(e, &namespace))?
        else {
            return Ok(false);
        };

        tracing::warn!(
            operation = intent.name(),
            path = intent.path(),
            "finishing interrupted operation"
        );
        let result = match &intent {
            Intent::Rename { from, to } => self.finish_rename(from, to),
            Intent::Delete { path } => self
                .subtree_paths(path)
                .and_then(|snapshot| self.remove_subtree(path, &snapshot)),
        };
        self.settle(result)?;
        self.clear_intent()?;

        self.events.emit(VfsEvent::Recovered {
            operation: intent.name().to_string(),
            path: intent.path().to_string(),
        });
        Ok(true)
    }

    /// Creates or overwrites the file at `path`.
    ///
    /// * `content` - opaque payload: text or any JSON value.
    /// * `overrides` - extension fields merged into the metadata. A `created` field holding
    ///   an RFC 3339 timestamp replaces the creation time; `modified` is always "now".
    ///
    /// If `path` already holds a file, its `created` time and extension fields are kept.
    /// If it holds a directory, the directory entry becomes a file and its descendants
    /// are left alone (unless `strict_types` is set, which fails with `TypeConflict`).
    ///
    /// When the store runs out of space a [`VfsEvent::CapacityExceeded`] is emitted,
    /// `Err(VfsError::CapacityExceeded)` returns and the previous entry stays as it was.
    pub fn write(
        &mut self,
        path: &str,
        content: impl Into<Value>,
        overrides: Option<&MetaOverrides>,
    ) -> VfsResult<()> {
        let path = Self::canonical(path)?;
        if utils::is_root(&path) {
            return Err(VfsError::invalid_argument("cannot write to the root directory"));
        }

        let previous = self.load(&path)?;
        let previous_meta = match &previous {
            Some(entry) if entry.is_dir() && self.config.strict_types => {
                return Err(VfsError::TypeConflict(format!("{path} is a directory")));
            }
            Some(entry) if entry.is_file() => Some(entry.metadata()),
            _ => None,
        };

        let metadata = Metadata::merged(previous_meta, overrides, Utc::now());
        let entry = Entry::file(path.as_str(), content.into(), metadata);
        self.persist(&entry)?;
        tracing::debug!(path = %path, "wrote file");
        Ok(())
    }

    /// Returns the entry stored at exactly `path`.
    pub fn read(&self, path: &str) -> VfsResult<Entry> {
        let path = Self::canonical(path)?;
        self.load(&path)?.ok_or(VfsError::NotFound(path))
    }

    /// Checks if an entry is stored at exactly `path`.
    ///
    /// A store failure is logged and reported as `false`.
    pub fn exists(&self, path: &str) -> bool {
        let Ok(path) = Self::canonical(path) else {
            return false;
        };
        match self.load(&path) {
            Ok(entry) => entry.is_some(),
            Err(e) => {
                tracing::warn!(path = %path, "exists check failed: {}", e);
                false
            }
        }
    }

    /// Checks if `path` is a directory. Error returns if `path` does not exist.
    pub fn is_dir(&self, path: &str) -> VfsResult<bool> {
        Ok(self.read(path)?.is_dir())
    }

    /// Checks if `path` is a regular file. Error returns if `path` does not exist.
    pub fn is_file(&self, path: &str) -> VfsResult<bool> {
        Ok(self.read(path)?.is_file())
    }

    /// Creates a directory at `path`.
    ///
    /// Does nothing if anything already exists there. Parents are not created.
    /// With `strict_types`, an existing file at `path` fails with `TypeConflict`.
    pub fn mkdir(&mut self, path: &str) -> VfsResult<()> {
        let path = Self::canonical(path)?;
        if let Some(existing) = self.load(&path)? {
            if existing.is_file() && self.config.strict_types {
                return Err(VfsError::TypeConflict(format!("{path} is a file")));
            }
            return Ok(());
        }
        self.persist(&Entry::directory(path.as_str(), Utc::now()))?;
        tracing::debug!(path = %path, "created directory");
        Ok(())
    }

    /// Removes `path`; a directory is removed together with all its descendants.
    ///
    /// Does nothing if `path` does not exist. Children are always removed before their
    /// parent, so an interruption can leave orphaned leaves but never a missing directory
    /// with live descendants.
    pub fn delete(&mut self, path: &str) -> VfsResult<()> {
        let path = Self::canonical(path)?;
        let Some(entry) = self.load(&path)? else {
            return Ok(());
        };

        if entry.is_file() {
            self.unlink(&path)?;
            tracing::debug!(path = %path, "deleted file");
            return Ok(());
        }

        self.begin_intent(&Intent::Delete { path: path.clone() })?;
        let snapshot = self.subtree_paths(&path)?;
        let removed = self.remove_subtree(&path, &snapshot);
        self.settle(removed)?;
        self.clear_intent()?;
        tracing::debug!(path = %path, removed = snapshot.len() + 1, "deleted directory");
        Ok(())
    }

    /// Moves the entry at `old_path` (and, for a directory, its whole subtree) to `new_path`.
    ///
    /// # Errors
    /// * `InvalidArgument` - a path is empty, either path is the root, or `new_path` lies
    ///   inside `old_path`.
    /// * `NotFound` - nothing is stored at `old_path`.
    /// * `AlreadyExists` - something is stored at `new_path`; rename never overwrites.
    ///
    /// Descendants are moved first, each by writing the rewritten entry under its new key
    /// and then removing the old key. Only the leading `old_path` of each descendant is
    /// replaced. The directory entry itself moves last. Timestamps are kept.
    pub fn rename(&mut self, old_path: &str, new_path: &str) -> VfsResult<()> {
        if old_path.trim().is_empty() || new_path.trim().is_empty() {
            return Err(VfsError::invalid_argument("rename needs a source and a destination"));
        }
        let old_path = utils::normalize(old_path);
        let new_path = utils::normalize(new_path);
        if utils::is_root(&old_path) {
            return Err(VfsError::invalid_argument("cannot rename the root directory"));
        }
        if utils::is_root(&new_path) {
            return Err(VfsError::invalid_argument("cannot rename onto the root directory"));
        }
        if utils::is_descendant(&new_path, &old_path) {
            return Err(VfsError::invalid_argument(format!(
                "cannot move {old_path} into itself"
            )));
        }

        let entry = self
            .load(&old_path)?
            .ok_or_else(|| VfsError::not_found(old_path.as_str()))?;
        if self.load(&new_path)?.is_some() {
            return Err(VfsError::AlreadyExists(new_path));
        }

        if entry.is_dir() {
            self.begin_intent(&Intent::Rename {
                from: old_path.clone(),
                to: new_path.clone(),
            })?;
            let moved = self
                .relocate_descendants(&old_path, &new_path)
                .and_then(|()| self.relocate_entry(entry, &new_path));
            self.settle(moved)?;
            self.clear_intent()?;
        } else {
            self.relocate_entry(entry, &new_path)?;
        }
        tracing::debug!(from = %old_path, to = %new_path, "renamed");
        Ok(())
    }

    /// Returns the direct children of `dir_path`, in storage order.
    ///
    /// A missing or childless directory yields an empty list.
    pub fn list(&self, dir_path: &str) -> VfsResult<Vec<Entry>> {
        if dir_path.trim().is_empty() {
            return Ok(Vec::new());
        }
        let dir = utils::normalize(dir_path);
        self.collect(|path| utils::is_direct_child(path, &dir))
    }

    /// Returns every entry below `dir_path` (any depth), in storage order.
    pub fn tree(&self, dir_path: &str) -> VfsResult<Vec<Entry>> {
        if dir_path.trim().is_empty() {
            return Ok(Vec::new());
        }
        let dir = utils::normalize(dir_path);
        self.collect(|path| utils::is_descendant(path, &dir))
    }

    /// Returns entries whose name contains `query`, ignoring case.
    ///
    /// An empty query matches nothing.
    pub fn search(&self, query: &str) -> VfsResult<Vec<Entry>> {
        if query.is_empty() {
            return Ok(Vec::new());
        }
        let query = query.to_lowercase();
        self.collect(|path| utils::basename(path).to_lowercase().contains(&query))
    }

    /// Counts files and directories and sums their serialized sizes.
    pub fn usage(&self) -> VfsResult<StorageUsage> {
        let mut usage = StorageUsage::default();
        for path in self.paths()? {
            let key = self.key(&path);
            let Some(raw) = self.store.get(&key).map_err(|e| VfsError::from_store(e, &path))?
            else {
                continue;
            };
            usage.used_bytes += raw.len() as u64;
            match Entry::from_json(&raw) {
                Ok(entry) if entry.is_dir() => usage.directory_count += 1,
                Ok(_) => usage.file_count += 1,
                Err(_) => {}
            }
        }
        Ok(usage)
    }

    fn canonical(path: &str) -> VfsResult<String> {
        if path.trim().is_empty() {
            return Err(VfsError::invalid_argument("path is empty"));
        }
        Ok(utils::normalize(path))
    }

    fn key(&self, path: &str) -> String {
        format!("{}{}", self.config.namespace, path)
    }

    /// Every path stored under this namespace, in storage order.
    fn paths(&self) -> VfsResult<Vec<String>> {
        let namespace = self.config.namespace.as_str();
        let keys = self
            .store
            .keys()
            .map_err(|e| VfsError::from_store(e, namespace))?;
        Ok(keys
            .into_iter()
            .filter_map(|key| {
                let path = key.strip_prefix(namespace)?;
                path.starts_with(utils::SEPARATOR).then(|| path.to_string())
            })
            .collect())
    }

    fn subtree_paths(&self, dir: &str) -> VfsResult<Vec<String>> {
        Ok(self
            .paths()?
            .into_iter()
            .filter(|path| utils::is_descendant(path, dir))
            .collect())
    }

    fn collect(&self, mut predicate: impl FnMut(&str) -> bool) -> VfsResult<Vec<Entry>> {
        let mut entries = Vec::new();
        for path in self.paths()? {
            if predicate(&path) {
                if let Some(entry) = self.load(&path)? {
                    entries.push(entry);
                }
            }
        }
        Ok(entries)
    }

    /// Loads the entry at `path`. A value that fails to deserialize reads as absent.
    fn load(&self, path: &str) -> VfsResult<Option<Entry>> {
        let raw = self
            .store
            .get(&self.key(path))
            .map_err(|e| VfsError::from_store(e, path))?;
        let Some(raw) = raw else {
            return Ok(None);
        };
        match Entry::from_json(&raw) {
            Ok(mut entry) => {
                if entry.path() != path {
                    entry.set_path(path);
                }
                Ok(Some(entry))
            }
            Err(e) => {
                tracing::warn!(path = %path, "treating corrupt entry as absent: {}", e);
                Ok(None)
            }
        }
    }

    fn persist(&mut self, entry: &Entry) -> VfsResult<()> {
        let value = entry.to_json()?;
        self.put(entry.path(), &value)
    }

    fn put(&mut self, path: &str, value: &str) -> VfsResult<()> {
        let key = self.key(path);
        match self.store.set(&key, value) {
            Ok(()) => Ok(()),
            Err(e) => {
                let err = VfsError::from_store(e, path);
                self.report(&err);
                Err(err)
            }
        }
    }

    fn unlink(&mut self, path: &str) -> VfsResult<()> {
        let key = self.key(path);
        self.store
            .remove(&key)
            .map_err(|e| VfsError::from_store(e, path))
    }

    fn report(&mut self, err: &VfsError) {
        if let VfsError::CapacityExceeded(path) = err {
            tracing::error!(path = %path, "storage capacity exceeded");
            self.events.emit(VfsEvent::CapacityExceeded { path: path.clone() });
        }
    }

    fn begin_intent(&mut self, intent: &Intent) -> VfsResult<()> {
        if !self.config.journal {
            return Ok(());
        }
        let result = journal::record(&mut self.store, &self.config.namespace, intent);
        if let Err(err) = &result {
            self.report(err);
        }
        result
    }

    fn clear_intent(&mut self) -> VfsResult<()> {
        journal::clear(&mut self.store, &self.config.namespace)
            .map_err(|e| VfsError::from_store(e, &self.config.namespace))
    }

    /// Passes `result` through. A quota failure is final: the pending intent is dropped
    /// so that the next startup does not run into the same limit. Any other failure keeps
    /// the intent for `recover()`.
    fn settle(&mut self, result: VfsResult<()>) -> VfsResult<()> {
        if let Err(VfsError::CapacityExceeded(path)) = &result {
            tracing::warn!(path = %path, "abandoning operation after quota failure");
            if let Err(e) = self.clear_intent() {
                tracing::warn!("failed to clear intent: {}", e);
            }
        }
        result
    }

    /// Finishes a directory rename. The directory entry may already have been written
    /// under `to`; the leftover under `from` is then only removed.
    fn finish_rename(&mut self, from: &str, to: &str) -> VfsResult<()> {
        self.relocate_descendants(from, to)?;
        let Some(entry) = self.load(from)? else {
            return Ok(());
        };
        if self.load(to)?.is_some() {
            self.unlink(from)
        } else {
            self.relocate_entry(entry, to)
        }
    }

    /// Removes `dir` and everything listed below it in `snapshot`, children first.
    ///
    /// Children are derived from the first path segment below `dir`, so descendants whose
    /// intermediate directories are missing are still reached.
    fn remove_subtree(&mut self, dir: &str, snapshot: &[String]) -> VfsResult<()> {
        let prefix = utils::child_prefix(dir);
        let mut children: Vec<String> = Vec::new();
        for path in snapshot.iter().filter(|p| utils::is_descendant(p, dir)) {
            let rest = &path[prefix.len()..];
            let name = rest.split(utils::SEPARATOR).next().unwrap_or(rest);
            let child = format!("{prefix}{name}");
            if !children.contains(&child) {
                children.push(child);
            }
        }

        for child in &children {
            self.remove_subtree(child, snapshot)?;
        }
        self.unlink(dir)
    }

    /// Moves every key below `old` to the same place below `new`.
    ///
    /// Values that do not deserialize are moved verbatim.
    fn relocate_descendants(&mut self, old: &str, new: &str) -> VfsResult<()> {
        for path in self.subtree_paths(old)? {
            let Some(target) = utils::replace_prefix(&path, old, new) else {
                continue;
            };
            let raw = self
                .store
                .get(&self.key(&path))
                .map_err(|e| VfsError::from_store(e, &path))?;
            let Some(raw) = raw else {
                continue;
            };
            let value = match Entry::from_json(&raw) {
                Ok(mut entry) => {
                    entry.set_path(target.as_str());
                    entry.to_json()?
                }
                Err(e) => {
                    tracing::warn!(path = %path, "moving corrupt entry verbatim: {}", e);
                    raw
                }
            };
            self.put(&target, &value)?;
            self.unlink(&path)?;
        }
        Ok(())
    }

    fn relocate_entry(&mut self, mut entry: Entry, new_path: &str) -> VfsResult<()> {
        let old_path = entry.path().to_string();
        entry.set_path(new_path);
        self.persist(&entry)?;
        self.unlink(&old_path)
    }
}
