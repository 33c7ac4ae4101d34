//! This module provides a key-value store that keeps every value in its own file inside a
//! host directory.
//!
//! ### Key Features:
//! - **Isolated root**: All files live directly in a designated root directory (`self.root`).
//! - **Portable file names**: Keys are hex-encoded, so `/` and other special characters in
//!   keys never reach the host file system. Keys too long for a file name are stored in a
//!   file named by their SHA-256 digest, with the key itself written at the start of it.
//! - **Atomic single-key writes**: A value is written to a temporary file and renamed over
//!   the old one.
//! - **Auto‑cleanup**: Optionally removes created artifacts on Drop (when `is_auto_clean = true`).

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use anyhow::{Context, ensure};
use sha2::{Digest, Sha256};

use crate::core::{KvStore, Result, StoreError, StoreResult};

/// `<hex key>.val`: the file holds the value only.
const VALUE_EXT: &str = "val";
/// `<sha256 of key>.lval`: the file holds `"<key length>\n<key><value>"`.
const KEYED_VALUE_EXT: &str = "lval";
const TMP_EXT: &str = "tmp";
/// Longest hex stem used as a file name; most host file systems allow 255 bytes.
const MAX_STEM_LEN: usize = 200;

/// A key-value store persisted in a host directory.
///
/// ### Usage notes:
/// - Values survive process restarts: a new `DirStore` over the same root sees every key.
/// - `capacity` limits the sum of value sizes in bytes (file name and key headers are not
///   counted); a write past it fails with [`StoreError::CapacityExceeded`] and leaves the
///   previous value on disk.
/// - Not thread‑safe in current version (wrap in `Mutex` if needed).
///
/// ### Example:
/// ```
/// use kv_vfs::{DirStore, KvStore};
///
/// let root = std::env::temp_dir().join("kv_vfs_doc_store");
///
/// let mut store = DirStore::new(&root).unwrap();
/// store.set("vfs:/docs/note.txt", "Hello").unwrap();
/// assert_eq!(store.get("vfs:/docs/note.txt").unwrap().as_deref(), Some("Hello"));
/// ```
pub struct DirStore {
    root: PathBuf,
    created_dirs: Vec<PathBuf>, // made by `new`, outermost first
    capacity: Option<u64>,
    used: u64,
    is_auto_clean: bool,
}

impl DirStore {
    /// Opens (or creates) a store rooted at `root`.
    /// * `root` is an absolute host path. If it does not exist it will be created,
    ///   together with any missing parents.
    ///
    /// If `root` is not absolute, is not a directory, or is not writable, an error returns.
    /// By default, the `is_auto_clean` flag is set to `false`: data is meant to persist.
    pub fn new<P: AsRef<Path>>(root: P) -> Result<Self> {
        let root = root.as_ref();
        ensure!(root.is_absolute(), "store root must be an absolute path: {:?}", root);

        let created_dirs = if root.exists() {
            ensure!(root.is_dir(), "store root {:?} is not a directory", root);
            Vec::new()
        } else {
            create_root(root)?
        };
        ensure_writable(root).with_context(|| format!("store root {:?} is not writable", root))?;

        let mut store = Self {
            root: root.to_path_buf(),
            created_dirs,
            capacity: None,
            used: 0,
            is_auto_clean: false,
        };
        store.used = store.scan_used()?;
        tracing::debug!(root = %root.display(), used = store.used, "opened directory store");
        Ok(store)
    }

    /// Opens a store with a byte limit on the total size of stored values.
    pub fn with_capacity<P: AsRef<Path>>(root: P, capacity: u64) -> Result<Self> {
        let mut store = Self::new(root)?;
        store.capacity = Some(capacity);
        Ok(store)
    }

    pub fn root(&self) -> &Path {
        self.root.as_path()
    }

    /// Bytes currently used by stored values.
    pub fn used(&self) -> u64 {
        self.used
    }

    pub fn set_capacity(&mut self, capacity: Option<u64>) {
        self.capacity = capacity;
    }

    /// Changes auto-clean flag.
    /// If auto-clean flag is true all values and the created root directories
    /// will be removed on drop.
    pub fn set_auto_clean(&mut self, clean: bool) {
        self.is_auto_clean = clean;
    }

    /// Removes every stored value, but preserves the root directory.
    pub fn cleanup(&mut self) -> bool {
        let mut is_ok = true;
        let files = match self.value_files() {
            Ok(files) => files,
            Err(e) => {
                tracing::warn!("Unable to scan {}: {}", self.root.display(), e);
                return false;
            }
        };
        for file in files {
            if let Err(e) = std::fs::remove_file(&file) {
                is_ok = false;
                tracing::warn!("Unable to remove {}: {}", file.display(), e);
            }
        }
        if is_ok {
            self.used = 0;
        }
        is_ok
    }

    /// The file holding `key`; `true` if that file carries a key header.
    fn file_for(&self, key: &str) -> (PathBuf, bool) {
        let stem = encode_key(key);
        if stem.len() <= MAX_STEM_LEN {
            (self.root.join(format!("{stem}.{VALUE_EXT}")), false)
        } else {
            (self.root.join(format!("{}.{KEYED_VALUE_EXT}", hash_key(key))), true)
        }
    }

    fn value_files(&self) -> std::io::Result<Vec<PathBuf>> {
        let mut files = Vec::new();
        for entry in std::fs::read_dir(&self.root)? {
            let path = entry?.path();
            if path
                .extension()
                .is_some_and(|ext| ext == VALUE_EXT || ext == KEYED_VALUE_EXT)
            {
                files.push(path);
            }
        }
        files.sort();
        Ok(files)
    }

    fn scan_used(&self) -> std::io::Result<u64> {
        let mut used = 0;
        for file in self.value_files()? {
            used += if is_keyed(&file) {
                read_record(&file)?.map_or(0, |(_, value)| value.len() as u64)
            } else {
                std::fs::metadata(file)?.len()
            };
        }
        Ok(used)
    }

    /// Size of the value stored for `key`, without its key header.
    fn stored_size(file: &Path, keyed: bool, key: &str) -> std::io::Result<Option<u64>> {
        match std::fs::metadata(file) {
            Ok(meta) if keyed => Ok(Some(meta.len().saturating_sub(header_len(key)))),
            Ok(meta) => Ok(Some(meta.len())),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// Deletes the stored values, then the directories `new` created, innermost first.
    /// Stops at the first directory that cannot go (e.g. it holds foreign files).
    fn remove_all(&mut self) {
        self.cleanup();
        while let Some(dir) = self.created_dirs.pop() {
            if let Err(e) = std::fs::remove_dir(&dir) {
                tracing::warn!("Keeping {}: {}", dir.display(), e);
                break;
            }
        }
    }
}

impl KvStore for DirStore {
    fn get(&self, key: &str) -> StoreResult<Option<String>> {
        let (file, _) = self.file_for(key);
        match read_record(&file)? {
            Some((Some(stored), _)) if stored != key => {
                tracing::warn!("{} belongs to another key", file.display());
                Ok(None)
            }
            Some((_, value)) => Ok(Some(value)),
            None => Ok(None),
        }
    }

    fn set(&mut self, key: &str, value: &str) -> StoreResult<()> {
        let (file, keyed) = self.file_for(key);
        let previous = Self::stored_size(&file, keyed, key)?.unwrap_or(0);
        let next = self.used - previous.min(self.used) + value.len() as u64;
        if let Some(capacity) = self.capacity {
            if next > capacity {
                return Err(StoreError::CapacityExceeded);
            }
        }

        let tmp = file.with_extension(TMP_EXT);
        if keyed {
            std::fs::write(&tmp, format!("{}\n{key}{value}", key.len()))?;
        } else {
            std::fs::write(&tmp, value)?;
        }
        if let Err(e) = std::fs::rename(&tmp, &file) {
            let _ = std::fs::remove_file(&tmp);
            return Err(e.into());
        }
        self.used = next;
        Ok(())
    }

    fn remove(&mut self, key: &str) -> StoreResult<()> {
        let (file, keyed) = self.file_for(key);
        let Some(size) = Self::stored_size(&file, keyed, key)? else {
            return Ok(());
        };
        std::fs::remove_file(&file)?;
        self.used = self.used.saturating_sub(size);
        Ok(())
    }

    fn keys(&self) -> StoreResult<Vec<String>> {
        let mut keys = Vec::new();
        for file in self.value_files()? {
            let key = if is_keyed(&file) {
                read_record(&file).ok().flatten().and_then(|(key, _)| key)
            } else {
                file.file_stem()
                    .and_then(|stem| stem.to_str())
                    .and_then(decode_key)
            };
            match key {
                Some(key) => keys.push(key),
                None => tracing::warn!("skipping foreign file {}", file.display()),
            }
        }
        Ok(keys)
    }
}

impl Drop for DirStore {
    fn drop(&mut self) {
        if self.is_auto_clean {
            self.remove_all();
        }
    }
}

/// Creates `root` and its missing ancestors.
/// Returns the directories that did not exist before, outermost first.
fn create_root(root: &Path) -> Result<Vec<PathBuf>> {
    let mut missing: Vec<PathBuf> = root
        .ancestors()
        .take_while(|dir| !dir.exists())
        .map(Path::to_path_buf)
        .collect();
    missing.reverse();
    std::fs::create_dir_all(root).with_context(|| format!("cannot create {:?}", root))?;
    Ok(missing)
}

fn ensure_writable(dir: &Path) -> std::io::Result<()> {
    let marker = dir.join(".kv-vfs-writable");
    std::fs::write(&marker, b"")?;
    std::fs::remove_file(&marker)
}

fn is_keyed(file: &Path) -> bool {
    file.extension().is_some_and(|ext| ext == KEYED_VALUE_EXT)
}

/// Reads `file`. For a keyed file the key header is split off and returned too.
fn read_record(file: &Path) -> std::io::Result<Option<(Option<String>, String)>> {
    let raw = match std::fs::read_to_string(file) {
        Ok(raw) => raw,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(e),
    };
    if !is_keyed(file) {
        return Ok(Some((None, raw)));
    }
    let (key, value) = split_header(&raw).ok_or_else(|| {
        std::io::Error::new(
            ErrorKind::InvalidData,
            format!("malformed key header in {}", file.display()),
        )
    })?;
    Ok(Some((Some(key.to_string()), value.to_string())))
}

fn split_header(raw: &str) -> Option<(&str, &str)> {
    let (len, rest) = raw.split_once('\n')?;
    let len: usize = len.parse().ok()?;
    if !rest.is_char_boundary(len) {
        return None;
    }
    Some(rest.split_at(len))
}

fn header_len(key: &str) -> u64 {
    (key.len().to_string().len() + 1 + key.len()) as u64
}

fn hash_key(key: &str) -> String {
    encode_bytes(&Sha256::digest(key.as_bytes()))
}

fn encode_key(key: &str) -> String {
    encode_bytes(key.as_bytes())
}

fn encode_bytes(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}

fn decode_key(name: &str) -> Option<String> {
    if name.len() % 2 != 0 {
        return None;
    }
    let bytes = (0..name.len())
        .step_by(2)
        .map(|i| u8::from_str_radix(name.get(i..i + 2)?, 16).ok())
        .collect::<Option<Vec<u8>>>()?;
    String::from_utf8(bytes).ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempdir::TempDir;

    fn setup_test_env() -> TempDir {
        TempDir::new("dirstore_test").unwrap()
    }

    mod creations {
        use super::*;

        #[test]
        fn test_new_creates_missing_root() -> Result<()> {
            let tmp = setup_test_env();
            let root = tmp.path().join("a/b/c");

            let store = DirStore::new(&root)?;
            assert!(root.is_dir());
            assert_eq!(store.root(), root.as_path());
            assert_eq!(
                store.created_dirs,
                vec![tmp.path().join("a"), tmp.path().join("a/b"), root.clone()]
            );
            Ok(())
        }

        #[test]
        fn test_new_relative_root_error() {
            let result = DirStore::new("relative/root");
            assert!(result.is_err());
        }

        #[test]
        fn test_new_empty_root_error() {
            let result = DirStore::new("");
            assert!(result.is_err());
        }

        #[test]
        fn test_new_root_is_file_error() -> Result<()> {
            let tmp = setup_test_env();
            let file = tmp.path().join("file");
            std::fs::write(&file, b"x")?;
            assert!(DirStore::new(&file).is_err());
            Ok(())
        }

        #[test]
        fn test_auto_clean_removes_created_parents() -> Result<()> {
            let tmp = setup_test_env();
            let root = tmp.path().join("outer/inner");
            {
                let mut store = DirStore::new(&root)?;
                store.set_auto_clean(true);
                store.set("k", "v")?;
            }
            assert!(!tmp.path().join("outer").exists());
            Ok(())
        }
    }

    mod operations {
        use super::*;

        #[test]
        fn test_set_get_remove() -> Result<()> {
            let tmp = setup_test_env();
            let mut store = DirStore::new(tmp.path())?;

            store.set("vfs:/docs/a.txt", "hello")?;
            assert_eq!(store.get("vfs:/docs/a.txt")?, Some("hello".to_string()));
            assert_eq!(store.used(), 5);

            store.remove("vfs:/docs/a.txt")?;
            assert_eq!(store.get("vfs:/docs/a.txt")?, None);
            assert_eq!(store.used(), 0);

            store.remove("vfs:/docs/a.txt")?;
            Ok(())
        }

        #[test]
        fn test_keys_round_trip_through_file_names() -> Result<()> {
            let tmp = setup_test_env();
            let mut store = DirStore::new(tmp.path())?;

            store.set("vfs:/b", "")?;
            store.set("vfs:/a/Ünïcode name", "")?;
            std::fs::write(tmp.path().join("zz.val"), b"foreign")?;
            std::fs::write(tmp.path().join("notes.txt"), b"ignored")?;

            let mut keys = store.keys()?;
            keys.sort();
            assert_eq!(keys, vec!["vfs:/a/Ünïcode name", "vfs:/b"]);
            Ok(())
        }

        #[test]
        fn test_persists_across_instances() -> Result<()> {
            let tmp = setup_test_env();
            {
                let mut store = DirStore::new(tmp.path())?;
                store.set("k", "persisted")?;
            }
            let store = DirStore::new(tmp.path())?;
            assert_eq!(store.get("k")?, Some("persisted".to_string()));
            assert_eq!(store.used(), 9);
            Ok(())
        }

        #[test]
        fn test_capacity_exceeded_keeps_previous_value() -> Result<()> {
            let tmp = setup_test_env();
            let mut store = DirStore::with_capacity(tmp.path(), 8)?;

            store.set("k", "short")?;
            let result = store.set("k", "much longer value");
            assert!(matches!(result, Err(StoreError::CapacityExceeded)));
            assert_eq!(store.get("k")?, Some("short".to_string()));

            store.set_capacity(None);
            store.set("k", "much longer value")?;
            Ok(())
        }

        #[test]
        fn test_cleanup_keeps_root() -> Result<()> {
            let tmp = setup_test_env();
            let mut store = DirStore::new(tmp.path())?;
            store.set("a", "1")?;
            store.set("b", "2")?;

            assert!(store.cleanup());
            assert!(store.keys()?.is_empty());
            assert!(tmp.path().is_dir());
            Ok(())
        }
    }

    mod long_keys {
        use super::*;
        use crate::{VfsConfig, VirtualFileSystem};

        fn long_path() -> String {
            format!("/docs/{}", "n".repeat(200))
        }

        #[test]
        fn test_long_key_set_get_keys_remove() -> Result<()> {
            let tmp = setup_test_env();
            let mut store = DirStore::new(tmp.path())?;
            let key = format!("vfs:{}", long_path());

            store.set(&key, "hello")?;
            assert_eq!(store.get(&key)?, Some("hello".to_string()));
            assert_eq!(store.keys()?, vec![key.clone()]);
            assert_eq!(store.used(), 5);

            store.set(&key, "hi")?;
            assert_eq!(store.used(), 2);

            store.remove(&key)?;
            assert_eq!(store.get(&key)?, None);
            assert!(store.keys()?.is_empty());
            assert_eq!(store.used(), 0);
            Ok(())
        }

        #[test]
        fn test_long_key_file_name_is_bounded() -> Result<()> {
            let tmp = setup_test_env();
            let mut store = DirStore::new(tmp.path())?;
            store.set(&"k".repeat(1000), "v")?;

            let files = store.value_files()?;
            assert_eq!(files.len(), 1);
            let name = files[0].file_name().unwrap().to_str().unwrap();
            assert_eq!(name.len(), 64 + ".lval".len());
            Ok(())
        }

        #[test]
        fn test_long_key_survives_reopen() -> Result<()> {
            let tmp = setup_test_env();
            let key = "x".repeat(300);
            {
                let mut store = DirStore::new(tmp.path())?;
                store.set(&key, "kept")?;
            }
            let store = DirStore::new(tmp.path())?;
            assert_eq!(store.get(&key)?, Some("kept".to_string()));
            assert_eq!(store.used(), 4);
            Ok(())
        }

        #[test]
        fn test_hashed_file_of_other_key_is_ignored() -> Result<()> {
            let tmp = setup_test_env();
            let mut store = DirStore::new(tmp.path())?;
            let key = "y".repeat(300);
            let (file, keyed) = store.file_for(&key);
            assert!(keyed);
            std::fs::write(&file, "3
abcvalue")?;

            assert_eq!(store.get(&key)?, None);
            assert_eq!(store.keys()?, vec!["abc".to_string()]);
            store.set(&key, "mine")?;
            assert_eq!(store.get(&key)?, Some("mine".to_string()));
            Ok(())
        }

        #[test]
        fn test_file_system_with_long_paths() -> Result<()> {
            let tmp = setup_test_env();
            let store = DirStore::new(tmp.path())?;
            let config = VfsConfig {
                bootstrap_dirs: Vec::new(),
                ..VfsConfig::default()
            };
            let mut fs = VirtualFileSystem::new(store, config)?;
            let path = long_path();

            fs.write(&path, "deep", None)?;
            assert_eq!(fs.read(&path)?.text(), Some("deep"));
            assert_eq!(fs.list("/docs")?.len(), 1);

            fs.rename("/docs", "/archive")?;
            let moved = path.replacen("/docs", "/archive", 1);
            assert_eq!(fs.read(&moved)?.text(), Some("deep"));
            fs.delete("/archive")?;
            assert!(fs.store().keys()?.is_empty());
            Ok(())
        }
    }

    #[test]
    fn test_key_encoding() {
        assert_eq!(encode_key("a/"), "612f");
        assert_eq!(decode_key("612f"), Some("a/".to_string()));
        assert_eq!(decode_key("6"), None);
        assert_eq!(decode_key("zz"), None);
        assert_eq!(split_header("3\nabcdef"), Some(("abc", "def")));
        assert_eq!(split_header("9\nabc"), None);
        assert_eq!(split_header("abc"), None);
        assert_eq!(header_len("abc"), 5);
    }
}
