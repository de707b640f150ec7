//! String blob stores used for snapshots.

use std::collections::HashMap;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use tracing::trace;

use crate::{Error, Result};

/// A flat key/value store of UTF-8 blobs.
///
/// Writes are last-writer-wins; there is no versioning.
pub trait BlobStore: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<String>>;
    fn set(&self, key: &str, value: String) -> Result<()>;
    fn list_keys(&self) -> Result<Vec<String>>;
}

/// Process-local store, shared across sessions through an `Arc`.
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: Mutex<HashMap<String, String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, HashMap<String, String>>> {
        self.entries
            .lock()
            .map_err(|_| Error::Store("memory store lock poisoned".to_owned()))
    }
}

impl BlobStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<String>> {
        Ok(self.lock()?.get(key).cloned())
    }

    fn set(&self, key: &str, value: String) -> Result<()> {
        self.lock()?.insert(key.to_owned(), value);
        Ok(())
    }

    fn list_keys(&self) -> Result<Vec<String>> {
        let mut keys: Vec<String> = self.lock()?.keys().cloned().collect();
        keys.sort();
        Ok(keys)
    }
}

/// Directory-backed store, one file per key.
///
/// Key names are escaped so namespaced keys (`a/b/c`) map to flat file names.
#[derive(Debug, Clone)]
pub struct FsStore {
    root: PathBuf,
}

impl FsStore {
    /// Open (and create if needed) a store rooted at `root`.
    pub fn open(root: impl AsRef<Path>) -> Result<Self> {
        let root = root.as_ref().to_path_buf();
        fs::create_dir_all(&root)?;
        Ok(Self { root })
    }

    #[inline]
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn path_for(&self, key: &str) -> PathBuf {
        self.root.join(escape_key(key))
    }
}

impl BlobStore for FsStore {
    fn get(&self, key: &str) -> Result<Option<String>> {
        match fs::read_to_string(self.path_for(key)) {
            Ok(s) => Ok(Some(s)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn set(&self, key: &str, value: String) -> Result<()> {
        let path = self.path_for(key);
        trace!(key, path = %path.display(), bytes = value.len(), "writing blob");
        fs::write(path, value)?;
        Ok(())
    }

    fn list_keys(&self) -> Result<Vec<String>> {
        let mut keys = Vec::new();
        for entry in fs::read_dir(&self.root)? {
            let entry = entry?;
            if !entry.file_type()?.is_file() {
                continue;
            }
            if let Some(name) = entry.file_name().to_str() {
                keys.push(unescape_key(name));
            }
        }
        keys.sort();
        Ok(keys)
    }
}

fn escape_key(key: &str) -> String {
    let mut out = String::with_capacity(key.len());
    for c in key.chars() {
        match c {
            '%' => out.push_str("%25"),
            '/' => out.push_str("%2F"),
            '\\' => out.push_str("%5C"),
            _ => out.push(c),
        }
    }
    out
}

fn unescape_key(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    let mut rest = name;
    while let Some(pos) = rest.find('%') {
        out.push_str(&rest[..pos]);
        let tail = &rest[pos..];
        let (decoded, used) = match tail.get(..3) {
            Some("%25") => ('%', 3),
            Some("%2F") => ('/', 3),
            Some("%5C") => ('\\', 3),
            _ => ('%', 1),
        };
        out.push(decoded);
        rest = &tail[used..];
    }
    out.push_str(rest);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn memory_store_overwrites_and_lists_sorted() {
        let store = MemoryStore::new();
        assert_eq!(store.get("a").unwrap(), None);
        store.set("b", "1".to_owned()).unwrap();
        store.set("a", "2".to_owned()).unwrap();
        store.set("b", "3".to_owned()).unwrap();
        assert_eq!(store.get("b").unwrap().as_deref(), Some("3"));
        assert_eq!(store.list_keys().unwrap(), vec!["a", "b"]);
    }

    #[test]
    fn key_escaping_roundtrips() {
        for key in ["ns/config/m1", "100%/x", "a%2Fb", "plain"] {
            let escaped = escape_key(key);
            assert!(!escaped.contains('/'));
            assert_eq!(unescape_key(&escaped), key);
        }
    }

    #[test]
    fn fs_store_persists_namespaced_keys() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsStore::open(dir.path()).unwrap();
        store.set("ns/model/m1", "{}".to_owned()).unwrap();

        let reopened = FsStore::open(dir.path()).unwrap();
        assert_eq!(reopened.get("ns/model/m1").unwrap().as_deref(), Some("{}"));
        assert_eq!(reopened.get("ns/model/m2").unwrap(), None);
        assert_eq!(reopened.list_keys().unwrap(), vec!["ns/model/m1"]);
    }
}
