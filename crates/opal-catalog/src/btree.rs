//! Secondary index storage.
//!
//! An index maps the stringified bytes of a column value to the *set* of row
//! ids carrying that value; a key holds multiple ids when the index is not
//! unique. The ordered map is kept resident (`std::collections::BTreeMap` is
//! itself a B-tree) and persisted write-through to its backing `.bt` file, so
//! contents survive reopen.
//!
//! Primitive operations serialize through an internal mutex. The separate
//! [`Index::lock`] is reserved for callers composing multi-step
//! read-modify-write sequences; the primitives do not take it.

use std::collections::BTreeMap;
use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use opal_common::error::{OpalError, OpalResult};

/// Ordered key to row-id-set store backing one index.
pub struct BTree {
    path: PathBuf,
    inner: Mutex<BTreeInner>,
}

struct BTreeInner {
    file: File,
    map: BTreeMap<Vec<u8>, Vec<Vec<u8>>>,
}

impl BTree {
    /// Opens (creating if absent) a tree from its backing file.
    pub fn open(path: impl AsRef<Path>) -> OpalResult<Self> {
        let path = path.as_ref().to_path_buf();
        let mut file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .open(&path)?;

        let mut bytes = Vec::new();
        file.read_to_end(&mut bytes)?;

        let map = if bytes.is_empty() {
            BTreeMap::new()
        } else {
            bincode::deserialize(&bytes)
                .map_err(|e| OpalError::corruption("index", e.to_string()))?
        };

        Ok(Self {
            path,
            inner: Mutex::new(BTreeInner { file, map }),
        })
    }

    /// Returns the backing file path.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Appends `value` to the set stored under `key`.
    pub fn put(&self, key: &[u8], value: &[u8]) -> OpalResult<()> {
        let mut inner = self.inner.lock();
        inner
            .map
            .entry(key.to_vec())
            .or_default()
            .push(value.to_vec());
        persist(&mut inner)
    }

    /// Returns the set of values under `key`, or `None` when absent.
    pub fn get(&self, key: &[u8]) -> Option<Vec<Vec<u8>>> {
        self.inner.lock().map.get(key).cloned()
    }

    /// Removes one occurrence of `value` from the set under `key`. The key
    /// disappears when its set empties. Removing an absent pair is a no-op.
    pub fn remove(&self, key: &[u8], value: &[u8]) -> OpalResult<()> {
        let mut inner = self.inner.lock();

        let emptied = if let Some(values) = inner.map.get_mut(key) {
            if let Some(pos) = values.iter().position(|v| v == value) {
                values.remove(pos);
            }
            values.is_empty()
        } else {
            false
        };
        if emptied {
            inner.map.remove(key);
        }

        persist(&mut inner)
    }

    /// Number of distinct keys.
    pub fn len(&self) -> usize {
        self.inner.lock().map.len()
    }

    /// Returns true when the tree holds no keys.
    pub fn is_empty(&self) -> bool {
        self.inner.lock().map.is_empty()
    }

    /// Flushes the backing file.
    pub fn close(&self) -> OpalResult<()> {
        self.inner.lock().file.sync_all()?;
        Ok(())
    }
}

/// Rewrites the backing file from the resident map.
fn persist(inner: &mut BTreeInner) -> OpalResult<()> {
    let bytes = bincode::serialize(&inner.map)
        .map_err(|e| OpalError::corruption("index", e.to_string()))?;

    inner.file.set_len(0)?;
    inner.file.seek(SeekFrom::Start(0))?;
    inner.file.write_all(&bytes)?;
    Ok(())
}

/// Metadata persisted to an index's `.idx` file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexMeta {
    /// Index name (without the `idx_` file prefix).
    pub name: String,
    /// Covered column names, in declaration order.
    pub columns: Vec<String>,
    /// Whether a key admits at most one live row.
    pub unique: bool,
}

/// A secondary index: metadata plus the owned tree handle.
pub struct Index {
    meta: IndexMeta,
    tree: BTree,
    lock: Mutex<()>,
}

impl Index {
    /// Creates an index over an opened tree.
    pub fn new(meta: IndexMeta, tree: BTree) -> Self {
        Self {
            meta,
            tree,
            lock: Mutex::new(()),
        }
    }

    /// Index name.
    pub fn name(&self) -> &str {
        &self.meta.name
    }

    /// Covered column names.
    pub fn columns(&self) -> &[String] {
        &self.meta.columns
    }

    /// Whether the index is unique.
    pub fn is_unique(&self) -> bool {
        self.meta.unique
    }

    /// Returns true when `column` is covered by this index.
    pub fn covers(&self, column: &str) -> bool {
        self.meta.columns.iter().any(|c| c == column)
    }

    /// Persisted metadata.
    pub fn meta(&self) -> &IndexMeta {
        &self.meta
    }

    /// Drops `column` from the covered set. Keys already derived from the
    /// column are not re-derived.
    pub fn remove_column(&mut self, column: &str) {
        self.meta.columns.retain(|c| c != column);
    }

    /// The owned tree.
    pub fn btree(&self) -> &BTree {
        &self.tree
    }

    /// Caller-side mutex for compound read-modify-write sequences on the
    /// tree. Unused by the index's own primitives.
    pub fn lock(&self) -> &Mutex<()> {
        &self.lock
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_put_get_remove() {
        let dir = TempDir::new().unwrap();
        let tree = BTree::open(dir.path().join("t.bt")).unwrap();

        tree.put(b"alice", b"1").unwrap();
        tree.put(b"alice", b"4").unwrap();
        tree.put(b"bob", b"2").unwrap();

        assert_eq!(
            tree.get(b"alice").unwrap(),
            vec![b"1".to_vec(), b"4".to_vec()]
        );
        assert_eq!(tree.get(b"carol"), None);

        tree.remove(b"alice", b"1").unwrap();
        assert_eq!(tree.get(b"alice").unwrap(), vec![b"4".to_vec()]);

        tree.remove(b"alice", b"4").unwrap();
        assert_eq!(tree.get(b"alice"), None);
        assert_eq!(tree.len(), 1);
    }

    #[test]
    fn test_remove_absent_is_noop() {
        let dir = TempDir::new().unwrap();
        let tree = BTree::open(dir.path().join("t.bt")).unwrap();

        tree.put(b"k", b"1").unwrap();
        tree.remove(b"k", b"9").unwrap();
        tree.remove(b"missing", b"1").unwrap();
        assert_eq!(tree.get(b"k").unwrap(), vec![b"1".to_vec()]);
    }

    #[test]
    fn test_reopen() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("t.bt");

        let tree = BTree::open(&path).unwrap();
        tree.put(b"k1", b"10").unwrap();
        tree.put(b"k2", b"20").unwrap();
        tree.close().unwrap();
        drop(tree);

        let tree = BTree::open(&path).unwrap();
        assert_eq!(tree.get(b"k1").unwrap(), vec![b"10".to_vec()]);
        assert_eq!(tree.get(b"k2").unwrap(), vec![b"20".to_vec()]);
    }

    #[test]
    fn test_index_covers() {
        let dir = TempDir::new().unwrap();
        let tree = BTree::open(dir.path().join("t.bt")).unwrap();
        let mut index = Index::new(
            IndexMeta {
                name: "ix".to_string(),
                columns: vec!["a".to_string(), "b".to_string()],
                unique: false,
            },
            tree,
        );

        assert!(index.covers("a"));
        assert!(!index.covers("c"));

        index.remove_column("a");
        assert!(!index.covers("a"));
        assert_eq!(index.columns(), ["b".to_string()]);
    }
}
