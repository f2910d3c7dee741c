//! Desired Entry Cache
//!
//! The cache holds what each map *should* contain. Every entry carries the
//! action still owed to the kernel; a reconciliation pass clears actions as
//! they succeed and leaves failed ones for the next pass.

use std::collections::BTreeMap;
use std::fmt;

/// Action still owed to the kernel for one entry.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum DesiredAction {
    /// Kernel already matches
    #[default]
    Ok,
    /// Entry must be written
    Insert,
    /// Entry must be removed
    Delete,
}

impl DesiredAction {
    /// Whether this action still needs a kernel operation.
    pub const fn is_pending(self) -> bool {
        !matches!(self, Self::Ok)
    }
}

impl fmt::Display for DesiredAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Ok => "sync",
            Self::Insert => "to-be-inserted",
            Self::Delete => "to-be-deleted",
        })
    }
}

/// One cached entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MapEntry {
    pub(crate) value: Option<Vec<u8>>,
    pub(crate) action: DesiredAction,
    /// Set once the key may have reached the kernel.
    pub(crate) may_exist: bool,
}

impl MapEntry {
    /// Desired value, `None` for entries queued for deletion.
    pub fn value(&self) -> Option<&[u8]> {
        self.value.as_deref()
    }

    /// Action still owed to the kernel.
    pub fn action(&self) -> DesiredAction {
        self.action
    }
}

/// Desired contents of one map, keyed by raw key bytes.
#[derive(Debug, Default)]
pub struct EntryCache {
    entries: BTreeMap<Vec<u8>, MapEntry>,
}

impl EntryCache {
    /// Create an empty cache.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record that `key` must hold `value`.
    pub fn insert(&mut self, key: &[u8], value: &[u8]) {
        match self.entries.get_mut(key) {
            Some(entry) => {
                entry.value = Some(value.to_vec());
                entry.action = DesiredAction::Insert;
            }
            None => {
                self.entries.insert(
                    key.to_vec(),
                    MapEntry {
                        value: Some(value.to_vec()),
                        action: DesiredAction::Insert,
                        may_exist: false,
                    },
                );
            }
        }
    }

    /// Record that `key` must be absent.
    ///
    /// Returns `true` if the key was dropped without owing the kernel
    /// anything, which happens when it was inserted and deleted before any
    /// pass attempted to write it.
    pub fn delete(&mut self, key: &[u8]) -> bool {
        match self.entries.get_mut(key) {
            Some(entry) if !entry.may_exist => {
                self.entries.remove(key);
                true
            }
            Some(entry) => {
                entry.value = None;
                entry.action = DesiredAction::Delete;
                false
            }
            None => {
                // Unknown keys may still be in the kernel from an earlier run.
                self.entries.insert(
                    key.to_vec(),
                    MapEntry {
                        value: None,
                        action: DesiredAction::Delete,
                        may_exist: true,
                    },
                );
                false
            }
        }
    }

    /// Look up a cached entry.
    pub fn get(&self, key: &[u8]) -> Option<&MapEntry> {
        self.entries.get(key)
    }

    /// Number of cached entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Check if the cache is empty.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Number of entries with an outstanding action.
    pub fn pending(&self) -> usize {
        self.entries
            .values()
            .filter(|entry| entry.action.is_pending())
            .count()
    }

    /// Iterate over cached entries in key order.
    pub fn iter(&self) -> impl Iterator<Item = (&[u8], &MapEntry)> {
        self.entries.iter().map(|(k, v)| (k.as_slice(), v))
    }

    /// Drop every entry.
    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub(crate) fn retain(&mut self, f: impl FnMut(&Vec<u8>, &mut MapEntry) -> bool) {
        self.entries.retain(f);
    }
}
