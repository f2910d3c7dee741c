//! Kernel Map Boundary
//!
//! The engine talks to kernel maps only through these traits. A real
//! deployment backs them with `bpf(2)` calls on pinned maps; the in-memory
//! [`MemoryProvider`] backs dry runs, tests and benchmarks.
//!
//! The engine does not look inside [`MapOpError`]: every error is a transient
//! failure that the reconciliation pass retries.

mod memory;

use std::io;
use std::sync::Arc;

use bpfmap_caps::{DefError, MapDef};

pub use memory::{MemoryMap, MemoryProvider};

/// Kernel map operation errors.
#[derive(Debug, thiserror::Error)]
pub enum MapOpError {
    /// Key has the wrong size
    #[error("key must be {expected} bytes, got {actual}")]
    InvalidKey { expected: u32, actual: usize },
    /// Value has the wrong size
    #[error("value must be {expected} bytes, got {actual}")]
    InvalidValue { expected: u32, actual: usize },
    /// Array index beyond `max_entries`
    #[error("index {index} out of range for {max_entries} entries")]
    IndexOutOfRange { index: u32, max_entries: u32 },
    /// Map is full
    #[error("map is full")]
    MapFull,
    /// Map could not be created from its definition
    #[error("invalid map definition: {0}")]
    InvalidDef(#[from] DefError),
    /// System call failed
    #[error(transparent)]
    Os(#[from] io::Error),
}

/// Result type for kernel map operations.
pub type MapOpResult<T> = Result<T, MapOpError>;

/// Operations on one open kernel map.
///
/// Calls may block; the engine only issues them from the blocking pool.
pub trait KernelMap: Send + Sync {
    /// Look up a value by key.
    fn lookup(&self, key: &[u8]) -> Option<Vec<u8>>;

    /// Create or update an entry.
    fn update(&self, key: &[u8], value: &[u8]) -> MapOpResult<()>;

    /// Ensure an entry is absent.
    ///
    /// Deleting a key that does not exist succeeds.
    fn delete(&self, key: &[u8]) -> MapOpResult<()>;
}

/// Source of kernel map handles.
pub trait MapProvider: Send + Sync {
    /// Open the named map, creating it from `def` if it does not exist.
    fn open(&self, name: &str, def: &MapDef) -> MapOpResult<Arc<dyn KernelMap>>;
}
