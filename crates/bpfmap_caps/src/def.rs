//! Map Definitions
//!
//! Creation parameters for a kernel map. The preallocation flag is derived
//! from the kind, never set by hand.

use crate::features::FeatureSupportTable;
use crate::kind::MapKind;

/// `BPF_F_NO_PREALLOC`: entries are allocated on demand.
pub const NO_PREALLOC: u32 = 1;

/// Creation flags for a kind.
///
/// Kinds that cannot be preallocated always get [`NO_PREALLOC`]. Kinds that
/// merely don't need it follow the `preallocate` option.
pub fn prealloc_flags(kind: MapKind, preallocate: bool) -> u32 {
    if !kind.allows_preallocation() || (!kind.requires_preallocation() && !preallocate) {
        NO_PREALLOC
    } else {
        0
    }
}

/// Invalid map definition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum DefError {
    /// Key size is zero
    #[error("key size must be non-zero")]
    ZeroKeySize,
    /// Value size is zero
    #[error("value size must be non-zero")]
    ZeroValueSize,
    /// Max entries is zero
    #[error("max entries must be non-zero")]
    ZeroEntries,
    /// Indexed kinds take `u32` keys
    #[error("{kind} maps take 4-byte index keys, not {key_size}")]
    IndexKeySize { kind: MapKind, key_size: u32 },
    /// Preallocation requested for a kind that forbids it
    #[error("{0} maps cannot be preallocated")]
    PreallocForbidden(MapKind),
}

/// Map definition structure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MapDef {
    /// Map kind
    pub kind: MapKind,
    /// Key size in bytes
    pub key_size: u32,
    /// Value size in bytes
    pub value_size: u32,
    /// Maximum number of entries
    pub max_entries: u32,
    /// Creation flags
    pub flags: u32,
}

impl MapDef {
    /// Create a definition with preallocation where the kind permits it.
    pub fn new(kind: MapKind, key_size: u32, value_size: u32, max_entries: u32) -> Self {
        Self {
            kind,
            key_size,
            value_size,
            max_entries,
            flags: prealloc_flags(kind, true),
        }
    }

    /// Recompute the preallocation flag.
    pub fn with_preallocation(mut self, preallocate: bool) -> Self {
        self.flags = (self.flags & !NO_PREALLOC) | prealloc_flags(self.kind, preallocate);
        self
    }

    /// Whether entries are allocated on demand.
    pub const fn is_dynamic(&self) -> bool {
        self.flags & NO_PREALLOC != 0
    }

    /// Total memory required for this map when preallocated.
    pub const fn total_size(&self) -> usize {
        (self.key_size as usize + self.value_size as usize) * self.max_entries as usize
    }

    /// Resolve the kind against probed kernel support and recompute the
    /// creation flags for the resolved kind.
    pub fn resolve(&self, table: &FeatureSupportTable, preallocate: bool) -> Self {
        Self {
            kind: self.kind.resolve(table),
            ..*self
        }
        .with_preallocation(preallocate)
    }

    /// Check sizes and flags.
    pub fn validate(&self) -> Result<(), DefError> {
        if self.key_size == 0 {
            return Err(DefError::ZeroKeySize);
        }
        if self.value_size == 0 {
            return Err(DefError::ZeroValueSize);
        }
        if self.max_entries == 0 {
            return Err(DefError::ZeroEntries);
        }
        if self.kind.is_indexed() && self.key_size != 4 {
            return Err(DefError::IndexKeySize {
                kind: self.kind,
                key_size: self.key_size,
            });
        }
        if !self.kind.allows_preallocation() && !self.is_dynamic() {
            return Err(DefError::PreallocForbidden(self.kind));
        }
        Ok(())
    }
}
