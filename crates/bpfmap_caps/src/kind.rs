//! Map Kinds
//!
//! The closed set of kernel map kinds and the fixed facts attached to each.
//! Every per-kind fact lives in one constant table indexed by the kind's
//! discriminant, so adding a kind means adding exactly one row.
//!
//! # Preallocation
//!
//! | Kind          | Allows | Requires |
//! |---------------|--------|----------|
//! | Hash          | yes    | no       |
//! | PerCpuHash    | yes    | no       |
//! | HashOfMaps    | yes    | no       |
//! | LpmTrie       | **no** | no       |
//! | everything else | yes  | yes      |

use core::fmt;
use core::str::FromStr;

use crate::features::{FeatureSupport, FeatureSupportTable};

/// Kernel map kinds.
///
/// Discriminants match `enum bpf_map_type` in `<linux/bpf.h>`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(u32)]
pub enum MapKind {
    /// Unspecified
    Unspec = 0,
    /// Hash table
    Hash = 1,
    /// Array
    Array = 2,
    /// Program array
    ProgArray = 3,
    /// Perf event array
    PerfEventArray = 4,
    /// Per-CPU hash
    PerCpuHash = 5,
    /// Per-CPU array
    PerCpuArray = 6,
    /// Stack trace
    StackTrace = 7,
    /// Cgroup array
    CgroupArray = 8,
    /// LRU hash
    LruHash = 9,
    /// LRU per-CPU hash
    LruPerCpuHash = 10,
    /// Longest prefix match trie
    LpmTrie = 11,
    /// Array of maps
    ArrayOfMaps = 12,
    /// Hash of maps
    HashOfMaps = 13,
    /// Device map
    DeviceMap = 14,
    /// Socket map
    SocketMap = 15,
    /// CPU redirect map
    CpuRedirectMap = 16,
    /// AF_XDP socket map
    XskMap = 17,
    /// Socket hash
    SocketHash = 18,
}

/// Fixed facts about one map kind.
struct KindInfo {
    kind: MapKind,
    /// Human-readable label
    name: &'static str,
    /// Identifier used in configuration files
    ident: &'static str,
    allows_prealloc: bool,
    requires_prealloc: bool,
    /// Keys are `u32` indices below `max_entries`
    indexed: bool,
    /// Token in `#define HAVE_<TOKEN>_MAP_TYPE`
    feature: Option<&'static str>,
    /// Portable kind used when the kernel lacks support
    fallback: Option<MapKind>,
}

const fn info(kind: MapKind, name: &'static str, ident: &'static str) -> KindInfo {
    KindInfo {
        kind,
        name,
        ident,
        allows_prealloc: true,
        requires_prealloc: true,
        indexed: false,
        feature: None,
        fallback: None,
    }
}

const fn indexed(mut row: KindInfo) -> KindInfo {
    row.indexed = true;
    row
}

const fn dynamic(mut row: KindInfo) -> KindInfo {
    row.requires_prealloc = false;
    row
}

const fn probed(mut row: KindInfo, token: &'static str) -> KindInfo {
    row.feature = Some(token);
    row.fallback = Some(MapKind::Hash);
    row
}

static KINDS: [KindInfo; MapKind::COUNT] = [
    info(MapKind::Unspec, "Unspecified", "unspec"),
    dynamic(info(MapKind::Hash, "Hash", "hash")),
    indexed(info(MapKind::Array, "Array", "array")),
    indexed(info(MapKind::ProgArray, "Program array", "prog-array")),
    indexed(info(MapKind::PerfEventArray, "Event array", "perf-event-array")),
    dynamic(info(MapKind::PerCpuHash, "Per-CPU hash", "percpu-hash")),
    indexed(info(MapKind::PerCpuArray, "Per-CPU array", "percpu-array")),
    info(MapKind::StackTrace, "Stack trace", "stack-trace"),
    indexed(info(MapKind::CgroupArray, "Cgroup array", "cgroup-array")),
    probed(info(MapKind::LruHash, "LRU hash", "lru-hash"), "LRU"),
    info(MapKind::LruPerCpuHash, "LRU per-CPU hash", "lru-percpu-hash"),
    KindInfo {
        allows_prealloc: false,
        requires_prealloc: false,
        ..probed(
            info(MapKind::LpmTrie, "Longest prefix match trie", "lpm-trie"),
            "LPM",
        )
    },
    indexed(info(MapKind::ArrayOfMaps, "Array of maps", "array-of-maps")),
    dynamic(info(MapKind::HashOfMaps, "Hash of maps", "hash-of-maps")),
    indexed(info(MapKind::DeviceMap, "Device Map", "devmap")),
    indexed(info(MapKind::SocketMap, "Socket Map", "sockmap")),
    indexed(info(MapKind::CpuRedirectMap, "CPU Redirect Map", "cpumap")),
    indexed(info(MapKind::XskMap, "XSK Map", "xskmap")),
    info(MapKind::SocketHash, "Socket Hash", "sockhash"),
];

/// Label returned for raw values outside the enumeration.
pub const UNKNOWN_KIND_NAME: &str = "Unknown";

impl MapKind {
    /// Number of known kinds.
    pub const COUNT: usize = 19;

    /// All kinds in discriminant order.
    pub const ALL: [MapKind; Self::COUNT] = [
        MapKind::Unspec,
        MapKind::Hash,
        MapKind::Array,
        MapKind::ProgArray,
        MapKind::PerfEventArray,
        MapKind::PerCpuHash,
        MapKind::PerCpuArray,
        MapKind::StackTrace,
        MapKind::CgroupArray,
        MapKind::LruHash,
        MapKind::LruPerCpuHash,
        MapKind::LpmTrie,
        MapKind::ArrayOfMaps,
        MapKind::HashOfMaps,
        MapKind::DeviceMap,
        MapKind::SocketMap,
        MapKind::CpuRedirectMap,
        MapKind::XskMap,
        MapKind::SocketHash,
    ];

    fn info(self) -> &'static KindInfo {
        &KINDS[self.index()]
    }

    /// Position of this kind in per-kind tables.
    pub const fn index(self) -> usize {
        self as usize
    }

    /// Raw kernel discriminant.
    pub const fn raw(self) -> u32 {
        self as u32
    }

    /// Convert a raw kernel discriminant.
    pub fn from_raw(raw: u32) -> Option<Self> {
        Self::ALL.get(raw as usize).copied()
    }

    /// Human-readable label.
    pub fn name(self) -> &'static str {
        self.info().name
    }

    /// Configuration identifier, e.g. `lpm-trie`.
    pub fn ident(self) -> &'static str {
        self.info().ident
    }

    /// Whether storage for all entries may be reserved at creation.
    pub fn allows_preallocation(self) -> bool {
        self.info().allows_prealloc
    }

    /// Whether storage for all entries must be reserved at creation.
    pub fn requires_preallocation(self) -> bool {
        self.info().requires_prealloc
    }

    /// Whether keys are `u32` indices.
    pub fn is_indexed(self) -> bool {
        self.info().indexed
    }

    /// Feature-probe token, if support for this kind is probed.
    pub fn feature_flag(self) -> Option<&'static str> {
        self.info().feature
    }

    /// Kind probed by the given token.
    pub fn from_feature_flag(token: &str) -> Option<Self> {
        KINDS
            .iter()
            .find(|row| row.feature == Some(token))
            .map(|row| row.kind)
    }

    /// Resolve to a kind the running kernel supports.
    ///
    /// Probed kinds that are not affirmatively supported fall back to
    /// [`MapKind::Hash`]; a missing probe result counts as unsupported.
    pub fn resolve(self, table: &FeatureSupportTable) -> Self {
        match self.info().fallback {
            Some(fallback) if table.get(self) != FeatureSupport::Supported => fallback,
            _ => self,
        }
    }
}

/// Label for a raw kernel discriminant, `"Unknown"` when out of range.
pub fn name_of_raw(raw: u32) -> &'static str {
    MapKind::from_raw(raw).map_or(UNKNOWN_KIND_NAME, MapKind::name)
}

impl fmt::Display for MapKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Error parsing a configuration identifier.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown map kind `{0}`")]
pub struct ParseKindError(pub String);

impl FromStr for MapKind {
    type Err = ParseKindError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim();
        KINDS
            .iter()
            .find(|row| row.ident.eq_ignore_ascii_case(wanted))
            .map(|row| row.kind)
            .ok_or_else(|| ParseKindError(s.to_string()))
    }
}

impl TryFrom<u32> for MapKind {
    type Error = u32;

    fn try_from(raw: u32) -> Result<Self, Self::Error> {
        Self::from_raw(raw).ok_or(raw)
    }
}
