//! Kernel Feature Support
//!
//! Per-kind record of what the running kernel was found to support.
//! The table is filled once by the prober and only read afterwards, so it
//! is shared as a plain immutable value.

use core::fmt;

use crate::kind::MapKind;

/// Probe result for one map kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum FeatureSupport {
    /// No probe result was recorded
    #[default]
    NotProbed,
    /// The kernel supports the kind
    Supported,
    /// The kernel was probed and lacks the kind
    Unsupported,
}

impl fmt::Display for FeatureSupport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotProbed => write!(f, "not probed"),
            Self::Supported => write!(f, "supported"),
            Self::Unsupported => write!(f, "unsupported"),
        }
    }
}

/// Feature support for every map kind.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeatureSupportTable {
    support: [FeatureSupport; MapKind::COUNT],
}

impl FeatureSupportTable {
    /// Create a table with nothing probed.
    pub fn new() -> Self {
        Self {
            support: [FeatureSupport::NotProbed; MapKind::COUNT],
        }
    }

    /// Record a probe result.
    pub fn set(&mut self, kind: MapKind, supported: bool) {
        self.support[kind.index()] = if supported {
            FeatureSupport::Supported
        } else {
            FeatureSupport::Unsupported
        };
    }

    /// Builder form of [`set`](Self::set).
    pub fn with(mut self, kind: MapKind, supported: bool) -> Self {
        self.set(kind, supported);
        self
    }

    /// Probe result for a kind.
    pub fn get(&self, kind: MapKind) -> FeatureSupport {
        self.support[kind.index()]
    }

    /// Whether the kind was affirmatively detected.
    pub fn is_supported(&self, kind: MapKind) -> bool {
        self.get(kind) == FeatureSupport::Supported
    }

    /// Kinds with a recorded probe result.
    pub fn probed(&self) -> impl Iterator<Item = (MapKind, FeatureSupport)> + '_ {
        MapKind::ALL
            .into_iter()
            .map(|kind| (kind, self.get(kind)))
            .filter(|(_, support)| *support != FeatureSupport::NotProbed)
    }
}

impl Default for FeatureSupportTable {
    fn default() -> Self {
        Self::new()
    }
}
