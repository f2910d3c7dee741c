//! Kernel Map Capabilities
//!
//! This crate describes what kind of kernel map a dataplane can ask for and
//! what it will actually get on the running kernel. Advanced kinds are only
//! used when the startup probe affirmatively detected them; otherwise they
//! degrade to a plain hash map.
//!
//! # Fallbacks
//!
//! | Requested | Probe token | Without support |
//! |-----------|-------------|-----------------|
//! | LPM trie  | `LPM`       | Hash            |
//! | LRU hash  | `LRU`       | Hash            |
//!
//! # Initialization
//!
//! The probe runs once, before any map is opened:
//!
//! ```no_run
//! use bpfmap_caps::{load_features_from_path, MapDef, MapKind};
//!
//! let table = load_features_from_path("/run/bpfmap/bpf_features.h")?;
//! let def = MapDef::new(MapKind::LpmTrie, 8, 4, 1024).resolve(&table, true);
//! println!("creating {}", def.kind);
//! # Ok::<(), bpfmap_caps::ProbeError>(())
//! ```
//!
//! # Modules
//!
//! - [`kind`] - map kinds and their fixed facts
//! - [`features`] - probed kernel support
//! - [`probe`] - probe output parsing
//! - [`def`] - map creation parameters

pub mod def;
pub mod features;
pub mod kind;
pub mod probe;

pub use def::{DefError, MapDef, NO_PREALLOC, prealloc_flags};
pub use features::{FeatureSupport, FeatureSupportTable};
pub use kind::{MapKind, ParseKindError, UNKNOWN_KIND_NAME, name_of_raw};
pub use probe::{ProbeError, ProbeResult, load_features, load_features_from_path};
