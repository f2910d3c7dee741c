//! Kernel Map Reconciliation
//!
//! Keeps the contents of kernel maps in line with an in-memory desired state
//! under partial failure. Producers record what each map should contain; a
//! per-map controller applies the difference in passes, retrying failed
//! operations no more often than a minimum interval and giving up on a map
//! once its consecutive error count exceeds a ceiling.
//!
//! # Timing
//!
//! | Setting           | Default | Effect                                      |
//! |-------------------|---------|---------------------------------------------|
//! | `settle_delay`    | 200 ms  | first change to pass; bursts share a pass   |
//! | `min_interval`    | 5 s     | floor between the starts of two passes      |
//! | `max_sync_errors` | 512     | a map fails once its counter exceeds this   |
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use bpfmap_caps::{load_features_from_path, MapDef, MapKind};
//! use bpfmap_sync::{MapRegistry, MemoryProvider, SyncConfig};
//!
//! # async fn demo() -> Result<(), Box<dyn std::error::Error>> {
//! let features = Arc::new(load_features_from_path("/run/bpfmap/bpf_features.h")?);
//! let registry = MapRegistry::new(features, Arc::new(MemoryProvider::new()), SyncConfig::default())?;
//!
//! registry
//!     .register("ct4", MapDef::new(MapKind::LruHash, 16, 8, 65536))
//!     .await?;
//! registry.insert("ct4", &[0; 16], &[1; 8])?;
//!
//! let snapshot = registry.wait_quiescent("ct4").await?;
//! println!("ct4: {snapshot}");
//! # Ok(())
//! # }
//! ```

pub mod config;
mod controller;
pub mod entry;
pub mod error;
pub mod kernel;
pub mod pass;
pub mod registry;
pub mod state;

pub use config::{
    ConfigError, ERROR_RESOLVER_DELAY, ERROR_RESOLVER_MIN_INTERVAL, MAX_SYNC_ERRORS, SyncConfig,
};
pub use entry::{DesiredAction, EntryCache, MapEntry};
pub use error::{RegistryError, RegistryResult};
pub use kernel::{KernelMap, MapOpError, MapOpResult, MapProvider, MemoryMap, MemoryProvider};
pub use pass::{PassReport, run_pass};
pub use registry::MapRegistry;
pub use state::{MapSnapshot, MapState, PassOutcome, SyncPhase, SyncStatus};
