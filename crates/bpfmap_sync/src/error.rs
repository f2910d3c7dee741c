//! Registry errors.

use bpfmap_caps::DefError;

use crate::config::ConfigError;
use crate::entry::DesiredAction;
use crate::kernel::MapOpError;

/// Registry operation errors.
#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    /// No map registered under this name
    #[error("unknown map {0}")]
    UnknownMap(String),
    /// Definition rejected before opening
    #[error("invalid map definition: {0}")]
    InvalidDef(#[from] DefError),
    /// Provider could not open the map
    #[error("failed to open map {name}: {source}")]
    Open {
        name: String,
        #[source]
        source: MapOpError,
    },
    /// Key size does not match the map
    #[error("map {map}: key must be {expected} bytes, got {actual}")]
    KeySize {
        map: String,
        expected: u32,
        actual: usize,
    },
    /// Value size does not match the map
    #[error("map {map}: value must be {expected} bytes, got {actual}")]
    ValueSize {
        map: String,
        expected: u32,
        actual: usize,
    },
    /// Insert without a value
    #[error("map {0}: insert requires a value")]
    MissingValue(String),
    /// Only insert and delete can be requested
    #[error("cannot request action {0}")]
    UnsupportedAction(DesiredAction),
    /// Map exceeded its error ceiling
    #[error("map {name} failed after {errors} errors")]
    MapFailed { name: String, errors: u32 },
    /// Invalid engine configuration
    #[error("invalid sync configuration: {0}")]
    Config(#[from] ConfigError),
}

/// Result type for registry operations.
pub type RegistryResult<T> = Result<T, RegistryError>;
