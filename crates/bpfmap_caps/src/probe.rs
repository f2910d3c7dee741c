//! Feature Probe Loader
//!
//! Reads the header emitted by the kernel capability probe step. Each
//! supported advanced map kind shows up as a line of the form
//!
//! ```text
//! #define HAVE_LPM_MAP_TYPE
//! ```
//!
//! Probed kinds that never appear are recorded as unsupported once the whole
//! input has been scanned, so an empty or truncated probe fails closed.

use std::fs::File;
use std::io::{self, BufRead, BufReader};
use std::path::{Path, PathBuf};

use log::debug;

use crate::features::{FeatureSupport, FeatureSupportTable};
use crate::kind::MapKind;

const LINE_PREFIX: &str = "#define HAVE_";
const LINE_SUFFIX: &str = "_MAP_TYPE";

/// Errors reading the probe output.
#[derive(Debug, thiserror::Error)]
pub enum ProbeError {
    /// The probe file could not be opened or read
    #[error("failed to read feature probes from {}: {source}", path.display())]
    Path {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    /// The probe stream failed mid-read
    #[error("failed to read feature probes: {0}")]
    Read(#[from] io::Error),
}

/// Result type for probe loading.
pub type ProbeResult<T> = Result<T, ProbeError>;

/// Token of a `#define HAVE_<TOKEN>_MAP_TYPE` line.
fn feature_token(line: &str) -> Option<&str> {
    line.trim_end()
        .strip_prefix(LINE_PREFIX)?
        .strip_suffix(LINE_SUFFIX)
}

/// Build the support table from probe output.
pub fn load_features<R: BufRead>(source: R) -> ProbeResult<FeatureSupportTable> {
    let mut table = FeatureSupportTable::new();

    for line in source.lines() {
        let line = line?;
        let Some(kind) = feature_token(&line).and_then(MapKind::from_feature_flag) else {
            continue;
        };
        debug!("Detected support for map type {kind}");
        table.set(kind, true);
    }

    for kind in MapKind::ALL {
        if kind.feature_flag().is_none() {
            debug!("Skipping support detection for map type {kind}");
        } else if table.get(kind) == FeatureSupport::NotProbed {
            debug!("Detected no support for map type {kind}");
            table.set(kind, false);
        }
    }

    Ok(table)
}

/// Build the support table from a probe header on disk.
pub fn load_features_from_path(path: impl AsRef<Path>) -> ProbeResult<FeatureSupportTable> {
    let path = path.as_ref();
    let file = File::open(path).map_err(|source| ProbeError::Path {
        path: path.to_path_buf(),
        source,
    })?;

    load_features(BufReader::new(file)).map_err(|err| match err {
        ProbeError::Read(source) => ProbeError::Path {
            path: path.to_path_buf(),
            source,
        },
        other => other,
    })
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use super::*;

    #[test]
    fn token_extraction() {
        assert_eq!(feature_token("#define HAVE_LPM_MAP_TYPE"), Some("LPM"));
        assert_eq!(feature_token("#define HAVE_LRU_MAP_TYPE\r"), Some("LRU"));
        assert_eq!(feature_token("#define HAVE_LPM_MAP_TYPE 1"), None);
        assert_eq!(feature_token("// #define HAVE_LPM_MAP_TYPE"), None);
        assert_eq!(feature_token("#define HAVE_PROG_TYPE_HELPER"), None);
    }

    #[test]
    fn lpm_only() {
        let table = load_features(Cursor::new("#define HAVE_LPM_MAP_TYPE\n")).expect("load");
        assert_eq!(table.get(MapKind::LpmTrie), FeatureSupport::Supported);
        assert_eq!(table.get(MapKind::LruHash), FeatureSupport::Unsupported);
    }

    #[test]
    fn empty_input_fails_closed() {
        let table = load_features(Cursor::new("")).expect("load");
        assert_eq!(table.get(MapKind::LpmTrie), FeatureSupport::Unsupported);
        assert_eq!(table.get(MapKind::LruHash), FeatureSupport::Unsupported);
        assert_eq!(table.get(MapKind::Hash), FeatureSupport::NotProbed);
    }

    #[test]
    fn unrelated_lines_are_ignored() {
        let input = "\
/* generated */
#define HAVE_LRU_MAP_TYPE
#define HAVE_PROG_TYPE_HELPER(prog_type, helper) 1
#define HAVE_LARGE_INSN_LIMIT
#define HAVE_LPM_MAP_TYPE
";
        let table = load_features(Cursor::new(input)).expect("load");
        assert!(table.is_supported(MapKind::LruHash));
        assert!(table.is_supported(MapKind::LpmTrie));
        assert_eq!(table.probed().count(), 2);
    }

    #[test]
    fn reload_is_idempotent() {
        let input = "#define HAVE_LRU_MAP_TYPE\n";
        let first = load_features(Cursor::new(input)).expect("load");
        let second = load_features(Cursor::new(input)).expect("reload");
        assert_eq!(first, second);
    }

    #[test]
    fn missing_file_reports_path() {
        let err = load_features_from_path("/nonexistent/bpf_features.h").unwrap_err();
        assert!(matches!(err, ProbeError::Path { .. }));
        assert!(err.to_string().contains("/nonexistent/bpf_features.h"));
    }

    #[test]
    fn invalid_utf8_is_a_read_error() {
        let bytes: &[u8] = &[0xff, 0xfe, b'\n'];
        let err = load_features(Cursor::new(bytes)).unwrap_err();
        assert!(matches!(err, ProbeError::Read(_)));
    }
}
