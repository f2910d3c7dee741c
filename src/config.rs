//! Agent configuration file.
//!
//! ```toml
//! features = "bpf_features.h"
//!
//! [sync]
//! settle_delay = "200ms"
//! min_interval = "5s"
//!
//! [[map]]
//! name = "lb4_backends"
//! kind = "lru-hash"
//! key_size = 4
//! value_size = 8
//! max_entries = 65536
//!
//! [[map.entry]]
//! key = "01000000"
//! value = "0a000001bb010000"
//! ```

use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use bpfmap_caps::{MapDef, MapKind};
use bpfmap_sync::{DesiredAction, SyncConfig};
use serde::Deserialize;

/// Top-level configuration.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AgentConfig {
    /// Feature probe output; relative paths are taken from the config file's
    /// directory
    pub features: PathBuf,
    #[serde(default)]
    pub sync: SyncConfig,
    #[serde(default, rename = "map")]
    pub maps: Vec<MapConfig>,
}

/// One map to register.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MapConfig {
    pub name: String,
    /// Kind identifier, e.g. `lpm-trie`
    pub kind: String,
    pub key_size: u32,
    pub value_size: u32,
    pub max_entries: u32,
    #[serde(default, rename = "entry")]
    pub entries: Vec<EntryConfig>,
}

/// One desired entry, hex encoded.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct EntryConfig {
    pub key: String,
    #[serde(default)]
    pub value: Option<String>,
    /// Ensure the key is absent instead
    #[serde(default)]
    pub delete: bool,
}

/// Decoded desired change.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DesiredEntry {
    pub key: Vec<u8>,
    pub action: DesiredAction,
    pub value: Option<Vec<u8>>,
}

impl AgentConfig {
    /// Load and validate a configuration file.
    pub fn load(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config {}", path.display()))?;
        let mut config = Self::parse(&text)
            .with_context(|| format!("Invalid config {}", path.display()))?;

        if config.features.is_relative() {
            if let Some(dir) = path.parent() {
                config.features = dir.join(&config.features);
            }
        }

        Ok(config)
    }

    /// Parse and validate configuration text.
    pub fn parse(text: &str) -> Result<Self> {
        let config: Self = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        self.sync.validate()?;

        let mut names = HashSet::new();
        for map in &self.maps {
            if !names.insert(map.name.as_str()) {
                bail!("map {} is defined twice", map.name);
            }
            map.def()?;
            for (idx, entry) in map.entries.iter().enumerate() {
                entry
                    .decode()
                    .with_context(|| format!("map {} entry {}", map.name, idx))?;
            }
        }

        Ok(())
    }
}

impl MapConfig {
    /// Requested definition, before fallback.
    pub fn def(&self) -> Result<MapDef> {
        let kind: MapKind = self
            .kind
            .parse()
            .with_context(|| format!("map {}", self.name))?;
        Ok(MapDef::new(
            kind,
            self.key_size,
            self.value_size,
            self.max_entries,
        ))
    }
}

impl EntryConfig {
    pub fn decode(&self) -> Result<DesiredEntry> {
        let key = hex::decode(&self.key).context("key is not valid hex")?;

        match (&self.value, self.delete) {
            (Some(_), true) => bail!("an entry cannot have a value and be deleted"),
            (None, false) => bail!("an entry needs a value or `delete = true`"),
            (None, true) => Ok(DesiredEntry {
                key,
                action: DesiredAction::Delete,
                value: None,
            }),
            (Some(value), false) => Ok(DesiredEntry {
                key,
                action: DesiredAction::Insert,
                value: Some(hex::decode(value).context("value is not valid hex")?),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    const SAMPLE: &str = r#"
features = "bpf_features.h"

[sync]
settle_delay = "10ms"

[[map]]
name = "prefixes"
kind = "lpm-trie"
key_size = 8
value_size = 4
max_entries = 1024

[[map.entry]]
key = "1800000a00000000"
value = "01000000"

[[map.entry]]
key = "2000000a00000001"
delete = true

[[map]]
name = "counters"
kind = "array"
key_size = 4
value_size = 8
max_entries = 16
"#;

    #[test]
    fn parse_sample() {
        let config = AgentConfig::parse(SAMPLE).expect("parse");
        assert_eq!(config.sync.settle_delay, Duration::from_millis(10));
        assert_eq!(config.sync.min_interval, Duration::from_secs(5));
        assert_eq!(config.maps.len(), 2);

        let prefixes = &config.maps[0];
        assert_eq!(prefixes.def().expect("def").kind, MapKind::LpmTrie);
        assert_eq!(prefixes.entries.len(), 2);

        let insert = prefixes.entries[0].decode().expect("decode");
        assert_eq!(insert.action, DesiredAction::Insert);
        assert_eq!(insert.key, vec![0x18, 0, 0, 0x0a, 0, 0, 0, 0]);
        assert_eq!(insert.value, Some(vec![1, 0, 0, 0]));

        let delete = prefixes.entries[1].decode().expect("decode");
        assert_eq!(delete.action, DesiredAction::Delete);
        assert_eq!(delete.value, None);

        assert!(config.maps[1].entries.is_empty());
    }

    #[test]
    fn load_resolves_relative_features_path() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("agent.toml");
        fs::write(&path, SAMPLE).expect("write");

        let config = AgentConfig::load(&path).expect("load");
        assert_eq!(config.features, dir.path().join("bpf_features.h"));
    }

    #[test]
    fn load_missing_file() {
        let dir = tempfile::tempdir().expect("tempdir");
        let err = AgentConfig::load(&dir.path().join("absent.toml")).expect_err("missing");
        assert!(err.to_string().contains("Failed to read config"));
    }

    #[test]
    fn rejects_unknown_kind() {
        let text = r#"
features = "f.h"
[[map]]
name = "m"
kind = "ringbuf"
key_size = 4
value_size = 4
max_entries = 4
"#;
        let err = AgentConfig::parse(text).expect_err("unknown kind");
        assert!(format!("{err:#}").contains("unknown map kind `ringbuf`"));
    }

    #[test]
    fn rejects_duplicate_names() {
        let text = r#"
features = "f.h"
[[map]]
name = "m"
kind = "hash"
key_size = 4
value_size = 4
max_entries = 4
[[map]]
name = "m"
kind = "array"
key_size = 4
value_size = 4
max_entries = 4
"#;
        let err = AgentConfig::parse(text).expect_err("duplicate");
        assert!(err.to_string().contains("defined twice"));
    }

    #[test]
    fn rejects_bad_entries() {
        let bad_hex = EntryConfig {
            key: "zz".to_string(),
            value: Some("00".to_string()),
            delete: false,
        };
        assert!(bad_hex.decode().is_err());

        let both = EntryConfig {
            key: "00".to_string(),
            value: Some("00".to_string()),
            delete: true,
        };
        assert!(both.decode().is_err());

        let neither = EntryConfig {
            key: "00".to_string(),
            value: None,
            delete: false,
        };
        assert!(neither.decode().is_err());
    }

    #[test]
    fn rejects_invalid_sync_settings() {
        let text = r#"
features = "f.h"
[sync]
max_sync_errors = 0
"#;
        assert!(AgentConfig::parse(text).is_err());
    }
}
