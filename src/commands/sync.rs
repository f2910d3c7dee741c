//! Dry-run reconciliation command.
//!
//! Registers every configured map against in-memory kernel maps, applies the
//! configured entries, and waits for each map to settle.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use bpfmap_caps::load_features_from_path;
use bpfmap_sync::{MapRegistry, MapSnapshot, MemoryProvider, SyncStatus};
use colored::Colorize;
use log::info;

use crate::config::AgentConfig;

/// Run the configured reconciliation and report per-map status.
pub async fn run_sync(config_path: &Path, timeout: Duration) -> Result<()> {
    let config = AgentConfig::load(config_path)?;
    let provider = Arc::new(MemoryProvider::new());

    let snapshots = reconcile(&config, Arc::clone(&provider), timeout).await?;

    println!("{}\n", "Map status".cyan().bold());
    for snapshot in &snapshots {
        let entries = provider.get(&snapshot.name).map_or(0, |map| map.len());
        println!("  {}", describe(snapshot, entries));
    }

    let failed = snapshots.iter().filter(|snapshot| snapshot.failed).count();
    if failed > 0 {
        bail!("{failed} of {} maps failed", snapshots.len());
    }

    Ok(())
}

/// Register, populate and settle every map in `config`.
pub async fn reconcile(
    config: &AgentConfig,
    provider: Arc<MemoryProvider>,
    timeout: Duration,
) -> Result<Vec<MapSnapshot>> {
    let features = load_features_from_path(&config.features).context("Feature probe failed")?;
    let registry = MapRegistry::new(Arc::new(features), provider, config.sync.clone())?;

    for map in &config.maps {
        registry
            .register(&map.name, map.def()?)
            .await
            .with_context(|| format!("Failed to register map {}", map.name))?;

        for entry in &map.entries {
            let entry = entry.decode()?;
            registry
                .set_desired(&map.name, &entry.key, entry.action, entry.value.as_deref())
                .with_context(|| format!("Rejected entry for map {}", map.name))?;
        }
        info!("{}: {} entries queued", map.name, map.entries.len());
    }

    for map in &config.maps {
        tokio::time::timeout(timeout, registry.wait_quiescent(&map.name))
            .await
            .with_context(|| format!("Timed out waiting for map {}", map.name))??;
    }

    let snapshots = registry.snapshots();
    registry.shutdown().await;
    Ok(snapshots)
}

fn describe(snapshot: &MapSnapshot, entries: usize) -> String {
    let kind = if snapshot.requested == snapshot.kind {
        snapshot.kind.to_string()
    } else {
        format!("{} -> {}", snapshot.requested, snapshot.kind)
    };
    let status = match snapshot.status() {
        SyncStatus::Ok => snapshot.status().to_string().green(),
        SyncStatus::Errors(_) => snapshot.status().to_string().yellow(),
        SyncStatus::Failed => snapshot.status().to_string().red().bold(),
    };

    format!(
        "{:<20} {:<36} {status} ({entries} entries, {} passes)",
        snapshot.name, kind, snapshot.passes
    )
}

#[cfg(test)]
mod tests {
    use std::fs;
    use std::path::PathBuf;

    use bpfmap_caps::MapKind;
    use tempfile::TempDir;

    use super::*;

    const TIMEOUT: Duration = Duration::from_secs(10);

    fn write_config(features: &str, body: &str) -> (TempDir, PathBuf) {
        let dir = tempfile::tempdir().expect("tempdir");
        fs::write(dir.path().join("bpf_features.h"), features).expect("write features");
        let path = dir.path().join("agent.toml");
        fs::write(
            &path,
            format!(
                "features = \"bpf_features.h\"\n\n[sync]\nsettle_delay = \"1ms\"\nmin_interval = \"5ms\"\nmax_sync_errors = 3\n\n{body}"
            ),
        )
        .expect("write config");
        (dir, path)
    }

    const MAPS: &str = r#"
[[map]]
name = "prefixes"
kind = "lpm-trie"
key_size = 8
value_size = 4
max_entries = 64

[[map.entry]]
key = "1800000a00000000"
value = "01000000"

[[map.entry]]
key = "2000000a00000001"
delete = true

[[map]]
name = "slots"
kind = "array"
key_size = 4
value_size = 4
max_entries = 4

[[map.entry]]
key = "02000000"
value = "ffffffff"
"#;

    #[tokio::test]
    async fn reconciles_configured_maps() {
        let (_dir, path) = write_config("#define HAVE_LPM_MAP_TYPE\n", MAPS);
        let config = AgentConfig::load(&path).expect("load");
        let provider = Arc::new(MemoryProvider::new());

        let snapshots = reconcile(&config, Arc::clone(&provider), TIMEOUT)
            .await
            .expect("reconcile");

        assert_eq!(snapshots.len(), 2);
        assert_eq!(snapshots[0].name, "prefixes");
        assert_eq!(snapshots[0].kind, MapKind::LpmTrie);
        assert!(snapshots.iter().all(|s| s.status() == SyncStatus::Ok));

        let prefixes = provider.get("prefixes").expect("prefixes map");
        assert_eq!(
            prefixes.entries(),
            vec![(vec![0x18, 0, 0, 0x0a, 0, 0, 0, 0], vec![1, 0, 0, 0])]
        );
        assert_eq!(provider.get("slots").expect("slots map").len(), 1);
    }

    #[tokio::test]
    async fn unsupported_kinds_fall_back() {
        let (_dir, path) = write_config("", MAPS);
        let config = AgentConfig::load(&path).expect("load");

        let snapshots = reconcile(&config, Arc::new(MemoryProvider::new()), TIMEOUT)
            .await
            .expect("reconcile");
        assert_eq!(snapshots[0].requested, MapKind::LpmTrie);
        assert_eq!(snapshots[0].kind, MapKind::Hash);
    }

    #[tokio::test]
    async fn full_map_fails_the_run() {
        let body = r#"
[[map]]
name = "tiny"
kind = "hash"
key_size = 4
value_size = 4
max_entries = 1

[[map.entry]]
key = "01000000"
value = "01000000"

[[map.entry]]
key = "02000000"
value = "02000000"
"#;
        let (_dir, path) = write_config("", body);

        let config = AgentConfig::load(&path).expect("load");
        let snapshots = reconcile(&config, Arc::new(MemoryProvider::new()), TIMEOUT)
            .await
            .expect("reconcile");
        assert!(snapshots[0].failed);
        assert_eq!(snapshots[0].errors, 4);

        let err = run_sync(&path, TIMEOUT).await.expect_err("must fail");
        assert!(err.to_string().contains("1 of 1 maps failed"));
    }

    #[tokio::test]
    async fn missing_features_file_is_fatal() {
        let (dir, path) = write_config("", MAPS);
        fs::remove_file(dir.path().join("bpf_features.h")).expect("remove");

        let err = run_sync(&path, TIMEOUT).await.expect_err("must fail");
        assert!(err.to_string().contains("Feature probe failed"));
    }
}
