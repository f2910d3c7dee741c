//! Feature probe command.

use std::path::Path;

use anyhow::{Context, Result};
use bpfmap_caps::{load_features_from_path, FeatureSupport, FeatureSupportTable, MapKind};
use colored::Colorize;

/// Read probe output and show how each probed kind resolves.
pub fn show_features(path: &Path) -> Result<()> {
    let table = load_features_from_path(path).context("Feature probe failed")?;

    println!(
        "{} from {}\n",
        "Kernel map support".cyan().bold(),
        path.display().to_string().green()
    );

    for line in report(&table) {
        println!("  {line}");
    }

    Ok(())
}

/// One line per probed kind: support, then the kind it resolves to.
pub fn report(table: &FeatureSupportTable) -> Vec<String> {
    MapKind::ALL
        .into_iter()
        .filter(|kind| kind.feature_flag().is_some())
        .map(|kind| {
            let support = table.get(kind);
            let status = match support {
                FeatureSupport::Supported => support.to_string().green(),
                FeatureSupport::Unsupported => support.to_string().red(),
                FeatureSupport::NotProbed => support.to_string().yellow(),
            };
            let resolved = kind.resolve(table);
            if resolved == kind {
                format!("{:<26} {status}", kind.name())
            } else {
                format!("{:<26} {status} (falls back to {resolved})", kind.name())
            }
        })
        .collect()
}
