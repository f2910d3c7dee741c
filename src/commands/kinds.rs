//! List map kinds command.

use anyhow::Result;
use bpfmap_caps::MapKind;
use colored::Colorize;

fn yes_no(value: bool) -> colored::ColoredString {
    if value {
        "yes".green()
    } else {
        "no".red()
    }
}

/// Print every map kind with its preallocation facts and probe token.
pub fn list_kinds() -> Result<()> {
    println!("{}\n", "Map kinds".cyan().bold());
    println!(
        "  {:>3}  {:<16} {:<28} {:<8} {:<8} {}",
        "id", "ident", "name", "prealloc", "requires", "probe"
    );

    for kind in MapKind::ALL {
        println!(
            "  {:>3}  {:<16} {:<28} {:<8} {:<8} {}",
            kind.raw(),
            kind.ident(),
            kind.name(),
            yes_no(kind.allows_preallocation()),
            yes_no(kind.requires_preallocation()),
            kind.feature_flag().unwrap_or("-"),
        );
    }

    Ok(())
}
