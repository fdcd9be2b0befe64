use colored::*;
use std::path::Path;

use crate::logic::config::{LayeredConfig, ProbeConfig, Source};
use crate::logic::types::redact;

/// Show the effective configuration, one line per setting with its origin
pub async fn show(path: &Path) -> anyhow::Result<()> {
    let layers = LayeredConfig::load(Some(path), |name| std::env::var(name).ok(), ProbeConfig::default())?;

    println!("{} {}", "Configuration file:".bright_blue().bold(), path.display());
    println!();
    for (name, value, source) in describe(&layers) {
        println!(
            "  {:<12} {:<45} {}",
            format!("{}:", name).cyan(),
            value.bright_white(),
            format!("({})", source.label()).dimmed()
        );
    }

    let effective = layers.effective();
    if let Err(e) = effective.resolve() {
        println!();
        println!("{} {}", "Not ready to probe:".yellow().bold(), e);
    }

    Ok(())
}

/// (name, shown value, origin) for every setting; the key is redacted
pub fn describe(layers: &LayeredConfig) -> Vec<(&'static str, String, Source)> {
    let eff = layers.effective();
    let unset = || "(unset)".to_string();

    vec![
        (
            "url",
            eff.url.clone().unwrap_or_else(unset),
            layers.source_of(|c| c.url.is_some()),
        ),
        (
            "service_key",
            eff.service_key.as_deref().map(redact).unwrap_or_else(unset),
            layers.source_of(|c| c.service_key.is_some()),
        ),
        (
            "table",
            eff.table_or_default().to_string(),
            layers.source_of(|c| c.table.is_some()),
        ),
        (
            "columns",
            eff.columns_or_default().join(","),
            layers.source_of(|c| c.columns.is_some()),
        ),
        (
            "limit",
            eff.limit_or_default().to_string(),
            layers.source_of(|c| c.limit.is_some()),
        ),
    ]
}

/// Write the given values into the config file, keeping anything already there
pub async fn set(path: &Path, update: ProbeConfig) -> anyhow::Result<()> {
    if update == ProbeConfig::default() {
        eprintln!("{}", "Error: At least one value must be specified".red().bold());
        eprintln!("Use one or more of: --url, --key, --table, --columns, --limit");
        return Ok(());
    }

    let current = ProbeConfig::from_file(path)?.unwrap_or_default();
    let merged = current.merge(update.clone());

    // Hold stored values to the probe's own rules; credentials may stay unset.
    merged.check_storable()?;

    merged.save(path)?;

    if let Some(url) = &update.url {
        println!("{} {}", "Set url to:".green(), url.bright_white());
    }
    if let Some(key) = &update.service_key {
        println!("{} {}", "Set service_key to:".green(), redact(key).bright_white());
    }
    if let Some(table) = &update.table {
        println!("{} {}", "Set table to:".green(), table.bright_white());
    }
    if let Some(columns) = &update.columns {
        println!("{} {}", "Set columns to:".green(), columns.join(",").bright_white());
    }
    if let Some(limit) = update.limit {
        println!("{} {}", "Set limit to:".green(), limit.to_string().bright_white());
    }
    println!();
    println!("{} {}", "Configuration saved to".bright_green().bold(), path.display());

    Ok(())
}

pub fn path(path: &Path) {
    println!("{}", path.display());
}
