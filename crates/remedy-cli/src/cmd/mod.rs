pub mod config;
pub mod resolve;
pub mod scrape;

use anyhow::Context as _;
use remedy_core::config::{Config, ConfigWarning, WarnLevel};
use remedy_core::github::GithubTracker;
use remedy_core::redcap::RedcapStore;
use remedy_core::runner::Context;
use std::path::Path;

/// Load and validate the config. Warnings go to stderr; errors abort.
pub fn load_config(path: &Path) -> anyhow::Result<Config> {
    let config = Config::load(path).context("failed to load config")?;
    let warnings = config.validate();
    for w in &warnings {
        eprintln!("[{}] {}", level_name(&w.level), w.message);
    }
    if Config::has_errors(&warnings) {
        anyhow::bail!("config validation found errors in {}", path.display());
    }
    Ok(config)
}

/// Labels on the command line with no re-run template configured.
pub fn unknown_labels<'a>(config: &Config, labels: &'a [String]) -> Vec<&'a str> {
    let known: Vec<&str> = config.rerun_labels().collect();
    labels
        .iter()
        .map(String::as_str)
        .filter(|l| !known.contains(l))
        .collect()
}

pub fn build_context(config: &Config) -> anyhow::Result<Context> {
    let tracker =
        GithubTracker::from_config(&config.tracker).context("failed to set up tracker client")?;
    let store = RedcapStore::from_config(&config.record_store)
        .context("failed to set up record store client")?;
    Ok(Context::new(Box::new(tracker), Box::new(store)))
}

pub fn level_name(level: &WarnLevel) -> &'static str {
    match level {
        WarnLevel::Warning => "warning",
        WarnLevel::Error => "error",
    }
}

pub fn print_warnings(warnings: &[ConfigWarning]) {
    for w in warnings {
        println!("[{}] {}", level_name(&w.level), w.message);
    }
}
