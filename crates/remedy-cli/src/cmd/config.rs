use super::print_warnings;
use crate::output::print_json;
use anyhow::Context;
use clap::Subcommand;
use remedy_core::config::Config;
use std::path::Path;

#[derive(Subcommand)]
pub enum ConfigSubcommand {
    /// Validate the config for common mistakes
    Check,

    /// Show the resolved config path and its effective values
    Show,
}

pub fn run(path: &Path, subcmd: ConfigSubcommand, json: bool) -> anyhow::Result<()> {
    match subcmd {
        ConfigSubcommand::Check => check(path, json),
        ConfigSubcommand::Show => show(path, json),
    }
}

fn check(path: &Path, json: bool) -> anyhow::Result<()> {
    let config = Config::load(path).context("failed to load config")?;
    let warnings = config.validate();

    if json {
        print_json(&serde_json::json!({
            "path": path.display().to_string(),
            "warnings": warnings,
        }))?;
    } else if warnings.is_empty() {
        println!("Config is valid. No warnings.");
    } else {
        print_warnings(&warnings);
    }

    if Config::has_errors(&warnings) {
        anyhow::bail!("config validation found errors");
    }
    Ok(())
}

fn show(path: &Path, json: bool) -> anyhow::Result<()> {
    let config = Config::load(path).context("failed to load config")?;
    if json {
        return print_json(&config);
    }
    println!("# {}", path.display());
    print!("{}", serde_yaml::to_string(&config)?);
    Ok(())
}
