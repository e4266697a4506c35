use super::{build_context, load_config, unknown_labels};
use crate::output::{print_json, print_table};
use anyhow::Context as _;
use clap::Args;
use remedy_core::report;
use remedy_core::runner::{RunOptions, Runner};
use remedy_core::RemedyError;
use std::path::Path;

#[derive(Args)]
pub struct ScrapeArgs {
    /// Ticket labels to scrape
    #[arg(long, num_args = 1.., required = true)]
    pub labels: Vec<String>,

    /// Only consider these ticket numbers
    #[arg(long = "issue-numbers", num_args = 1..)]
    pub issue_numbers: Option<Vec<u64>>,

    /// List every command and parse warning instead of a table
    #[arg(short, long)]
    pub verbose: bool,
}

pub fn run(config_path: &Path, args: ScrapeArgs, json: bool) -> anyhow::Result<()> {
    let config = load_config(config_path)?;
    for label in unknown_labels(&config, &args.labels) {
        eprintln!("[warning] no rerun command configured for label '{label}'");
    }

    let ctx = build_context(&config)?;
    let forms = ctx
        .load_forms()
        .context("failed to export record store metadata")?;
    let runner = Runner::new(&ctx, RunOptions::from(&config));

    let batch = match runner.prepare(&args.labels, args.issue_numbers.as_deref(), &forms) {
        Ok(batch) => batch,
        Err(e @ RemedyError::Verification(_)) => {
            return Err(e).context("batch would be aborted");
        }
        Err(e) => return Err(e).context("failed to scrape tickets"),
    };

    if json {
        return print_json(&batch);
    }
    if batch.is_empty() {
        println!("No matching tickets.");
        return Ok(());
    }
    if args.verbose {
        for issue in &batch {
            print!("{}", report::format_scraped(issue));
        }
        return Ok(());
    }

    let rows = batch
        .iter()
        .map(|issue| {
            vec![
                format!("#{}", issue.number),
                issue.label.clone(),
                issue.commands().len().to_string(),
                issue.warnings().len().to_string(),
            ]
        })
        .collect();
    print_table(&["TICKET", "LABEL", "COMMANDS", "WARNINGS"], rows);
    Ok(())
}
