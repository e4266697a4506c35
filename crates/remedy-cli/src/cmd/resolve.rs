use super::{build_context, load_config, unknown_labels};
use crate::output::{print_json, ticket_list};
use anyhow::Context as _;
use chrono::{DateTime, Utc};
use clap::Args;
use remedy_core::report;
use remedy_core::runner::{BatchSummary, RunOptions, Runner, TicketOutcome};
use remedy_core::scraper::ScrapedIssue;
use remedy_core::RemedyError;
use serde::Serialize;
use std::io::BufRead;
use std::path::{Path, PathBuf};

#[derive(Args)]
pub struct ResolveArgs {
    /// Ticket labels to resolve; each label selects the importer to re-run
    #[arg(long, num_args = 1.., required = true)]
    pub labels: Vec<String>,

    /// Only consider these ticket numbers
    #[arg(long = "issue-numbers", num_args = 1..)]
    pub issue_numbers: Option<Vec<u64>>,

    /// Print the full report for every ticket
    #[arg(short, long)]
    pub verbose: bool,

    /// Skip the confirmation prompt
    #[arg(short, long)]
    pub yes: bool,

    /// Write a JSON run report to PATH
    #[arg(long, value_name = "PATH")]
    pub report: Option<PathBuf>,
}

#[derive(Serialize)]
struct RunReport<'a> {
    started_at: DateTime<Utc>,
    finished_at: DateTime<Utc>,
    labels: &'a [String],
    summary: &'a BatchSummary,
    tickets: &'a [TicketOutcome],
}

pub fn run(config_path: &Path, args: ResolveArgs, json: bool) -> anyhow::Result<()> {
    let config = load_config(config_path)?;
    let unknown = unknown_labels(&config, &args.labels);
    if !unknown.is_empty() {
        anyhow::bail!(
            "no rerun command configured for label(s): {}",
            unknown.join(", ")
        );
    }

    let ctx = build_context(&config)?;
    let forms = ctx
        .load_forms()
        .context("failed to export record store metadata")?;
    let runner = Runner::new(&ctx, RunOptions::from(&config));

    let started_at = Utc::now();
    let mut tickets: Vec<TicketOutcome> = Vec::new();
    let result = runner.run_labels(
        &args.labels,
        args.issue_numbers.as_deref(),
        &forms,
        |batch| args.yes || confirm(batch),
        |issue, outcome| {
            if args.verbose && !json {
                print_ticket(issue, outcome);
            }
            tickets.push(outcome.clone());
        },
    );
    let summary = match result {
        Ok(summary) => summary,
        Err(e @ RemedyError::Verification(_)) => {
            return Err(e).context("Aborting: conflicting commands in batch, nothing was changed");
        }
        Err(e @ RemedyError::Aborted(_)) => {
            return Err(e).context("Aborting: nothing was changed");
        }
        Err(e) => return Err(e).context("failed to scrape tickets"),
    };
    let finished_at = Utc::now();

    let run_report = RunReport {
        started_at,
        finished_at,
        labels: &args.labels,
        summary: &summary,
        tickets: &tickets,
    };

    if let Some(path) = &args.report {
        let data = serde_json::to_vec_pretty(&run_report)?;
        remedy_core::io::atomic_write(path, &data)
            .with_context(|| format!("failed to write run report to {}", path.display()))?;
    }

    if json {
        print_json(&run_report)?;
    } else {
        print_summary(&summary);
    }

    if !summary.update_failures.is_empty() {
        eprintln!(
            "warning: tracker update failed for {}",
            ticket_list(&summary.update_failures)
        );
    }
    if !summary.relock_failures.is_empty() {
        anyhow::bail!(
            "RELOCK FAILED on {}: forms may still be unlocked, lock them manually",
            ticket_list(&summary.relock_failures)
        );
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Output
// ---------------------------------------------------------------------------

fn confirm(batch: &[ScrapedIssue]) -> bool {
    if batch.is_empty() {
        return true;
    }
    let commands: usize = batch.iter().map(|i| i.commands().len()).sum();
    for issue in batch {
        eprint!("{}", report::format_scraped(issue));
    }
    eprint!(
        "Replay {commands} command(s) from {} ticket(s)? [y/N] ",
        batch.len()
    );

    let mut answer = String::new();
    if std::io::stdin().lock().read_line(&mut answer).is_err() {
        return false;
    }
    matches!(answer.trim().to_ascii_lowercase().as_str(), "y" | "yes")
}

fn print_ticket(issue: &ScrapedIssue, outcome: &TicketOutcome) {
    println!(
        "=== #{} [{}] {} ({}) ===",
        issue.number, issue.label, issue.title, outcome.action
    );
    println!("{}", outcome.report);
    if let Some(err) = &outcome.update_error {
        println!("tracker update failed: {err}");
    }
}

fn print_summary(summary: &BatchSummary) {
    if summary.processed() == 0 && summary.update_failures.is_empty() {
        println!("No matching tickets.");
        return;
    }
    println!("Closed:    {}", ticket_list(&summary.closed));
    println!("Commented: {}", ticket_list(&summary.commented));
    if !summary.skipped.is_empty() {
        println!("Skipped:   {}", ticket_list(&summary.skipped));
    }
}
