//! End-to-end batch remediation.
//!
//! ```text
//! scrape (all labels) ─▶ verify ─▶ confirm ─▶ per ticket:
//!     per command: unlock ─▶ re-run ─▶ relock
//!     settle ─▶ comment ─▶ close iff resolved
//! ```
//!
//! Nothing is written to the tracker until the whole batch has been scraped
//! and verified. After that, tickets are independent: a failed comment or
//! close on one ticket is recorded and the batch moves on.

use crate::config::{Config, EmptyTicketPolicy};
use crate::error::{RemedyError, Result};
use crate::executor::LockScopedExecutor;
use crate::forms::FormsTable;
use crate::report;
use crate::scraper::{verify, ScrapeFilter, ScrapedIssue, Scraper};
use crate::store::RecordStore;
use crate::tracker::IssueTracker;
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::{error, info, warn};

// ---------------------------------------------------------------------------
// Context
// ---------------------------------------------------------------------------

/// The external collaborators of a run, built once at process start.
pub struct Context {
    pub tracker: Box<dyn IssueTracker>,
    pub store: Box<dyn RecordStore>,
}

impl Context {
    pub fn new(tracker: Box<dyn IssueTracker>, store: Box<dyn RecordStore>) -> Self {
        Self { tracker, store }
    }

    /// Known forms and fields, straight from the record store.
    pub fn load_forms(&self) -> Result<FormsTable> {
        let rows = self.store.export_metadata()?;
        let forms = FormsTable::from_metadata(rows);
        info!(
            forms = forms.forms().count(),
            fields = forms.field_count(),
            "loaded record store metadata"
        );
        Ok(forms)
    }
}

// ---------------------------------------------------------------------------
// RunOptions
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct RunOptions {
    pub title_filter: String,
    pub empty_ticket_policy: EmptyTicketPolicy,
    pub close_with_parse_warnings: bool,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            title_filter: crate::config::default_title_filter(),
            empty_ticket_policy: EmptyTicketPolicy::default(),
            close_with_parse_warnings: true,
        }
    }
}

impl From<&Config> for RunOptions {
    fn from(cfg: &Config) -> Self {
        Self {
            title_filter: cfg.title_filter.clone(),
            empty_ticket_policy: cfg.empty_ticket_policy,
            close_with_parse_warnings: cfg.close_with_parse_warnings,
        }
    }
}

// ---------------------------------------------------------------------------
// Outcomes
// ---------------------------------------------------------------------------

/// Final tracker state of a processed ticket.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TicketAction {
    Closed,
    Commented,
    Skipped,
    /// The comment could not be posted; the ticket is unchanged.
    Untouched,
}

impl fmt::Display for TicketAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            TicketAction::Closed => "closed",
            TicketAction::Commented => "commented",
            TicketAction::Skipped => "skipped",
            TicketAction::Untouched => "untouched",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TicketOutcome {
    pub number: u64,
    pub label: String,
    pub action: TicketAction,
    pub resolved: bool,
    pub relock_failed: bool,
    pub report: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub update_error: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchSummary {
    pub closed: Vec<u64>,
    pub commented: Vec<u64>,
    pub skipped: Vec<u64>,
    pub update_failures: Vec<u64>,
    pub relock_failures: Vec<u64>,
}

impl BatchSummary {
    fn add(&mut self, outcome: &TicketOutcome) {
        match outcome.action {
            TicketAction::Closed => self.closed.push(outcome.number),
            TicketAction::Commented => self.commented.push(outcome.number),
            TicketAction::Skipped => self.skipped.push(outcome.number),
            TicketAction::Untouched => {}
        }
        if outcome.update_error.is_some() {
            self.update_failures.push(outcome.number);
        }
        if outcome.relock_failed {
            self.relock_failures.push(outcome.number);
        }
    }

    pub fn processed(&self) -> usize {
        self.closed.len() + self.commented.len() + self.skipped.len()
    }
}

// ---------------------------------------------------------------------------
// Runner
// ---------------------------------------------------------------------------

pub struct Runner<'a> {
    ctx: &'a Context,
    options: RunOptions,
}

impl<'a> Runner<'a> {
    pub fn new(ctx: &'a Context, options: RunOptions) -> Self {
        Self { ctx, options }
    }

    /// Remediate every matching ticket carrying `label`.
    ///
    /// `on_ticket` sees each ticket as soon as its tracker update is done;
    /// callers use it for progress output.
    pub fn run(
        &self,
        label: &str,
        numbers: Option<&[u64]>,
        forms: &FormsTable,
        on_ticket: impl FnMut(&ScrapedIssue, &TicketOutcome),
    ) -> Result<BatchSummary> {
        self.run_labels(&[label.to_string()], numbers, forms, |_| true, on_ticket)
    }

    /// Remediate several labels as one batch. Every label is scraped and
    /// the union verified before the first tracker write. `confirm` gets
    /// the verified batch and may refuse it.
    pub fn run_labels(
        &self,
        labels: &[String],
        numbers: Option<&[u64]>,
        forms: &FormsTable,
        confirm: impl FnOnce(&[ScrapedIssue]) -> bool,
        on_ticket: impl FnMut(&ScrapedIssue, &TicketOutcome),
    ) -> Result<BatchSummary> {
        let batch = self.prepare(labels, numbers, forms)?;
        if !confirm(&batch) {
            return Err(RemedyError::Aborted("batch not confirmed".into()));
        }
        Ok(self.execute(batch, on_ticket))
    }

    /// Scrape and verify without touching the record store or the tracker.
    pub fn prepare(
        &self,
        labels: &[String],
        numbers: Option<&[u64]>,
        forms: &FormsTable,
    ) -> Result<Vec<ScrapedIssue>> {
        let filters: Vec<ScrapeFilter> = labels
            .iter()
            .map(|label| {
                ScrapeFilter::new(label.clone(), self.options.title_filter.clone())
                    .with_numbers(numbers.map(<[u64]>::to_vec))
            })
            .collect();
        let batch = Scraper::new(self.ctx.tracker.as_ref(), forms).scrape_all(&filters)?;
        info!(tickets = batch.len(), "scraped batch");
        verify(&batch)?;
        Ok(batch)
    }

    /// Replay and report a verified batch.
    pub fn execute(
        &self,
        batch: Vec<ScrapedIssue>,
        mut on_ticket: impl FnMut(&ScrapedIssue, &TicketOutcome),
    ) -> BatchSummary {
        let mut summary = BatchSummary::default();
        for mut issue in batch {
            let outcome = self.process(&mut issue);
            summary.add(&outcome);
            on_ticket(&issue, &outcome);
        }
        summary
    }

    fn process(&self, issue: &mut ScrapedIssue) -> TicketOutcome {
        let operation = issue.label.clone();
        let executor = LockScopedExecutor::new(self.ctx.store.as_ref(), &operation);
        for command in issue.commands().to_vec() {
            let outcome = executor.execute(&command);
            issue.record(outcome);
        }

        let resolved = issue.settle(self.options.close_with_parse_warnings);
        let relock_failed = issue.relock_failures().next().is_some();
        let report = report::format(issue);
        let mut outcome = TicketOutcome {
            number: issue.number,
            label: issue.label.clone(),
            action: TicketAction::Skipped,
            resolved,
            relock_failed,
            report,
            update_error: None,
        };

        if !issue.is_actionable() && self.options.empty_ticket_policy == EmptyTicketPolicy::Skip {
            info!(issue = issue.number, "no commands; skipped");
            return outcome;
        }

        if let Err(e) = self.ctx.tracker.comment(issue.number, &outcome.report) {
            warn!(issue = issue.number, error = %e, "failed to comment; ticket left as is");
            outcome.action = TicketAction::Untouched;
            outcome.update_error = Some(e.to_string());
            return outcome;
        }
        outcome.action = TicketAction::Commented;

        if resolved {
            match self.ctx.tracker.close(issue.number) {
                Ok(()) => outcome.action = TicketAction::Closed,
                Err(e) => {
                    warn!(issue = issue.number, error = %e, "failed to close resolved ticket");
                    outcome.update_error = Some(e.to_string());
                }
            }
        }

        if relock_failed {
            error!(issue = issue.number, "ticket has forms that failed to relock");
        }
        info!(issue = issue.number, action = %outcome.action, resolved, "ticket processed");
        outcome
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
