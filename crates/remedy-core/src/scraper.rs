//! Ticket discovery and parsing.
//!
//! [`Scraper::scrape`] returns a lazy iterator over matching tickets. Each
//! call queries the tracker again, so a scrape can be restarted at will and
//! never sees tickets closed by an earlier run.

use crate::command::Command;
use crate::error::{RemedyError, Result};
use crate::executor::CommandOutcome;
use crate::forms::FormsTable;
use crate::parse::{parse_body, ParseWarning};
use crate::tracker::{IssueTracker, RawIssue};
use serde::Serialize;
use std::collections::{BTreeMap, VecDeque};
use tracing::{debug, info, warn};

// ---------------------------------------------------------------------------
// ScrapeFilter
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScrapeFilter {
    pub label: String,
    /// Restrict to these ticket numbers. `None` scrapes every open ticket
    /// carrying the label.
    pub numbers: Option<Vec<u64>>,
    pub title_contains: String,
}

impl ScrapeFilter {
    pub fn new(label: impl Into<String>, title_contains: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            numbers: None,
            title_contains: title_contains.into(),
        }
    }

    pub fn with_numbers(mut self, numbers: Option<Vec<u64>>) -> Self {
        self.numbers = numbers;
        self
    }

    fn matches(&self, raw: &RawIssue) -> bool {
        raw.is_open()
            && !raw.pull_request
            && raw.has_label(&self.label)
            && raw.title.contains(&self.title_contains)
    }
}

// ---------------------------------------------------------------------------
// ScrapedIssue
// ---------------------------------------------------------------------------

/// One ticket under remediation: its parsed commands, the diagnostics from
/// parsing, and the outcomes recorded as its commands are replayed.
#[derive(Debug, Clone, Serialize)]
pub struct ScrapedIssue {
    pub number: u64,
    pub title: String,
    pub body: String,
    pub label: String,
    commands: Vec<Command>,
    warnings: Vec<ParseWarning>,
    outcomes: Vec<CommandOutcome>,
    resolved: bool,
}

impl ScrapedIssue {
    pub fn from_raw(raw: RawIssue, label: &str, forms: &FormsTable) -> Self {
        let parsed = parse_body(&raw.body, forms);
        for w in &parsed.warnings {
            warn!(issue = raw.number, "{w}");
        }
        Self {
            number: raw.number,
            title: raw.title,
            body: raw.body,
            label: label.to_string(),
            commands: parsed.commands,
            warnings: parsed.warnings,
            outcomes: Vec::new(),
            resolved: false,
        }
    }

    pub fn commands(&self) -> &[Command] {
        &self.commands
    }

    pub fn warnings(&self) -> &[ParseWarning] {
        &self.warnings
    }

    pub fn outcomes(&self) -> &[CommandOutcome] {
        &self.outcomes
    }

    /// False when parsing produced nothing to replay.
    pub fn is_actionable(&self) -> bool {
        !self.commands.is_empty()
    }

    pub fn resolved(&self) -> bool {
        self.resolved
    }

    pub fn relock_failures(&self) -> impl Iterator<Item = &CommandOutcome> {
        self.outcomes.iter().filter(|o| o.relock_failed())
    }

    pub fn record(&mut self, outcome: CommandOutcome) {
        self.outcomes.push(outcome);
    }

    /// Decide resolution once every command has been attempted.
    ///
    /// Resolved iff there was at least one command, each one has an
    /// outcome, and every outcome succeeded in all three phases. With
    /// `close_with_parse_warnings` off, any dropped command also blocks.
    pub fn settle(&mut self, close_with_parse_warnings: bool) -> bool {
        self.resolved = self.is_actionable()
            && self.outcomes.len() == self.commands.len()
            && self.outcomes.iter().all(CommandOutcome::succeeded)
            && (close_with_parse_warnings || self.warnings.is_empty());
        self.resolved
    }
}

// ---------------------------------------------------------------------------
// Scraper
// ---------------------------------------------------------------------------

pub struct Scraper<'a> {
    tracker: &'a dyn IssueTracker,
    forms: &'a FormsTable,
}

impl<'a> Scraper<'a> {
    pub fn new(tracker: &'a dyn IssueTracker, forms: &'a FormsTable) -> Self {
        Self { tracker, forms }
    }

    pub fn scrape(&self, filter: &'a ScrapeFilter) -> ScrapeIter<'a> {
        let source = match &filter.numbers {
            Some(numbers) => {
                let mut numbers = numbers.clone();
                numbers.sort_unstable();
                numbers.dedup();
                Source::Numbers(numbers.into())
            }
            None => Source::Listing {
                page: 0,
                buffer: VecDeque::new(),
                exhausted: false,
            },
        };
        ScrapeIter {
            tracker: self.tracker,
            forms: self.forms,
            filter,
            source,
        }
    }

    /// Scrape every label and return the combined batch, failing on the
    /// first tracker error.
    pub fn scrape_all(&self, filters: &'a [ScrapeFilter]) -> Result<Vec<ScrapedIssue>> {
        let mut batch = Vec::new();
        for filter in filters {
            for issue in self.scrape(filter) {
                batch.push(issue?);
            }
        }
        Ok(batch)
    }
}

enum Source {
    Listing {
        page: u32,
        buffer: VecDeque<RawIssue>,
        exhausted: bool,
    },
    Numbers(VecDeque<u64>),
}

pub struct ScrapeIter<'a> {
    tracker: &'a dyn IssueTracker,
    forms: &'a FormsTable,
    filter: &'a ScrapeFilter,
    source: Source,
}

impl ScrapeIter<'_> {
    fn next_raw(&mut self) -> Option<Result<RawIssue>> {
        match &mut self.source {
            Source::Listing {
                page,
                buffer,
                exhausted,
            } => loop {
                if let Some(raw) = buffer.pop_front() {
                    return Some(Ok(raw));
                }
                if *exhausted {
                    return None;
                }
                *page += 1;
                match self.tracker.list_open(&self.filter.label, *page) {
                    Ok(issues) if issues.is_empty() => *exhausted = true,
                    Ok(issues) => {
                        let mut issues = issues;
                        issues.sort_by_key(|i| i.number);
                        buffer.extend(issues);
                    }
                    Err(e) => {
                        *exhausted = true;
                        return Some(Err(e));
                    }
                }
            },
            Source::Numbers(numbers) => loop {
                let number = numbers.pop_front()?;
                match self.tracker.get(number) {
                    Ok(Some(raw)) => return Some(Ok(raw)),
                    Ok(None) => warn!(issue = number, "ticket not found; skipped"),
                    Err(e) => return Some(Err(e)),
                }
            },
        }
    }
}

impl Iterator for ScrapeIter<'_> {
    type Item = Result<ScrapedIssue>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let raw = match self.next_raw()? {
                Ok(raw) => raw,
                Err(e) => return Some(Err(e)),
            };
            if !self.filter.matches(&raw) {
                debug!(issue = raw.number, "ticket does not match filter; skipped");
                continue;
            }
            return Some(Ok(ScrapedIssue::from_raw(
                raw,
                &self.filter.label,
                self.forms,
            )));
        }
    }
}

// ---------------------------------------------------------------------------
// Verification
// ---------------------------------------------------------------------------

/// Pre-execution gate over the whole batch.
///
/// Two tickets whose labels differ replay different importers, so if they
/// target the same `(subject, form)` their intents conflict and the batch
/// is refused. The same pair under the same label is only logged.
pub fn verify(batch: &[ScrapedIssue]) -> Result<()> {
    let mut claims: BTreeMap<(&str, &str), Vec<(&str, u64)>> = BTreeMap::new();
    for issue in batch {
        for cmd in issue.commands() {
            claims
                .entry((cmd.study_id(), cmd.form()))
                .or_default()
                .push((issue.label.as_str(), issue.number));
        }
    }

    let mut conflicts = Vec::new();
    for ((study_id, form), claimants) in &claims {
        if claimants.len() < 2 {
            continue;
        }
        let first_label = claimants[0].0;
        let tickets: Vec<String> = claimants
            .iter()
            .map(|(label, n)| format!("#{n} ({label})"))
            .collect();
        if claimants.iter().any(|(label, _)| *label != first_label) {
            conflicts.push(format!(
                "  {study_id}/{form} claimed by {}",
                tickets.join(", ")
            ));
        } else {
            info!(
                "{study_id}/{form} appears in several tickets: {}",
                tickets.join(", ")
            );
        }
    }

    if conflicts.is_empty() {
        Ok(())
    } else {
        Err(RemedyError::Verification(conflicts.join("\n")))
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
