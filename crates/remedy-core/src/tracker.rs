use crate::error::Result;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IssueState {
    Open,
    Closed,
}

/// A ticket as the tracker returns it, before any parsing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawIssue {
    pub number: u64,
    pub title: String,
    #[serde(default)]
    pub body: String,
    #[serde(default)]
    pub labels: Vec<String>,
    pub state: IssueState,
    /// Pull requests share the issue listing on some trackers.
    #[serde(default)]
    pub pull_request: bool,
}

impl RawIssue {
    pub fn has_label(&self, label: &str) -> bool {
        self.labels.iter().any(|l| l == label)
    }

    pub fn is_open(&self) -> bool {
        self.state == IssueState::Open
    }
}

/// Read and write primitives of the issue tracker.
///
/// Calls are blocking. Implementations own their transport timeouts.
pub trait IssueTracker {
    /// One page (1-based) of open tickets carrying `label`, exactly as the
    /// tracker returned it. An empty page marks the end of the listing.
    fn list_open(&self, label: &str, page: u32) -> Result<Vec<RawIssue>>;

    /// A single ticket by number, open or closed. `None` if it does not exist.
    fn get(&self, number: u64) -> Result<Option<RawIssue>>;

    fn comment(&self, number: u64, body: &str) -> Result<()>;

    fn close(&self, number: u64) -> Result<()>;
}
