//! `remedy-core`: remediation of failed record-store imports reported as
//! tracker tickets.
//!
//! Tickets are scraped for `subject=… form=…` commands, each command is
//! replayed inside an unlock/relock scope on the record store, and the
//! ticket is commented on and closed when every replay succeeded.

pub mod command;
pub mod config;
pub mod error;
pub mod executor;
pub mod forms;
pub mod github;
pub mod io;
pub mod parse;
pub mod redcap;
pub mod report;
pub mod runner;
pub mod scraper;
pub mod script;
pub mod store;
pub mod tracker;

pub use error::{RemedyError, Result};
