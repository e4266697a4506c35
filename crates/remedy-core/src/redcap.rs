//! REDCap-backed [`RecordStore`].
//!
//! The data dictionary comes from the REDCap API. Locking and the replayed
//! imports go through the project's existing scripts, configured as argv
//! templates (see [`crate::script`]).

use crate::config::RecordStoreConfig;
use crate::error::{RemedyError, Result};
use crate::forms::MetadataRow;
use crate::script::{run_argv, CommandTemplate, TemplateVars};
use crate::store::RecordStore;
use reqwest::blocking::Client;
use std::collections::BTreeMap;
use std::time::Duration;
use tracing::debug;

pub struct RedcapStore {
    client: Client,
    api_url: String,
    token: String,
    lock_command: CommandTemplate,
    rerun: BTreeMap<String, CommandTemplate>,
}

impl RedcapStore {
    pub fn new(
        api_url: impl Into<String>,
        token: impl Into<String>,
        timeout: Duration,
        lock_command: CommandTemplate,
        rerun: BTreeMap<String, CommandTemplate>,
    ) -> Result<Self> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            api_url: api_url.into(),
            token: token.into(),
            lock_command,
            rerun,
        })
    }

    /// Build from config, reading the API token from the configured
    /// environment variable.
    pub fn from_config(cfg: &RecordStoreConfig) -> Result<Self> {
        let token = std::env::var(&cfg.token_env)
            .map_err(|_| RemedyError::MissingToken(cfg.token_env.clone()))?;
        Self::new(
            cfg.api_url.clone(),
            token,
            Duration::from_secs(cfg.timeout_seconds),
            cfg.lock_command.clone(),
            cfg.rerun.clone(),
        )
    }

    fn run_lock(&self, study_id: &str, form: &str, action: &str) -> Result<String> {
        let argv = self.lock_command.render(TemplateVars {
            study_id,
            form,
            action,
        });
        debug!(?argv, "running lock command");
        run_argv(&argv)
    }
}

impl RecordStore for RedcapStore {
    fn export_metadata(&self) -> Result<Vec<MetadataRow>> {
        let resp = self
            .client
            .post(&self.api_url)
            .form(&[
                ("token", self.token.as_str()),
                ("content", "metadata"),
                ("format", "json"),
                ("returnFormat", "json"),
            ])
            .send()?;
        let status = resp.status();
        if !status.is_success() {
            let body: String = resp.text().unwrap_or_default().chars().take(300).collect();
            return Err(RemedyError::RecordStore(format!(
                "metadata export: HTTP {status}: {body}"
            )));
        }
        Ok(resp.json()?)
    }

    fn unlock(&self, study_id: &str, form: &str) -> Result<String> {
        self.run_lock(study_id, form, "unlock")
    }

    fn relock(&self, study_id: &str, form: &str) -> Result<String> {
        self.run_lock(study_id, form, "lock")
    }

    fn re_run(&self, operation: &str, study_id: &str, form: &str) -> Result<String> {
        let template = self
            .rerun
            .get(operation)
            .ok_or_else(|| RemedyError::UnknownOperation(operation.to_string()))?;
        let argv = template.render(TemplateVars {
            study_id,
            form,
            action: operation,
        });
        debug!(?argv, "re-running import");
        run_argv(&argv)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
