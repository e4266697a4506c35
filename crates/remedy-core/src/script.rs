//! Argv templates and subprocess invocation for record-store scripts.
//!
//! Lock, unlock and re-run operations are existing command-line scripts.
//! Each is configured as an argv template whose elements may contain the
//! placeholders `{study_id}`, `{form}` and `{action}` (`lock` / `unlock`).
//!
//! A script succeeds iff it exits with status 0. Its stdout and stderr are
//! captured and returned as the phase detail either way.

use crate::error::{RemedyError, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::process::{Command, Stdio};

pub const PLACEHOLDERS: &[&str] = &["study_id", "form", "action"];

/// Values substituted into a template.
#[derive(Debug, Clone, Copy)]
pub struct TemplateVars<'a> {
    pub study_id: &'a str,
    pub form: &'a str,
    pub action: &'a str,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CommandTemplate(pub Vec<String>);

impl CommandTemplate {
    pub fn new<I, S>(argv: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self(argv.into_iter().map(Into::into).collect())
    }

    pub fn is_empty(&self) -> bool {
        self.0.first().map_or(true, |p| p.trim().is_empty())
    }

    pub fn render(&self, vars: TemplateVars<'_>) -> Vec<String> {
        self.0
            .iter()
            .map(|arg| {
                arg.replace("{study_id}", vars.study_id)
                    .replace("{form}", vars.form)
                    .replace("{action}", vars.action)
            })
            .collect()
    }

    /// Placeholder names used by the template that are not recognised.
    pub fn unknown_placeholders(&self) -> Vec<String> {
        let mut unknown = Vec::new();
        for arg in &self.0 {
            let mut rest = arg.as_str();
            while let Some(start) = rest.find('{') {
                let after = &rest[start + 1..];
                let Some(end) = after.find('}') else {
                    break;
                };
                let name = &after[..end];
                if !PLACEHOLDERS.contains(&name) && !unknown.iter().any(|u| u == name) {
                    unknown.push(name.to_string());
                }
                rest = &after[end + 1..];
            }
        }
        unknown
    }
}

/// Run a rendered argv to completion and return its combined output.
pub fn run_argv(argv: &[String]) -> Result<String> {
    let (program, args) = argv
        .split_first()
        .ok_or_else(|| RemedyError::InvalidConfig("empty command template".into()))?;

    // Bare names are looked up on PATH so a missing script reports clearly
    // instead of as a generic spawn error.
    if !program.contains(std::path::MAIN_SEPARATOR) && !Path::new(program).exists() {
        which::which(program).map_err(|_| RemedyError::CommandNotFound(program.clone()))?;
    }

    let output = Command::new(program)
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .output()
        .map_err(|e| RemedyError::SpawnFailed {
            program: program.clone(),
            reason: e.to_string(),
        })?;

    let mut combined = String::from_utf8_lossy(&output.stdout).into_owned();
    let stderr = String::from_utf8_lossy(&output.stderr);
    if !stderr.trim().is_empty() {
        if !combined.is_empty() && !combined.ends_with('\n') {
            combined.push('\n');
        }
        combined.push_str(&stderr);
    }

    if !output.status.success() {
        return Err(RemedyError::CommandFailed {
            program: program.clone(),
            status: output.status.to_string(),
            output: combined,
        });
    }
    Ok(combined)
}
