use crate::error::{RemedyError, Result};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::OnceLock;

// ---------------------------------------------------------------------------
// Validation patterns
// ---------------------------------------------------------------------------

static STUDY_ID_RE: OnceLock<Regex> = OnceLock::new();
static FORM_RE: OnceLock<Regex> = OnceLock::new();

fn study_id_re() -> &'static Regex {
    STUDY_ID_RE.get_or_init(|| Regex::new(r"^[A-Za-z0-9][A-Za-z0-9_\-]*$").unwrap())
}

fn form_re() -> &'static Regex {
    FORM_RE.get_or_init(|| Regex::new(r"^[a-z][a-z0-9_]*$").unwrap())
}

pub fn validate_study_id(study_id: &str) -> Result<()> {
    if study_id.is_empty() || study_id.len() > 64 || !study_id_re().is_match(study_id) {
        return Err(RemedyError::InvalidCommand(format!(
            "invalid subject id '{study_id}'"
        )));
    }
    Ok(())
}

pub fn validate_form(form: &str) -> Result<()> {
    if form.is_empty() || form.len() > 100 || !form_re().is_match(form) {
        return Err(RemedyError::InvalidCommand(format!(
            "invalid form name '{form}'"
        )));
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Command
// ---------------------------------------------------------------------------

/// One remediation instruction: redo the failed import of `form` for
/// `study_id`. The lock that has to be lifted for the replay is the form's.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Command {
    study_id: String,
    form: String,
}

impl Command {
    pub fn new(study_id: impl Into<String>, form: impl Into<String>) -> Result<Self> {
        let study_id = study_id.into();
        let form = form.into();
        validate_study_id(&study_id)?;
        validate_form(&form)?;
        Ok(Self { study_id, form })
    }

    pub fn study_id(&self) -> &str {
        &self.study_id
    }

    pub fn form(&self) -> &str {
        &self.form
    }

    pub fn lock_target(&self) -> &str {
        &self.form
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.study_id, self.form)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
