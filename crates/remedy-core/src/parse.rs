//! Extraction of remediation commands from semi-structured ticket text.
//!
//! Recognised forms, one or more per line:
//!
//! ```text
//! subject=S001 form=demographics
//! subject=S001, field=dem_age
//! ```
//!
//! A `field=` reference is resolved to its owning form through the
//! [`FormsTable`]. Anything that cannot be turned into a valid [`Command`]
//! becomes a [`ParseWarning`] instead of being dropped silently.

use crate::command::Command;
use crate::forms::FormsTable;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use std::sync::OnceLock;

static PAIR_RE: OnceLock<Regex> = OnceLock::new();

fn pair_re() -> &'static Regex {
    PAIR_RE.get_or_init(|| {
        Regex::new(r#"\bsubject=([^\s,;`"']+)[\s,;]+(form|field)=([^\s,;`"']+)"#).unwrap()
    })
}

// ---------------------------------------------------------------------------
// ParseWarning
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ParseWarning {
    UnknownForm { study_id: String, form: String },
    UnknownField { study_id: String, field: String },
    Invalid { text: String, reason: String },
    Duplicate { command: String },
    Unmatched { line: String },
}

impl fmt::Display for ParseWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParseWarning::UnknownForm { study_id, form } => {
                write!(f, "unknown form '{form}' for subject {study_id}; command dropped")
            }
            ParseWarning::UnknownField { study_id, field } => {
                write!(f, "unknown field '{field}' for subject {study_id}; command dropped")
            }
            ParseWarning::Invalid { text, reason } => write!(f, "'{text}' dropped: {reason}"),
            ParseWarning::Duplicate { command } => write!(f, "duplicate command {command} ignored"),
            ParseWarning::Unmatched { line } => {
                write!(f, "line mentions a subject but has no form or field: '{line}'")
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Parsing
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParsedBody {
    pub commands: Vec<Command>,
    pub warnings: Vec<ParseWarning>,
}

/// Extract every command from `body`, in order of appearance.
pub fn parse_body(body: &str, forms: &FormsTable) -> ParsedBody {
    let mut parsed = ParsedBody::default();
    let mut seen: HashSet<Command> = HashSet::new();

    for line in body.lines() {
        let mut matched = false;
        for caps in pair_re().captures_iter(line) {
            matched = true;
            let study_id = &caps[1];
            let kind = &caps[2];
            let value = &caps[3];

            let form = if kind == "field" {
                match forms.form_for_field(value) {
                    Some(form) => form.to_string(),
                    None => {
                        parsed.warnings.push(ParseWarning::UnknownField {
                            study_id: study_id.to_string(),
                            field: value.to_string(),
                        });
                        continue;
                    }
                }
            } else if forms.has_form(value) {
                value.to_string()
            } else {
                parsed.warnings.push(ParseWarning::UnknownForm {
                    study_id: study_id.to_string(),
                    form: value.to_string(),
                });
                continue;
            };

            match Command::new(study_id, form) {
                Ok(command) => {
                    if seen.insert(command.clone()) {
                        parsed.commands.push(command);
                    } else {
                        parsed.warnings.push(ParseWarning::Duplicate {
                            command: command.to_string(),
                        });
                    }
                }
                Err(e) => parsed.warnings.push(ParseWarning::Invalid {
                    text: caps[0].to_string(),
                    reason: e.to_string(),
                }),
            }
        }

        if !matched && line.contains("subject=") {
            parsed.warnings.push(ParseWarning::Unmatched {
                line: line.trim().to_string(),
            });
        }
    }

    parsed
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
