//! Known forms and fields of the record store, used to validate what the
//! scraper pulls out of ticket bodies.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// One row of the record store's data dictionary. Only the two columns the
/// scraper needs are kept; the rest of the export is ignored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetadataRow {
    pub form_name: String,
    pub field_name: String,
}

#[derive(Debug, Clone, Default)]
pub struct FormsTable {
    forms: BTreeSet<String>,
    field_to_form: BTreeMap<String, String>,
}

impl FormsTable {
    /// Build the table from a metadata export. Every form also gets its
    /// `<form>_complete` status field, which the export leaves out.
    pub fn from_metadata(rows: impl IntoIterator<Item = MetadataRow>) -> Self {
        let mut table = Self::default();
        for row in rows {
            table.forms.insert(row.form_name.clone());
            table.field_to_form.insert(row.field_name, row.form_name);
        }
        let forms: Vec<String> = table.forms.iter().cloned().collect();
        for form in forms {
            table
                .field_to_form
                .entry(format!("{form}_complete"))
                .or_insert(form);
        }
        table
    }

    pub fn has_form(&self, form: &str) -> bool {
        self.forms.contains(form)
    }

    pub fn form_for_field(&self, field: &str) -> Option<&str> {
        self.field_to_form.get(field).map(String::as_str)
    }

    pub fn forms(&self) -> impl Iterator<Item = &str> {
        self.forms.iter().map(String::as_str)
    }

    pub fn field_count(&self) -> usize {
        self.field_to_form.len()
    }

    pub fn is_empty(&self) -> bool {
        self.forms.is_empty()
    }
}
