use crate::error::Result;
use crate::forms::MetadataRow;

/// Operations of the remote record store that remediation relies on.
///
/// The three phase operations return the operation's diagnostic output on
/// success. Every failure, including a transport error, is an `Err`; the
/// executor turns it into a failed phase result.
pub trait RecordStore {
    /// The data dictionary as `(form_name, field_name)` rows.
    fn export_metadata(&self) -> Result<Vec<MetadataRow>>;

    fn unlock(&self, study_id: &str, form: &str) -> Result<String>;

    fn relock(&self, study_id: &str, form: &str) -> Result<String>;

    /// Replay the import that originally failed. `operation` names the
    /// importer, which is selected by the ticket's label.
    fn re_run(&self, operation: &str, study_id: &str, form: &str) -> Result<String>;
}
