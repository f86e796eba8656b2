use std::fmt;

use vnotes_store::DocumentId;

/// Observable save state, shown by the status bar.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SaveStatus {
    pub is_saving: bool,
    pub last_saved_id: Option<DocumentId>,
    pub error: Option<String>,
}

impl fmt::Display for SaveStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(error) = &self.error {
            write!(f, "Save failed, retrying: {error}")
        } else if self.is_saving {
            f.write_str("Saving...")
        } else if self.last_saved_id.is_some() {
            f.write_str("Saved")
        } else {
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_labels() {
        assert_eq!(SaveStatus::default().to_string(), "");

        let saving = SaveStatus {
            is_saving: true,
            ..SaveStatus::default()
        };
        assert_eq!(saving.to_string(), "Saving...");

        let saved = SaveStatus {
            last_saved_id: Some("1".into()),
            ..SaveStatus::default()
        };
        assert_eq!(saved.to_string(), "Saved");

        let failed = SaveStatus {
            error: Some("disk full".into()),
            ..saved
        };
        assert_eq!(failed.to_string(), "Save failed, retrying: disk full");
    }
}
