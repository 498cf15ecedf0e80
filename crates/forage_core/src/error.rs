use thiserror::Error;

use crate::model::TaxonId;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseError {
    #[error("invalid taxon id `{0}`")]
    TaxonId(String),
    #[error("invalid coordinate `{0}`, expected `lat,lng`")]
    Coordinate(String),
    #[error("unknown month `{0}`")]
    Month(String),
    #[error("unknown reminder frequency `{0}`")]
    Frequency(String),
}

/// Failures talking to the external observation or taxonomy service.
#[derive(Debug, Error)]
pub enum SourceError {
    #[error("request failed: {0}")]
    Transport(String),
    #[error("service responded with status {0}")]
    Status(u16),
    #[error("unreadable response: {0}")]
    Decode(String),
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("storage I/O failed for `{key}`: {source}")]
    Io {
        key: String,
        #[source]
        source: std::io::Error,
    },
    #[error("stored value for `{key}` is corrupt: {source}")]
    Corrupt {
        key: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("unable to encode value for `{key}`: {source}")]
    Encode {
        key: String,
        #[source]
        source: serde_json::Error,
    },
}

#[derive(Debug, Error)]
pub enum ReminderError {
    #[error(transparent)]
    Storage(#[from] StoreError),
    #[error("reminder for taxon {0} has no months selected")]
    NoMonths(TaxonId),
}

impl ReminderError {
    /// Short text suitable for an alert shown to the user.
    pub fn user_message(&self) -> String {
        match self {
            ReminderError::Storage(_) => {
                "Your reminders could not be saved. Please try again.".to_string()
            }
            ReminderError::NoMonths(_) => "Pick at least one month for this reminder.".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConfigError {
    #[error("invalid configuration: {0}")]
    Invalid(String),
}
