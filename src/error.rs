use std::fmt::{self, Debug, Display};
use std::io;

use crate::person::{DiseaseStatus, PersonId};

/// Provides `EpisimError` and maps to other errors to
/// convert to an `EpisimError`
#[derive(Debug)]
#[allow(clippy::module_name_repetitions)]
pub enum EpisimError {
    IoError(io::Error),
    JsonError(serde_json::Error),
    CsvError(csv::Error),
    DateParseError(chrono::ParseError),
    ParseIntError(std::num::ParseIntError),
    ConfigError(String),
    EmptyInput(String),
    UnknownContainerType(String),
    UnknownPerson(String),
    ReportError(String),
    /// A status change was requested at a time before the person's last transition.
    TemporalConsistency {
        person: PersonId,
        last_transition: f64,
        requested: f64,
    },
    InvalidTransition {
        person: PersonId,
        from: DiseaseStatus,
        to: DiseaseStatus,
    },
    EpisimError(String),
}

impl From<io::Error> for EpisimError {
    fn from(error: io::Error) -> Self {
        EpisimError::IoError(error)
    }
}

impl From<serde_json::Error> for EpisimError {
    fn from(error: serde_json::Error) -> Self {
        EpisimError::JsonError(error)
    }
}

impl From<csv::Error> for EpisimError {
    fn from(error: csv::Error) -> Self {
        EpisimError::CsvError(error)
    }
}

impl From<chrono::ParseError> for EpisimError {
    fn from(error: chrono::ParseError) -> Self {
        EpisimError::DateParseError(error)
    }
}

impl From<std::num::ParseIntError> for EpisimError {
    fn from(error: std::num::ParseIntError) -> Self {
        EpisimError::ParseIntError(error)
    }
}

impl From<String> for EpisimError {
    fn from(error: String) -> Self {
        EpisimError::EpisimError(error)
    }
}

impl From<&str> for EpisimError {
    fn from(error: &str) -> Self {
        EpisimError::EpisimError(error.to_string())
    }
}

impl std::error::Error for EpisimError {}

impl Display for EpisimError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            EpisimError::ConfigError(message) => write!(f, "Configuration error: {message}"),
            EpisimError::EmptyInput(what) => write!(f, "Input is empty: {what}"),
            EpisimError::UnknownContainerType(name) => {
                write!(f, "No parameters configured for container type `{name}`")
            }
            EpisimError::TemporalConsistency {
                person,
                last_transition,
                requested,
            } => write!(
                f,
                "Status change for {person:?} at {requested} precedes its last transition at {last_transition}"
            ),
            EpisimError::InvalidTransition { person, from, to } => {
                write!(f, "Invalid status transition for {person:?}: {from} -> {to}")
            }
            _ => write!(f, "Error: {self:?}"),
        }
    }
}
