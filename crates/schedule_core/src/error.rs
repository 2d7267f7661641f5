use std::path::PathBuf;

use transit_schedule_model::VersionId;

use crate::records::HeaderError;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("missing required file(s): {}", names.join(", "))]
pub struct MissingFilesError {
    pub names: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("active version changed during import (expected {}, found {})", display_version(*expected), display_version(*found))]
pub struct ActivationConflictError {
    pub expected: Option<VersionId>,
    pub found: Option<VersionId>,
}

fn display_version(version: Option<VersionId>) -> String {
    match version {
        Some(id) => id.to_string(),
        None => "none".to_string(),
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{entity} '{key}' not found")]
pub struct NotFoundError {
    pub entity: &'static str,
    pub key: String,
}

impl NotFoundError {
    pub fn new(entity: &'static str, key: impl Into<String>) -> Self {
        Self {
            entity,
            key: key.into(),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ImportError {
    #[error("unreadable archive: {0}")]
    Archive(#[from] zip::result::ZipError),
    #[error("unreadable archive entry {file}: {source}")]
    ArchiveEntry {
        file: String,
        #[source]
        source: std::io::Error,
    },
    #[error("cannot read {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error(transparent)]
    MissingFiles(#[from] MissingFilesError),
    #[error(transparent)]
    Header(#[from] HeaderError),
    #[error(transparent)]
    ActivationConflict(#[from] ActivationConflictError),
    #[error("loader panicked: {message}")]
    LoaderPanic { message: String },
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum VersionError {
    #[error("dataset version {0} does not exist")]
    NotFound(VersionId),
    #[error("dataset version {0} was not imported successfully")]
    NotImported(VersionId),
    #[error("dataset version {0} is active")]
    Active(VersionId),
}
