// Errors surfaced by the restoration managers.

use pathways_common::catalog::CatalogError;
use pathways_common::machine::MachineError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum RestoreError {
    #[error("{kind} `{id}` not found")]
    NotFound { kind: &'static str, id: String },

    #[error("catalog node `{0}` is not selectable as a root")]
    NotLoggable(String),

    #[error("root `{0}` is already restored")]
    RootRestored(String),

    #[error("no catalog has been imported")]
    CatalogUnavailable,

    #[error(transparent)]
    Catalog(#[from] CatalogError),

    #[error(transparent)]
    Machine(#[from] MachineError),

    #[error(transparent)]
    Storage(#[from] anyhow::Error),
}

impl RestoreError {
    pub(crate) fn not_found(kind: &'static str, id: impl Into<String>) -> Self {
        Self::NotFound { kind, id: id.into() }
    }

    /// Stable machine-readable error code.
    pub fn code(&self) -> &'static str {
        match self {
            Self::NotFound { .. } | Self::Catalog(CatalogError::NotFound(_)) => "NOT_FOUND",
            Self::NotLoggable(_) => "NOT_LOGGABLE",
            Self::RootRestored(_) | Self::Machine(_) => "INVALID_ACTION",
            Self::CatalogUnavailable => "CATALOG_UNAVAILABLE",
            Self::Catalog(_) => "CATALOG_INVALID",
            Self::Storage(_) => "STORAGE_FAILED",
        }
    }
}
