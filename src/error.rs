use devicegraph::{DevicegraphError, Sid};

use crate::{actiongraph::PlanError, commit::CommitError, config::ConfigError, probe::ProbeError};

/// Everything a storage session can fail with.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error(transparent)]
    Devicegraph(#[from] DevicegraphError),

    #[error(transparent)]
    Probe(#[from] ProbeError),

    #[error(transparent)]
    Plan(#[from] PlanError),

    #[error(transparent)]
    Commit(#[from] CommitError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("Devicegraph '{name}' not found")]
    DevicegraphNotFound { name: String },

    #[error("Devicegraph name '{name}' is reserved")]
    ReservedName { name: String },
}

impl StorageError {
    /// Sids implicated by the error.
    pub fn sids(&self) -> Vec<Sid> {
        match self {
            Self::Devicegraph(e) => e.sids(),
            Self::Probe(e) => e.sids(),
            Self::Plan(e) => e.sids(),
            Self::Commit(e) => e.sids(),
            Self::Config(_) | Self::DevicegraphNotFound { .. } | Self::ReservedName { .. } => {
                Vec::new()
            }
        }
    }
}
