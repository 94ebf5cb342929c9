//! Building the devicegraph of what is on the machine right now.

use std::path::PathBuf;

use log::info;

use devicegraph::{Devicegraph, DevicegraphError, IdentityRegistry, Sid};

use crate::config::ProbeMode;

pub mod system;

pub use system::{SystemData, SystemProber};

#[derive(Debug, thiserror::Error)]
pub enum ProbeError {
    #[error("Failed to inspect the system: {message}")]
    Tool { message: String },

    #[error(transparent)]
    Devicegraph(#[from] DevicegraphError),
}

impl ProbeError {
    pub fn sids(&self) -> Vec<Sid> {
        match self {
            Self::Tool { .. } => Vec::new(),
            Self::Devicegraph(e) => e.sids(),
        }
    }
}

impl From<anyhow::Error> for ProbeError {
    fn from(e: anyhow::Error) -> Self {
        Self::Tool {
            message: format!("{e:#}"),
        }
    }
}

/// Source of the probed devicegraph. Every probe allocates fresh sids from
/// the given registry.
pub trait Prober: Send {
    fn probe(&self, registry: &IdentityRegistry) -> Result<Devicegraph, ProbeError>;
}

/// Always yields an empty devicegraph.
#[derive(Debug, Default, Clone, Copy)]
pub struct EmptyProber;

impl Prober for EmptyProber {
    fn probe(&self, registry: &IdentityRegistry) -> Result<Devicegraph, ProbeError> {
        Ok(Devicegraph::new(registry))
    }
}

/// Reads a devicegraph saved as YAML.
#[derive(Debug, Clone)]
pub struct FileProber {
    path: PathBuf,
}

impl FileProber {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl Prober for FileProber {
    fn probe(&self, registry: &IdentityRegistry) -> Result<Devicegraph, ProbeError> {
        info!("Reading devicegraph from '{}'", self.path.display());
        let graph = Devicegraph::load(&self.path, registry)?;
        graph.check_consistency()?;
        Ok(graph)
    }
}

pub fn prober_for(mode: &ProbeMode) -> Box<dyn Prober> {
    match mode {
        ProbeMode::Normal => Box::new(SystemProber),
        ProbeMode::None => Box::new(EmptyProber),
        ProbeMode::ReadDevicegraph(path) => Box::new(FileProber::new(path)),
    }
}

#[cfg(test)]
mod tests {
    use devicegraph::ByteCount;

    use super::*;

    #[test]
    fn test_empty_prober() {
        let registry = IdentityRegistry::new();
        let graph = prober_for(&ProbeMode::None).probe(&registry).unwrap();
        assert!(graph.is_empty());
    }

    #[test]
    fn test_file_prober() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("graph.yaml");

        let registry = IdentityRegistry::new();
        let mut graph = Devicegraph::new(&registry);
        let sda = graph.create_disk("/dev/sda", ByteCount::from_gib(8)).unwrap();
        graph.save(&path).unwrap();

        let prober = prober_for(&ProbeMode::ReadDevicegraph(path.clone()));
        let other = IdentityRegistry::new();
        let loaded = prober.probe(&other).unwrap();
        assert!(loaded.structurally_equal(&graph));
        assert!(loaded.device_exists(sda));

        let error = FileProber::new(dir.path().join("missing.yaml"))
            .probe(&registry)
            .unwrap_err();
        assert!(matches!(error, ProbeError::Devicegraph(_)));
    }

    #[test]
    fn test_tool_error() {
        let error = ProbeError::from(anyhow::anyhow!("exit code 1").context("Failed to run lsblk"));
        assert_eq!(
            error.to_string(),
            "Failed to inspect the system: Failed to run lsblk: exit code 1"
        );
        assert!(error.sids().is_empty());
    }
}
