use std::{
    fs,
    path::{Path, PathBuf},
};

use serde::{Deserialize, Serialize};

/// Where the probed devicegraph comes from.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq, Default)]
#[serde(rename_all = "kebab-case")]
pub enum ProbeMode {
    /// Inspect the block devices of the running system.
    #[default]
    Normal,

    /// Start from an empty devicegraph.
    None,

    /// Read the devicegraph from a YAML file.
    ReadDevicegraph(PathBuf),
}

/// What the devices of a devicegraph are backed by.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "kebab-case")]
pub enum TargetMode {
    /// Real block devices. Disks can be neither created nor deleted.
    #[default]
    Direct,

    /// Disks are image files, which can be created and deleted.
    Image,
}

impl TargetMode {
    pub fn can_create_disks(self) -> bool {
        matches!(self, Self::Image)
    }
}

/// The view a storage session has of its environment.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Environment {
    pub probe_mode: ProbeMode,
    pub target_mode: TargetMode,
}

impl Environment {
    pub fn new(probe_mode: ProbeMode, target_mode: TargetMode) -> Self {
        Self {
            probe_mode,
            target_mode,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read configuration file '{path}': {message}")]
    Read { path: PathBuf, message: String },

    #[error("Failed to parse configuration: {message}")]
    Parse { message: String },
}

/// Contents of the configuration file.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq, Default)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
pub struct StorageConfig {
    #[serde(default, with = "serde_yaml::with::singleton_map")]
    pub probe_mode: ProbeMode,

    #[serde(default)]
    pub target_mode: TargetMode,

    /// Log the actions instead of executing them.
    #[serde(default)]
    pub dry_run: bool,

    /// Optional JSON-lines log of everything that happened.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub log_file: Option<PathBuf>,
}

impl StorageConfig {
    pub fn from_yaml(yaml: &str) -> Result<Self, ConfigError> {
        serde_yaml::from_str(yaml).map_err(|e| ConfigError::Parse {
            message: e.to_string(),
        })
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let yaml = fs::read_to_string(path).map_err(|e| ConfigError::Read {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;
        Self::from_yaml(&yaml)
    }

    pub fn environment(&self) -> Environment {
        Environment::new(self.probe_mode.clone(), self.target_mode)
    }
}
