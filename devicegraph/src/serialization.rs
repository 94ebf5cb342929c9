//! YAML form of a devicegraph.
//!
//! ```yaml
//! devices:
//!   - kind: disk
//!     sid: 42
//!     name: /dev/sda
//!     region: { start: 0, length: 2097152 }
//! holders:
//!   - parent: 42
//!     child: 43
//!     holder: { kind: user, sid: 44 }
//! ```

use std::{fs, path::Path};

use log::debug;
use serde::{Deserialize, Serialize};

use crate::{
    devices::Device,
    error::DevicegraphError,
    graph::Devicegraph,
    holders::Holder,
    sid::{IdentityRegistry, Sid},
};

#[derive(Debug, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
struct SerializedHolder {
    parent: Sid,
    child: Sid,
    holder: Holder,
}

#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
struct SerializedDevicegraph {
    #[serde(default)]
    devices: Vec<Device>,
    #[serde(default)]
    holders: Vec<SerializedHolder>,
}

fn serialization_error(e: impl ToString) -> DevicegraphError {
    DevicegraphError::Serialization {
        message: e.to_string(),
    }
}

impl Devicegraph {
    pub fn to_yaml(&self) -> Result<String, DevicegraphError> {
        let serialized = SerializedDevicegraph {
            devices: self.devices().cloned().collect(),
            holders: self
                .holders()
                .map(|view| SerializedHolder {
                    parent: view.parent,
                    child: view.child,
                    holder: view.holder.clone(),
                })
                .collect(),
        };
        serde_yaml::to_string(&serialized).map_err(serialization_error)
    }

    /// Reads a devicegraph and reserves all of its sids in `registry`, so
    /// sids allocated later never clash with the loaded ones.
    pub fn from_yaml(yaml: &str, registry: &IdentityRegistry) -> Result<Self, DevicegraphError> {
        let serialized: SerializedDevicegraph =
            serde_yaml::from_str(yaml).map_err(serialization_error)?;

        let mut graph = Devicegraph::new(registry);
        for device in serialized.devices {
            registry.register_copy(device.sid());
            graph.add_device(device)?;
        }
        for SerializedHolder {
            parent,
            child,
            holder,
        } in serialized.holders
        {
            registry.register_copy(holder.sid());
            graph.add_holder(parent, child, holder)?;
        }

        // Sizes of MD arrays are derived from their members
        let arrays: Vec<Sid> = graph.devices().filter(|d| d.is_md()).map(Device::sid).collect();
        for md in arrays {
            graph.update_md_region(md)?;
        }

        Ok(graph)
    }

    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), DevicegraphError> {
        let path = path.as_ref();
        debug!("Saving devicegraph to '{}'", path.display());
        fs::write(path, self.to_yaml()?).map_err(|e| {
            serialization_error(format!("cannot write '{}': {e}", path.display()))
        })
    }

    pub fn load(path: impl AsRef<Path>, registry: &IdentityRegistry) -> Result<Self, DevicegraphError> {
        let path = path.as_ref();
        debug!("Loading devicegraph from '{}'", path.display());
        let yaml = fs::read_to_string(path).map_err(|e| {
            serialization_error(format!("cannot read '{}': {e}", path.display()))
        })?;
        Self::from_yaml(&yaml, registry)
    }
}
