use serde::{Deserialize, Serialize};

use crate::{
    bytes::{ByteCount, Region},
    error::DevicegraphError,
    graph::Devicegraph,
    sid::Sid,
};

use super::{BlkDevice, Device, Partitionable};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct Disk {
    pub sid: Sid,
    pub name: String,
    pub region: Region,
    #[serde(default)]
    pub rotational: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transport: Option<String>,
}

impl BlkDevice for Disk {
    fn sid(&self) -> Sid {
        self.sid
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn region(&self) -> &Region {
        &self.region
    }

    fn set_region(&mut self, region: Region) {
        self.region = region;
    }
}

impl Partitionable for Disk {}

impl Devicegraph {
    /// Adds a disk. Disks are roots of the devicegraph.
    pub fn create_disk(
        &mut self,
        name: impl Into<String>,
        size: ByteCount,
    ) -> Result<Sid, DevicegraphError> {
        self.create_disk_with_region(name, Region::from_size(size))
    }

    pub fn create_disk_with_region(
        &mut self,
        name: impl Into<String>,
        region: Region,
    ) -> Result<Sid, DevicegraphError> {
        let name = name.into();
        self.ensure_name_unused(&name)?;

        let sid = self.registry().allocate();
        self.add_device(Device::Disk(Disk {
            sid,
            name,
            region,
            rotational: false,
            transport: None,
        }))
    }

    /// All disks, sorted by sid.
    pub fn all_disks(&self) -> Vec<&Disk> {
        self.devices().filter_map(Device::as_disk).collect()
    }
}
