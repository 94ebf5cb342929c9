use serde::{Deserialize, Serialize};

use sysdefs::partition_types::PtType;

use crate::{
    error::DevicegraphError,
    graph::Devicegraph,
    holders::{Holder, User},
    sid::Sid,
};

use super::{Device, Partition, PartitionTable};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct Gpt {
    pub sid: Sid,
    /// Set the boot flag on the protective MBR.
    #[serde(default)]
    pub pmbr_boot: bool,
}

impl PartitionTable for Gpt {
    fn sid(&self) -> Sid {
        self.sid
    }

    fn pt_type(&self) -> PtType {
        PtType::Gpt
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Msdos {
    pub sid: Sid,
}

impl PartitionTable for Msdos {
    fn sid(&self) -> Sid {
        self.sid
    }

    fn pt_type(&self) -> PtType {
        PtType::Msdos
    }
}

impl Devicegraph {
    /// Creates a partition table on an unused disk or MD array.
    pub fn create_partition_table(
        &mut self,
        partitionable: Sid,
        pt_type: PtType,
    ) -> Result<Sid, DevicegraphError> {
        self.find_device(partitionable)?.to_partitionable()?;
        self.ensure_unused(partitionable)?;

        let sid = self.registry().allocate();
        let device = match pt_type {
            PtType::Gpt => Device::Gpt(Gpt {
                sid,
                pmbr_boot: false,
            }),
            PtType::Msdos => Device::Msdos(Msdos { sid }),
        };
        let holder = Holder::User(User::new(self.registry().allocate()));
        self.attach_new(partitionable, device, holder)
    }

    /// Partitions of the table, sorted by number.
    pub fn partitions(&self, table: Sid) -> Result<Vec<&Partition>, DevicegraphError> {
        self.find_device(table)?.to_partition_table()?;

        let mut partitions = self
            .children(table)?
            .into_iter()
            .filter_map(|sid| self.find_device(sid).ok())
            .filter_map(Device::as_partition)
            .collect::<Vec<_>>();
        partitions.sort_by_key(|p| (p.number(), p.sid));
        Ok(partitions)
    }

    /// The table a partition lives in.
    pub fn partition_table_of(&self, partition: Sid) -> Result<Sid, DevicegraphError> {
        self.find_device(partition)?.to_partition()?;
        self.parents(partition)?
            .into_iter()
            .find(|sid| {
                self.find_device(*sid)
                    .is_ok_and(|device| device.is_partition_table())
            })
            .ok_or_else(|| DevicegraphError::invalid(partition, "partition has no partition table"))
    }

    /// The disk or MD array a table lives on.
    pub fn partitionable_of(&self, table: Sid) -> Result<Sid, DevicegraphError> {
        self.find_device(table)?.to_partition_table()?;
        self.parents(table)?
            .into_iter()
            .find(|sid| {
                self.find_device(*sid)
                    .is_ok_and(|device| device.is_partitionable())
            })
            .ok_or_else(|| DevicegraphError::invalid(table, "partition table has no parent"))
    }
}
