use lazy_static::lazy_static;
use log::debug;
use regex::Regex;
use serde::{Deserialize, Serialize};

use sysdefs::partition_types::{PartitionId, PartitionType, PtType};

use crate::{
    bytes::Region,
    error::DevicegraphError,
    graph::Devicegraph,
    holders::{Holder, Subdevice},
    sid::Sid,
};

use super::{BlkDevice, Device};

lazy_static! {
    static ref PARTITION_NUMBER: Regex = Regex::new(r"(\d+)$").unwrap();
}

/// Extracts the partition number from a kernel name, e.g. 2 for
/// `/dev/nvme0n1p2`.
pub fn partition_number(name: &str) -> Option<u32> {
    PARTITION_NUMBER
        .captures(name)
        .and_then(|c| c.get(1))
        .and_then(|m| m.as_str().parse().ok())
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct Partition {
    pub sid: Sid,
    pub name: String,
    pub region: Region,
    #[serde(default)]
    pub partition_type: PartitionType,
    #[serde(default)]
    pub id: PartitionId,
}

impl Partition {
    /// Partition number, taken from the kernel name.
    pub fn number(&self) -> u32 {
        partition_number(&self.name).unwrap_or_default()
    }
}

impl BlkDevice for Partition {
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

impl Devicegraph {
    /// Creates a partition in a partition table. The number of the partition
    /// is taken from `name`.
    pub fn create_partition(
        &mut self,
        table: Sid,
        name: impl Into<String>,
        region: Region,
        partition_type: PartitionType,
    ) -> Result<Sid, DevicegraphError> {
        let name = name.into();
        self.ensure_name_unused(&name)?;
        let pt_type = self.find_device(table)?.to_partition_table()?.pt_type();

        let number = partition_number(&name).ok_or_else(|| {
            DevicegraphError::invalid(table, format!("no partition number in '{name}'"))
        })?;
        if self.partitions(table)?.iter().any(|p| p.number() == number) {
            return Err(DevicegraphError::invalid(
                table,
                format!("partition number {number} is already in use"),
            ));
        }

        match (pt_type, partition_type) {
            (PtType::Gpt, PartitionType::Primary) => {
                if !(1..=pt_type.max_primary()).contains(&number) {
                    return Err(DevicegraphError::invalid(
                        table,
                        format!("invalid GPT partition number {number}"),
                    ));
                }
            }
            (PtType::Gpt, other) => {
                return Err(DevicegraphError::invalid(
                    table,
                    format!("GPT does not support {other} partitions"),
                ));
            }
            (PtType::Msdos, PartitionType::Primary | PartitionType::Extended) => {
                if !(1..=pt_type.max_primary()).contains(&number) {
                    return Err(DevicegraphError::invalid(
                        table,
                        format!("invalid number {number} for a {partition_type} partition"),
                    ));
                }
                if partition_type.is_extended() && self.extended_partition(table)?.is_some() {
                    return Err(DevicegraphError::invalid(
                        table,
                        "partition table already has an extended partition",
                    ));
                }
            }
            (PtType::Msdos, PartitionType::Logical) => {
                if number <= pt_type.max_primary() {
                    return Err(DevicegraphError::invalid(
                        table,
                        format!("invalid number {number} for a logical partition"),
                    ));
                }
            }
        }

        self.check_partition_region(table, None, &region, partition_type)?;

        let id = match partition_type {
            PartitionType::Extended => PartitionId::EXTENDED,
            _ => PartitionId::default(),
        };
        let sid = self.registry().allocate();
        let device = Device::Partition(Partition {
            sid,
            name,
            region,
            partition_type,
            id,
        });
        let holder = Holder::Subdevice(Subdevice::new(self.registry().allocate()));
        self.attach_new(table, device, holder)
    }

    fn extended_partition(&self, table: Sid) -> Result<Option<&Partition>, DevicegraphError> {
        Ok(self
            .partitions(table)?
            .into_iter()
            .find(|p| p.partition_type.is_extended()))
    }

    /// Checks that a partition with the given region and type fits into the
    /// table. `exclude` is the partition being resized, if any.
    pub(crate) fn check_partition_region(
        &self,
        table: Sid,
        exclude: Option<Sid>,
        region: &Region,
        partition_type: PartitionType,
    ) -> Result<(), DevicegraphError> {
        let sid = exclude.unwrap_or(table);
        if region.is_empty() {
            return Err(DevicegraphError::invalid(sid, "partition region is empty"));
        }

        let partitionable = self.partitionable_of(table)?;
        let disk_region = *self.find_device(partitionable)?.to_blk_device()?.region();
        if disk_region.block_size != region.block_size {
            return Err(DevicegraphError::invalid(
                sid,
                format!(
                    "block size {} differs from the block size {} of the device",
                    region.block_size, disk_region.block_size
                ),
            ));
        }

        // Partitions never cover the first block, which holds the table
        if region.start == 0 || !disk_region.contains(region) {
            return Err(DevicegraphError::invalid(
                sid,
                format!("region {region} does not fit on device {disk_region}"),
            ));
        }

        let others: Vec<&Partition> = self
            .partitions(table)?
            .into_iter()
            .filter(|p| Some(p.sid) != exclude)
            .collect();

        if partition_type.is_logical() {
            let extended = others
                .iter()
                .find(|p| p.partition_type.is_extended())
                .ok_or_else(|| DevicegraphError::invalid(sid, "no extended partition"))?;
            // One block in front of every logical partition holds its EBR
            if region.start <= extended.region.start || !extended.region.contains(region) {
                return Err(DevicegraphError::invalid(
                    sid,
                    format!("region {region} is not inside the extended partition"),
                ));
            }
        } else if partition_type.is_extended() {
            if let Some(logical) = others
                .iter()
                .find(|p| p.partition_type.is_logical() && !region.contains(&p.region))
            {
                return Err(DevicegraphError::invalid(
                    sid,
                    format!("logical partition {} would lie outside", logical.name),
                ));
            }
        }

        if let Some(other) = others.iter().find(|p| {
            p.partition_type.is_logical() == partition_type.is_logical()
                && p.region.overlaps(region)
        }) {
            return Err(DevicegraphError::invalid(
                sid,
                format!("region {region} overlaps with partition {}", other.name),
            ));
        }

        Ok(())
    }

    pub fn set_partition_id(&mut self, sid: Sid, id: PartitionId) -> Result<(), DevicegraphError> {
        let partition = self.find_device_mut(sid)?.to_partition_mut()?;
        if partition.partition_type.is_extended() {
            return Err(DevicegraphError::invalid(
                sid,
                "the id of an extended partition is fixed",
            ));
        }
        partition.id = id;
        Ok(())
    }

    /// Deletes a partition and everything on top of it. Deleting an extended
    /// partition deletes its logical partitions too. Logical partitions with
    /// a higher number than a deleted logical partition move down by one,
    /// like the kernel does.
    pub fn delete_partition(&mut self, sid: Sid) -> Result<(), DevicegraphError> {
        let partition = self.find_device(sid)?.to_partition()?.clone();
        let table = self.partition_table_of(sid)?;

        let mut doomed = vec![sid];
        if partition.partition_type.is_extended() {
            doomed.extend(
                self.partitions(table)?
                    .into_iter()
                    .filter(|p| p.partition_type.is_logical())
                    .map(|p| p.sid),
            );
        }

        for victim in doomed {
            self.remove_descendants(victim)?;
            self.remove_device(victim)?;
        }

        if partition.partition_type.is_logical() {
            self.renumber_logical_partitions(table, partition.number())?;
        }
        Ok(())
    }

    fn renumber_logical_partitions(
        &mut self,
        table: Sid,
        deleted: u32,
    ) -> Result<(), DevicegraphError> {
        let partitionable = self.partitionable_of(table)?;
        let renames: Vec<(Sid, String)> = {
            let disk = self.find_device(partitionable)?.to_partitionable()?;
            self.partitions(table)?
                .into_iter()
                .filter(|p| p.partition_type.is_logical() && p.number() > deleted)
                .map(|p| (p.sid, disk.partition_name(p.number() - 1)))
                .collect()
        };

        for (sid, name) in renames {
            let partition = self.find_device_mut(sid)?.to_partition_mut()?;
            debug!("Renumbering partition '{}' to '{}'", partition.name, name);
            partition.name = name;
        }
        Ok(())
    }
}
