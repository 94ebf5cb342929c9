use std::fs;

use anyhow::{bail, Context, Error};
use log::debug;

use devicegraph::{BlkDevice, Device, Devicegraph, Partition, Sid};
use osutils::{files, parted, sfdisk, udevadm, wipefs};
use sysdefs::partition_types::PtType;

use crate::{
    actiongraph::{Action, ActionKind},
    commit::CommitContext,
};

use super::{blk_path, unsupported};

/// Disk images, partition tables and partitions, through parted and sfdisk.
#[derive(Debug, Default, Clone, Copy)]
pub struct Partitioning;

impl Partitioning {
    pub(super) fn run(&self, action: &Action, context: &CommitContext) -> Result<(), Error> {
        let graph = context.graph_for(action);
        match context.device(action)? {
            Device::Disk(disk) => {
                if !context.target_mode().can_create_disks() {
                    bail!("Disk {} cannot be changed on real devices", disk.name);
                }
                match action.kind() {
                    ActionKind::Create => files::create_file(&disk.name)?
                        .set_len(disk.size().bytes())
                        .with_context(|| format!("Failed to size disk image {}", disk.name))?,
                    ActionKind::Delete => fs::remove_file(&disk.name)
                        .with_context(|| format!("Failed to delete disk image {}", disk.name))?,
                    _ => return unsupported(action),
                }
                // Image files are not block devices, udev has nothing to do.
                return Ok(());
            }
            Device::Gpt(_) | Device::Msdos(_) => {
                let device = blk_path(graph, graph.partitionable_of(action.sid())?)?;
                let table = graph.find_device(action.sid())?.to_partition_table()?;
                match action.kind() {
                    ActionKind::Create => parted::mklabel(&device, table.pt_type())?,
                    ActionKind::Delete => wipefs::all(&device)?,
                    _ => return unsupported(action),
                }
            }
            Device::Partition(partition) => self.partition(action, graph, partition)?,
            other => bail!("A {} is not handled by the partitioning tool", other.kind()),
        }

        udevadm::settle()
    }

    fn partition(
        &self,
        action: &Action,
        graph: &Devicegraph,
        partition: &Partition,
    ) -> Result<(), Error> {
        let table = graph.partition_table_of(partition.sid)?;
        let disk = blk_path(graph, graph.partitionable_of(table)?)?;
        let number = partition.number();

        match action.kind() {
            ActionKind::Create => {
                parted::mkpart(
                    &disk,
                    partition.partition_type,
                    partition.region.start,
                    partition.region.length,
                )?;
                if !partition.partition_type.is_extended() {
                    set_partition_id(graph, table, &disk, partition)?;
                }
            }
            ActionKind::Delete => parted::rm(&disk, number)?,
            ActionKind::Resize { .. } => parted::resizepart(
                &disk,
                number,
                partition.region.start,
                partition.region.length,
            )?,
            ActionKind::SetPartitionId { .. } => set_partition_id(graph, table, &disk, partition)?,
            ActionKind::Rename { from, to } => {
                debug!("Partition {from} is now known as {to}, nothing to do");
            }
            _ => return unsupported(action),
        }
        Ok(())
    }
}

fn set_partition_id(
    graph: &Devicegraph,
    table: Sid,
    disk: &std::path::Path,
    partition: &Partition,
) -> Result<(), Error> {
    let code = match graph.find_device(table)?.to_partition_table()?.pt_type() {
        PtType::Gpt => partition.id.gpt_guid().to_string(),
        PtType::Msdos => partition.id.mbr_code(),
    };
    sfdisk::set_part_type(disk, partition.number(), &code)
}
