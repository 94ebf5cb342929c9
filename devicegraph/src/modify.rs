use std::path::PathBuf;

use log::debug;

use crate::{
    bytes::ByteCount,
    devices::Device,
    error::DevicegraphError,
    graph::Devicegraph,
    sid::Sid,
};

impl Devicegraph {
    /// Changes the size of a block device.
    ///
    /// Partitions keep their start and must still fit into their table.
    /// Logical volumes are rounded up to whole extents and must fit into the
    /// free space of their volume group. A physical volume on the device must
    /// still hold the logical volumes of its group. The size of an MD array
    /// follows its members and cannot be set.
    pub fn resize(&mut self, sid: Sid, size: ByteCount) -> Result<(), DevicegraphError> {
        let device = self.find_device(sid)?;
        let region = match device {
            Device::Partition(partition) => {
                let region = partition.region.with_size(size);
                let table = self.partition_table_of(sid)?;
                self.check_partition_region(table, Some(sid), &region, partition.partition_type)?;
                region
            }
            Device::LvmLv(_) => self.check_lv_size(sid, size)?,
            Device::Disk(disk) => {
                let region = disk.region.with_size(size);
                for child in self.children(sid)? {
                    if !self.find_device(child)?.is_partition_table() {
                        continue;
                    }
                    if let Some(partition) = self
                        .partitions(child)?
                        .into_iter()
                        .find(|p| !region.contains(&p.region))
                    {
                        return Err(DevicegraphError::invalid(
                            sid,
                            format!("partition {} would not fit anymore", partition.name),
                        ));
                    }
                }
                region
            }
            Device::Md(_) => {
                return Err(DevicegraphError::invalid(
                    sid,
                    "the size of an MD array follows its members",
                ))
            }
            other => {
                return Err(DevicegraphError::DeviceHasWrongType {
                    sid,
                    expected: "blk-device".into(),
                    actual: other.kind().to_string(),
                })
            }
        };
        self.check_pv_resize(sid, region.size())?;

        let blk = self.find_device_mut(sid)?.to_blk_device_mut()?;
        debug!("Resizing '{}' from {} to {}", blk.name(), blk.size(), region.size());
        blk.set_region(region);

        for child in self.children(sid)? {
            if self.find_device(child)?.is_md() {
                self.update_md_region(child)?;
            }
        }
        Ok(())
    }

    /// Renames a device. MD arrays and volume groups take a new name, logical
    /// volumes a new name within their group and mount points a new path.
    /// Disks and partitions are named by the kernel and cannot be renamed.
    pub fn rename(&mut self, sid: Sid, name: impl Into<String>) -> Result<(), DevicegraphError> {
        let name = name.into();
        match self.find_device(sid)? {
            Device::Md(md) => {
                if md.name != name {
                    self.ensure_name_unused(&name)?;
                    self.find_device_mut(sid)?.to_md_mut()?.name = name;
                }
                Ok(())
            }
            Device::LvmVg(_) => self.rename_lvm_vg(sid, name),
            Device::LvmLv(_) => self.rename_lvm_lv(sid, name),
            Device::MountPoint(mount_point) => {
                let path = PathBuf::from(name);
                if mount_point.path == path {
                    return Ok(());
                }
                if !path.is_absolute() {
                    return Err(DevicegraphError::invalid(
                        sid,
                        format!("mount path '{}' is not absolute", path.display()),
                    ));
                }
                if self
                    .devices()
                    .filter_map(Device::as_mount_point)
                    .any(|mp| mp.path == path)
                {
                    return Err(DevicegraphError::invalid(
                        sid,
                        format!("'{}' is already a mount point", path.display()),
                    ));
                }
                self.find_device_mut(sid)?.to_mount_point_mut()?.path = path;
                Ok(())
            }
            other => Err(DevicegraphError::invalid(
                sid,
                format!("a {} cannot be renamed", other.kind()),
            )),
        }
    }
}
