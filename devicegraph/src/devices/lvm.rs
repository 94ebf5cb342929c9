use log::debug;
use serde::{Deserialize, Serialize};

use crate::{
    bytes::{ByteCount, Region, DEFAULT_BLOCK_SIZE},
    error::DevicegraphError,
    graph::Devicegraph,
    holders::{Holder, LvmPvUser, Subdevice},
    sid::Sid,
};

use super::{BlkDevice, Device};

/// Extent size vgcreate uses unless told otherwise.
pub const DEFAULT_EXTENT_SIZE: ByteCount = ByteCount(4 << 20);

fn default_extent_size() -> ByteCount {
    DEFAULT_EXTENT_SIZE
}

fn default_stripes() -> u32 {
    1
}

/// An LVM physical volume. Its block device is its only parent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LvmPv {
    pub sid: Sid,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub uuid: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct LvmVg {
    pub sid: Sid,
    pub vg_name: String,
    #[serde(default = "default_extent_size")]
    pub extent_size: ByteCount,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub uuid: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct LvmLv {
    pub sid: Sid,
    /// Kernel name, `/dev/<vg>/<lv>`.
    pub name: String,
    pub lv_name: String,
    pub region: Region,
    #[serde(default = "default_stripes")]
    pub stripes: u32,
}

impl BlkDevice for LvmLv {
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

pub(crate) fn lv_device_name(vg_name: &str, lv_name: &str) -> String {
    format!("/dev/{vg_name}/{lv_name}")
}

impl Devicegraph {
    pub fn create_lvm_vg(&mut self, vg_name: impl Into<String>) -> Result<Sid, DevicegraphError> {
        let vg_name = vg_name.into();
        self.ensure_name_unused(&vg_name)?;

        let sid = self.registry().allocate();
        self.add_device(Device::LvmVg(LvmVg {
            sid,
            vg_name,
            extent_size: DEFAULT_EXTENT_SIZE,
            uuid: String::new(),
        }))
    }

    /// All volume groups, sorted by sid.
    pub fn all_lvm_vgs(&self) -> Vec<&LvmVg> {
        self.devices().filter_map(Device::as_lvm_vg).collect()
    }

    /// Turns an unused block device into a physical volume of the group.
    /// Returns the sid of the new physical volume.
    pub fn lvm_vg_add_pv(&mut self, vg: Sid, blk_device: Sid) -> Result<Sid, DevicegraphError> {
        self.find_device(vg)?.to_lvm_vg()?;
        self.find_device(blk_device)?.to_blk_device()?;
        self.ensure_unused(blk_device)?;
        if self.descendants(vg, true)?.contains(&blk_device) {
            return Err(DevicegraphError::invalid(
                blk_device,
                "a volume group cannot contain its own logical volume",
            ));
        }

        let pv = self.registry().allocate();
        let device = Device::LvmPv(LvmPv {
            sid: pv,
            uuid: String::new(),
        });
        let holder = Holder::LvmPvUser(LvmPvUser::new(self.registry().allocate()));
        self.attach_new(blk_device, device, holder)?;

        let subdevice = Holder::Subdevice(Subdevice::new(self.registry().allocate()));
        if let Err(e) = self.add_holder(pv, vg, subdevice) {
            self.remove_device(pv)?;
            return Err(e);
        }
        Ok(pv)
    }

    /// Removes the physical volume on `blk_device` from the group. Fails if
    /// the remaining space cannot hold the logical volumes.
    pub fn lvm_vg_remove_pv(&mut self, vg: Sid, blk_device: Sid) -> Result<(), DevicegraphError> {
        let extent_size = self.find_device(vg)?.to_lvm_vg()?.extent_size;
        let pv = self
            .lvm_vg_pvs(vg)?
            .into_iter()
            .find(|pv| self.parents(*pv).is_ok_and(|parents| parents.contains(&blk_device)))
            .ok_or_else(|| {
                DevicegraphError::invalid(blk_device, "block device is not a physical volume of the group")
            })?;

        let pv_size = self.pv_size(pv, extent_size)?;
        let remaining = ByteCount(self.lvm_vg_size(vg)?.bytes() - pv_size.bytes());
        if self.lvm_vg_used(vg)? > remaining {
            return Err(DevicegraphError::invalid(
                vg,
                format!("logical volumes do not fit into the remaining {remaining}"),
            ));
        }

        self.remove_device(pv)
    }

    /// Creates a logical volume. The size is rounded up to whole extents.
    pub fn create_lvm_lv(
        &mut self,
        vg: Sid,
        lv_name: impl Into<String>,
        size: ByteCount,
    ) -> Result<Sid, DevicegraphError> {
        let lv_name = lv_name.into();
        let (vg_name, extent_size) = {
            let group = self.find_device(vg)?.to_lvm_vg()?;
            (group.vg_name.clone(), group.extent_size)
        };
        let name = lv_device_name(&vg_name, &lv_name);
        self.ensure_name_unused(&name)?;

        let size = size.align_up(extent_size);
        let free = self.lvm_vg_free(vg)?;
        if size.bytes() == 0 || size > free {
            return Err(DevicegraphError::invalid(
                vg,
                format!("cannot create logical volume '{lv_name}' of {size}, {free} free"),
            ));
        }

        let sid = self.registry().allocate();
        let device = Device::LvmLv(LvmLv {
            sid,
            name,
            lv_name,
            region: Region::from_size(size),
            stripes: 1,
        });
        let holder = Holder::Subdevice(Subdevice::new(self.registry().allocate()));
        self.attach_new(vg, device, holder)
    }

    fn children_of_kind(
        &self,
        sid: Sid,
        filter: fn(&Device) -> bool,
    ) -> Result<Vec<Sid>, DevicegraphError> {
        Ok(self
            .children(sid)?
            .into_iter()
            .filter(|child| self.find_device(*child).is_ok_and(filter))
            .collect())
    }

    /// Physical volumes of the group, sorted by sid.
    pub fn lvm_vg_pvs(&self, vg: Sid) -> Result<Vec<Sid>, DevicegraphError> {
        self.find_device(vg)?.to_lvm_vg()?;
        Ok(self
            .parents(vg)?
            .into_iter()
            .filter(|parent| self.find_device(*parent).is_ok_and(Device::is_lvm_pv))
            .collect())
    }

    /// Logical volumes of the group, sorted by sid.
    pub fn lvm_vg_lvs(&self, vg: Sid) -> Result<Vec<Sid>, DevicegraphError> {
        self.find_device(vg)?.to_lvm_vg()?;
        self.children_of_kind(vg, Device::is_lvm_lv)
    }

    fn pv_size(&self, pv: Sid, extent_size: ByteCount) -> Result<ByteCount, DevicegraphError> {
        let mut size = ByteCount(0);
        for blk in self.parents(pv)? {
            size = ByteCount(size.bytes() + self.find_device(blk)?.to_blk_device()?.size().bytes());
        }
        Ok(size.align_down(extent_size))
    }

    /// Capacity of the group: the whole extents of all physical volumes.
    pub fn lvm_vg_size(&self, vg: Sid) -> Result<ByteCount, DevicegraphError> {
        let extent_size = self.find_device(vg)?.to_lvm_vg()?.extent_size;
        let mut size = 0;
        for pv in self.lvm_vg_pvs(vg)? {
            size += self.pv_size(pv, extent_size)?.bytes();
        }
        Ok(ByteCount(size))
    }

    /// Space taken by the logical volumes of the group.
    pub fn lvm_vg_used(&self, vg: Sid) -> Result<ByteCount, DevicegraphError> {
        let mut used = 0;
        for lv in self.lvm_vg_lvs(vg)? {
            used += self.find_device(lv)?.to_lvm_lv()?.size().bytes();
        }
        Ok(ByteCount(used))
    }

    pub fn lvm_vg_free(&self, vg: Sid) -> Result<ByteCount, DevicegraphError> {
        Ok(ByteCount(
            self.lvm_vg_size(vg)?
                .bytes()
                .saturating_sub(self.lvm_vg_used(vg)?.bytes()),
        ))
    }

    /// Renames the group and the kernel names of its logical volumes.
    pub(crate) fn rename_lvm_vg(&mut self, vg: Sid, vg_name: String) -> Result<(), DevicegraphError> {
        let current = self.find_device(vg)?.to_lvm_vg()?.vg_name.clone();
        if current == vg_name {
            return Ok(());
        }
        self.ensure_name_unused(&vg_name)?;

        for lv in self.lvm_vg_lvs(vg)? {
            let lv = self.find_device_mut(lv)?.to_lvm_lv_mut()?;
            lv.name = lv_device_name(&vg_name, &lv.lv_name);
        }
        debug!("Renaming volume group '{current}' to '{vg_name}'");
        self.find_device_mut(vg)?.to_lvm_vg_mut()?.vg_name = vg_name;
        Ok(())
    }

    pub(crate) fn rename_lvm_lv(&mut self, lv: Sid, lv_name: String) -> Result<(), DevicegraphError> {
        let vg = self
            .parents(lv)?
            .into_iter()
            .next()
            .ok_or_else(|| DevicegraphError::invalid(lv, "logical volume has no volume group"))?;
        let name = lv_device_name(&self.find_device(vg)?.to_lvm_vg()?.vg_name, &lv_name);
        if self.find_device(lv)?.to_lvm_lv()?.name == name {
            return Ok(());
        }
        self.ensure_name_unused(&name)?;

        let device = self.find_device_mut(lv)?.to_lvm_lv_mut()?;
        device.name = name;
        device.lv_name = lv_name;
        Ok(())
    }

    /// Checks that the physical volume on `blk_device`, if any, still holds
    /// the logical volumes of its group at `size` bytes.
    pub(crate) fn check_pv_resize(
        &self,
        blk_device: Sid,
        size: ByteCount,
    ) -> Result<(), DevicegraphError> {
        let Some(pv) = self
            .children(blk_device)?
            .into_iter()
            .find(|child| self.find_device(*child).is_ok_and(Device::is_lvm_pv))
        else {
            return Ok(());
        };
        let Some(vg) = self.children(pv)?.into_iter().next() else {
            return Ok(());
        };

        let group = self.find_device(vg)?.to_lvm_vg()?;
        let old = self.pv_size(pv, group.extent_size)?.bytes();
        let new = size.align_down(group.extent_size).bytes();
        let vg_size = ByteCount(self.lvm_vg_size(vg)?.bytes() - old + new);
        let used = self.lvm_vg_used(vg)?;
        if used > vg_size {
            return Err(DevicegraphError::invalid(
                blk_device,
                format!(
                    "{used} of logical volumes in volume group '{}' would not fit into {vg_size}",
                    group.vg_name
                ),
            ));
        }
        Ok(())
    }

    /// Checks that a logical volume can take `size` bytes and returns the
    /// size rounded up to whole extents.
    pub(crate) fn check_lv_size(&self, lv: Sid, size: ByteCount) -> Result<Region, DevicegraphError> {
        let current = *self.find_device(lv)?.to_lvm_lv()?.region();
        let vg = self
            .parents(lv)?
            .into_iter()
            .next()
            .ok_or_else(|| DevicegraphError::invalid(lv, "logical volume has no volume group"))?;
        let extent_size = self.find_device(vg)?.to_lvm_vg()?.extent_size;

        let size = size.align_up(extent_size);
        let available = self.lvm_vg_free(vg)?.bytes() + current.size().bytes();
        if size.bytes() == 0 || size.bytes() > available {
            return Err(DevicegraphError::invalid(
                lv,
                format!("cannot resize logical volume to {size}, {} available", ByteCount(available)),
            ));
        }
        Ok(Region::new(0, size.bytes() / DEFAULT_BLOCK_SIZE, DEFAULT_BLOCK_SIZE))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sid::IdentityRegistry;

    #[test]
    fn test_volume_group() {
        let registry = IdentityRegistry::new();
        let mut graph = Devicegraph::new(&registry);
        let sdb = graph.create_disk("/dev/sdb", ByteCount(ByteCount::GIB + 1024)).unwrap();
        let sdc = graph.create_disk("/dev/sdc", ByteCount::from_gib(1)).unwrap();
        let vg = graph.create_lvm_vg("system").unwrap();
        let pv_b = graph.lvm_vg_add_pv(vg, sdb).unwrap();
        let pv_c = graph.lvm_vg_add_pv(vg, sdc).unwrap();

        assert_eq!(graph.lvm_vg_pvs(vg).unwrap(), vec![pv_b, pv_c]);
        assert!(graph.find_holder(sdb, pv_b).unwrap().is_lvm_pv_user());
        assert!(graph.find_holder(pv_b, vg).unwrap().is_subdevice());
        // Partial extents do not count
        assert_eq!(graph.lvm_vg_size(vg).unwrap(), ByteCount::from_gib(2));

        let root = graph
            .create_lvm_lv(vg, "root", ByteCount(ByteCount::GIB + 1))
            .unwrap();
        let lv = graph.find_device(root).unwrap().to_lvm_lv().unwrap();
        assert_eq!(lv.name, "/dev/system/root");
        assert_eq!(lv.size(), ByteCount::from_mib(1028));
        assert_eq!(graph.lvm_vg_lvs(vg).unwrap(), vec![root]);
        assert_eq!(graph.lvm_vg_free(vg).unwrap(), ByteCount::from_mib(1020));
        assert_eq!(graph.find_by_name("/dev/system/root").unwrap().sid(), root);
        assert_eq!(graph.find_by_name("system").unwrap().sid(), vg);

        assert!(graph.create_lvm_lv(vg, "home", ByteCount::from_gib(1)).is_err());
        assert!(graph.create_lvm_lv(vg, "root", ByteCount::from_mib(4)).is_err());

        // Removing sdc leaves 1 GiB for 1028 MiB of logical volumes
        assert!(graph.lvm_vg_remove_pv(vg, sdc).is_err());
        graph.check_consistency().unwrap();
    }

    #[test]
    fn test_remove_pv() {
        let registry = IdentityRegistry::new();
        let mut graph = Devicegraph::new(&registry);
        let sdb = graph.create_disk("/dev/sdb", ByteCount::from_gib(1)).unwrap();
        let sdc = graph.create_disk("/dev/sdc", ByteCount::from_gib(1)).unwrap();
        let vg = graph.create_lvm_vg("data").unwrap();
        graph.lvm_vg_add_pv(vg, sdb).unwrap();
        let pv_c = graph.lvm_vg_add_pv(vg, sdc).unwrap();
        graph.create_lvm_lv(vg, "lv", ByteCount::from_mib(512)).unwrap();

        graph.lvm_vg_remove_pv(vg, sdc).unwrap();
        assert!(!graph.device_exists(pv_c));
        assert!(graph.children(sdc).unwrap().is_empty());
        assert_eq!(graph.lvm_vg_size(vg).unwrap(), ByteCount::from_gib(1));

        // sdb is taken by its physical volume
        assert_eq!(
            graph.create_blk_filesystem(sdb, sysdefs::filesystems::FsType::Ext4),
            Err(DevicegraphError::DeviceInUse { sid: sdb })
        );
    }
}
