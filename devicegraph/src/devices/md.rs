use log::debug;
use serde::{Deserialize, Serialize};

use sysdefs::raid::MdLevel;

use crate::{
    bytes::{ByteCount, Region, DEFAULT_BLOCK_SIZE},
    error::DevicegraphError,
    graph::Devicegraph,
    holders::{Holder, MdUser},
    sid::Sid,
};

use super::{BlkDevice, Device, Partitionable};

/// A software RAID array.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct Md {
    pub sid: Sid,
    pub name: String,
    /// Derived from the members, see [`Devicegraph::md_devices`].
    #[serde(default)]
    pub region: Region,
    pub level: MdLevel,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chunk_size: Option<ByteCount>,
    /// Number of members the array was assembled with, when it was found on
    /// the system. An array with fewer active members is degraded. Changing
    /// the members forgets it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub raid_devices: Option<u32>,
}

impl BlkDevice for Md {
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

impl Partitionable for Md {}

impl Devicegraph {
    /// Creates an MD array without members.
    pub fn create_md(
        &mut self,
        name: impl Into<String>,
        level: MdLevel,
    ) -> Result<Sid, DevicegraphError> {
        let name = name.into();
        self.ensure_name_unused(&name)?;

        let sid = self.registry().allocate();
        self.add_device(Device::Md(Md {
            sid,
            name,
            region: Region::default(),
            level,
            chunk_size: None,
            raid_devices: None,
        }))
    }

    /// All MD arrays, sorted by sid.
    pub fn all_mds(&self) -> Vec<&Md> {
        self.devices().filter_map(Device::as_md).collect()
    }

    /// Adds an unused block device to the array. The new member sorts after
    /// all existing ones.
    pub fn md_add_device(&mut self, md: Sid, blk_device: Sid) -> Result<(), DevicegraphError> {
        self.find_device(md)?.to_md()?;
        self.find_device(blk_device)?.to_blk_device()?;
        self.ensure_unused(blk_device)?;
        if md == blk_device || self.descendants(md, true)?.contains(&blk_device) {
            return Err(DevicegraphError::invalid(
                blk_device,
                "an MD array cannot contain itself",
            ));
        }

        let sort_key = self
            .in_holders(md)?
            .iter()
            .filter_map(|view| view.holder.as_md_user())
            .map(|user| user.sort_key + 1)
            .max()
            .unwrap_or(0);
        let holder = Holder::MdUser(MdUser::new(self.registry().allocate(), sort_key));
        self.add_holder(blk_device, md, holder)?;
        self.find_device_mut(md)?.to_md_mut()?.raid_devices = None;
        self.update_md_region(md)
    }

    pub fn md_remove_device(&mut self, md: Sid, blk_device: Sid) -> Result<(), DevicegraphError> {
        self.find_device(md)?.to_md()?;
        let holder = self.find_holder(blk_device, md)?.to_md_user()?.sid;
        self.remove_holder(holder)?;
        self.find_device_mut(md)?.to_md_mut()?.raid_devices = None;
        self.update_md_region(md)
    }

    /// Members of the array, sorted by their position.
    pub fn md_devices(&self, md: Sid) -> Result<Vec<Sid>, DevicegraphError> {
        self.find_device(md)?.to_md()?;
        let mut members: Vec<(u32, Sid)> = self
            .in_holders(md)?
            .iter()
            .filter_map(|view| Some((view.holder.as_md_user()?.sort_key, view.parent)))
            .collect();
        members.sort();
        Ok(members.into_iter().map(|(_, sid)| sid).collect())
    }

    pub fn set_md_user_flags(
        &mut self,
        md: Sid,
        blk_device: Sid,
        spare: bool,
        faulty: bool,
    ) -> Result<(), DevicegraphError> {
        let user = self.find_holder_mut(blk_device, md)?.to_md_user_mut()?;
        user.spare = spare;
        user.faulty = faulty;
        self.find_device_mut(md)?.to_md_mut()?.raid_devices = None;
        self.update_md_region(md)
    }

    /// Recomputes the size of the array from its active data members.
    pub(crate) fn update_md_region(&mut self, md: Sid) -> Result<(), DevicegraphError> {
        let level = self.find_device(md)?.to_md()?.level;

        let mut sizes = Vec::new();
        for view in self.in_holders(md)? {
            let Some(user) = view.holder.as_md_user() else {
                continue;
            };
            if user.active && user.is_data_member() {
                sizes.push(self.find_device(view.parent)?.to_blk_device()?.size());
            }
        }

        let member_size = sizes.iter().min().copied().unwrap_or_default();
        let size = level.array_size(sizes.len() as u64, member_size.bytes());
        let region = Region::new(0, size / DEFAULT_BLOCK_SIZE, DEFAULT_BLOCK_SIZE);

        let array = self.find_device_mut(md)?.to_md_mut()?;
        debug!("Size of MD array '{}' is now {}", array.name, region.size());
        array.region = region;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sid::IdentityRegistry;

    fn raid_graph(members: usize, level: MdLevel) -> (Devicegraph, Sid, Vec<Sid>) {
        let registry = IdentityRegistry::new();
        let mut graph = Devicegraph::new(&registry);
        let md = graph.create_md("/dev/md0", level).unwrap();
        let disks: Vec<Sid> = (0..members)
            .map(|i| {
                let name = format!("/dev/sd{}", (b'b' + i as u8) as char);
                let disk = graph.create_disk(name, ByteCount::from_gib(1)).unwrap();
                graph.md_add_device(md, disk).unwrap();
                disk
            })
            .collect();
        (graph, md, disks)
    }

    #[test]
    fn test_md_members() {
        let (mut graph, md, disks) = raid_graph(3, MdLevel::Raid5);
        assert_eq!(graph.md_devices(md).unwrap(), disks);
        assert_eq!(
            graph.find_device(md).unwrap().to_md().unwrap().size(),
            ByteCount::from_gib(2)
        );
        graph.check_consistency().unwrap();

        let keys: Vec<u32> = disks
            .iter()
            .map(|disk| graph.find_holder(*disk, md).unwrap().to_md_user().unwrap().sort_key)
            .collect();
        assert_eq!(keys, vec![0, 1, 2]);

        graph.md_remove_device(md, disks[1]).unwrap();
        assert_eq!(graph.md_devices(md).unwrap(), vec![disks[0], disks[2]]);
        assert_eq!(
            graph.find_device(md).unwrap().to_md().unwrap().size(),
            ByteCount::from_gib(1)
        );
    }

    #[test]
    fn test_md_spare() {
        let (mut graph, md, disks) = raid_graph(3, MdLevel::Raid1);
        graph.set_md_user_flags(md, disks[2], true, false).unwrap();
        assert!(graph.find_holder(disks[2], md).unwrap().to_md_user().unwrap().spare);
        assert_eq!(
            graph.find_device(md).unwrap().to_md().unwrap().size(),
            ByteCount::from_gib(1)
        );
    }

    #[test]
    fn test_member_changes_forget_raid_devices() {
        let (mut graph, md, disks) = raid_graph(3, MdLevel::Raid5);
        graph.find_device_mut(md).unwrap().to_md_mut().unwrap().raid_devices = Some(4);
        graph.check_consistency().unwrap();

        graph.md_remove_device(md, disks[2]).unwrap();
        assert_eq!(graph.find_device(md).unwrap().to_md().unwrap().raid_devices, None);
        // Two members are too few for a raid5 the graph builds itself
        assert!(graph.check_consistency().is_err());
    }

    #[test]
    fn test_md_add_checks() {
        let (mut graph, md, disks) = raid_graph(2, MdLevel::Raid0);
        assert_eq!(
            graph.md_add_device(md, disks[0]),
            Err(DevicegraphError::DeviceInUse { sid: disks[0] })
        );
        assert!(graph.md_add_device(md, md).is_err());

        let md1 = graph.create_md("/dev/md1", MdLevel::Raid1).unwrap();
        assert_eq!(graph.md_add_device(md1, md), Ok(()));
        // md0 is below md1 now, so md1 cannot become a member of md0
        assert!(graph.md_add_device(md, md1).is_err());
    }
}
