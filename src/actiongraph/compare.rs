//! Reconciliation of two devicegraphs into a flat list of actions.

use std::collections::BTreeMap;

use log::trace;

use devicegraph::{
    BlkDevice, BlkFilesystem, ByteCount, Device, Devicegraph, HolderView, LvmLv, LvmVg, Md,
    MountPoint, Partition, Sid,
};

use crate::config::TargetMode;

use super::{
    action::{Action, ActionKind, ReallotMode, ResizeDirection},
    describe, PlanError,
};

/// Compares both graphs by sid and returns the actions that turn `lhs` into
/// `rhs`, in emission order: deletes, reduces, creates, modifications,
/// extends. Each group is sorted by sid.
pub(super) fn compare(
    lhs: &Devicegraph,
    rhs: &Devicegraph,
    target_mode: TargetMode,
) -> Result<Vec<Action>, PlanError> {
    lhs.check_consistency()?;
    rhs.check_consistency()?;

    let mut differ = Differ {
        lhs,
        rhs,
        target_mode,
        actions: Vec::new(),
    };
    differ.deleted_devices()?;
    differ.removed_holders()?;
    differ.created_devices()?;
    differ.changed_devices()?;
    differ.changed_holders()?;
    differ.added_holders()?;

    trace!("Compared devicegraphs: {} actions", differ.actions.len());
    Ok(differ.actions)
}

fn unplannable(sid: Sid, reason: impl Into<String>) -> PlanError {
    PlanError::Unplannable {
        reason: reason.into(),
        sids: vec![sid],
    }
}

fn holders_by_sid(graph: &Devicegraph) -> BTreeMap<Sid, HolderView<'_>> {
    graph.holders().map(|view| (view.holder.sid(), view)).collect()
}

struct Differ<'a> {
    lhs: &'a Devicegraph,
    rhs: &'a Devicegraph,
    target_mode: TargetMode,
    actions: Vec<Action>,
}

impl Differ<'_> {
    fn push(&mut self, sid: Sid, kind: ActionKind, description: String) {
        trace!("Planned action on {sid}: {description}");
        self.actions.push(Action::new(sid, kind, description));
    }

    fn check_disk(&self, device: &Device, verb: &str) -> Result<(), PlanError> {
        if device.is_disk() && !self.target_mode.can_create_disks() {
            return Err(unplannable(
                device.sid(),
                format!(
                    "Disk {} cannot be {verb} when operating on real devices",
                    device.display_name()
                ),
            ));
        }
        Ok(())
    }

    fn deleted_devices(&mut self) -> Result<(), PlanError> {
        for device in self.lhs.devices() {
            if self.rhs.device_exists(device.sid()) {
                continue;
            }
            self.check_disk(device, "deleted")?;
            let description = describe::delete(self.lhs, device)?;
            self.push(device.sid(), ActionKind::Delete, description);
        }
        Ok(())
    }

    fn created_devices(&mut self) -> Result<(), PlanError> {
        for device in self.rhs.devices() {
            if self.lhs.device_exists(device.sid()) {
                continue;
            }
            self.check_disk(device, "created")?;
            let description = describe::create(self.rhs, device)?;
            self.push(device.sid(), ActionKind::Create, description);
        }
        Ok(())
    }

    /// Holders only in lhs whose child survives. Leaving an MD array or a
    /// volume group is a reduce; anything else would move the child.
    fn removed_holders(&mut self) -> Result<(), PlanError> {
        for (sid, view) in holders_by_sid(self.lhs) {
            if self.rhs.holder_exists(sid) || !self.rhs.device_exists(view.child) {
                continue;
            }
            self.reallot(ReallotMode::Reduce, &view)?;
        }
        Ok(())
    }

    fn added_holders(&mut self) -> Result<(), PlanError> {
        for (sid, view) in holders_by_sid(self.rhs) {
            if self.lhs.holder_exists(sid) || !self.lhs.device_exists(view.child) {
                continue;
            }
            self.reallot(ReallotMode::Extend, &view)?;
        }
        Ok(())
    }

    fn reallot(&mut self, mode: ReallotMode, view: &HolderView) -> Result<(), PlanError> {
        let graph = match mode {
            ReallotMode::Reduce => self.lhs,
            ReallotMode::Extend => self.rhs,
        };

        let aggregate = graph.find_device(view.child)?;
        let noun = match aggregate {
            Device::Md(md) => format!("RAID {}", md.name),
            Device::LvmVg(vg) => format!("volume group {}", vg.vg_name),
            other => {
                return Err(unplannable(
                    other.sid(),
                    format!(
                        "Moving {} to another parent is not supported",
                        other.display_name()
                    ),
                ))
            }
        };

        let member = describe::member(graph, view.parent)?;
        let description = match mode {
            ReallotMode::Extend => format!("Add {member} to {noun}"),
            ReallotMode::Reduce => format!("Remove {member} from {noun}"),
        };
        self.push(
            view.child,
            ActionKind::Reallot {
                mode,
                device: view.parent,
            },
            description,
        );
        Ok(())
    }

    /// Holders in both graphs must connect the same devices the same way.
    fn changed_holders(&mut self) -> Result<(), PlanError> {
        let rhs_holders = holders_by_sid(self.rhs);
        for (sid, old) in holders_by_sid(self.lhs) {
            let Some(new) = rhs_holders.get(&sid) else {
                continue;
            };
            if old.parent != new.parent || old.child != new.child {
                return Err(unplannable(
                    old.child,
                    format!("Moving holder {sid} to other devices is not supported"),
                ));
            }
            if old.holder != new.holder {
                return Err(PlanError::Unplannable {
                    reason: format!(
                        "Changing the {} between {} and {} is not supported",
                        old.holder.kind(),
                        old.parent,
                        old.child
                    ),
                    sids: vec![old.child, old.parent],
                });
            }
        }
        Ok(())
    }

    /// Devices in both graphs, compared field by field. Every difference
    /// either becomes an action or makes the plan unplannable. Derived
    /// attributes (the region of an MD array, the member count it was
    /// assembled with, the kernel name of a logical volume) follow from
    /// other changes.
    fn changed_devices(&mut self) -> Result<(), PlanError> {
        for old in self.lhs.devices() {
            let Ok(new) = self.rhs.find_device(old.sid()) else {
                continue;
            };
            if old == new {
                continue;
            }
            if old.kind() != new.kind() {
                return Err(unplannable(
                    old.sid(),
                    format!(
                        "Changing {} {} into a {} is not supported",
                        old.kind(),
                        old.display_name(),
                        new.kind()
                    ),
                ));
            }

            match old {
                Device::Disk(a) => {
                    if a != new.to_disk()? {
                        return Err(unplannable(
                            a.sid,
                            format!("Disk {} cannot be changed", a.name),
                        ));
                    }
                }
                Device::Gpt(a) => {
                    if a.pmbr_boot != new.to_gpt()?.pmbr_boot {
                        return Err(unplannable(
                            a.sid,
                            format!(
                                "Changing the protective MBR boot flag of {} is not supported",
                                describe::subject(self.lhs, old)?
                            ),
                        ));
                    }
                }
                Device::Msdos(_) => {}
                Device::Partition(a) => self.partition(new, a, new.to_partition()?)?,
                Device::BlkFilesystem(a) => self.filesystem(new, a, new.to_blk_filesystem()?)?,
                Device::MountPoint(a) => self.mount_point(new, a, new.to_mount_point()?)?,
                Device::Md(a) => self.md(new, a, new.to_md()?)?,
                Device::LvmPv(a) => {
                    if a.uuid != new.to_lvm_pv()?.uuid {
                        return Err(unplannable(
                            a.sid,
                            format!(
                                "Changing the uuid of the {} is not supported",
                                describe::subject(self.lhs, old)?
                            ),
                        ));
                    }
                }
                Device::LvmVg(a) => self.vg(new, a, new.to_lvm_vg()?)?,
                Device::LvmLv(a) => self.lv(new, a, new.to_lvm_lv()?)?,
            }
        }
        Ok(())
    }

    fn rename(&mut self, device: &Device, from: String, to: String) {
        let description = describe::rename(device, &from, &to);
        self.push(device.sid(), ActionKind::Rename { from, to }, description);
    }

    fn resize(
        &mut self,
        device: &Device,
        from: ByteCount,
        to: ByteCount,
    ) -> Result<(), PlanError> {
        let Some(direction) = ResizeDirection::between(from, to) else {
            return Ok(());
        };
        let description = describe::resize(self.rhs, device, direction, from, to)?;
        self.push(
            device.sid(),
            ActionKind::Resize {
                direction,
                from,
                to,
            },
            description,
        );
        Ok(())
    }

    /// Resizes a partition or logical volume together with the devices that
    /// live on it and keep their identity.
    fn resize_blk(
        &mut self,
        device: &Device,
        from: ByteCount,
        to: ByteCount,
    ) -> Result<(), PlanError> {
        let Some(direction) = ResizeDirection::between(from, to) else {
            return Ok(());
        };
        self.resize(device, from, to)?;

        let blk = device.sid();
        for child in self.rhs.children(blk)? {
            // New devices are created at the new size
            if !self.lhs.device_exists(child) {
                continue;
            }
            let user = self.rhs.find_device(child)?;
            match user {
                Device::BlkFilesystem(fs) => {
                    if self.rhs.blk_devices_of(fs.sid)?.len() > 1 {
                        return Err(PlanError::Unplannable {
                            reason: format!(
                                "Resizing {} below the multi-device {} is not supported",
                                device.display_name(),
                                fs.fs_type
                            ),
                            sids: vec![blk, fs.sid],
                        });
                    }
                    match direction {
                        ResizeDirection::Grow if !fs.fs_type.can_grow() => {
                            return Err(unplannable(
                                fs.sid,
                                format!("{} cannot be grown", fs.fs_type),
                            ))
                        }
                        ResizeDirection::Shrink if !fs.fs_type.can_shrink() => {
                            return Err(unplannable(
                                fs.sid,
                                format!("{} cannot be shrunk", fs.fs_type),
                            ))
                        }
                        _ => self.resize(user, from, to)?,
                    }
                }
                Device::LvmPv(_) => self.resize(user, from, to)?,
                other => {
                    return Err(PlanError::Unplannable {
                        reason: format!(
                            "Resizing {} below the {} is not supported",
                            device.display_name(),
                            describe::subject(self.rhs, other)?
                        ),
                        sids: vec![blk, other.sid()],
                    })
                }
            }
        }
        Ok(())
    }

    fn partition(
        &mut self,
        device: &Device,
        a: &Partition,
        b: &Partition,
    ) -> Result<(), PlanError> {
        if a.region.start != b.region.start || a.region.block_size != b.region.block_size {
            return Err(unplannable(
                a.sid,
                format!("Moving the start of partition {} is not supported", a.name),
            ));
        }
        if a.partition_type != b.partition_type {
            return Err(unplannable(
                a.sid,
                format!(
                    "Changing partition {} from {} to {} is not supported",
                    a.name, a.partition_type, b.partition_type
                ),
            ));
        }

        if a.name != b.name {
            self.rename(device, a.name.clone(), b.name.clone());
        }
        self.resize_blk(device, a.size(), b.size())?;
        if a.id != b.id {
            self.push(
                a.sid,
                ActionKind::SetPartitionId {
                    from: a.id,
                    to: b.id,
                },
                format!("Set id of partition {} to {}", b.name, b.id),
            );
        }
        Ok(())
    }

    /// The size of a filesystem follows its block device, see
    /// [`Differ::resize_blk`].
    fn filesystem(
        &mut self,
        device: &Device,
        a: &BlkFilesystem,
        b: &BlkFilesystem,
    ) -> Result<(), PlanError> {
        if a.fs_type != b.fs_type {
            return Err(unplannable(
                a.sid,
                format!(
                    "Changing a filesystem from {} to {} is not supported",
                    a.fs_type, b.fs_type
                ),
            ));
        }
        if a.uuid != b.uuid {
            return Err(unplannable(
                a.sid,
                format!(
                    "Changing the uuid of {} is not supported",
                    describe::subject(self.lhs, device)?
                ),
            ));
        }

        if a.label != b.label {
            if !a.fs_type.supports_label() {
                return Err(unplannable(
                    a.sid,
                    format!("The label of {} cannot be changed", a.fs_type),
                ));
            }
            let description = format!(
                "Set label of {} to '{}'",
                describe::subject(self.rhs, device)?,
                b.label
            );
            self.push(
                a.sid,
                ActionKind::SetLabel {
                    from: a.label.clone(),
                    to: b.label.clone(),
                },
                description,
            );
        }
        Ok(())
    }

    fn mount_point(
        &mut self,
        device: &Device,
        a: &MountPoint,
        b: &MountPoint,
    ) -> Result<(), PlanError> {
        if a.options != b.options {
            return Err(unplannable(
                a.sid,
                format!(
                    "Changing the options of mount point {} is not supported",
                    a.path.display()
                ),
            ));
        }
        if a.path != b.path {
            self.rename(
                device,
                a.path.display().to_string(),
                b.path.display().to_string(),
            );
        }
        Ok(())
    }

    fn md(&mut self, device: &Device, a: &Md, b: &Md) -> Result<(), PlanError> {
        if a.level != b.level {
            return Err(unplannable(
                a.sid,
                format!(
                    "Changing {} from {} to {} is not supported",
                    a.name, a.level, b.level
                ),
            ));
        }
        if a.chunk_size != b.chunk_size {
            return Err(unplannable(
                a.sid,
                format!("Changing the chunk size of {} is not supported", a.name),
            ));
        }
        if a.name != b.name {
            self.rename(device, a.name.clone(), b.name.clone());
        }
        Ok(())
    }

    fn vg(&mut self, device: &Device, a: &LvmVg, b: &LvmVg) -> Result<(), PlanError> {
        if a.extent_size != b.extent_size {
            return Err(unplannable(
                a.sid,
                format!("Changing the extent size of {} is not supported", a.vg_name),
            ));
        }
        if a.uuid != b.uuid {
            return Err(unplannable(
                a.sid,
                format!("Changing the uuid of {} is not supported", a.vg_name),
            ));
        }
        if a.vg_name != b.vg_name {
            self.rename(device, a.vg_name.clone(), b.vg_name.clone());
        }
        Ok(())
    }

    fn lv(&mut self, device: &Device, a: &LvmLv, b: &LvmLv) -> Result<(), PlanError> {
        if a.stripes != b.stripes {
            return Err(unplannable(
                a.sid,
                format!("Changing the stripes of {} is not supported", a.name),
            ));
        }
        if a.lv_name != b.lv_name {
            self.rename(device, a.name.clone(), b.name.clone());
        }
        self.resize_blk(device, a.size(), b.size())
    }
}

#[cfg(test)]
mod tests {
    use devicegraph::{IdentityRegistry, Region};
    use sysdefs::{
        filesystems::FsType,
        partition_types::{PartitionId, PartitionType, PtType},
        raid::MdLevel,
    };

    use super::*;

    fn disk_with_partition(registry: &IdentityRegistry) -> (Devicegraph, Sid, Sid) {
        let mut graph = Devicegraph::new(registry);
        let sda = graph.create_disk("/dev/sda", ByteCount::from_gib(16)).unwrap();
        let gpt = graph.create_partition_table(sda, PtType::Gpt).unwrap();
        let sda1 = graph
            .create_partition(
                gpt,
                "/dev/sda1",
                Region::new(2048, 2097152, 512),
                PartitionType::Primary,
            )
            .unwrap();
        (graph, sda, sda1)
    }

    fn kinds(actions: &[Action]) -> Vec<(Sid, &'static str)> {
        actions.iter().map(|a| (a.sid(), a.kind().tag())).collect()
    }

    #[test]
    fn test_identical() {
        let registry = IdentityRegistry::new();
        let (graph, _, _) = disk_with_partition(&registry);
        assert!(compare(&graph, &graph.copy(), TargetMode::Direct)
            .unwrap()
            .is_empty());
    }

    #[test]
    fn test_emission_order() {
        let registry = IdentityRegistry::new();
        let (lhs, _, sda1) = disk_with_partition(&registry);
        let mut rhs = lhs.copy();
        rhs.resize(sda1, ByteCount::from_gib(2)).unwrap();
        rhs.set_partition_id(sda1, PartitionId::LVM).unwrap();
        let ext4 = rhs.create_blk_filesystem(sda1, FsType::Ext4).unwrap();

        let actions = compare(&lhs, &rhs, TargetMode::Direct).unwrap();
        assert_eq!(
            kinds(&actions),
            vec![
                (ext4, "create"),
                (sda1, "resize"),
                (sda1, "set-partition-id")
            ]
        );
        assert_eq!(
            actions[1].description(),
            "Grow partition /dev/sda1 from 1.00 GiB to 2.00 GiB"
        );
        assert_eq!(actions[2].description(), "Set id of partition /dev/sda1 to 0x8e");
    }

    #[test]
    fn test_filesystem_changes() {
        let registry = IdentityRegistry::new();
        let (mut lhs, _, sda1) = disk_with_partition(&registry);
        let xfs = lhs.create_blk_filesystem(sda1, FsType::Xfs).unwrap();

        let mut rhs = lhs.copy();
        rhs.set_label(xfs, "data").unwrap();
        rhs.resize(sda1, ByteCount::from_gib(4)).unwrap();
        let actions = compare(&lhs, &rhs, TargetMode::Direct).unwrap();
        assert_eq!(
            kinds(&actions),
            vec![(sda1, "resize"), (xfs, "resize"), (xfs, "set-label")]
        );
        assert_eq!(actions[2].description(), "Set label of xfs on /dev/sda1 to 'data'");

        let mut rhs = lhs.copy();
        rhs.resize(sda1, ByteCount::from_mib(512)).unwrap();
        let error = compare(&lhs, &rhs, TargetMode::Direct).unwrap_err();
        assert_eq!(error.sids(), vec![xfs]);
    }

    #[test]
    fn test_unsupported_transitions() {
        let registry = IdentityRegistry::new();
        let (lhs, sda, sda1) = disk_with_partition(&registry);

        let mut rhs = lhs.copy();
        let sdb = rhs.create_disk("/dev/sdb", ByteCount::from_gib(1)).unwrap();
        let error = compare(&lhs, &rhs, TargetMode::Direct).unwrap_err();
        assert_eq!(error.sids(), vec![sdb]);
        let actions = compare(&lhs, &rhs, TargetMode::Image).unwrap();
        assert_eq!(kinds(&actions), vec![(sdb, "create")]);
        assert_eq!(actions[0].description(), "Create disk image /dev/sdb (1.00 GiB)");

        let mut rhs = lhs.copy();
        rhs.find_device_mut(sda1)
            .unwrap()
            .to_partition_mut()
            .unwrap()
            .region
            .start = 4096;
        assert_eq!(
            compare(&lhs, &rhs, TargetMode::Direct).unwrap_err().sids(),
            vec![sda1]
        );

        let mut rhs = lhs.copy();
        rhs.resize(sda, ByteCount::from_gib(32)).unwrap();
        assert_eq!(
            compare(&lhs, &rhs, TargetMode::Direct).unwrap_err().sids(),
            vec![sda]
        );

        let mut lhs = lhs;
        let ext4 = lhs.create_blk_filesystem(sda1, FsType::Ext4).unwrap();
        let mut rhs = lhs.copy();
        rhs.find_device_mut(ext4)
            .unwrap()
            .to_blk_filesystem_mut()
            .unwrap()
            .fs_type = FsType::Btrfs;
        assert_eq!(
            compare(&lhs, &rhs, TargetMode::Direct).unwrap_err().sids(),
            vec![ext4]
        );
    }

    #[test]
    fn test_reallot() {
        let registry = IdentityRegistry::new();
        let mut lhs = Devicegraph::new(&registry);
        let disks: Vec<Sid> = ["/dev/sdb", "/dev/sdc", "/dev/sdd"]
            .into_iter()
            .map(|name| lhs.create_disk(name, ByteCount::from_gib(8)).unwrap())
            .collect();
        let md0 = lhs.create_md("/dev/md0", MdLevel::Raid1).unwrap();
        lhs.md_add_device(md0, disks[0]).unwrap();
        lhs.md_add_device(md0, disks[1]).unwrap();

        let mut rhs = lhs.copy();
        rhs.md_remove_device(md0, disks[1]).unwrap();
        rhs.md_add_device(md0, disks[2]).unwrap();
        rhs.rename(md0, "/dev/md/data").unwrap();

        let actions = compare(&lhs, &rhs, TargetMode::Direct).unwrap();
        assert_eq!(
            kinds(&actions),
            vec![(md0, "reduce"), (md0, "rename"), (md0, "extend")]
        );
        assert_eq!(actions[0].kind().reallot(), Some((ReallotMode::Reduce, disks[1])));
        assert_eq!(actions[0].description(), "Remove /dev/sdc from RAID /dev/md0");
        assert_eq!(actions[1].description(), "Rename RAID /dev/md0 to /dev/md/data");
        assert_eq!(actions[2].description(), "Add /dev/sdd to RAID /dev/md/data");

        let mut lhs = lhs;
        lhs.md_add_device(md0, disks[2]).unwrap();
        let mut rhs = lhs.copy();
        rhs.set_md_user_flags(md0, disks[1], true, false).unwrap();
        let error = compare(&lhs, &rhs, TargetMode::Direct).unwrap_err();
        assert_eq!(error.sids(), vec![md0, disks[1]]);
    }

    #[test]
    fn test_physical_volume_follows_partition() {
        let registry = IdentityRegistry::new();
        let (mut lhs, _, sda1) = disk_with_partition(&registry);
        lhs.resize(sda1, ByteCount::from_gib(4)).unwrap();
        let vg = lhs.create_lvm_vg("system").unwrap();
        let pv = lhs.lvm_vg_add_pv(vg, sda1).unwrap();
        lhs.create_lvm_lv(vg, "root", ByteCount::from_gib(1)).unwrap();

        let mut rhs = lhs.copy();
        rhs.resize(sda1, ByteCount::from_gib(2)).unwrap();
        let actions = compare(&lhs, &rhs, TargetMode::Direct).unwrap();
        assert_eq!(kinds(&actions), vec![(sda1, "resize"), (pv, "resize")]);
        assert_eq!(
            actions[1].description(),
            "Shrink physical volume on /dev/sda1 from 4.00 GiB to 2.00 GiB"
        );
    }

    #[test]
    fn test_md_member_resize() {
        let registry = IdentityRegistry::new();
        let (mut lhs, _, sda1) = disk_with_partition(&registry);
        let md0 = lhs.create_md("/dev/md0", MdLevel::Raid1).unwrap();
        let sdb = lhs.create_disk("/dev/sdb", ByteCount::from_gib(1)).unwrap();
        lhs.md_add_device(md0, sda1).unwrap();
        lhs.md_add_device(md0, sdb).unwrap();

        let mut rhs = lhs.copy();
        rhs.resize(sda1, ByteCount::from_gib(2)).unwrap();
        let error = compare(&lhs, &rhs, TargetMode::Direct).unwrap_err();
        assert_eq!(error.sids(), vec![sda1, md0]);
    }

    fn unplannable_change(lhs: &Devicegraph, change: impl FnOnce(&mut Devicegraph)) -> Vec<Sid> {
        let mut rhs = lhs.copy();
        change(&mut rhs);
        compare(lhs, &rhs, TargetMode::Image).unwrap_err().sids()
    }

    #[test]
    fn test_unplannable_attributes() {
        let registry = IdentityRegistry::new();
        let (mut lhs, sda, sda1) = disk_with_partition(&registry);
        let gpt = lhs.children(sda).unwrap()[0];
        let ext4 = lhs.create_blk_filesystem(sda1, FsType::Ext4).unwrap();
        let mp = lhs.create_mount_point(ext4, "/data").unwrap();
        let sdb = lhs.create_disk("/dev/sdb", ByteCount::from_gib(8)).unwrap();
        let vg = lhs.create_lvm_vg("data").unwrap();
        let pv = lhs.lvm_vg_add_pv(vg, sdb).unwrap();

        let sids = unplannable_change(&lhs, |g| {
            g.find_device_mut(sdb).unwrap().to_disk_mut().unwrap().rotational = true;
        });
        assert_eq!(sids, vec![sdb]);
        let sids = unplannable_change(&lhs, |g| {
            g.find_device_mut(sdb).unwrap().to_disk_mut().unwrap().transport = Some("usb".into());
        });
        assert_eq!(sids, vec![sdb]);
        let sids = unplannable_change(&lhs, |g| {
            g.find_device_mut(gpt).unwrap().to_gpt_mut().unwrap().pmbr_boot = true;
        });
        assert_eq!(sids, vec![gpt]);
        let sids = unplannable_change(&lhs, |g| {
            let partition = g.find_device_mut(sda1).unwrap().to_partition_mut().unwrap();
            partition.region.block_size = 4096;
        });
        assert_eq!(sids, vec![sda1]);
        let sids = unplannable_change(&lhs, |g| {
            let fs = g.find_device_mut(ext4).unwrap().to_blk_filesystem_mut().unwrap();
            fs.uuid = "7f3c9a5e-0d1b-4c2a-9e8f-1a2b3c4d5e6f".into();
        });
        assert_eq!(sids, vec![ext4]);
        let sids = unplannable_change(&lhs, |g| {
            let mount_point = g.find_device_mut(mp).unwrap().to_mount_point_mut().unwrap();
            mount_point.options = vec!["ro".into()];
        });
        assert_eq!(sids, vec![mp]);
        let sids = unplannable_change(&lhs, |g| {
            g.find_device_mut(pv).unwrap().to_lvm_pv_mut().unwrap().uuid = "pv-uuid".into();
        });
        assert_eq!(sids, vec![pv]);
        let sids = unplannable_change(&lhs, |g| {
            g.find_device_mut(vg).unwrap().to_lvm_vg_mut().unwrap().uuid = "vg-uuid".into();
        });
        assert_eq!(sids, vec![vg]);
    }
}
