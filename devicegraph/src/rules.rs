//! # Rule Declarations
//!
//! Per-kind rules that say which devices may hold which, and through which
//! holders. [`Devicegraph::check_consistency`] evaluates them, together with
//! the generic rules that apply to every graph (index integrity, unique sids
//! and acyclicity).

use log::trace;
use petgraph::{algo::tarjan_scc, visit::EdgeRef, Direction};

use crate::{
    cardinality::ValidCardinality,
    devices::Device,
    error::{format_sids, DevicegraphError, Violation, ViolationKind, Violations},
    graph::Devicegraph,
    sid::Sid,
    types::{BitFlagsBackingEnumVec, DeviceKind, DeviceKindFlag, HolderKind, HolderKindFlag},
};

/// This impl block contains the rules for the parents of each device kind
impl DeviceKind {
    /// Holders a device of this kind may be held through.
    pub fn valid_parent_holders(self) -> HolderKindFlag {
        match self {
            Self::Disk => HolderKindFlag::empty(),
            Self::Gpt | Self::Msdos | Self::MountPoint => HolderKindFlag::User,
            Self::Partition | Self::LvmVg | Self::LvmLv => HolderKindFlag::Subdevice,
            Self::BlkFilesystem => HolderKindFlag::FilesystemUser,
            Self::Md => HolderKindFlag::MdUser,
            Self::LvmPv => HolderKindFlag::LvmPvUser,
        }
    }

    /// Kinds the parents of a device of this kind may have.
    pub fn valid_parent_kinds(self) -> DeviceKindFlag {
        match self {
            Self::Disk => DeviceKindFlag::empty(),
            Self::Gpt | Self::Msdos => DeviceKindFlag::Partitionable,
            Self::Partition => DeviceKindFlag::PartitionTable,
            Self::BlkFilesystem | Self::Md | Self::LvmPv => DeviceKindFlag::BlkDevice,
            Self::MountPoint => DeviceKindFlag::BlkFilesystem,
            Self::LvmVg => DeviceKindFlag::LvmPv,
            Self::LvmLv => DeviceKindFlag::LvmVg,
        }
    }

    /// Number of parents a device of this kind must have.
    ///
    /// An MD array or a volume group is valid without members while it is
    /// being built. The minimum number of members of an MD array is checked
    /// separately.
    pub fn valid_parent_count(self) -> ValidCardinality {
        match self {
            Self::Disk => ValidCardinality::new_zero(),
            Self::Gpt
            | Self::Msdos
            | Self::Partition
            | Self::MountPoint
            | Self::LvmPv
            | Self::LvmLv => ValidCardinality::new_exact(1),
            Self::BlkFilesystem => ValidCardinality::new_at_least(1),
            Self::Md | Self::LvmVg => ValidCardinality::new_any(),
        }
    }

    /// Number of children a device of this kind may have.
    ///
    /// Block devices are used exclusively: a partition table, a filesystem,
    /// an MD array or a physical volume, never two of them.
    pub fn valid_child_count(self) -> ValidCardinality {
        match self {
            Self::Disk
            | Self::Partition
            | Self::Md
            | Self::LvmLv
            | Self::BlkFilesystem
            | Self::LvmPv => ValidCardinality::new_at_most(1),
            Self::MountPoint => ValidCardinality::new_zero(),
            Self::Gpt | Self::Msdos | Self::LvmVg => ValidCardinality::new_any(),
        }
    }
}

/// This impl block contains the rules for the endpoints of each holder kind
impl HolderKind {
    pub fn compatible_parents(self) -> DeviceKindFlag {
        match self {
            Self::User => DeviceKindFlag::Partitionable | DeviceKindFlag::BlkFilesystem,
            Self::Subdevice => {
                DeviceKindFlag::PartitionTable | DeviceKindFlag::LvmPv | DeviceKindFlag::LvmVg
            }
            Self::FilesystemUser | Self::MdUser | Self::LvmPvUser => DeviceKindFlag::BlkDevice,
        }
    }

    pub fn compatible_children(self) -> DeviceKindFlag {
        match self {
            Self::User => DeviceKindFlag::PartitionTable | DeviceKindFlag::MountPoint,
            Self::Subdevice => {
                DeviceKindFlag::Partition | DeviceKindFlag::LvmVg | DeviceKindFlag::LvmLv
            }
            Self::FilesystemUser => DeviceKindFlag::BlkFilesystem,
            Self::MdUser => DeviceKindFlag::Md,
            Self::LvmPvUser => DeviceKindFlag::LvmPv,
        }
    }
}

impl Devicegraph {
    /// Checks the graph against all rules and reports every violation found.
    pub fn check_consistency(&self) -> Result<(), DevicegraphError> {
        let mut violations = Vec::new();
        self.check_indices(&mut violations);
        self.check_holders(&mut violations);
        self.check_relatives(&mut violations);
        self.check_md_members(&mut violations);
        self.check_volume_groups(&mut violations);
        self.check_cycles(&mut violations);

        if violations.is_empty() {
            trace!(
                "Devicegraph with {} devices and {} holders is consistent",
                self.num_devices(),
                self.num_holders()
            );
            Ok(())
        } else {
            Err(DevicegraphError::Inconsistent(Violations(violations)))
        }
    }

    /// The sid maps and the petgraph must describe the same devices and
    /// holders, and no sid may be used twice.
    fn check_indices(&self, violations: &mut Vec<Violation>) {
        for (sid, idx) in &self.devices {
            match self.inner.node_weight(*idx) {
                Some(device) if device.sid() == *sid => {}
                Some(device) => violations.push(Violation::new(
                    ViolationKind::DanglingReference,
                    vec![*sid, device.sid()],
                    format!("sid {sid} maps to device {}", device.sid()),
                )),
                None => violations.push(Violation::new(
                    ViolationKind::DanglingReference,
                    vec![*sid],
                    format!("device {sid} is missing"),
                )),
            }
        }

        for (sid, idx) in &self.holders {
            match self.inner.edge_weight(*idx) {
                Some(holder) if holder.sid() == *sid => {}
                Some(holder) => violations.push(Violation::new(
                    ViolationKind::DanglingReference,
                    vec![*sid, holder.sid()],
                    format!("sid {sid} maps to holder {}", holder.sid()),
                )),
                None => violations.push(Violation::new(
                    ViolationKind::DanglingReference,
                    vec![*sid],
                    format!("holder {sid} is missing"),
                )),
            }

            if self.devices.contains_key(sid) {
                violations.push(Violation::new(
                    ViolationKind::DuplicateSid,
                    vec![*sid],
                    format!("sid {sid} is used by a device and a holder"),
                ));
            }
        }

        let unindexed: Vec<Sid> = self
            .inner
            .node_indices()
            .map(|idx| self.inner[idx].sid())
            .filter(|sid| !self.devices.contains_key(sid))
            .chain(
                self.inner
                    .edge_indices()
                    .map(|idx| self.inner[idx].sid())
                    .filter(|sid| !self.holders.contains_key(sid)),
            )
            .collect();
        if !unindexed.is_empty() {
            violations.push(Violation::new(
                ViolationKind::DanglingReference,
                unindexed.clone(),
                format!("sids {} are not indexed", format_sids(&unindexed)),
            ));
        }
    }

    /// Every holder must connect kinds it is compatible with.
    fn check_holders(&self, violations: &mut Vec<Violation>) {
        for view in self.holders() {
            let parent = self.find_device(view.parent);
            let child = self.find_device(view.child);
            let (Ok(parent), Ok(child)) = (parent, child) else {
                continue;
            };

            let holder_kind = view.holder.kind();
            let child_kind = child.kind();
            let parent_kind = parent.kind();

            if !holder_kind.compatible_children().contains(child_kind.as_flag())
                || !holder_kind.compatible_parents().contains(parent_kind.as_flag())
            {
                violations.push(Violation::new(
                    ViolationKind::IncompatibleHolder,
                    vec![view.holder.sid(), view.parent, view.child],
                    format!(
                        "a {holder_kind} holder cannot connect a {parent_kind} to a {child_kind}"
                    ),
                ));
            }
        }
    }

    /// Parents must have the expected kinds and count, children the expected
    /// count.
    fn check_relatives(&self, violations: &mut Vec<Violation>) {
        for (sid, idx) in &self.devices {
            let Some(device) = self.inner.node_weight(*idx) else {
                continue;
            };
            let kind = device.kind();

            let mut parents = 0;
            for edge in self.inner.edges_directed(*idx, Direction::Incoming) {
                parents += 1;
                let holder_kind = edge.weight().kind();
                let parent_kind = self.inner[edge.source()].kind();
                if !kind.valid_parent_holders().contains(holder_kind.as_flag())
                    || !kind.valid_parent_kinds().contains(parent_kind.as_flag())
                {
                    violations.push(Violation::new(
                        ViolationKind::InvalidParents,
                        vec![*sid, self.inner[edge.source()].sid()],
                        format!(
                            "a {kind} must be held by {} through {}, found {parent_kind} through {holder_kind}",
                            kind.valid_parent_kinds().user_readable(),
                            kind.valid_parent_holders().user_readable(),
                        ),
                    ));
                }
            }

            let parent_count = kind.valid_parent_count();
            if !parent_count.contains(parents) {
                violations.push(Violation::new(
                    ViolationKind::InvalidParents,
                    vec![*sid],
                    format!(
                        "a {kind} must have {parent_count} {}, found {parents}",
                        parent_count.pluralize("parent", "parents")
                    ),
                ));
            }

            let children = self
                .inner
                .edges_directed(*idx, Direction::Outgoing)
                .count();
            let child_count = kind.valid_child_count();
            if !child_count.contains(children) {
                violations.push(Violation::new(
                    ViolationKind::ExclusiveUse,
                    vec![*sid],
                    format!(
                        "a {kind} may have {child_count} {}, found {children}",
                        child_count.pluralize("child", "children")
                    ),
                ));
            }
        }
    }

    /// MD arrays need enough data members for their level once they have
    /// any member at all. An array found on the system may run degraded, as
    /// long as its level tolerates the missing members.
    fn check_md_members(&self, violations: &mut Vec<Violation>) {
        for md in self.devices().filter_map(Device::as_md) {
            let Ok(holders) = self.in_holders(md.sid) else {
                continue;
            };
            let members: Vec<Sid> = holders
                .iter()
                .filter(|view| {
                    view.holder
                        .as_md_user()
                        .is_some_and(|user| user.active && user.is_data_member())
                })
                .map(|view| view.parent)
                .collect();

            let required = match md.raid_devices {
                Some(raid_devices) => {
                    let raid_devices = raid_devices as usize;
                    raid_devices
                        .saturating_sub(md.level.max_missing(raid_devices))
                        .max(1)
                }
                None => md.level.min_devices(),
            };
            if !holders.is_empty() && members.len() < required {
                let mut sids = vec![md.sid];
                sids.extend(&members);
                violations.push(Violation::new(
                    ViolationKind::MdMembers,
                    sids,
                    format!(
                        "{} '{}' needs at least {required} active members, found {}",
                        md.level,
                        md.name,
                        members.len()
                    ),
                ));
            }
        }
    }

    /// The logical volumes of a volume group must fit into its physical
    /// volumes.
    fn check_volume_groups(&self, violations: &mut Vec<Violation>) {
        for vg in self.devices().filter_map(Device::as_lvm_vg) {
            let (Ok(size), Ok(used)) = (self.lvm_vg_size(vg.sid), self.lvm_vg_used(vg.sid)) else {
                continue;
            };
            if used > size {
                let mut sids = vec![vg.sid];
                sids.extend(self.lvm_vg_pvs(vg.sid).unwrap_or_default());
                violations.push(Violation::new(
                    ViolationKind::VolumeGroupSpace,
                    sids,
                    format!(
                        "volume group '{}' holds {used} of logical volumes in {size}",
                        vg.vg_name
                    ),
                ));
            }
        }
    }

    fn check_cycles(&self, violations: &mut Vec<Violation>) {
        for component in tarjan_scc(&self.inner) {
            let cyclic = component.len() > 1
                || component
                    .first()
                    .is_some_and(|idx| self.inner.find_edge(*idx, *idx).is_some());
            if !cyclic {
                continue;
            }

            let mut sids: Vec<Sid> = component.iter().map(|idx| self.inner[*idx].sid()).collect();
            sids.sort();
            violations.push(Violation::new(
                ViolationKind::Cycle,
                sids.clone(),
                format!("devices {} form a cycle", format_sids(&sids)),
            ));
        }
    }
}
