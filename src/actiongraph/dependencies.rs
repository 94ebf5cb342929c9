//! Ordering constraints between actions.
//!
//! An edge `a -> b` means that `a` has to run before `b`. Edges are derived
//! from the structure of both devicegraphs: devices are built bottom up and
//! torn down top down, resources are freed before they are used again, and a
//! name is released before it is claimed by another device.

use std::collections::BTreeMap;

use log::trace;
use petgraph::graph::{DiGraph, NodeIndex};
use strum_macros::Display;

use devicegraph::{Device, Devicegraph, DevicegraphError, Sid};

use super::action::{Action, ActionKind, ReallotMode, ResizeDirection};

/// Why an action has to wait for another.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
#[strum(serialize_all = "kebab-case")]
pub enum Reason {
    SameDevice,
    Parent,
    Child,
    FreeBeforeUse,
    Reallot,
    Resize,
    PartitionTable,
    VolumeGroup,
    Unmount,
    Name,
    Rename,
}

pub(super) type ActionPetgraph = DiGraph<Action, Reason>;

type Edge = (NodeIndex, NodeIndex, Reason);

/// Builds the dependency graph over `actions`. Node indices follow the order
/// of `actions`.
pub(super) fn build(
    actions: Vec<Action>,
    lhs: &Devicegraph,
    rhs: &Devicegraph,
) -> Result<ActionPetgraph, DevicegraphError> {
    let mut graph = ActionPetgraph::new();
    for action in actions {
        graph.add_node(action);
    }

    let edges = Dependencies::new(lhs, rhs, &graph).edges()?;
    for (from, to, reason) in edges {
        if from != to {
            graph.update_edge(from, to, reason);
        }
    }

    trace!(
        "Built dependency graph with {} actions and {} dependencies",
        graph.node_count(),
        graph.edge_count()
    );
    Ok(graph)
}

/// Namespaces in which devices claim names.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
enum Namespace {
    BlkDevice,
    VolumeGroup,
    MountPoint,
}

fn claimed_name(device: &Device) -> Option<(Namespace, String)> {
    match device {
        Device::LvmVg(vg) => Some((Namespace::VolumeGroup, vg.vg_name.clone())),
        Device::MountPoint(mp) => Some((Namespace::MountPoint, mp.path.display().to_string())),
        other => other
            .as_blk_device()
            .map(|blk| (Namespace::BlkDevice, blk.name().to_string())),
    }
}

struct Dependencies<'a> {
    lhs: &'a Devicegraph,
    rhs: &'a Devicegraph,
    actions: &'a ActionPetgraph,

    /// Actions by their primary sid, in emission order.
    by_sid: BTreeMap<Sid, Vec<NodeIndex>>,
}

impl<'a> Dependencies<'a> {
    fn new(lhs: &'a Devicegraph, rhs: &'a Devicegraph, actions: &'a ActionPetgraph) -> Self {
        let mut by_sid: BTreeMap<Sid, Vec<NodeIndex>> = BTreeMap::new();
        for idx in actions.node_indices() {
            by_sid.entry(actions[idx].sid()).or_default().push(idx);
        }
        Self {
            lhs,
            rhs,
            actions,
            by_sid,
        }
    }

    fn on(&self, sid: Sid) -> &[NodeIndex] {
        self.by_sid.get(&sid).map(Vec::as_slice).unwrap_or_default()
    }

    fn find(&self, sid: Sid, filter: impl Fn(&ActionKind) -> bool) -> Option<NodeIndex> {
        self.on(sid)
            .iter()
            .copied()
            .find(|idx| filter(self.actions[*idx].kind()))
    }

    fn delete_of(&self, sid: Sid) -> Option<NodeIndex> {
        self.find(sid, ActionKind::is_delete)
    }

    fn create_of(&self, sid: Sid) -> Option<NodeIndex> {
        self.find(sid, ActionKind::is_create)
    }

    fn resize_of(&self, sid: Sid, direction: ResizeDirection) -> Option<NodeIndex> {
        self.find(sid, |kind| kind.resize_direction() == Some(direction))
    }

    fn reallots(&self, mode: ReallotMode) -> impl Iterator<Item = (NodeIndex, Sid)> + '_ {
        self.actions.node_indices().filter_map(move |idx| {
            let action = &self.actions[idx];
            match action.kind().reallot() {
                Some((m, device)) if m == mode => Some((idx, device)),
                _ => None,
            }
        })
    }

    fn edges(&self) -> Result<Vec<Edge>, DevicegraphError> {
        let mut edges = Vec::new();

        for nodes in self.by_sid.values() {
            for pair in nodes.windows(2) {
                edges.push((pair[0], pair[1], Reason::SameDevice));
            }
        }

        for idx in self.actions.node_indices() {
            let action = &self.actions[idx];
            match action.kind() {
                ActionKind::Create => self.create(idx, action.sid(), &mut edges)?,
                ActionKind::Delete => self.delete(idx, action.sid(), &mut edges)?,
                ActionKind::Reallot { mode, device } => {
                    self.reallot(idx, *mode, *device, &mut edges)
                }
                ActionKind::Resize { direction, .. } => {
                    self.resize(idx, action.sid(), *direction, &mut edges)?
                }
                ActionKind::Rename { .. } => self.rename(idx, action.sid(), &mut edges)?,
                ActionKind::SetPartitionId { .. } | ActionKind::SetLabel { .. } => {}
            }
        }

        self.free_before_use(&mut edges)?;
        self.partition_tables(&mut edges)?;
        self.volume_groups(&mut edges)?;
        self.names(&mut edges)?;
        Ok(edges)
    }

    /// A device is created after everything happened to its parents.
    fn create(
        &self,
        idx: NodeIndex,
        sid: Sid,
        edges: &mut Vec<Edge>,
    ) -> Result<(), DevicegraphError> {
        for parent in self.rhs.parents(sid)? {
            for before in self.on(parent) {
                edges.push((*before, idx, Reason::Parent));
            }
        }
        Ok(())
    }

    /// A device is deleted after its children. Unmounting precedes every
    /// action below the mount point.
    fn delete(
        &self,
        idx: NodeIndex,
        sid: Sid,
        edges: &mut Vec<Edge>,
    ) -> Result<(), DevicegraphError> {
        for child in self.lhs.children(sid)? {
            if let Some(before) = self.delete_of(child) {
                edges.push((before, idx, Reason::Child));
            }
        }

        if self.lhs.find_device(sid)?.is_mount_point() {
            for ancestor in self.lhs.ancestors(sid, true)? {
                for after in self.on(ancestor) {
                    edges.push((idx, *after, Reason::Unmount));
                }
            }
        }
        Ok(())
    }

    /// A device leaves an aggregate before anything else happens to it and
    /// joins one after everything else happened to it.
    fn reallot(&self, idx: NodeIndex, mode: ReallotMode, device: Sid, edges: &mut Vec<Edge>) {
        for other in self.on(device) {
            match mode {
                ReallotMode::Reduce => edges.push((idx, *other, Reason::Reallot)),
                ReallotMode::Extend => edges.push((*other, idx, Reason::Reallot)),
            }
        }
    }

    /// Shrinking goes top down, growing bottom up. Filesystems that are
    /// recreated to change their size always follow their block device.
    fn resize(
        &self,
        idx: NodeIndex,
        sid: Sid,
        direction: ResizeDirection,
        edges: &mut Vec<Edge>,
    ) -> Result<(), DevicegraphError> {
        let direction = match self.rhs.find_device(sid)? {
            Device::BlkFilesystem(fs) if fs.fs_type.resizes_by_recreating() => {
                ResizeDirection::Grow
            }
            _ => direction,
        };
        for parent in self.rhs.parents(sid)? {
            for parent_resize in self
                .on(parent)
                .iter()
                .filter(|p| self.actions[**p].kind().resize_direction().is_some())
            {
                match direction {
                    ResizeDirection::Shrink => edges.push((idx, *parent_resize, Reason::Resize)),
                    ResizeDirection::Grow => edges.push((*parent_resize, idx, Reason::Resize)),
                }
            }
        }
        Ok(())
    }

    /// Devices below a renamed device are deleted before the rename, and
    /// surviving ones are modified after it, under the new name.
    fn rename(
        &self,
        idx: NodeIndex,
        sid: Sid,
        edges: &mut Vec<Edge>,
    ) -> Result<(), DevicegraphError> {
        for descendant in self.lhs.descendants(sid, true)? {
            if let Some(before) = self.delete_of(descendant) {
                edges.push((before, idx, Reason::Rename));
            }
        }
        for descendant in self.rhs.descendants(sid, true)? {
            if !self.lhs.device_exists(descendant) {
                continue;
            }
            for after in self.on(descendant) {
                edges.push((idx, *after, Reason::Rename));
            }
        }
        Ok(())
    }

    /// For every device in both graphs, whatever releases it (deleting its
    /// old children, leaving an aggregate) precedes whatever takes it up
    /// again (creating new children, joining an aggregate).
    fn free_before_use(&self, edges: &mut Vec<Edge>) -> Result<(), DevicegraphError> {
        let reduces: Vec<(NodeIndex, Sid)> = self.reallots(ReallotMode::Reduce).collect();
        let extends: Vec<(NodeIndex, Sid)> = self.reallots(ReallotMode::Extend).collect();

        for device in self.rhs.devices() {
            let sid = device.sid();
            if !self.lhs.device_exists(sid) {
                continue;
            }

            let mut freeing = Vec::new();
            for child in self.lhs.children(sid)? {
                freeing.extend(self.delete_of(child));
            }
            freeing.extend(reduces.iter().filter(|(_, d)| *d == sid).map(|(idx, _)| *idx));

            let mut using = Vec::new();
            for child in self.rhs.children(sid)? {
                using.extend(self.create_of(child));
            }
            using.extend(extends.iter().filter(|(_, d)| *d == sid).map(|(idx, _)| *idx));

            for before in &freeing {
                for after in &using {
                    edges.push((*before, *after, Reason::FreeBeforeUse));
                }
            }
        }
        Ok(())
    }

    /// Within a partition table, space is freed before it is taken. Deletes
    /// run from the highest partition number down and creates from the
    /// lowest up, so logical partitions keep their numbers. Renumbered
    /// partitions are renamed once the partitions below them are gone.
    fn partition_tables(&self, edges: &mut Vec<Edge>) -> Result<(), DevicegraphError> {
        let mut tables: Vec<Sid> = self
            .lhs
            .devices()
            .chain(self.rhs.devices())
            .filter(|device| device.is_partition_table())
            .map(Device::sid)
            .collect();
        tables.sort();
        tables.dedup();

        for table in tables {
            let mut deletes = Vec::new();
            let mut shrinks = Vec::new();
            if self.lhs.device_exists(table) {
                for partition in self.lhs.partitions(table)? {
                    if let Some(idx) = self.delete_of(partition.sid) {
                        deletes.push((partition.number(), idx));
                    }
                    shrinks.extend(self.resize_of(partition.sid, ResizeDirection::Shrink));
                }
            }

            let mut creates = Vec::new();
            let mut grows = Vec::new();
            let mut renames = Vec::new();
            if self.rhs.device_exists(table) {
                for partition in self.rhs.partitions(table)? {
                    if let Some(idx) = self.create_of(partition.sid) {
                        creates.push((partition.number(), idx));
                    }
                    grows.extend(self.resize_of(partition.sid, ResizeDirection::Grow));
                    renames.extend(self.find(partition.sid, ActionKind::is_rename));
                }
            }

            deletes.sort_by(|a, b| b.0.cmp(&a.0));
            creates.sort_by(|a, b| a.0.cmp(&b.0));
            for pair in deletes.windows(2) {
                edges.push((pair[0].1, pair[1].1, Reason::PartitionTable));
            }
            for pair in creates.windows(2) {
                edges.push((pair[0].1, pair[1].1, Reason::PartitionTable));
            }

            let freeing = deletes.iter().map(|(_, idx)| *idx).chain(shrinks);
            let using: Vec<NodeIndex> = creates.iter().map(|(_, idx)| *idx).chain(grows).collect();
            for before in freeing {
                for after in &using {
                    edges.push((before, *after, Reason::PartitionTable));
                }
            }
            for (_, before) in &deletes {
                for after in &renames {
                    edges.push((*before, *after, Reason::PartitionTable));
                }
            }
        }
        Ok(())
    }

    /// Within a volume group, logical volumes give back extents before
    /// physical volumes leave or shrink and before other logical volumes take
    /// extents. Physical volumes join or grow before logical volumes take
    /// extents.
    fn volume_groups(&self, edges: &mut Vec<Edge>) -> Result<(), DevicegraphError> {
        let mut groups: Vec<Sid> = self
            .lhs
            .devices()
            .chain(self.rhs.devices())
            .filter(|device| device.is_lvm_vg())
            .map(Device::sid)
            .collect();
        groups.sort();
        groups.dedup();

        for vg in groups {
            let mut freeing = Vec::new();
            let mut pv_shrinks = Vec::new();
            if self.lhs.device_exists(vg) {
                for lv in self.lhs.lvm_vg_lvs(vg)? {
                    freeing.extend(self.delete_of(lv));
                    freeing.extend(self.resize_of(lv, ResizeDirection::Shrink));
                }
                for pv in self.lhs.lvm_vg_pvs(vg)? {
                    pv_shrinks.extend(self.resize_of(pv, ResizeDirection::Shrink));
                }
            }

            let mut using = Vec::new();
            let mut pv_grows = Vec::new();
            if self.rhs.device_exists(vg) {
                for lv in self.rhs.lvm_vg_lvs(vg)? {
                    using.extend(self.create_of(lv));
                    using.extend(self.resize_of(lv, ResizeDirection::Grow));
                }
                for pv in self.rhs.lvm_vg_pvs(vg)? {
                    pv_grows.extend(self.resize_of(pv, ResizeDirection::Grow));
                }
            }

            for before in &freeing {
                for shrink in &pv_shrinks {
                    edges.push((*before, *shrink, Reason::VolumeGroup));
                }
            }
            for grow in &pv_grows {
                for after in &using {
                    edges.push((*grow, *after, Reason::VolumeGroup));
                }
            }

            let reallots: Vec<(NodeIndex, ReallotMode)> = self
                .on(vg)
                .iter()
                .filter_map(|idx| Some((*idx, self.actions[*idx].kind().reallot()?.0)))
                .collect();

            for before in &freeing {
                for after in &using {
                    edges.push((*before, *after, Reason::VolumeGroup));
                }
                for (reduce, _) in reallots.iter().filter(|(_, m)| *m == ReallotMode::Reduce) {
                    edges.push((*before, *reduce, Reason::VolumeGroup));
                }
            }
            for (extend, _) in reallots.iter().filter(|(_, m)| *m == ReallotMode::Extend) {
                for after in &using {
                    edges.push((*extend, *after, Reason::VolumeGroup));
                }
            }
        }
        Ok(())
    }

    /// A name is released (delete, rename away) before another device
    /// claims it (create, rename to).
    fn names(&self, edges: &mut Vec<Edge>) -> Result<(), DevicegraphError> {
        let mut released: Vec<(Namespace, String, Sid, NodeIndex)> = Vec::new();
        let mut claimed: Vec<(Namespace, String, Sid, NodeIndex)> = Vec::new();

        for idx in self.actions.node_indices() {
            let action = &self.actions[idx];
            let sid = action.sid();
            match action.kind() {
                ActionKind::Delete => {
                    if let Some((ns, name)) = claimed_name(self.lhs.find_device(sid)?) {
                        released.push((ns, name, sid, idx));
                    }
                }
                ActionKind::Create => {
                    if let Some((ns, name)) = claimed_name(self.rhs.find_device(sid)?) {
                        claimed.push((ns, name, sid, idx));
                    }
                }
                ActionKind::Rename { from, to } => {
                    if let Some((ns, _)) = claimed_name(self.rhs.find_device(sid)?) {
                        released.push((ns, from.clone(), sid, idx));
                        claimed.push((ns, to.clone(), sid, idx));
                    }
                }
                _ => {}
            }
        }

        for (ns, name, sid, before) in &released {
            for (_, _, _, after) in claimed
                .iter()
                .filter(|(n, c, s, _)| n == ns && c == name && s != sid)
            {
                edges.push((*before, *after, Reason::Name));
            }
        }
        Ok(())
    }
}
