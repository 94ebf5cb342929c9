use std::collections::{BTreeMap, BTreeSet, VecDeque};

use log::trace;
use petgraph::{
    stable_graph::{EdgeIndex, NodeIndex, StableDiGraph},
    visit::EdgeRef,
    Direction,
};

use crate::{
    devices::Device,
    error::DevicegraphError,
    holders::Holder,
    sid::{IdentityRegistry, Sid},
    types::DeviceKind,
};

/// The type of the graph used to store devices and holders.
pub(crate) type DevicePetgraph = StableDiGraph<Device, Holder>;

/// A holder together with the sids of the devices it connects.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HolderView<'a> {
    pub parent: Sid,
    pub child: Sid,
    pub holder: &'a Holder,
}

/// Container of devices and holders.
///
/// Devices are nodes and holders are edges of a petgraph `StableGraph`, so
/// indices survive removals. Two maps translate sids into those indices.
#[derive(Debug, Clone)]
pub struct Devicegraph {
    pub(crate) inner: DevicePetgraph,
    pub(crate) devices: BTreeMap<Sid, NodeIndex>,
    pub(crate) holders: BTreeMap<Sid, EdgeIndex>,
    registry: IdentityRegistry,
}

impl Devicegraph {
    pub fn new(registry: &IdentityRegistry) -> Self {
        Self {
            inner: DevicePetgraph::default(),
            devices: BTreeMap::new(),
            holders: BTreeMap::new(),
            registry: registry.clone(),
        }
    }

    /// Registry the sids of this graph are allocated from.
    pub fn registry(&self) -> &IdentityRegistry {
        &self.registry
    }

    /// Deep copy. Sids are preserved and the copy shares the registry.
    pub fn copy(&self) -> Self {
        self.clone()
    }

    pub fn is_empty(&self) -> bool {
        self.devices.is_empty()
    }

    pub fn num_devices(&self) -> usize {
        self.devices.len()
    }

    pub fn num_holders(&self) -> usize {
        self.holders.len()
    }

    pub fn device_exists(&self, sid: Sid) -> bool {
        self.devices.contains_key(&sid)
    }

    pub fn holder_exists(&self, sid: Sid) -> bool {
        self.holders.contains_key(&sid)
    }

    /// All devices, sorted by sid.
    pub fn devices(&self) -> impl Iterator<Item = &Device> + '_ {
        self.devices
            .values()
            .filter_map(|idx| self.inner.node_weight(*idx))
    }

    /// All holders, sorted by sid.
    pub fn holders(&self) -> impl Iterator<Item = HolderView<'_>> + '_ {
        self.holders.values().filter_map(|idx| self.view(*idx))
    }

    /// All devices of the given kind, sorted by sid.
    pub fn devices_of_kind(&self, kind: DeviceKind) -> Vec<&Device> {
        self.devices().filter(|d| d.kind() == kind).collect()
    }

    fn view(&self, idx: EdgeIndex) -> Option<HolderView<'_>> {
        let (source, target) = self.inner.edge_endpoints(idx)?;
        Some(HolderView {
            parent: self.inner.node_weight(source)?.sid(),
            child: self.inner.node_weight(target)?.sid(),
            holder: self.inner.edge_weight(idx)?,
        })
    }

    pub(crate) fn device_index(&self, sid: Sid) -> Result<NodeIndex, DevicegraphError> {
        self.devices
            .get(&sid)
            .copied()
            .ok_or(DevicegraphError::DeviceNotFound { sid })
    }

    fn holder_index(&self, parent: Sid, child: Sid) -> Result<EdgeIndex, DevicegraphError> {
        let not_found = DevicegraphError::HolderNotFound { parent, child };
        let source = self.device_index(parent).map_err(|_| not_found.clone())?;
        let target = self.device_index(child).map_err(|_| not_found.clone())?;
        self.inner.find_edge(source, target).ok_or(not_found)
    }

    pub fn find_device(&self, sid: Sid) -> Result<&Device, DevicegraphError> {
        self.devices
            .get(&sid)
            .and_then(|idx| self.inner.node_weight(*idx))
            .ok_or(DevicegraphError::DeviceNotFound { sid })
    }

    pub fn find_device_mut(&mut self, sid: Sid) -> Result<&mut Device, DevicegraphError> {
        let idx = self.device_index(sid)?;
        self.inner
            .node_weight_mut(idx)
            .ok_or(DevicegraphError::DeviceNotFound { sid })
    }

    /// Finds the holder going from `parent` to `child`.
    pub fn find_holder(&self, parent: Sid, child: Sid) -> Result<&Holder, DevicegraphError> {
        let idx = self.holder_index(parent, child)?;
        self.inner
            .edge_weight(idx)
            .ok_or(DevicegraphError::HolderNotFound { parent, child })
    }

    pub fn find_holder_mut(
        &mut self,
        parent: Sid,
        child: Sid,
    ) -> Result<&mut Holder, DevicegraphError> {
        let idx = self.holder_index(parent, child)?;
        self.inner
            .edge_weight_mut(idx)
            .ok_or(DevicegraphError::HolderNotFound { parent, child })
    }

    pub fn find_holder_by_sid(&self, sid: Sid) -> Result<HolderView<'_>, DevicegraphError> {
        self.holders
            .get(&sid)
            .and_then(|idx| self.view(*idx))
            .ok_or(DevicegraphError::HolderNotFoundBySid { sid })
    }

    /// Finds a block device by its kernel name, or a volume group by its name.
    pub fn find_by_name(&self, name: &str) -> Result<&Device, DevicegraphError> {
        self.devices()
            .find(|device| match device {
                Device::LvmVg(vg) => vg.vg_name == name,
                other => other.as_blk_device().is_some_and(|blk| blk.name() == name),
            })
            .ok_or_else(|| DevicegraphError::DeviceNotFoundByName {
                name: name.to_string(),
            })
    }

    fn neighbors(&self, sid: Sid, direction: Direction) -> Result<Vec<Sid>, DevicegraphError> {
        let idx = self.device_index(sid)?;
        let mut sids: Vec<Sid> = self
            .inner
            .neighbors_directed(idx, direction)
            .map(|n| self.inner[n].sid())
            .collect();
        sids.sort();
        sids.dedup();
        Ok(sids)
    }

    /// Direct children, sorted by sid.
    pub fn children(&self, sid: Sid) -> Result<Vec<Sid>, DevicegraphError> {
        self.neighbors(sid, Direction::Outgoing)
    }

    /// Direct parents, sorted by sid.
    pub fn parents(&self, sid: Sid) -> Result<Vec<Sid>, DevicegraphError> {
        self.neighbors(sid, Direction::Incoming)
    }

    fn edges(&self, sid: Sid, direction: Direction) -> Result<Vec<HolderView<'_>>, DevicegraphError> {
        let idx = self.device_index(sid)?;
        let mut views: Vec<HolderView> = self
            .inner
            .edges_directed(idx, direction)
            .filter_map(|edge| self.view(edge.id()))
            .collect();
        views.sort_by_key(|view| view.holder.sid());
        Ok(views)
    }

    /// Holders going out of the device, sorted by holder sid.
    pub fn out_holders(&self, sid: Sid) -> Result<Vec<HolderView<'_>>, DevicegraphError> {
        self.edges(sid, Direction::Outgoing)
    }

    /// Holders going into the device, sorted by holder sid.
    pub fn in_holders(&self, sid: Sid) -> Result<Vec<HolderView<'_>>, DevicegraphError> {
        self.edges(sid, Direction::Incoming)
    }

    /// Breadth first walk from `sid`. Inactive holders are only followed when
    /// `inactive` is set. The start device is not part of the result.
    fn walk(
        &self,
        sid: Sid,
        direction: Direction,
        inactive: bool,
    ) -> Result<Vec<Sid>, DevicegraphError> {
        let start = self.device_index(sid)?;
        let mut seen = BTreeSet::new();
        let mut queue = VecDeque::from([start]);

        while let Some(idx) = queue.pop_front() {
            for edge in self.inner.edges_directed(idx, direction) {
                if !inactive && !edge.weight().is_active() {
                    continue;
                }

                let next = match direction {
                    Direction::Outgoing => edge.target(),
                    Direction::Incoming => edge.source(),
                };

                if seen.insert(self.inner[next].sid()) {
                    queue.push_back(next);
                }
            }
        }

        seen.remove(&sid);
        Ok(seen.into_iter().collect())
    }

    /// All devices reachable through outgoing holders, sorted by sid.
    pub fn descendants(&self, sid: Sid, inactive: bool) -> Result<Vec<Sid>, DevicegraphError> {
        self.walk(sid, Direction::Outgoing, inactive)
    }

    /// All devices reachable through incoming holders, sorted by sid.
    pub fn ancestors(&self, sid: Sid, inactive: bool) -> Result<Vec<Sid>, DevicegraphError> {
        self.walk(sid, Direction::Incoming, inactive)
    }

    /// Other children of the parents of the device.
    pub fn siblings(&self, sid: Sid) -> Result<Vec<Sid>, DevicegraphError> {
        let mut siblings = BTreeSet::new();
        for parent in self.parents(sid)? {
            siblings.extend(self.children(parent)?);
        }
        siblings.remove(&sid);
        Ok(siblings.into_iter().collect())
    }

    fn has_active_edges(&self, sid: Sid, direction: Direction, inactive: bool) -> bool {
        self.devices.get(&sid).is_some_and(|idx| {
            self.inner
                .edges_directed(*idx, direction)
                .any(|edge| inactive || edge.weight().is_active())
        })
    }

    /// Descendants without children of their own.
    pub fn leaves(&self, sid: Sid, inactive: bool) -> Result<Vec<Sid>, DevicegraphError> {
        Ok(self
            .descendants(sid, inactive)?
            .into_iter()
            .filter(|d| !self.has_active_edges(*d, Direction::Outgoing, inactive))
            .collect())
    }

    /// Ancestors without parents of their own.
    pub fn roots(&self, sid: Sid, inactive: bool) -> Result<Vec<Sid>, DevicegraphError> {
        Ok(self
            .ancestors(sid, inactive)?
            .into_iter()
            .filter(|a| !self.has_active_edges(*a, Direction::Incoming, inactive))
            .collect())
    }

    fn ensure_sid_unused(&self, sid: Sid) -> Result<(), DevicegraphError> {
        if self.devices.contains_key(&sid) || self.holders.contains_key(&sid) {
            return Err(DevicegraphError::DuplicateSid { sid });
        }
        Ok(())
    }

    /// Fails if another block device or volume group already uses `name`.
    pub(crate) fn ensure_name_unused(&self, name: &str) -> Result<(), DevicegraphError> {
        match self.find_by_name(name) {
            Ok(_) => Err(DevicegraphError::DuplicateName {
                name: name.to_string(),
            }),
            Err(_) => Ok(()),
        }
    }

    /// Fails if the device already has children.
    pub(crate) fn ensure_unused(&self, sid: Sid) -> Result<(), DevicegraphError> {
        if self.children(sid)?.is_empty() {
            Ok(())
        } else {
            Err(DevicegraphError::DeviceInUse { sid })
        }
    }

    /// Inserts a device that carries a sid not yet used in this graph.
    pub fn add_device(&mut self, device: Device) -> Result<Sid, DevicegraphError> {
        let sid = device.sid();
        self.ensure_sid_unused(sid)?;

        trace!("Adding device {} ({})", sid, device.kind());
        let idx = self.inner.add_node(device);
        self.devices.insert(sid, idx);
        Ok(sid)
    }

    /// Inserts a holder between two existing devices. At most one holder may
    /// connect the same pair.
    pub fn add_holder(
        &mut self,
        parent: Sid,
        child: Sid,
        holder: Holder,
    ) -> Result<Sid, DevicegraphError> {
        let sid = holder.sid();
        self.ensure_sid_unused(sid)?;
        let source = self.device_index(parent)?;
        let target = self.device_index(child)?;
        if parent == child {
            return Err(DevicegraphError::invalid(
                parent,
                "a device cannot hold itself",
            ));
        }
        if self.inner.find_edge(source, target).is_some() {
            return Err(DevicegraphError::invalid(
                child,
                format!("device {parent} already holds device {child}"),
            ));
        }

        trace!("Adding holder {} ({}) from {} to {}", sid, holder.kind(), parent, child);
        let idx = self.inner.add_edge(source, target, holder);
        self.holders.insert(sid, idx);
        Ok(sid)
    }

    /// Inserts a new device below `parent`. Everything is validated before
    /// the graph is touched.
    pub(crate) fn attach_new(
        &mut self,
        parent: Sid,
        device: Device,
        holder: Holder,
    ) -> Result<Sid, DevicegraphError> {
        self.device_index(parent)?;
        self.ensure_sid_unused(device.sid())?;
        self.ensure_sid_unused(holder.sid())?;
        if device.sid() == holder.sid() {
            return Err(DevicegraphError::DuplicateSid { sid: device.sid() });
        }

        let sid = self.add_device(device)?;
        self.add_holder(parent, sid, holder)?;
        Ok(sid)
    }

    /// Removes the device together with all holders attached to it.
    pub fn remove_device(&mut self, sid: Sid) -> Result<(), DevicegraphError> {
        let idx = self.device_index(sid)?;
        let holder_sids: Vec<Sid> = self
            .inner
            .edges_directed(idx, Direction::Outgoing)
            .chain(self.inner.edges_directed(idx, Direction::Incoming))
            .map(|edge| edge.weight().sid())
            .collect();

        trace!("Removing device {sid} and holders {holder_sids:?}");
        for holder_sid in holder_sids {
            self.holders.remove(&holder_sid);
        }
        self.inner.remove_node(idx);
        self.devices.remove(&sid);
        Ok(())
    }

    /// Removes all descendants of the device, following inactive holders too.
    pub fn remove_descendants(&mut self, sid: Sid) -> Result<(), DevicegraphError> {
        for descendant in self.descendants(sid, true)? {
            if self.device_exists(descendant) {
                self.remove_device(descendant)?;
            }
        }
        Ok(())
    }

    pub fn remove_holder(&mut self, sid: Sid) -> Result<(), DevicegraphError> {
        let idx = self
            .holders
            .remove(&sid)
            .ok_or(DevicegraphError::HolderNotFoundBySid { sid })?;
        self.inner.remove_edge(idx);
        Ok(())
    }

    pub fn set_holder_active(&mut self, sid: Sid, active: bool) -> Result<(), DevicegraphError> {
        let idx = self
            .holders
            .get(&sid)
            .copied()
            .ok_or(DevicegraphError::HolderNotFoundBySid { sid })?;
        self.inner
            .edge_weight_mut(idx)
            .ok_or(DevicegraphError::HolderNotFoundBySid { sid })?
            .set_active(active);
        Ok(())
    }
}

impl PartialEq for Devicegraph {
    /// Same sids with equal devices and equal holders.
    fn eq(&self, other: &Self) -> bool {
        self.num_devices() == other.num_devices()
            && self.num_holders() == other.num_holders()
            && self.devices().eq(other.devices())
            && self.holders().eq(other.holders())
    }
}

impl Eq for Devicegraph {}

#[cfg(test)]
mod tests {
    use sysdefs::{
        filesystems::FsType,
        partition_types::{PartitionType, PtType},
    };

    use super::*;
    use crate::bytes::{ByteCount, Region};

    /// sda with a GPT, sda1 carrying ext4 mounted on /home and sda2 with swap.
    fn sample_graph() -> (Devicegraph, BTreeMap<&'static str, Sid>) {
        let registry = IdentityRegistry::new();
        let mut graph = Devicegraph::new(&registry);
        let sda = graph.create_disk("/dev/sda", ByteCount::from_gib(16)).unwrap();
        let gpt = graph.create_partition_table(sda, PtType::Gpt).unwrap();
        let sda1 = graph
            .create_partition(
                gpt,
                "/dev/sda1",
                Region::new(2048, 16 * 1024 * 1024, 512),
                PartitionType::Primary,
            )
            .unwrap();
        let sda2 = graph
            .create_partition(
                gpt,
                "/dev/sda2",
                Region::new(16 * 1024 * 1024 + 2048, 2 * 1024 * 1024, 512),
                PartitionType::Primary,
            )
            .unwrap();
        let ext4 = graph.create_blk_filesystem(sda1, FsType::Ext4).unwrap();
        let home = graph.create_mount_point(ext4, "/home").unwrap();
        let swap = graph.create_blk_filesystem(sda2, FsType::Swap).unwrap();

        let sids = maplit::btreemap! {
            "sda" => sda,
            "gpt" => gpt,
            "sda1" => sda1,
            "sda2" => sda2,
            "ext4" => ext4,
            "home" => home,
            "swap" => swap,
        };
        (graph, sids)
    }

    #[test]
    fn test_scenario() {
        let (graph, sids) = sample_graph();
        assert_eq!(graph.num_devices(), 7);
        assert_eq!(graph.num_holders(), 6);
        graph.check_consistency().unwrap();

        let names: Vec<&str> = graph
            .partitions(sids["gpt"])
            .unwrap()
            .into_iter()
            .map(|p| p.name.as_str())
            .collect();
        assert_eq!(names, vec!["/dev/sda1", "/dev/sda2"]);

        let mut expected = vec![
            sids["gpt"],
            sids["sda1"],
            sids["sda2"],
            sids["ext4"],
            sids["home"],
            sids["swap"],
        ];
        expected.sort();
        assert_eq!(graph.descendants(sids["sda"], false).unwrap(), expected);

        assert_eq!(
            graph.ancestors(sids["home"], false).unwrap(),
            vec![sids["sda"], sids["gpt"], sids["sda1"], sids["ext4"]]
        );
        assert_eq!(graph.siblings(sids["sda1"]).unwrap(), vec![sids["sda2"]]);
        assert_eq!(
            graph.leaves(sids["sda"], false).unwrap(),
            vec![sids["home"], sids["swap"]]
        );
        assert_eq!(graph.roots(sids["swap"], false).unwrap(), vec![sids["sda"]]);
    }

    #[test]
    fn test_find() {
        let (graph, sids) = sample_graph();

        let holder = graph.find_holder(sids["sda"], sids["gpt"]).unwrap();
        assert!(holder.is_user());
        assert!(holder.is_plain_user());
        assert!(graph.find_holder(sids["gpt"], sids["sda1"]).unwrap().is_subdevice());

        assert_eq!(
            graph.find_holder(sids["sda"], sids["sda1"]),
            Err(DevicegraphError::HolderNotFound {
                parent: sids["sda"],
                child: sids["sda1"]
            })
        );
        assert_eq!(
            graph.find_device(Sid(1000)),
            Err(DevicegraphError::DeviceNotFound { sid: Sid(1000) })
        );
        assert_eq!(
            graph.find_by_name("/dev/sdz").unwrap_err(),
            DevicegraphError::DeviceNotFoundByName {
                name: "/dev/sdz".into()
            }
        );

        let view = graph.find_holder_by_sid(holder.sid()).unwrap();
        assert_eq!((view.parent, view.child), (sids["sda"], sids["gpt"]));
        assert_eq!(graph.devices_of_kind(DeviceKind::BlkFilesystem).len(), 2);
    }

    #[test]
    fn test_inactive_holders() {
        let (mut graph, sids) = sample_graph();
        let holder = graph.find_holder(sids["ext4"], sids["home"]).unwrap().sid();
        graph.set_holder_active(holder, false).unwrap();

        assert!(!graph
            .descendants(sids["sda1"], false)
            .unwrap()
            .contains(&sids["home"]));
        assert!(graph
            .descendants(sids["sda1"], true)
            .unwrap()
            .contains(&sids["home"]));
        assert_eq!(graph.children(sids["ext4"]).unwrap(), vec![sids["home"]]);
    }

    #[test]
    fn test_copy_preserves_sids() {
        let (graph, sids) = sample_graph();
        let mut copy = graph.copy();
        assert_eq!(graph, copy);
        assert!(copy.registry().is_same(graph.registry()));

        for device in graph.devices() {
            assert_eq!(copy.find_device(device.sid()).unwrap(), device);
        }

        copy.remove_device(sids["home"]).unwrap();
        assert_ne!(graph, copy);
        assert!(graph.device_exists(sids["home"]));

        // New sids in the copy never clash with the original
        let sdb = copy.create_disk("/dev/sdb", ByteCount::from_gib(1)).unwrap();
        assert!(!graph.device_exists(sdb));
        assert!(!graph.holder_exists(sdb));
    }

    #[test]
    fn test_remove() {
        let (mut graph, sids) = sample_graph();
        graph.remove_descendants(sids["gpt"]).unwrap();
        assert_eq!(graph.num_devices(), 2);
        assert_eq!(graph.num_holders(), 1);
        graph.check_consistency().unwrap();

        graph.remove_device(sids["sda"]).unwrap();
        assert_eq!(graph.num_devices(), 1);
        assert_eq!(graph.num_holders(), 0);
        assert_eq!(
            graph.remove_device(sids["sda"]),
            Err(DevicegraphError::DeviceNotFound { sid: sids["sda"] })
        );
    }

    #[test]
    fn test_add_holder_checks() {
        let (mut graph, sids) = sample_graph();
        let holder = Holder::from(crate::holders::User::new(graph.registry().allocate()));
        assert!(matches!(
            graph.add_holder(sids["sda"], sids["gpt"], holder.clone()),
            Err(DevicegraphError::InvalidOperation { .. })
        ));
        assert!(matches!(
            graph.add_holder(sids["sda"], sids["sda"], holder.clone()),
            Err(DevicegraphError::InvalidOperation { .. })
        ));
        assert_eq!(
            graph.add_holder(sids["sda"], Sid(999), holder),
            Err(DevicegraphError::DeviceNotFound { sid: Sid(999) })
        );

        let duplicate = Holder::from(crate::holders::User::new(sids["sda"]));
        assert_eq!(
            graph.add_holder(sids["sda2"], sids["home"], duplicate),
            Err(DevicegraphError::DuplicateSid { sid: sids["sda"] })
        );
    }
}
