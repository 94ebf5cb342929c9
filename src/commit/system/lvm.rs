use std::path::PathBuf;

use anyhow::{bail, Error};

use devicegraph::{BlkDevice, Device, Devicegraph, LvmLv, LvmVg, Sid};
use osutils::lvm;

use crate::{
    actiongraph::{Action, ActionKind, ReallotMode},
    commit::CommitContext,
};

use super::{blk_parent, unsupported};

/// Physical volumes, volume groups and logical volumes, through the LVM
/// command line tools.
#[derive(Debug, Default, Clone, Copy)]
pub struct VolumeManager;

impl VolumeManager {
    pub(super) fn run(&self, action: &Action, context: &CommitContext) -> Result<(), Error> {
        let graph = context.graph_for(action);
        match context.device(action)? {
            Device::LvmPv(pv) => match action.kind() {
                ActionKind::Create => lvm::pvcreate(blk_parent(graph, pv.sid)?),
                ActionKind::Delete => lvm::pvremove(blk_parent(graph, pv.sid)?),
                ActionKind::Resize { to, .. } => {
                    lvm::pvresize(blk_parent(graph, pv.sid)?, to.bytes())
                }
                _ => unsupported(action),
            },
            Device::LvmVg(vg) => self.volume_group(action, graph, vg),
            Device::LvmLv(lv) => self.logical_volume(action, context, lv),
            other => bail!("A {} is not handled by the volume manager", other.kind()),
        }
    }

    fn volume_group(&self, action: &Action, graph: &Devicegraph, vg: &LvmVg) -> Result<(), Error> {
        match action.kind() {
            ActionKind::Create => {
                let devices = graph
                    .lvm_vg_pvs(vg.sid)?
                    .into_iter()
                    .map(|pv| blk_parent(graph, pv))
                    .collect::<Result<Vec<PathBuf>, Error>>()?;
                lvm::vgcreate(&vg.vg_name, vg.extent_size.bytes(), &devices)
            }
            ActionKind::Delete => lvm::vgremove(&vg.vg_name),
            ActionKind::Rename { from, to } => lvm::vgrename(from, to),
            ActionKind::Reallot { mode, device } => {
                let device = blk_parent(graph, *device)?;
                match mode {
                    ReallotMode::Extend => lvm::vgextend(&vg.vg_name, device),
                    ReallotMode::Reduce => lvm::vgreduce(&vg.vg_name, device),
                }
            }
            _ => unsupported(action),
        }
    }

    fn logical_volume(
        &self,
        action: &Action,
        context: &CommitContext,
        lv: &LvmLv,
    ) -> Result<(), Error> {
        let graph = context.graph_for(action);
        let vg_name = &vg_of(graph, lv.sid)?.vg_name;
        match action.kind() {
            ActionKind::Create => {
                lvm::lvcreate(vg_name, &lv.lv_name, lv.size().bytes(), lv.stripes.into())
            }
            ActionKind::Delete => lvm::lvremove(vg_name, &lv.lv_name),
            ActionKind::Resize { to, .. } => lvm::lvresize(vg_name, &lv.lv_name, to.bytes()),
            ActionKind::Rename { .. } => {
                let old = context.lhs().find_device(lv.sid)?.to_lvm_lv()?;
                lvm::lvrename(vg_name, &old.lv_name, &lv.lv_name)
            }
            _ => unsupported(action),
        }
    }
}

fn vg_of(graph: &Devicegraph, lv: Sid) -> Result<&LvmVg, Error> {
    match graph.parents(lv)?[..] {
        [vg] => Ok(graph.find_device(vg)?.to_lvm_vg()?),
        _ => bail!("Logical volume {lv} does not belong to exactly one volume group"),
    }
}
