use std::path::Path;

use anyhow::{bail, Error};

use devicegraph::{Device, Devicegraph, MountPoint};
use osutils::mount;

use crate::{
    actiongraph::{Action, ActionKind},
    commit::CommitContext,
};

use super::{blk_parent, unsupported};

/// Mount points, through mount(8) and umount(8).
#[derive(Debug, Default, Clone, Copy)]
pub struct Mounts;

impl Mounts {
    pub(super) fn run(&self, action: &Action, context: &CommitContext) -> Result<(), Error> {
        let graph = context.graph_for(action);
        let Device::MountPoint(mount_point) = context.device(action)? else {
            bail!("Sid {} is not a mount point", action.sid());
        };

        match action.kind() {
            ActionKind::Create => mount_at(graph, mount_point, &mount_point.path),
            ActionKind::Delete => mount::umount(&mount_point.path),
            ActionKind::Rename { from, to } => {
                mount::umount(from)?;
                mount_at(graph, mount_point, Path::new(to))
            }
            _ => unsupported(action),
        }
    }
}

fn mount_at(graph: &Devicegraph, mount_point: &MountPoint, path: &Path) -> Result<(), Error> {
    let [filesystem] = graph.parents(mount_point.sid)?[..] else {
        bail!("Mount point {} has no filesystem", path.display());
    };
    let fs_type = graph.find_device(filesystem)?.to_blk_filesystem()?.fs_type;
    let device = blk_parent(graph, filesystem)?;

    mount::ensure_mount_directory(path)?;
    mount::mount(&device, path, fs_type, &mount_point.options)
}
