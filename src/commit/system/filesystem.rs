use anyhow::{bail, Error};

use devicegraph::Device;
use osutils::{label, mkfs, mkswap, resize, wipefs};
use sysdefs::filesystems::FsType;

use crate::{
    actiongraph::{Action, ActionKind},
    commit::CommitContext,
};

use super::{blk_parent, unsupported};

/// Block filesystems and swap.
#[derive(Debug, Default, Clone, Copy)]
pub struct Filesystems;

impl Filesystems {
    pub(super) fn run(&self, action: &Action, context: &CommitContext) -> Result<(), Error> {
        let graph = context.graph_for(action);
        let Device::BlkFilesystem(filesystem) = context.device(action)? else {
            bail!("Sid {} is not a filesystem", action.sid());
        };
        let device = blk_parent(graph, filesystem.sid)?;

        match action.kind() {
            ActionKind::Create if filesystem.fs_type == FsType::Swap => {
                mkswap::run(&device, &filesystem.label)
            }
            ActionKind::Create => mkfs::run(&device, filesystem.fs_type, &filesystem.label),
            ActionKind::Delete => wipefs::all(&device),
            ActionKind::Resize { to, .. } => {
                resize::run(&device, filesystem.fs_type, to.bytes(), &filesystem.label)
            }
            ActionKind::SetLabel { to, .. } => label::set(&device, filesystem.fs_type, to),
            _ => unsupported(action),
        }
    }
}
