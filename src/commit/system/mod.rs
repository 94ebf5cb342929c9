//! Tools that change the block devices of the running system through the
//! `osutils` wrappers.

use std::path::PathBuf;

use anyhow::{bail, Error};

use devicegraph::{Devicegraph, Sid};

use crate::actiongraph::Action;

use super::{CommitContext, DeviceTool, ToolError, ToolKind};

mod filesystem;
mod lvm;
mod mount;
mod partitioning;
mod raid;

pub use filesystem::Filesystems;
pub use lvm::VolumeManager;
pub use mount::Mounts;
pub use partitioning::Partitioning;
pub use raid::Raid;

/// Kernel name of a block device.
fn blk_path(graph: &Devicegraph, sid: Sid) -> Result<PathBuf, Error> {
    Ok(PathBuf::from(graph.find_device(sid)?.to_blk_device()?.name()))
}

/// The single block device below `sid`, e.g. the device of a filesystem.
fn blk_parent(graph: &Devicegraph, sid: Sid) -> Result<PathBuf, Error> {
    match graph.parents(sid)?[..] {
        [parent] => blk_path(graph, parent),
        _ => bail!("Device {sid} does not sit on exactly one block device"),
    }
}

fn unsupported(action: &Action) -> Result<(), Error> {
    bail!("Action '{action}' is not supported by this tool")
}

macro_rules! system_tool {
    ($tool:ident, $kind:expr) => {
        impl DeviceTool for $tool {
            fn apply(&self, action: &Action, context: &CommitContext) -> Result<(), ToolError> {
                self.run(action, context)
                    .map_err(|e| ToolError::new($kind, action.sid(), e))
            }
        }
    };
}

system_tool!(Partitioning, ToolKind::Partitioning);
system_tool!(Filesystems, ToolKind::Filesystem);
system_tool!(Mounts, ToolKind::Mount);
system_tool!(Raid, ToolKind::Raid);
system_tool!(VolumeManager, ToolKind::VolumeManager);
