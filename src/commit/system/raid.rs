use std::path::PathBuf;

use anyhow::{bail, Error};
use log::debug;

use devicegraph::{Device, Devicegraph, Md, Sid};
use osutils::mdadm;

use crate::{
    actiongraph::{Action, ActionKind, ReallotMode},
    commit::CommitContext,
};

use super::{blk_path, unsupported};

/// Software RAID arrays, through mdadm.
#[derive(Debug, Default, Clone, Copy)]
pub struct Raid;

impl Raid {
    pub(super) fn run(&self, action: &Action, context: &CommitContext) -> Result<(), Error> {
        let graph = context.graph_for(action);
        let Device::Md(md) = context.device(action)? else {
            bail!("Sid {} is not a RAID", action.sid());
        };

        match action.kind() {
            ActionKind::Create => mdadm::create(
                &md.name,
                md.level,
                md.chunk_size.map(|chunk| chunk.bytes()),
                &members(graph, md.sid)?,
            ),
            ActionKind::Delete => {
                mdadm::stop(&md.name)?;
                for member in members(graph, md.sid)? {
                    mdadm::zero_superblock(member)?;
                }
                Ok(())
            }
            ActionKind::Rename { from, to } => {
                mdadm::stop(from)?;
                mdadm::assemble(to, &members(graph, md.sid)?)
            }
            ActionKind::Reallot { mode, device } => {
                let member = blk_path(graph, *device)?;
                match mode {
                    ReallotMode::Extend => {
                        mdadm::add(&md.name, &member)?;
                        if is_data_member(graph, md, *device)? {
                            grow(graph, md)?;
                        }
                        Ok(())
                    }
                    ReallotMode::Reduce => {
                        let was_data_member = is_data_member(graph, md, *device)?;
                        mdadm::fail(&md.name, &member)?;
                        mdadm::remove(&md.name, &member)?;
                        if was_data_member {
                            grow(context.rhs(), md)?;
                        }
                        mdadm::zero_superblock(&member)
                    }
                }
            }
            _ => unsupported(action),
        }
    }
}

fn members(graph: &Devicegraph, md: Sid) -> Result<Vec<PathBuf>, Error> {
    graph
        .md_devices(md)?
        .into_iter()
        .map(|member| blk_path(graph, member))
        .collect()
}

fn is_data_member(graph: &Devicegraph, md: &Md, member: Sid) -> Result<bool, Error> {
    Ok(graph
        .find_holder(member, md.sid)?
        .as_md_user()
        .map_or(true, |user| user.is_data_member()))
}

/// Sets the number of active devices of the array to what `graph` holds.
fn grow(graph: &Devicegraph, md: &Md) -> Result<(), Error> {
    let mut data_members = 0;
    for member in graph.md_devices(md.sid)? {
        if is_data_member(graph, md, member)? {
            data_members += 1;
        }
    }
    debug!("Array {} now has {data_members} data members", md.name);
    mdadm::grow(&md.name, data_members)
}
