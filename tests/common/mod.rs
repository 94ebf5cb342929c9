//! A simulated machine: tools that apply each action to the devices of the
//! machine and a prober that reports the state the machine ended up in.

use std::sync::{Arc, Mutex};

use anyhow::anyhow;
use serde_yaml::Value;
use strum::IntoEnumIterator;

use devicegraph::{Device, Devicegraph, DevicegraphError, IdentityRegistry};
use storagectl::{
    actiongraph::{Action, ActionKind, ReallotMode},
    commit::{CommitContext, DeviceTool, ToolError, ToolKind, ToolSet},
    probe::{ProbeError, Prober},
};

#[derive(Debug)]
struct Machine {
    /// The devices as they are now, with the sids of the last probe.
    devices: Devicegraph,
    fail_on: Option<String>,
    log: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct FakeSystem {
    machine: Arc<Mutex<Machine>>,
}

impl FakeSystem {
    pub fn new(devices: &Devicegraph) -> Self {
        Self {
            machine: Arc::new(Mutex::new(Machine {
                devices: devices.copy(),
                fail_on: None,
                log: Vec::new(),
            })),
        }
    }

    /// Makes every action whose description contains `needle` fail.
    pub fn fail_on(&self, needle: &str) {
        self.machine.lock().unwrap().fail_on = Some(needle.into());
    }

    /// Descriptions of all actions applied so far.
    pub fn log(&self) -> Vec<String> {
        self.machine.lock().unwrap().log.clone()
    }

    pub fn tools(&self) -> ToolSet {
        ToolKind::iter().fold(ToolSet::new(), |tools, kind| {
            tools.with_tool(
                kind,
                Box::new(FakeTool {
                    kind,
                    system: self.clone(),
                }),
            )
        })
    }

    pub fn prober(&self) -> Box<dyn Prober> {
        Box::new(FakeProber {
            system: self.clone(),
        })
    }
}

/// Carries out a single action on the devices of the machine. Everything
/// the action does not say is taken from the target devicegraph, the way a
/// real tool takes it from the system.
fn apply(
    devices: &mut Devicegraph,
    action: &Action,
    context: &CommitContext,
) -> Result<(), DevicegraphError> {
    let sid = action.sid();
    let target = context.rhs();
    match action.kind() {
        ActionKind::Create => {
            devices.add_device(target.find_device(sid)?.clone())?;
            for view in target.in_holders(sid)? {
                devices.add_holder(view.parent, view.child, view.holder.clone())?;
            }
            Ok(())
        }
        ActionKind::Delete => devices.remove_device(sid),
        ActionKind::Resize { to, .. } => match devices.find_device(sid)? {
            // Filesystems and physical volumes span their block device
            Device::BlkFilesystem(_) | Device::LvmPv(_) => Ok(()),
            _ => devices.resize(sid, *to),
        },
        ActionKind::Rename { .. } => match target.find_device(sid)? {
            Device::Partition(partition) => {
                devices.find_device_mut(sid)?.to_partition_mut()?.name = partition.name.clone();
                Ok(())
            }
            Device::LvmLv(lv) => devices.rename(sid, lv.lv_name.clone()),
            Device::LvmVg(vg) => devices.rename(sid, vg.vg_name.clone()),
            Device::MountPoint(mp) => devices.rename(sid, mp.path.display().to_string()),
            Device::Md(md) => devices.rename(sid, md.name.clone()),
            other => devices.rename(sid, other.display_name()),
        },
        ActionKind::SetPartitionId { to, .. } => devices.set_partition_id(sid, *to),
        ActionKind::SetLabel { to, .. } => devices.set_label(sid, to.clone()),
        ActionKind::Reallot { mode, device } => {
            match mode {
                ReallotMode::Extend => {
                    let holder = target.find_holder(*device, sid)?.clone();
                    devices.add_holder(*device, sid, holder)?;
                }
                ReallotMode::Reduce => {
                    let holder = devices.find_holder(*device, sid)?.sid();
                    devices.remove_holder(holder)?;
                }
            }
            // The kernel works out the size of the array on its own
            if devices.find_device(sid)?.is_md() {
                if let Ok(wanted) = target.find_device(sid).and_then(Device::to_md) {
                    let md = devices.find_device_mut(sid)?.to_md_mut()?;
                    md.region = wanted.region;
                    md.raid_devices = wanted.raid_devices;
                }
            }
            Ok(())
        }
    }
}

struct FakeTool {
    kind: ToolKind,
    system: FakeSystem,
}

impl DeviceTool for FakeTool {
    fn apply(&self, action: &Action, context: &CommitContext) -> Result<(), ToolError> {
        let mut machine = self.system.machine.lock().unwrap();
        if machine
            .fail_on
            .as_deref()
            .is_some_and(|needle| action.description().contains(needle))
        {
            return Err(ToolError::new(
                self.kind,
                action.sid(),
                anyhow!("device is busy"),
            ));
        }

        apply(&mut machine.devices, action, context)
            .map_err(|error| ToolError::new(self.kind, action.sid(), error.into()))?;
        machine.log.push(action.description().to_string());
        Ok(())
    }
}

struct FakeProber {
    system: FakeSystem,
}

impl Prober for FakeProber {
    fn probe(&self, registry: &IdentityRegistry) -> Result<Devicegraph, ProbeError> {
        let mut machine = self.system.machine.lock().unwrap();

        // A real probe knows nothing about earlier sids
        let mut devices: Value = serde_yaml::from_str(&machine.devices.to_yaml()?).unwrap();
        shift_sids(&mut devices, registry.peek().0.into());
        let yaml = serde_yaml::to_string(&devices).unwrap();
        let probed = Devicegraph::from_yaml(&yaml, registry)?;

        machine.devices = probed.copy();
        Ok(probed)
    }
}

fn shift_sids(value: &mut Value, offset: u64) {
    match value {
        Value::Mapping(mapping) => {
            for (key, value) in mapping.iter_mut() {
                match (key.as_str(), value.as_u64()) {
                    (Some("sid" | "parent" | "child"), Some(sid)) => {
                        *value = Value::from(sid + offset)
                    }
                    _ => shift_sids(value, offset),
                }
            }
        }
        Value::Sequence(sequence) => sequence.iter_mut().for_each(|v| shift_sids(v, offset)),
        _ => {}
    }
}
