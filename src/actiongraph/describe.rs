//! Human readable descriptions of actions.

use devicegraph::{BlkDevice, ByteCount, Device, Devicegraph, DevicegraphError, Sid};

use super::action::{format_size, ResizeDirection};

/// Names of the devices, joined by commas.
fn names(graph: &Devicegraph, sids: &[Sid]) -> Result<String, DevicegraphError> {
    let names = sids
        .iter()
        .map(|sid| member(graph, *sid))
        .collect::<Result<Vec<_>, DevicegraphError>>()?;
    Ok(names.join(", "))
}

fn parents(graph: &Devicegraph, sid: Sid) -> Result<String, DevicegraphError> {
    names(graph, &graph.parents(sid)?)
}

/// Name of a member of an aggregate. Physical volumes are named after the
/// block devices they live on.
pub(super) fn member(graph: &Devicegraph, sid: Sid) -> Result<String, DevicegraphError> {
    let device = graph.find_device(sid)?;
    if device.is_lvm_pv() {
        return parents(graph, sid);
    }
    Ok(device.display_name())
}

/// What the device is called in a sentence, e.g. `partition /dev/sda1`.
pub(super) fn subject(graph: &Devicegraph, device: &Device) -> Result<String, DevicegraphError> {
    Ok(match device {
        Device::Disk(disk) => format!("disk {}", disk.name),
        Device::Gpt(_) | Device::Msdos(_) => format!(
            "{} partition table on {}",
            device.display_name(),
            parents(graph, device.sid())?
        ),
        Device::Partition(partition) => format!("partition {}", partition.name),
        Device::BlkFilesystem(fs) => format!("{} on {}", fs.fs_type, parents(graph, fs.sid)?),
        Device::MountPoint(mp) => format!("mount point {}", mp.path.display()),
        Device::Md(md) => format!("RAID {}", md.name),
        Device::LvmPv(pv) => format!("physical volume on {}", parents(graph, pv.sid)?),
        Device::LvmVg(vg) => format!("volume group {}", vg.vg_name),
        Device::LvmLv(lv) => format!("logical volume {}", lv.name),
    })
}

pub(super) fn create(graph: &Devicegraph, device: &Device) -> Result<String, DevicegraphError> {
    Ok(match device {
        Device::Disk(disk) => format!(
            "Create disk image {} ({})",
            disk.name,
            format_size(disk.size())
        ),
        Device::Partition(partition) if !partition.partition_type.is_primary() => format!(
            "Create {} partition {} ({})",
            partition.partition_type,
            partition.name,
            format_size(partition.size())
        ),
        Device::Partition(partition) => format!(
            "Create partition {} ({})",
            partition.name,
            format_size(partition.size())
        ),
        Device::MountPoint(mp) => {
            let blk_devices = graph
                .parents(mp.sid)?
                .into_iter()
                .map(|fs| graph.parents(fs))
                .collect::<Result<Vec<_>, _>>()?
                .concat();
            format!(
                "Mount {} at {}",
                names(graph, &blk_devices)?,
                mp.path.display()
            )
        }
        Device::Md(md) => format!(
            "Create {} {} from {}",
            md.level,
            md.name,
            names(graph, &graph.md_devices(md.sid)?)?
        ),
        Device::LvmVg(vg) => format!(
            "Create volume group {} from {}",
            vg.vg_name,
            names(graph, &graph.lvm_vg_pvs(vg.sid)?)?
        ),
        Device::LvmLv(lv) => format!(
            "Create logical volume {} ({})",
            lv.name,
            format_size(lv.size())
        ),
        other => format!("Create {}", subject(graph, other)?),
    })
}

pub(super) fn delete(graph: &Devicegraph, device: &Device) -> Result<String, DevicegraphError> {
    Ok(match device {
        Device::Disk(disk) => format!("Delete disk image {}", disk.name),
        Device::MountPoint(mp) => format!("Unmount {}", mp.path.display()),
        Device::Md(md) => format!("Delete {} {}", md.level, md.name),
        other => format!("Delete {}", subject(graph, other)?),
    })
}

pub(super) fn rename(device: &Device, from: &str, to: &str) -> String {
    match device {
        Device::MountPoint(_) => format!("Move mount point {from} to {to}"),
        Device::Partition(_) => format!("Rename partition {from} to {to}"),
        Device::Md(_) => format!("Rename RAID {from} to {to}"),
        Device::LvmVg(_) => format!("Rename volume group {from} to {to}"),
        Device::LvmLv(_) => format!("Rename logical volume {from} to {to}"),
        _ => format!("Rename {from} to {to}"),
    }
}

pub(super) fn resize(
    graph: &Devicegraph,
    device: &Device,
    direction: ResizeDirection,
    from: ByteCount,
    to: ByteCount,
) -> Result<String, DevicegraphError> {
    let verb = match direction {
        ResizeDirection::Grow => "Grow",
        ResizeDirection::Shrink => "Shrink",
    };
    Ok(format!(
        "{verb} {} from {} to {}",
        subject(graph, device)?,
        format_size(from),
        format_size(to)
    ))
}
