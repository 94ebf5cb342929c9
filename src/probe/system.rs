//! Probing of the running system through lsblk, sfdisk, mdadm and the LVM
//! reports.

use std::collections::HashMap;

use anyhow::Error;
use log::{debug, info, warn};

use devicegraph::{
    ByteCount, Device, Devicegraph, DevicegraphError, IdentityRegistry, Region, Sid,
};
use osutils::{
    lsblk::{self, BlockDevice},
    lvm::{self, LvInfo, PvInfo, VgInfo},
    mdadm::{self, MdadmDetail},
    sfdisk::{SfDisk, SfDiskLabel, SfPartition},
};
use sysdefs::{
    filesystems::FsType,
    partition_types::{PartitionId, PartitionType, PtType},
};

use super::{ProbeError, Prober};

/// Ids of MBR partitions that hold logical partitions.
const EXTENDED_IDS: [PartitionId; 3] = [
    PartitionId::EXTENDED,
    PartitionId(0x0f),
    PartitionId(0x85),
];

/// Raw reports of the system tools, collected before anything is modelled.
#[derive(Debug, Default)]
pub struct SystemData {
    pub block_devices: Vec<BlockDevice>,
    pub partition_tables: Vec<SfDisk>,
    pub md_arrays: Vec<MdadmDetail>,
    pub pvs: Vec<PvInfo>,
    pub vgs: Vec<VgInfo>,
    pub lvs: Vec<LvInfo>,
}

impl SystemData {
    pub fn collect() -> Result<Self, Error> {
        let block_devices = lsblk::list()?;

        let mut partition_tables = Vec::new();
        let mut seen = Vec::new();
        for device in block_devices.iter().flat_map(BlockDevice::flatten) {
            if !(device.is_disk() || device.is_raid()) || seen.contains(&device.name) {
                continue;
            }
            seen.push(device.name.clone());
            // sfdisk fails on devices without a partition table
            match SfDisk::get_info(&device.name) {
                Ok(table) => partition_tables.push(table),
                Err(e) => debug!("No partition table on '{}': {e:#}", device.name),
            }
        }

        let md_arrays = mdadm::details()?;
        let (pvs, vgs, lvs) = match (lvm::pvs(), lvm::vgs(), lvm::lvs()) {
            (Ok(pvs), Ok(vgs), Ok(lvs)) => (pvs, vgs, lvs),
            (Err(e), _, _) | (_, Err(e), _) | (_, _, Err(e)) => {
                warn!("Skipping LVM, reports are not available: {e:#}");
                Default::default()
            }
        };

        Ok(Self {
            block_devices,
            partition_tables,
            md_arrays,
            pvs,
            vgs,
            lvs,
        })
    }
}

/// Probes the block devices of the running system.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemProber;

impl Prober for SystemProber {
    #[tracing::instrument(skip_all)]
    fn probe(&self, registry: &IdentityRegistry) -> Result<Devicegraph, ProbeError> {
        info!("Probing block devices");
        let data = SystemData::collect()?;
        build(&data, registry)
    }
}

/// Models `data` as a devicegraph with fresh sids from `registry`.
pub fn build(data: &SystemData, registry: &IdentityRegistry) -> Result<Devicegraph, ProbeError> {
    let mut builder = Builder {
        data,
        graph: Devicegraph::new(registry),
        sids: HashMap::new(),
    };

    builder.disks()?;
    builder.partitions()?;
    builder.md_arrays()?;
    // Partitions on MD arrays
    builder.partitions()?;
    builder.lvm()?;
    builder.filesystems()?;

    builder.graph.check_consistency()?;
    Ok(builder.graph)
}

struct Builder<'a> {
    data: &'a SystemData,
    graph: Devicegraph,
    /// Sids of the block devices, by every name they are known under.
    sids: HashMap<String, Sid>,
}

impl<'a> Builder<'a> {
    fn lsblk_devices(&self) -> impl Iterator<Item = &'a BlockDevice> {
        self.data.block_devices.iter().flat_map(BlockDevice::flatten)
    }

    fn disks(&mut self) -> Result<(), DevicegraphError> {
        let data = self.data;
        for device in data.block_devices.iter().filter(|d| d.is_disk()) {
            let block_size = device.logical_sector_size.unwrap_or(512);
            let region = Region::new(0, device.size / block_size, block_size);
            let sid = self.graph.create_disk_with_region(&device.name, region)?;

            let disk = self.graph.find_device_mut(sid)?.to_disk_mut()?;
            disk.rotational = device.rotational;
            disk.transport = device.transport.clone();

            debug!("Found disk '{}'", device.name);
            self.sids.insert(device.name.clone(), sid);
        }
        Ok(())
    }

    /// Adds the partition tables of all known devices that don't have one
    /// yet.
    fn partitions(&mut self) -> Result<(), DevicegraphError> {
        let data = self.data;
        for table in &data.partition_tables {
            let Some(&device) = self.sids.get(&table.device.to_string_lossy().to_string()) else {
                continue;
            };
            if !self.graph.children(device)?.is_empty() {
                continue;
            }

            let table_sid = self
                .graph
                .create_partition_table(device, PtType::from(table.label))?;
            for partition in &table.partitions {
                self.partition(table_sid, table, partition)?;
            }
        }
        Ok(())
    }

    fn partition(
        &mut self,
        table_sid: Sid,
        table: &SfDisk,
        partition: &SfPartition,
    ) -> Result<(), DevicegraphError> {
        let name = partition.node.to_string_lossy().to_string();
        let id = partition.partition_id(table.label);
        let partition_type = match table.label {
            SfDiskLabel::Gpt => PartitionType::Primary,
            SfDiskLabel::Mbr if partition.number > PtType::Msdos.max_primary() => {
                PartitionType::Logical
            }
            SfDiskLabel::Mbr if EXTENDED_IDS.contains(&id) => PartitionType::Extended,
            SfDiskLabel::Mbr => PartitionType::Primary,
        };

        let region = Region::new(partition.start, partition.size, table.sectorsize);
        let sid = self
            .graph
            .create_partition(table_sid, &name, region, partition_type)?;
        if !partition_type.is_extended() {
            self.graph.set_partition_id(sid, id)?;
        }

        debug!("Found {partition_type} partition '{name}'");
        self.sids.insert(name, sid);
        Ok(())
    }

    fn md_arrays(&mut self) -> Result<(), DevicegraphError> {
        let data = self.data;
        for detail in &data.md_arrays {
            let raid_path = detail.raid_path.to_string_lossy().to_string();
            let Some(level) = detail.md_level() else {
                warn!("Skipping RAID '{raid_path}' with unknown level '{}'", detail.level);
                continue;
            };

            // lsblk lists arrays under their kernel name, below each member
            let kernel_name = self
                .lsblk_devices()
                .find(|device| {
                    device.is_raid()
                        && device.parent_kernel_name.as_ref().is_some_and(|parent| {
                            detail
                                .devices
                                .iter()
                                .any(|member| member.as_os_str() == parent.as_str())
                        })
                })
                .map(|device| device.name.clone())
                .unwrap_or_else(|| raid_path.clone());

            let md = self.graph.create_md(&kernel_name, level)?;
            for member in &detail.devices {
                let member = member.to_string_lossy().to_string();
                match self.sids.get(&member) {
                    Some(&blk_device) => self.graph.md_add_device(md, blk_device)?,
                    None => warn!("RAID member '{member}' of '{raid_path}' is unknown"),
                }
            }

            if let Some(num_devices) = detail.num_devices {
                self.graph.find_device_mut(md)?.to_md_mut()?.raid_devices = Some(num_devices);
            }

            debug!("Found {level} '{kernel_name}'");
            self.sids.insert(raid_path, md);
            self.sids.insert(kernel_name, md);
        }
        Ok(())
    }

    fn lvm(&mut self) -> Result<(), DevicegraphError> {
        let data = self.data;
        let mut vgs = HashMap::new();
        for info in &data.vgs {
            let vg = self.graph.create_lvm_vg(&info.vg_name)?;
            let group = self.graph.find_device_mut(vg)?.to_lvm_vg_mut()?;
            group.extent_size = ByteCount(info.vg_extent_size);
            group.uuid = info.vg_uuid.clone();
            vgs.insert(info.vg_name.as_str(), vg);
        }

        for info in &data.pvs {
            let blk_name = info.pv_name.to_string_lossy().to_string();
            let (Some(&vg), Some(&blk_device)) =
                (vgs.get(info.vg_name.as_str()), self.sids.get(&blk_name))
            else {
                debug!("Skipping physical volume '{blk_name}' outside of a known volume group");
                continue;
            };
            let pv = self.graph.lvm_vg_add_pv(vg, blk_device)?;
            self.graph.find_device_mut(pv)?.to_lvm_pv_mut()?.uuid = info.pv_uuid.clone();
        }

        for info in &data.lvs {
            let Some(&vg) = vgs.get(info.vg_name.as_str()) else {
                warn!("Logical volume '{}' has no volume group", info.lv_name);
                continue;
            };
            let lv = self
                .graph
                .create_lvm_lv(vg, &info.lv_name, ByteCount(info.lv_size))?;
            let volume = self.graph.find_device_mut(lv)?.to_lvm_lv_mut()?;
            volume.stripes = u32::try_from(info.stripes).unwrap_or(1).max(1);

            self.sids.insert(volume.name.clone(), lv);
            self.sids
                .insert(mapper_name(&info.vg_name, &info.lv_name), lv);
        }
        Ok(())
    }

    fn filesystems(&mut self) -> Result<(), DevicegraphError> {
        for device in self.lsblk_devices() {
            let (Some(fs_type), Some(&blk_device)) =
                (device.fs_type.as_deref(), self.sids.get(&device.name))
            else {
                continue;
            };
            // Devices with several parents show up more than once
            if !self.graph.children(blk_device)?.is_empty() {
                continue;
            }
            let Ok(fs_type) = fs_type.parse::<FsType>() else {
                if !is_member_signature(fs_type) {
                    warn!("Skipping unknown filesystem '{fs_type}' on '{}'", device.name);
                }
                continue;
            };

            let filesystem = self.graph.create_blk_filesystem(blk_device, fs_type)?;
            if let Device::BlkFilesystem(fs) = self.graph.find_device_mut(filesystem)? {
                fs.label = device.label.clone().unwrap_or_default();
                fs.uuid = device.uuid.clone().unwrap_or_default();
            }

            if let Some(path) = device.mountpoint.as_deref().filter(|p| p.starts_with('/')) {
                if fs_type.is_mountable() {
                    self.graph.create_mount_point(filesystem, path)?;
                }
            }
            debug!("Found {fs_type} on '{}'", device.name);
        }
        Ok(())
    }
}

/// Signatures of devices that belong to an MD array or a volume group.
fn is_member_signature(fs_type: &str) -> bool {
    matches!(fs_type, "linux_raid_member" | "LVM2_member")
}

/// Name device-mapper gives a logical volume, with dashes doubled.
fn mapper_name(vg_name: &str, lv_name: &str) -> String {
    format!(
        "/dev/mapper/{}-{}",
        vg_name.replace('-', "--"),
        lv_name.replace('-', "--")
    )
}

#[cfg(test)]
mod tests {
    use indoc::indoc;

    use devicegraph::{BlkDevice, DeviceKind};

    use super::*;

    fn system_data() -> SystemData {
        let block_devices = lsblk::parse(indoc! {r#"
            {
               "blockdevices": [
                  {
                     "name": "/dev/sda", "type": "disk", "size": 17179869184,
                     "log-sec": 512, "rota": false, "tran": "nvme", "pkname": null,
                     "fstype": null, "label": null, "uuid": null, "mountpoint": null,
                     "children": [
                        {
                           "name": "/dev/sda1", "type": "part", "size": 536870912,
                           "log-sec": 512, "rota": false, "tran": null, "pkname": "/dev/sda",
                           "fstype": "vfat", "label": "ESP", "uuid": "84A0-088E",
                           "mountpoint": "/boot/efi"
                        },
                        {
                           "name": "/dev/sda2", "type": "part", "size": 8589934592,
                           "log-sec": 512, "rota": false, "tran": null, "pkname": "/dev/sda",
                           "fstype": "LVM2_member", "label": null, "uuid": "pv-uuid",
                           "mountpoint": null,
                           "children": [
                              {
                                 "name": "/dev/mapper/system-root", "type": "lvm",
                                 "size": 4294967296, "log-sec": 512, "rota": false,
                                 "tran": null, "pkname": "/dev/sda2", "fstype": "ext4",
                                 "label": "root", "uuid": "root-uuid", "mountpoint": "/"
                              },
                              {
                                 "name": "/dev/mapper/system-swap--space", "type": "lvm",
                                 "size": 1073741824, "log-sec": 512, "rota": false,
                                 "tran": null, "pkname": "/dev/sda2", "fstype": "swap",
                                 "label": null, "uuid": "swap-uuid", "mountpoint": "[SWAP]"
                              }
                           ]
                        }
                     ]
                  },
                  {
                     "name": "/dev/sdb", "type": "disk", "size": 1073741824,
                     "log-sec": 512, "rota": true, "tran": "sata", "pkname": null,
                     "fstype": "linux_raid_member", "label": null, "uuid": null,
                     "mountpoint": null,
                     "children": [
                        {
                           "name": "/dev/md127", "type": "raid1", "size": 1072693248,
                           "log-sec": 512, "rota": true, "tran": null, "pkname": "/dev/sdb",
                           "fstype": "xfs", "label": "data", "uuid": "data-uuid",
                           "mountpoint": "/data"
                        }
                     ]
                  },
                  {
                     "name": "/dev/sdc", "type": "disk", "size": 1073741824,
                     "log-sec": 512, "rota": true, "tran": "sata", "pkname": null,
                     "fstype": "linux_raid_member", "label": null, "uuid": null,
                     "mountpoint": null,
                     "children": [
                        {
                           "name": "/dev/md127", "type": "raid1", "size": 1072693248,
                           "log-sec": 512, "rota": true, "tran": null, "pkname": "/dev/sdc",
                           "fstype": "xfs", "label": "data", "uuid": "data-uuid",
                           "mountpoint": "/data"
                        }
                     ]
                  }
               ]
            }
        "#})
        .unwrap();

        let partition_tables = vec![SfDisk::from_json(indoc! {r#"
            {
               "partitiontable": {
                  "label": "gpt",
                  "id": "7B2A4F35-3B5C-4E59-9A4B-5D3A1C2E7F10",
                  "device": "/dev/sda",
                  "unit": "sectors",
                  "firstlba": 2048,
                  "lastlba": 33554398,
                  "sectorsize": 512,
                  "partitions": [
                     {
                        "node": "/dev/sda1", "start": 2048, "size": 1048576,
                        "type": "C12A7328-F81F-11D2-BA4B-00A0C93EC93B", "name": "esp"
                     },
                     {
                        "node": "/dev/sda2", "start": 1050624, "size": 16777216,
                        "type": "E6D6D379-F507-44C2-A23C-238F2A3DF928", "name": "system"
                     }
                  ]
               }
            }
        "#})
        .unwrap()];

        SystemData {
            block_devices,
            partition_tables,
            md_arrays: vec![MdadmDetail {
                raid_path: "/dev/md/data".into(),
                level: "raid1".into(),
                uuid: "ea381b70:20b2ab81:602edecb:cf6f2032".into(),
                num_devices: Some(2),
                devices: vec!["/dev/sdb".into(), "/dev/sdc".into()],
            }],
            pvs: vec![PvInfo {
                pv_name: "/dev/sda2".into(),
                vg_name: "system".into(),
                pv_uuid: "pv-uuid".into(),
            }],
            vgs: vec![VgInfo {
                vg_name: "system".into(),
                vg_uuid: "vg-uuid".into(),
                vg_extent_size: 4 << 20,
            }],
            lvs: vec![
                LvInfo {
                    lv_name: "root".into(),
                    vg_name: "system".into(),
                    lv_size: 4 << 30,
                    stripes: 1,
                },
                LvInfo {
                    lv_name: "swap-space".into(),
                    vg_name: "system".into(),
                    lv_size: 1 << 30,
                    stripes: 1,
                },
            ],
        }
    }

    #[test]
    fn test_build() {
        let registry = IdentityRegistry::new();
        let graph = build(&system_data(), &registry).unwrap();

        let sda = graph.find_by_name("/dev/sda").unwrap();
        assert!(sda.is_disk());
        assert_eq!(sda.to_disk().unwrap().transport.as_deref(), Some("nvme"));
        assert_eq!(sda.to_disk().unwrap().size(), ByteCount::from_gib(16));

        let table = graph.children(sda.sid()).unwrap()[0];
        assert_eq!(
            graph.find_device(table).unwrap().kind(),
            DeviceKind::Gpt
        );
        let partitions = graph.partitions(table).unwrap();
        assert_eq!(
            partitions.iter().map(|p| p.name.as_str()).collect::<Vec<_>>(),
            vec!["/dev/sda1", "/dev/sda2"]
        );
        assert_eq!(partitions[0].id, PartitionId::ESP);
        assert_eq!(partitions[1].id, PartitionId::LVM);
        assert_eq!(partitions[0].region, Region::new(2048, 1048576, 512));

        let esp = graph.filesystem_on(partitions[0].sid).unwrap().unwrap();
        let esp = graph.find_device(esp).unwrap().to_blk_filesystem().unwrap();
        assert_eq!(esp.fs_type, FsType::Vfat);
        assert_eq!(esp.label, "ESP");
        let mount_point = graph.mount_point_of(esp.sid).unwrap().unwrap();
        assert_eq!(
            graph.find_device(mount_point).unwrap().display_name(),
            "/boot/efi"
        );

        let md = graph.find_by_name("/dev/md127").unwrap();
        assert_eq!(
            graph.md_devices(md.sid()).unwrap(),
            vec![
                graph.find_by_name("/dev/sdb").unwrap().sid(),
                graph.find_by_name("/dev/sdc").unwrap().sid()
            ]
        );
        let data = graph.filesystem_on(md.sid()).unwrap().unwrap();
        assert_eq!(
            graph.find_device(data).unwrap().to_blk_filesystem().unwrap().fs_type,
            FsType::Xfs
        );

        let vg = graph.all_lvm_vgs()[0].sid;
        assert_eq!(graph.lvm_vg_pvs(vg).unwrap().len(), 1);
        let lvs = graph.lvm_vg_lvs(vg).unwrap();
        assert_eq!(lvs.len(), 2);

        let root = graph.find_by_name("/dev/system/root").unwrap();
        let root_fs = graph.filesystem_on(root.sid()).unwrap().unwrap();
        assert!(graph.mount_point_of(root_fs).unwrap().is_some());

        let swap = graph.find_by_name("/dev/system/swap-space").unwrap();
        let swap_fs = graph.filesystem_on(swap.sid()).unwrap().unwrap();
        assert!(graph.mount_point_of(swap_fs).unwrap().is_none());
    }

    #[test]
    fn test_fresh_sids() {
        let registry = IdentityRegistry::new();
        let first = build(&system_data(), &registry).unwrap();
        let second = build(&system_data(), &registry).unwrap();

        assert!(first.structurally_equal(&second));
        assert!(first.devices().all(|device| !second.device_exists(device.sid())));
    }

    #[test]
    fn test_degraded_raid() {
        let mut data = system_data();
        // sdc failed and is gone, md127 keeps running on sdb
        data.block_devices.pop();
        data.md_arrays[0].devices.pop();

        let registry = IdentityRegistry::new();
        let graph = build(&data, &registry).unwrap();
        let md = graph.find_by_name("/dev/md127").unwrap();
        assert_eq!(md.to_md().unwrap().raid_devices, Some(2));
        assert_eq!(
            graph.md_devices(md.sid()).unwrap(),
            vec![graph.find_by_name("/dev/sdb").unwrap().sid()]
        );
        assert!(graph.filesystem_on(md.sid()).unwrap().is_some());
    }

    #[test]
    fn test_unknown_filesystem() {
        let mut data = system_data();
        data.block_devices[0].children[0].fs_type = Some("zfs_member".into());

        let registry = IdentityRegistry::new();
        let graph = build(&data, &registry).unwrap();
        let sda1 = graph.find_by_name("/dev/sda1").unwrap();
        assert!(graph.children(sda1.sid()).unwrap().is_empty());
    }

    #[test]
    fn test_mapper_name() {
        assert_eq!(mapper_name("system", "root"), "/dev/mapper/system-root");
        assert_eq!(
            mapper_name("my-vg", "swap-space"),
            "/dev/mapper/my--vg-swap--space"
        );
    }
}
