use std::process::Command;

use anyhow::{Context, Error};
use log::warn;
use serde::{Deserialize, Serialize};

use crate::exe::RunAndCheck;

/// Columns requested from lsblk.
const COLUMNS: &str = "NAME,TYPE,SIZE,LOG-SEC,ROTA,TRAN,PKNAME,FSTYPE,LABEL,UUID,MOUNTPOINT";

#[derive(Serialize, Deserialize, Debug, Default, Clone, PartialEq)]
struct LsBlkOutput {
    blockdevices: Vec<BlockDevice>,
}

#[derive(Serialize, Deserialize, Debug, Default, Clone, PartialEq)]
pub struct BlockDevice {
    /// Full path, e.g. `/dev/sda1`.
    pub name: String,

    /// `disk`, `part`, `lvm`, `raid1`, `loop`, ...
    #[serde(rename = "type")]
    pub device_type: String,

    pub size: u64,

    #[serde(rename = "log-sec", default)]
    pub logical_sector_size: Option<u64>,

    #[serde(rename = "rota", default)]
    pub rotational: bool,

    #[serde(rename = "tran", default)]
    pub transport: Option<String>,

    #[serde(rename = "pkname", default)]
    pub parent_kernel_name: Option<String>,

    #[serde(rename = "fstype", default)]
    pub fs_type: Option<String>,

    #[serde(default)]
    pub label: Option<String>,

    #[serde(default)]
    pub uuid: Option<String>,

    #[serde(default)]
    pub mountpoint: Option<String>,

    #[serde(default)]
    pub children: Vec<BlockDevice>,
}

impl BlockDevice {
    pub fn is_disk(&self) -> bool {
        self.device_type == "disk"
    }

    pub fn is_partition(&self) -> bool {
        self.device_type == "part"
    }

    pub fn is_lvm(&self) -> bool {
        self.device_type == "lvm"
    }

    /// MD arrays report their level as type, e.g. `raid5`.
    pub fn is_raid(&self) -> bool {
        self.device_type.starts_with("raid")
    }

    /// This device followed by all devices below it, depth first. Devices
    /// with several parents show up once per parent.
    pub fn flatten(&self) -> Vec<&BlockDevice> {
        let mut devices = vec![self];
        for child in &self.children {
            devices.extend(child.flatten());
        }
        devices
    }
}

/// Lists all block devices of the system as trees rooted at the disks.
pub fn list() -> Result<Vec<BlockDevice>, Error> {
    let output = Command::new("lsblk")
        .arg("--json")
        .arg("--paths")
        .arg("--bytes")
        .arg("--output")
        .arg(COLUMNS)
        .output_and_check()
        .context("Failed to execute lsblk")?;

    parse(&output).map_err(|e| {
        warn!("lsblk output: {output}");
        e
    })
}

pub fn parse(output: &str) -> Result<Vec<BlockDevice>, Error> {
    let parsed: LsBlkOutput =
        serde_json::from_str(output).context("Failed to parse lsblk output")?;
    Ok(parsed.blockdevices)
}

#[cfg(test)]
mod tests {
    use indoc::indoc;

    use super::*;

    #[test]
    fn test_parse() {
        let devices = parse(indoc! {r#"
            {
               "blockdevices": [
                  {
                     "name": "/dev/sda", "type": "disk", "size": 17179869184,
                     "log-sec": 512, "rota": true, "tran": "sata", "pkname": null,
                     "fstype": null, "label": null, "uuid": null, "mountpoint": null,
                     "children": [
                        {
                           "name": "/dev/sda1", "type": "part", "size": 536870912,
                           "log-sec": 512, "rota": true, "tran": null, "pkname": "/dev/sda",
                           "fstype": "vfat", "label": "ESP", "uuid": "84A0-088E",
                           "mountpoint": "/boot/efi"
                        },
                        {
                           "name": "/dev/sda2", "type": "part", "size": 1073741824,
                           "log-sec": 512, "rota": true, "tran": null, "pkname": "/dev/sda",
                           "fstype": "linux_raid_member", "label": "host:0", "uuid": null,
                           "mountpoint": null,
                           "children": [
                              {
                                 "name": "/dev/md0", "type": "raid1", "size": 1072693248,
                                 "log-sec": 512, "rota": true, "tran": null, "pkname": "/dev/sda2",
                                 "fstype": "ext4", "label": null, "uuid": "0e4a", "mountpoint": "/srv"
                              }
                           ]
                        }
                     ]
                  }
               ]
            }
        "#})
        .unwrap();

        assert_eq!(devices.len(), 1);
        let sda = &devices[0];
        assert!(sda.is_disk());
        assert!(sda.rotational);
        assert_eq!(sda.transport.as_deref(), Some("sata"));
        assert_eq!(sda.logical_sector_size, Some(512));

        let names: Vec<&str> = sda.flatten().iter().map(|d| d.name.as_str()).collect();
        assert_eq!(names, vec!["/dev/sda", "/dev/sda1", "/dev/sda2", "/dev/md0"]);

        let md0 = sda.flatten()[3];
        assert!(md0.is_raid());
        assert_eq!(md0.parent_kernel_name.as_deref(), Some("/dev/sda2"));
        assert_eq!(md0.mountpoint.as_deref(), Some("/srv"));
        assert!(sda.children[0].is_partition());
        assert_eq!(sda.children[0].label.as_deref(), Some("ESP"));
    }

    #[test]
    fn test_parse_garbage() {
        parse("not json").unwrap_err();
        parse(r#"{"blockdevices": [{"name": "/dev/sda"}]}"#).unwrap_err();
    }
}
