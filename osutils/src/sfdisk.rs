use std::{
    path::{Path, PathBuf},
    process::Command,
};

use anyhow::{Context, Error};
use serde::Deserialize;

use sysdefs::partition_types::{PartitionId, PtType};

use crate::exe::RunAndCheck;

#[derive(Debug, PartialEq, Deserialize)]
struct SfdiskOutput {
    partitiontable: SfDisk,
}

#[derive(Debug, PartialEq, Deserialize)]
pub struct SfDisk {
    /// Disk label type
    pub label: SfDiskLabel,

    /// Disk device path
    pub device: PathBuf,

    /// Disk size unit (always "sectors")
    pub unit: SfDiskUnit,

    /// First usable LBA, only reported for GPT
    #[serde(default)]
    pub firstlba: Option<u64>,

    /// Last usable LBA, only reported for GPT
    #[serde(default)]
    pub lastlba: Option<u64>,

    /// Sector size
    #[serde(default = "SfDisk::default_sectorsize")]
    pub sectorsize: u64,

    /// List of partitions
    #[serde(default)]
    pub partitions: Vec<SfPartition>,
}

#[derive(Debug, PartialEq, Eq, Deserialize, Clone, Hash)]
pub struct SfPartition {
    /// Partition device path
    pub node: PathBuf,

    /// Partition start offset in sectors
    pub start: u64,

    /// Partition size in sectors
    pub size: u64,

    /// GPT type GUID or MBR system id
    #[serde(rename = "type")]
    pub partition_type: String,

    /// Partition name, GPT only
    pub name: Option<String>,

    /// Partition number in the partition table
    #[serde(skip)]
    pub number: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub enum SfDiskLabel {
    #[serde(rename = "gpt")]
    Gpt,

    /// Master Boot Record
    #[serde(rename = "mbr", alias = "dos")]
    Mbr,
}

impl From<SfDiskLabel> for PtType {
    fn from(label: SfDiskLabel) -> Self {
        match label {
            SfDiskLabel::Gpt => PtType::Gpt,
            SfDiskLabel::Mbr => PtType::Msdos,
        }
    }
}

#[derive(Debug, PartialEq, Deserialize)]
pub enum SfDiskUnit {
    #[serde(rename = "sectors")]
    Sectors,
}

impl SfDisk {
    fn default_sectorsize() -> u64 {
        512
    }

    /// Reads the partition table of `disk`.
    pub fn get_info(disk: impl AsRef<Path>) -> Result<Self, Error> {
        let output = Command::new("sfdisk")
            .arg("-J")
            .arg(disk.as_ref())
            .output_and_check()
            .with_context(|| {
                format!(
                    "Failed to fetch partition table of {}",
                    disk.as_ref().display()
                )
            })?;

        Self::from_json(&output).with_context(|| {
            format!(
                "Failed to extract partition table of {}",
                disk.as_ref().display()
            )
        })
    }

    /// Parses the output of `sfdisk -J`.
    pub fn from_json(output: &str) -> Result<Self, Error> {
        let mut disk = serde_json::from_str::<SfdiskOutput>(output)
            .context("Failed to parse partition table")?
            .partitiontable;

        for partition in disk.partitions.iter_mut() {
            partition.number = partition
                .node
                .to_string_lossy()
                .rsplit_once(|c: char| !c.is_ascii_digit())
                .map(|(_, n)| n)
                .with_context(|| {
                    format!(
                        "Failed to extract partition number from {}",
                        partition.node.display()
                    )
                })?
                .parse()
                .with_context(|| {
                    format!(
                        "Failed to parse partition number from {}",
                        partition.node.display()
                    )
                })?;
        }

        Ok(disk)
    }
}

impl SfPartition {
    /// The partition id encoded by the type of this partition.
    pub fn partition_id(&self, label: SfDiskLabel) -> PartitionId {
        match label {
            SfDiskLabel::Gpt => PartitionId::from_gpt_guid(&self.partition_type),
            SfDiskLabel::Mbr => {
                PartitionId::from_mbr_code(&self.partition_type).unwrap_or_default()
            }
        }
    }
}

/// Changes the type of partition `number` on `disk`.
pub fn set_part_type(disk: impl AsRef<Path>, number: u32, partition_type: &str) -> Result<(), Error> {
    Command::new("sfdisk")
        .arg("--part-type")
        .arg(disk.as_ref())
        .arg(number.to_string())
        .arg(partition_type)
        .run_and_check()
        .with_context(|| {
            format!(
                "Failed to set type of partition {number} on {}",
                disk.as_ref().display()
            )
        })
}

#[cfg(test)]
mod tests {
    use indoc::indoc;

    use super::*;

    #[test]
    fn test_parse_gpt() {
        let disk = SfDisk::from_json(indoc! {r#"
            {
               "partitiontable": {
                  "label": "gpt",
                  "id": "B6B7C0AA-4E44-4E4D-8C5B-A1F7C1B5D66E",
                  "device": "/dev/sda",
                  "unit": "sectors",
                  "firstlba": 34,
                  "lastlba": 16777182,
                  "sectorsize": 512,
                  "partitions": [
                     {
                        "node": "/dev/sda1",
                        "start": 2048,
                        "size": 1048576,
                        "type": "C12A7328-F81F-11D2-BA4B-00A0C93EC93B",
                        "uuid": "8B28B5B0-2F5D-4D0A-A9F8-5C9E1E7C3D11",
                        "name": "esp"
                     },
                     {
                        "node": "/dev/sda2",
                        "start": 1050624,
                        "size": 4194304,
                        "type": "0657FD6D-A4AB-43C4-84E5-0933C84B4F4F",
                        "uuid": "0E4A6B2C-93F1-4D8E-B4A5-7F7A2D1C0B33"
                     }
                  ]
               }
            }
        "#})
        .unwrap();

        assert_eq!(disk.label, SfDiskLabel::Gpt);
        assert_eq!(PtType::from(disk.label), PtType::Gpt);
        assert_eq!(disk.device, PathBuf::from("/dev/sda"));
        assert_eq!(disk.lastlba, Some(16777182));
        assert_eq!(disk.partitions.len(), 2);
        assert_eq!(disk.partitions[0].number, 1);
        assert_eq!(disk.partitions[0].name.as_deref(), Some("esp"));
        assert_eq!(disk.partitions[0].partition_id(disk.label), PartitionId::ESP);
        assert_eq!(disk.partitions[1].number, 2);
        assert_eq!(disk.partitions[1].partition_id(disk.label), PartitionId::SWAP);
    }

    #[test]
    fn test_parse_dos() {
        let disk = SfDisk::from_json(indoc! {r#"
            {
               "partitiontable": {
                  "label": "dos",
                  "id": "0x2b5c4b3a",
                  "device": "/dev/nvme0n1",
                  "unit": "sectors",
                  "partitions": [
                     {"node": "/dev/nvme0n1p1", "start": 2048, "size": 409600, "type": "83"},
                     {"node": "/dev/nvme0n1p2", "start": 411648, "size": 2097152, "type": "5"},
                     {"node": "/dev/nvme0n1p5", "start": 413696, "size": 1048576, "type": "8e"}
                  ]
               }
            }
        "#})
        .unwrap();

        assert_eq!(disk.label, SfDiskLabel::Mbr);
        assert_eq!(PtType::from(disk.label), PtType::Msdos);
        assert_eq!(disk.sectorsize, 512);
        assert_eq!(disk.firstlba, None);
        let numbers: Vec<u32> = disk.partitions.iter().map(|p| p.number).collect();
        assert_eq!(numbers, vec![1, 2, 5]);
        assert_eq!(disk.partitions[1].partition_id(disk.label), PartitionId::EXTENDED);
        assert_eq!(disk.partitions[2].partition_id(disk.label), PartitionId::LVM);
    }

    #[test]
    fn test_parse_errors() {
        SfDisk::from_json("{}").unwrap_err();
        SfDisk::from_json(indoc! {r#"
            {
               "partitiontable": {
                  "label": "gpt", "device": "/dev/sda", "unit": "sectors",
                  "partitions": [
                     {"node": "/dev/sda", "start": 2048, "size": 2048, "type": "83"}
                  ]
               }
            }
        "#})
        .unwrap_err();
    }
}
