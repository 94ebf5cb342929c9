//! Device kinds.
//!
//! [`Device`] is a closed sum over the concrete kinds. Narrowing to a kind
//! goes through `is_x` (never fails), `as_x` (optional) and `to_x` (fails
//! with [`DevicegraphError::DeviceHasWrongType`]). The abstract levels
//! [`BlkDevice`], [`Partitionable`] and [`PartitionTable`] are traits, and
//! narrowing to them yields trait objects.

use std::fmt::Debug;

use serde::{Deserialize, Serialize};

use sysdefs::partition_types::PtType;

use crate::{
    bytes::{ByteCount, Region},
    error::DevicegraphError,
    sid::Sid,
    types::DeviceKind,
};

mod disk;
mod filesystem;
mod lvm;
mod md;
mod mount_point;
mod partition;
mod partition_table;

pub use disk::Disk;
pub use filesystem::BlkFilesystem;
pub use lvm::{LvmLv, LvmPv, LvmVg, DEFAULT_EXTENT_SIZE};
pub use md::Md;
pub use mount_point::MountPoint;
pub use partition::{partition_number, Partition};
pub use partition_table::{Gpt, Msdos};

/// A device that exposes a block interface.
pub trait BlkDevice: Debug {
    fn sid(&self) -> Sid;

    /// Kernel name, e.g. `/dev/sda1`.
    fn name(&self) -> &str;

    fn region(&self) -> &Region;

    fn set_region(&mut self, region: Region);

    fn size(&self) -> ByteCount {
        self.region().size()
    }
}

/// A block device that can carry a partition table.
pub trait Partitionable: BlkDevice {
    /// Kernel name of the partition with the given number on this device.
    fn partition_name(&self, number: u32) -> String {
        let name = self.name();
        if name.ends_with(|c: char| c.is_ascii_digit()) {
            format!("{name}p{number}")
        } else {
            format!("{name}{number}")
        }
    }
}

/// A partition table.
pub trait PartitionTable: Debug {
    fn sid(&self) -> Sid;

    fn pt_type(&self) -> PtType;

    fn max_primary(&self) -> u32 {
        self.pt_type().max_primary()
    }

    fn extended_possible(&self) -> bool {
        self.pt_type().extended_possible()
    }
}

macro_rules! device_kinds {
    ($( $variant:ident => $is:ident, $as:ident, $to:ident, $to_mut:ident; )*) => {
        /// A device of a devicegraph.
        #[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
        #[serde(tag = "kind", rename_all = "kebab-case")]
        pub enum Device {
            $( $variant($variant), )*
        }

        /// Borrowed view of a device, typed to its concrete kind.
        #[derive(Debug, Clone, Copy, PartialEq, Eq)]
        pub enum DeviceRef<'a> {
            $( $variant(&'a $variant), )*
        }

        impl Device {
            pub fn kind(&self) -> DeviceKind {
                match self {
                    $( Self::$variant(_) => DeviceKind::$variant, )*
                }
            }

            pub fn sid(&self) -> Sid {
                match self {
                    $( Self::$variant(device) => device.sid, )*
                }
            }

            pub(crate) fn set_sid(&mut self, sid: Sid) {
                match self {
                    $( Self::$variant(device) => device.sid = sid, )*
                }
            }

            /// Returns a view typed to the most specific kind of the device.
            pub fn downcast(&self) -> DeviceRef<'_> {
                match self {
                    $( Self::$variant(device) => DeviceRef::$variant(device), )*
                }
            }

            $(
                pub fn $is(&self) -> bool {
                    matches!(self, Self::$variant(_))
                }

                pub fn $as(&self) -> Option<&$variant> {
                    match self {
                        Self::$variant(device) => Some(device),
                        _ => None,
                    }
                }

                pub fn $to(&self) -> Result<&$variant, DevicegraphError> {
                    match self {
                        Self::$variant(device) => Ok(device),
                        other => Err(other.wrong_type(DeviceKind::$variant.to_string())),
                    }
                }

                pub fn $to_mut(&mut self) -> Result<&mut $variant, DevicegraphError> {
                    match self {
                        Self::$variant(device) => Ok(device),
                        other => Err(other.wrong_type(DeviceKind::$variant.to_string())),
                    }
                }
            )*
        }

        impl DeviceRef<'_> {
            pub fn kind(&self) -> DeviceKind {
                match self {
                    $( Self::$variant(_) => DeviceKind::$variant, )*
                }
            }

            pub fn sid(&self) -> Sid {
                match self {
                    $( Self::$variant(device) => device.sid, )*
                }
            }
        }

        $(
            impl From<$variant> for Device {
                fn from(device: $variant) -> Self {
                    Self::$variant(device)
                }
            }
        )*
    };
}

device_kinds! {
    Disk => is_disk, as_disk, to_disk, to_disk_mut;
    Gpt => is_gpt, as_gpt, to_gpt, to_gpt_mut;
    Msdos => is_msdos, as_msdos, to_msdos, to_msdos_mut;
    Partition => is_partition, as_partition, to_partition, to_partition_mut;
    BlkFilesystem => is_blk_filesystem, as_blk_filesystem, to_blk_filesystem, to_blk_filesystem_mut;
    MountPoint => is_mount_point, as_mount_point, to_mount_point, to_mount_point_mut;
    Md => is_md, as_md, to_md, to_md_mut;
    LvmPv => is_lvm_pv, as_lvm_pv, to_lvm_pv, to_lvm_pv_mut;
    LvmVg => is_lvm_vg, as_lvm_vg, to_lvm_vg, to_lvm_vg_mut;
    LvmLv => is_lvm_lv, as_lvm_lv, to_lvm_lv, to_lvm_lv_mut;
}

/// Narrowing to the abstract levels of the hierarchy.
impl Device {
    fn wrong_type(&self, expected: impl Into<String>) -> DevicegraphError {
        DevicegraphError::DeviceHasWrongType {
            sid: self.sid(),
            expected: expected.into(),
            actual: self.kind().to_string(),
        }
    }

    pub fn as_blk_device(&self) -> Option<&dyn BlkDevice> {
        match self {
            Self::Disk(disk) => Some(disk as &dyn BlkDevice),
            Self::Partition(partition) => Some(partition as &dyn BlkDevice),
            Self::Md(md) => Some(md as &dyn BlkDevice),
            Self::LvmLv(lv) => Some(lv as &dyn BlkDevice),
            _ => None,
        }
    }

    pub fn is_blk_device(&self) -> bool {
        self.as_blk_device().is_some()
    }

    pub fn to_blk_device(&self) -> Result<&dyn BlkDevice, DevicegraphError> {
        self.as_blk_device()
            .ok_or_else(|| self.wrong_type("blk-device"))
    }

    pub fn to_blk_device_mut(&mut self) -> Result<&mut dyn BlkDevice, DevicegraphError> {
        match self {
            Self::Disk(disk) => Ok(disk as &mut dyn BlkDevice),
            Self::Partition(partition) => Ok(partition as &mut dyn BlkDevice),
            Self::Md(md) => Ok(md as &mut dyn BlkDevice),
            Self::LvmLv(lv) => Ok(lv as &mut dyn BlkDevice),
            other => Err(other.wrong_type("blk-device")),
        }
    }

    pub fn as_partitionable(&self) -> Option<&dyn Partitionable> {
        match self {
            Self::Disk(disk) => Some(disk as &dyn Partitionable),
            Self::Md(md) => Some(md as &dyn Partitionable),
            _ => None,
        }
    }

    pub fn is_partitionable(&self) -> bool {
        self.as_partitionable().is_some()
    }

    pub fn to_partitionable(&self) -> Result<&dyn Partitionable, DevicegraphError> {
        self.as_partitionable()
            .ok_or_else(|| self.wrong_type("partitionable"))
    }

    pub fn as_partition_table(&self) -> Option<&dyn PartitionTable> {
        match self {
            Self::Gpt(gpt) => Some(gpt as &dyn PartitionTable),
            Self::Msdos(msdos) => Some(msdos as &dyn PartitionTable),
            _ => None,
        }
    }

    pub fn is_partition_table(&self) -> bool {
        self.as_partition_table().is_some()
    }

    pub fn to_partition_table(&self) -> Result<&dyn PartitionTable, DevicegraphError> {
        self.as_partition_table()
            .ok_or_else(|| self.wrong_type("partition-table"))
    }

    /// Short human readable name used in logs and action descriptions.
    pub fn display_name(&self) -> String {
        match self {
            Self::Gpt(_) => "GPT".into(),
            Self::Msdos(_) => "MS-DOS".into(),
            Self::BlkFilesystem(fs) => fs.fs_type.to_string(),
            Self::MountPoint(mp) => mp.path.display().to_string(),
            Self::LvmPv(_) => "PV".into(),
            Self::LvmVg(vg) => vg.vg_name.clone(),
            other => other
                .as_blk_device()
                .map(|blk| blk.name().to_string())
                .unwrap_or_default(),
        }
    }
}
