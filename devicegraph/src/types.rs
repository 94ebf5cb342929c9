//! Kind tags for devices and holders.

use std::fmt::Display;

use serde::{Deserialize, Serialize};
use strum_macros::{Display, EnumIter};

/// Concrete device kinds.
#[derive(
    Serialize, Deserialize, Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Display, EnumIter,
)]
#[serde(rename_all = "kebab-case")]
#[strum(serialize_all = "kebab-case")]
pub enum DeviceKind {
    /// A physical disk or a disk image
    Disk,

    /// A GUID partition table
    Gpt,

    /// An MS-DOS (MBR) partition table
    Msdos,

    /// A partition of a partition table
    Partition,

    /// A filesystem on one or more block devices
    BlkFilesystem,

    /// The mount point of a filesystem
    MountPoint,

    /// A software RAID array
    Md,

    /// An LVM physical volume
    LvmPv,

    /// An LVM volume group
    LvmVg,

    /// An LVM logical volume
    LvmLv,
}

bitflags::bitflags! {
    /// Bitflags for device kinds
    ///
    /// MUST MATCH THE CONTENTS OF DeviceKind
    #[derive(Serialize, Deserialize, Default, Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
    pub struct DeviceKindFlag: u32 {
        const Disk = 1;
        const Gpt = 1 << 1;
        const Msdos = 1 << 2;
        const Partition = 1 << 3;
        const BlkFilesystem = 1 << 4;
        const MountPoint = 1 << 5;
        const Md = 1 << 6;
        const LvmPv = 1 << 7;
        const LvmVg = 1 << 8;
        const LvmLv = 1 << 9;

        // Groups:
        const Partitionable = Self::Disk.bits() | Self::Md.bits();
        const PartitionTable = Self::Gpt.bits() | Self::Msdos.bits();
        const BlkDevice = Self::Disk.bits()
            | Self::Partition.bits()
            | Self::Md.bits()
            | Self::LvmLv.bits();
    }
}

impl DeviceKind {
    /// Returns the flag associated with the device kind
    pub fn as_flag(&self) -> DeviceKindFlag {
        match self {
            Self::Disk => DeviceKindFlag::Disk,
            Self::Gpt => DeviceKindFlag::Gpt,
            Self::Msdos => DeviceKindFlag::Msdos,
            Self::Partition => DeviceKindFlag::Partition,
            Self::BlkFilesystem => DeviceKindFlag::BlkFilesystem,
            Self::MountPoint => DeviceKindFlag::MountPoint,
            Self::Md => DeviceKindFlag::Md,
            Self::LvmPv => DeviceKindFlag::LvmPv,
            Self::LvmVg => DeviceKindFlag::LvmVg,
            Self::LvmLv => DeviceKindFlag::LvmLv,
        }
    }

    pub fn is_blk_device(&self) -> bool {
        DeviceKindFlag::BlkDevice.contains(self.as_flag())
    }
}

/// Holder kinds.
#[derive(
    Serialize, Deserialize, Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Display, EnumIter,
)]
#[serde(rename_all = "kebab-case")]
#[strum(serialize_all = "kebab-case")]
pub enum HolderKind {
    /// Generic "uses" relation
    User,

    /// Containment, e.g. a partition inside a partition table
    Subdevice,

    /// A block device carrying a filesystem
    FilesystemUser,

    /// A block device that is a member of an MD array
    MdUser,

    /// A block device that is an LVM physical volume
    LvmPvUser,
}

bitflags::bitflags! {
    /// Bitflags for holder kinds
    ///
    /// MUST MATCH THE CONTENTS OF HolderKind
    #[derive(Serialize, Deserialize, Default, Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
    pub struct HolderKindFlag: u32 {
        const User = 1;
        const Subdevice = 1 << 1;
        const FilesystemUser = 1 << 2;
        const MdUser = 1 << 3;
        const LvmPvUser = 1 << 4;
    }
}

impl HolderKind {
    /// Returns the flag associated with the holder kind
    pub fn as_flag(&self) -> HolderKindFlag {
        match self {
            Self::User => HolderKindFlag::User,
            Self::Subdevice => HolderKindFlag::Subdevice,
            Self::FilesystemUser => HolderKindFlag::FilesystemUser,
            Self::MdUser => HolderKindFlag::MdUser,
            Self::LvmPvUser => HolderKindFlag::LvmPvUser,
        }
    }
}

pub(crate) trait BitFlagsBackingEnumVec<T>: bitflags::Flags
where
    T: Display,
{
    fn backing_enum_vec(self) -> Vec<T>;

    fn user_readable(self) -> String {
        if self.is_empty() {
            return "(none)".into();
        }

        self.backing_enum_vec()
            .iter()
            .map(|kind| kind.to_string())
            .collect::<Vec<String>>()
            .join(" or ")
    }
}

impl BitFlagsBackingEnumVec<DeviceKind> for DeviceKindFlag {
    fn backing_enum_vec(self) -> Vec<DeviceKind> {
        self.iter()
            .filter_map(|flag| match flag {
                DeviceKindFlag::Disk => Some(DeviceKind::Disk),
                DeviceKindFlag::Gpt => Some(DeviceKind::Gpt),
                DeviceKindFlag::Msdos => Some(DeviceKind::Msdos),
                DeviceKindFlag::Partition => Some(DeviceKind::Partition),
                DeviceKindFlag::BlkFilesystem => Some(DeviceKind::BlkFilesystem),
                DeviceKindFlag::MountPoint => Some(DeviceKind::MountPoint),
                DeviceKindFlag::Md => Some(DeviceKind::Md),
                DeviceKindFlag::LvmPv => Some(DeviceKind::LvmPv),
                DeviceKindFlag::LvmVg => Some(DeviceKind::LvmVg),
                DeviceKindFlag::LvmLv => Some(DeviceKind::LvmLv),
                _ => None,
            })
            .collect()
    }
}

impl BitFlagsBackingEnumVec<HolderKind> for HolderKindFlag {
    fn backing_enum_vec(self) -> Vec<HolderKind> {
        self.iter()
            .filter_map(|flag| match flag {
                HolderKindFlag::User => Some(HolderKind::User),
                HolderKindFlag::Subdevice => Some(HolderKind::Subdevice),
                HolderKindFlag::FilesystemUser => Some(HolderKind::FilesystemUser),
                HolderKindFlag::MdUser => Some(HolderKind::MdUser),
                HolderKindFlag::LvmPvUser => Some(HolderKind::LvmPvUser),
                _ => None,
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use strum::IntoEnumIterator;

    use super::*;

    #[test]
    fn test_device_kind_flags() {
        for kind in DeviceKind::iter() {
            assert_eq!(kind.as_flag().backing_enum_vec(), vec![kind]);
        }

        assert_eq!(
            DeviceKindFlag::Partitionable.backing_enum_vec(),
            vec![DeviceKind::Disk, DeviceKind::Md]
        );
        assert_eq!(
            DeviceKindFlag::PartitionTable.user_readable(),
            "gpt or msdos"
        );
        assert_eq!(DeviceKindFlag::empty().user_readable(), "(none)");
        assert!(DeviceKind::LvmLv.is_blk_device());
        assert!(!DeviceKind::LvmVg.is_blk_device());
    }

    #[test]
    fn test_holder_kind_flags() {
        for kind in HolderKind::iter() {
            assert_eq!(kind.as_flag().backing_enum_vec(), vec![kind]);
        }
        assert_eq!(HolderKind::FilesystemUser.to_string(), "filesystem-user");
    }
}
