use serde::{Deserialize, Serialize};
use strum_macros::{Display, EnumIter, EnumString, IntoStaticStr};

/// Filesystem types that can live on a block device.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    PartialOrd,
    Ord,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    EnumIter,
    IntoStaticStr,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum FsType {
    Btrfs,
    Exfat,
    Ext2,
    Ext3,
    Ext4,
    Ntfs,
    Swap,
    Vfat,
    Xfs,
}

impl FsType {
    /// Returns whether the filesystem can be grown in place.
    pub fn can_grow(self) -> bool {
        match self {
            Self::Ext2 | Self::Ext3 | Self::Ext4 => true,
            Self::Xfs | Self::Btrfs | Self::Ntfs | Self::Vfat => true,
            Self::Swap => true,
            Self::Exfat => false,
        }
    }

    /// Returns whether the filesystem can be shrunk in place.
    pub fn can_shrink(self) -> bool {
        match self {
            Self::Ext2 | Self::Ext3 | Self::Ext4 => true,
            Self::Btrfs | Self::Ntfs | Self::Vfat => true,
            Self::Swap => true,
            Self::Xfs | Self::Exfat => false,
        }
    }

    /// Returns whether a resize writes the filesystem anew to the size of its
    /// device instead of resizing it in place.
    pub fn resizes_by_recreating(self) -> bool {
        matches!(self, Self::Swap)
    }

    /// Returns whether the filesystem carries a label that can be changed
    /// without recreating it.
    pub fn supports_label(self) -> bool {
        !matches!(self, Self::Exfat)
    }

    /// Returns whether the filesystem is mountable. Swap is activated, not
    /// mounted.
    pub fn is_mountable(self) -> bool {
        !matches!(self, Self::Swap)
    }

    /// Name of the filesystem as understood by `mkfs --type`.
    pub fn mkfs_name(self) -> &'static str {
        self.into()
    }
}
