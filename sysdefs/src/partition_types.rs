use std::fmt;

use serde::{Deserialize, Serialize};
use strum_macros::{Display, EnumIs, EnumString, IntoStaticStr};

/// Partition table types.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    IntoStaticStr,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum PtType {
    Gpt,
    Msdos,
}

impl PtType {
    /// Maximum number of primary partitions (including an extended one).
    pub fn max_primary(self) -> u32 {
        match self {
            Self::Gpt => 128,
            Self::Msdos => 4,
        }
    }

    /// Whether the table supports extended and logical partitions.
    pub fn extended_possible(self) -> bool {
        matches!(self, Self::Msdos)
    }

    /// Label understood by `parted mklabel`.
    pub fn parted_label(self) -> &'static str {
        self.into()
    }
}

/// Partition types of a partition table. GPT only knows primary partitions.
#[derive(
    Debug,
    Default,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    Display,
    EnumIs,
    EnumString,
    IntoStaticStr,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum PartitionType {
    #[default]
    Primary,
    Extended,
    Logical,
}

/// MBR style partition id. GPT partition types are mapped onto the same ids,
/// like parted does.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PartitionId(pub u32);

impl PartitionId {
    pub const DOS12: PartitionId = PartitionId(0x01);
    pub const EXTENDED: PartitionId = PartitionId(0x05);
    pub const NTFS: PartitionId = PartitionId(0x07);
    pub const DOS32: PartitionId = PartitionId(0x0c);
    pub const SWAP: PartitionId = PartitionId(0x82);
    pub const LINUX: PartitionId = PartitionId(0x83);
    pub const LVM: PartitionId = PartitionId(0x8e);
    pub const RAID: PartitionId = PartitionId(0xfd);
    pub const ESP: PartitionId = PartitionId(0xef);
    pub const BIOS_BOOT: PartitionId = PartitionId(0x101);

    /// Name of the matching parted flag, for ids that are expressed as flags.
    pub fn parted_flag(self) -> Option<&'static str> {
        match self {
            Self::SWAP => Some("swap"),
            Self::LVM => Some("lvm"),
            Self::RAID => Some("raid"),
            Self::ESP => Some("esp"),
            Self::BIOS_BOOT => Some("bios_grub"),
            _ => None,
        }
    }
}

/// GPT partition type GUIDs and the ids they map onto.
const GPT_TYPES: &[(&str, PartitionId)] = &[
    ("c12a7328-f81f-11d2-ba4b-00a0c93ec93b", PartitionId::ESP),
    ("21686148-6449-6e6f-744e-656564454649", PartitionId::BIOS_BOOT),
    ("0fc63daf-8483-4772-8e79-3d69d8477de4", PartitionId::LINUX),
    ("0657fd6d-a4ab-43c4-84e5-0933c84b4f4f", PartitionId::SWAP),
    ("e6d6d379-f507-44c2-a23c-238f2a3df928", PartitionId::LVM),
    ("a19d880f-05fc-4d3b-a006-743f0f84911e", PartitionId::RAID),
    ("ebd0a0a2-b9e5-4433-87c0-68b6b72699c7", PartitionId::NTFS),
];

impl PartitionId {
    /// Maps a GPT partition type GUID. Unknown GUIDs map to Linux data.
    pub fn from_gpt_guid(guid: &str) -> Self {
        let guid = guid.to_ascii_lowercase();
        GPT_TYPES
            .iter()
            .find(|(known, _)| *known == guid)
            .map(|(_, id)| *id)
            .unwrap_or(Self::LINUX)
    }

    /// The GPT partition type GUID for this id.
    pub fn gpt_guid(self) -> &'static str {
        GPT_TYPES
            .iter()
            .find(|(_, id)| *id == self)
            .map(|(guid, _)| *guid)
            .unwrap_or(GPT_TYPES[2].0)
    }

    /// Parses an MBR system id as printed by sfdisk, e.g. `83` or `0x83`.
    pub fn from_mbr_code(code: &str) -> Option<Self> {
        let code = code.trim();
        let code = code.strip_prefix("0x").unwrap_or(code);
        u32::from_str_radix(code, 16).ok().map(PartitionId)
    }

    /// The MBR system id in the form sfdisk expects.
    pub fn mbr_code(self) -> String {
        format!("{:x}", self.0)
    }
}

impl Default for PartitionId {
    fn default() -> Self {
        Self::LINUX
    }
}

impl fmt::Display for PartitionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#04x}", self.0)
    }
}
