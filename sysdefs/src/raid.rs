use serde::{Deserialize, Serialize};
use strum_macros::{Display, EnumIter, EnumString, IntoStaticStr};

/// Software RAID levels supported by mdadm.
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
    EnumIter,
    IntoStaticStr,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum MdLevel {
    Raid0,
    Raid1,
    Raid4,
    Raid5,
    Raid6,
    Raid10,
}

impl MdLevel {
    /// Minimum number of active members for an array of this level.
    pub fn min_devices(self) -> usize {
        match self {
            Self::Raid0 | Self::Raid1 | Self::Raid10 => 2,
            Self::Raid4 | Self::Raid5 => 3,
            Self::Raid6 => 4,
        }
    }

    /// Number of members an array of `raid_devices` members keeps running
    /// without.
    pub fn max_missing(self, raid_devices: usize) -> usize {
        match self {
            Self::Raid0 => 0,
            Self::Raid1 => raid_devices.saturating_sub(1),
            Self::Raid4 | Self::Raid5 | Self::Raid10 => 1,
            Self::Raid6 => 2,
        }
    }

    /// Usable size of an array built from `count` members of `member_size`
    /// bytes each.
    pub fn array_size(self, count: u64, member_size: u64) -> u64 {
        match self {
            Self::Raid0 => member_size * count,
            Self::Raid1 => {
                if count > 0 {
                    member_size
                } else {
                    0
                }
            }
            Self::Raid4 | Self::Raid5 => member_size * count.saturating_sub(1),
            Self::Raid6 => member_size * count.saturating_sub(2),
            Self::Raid10 => member_size * count / 2,
        }
    }
}
