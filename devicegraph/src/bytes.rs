use std::{
    fmt::{self, Display},
    num::ParseIntError,
    str::FromStr,
};

use serde::{Deserialize, Serialize};

/// Default logical sector size.
pub const DEFAULT_BLOCK_SIZE: u64 = 512;

/// A size in bytes. Serialized with a K/M/G/T suffix whenever the value is a
/// multiple of 1024.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ByteCount(pub u64);

impl From<u64> for ByteCount {
    fn from(x: u64) -> Self {
        ByteCount(x)
    }
}

impl ByteCount {
    pub const KIB: u64 = 1 << 10;
    pub const MIB: u64 = 1 << 20;
    pub const GIB: u64 = 1 << 30;

    pub fn from_mib(mib: u64) -> Self {
        Self(mib << 20)
    }

    pub fn from_gib(gib: u64) -> Self {
        Self(gib << 30)
    }

    pub fn bytes(self) -> u64 {
        self.0
    }

    /// Rounds up to the next multiple of `unit`.
    pub fn align_up(self, unit: ByteCount) -> Self {
        if unit.0 == 0 {
            return self;
        }
        Self(self.0.saturating_add(unit.0 - 1) / unit.0 * unit.0)
    }

    /// Rounds down to a multiple of `unit`.
    pub fn align_down(self, unit: ByteCount) -> Self {
        if unit.0 == 0 {
            return self;
        }
        Self(self.0 / unit.0 * unit.0)
    }

    pub fn to_human_readable(&self) -> String {
        match self.0.trailing_zeros() {
            _ if self.0 == 0 => "0".to_owned(),
            0..=9 => format!("{}", self.0),
            10..=19 => format!("{}K", self.0 >> 10),
            20..=29 => format!("{}M", self.0 >> 20),
            30..=39 => format!("{}G", self.0 >> 30),
            _ => format!("{}T", self.0 >> 40),
        }
    }

    pub fn from_human_readable(s: &str) -> Result<Self, ParseIntError> {
        let s = s.trim();
        let parse = |val: &str, shift: u8| Ok(Self(val.trim().parse::<u64>()? << shift));
        match s.char_indices().last() {
            Some((i, 'K')) => parse(&s[..i], 10),
            Some((i, 'M')) => parse(&s[..i], 20),
            Some((i, 'G')) => parse(&s[..i], 30),
            Some((i, 'T')) => parse(&s[..i], 40),
            _ => parse(s, 0),
        }
    }
}

impl Display for ByteCount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_human_readable())
    }
}

impl FromStr for ByteCount {
    type Err = ParseIntError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_human_readable(s)
    }
}

impl<'de> Deserialize<'de> for ByteCount {
    fn deserialize<D>(deserializer: D) -> Result<ByteCount, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        // Either "4M" or a plain number of bytes
        match serde_yaml::Value::deserialize(deserializer)? {
            serde_yaml::Value::String(s) => ByteCount::from_str(s.as_str())
                .map_err(|e| serde::de::Error::custom(format!("invalid byte count: {e}"))),
            serde_yaml::Value::Number(n) => n.as_u64().map(ByteCount).ok_or_else(|| {
                serde::de::Error::custom("invalid byte count, expected unsigned integer")
            }),
            _ => Err(serde::de::Error::custom("invalid byte count")),
        }
    }
}

impl Serialize for ByteCount {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        if self.0 & 0x3FF != 0 {
            serializer.serialize_u64(self.0)
        } else {
            serializer.serialize_str(self.to_human_readable().as_str())
        }
    }
}

fn default_block_size() -> u64 {
    DEFAULT_BLOCK_SIZE
}

/// A range of blocks on a block device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct Region {
    pub start: u64,
    pub length: u64,
    #[serde(default = "default_block_size")]
    pub block_size: u64,
}

impl Default for Region {
    fn default() -> Self {
        Self {
            start: 0,
            length: 0,
            block_size: DEFAULT_BLOCK_SIZE,
        }
    }
}

impl Region {
    pub fn new(start: u64, length: u64, block_size: u64) -> Self {
        Self {
            start,
            length,
            block_size,
        }
    }

    /// A region starting at block 0 that covers at least `size` bytes.
    pub fn from_size(size: ByteCount) -> Self {
        Self::default().with_size(size)
    }

    /// Same start, length adjusted to cover at least `size` bytes.
    pub fn with_size(self, size: ByteCount) -> Self {
        let block_size = self.block_size.max(1);
        Self {
            length: size.0.saturating_add(block_size - 1) / block_size,
            ..self
        }
    }

    /// First block after the region.
    pub fn end(&self) -> u64 {
        self.start + self.length
    }

    pub fn size(&self) -> ByteCount {
        ByteCount(self.length * self.block_size)
    }

    pub fn is_empty(&self) -> bool {
        self.length == 0
    }

    /// Whether both regions share at least one block.
    pub fn overlaps(&self, other: &Region) -> bool {
        self.start < other.end() && other.start < self.end()
    }

    /// Whether `other` is fully contained in this region.
    pub fn contains(&self, other: &Region) -> bool {
        other.start >= self.start && other.end() <= self.end()
    }
}

impl Display for Region {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{}, {}, {} B]",
            self.start, self.length, self.block_size
        )
    }
}
