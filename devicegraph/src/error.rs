use std::fmt::{self, Display};

use serde::{Deserialize, Serialize};
use strum_macros::Display;

use crate::sid::Sid;

/// Renders a list of sids for error messages.
pub(crate) fn format_sids(sids: &[Sid]) -> String {
    sids.iter()
        .map(|sid| sid.to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

#[derive(thiserror::Error, Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum DevicegraphError {
    #[error("Device with sid {sid} not found")]
    DeviceNotFound { sid: Sid },

    #[error("Device with name '{name}' not found")]
    DeviceNotFoundByName { name: String },

    #[error("Holder from sid {parent} to sid {child} not found")]
    HolderNotFound { parent: Sid, child: Sid },

    #[error("Holder with sid {sid} not found")]
    HolderNotFoundBySid { sid: Sid },

    #[error("Device with sid {sid} has wrong type: expected '{expected}', found '{actual}'")]
    DeviceHasWrongType {
        sid: Sid,
        expected: String,
        actual: String,
    },

    #[error("Holder with sid {sid} has wrong type: expected '{expected}', found '{actual}'")]
    HolderHasWrongType {
        sid: Sid,
        expected: String,
        actual: String,
    },

    #[error("Sid {sid} is already in use in this devicegraph")]
    DuplicateSid { sid: Sid },

    #[error("Name '{name}' is already in use in this devicegraph")]
    DuplicateName { name: String },

    #[error("Device with sid {sid} is already in use")]
    DeviceInUse { sid: Sid },

    #[error("Invalid operation on sid {sid}: {reason}")]
    InvalidOperation { sid: Sid, reason: String },

    #[error("Devicegraph is inconsistent:\n{0}")]
    Inconsistent(Violations),

    #[error("Failed to (de)serialize devicegraph: {message}")]
    Serialization { message: String },
}

impl DevicegraphError {
    /// Sids implicated by the error.
    pub fn sids(&self) -> Vec<Sid> {
        match self {
            Self::DeviceNotFound { sid }
            | Self::HolderNotFoundBySid { sid }
            | Self::DeviceHasWrongType { sid, .. }
            | Self::HolderHasWrongType { sid, .. }
            | Self::DuplicateSid { sid }
            | Self::DeviceInUse { sid }
            | Self::InvalidOperation { sid, .. } => vec![*sid],
            Self::HolderNotFound { parent, child } => vec![*parent, *child],
            Self::Inconsistent(violations) => violations.sids(),
            Self::DeviceNotFoundByName { .. }
            | Self::DuplicateName { .. }
            | Self::Serialization { .. } => Vec::new(),
        }
    }

    /// Whether the error comes from narrowing a device or holder to a kind it
    /// does not have.
    pub fn is_wrong_kind(&self) -> bool {
        matches!(
            self,
            Self::DeviceHasWrongType { .. } | Self::HolderHasWrongType { .. }
        )
    }

    pub(crate) fn invalid(sid: Sid, reason: impl Into<String>) -> Self {
        Self::InvalidOperation {
            sid,
            reason: reason.into(),
        }
    }
}

/// The rule a consistency violation breaks.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Display)]
#[serde(rename_all = "kebab-case")]
#[strum(serialize_all = "kebab-case")]
pub enum ViolationKind {
    /// An index entry points nowhere, or to an entity with another sid
    DanglingReference,

    /// The same sid is used twice
    DuplicateSid,

    /// A holder connects device kinds it cannot connect
    IncompatibleHolder,

    /// A device has a wrong number or wrong kind of parents
    InvalidParents,

    /// A device is used by more children than it can serve
    ExclusiveUse,

    /// An MD array has fewer members than its level requires
    MdMembers,

    /// The logical volumes of a volume group do not fit into it
    VolumeGroupSpace,

    /// The devicegraph contains a cycle
    Cycle,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct Violation {
    pub kind: ViolationKind,
    pub sids: Vec<Sid>,
    pub message: String,
}

impl Violation {
    pub(crate) fn new(kind: ViolationKind, sids: Vec<Sid>, message: impl Into<String>) -> Self {
        Self {
            kind,
            sids,
            message: message.into(),
        }
    }
}

impl Display for Violation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{}] {} (sids: {})",
            self.kind,
            self.message,
            format_sids(&self.sids)
        )
    }
}

/// All violations found by one consistency check.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct Violations(pub Vec<Violation>);

impl Violations {
    pub fn iter(&self) -> impl Iterator<Item = &Violation> {
        self.0.iter()
    }

    pub fn sids(&self) -> Vec<Sid> {
        let mut sids: Vec<Sid> = self.0.iter().flat_map(|v| v.sids.clone()).collect();
        sids.sort();
        sids.dedup();
        sids
    }

    pub fn has_kind(&self, kind: ViolationKind) -> bool {
        self.0.iter().any(|v| v.kind == kind)
    }
}

impl Display for Violations {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for violation in &self.0 {
            writeln!(f, "  - {violation}")?;
        }
        Ok(())
    }
}
