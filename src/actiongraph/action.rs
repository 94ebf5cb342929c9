use std::fmt::{self, Display};

use strum_macros::Display;

use devicegraph::{ByteCount, Sid};
use sysdefs::partition_types::PartitionId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display)]
#[strum(serialize_all = "lowercase")]
pub enum ResizeDirection {
    Grow,
    Shrink,
}

impl ResizeDirection {
    pub fn between(from: ByteCount, to: ByteCount) -> Option<Self> {
        match from.cmp(&to) {
            std::cmp::Ordering::Less => Some(Self::Grow),
            std::cmp::Ordering::Greater => Some(Self::Shrink),
            std::cmp::Ordering::Equal => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display)]
#[strum(serialize_all = "lowercase")]
pub enum ReallotMode {
    /// A device joins an aggregate.
    Extend,

    /// A device leaves an aggregate.
    Reduce,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ActionKind {
    Create,
    Delete,
    Rename {
        from: String,
        to: String,
    },
    Resize {
        direction: ResizeDirection,
        from: ByteCount,
        to: ByteCount,
    },
    SetPartitionId {
        from: PartitionId,
        to: PartitionId,
    },
    SetLabel {
        from: String,
        to: String,
    },
    /// The action's sid is the aggregate (MD array or volume group),
    /// `device` the member block device or physical volume.
    Reallot {
        mode: ReallotMode,
        device: Sid,
    },
}

impl ActionKind {
    pub fn is_create(&self) -> bool {
        matches!(self, Self::Create)
    }

    pub fn is_delete(&self) -> bool {
        matches!(self, Self::Delete)
    }

    pub fn is_rename(&self) -> bool {
        matches!(self, Self::Rename { .. })
    }

    pub fn resize_direction(&self) -> Option<ResizeDirection> {
        match self {
            Self::Resize { direction, .. } => Some(*direction),
            _ => None,
        }
    }

    /// Mode and member of a reallot action.
    pub fn reallot(&self) -> Option<(ReallotMode, Sid)> {
        match self {
            Self::Reallot { mode, device } => Some((*mode, *device)),
            _ => None,
        }
    }

    /// Short tag used in logs and graphviz output.
    pub fn tag(&self) -> &'static str {
        match self {
            Self::Create => "create",
            Self::Delete => "delete",
            Self::Rename { .. } => "rename",
            Self::Resize { .. } => "resize",
            Self::SetPartitionId { .. } => "set-partition-id",
            Self::SetLabel { .. } => "set-label",
            Self::Reallot {
                mode: ReallotMode::Extend,
                ..
            } => "extend",
            Self::Reallot {
                mode: ReallotMode::Reduce,
                ..
            } => "reduce",
        }
    }
}

/// One step of a commit. Immutable once planned.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Action {
    sid: Sid,
    kind: ActionKind,
    description: String,
}

impl Action {
    pub(crate) fn new(sid: Sid, kind: ActionKind, description: impl Into<String>) -> Self {
        Self {
            sid,
            kind,
            description: description.into(),
        }
    }

    /// The device the action is about.
    pub fn sid(&self) -> Sid {
        self.sid
    }

    pub fn kind(&self) -> &ActionKind {
        &self.kind
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    /// Whether the action is about `sid`, either as its primary device or as
    /// the member of a reallot.
    pub fn involves(&self, sid: Sid) -> bool {
        self.sid == sid || self.kind.reallot().is_some_and(|(_, device)| device == sid)
    }
}

impl Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.description)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
pub enum ActionState {
    Planned,
    Executing,
    Applied,
    Failed,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Invalid action state transition from {from} to {to}")]
pub struct InvalidTransition {
    pub from: ActionState,
    pub to: ActionState,
}

impl ActionState {
    /// Moves to `next`: Planned to Executing, Executing to Applied or Failed.
    pub fn advance(&mut self, next: ActionState) -> Result<(), InvalidTransition> {
        let valid = matches!(
            (*self, next),
            (Self::Planned, Self::Executing)
                | (Self::Executing, Self::Applied)
                | (Self::Executing, Self::Failed)
        );
        if !valid {
            return Err(InvalidTransition {
                from: *self,
                to: next,
            });
        }
        *self = next;
        Ok(())
    }

    pub fn is_final(self) -> bool {
        matches!(self, Self::Applied | Self::Failed)
    }
}

/// Renders a size for humans, e.g. `1.00 GiB`.
pub fn format_size(size: ByteCount) -> String {
    const UNITS: [&str; 6] = ["B", "KiB", "MiB", "GiB", "TiB", "PiB"];

    let bytes = size.bytes();
    if bytes < 1024 {
        return format!("{bytes} B");
    }

    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    format!("{value:.2} {}", UNITS[unit])
}
