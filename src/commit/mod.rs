//! Execution of a planned actiongraph.
//!
//! Actions run strictly in plan order through the [`DeviceTool`] registered
//! for the kind of device they touch. The first failure stops the commit;
//! nothing is rolled back or retried.

use std::collections::HashMap;

use log::{debug, error, info};
use strum::IntoEnumIterator;
use strum_macros::{Display, EnumIter};

use devicegraph::{Device, DeviceKind, Devicegraph, DevicegraphError, Sid};

use crate::{
    actiongraph::{Action, ActionKind, ActionState, Actiongraph, InvalidTransition, ReallotMode},
    config::TargetMode,
};

mod dry_run;
pub mod system;

pub use dry_run::DryRunTool;

/// The families of command line tools actions are executed with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumIter)]
#[strum(serialize_all = "kebab-case")]
pub enum ToolKind {
    Partitioning,
    Filesystem,
    Mount,
    Raid,
    VolumeManager,
}

impl ToolKind {
    pub fn for_device(kind: DeviceKind) -> Self {
        match kind {
            DeviceKind::Disk | DeviceKind::Gpt | DeviceKind::Msdos | DeviceKind::Partition => {
                Self::Partitioning
            }
            DeviceKind::BlkFilesystem => Self::Filesystem,
            DeviceKind::MountPoint => Self::Mount,
            DeviceKind::Md => Self::Raid,
            DeviceKind::LvmPv | DeviceKind::LvmVg | DeviceKind::LvmLv => Self::VolumeManager,
        }
    }
}

fn tool_name(tool: &Option<ToolKind>) -> String {
    match tool {
        Some(kind) => format!("{kind} tool"),
        None => "Tool lookup".into(),
    }
}

/// A failed action. `tool` is unset when no tool could be picked because
/// the device of the action is in neither devicegraph.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{} failed on device {sid}: {message}", tool_name(.tool))]
pub struct ToolError {
    pub tool: Option<ToolKind>,
    pub sid: Sid,
    pub message: String,
}

impl ToolError {
    /// Wraps the error of a tool invocation, keeping its whole context chain.
    pub fn new(tool: ToolKind, sid: Sid, error: anyhow::Error) -> Self {
        Self {
            tool: Some(tool),
            sid,
            message: format!("{error:#}"),
        }
    }
}

/// What a tool gets to see of the plan.
#[derive(Debug, Clone, Copy)]
pub struct CommitContext<'a> {
    lhs: &'a Devicegraph,
    rhs: &'a Devicegraph,
    target_mode: TargetMode,
}

impl<'a> CommitContext<'a> {
    pub fn new(lhs: &'a Devicegraph, rhs: &'a Devicegraph, target_mode: TargetMode) -> Self {
        Self {
            lhs,
            rhs,
            target_mode,
        }
    }

    /// The devicegraph before the commit.
    pub fn lhs(&self) -> &'a Devicegraph {
        self.lhs
    }

    /// The devicegraph after the commit.
    pub fn rhs(&self) -> &'a Devicegraph {
        self.rhs
    }

    pub fn target_mode(&self) -> TargetMode {
        self.target_mode
    }

    /// The graph that describes the devices of the action while it runs:
    /// lhs for deletes and reduces, rhs for everything else.
    pub fn graph_for(&self, action: &Action) -> &'a Devicegraph {
        match action.kind() {
            ActionKind::Delete
            | ActionKind::Reallot {
                mode: ReallotMode::Reduce,
                ..
            } => self.lhs,
            _ => self.rhs,
        }
    }

    /// The primary device of the action.
    pub fn device(&self, action: &Action) -> Result<&'a Device, DevicegraphError> {
        self.graph_for(action).find_device(action.sid())
    }
}

/// Executes actions on one kind of device.
pub trait DeviceTool: Send {
    fn apply(&self, action: &Action, context: &CommitContext) -> Result<(), ToolError>;
}

/// Maps tool kinds to the tools that execute them.
#[derive(Default)]
pub struct ToolSet {
    tools: HashMap<ToolKind, Box<dyn DeviceTool>>,
}

impl ToolSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_tool(mut self, kind: ToolKind, tool: Box<dyn DeviceTool>) -> Self {
        self.tools.insert(kind, tool);
        self
    }

    pub fn get(&self, kind: ToolKind) -> Option<&dyn DeviceTool> {
        self.tools.get(&kind).map(Box::as_ref)
    }

    /// Tools that change the devices of the running system.
    pub fn system() -> Self {
        Self::new()
            .with_tool(ToolKind::Partitioning, Box::new(system::Partitioning))
            .with_tool(ToolKind::Filesystem, Box::new(system::Filesystems))
            .with_tool(ToolKind::Mount, Box::new(system::Mounts))
            .with_tool(ToolKind::Raid, Box::new(system::Raid))
            .with_tool(ToolKind::VolumeManager, Box::new(system::VolumeManager))
    }

    /// Tools that only log what they would do.
    pub fn dry_run() -> Self {
        ToolKind::iter().fold(Self::new(), |tools, kind| {
            tools.with_tool(kind, Box::new(DryRunTool))
        })
    }

    /// Runs the action with the tool for the kind of its primary device. A
    /// device keeps its kind across both graphs, so either one may name it.
    pub fn apply(&self, action: &Action, context: &CommitContext) -> Result<(), ToolError> {
        let device = context
            .device(action)
            .or_else(|_| context.lhs().find_device(action.sid()))
            .or_else(|_| context.rhs().find_device(action.sid()))
            .map_err(|e| ToolError {
                tool: None,
                sid: action.sid(),
                message: e.to_string(),
            })?;

        let kind = ToolKind::for_device(device.kind());
        let tool = self.get(kind).ok_or_else(|| ToolError {
            tool: Some(kind),
            sid: action.sid(),
            message: format!("no {kind} tool registered"),
        })?;

        debug!("Running {kind} tool for '{action}'");
        tool.apply(action, context)
    }
}

/// Receives progress of a commit.
pub trait CommitObserver {
    /// Called before each action with its description.
    fn message(&mut self, text: &str);

    /// Called when an action failed.
    fn error(&mut self, text: &str);
}

/// Forwards commit progress to the log.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogObserver;

impl CommitObserver for LogObserver {
    fn message(&mut self, text: &str) {
        info!("{text}");
    }

    fn error(&mut self, text: &str) {
        error!("{text}");
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommitReport {
    /// All actions, in the order they were applied.
    pub applied: Vec<Action>,
}

#[derive(Debug, thiserror::Error)]
pub enum CommitError {
    #[error(
        "Commit stopped at '{failed_action}' after {} applied actions, {} not attempted: {error}",
        .applied_prefix.len(),
        .remaining.len()
    )]
    PartialFailure {
        applied_prefix: Vec<Action>,
        failed_action: Action,
        error: ToolError,
        remaining: Vec<Action>,
    },

    #[error(transparent)]
    InvalidTransition(#[from] InvalidTransition),
}

impl CommitError {
    pub fn sids(&self) -> Vec<Sid> {
        match self {
            Self::PartialFailure { failed_action, .. } => vec![failed_action.sid()],
            Self::InvalidTransition(_) => Vec::new(),
        }
    }
}

/// Applies the actions of the actiongraph one after the other.
#[tracing::instrument(skip_all)]
pub fn commit(
    actiongraph: &Actiongraph,
    tools: &ToolSet,
    observer: &mut dyn CommitObserver,
) -> Result<CommitReport, CommitError> {
    let context = CommitContext::new(
        actiongraph.lhs(),
        actiongraph.rhs(),
        actiongraph.target_mode(),
    );
    let actions = actiongraph.commit_actions();
    info!("Committing {} actions", actions.len());

    for (position, action) in actions.iter().enumerate() {
        let mut state = ActionState::Planned;
        observer.message(action.description());

        state.advance(ActionState::Executing)?;
        match tools.apply(action, &context) {
            Ok(()) => {
                state.advance(ActionState::Applied)?;
                debug!("Applied action {} of {}", position + 1, actions.len());
            }
            Err(error) => {
                state.advance(ActionState::Failed)?;
                observer.error(&error.to_string());
                return Err(CommitError::PartialFailure {
                    applied_prefix: actions[..position].iter().map(|a| (*a).clone()).collect(),
                    failed_action: (*action).clone(),
                    error,
                    remaining: actions[position + 1..]
                        .iter()
                        .map(|a| (*a).clone())
                        .collect(),
                });
            }
        }
    }

    Ok(CommitReport {
        applied: actions.into_iter().cloned().collect(),
    })
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use devicegraph::{ByteCount, IdentityRegistry, Region};
    use sysdefs::{
        filesystems::FsType,
        partition_types::{PartitionType, PtType},
    };

    use super::*;

    /// Records the actions it is asked to run and fails on one sid.
    struct RecordingTool {
        seen: Arc<Mutex<Vec<String>>>,
        fail_on: Option<Sid>,
    }

    impl DeviceTool for RecordingTool {
        fn apply(&self, action: &Action, _context: &CommitContext) -> Result<(), ToolError> {
            self.seen
                .lock()
                .unwrap()
                .push(action.description().to_string());
            if self.fail_on == Some(action.sid()) {
                return Err(ToolError::new(
                    ToolKind::Filesystem,
                    action.sid(),
                    anyhow::anyhow!("mkfs exploded").context("Failed to create filesystem"),
                ));
            }
            Ok(())
        }
    }

    #[derive(Default)]
    struct CollectingObserver {
        messages: Vec<String>,
        errors: Vec<String>,
    }

    impl CommitObserver for CollectingObserver {
        fn message(&mut self, text: &str) {
            self.messages.push(text.into());
        }

        fn error(&mut self, text: &str) {
            self.errors.push(text.into());
        }
    }

    fn plan() -> (Actiongraph, Sid) {
        let registry = IdentityRegistry::new();
        let mut lhs = Devicegraph::new(&registry);
        let sda = lhs.create_disk("/dev/sda", ByteCount::from_gib(8)).unwrap();
        let mut rhs = lhs.copy();
        let gpt = rhs.create_partition_table(sda, PtType::Gpt).unwrap();
        let sda1 = rhs
            .create_partition(
                gpt,
                "/dev/sda1",
                Region::new(2048, 1048576, 512),
                PartitionType::Primary,
            )
            .unwrap();
        let ext4 = rhs.create_blk_filesystem(sda1, FsType::Ext4).unwrap();
        rhs.create_mount_point(ext4, "/srv").unwrap();
        (
            Actiongraph::new(&lhs, &rhs, TargetMode::Direct).unwrap(),
            ext4,
        )
    }

    fn recording_tools(fail_on: Option<Sid>) -> (ToolSet, Arc<Mutex<Vec<String>>>) {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let tools = ToolKind::iter().fold(ToolSet::new(), |tools, kind| {
            tools.with_tool(
                kind,
                Box::new(RecordingTool {
                    seen: seen.clone(),
                    fail_on,
                }),
            )
        });
        (tools, seen)
    }

    #[test]
    fn test_tool_kind() {
        let expected = maplit::hashmap! {
            DeviceKind::Disk => ToolKind::Partitioning,
            DeviceKind::Gpt => ToolKind::Partitioning,
            DeviceKind::Msdos => ToolKind::Partitioning,
            DeviceKind::Partition => ToolKind::Partitioning,
            DeviceKind::BlkFilesystem => ToolKind::Filesystem,
            DeviceKind::MountPoint => ToolKind::Mount,
            DeviceKind::Md => ToolKind::Raid,
            DeviceKind::LvmPv => ToolKind::VolumeManager,
            DeviceKind::LvmVg => ToolKind::VolumeManager,
            DeviceKind::LvmLv => ToolKind::VolumeManager,
        };
        for kind in DeviceKind::iter() {
            assert_eq!(ToolKind::for_device(kind), expected[&kind], "{kind}");
        }
        assert_eq!(ToolKind::VolumeManager.to_string(), "volume-manager");
    }

    #[test]
    fn test_commit() {
        let (actiongraph, _) = plan();
        let (tools, seen) = recording_tools(None);
        let mut observer = CollectingObserver::default();

        let report = commit(&actiongraph, &tools, &mut observer).unwrap();
        assert_eq!(report.applied.len(), 4);
        assert_eq!(
            *seen.lock().unwrap(),
            vec![
                "Create GPT partition table on /dev/sda",
                "Create partition /dev/sda1 (512.00 MiB)",
                "Create ext4 on /dev/sda1",
                "Mount /dev/sda1 at /srv",
            ]
        );
        assert_eq!(observer.messages, *seen.lock().unwrap());
        assert!(observer.errors.is_empty());
    }

    #[test]
    fn test_partial_failure() {
        let (actiongraph, ext4) = plan();
        let (tools, seen) = recording_tools(Some(ext4));
        let mut observer = CollectingObserver::default();

        let error = commit(&actiongraph, &tools, &mut observer).unwrap_err();
        assert_eq!(error.sids(), vec![ext4]);
        match error {
            CommitError::PartialFailure {
                applied_prefix,
                failed_action,
                error,
                remaining,
            } => {
                assert_eq!(applied_prefix.len(), 2);
                assert_eq!(failed_action.description(), "Create ext4 on /dev/sda1");
                assert_eq!(error.sid, ext4);
                assert_eq!(error.message, "Failed to create filesystem: mkfs exploded");
                assert_eq!(remaining.len(), 1);
                assert_eq!(remaining[0].description(), "Mount /dev/sda1 at /srv");
            }
            other => panic!("unexpected error: {other}"),
        }

        // Nothing ran after the failure.
        assert_eq!(seen.lock().unwrap().len(), 3);
        assert_eq!(observer.messages.len(), 3);
        assert_eq!(
            observer.errors,
            vec![format!(
                "filesystem tool failed on device {ext4}: Failed to create filesystem: mkfs exploded"
            )]
        );
    }

    #[test]
    fn test_missing_tool() {
        let (actiongraph, _) = plan();
        let tools = ToolSet::new();
        let error = commit(&actiongraph, &tools, &mut LogObserver).unwrap_err();
        match error {
            CommitError::PartialFailure { error, .. } => {
                assert_eq!(error.tool, Some(ToolKind::Partitioning));
                assert_eq!(error.message, "no partitioning tool registered");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_tool_for_unknown_device() {
        let (actiongraph, ext4) = plan();
        let context = CommitContext::new(
            actiongraph.rhs(),
            actiongraph.lhs(),
            TargetMode::Direct,
        );
        let tools = ToolSet::new();

        // The graph a create reads from does not know the filesystem
        let action = Action::new(ext4, ActionKind::Create, "Create ext4");
        let error = tools.apply(&action, &context).unwrap_err();
        assert_eq!(error.tool, Some(ToolKind::Filesystem));
        assert_eq!(error.message, "no filesystem tool registered");

        let action = Action::new(Sid(4242), ActionKind::Create, "Create nothing");
        let error = tools.apply(&action, &context).unwrap_err();
        assert_eq!(error.tool, None);
        assert_eq!(error.sid, Sid(4242));
        assert!(error.to_string().starts_with("Tool lookup failed on device 4242"));
    }

    #[test]
    fn test_dry_run() {
        let (actiongraph, _) = plan();
        let report = commit(&actiongraph, &ToolSet::dry_run(), &mut LogObserver).unwrap();
        assert_eq!(report.applied.len(), actiongraph.len());
    }
}
