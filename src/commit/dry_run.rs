use log::info;

use crate::actiongraph::Action;

use super::{CommitContext, DeviceTool, ToolError};

/// Logs the actions instead of running them.
#[derive(Debug, Default, Clone, Copy)]
pub struct DryRunTool;

impl DeviceTool for DryRunTool {
    fn apply(&self, action: &Action, _context: &CommitContext) -> Result<(), ToolError> {
        info!("Would run: {action}");
        Ok(())
    }
}
