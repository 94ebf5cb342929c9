use std::process::Command;

use anyhow::{Context, Error};
use log::trace;

use crate::exe::RunAndCheck;

/// Waits until udev processed all events, so device nodes of new partitions
/// and arrays exist.
pub fn settle() -> Result<(), Error> {
    trace!("Waiting for udev to settle");
    Command::new("udevadm")
        .arg("settle")
        .run_and_check()
        .context("Failed to settle udev")
}
