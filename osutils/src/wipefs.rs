use std::{path::Path, process::Command};

use anyhow::{Context, Error};
use log::debug;

use crate::exe::RunAndCheck;

/// Erases all filesystem, RAID and partition table signatures of a device.
pub fn all(device: impl AsRef<Path>) -> Result<(), Error> {
    debug!("Wiping signatures of '{}'", device.as_ref().display());
    Command::new("wipefs")
        .arg("--all")
        .arg(device.as_ref())
        .run_and_check()
        .with_context(|| format!("Failed to wipe device '{}'", device.as_ref().display()))
}
