use std::{path::Path, process::Command};

use anyhow::{Context, Error};
use log::info;

use crate::exe::RunAndCheck;

pub fn run(device: impl AsRef<Path>, label: &str) -> Result<(), Error> {
    info!("Creating swap on '{}'", device.as_ref().display());
    let mut cmd = Command::new("mkswap");
    cmd.arg("--verbose");
    if !label.is_empty() {
        cmd.arg("--label").arg(label);
    }
    cmd.arg(device.as_ref())
        .run_and_check()
        .context("Failed to execute mkswap")
}
