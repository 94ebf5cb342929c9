use std::{
    path::{Path, PathBuf},
    process::Command,
};

use anyhow::{Context, Error};
use lazy_static::lazy_static;
use log::{debug, info};
use regex::Regex;
use serde::{Deserialize, Serialize};

use sysdefs::raid::MdLevel;

use crate::exe::RunAndCheck;

pub const METADATA_VERSION: &str = "1.2";

lazy_static! {
    static ref ARRAY: Regex = Regex::new(r"ARRAY\s+(/dev/md\S+)").unwrap();
    static ref LEVEL: Regex = Regex::new(r"(?:^|\s)level=(\w+)").unwrap();
    static ref NUM_DEVICES: Regex = Regex::new(r"(?:^|\s)num-devices=(\d+)").unwrap();
    static ref UUID: Regex = Regex::new(r"(?:^|\s)UUID=([\da-zA-Z:]+)").unwrap();
    static ref DEVICES: Regex = Regex::new(r"(?:^|\s)devices=([^=\s]+)").unwrap();
}

/// Creates an array. `chunk_size` is in bytes and ignored for raid1.
pub fn create(
    md: impl AsRef<Path>,
    level: MdLevel,
    chunk_size: Option<u64>,
    devices: &[PathBuf],
) -> Result<(), Error> {
    info!("Creating RAID array '{}'", md.as_ref().display());

    let mut cmd = Command::new("mdadm");
    cmd.arg("--create")
        .arg(md.as_ref())
        .arg("--run")
        .arg(format!("--level={level}"))
        .arg(format!("--metadata={METADATA_VERSION}"))
        .arg(format!("--raid-devices={}", devices.len()));
    if let Some(chunk_size) = chunk_size.filter(|_| level != MdLevel::Raid1) {
        cmd.arg(format!("--chunk={}K", chunk_size >> 10));
    }
    cmd.args(devices)
        .run_and_check()
        .context("Failed to run mdadm create")
}

pub fn stop(md: impl AsRef<Path>) -> Result<(), Error> {
    info!("Stopping RAID array '{}'", md.as_ref().display());

    Command::new("mdadm")
        .arg("--stop")
        .arg(md.as_ref())
        .run_and_check()
        .with_context(|| format!("Failed to stop RAID array {}", md.as_ref().display()))
}

/// Assembles an array from its members under the given name.
pub fn assemble(md: impl AsRef<Path>, devices: &[PathBuf]) -> Result<(), Error> {
    info!("Assembling RAID array '{}'", md.as_ref().display());

    Command::new("mdadm")
        .arg("--assemble")
        .arg(md.as_ref())
        .arg("--run")
        .args(devices)
        .run_and_check()
        .context("Failed to run mdadm assemble")
}

/// Erases the RAID superblock of a former member.
pub fn zero_superblock(device: impl AsRef<Path>) -> Result<(), Error> {
    Command::new("mdadm")
        .arg("--zero-superblock")
        .arg(device.as_ref())
        .run_and_check()
        .context("Failed to run mdadm zero-superblock")
}

pub fn add(md: impl AsRef<Path>, device: impl AsRef<Path>) -> Result<(), Error> {
    info!(
        "Adding RAID device '{}' to '{}'",
        device.as_ref().display(),
        md.as_ref().display()
    );

    Command::new("mdadm")
        .arg(md.as_ref())
        .arg("--add")
        .arg(device.as_ref())
        .run_and_check()
        .context("Failed to run mdadm add device")
}

pub fn fail(md: impl AsRef<Path>, device: impl AsRef<Path>) -> Result<(), Error> {
    info!(
        "Marking RAID device '{}' as failed for '{}'",
        device.as_ref().display(),
        md.as_ref().display()
    );

    Command::new("mdadm")
        .arg(md.as_ref())
        .arg("--fail")
        .arg(device.as_ref())
        .run_and_check()
        .context("Failed to run mdadm fail device")
}

pub fn remove(md: impl AsRef<Path>, device: impl AsRef<Path>) -> Result<(), Error> {
    info!(
        "Removing RAID device '{}' from '{}'",
        device.as_ref().display(),
        md.as_ref().display()
    );

    Command::new("mdadm")
        .arg(md.as_ref())
        .arg("--remove")
        .arg(device.as_ref())
        .run_and_check()
        .context("Failed to run mdadm remove device")
}

/// Changes the number of active members of an array.
pub fn grow(md: impl AsRef<Path>, raid_devices: usize) -> Result<(), Error> {
    info!(
        "Reshaping RAID array '{}' to {raid_devices} devices",
        md.as_ref().display()
    );

    Command::new("mdadm")
        .arg("--grow")
        .arg(md.as_ref())
        .arg(format!("--raid-devices={raid_devices}"))
        .run_and_check()
        .context("Failed to run mdadm grow")
}

#[derive(Serialize, Deserialize, Clone, Debug, Hash, Eq, PartialEq, Default)]
pub struct MdadmDetail {
    pub raid_path: PathBuf,
    pub level: String,
    pub uuid: String,
    /// Members the array was assembled with, including missing ones.
    pub num_devices: Option<u32>,
    pub devices: Vec<PathBuf>,
}

impl MdadmDetail {
    pub fn md_level(&self) -> Option<MdLevel> {
        self.level.parse().ok()
    }
}

/// Details of all assembled arrays.
pub fn details() -> Result<Vec<MdadmDetail>, Error> {
    debug!("Getting details for all RAID arrays");

    let output = Command::new("mdadm")
        .arg("--detail")
        .arg("--scan")
        .arg("--verbose")
        .output_and_check()
        .context("Failed to run mdadm detail")?;

    parse_details(&output).context("Failed to parse mdadm detail")
}

fn parse_details(output: &str) -> Result<Vec<MdadmDetail>, Error> {
    let mut details = Vec::new();
    let mut current = MdadmDetail::default();

    for line in output.lines() {
        if let Some(captures) = ARRAY.captures(line) {
            current.raid_path = captures
                .get(1)
                .context("Failed to parse RAID path from details")?
                .as_str()
                .into();
        }
        if let Some(captures) = LEVEL.captures(line) {
            current.level = captures
                .get(1)
                .context("Failed to parse RAID level from details")?
                .as_str()
                .to_owned();
        }
        if let Some(captures) = NUM_DEVICES.captures(line) {
            current.num_devices = captures
                .get(1)
                .context("Failed to parse RAID device count from details")?
                .as_str()
                .parse()
                .ok();
        }
        if let Some(captures) = UUID.captures(line) {
            current.uuid = captures
                .get(1)
                .context("Failed to parse RAID UUID from details")?
                .as_str()
                .to_owned();
        }
        if let Some(captures) = DEVICES.captures(line) {
            current.devices = captures
                .get(1)
                .context("Failed to parse RAID devices from details")?
                .as_str()
                .split(',')
                .map(PathBuf::from)
                .collect();
            details.push(std::mem::take(&mut current));
        }
    }

    Ok(details)
}
