//! LVM command line tools and their JSON reports.

use std::{
    path::{Path, PathBuf},
    process::Command,
};

use anyhow::{Context, Error};
use log::info;
use serde::{de::DeserializeOwned, Deserialize, Deserializer};

use crate::exe::RunAndCheck;

#[derive(Debug, Deserialize)]
struct Report<T> {
    report: Vec<T>,
}

#[derive(Debug, Deserialize)]
struct PvReport {
    pv: Vec<PvInfo>,
}

#[derive(Debug, Deserialize)]
struct VgReport {
    vg: Vec<VgInfo>,
}

#[derive(Debug, Deserialize)]
struct LvReport {
    lv: Vec<LvInfo>,
}

/// LVM reports every value as string, sizes included.
fn number<'de, D>(deserializer: D) -> Result<u64, D::Error>
where
    D: Deserializer<'de>,
{
    let value = String::deserialize(deserializer)?;
    value
        .trim()
        .trim_end_matches('B')
        .parse()
        .map_err(|e| serde::de::Error::custom(format!("invalid number '{value}': {e}")))
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct PvInfo {
    pub pv_name: PathBuf,
    /// Empty for physical volumes outside of any volume group
    pub vg_name: String,
    pub pv_uuid: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct VgInfo {
    pub vg_name: String,
    pub vg_uuid: String,
    #[serde(deserialize_with = "number")]
    pub vg_extent_size: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct LvInfo {
    pub lv_name: String,
    pub vg_name: String,
    #[serde(deserialize_with = "number")]
    pub lv_size: u64,
    #[serde(deserialize_with = "number")]
    pub stripes: u64,
}

fn report<R: DeserializeOwned>(tool: &str, fields: &str) -> Result<Vec<R>, Error> {
    let output = Command::new(tool)
        .arg("--reportformat")
        .arg("json")
        .arg("--units")
        .arg("b")
        .arg("--nosuffix")
        .arg("-o")
        .arg(fields)
        .output_and_check()
        .with_context(|| format!("Failed to run {tool}"))?;

    parse_report(&output).with_context(|| format!("Failed to parse {tool} report"))
}

fn parse_report<R: DeserializeOwned>(output: &str) -> Result<Vec<R>, Error> {
    let parsed: Report<R> = serde_json::from_str(output)?;
    Ok(parsed.report)
}

pub fn pvs() -> Result<Vec<PvInfo>, Error> {
    Ok(report::<PvReport>("pvs", "pv_name,vg_name,pv_uuid")?
        .into_iter()
        .flat_map(|r| r.pv)
        .collect())
}

pub fn vgs() -> Result<Vec<VgInfo>, Error> {
    Ok(report::<VgReport>("vgs", "vg_name,vg_uuid,vg_extent_size")?
        .into_iter()
        .flat_map(|r| r.vg)
        .collect())
}

pub fn lvs() -> Result<Vec<LvInfo>, Error> {
    Ok(report::<LvReport>("lvs", "lv_name,vg_name,lv_size,stripes")?
        .into_iter()
        .flat_map(|r| r.lv)
        .collect())
}

pub fn pvcreate(device: impl AsRef<Path>) -> Result<(), Error> {
    info!("Creating physical volume on '{}'", device.as_ref().display());
    Command::new("pvcreate")
        .arg("--yes")
        .arg(device.as_ref())
        .run_and_check()
        .context("Failed to run pvcreate")
}

pub fn pvremove(device: impl AsRef<Path>) -> Result<(), Error> {
    info!("Removing physical volume from '{}'", device.as_ref().display());
    Command::new("pvremove")
        .arg("--yes")
        .arg(device.as_ref())
        .run_and_check()
        .context("Failed to run pvremove")
}

/// Resizes the physical volume on `device` to `size` bytes.
pub fn pvresize(device: impl AsRef<Path>, size: u64) -> Result<(), Error> {
    info!(
        "Resizing physical volume on '{}' to {size} bytes",
        device.as_ref().display()
    );
    Command::new("pvresize")
        .arg("--yes")
        .arg("--setphysicalvolumesize")
        .arg(format!("{size}B"))
        .arg(device.as_ref())
        .run_and_check()
        .context("Failed to run pvresize")
}

pub fn vgcreate(vg_name: &str, extent_size: u64, devices: &[PathBuf]) -> Result<(), Error> {
    info!("Creating volume group '{vg_name}'");
    Command::new("vgcreate")
        .arg("--physicalextentsize")
        .arg(format!("{}k", extent_size >> 10))
        .arg(vg_name)
        .args(devices)
        .run_and_check()
        .context("Failed to run vgcreate")
}

pub fn vgextend(vg_name: &str, device: impl AsRef<Path>) -> Result<(), Error> {
    info!(
        "Adding '{}' to volume group '{vg_name}'",
        device.as_ref().display()
    );
    Command::new("vgextend")
        .arg(vg_name)
        .arg(device.as_ref())
        .run_and_check()
        .context("Failed to run vgextend")
}

pub fn vgreduce(vg_name: &str, device: impl AsRef<Path>) -> Result<(), Error> {
    info!(
        "Removing '{}' from volume group '{vg_name}'",
        device.as_ref().display()
    );
    Command::new("vgreduce")
        .arg(vg_name)
        .arg(device.as_ref())
        .run_and_check()
        .context("Failed to run vgreduce")
}

pub fn vgremove(vg_name: &str) -> Result<(), Error> {
    info!("Removing volume group '{vg_name}'");
    Command::new("vgremove")
        .arg("--force")
        .arg(vg_name)
        .run_and_check()
        .context("Failed to run vgremove")
}

pub fn vgrename(from: &str, to: &str) -> Result<(), Error> {
    Command::new("vgrename")
        .arg(from)
        .arg(to)
        .run_and_check()
        .context("Failed to run vgrename")
}

pub fn lvcreate(vg_name: &str, lv_name: &str, size: u64, stripes: u64) -> Result<(), Error> {
    info!("Creating logical volume '{vg_name}/{lv_name}'");
    let mut cmd = Command::new("lvcreate");
    cmd.arg("--yes")
        .arg("--name")
        .arg(lv_name)
        .arg("--size")
        .arg(format!("{size}B"));
    if stripes > 1 {
        cmd.arg("--stripes").arg(stripes.to_string());
    }
    cmd.arg(vg_name)
        .run_and_check()
        .context("Failed to run lvcreate")
}

pub fn lvremove(vg_name: &str, lv_name: &str) -> Result<(), Error> {
    info!("Removing logical volume '{vg_name}/{lv_name}'");
    Command::new("lvremove")
        .arg("--force")
        .arg(format!("{vg_name}/{lv_name}"))
        .run_and_check()
        .context("Failed to run lvremove")
}

/// Resizes the volume only, filesystems on it are resized separately.
pub fn lvresize(vg_name: &str, lv_name: &str, size: u64) -> Result<(), Error> {
    info!("Resizing logical volume '{vg_name}/{lv_name}' to {size} bytes");
    Command::new("lvresize")
        .arg("--force")
        .arg("--size")
        .arg(format!("{size}B"))
        .arg(format!("{vg_name}/{lv_name}"))
        .run_and_check()
        .context("Failed to run lvresize")
}

pub fn lvrename(vg_name: &str, from: &str, to: &str) -> Result<(), Error> {
    Command::new("lvrename")
        .arg(vg_name)
        .arg(from)
        .arg(to)
        .run_and_check()
        .context("Failed to run lvrename")
}
