use std::{path::Path, process::Command};

use anyhow::{Context, Error};
use log::info;

use sysdefs::partition_types::{PartitionType, PtType};

use crate::exe::RunAndCheck;

/// `parted --script <disk> unit s <args>`, so all positions are in sectors.
fn parted(disk: &Path) -> Command {
    let mut cmd = Command::new("parted");
    cmd.arg("--script")
        .arg("--align")
        .arg("none")
        .arg(disk)
        .arg("unit")
        .arg("s");
    cmd
}

pub fn mklabel(disk: impl AsRef<Path>, pt_type: PtType) -> Result<(), Error> {
    info!(
        "Creating {pt_type} partition table on '{}'",
        disk.as_ref().display()
    );
    parted(disk.as_ref())
        .arg("mklabel")
        .arg(pt_type.parted_label())
        .run_and_check()
        .context("Failed to create partition table")
}

/// Creates a partition covering sectors `start..start + length`.
pub fn mkpart(
    disk: impl AsRef<Path>,
    partition_type: PartitionType,
    start: u64,
    length: u64,
) -> Result<(), Error> {
    info!(
        "Creating {partition_type} partition on '{}' at sector {start}",
        disk.as_ref().display()
    );
    parted(disk.as_ref())
        .arg("mkpart")
        .arg(<&str>::from(partition_type))
        .arg(format!("{start}s"))
        .arg(format!("{}s", start + length.saturating_sub(1)))
        .run_and_check()
        .context("Failed to create partition")
}

pub fn rm(disk: impl AsRef<Path>, number: u32) -> Result<(), Error> {
    info!(
        "Deleting partition {number} of '{}'",
        disk.as_ref().display()
    );
    parted(disk.as_ref())
        .arg("rm")
        .arg(number.to_string())
        .run_and_check()
        .context("Failed to delete partition")
}

/// Moves the end of partition `number` so that it spans `length` sectors
/// from `start`.
pub fn resizepart(disk: impl AsRef<Path>, number: u32, start: u64, length: u64) -> Result<(), Error> {
    info!(
        "Resizing partition {number} of '{}' to {length} sectors",
        disk.as_ref().display()
    );
    parted(disk.as_ref())
        .arg("resizepart")
        .arg(number.to_string())
        .arg(format!("{}s", start + length.saturating_sub(1)))
        .run_and_check()
        .context("Failed to resize partition")
}

pub fn set_flag(disk: impl AsRef<Path>, number: u32, flag: &str, on: bool) -> Result<(), Error> {
    parted(disk.as_ref())
        .arg("set")
        .arg(number.to_string())
        .arg(flag)
        .arg(if on { "on" } else { "off" })
        .run_and_check()
        .with_context(|| format!("Failed to set flag '{flag}' on partition {number}"))
}

#[cfg(test)]
mod tests {
    use crate::exe::RunAndCheck;

    use super::*;

    #[test]
    fn test_parted_command() {
        let mut cmd = parted(Path::new("/dev/sda"));
        cmd.arg("mkpart").arg("primary");
        assert_eq!(
            cmd.render_command(),
            "parted --script --align none /dev/sda unit s mkpart primary"
        );
        assert_eq!(<&str>::from(PartitionType::Logical), "logical");
        assert_eq!(PtType::Msdos.parted_label(), "msdos");
    }
}
