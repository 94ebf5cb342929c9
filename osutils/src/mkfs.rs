use std::{path::Path, process::Command};

use anyhow::{Context, Error};
use log::info;

use sysdefs::filesystems::FsType;

use crate::exe::RunAndCheck;

/// The option that sets the label at creation time.
fn label_option(fs_type: FsType) -> Option<&'static str> {
    match fs_type {
        FsType::Vfat => Some("-n"),
        FsType::Ext2 | FsType::Ext3 | FsType::Ext4 | FsType::Xfs | FsType::Btrfs => Some("-L"),
        FsType::Ntfs | FsType::Exfat => Some("-L"),
        FsType::Swap => None,
    }
}

fn mkfs_command(device: &Path, fs_type: FsType, label: &str) -> Command {
    let mut cmd = Command::new("mkfs");
    cmd.arg("--type").arg(fs_type.mkfs_name());
    match fs_type {
        // Overwrite existing signatures instead of refusing
        FsType::Xfs | FsType::Btrfs => {
            cmd.arg("-f");
        }
        FsType::Ntfs => {
            cmd.arg("--fast");
        }
        _ => (),
    }
    if let Some(option) = label_option(fs_type).filter(|_| !label.is_empty()) {
        cmd.arg(option).arg(label);
    }
    cmd.arg(device);
    cmd
}

/// Creates a filesystem. Swap is handled by [`crate::mkswap`].
pub fn run(device: impl AsRef<Path>, fs_type: FsType, label: &str) -> Result<(), Error> {
    info!(
        "Creating {fs_type} filesystem on '{}'",
        device.as_ref().display()
    );
    mkfs_command(device.as_ref(), fs_type, label)
        .run_and_check()
        .context("Failed to execute mkfs")
}
