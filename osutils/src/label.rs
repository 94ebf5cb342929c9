use std::{path::Path, process::Command};

use anyhow::{Context, Error};
use log::info;

use sysdefs::filesystems::FsType;

use crate::exe::RunAndCheck;

fn label_command(device: &Path, fs_type: FsType, label: &str) -> Option<Command> {
    let mut cmd;
    match fs_type {
        FsType::Ext2 | FsType::Ext3 | FsType::Ext4 => {
            cmd = Command::new("e2label");
            cmd.arg(device).arg(label);
        }
        FsType::Xfs => {
            cmd = Command::new("xfs_admin");
            cmd.arg("-L").arg(if label.is_empty() { "--" } else { label }).arg(device);
        }
        FsType::Btrfs => {
            cmd = Command::new("btrfs");
            cmd.arg("filesystem").arg("label").arg(device).arg(label);
        }
        FsType::Vfat => {
            cmd = Command::new("fatlabel");
            cmd.arg(device).arg(label);
        }
        FsType::Ntfs => {
            cmd = Command::new("ntfslabel");
            cmd.arg(device).arg(label);
        }
        FsType::Swap => {
            cmd = Command::new("swaplabel");
            cmd.arg("--label").arg(label).arg(device);
        }
        FsType::Exfat => return None,
    }
    Some(cmd)
}

/// Sets the label of an existing filesystem.
pub fn set(device: impl AsRef<Path>, fs_type: FsType, label: &str) -> Result<(), Error> {
    info!(
        "Setting label of {fs_type} filesystem on '{}' to '{label}'",
        device.as_ref().display()
    );
    label_command(device.as_ref(), fs_type, label)
        .with_context(|| format!("Filesystem type {fs_type} has no label tool"))?
        .run_and_check()
        .context("Failed to set filesystem label")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_label_command() {
        let device = Path::new("/dev/md0");
        let render = |fs_type, label| label_command(device, fs_type, label).map(|c| c.render_command());
        assert_eq!(render(FsType::Ext4, "data").unwrap(), "e2label /dev/md0 data");
        assert_eq!(render(FsType::Xfs, "").unwrap(), "xfs_admin -L -- /dev/md0");
        assert_eq!(
            render(FsType::Swap, "swap").unwrap(),
            "swaplabel --label swap /dev/md0"
        );
        assert!(render(FsType::Exfat, "x").is_none());
    }
}
