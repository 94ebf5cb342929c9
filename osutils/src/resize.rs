//! Filesystem resizing. All tools grow to the size of the device unless a
//! size is given.

use std::{path::Path, process::Command};

use anyhow::{bail, Context, Error};
use log::info;

use sysdefs::filesystems::FsType;

use crate::{exe::RunAndCheck, mkswap};

/// Resizes the filesystem on `device` to `size` bytes. Filesystems that can
/// only grow while mounted get a temporary mount.
pub fn run(device: impl AsRef<Path>, fs_type: FsType, size: u64, label: &str) -> Result<(), Error> {
    let device = device.as_ref();
    info!(
        "Resizing {fs_type} filesystem on '{}' to {size} bytes",
        device.display()
    );

    match fs_type {
        FsType::Ext2 | FsType::Ext3 | FsType::Ext4 => {
            Command::new("e2fsck")
                .arg("-f")
                .arg("-p")
                .arg(device)
                .run_and_check()
                .context("Failed to execute e2fsck")?;
            Command::new("resize2fs")
                .arg(device)
                .arg(format!("{}K", size >> 10))
                .run_and_check()
                .context("Failed to execute resize2fs")
        }
        FsType::Ntfs => Command::new("ntfsresize")
            .arg("--force")
            .arg("--no-action")
            .arg("--size")
            .arg(size.to_string())
            .arg(device)
            .run_and_check()
            .and_then(|()| {
                Command::new("ntfsresize")
                    .arg("--force")
                    .arg("--size")
                    .arg(size.to_string())
                    .arg(device)
                    .run_and_check()
            })
            .context("Failed to execute ntfsresize"),
        FsType::Vfat => Command::new("fatresize")
            .arg("--size")
            .arg(size.to_string())
            .arg(device)
            .run_and_check()
            .context("Failed to execute fatresize"),
        // Swap has no payload worth keeping
        FsType::Swap => mkswap::run(device, label),
        FsType::Xfs | FsType::Btrfs => with_temporary_mount(device, fs_type, |dir| {
            let mut cmd = if fs_type == FsType::Xfs {
                let mut cmd = Command::new("xfs_growfs");
                cmd.arg(dir);
                cmd
            } else {
                let mut cmd = Command::new("btrfs");
                cmd.arg("filesystem")
                    .arg("resize")
                    .arg(size.to_string())
                    .arg(dir);
                cmd
            };
            cmd.run_and_check()
                .with_context(|| format!("Failed to resize {fs_type} filesystem"))
        }),
        FsType::Exfat => bail!("Resizing exfat is not supported"),
    }
}

fn with_temporary_mount(
    device: &Path,
    fs_type: FsType,
    f: impl FnOnce(&Path) -> Result<(), Error>,
) -> Result<(), Error> {
    let dir = tempfile::tempdir().context("Failed to create temporary mount point")?;
    crate::mount::mount(device, dir.path(), fs_type, &[])?;
    let result = f(dir.path());
    crate::mount::umount(dir.path())?;
    result
}
