use std::{path::Path, process::Command};

use anyhow::{bail, Context, Error};
use log::info;

use sysdefs::filesystems::FsType;

use crate::{exe::RunAndCheck, files};

fn mount_command(device: &Path, mount_dir: &Path, fs_type: FsType, options: &[String]) -> Command {
    let mut cmd = Command::new("mount");
    if !options.is_empty() {
        cmd.arg("-o").arg(options.join(","));
    }
    cmd.arg("-t").arg(fs_type.mkfs_name()).arg(device).arg(mount_dir);
    cmd
}

/// Mounts `device` on `mount_dir`, creating the directory if needed.
pub fn mount(
    device: impl AsRef<Path>,
    mount_dir: impl AsRef<Path>,
    fs_type: FsType,
    options: &[String],
) -> Result<(), Error> {
    info!(
        "Mounting '{}' on '{}'",
        device.as_ref().display(),
        mount_dir.as_ref().display()
    );
    ensure_mount_directory(mount_dir.as_ref())?;
    mount_command(device.as_ref(), mount_dir.as_ref(), fs_type, options)
        .run_and_check()
        .with_context(|| {
            format!(
                "Failed to mount {} to path {}",
                device.as_ref().display(),
                mount_dir.as_ref().display()
            )
        })
}

pub fn umount(mount_dir: impl AsRef<Path>) -> Result<(), Error> {
    info!("Unmounting '{}'", mount_dir.as_ref().display());
    Command::new("umount")
        .arg(mount_dir.as_ref())
        .run_and_check()
        .with_context(|| {
            format!(
                "Failed to unmount directory {}",
                mount_dir.as_ref().display()
            )
        })
}

/// Makes sure `path` is a directory a filesystem can be mounted on.
pub fn ensure_mount_directory(path: &Path) -> Result<(), Error> {
    if path.exists() {
        if !path.is_dir() {
            bail!("Mount path '{}' is not a directory", path.display());
        }
        return Ok(());
    }

    files::create_dirs(path)
        .with_context(|| format!("Failed to create mount path '{}'", path.display()))
}
