use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::{
    error::DevicegraphError,
    graph::Devicegraph,
    holders::{Holder, User},
    sid::Sid,
};

use super::Device;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MountPoint {
    pub sid: Sid,
    pub path: PathBuf,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub options: Vec<String>,
}

impl Devicegraph {
    /// Mounts a filesystem at an absolute path.
    pub fn create_mount_point(
        &mut self,
        filesystem: Sid,
        path: impl AsRef<Path>,
    ) -> Result<Sid, DevicegraphError> {
        let path = path.as_ref();
        let fs_type = self.find_device(filesystem)?.to_blk_filesystem()?.fs_type;
        if !fs_type.is_mountable() {
            return Err(DevicegraphError::invalid(
                filesystem,
                format!("{fs_type} cannot be mounted"),
            ));
        }
        if !path.is_absolute() {
            return Err(DevicegraphError::invalid(
                filesystem,
                format!("mount path '{}' is not absolute", path.display()),
            ));
        }
        self.ensure_unused(filesystem)?;
        if let Some(other) = self
            .devices()
            .filter_map(Device::as_mount_point)
            .find(|mp| mp.path == path)
        {
            return Err(DevicegraphError::invalid(
                other.sid,
                format!("'{}' is already a mount point", path.display()),
            ));
        }

        let sid = self.registry().allocate();
        let device = Device::MountPoint(MountPoint {
            sid,
            path: path.to_path_buf(),
            options: Vec::new(),
        });
        let holder = Holder::User(User::new(self.registry().allocate()));
        self.attach_new(filesystem, device, holder)
    }

    /// The mount point of the filesystem, if it is mounted.
    pub fn mount_point_of(&self, filesystem: Sid) -> Result<Option<Sid>, DevicegraphError> {
        self.find_device(filesystem)?.to_blk_filesystem()?;
        Ok(self.children(filesystem)?.into_iter().find(|sid| {
            self.find_device(*sid)
                .is_ok_and(|device| device.is_mount_point())
        }))
    }
}

#[cfg(test)]
mod tests {
    use sysdefs::filesystems::FsType;

    use super::*;
    use crate::{bytes::ByteCount, sid::IdentityRegistry};

    #[test]
    fn test_mount_point() {
        let registry = IdentityRegistry::new();
        let mut graph = Devicegraph::new(&registry);
        let sda = graph.create_disk("/dev/sda", ByteCount::from_gib(1)).unwrap();
        let sdb = graph.create_disk("/dev/sdb", ByteCount::from_gib(1)).unwrap();
        let sdc = graph.create_disk("/dev/sdc", ByteCount::from_gib(1)).unwrap();
        let ext4 = graph.create_blk_filesystem(sda, FsType::Ext4).unwrap();
        let xfs = graph.create_blk_filesystem(sdb, FsType::Xfs).unwrap();
        let swap = graph.create_blk_filesystem(sdc, FsType::Swap).unwrap();

        assert_eq!(graph.mount_point_of(ext4).unwrap(), None);
        let data = graph.create_mount_point(ext4, "/data").unwrap();
        assert_eq!(graph.mount_point_of(ext4).unwrap(), Some(data));

        // Same path twice, relative paths, swap and a second mount point
        assert!(graph.create_mount_point(xfs, "/data").is_err());
        assert!(graph.create_mount_point(xfs, "data").is_err());
        assert!(graph.create_mount_point(swap, "/swap").is_err());
        assert_eq!(
            graph.create_mount_point(ext4, "/other"),
            Err(DevicegraphError::DeviceInUse { sid: ext4 })
        );

        graph.create_mount_point(xfs, "/srv").unwrap();
        graph.check_consistency().unwrap();
    }
}
