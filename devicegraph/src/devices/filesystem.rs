use serde::{Deserialize, Serialize};

use sysdefs::filesystems::FsType;

use crate::{
    error::DevicegraphError,
    graph::Devicegraph,
    holders::{FilesystemUser, Holder},
    sid::Sid,
};

use super::Device;

/// A filesystem on one or more block devices.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct BlkFilesystem {
    pub sid: Sid,
    pub fs_type: FsType,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub label: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub uuid: String,
}

impl Devicegraph {
    /// Creates a filesystem on an unused block device.
    pub fn create_blk_filesystem(
        &mut self,
        blk_device: Sid,
        fs_type: FsType,
    ) -> Result<Sid, DevicegraphError> {
        self.find_device(blk_device)?.to_blk_device()?;
        self.ensure_unused(blk_device)?;

        let sid = self.registry().allocate();
        let device = Device::BlkFilesystem(BlkFilesystem {
            sid,
            fs_type,
            label: String::new(),
            uuid: String::new(),
        });
        let holder = Holder::FilesystemUser(FilesystemUser::new(self.registry().allocate()));
        self.attach_new(blk_device, device, holder)
    }

    pub fn set_label(&mut self, sid: Sid, label: impl Into<String>) -> Result<(), DevicegraphError> {
        let filesystem = self.find_device_mut(sid)?.to_blk_filesystem_mut()?;
        if !filesystem.fs_type.supports_label() {
            return Err(DevicegraphError::invalid(
                sid,
                format!("{} does not support labels", filesystem.fs_type),
            ));
        }
        filesystem.label = label.into();
        Ok(())
    }

    /// The filesystem directly on the block device, if any.
    pub fn filesystem_on(&self, blk_device: Sid) -> Result<Option<Sid>, DevicegraphError> {
        self.find_device(blk_device)?.to_blk_device()?;
        Ok(self.children(blk_device)?.into_iter().find(|sid| {
            self.find_device(*sid)
                .is_ok_and(|device| device.is_blk_filesystem())
        }))
    }

    /// The block devices the filesystem lives on, sorted by sid.
    pub fn blk_devices_of(&self, filesystem: Sid) -> Result<Vec<Sid>, DevicegraphError> {
        self.find_device(filesystem)?.to_blk_filesystem()?;
        self.parents(filesystem)
    }
}
