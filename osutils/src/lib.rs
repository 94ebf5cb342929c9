//! Wrappers around the command line tools that inspect and change storage
//! devices.

pub mod exe;
pub mod files;
pub mod label;
pub mod lsblk;
pub mod lvm;
pub mod mdadm;
pub mod mkfs;
pub mod mkswap;
pub mod mount;
pub mod parted;
pub mod resize;
pub mod sfdisk;
pub mod udevadm;
pub mod wipefs;

pub(crate) mod crate_private {
    pub trait Sealed {}
}
