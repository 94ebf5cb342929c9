//! In-memory model of the storage configuration of a machine.
//!
//! A [`Devicegraph`] holds devices (disks, partition tables, partitions,
//! filesystems, mount points, MD arrays and LVM objects) as nodes and the
//! relations between them ("holders") as directed edges. Every device and
//! holder carries a [`Sid`], a storage id that stays stable across copies of
//! a graph and is the only identity the diff engine relies on.

pub mod bytes;
pub mod cardinality;
pub mod devices;
pub mod error;
pub mod graph;
pub mod holders;
pub mod sid;
pub mod types;

mod compare;
mod display;
mod modify;
mod rules;
mod serialization;


pub use bytes::{ByteCount, Region};
pub use devices::{
    BlkDevice, BlkFilesystem, Device, DeviceRef, Disk, Gpt, LvmLv, LvmPv, LvmVg, Md, MountPoint,
    Msdos, Partition, PartitionTable, Partitionable,
};
pub use error::{DevicegraphError, Violation, ViolationKind, Violations};
pub use graph::{Devicegraph, HolderView};
pub use holders::{
    FilesystemUser, Holder, HolderRef, LvmPvUser, MdUser, Subdevice, User, UserHolder,
};
pub use sid::{IdentityRegistry, Sid};
pub use types::{DeviceKind, DeviceKindFlag, HolderKind, HolderKindFlag};
