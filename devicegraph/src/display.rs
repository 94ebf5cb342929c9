//! Display implementations for devices, holders and whole devicegraphs.

use std::fmt::{self, Display};

use crate::{
    devices::Device,
    graph::{Devicegraph, HolderView},
    holders::Holder,
};

impl Display for Device {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} '{}'", self.kind(), self.sid(), self.display_name())?;
        match self {
            Self::Partition(partition) => write!(
                f,
                " {} {} id {}",
                partition.partition_type, partition.region, partition.id
            ),
            Self::BlkFilesystem(fs) if !fs.label.is_empty() => write!(f, " label '{}'", fs.label),
            Self::Md(md) => write!(f, " {} {}", md.level, md.region.size()),
            Self::LvmVg(vg) => write!(f, " extent size {}", vg.extent_size),
            other => match other.as_blk_device() {
                Some(blk) => write!(f, " {}", blk.size()),
                None => Ok(()),
            },
        }
    }
}

impl Display for Holder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.kind(), self.sid())?;
        if let Self::MdUser(user) = self {
            write!(f, " #{}", user.sort_key)?;
            if user.spare {
                write!(f, " spare")?;
            }
            if user.faulty {
                write!(f, " faulty")?;
            }
        }
        if !self.is_active() {
            write!(f, " (inactive)")?;
        }
        Ok(())
    }
}

impl Display for HolderView<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} -> {}: {}", self.parent, self.child, self.holder)
    }
}

impl Display for Devicegraph {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "Devicegraph with {} devices and {} holders",
            self.num_devices(),
            self.num_holders()
        )?;
        for device in self.devices() {
            writeln!(f, "  {device}")?;
        }
        for holder in self.holders() {
            writeln!(f, "  {holder}")?;
        }
        Ok(())
    }
}
