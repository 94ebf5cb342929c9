use crate::{devices::Device, graph::Devicegraph, holders::Holder, sid::Sid};

/// A device with its sid cleared.
fn anonymous_device(device: &Device) -> String {
    let mut device = device.clone();
    device.set_sid(Sid(0));
    format!("{device:?}")
}

fn anonymous_holder(holder: &Holder) -> String {
    let mut holder = holder.clone();
    holder.set_sid(Sid(0));
    format!("{holder:?}")
}

impl Devicegraph {
    /// Whether both graphs describe the same storage setup regardless of the
    /// sids involved, e.g. two probes of the same system.
    ///
    /// Devices are compared by their attributes, holders by their attributes
    /// and the attributes of the devices they connect.
    pub fn structurally_equal(&self, other: &Devicegraph) -> bool {
        self.num_devices() == other.num_devices()
            && self.num_holders() == other.num_holders()
            && self.device_signatures() == other.device_signatures()
            && self.holder_signatures() == other.holder_signatures()
    }

    fn device_signatures(&self) -> Vec<String> {
        let mut signatures: Vec<String> = self.devices().map(anonymous_device).collect();
        signatures.sort();
        signatures
    }

    fn holder_signatures(&self) -> Vec<String> {
        let mut signatures: Vec<String> = self
            .holders()
            .map(|view| {
                let endpoint = |sid| {
                    self.find_device(sid)
                        .map(anonymous_device)
                        .unwrap_or_default()
                };
                format!(
                    "{} -> {} via {}",
                    endpoint(view.parent),
                    endpoint(view.child),
                    anonymous_holder(view.holder)
                )
            })
            .collect();
        signatures.sort();
        signatures
    }
}

#[cfg(test)]
mod tests {
    use sysdefs::{filesystems::FsType, partition_types::PtType};

    use crate::{bytes::ByteCount, sid::IdentityRegistry};

    use super::*;

    fn build(registry: &IdentityRegistry, fs_type: FsType) -> Devicegraph {
        let mut graph = Devicegraph::new(registry);
        let sda = graph.create_disk("/dev/sda", ByteCount::from_gib(1)).unwrap();
        graph.create_partition_table(sda, PtType::Gpt).unwrap();
        let sdb = graph.create_disk("/dev/sdb", ByteCount::from_gib(1)).unwrap();
        graph.create_blk_filesystem(sdb, fs_type).unwrap();
        graph
    }

    #[test]
    fn test_structurally_equal() {
        let registry = IdentityRegistry::new();
        let first = build(&registry, FsType::Ext4);
        let second = build(&registry, FsType::Ext4);
        let third = build(&registry, FsType::Xfs);

        // Different sids, same setup
        assert_ne!(first, second);
        assert!(first.structurally_equal(&second));
        assert!(!first.structurally_equal(&third));
        assert!(first.structurally_equal(&first.copy()));
    }
}
