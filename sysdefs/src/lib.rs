pub mod filesystems;
pub mod partition_types;
pub mod raid;
