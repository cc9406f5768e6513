//! Partition communication and the overlap-extension transforms.

pub mod comm;
pub mod extend;
