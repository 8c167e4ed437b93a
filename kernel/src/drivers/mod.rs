//! Platform device drivers.

pub mod fw_cfg;
pub mod ramfb;
