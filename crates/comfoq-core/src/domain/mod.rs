//! Domain knowledge about the ventilation unit: which sensors exist, how
//! their values are encoded, and which commands it accepts.

pub mod commands;
pub mod naming;
pub mod sensors;
