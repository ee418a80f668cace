//! Bundle rendering and bin-packing.

pub mod naming;
mod packer;
pub mod render;

pub use packer::{pack_rules, Bundle, PackLimits};
