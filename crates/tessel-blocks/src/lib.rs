//! Voxel record and material table crate.
#![forbid(unsafe_code)]

pub mod material;
pub mod voxel;

pub use material::{MaterialDef, MaterialTable, MaterialsConfig, RenderCategory};
pub use voxel::{LIGHT_MAX, MaterialId, OPACITY_FULL, Voxel};
