//! CPU mesher: turns a chunk and its neighbours into per-material vertex
//! buffers plus collider triangles (engine-only).
#![forbid(unsafe_code)]

mod buffers;
pub mod face;
mod mesh_build;
mod mesher;
mod neighborhood;

pub use buffers::{MeshBuffers, MeshPart, ModelInstance, PartKind};
pub use mesh_build::{ColliderBuild, MeshBuild};
pub use mesher::ChunkMesher;
pub use neighborhood::Neighborhood;
