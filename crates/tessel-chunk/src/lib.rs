//! Chunk records, the fixed-capacity arena that owns them, and the
//! coordinate directory that links them together.
#![forbid(unsafe_code)]

mod arena;
mod chunk;
mod directory;
mod grid;

pub use arena::{Acquired, ArenaConfig, ChunkArena, ReuseQuery};
pub use chunk::{Chunk, Emitter, Population, RenderState};
pub use directory::{ChunkDirectory, DirEntry};
pub use grid::{Placeholders, VoxelGrid};
