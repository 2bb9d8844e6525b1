//! Capabilities the streamer calls out to. Absent collaborators are the
//! no-op implementations below, never `Option`s.

use tessel_chunk::Chunk;
use tessel_mesh_cpu::MeshBuffers;
use tessel_world::{ChunkCoord, ChunkId};

/// Capacity problems. Non-fatal: the request is dropped or deferred.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Diagnostic {
    RenderQueueExhausted,
    OctreeStackFull,
    MeshRingFull,
    ReuseBufferTooSmall,
    LightQueueOverflow,
    ArenaExhausted,
}

impl Diagnostic {
    pub const COUNT: usize = 6;

    #[inline]
    pub fn index(self) -> usize {
        self as usize
    }

    pub fn message(self) -> &'static str {
        match self {
            Diagnostic::RenderQueueExhausted => "render queue full, dropping refresh request",
            Diagnostic::OctreeStackFull => "octree candidate stack full, deferring cuboid",
            Diagnostic::MeshRingFull => "mesh job ring full, retrying next frame",
            Diagnostic::ReuseBufferTooSmall => {
                "chunk pool too small for the view distance, reusing a chunk near its target"
            }
            Diagnostic::LightQueueOverflow => "light queue overflowed, lighting may be incomplete",
            Diagnostic::ArenaExhausted => "no chunk record can be reused, creation skipped",
        }
    }
}

/// Chunk lifecycle notifications. All methods default to doing nothing.
#[allow(unused_variables)]
pub trait ChunkEvents {
    fn before_create(&mut self, coord: ChunkCoord) {}
    fn after_create(&mut self, chunk: &Chunk) {}
    /// A voxel or light edit touched this chunk.
    fn chunk_changed(&mut self, chunk: &Chunk) {}
    /// First mesh uploaded with no face built against a stand-in.
    fn first_rendered(&mut self, chunk: &Chunk) {}
    /// Veto for the reuse scan; returning false keeps the chunk.
    fn allow_reuse(&mut self, chunk: &Chunk) -> bool {
        true
    }
    /// `chunk` still holds its old state and is about to move away from `previous`.
    fn reused(&mut self, chunk: &Chunk, previous: ChunkCoord) {}
    fn visibility_changed(&mut self, chunk: &Chunk, visible: bool) {}
    fn mesh_ready(&mut self, chunk: &Chunk) {}
    fn diagnostic(&mut self, diagnostic: Diagnostic) {}
}

pub struct NoEvents;

impl ChunkEvents for NoEvents {}

pub struct MeshUpload<'a> {
    pub chunk: ChunkId,
    pub coord: ChunkCoord,
    pub buffers: &'a MeshBuffers,
    /// Voxel content differs from the last upload; collider data should be replaced.
    pub collider_changed: bool,
}

/// Receives finished meshes on the main thread.
pub trait MeshSink {
    fn upload(&mut self, upload: &MeshUpload<'_>);
    fn release(&mut self, chunk: ChunkId, coord: ChunkCoord);
}

pub struct NullMeshSink;

impl MeshSink for NullMeshSink {
    fn upload(&mut self, _upload: &MeshUpload<'_>) {}

    fn release(&mut self, _chunk: ChunkId, _coord: ChunkCoord) {}
}
