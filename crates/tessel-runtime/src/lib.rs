//! Streaming runtime: keeps the chunks around an observer loaded, lit and
//! meshed within per-frame time budgets.
#![forbid(unsafe_code)]

pub mod column_cache;
pub mod config;
pub mod deferred;
pub mod error;
pub mod hooks;
pub mod octree;
pub mod pipeline;
pub mod query;
pub mod render_queue;
pub mod streamer;

pub use column_cache::{ColumnCache, ColumnCacheStats};
pub use config::StreamConfig;
pub use deferred::{Deferred, DeferredHandle};
pub use error::{Stage, StreamError};
pub use hooks::{ChunkEvents, Diagnostic, MeshSink, MeshUpload, NoEvents, NullMeshSink};
pub use octree::VisibilityOctree;
pub use pipeline::{MeshJob, MeshPipeline, MeshResult};
pub use query::{RayHit, VoxelHit};
pub use render_queue::{QueueFlags, RenderQueue};
pub use streamer::{Collaborators, FrameReport, Observer, Streamer};
