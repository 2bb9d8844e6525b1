use std::fmt;

use tessel_world::ChunkCoord;

/// Phase of the frame update, reported when a frame is abandoned.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Stage {
    #[default]
    Idle,
    Deferred,
    Observer,
    NearScan,
    Explore,
    Upload,
    Lighting,
    Submit,
    Unload,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Stage::Idle => "idle",
            Stage::Deferred => "deferred",
            Stage::Observer => "observer",
            Stage::NearScan => "near-scan",
            Stage::Explore => "explore",
            Stage::Upload => "upload",
            Stage::Lighting => "lighting",
            Stage::Submit => "submit",
            Stage::Unload => "unload",
        };
        f.write_str(s)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum StreamError {
    #[error("failed to start mesh workers: {0}")]
    WorkerPool(#[from] rayon::ThreadPoolBuildError),
    #[error("no reusable chunk record for {coord:?}")]
    ArenaExhausted { coord: ChunkCoord },
    #[error("{coord:?} lies outside the addressable world")]
    OutsideWorld { coord: ChunkCoord },
    #[error("panic during {stage}: {message}")]
    Panicked { stage: Stage, message: String },
}
