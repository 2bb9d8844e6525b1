use std::error::Error;
use std::fs;
use std::path::Path;
use std::time::Duration;

use serde::Deserialize;
use tessel_chunk::ArenaConfig;
use tessel_lighting::LightConfig;
use tessel_world::WorldBounds;

/// Streaming settings. Every section and field has a default, so an empty
/// TOML file is a valid configuration.
#[derive(Clone, Debug, Default, Deserialize)]
#[serde(default)]
pub struct StreamConfig {
    pub arena: ArenaSection,
    pub view: ViewSection,
    pub budget: BudgetSection,
    pub queue: QueueSection,
    pub meshing: MeshingSection,
    pub lighting: LightingSection,
    pub world: WorldSection,
}

#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct ArenaSection {
    pub capacity: usize,
    pub grow_batch: usize,
    pub reuse_margin: i32,
}

impl Default for ArenaSection {
    fn default() -> Self {
        let a = ArenaConfig::default();
        Self {
            capacity: a.capacity,
            grow_batch: a.grow_batch,
            reuse_margin: a.reuse_margin,
        }
    }
}

/// Distances are in chunks.
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct ViewSection {
    pub distance_xz: i32,
    pub distance_y: i32,
    /// Radius of the full scan run after a jump of more than one chunk.
    pub force_radius: i32,
    /// Extra distance past the view before a chunk is unloaded.
    pub unload_margin: i32,
    pub frustum_culling: bool,
}

impl Default for ViewSection {
    fn default() -> Self {
        Self {
            distance_xz: 8,
            distance_y: 4,
            force_radius: 1,
            unload_margin: 2,
            frustum_culling: true,
        }
    }
}

/// Per-frame time slices, in milliseconds.
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct BudgetSection {
    pub explore_ms: f32,
    pub render_queue_ms: f32,
    pub unload_ms: f32,
    pub upload_ms: f32,
    pub max_creations_per_frame: usize,
}

impl Default for BudgetSection {
    fn default() -> Self {
        Self {
            explore_ms: 2.0,
            render_queue_ms: 4.0,
            unload_ms: 0.5,
            upload_ms: 2.0,
            max_creations_per_frame: 32,
        }
    }
}

impl BudgetSection {
    pub fn explore(&self) -> Duration {
        millis(self.explore_ms)
    }

    pub fn render_queue(&self) -> Duration {
        millis(self.render_queue_ms)
    }

    pub fn unload(&self) -> Duration {
        millis(self.unload_ms)
    }

    pub fn upload(&self) -> Duration {
        millis(self.upload_ms)
    }
}

fn millis(ms: f32) -> Duration {
    Duration::from_secs_f32(ms.max(0.0) / 1000.0)
}

/// Render queue and octree stack sizing. Distances are in chunks.
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct QueueSection {
    /// Ring slots including the list sentinel.
    pub render_capacity: usize,
    pub octree_stack_capacity: usize,
    /// Out-of-frustum chunks closer than this are still considered.
    pub accepted_distance: f32,
    /// Chunks closer than this are popped before anything else.
    pub force_distance: f32,
    /// A candidate this close ends the scan early.
    pub early_exit_distance: f32,
    pub max_scan: usize,
}

impl Default for QueueSection {
    fn default() -> Self {
        Self {
            render_capacity: 8192,
            octree_stack_capacity: 4096,
            accepted_distance: 2.0,
            force_distance: 1.5,
            early_exit_distance: 1.0,
            max_scan: 256,
        }
    }
}

#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct MeshingSection {
    /// 0 picks available parallelism minus one (at least one).
    pub workers: usize,
    pub ring_size: usize,
}

impl Default for MeshingSection {
    fn default() -> Self {
        Self {
            workers: 0,
            ring_size: 16,
        }
    }
}

impl MeshingSection {
    pub fn worker_count(&self) -> usize {
        if self.workers > 0 {
            return self.workers;
        }
        std::thread::available_parallelism()
            .map(|n| n.get().saturating_sub(1))
            .unwrap_or(1)
            .max(1)
    }
}

#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct LightingSection {
    pub sun_attenuation: u8,
    pub torch_attenuation: u8,
}

impl Default for LightingSection {
    fn default() -> Self {
        let l = LightConfig::default();
        Self {
            sun_attenuation: l.sun_attenuation,
            torch_attenuation: l.torch_attenuation,
        }
    }
}

#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct WorldSection {
    pub bounds: Option<WorldBounds>,
    /// Slots in the height/biome column cache.
    pub column_cache: usize,
}

impl Default for WorldSection {
    fn default() -> Self {
        Self {
            bounds: None,
            column_cache: 4096,
        }
    }
}

impl StreamConfig {
    pub fn load_from_path(path: impl AsRef<Path>) -> Result<Self, Box<dyn Error>> {
        let s = fs::read_to_string(path)?;
        Self::from_toml_str(&s)
    }

    pub fn from_toml_str(s: &str) -> Result<Self, Box<dyn Error>> {
        let cfg: StreamConfig = toml::from_str(s)?;
        Ok(cfg)
    }

    pub fn arena_config(&self) -> ArenaConfig {
        ArenaConfig {
            capacity: self.arena.capacity,
            grow_batch: self.arena.grow_batch,
            reuse_margin: self.arena.reuse_margin,
        }
    }

    pub fn light_config(&self) -> LightConfig {
        LightConfig {
            sun_attenuation: self.lighting.sun_attenuation,
            torch_attenuation: self.lighting.torch_attenuation,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_file_uses_defaults() {
        let cfg = StreamConfig::from_toml_str("").unwrap();
        assert_eq!(cfg.arena.capacity, 4096);
        assert_eq!(cfg.view.distance_xz, 8);
        assert!(cfg.view.frustum_culling);
        assert!(cfg.world.bounds.is_none());
    }

    #[test]
    fn partial_sections_keep_other_defaults() {
        let cfg = StreamConfig::from_toml_str(
            r#"
            [view]
            distance_xz = 3
            frustum_culling = false

            [world.bounds]
            min = { cx = -4, cy = -2, cz = -4 }
            max = { cx = 4, cy = 2, cz = 4 }
            "#,
        )
        .unwrap();
        assert_eq!(cfg.view.distance_xz, 3);
        assert_eq!(cfg.view.distance_y, 4);
        assert!(!cfg.view.frustum_culling);
        let b = cfg.world.bounds.unwrap();
        assert_eq!(b.max.cy, 2);
        assert_eq!(cfg.queue.max_scan, 256);
    }

    #[test]
    fn explicit_worker_count_wins() {
        let m = MeshingSection {
            workers: 3,
            ring_size: 4,
        };
        assert_eq!(m.worker_count(), 3);
        assert!(MeshingSection::default().worker_count() >= 1);
    }

    #[test]
    fn shipped_config_parses() {
        let cfg = StreamConfig::from_toml_str(include_str!("../../../config/stream.toml")).unwrap();
        assert_eq!(cfg.budget.max_creations_per_frame, 32);
        assert_eq!(cfg.meshing.ring_size, 16);
    }
}
