//! Collaborator interfaces for filling and decorating chunks, plus two
//! reference implementations.

use std::error::Error;
use std::fs;
use std::path::Path;

use fastnoise_lite::{FastNoiseLite, NoiseType};
use serde::Deserialize;
use tessel_blocks::{MaterialTable, Voxel};

use crate::{CHUNK_SIZE, ChunkCoord, voxel_index};

/// Outcome of filling one chunk.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct FillReport {
    pub has_content: bool,
    /// The chunk sits entirely above the terrain surface (open sky).
    pub above_surface: bool,
}

/// Fills a chunk's voxel array. `voxels` arrives cleared to air and holds
/// `CHUNK_VOLUME` cells in `voxel_index` order.
pub trait TerrainFill: Send + Sync {
    fn fill(&self, coord: ChunkCoord, voxels: &mut [Voxel]) -> FillReport;
}

/// Adds detail to a freshly populated chunk. Returns true when it changed anything.
pub trait DetailGenerator: Send + Sync {
    fn decorate(&self, coord: ChunkCoord, voxels: &mut [Voxel]) -> bool;
}

#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct ColumnSample {
    pub ground: i32,
    pub moisture: f32,
    pub biome: u16,
}

pub trait HeightQuery: Send + Sync {
    fn sample(&self, x: i32, z: i32) -> ColumnSample;
}

pub struct NoDetails;

impl DetailGenerator for NoDetails {
    fn decorate(&self, _coord: ChunkCoord, _voxels: &mut [Voxel]) -> bool {
        false
    }
}

#[derive(Clone, Copy, Debug)]
struct Palette {
    stone: Voxel,
    dirt: Voxel,
    grass: Voxel,
    water: Voxel,
}

impl Palette {
    fn from_table(table: &MaterialTable) -> Self {
        let stone = table.voxel("stone").unwrap_or(Voxel::AIR);
        Palette {
            stone,
            dirt: table.voxel("dirt").unwrap_or(stone),
            grass: table.voxel("grass").unwrap_or(stone),
            water: table.voxel("water").unwrap_or(Voxel::AIR),
        }
    }

    #[inline]
    fn pick(&self, wy: i32, ground: i32, water_level: i32) -> Voxel {
        if wy < ground - 3 {
            self.stone
        } else if wy < ground {
            self.dirt
        } else if wy == ground {
            if ground < water_level { self.dirt } else { self.grass }
        } else if wy <= water_level {
            self.water
        } else {
            Voxel::AIR
        }
    }
}

/// Fills column by column from a per-column ground height.
fn fill_columns(
    coord: ChunkCoord,
    voxels: &mut [Voxel],
    palette: &Palette,
    water_level: i32,
    mut ground_at: impl FnMut(i32, i32) -> i32,
) -> FillReport {
    let (ox, oy, oz) = coord.origin();
    let mut top = i32::MIN;
    let mut has_content = false;
    for lz in 0..CHUNK_SIZE {
        for lx in 0..CHUNK_SIZE {
            let ground = ground_at(ox + lx as i32, oz + lz as i32);
            top = top.max(ground).max(water_level);
            if oy > ground.max(water_level) {
                continue;
            }
            for ly in 0..CHUNK_SIZE {
                let v = palette.pick(oy + ly as i32, ground, water_level);
                if v.has_content() {
                    voxels[voxel_index(lx, ly, lz)] = v;
                    has_content = true;
                }
            }
        }
    }
    FillReport {
        has_content,
        above_surface: oy > top,
    }
}

/// Deterministic flat world: ground at `ground`, nothing else.
#[derive(Clone, Debug)]
pub struct FlatTerrain {
    pub ground: i32,
    palette: Palette,
}

impl FlatTerrain {
    pub fn new(table: &MaterialTable, ground: i32) -> Self {
        Self {
            ground,
            palette: Palette::from_table(table),
        }
    }
}

impl TerrainFill for FlatTerrain {
    fn fill(&self, coord: ChunkCoord, voxels: &mut [Voxel]) -> FillReport {
        fill_columns(coord, voxels, &self.palette, i32::MIN, |_, _| self.ground)
    }
}

impl HeightQuery for FlatTerrain {
    fn sample(&self, _x: i32, _z: i32) -> ColumnSample {
        ColumnSample {
            ground: self.ground,
            moisture: 0.5,
            biome: 0,
        }
    }
}

#[derive(Clone, Debug, Deserialize)]
pub struct TerrainParams {
    #[serde(default)]
    pub seed: i32,
    #[serde(default = "default_frequency")]
    pub frequency: f32,
    #[serde(default = "default_base_height")]
    pub base_height: i32,
    #[serde(default = "default_amplitude")]
    pub amplitude: f32,
    #[serde(default = "default_water_level")]
    pub water_level: i32,
    #[serde(default = "default_moisture_frequency")]
    pub moisture_frequency: f32,
}

fn default_frequency() -> f32 {
    0.01
}
fn default_base_height() -> i32 {
    24
}
fn default_amplitude() -> f32 {
    20.0
}
fn default_water_level() -> i32 {
    16
}
fn default_moisture_frequency() -> f32 {
    0.004
}

impl Default for TerrainParams {
    fn default() -> Self {
        Self {
            seed: 0,
            frequency: default_frequency(),
            base_height: default_base_height(),
            amplitude: default_amplitude(),
            water_level: default_water_level(),
            moisture_frequency: default_moisture_frequency(),
        }
    }
}

impl TerrainParams {
    pub fn load_from_path(path: impl AsRef<Path>) -> Result<Self, Box<dyn Error>> {
        let s = fs::read_to_string(path)?;
        let params: TerrainParams = toml::from_str(&s)?;
        Ok(params)
    }
}

/// Heightmap terrain with a water table, driven by 2D simplex noise.
pub struct NoiseTerrain {
    pub params: TerrainParams,
    height: FastNoiseLite,
    moisture: FastNoiseLite,
    palette: Palette,
}

impl NoiseTerrain {
    pub fn new(table: &MaterialTable, params: TerrainParams) -> Self {
        let mut height = FastNoiseLite::with_seed(params.seed);
        height.set_noise_type(Some(NoiseType::OpenSimplex2));
        height.set_frequency(Some(params.frequency));
        let mut moisture = FastNoiseLite::with_seed(((params.seed as u32) ^ 0x92E3_A1B2u32) as i32);
        moisture.set_noise_type(Some(NoiseType::OpenSimplex2));
        moisture.set_frequency(Some(params.moisture_frequency));
        Self {
            params,
            height,
            moisture,
            palette: Palette::from_table(table),
        }
    }

    #[inline]
    pub fn ground_at(&self, x: i32, z: i32) -> i32 {
        let n = self.height.get_noise_2d(x as f32, z as f32);
        self.params.base_height + (n * self.params.amplitude).round() as i32
    }
}

impl TerrainFill for NoiseTerrain {
    fn fill(&self, coord: ChunkCoord, voxels: &mut [Voxel]) -> FillReport {
        fill_columns(coord, voxels, &self.palette, self.params.water_level, |x, z| {
            self.ground_at(x, z)
        })
    }
}

impl HeightQuery for NoiseTerrain {
    fn sample(&self, x: i32, z: i32) -> ColumnSample {
        let ground = self.ground_at(x, z);
        let moisture = (self.moisture.get_noise_2d(x as f32, z as f32) * 0.5 + 0.5).clamp(0.0, 1.0);
        let biome = if ground <= self.params.water_level {
            0
        } else if moisture > 0.6 {
            2
        } else {
            1
        };
        ColumnSample {
            ground,
            moisture,
            biome,
        }
    }
}
