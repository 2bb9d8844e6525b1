//! Sun and point-light flood fill over one chunk and its six face
//! neighbours.
#![forbid(unsafe_code)]

mod queue;

use log::debug;
use tessel_blocks::{LIGHT_MAX, Voxel};
use tessel_chunk::{Emitter, VoxelGrid};
use tessel_world::{CHUNK_SIZE, CHUNK_VOLUME, Face, voxel_index, voxel_position};

pub use queue::{INDEX_MASK, LightQueue, QUEUE_CAPACITY, SOURCE_FLAG};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct LightConfig {
    pub sun_attenuation: u8,
    pub torch_attenuation: u8,
}

impl Default for LightConfig {
    fn default() -> Self {
        Self {
            sun_attenuation: 1,
            torch_attenuation: 1,
        }
    }
}

/// What a face neighbour contributes while lighting a chunk.
#[derive(Clone, Copy, Debug)]
pub enum LightNeighbor<'a> {
    Grid {
        grid: &'a VoxelGrid,
        /// The neighbour's point lights; they hand on light regardless of opacity.
        emitters: &'a [Emitter],
    },
    /// Known neighbour without a voxel array: uniform light, no opacity.
    Uniform { sun: u8, torch: u8 },
    /// Not generated yet.
    Missing,
}

pub struct LightInput<'a> {
    pub neighbors: [LightNeighbor<'a>; 6],
    pub emitters: &'a [Emitter],
    /// Clear existing light before flooding.
    pub fresh: bool,
    pub above_surface: bool,
}

/// Follow-up a neighbour needs after this chunk was lit.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord)]
pub enum NeighborAction {
    #[default]
    None,
    /// Relight only; its mesh is rebuilt if its own signature moves.
    LightOnly,
    ForceMesh,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct LightReport {
    pub signature: u32,
    pub actions: [NeighborAction; 6],
    /// Faces lit from a guess instead of real neighbour data.
    pub inconclusive: u8,
    pub overflowed: bool,
    pub changed_voxels: usize,
}

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
enum Channel {
    Sun,
    Torch,
}

impl Channel {
    #[inline]
    fn get(self, v: Voxel) -> u8 {
        match self {
            Channel::Sun => v.sun(),
            Channel::Torch => v.torch(),
        }
    }

    #[inline]
    fn set(self, v: &mut Voxel, level: u8) {
        match self {
            Channel::Sun => v.set_sun(level),
            Channel::Torch => v.set_torch(level),
        }
    }
}

/// Scratch state reused across chunks; one per thread that lights chunks.
pub struct LightEngine {
    cfg: LightConfig,
    queue: LightQueue,
    changed: Vec<u64>,
}

impl LightEngine {
    pub fn new(cfg: LightConfig) -> Self {
        Self {
            cfg,
            queue: LightQueue::new(),
            changed: vec![0; CHUNK_VOLUME.div_ceil(64)],
        }
    }

    #[inline]
    pub fn config(&self) -> LightConfig {
        self.cfg
    }

    #[inline]
    fn attenuation(&self, ch: Channel) -> u8 {
        match ch {
            Channel::Sun => self.cfg.sun_attenuation,
            Channel::Torch => self.cfg.torch_attenuation,
        }
    }

    /// Light leaving a voxel at `light` with `opacity`, travelling along `dir`.
    #[inline]
    fn decay(&self, ch: Channel, light: u8, opacity: u8, dir: Face) -> u8 {
        if ch == Channel::Sun && dir == Face::NegY && light == LIGHT_MAX && opacity == 0 {
            return LIGHT_MAX;
        }
        light.saturating_sub(opacity.saturating_add(self.attenuation(ch)))
    }

    #[inline]
    fn mark_changed(&mut self, idx: usize) {
        self.changed[idx >> 6] |= 1u64 << (idx & 63);
    }

    #[inline]
    fn was_changed(&self, idx: usize) -> bool {
        self.changed[idx >> 6] & (1u64 << (idx & 63)) != 0
    }

    /// Recomputes sun and torch light for `grid`.
    pub fn compute(&mut self, grid: &mut VoxelGrid, input: &LightInput<'_>) -> LightReport {
        self.changed.fill(0);
        let mut report = LightReport::default();
        if input.fresh {
            grid.clear_light();
        }
        for ch in [Channel::Sun, Channel::Torch] {
            self.queue.clear();
            self.seed_faces(grid, input, ch, &mut report);
            if ch == Channel::Torch {
                self.seed_emitters(grid, input.emitters, &mut report);
            }
            self.flood(grid, input, ch, &mut report);
        }
        if report.overflowed {
            debug!("light queue overflow; some propagation was dropped");
        }
        report.changed_voxels = self.changed.iter().map(|w| w.count_ones() as usize).sum();
        report.signature = signature(grid);
        report
    }

    fn enqueue(&mut self, entry: u32, report: &mut LightReport) {
        if !self.queue.push(entry) {
            report.overflowed = true;
        }
    }

    fn seed_faces(&mut self, grid: &mut VoxelGrid, input: &LightInput<'_>, ch: Channel, report: &mut LightReport) {
        for face in Face::ALL {
            let inward = face.opposite();
            match input.neighbors[face.index()] {
                LightNeighbor::Grid { grid: n, emitters } => {
                    for (here, there) in face_pairs(face) {
                        let nv = n.at(there);
                        let opacity = if ch == Channel::Torch && is_source(emitters, there) {
                            0
                        } else {
                            nv.opacity()
                        };
                        let incoming = self.decay(ch, ch.get(nv), opacity, inward);
                        self.raise(grid, here, ch, incoming, report);
                    }
                }
                LightNeighbor::Uniform { sun, torch } => {
                    let level = if ch == Channel::Sun { sun } else { torch };
                    let incoming = self.decay(ch, level, 0, inward);
                    for (here, _) in face_pairs(face) {
                        self.raise(grid, here, ch, incoming, report);
                    }
                }
                LightNeighbor::Missing => {
                    report.inconclusive |= face.bit();
                    if ch == Channel::Sun && input.above_surface {
                        let incoming = self.decay(ch, LIGHT_MAX, 0, inward);
                        for (here, _) in face_pairs(face) {
                            self.raise(grid, here, ch, incoming, report);
                        }
                    }
                }
            }
        }
    }

    fn seed_emitters(&mut self, grid: &mut VoxelGrid, emitters: &[Emitter], report: &mut LightReport) {
        for e in emitters {
            let idx = e.index as usize;
            if idx >= CHUNK_VOLUME {
                continue;
            }
            let v = grid.at_mut(idx);
            if e.intensity > v.torch() {
                v.set_torch(e.intensity);
                self.mark_changed(idx);
            }
            self.enqueue(idx as u32 | SOURCE_FLAG, report);
        }
    }

    /// Raises a boundary voxel to `incoming` if that brightens it.
    #[inline]
    fn raise(&mut self, grid: &mut VoxelGrid, idx: usize, ch: Channel, incoming: u8, report: &mut LightReport) {
        if incoming == 0 {
            return;
        }
        let v = grid.at_mut(idx);
        if v.is_opaque() || ch.get(*v) >= incoming {
            return;
        }
        ch.set(v, incoming);
        self.mark_changed(idx);
        self.enqueue(idx as u32, report);
    }

    fn flood(&mut self, grid: &mut VoxelGrid, input: &LightInput<'_>, ch: Channel, report: &mut LightReport) {
        let s = CHUNK_SIZE as i32;
        while let Some(entry) = self.queue.pop() {
            let idx = (entry & INDEX_MASK) as usize;
            let v = grid.at(idx);
            let light = ch.get(v);
            let opacity = if entry & SOURCE_FLAG != 0 { 0 } else { v.opacity() };
            if light <= opacity {
                continue;
            }
            let (x, y, z) = voxel_position(idx);
            for face in Face::ALL {
                let out = self.decay(ch, light, opacity, face);
                if out == 0 {
                    continue;
                }
                let (dx, dy, dz) = face.delta();
                let (nx, ny, nz) = (x as i32 + dx, y as i32 + dy, z as i32 + dz);
                if nx < 0 || ny < 0 || nz < 0 || nx >= s || ny >= s || nz >= s {
                    self.boundary(idx, face, ch, out, input, report);
                    continue;
                }
                let nidx = voxel_index(nx as usize, ny as usize, nz as usize);
                let target = grid.at_mut(nidx);
                if target.is_opaque() || ch.get(*target) >= out {
                    continue;
                }
                ch.set(target, out);
                self.mark_changed(nidx);
                let pushed = if face == Face::NegY {
                    self.queue.push_front_reuse(nidx as u32)
                } else {
                    self.queue.push(nidx as u32)
                };
                if !pushed {
                    report.overflowed = true;
                }
            }
        }
    }

    /// Light `out` tried to leave the chunk through `face` from voxel `idx`.
    fn boundary(&self, idx: usize, face: Face, ch: Channel, out: u8, input: &LightInput<'_>, report: &mut LightReport) {
        let LightNeighbor::Grid { grid: n, .. } = input.neighbors[face.index()] else {
            return;
        };
        let slot = &mut report.actions[face.index()];
        if input.fresh || self.was_changed(idx) {
            *slot = NeighborAction::ForceMesh;
            return;
        }
        let nv = n.at(across(idx, face));
        if !nv.is_opaque() && ch.get(nv) < out && *slot < NeighborAction::LightOnly {
            *slot = NeighborAction::LightOnly;
        }
    }
}

impl Default for LightEngine {
    fn default() -> Self {
        Self::new(LightConfig::default())
    }
}

/// Cheap order-sensitive checksum of all packed light values.
pub fn signature(grid: &VoxelGrid) -> u32 {
    grid.as_slice()
        .iter()
        .enumerate()
        .fold(0u32, |acc, (i, v)| {
            acc.wrapping_add(u32::from(v.light_packed()).wrapping_mul((i as u32 & 0xff) + 1))
        })
}

#[inline]
fn is_source(emitters: &[Emitter], idx: usize) -> bool {
    emitters.iter().any(|e| e.index as usize == idx)
}

/// Index of the voxel in the neighbour across `face` from boundary voxel `idx`.
#[inline]
fn across(idx: usize, face: Face) -> usize {
    let last = CHUNK_SIZE - 1;
    let (x, y, z) = voxel_position(idx);
    match face {
        Face::PosY => voxel_index(x, 0, z),
        Face::NegY => voxel_index(x, last, z),
        Face::PosX => voxel_index(0, y, z),
        Face::NegX => voxel_index(last, y, z),
        Face::PosZ => voxel_index(x, y, 0),
        Face::NegZ => voxel_index(x, y, last),
    }
}

/// (boundary voxel here, adjacent voxel in the neighbour) for every cell of `face`.
fn face_pairs(face: Face) -> impl Iterator<Item = (usize, usize)> {
    let last = CHUNK_SIZE - 1;
    (0..CHUNK_SIZE).flat_map(move |a| {
        (0..CHUNK_SIZE).map(move |b| {
            let here = match face {
                Face::PosY => voxel_index(a, last, b),
                Face::NegY => voxel_index(a, 0, b),
                Face::PosX => voxel_index(last, a, b),
                Face::NegX => voxel_index(0, a, b),
                Face::PosZ => voxel_index(a, b, last),
                Face::NegZ => voxel_index(a, b, 0),
            };
            (here, across(here, face))
        })
    })
}
