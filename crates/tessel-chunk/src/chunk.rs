use std::sync::Arc;

use tessel_world::{ChunkCoord, ChunkId, Face};

use crate::grid::VoxelGrid;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Population {
    /// Record not assigned to any coordinate.
    #[default]
    Unloaded,
    /// Generated and known to hold no content; carries no voxel array.
    Empty,
    Populated,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum RenderState {
    #[default]
    Pending,
    RenderingRequested,
    RenderingComplete,
}

/// Point light source: voxel index inside the chunk plus intensity.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Emitter {
    pub index: u16,
    pub intensity: u8,
}

#[derive(Clone, Debug)]
pub struct Chunk {
    pub id: ChunkId,
    pub coord: ChunkCoord,
    /// Bumped every time the record is reassigned or released.
    pub generation: u32,
    pub population: Population,
    pub voxels: Option<Arc<VoxelGrid>>,
    pub above_surface: bool,
    pub render: RenderState,
    pub neighbors: [Option<ChunkId>; 6],
    pub modified: bool,
    pub pinned: bool,
    /// Faces last built against a stand-in neighbour.
    pub inconclusive: u8,
    pub in_queue: bool,
    pub needs_mesh_rebuild: bool,
    /// Incremented per rebuild request; a finished job only settles the
    /// request it was built for.
    pub mesh_request: u32,
    pub light_signature: u32,
    pub voxel_signature: u64,
    pub uploaded_voxel_signature: Option<u64>,
    pub frustum_epoch: u64,
    pub in_frustum: bool,
    pub visible: bool,
    pub has_mesh: bool,
    pub first_rendered: bool,
    pub emitters: Vec<Emitter>,
}

impl Chunk {
    pub fn unloaded(id: ChunkId) -> Self {
        Self {
            id,
            coord: ChunkCoord::default(),
            generation: 0,
            population: Population::Unloaded,
            voxels: None,
            above_surface: false,
            render: RenderState::Pending,
            neighbors: [None; 6],
            modified: false,
            pinned: false,
            inconclusive: 0,
            in_queue: false,
            needs_mesh_rebuild: false,
            mesh_request: 0,
            light_signature: 0,
            voxel_signature: 0,
            uploaded_voxel_signature: None,
            frustum_epoch: 0,
            in_frustum: false,
            visible: false,
            has_mesh: false,
            first_rendered: false,
            emitters: Vec::new(),
        }
    }

    /// Returns the record to its unassigned state, keeping id and capacity.
    pub(crate) fn reset(&mut self, coord: ChunkCoord) {
        let id = self.id;
        let generation = self.generation.wrapping_add(1);
        let mut emitters = std::mem::take(&mut self.emitters);
        emitters.clear();
        *self = Chunk::unloaded(id);
        self.coord = coord;
        self.generation = generation;
        self.emitters = emitters;
    }

    #[inline]
    pub fn is_live(&self) -> bool {
        !matches!(self.population, Population::Unloaded)
    }

    #[inline]
    pub fn is_populated(&self) -> bool {
        matches!(self.population, Population::Populated)
    }

    #[inline]
    pub fn neighbor(&self, face: Face) -> Option<ChunkId> {
        self.neighbors[face.index()]
    }

    /// Mutable voxel access, cloning the grid if a job still holds it.
    pub fn voxels_mut(&mut self) -> Option<&mut VoxelGrid> {
        self.voxels.as_mut().map(Arc::make_mut)
    }

    pub fn clear_light(&mut self) {
        if let Some(g) = self.voxels_mut() {
            g.clear_light();
        }
        self.light_signature = 0;
    }

    pub fn request_mesh(&mut self) {
        self.needs_mesh_rebuild = true;
        self.mesh_request = self.mesh_request.wrapping_add(1);
    }

    pub fn set_emitter(&mut self, index: u16, intensity: u8) {
        self.emitters.retain(|e| e.index != index);
        if intensity > 0 {
            self.emitters.push(Emitter { index, intensity });
        }
    }

    pub fn remove_emitter(&mut self, index: u16) -> bool {
        let before = self.emitters.len();
        self.emitters.retain(|e| e.index != index);
        before != self.emitters.len()
    }
}
