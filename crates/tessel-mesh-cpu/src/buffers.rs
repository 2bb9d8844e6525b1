use tessel_blocks::MaterialId;

use crate::mesh_build::{ColliderBuild, MeshBuild};

/// Render pass a sub-mesh belongs to.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum PartKind {
    Opaque,
    /// Alpha-tested cross quads.
    Foliage,
    /// UVs carry the flow direction instead of texture coordinates.
    Liquid,
    Translucent,
}

#[derive(Clone, Debug)]
pub struct MeshPart {
    pub material: MaterialId,
    pub kind: PartKind,
    pub build: MeshBuild,
}

/// Non-voxel model placed at a cell.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ModelInstance {
    pub material: MaterialId,
    pub local: [u8; 3],
    pub rotation: u8,
    pub light: u8,
}

/// Everything a mesh job produces. Cleared and refilled per job so the
/// allocations survive across jobs in the same slot.
#[derive(Clone, Debug, Default)]
pub struct MeshBuffers {
    parts: Vec<MeshPart>,
    pub collider: ColliderBuild,
    pub models: Vec<ModelInstance>,
}

impl MeshBuffers {
    pub fn clear(&mut self) {
        for p in &mut self.parts {
            p.build.clear_keep_capacity();
        }
        self.collider.clear_keep_capacity();
        self.models.clear();
    }

    pub fn part_mut(&mut self, material: MaterialId, kind: PartKind) -> &mut MeshBuild {
        let i = match self
            .parts
            .iter()
            .position(|p| p.material == material && p.kind == kind)
        {
            Some(i) => i,
            None => {
                self.parts.push(MeshPart {
                    material,
                    kind,
                    build: MeshBuild::default(),
                });
                self.parts.len() - 1
            }
        };
        &mut self.parts[i].build
    }

    /// Sub-meshes with geometry, in first-use order.
    pub fn parts(&self) -> impl Iterator<Item = &MeshPart> {
        self.parts.iter().filter(|p| !p.build.is_empty())
    }

    pub fn part(&self, material: MaterialId, kind: PartKind) -> Option<&MeshBuild> {
        self.parts()
            .find(|p| p.material == material && p.kind == kind)
            .map(|p| &p.build)
    }

    pub fn quad_count(&self) -> usize {
        self.parts.iter().map(|p| p.build.quad_count()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.quad_count() == 0 && self.models.is_empty()
    }

    /// Quads the retained part arrays can hold, including parts left empty by
    /// the last build.
    pub fn quad_capacity(&self) -> usize {
        self.parts.iter().map(|p| p.build.quad_capacity()).sum()
    }
}
