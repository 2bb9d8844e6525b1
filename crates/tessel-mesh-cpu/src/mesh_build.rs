use tessel_geom::Vec3;

/// Flat vertex/index arrays for one sub-mesh.
#[derive(Default, Clone, Debug)]
pub struct MeshBuild {
    pub pos: Vec<f32>,
    pub norm: Vec<f32>,
    pub uv: Vec<f32>,
    pub idx: Vec<u32>,
    /// RGBA per vertex: rgb is tint times ambient occlusion, alpha is packed light.
    pub col: Vec<u8>,
}

impl MeshBuild {
    /// Clears all arrays but retains capacity for reuse across jobs.
    #[inline]
    pub fn clear_keep_capacity(&mut self) {
        self.pos.clear();
        self.norm.clear();
        self.uv.clear();
        self.idx.clear();
        self.col.clear();
    }

    #[inline]
    pub fn vertex_count(&self) -> usize {
        self.pos.len() / 3
    }

    #[inline]
    pub fn quad_count(&self) -> usize {
        self.idx.len() / 6
    }

    /// Quads the index array can hold without reallocating.
    #[inline]
    pub fn quad_capacity(&self) -> usize {
        self.idx.capacity() / 6
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.idx.is_empty()
    }

    /// Appends a quad given counter-clockwise corners (seen from the side
    /// `n` points to). `flip` splits along the 1-3 diagonal instead of 0-2.
    pub fn add_quad(
        &mut self,
        corners: [Vec3; 4],
        n: Vec3,
        uvs: [[f32; 2]; 4],
        rgba: [[u8; 4]; 4],
        flip: bool,
    ) {
        let base = self.vertex_count() as u32;
        for i in 0..4 {
            let p = corners[i];
            self.pos.extend_from_slice(&[p.x, p.y, p.z]);
            self.norm.extend_from_slice(&[n.x, n.y, n.z]);
            self.uv.extend_from_slice(&uvs[i]);
            self.col.extend_from_slice(&rgba[i]);
        }
        if flip {
            self.idx
                .extend_from_slice(&[base + 1, base + 2, base + 3, base + 1, base + 3, base]);
        } else {
            self.idx
                .extend_from_slice(&[base, base + 1, base + 2, base, base + 2, base + 3]);
        }
    }

    /// Same quad visible from both sides.
    pub fn add_double_sided(&mut self, corners: [Vec3; 4], n: Vec3, uvs: [[f32; 2]; 4], rgba: [u8; 4]) {
        self.add_quad(corners, n, uvs, [rgba; 4], false);
        let back = [corners[3], corners[2], corners[1], corners[0]];
        let back_uv = [uvs[3], uvs[2], uvs[1], uvs[0]];
        self.add_quad(back, n * -1.0, back_uv, [rgba; 4], false);
    }
}

/// Triangle soup for physics, positions only.
#[derive(Default, Clone, Debug)]
pub struct ColliderBuild {
    pub pos: Vec<f32>,
    pub idx: Vec<u32>,
}

impl ColliderBuild {
    #[inline]
    pub fn clear_keep_capacity(&mut self) {
        self.pos.clear();
        self.idx.clear();
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.idx.is_empty()
    }

    #[inline]
    pub fn triangle_count(&self) -> usize {
        self.idx.len() / 3
    }

    pub fn add_quad(&mut self, corners: [Vec3; 4]) {
        let base = (self.pos.len() / 3) as u32;
        for p in corners {
            self.pos.extend_from_slice(&[p.x, p.y, p.z]);
        }
        self.idx
            .extend_from_slice(&[base, base + 1, base + 2, base, base + 2, base + 3]);
    }
}
