//! Per-voxel face emission over a 27-chunk neighbourhood.

use log::trace;
use tessel_blocks::{MaterialId, MaterialTable, RenderCategory, Voxel};
use tessel_geom::Vec3;
use tessel_world::{CHUNK_SIZE, Face};

use crate::buffers::{MeshBuffers, ModelInstance, PartKind};
use crate::face::{CORNERS_UV, axis_step, basis, normal};
use crate::neighborhood::Neighborhood;

/// Brightness per ambient-occlusion level (0 = fully occluded corner).
const AO_SHADE: [f32; 4] = [0.45, 0.65, 0.82, 1.0];

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
struct GreedyCell {
    material: MaterialId,
    tint: [u8; 3],
    light: u8,
}

pub struct ChunkMesher {
    cats: Vec<RenderCategory>,
    collides: Vec<bool>,
    mask: Vec<Option<GreedyCell>>,
}

#[inline]
fn add(p: [i32; 3], d: [i32; 3]) -> [i32; 3] {
    [p[0] + d[0], p[1] + d[1], p[2] + d[2]]
}

#[inline]
fn to_vec(p: [i32; 3]) -> Vec3 {
    Vec3::new(p[0] as f32, p[1] as f32, p[2] as f32)
}

#[inline]
fn face_step(face: Face) -> [i32; 3] {
    let (dx, dy, dz) = face.delta();
    [dx, dy, dz]
}

#[inline]
fn shade(tint: [u8; 3], k: f32, light: u8) -> [u8; 4] {
    let f = |c: u8| (f32::from(c) * k).round().clamp(0.0, 255.0) as u8;
    [f(tint[0]), f(tint[1]), f(tint[2]), light]
}

#[inline]
fn ao_level(side1: bool, side2: bool, corner: bool) -> u8 {
    if side1 && side2 {
        0
    } else {
        3 - u8::from(side1) - u8::from(side2) - u8::from(corner)
    }
}

/// Liquid surface height for a cell `level` sixteenths below full.
#[inline]
fn liquid_height(v: Voxel) -> f32 {
    f32::from(15 - v.water().min(14)) / 16.0
}

fn unit_uvs(w: f32, h: f32) -> [[f32; 2]; 4] {
    [[0.0, 0.0], [w, 0.0], [w, h], [0.0, h]]
}

impl ChunkMesher {
    pub fn new(materials: &MaterialTable) -> Self {
        Self {
            cats: materials.materials.iter().map(|m| m.category).collect(),
            collides: materials.materials.iter().map(|m| m.collides).collect(),
            mask: vec![None; CHUNK_SIZE * CHUNK_SIZE],
        }
    }

    #[inline]
    fn category(&self, v: Voxel) -> RenderCategory {
        if !v.has_content() {
            return RenderCategory::Empty;
        }
        self.cats
            .get(v.material().0 as usize)
            .copied()
            .unwrap_or(RenderCategory::Opaque)
    }

    #[inline]
    fn occludes(&self, v: Voxel) -> bool {
        self.category(v).occludes()
    }

    #[inline]
    fn collides(&self, v: Voxel) -> bool {
        v.has_content() && self.collides.get(v.material().0 as usize).copied().unwrap_or(true)
    }

    #[inline]
    fn same_material(a: Voxel, b: Voxel) -> bool {
        b.has_content() && a.material() == b.material()
    }

    /// Rebuilds `out` for the center chunk of `nb`.
    pub fn build(&mut self, nb: &Neighborhood, out: &mut MeshBuffers) {
        out.clear();
        let s = CHUNK_SIZE as i32;
        for y in 0..s {
            for z in 0..s {
                for x in 0..s {
                    let p = [x, y, z];
                    let v = nb.get_arr(p);
                    if !v.has_content() {
                        continue;
                    }
                    match self.category(v) {
                        RenderCategory::Opaque => self.emit_ao_cube(nb, p, v, out),
                        RenderCategory::Liquid => self.emit_liquid(nb, p, v, out),
                        RenderCategory::Translucent => self.emit_translucent(nb, p, v, out),
                        RenderCategory::Custom => out.models.push(ModelInstance {
                            material: v.material(),
                            local: [x as u8, y as u8, z as u8],
                            rotation: v.rotation(),
                            light: v.light_packed(),
                        }),
                        // Merged in their own passes below.
                        RenderCategory::OpaqueNoAo | RenderCategory::Foliage => {}
                        RenderCategory::Empty => {}
                    }
                    if self.collides(v) {
                        self.emit_collider(nb, p, out);
                    }
                }
            }
        }
        self.emit_greedy(nb, out);
        self.emit_foliage(nb, out);
        trace!("mesh built: {} quads, {} models", out.quad_count(), out.models.len());
    }

    fn emit_ao_cube(&self, nb: &Neighborhood, p: [i32; 3], v: Voxel, out: &mut MeshBuffers) {
        for face in Face::ALL {
            let q = add(p, face_step(face));
            let nv = nb.get_arr(q);
            if self.occludes(nv) {
                continue;
            }
            let b = basis(face);
            let mut ao = [3u8; 4];
            for (i, &(cu, cv)) in CORNERS_UV.iter().enumerate() {
                let su = if cu == 1 { 1 } else { -1 };
                let sv = if cv == 1 { 1 } else { -1 };
                let side1 = add(q, axis_step(b.u_axis, su));
                let side2 = add(q, axis_step(b.v_axis, sv));
                let corner = add(side1, axis_step(b.v_axis, sv));
                ao[i] = ao_level(
                    self.occludes(nb.get_arr(side1)),
                    self.occludes(nb.get_arr(side2)),
                    self.occludes(nb.get_arr(corner)),
                );
            }
            let light = nv.light_packed();
            let tint = v.tint();
            let rgba = ao.map(|a| shade(tint, AO_SHADE[a as usize], light));
            // Split along the diagonal joining the brighter pair.
            let flip = u16::from(ao[1]) + u16::from(ao[3]) > u16::from(ao[0]) + u16::from(ao[2]);
            out.part_mut(v.material(), PartKind::Opaque).add_quad(
                b.rect(to_vec(p), 1.0, 1.0),
                normal(face),
                unit_uvs(1.0, 1.0),
                rgba,
                flip,
            );
        }
    }

    /// Greedy rectangles for opaque materials rendered without occlusion.
    fn emit_greedy(&mut self, nb: &Neighborhood, out: &mut MeshBuffers) {
        let s = CHUNK_SIZE;
        for face in Face::ALL {
            let b = basis(face);
            let step = face_step(face);
            for d in 0..s {
                let mut any = false;
                for bv in 0..s {
                    for au in 0..s {
                        let mut p = [0i32; 3];
                        p[b.normal_axis] = d as i32;
                        p[b.u_axis] = au as i32;
                        p[b.v_axis] = bv as i32;
                        let v = nb.get_arr(p);
                        let cell = if self.category(v) == RenderCategory::OpaqueNoAo {
                            let nv = nb.get_arr(add(p, step));
                            (!self.occludes(nv)).then(|| GreedyCell {
                                material: v.material(),
                                tint: v.tint(),
                                light: nv.light_packed(),
                            })
                        } else {
                            None
                        };
                        any |= cell.is_some();
                        self.mask[bv * s + au] = cell;
                    }
                }
                if !any {
                    continue;
                }
                for bv in 0..s {
                    let mut au = 0;
                    while au < s {
                        let Some(cell) = self.mask[bv * s + au] else {
                            au += 1;
                            continue;
                        };
                        let mut w = 1;
                        while au + w < s && self.mask[bv * s + au + w] == Some(cell) {
                            w += 1;
                        }
                        let mut h = 1;
                        'grow: while bv + h < s {
                            for k in 0..w {
                                if self.mask[(bv + h) * s + au + k] != Some(cell) {
                                    break 'grow;
                                }
                            }
                            h += 1;
                        }
                        for hh in 0..h {
                            for k in 0..w {
                                self.mask[(bv + hh) * s + au + k] = None;
                            }
                        }
                        let mut origin = [0i32; 3];
                        origin[b.normal_axis] = d as i32;
                        origin[b.u_axis] = au as i32;
                        origin[b.v_axis] = bv as i32;
                        let (wf, hf) = (w as f32, h as f32);
                        out.part_mut(cell.material, PartKind::Opaque).add_quad(
                            b.rect(to_vec(origin), wf, hf),
                            normal(face),
                            unit_uvs(wf, hf),
                            [shade(cell.tint, 1.0, cell.light); 4],
                            false,
                        );
                        au += w;
                    }
                }
            }
        }
    }

    /// Cross quads, one pair per vertical run of the same foliage material.
    fn emit_foliage(&self, nb: &Neighborhood, out: &mut MeshBuffers) {
        let s = CHUNK_SIZE as i32;
        for z in 0..s {
            for x in 0..s {
                let mut y = 0;
                while y < s {
                    let v = nb.get(x, y, z);
                    if self.category(v) != RenderCategory::Foliage {
                        y += 1;
                        continue;
                    }
                    let mut top = y + 1;
                    while top < s && Self::same_material(v, nb.get(x, top, z)) {
                        top += 1;
                    }
                    let (x0, z0) = (x as f32, z as f32);
                    let (y0, y1) = (y as f32, top as f32);
                    let h = y1 - y0;
                    let rgba = shade(v.tint(), 1.0, v.light_packed());
                    let part = out.part_mut(v.material(), PartKind::Foliage);
                    let a = [
                        Vec3::new(x0, y0, z0),
                        Vec3::new(x0 + 1.0, y0, z0 + 1.0),
                        Vec3::new(x0 + 1.0, y1, z0 + 1.0),
                        Vec3::new(x0, y1, z0),
                    ];
                    part.add_double_sided(a, Vec3::new(-1.0, 0.0, 1.0).normalized(), unit_uvs(1.0, h), rgba);
                    let b = [
                        Vec3::new(x0 + 1.0, y0, z0),
                        Vec3::new(x0, y0, z0 + 1.0),
                        Vec3::new(x0, y1, z0 + 1.0),
                        Vec3::new(x0 + 1.0, y1, z0),
                    ];
                    part.add_double_sided(b, Vec3::new(-1.0, 0.0, -1.0).normalized(), unit_uvs(1.0, h), rgba);
                    y = top;
                }
            }
        }
    }

    fn liquid_corner_height(&self, nb: &Neighborhood, p: [i32; 3], v: Voxel, cx: i32, cz: i32) -> f32 {
        let mut sum = 0.0;
        let mut n = 0u32;
        for dz in [cz - 1, cz] {
            for dx in [cx - 1, cx] {
                let col = [p[0] + dx, p[1], p[2] + dz];
                if Self::same_material(v, nb.get(col[0], col[1] + 1, col[2])) {
                    return 1.0;
                }
                let c = nb.get_arr(col);
                if Self::same_material(v, c) {
                    sum += liquid_height(c);
                    n += 1;
                }
            }
        }
        if n == 0 { liquid_height(v) } else { sum / n as f32 }
    }

    fn emit_liquid(&self, nb: &Neighborhood, p: [i32; 3], v: Voxel, out: &mut MeshBuffers) {
        let mut heights = [[0.0f32; 2]; 2];
        for cx in 0..2 {
            for cz in 0..2 {
                heights[cx][cz] = self.liquid_corner_height(nb, p, v, cx as i32, cz as i32);
            }
        }
        let fx = (heights[0][0] + heights[0][1]) - (heights[1][0] + heights[1][1]);
        let fz = (heights[0][0] + heights[1][0]) - (heights[0][1] + heights[1][1]);
        let flow = [[fx, fz]; 4];
        let origin = to_vec(p);
        for face in Face::ALL {
            let nv = nb.get_arr(add(p, face_step(face)));
            if Self::same_material(v, nv) || self.occludes(nv) {
                continue;
            }
            let b = basis(face);
            let mut corners = b.rect(origin, 1.0, 1.0);
            for (i, c) in corners.iter_mut().enumerate() {
                let u = b.unit_corner(i);
                if u[1] == 1 {
                    c.y = origin.y + heights[u[0] as usize][u[2] as usize];
                }
            }
            let rgba = shade(v.tint(), 1.0, nv.light_packed());
            out.part_mut(v.material(), PartKind::Liquid)
                .add_quad(corners, normal(face), flow, [rgba; 4], false);
        }
    }

    fn emit_translucent(&self, nb: &Neighborhood, p: [i32; 3], v: Voxel, out: &mut MeshBuffers) {
        for face in Face::ALL {
            let nv = nb.get_arr(add(p, face_step(face)));
            if Self::same_material(v, nv) || self.occludes(nv) {
                continue;
            }
            let rgba = shade(v.tint(), 1.0, nv.light_packed());
            out.part_mut(v.material(), PartKind::Translucent).add_quad(
                basis(face).rect(to_vec(p), 1.0, 1.0),
                normal(face),
                unit_uvs(1.0, 1.0),
                [rgba; 4],
                false,
            );
        }
    }

    fn emit_collider(&self, nb: &Neighborhood, p: [i32; 3], out: &mut MeshBuffers) {
        for face in Face::ALL {
            if self.collides(nb.get_arr(add(p, face_step(face)))) {
                continue;
            }
            out.collider.add_quad(basis(face).rect(to_vec(p), 1.0, 1.0));
        }
    }
}
