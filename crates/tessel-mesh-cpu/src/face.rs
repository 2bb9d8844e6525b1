//! Per-face tangent frames used by every emitter.

use tessel_geom::Vec3;
use tessel_world::Face;

/// Axis indices: 0 = x, 1 = y, 2 = z.
#[derive(Clone, Copy, Debug)]
pub struct FaceBasis {
    pub normal_axis: usize,
    /// True when the face sits on the max side of its voxel.
    pub positive: bool,
    pub u_axis: usize,
    pub v_axis: usize,
}

/// `u × v` points along the face normal, so corners (0,0),(1,0),(1,1),(0,1)
/// in (u,v) wind counter-clockwise seen from outside.
pub fn basis(face: Face) -> FaceBasis {
    let (normal_axis, positive, u_axis, v_axis) = match face {
        Face::PosY => (1, true, 2, 0),
        Face::NegY => (1, false, 0, 2),
        Face::PosX => (0, true, 1, 2),
        Face::NegX => (0, false, 2, 1),
        Face::PosZ => (2, true, 0, 1),
        Face::NegZ => (2, false, 1, 0),
    };
    FaceBasis {
        normal_axis,
        positive,
        u_axis,
        v_axis,
    }
}

pub const CORNERS_UV: [(u8, u8); 4] = [(0, 0), (1, 0), (1, 1), (0, 1)];

#[inline]
pub fn normal(face: Face) -> Vec3 {
    let [x, y, z] = face.normal();
    Vec3::new(x, y, z)
}

#[inline]
pub fn axis_vec(axis: usize, len: f32) -> Vec3 {
    match axis {
        0 => Vec3::new(len, 0.0, 0.0),
        1 => Vec3::new(0.0, len, 0.0),
        _ => Vec3::new(0.0, 0.0, len),
    }
}

#[inline]
pub fn axis_step(axis: usize, d: i32) -> [i32; 3] {
    let mut s = [0; 3];
    s[axis] = d;
    s
}

impl FaceBasis {
    /// Corners of a `w × h` rectangle on this face of the cell at `origin`
    /// (min corner), in winding order.
    pub fn rect(&self, origin: Vec3, w: f32, h: f32) -> [Vec3; 4] {
        let base = if self.positive {
            origin + axis_vec(self.normal_axis, 1.0)
        } else {
            origin
        };
        let u = axis_vec(self.u_axis, w);
        let v = axis_vec(self.v_axis, h);
        [base, base + u, base + u + v, base + v]
    }

    /// Unit-cube corner coordinates `[x, y, z]` of corner `i`.
    pub fn unit_corner(&self, i: usize) -> [u8; 3] {
        let (cu, cv) = CORNERS_UV[i];
        let mut c = [0u8; 3];
        c[self.normal_axis] = u8::from(self.positive);
        c[self.u_axis] = cu;
        c[self.v_axis] = cv;
        c
    }
}
