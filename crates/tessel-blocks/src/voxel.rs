//! Packed voxel cell.
//!
//! Layout (8 bytes): material id, RGB565 tint, packed light (sun high nibble,
//! torch low nibble), packed shade (opacity high nibble, water level low
//! nibble) and a flags byte (bit 0 content, bits 1-2 rotation).

use crate::material::MaterialDef;

pub const LIGHT_MAX: u8 = 15;
pub const OPACITY_FULL: u8 = 15;

const FLAG_CONTENT: u8 = 1;
const ROTATION_SHIFT: u8 = 1;
const ROTATION_MASK: u8 = 0b110;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MaterialId(pub u16);

impl MaterialId {
    pub const AIR: MaterialId = MaterialId(0);
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct Voxel {
    material: MaterialId,
    tint: u16,
    light: u8,
    shade: u8,
    flags: u8,
}

impl Voxel {
    pub const AIR: Voxel = Voxel {
        material: MaterialId::AIR,
        tint: 0xFFFF,
        light: 0,
        shade: 0,
        flags: 0,
    };

    /// Air voxel carrying full sunlight; used by shared placeholder grids.
    pub const SKY: Voxel = Voxel {
        material: MaterialId::AIR,
        tint: 0xFFFF,
        light: LIGHT_MAX << 4,
        shade: 0,
        flags: 0,
    };

    /// Builds a voxel whose content flag and opacity agree with `def`.
    #[inline]
    pub fn from_material(def: &MaterialDef) -> Self {
        let flags = if def.category.has_content() { FLAG_CONTENT } else { 0 };
        Voxel {
            material: def.id,
            tint: pack_rgb565(def.tint),
            light: 0,
            shade: (def.opacity.min(OPACITY_FULL)) << 4,
            flags,
        }
    }

    #[inline]
    pub fn material(self) -> MaterialId {
        self.material
    }

    #[inline]
    pub fn has_content(self) -> bool {
        self.flags & FLAG_CONTENT != 0
    }

    #[inline]
    pub fn opacity(self) -> u8 {
        self.shade >> 4
    }

    #[inline]
    pub fn is_opaque(self) -> bool {
        self.opacity() >= OPACITY_FULL
    }

    #[inline]
    pub fn sun(self) -> u8 {
        self.light >> 4
    }

    #[inline]
    pub fn torch(self) -> u8 {
        self.light & 0x0F
    }

    #[inline]
    pub fn light_packed(self) -> u8 {
        self.light
    }

    #[inline]
    pub fn set_sun(&mut self, v: u8) {
        self.light = (self.light & 0x0F) | (v.min(LIGHT_MAX) << 4);
    }

    #[inline]
    pub fn set_torch(&mut self, v: u8) {
        self.light = (self.light & 0xF0) | v.min(LIGHT_MAX);
    }

    #[inline]
    pub fn clear_light(&mut self) {
        self.light = 0;
    }

    /// Liquid level in sixteenths below a full cell; 0 is a full source.
    #[inline]
    pub fn water(self) -> u8 {
        self.shade & 0x0F
    }

    #[inline]
    pub fn with_water(mut self, level: u8) -> Self {
        self.shade = (self.shade & 0xF0) | level.min(15);
        self
    }

    #[inline]
    pub fn rotation(self) -> u8 {
        (self.flags & ROTATION_MASK) >> ROTATION_SHIFT
    }

    #[inline]
    pub fn with_rotation(mut self, rot: u8) -> Self {
        self.flags = (self.flags & !ROTATION_MASK) | ((rot & 0b11) << ROTATION_SHIFT);
        self
    }

    #[inline]
    pub fn tint(self) -> [u8; 3] {
        unpack_rgb565(self.tint)
    }

    #[inline]
    pub fn with_tint(mut self, rgb: [u8; 3]) -> Self {
        self.tint = pack_rgb565(rgb);
        self
    }
}

#[inline]
fn pack_rgb565(rgb: [u8; 3]) -> u16 {
    (u16::from(rgb[0] >> 3) << 11) | (u16::from(rgb[1] >> 2) << 5) | u16::from(rgb[2] >> 3)
}

#[inline]
fn unpack_rgb565(v: u16) -> [u8; 3] {
    let r = ((v >> 11) & 0x1F) as u8;
    let g = ((v >> 5) & 0x3F) as u8;
    let b = (v & 0x1F) as u8;
    [(r << 3) | (r >> 2), (g << 2) | (g >> 4), (b << 3) | (b >> 2)]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn voxel_is_eight_bytes() {
        assert_eq!(std::mem::size_of::<Voxel>(), 8);
    }

    #[test]
    fn white_tint_survives_packing() {
        assert_eq!(unpack_rgb565(pack_rgb565([255, 255, 255])), [255, 255, 255]);
        assert_eq!(unpack_rgb565(pack_rgb565([0, 0, 0])), [0, 0, 0]);
    }

    #[test]
    fn sky_constant_is_lit_air() {
        assert!(!Voxel::SKY.has_content());
        assert_eq!(Voxel::SKY.sun(), LIGHT_MAX);
        assert_eq!(Voxel::SKY.torch(), 0);
    }
}
