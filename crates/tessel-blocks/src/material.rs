use std::collections::HashMap;
use std::error::Error;
use std::fs;
use std::path::Path;

use serde::Deserialize;

use crate::voxel::{LIGHT_MAX, MaterialId, OPACITY_FULL, Voxel};

/// How the mesher treats voxels of a material.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RenderCategory {
    #[default]
    Empty,
    Opaque,
    OpaqueNoAo,
    Foliage,
    Liquid,
    Translucent,
    Custom,
}

impl RenderCategory {
    #[inline]
    pub fn has_content(self) -> bool {
        !matches!(self, RenderCategory::Empty)
    }

    /// Full cubes that hide the faces of whatever touches them.
    #[inline]
    pub fn occludes(self) -> bool {
        matches!(self, RenderCategory::Opaque | RenderCategory::OpaqueNoAo)
    }
}

#[derive(Clone, Debug)]
pub struct MaterialDef {
    pub id: MaterialId,
    pub name: String,
    pub category: RenderCategory,
    pub opacity: u8,
    pub emission: u8,
    pub tint: [u8; 3],
    pub collides: bool,
}

#[derive(Clone, Debug)]
pub struct MaterialTable {
    pub materials: Vec<MaterialDef>,
    by_name: HashMap<String, MaterialId>,
}

impl Default for MaterialTable {
    fn default() -> Self {
        Self::builtin()
    }
}

impl MaterialTable {
    /// Table holding only air at id 0.
    pub fn new() -> Self {
        let mut t = MaterialTable {
            materials: Vec::new(),
            by_name: HashMap::new(),
        };
        t.push(MaterialEntry {
            name: "air".into(),
            category: RenderCategory::Empty,
            opacity: Some(0),
            emission: None,
            tint: None,
            collides: Some(false),
        });
        t
    }

    /// Small built-in palette used by the reference terrain and tests.
    pub fn builtin() -> Self {
        let mut t = Self::new();
        let defs: [(&str, RenderCategory, u8, u8, [u8; 3]); 10] = [
            ("stone", RenderCategory::Opaque, 15, 0, [128, 128, 128]),
            ("dirt", RenderCategory::Opaque, 15, 0, [134, 96, 67]),
            ("grass", RenderCategory::Opaque, 15, 0, [96, 160, 64]),
            ("sand", RenderCategory::OpaqueNoAo, 15, 0, [219, 207, 163]),
            ("water", RenderCategory::Liquid, 2, 0, [48, 96, 200]),
            ("glass", RenderCategory::Translucent, 0, 0, [220, 240, 255]),
            ("leaves", RenderCategory::Translucent, 1, 0, [64, 128, 48]),
            ("tall_grass", RenderCategory::Foliage, 0, 0, [104, 168, 72]),
            ("torch", RenderCategory::Custom, 0, 12, [255, 200, 120]),
            ("glowstone", RenderCategory::Opaque, 15, 15, [255, 230, 160]),
        ];
        for (name, category, opacity, emission, tint) in defs {
            t.push(MaterialEntry {
                name: name.into(),
                category,
                opacity: Some(opacity),
                emission: Some(emission),
                tint: Some(tint),
                collides: None,
            });
        }
        t
    }

    fn push(&mut self, e: MaterialEntry) -> MaterialId {
        let id = MaterialId(self.materials.len() as u16);
        let opacity = e.opacity.unwrap_or(if e.category.occludes() { OPACITY_FULL } else { 0 });
        self.by_name.insert(e.name.clone(), id);
        self.materials.push(MaterialDef {
            id,
            name: e.name,
            category: e.category,
            opacity: opacity.min(OPACITY_FULL),
            emission: e.emission.unwrap_or(0).min(LIGHT_MAX),
            tint: e.tint.unwrap_or([255, 255, 255]),
            collides: e.collides.unwrap_or(e.category.occludes()),
        });
        id
    }

    #[inline]
    pub fn get(&self, id: MaterialId) -> Option<&MaterialDef> {
        self.materials.get(id.0 as usize)
    }

    #[inline]
    pub fn category(&self, id: MaterialId) -> RenderCategory {
        self.get(id).map(|m| m.category).unwrap_or(RenderCategory::Empty)
    }

    #[inline]
    pub fn emission(&self, id: MaterialId) -> u8 {
        self.get(id).map(|m| m.emission).unwrap_or(0)
    }

    pub fn id_by_name(&self, name: &str) -> Option<MaterialId> {
        self.by_name.get(name).copied()
    }

    /// Voxel for a named material, consistent with the definition.
    pub fn voxel(&self, name: &str) -> Option<Voxel> {
        self.id_by_name(name)
            .and_then(|id| self.get(id))
            .map(Voxel::from_material)
    }

    pub fn voxel_for(&self, id: MaterialId) -> Voxel {
        self.get(id).map(Voxel::from_material).unwrap_or(Voxel::AIR)
    }

    pub fn len(&self) -> usize {
        self.materials.len()
    }

    pub fn is_empty(&self) -> bool {
        self.materials.is_empty()
    }

    pub fn from_configs(cfg: MaterialsConfig) -> Result<Self, Box<dyn Error>> {
        let mut t = Self::new();
        for entry in cfg.materials {
            if entry.name == "air" {
                continue;
            }
            if t.by_name.contains_key(&entry.name) {
                return Err(format!("duplicate material '{}'", entry.name).into());
            }
            if entry.opacity.is_some_and(|o| o > OPACITY_FULL) {
                return Err(format!("material '{}': opacity exceeds {}", entry.name, OPACITY_FULL).into());
            }
            if entry.emission.is_some_and(|e| e > LIGHT_MAX) {
                return Err(format!("material '{}': emission exceeds {}", entry.name, LIGHT_MAX).into());
            }
            t.push(entry);
        }
        Ok(t)
    }

    pub fn from_toml_str(s: &str) -> Result<Self, Box<dyn Error>> {
        let cfg: MaterialsConfig = toml::from_str(s)?;
        Self::from_configs(cfg)
    }

    pub fn load_from_path(path: impl AsRef<Path>) -> Result<Self, Box<dyn Error>> {
        let s = fs::read_to_string(path)?;
        Self::from_toml_str(&s)
    }
}

// --- Config ---

#[derive(Clone, Debug, Default, Deserialize)]
pub struct MaterialsConfig {
    #[serde(default)]
    pub materials: Vec<MaterialEntry>,
}

#[derive(Clone, Debug, Deserialize)]
pub struct MaterialEntry {
    pub name: String,
    #[serde(default)]
    pub category: RenderCategory,
    pub opacity: Option<u8>,
    pub emission: Option<u8>,
    pub tint: Option<[u8; 3]>,
    pub collides: Option<bool>,
}
