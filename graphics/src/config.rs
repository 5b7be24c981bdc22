//! Runtime toggles of the material system.

use crate::material::{Material, MaterialPacks, PackKind};

/// Flat-color visualization of material boundaries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum DebugMode {
    #[default]
    Off,
    /// Color opaque materials on the scale of the depth pack.
    Depth,
    /// Color opaque materials only.
    Opaque,
    /// Color opaque and transparent materials.
    OpaqueTransparent,
}

const DEBUG_PALETTE: [[f32; 3]; 6] = [
    [0.75, 0.25, 0.25],
    [0.75, 0.75, 0.25],
    [0.25, 0.75, 0.25],
    [0.25, 0.75, 0.75],
    [0.25, 0.25, 0.75],
    [0.75, 0.25, 0.75],
];

impl DebugMode {
    /// Debug color of `material`, or `None` when it is drawn normally.
    ///
    /// Only generic and lightmapped materials outside the depth pack are
    /// colored. Returns `None` for modes that skip the material's pack.
    pub fn material_color(self, material: &Material, packs: &MaterialPacks) -> Option<[f32; 3]> {
        if !material.key.family.supports_wireframe() || material.pack == PackKind::Depth {
            return None;
        }

        let depth = packs.pack(PackKind::Depth).materials.len();
        let lit = packs.pack(PackKind::Opaque).materials.len()
            + packs.pack(PackKind::Transparent).materials.len();
        let id = material.id as usize;

        let (ratio, count) = match self {
            Self::Off => return None,
            Self::Depth if material.pack == PackKind::Opaque => {
                (id as f32 / (depth + 2) as f32 + 1.0, depth)
            }
            Self::Opaque if material.pack == PackKind::Opaque => {
                ((id + 1) as f32 / (lit + 2) as f32, lit)
            }
            Self::OpaqueTransparent => ((id + 1) as f32 / (lit + 2) as f32 + 1.0, lit),
            Self::Depth | Self::Opaque => return None,
        };

        // Empty packs would divide by zero.
        let index = match count {
            0 => 0,
            count => (id * DEBUG_PALETTE.len() / count).min(DEBUG_PALETTE.len() - 1),
        };
        let base = DEBUG_PALETTE[index];
        let third = 1.0 / 3.0;

        Some([
            ratio.min(third) * 3.0 * base[0],
            (ratio - third).clamp(0.0, third) * 3.0 * base[1],
            (ratio - 2.0 * third).clamp(0.0, third) * 3.0 * base[2],
        ])
    }
}

/// Configuration of a [`MaterialSystem`](crate::system::MaterialSystem).
#[derive(Debug, Clone, PartialEq)]
pub struct MaterialSystemConfig {
    /// Test surfaces against the view frustum on the GPU.
    pub gpu_frustum_culling: bool,
    /// Test surfaces against the depth pyramid on the GPU.
    pub gpu_occlusion_culling: bool,
    /// Freeze the culling cameras at their current position.
    pub lock_pvs: bool,
    pub debug_mode: DebugMode,
    /// Draw a wireframe over materials that do not write depth.
    pub show_tris: bool,
    /// Draw nothing through the material system.
    pub skip_material_system: bool,
    /// Write per-surface cull results to a debug buffer.
    pub material_debug: bool,
    pub fog_enabled: bool,
    pub heat_haze_enabled: bool,
    /// Sampled by every draw in addition to its own textures.
    pub light_tile_texture: Option<crate::types::TextureHandle>,
    pub near_plane: f32,
}

impl Default for MaterialSystemConfig {
    fn default() -> Self {
        Self {
            gpu_frustum_culling: true,
            gpu_occlusion_culling: false,
            lock_pvs: false,
            debug_mode: DebugMode::Off,
            show_tris: false,
            skip_material_system: false,
            material_debug: false,
            fog_enabled: true,
            heat_haze_enabled: true,
            light_tile_texture: None,
            near_plane: 3.0,
        }
    }
}

impl MaterialSystemConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_frustum_culling(mut self, enabled: bool) -> Self {
        self.gpu_frustum_culling = enabled;
        self
    }

    pub fn with_occlusion_culling(mut self, enabled: bool) -> Self {
        self.gpu_occlusion_culling = enabled;
        self
    }

    pub fn with_lock_pvs(mut self, locked: bool) -> Self {
        self.lock_pvs = locked;
        self
    }

    pub fn with_debug_mode(mut self, mode: DebugMode) -> Self {
        self.debug_mode = mode;
        self
    }

    pub fn with_show_tris(mut self, enabled: bool) -> Self {
        self.show_tris = enabled;
        self
    }

    pub fn with_skip_material_system(mut self, skip: bool) -> Self {
        self.skip_material_system = skip;
        self
    }

    pub fn with_material_debug(mut self, enabled: bool) -> Self {
        self.material_debug = enabled;
        self
    }

    pub fn with_fog(mut self, enabled: bool) -> Self {
        self.fog_enabled = enabled;
        self
    }

    pub fn with_heat_haze(mut self, enabled: bool) -> Self {
        self.heat_haze_enabled = enabled;
        self
    }

    pub fn with_light_tile_texture(mut self, texture: crate::types::TextureHandle) -> Self {
        self.light_tile_texture = Some(texture);
        self
    }

    pub fn with_near_plane(mut self, near_plane: f32) -> Self {
        self.near_plane = near_plane;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::material::testing::material_with_counts;
    use rstest::rstest;

    fn packs(depth: u32, opaque: u32, transparent: u32) -> MaterialPacks {
        let mut packs = MaterialPacks::new();
        for (kind, count) in [
            (PackKind::Depth, depth),
            (PackKind::Opaque, opaque),
            (PackKind::Transparent, transparent),
        ] {
            for id in 0..count {
                packs
                    .pack_mut(kind)
                    .materials
                    .push(material_with_counts(kind, id, 4, 1, 0));
            }
        }
        packs
    }

    #[test]
    fn test_builder() {
        let config = MaterialSystemConfig::new()
            .with_occlusion_culling(true)
            .with_debug_mode(DebugMode::Opaque)
            .with_fog(false)
            .with_near_plane(0.5);
        assert!(config.gpu_frustum_culling);
        assert!(config.gpu_occlusion_culling);
        assert_eq!(config.debug_mode, DebugMode::Opaque);
        assert!(!config.fog_enabled);
        assert_eq!(config.near_plane, 0.5);
    }

    #[rstest]
    #[case(DebugMode::Depth)]
    #[case(DebugMode::Opaque)]
    #[case(DebugMode::OpaqueTransparent)]
    fn test_debug_color_with_empty_depth_pack(#[case] mode: DebugMode) {
        let packs = packs(0, 1, 0);
        let material = &packs.pack(PackKind::Opaque).materials[0];
        let color = mode.material_color(material, &packs).unwrap();
        assert!(color.iter().all(|c| c.is_finite() && (0.0..=1.0).contains(c)));
    }

    #[test]
    fn test_debug_color_skips() {
        let packs = packs(1, 1, 1);
        let depth = &packs.pack(PackKind::Depth).materials[0];
        let transparent = &packs.pack(PackKind::Transparent).materials[0];

        assert_eq!(DebugMode::Off.material_color(&packs.pack(PackKind::Opaque).materials[0], &packs), None);
        assert_eq!(DebugMode::OpaqueTransparent.material_color(depth, &packs), None);
        assert_eq!(DebugMode::Opaque.material_color(transparent, &packs), None);
        assert!(DebugMode::OpaqueTransparent.material_color(transparent, &packs).is_some());
    }

    #[test]
    fn test_debug_colors_differ() {
        let packs = packs(0, 6, 0);
        let colors: Vec<_> = packs
            .pack(PackKind::Opaque)
            .materials
            .iter()
            .map(|m| DebugMode::Opaque.material_color(m, &packs).unwrap())
            .collect();
        assert_ne!(colors[0], colors[5]);
    }
}
