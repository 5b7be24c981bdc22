//! Materials and the packs that order them.

use std::ops::RangeInclusive;

use super::family::{ProgramKey, ShadingFamily};
use super::state::{CullType, PackKind, ShaderSort, StateBits};
use super::surface::DrawSurfaceId;
use crate::types::{BufferHandle, DrawIndexedIndirectArgs, TextureHandle};

/// Address of a material: its pack and its id within the pack.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MaterialRef {
    pub pack: PackKind,
    pub id: u32,
}

impl MaterialRef {
    pub fn new(pack: PackKind, id: u32) -> Self {
        Self { pack, id }
    }
}

/// Structural identity of a material.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MaterialKey {
    /// Already masked to [`StateBits::GPU_STATE_MASK`].
    pub state_bits: StateBits,
    pub family: ShadingFamily,
    pub program: ProgramKey,
    pub cull_type: CullType,
    pub polygon_offset: bool,
    pub vertex_buffer: BufferHandle,
    pub index_buffer: BufferHandle,
}

/// One indirect draw of a stage instance.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct DrawCommand {
    pub args: DrawIndexedIndirectArgs,
    pub textures: Vec<TextureHandle>,
}

/// A deduplicated pipeline configuration and everything drawn with it.
#[derive(Debug, Clone)]
pub struct Material {
    /// Index within the pack.
    pub id: u32,
    /// Index across all packs in render order. Also the atomic counter index.
    pub global_id: u32,
    pub pack: PackKind,
    pub key: MaterialKey,
    /// Material that must be drawn before this one.
    pub sync: Option<MaterialRef>,
    /// Per-instance uniform stride in words.
    pub padded_stride: u32,

    pub surfaces: Vec<DrawSurfaceId>,
    pub draw_commands: Vec<DrawCommand>,
    pub textures: Vec<TextureHandle>,
    pub textures_resident: bool,

    pub total_draw_surf_count: u32,
    pub total_static_count: u32,
    pub total_dynamic_count: u32,
    pub current_static_count: u32,
    pub current_dynamic_count: u32,

    /// Base of the static region, in words.
    pub static_offset: u32,
    /// Base of the dynamic region, in words.
    pub dynamic_offset: u32,

    pub batch_offset: u32,
    pub batch_count: u32,
}

impl Material {
    pub fn new(
        id: u32,
        pack: PackKind,
        key: MaterialKey,
        sync: Option<MaterialRef>,
        padded_stride: u32,
    ) -> Self {
        Self {
            id,
            global_id: 0,
            pack,
            key,
            sync,
            padded_stride,
            surfaces: Vec::new(),
            draw_commands: Vec::new(),
            textures: Vec::new(),
            textures_resident: false,
            total_draw_surf_count: 0,
            total_static_count: 0,
            total_dynamic_count: 0,
            current_static_count: 0,
            current_dynamic_count: 0,
            static_offset: 0,
            dynamic_offset: 0,
            batch_offset: 0,
            batch_count: 0,
        }
    }

    pub fn material_ref(&self) -> MaterialRef {
        MaterialRef::new(self.pack, self.id)
    }

    pub fn use_sync(&self) -> bool {
        self.sync.is_some()
    }

    /// Id of the material this one is ordered after.
    pub fn sync_material(&self) -> Option<u32> {
        self.sync.map(|sync| sync.id)
    }

    pub fn add_surface(&mut self, surface: DrawSurfaceId) {
        if !self.surfaces.contains(&surface) {
            self.surfaces.push(surface);
        }
    }

    /// Add `texture` to the resident set; returns `true` if it was new.
    pub fn add_texture(&mut self, texture: TextureHandle) -> bool {
        if self.textures.contains(&texture) {
            return false;
        }
        self.textures.push(texture);
        true
    }

    pub fn reset_build_state(&mut self) {
        self.draw_commands.clear();
        self.textures.clear();
        self.textures_resident = false;
        self.current_static_count = 0;
        self.current_dynamic_count = 0;
    }
}

/// Materials sharing a sort range, in creation order.
#[derive(Debug, Clone)]
pub struct MaterialPack {
    pub kind: PackKind,
    pub materials: Vec<Material>,
}

impl MaterialPack {
    pub fn new(kind: PackKind) -> Self {
        Self {
            kind,
            materials: Vec::new(),
        }
    }

    pub fn sort_range(&self) -> RangeInclusive<ShaderSort> {
        self.kind.sort_range()
    }

    /// Whether the whole sort range of this pack lies within `from..=to`.
    pub fn is_within(&self, from: ShaderSort, to: ShaderSort) -> bool {
        let range = self.sort_range();
        from <= *range.start() && *range.end() <= to
    }
}

/// The three packs in render order.
#[derive(Debug, Clone)]
pub struct MaterialPacks {
    packs: [MaterialPack; 3],
}

impl Default for MaterialPacks {
    fn default() -> Self {
        Self {
            packs: PackKind::ALL.map(MaterialPack::new),
        }
    }
}

impl MaterialPacks {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn pack(&self, kind: PackKind) -> &MaterialPack {
        &self.packs[kind.index()]
    }

    pub fn pack_mut(&mut self, kind: PackKind) -> &mut MaterialPack {
        &mut self.packs[kind.index()]
    }

    pub fn iter(&self) -> impl Iterator<Item = &MaterialPack> {
        self.packs.iter()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut MaterialPack> {
        self.packs.iter_mut()
    }

    /// All materials in render order.
    pub fn materials(&self) -> impl Iterator<Item = &Material> {
        self.packs.iter().flat_map(|pack| pack.materials.iter())
    }

    pub fn materials_mut(&mut self) -> impl Iterator<Item = &mut Material> {
        self.packs.iter_mut().flat_map(|pack| pack.materials.iter_mut())
    }

    pub fn get(&self, material: MaterialRef) -> Option<&Material> {
        self.pack(material.pack).materials.get(material.id as usize)
    }

    pub fn get_mut(&mut self, material: MaterialRef) -> Option<&mut Material> {
        self.pack_mut(material.pack)
            .materials
            .get_mut(material.id as usize)
    }

    pub fn material_count(&self) -> usize {
        self.packs.iter().map(|pack| pack.materials.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.material_count() == 0
    }

    pub fn clear(&mut self) {
        for pack in &mut self.packs {
            pack.materials.clear();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key() -> MaterialKey {
        MaterialKey {
            state_bits: StateBits::DEPTHMASK_TRUE,
            family: ShadingFamily::Generic3D,
            program: ProgramKey::default(),
            cull_type: CullType::FrontSided,
            polygon_offset: false,
            vertex_buffer: BufferHandle::new(1),
            index_buffer: BufferHandle::new(2),
        }
    }

    #[test]
    fn test_material_dedups_surfaces_and_textures() {
        let mut material = Material::new(0, PackKind::Opaque, key(), None, 4);
        material.add_surface(DrawSurfaceId::new(3));
        material.add_surface(DrawSurfaceId::new(3));
        assert_eq!(material.surfaces.len(), 1);

        assert!(material.add_texture(TextureHandle::new(7)));
        assert!(!material.add_texture(TextureHandle::new(7)));
        assert_eq!(material.textures, vec![TextureHandle::new(7)]);
        assert!(!material.use_sync());
    }

    #[test]
    fn test_pack_within_sort_range() {
        let packs = MaterialPacks::new();
        let opaque = packs.pack(PackKind::Opaque);
        assert!(opaque.is_within(ShaderSort::Bad, ShaderSort::Opaque));
        assert!(!opaque.is_within(ShaderSort::Decal, ShaderSort::PostProcess));
        assert!(!opaque.is_within(ShaderSort::Opaque, ShaderSort::Opaque));
        assert!(
            packs
                .pack(PackKind::Transparent)
                .is_within(ShaderSort::Decal, ShaderSort::PostProcess)
        );
    }

    #[test]
    fn test_lookup_by_ref() {
        let mut packs = MaterialPacks::new();
        packs
            .pack_mut(PackKind::Transparent)
            .materials
            .push(Material::new(0, PackKind::Transparent, key(), None, 4));

        let material = MaterialRef::new(PackKind::Transparent, 0);
        assert_eq!(packs.get(material).map(|m| m.padded_stride), Some(4));
        assert!(packs.get(MaterialRef::new(PackKind::Depth, 0)).is_none());
        assert_eq!(packs.material_count(), 1);
    }
}
