//! Surfaces as supplied by scene traversal, and the material system's own copy.

use std::sync::Arc;

use umbra_core::math::{Sphere, Vec3};

use super::family::IndexRange;
use super::layout::UniformSlot;
use super::pack::MaterialRef;
use super::stage::{ShadingStage, StageDynamics};
use super::state::{CullType, ShaderSort};
use crate::types::{BufferHandle, TextureHandle};

/// A shader: ordered stages plus the properties shared by all of them.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Shader {
    pub name: String,
    pub sort: ShaderSort,
    pub cull_type: CullType,
    pub polygon_offset: bool,
    pub stages: Vec<ShadingStage>,
    pub is_sky: bool,
    pub is_portal: bool,
    pub auto_sprite: bool,
}

impl Shader {
    pub fn new(name: impl Into<String>, sort: ShaderSort) -> Self {
        Self {
            name: name.into(),
            sort,
            ..Self::default()
        }
    }

    pub fn with_stage(mut self, stage: ShadingStage) -> Self {
        self.stages.push(stage);
        self
    }

    pub fn with_cull_type(mut self, cull_type: CullType) -> Self {
        self.cull_type = cull_type;
        self
    }

    pub fn with_polygon_offset(mut self) -> Self {
        self.polygon_offset = true;
        self
    }

    pub fn sky(mut self) -> Self {
        self.is_sky = true;
        self
    }

    pub fn portal(mut self) -> Self {
        self.is_portal = true;
        self
    }

    pub fn auto_sprite(mut self) -> Self {
        self.auto_sprite = true;
        self
    }
}

/// Surface type tag from scene traversal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum SurfaceKind {
    #[default]
    Face,
    Grid,
    Triangles,
    /// Never rendered.
    Skip,
}

/// Entity a surface belongs to. Only world surfaces are batched.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum EntityRef {
    #[default]
    World,
    Model(u32),
}

/// Where a surface's geometry lives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SurfaceGeometry {
    pub vertex_buffer: BufferHandle,
    pub index_buffer: BufferHandle,
    pub first_index: u32,
    pub index_count: u32,
}

impl SurfaceGeometry {
    pub fn index_range(&self) -> IndexRange {
        IndexRange {
            first_index: self.first_index,
            index_count: self.index_count,
        }
    }
}

/// A renderable surface produced by scene traversal.
#[derive(Debug, Clone)]
pub struct SceneSurface {
    pub shader: Arc<Shader>,
    pub kind: SurfaceKind,
    pub entity: EntityRef,
    pub bounds: Sphere,
    pub geometry: SurfaceGeometry,
    pub lightmap: Option<TextureHandle>,
    pub deluxemap: Option<TextureHandle>,
    /// Index of the depth pre-pass surface drawn ahead of this one.
    pub depth_surface: Option<usize>,
    /// Index of the fog surface drawn after this one.
    pub fog_surface: Option<usize>,
    /// Helper surface whose commands are issued through the surface that
    /// chains it, never on its own.
    pub material_system_skip: bool,
    /// Outline of a portal surface.
    pub portal_points: Vec<Vec3>,
}

impl SceneSurface {
    pub fn new(shader: Arc<Shader>, bounds: Sphere, geometry: SurfaceGeometry) -> Self {
        Self {
            shader,
            kind: SurfaceKind::default(),
            entity: EntityRef::World,
            bounds,
            geometry,
            lightmap: None,
            deluxemap: None,
            depth_surface: None,
            fog_surface: None,
            material_system_skip: false,
            portal_points: Vec::new(),
        }
    }

    pub fn with_kind(mut self, kind: SurfaceKind) -> Self {
        self.kind = kind;
        self
    }

    pub fn with_lightmap(mut self, lightmap: TextureHandle) -> Self {
        self.lightmap = Some(lightmap);
        self
    }

    pub fn with_depth_surface(mut self, index: usize) -> Self {
        self.depth_surface = Some(index);
        self
    }

    pub fn with_fog_surface(mut self, index: usize) -> Self {
        self.fog_surface = Some(index);
        self
    }

    pub fn with_portal_points(mut self, points: Vec<Vec3>) -> Self {
        self.portal_points = points;
        self
    }

    pub fn skipped_by_material_system(mut self) -> Self {
        self.material_system_skip = true;
        self
    }

    /// Whether the surface is batched by the material system at all.
    pub fn is_eligible(&self) -> bool {
        let shader = &self.shader;
        self.entity == EntityRef::World
            && self.kind != SurfaceKind::Skip
            && !shader.is_sky
            && !shader.is_portal
            && !shader.auto_sprite
    }
}

/// Index of a [`DrawSurface`] in the material system.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DrawSurfaceId(u32);

impl DrawSurfaceId {
    pub fn new(index: usize) -> Self {
        Self(index as u32)
    }

    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// Per-stage bookkeeping of a draw surface.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct StageSlot {
    pub material: Option<MaterialRef>,
    pub dynamics: StageDynamics,
    /// The uniform payload has been written at least once.
    pub initialized: bool,
    pub uniform_slot: Option<UniformSlot>,
    /// Index into the material's draw commands.
    pub draw_command: Option<u32>,
}

/// The material system's own copy of an eligible surface.
#[derive(Debug, Clone)]
pub struct DrawSurface {
    /// Position in the scene surface list the world was built from.
    pub scene_index: usize,
    pub shader: Arc<Shader>,
    pub bounds: Sphere,
    pub geometry: SurfaceGeometry,
    pub lightmap: Option<TextureHandle>,
    pub deluxemap: Option<TextureHandle>,
    pub depth_surface: Option<DrawSurfaceId>,
    pub fog_surface: Option<DrawSurfaceId>,
    pub material_system_skip: bool,
    pub stages: Vec<StageSlot>,
}

impl DrawSurface {
    pub fn from_scene(scene_index: usize, surface: &SceneSurface) -> Self {
        Self {
            scene_index,
            shader: Arc::clone(&surface.shader),
            bounds: surface.bounds,
            geometry: surface.geometry,
            lightmap: surface.lightmap,
            deluxemap: surface.deluxemap,
            depth_surface: None,
            fog_surface: None,
            material_system_skip: surface.material_system_skip,
            stages: vec![StageSlot::default(); surface.shader.stages.len()],
        }
    }

    /// Whether any stage needs a per-frame update.
    pub fn has_dynamic_stages(&self) -> bool {
        self.stages.iter().any(|slot| slot.dynamics.dynamic)
    }
}
