//! Fixtures shared by the material unit tests.

use std::sync::Arc;

use umbra_core::math::{Sphere, Vec3};

use super::family::{BindContext, IndexRange, ProgramKey, ShadingFamily, ShadingInterface};
use super::pack::{Material, MaterialKey};
use super::stage::ShadingStage;
use super::state::{CullType, PackKind, ShaderSort, StateBits};
use super::surface::{DrawSurface, SceneSurface, Shader, SurfaceGeometry};
use crate::types::BufferHandle;

/// Shading collaborator with fixed strides that records what it is asked to do.
#[derive(Debug, Default)]
pub struct FakeShading {
    pub updates: usize,
    pub binds: Vec<(ShadingFamily, u32, BindContext)>,
}

impl ShadingInterface for FakeShading {
    fn padded_stride(&self, family: ShadingFamily, _program: ProgramKey) -> u32 {
        match family {
            ShadingFamily::Generic3D => 8,
            ShadingFamily::LightMapping => 12,
            _ => 4,
        }
    }

    fn process_material(
        &mut self,
        family: ShadingFamily,
        stage: &ShadingStage,
        _surface: &DrawSurface,
    ) -> ProgramKey {
        ProgramKey {
            id: family as u32,
            features: stage.depth_fade as u32,
        }
    }

    fn update_surface_data(
        &mut self,
        _family: ShadingFamily,
        payload: &mut [u32],
        _material: &Material,
        surface: &DrawSurface,
        stage: usize,
    ) {
        self.updates += 1;
        payload[0] = stage as u32 + 1;
        if let Some(word) = payload.get_mut(1) {
            *word = surface.scene_index as u32;
        }
    }

    fn bind_shader(&mut self, family: ShadingFamily, material: &Material, context: &BindContext) {
        self.binds.push((family, material.global_id, *context));
    }

    fn color_renderer(
        &mut self,
        _family: ShadingFamily,
        _stage: &ShadingStage,
        surface: &DrawSurface,
    ) -> IndexRange {
        surface.geometry.index_range()
    }
}

/// Opaque shader with `stages` identical generic stages.
pub fn opaque_shader(name: &str, stages: usize) -> Arc<Shader> {
    let mut shader = Shader::new(name, ShaderSort::Opaque);
    for _ in 0..stages {
        shader = shader.with_stage(ShadingStage::new(
            ShadingFamily::Generic3D,
            StateBits::DEPTHMASK_TRUE | StateBits::DEPTHFUNC_LESS,
        ));
    }
    Arc::new(shader)
}

/// World surface `index` of two triangles, all sharing one vertex/index buffer pair.
pub fn scene_surface(shader: &Arc<Shader>, index: u32) -> SceneSurface {
    SceneSurface::new(
        Arc::clone(shader),
        Sphere::new(Vec3::new(index as f32 * 10.0, 0.0, -10.0), 1.0),
        SurfaceGeometry {
            vertex_buffer: BufferHandle::new(1),
            index_buffer: BufferHandle::new(2),
            first_index: index * 6,
            index_count: 6,
        },
    )
}

pub fn material_with_counts(
    pack: PackKind,
    id: u32,
    stride: u32,
    static_count: u32,
    dynamic_count: u32,
) -> Material {
    let key = MaterialKey {
        state_bits: StateBits::DEPTHMASK_TRUE,
        family: ShadingFamily::Generic3D,
        program: ProgramKey { id, features: 0 },
        cull_type: CullType::FrontSided,
        polygon_offset: false,
        vertex_buffer: BufferHandle::new(1),
        index_buffer: BufferHandle::new(2),
    };
    let mut material = Material::new(id, pack, key, None, stride);
    material.total_static_count = static_count;
    material.total_dynamic_count = dynamic_count;
    material.total_draw_surf_count = static_count + dynamic_count;
    material
}
