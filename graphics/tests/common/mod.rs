//! Common utilities for material system integration tests.
//!
//! Provides a recording shading collaborator, scene builders and a
//! [`TestContext`] bundling a material system with the dummy backend.

use std::sync::Arc;

use umbra_core::math::{Mat4, Sphere, Vec3, look_at_rh, perspective_rh};
use umbra_graphics::material::{
    BindContext, DrawSurface, IndexRange, Material, ProgramKey, SurfaceGeometry,
};
use umbra_graphics::{
    BufferHandle, DummyBackend, GraphicsError, MaterialSystem, MaterialSystemConfig,
    SceneSurface, Shader, ShaderSort, ShadingFamily, ShadingInterface, ShadingStage, StateBits,
    ViewParams, WorldStats,
};

pub const VERTEX_BUFFER: BufferHandle = BufferHandle::new(1000);
pub const INDEX_BUFFER: BufferHandle = BufferHandle::new(1001);

/// Shading collaborator that records every bind.
#[derive(Debug, Default)]
pub struct RecordingShading {
    pub binds: Vec<(ShadingFamily, u32, BindContext)>,
    pub updates: usize,
}

impl ShadingInterface for RecordingShading {
    fn padded_stride(&self, _family: ShadingFamily, _program: ProgramKey) -> u32 {
        8
    }

    fn process_material(
        &mut self,
        family: ShadingFamily,
        _stage: &ShadingStage,
        _surface: &DrawSurface,
    ) -> ProgramKey {
        ProgramKey {
            id: family as u32,
            features: 0,
        }
    }

    fn update_surface_data(
        &mut self,
        _family: ShadingFamily,
        payload: &mut [u32],
        material: &Material,
        _surface: &DrawSurface,
        _stage: usize,
    ) {
        self.updates += 1;
        payload[0] = material.global_id + 1;
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

/// Single-stage shader of `family` with the given state.
pub fn shader(name: &str, sort: ShaderSort, family: ShadingFamily, state: StateBits) -> Arc<Shader> {
    Arc::new(Shader::new(name, sort).with_stage(ShadingStage::new(family, state)))
}

pub fn opaque(name: &str) -> Arc<Shader> {
    shader(
        name,
        ShaderSort::Opaque,
        ShadingFamily::Generic3D,
        StateBits::DEPTHMASK_TRUE | StateBits::DEPTHFUNC_LESS,
    )
}

/// Surface of two triangles with bounds `center`/`radius`.
pub fn surface_at(shader: &Arc<Shader>, index: u32, center: Vec3, radius: f32) -> SceneSurface {
    SceneSurface::new(
        Arc::clone(shader),
        Sphere::new(center, radius),
        SurfaceGeometry {
            vertex_buffer: VERTEX_BUFFER,
            index_buffer: INDEX_BUFFER,
            first_index: index * 6,
            index_count: 6,
        },
    )
}

/// A row of surfaces in front of [`main_camera`], spaced along x.
pub fn row(shader: &Arc<Shader>, count: u32) -> Vec<SceneSurface> {
    (0..count)
        .map(|i| surface_at(shader, i, Vec3::new(i as f32 * 4.0 - 8.0, 0.0, -20.0), 1.0))
        .collect()
}

pub fn projection() -> Mat4 {
    perspective_rh(std::f32::consts::FRAC_PI_2, 1.0, 1.0, 500.0)
}

/// Camera at the origin looking down -z.
pub fn main_camera() -> ViewParams {
    camera(Vec3::zeros(), Vec3::new(0.0, 0.0, -1.0))
}

pub fn camera(eye: Vec3, target: Vec3) -> ViewParams {
    let view = look_at_rh(&eye, &target, &Vec3::y());
    ViewParams::from_camera(eye, view, projection())
}

/// Material system, dummy backend and shading collaborator of one test.
pub struct TestContext {
    pub system: MaterialSystem,
    pub backend: DummyBackend,
    pub shading: RecordingShading,
}

impl TestContext {
    pub fn new(config: MaterialSystemConfig) -> Self {
        let _ = env_logger::builder().is_test(true).try_init();
        Self {
            system: MaterialSystem::new(config),
            backend: DummyBackend::new(),
            shading: RecordingShading::default(),
        }
    }

    pub fn with_backend(mut self, backend: DummyBackend) -> Self {
        self.backend = backend;
        self
    }

    pub fn generate(&mut self, scene: &[SceneSurface]) -> Result<WorldStats, GraphicsError> {
        self.system
            .generate_world(&mut self.backend, scene, &mut self.shading)
    }

    pub fn render_all(&mut self, view_id: u32) -> Result<(), GraphicsError> {
        self.system.render_materials(
            &mut self.backend,
            &mut self.shading,
            ShaderSort::Depth,
            ShaderSort::PostProcess,
            view_id,
        )
    }

    /// One full frame culling `views` for the next frame.
    pub fn frame(&mut self, views: &[ViewParams]) -> Result<(), GraphicsError> {
        self.system.start_frame();
        for (view_id, view) in views.iter().enumerate() {
            self.system.queue_surface_cull(view_id as u32, *view)?;
        }
        self.render_all(0)?;
        self.system.cull_surfaces(&mut self.backend)?;
        self.system.end_frame(&mut self.backend);
        Ok(())
    }

    /// Cull `view` in one frame, then draw the result in the next.
    pub fn cull_and_draw(&mut self, view: ViewParams) -> Result<(), GraphicsError> {
        self.frame(&[view])?;
        self.backend.clear_recording();
        self.shading.binds.clear();
        self.system.start_frame();
        self.render_all(0)
    }
}
