//! The material system context: world build, per-frame culling and draws.
//!
//! A frame drives the context in this order:
//!
//! ```text
//! start_frame -> queue_surface_cull* -> render_materials* -> cull_surfaces
//!             -> add_portal_surfaces -> end_frame
//! ```
//!
//! Draws of a frame use the commands culled during the previous one; culling
//! writes the partitions of the next frame. The first `render_materials`
//! call of a frame also refreshes dynamic uniforms and clears the counters
//! the upcoming cull will fill.

use crate::backend::{BarrierScope, GpuBackend, IndirectCountDraw, PipelineState, Topology};
use crate::config::MaterialSystemConfig;
use crate::culling::{
    CullBuffers, CullSettings, CullingPipeline, DepthPyramid, FrameRing, ViewParams, partition,
};
use crate::error::GraphicsError;
use crate::graph::RenderGraph;
use crate::material::{
    BindContext, DrawSurface, DrawSurfaceId, MaterialPacks, MaterialRef, SceneSurface,
    ShaderSort, ShadingFamily, ShadingInterface, StateBits, UniformArena, UniformLayout,
    assign_batches, build_command_buffers, build_draw_commands, classify_surfaces,
    plan_uniform_layout, update_dynamic_surfaces,
};
use crate::portal::{PortalResolution, PortalSurface, PortalVisibility, portal_bounding_spheres};
use crate::residency::TextureResidency;
use crate::shader::bindings;
use crate::types::{
    BufferDescriptor, BufferHandle, BufferUsage, DrawIndexedIndirectArgs, GpuPortalSurface,
    GpuSurfaceBatch, GpuSurfaceCommand,
};
use crate::{MAX_COMMAND_COUNTERS, MAX_VIEWFRAMES, SURFACE_COMMANDS_PER_BATCH};

/// Counts of a finished world build.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct WorldStats {
    pub materials: usize,
    pub draw_surfaces: usize,
    pub dynamic_surfaces: usize,
    pub surface_commands: u32,
    pub batches: u32,
    pub portals: usize,
    pub uniform_words: u32,
}

/// GPU buffers of a built world.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WorldBuffers {
    pub uniforms: BufferHandle,
    pub cull: CullBuffers,
}

impl WorldBuffers {
    fn handles(&self) -> impl Iterator<Item = BufferHandle> {
        let cull = self.cull;
        [
            self.uniforms,
            cull.descriptors,
            cull.surface_commands,
            cull.culled_commands,
            cull.batches,
            cull.counters,
            cull.portals,
        ]
        .into_iter()
        .chain(cull.debug)
    }
}

/// Cull results of one surface, as written to the debug buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SurfaceCullResult {
    pub processed: bool,
    pub in_view: bool,
    pub unoccluded: bool,
    pub visible: bool,
}

/// Culled draws of one material in one view.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CulledMaterial {
    pub material: MaterialRef,
    pub commands: Vec<DrawIndexedIndirectArgs>,
}

/// Buffer size rounded up to one word; backends reject empty buffers.
fn buffer_size(bytes: usize) -> u64 {
    bytes.max(4) as u64
}

fn create_buffer(
    backend: &mut dyn GpuBackend,
    label: &str,
    bytes: usize,
    usage: BufferUsage,
) -> Result<BufferHandle, GraphicsError> {
    backend.create_buffer(&BufferDescriptor::new(buffer_size(bytes), usage).with_label(label))
}

/// Write `partition` into every (frame, view) partition of `buffer`.
fn upload_partitions<T: bytemuck::Pod>(
    backend: &mut dyn GpuBackend,
    buffer: BufferHandle,
    partition: &[T],
) -> Result<(), GraphicsError> {
    let bytes: &[u8] = bytemuck::cast_slice(partition);
    if bytes.is_empty() {
        return Ok(());
    }
    for index in 0..MAX_VIEWFRAMES {
        backend.write_buffer(buffer, (index * bytes.len()) as u64, bytes)?;
    }
    Ok(())
}

/// GPU-driven material renderer of one world.
pub struct MaterialSystem {
    config: MaterialSystemConfig,

    packs: MaterialPacks,
    surfaces: Vec<DrawSurface>,
    dynamic_surfaces: Vec<DrawSurfaceId>,
    autosprite_surfaces: Vec<usize>,
    portals: Vec<PortalSurface>,
    arena: UniformArena,

    pipeline: CullingPipeline,
    buffers: Option<WorldBuffers>,
    pyramid: Option<DepthPyramid>,

    frames: FrameRing,
    residency: TextureResidency,
    frame_start: bool,
    /// Whether the next frame's counters were reset since the last rotation.
    counters_cleared: bool,
}

impl MaterialSystem {
    pub fn new(config: MaterialSystemConfig) -> Self {
        Self {
            config,
            packs: MaterialPacks::new(),
            surfaces: Vec::new(),
            dynamic_surfaces: Vec::new(),
            autosprite_surfaces: Vec::new(),
            portals: Vec::new(),
            arena: UniformArena::default(),
            pipeline: CullingPipeline::default(),
            buffers: None,
            pyramid: None,
            frames: FrameRing::new(),
            residency: TextureResidency::new(),
            frame_start: true,
            counters_cleared: false,
        }
    }

    pub fn config(&self) -> &MaterialSystemConfig {
        &self.config
    }

    pub fn config_mut(&mut self) -> &mut MaterialSystemConfig {
        &mut self.config
    }

    pub fn is_world_generated(&self) -> bool {
        self.buffers.is_some()
    }

    pub fn packs(&self) -> &MaterialPacks {
        &self.packs
    }

    pub fn surfaces(&self) -> &[DrawSurface] {
        &self.surfaces
    }

    pub fn dynamic_surfaces(&self) -> &[DrawSurfaceId] {
        &self.dynamic_surfaces
    }

    /// Scene indices of autosprite surfaces, drawn by the legacy path.
    pub fn autosprite_surfaces(&self) -> &[usize] {
        &self.autosprite_surfaces
    }

    pub fn portals(&self) -> &[PortalSurface] {
        &self.portals
    }

    pub fn uniform_layout(&self) -> UniformLayout {
        self.arena.layout()
    }

    pub fn uniforms(&self) -> &UniformArena {
        &self.arena
    }

    pub fn pipeline(&self) -> &CullingPipeline {
        &self.pipeline
    }

    pub fn buffers(&self) -> Option<&WorldBuffers> {
        self.buffers.as_ref()
    }

    pub fn frames(&self) -> &FrameRing {
        &self.frames
    }

    pub fn residency(&self) -> &TextureResidency {
        &self.residency
    }

    pub fn depth_pyramid(&self) -> Option<&DepthPyramid> {
        self.pyramid.as_ref()
    }

    /// Build the materials and GPU buffers of `scene`, replacing any
    /// previous world.
    pub fn generate_world(
        &mut self,
        backend: &mut dyn GpuBackend,
        scene: &[SceneSurface],
        shading: &mut dyn ShadingInterface,
    ) -> Result<WorldStats, GraphicsError> {
        umbra_core::profile_function!();
        log::info!("Generating world materials for {} surfaces", scene.len());

        self.frames.wait_idle();
        self.release_world(backend);

        let mut classification = classify_surfaces(scene, shading);
        let layout = plan_uniform_layout(&mut classification.packs)?;
        let mut arena = UniformArena::new(layout);

        let extra_textures: Vec<_> = self.config.light_tile_texture.into_iter().collect();
        let dynamic_surfaces = build_draw_commands(
            &mut classification.packs,
            &mut classification.surfaces,
            &mut arena,
            shading,
            &extra_textures,
        )?;
        let total_batch_count = assign_batches(&mut classification.packs)?;
        let commands = build_command_buffers(
            &classification.packs,
            &classification.surfaces,
            total_batch_count,
        )?;
        let portals = portal_bounding_spheres(scene, &classification.portal_surfaces);

        let pipeline = CullingPipeline {
            descriptor_count: commands.descriptor_count,
            descriptor_stride: commands.descriptor_stride,
            surface_commands_count: commands.surface_commands_count(),
            total_batch_count,
            total_portals: portals.len() as u32,
        };

        let buffers = self.create_world_buffers(backend, &pipeline, &arena)?;
        backend.write_buffer(buffers.uniforms, 0, arena.as_bytes())?;
        backend.write_buffer(
            buffers.cull.descriptors,
            0,
            bytemuck::cast_slice(&commands.descriptors),
        )?;
        upload_partitions(backend, buffers.cull.surface_commands, &commands.surface_commands)?;
        backend.write_buffer(
            buffers.cull.batches,
            0,
            bytemuck::cast_slice(&commands.batches),
        )?;
        let gpu_portals: Vec<GpuPortalSurface> =
            portals.iter().map(PortalSurface::to_gpu).collect();
        upload_partitions(backend, buffers.cull.portals, &gpu_portals)?;

        let stats = WorldStats {
            materials: classification.packs.material_count(),
            draw_surfaces: classification.surfaces.len(),
            dynamic_surfaces: dynamic_surfaces.len(),
            surface_commands: pipeline.surface_commands_count,
            batches: total_batch_count,
            portals: portals.len(),
            uniform_words: layout.total_words,
        };

        self.packs = classification.packs;
        self.surfaces = classification.surfaces;
        self.dynamic_surfaces = dynamic_surfaces;
        self.autosprite_surfaces = classification.autosprite_surfaces;
        self.portals = portals;
        self.arena = arena;
        self.pipeline = pipeline;
        self.buffers = Some(buffers);
        self.frame_start = true;
        self.counters_cleared = false;

        log::info!(
            "World materials: {} materials, {} surface commands in {} batches, {} portals",
            stats.materials,
            stats.surface_commands,
            stats.batches,
            stats.portals
        );
        Ok(stats)
    }

    fn create_world_buffers(
        &self,
        backend: &mut dyn GpuBackend,
        pipeline: &CullingPipeline,
        arena: &UniformArena,
    ) -> Result<WorldBuffers, GraphicsError> {
        let storage = BufferUsage::STORAGE | BufferUsage::COPY_DST;
        let commands_count = pipeline.surface_commands_count as usize;

        let uniforms = create_buffer(
            backend,
            "materials",
            arena.as_bytes().len(),
            BufferUsage::UNIFORM | storage,
        )?;
        let descriptors = create_buffer(
            backend,
            "surface_descriptors",
            (pipeline.descriptor_count * pipeline.descriptor_stride) as usize * 4,
            storage,
        )?;
        let surface_commands = create_buffer(
            backend,
            "surface_commands",
            commands_count * MAX_VIEWFRAMES * std::mem::size_of::<GpuSurfaceCommand>(),
            storage,
        )?;
        let culled_commands = create_buffer(
            backend,
            "culled_commands",
            commands_count * MAX_VIEWFRAMES * DrawIndexedIndirectArgs::SIZE as usize,
            BufferUsage::STORAGE | BufferUsage::INDIRECT | BufferUsage::MAP_READ,
        )?;
        let batches = create_buffer(
            backend,
            "surface_batches",
            pipeline.total_batch_count as usize * std::mem::size_of::<GpuSurfaceBatch>(),
            storage,
        )?;
        let counters = create_buffer(
            backend,
            "command_counters",
            MAX_COMMAND_COUNTERS * MAX_VIEWFRAMES * 4,
            BufferUsage::STORAGE
                | BufferUsage::INDIRECT
                | BufferUsage::ATOMIC_COUNTER
                | BufferUsage::MAP_READ,
        )?;
        let portals = create_buffer(
            backend,
            "portal_surfaces",
            pipeline.total_portals as usize * MAX_VIEWFRAMES * std::mem::size_of::<GpuPortalSurface>(),
            storage | BufferUsage::MAP_READ,
        )?;
        let debug = if self.config.material_debug {
            Some(create_buffer(
                backend,
                "material_debug",
                commands_count * 20 * 4,
                BufferUsage::STORAGE | BufferUsage::MAP_READ,
            )?)
        } else {
            None
        };

        Ok(WorldBuffers {
            uniforms,
            cull: CullBuffers {
                descriptors,
                surface_commands,
                culled_commands,
                batches,
                counters,
                portals,
                debug,
            },
        })
    }

    /// (Re)create the depth pyramid for a `width` x `height` depth buffer.
    pub fn generate_depth_images(
        &mut self,
        backend: &mut dyn GpuBackend,
        width: u32,
        height: u32,
    ) -> Result<(), GraphicsError> {
        if let Some(old) = self.pyramid.take() {
            self.frames.wait_idle();
            old.destroy(backend);
        }
        self.pyramid = Some(DepthPyramid::create(backend, width, height)?);
        Ok(())
    }

    /// Begin queueing the views of the next frame.
    pub fn start_frame(&mut self) {
        self.frames.start_frame();
    }

    /// Queue `view_id` for culling into the next frame.
    pub fn queue_surface_cull(
        &mut self,
        view_id: u32,
        params: ViewParams,
    ) -> Result<(), GraphicsError> {
        self.frames.queue_view(view_id, params)
    }

    /// Draw every material whose pack lies within `from..=to` for `view_id`.
    pub fn render_materials(
        &mut self,
        backend: &mut dyn GpuBackend,
        shading: &mut dyn ShadingInterface,
        from: ShaderSort,
        to: ShaderSort,
        view_id: u32,
    ) -> Result<(), GraphicsError> {
        umbra_core::profile_function!();

        if self.config.skip_material_system {
            return Ok(());
        }
        let Some(buffers) = self.buffers else {
            return Ok(());
        };

        if self.frame_start {
            self.begin_frame_draws(backend, shading, &buffers)?;
            self.frame_start = false;
        }

        backend.bind_buffer(bindings::MATERIAL_UNIFORMS, buffers.uniforms);

        let materials: Vec<MaterialRef> = self
            .packs
            .iter()
            .filter(|pack| pack.is_within(from, to))
            .flat_map(|pack| pack.materials.iter().map(|m| m.material_ref()))
            .collect();
        for material in materials {
            self.render_material(backend, shading, material, view_id, &buffers)?;
        }
        Ok(())
    }

    /// Per-frame work done before the first draw.
    fn begin_frame_draws(
        &mut self,
        backend: &mut dyn GpuBackend,
        shading: &mut dyn ShadingInterface,
        buffers: &WorldBuffers,
    ) -> Result<(), GraphicsError> {
        self.residency.start_frame();

        if !self.dynamic_surfaces.is_empty() {
            update_dynamic_surfaces(
                &self.packs,
                &self.surfaces,
                &self.dynamic_surfaces,
                &mut self.arena,
                shading,
            )?;
            let offset = self.arena.layout().dynamic_offset as u64 * 4;
            backend.write_buffer(buffers.uniforms, offset, self.arena.dynamic_bytes())?;
        }

        self.clear_next_counters(backend, buffers)?;
        backend.memory_barrier(BarrierScope::COMMAND);
        Ok(())
    }

    /// Reset the next frame's draw counters once per frame.
    fn clear_next_counters(
        &mut self,
        backend: &mut dyn GpuBackend,
        buffers: &WorldBuffers,
    ) -> Result<(), GraphicsError> {
        if self.counters_cleared {
            return Ok(());
        }
        let mut graph = RenderGraph::new();
        graph.add_compute_pass(
            self.pipeline
                .clear_counters_pass(self.frames.next_frame(), buffers.cull.counters),
        );
        let compiled = graph.compile()?;
        backend.execute_graph(&graph, &compiled)?;
        self.counters_cleared = true;
        Ok(())
    }

    fn render_material(
        &mut self,
        backend: &mut dyn GpuBackend,
        shading: &mut dyn ShadingInterface,
        material_ref: MaterialRef,
        view_id: u32,
        buffers: &WorldBuffers,
    ) -> Result<(), GraphicsError> {
        let Some(material) = self.packs.get(material_ref) else {
            return Err(GraphicsError::InvalidHandle(format!("{material_ref:?}")));
        };
        let family = material.key.family;
        if family == ShadingFamily::Fog && !self.config.fog_enabled {
            return Ok(());
        }
        if family == ShadingFamily::HeatHaze && !self.config.heat_haze_enabled {
            return Ok(());
        }

        let key = material.key;
        let mut state = PipelineState {
            state_bits: key.state_bits,
            cull_type: key.cull_type,
            polygon_offset: key.polygon_offset,
            topology: Topology::Triangles,
        };
        let mut context = BindContext {
            view_id,
            debug_color: self.config.debug_mode.material_color(material, &self.packs),
            wireframe: false,
        };
        let draw = self.indirect_draw(material_ref, view_id, buffers)?;

        backend.set_pipeline_state(&state);
        family.bind_shader(shading, material, &context);
        backend.bind_geometry(key.vertex_buffer, key.index_buffer);

        if !self
            .residency
            .ensure_resident(&mut self.packs, material_ref, backend)
        {
            log::warn!(
                "Not enough texture space for {:?}; some textures may be missing",
                material_ref
            );
        }

        backend.draw_indexed_indirect_count(&draw)?;
        if family == ShadingFamily::HeatHaze {
            backend.draw_indexed_indirect_count(&draw)?;
        }

        if self.config.show_tris && family.supports_wireframe() && !key.state_bits.writes_depth()
        {
            state.state_bits = StateBits::DEPTHTEST_DISABLE;
            state.topology = Topology::Lines;
            context.wireframe = true;
            backend.set_pipeline_state(&state);
            if let Some(material) = self.packs.get(material_ref) {
                family.bind_shader(shading, material, &context);
            }
            backend.draw_indexed_indirect_count(&draw)?;
        }
        Ok(())
    }

    /// The count-indirect draw of `material` in `view_id` of the current frame.
    fn indirect_draw(
        &self,
        material_ref: MaterialRef,
        view_id: u32,
        buffers: &WorldBuffers,
    ) -> Result<IndirectCountDraw, GraphicsError> {
        let material = self
            .packs
            .get(material_ref)
            .ok_or_else(|| GraphicsError::InvalidHandle(format!("{material_ref:?}")))?;
        if view_id as usize >= crate::MAX_VIEWS {
            return Err(GraphicsError::InvalidParameter(format!(
                "view id {view_id} exceeds {}",
                crate::MAX_VIEWS
            )));
        }

        let partition = partition(self.frames.current_frame(), view_id) as u64;
        let command_index = material.batch_offset as u64 * SURFACE_COMMANDS_PER_BATCH as u64
            + self.pipeline.surface_commands_count as u64 * partition;
        let counter_index = material.global_id as u64 + MAX_COMMAND_COUNTERS as u64 * partition;

        Ok(IndirectCountDraw {
            command_buffer: buffers.cull.culled_commands,
            command_offset: command_index * DrawIndexedIndirectArgs::SIZE,
            count_buffer: buffers.cull.counters,
            count_offset: counter_index * 4,
            max_draw_count: material.draw_commands.len() as u32,
            stride: DrawIndexedIndirectArgs::SIZE as u32,
        })
    }

    /// Record and execute culling of the views queued for the next frame.
    pub fn cull_surfaces(&mut self, backend: &mut dyn GpuBackend) -> Result<(), GraphicsError> {
        umbra_core::profile_function!();

        let Some(buffers) = self.buffers else {
            return Ok(());
        };
        if self.config.skip_material_system {
            return Ok(());
        }

        let locked = self.config.lock_pvs;
        let views = self.frames.cull_views(locked);
        if views.is_empty() {
            return Ok(());
        }

        if !self.counters_cleared {
            self.clear_next_counters(backend, &buffers)?;
            backend.memory_barrier(BarrierScope::ATOMIC_COUNTER);
        }

        let settings = CullSettings {
            frustum: self.config.gpu_frustum_culling,
            occlusion: self.config.gpu_occlusion_culling,
            debug: self.config.material_debug,
            near_plane: self.config.near_plane,
        };
        let mut graph = RenderGraph::new();
        self.pipeline.record(
            &mut graph,
            self.frames.next_frame(),
            &views,
            &buffers.cull,
            &settings,
            self.pyramid.as_ref(),
            !locked,
        );
        let compiled = graph.compile()?;
        backend.execute_graph(&graph, &compiled)?;

        log::trace!(
            "Culled {} views into frame {}",
            views.len(),
            self.frames.next_frame()
        );
        Ok(())
    }

    /// Assign views of the next frame to the portals visible in the current one.
    ///
    /// Returns `None` when the world has no portals or the PVS is locked.
    pub fn add_portal_surfaces(
        &mut self,
        backend: &mut dyn GpuBackend,
        visibility: &mut dyn PortalVisibility,
    ) -> Result<Option<PortalResolution>, GraphicsError> {
        umbra_core::profile_function!();

        let Some(buffers) = self.buffers else {
            return Ok(None);
        };
        if self.portals.is_empty() || self.config.lock_pvs {
            return Ok(None);
        }

        let size = (self.portals.len() * MAX_VIEWFRAMES * std::mem::size_of::<GpuPortalSurface>())
            as u64;
        let bytes = backend.read_buffer(buffers.cull.portals, 0, size)?;
        let readback: Vec<GpuPortalSurface> = bytemuck::pod_collect_to_vec(&bytes);

        let resolution = crate::portal::resolve_portal_views(
            &mut self.frames,
            &self.portals,
            &readback,
            visibility,
        );
        Ok(Some(resolution))
    }

    /// Submit the frame and advance the frame ring.
    pub fn end_frame(&mut self, backend: &mut dyn GpuBackend) {
        let fence = backend.submit();
        self.frames.end_frame(fence);
        self.frame_start = true;
        self.counters_cleared = false;
        umbra_core::frame_mark!();
    }

    /// Culled draws of every material for `view_id` of the current frame.
    pub fn read_culled_commands(
        &self,
        backend: &dyn GpuBackend,
        view_id: u32,
    ) -> Result<Vec<CulledMaterial>, GraphicsError> {
        let Some(buffers) = self.buffers else {
            return Ok(Vec::new());
        };

        let mut culled = Vec::new();
        for material in self.packs.materials() {
            let draw = self.indirect_draw(material.material_ref(), view_id, &buffers)?;
            let count_bytes = backend.read_buffer(draw.count_buffer, draw.count_offset, 4)?;
            let count = bytemuck::pod_read_unaligned::<u32>(&count_bytes).min(draw.max_draw_count);

            let mut commands = Vec::with_capacity(count as usize);
            if count > 0 {
                let bytes = backend.read_buffer(
                    draw.command_buffer,
                    draw.command_offset,
                    count as u64 * DrawIndexedIndirectArgs::SIZE,
                )?;
                commands = bytemuck::pod_collect_to_vec(&bytes);
            }
            culled.push(CulledMaterial {
                material: material.material_ref(),
                commands,
            });
        }
        Ok(culled)
    }

    /// Per-surface results of the last debug cull, in descriptor order.
    pub fn read_debug_output(
        &self,
        backend: &dyn GpuBackend,
    ) -> Result<Option<Vec<SurfaceCullResult>>, GraphicsError> {
        let Some(debug) = self.buffers.and_then(|buffers| buffers.cull.debug) else {
            return Ok(None);
        };
        let size = self.pipeline.descriptor_count as u64 * 16;
        if size == 0 {
            return Ok(Some(Vec::new()));
        }
        let words: Vec<u32> = bytemuck::pod_collect_to_vec(&backend.read_buffer(debug, 0, size)?);
        Ok(Some(
            words
                .chunks_exact(4)
                .map(|entry| SurfaceCullResult {
                    processed: entry[0] != 0,
                    in_view: entry[1] != 0,
                    unoccluded: entry[2] != 0,
                    visible: entry[3] != 0,
                })
                .collect(),
        ))
    }

    /// Release every GPU resource and forget the world.
    pub fn free(&mut self, backend: &mut dyn GpuBackend) {
        self.frames.wait_idle();
        self.release_world(backend);
        if let Some(pyramid) = self.pyramid.take() {
            pyramid.destroy(backend);
        }
        self.frames.reset();
        self.residency.start_frame();
        self.frame_start = true;
        self.counters_cleared = false;
        log::debug!("Material system freed");
    }

    fn release_world(&mut self, backend: &mut dyn GpuBackend) {
        if let Some(buffers) = self.buffers.take() {
            for buffer in buffers.handles() {
                backend.destroy_buffer(buffer);
            }
        }
        for material in self.packs.materials() {
            for &texture in &material.textures {
                backend.make_texture_non_resident(texture);
            }
        }
        self.packs.clear();
        self.surfaces.clear();
        self.dynamic_surfaces.clear();
        self.autosprite_surfaces.clear();
        self.portals.clear();
        self.arena = UniformArena::default();
        self.pipeline = CullingPipeline::default();
    }
}

impl std::fmt::Debug for MaterialSystem {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MaterialSystem")
            .field("materials", &self.packs.material_count())
            .field("surfaces", &self.surfaces.len())
            .field("portals", &self.portals.len())
            .field("generated", &self.buffers.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use rstest::rstest;
    use umbra_core::math::{Mat4, Vec3, look_at_rh, perspective_rh};

    use super::*;
    use crate::backend::dummy::DummyBackend;
    use crate::config::DebugMode;
    use crate::graph::ComputeKernel;
    use crate::material::testing::{FakeShading, opaque_shader, scene_surface};
    use crate::material::{Shader, ShadingStage, TextureBundle};
    use crate::types::TextureHandle;

    fn camera() -> ViewParams {
        let eye = Vec3::new(10.0, 0.0, 50.0);
        let projection: Mat4 = perspective_rh(std::f32::consts::FRAC_PI_2, 1.0, 1.0, 1000.0);
        let view = look_at_rh(&eye, &Vec3::new(10.0, 0.0, 0.0), &Vec3::y());
        ViewParams::from_camera(eye, view, projection)
    }

    fn world(
        config: MaterialSystemConfig,
        scene: &[SceneSurface],
    ) -> (MaterialSystem, DummyBackend, FakeShading) {
        let mut system = MaterialSystem::new(config);
        let mut backend = DummyBackend::new();
        let mut shading = FakeShading::default();
        system
            .generate_world(&mut backend, scene, &mut shading)
            .unwrap();
        (system, backend, shading)
    }

    /// One frame that culls view 0 and then draws what it culled.
    fn cull_then_draw(
        system: &mut MaterialSystem,
        backend: &mut DummyBackend,
        shading: &mut FakeShading,
    ) {
        system.start_frame();
        system.queue_surface_cull(0, camera()).unwrap();
        system
            .render_materials(backend, shading, ShaderSort::Depth, ShaderSort::PostProcess, 0)
            .unwrap();
        system.cull_surfaces(backend).unwrap();
        system.end_frame(backend);
        backend.clear_recording();

        system.start_frame();
        system
            .render_materials(backend, shading, ShaderSort::Depth, ShaderSort::PostProcess, 0)
            .unwrap();
    }

    fn walls(count: u32) -> Vec<SceneSurface> {
        let shader = opaque_shader("wall", 1);
        (0..count).map(|i| scene_surface(&shader, i)).collect()
    }

    #[test]
    fn test_generate_world_allocates_partitions() {
        let (system, backend, _) = world(MaterialSystemConfig::default(), &walls(3));

        let buffers = system.buffers().unwrap();
        let commands = system.pipeline().surface_commands_count as u64;
        assert_eq!(commands, SURFACE_COMMANDS_PER_BATCH as u64);
        assert_eq!(
            backend.buffer_descriptor(buffers.cull.surface_commands).unwrap().size,
            commands * MAX_VIEWFRAMES as u64 * 24
        );
        assert_eq!(
            backend.buffer_descriptor(buffers.cull.counters).unwrap().size,
            (MAX_COMMAND_COUNTERS * MAX_VIEWFRAMES * 4) as u64
        );
        assert!(buffers.cull.debug.is_none());
        assert!(system.is_world_generated());
    }

    #[test]
    fn test_regenerate_releases_previous_buffers() {
        let (mut system, mut backend, mut shading) =
            world(MaterialSystemConfig::default(), &walls(2));
        let before = backend.buffer_count();

        system
            .generate_world(&mut backend, &walls(4), &mut shading)
            .unwrap();
        assert_eq!(backend.buffer_count(), before);
        assert_eq!(system.surfaces().len(), 4);
    }

    #[test]
    fn test_frame_draws_culled_commands() {
        let (mut system, mut backend, mut shading) =
            world(MaterialSystemConfig::default(), &walls(3));
        cull_then_draw(&mut system, &mut backend, &mut shading);

        let draws = backend.draws();
        assert_eq!(draws.len(), 1);
        assert_eq!(draws[0].commands.len(), 3);
        assert_eq!(draws[0].draw.stride, 20);
        assert_eq!(draws[0].draw.max_draw_count, 3);
        assert_eq!(
            backend.bound_buffer(bindings::MATERIAL_UNIFORMS),
            Some(system.buffers().unwrap().uniforms)
        );

        let culled = system.read_culled_commands(&backend, 0).unwrap();
        assert_eq!(culled.len(), 1);
        assert_eq!(culled[0].commands, draws[0].commands);
    }

    #[test]
    fn test_first_draw_of_frame_clears_counters() {
        let (mut system, mut backend, mut shading) =
            world(MaterialSystemConfig::default(), &walls(1));
        system.start_frame();
        for _ in 0..2 {
            system
                .render_materials(
                    &mut backend,
                    &mut shading,
                    ShaderSort::Depth,
                    ShaderSort::PostProcess,
                    0,
                )
                .unwrap();
        }

        let clears = backend
            .executed_passes()
            .iter()
            .filter(|(_, kernel)| *kernel == ComputeKernel::ClearCounters)
            .count();
        assert_eq!(clears, 1);
        assert_eq!(backend.barriers().last(), Some(&BarrierScope::COMMAND));
    }

    #[rstest]
    #[case::render_then_cull(true)]
    #[case::cull_only(false)]
    fn test_counters_cleared_once_per_frame(#[case] render: bool) {
        let (mut system, mut backend, mut shading) =
            world(MaterialSystemConfig::default(), &walls(2));
        system.start_frame();
        system.queue_surface_cull(0, camera()).unwrap();
        if render {
            system
                .render_materials(
                    &mut backend,
                    &mut shading,
                    ShaderSort::Depth,
                    ShaderSort::PostProcess,
                    0,
                )
                .unwrap();
        }
        system.cull_surfaces(&mut backend).unwrap();

        let kernels: Vec<_> = backend.executed_passes().iter().map(|(_, k)| *k).collect();
        let clears = kernels
            .iter()
            .filter(|kernel| **kernel == ComputeKernel::ClearCounters)
            .count();
        assert_eq!(clears, 1);
        assert_eq!(kernels.first(), Some(&ComputeKernel::ClearCounters));
    }

    #[test]
    fn test_skip_material_system_draws_nothing() {
        let config = MaterialSystemConfig::default().with_skip_material_system(true);
        let (mut system, mut backend, mut shading) = world(config, &walls(2));
        cull_then_draw(&mut system, &mut backend, &mut shading);

        assert!(backend.draws().is_empty());
        assert!(backend.executed_passes().is_empty());
    }

    #[test]
    fn test_sort_range_filters_packs() {
        let (mut system, mut backend, mut shading) =
            world(MaterialSystemConfig::default(), &walls(2));
        system.start_frame();
        system
            .render_materials(
                &mut backend,
                &mut shading,
                ShaderSort::Blend0,
                ShaderSort::Nearest,
                0,
            )
            .unwrap();
        assert!(backend.draws().is_empty());
    }

    #[test]
    fn test_show_tris_draws_wireframe_for_translucent() {
        let glass = Arc::new(Shader::new("glass", ShaderSort::Blend0).with_stage(
            ShadingStage::new(
                ShadingFamily::Generic3D,
                StateBits::SRCBLEND_SRC_ALPHA | StateBits::DSTBLEND_ONE_MINUS_SRC_ALPHA,
            ),
        ));
        let scene = vec![scene_surface(&glass, 0)];
        let config = MaterialSystemConfig::default().with_show_tris(true);
        let (mut system, mut backend, mut shading) = world(config, &scene);
        cull_then_draw(&mut system, &mut backend, &mut shading);

        let draws = backend.draws();
        assert_eq!(draws.len(), 2);
        assert_eq!(draws[1].pipeline.topology, Topology::Lines);
        assert_eq!(draws[1].pipeline.state_bits, StateBits::DEPTHTEST_DISABLE);
        assert!(shading.binds.last().unwrap().2.wireframe);
    }

    #[test]
    fn test_debug_mode_colors_bindings() {
        let config = MaterialSystemConfig::default().with_debug_mode(DebugMode::Opaque);
        let (mut system, mut backend, mut shading) = world(config, &walls(1));
        cull_then_draw(&mut system, &mut backend, &mut shading);

        let (_, _, context) = shading.binds.last().unwrap();
        assert!(context.debug_color.is_some());
    }

    #[test]
    fn test_draws_continue_when_textures_do_not_fit() {
        let textured = Arc::new(Shader::new("textured", ShaderSort::Opaque).with_stage(
            ShadingStage::new(ShadingFamily::Generic3D, StateBits::DEPTHMASK_TRUE)
                .with_bundle(TextureBundle::new(TextureHandle::new(40))),
        ));
        let mut system = MaterialSystem::new(MaterialSystemConfig::default());
        let mut backend = DummyBackend::new().with_residency_budget(0);
        let mut shading = FakeShading::default();
        system
            .generate_world(&mut backend, &[scene_surface(&textured, 0)], &mut shading)
            .unwrap();
        cull_then_draw(&mut system, &mut backend, &mut shading);

        assert_eq!(backend.draws().len(), 1);
        assert!(backend.resident_textures().is_empty());
        let material = system.packs().materials().next().unwrap();
        assert!(!material.textures_resident);
    }

    #[test]
    fn test_portals_skipped_without_portal_surfaces() {
        let (mut system, mut backend, mut shading) =
            world(MaterialSystemConfig::default(), &walls(2));
        cull_then_draw(&mut system, &mut backend, &mut shading);

        let mut range = crate::portal::PortalRange {
            max_distance: 100.0,
        };
        assert_eq!(
            system.add_portal_surfaces(&mut backend, &mut range).unwrap(),
            None
        );
    }

    #[test]
    fn test_debug_output_marks_processed_surfaces() {
        let config = MaterialSystemConfig::default().with_material_debug(true);
        let (mut system, mut backend, mut shading) = world(config, &walls(2));
        cull_then_draw(&mut system, &mut backend, &mut shading);

        let results = system.read_debug_output(&backend).unwrap().unwrap();
        assert_eq!(results.len(), 2);
        assert!(results.iter().all(|r| r.processed && r.in_view && r.visible));
    }

    #[test]
    fn test_free_releases_everything() {
        let (mut system, mut backend, _) = world(MaterialSystemConfig::default(), &walls(2));
        system.generate_depth_images(&mut backend, 64, 32).unwrap();
        system.free(&mut backend);

        assert_eq!(backend.buffer_count(), 0);
        assert!(!system.is_world_generated());
        assert!(system.depth_pyramid().is_none());
        assert_eq!(system.frames().current_frame(), 0);
    }
}
