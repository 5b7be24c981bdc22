//! Host-memory backend for tests and headless tools.
//!
//! Buffers and textures live in system memory, compute passes run the CPU
//! kernels from [`super::kernels`], and indirect draws are resolved against
//! the count and command buffers and recorded instead of rasterized. Work
//! completes synchronously, so every fence is signaled on submit.

use std::collections::{HashMap, HashSet};

use super::kernels::{self, CullOutputs, PyramidView};
use super::{BarrierScope, GpuBackend, IndirectCountDraw, PipelineState};
use crate::error::GraphicsError;
use crate::graph::{Binding, CompiledGraph, ComputeKernel, ComputePass, RenderGraph};
use crate::shader::bindings;
use crate::sync::Fence;
use crate::types::{
    BufferDescriptor, BufferHandle, CullPushConstants, DepthReducePushConstants,
    DrawIndexedIndirectArgs, FramePushConstants, GpuPortalSurface, GpuSurfaceBatch,
    GpuSurfaceCommand, TextureDescriptor, TextureHandle,
};

#[derive(Debug)]
struct HostBuffer {
    descriptor: BufferDescriptor,
    /// Stored as words so the kernels can view it as any 4-byte aligned type.
    words: Vec<u32>,
}

#[derive(Debug)]
struct HostTexture {
    descriptor: TextureDescriptor,
    levels: Vec<Vec<f32>>,
}

/// An indirect draw after resolving its count and command buffers.
#[derive(Debug, Clone, PartialEq)]
pub struct RecordedDraw {
    pub pipeline: PipelineState,
    pub vertex_buffer: Option<BufferHandle>,
    pub index_buffer: Option<BufferHandle>,
    pub draw: IndirectCountDraw,
    /// Commands the GPU would have executed.
    pub commands: Vec<DrawIndexedIndirectArgs>,
}

/// Backend that keeps every resource in host memory.
#[derive(Debug, Default)]
pub struct DummyBackend {
    next_id: u32,
    buffers: HashMap<BufferHandle, HostBuffer>,
    textures: HashMap<TextureHandle, HostTexture>,
    mapped: HashSet<BufferHandle>,
    bound: HashMap<u32, BufferHandle>,

    residency_budget: Option<usize>,
    resident: HashSet<TextureHandle>,

    pipeline: PipelineState,
    geometry: Option<(BufferHandle, BufferHandle)>,

    executed_passes: Vec<(String, ComputeKernel)>,
    barriers: Vec<BarrierScope>,
    draws: Vec<RecordedDraw>,
    submissions: usize,
}

impl DummyBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Limit the number of simultaneously resident textures.
    pub fn with_residency_budget(mut self, budget: usize) -> Self {
        self.residency_budget = Some(budget);
        self
    }

    /// Fill a texture level, e.g. to provide the depth buffer read by the
    /// depth pyramid.
    pub fn set_texture_level(
        &mut self,
        texture: TextureHandle,
        level: u32,
        texels: &[f32],
    ) -> Result<(), GraphicsError> {
        let data = self
            .textures
            .get_mut(&texture)
            .and_then(|t| t.levels.get_mut(level as usize))
            .ok_or_else(|| GraphicsError::InvalidHandle(format!("{texture:?} level {level}")))?;
        if data.len() != texels.len() {
            return Err(GraphicsError::InvalidParameter(format!(
                "expected {} texels, got {}",
                data.len(),
                texels.len()
            )));
        }
        data.copy_from_slice(texels);
        Ok(())
    }

    pub fn texture_level(&self, texture: TextureHandle, level: u32) -> Option<&[f32]> {
        self.textures
            .get(&texture)
            .and_then(|t| t.levels.get(level as usize))
            .map(Vec::as_slice)
    }

    pub fn texture_descriptor(&self, texture: TextureHandle) -> Option<&TextureDescriptor> {
        self.textures.get(&texture).map(|t| &t.descriptor)
    }

    pub fn buffer_descriptor(&self, buffer: BufferHandle) -> Option<&BufferDescriptor> {
        self.buffers.get(&buffer).map(|b| &b.descriptor)
    }

    pub fn buffer_count(&self) -> usize {
        self.buffers.len()
    }

    pub fn bound_buffer(&self, slot: u32) -> Option<BufferHandle> {
        self.bound.get(&slot).copied()
    }

    pub fn resident_textures(&self) -> &HashSet<TextureHandle> {
        &self.resident
    }

    /// Passes executed since the last [`clear_recording`](Self::clear_recording).
    pub fn executed_passes(&self) -> &[(String, ComputeKernel)] {
        &self.executed_passes
    }

    pub fn barriers(&self) -> &[BarrierScope] {
        &self.barriers
    }

    pub fn draws(&self) -> &[RecordedDraw] {
        &self.draws
    }

    pub fn submissions(&self) -> usize {
        self.submissions
    }

    pub fn clear_recording(&mut self) {
        self.executed_passes.clear();
        self.barriers.clear();
        self.draws.clear();
    }

    fn allocate_id(&mut self) -> u32 {
        self.next_id += 1;
        self.next_id
    }

    fn buffer(&self, buffer: BufferHandle) -> Result<&HostBuffer, GraphicsError> {
        self.buffers
            .get(&buffer)
            .ok_or_else(|| GraphicsError::InvalidHandle(format!("{buffer:?}")))
    }

    fn byte_range(
        buffer: &HostBuffer,
        offset: u64,
        size: u64,
    ) -> Result<std::ops::Range<usize>, GraphicsError> {
        let end = offset + size;
        if end > buffer.words.len() as u64 * 4 {
            return Err(GraphicsError::InvalidParameter(format!(
                "range {offset}..{end} outside buffer {:?} of {} bytes",
                buffer.descriptor.label, buffer.descriptor.size
            )));
        }
        Ok(offset as usize..end as usize)
    }

    fn pass_buffer(pass: &ComputePass, slot: u32) -> Result<BufferHandle, GraphicsError> {
        match pass.binding(slot) {
            Some(Binding::Buffer(buffer)) => Ok(buffer),
            _ => Err(GraphicsError::InvalidParameter(format!(
                "pass {} has no buffer at slot {slot}",
                pass.name()
            ))),
        }
    }

    fn pass_texture(pass: &ComputePass, slot: u32) -> Result<(TextureHandle, u32), GraphicsError> {
        match pass.binding(slot) {
            Some(Binding::TextureLevel { texture, level }) => Ok((texture, level)),
            _ => Err(GraphicsError::InvalidParameter(format!(
                "pass {} has no texture at slot {slot}",
                pass.name()
            ))),
        }
    }

    fn params<T: bytemuck::Pod>(pass: &ComputePass) -> Result<T, GraphicsError> {
        pass.read_push_constants().ok_or_else(|| {
            GraphicsError::InvalidParameter(format!("pass {} has malformed parameters", pass.name()))
        })
    }

    /// Move a buffer's storage out so several buffers can be borrowed mutably.
    fn take_words(&mut self, buffer: BufferHandle) -> Result<Vec<u32>, GraphicsError> {
        self.buffers
            .get_mut(&buffer)
            .map(|b| std::mem::take(&mut b.words))
            .ok_or_else(|| GraphicsError::InvalidHandle(format!("{buffer:?}")))
    }

    fn restore_words(&mut self, buffer: BufferHandle, words: Vec<u32>) {
        if let Some(b) = self.buffers.get_mut(&buffer) {
            b.words = words;
        }
    }

    fn cast_mut<T: bytemuck::Pod>(words: &mut [u32]) -> Result<&mut [T], GraphicsError> {
        let bytes: &mut [u8] = bytemuck::cast_slice_mut(words);
        let whole = bytes.len() - bytes.len() % std::mem::size_of::<T>();
        bytemuck::try_cast_slice_mut(&mut bytes[..whole])
            .map_err(|err| GraphicsError::Internal(format!("buffer cast failed: {err}")))
    }

    fn cast<T: bytemuck::Pod>(words: &[u32]) -> Result<&[T], GraphicsError> {
        let bytes: &[u8] = bytemuck::cast_slice(words);
        let whole = bytes.len() - bytes.len() % std::mem::size_of::<T>();
        bytemuck::try_cast_slice(&bytes[..whole])
            .map_err(|err| GraphicsError::Internal(format!("buffer cast failed: {err}")))
    }

    fn run_pass(&mut self, pass: &ComputePass) -> Result<(), GraphicsError> {
        log::trace!(
            "DummyBackend: dispatch {} ({:?}) {:?}",
            pass.name(),
            pass.kernel(),
            pass.workgroups()
        );

        match pass.kernel() {
            ComputeKernel::ClearCounters => {
                let params: FramePushConstants = Self::params(pass)?;
                let handle = Self::pass_buffer(pass, bindings::COUNTERS)?;
                let mut counters = self.take_words(handle)?;
                kernels::clear_counters(&params, &mut counters);
                self.restore_words(handle, counters);
            }
            ComputeKernel::DepthCopy | ComputeKernel::DepthReduce => {
                let params: DepthReducePushConstants = Self::params(pass)?;
                let (src, src_level) = Self::pass_texture(pass, bindings::DEPTH_INPUT)?;
                let (dst, dst_level) = Self::pass_texture(pass, bindings::DEPTH_OUTPUT)?;

                let input = self
                    .texture_level(src, src_level)
                    .map(<[f32]>::to_vec)
                    .ok_or_else(|| GraphicsError::InvalidHandle(format!("{src:?}")))?;
                let output = self
                    .textures
                    .get_mut(&dst)
                    .and_then(|t| t.levels.get_mut(dst_level as usize))
                    .ok_or_else(|| GraphicsError::InvalidHandle(format!("{dst:?}")))?;

                if pass.kernel() == ComputeKernel::DepthCopy {
                    kernels::depth_copy(&params, &input, output);
                } else {
                    kernels::depth_reduce(&params, &input, output);
                }
            }
            ComputeKernel::CullSurfaces => self.run_cull(pass)?,
            ComputeKernel::ProcessSurfaces => {
                let params: FramePushConstants = Self::params(pass)?;
                let commands_handle = Self::pass_buffer(pass, bindings::SURFACE_COMMANDS)?;
                let batches_handle = Self::pass_buffer(pass, bindings::BATCHES)?;
                let counters_handle = Self::pass_buffer(pass, bindings::COUNTERS)?;
                let culled_handle = Self::pass_buffer(pass, bindings::CULLED_COMMANDS)?;

                let mut counters = self.take_words(counters_handle)?;
                let mut culled = self.take_words(culled_handle)?;
                let result = (|| -> Result<(), GraphicsError> {
                    let commands =
                        Self::cast::<GpuSurfaceCommand>(&self.buffer(commands_handle)?.words)?;
                    let batches =
                        Self::cast::<GpuSurfaceBatch>(&self.buffer(batches_handle)?.words)?;
                    kernels::process_surfaces(
                        &params,
                        pass.workgroups()[0],
                        commands,
                        batches,
                        &mut counters,
                        Self::cast_mut::<DrawIndexedIndirectArgs>(&mut culled)?,
                    );
                    Ok(())
                })();
                self.restore_words(counters_handle, counters);
                self.restore_words(culled_handle, culled);
                result?;
            }
        }

        self.executed_passes
            .push((pass.name().to_string(), pass.kernel()));
        Ok(())
    }

    fn run_cull(&mut self, pass: &ComputePass) -> Result<(), GraphicsError> {
        let params: CullPushConstants = Self::params(pass)?;
        let descriptors_handle = Self::pass_buffer(pass, bindings::DESCRIPTORS)?;
        let commands_handle = Self::pass_buffer(pass, bindings::SURFACE_COMMANDS)?;
        let portals_handle = Self::pass_buffer(pass, bindings::PORTALS).ok();
        let debug_handle = Self::pass_buffer(pass, bindings::DEBUG).ok();
        let pyramid = Self::pass_texture(pass, bindings::DEPTH_PYRAMID).ok();

        let mut commands = self.take_words(commands_handle)?;
        let mut portals = match portals_handle {
            Some(handle) => self.take_words(handle)?,
            None => Vec::new(),
        };
        let mut debug = match debug_handle {
            Some(handle) => Some(self.take_words(handle)?),
            None => None,
        };

        let result = (|| -> Result<(), GraphicsError> {
            let descriptors = &self.buffer(descriptors_handle)?.words;
            let pyramid = pyramid.and_then(|(texture, _)| self.textures.get(&texture));
            let view = pyramid.map(|t| PyramidView {
                levels: &t.levels,
                width: t.descriptor.width,
                height: t.descriptor.height,
            });
            kernels::cull_surfaces(
                &params,
                pass.workgroups()[0],
                descriptors,
                view.as_ref(),
                CullOutputs {
                    surface_commands: Self::cast_mut::<GpuSurfaceCommand>(&mut commands)?,
                    portals: Self::cast_mut::<GpuPortalSurface>(&mut portals)?,
                    debug: debug.as_deref_mut(),
                },
            );
            Ok(())
        })();

        self.restore_words(commands_handle, commands);
        if let Some(handle) = portals_handle {
            self.restore_words(handle, portals);
        }
        if let (Some(handle), Some(words)) = (debug_handle, debug) {
            self.restore_words(handle, words);
        }
        result
    }
}

impl GpuBackend for DummyBackend {
    fn name(&self) -> &'static str {
        "Dummy"
    }

    fn create_buffer(
        &mut self,
        descriptor: &BufferDescriptor,
    ) -> Result<BufferHandle, GraphicsError> {
        log::trace!(
            "DummyBackend: creating buffer {:?} (size: {})",
            descriptor.label,
            descriptor.size
        );
        let handle = BufferHandle::new(self.allocate_id());
        self.buffers.insert(
            handle,
            HostBuffer {
                descriptor: descriptor.clone(),
                words: vec![0; descriptor.size.div_ceil(4) as usize],
            },
        );
        Ok(handle)
    }

    fn destroy_buffer(&mut self, buffer: BufferHandle) {
        self.buffers.remove(&buffer);
        self.mapped.remove(&buffer);
        self.bound.retain(|_, bound| *bound != buffer);
    }

    fn create_texture(
        &mut self,
        descriptor: &TextureDescriptor,
    ) -> Result<TextureHandle, GraphicsError> {
        log::trace!(
            "DummyBackend: creating texture {:?} ({}x{}, {} levels)",
            descriptor.label,
            descriptor.width,
            descriptor.height,
            descriptor.mip_level_count
        );
        if descriptor.width == 0 || descriptor.height == 0 || descriptor.mip_level_count == 0 {
            return Err(GraphicsError::ResourceCreationFailed(format!(
                "empty texture {:?}",
                descriptor.label
            )));
        }
        let levels = (0..descriptor.mip_level_count)
            .map(|level| {
                let (w, h) = descriptor.level_size(level);
                vec![0.0; (w * h) as usize]
            })
            .collect();

        let handle = TextureHandle::new(self.allocate_id());
        self.textures.insert(
            handle,
            HostTexture {
                descriptor: descriptor.clone(),
                levels,
            },
        );
        Ok(handle)
    }

    fn destroy_texture(&mut self, texture: TextureHandle) {
        self.textures.remove(&texture);
        self.resident.remove(&texture);
    }

    fn write_buffer(
        &mut self,
        buffer: BufferHandle,
        offset: u64,
        data: &[u8],
    ) -> Result<(), GraphicsError> {
        log::trace!(
            "DummyBackend: write_buffer offset={} len={}",
            offset,
            data.len()
        );
        let host = self
            .buffers
            .get_mut(&buffer)
            .ok_or_else(|| GraphicsError::InvalidHandle(format!("{buffer:?}")))?;
        let range = Self::byte_range(host, offset, data.len() as u64)?;
        let bytes: &mut [u8] = bytemuck::cast_slice_mut(&mut host.words);
        bytes[range].copy_from_slice(data);
        Ok(())
    }

    fn map_buffer(
        &mut self,
        buffer: BufferHandle,
        offset: u64,
        size: u64,
    ) -> Result<&mut [u8], GraphicsError> {
        if !self.mapped.insert(buffer) {
            return Err(GraphicsError::InvalidParameter(format!(
                "{buffer:?} is already mapped"
            )));
        }
        let host = self
            .buffers
            .get_mut(&buffer)
            .ok_or_else(|| GraphicsError::InvalidHandle(format!("{buffer:?}")))?;
        let range = Self::byte_range(host, offset, size)?;
        let bytes: &mut [u8] = bytemuck::cast_slice_mut(&mut host.words);
        Ok(&mut bytes[range])
    }

    fn unmap_buffer(&mut self, buffer: BufferHandle) {
        self.mapped.remove(&buffer);
    }

    fn read_buffer(
        &self,
        buffer: BufferHandle,
        offset: u64,
        size: u64,
    ) -> Result<Vec<u8>, GraphicsError> {
        let host = self.buffer(buffer)?;
        let range = Self::byte_range(host, offset, size)?;
        let bytes: &[u8] = bytemuck::cast_slice(&host.words);
        Ok(bytes[range].to_vec())
    }

    fn bind_buffer(&mut self, slot: u32, buffer: BufferHandle) {
        self.bound.insert(slot, buffer);
    }

    fn execute_graph(
        &mut self,
        graph: &RenderGraph,
        compiled: &CompiledGraph,
    ) -> Result<(), GraphicsError> {
        log::trace!(
            "DummyBackend: executing graph with {} passes",
            compiled.pass_order().len()
        );
        for &handle in compiled.pass_order() {
            if graph.dependency_count(handle) > 0 {
                self.memory_barrier(BarrierScope::STORAGE | BarrierScope::ATOMIC_COUNTER);
            }
            self.run_pass(graph.pass(handle))?;
        }
        Ok(())
    }

    fn memory_barrier(&mut self, scope: BarrierScope) {
        self.barriers.push(scope);
    }

    fn submit(&mut self) -> Fence {
        self.submissions += 1;
        Fence::new_signaled()
    }

    fn set_pipeline_state(&mut self, state: &PipelineState) {
        self.pipeline = *state;
    }

    fn bind_geometry(&mut self, vertex_buffer: BufferHandle, index_buffer: BufferHandle) {
        self.geometry = Some((vertex_buffer, index_buffer));
    }

    fn draw_indexed_indirect_count(
        &mut self,
        draw: &IndirectCountDraw,
    ) -> Result<(), GraphicsError> {
        let count_bytes = self.read_buffer(draw.count_buffer, draw.count_offset, 4)?;
        let count = bytemuck::pod_read_unaligned::<u32>(&count_bytes).min(draw.max_draw_count);

        let size = DrawIndexedIndirectArgs::SIZE;
        let mut commands = Vec::with_capacity(count as usize);
        for i in 0..count as u64 {
            let bytes = self.read_buffer(
                draw.command_buffer,
                draw.command_offset + i * draw.stride as u64,
                size,
            )?;
            commands.push(bytemuck::pod_read_unaligned::<DrawIndexedIndirectArgs>(&bytes));
        }

        log::trace!("DummyBackend: indirect draw of {count} commands");
        self.draws.push(RecordedDraw {
            pipeline: self.pipeline,
            vertex_buffer: self.geometry.map(|(vertex, _)| vertex),
            index_buffer: self.geometry.map(|(_, index)| index),
            draw: *draw,
            commands,
        });
        Ok(())
    }

    fn make_texture_resident(&mut self, texture: TextureHandle) -> bool {
        if self.resident.contains(&texture) {
            return true;
        }
        if self
            .residency_budget
            .is_some_and(|budget| self.resident.len() >= budget)
        {
            return false;
        }
        self.resident.insert(texture);
        true
    }

    fn make_texture_non_resident(&mut self, texture: TextureHandle) {
        self.resident.remove(&texture);
    }

    fn is_texture_resident(&self, texture: TextureHandle) -> bool {
        self.resident.contains(&texture)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{BufferUsage, TextureFormat, TextureUsage};

    #[test]
    fn test_dummy_backend_name() {
        assert_eq!(DummyBackend::new().name(), "Dummy");
    }

    #[test]
    fn test_write_map_and_read() {
        let mut backend = DummyBackend::new();
        let buffer = backend
            .create_buffer(&BufferDescriptor::new(16, BufferUsage::STORAGE))
            .unwrap();

        backend.write_buffer(buffer, 4, &[1, 2, 3, 4]).unwrap();
        {
            let mapped = backend.map_buffer(buffer, 8, 4).unwrap();
            mapped.copy_from_slice(&[9, 9, 9, 9]);
        }
        assert!(backend.map_buffer(buffer, 0, 4).is_err());
        backend.unmap_buffer(buffer);

        let bytes = backend.read_buffer(buffer, 0, 16).unwrap();
        assert_eq!(&bytes[4..12], &[1, 2, 3, 4, 9, 9, 9, 9]);
        assert!(backend.write_buffer(buffer, 14, &[0; 4]).is_err());
    }

    #[test]
    fn test_residency_budget() {
        let mut backend = DummyBackend::new().with_residency_budget(2);
        assert!(backend.make_texture_resident(TextureHandle::new(1)));
        assert!(backend.make_texture_resident(TextureHandle::new(2)));
        assert!(backend.make_texture_resident(TextureHandle::new(2)));
        assert!(!backend.make_texture_resident(TextureHandle::new(3)));

        backend.make_texture_non_resident(TextureHandle::new(1));
        assert!(backend.make_texture_resident(TextureHandle::new(3)));
        assert!(!backend.is_texture_resident(TextureHandle::new(1)));
    }

    #[test]
    fn test_texture_levels() {
        let mut backend = DummyBackend::new();
        let texture = backend
            .create_texture(
                &TextureDescriptor::new_2d(4, 2, TextureFormat::R32Float, TextureUsage::STORAGE_BINDING)
                    .with_mip_levels(3),
            )
            .unwrap();

        assert_eq!(backend.texture_level(texture, 1).map(<[f32]>::len), Some(2));
        assert_eq!(backend.texture_level(texture, 2).map(<[f32]>::len), Some(1));
        backend.set_texture_level(texture, 1, &[1.0, 2.0]).unwrap();
        assert!(backend.set_texture_level(texture, 1, &[1.0]).is_err());
    }

    #[test]
    fn test_clear_pass_executes() {
        let mut backend = DummyBackend::new();
        let counters = backend
            .create_buffer(&BufferDescriptor::new(32, BufferUsage::STORAGE))
            .unwrap();
        backend.write_buffer(counters, 0, bytemuck::cast_slice(&[7u32; 8])).unwrap();

        let mut graph = RenderGraph::new();
        graph.add_compute_pass(
            ComputePass::new("clear".into(), ComputeKernel::ClearCounters)
                .with_buffer(bindings::COUNTERS, counters)
                .with_push_constants(&FramePushConstants {
                    counter_offset: 4,
                    counter_count: 4,
                    ..Default::default()
                }),
        );
        let compiled = graph.compile().unwrap();
        backend.execute_graph(&graph, &compiled).unwrap();

        let words: Vec<u32> = bytemuck::pod_collect_to_vec(&backend.read_buffer(counters, 0, 32).unwrap());
        assert_eq!(words, vec![7, 7, 7, 7, 0, 0, 0, 0]);
        assert_eq!(backend.executed_passes().len(), 1);
    }
}
