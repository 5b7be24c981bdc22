//! GPU culling: depth reduction, per-view cull and compaction.
//!
//! Every frame records one [`RenderGraph`]:
//!
//! ```text
//! depth_copy -> depth_reduce_1 -> ... -> cull_view_0 -> compact_view_0
//!                                    \-> cull_view_1 -> compact_view_1
//! ```
//!
//! The depth passes are only recorded when occlusion culling is on and the
//! PVS is not locked. Each view writes its own partition of the surface
//! command, culled command, counter and portal buffers, so views never
//! depend on each other.

pub mod depth_pyramid;
pub mod frame;

pub use depth_pyramid::{DepthPyramid, pyramid_level_count};
pub use frame::{Frame, FrameRing, ViewFrame, ViewParams, partition};

use umbra_core::math::mat4_to_cols_array_2d;

use crate::graph::{ComputeKernel, ComputePass, RenderGraph};
use crate::shader::bindings;
use crate::types::{BufferHandle, CullPushConstants, FramePushConstants};
use crate::{CULL_WORKGROUP_SIZE, MAX_COMMAND_COUNTERS, MAX_VIEWS};

/// GPU buffers read and written by the culling kernels.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CullBuffers {
    pub descriptors: BufferHandle,
    pub surface_commands: BufferHandle,
    pub culled_commands: BufferHandle,
    pub batches: BufferHandle,
    pub counters: BufferHandle,
    pub portals: BufferHandle,
    pub debug: Option<BufferHandle>,
}

/// Which tests the cull kernel runs.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CullSettings {
    pub frustum: bool,
    pub occlusion: bool,
    pub debug: bool,
    pub near_plane: f32,
}

/// Sizes of the world the kernels are dispatched over.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CullingPipeline {
    pub descriptor_count: u32,
    pub descriptor_stride: u32,
    /// Surface commands per (frame, view) partition.
    pub surface_commands_count: u32,
    pub total_batch_count: u32,
    pub total_portals: u32,
}

impl CullingPipeline {
    /// Workgroups culling surfaces; portal workgroups follow them.
    pub fn first_portal_group(&self) -> u32 {
        self.descriptor_count.div_ceil(CULL_WORKGROUP_SIZE)
    }

    pub fn cull_workgroups(&self) -> u32 {
        self.first_portal_group() + self.total_portals.div_ceil(CULL_WORKGROUP_SIZE)
    }

    /// Parameters of the cull dispatch of `view` in `frame`.
    pub fn cull_params(
        &self,
        frame: usize,
        view_id: u32,
        view: &ViewParams,
        settings: &CullSettings,
        pyramid: Option<&DepthPyramid>,
    ) -> CullPushConstants {
        let partition = partition(frame, view_id) as u32;

        let mut flags = 0;
        if settings.frustum {
            flags |= CullPushConstants::FLAG_FRUSTUM;
        }
        if settings.occlusion && pyramid.is_some() {
            flags |= CullPushConstants::FLAG_OCCLUSION;
        }
        if settings.debug {
            flags |= CullPushConstants::FLAG_DEBUG;
        }

        let origin = view.origin;
        CullPushConstants {
            frustum: view.frustum.to_arrays(),
            view_matrix: mat4_to_cols_array_2d(&view.view_matrix),
            view_origin: [origin.x, origin.y, origin.z, 0.0],
            projection: [
                view.projection[(0, 0)],
                view.projection[(1, 1)],
                settings.near_plane,
                0.0,
            ],
            total_draw_surfs: self.descriptor_count,
            descriptor_stride: self.descriptor_stride,
            surface_commands_offset: self.surface_commands_count * partition,
            surface_commands_count: self.surface_commands_count,
            portal_offset: self.total_portals * partition,
            total_portals: self.total_portals,
            flags,
            first_portal_group: self.first_portal_group(),
            viewport_width: pyramid.map_or(0, DepthPyramid::width),
            viewport_height: pyramid.map_or(0, DepthPyramid::height),
            pyramid_levels: pyramid.map_or(0, DepthPyramid::levels),
            _pad: 0,
        }
    }

    /// Parameters of the compact dispatch of `view` in `frame`.
    pub fn compact_params(&self, frame: usize, view_id: u32) -> FramePushConstants {
        let partition = partition(frame, view_id) as u32;
        FramePushConstants {
            commands_offset: self.surface_commands_count * partition,
            counter_offset: MAX_COMMAND_COUNTERS as u32 * partition,
            counter_count: 0,
            batch_count: self.total_batch_count,
        }
    }

    /// Pass resetting the counters of every view of `frame`.
    pub fn clear_counters_pass(&self, frame: usize, counters: BufferHandle) -> ComputePass {
        ComputePass::new(format!("clear_counters_{frame}"), ComputeKernel::ClearCounters)
            .with_workgroups(MAX_VIEWS as u32, 1, 1)
            .with_buffer(bindings::COUNTERS, counters)
            .with_push_constants(&FramePushConstants {
                commands_offset: 0,
                counter_offset: (MAX_COMMAND_COUNTERS * MAX_VIEWS * frame) as u32,
                counter_count: (MAX_COMMAND_COUNTERS * MAX_VIEWS) as u32,
                batch_count: 0,
            })
    }

    /// Record depth reduction and the cull and compact passes of `views`.
    ///
    /// `reduce_depth` is false while the PVS is locked; the pyramid of the
    /// last unlocked frame is then reused.
    pub fn record(
        &self,
        graph: &mut RenderGraph,
        frame: usize,
        views: &[ViewParams],
        buffers: &CullBuffers,
        settings: &CullSettings,
        pyramid: Option<&DepthPyramid>,
        reduce_depth: bool,
    ) {
        umbra_core::profile_function!();

        let pyramid = pyramid.filter(|_| settings.occlusion);
        let depth_pass = match pyramid {
            Some(pyramid) if reduce_depth => Some(pyramid.record(graph)),
            _ => None,
        };

        for (view_id, view) in views.iter().enumerate() {
            let view_id = view_id as u32;

            let mut cull = ComputePass::new(
                format!("cull_view_{view_id}"),
                ComputeKernel::CullSurfaces,
            )
            .with_workgroups(self.cull_workgroups(), 1, 1)
            .with_buffer(bindings::DESCRIPTORS, buffers.descriptors)
            .with_buffer(bindings::SURFACE_COMMANDS, buffers.surface_commands)
            .with_buffer(bindings::PORTALS, buffers.portals)
            .with_push_constants(&self.cull_params(frame, view_id, view, settings, pyramid));
            if let Some(debug) = buffers.debug.filter(|_| settings.debug) {
                cull = cull.with_buffer(bindings::DEBUG, debug);
            }
            if let Some(pyramid) = pyramid {
                cull = cull.with_texture_level(bindings::DEPTH_PYRAMID, pyramid.texture(), 0);
            }
            let cull = graph.add_compute_pass(cull);
            if let Some(depth_pass) = depth_pass {
                graph.add_dependency(cull, depth_pass);
            }

            let compact = graph.add_compute_pass(
                ComputePass::new(
                    format!("compact_view_{view_id}"),
                    ComputeKernel::ProcessSurfaces,
                )
                .with_workgroups(self.total_batch_count, 1, 1)
                .with_buffer(bindings::SURFACE_COMMANDS, buffers.surface_commands)
                .with_buffer(bindings::CULLED_COMMANDS, buffers.culled_commands)
                .with_buffer(bindings::BATCHES, buffers.batches)
                .with_buffer(bindings::COUNTERS, buffers.counters)
                .with_push_constants(&self.compact_params(frame, view_id)),
            );
            graph.add_dependency(compact, cull);
        }

        log::trace!(
            "Recorded culling of {} views in frame {frame} ({} passes)",
            views.len(),
            graph.pass_count()
        );
    }
}
