//! Data layouts shared between the host and the compute kernels.
//!
//! Every struct here is `#[repr(C)]` and `Pod`, and matches the struct of the
//! same name in `shaders/*.wgsl`. Sizes are pinned with static assertions.

use super::DrawIndexedIndirectArgs;

/// A draw command plus the per-view enable flag written by the cull kernel.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, bytemuck::Pod, bytemuck::Zeroable)]
pub struct GpuSurfaceCommand {
    pub enabled: u32,
    pub command: DrawIndexedIndirectArgs,
}

/// Maps a batch of surface commands back to its material.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, bytemuck::Pod, bytemuck::Zeroable)]
pub struct GpuSurfaceBatch {
    /// Global material id, also the index of the material's atomic counter.
    pub material_id: u32,
    /// First batch of the material.
    pub batch_offset: u32,
    /// Batches of the material; compaction never writes past them.
    pub batch_count: u32,
    pub _pad: u32,
}

/// Portal bounding sphere and the view distance computed by the cull kernel.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Default, bytemuck::Pod, bytemuck::Zeroable)]
pub struct GpuPortalSurface {
    pub origin: [f32; 3],
    pub radius: f32,
    pub surface_id: u32,
    /// Distance to the view origin, `-1.0` when culled.
    pub distance: f32,
    pub _pad: [u32; 2],
}

/// Parameters of one cull dispatch.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Default, bytemuck::Pod, bytemuck::Zeroable)]
pub struct CullPushConstants {
    /// Inward-facing planes as `[nx, ny, nz, dist]`.
    pub frustum: [[f32; 4]; 6],
    /// Column-major world-to-view matrix.
    pub view_matrix: [[f32; 4]; 4],
    pub view_origin: [f32; 4],
    /// `[P00, P11, znear, 0]`.
    pub projection: [f32; 4],
    pub total_draw_surfs: u32,
    /// Words per surface descriptor.
    pub descriptor_stride: u32,
    /// First surface command of this (frame, view) partition.
    pub surface_commands_offset: u32,
    pub surface_commands_count: u32,
    /// First portal entry of this (frame, view) partition.
    pub portal_offset: u32,
    pub total_portals: u32,
    /// Combination of `CullPushConstants::FLAG_*`.
    pub flags: u32,
    /// Workgroups before this index cull surfaces, the rest cull portals.
    pub first_portal_group: u32,
    pub viewport_width: u32,
    pub viewport_height: u32,
    pub pyramid_levels: u32,
    pub _pad: u32,
}

impl CullPushConstants {
    pub const FLAG_FRUSTUM: u32 = 1 << 0;
    pub const FLAG_OCCLUSION: u32 = 1 << 1;
    pub const FLAG_DEBUG: u32 = 1 << 2;
}

/// Parameters of the clear and compact dispatches.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, bytemuck::Pod, bytemuck::Zeroable)]
pub struct FramePushConstants {
    /// First surface/culled command of the (frame, view) partition.
    pub commands_offset: u32,
    /// First atomic counter of the partition.
    pub counter_offset: u32,
    /// Counters to clear.
    pub counter_count: u32,
    pub batch_count: u32,
}

/// Parameters of one depth pyramid level.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, bytemuck::Pod, bytemuck::Zeroable)]
pub struct DepthReducePushConstants {
    pub input_width: u32,
    pub input_height: u32,
    pub output_width: u32,
    pub output_height: u32,
}

static_assertions::const_assert_eq!(std::mem::size_of::<GpuSurfaceCommand>(), 24);
static_assertions::const_assert_eq!(std::mem::size_of::<GpuSurfaceBatch>(), 16);
static_assertions::const_assert_eq!(std::mem::size_of::<GpuPortalSurface>(), 32);
static_assertions::const_assert_eq!(std::mem::size_of::<CullPushConstants>(), 240);
static_assertions::const_assert_eq!(std::mem::size_of::<FramePushConstants>(), 16);
