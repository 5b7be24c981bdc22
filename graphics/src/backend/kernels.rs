//! CPU versions of the compute kernels in `shaders/`.
//!
//! Each function processes every invocation of one dispatch in order. Atomic
//! counters become plain increments, which is equivalent because invocations
//! never observe each other's slots.

use crate::types::{
    CullPushConstants, DepthReducePushConstants, DrawIndexedIndirectArgs, FramePushConstants,
    GpuPortalSurface, GpuSurfaceBatch, GpuSurfaceCommand,
};
use crate::{BOUNDING_SPHERE_WORDS, CULL_WORKGROUP_SIZE, SURFACE_COMMANDS_PER_BATCH};

/// Read-only view of a depth pyramid's mip chain.
#[derive(Debug, Clone, Copy)]
pub(super) struct PyramidView<'a> {
    pub levels: &'a [Vec<f32>],
    pub width: u32,
    pub height: u32,
}

impl PyramidView<'_> {
    fn level_size(&self, level: u32) -> (u32, u32) {
        ((self.width >> level).max(1), (self.height >> level).max(1))
    }

    fn load(&self, level: u32, x: u32, y: u32) -> f32 {
        let (w, _) = self.level_size(level);
        self.levels[level as usize][(y * w + x) as usize]
    }
}

pub(super) fn clear_counters(params: &FramePushConstants, counters: &mut [u32]) {
    let start = (params.counter_offset as usize).min(counters.len());
    let end = (start + params.counter_count as usize).min(counters.len());
    counters[start..end].fill(0);
}

/// Copy the depth buffer into pyramid level 0.
pub(super) fn depth_copy(params: &DepthReducePushConstants, input: &[f32], output: &mut [f32]) {
    for y in 0..params.output_height.min(params.input_height) {
        for x in 0..params.output_width.min(params.input_width) {
            output[(y * params.output_width + x) as usize] =
                input[(y * params.input_width + x) as usize];
        }
    }
}

/// Source texels covered by output texel `out` along one axis.
fn footprint(out: u32, input: u32, output: u32) -> std::ops::Range<u32> {
    let start = out * input / output;
    let end = ((out + 1) * input).div_ceil(output).min(input);
    start..end.max(start + 1)
}

/// Each output texel stores the farthest depth of its footprint.
pub(super) fn depth_reduce(params: &DepthReducePushConstants, input: &[f32], output: &mut [f32]) {
    let (in_w, in_h) = (params.input_width, params.input_height);
    let (out_w, out_h) = (params.output_width, params.output_height);

    for y in 0..out_h {
        for x in 0..out_w {
            let mut depth = f32::MIN;
            for sy in footprint(y, in_h, out_h) {
                for sx in footprint(x, in_w, out_w) {
                    depth = depth.max(input[(sy * in_w + sx) as usize]);
                }
            }
            output[(y * out_w + x) as usize] = depth;
        }
    }
}

fn transform_point(m: &[[f32; 4]; 4], p: [f32; 3]) -> [f32; 3] {
    let mut out = [0.0; 3];
    for (row, value) in out.iter_mut().enumerate() {
        *value = m[0][row] * p[0] + m[1][row] * p[1] + m[2][row] * p[2] + m[3][row];
    }
    out
}

fn in_frustum(frustum: &[[f32; 4]; 6], center: [f32; 3], radius: f32) -> bool {
    frustum.iter().all(|plane| {
        let dist = plane[0] * center[0] + plane[1] * center[1] + plane[2] * center[2] - plane[3];
        dist >= -radius
    })
}

/// Screen-space bounds `[u0, v0, u1, v1]` of a sphere in view space, with
/// `depth` the distance along the view direction.
fn project_sphere(center: [f32; 3], depth: f32, radius: f32, p00: f32, p11: f32) -> [f32; 4] {
    let (cx, cy, cz) = (center[0], center[1], depth);
    let czr2 = cz * cz - radius * radius;

    let vx = (cx * cx + czr2).sqrt();
    let min_x = (vx * cx - radius * cz) / (vx * cz + radius * cx);
    let max_x = (vx * cx + radius * cz) / (vx * cz - radius * cx);

    let vy = (cy * cy + czr2).sqrt();
    let min_y = (vy * cy - radius * cz) / (vy * cz + radius * cy);
    let max_y = (vy * cy + radius * cz) / (vy * cz - radius * cy);

    [
        (min_x * p00 * 0.5 + 0.5).clamp(0.0, 1.0),
        (0.5 - max_y * p11 * 0.5).clamp(0.0, 1.0),
        (max_x * p00 * 0.5 + 0.5).clamp(0.0, 1.0),
        (0.5 - min_y * p11 * 0.5).clamp(0.0, 1.0),
    ]
}

/// Whether the sphere may be visible against the depth pyramid.
fn occlusion_visible(
    params: &CullPushConstants,
    pyramid: &PyramidView<'_>,
    center: [f32; 3],
    radius: f32,
) -> bool {
    let view = transform_point(&params.view_matrix, center);
    let depth = -view[2];
    let [p00, p11, znear, _] = params.projection;

    if depth - radius <= znear {
        return true;
    }

    let [u0, v0, u1, v1] = project_sphere(view, depth, radius, p00, p11);
    let width = (u1 - u0) * pyramid.width as f32;
    let height = (v1 - v0) * pyramid.height as f32;
    let levels = params.pyramid_levels.max(1);
    let level = (width.max(height).max(1.0).log2().ceil() as u32).min(levels - 1);

    let (lw, lh) = pyramid.level_size(level);
    let texel = |u: f32, size: u32| ((u * size as f32) as u32).min(size - 1);

    let mut farthest = f32::MIN;
    for y in texel(v0, lh)..=texel(v1, lh) {
        for x in texel(u0, lw)..=texel(u1, lw) {
            farthest = farthest.max(pyramid.load(level, x, y));
        }
    }

    depth - radius <= farthest
}

/// Buffers written by one cull dispatch.
pub(super) struct CullOutputs<'a> {
    pub surface_commands: &'a mut [GpuSurfaceCommand],
    pub portals: &'a mut [GpuPortalSurface],
    pub debug: Option<&'a mut [u32]>,
}

pub(super) fn cull_surfaces(
    params: &CullPushConstants,
    workgroups: u32,
    descriptors: &[u32],
    pyramid: Option<&PyramidView<'_>>,
    outputs: CullOutputs<'_>,
) {
    let frustum_enabled = params.flags & CullPushConstants::FLAG_FRUSTUM != 0;
    let occlusion_enabled = params.flags & CullPushConstants::FLAG_OCCLUSION != 0;
    let stride = params.descriptor_stride as usize;
    let group_size = CULL_WORKGROUP_SIZE;
    let CullOutputs {
        surface_commands,
        portals,
        mut debug,
    } = outputs;

    let surface_threads = params.first_portal_group.min(workgroups) * group_size;
    for surface in 0..surface_threads.min(params.total_draw_surfs) as usize {
        let descriptor = &descriptors[surface * stride..(surface + 1) * stride];
        let sphere: [f32; 4] =
            bytemuck::cast([descriptor[0], descriptor[1], descriptor[2], descriptor[3]]);
        let center = [sphere[0], sphere[1], sphere[2]];

        let in_view = !frustum_enabled || in_frustum(&params.frustum, center, sphere[3]);
        let unoccluded = match pyramid {
            Some(pyramid) if occlusion_enabled && in_view => {
                occlusion_visible(params, pyramid, center, sphere[3])
            }
            _ => true,
        };
        let visible = in_view && unoccluded;

        for &id in &descriptor[BOUNDING_SPHERE_WORDS..] {
            if id == 0 {
                continue;
            }
            let index = (params.surface_commands_offset + id - 1) as usize;
            if let Some(command) = surface_commands.get_mut(index) {
                command.enabled = visible as u32;
            }
        }

        if params.flags & CullPushConstants::FLAG_DEBUG != 0
            && let Some(debug) = debug.as_deref_mut()
            && let Some(words) = debug.get_mut(surface * 4..surface * 4 + 4)
        {
            words.copy_from_slice(&[1, in_view as u32, unoccluded as u32, visible as u32]);
        }
    }

    let portal_threads = workgroups.saturating_sub(params.first_portal_group) * group_size;
    let origin = params.view_origin;
    for portal in 0..portal_threads.min(params.total_portals) {
        let Some(entry) = portals.get_mut((params.portal_offset + portal) as usize) else {
            continue;
        };
        let visible = !frustum_enabled || in_frustum(&params.frustum, entry.origin, entry.radius);
        entry.distance = if visible {
            let d = [
                entry.origin[0] - origin[0],
                entry.origin[1] - origin[1],
                entry.origin[2] - origin[2],
            ];
            (d[0] * d[0] + d[1] * d[1] + d[2] * d[2]).sqrt()
        } else {
            -1.0
        };
    }
}

/// Compact enabled commands of every batch into the culled command buffer.
pub(super) fn process_surfaces(
    params: &FramePushConstants,
    workgroups: u32,
    surface_commands: &[GpuSurfaceCommand],
    batches: &[GpuSurfaceBatch],
    counters: &mut [u32],
    culled: &mut [DrawIndexedIndirectArgs],
) {
    let per_batch = SURFACE_COMMANDS_PER_BATCH;
    let offset = params.commands_offset as usize;

    for (batch_index, batch) in batches.iter().enumerate().take(workgroups as usize) {
        for i in 0..per_batch {
            let Some(command) = surface_commands.get(offset + batch_index * per_batch + i) else {
                continue;
            };
            if command.enabled == 0 || command.command.index_count == 0 {
                continue;
            }

            let Some(counter) = counters.get_mut((params.counter_offset + batch.material_id) as usize)
            else {
                continue;
            };
            let slot = *counter as usize;
            *counter += 1;
            if slot >= batch.batch_count as usize * per_batch {
                continue;
            }

            let target = offset + batch.batch_offset as usize * per_batch + slot;
            if let Some(out) = culled.get_mut(target) {
                *out = command.command;
            }
        }
    }
}
