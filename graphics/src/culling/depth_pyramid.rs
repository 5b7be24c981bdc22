//! Hierarchical depth buffer used for occlusion culling.
//!
//! Level 0 is a copy of the linear view depth; each further level halves the
//! resolution and keeps the farthest depth of the texels it covers.

use crate::DEPTH_REDUCE_WORKGROUP;
use crate::backend::GpuBackend;
use crate::error::GraphicsError;
use crate::graph::{ComputeKernel, ComputePass, PassHandle, RenderGraph};
use crate::shader::bindings;
use crate::types::{
    DepthReducePushConstants, TextureDescriptor, TextureFormat, TextureHandle, TextureUsage,
};

/// `floor(log2(max(width, height))) + 1`.
pub fn pyramid_level_count(width: u32, height: u32) -> u32 {
    let size = width.max(height).max(1);
    u32::BITS - size.leading_zeros()
}

fn workgroups(width: u32, height: u32) -> (u32, u32) {
    (
        width.div_ceil(DEPTH_REDUCE_WORKGROUP),
        height.div_ceil(DEPTH_REDUCE_WORKGROUP),
    )
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DepthPyramid {
    /// Linear view depth written by the depth pre-pass.
    source: TextureHandle,
    pyramid: TextureHandle,
    width: u32,
    height: u32,
    levels: u32,
}

impl DepthPyramid {
    /// Allocate the depth source and the pyramid for a `width` x `height` viewport.
    pub fn create(
        backend: &mut dyn GpuBackend,
        width: u32,
        height: u32,
    ) -> Result<Self, GraphicsError> {
        if width == 0 || height == 0 {
            return Err(GraphicsError::InvalidParameter(format!(
                "depth pyramid of {width}x{height}"
            )));
        }
        let levels = pyramid_level_count(width, height);

        let source = backend.create_texture(
            &TextureDescriptor::new_2d(
                width,
                height,
                TextureFormat::R32Float,
                TextureUsage::TEXTURE_BINDING | TextureUsage::RENDER_ATTACHMENT,
            )
            .with_label("depth source"),
        )?;
        let pyramid = backend.create_texture(
            &TextureDescriptor::new_2d(
                width,
                height,
                TextureFormat::R32Float,
                TextureUsage::TEXTURE_BINDING | TextureUsage::STORAGE_BINDING,
            )
            .with_label("depth pyramid")
            .with_mip_levels(levels),
        )?;

        log::debug!("Depth pyramid {width}x{height} with {levels} levels");
        Ok(Self {
            source,
            pyramid,
            width,
            height,
            levels,
        })
    }

    pub fn source(&self) -> TextureHandle {
        self.source
    }

    pub fn texture(&self) -> TextureHandle {
        self.pyramid
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn levels(&self) -> u32 {
        self.levels
    }

    pub fn level_size(&self, level: u32) -> (u32, u32) {
        ((self.width >> level).max(1), (self.height >> level).max(1))
    }

    /// Record the copy pass and one reduce pass per further level, each
    /// depending on the previous one. Returns the last pass.
    pub fn record(&self, graph: &mut RenderGraph) -> PassHandle {
        let (gx, gy) = workgroups(self.width, self.height);
        let mut previous = graph.add_compute_pass(
            ComputePass::new("depth_copy".into(), ComputeKernel::DepthCopy)
                .with_workgroups(gx, gy, 1)
                .with_texture_level(bindings::DEPTH_INPUT, self.source, 0)
                .with_texture_level(bindings::DEPTH_OUTPUT, self.pyramid, 0)
                .with_push_constants(&DepthReducePushConstants {
                    input_width: self.width,
                    input_height: self.height,
                    output_width: self.width,
                    output_height: self.height,
                }),
        );

        for level in 1..self.levels {
            let (in_w, in_h) = self.level_size(level - 1);
            let (out_w, out_h) = self.level_size(level);
            let (gx, gy) = workgroups(out_w, out_h);

            let pass = graph.add_compute_pass(
                ComputePass::new(format!("depth_reduce_{level}"), ComputeKernel::DepthReduce)
                    .with_workgroups(gx, gy, 1)
                    .with_texture_level(bindings::DEPTH_INPUT, self.pyramid, level - 1)
                    .with_texture_level(bindings::DEPTH_OUTPUT, self.pyramid, level)
                    .with_push_constants(&DepthReducePushConstants {
                        input_width: in_w,
                        input_height: in_h,
                        output_width: out_w,
                        output_height: out_h,
                    }),
            );
            graph.add_dependency(pass, previous);
            previous = pass;
        }
        previous
    }

    pub fn destroy(self, backend: &mut dyn GpuBackend) {
        backend.destroy_texture(self.source);
        backend.destroy_texture(self.pyramid);
    }
}
