//! # Umbra Graphics
//!
//! GPU-driven material system for world geometry.
//!
//! ## Overview
//!
//! This crate provides:
//! - [`material`] - Classification of surface stages into deduplicated
//!   materials, uniform buffer layout and indirect draw commands
//! - [`culling`] - Per-view frustum and occlusion culling on the GPU,
//!   followed by compaction into per-material draw lists
//! - [`portal`] - Discovery of the views seen through portals
//! - [`residency`] - Bindless texture residency under a memory budget
//! - [`MaterialSystem`] - The context driving all of the above each frame
//! - [`GpuBackend`] - Trait for graphics backend implementations, with a
//!   host-memory dummy backend for tests
//!
//! ## Example
//!
//! ```ignore
//! use umbra_graphics::{MaterialSystem, MaterialSystemConfig, ShaderSort};
//!
//! let mut system = MaterialSystem::new(MaterialSystemConfig::default());
//! system.generate_world(&mut backend, &scene, &mut shading)?;
//!
//! system.start_frame();
//! system.queue_surface_cull(0, camera)?;
//! system.render_materials(&mut backend, &mut shading, ShaderSort::Depth, ShaderSort::PostProcess, 0)?;
//! system.cull_surfaces(&mut backend)?;
//! system.end_frame(&mut backend);
//! ```

pub mod backend;
pub mod config;
pub mod culling;
pub mod error;
pub mod graph;
pub mod material;
pub mod portal;
pub mod residency;
pub mod shader;
pub mod sync;
pub mod system;
pub mod types;

// Re-export main types for convenience
#[cfg(feature = "dummy")]
pub use backend::dummy::DummyBackend;
pub use backend::{BarrierScope, GpuBackend, IndirectCountDraw, PipelineState, Topology};
pub use config::{DebugMode, MaterialSystemConfig};
pub use culling::{DepthPyramid, FrameRing, ViewParams};
pub use error::GraphicsError;
pub use graph::{CompiledGraph, ComputeKernel, ComputePass, PassHandle, RenderGraph};
pub use material::{
    Material, MaterialPacks, MaterialRef, PackKind, SceneSurface, Shader, ShaderSort,
    ShadingFamily, ShadingInterface, ShadingStage, StateBits,
};
pub use portal::{PortalRange, PortalResolution, PortalSurface, PortalVisibility};
pub use residency::TextureResidency;
pub use shader::KernelLibrary;
pub use system::{MaterialSystem, WorldStats};
pub use types::{BufferDescriptor, BufferHandle, BufferUsage, TextureHandle};

/// Frames in flight.
pub const MAX_FRAMES: usize = 2;
/// Views culled per frame: the main view plus portal views.
pub const MAX_VIEWS: usize = 8;
/// Number of (frame, view) partitions of the per-view buffers.
pub const MAX_VIEWFRAMES: usize = MAX_FRAMES * MAX_VIEWS;
/// Surface commands compacted by one workgroup.
pub const SURFACE_COMMANDS_PER_BATCH: usize = 64;
/// Draw counters per partition; also the material limit of a world.
pub const MAX_COMMAND_COUNTERS: usize = 256;
/// Textures a single draw command may reference.
pub const MAX_DRAW_COMMAND_TEXTURES: usize = 64;
/// Words of the bounding sphere heading each surface descriptor.
pub const BOUNDING_SPHERE_WORDS: usize = 4;
/// Invocations per cull workgroup.
pub const CULL_WORKGROUP_SIZE: u32 = 64;
pub const DEPTH_REDUCE_WORKGROUP: u32 = 8;

/// Graphics library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Initialize the graphics subsystem.
///
/// This should be called before using any graphics functionality.
pub fn init() {
    log::info!("Umbra Graphics v{} initialized", VERSION);
}
