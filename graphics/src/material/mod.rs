//! Materials: deduplicated pipeline state shared by many surface stages.
//!
//! A world build runs the steps of this module in order:
//!
//! 1. [`classify_surfaces`] assigns every (surface, stage) pair to a
//!    [`Material`] in one of three [`MaterialPack`]s.
//! 2. [`plan_uniform_layout`] places each material's static and dynamic
//!    uniform regions in a single buffer.
//! 3. [`build_draw_commands`] writes the uniform payloads and emits one
//!    indirect draw per stage instance.
//! 4. [`assign_batches`] and [`build_command_buffers`] group the commands
//!    into batches and produce the buffers the culling kernels consume.

mod classifier;
mod commands;
mod family;
mod layout;
mod pack;
mod stage;
mod state;
mod surface;

#[cfg(test)]
pub(crate) mod testing;

pub use classifier::{Classification, classify_surfaces, process_stage};
pub use commands::{
    CommandBuffers, assign_batches, build_command_buffers, build_draw_commands,
    update_dynamic_surfaces,
};
pub use family::{BindContext, IndexRange, ProgramKey, ShadingFamily, ShadingInterface};
pub use layout::{Region, UniformArena, UniformLayout, UniformSlot, plan_uniform_layout};
pub use pack::{DrawCommand, Material, MaterialKey, MaterialPack, MaterialPacks, MaterialRef};
pub use stage::{
    AlphaGen, ColorGen, ShadingStage, StageDynamics, StageExpressions, TexMod, TextureBundle,
    compute_dynamics,
};
pub use state::{CullType, PackKind, ShaderSort, StateBits};
pub use surface::{
    DrawSurface, DrawSurfaceId, EntityRef, SceneSurface, Shader, StageSlot, SurfaceGeometry,
    SurfaceKind,
};
