//! Indirect draw commands, batches and the buffers the culling kernels read.

use std::sync::Arc;

use super::family::ShadingInterface;
use super::layout::UniformArena;
use super::pack::{DrawCommand, MaterialPacks, MaterialRef};
use super::surface::{DrawSurface, DrawSurfaceId};
use crate::error::GraphicsError;
use crate::types::{DrawIndexedIndirectArgs, GpuSurfaceBatch, GpuSurfaceCommand, TextureHandle};
use crate::{
    BOUNDING_SPHERE_WORDS, MAX_COMMAND_COUNTERS, MAX_DRAW_COMMAND_TEXTURES,
    SURFACE_COMMANDS_PER_BATCH,
};

/// Emit one draw command per stage instance and write the initial uniform data.
///
/// Returns the surfaces that have at least one dynamic stage; their uniform
/// data is rewritten every frame.
pub fn build_draw_commands(
    packs: &mut MaterialPacks,
    surfaces: &mut [DrawSurface],
    arena: &mut UniformArena,
    shading: &mut dyn ShadingInterface,
    extra_textures: &[TextureHandle],
) -> Result<Vec<DrawSurfaceId>, GraphicsError> {
    umbra_core::profile_function!();

    for material in packs.materials_mut() {
        material.reset_build_state();
    }

    let refs: Vec<(MaterialRef, Vec<DrawSurfaceId>)> = packs
        .materials()
        .map(|material| (material.material_ref(), material.surfaces.clone()))
        .collect();

    for (material_ref, material_surfaces) in refs {
        for surface_id in material_surfaces {
            let stage_count = surfaces[surface_id.index()].stages.len();
            for stage in 0..stage_count {
                if surfaces[surface_id.index()].stages[stage].material != Some(material_ref) {
                    continue;
                }
                add_stage_command(
                    packs,
                    surfaces,
                    arena,
                    shading,
                    extra_textures,
                    material_ref,
                    surface_id,
                    stage,
                )?;
            }
        }
    }

    let dynamic_surfaces: Vec<_> = surfaces
        .iter()
        .enumerate()
        .filter(|(_, surface)| surface.has_dynamic_stages())
        .map(|(index, _)| DrawSurfaceId::new(index))
        .collect();

    log::debug!(
        "Built {} draw commands, {} dynamic surfaces",
        packs.materials().map(|m| m.draw_commands.len()).sum::<usize>(),
        dynamic_surfaces.len()
    );
    Ok(dynamic_surfaces)
}

#[allow(clippy::too_many_arguments)]
fn add_stage_command(
    packs: &mut MaterialPacks,
    surfaces: &mut [DrawSurface],
    arena: &mut UniformArena,
    shading: &mut dyn ShadingInterface,
    extra_textures: &[TextureHandle],
    material_ref: MaterialRef,
    surface_id: DrawSurfaceId,
    stage_index: usize,
) -> Result<(), GraphicsError> {
    let material = packs.get_mut(material_ref).ok_or_else(|| {
        GraphicsError::InvalidHandle(format!("material {material_ref:?} does not exist"))
    })?;
    let surface = &surfaces[surface_id.index()];
    let shader = Arc::clone(&surface.shader);
    let stage = &shader.stages[stage_index];
    let slot_state = surface.stages[stage_index];

    let uniform_slot = arena.allocate(material, slot_state.dynamics.dynamic)?;

    let textures = stage_textures(surface, stage.textures(), extra_textures);
    if textures.len() > MAX_DRAW_COMMAND_TEXTURES {
        return Err(GraphicsError::DrawCommandTextureOverflow {
            shader: shader.name.clone(),
            limit: MAX_DRAW_COMMAND_TEXTURES,
        });
    }
    for &texture in &textures {
        material.add_texture(texture);
    }

    if !slot_state.initialized || slot_state.dynamics.dynamic {
        stage.family.update_surface_data(
            shading,
            arena.slot_mut(uniform_slot)?,
            material,
            surface,
            stage_index,
        );
    }

    let range = stage.family.color_renderer(shading, stage, surface);
    let args = DrawIndexedIndirectArgs::new(range.index_count, 1)
        .with_first_index(range.first_index)
        .with_first_instance(uniform_slot.index());

    material.draw_commands.push(DrawCommand { args, textures });
    let command = (material.draw_commands.len() - 1) as u32;

    let slot = &mut surfaces[surface_id.index()].stages[stage_index];
    slot.initialized = true;
    slot.uniform_slot = Some(uniform_slot);
    slot.draw_command = Some(command);
    Ok(())
}

/// Textures a draw command samples: stage images, then the surface's light
/// and deluxe maps, then textures shared by every draw.
fn stage_textures(
    surface: &DrawSurface,
    stage_textures: impl Iterator<Item = TextureHandle>,
    extra: &[TextureHandle],
) -> Vec<TextureHandle> {
    stage_textures
        .chain(surface.lightmap)
        .chain(surface.deluxemap)
        .chain(extra.iter().copied())
        .collect()
}

/// Rewrite the uniform data of every dynamic stage.
///
/// The dynamic region is cleared first; static slots are left untouched.
pub fn update_dynamic_surfaces(
    packs: &MaterialPacks,
    surfaces: &[DrawSurface],
    dynamic_surfaces: &[DrawSurfaceId],
    arena: &mut UniformArena,
    shading: &mut dyn ShadingInterface,
) -> Result<(), GraphicsError> {
    umbra_core::profile_function!();
    arena.zero_dynamic();

    for &surface_id in dynamic_surfaces {
        let surface = surfaces.get(surface_id.index()).ok_or_else(|| {
            GraphicsError::InvalidHandle(format!("dynamic surface {surface_id:?}"))
        })?;

        for (stage_index, slot) in surface.stages.iter().enumerate() {
            if !slot.dynamics.dynamic {
                continue;
            }
            let (Some(material), Some(uniform_slot)) =
                (slot.material.and_then(|m| packs.get(m)), slot.uniform_slot)
            else {
                continue;
            };
            let Some(stage) = surface.shader.stages.get(stage_index) else {
                continue;
            };
            stage.family.update_surface_data(
                shading,
                arena.slot_mut(uniform_slot)?,
                material,
                surface,
                stage_index,
            );
        }
    }
    Ok(())
}

/// Assign global ids and batch ranges in render order.
///
/// Returns the total number of batches.
pub fn assign_batches(packs: &mut MaterialPacks) -> Result<u32, GraphicsError> {
    let material_count = packs.material_count();
    if material_count > MAX_COMMAND_COUNTERS {
        return Err(GraphicsError::CapacityExceeded {
            what: "materials",
            requested: material_count,
            limit: MAX_COMMAND_COUNTERS,
        });
    }

    let mut batch_offset = 0;
    for (global_id, material) in packs.materials_mut().enumerate() {
        let batch_count = material
            .draw_commands
            .len()
            .div_ceil(SURFACE_COMMANDS_PER_BATCH) as u32;
        material.global_id = global_id as u32;
        material.batch_offset = batch_offset;
        material.batch_count = batch_count;
        batch_offset += batch_count;
    }

    log::debug!("Total batch count: {batch_offset}");
    Ok(batch_offset)
}

/// Host images of the descriptor, surface command and batch buffers.
#[derive(Debug, Clone, Default)]
pub struct CommandBuffers {
    /// Words per surface descriptor: bounding sphere plus command ids.
    pub descriptor_stride: u32,
    pub descriptor_count: u32,
    pub descriptors: Vec<u32>,
    /// Surface commands of one (frame, view) partition, all disabled.
    pub surface_commands: Vec<GpuSurfaceCommand>,
    /// One entry per batch.
    pub batches: Vec<GpuSurfaceBatch>,
    pub total_batch_count: u32,
}

impl CommandBuffers {
    /// Number of surface commands in one partition.
    pub fn surface_commands_count(&self) -> u32 {
        self.surface_commands.len() as u32
    }

    /// Command ids stored in descriptor `index`, zero meaning none.
    pub fn descriptor_commands(&self, index: usize) -> &[u32] {
        let stride = self.descriptor_stride as usize;
        let start = index * stride + BOUNDING_SPHERE_WORDS;
        &self.descriptors[start..(index + 1) * stride]
    }
}

/// Command ids a surface contributes: its depth pre-pass, its own stages and
/// its fog surface, in that order.
fn surface_command_ids(
    packs: &MaterialPacks,
    surfaces: &[DrawSurface],
    surface: &DrawSurface,
) -> Result<Vec<(u32, DrawIndexedIndirectArgs)>, GraphicsError> {
    let command = |owner: &DrawSurface, stage: usize| {
        let slot = owner.stages.get(stage).copied().unwrap_or_default();
        let material = slot.material.and_then(|m| packs.get(m));
        match (material, slot.draw_command) {
            (Some(material), Some(index)) => {
                let draw = &material.draw_commands[index as usize];
                let id = material.batch_offset * SURFACE_COMMANDS_PER_BATCH as u32 + index;
                Ok((id, draw.args))
            }
            _ => Err(GraphicsError::Internal(format!(
                "surface {} stage {stage} has no draw command",
                owner.scene_index
            ))),
        }
    };

    let mut ids = Vec::with_capacity(surface.stages.len() + 2);
    if let Some(depth) = surface.depth_surface {
        ids.push(command(&surfaces[depth.index()], 0)?);
    }
    for stage in 0..surface.stages.len() {
        ids.push(command(surface, stage)?);
    }
    if let Some(fog) = surface.fog_surface {
        ids.push(command(&surfaces[fog.index()], 0)?);
    }
    Ok(ids)
}

/// Build the descriptor, surface command and batch buffers.
///
/// Helper surfaces flagged `material_system_skip` get no descriptor of their
/// own; their commands are referenced by the surface that chains them.
pub fn build_command_buffers(
    packs: &MaterialPacks,
    surfaces: &[DrawSurface],
    total_batch_count: u32,
) -> Result<CommandBuffers, GraphicsError> {
    umbra_core::profile_function!();

    let mut per_surface = Vec::new();
    for surface in surfaces.iter().filter(|s| !s.material_system_skip) {
        per_surface.push((surface, surface_command_ids(packs, surfaces, surface)?));
    }

    let max_commands = per_surface.iter().map(|(_, ids)| ids.len()).max().unwrap_or(0);
    let stride = BOUNDING_SPHERE_WORDS + max_commands;
    let commands_count = total_batch_count as usize * SURFACE_COMMANDS_PER_BATCH;

    let mut descriptors = vec![0u32; per_surface.len() * stride];
    let mut surface_commands = vec![GpuSurfaceCommand::default(); commands_count];

    for (index, (surface, ids)) in per_surface.iter().enumerate() {
        let descriptor = &mut descriptors[index * stride..(index + 1) * stride];
        let sphere: [u32; 4] = bytemuck::cast(surface.bounds.to_array());
        descriptor[..BOUNDING_SPHERE_WORDS].copy_from_slice(&sphere);

        for (word, &(id, args)) in descriptor[BOUNDING_SPHERE_WORDS..].iter_mut().zip(ids) {
            // Zero means no command.
            *word = id + 1;
            surface_commands[id as usize] = GpuSurfaceCommand {
                enabled: 0,
                command: args,
            };
        }
    }

    let mut batches = Vec::with_capacity(total_batch_count as usize);
    for material in packs.materials() {
        for _ in 0..material.batch_count {
            batches.push(GpuSurfaceBatch {
                material_id: material.global_id,
                batch_offset: material.batch_offset,
                batch_count: material.batch_count,
                _pad: 0,
            });
        }
    }

    Ok(CommandBuffers {
        descriptor_stride: stride as u32,
        descriptor_count: per_surface.len() as u32,
        descriptors,
        surface_commands,
        batches,
        total_batch_count,
    })
}
