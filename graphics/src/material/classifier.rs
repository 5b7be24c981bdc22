//! Assigns every (surface, stage) pair to a deduplicated material.

use std::sync::Arc;

use super::family::ShadingInterface;
use super::pack::{Material, MaterialKey, MaterialPacks, MaterialRef};
use super::stage::compute_dynamics;
use super::state::PackKind;
use super::surface::{DrawSurface, DrawSurfaceId, SceneSurface, StageSlot};

/// Result of classifying a scene.
#[derive(Debug, Default)]
pub struct Classification {
    pub surfaces: Vec<DrawSurface>,
    pub packs: MaterialPacks,
    /// Scene indices of portal surfaces.
    pub portal_surfaces: Vec<usize>,
    /// Scene indices of surfaces left to the legacy autosprite path.
    pub autosprite_surfaces: Vec<usize>,
    /// Stage instances classified.
    pub stage_count: u32,
}

/// Copy the eligible surfaces of `scene` and classify their stages.
pub fn classify_surfaces(
    scene: &[SceneSurface],
    shading: &mut dyn ShadingInterface,
) -> Classification {
    umbra_core::profile_function!();

    let mut result = Classification::default();
    let mut draw_ids = vec![None; scene.len()];

    for (index, surface) in scene.iter().enumerate() {
        if surface.shader.is_portal {
            result.portal_surfaces.push(index);
            continue;
        }
        if surface.shader.auto_sprite {
            result.autosprite_surfaces.push(index);
            continue;
        }
        if !surface.is_eligible() {
            continue;
        }
        draw_ids[index] = Some(DrawSurfaceId::new(result.surfaces.len()));
        result.surfaces.push(DrawSurface::from_scene(index, surface));
    }

    for surface in &mut result.surfaces {
        let source = &scene[surface.scene_index];
        surface.depth_surface = resolve_chain(source.depth_surface, &draw_ids, "depth");
        surface.fog_surface = resolve_chain(source.fog_surface, &draw_ids, "fog");
    }

    for surface_index in 0..result.surfaces.len() {
        let stage_count = result.surfaces[surface_index].stages.len();
        for stage in 0..stage_count {
            process_stage(
                &mut result.packs,
                &mut result.surfaces,
                DrawSurfaceId::new(surface_index),
                stage,
                shading,
            );
            result.stage_count += 1;
        }
    }

    log::info!(
        "Material system: {} surfaces, {} stages -> {} materials (depth {}, opaque {}, transparent {})",
        result.surfaces.len(),
        result.stage_count,
        result.packs.material_count(),
        result.packs.pack(PackKind::Depth).materials.len(),
        result.packs.pack(PackKind::Opaque).materials.len(),
        result.packs.pack(PackKind::Transparent).materials.len(),
    );
    umbra_core::profile_plot!("materials", result.packs.material_count());

    result
}

fn resolve_chain(
    target: Option<usize>,
    draw_ids: &[Option<DrawSurfaceId>],
    what: &str,
) -> Option<DrawSurfaceId> {
    let target = target?;
    let resolved = draw_ids.get(target).copied().flatten();
    if resolved.is_none() {
        log::warn!("Chained {what} surface {target} is not handled by the material system");
    }
    resolved
}

/// Find or create the material of one stage and record it on the surface.
pub fn process_stage(
    packs: &mut MaterialPacks,
    surfaces: &mut [DrawSurface],
    surface_id: DrawSurfaceId,
    stage_index: usize,
    shading: &mut dyn ShadingInterface,
) -> MaterialRef {
    let surface = &surfaces[surface_id.index()];
    let shader = Arc::clone(&surface.shader);
    let stage = &shader.stages[stage_index];

    let dynamics = compute_dynamics(stage);
    let pack_kind = PackKind::from_sort(shader.sort);
    let program = stage.family.process_material(shading, stage, surface);
    let key = MaterialKey {
        state_bits: stage.state_bits.gpu_state(),
        family: stage.family,
        program,
        cull_type: shader.cull_type,
        polygon_offset: shader.polygon_offset,
        vertex_buffer: surface.geometry.vertex_buffer,
        index_buffer: surface.geometry.index_buffer,
    };

    // Later stages must not be merged into a material that draws before the
    // previous stage's material.
    let sync = match stage_index {
        0 => None,
        _ => surface.stages[stage_index - 1].material,
    };
    let min_id = match sync {
        Some(sync) if sync.pack == pack_kind => sync.id,
        _ => 0,
    };

    let pack = packs.pack_mut(pack_kind);
    let existing = pack
        .materials
        .iter()
        .position(|material| material.id >= min_id && material.key == key);

    let id = match existing {
        Some(id) => id,
        None => {
            let id = pack.materials.len();
            let stride = stage.family.padded_stride(shading, program);
            pack.materials
                .push(Material::new(id as u32, pack_kind, key, sync, stride));
            log::trace!(
                "New material {pack_kind:?}/{id} for shader {} stage {stage_index}",
                shader.name
            );
            id
        }
    };

    let material = &mut pack.materials[id];
    material.total_draw_surf_count += 1;
    if dynamics.dynamic {
        material.total_dynamic_count += 1;
    } else {
        material.total_static_count += 1;
    }
    material.add_surface(surface_id);

    let material_ref = material.material_ref();
    surfaces[surface_id.index()].stages[stage_index] = StageSlot {
        material: Some(material_ref),
        dynamics,
        ..StageSlot::default()
    };

    material_ref
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::material::testing::{FakeShading, opaque_shader, scene_surface};
    use crate::material::{EntityRef, Shader, ShaderSort, ShadingFamily, ShadingStage, StateBits};
    use crate::material::SurfaceKind;

    fn classify(scene: &[SceneSurface]) -> Classification {
        classify_surfaces(scene, &mut FakeShading::default())
    }

    #[test]
    fn test_identical_surfaces_share_material() {
        let shader = opaque_shader("wall", 1);
        let result = classify(&[scene_surface(&shader, 0), scene_surface(&shader, 1)]);

        let opaque = &result.packs.pack(PackKind::Opaque).materials;
        assert_eq!(opaque.len(), 1);
        assert_eq!(opaque[0].total_draw_surf_count, 2);
        assert_eq!(opaque[0].surfaces.len(), 2);
        assert_eq!(result.stage_count, 2);
    }

    #[test]
    fn test_alpha_test_does_not_split_materials() {
        let plain = opaque_shader("plain", 1);
        let tested = Arc::new(Shader::new("grate", ShaderSort::Opaque).with_stage(
            ShadingStage::new(
                ShadingFamily::Generic3D,
                StateBits::DEPTHMASK_TRUE | StateBits::DEPTHFUNC_LESS | StateBits::ATEST_GE_128,
            ),
        ));
        let result = classify(&[scene_surface(&plain, 0), scene_surface(&tested, 1)]);
        assert_eq!(result.packs.material_count(), 1);
    }

    #[test]
    fn test_depth_fade_then_blend_records_sync() {
        let shader = Arc::new(
            Shader::new("soft_smoke", ShaderSort::Opaque)
                .with_stage(
                    ShadingStage::new(ShadingFamily::Generic3D, StateBits::DEPTHMASK_TRUE)
                        .with_depth_fade(),
                )
                .with_stage(ShadingStage::new(
                    ShadingFamily::Generic3D,
                    StateBits::SRCBLEND_SRC_ALPHA | StateBits::DSTBLEND_ONE_MINUS_SRC_ALPHA,
                )),
        );
        let result = classify(&[scene_surface(&shader, 0)]);

        let stages = &result.surfaces[0].stages;
        let first = stages[0].material.unwrap();
        let second = result.packs.get(stages[1].material.unwrap()).unwrap();
        assert!(second.use_sync());
        assert_eq!(second.sync_material(), Some(first.id));
    }

    #[test]
    fn test_sync_skips_materials_before_target() {
        // Surface A: [X, Y]. Surface B: [Y, X]. B's second stage must not
        // merge into X (id 0) because its sync target Y has id 1.
        let x = ShadingStage::new(ShadingFamily::Generic3D, StateBits::DEPTHMASK_TRUE);
        let y = ShadingStage::new(ShadingFamily::LightMapping, StateBits::DEPTHMASK_TRUE);
        let a = Arc::new(
            Shader::new("a", ShaderSort::Opaque)
                .with_stage(x.clone())
                .with_stage(y.clone()),
        );
        let b = Arc::new(Shader::new("b", ShaderSort::Opaque).with_stage(y).with_stage(x));

        let result = classify(&[scene_surface(&a, 0), scene_surface(&b, 1)]);
        let materials = &result.packs.pack(PackKind::Opaque).materials;
        assert_eq!(materials.len(), 3);

        let b_stages = &result.surfaces[1].stages;
        assert_eq!(b_stages[0].material.unwrap().id, 1);
        assert_eq!(b_stages[1].material.unwrap().id, 2);
        assert_eq!(materials[2].sync_material(), Some(1));
    }

    #[test]
    fn test_ineligible_surfaces_are_excluded() {
        let shader = opaque_shader("wall", 1);
        let sky = Arc::new(Shader::new("sky", ShaderSort::Opaque).sky());
        let portal = Arc::new(Shader::new("mirror", ShaderSort::Portal).portal());
        let sprite = Arc::new(Shader::new("flare", ShaderSort::Opaque).auto_sprite());

        let mut model = scene_surface(&shader, 4);
        model.entity = EntityRef::Model(3);

        let scene = vec![
            scene_surface(&shader, 0),
            scene_surface(&sky, 1),
            scene_surface(&portal, 2),
            scene_surface(&sprite, 3),
            model,
            scene_surface(&shader, 5).with_kind(SurfaceKind::Skip),
        ];
        let result = classify(&scene);

        assert_eq!(result.surfaces.len(), 1);
        assert_eq!(result.portal_surfaces, vec![2]);
        assert_eq!(result.autosprite_surfaces, vec![3]);
    }

    #[test]
    fn test_chains_resolved_to_draw_surfaces() {
        let shader = opaque_shader("wall", 1);
        let sky = Arc::new(Shader::new("sky", ShaderSort::Opaque).sky());
        let scene = vec![
            scene_surface(&sky, 0),
            scene_surface(&shader, 1).skipped_by_material_system(),
            scene_surface(&shader, 2).with_depth_surface(1).with_fog_surface(0),
        ];
        let result = classify(&scene);

        assert_eq!(result.surfaces[1].depth_surface, Some(DrawSurfaceId::new(0)));
        // Sky surfaces never get a draw surface.
        assert_eq!(result.surfaces[1].fog_surface, None);
    }

    #[test]
    fn test_dynamic_counts() {
        let shader = Arc::new(
            Shader::new("pulse", ShaderSort::Opaque).with_stage(
                ShadingStage::new(ShadingFamily::Generic3D, StateBits::DEPTHMASK_TRUE)
                    .with_alpha_gen(crate::material::AlphaGen::Waveform),
            ),
        );
        let result = classify(&[scene_surface(&shader, 0)]);
        let material = &result.packs.pack(PackKind::Opaque).materials[0];
        assert_eq!(material.total_dynamic_count, 1);
        assert_eq!(material.total_static_count, 0);
        assert!(result.surfaces[0].stages[0].dynamics.dynamic);
    }
}
