//! Bindless texture residency for materials about to be drawn.
//!
//! Materials are made resident lazily, right before their draw. When the
//! backend runs out of residency space, the textures of materials drawn
//! earlier in the frame are released, oldest first, one material at a time,
//! until the current material fits.

use std::collections::VecDeque;

use crate::backend::GpuBackend;
use crate::material::{MaterialPacks, MaterialRef};
use crate::types::TextureHandle;

#[derive(Debug, Default)]
pub struct TextureResidency {
    /// Materials drawn this frame, in draw order.
    rendered: VecDeque<MaterialRef>,
}

impl TextureResidency {
    pub fn new() -> Self {
        Self::default()
    }

    /// Forget the materials drawn in the previous frame.
    pub fn start_frame(&mut self) {
        self.rendered.clear();
    }

    pub fn rendered(&self) -> impl Iterator<Item = MaterialRef> + '_ {
        self.rendered.iter().copied()
    }

    /// Make every texture of `material` resident, evicting older materials
    /// as needed, and record it as drawn.
    ///
    /// Returns `false` when some textures could not be made resident.
    pub fn ensure_resident(
        &mut self,
        packs: &mut MaterialPacks,
        material: MaterialRef,
        backend: &mut dyn GpuBackend,
    ) -> bool {
        let Some(current) = packs.get(material) else {
            return false;
        };
        if !self.rendered.contains(&material) {
            self.rendered.push_back(material);
        }
        if current.textures_resident {
            return true;
        }

        let textures = current.textures.clone();
        let mut complete = true;
        for &texture in &textures {
            while !backend.make_texture_resident(texture) {
                if !self.evict_oldest(packs, material, &textures, backend) {
                    complete = false;
                    break;
                }
            }
            if !complete {
                break;
            }
        }

        if let Some(current) = packs.get_mut(material) {
            current.textures_resident = complete;
        }
        complete
    }

    /// Release the textures of the oldest drawn material other than `keep`.
    ///
    /// Returns `false` when there is nothing left to evict.
    fn evict_oldest(
        &mut self,
        packs: &mut MaterialPacks,
        keep: MaterialRef,
        keep_textures: &[TextureHandle],
        backend: &mut dyn GpuBackend,
    ) -> bool {
        let Some(position) = self.rendered.iter().position(|&m| m != keep) else {
            return false;
        };
        let Some(victim) = self.rendered.remove(position) else {
            return false;
        };
        let Some(victim) = packs.get_mut(victim) else {
            return true;
        };

        log::trace!(
            "Evicting {} textures of material {:?}/{}",
            victim.textures.len(),
            victim.pack,
            victim.id
        );
        for texture in victim.textures.iter().filter(|t| !keep_textures.contains(t)) {
            backend.make_texture_non_resident(*texture);
        }
        victim.textures_resident = false;
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::dummy::DummyBackend;
    use crate::material::PackKind;
    use crate::material::testing::material_with_counts;

    fn packs_with_textures(textures: &[&[u32]]) -> MaterialPacks {
        let mut packs = MaterialPacks::new();
        for (id, set) in textures.iter().enumerate() {
            let mut material = material_with_counts(PackKind::Opaque, id as u32, 4, 1, 0);
            for &t in *set {
                material.add_texture(TextureHandle::new(t));
            }
            packs.pack_mut(PackKind::Opaque).materials.push(material);
        }
        packs
    }

    fn opaque(id: u32) -> MaterialRef {
        MaterialRef::new(PackKind::Opaque, id)
    }

    #[test]
    fn test_resident_without_pressure() {
        let mut packs = packs_with_textures(&[&[1, 2], &[3]]);
        let mut backend = DummyBackend::new();
        let mut residency = TextureResidency::new();

        assert!(residency.ensure_resident(&mut packs, opaque(0), &mut backend));
        assert!(residency.ensure_resident(&mut packs, opaque(1), &mut backend));
        assert_eq!(backend.resident_textures().len(), 3);
        assert!(packs.get(opaque(0)).unwrap().textures_resident);
    }

    #[test]
    fn test_evicts_oldest_first_and_only_as_needed() {
        let mut packs = packs_with_textures(&[&[1], &[2], &[3], &[4]]);
        let mut backend = DummyBackend::new().with_residency_budget(3);
        let mut residency = TextureResidency::new();

        for id in 0..3 {
            assert!(residency.ensure_resident(&mut packs, opaque(id), &mut backend));
        }
        assert!(residency.ensure_resident(&mut packs, opaque(3), &mut backend));

        // Only the first material was evicted.
        assert!(!packs.get(opaque(0)).unwrap().textures_resident);
        assert!(packs.get(opaque(1)).unwrap().textures_resident);
        assert!(!backend.is_texture_resident(TextureHandle::new(1)));
        assert!(backend.is_texture_resident(TextureHandle::new(2)));
        assert!(backend.is_texture_resident(TextureHandle::new(4)));

        let order: Vec<_> = residency.rendered().map(|m| m.id).collect();
        assert_eq!(order, vec![1, 2, 3]);
    }

    #[test]
    fn test_shared_textures_are_kept() {
        let mut packs = packs_with_textures(&[&[1, 2], &[2, 3]]);
        let mut backend = DummyBackend::new().with_residency_budget(2);
        let mut residency = TextureResidency::new();

        assert!(residency.ensure_resident(&mut packs, opaque(0), &mut backend));
        assert!(residency.ensure_resident(&mut packs, opaque(1), &mut backend));
        assert!(backend.is_texture_resident(TextureHandle::new(2)));
        assert!(backend.is_texture_resident(TextureHandle::new(3)));
        assert!(!backend.is_texture_resident(TextureHandle::new(1)));
    }

    #[test]
    fn test_exhausted_budget_degrades() {
        let mut packs = packs_with_textures(&[&[1, 2, 3]]);
        let mut backend = DummyBackend::new().with_residency_budget(2);
        let mut residency = TextureResidency::new();

        assert!(!residency.ensure_resident(&mut packs, opaque(0), &mut backend));
        assert!(!packs.get(opaque(0)).unwrap().textures_resident);
        assert_eq!(backend.resident_textures().len(), 2);
    }

    #[test]
    fn test_start_frame_clears_history() {
        let mut packs = packs_with_textures(&[&[1]]);
        let mut backend = DummyBackend::new();
        let mut residency = TextureResidency::new();

        residency.ensure_resident(&mut packs, opaque(0), &mut backend);
        residency.start_frame();
        assert_eq!(residency.rendered().count(), 0);
    }
}
