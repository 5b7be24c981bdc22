//! Layout of the material uniform buffer.
//!
//! All static regions come first, then all dynamic regions, so the dynamic
//! part can be rewritten as one contiguous range every frame. Each material's
//! region starts at a multiple of its own stride, letting shaders address an
//! instance as `materials[base_instance]` with their own struct type.
//!
//! ```text
//! | static m0 | pad | static m1 | ... | dynamic m0 | pad | dynamic m1 | ... |
//! 0                                   ^ dynamic_offset                     total
//! ```

use super::pack::{Material, MaterialPacks};
use crate::error::GraphicsError;

/// Which region a slot lives in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Region {
    Static,
    Dynamic,
}

/// Handle to one stage instance's uniform payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct UniformSlot {
    region: Region,
    /// Slot index in units of `stride`, counted from the buffer start.
    index: u32,
    stride: u32,
}

impl UniformSlot {
    pub fn region(&self) -> Region {
        self.region
    }

    /// Index shaders use to find the payload; stored as the draw's base instance.
    pub fn index(&self) -> u32 {
        self.index
    }

    pub fn stride(&self) -> u32 {
        self.stride
    }

    pub fn word_offset(&self) -> usize {
        self.index as usize * self.stride as usize
    }
}

/// Sizes of the planned buffer, in 32-bit words.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct UniformLayout {
    pub total_words: u32,
    pub dynamic_offset: u32,
    pub dynamic_size: u32,
}

impl UniformLayout {
    pub fn size_bytes(&self) -> u64 {
        self.total_words as u64 * 4
    }
}

fn align_up(offset: u32, stride: u32) -> u32 {
    offset.div_ceil(stride) * stride
}

/// Lay out `count` instances of `stride` words at the running `offset`.
///
/// Empty regions add no padding but still get an aligned base.
fn place(offset: &mut u32, stride: u32, count: u32) -> u32 {
    let base = align_up(*offset, stride);
    if count > 0 {
        *offset = base + stride * count;
    }
    base
}

/// Assign static and dynamic base offsets to every material.
pub fn plan_uniform_layout(packs: &mut MaterialPacks) -> Result<UniformLayout, GraphicsError> {
    if let Some(material) = packs.materials().find(|m| m.padded_stride == 0) {
        return Err(GraphicsError::InvalidParameter(format!(
            "material {:?}/{} has a zero uniform stride",
            material.pack, material.id
        )));
    }

    let mut offset = 0;
    for material in packs.materials_mut() {
        material.static_offset = place(
            &mut offset,
            material.padded_stride,
            material.total_static_count,
        );
    }

    let mut dynamic_offset = None;
    for material in packs.materials_mut() {
        material.dynamic_offset = place(
            &mut offset,
            material.padded_stride,
            material.total_dynamic_count,
        );
        if material.total_dynamic_count > 0 && dynamic_offset.is_none() {
            dynamic_offset = Some(material.dynamic_offset);
        }
    }

    let dynamic_offset = dynamic_offset.unwrap_or(offset);
    let layout = UniformLayout {
        total_words: offset,
        dynamic_offset,
        dynamic_size: offset - dynamic_offset,
    };

    log::debug!(
        "Uniform layout: {} words, dynamic region {}..{}",
        layout.total_words,
        layout.dynamic_offset,
        layout.total_words
    );
    Ok(layout)
}

/// Host copy of the material uniform buffer, addressed through [`UniformSlot`]s.
#[derive(Debug, Clone, Default)]
pub struct UniformArena {
    words: Vec<u32>,
    layout: UniformLayout,
}

impl UniformArena {
    /// Zero-initialized arena for `layout`.
    pub fn new(layout: UniformLayout) -> Self {
        Self {
            words: vec![0; layout.total_words as usize],
            layout,
        }
    }

    pub fn layout(&self) -> UniformLayout {
        self.layout
    }

    /// Take the next static or dynamic slot of `material`.
    pub fn allocate(
        &self,
        material: &mut Material,
        dynamic: bool,
    ) -> Result<UniformSlot, GraphicsError> {
        let stride = material.padded_stride;
        let (region, base, current, total) = if dynamic {
            (
                Region::Dynamic,
                material.dynamic_offset,
                &mut material.current_dynamic_count,
                material.total_dynamic_count,
            )
        } else {
            (
                Region::Static,
                material.static_offset,
                &mut material.current_static_count,
                material.total_static_count,
            )
        };

        if *current >= total {
            return Err(GraphicsError::CapacityExceeded {
                what: "uniform slots",
                requested: *current as usize + 1,
                limit: total as usize,
            });
        }

        let word = base + *current * stride;
        *current += 1;

        Ok(UniformSlot {
            region,
            index: word / stride,
            stride,
        })
    }

    fn range(&self, slot: UniformSlot) -> Result<std::ops::Range<usize>, GraphicsError> {
        let start = slot.word_offset();
        let end = start + slot.stride as usize;
        let dynamic_start = self.layout.dynamic_offset as usize;

        let in_region = match slot.region {
            Region::Static => end <= dynamic_start,
            Region::Dynamic => start >= dynamic_start,
        };
        if !in_region || end > self.words.len() {
            return Err(GraphicsError::InvalidHandle(format!(
                "uniform slot {slot:?} outside its region"
            )));
        }
        Ok(start..end)
    }

    pub fn slot(&self, slot: UniformSlot) -> Result<&[u32], GraphicsError> {
        let range = self.range(slot)?;
        Ok(&self.words[range])
    }

    pub fn slot_mut(&mut self, slot: UniformSlot) -> Result<&mut [u32], GraphicsError> {
        let range = self.range(slot)?;
        Ok(&mut self.words[range])
    }

    /// Clear the dynamic region before it is rewritten.
    pub fn zero_dynamic(&mut self) {
        let start = self.layout.dynamic_offset as usize;
        self.words[start..].fill(0);
    }

    pub fn as_bytes(&self) -> &[u8] {
        bytemuck::cast_slice(&self.words)
    }

    pub fn dynamic_bytes(&self) -> &[u8] {
        bytemuck::cast_slice(&self.words[self.layout.dynamic_offset as usize..])
    }
}
