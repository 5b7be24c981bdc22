//! Texture types and descriptors.

use bitflags::bitflags;

/// Texture formats used by the material system's own images.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum TextureFormat {
    /// Single-channel float, used for the depth pyramid.
    #[default]
    R32Float,
    /// Depth buffer format.
    Depth32Float,
    Rgba8Unorm,
}

impl TextureFormat {
    /// Bytes per texel.
    pub fn block_size(&self) -> u32 {
        4
    }
}

bitflags! {
    /// Usage flags for textures.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct TextureUsage: u32 {
        /// Texture can be sampled in a shader.
        const TEXTURE_BINDING = 1 << 0;
        /// Texture can be written from a compute shader.
        const STORAGE_BINDING = 1 << 1;
        /// Texture can be used as a render attachment.
        const RENDER_ATTACHMENT = 1 << 2;
    }
}

impl Default for TextureUsage {
    fn default() -> Self {
        Self::empty()
    }
}

/// Descriptor for creating a 2D texture.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TextureDescriptor {
    pub label: Option<String>,
    pub width: u32,
    pub height: u32,
    pub mip_level_count: u32,
    pub format: TextureFormat,
    pub usage: TextureUsage,
}

impl TextureDescriptor {
    pub fn new_2d(width: u32, height: u32, format: TextureFormat, usage: TextureUsage) -> Self {
        Self {
            label: None,
            width,
            height,
            mip_level_count: 1,
            format,
            usage,
        }
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    pub fn with_mip_levels(mut self, count: u32) -> Self {
        self.mip_level_count = count;
        self
    }

    /// Dimensions of `level`, each halved per level and clamped to 1.
    pub fn level_size(&self, level: u32) -> (u32, u32) {
        ((self.width >> level).max(1), (self.height >> level).max(1))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_level_size_clamps() {
        let desc = TextureDescriptor::new_2d(
            100,
            20,
            TextureFormat::R32Float,
            TextureUsage::STORAGE_BINDING,
        )
        .with_mip_levels(7);
        assert_eq!(desc.level_size(0), (100, 20));
        assert_eq!(desc.level_size(2), (25, 5));
        assert_eq!(desc.level_size(6), (1, 1));
    }
}
