//! Render state vocabulary shared by shaders, materials and the backend.

use std::ops::RangeInclusive;

use bitflags::bitflags;

bitflags! {
    /// Packed blend, depth and rasterizer state of a shading stage.
    ///
    /// Blend factors, depth function and alpha test are small enumerations
    /// stored in bit fields; use the `*_BITS` masks to extract them.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
    pub struct StateBits: u32 {
        const SRCBLEND_ZERO = 0x1;
        const SRCBLEND_ONE = 0x2;
        const SRCBLEND_DST_COLOR = 0x3;
        const SRCBLEND_ONE_MINUS_DST_COLOR = 0x4;
        const SRCBLEND_SRC_ALPHA = 0x5;
        const SRCBLEND_ONE_MINUS_SRC_ALPHA = 0x6;
        const SRCBLEND_BITS = 0xf;

        const DSTBLEND_ZERO = 0x10;
        const DSTBLEND_ONE = 0x20;
        const DSTBLEND_SRC_COLOR = 0x30;
        const DSTBLEND_ONE_MINUS_SRC_COLOR = 0x40;
        const DSTBLEND_SRC_ALPHA = 0x50;
        const DSTBLEND_ONE_MINUS_SRC_ALPHA = 0x60;
        const DSTBLEND_BITS = 0xf0;

        const DEPTHMASK_TRUE = 0x100;
        const POLYMODE_LINE = 0x1000;
        const DEPTHTEST_DISABLE = 0x1_0000;

        const DEPTHFUNC_LESS = 0x2_0000;
        const DEPTHFUNC_EQUAL = 0x4_0000;
        const DEPTHFUNC_BITS = 0x6_0000;

        const COLORMASK_RED = 0x100_0000;
        const COLORMASK_GREEN = 0x200_0000;
        const COLORMASK_BLUE = 0x400_0000;
        const COLORMASK_ALPHA = 0x800_0000;
        const COLORMASK_BITS = 0xf00_0000;

        const ATEST_GT_0 = 0x1000_0000;
        const ATEST_LT_128 = 0x2000_0000;
        const ATEST_GE_128 = 0x4000_0000;
        const ATEST_BITS = 0x7000_0000;

        /// Bits that select GPU pipeline state. Alpha test is evaluated in
        /// the shader and does not split materials.
        const GPU_STATE_MASK = Self::DEPTHFUNC_BITS.bits()
            | Self::SRCBLEND_BITS.bits()
            | Self::DSTBLEND_BITS.bits()
            | Self::POLYMODE_LINE.bits()
            | Self::DEPTHTEST_DISABLE.bits()
            | Self::COLORMASK_BITS.bits()
            | Self::DEPTHMASK_TRUE.bits();
    }
}

impl Default for StateBits {
    fn default() -> Self {
        Self::empty()
    }
}

impl StateBits {
    /// Only the bits that affect GPU pipeline state.
    pub fn gpu_state(self) -> Self {
        self & Self::GPU_STATE_MASK
    }

    pub fn writes_depth(self) -> bool {
        self.contains(Self::DEPTHMASK_TRUE)
    }

    pub fn is_blended(self) -> bool {
        self.intersects(Self::SRCBLEND_BITS | Self::DSTBLEND_BITS)
    }
}

/// Face culling mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum CullType {
    #[default]
    FrontSided,
    BackSided,
    TwoSided,
}

/// Render order of a shader. Lower values draw first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
#[repr(u8)]
pub enum ShaderSort {
    Bad = 0,
    Portal = 1,
    Depth = 2,
    EnvironmentFog = 3,
    EnvironmentNoFog = 4,
    #[default]
    Opaque = 5,
    Decal = 6,
    SeeThrough = 7,
    Banner = 8,
    Fog = 9,
    Underwater = 10,
    Far = 11,
    Medium = 12,
    Close = 13,
    Blend0 = 14,
    Blend1 = 15,
    AlmostNearest = 16,
    Nearest = 17,
    PostProcess = 18,
}

/// The three material packs, in render order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum PackKind {
    /// Depth pre-pass.
    Depth = 0,
    /// Opaque and fog.
    Opaque = 1,
    /// Everything drawn after opaque geometry.
    Transparent = 2,
}

impl PackKind {
    pub const ALL: [PackKind; 3] = [PackKind::Depth, PackKind::Opaque, PackKind::Transparent];

    pub fn from_sort(sort: ShaderSort) -> Self {
        if sort == ShaderSort::Depth {
            Self::Depth
        } else if (ShaderSort::EnvironmentFog..=ShaderSort::Opaque).contains(&sort) {
            Self::Opaque
        } else {
            Self::Transparent
        }
    }

    pub fn sort_range(self) -> RangeInclusive<ShaderSort> {
        match self {
            Self::Depth => ShaderSort::Depth..=ShaderSort::Depth,
            Self::Opaque => ShaderSort::EnvironmentFog..=ShaderSort::Opaque,
            Self::Transparent => ShaderSort::Decal..=ShaderSort::PostProcess,
        }
    }

    pub fn index(self) -> usize {
        self as usize
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[test]
    fn test_gpu_state_drops_alpha_test() {
        let bits = StateBits::SRCBLEND_SRC_ALPHA
            | StateBits::DSTBLEND_ONE_MINUS_SRC_ALPHA
            | StateBits::ATEST_GE_128
            | StateBits::DEPTHMASK_TRUE;
        let gpu = bits.gpu_state();

        assert!(!gpu.intersects(StateBits::ATEST_BITS));
        assert_eq!(
            gpu,
            StateBits::SRCBLEND_SRC_ALPHA
                | StateBits::DSTBLEND_ONE_MINUS_SRC_ALPHA
                | StateBits::DEPTHMASK_TRUE
        );
        assert!(gpu.is_blended());
        assert!(gpu.writes_depth());
    }

    #[rstest]
    #[case(ShaderSort::Depth, PackKind::Depth)]
    #[case(ShaderSort::EnvironmentFog, PackKind::Opaque)]
    #[case(ShaderSort::Opaque, PackKind::Opaque)]
    #[case(ShaderSort::Decal, PackKind::Transparent)]
    #[case(ShaderSort::Fog, PackKind::Transparent)]
    #[case(ShaderSort::PostProcess, PackKind::Transparent)]
    #[case(ShaderSort::Portal, PackKind::Transparent)]
    fn test_pack_from_sort(#[case] sort: ShaderSort, #[case] expected: PackKind) {
        assert_eq!(PackKind::from_sort(sort), expected);
    }

    #[test]
    fn test_pack_ranges_are_ordered() {
        let ranges: Vec<_> = PackKind::ALL.iter().map(|p| p.sort_range()).collect();
        assert!(ranges[0].end() < ranges[1].start());
        assert!(ranges[1].end() < ranges[2].start());
    }
}
