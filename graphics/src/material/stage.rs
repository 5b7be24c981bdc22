//! Shading stages and their per-frame dynamics.

use bitflags::bitflags;

use super::family::ShadingFamily;
use super::state::StateBits;
use crate::types::TextureHandle;

/// Source of a stage's rgb color.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ColorGen {
    #[default]
    Identity,
    IdentityLighting,
    Vertex,
    OneMinusVertex,
    Const,
    Entity,
    OneMinusEntity,
    Waveform,
    CustomRgb,
    CustomRgbs,
}

impl ColorGen {
    fn varies_per_frame(self) -> bool {
        matches!(self, Self::Waveform | Self::CustomRgb | Self::CustomRgbs)
    }
}

/// Source of a stage's alpha.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum AlphaGen {
    #[default]
    Identity,
    Vertex,
    OneMinusVertex,
    Const,
    Entity,
    OneMinusEntity,
    Waveform,
    Custom,
}

impl AlphaGen {
    fn varies_per_frame(self) -> bool {
        matches!(self, Self::Waveform | Self::Custom)
    }
}

/// Texture coordinate modifier.
///
/// `expression` marks modifiers whose parameters come from a shader
/// expression rather than constants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TexMod {
    Scale,
    Transform,
    Turbulent,
    EntityTranslate,
    Scroll,
    /// `animated` when driven by a wave function.
    Stretch { animated: bool },
    Rotate,
    Scroll2 { expression: bool },
    Scale2 { expression: bool },
    CenterScale { expression: bool },
    Shear { expression: bool },
    Rotate2 { expression: bool },
}

impl TexMod {
    /// Whether the texture matrix produced by this modifier changes over time.
    pub fn is_time_varying(self) -> bool {
        match self {
            Self::Scale | Self::Transform => false,
            Self::Turbulent | Self::EntityTranslate | Self::Scroll | Self::Rotate => true,
            Self::Stretch { animated } => animated,
            Self::Scroll2 { expression }
            | Self::Scale2 { expression }
            | Self::CenterScale { expression }
            | Self::Shear { expression }
            | Self::Rotate2 { expression } => expression,
        }
    }
}

/// Images, animation and texture matrix of one texture slot.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TextureBundle {
    /// Animation frames; more than one means the image changes over time.
    pub images: Vec<TextureHandle>,
    /// Video source, refreshed every frame.
    pub video_map: Option<TextureHandle>,
    pub tex_mods: Vec<TexMod>,
}

impl TextureBundle {
    pub fn new(image: TextureHandle) -> Self {
        Self {
            images: vec![image],
            ..Self::default()
        }
    }

    pub fn with_tex_mod(mut self, tex_mod: TexMod) -> Self {
        self.tex_mods.push(tex_mod);
        self
    }

    fn textures(&self) -> impl Iterator<Item = TextureHandle> + '_ {
        self.images.iter().copied().chain(self.video_map)
    }
}

bitflags! {
    /// Stage parameters driven by shader expressions.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct StageExpressions: u32 {
        const CONDITION = 1 << 0;
        const ALPHA = 1 << 1;
        const ALPHA_TEST = 1 << 2;
        const RGB = 1 << 3;
        const RED = 1 << 4;
        const GREEN = 1 << 5;
        const BLUE = 1 << 6;
        const DEFORM_MAGNITUDE = 1 << 7;
        const DEPTH_SCALE = 1 << 8;
        const FOG_DENSITY = 1 << 9;
        const FRESNEL_POWER = 1 << 10;
        const FRESNEL_SCALE = 1 << 11;
        const FRESNEL_BIAS = 1 << 12;
        const NORMAL_INTENSITY = 1 << 13;
        const REFRACTION_INDEX = 1 << 14;
    }
}

impl Default for StageExpressions {
    fn default() -> Self {
        Self::empty()
    }
}

/// One pass of a shader.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ShadingStage {
    pub family: ShadingFamily,
    pub state_bits: StateBits,
    pub rgb_gen: ColorGen,
    pub alpha_gen: AlphaGen,
    pub bundles: Vec<TextureBundle>,
    pub expressions: StageExpressions,
    /// Soft particles: fades against the depth pre-pass.
    pub depth_fade: bool,
}

impl ShadingStage {
    pub fn new(family: ShadingFamily, state_bits: StateBits) -> Self {
        Self {
            family,
            state_bits,
            ..Self::default()
        }
    }

    pub fn with_bundle(mut self, bundle: TextureBundle) -> Self {
        self.bundles.push(bundle);
        self
    }

    pub fn with_rgb_gen(mut self, rgb_gen: ColorGen) -> Self {
        self.rgb_gen = rgb_gen;
        self
    }

    pub fn with_alpha_gen(mut self, alpha_gen: AlphaGen) -> Self {
        self.alpha_gen = alpha_gen;
        self
    }

    pub fn with_expressions(mut self, expressions: StageExpressions) -> Self {
        self.expressions = expressions;
        self
    }

    pub fn with_depth_fade(mut self) -> Self {
        self.depth_fade = true;
        self
    }

    /// Every texture any bundle of the stage can sample.
    pub fn textures(&self) -> impl Iterator<Item = TextureHandle> + '_ {
        self.bundles.iter().flat_map(TextureBundle::textures)
    }
}

/// What part of a stage's uniform data changes every frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct StageDynamics {
    pub color: bool,
    pub tex_matrices: bool,
    pub textures: bool,
    /// The stage needs a slot in the dynamic region.
    pub dynamic: bool,
}

/// Classify which parts of `stage` vary per frame.
pub fn compute_dynamics(stage: &ShadingStage) -> StageDynamics {
    let color = stage.rgb_gen.varies_per_frame() || stage.alpha_gen.varies_per_frame();

    let tex_matrices = stage
        .bundles
        .iter()
        .flat_map(|bundle| bundle.tex_mods.iter())
        .any(|tex_mod| tex_mod.is_time_varying());

    let textures = stage
        .bundles
        .iter()
        .any(|bundle| bundle.video_map.is_some() || bundle.images.len() > 1);

    let dynamic = !stage.expressions.is_empty() || color || tex_matrices || textures;

    StageDynamics {
        color,
        tex_matrices,
        textures,
        dynamic,
    }
}
