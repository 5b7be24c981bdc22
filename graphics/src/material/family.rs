//! Shading families and the capability interface they are reached through.
//!
//! Shader permutation selection and uniform encoding live outside this
//! crate. The material system only knows the closed set of families and calls
//! the four capabilities of [`ShadingInterface`] for each of them.

use super::pack::Material;
use super::stage::ShadingStage;
use super::surface::DrawSurface;

/// Shader family a stage is rendered with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub enum ShadingFamily {
    #[default]
    Generic3D,
    LightMapping,
    Reflection,
    Skybox,
    Screen,
    HeatHaze,
    Liquid,
    Fog,
    /// Stages that occupy a material slot but draw nothing of their own.
    Nop,
    /// Families that can only be rendered through the legacy path.
    Unsupported,
}

/// Program selected for a material by [`ShadingInterface::process_material`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct ProgramKey {
    pub id: u32,
    /// Family-specific feature bits (deforms, light mode, ...).
    pub features: u32,
}

/// Index range drawn by one stage of a surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct IndexRange {
    pub first_index: u32,
    pub index_count: u32,
}

/// Per-draw state passed to [`ShadingInterface::bind_shader`].
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct BindContext {
    pub view_id: u32,
    /// Flat color of the material debug visualization.
    pub debug_color: Option<[f32; 3]>,
    /// Binding for the wireframe overlay.
    pub wireframe: bool,
}

/// Capabilities every shading family implementation provides.
pub trait ShadingInterface {
    /// Per-instance uniform stride of `program`, in 32-bit words.
    fn padded_stride(&self, family: ShadingFamily, program: ProgramKey) -> u32;

    /// Select the program for a stage of a surface.
    fn process_material(
        &mut self,
        family: ShadingFamily,
        stage: &ShadingStage,
        surface: &DrawSurface,
    ) -> ProgramKey;

    /// Write the uniform payload of one stage instance into its slot.
    fn update_surface_data(
        &mut self,
        family: ShadingFamily,
        payload: &mut [u32],
        material: &Material,
        surface: &DrawSurface,
        stage: usize,
    );

    /// Bind program and uniforms before a material's indirect draw.
    fn bind_shader(&mut self, family: ShadingFamily, material: &Material, context: &BindContext);

    /// Index range a stage of a surface draws.
    fn color_renderer(
        &mut self,
        family: ShadingFamily,
        stage: &ShadingStage,
        surface: &DrawSurface,
    ) -> IndexRange;
}

impl ShadingFamily {
    fn unsupported(self) -> ! {
        unreachable!("shading family {self:?} does not support the material system")
    }

    pub fn process_material(
        self,
        shading: &mut dyn ShadingInterface,
        stage: &ShadingStage,
        surface: &DrawSurface,
    ) -> ProgramKey {
        match self {
            Self::Unsupported => self.unsupported(),
            Self::Nop => ProgramKey::default(),
            _ => shading.process_material(self, stage, surface),
        }
    }

    pub fn padded_stride(self, shading: &dyn ShadingInterface, program: ProgramKey) -> u32 {
        match self {
            Self::Unsupported => self.unsupported(),
            Self::Nop => 1,
            _ => shading.padded_stride(self, program),
        }
    }

    pub fn update_surface_data(
        self,
        shading: &mut dyn ShadingInterface,
        payload: &mut [u32],
        material: &Material,
        surface: &DrawSurface,
        stage: usize,
    ) {
        match self {
            Self::Unsupported => self.unsupported(),
            Self::Nop => {}
            _ => shading.update_surface_data(self, payload, material, surface, stage),
        }
    }

    pub fn bind_shader(
        self,
        shading: &mut dyn ShadingInterface,
        material: &Material,
        context: &BindContext,
    ) {
        match self {
            Self::Unsupported => self.unsupported(),
            Self::Nop => {}
            _ => shading.bind_shader(self, material, context),
        }
    }

    pub fn color_renderer(
        self,
        shading: &mut dyn ShadingInterface,
        stage: &ShadingStage,
        surface: &DrawSurface,
    ) -> IndexRange {
        match self {
            Self::Unsupported => self.unsupported(),
            Self::Nop => surface.geometry.index_range(),
            _ => shading.color_renderer(self, stage, surface),
        }
    }

    /// Families that get the wireframe overlay.
    pub fn supports_wireframe(self) -> bool {
        matches!(self, Self::Generic3D | Self::LightMapping)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wireframe_support() {
        assert!(ShadingFamily::Generic3D.supports_wireframe());
        assert!(ShadingFamily::LightMapping.supports_wireframe());
        assert!(!ShadingFamily::Fog.supports_wireframe());
        assert!(!ShadingFamily::HeatHaze.supports_wireframe());
    }
}
