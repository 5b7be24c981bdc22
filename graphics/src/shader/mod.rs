//! WGSL sources of the material system's compute kernels.
//!
//! Every [`ComputeKernel`] maps to an entry point in one of the files under
//! `graphics/shaders/`. Resources live in bind group 0 at the slots listed in
//! [`bindings`]; the parameter block of a dispatch is the uniform at group 1,
//! binding 0, laid out as the matching struct in [`crate::types::gpu`].
//!
//! [`KernelLibrary::load`] parses and validates all of them with naga so a
//! backend only has to translate modules that are known to be well formed.

use std::collections::HashMap;

use crate::error::GraphicsError;
use crate::graph::ComputeKernel;

/// Bind group 0 slots shared by all kernels.
pub mod bindings {
    pub const DESCRIPTORS: u32 = 0;
    pub const SURFACE_COMMANDS: u32 = 1;
    pub const CULLED_COMMANDS: u32 = 2;
    pub const BATCHES: u32 = 3;
    pub const COUNTERS: u32 = 4;
    pub const PORTALS: u32 = 5;
    pub const DEBUG: u32 = 6;
    pub const DEPTH_INPUT: u32 = 7;
    pub const DEPTH_OUTPUT: u32 = 8;
    pub const DEPTH_PYRAMID: u32 = 9;

    /// Graphics pipeline slot of the material uniform buffer.
    pub const MATERIAL_UNIFORMS: u32 = 10;

    /// Group holding the per-dispatch parameter uniform.
    pub const PARAMS_GROUP: u32 = 1;
}

const CLEAR_COUNTERS: &str = include_str!("../../shaders/clear_counters.wgsl");
const DEPTH_REDUCE: &str = include_str!("../../shaders/depth_reduce.wgsl");
const CULL_SURFACES: &str = include_str!("../../shaders/cull_surfaces.wgsl");
const PROCESS_SURFACES: &str = include_str!("../../shaders/process_surfaces.wgsl");

/// Every kernel the material system dispatches.
pub const ALL_KERNELS: [ComputeKernel; 5] = [
    ComputeKernel::ClearCounters,
    ComputeKernel::DepthCopy,
    ComputeKernel::DepthReduce,
    ComputeKernel::CullSurfaces,
    ComputeKernel::ProcessSurfaces,
];

/// Source file and entry point of a kernel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KernelSource {
    pub file: &'static str,
    pub source: &'static str,
    pub entry_point: &'static str,
}

pub fn kernel_source(kernel: ComputeKernel) -> KernelSource {
    let (file, source, entry_point) = match kernel {
        ComputeKernel::ClearCounters => ("clear_counters.wgsl", CLEAR_COUNTERS, "main"),
        ComputeKernel::DepthCopy => ("depth_reduce.wgsl", DEPTH_REDUCE, "copy_depth"),
        ComputeKernel::DepthReduce => ("depth_reduce.wgsl", DEPTH_REDUCE, "reduce_depth"),
        ComputeKernel::CullSurfaces => ("cull_surfaces.wgsl", CULL_SURFACES, "main"),
        ComputeKernel::ProcessSurfaces => ("process_surfaces.wgsl", PROCESS_SURFACES, "main"),
    };
    KernelSource {
        file,
        source,
        entry_point,
    }
}

/// A parsed and validated kernel module.
#[derive(Debug)]
pub struct ValidatedKernel {
    pub kernel: ComputeKernel,
    pub entry_point: &'static str,
    pub module: naga::Module,
    pub info: naga::valid::ModuleInfo,
}

/// Parse and validate the module of `kernel`, checking that its entry point
/// is a compute shader with the workgroup size the host dispatches with.
pub fn validate_kernel(kernel: ComputeKernel) -> Result<ValidatedKernel, GraphicsError> {
    let source = kernel_source(kernel);

    let module = naga::front::wgsl::parse_str(source.source).map_err(|e| {
        GraphicsError::ShaderValidation(format!("{}: WGSL parse error: {e}", source.file))
    })?;

    let mut validator = naga::valid::Validator::new(
        naga::valid::ValidationFlags::all(),
        naga::valid::Capabilities::all(),
    );
    let info = validator.validate(&module).map_err(|e| {
        GraphicsError::ShaderValidation(format!("{}: validation error: {e}", source.file))
    })?;

    let entry = module
        .entry_points
        .iter()
        .find(|ep| ep.name == source.entry_point && ep.stage == naga::ShaderStage::Compute)
        .ok_or_else(|| {
            GraphicsError::ShaderValidation(format!(
                "{}: compute entry point '{}' not found",
                source.file, source.entry_point
            ))
        })?;

    if entry.workgroup_size != kernel.workgroup_size() {
        return Err(GraphicsError::ShaderValidation(format!(
            "{}: entry point '{}' has workgroup size {:?}, expected {:?}",
            source.file,
            source.entry_point,
            entry.workgroup_size,
            kernel.workgroup_size()
        )));
    }

    Ok(ValidatedKernel {
        kernel,
        entry_point: source.entry_point,
        module,
        info,
    })
}

/// All kernels, validated once.
#[derive(Debug)]
pub struct KernelLibrary {
    kernels: HashMap<ComputeKernel, ValidatedKernel>,
}

impl KernelLibrary {
    pub fn load() -> Result<Self, GraphicsError> {
        let mut kernels = HashMap::with_capacity(ALL_KERNELS.len());
        for kernel in ALL_KERNELS {
            kernels.insert(kernel, validate_kernel(kernel)?);
        }
        log::debug!("Validated {} compute kernels", kernels.len());
        Ok(Self { kernels })
    }

    pub fn get(&self, kernel: ComputeKernel) -> Option<&ValidatedKernel> {
        self.kernels.get(&kernel)
    }
}
