//! Compute pass graph.
//!
//! Every GPU-side step of the culling pipeline is recorded as a
//! [`ComputePass`]. Dependency edges between passes are the memory barriers:
//! a pass that reads another pass's output depends on it, and the backend
//! executes the compiled order with a barrier on every edge.
//!
//! ```ignore
//! let mut graph = RenderGraph::new();
//! let cull = graph.add_compute_pass(ComputePass::new("cull_view_0".into(), ComputeKernel::CullSurfaces));
//! let compact = graph.add_compute_pass(ComputePass::new("compact_view_0".into(), ComputeKernel::ProcessSurfaces));
//! graph.add_dependency(compact, cull);
//! let compiled = graph.compile()?;
//! backend.execute_graph(&graph, &compiled)?;
//! ```

mod pass;

pub use pass::{Binding, ComputeKernel, ComputePass};

/// Handle to a pass in the graph.
///
/// Only valid within the `RenderGraph` that created it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PassHandle(u32);

impl PassHandle {
    fn new(index: u32) -> Self {
        Self(index)
    }

    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// A set of compute passes and their ordering constraints.
#[derive(Debug, Default)]
pub struct RenderGraph {
    passes: Vec<ComputePass>,
    /// Dependency edges stored as (dependent, dependency) pairs.
    edges: Vec<(PassHandle, PassHandle)>,
}

impl RenderGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a fully configured compute pass.
    pub fn add_compute_pass(&mut self, pass: ComputePass) -> PassHandle {
        let index = self.passes.len() as u32;
        self.passes.push(pass);
        PassHandle::new(index)
    }

    /// The `dependent` pass will execute after the `dependency` pass, with a
    /// storage barrier in between.
    pub fn add_dependency(&mut self, dependent: PassHandle, dependency: PassHandle) {
        assert!(
            dependent.index() < self.passes.len(),
            "Invalid dependent handle"
        );
        assert!(
            dependency.index() < self.passes.len(),
            "Invalid dependency handle"
        );
        assert!(dependent != dependency, "Pass cannot depend on itself");

        let exists = self
            .edges
            .iter()
            .any(|&(d, dep)| d == dependent && dep == dependency);
        if !exists {
            self.edges.push((dependent, dependency));
        }
    }

    pub fn dependencies(&self, handle: PassHandle) -> impl Iterator<Item = PassHandle> + '_ {
        self.edges
            .iter()
            .filter(move |&&(dependent, _)| dependent == handle)
            .map(|&(_, dependency)| dependency)
    }

    pub fn dependency_count(&self, handle: PassHandle) -> usize {
        self.edges
            .iter()
            .filter(|&&(dependent, _)| dependent == handle)
            .count()
    }

    pub fn passes(&self) -> &[ComputePass] {
        &self.passes
    }

    pub fn pass(&self, handle: PassHandle) -> &ComputePass {
        &self.passes[handle.index()]
    }

    pub fn pass_count(&self) -> usize {
        self.passes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.passes.is_empty()
    }

    /// Topologically sort the passes.
    ///
    /// Among passes that are ready at the same time, the one added first runs
    /// first, so a graph recorded in execution order compiles to that order.
    pub fn compile(&self) -> Result<CompiledGraph, GraphError> {
        let count = self.passes.len();
        let mut pending = vec![0usize; count];
        for &(dependent, _) in &self.edges {
            pending[dependent.index()] += 1;
        }

        let mut done = vec![false; count];
        let mut pass_order = Vec::with_capacity(count);

        while pass_order.len() < count {
            let next = (0..count).find(|&i| !done[i] && pending[i] == 0);
            let Some(next) = next else {
                return Err(GraphError::CyclicDependency);
            };

            done[next] = true;
            let handle = PassHandle::new(next as u32);
            for &(dependent, dependency) in &self.edges {
                if dependency == handle {
                    pending[dependent.index()] -= 1;
                }
            }
            pass_order.push(handle);
        }

        let barrier_count = self.edges.len();
        log::trace!("Compiled graph: {count} passes, {barrier_count} barriers");

        Ok(CompiledGraph {
            pass_order,
            barrier_count,
        })
    }

    pub fn clear(&mut self) {
        self.passes.clear();
        self.edges.clear();
    }
}

/// A compiled graph ready for execution.
#[derive(Debug)]
pub struct CompiledGraph {
    pass_order: Vec<PassHandle>,
    barrier_count: usize,
}

impl CompiledGraph {
    pub fn pass_order(&self) -> &[PassHandle] {
        &self.pass_order
    }

    /// Number of memory barriers the graph requires.
    pub fn barrier_count(&self) -> usize {
        self.barrier_count
    }
}

/// Errors that can occur during graph compilation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GraphError {
    /// The graph contains a cycle.
    CyclicDependency,
}

impl std::fmt::Display for GraphError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::CyclicDependency => write!(f, "pass graph contains cyclic dependency"),
        }
    }
}

impl std::error::Error for GraphError {}

#[cfg(test)]
mod tests {
    use super::*;

    fn pass(name: &str) -> ComputePass {
        ComputePass::new(name.into(), ComputeKernel::CullSurfaces)
    }

    #[test]
    fn test_add_compute_pass() {
        let mut graph = RenderGraph::new();
        let handle = graph.add_compute_pass(pass("cull"));
        assert_eq!(graph.pass_count(), 1);
        assert_eq!(graph.pass(handle).name(), "cull");
    }

    #[test]
    fn test_duplicate_dependency_ignored() {
        let mut graph = RenderGraph::new();
        let a = graph.add_compute_pass(pass("a"));
        let b = graph.add_compute_pass(pass("b"));
        graph.add_dependency(b, a);
        graph.add_dependency(b, a);

        assert_eq!(graph.dependency_count(b), 1);
        assert_eq!(graph.dependencies(b).next(), Some(a));
    }

    #[test]
    #[should_panic(expected = "Pass cannot depend on itself")]
    fn test_self_dependency_panics() {
        let mut graph = RenderGraph::new();
        let a = graph.add_compute_pass(pass("a"));
        graph.add_dependency(a, a);
    }

    #[test]
    fn test_compile_respects_dependencies() {
        let mut graph = RenderGraph::new();
        let compact = graph.add_compute_pass(pass("compact"));
        let cull = graph.add_compute_pass(pass("cull"));
        let reduce = graph.add_compute_pass(pass("reduce"));
        graph.add_dependency(compact, cull);
        graph.add_dependency(cull, reduce);

        let compiled = graph.compile().unwrap();
        assert_eq!(compiled.pass_order(), &[reduce, cull, compact]);
        assert_eq!(compiled.barrier_count(), 2);
    }

    #[test]
    fn test_compile_keeps_insertion_order_for_independent_passes() {
        let mut graph = RenderGraph::new();
        let handles: Vec<_> = (0..4)
            .map(|i| graph.add_compute_pass(pass(&format!("view_{i}"))))
            .collect();

        let compiled = graph.compile().unwrap();
        assert_eq!(compiled.pass_order(), handles.as_slice());
    }

    #[test]
    fn test_compile_detects_cycle() {
        let mut graph = RenderGraph::new();
        let a = graph.add_compute_pass(pass("a"));
        let b = graph.add_compute_pass(pass("b"));
        graph.add_dependency(a, b);
        graph.add_dependency(b, a);

        assert_eq!(graph.compile().unwrap_err(), GraphError::CyclicDependency);
    }

    #[test]
    fn test_clear() {
        let mut graph = RenderGraph::new();
        graph.add_compute_pass(pass("a"));
        graph.clear();
        assert!(graph.is_empty());
    }
}
