//! Pass dependency graph and compilation

use std::collections::{BTreeSet, HashMap};

use crate::error::{SceneError, SceneResult};
use crate::render_graph::pass::PassDescriptor;
use crate::scene::{Registry, TextureEntry, TextureId};

/// Dependency of one pass on another through a texture
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PassEdge {
    /// Writer, as a declaration index
    pub from: usize,
    /// Reader, as a declaration index
    pub to: usize,
    pub texture: TextureId,
}

/// Builds the execution order of a scene's passes
pub struct RenderGraph;

impl RenderGraph {
    /// Infer edges from target/input texture names and sort the passes.
    ///
    /// Ties between independent passes go to passes with a render target
    /// first, then to declaration order.
    pub fn build(
        passes: &[PassDescriptor],
        textures: &Registry<TextureEntry>,
    ) -> SceneResult<CompiledGraph> {
        // A texture has at most one writer
        let mut writers: HashMap<TextureId, usize> = HashMap::new();
        for (i, pass) in passes.iter().enumerate() {
            for texture in pass.writes() {
                if let Some(&first) = writers.get(&texture) {
                    return Err(SceneError::ConflictingTarget {
                        texture: textures.name(texture).to_string(),
                        first: passes[first].index,
                        second: pass.index,
                    });
                }
                writers.insert(texture, i);
            }
        }

        // A pass depends on another if it reads a texture that the other writes
        let mut edges = Vec::new();
        let mut dependencies: Vec<BTreeSet<usize>> = vec![BTreeSet::new(); passes.len()];
        for (reader, pass) in passes.iter().enumerate() {
            for texture in pass.reads() {
                let Some(&writer) = writers.get(&texture) else {
                    continue;
                };
                if writer == reader {
                    return Err(SceneError::CyclicDependency {
                        passes: vec![pass.index],
                        texture: textures.name(texture).to_string(),
                    });
                }
                edges.push(PassEdge {
                    from: passes[writer].index,
                    to: pass.index,
                    texture,
                });
                dependencies[reader].insert(writer);
            }
        }

        // Kahn's algorithm with a deterministic ready set
        let priority = |i: usize| (passes[i].draws_to_frame(), i);
        let mut in_degree: Vec<usize> = dependencies.iter().map(BTreeSet::len).collect();
        let mut ready: BTreeSet<(bool, usize)> = (0..passes.len())
            .filter(|&i| in_degree[i] == 0)
            .map(priority)
            .collect();

        let mut sorted = Vec::with_capacity(passes.len());
        while let Some((_, next)) = ready.pop_first() {
            sorted.push(next);
            for (dependent, deps) in dependencies.iter().enumerate() {
                if deps.contains(&next) {
                    in_degree[dependent] -= 1;
                    if in_degree[dependent] == 0 {
                        ready.insert(priority(dependent));
                    }
                }
            }
        }

        if sorted.len() < passes.len() {
            return Err(Self::cycle_error(passes, &dependencies, &in_degree, &edges, textures));
        }

        // Determine resource lifetimes
        let mut resource_lifetimes: HashMap<TextureId, ResourceLifetime> = HashMap::new();
        for (order, &i) in sorted.iter().enumerate() {
            for texture in passes[i].reads().chain(passes[i].writes()) {
                let lifetime = resource_lifetimes
                    .entry(texture)
                    .or_insert(ResourceLifetime {
                        first_use: order,
                        last_use: order,
                    });
                lifetime.last_use = order;
            }
        }

        log::debug!(
            "Pass order: {:?}",
            sorted.iter().map(|&i| passes[i].name.as_str()).collect::<Vec<_>>()
        );

        Ok(CompiledGraph {
            pass_order: sorted,
            edges,
            resource_lifetimes,
        })
    }

    /// Walk predecessors among the unsorted passes until one repeats
    fn cycle_error(
        passes: &[PassDescriptor],
        dependencies: &[BTreeSet<usize>],
        in_degree: &[usize],
        edges: &[PassEdge],
        textures: &Registry<TextureEntry>,
    ) -> SceneError {
        let blocked = |i: usize| in_degree[i] > 0;
        let mut walk: Vec<usize> = Vec::new();
        let mut current = (0..passes.len()).find(|&i| blocked(i));

        while let Some(node) = current {
            if let Some(start) = walk.iter().position(|&n| n == node) {
                let mut cycle = walk.split_off(start);
                cycle.reverse();
                let (from, to) = (cycle[0], cycle[1 % cycle.len()]);
                let texture = edges
                    .iter()
                    .find(|e| e.from == passes[from].index && e.to == passes[to].index)
                    .map(|e| textures.name(e.texture).to_string())
                    .unwrap_or_default();
                return SceneError::CyclicDependency {
                    passes: cycle.iter().map(|&i| passes[i].index).collect(),
                    texture,
                };
            }
            walk.push(node);
            current = dependencies[node].iter().copied().find(|&p| blocked(p));
        }

        SceneError::CyclicDependency {
            passes: walk.iter().map(|&i| passes[i].index).collect(),
            texture: String::new(),
        }
    }
}

/// Resource lifetime in terms of pass execution order
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResourceLifetime {
    pub first_use: usize,
    pub last_use: usize,
}

/// Compiled render graph with execution order and resource lifetimes
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CompiledGraph {
    /// Positions into the pass list, in execution order
    pub pass_order: Vec<usize>,
    pub edges: Vec<PassEdge>,
    pub resource_lifetimes: HashMap<TextureId, ResourceLifetime>,
}

impl CompiledGraph {
    /// Check if a resource is alive at a given execution step
    pub fn is_resource_alive(&self, resource: TextureId, step: usize) -> bool {
        if let Some(lifetime) = self.resource_lifetimes.get(&resource) {
            step >= lifetime.first_use && step <= lifetime.last_use
        } else {
            false
        }
    }
}
