//! Transitive module resolution.
//!
//! Breadth-first closure over `RequiredModules`, starting from a seed set.
//! The output keeps first-discovery order with the seeds first, and collects
//! each module's platform search paths after token substitution.

use std::collections::VecDeque;
use std::path::{Path, PathBuf};

use petgraph::graph::{DiGraph, NodeIndex};
use rustc_hash::{FxHashMap, FxHashSet};

use crate::env::Environment;
use crate::error::Result;
use crate::manifest::{self, ModuleManifest};
use crate::path_mapper::PathMapper;
use crate::paths::{self, APP_MODULE_DIR, MODULE_MANIFEST, MODULE_ROOTS};
use crate::record::ResolvedDependencyRecord;

/// A module found on disk during resolution.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedModule {
    pub id: String,
    pub dir: PathBuf,
    pub manifest: ModuleManifest,
}

/// Output of one resolution.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Resolution {
    /// Seed ids, deduplicated, in input order.
    pub seeds: Vec<String>,
    /// Closure in first-discovery order, seeds first.
    pub modules: Vec<String>,
    /// Substituted, deduplicated search paths.
    pub search_paths: Vec<String>,
    /// Modules that were located, in discovery order.
    pub located: Vec<ResolvedModule>,
    /// Ids that could not be located.
    pub missing: Vec<String>,
    /// Manifests read during resolution.
    pub manifests: Vec<PathBuf>,
    /// Dependency cycles, by module id.
    pub cycles: Vec<Vec<String>>,
}

impl Resolution {
    /// Turn the resolution into a dependency record.
    ///
    /// `extra_manifests` are manifests read before resolution, such as the
    /// app manifest that supplied the seeds.
    pub fn into_record(self, extra_manifests: Vec<PathBuf>) -> ResolvedDependencyRecord {
        let mut manifests = extra_manifests;
        manifests.extend(self.manifests);
        ResolvedDependencyRecord {
            seed_modules: self.seeds,
            transitive_modules: self.modules,
            search_paths: self.search_paths,
            build_type: None,
            manifests,
        }
    }
}

/// Resolves module closures against a framework.
pub struct ModuleResolver<'a> {
    env: &'a Environment,
    mapper: PathMapper,
    /// Owning app, consulted for the app-local module.
    app_dir: Option<PathBuf>,
}

impl<'a> ModuleResolver<'a> {
    pub fn new(env: &'a Environment, mapper: PathMapper) -> Self {
        Self {
            env,
            mapper,
            app_dir: None,
        }
    }

    /// Also look for the app-local module of `app_dir`.
    pub fn with_app(mut self, app_dir: impl Into<PathBuf>) -> Self {
        self.app_dir = Some(app_dir.into());
        self
    }

    /// Locate a module directory by id.
    ///
    /// `system_modules/` wins over `modules/`; the app-local module is
    /// consulted last and only for the owning app's module id.
    pub fn locate(&self, id: &str) -> Option<PathBuf> {
        let mut found = MODULE_ROOTS
            .iter()
            .map(|root| self.env.root.join(root).join(id))
            .filter(|dir| dir.join(MODULE_MANIFEST).is_file());

        if let Some(dir) = found.next() {
            if let Some(shadowed) = found.next() {
                tracing::debug!(
                    "Module {id} exists at {} and {}, using the former",
                    dir.display(),
                    shadowed.display()
                );
            }
            return Some(dir);
        }

        let app_dir = self.app_dir.as_deref()?;
        if id == paths::app_module_id(app_dir) {
            let dir = app_dir.join(APP_MODULE_DIR);
            if dir.join(MODULE_MANIFEST).is_file() {
                return Some(dir);
            }
        }
        None
    }

    /// Compute the closure of `seeds`.
    pub fn resolve<S: AsRef<str>>(&self, seeds: &[S]) -> Result<Resolution> {
        let mut resolution = Resolution::default();
        let mut seen: FxHashSet<String> = FxHashSet::default();
        let mut frontier = VecDeque::new();

        for seed in seeds {
            let seed = seed.as_ref();
            if seen.insert(seed.to_string()) {
                resolution.seeds.push(seed.to_string());
                frontier.push_back(seed.to_string());
            }
        }

        let mut edges: Vec<(String, String)> = Vec::new();

        while let Some(id) = frontier.pop_front() {
            resolution.modules.push(id.clone());

            let Some(dir) = self.locate(&id) else {
                tracing::warn!("Module {id} not found, continuing without it");
                resolution.missing.push(id);
                continue;
            };

            let manifest = manifest::load_module(&dir)?;
            resolution.manifests.push(dir.join(MODULE_MANIFEST));

            for dep in &manifest.required_modules {
                edges.push((id.clone(), dep.clone()));
                if seen.insert(dep.clone()) {
                    frontier.push_back(dep.clone());
                }
            }

            let module_path = paths::framework_relative(&self.env.root, &dir);
            for search_path in manifest.search_paths_for(self.env.platform.manifest_key()) {
                let mapped = self.mapper.substitute(search_path, Some(&module_path));
                if !resolution.search_paths.contains(&mapped) {
                    resolution.search_paths.push(mapped);
                }
            }

            tracing::debug!("Resolved {id} at {}", dir.display());
            resolution.located.push(ResolvedModule { id, dir, manifest });
        }

        resolution.cycles = find_cycles(&resolution.modules, &edges);
        for cycle in &resolution.cycles {
            tracing::warn!("Cyclic module dependency: {}", cycle.join(" -> "));
        }

        Ok(resolution)
    }
}

/// Strongly connected components with more than one member, plus
/// self-dependencies.
fn find_cycles(modules: &[String], edges: &[(String, String)]) -> Vec<Vec<String>> {
    use petgraph::algo::kosaraju_scc;

    let mut graph: DiGraph<&str, ()> = DiGraph::new();
    let mut node_indices: FxHashMap<&str, NodeIndex> = FxHashMap::default();
    for id in modules {
        node_indices.insert(id.as_str(), graph.add_node(id.as_str()));
    }
    for (from, to) in edges {
        if let (Some(&a), Some(&b)) = (node_indices.get(from.as_str()), node_indices.get(to.as_str()))
        {
            graph.add_edge(a, b, ());
        }
    }

    let mut cycles: Vec<Vec<String>> = kosaraju_scc(&graph)
        .into_iter()
        .filter(|scc| scc.len() > 1 || graph.contains_edge(scc[0], scc[0]))
        .map(|scc| {
            let mut ids: Vec<String> = scc.iter().map(|&idx| graph[idx].to_string()).collect();
            ids.sort();
            ids
        })
        .collect();
    cycles.sort();
    cycles
}

/// Modules an app asks for: its `RequiredModules`, followed by its
/// app-local module when it has one.
pub fn app_seeds(app_dir: &Path, required: &[String]) -> Vec<String> {
    let mut seeds = required.to_vec();
    if app_dir.join(APP_MODULE_DIR).join(MODULE_MANIFEST).is_file() {
        let id = paths::app_module_id(app_dir);
        if !seeds.contains(&id) {
            seeds.push(id);
        }
    }
    seeds
}
