//! Process-scoped module cache
//!
//! One cache instance owns every [`ModuleRecord`] created during an engine
//! run. A module is classified exactly once: whichever group first reaches
//! it pays the analysis, every later group reuses the record. The cache is
//! written at most once per key and read-only afterwards.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use petgraph::algo::{is_cyclic_directed, kosaraju_scc, toposort};
use petgraph::graph::{DiGraph, NodeIndex};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::CoreError;
use crate::marker::DeclaredMarker;
use crate::record::{FeatureClosure, ModuleId, ModuleRecord, ModuleRole};
use crate::types::TypeDecl;

#[derive(Debug, Default)]
pub struct ModuleCache {
    records: Vec<ModuleRecord>,
    by_name: HashMap<String, ModuleId>,
}

impl ModuleCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn get(&self, id: ModuleId) -> &ModuleRecord {
        &self.records[id.index()]
    }

    pub fn lookup(&self, name: &str) -> Option<ModuleId> {
        self.by_name.get(name).copied()
    }

    pub fn records(&self) -> impl Iterator<Item = &ModuleRecord> {
        self.records.iter()
    }

    /// Insert a finalized record. A name collision indicates a broken cache
    /// invariant and is always fatal.
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn insert(
        &mut self,
        name: String,
        last_modified: DateTime<Utc>,
        markers: Vec<DeclaredMarker>,
        references: Vec<ModuleId>,
        exported_types: Vec<TypeDecl>,
        role: ModuleRole,
        closure: Option<FeatureClosure>,
        load_error: Option<String>,
    ) -> Result<ModuleId, CoreError> {
        if self.by_name.contains_key(&name) {
            return Err(CoreError::DuplicateModule(name));
        }
        let id = ModuleId(self.records.len() as u32);
        debug!(module = %name, role = ?role, "caching module record");
        self.by_name.insert(name.clone(), id);
        self.records.push(ModuleRecord::new(
            id,
            name,
            last_modified,
            markers,
            references,
            exported_types,
            role,
            closure,
            load_error,
        ));
        Ok(id)
    }

    /// Diagnostic petgraph view of the cached reference edges.
    pub fn reference_graph(&self) -> DiGraph<String, ()> {
        let mut graph = DiGraph::new();
        let mut indices: HashMap<ModuleId, NodeIndex> = HashMap::new();
        for record in &self.records {
            indices.insert(record.id(), graph.add_node(record.name().to_string()));
        }
        for record in &self.records {
            for &reference in record.references() {
                graph.add_edge(indices[&record.id()], indices[&reference], ());
            }
        }
        graph
    }

    /// Cached module names with every module after the modules it
    /// references. Errors when the cached graph is cyclic.
    pub fn modules_in_reference_order(&self) -> Result<Vec<String>, CoreError> {
        let graph = self.reference_graph();
        if is_cyclic_directed(&graph) {
            let cycle = self
                .reference_cycles()
                .into_iter()
                .next()
                .and_then(|scc| scc.into_iter().next())
                .unwrap_or_default();
            return Err(CoreError::CircularReference(cycle));
        }
        let mut names: Vec<String> = toposort(&graph, None)
            .map_err(|_| CoreError::CircularReference(String::new()))?
            .into_iter()
            .map(|idx| graph[idx].clone())
            .collect();
        // toposort yields referencers first; dependencies-first reads better
        // for diagnostics.
        names.reverse();
        Ok(names)
    }

    /// Strongly connected components with more than one module.
    pub fn reference_cycles(&self) -> Vec<Vec<String>> {
        let graph = self.reference_graph();
        kosaraju_scc(&graph)
            .into_iter()
            .filter(|scc| scc.len() > 1)
            .map(|scc| scc.into_iter().map(|idx| graph[idx].clone()).collect())
            .collect()
    }

    /// Export cached state for diagnostics.
    pub fn to_debug_data(&self) -> ModuleCacheDebugData {
        ModuleCacheDebugData {
            modules: self
                .records
                .iter()
                .map(|record| ModuleDebugEntry {
                    name: record.name().to_string(),
                    role: record.role(),
                    last_modified: record.last_modified(),
                    load_error: record.load_error().map(str::to_string),
                    all_features: self.closure_names(record, |c| &c.all),
                    curated_features: self.closure_names(record, |c| &c.curated),
                })
                .collect(),
            reference_edges: self
                .records
                .iter()
                .flat_map(|record| {
                    record.references().iter().map(|&reference| {
                        (
                            record.name().to_string(),
                            self.get(reference).name().to_string(),
                        )
                    })
                })
                .collect(),
            cycles: self.reference_cycles(),
        }
    }

    fn closure_names(
        &self,
        record: &ModuleRecord,
        select: impl Fn(&FeatureClosure) -> &std::collections::BTreeSet<ModuleId>,
    ) -> Vec<String> {
        record
            .closure()
            .map(|closure| {
                select(closure)
                    .iter()
                    .map(|&id| self.get(id).name().to_string())
                    .collect()
            })
            .unwrap_or_default()
    }
}

/// Serializable snapshot of the cache for diagnostics.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModuleCacheDebugData {
    pub modules: Vec<ModuleDebugEntry>,
    pub reference_edges: Vec<(String, String)>,
    pub cycles: Vec<Vec<String>>,
}

impl ModuleCacheDebugData {
    pub fn to_json_pretty(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    pub fn from_json(text: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(text)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModuleDebugEntry {
    pub name: String,
    pub role: ModuleRole,
    pub last_modified: DateTime<Utc>,
    pub load_error: Option<String>,
    pub all_features: Vec<String>,
    pub curated_features: Vec<String>,
}
