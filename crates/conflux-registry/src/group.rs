//! Path groups and their analysis
//!
//! A group is the unit of deduplicated analysis for one distinct
//! (path, discovery mode, explicit module set) configuration. Analysis
//! seeds the graph builder with the scanned and explicitly named modules,
//! maintains the head set as seeds resolve, then collects and merges every
//! head's configured type set.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use conflux_core::{
    ConfiguredTypeSet, CoreError, EngineOptions, HeadSet, ModuleCache, ModuleFilter,
    ModuleGraphBuilder, ModuleLoader, ModuleRole, TypeSetCollector,
};

use crate::error::RegistryError;
use crate::signature::Signature;

/// One external path configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupConfig {
    path: PathBuf,
    discover_all: bool,
    explicit_modules: BTreeSet<String>,
}

impl GroupConfig {
    /// Scan the path for every loadable module.
    pub fn discover(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            discover_all: true,
            explicit_modules: BTreeSet::new(),
        }
    }

    /// Load exactly the named modules from the path.
    pub fn explicit(
        path: impl Into<PathBuf>,
        names: impl IntoIterator<Item = impl Into<String>>,
    ) -> Self {
        Self {
            path: path.into(),
            discover_all: false,
            explicit_modules: names.into_iter().map(Into::into).collect(),
        }
    }

    /// Add an explicitly requested (forced) module name.
    pub fn with_module(mut self, name: impl Into<String>) -> Self {
        self.explicit_modules.insert(name.into());
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn discover_all(&self) -> bool {
        self.discover_all
    }

    pub fn explicit_modules(&self) -> &BTreeSet<String> {
        &self.explicit_modules
    }

    pub(crate) fn key(&self) -> GroupKey {
        GroupKey {
            path: self.path.clone(),
            discover_all: self.discover_all,
            explicit_modules: self.explicit_modules.clone(),
        }
    }
}

/// Structural equivalence key of a configuration. Explicit names compare
/// as a set, not a sequence.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub(crate) struct GroupKey {
    path: PathBuf,
    discover_all: bool,
    explicit_modules: BTreeSet<String>,
}

/// One analyzed group: the configurations sharing it, its head modules,
/// and its outcome.
#[derive(Debug)]
pub struct Group {
    configs: Vec<GroupConfig>,
    heads: HeadSet,
    provenance: Vec<String>,
    signature: Option<Signature>,
    result: Option<ConfiguredTypeSet>,
    error: Option<RegistryError>,
    synthetic: bool,
}

impl Group {
    /// Every configuration sharing this analysis, registration order.
    pub fn configs(&self) -> &[GroupConfig] {
        &self.configs
    }

    pub fn heads(&self) -> &HeadSet {
        &self.heads
    }

    /// "N types from feature 'X'" lines, one per head.
    pub fn provenance(&self) -> &[String] {
        &self.provenance
    }

    /// Present once the group's module set closed successfully.
    pub fn signature(&self) -> Option<Signature> {
        self.signature
    }

    /// The collected type set; absent when analysis failed.
    pub fn result(&self) -> Option<&ConfiguredTypeSet> {
        self.result.as_ref()
    }

    pub fn error(&self) -> Option<&RegistryError> {
        self.error.as_ref()
    }

    pub fn succeeded(&self) -> bool {
        self.result.is_some()
    }

    /// True for the config-less unified group synthesized across groups;
    /// it exists only for inspection and is never an execution target.
    pub fn is_synthetic(&self) -> bool {
        self.synthetic
    }

    pub(crate) fn share(&mut self, config: GroupConfig) {
        self.configs.push(config);
    }

    pub(crate) fn synthetic_union(result: ConfiguredTypeSet) -> Self {
        Self {
            configs: Vec::new(),
            heads: HeadSet::new(),
            provenance: Vec::new(),
            signature: None,
            result: Some(result),
            error: None,
            synthetic: true,
        }
    }

    pub(crate) fn analyze(
        config: GroupConfig,
        cache: &mut ModuleCache,
        loader: &dyn ModuleLoader,
        filter: &dyn ModuleFilter,
        options: &EngineOptions,
    ) -> Self {
        let group_name = config.path.display().to_string();
        info!(group = %group_name, "analyzing module group");

        // Seed order: scanned modules first, explicit (forced) names after;
        // a name in both is forced.
        let mut seeds: IndexMap<String, bool> = IndexMap::new();
        let mut failure: Option<RegistryError> = None;
        if config.discover_all {
            match loader.scan(&config.path) {
                Ok(names) => {
                    for name in names {
                        seeds.entry(name).or_insert(false);
                    }
                }
                Err(e) => {
                    failure = Some(RegistryError::Analysis {
                        group: group_name.clone(),
                        source: CoreError::LoadFailed {
                            name: group_name.clone(),
                            reason: e.to_string(),
                        },
                    });
                }
            }
        }
        for name in &config.explicit_modules {
            seeds.insert(name.clone(), true);
        }

        let mut heads = HeadSet::new();
        if failure.is_none() {
            let mut builder = ModuleGraphBuilder::new(cache, loader, filter, options, &config.path);
            for (name, &forced) in &seeds {
                match builder.resolve(name) {
                    Ok(id) => {
                        let record = builder.record(id);
                        if let Some(reason) = record.load_error() {
                            if forced {
                                failure = Some(RegistryError::ExplicitModuleMissing {
                                    group: group_name.clone(),
                                    module: name.clone(),
                                    reason: reason.to_string(),
                                });
                                break;
                            }
                            warn!(
                                group = %group_name,
                                module = %name,
                                reason,
                                "skipping unloadable module"
                            );
                            continue;
                        }
                        match record.role() {
                            ModuleRole::Engine if forced => {
                                failure = Some(RegistryError::ExplicitEngineModule {
                                    group: group_name.clone(),
                                    module: name.clone(),
                                });
                                break;
                            }
                            ModuleRole::Feature => heads.on_feature(builder.cache(), id, forced),
                            role => debug!(
                                group = %group_name,
                                module = %name,
                                ?role,
                                "seed contributes no head"
                            ),
                        }
                    }
                    Err(CoreError::LoadFailed { name: failed, reason }) if !forced => {
                        warn!(
                            group = %group_name,
                            module = %failed,
                            reason = %reason,
                            "skipping unloadable module"
                        );
                        if let Err(e) = builder.mark_load_failed(&failed, &reason) {
                            failure = Some(RegistryError::Analysis {
                                group: group_name.clone(),
                                source: e,
                            });
                            break;
                        }
                    }
                    Err(CoreError::LoadFailed { name: failed, reason }) => {
                        failure = Some(RegistryError::ExplicitModuleMissing {
                            group: group_name.clone(),
                            module: failed,
                            reason,
                        });
                        break;
                    }
                    Err(e) => {
                        failure = Some(RegistryError::Analysis {
                            group: group_name.clone(),
                            source: e,
                        });
                        break;
                    }
                }
            }
        }

        let mut result = ConfiguredTypeSet::new();
        let mut provenance = Vec::new();
        if failure.is_none() {
            let collector = TypeSetCollector::new(cache);
            for (name, entry) in heads.iter() {
                match collector.collect(entry.id) {
                    Ok(set) => {
                        provenance.push(format!("{} types from feature '{}'", set.len(), name));
                        result.merge(&set);
                    }
                    Err(e) => {
                        failure = Some(RegistryError::Analysis {
                            group: group_name.clone(),
                            source: e,
                        });
                        break;
                    }
                }
            }
        }

        match failure {
            Some(error) => {
                warn!(group = %group_name, error = %error, "module group analysis failed");
                Self {
                    configs: vec![config],
                    heads,
                    provenance: Vec::new(),
                    signature: None,
                    result: None,
                    error: Some(error),
                    synthetic: false,
                }
            }
            None => {
                let signature = Signature::compute(
                    &config.path,
                    heads
                        .iter()
                        .map(|(name, entry)| (name, cache.get(entry.id).last_modified())),
                );
                info!(
                    group = %group_name,
                    heads = heads.len(),
                    types = result.len(),
                    signature = %signature,
                    "module group analysis complete"
                );
                Self {
                    configs: vec![config],
                    heads,
                    provenance,
                    signature: Some(signature),
                    result: Some(result),
                    error: None,
                    synthetic: false,
                }
            }
        }
    }
}
