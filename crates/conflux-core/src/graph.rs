//! Recursive module-graph resolution and classification
//!
//! Given a root name, [`ModuleGraphBuilder`] loads and memoizes every
//! transitively referenced module, derives each one's terminal
//! [`ModuleRole`] from its markers and its references' roles, and builds the
//! feature closures. Resolution is idempotent: a module already cached is
//! returned untouched, so exclude directives always see a stable closure.

use std::collections::{BTreeSet, HashSet};
use std::path::Path;

use chrono::DateTime;
use tracing::{debug, warn};

use crate::cache::ModuleCache;
use crate::error::CoreError;
use crate::loader::ModuleLoader;
use crate::marker::DeclaredMarker;
use crate::record::{FeatureClosure, ModuleId, ModuleRecord, ModuleRole};

/// Engine-level knobs shared by every group of a run.
#[derive(Debug, Clone)]
pub struct EngineOptions {
    /// Name prefixes classified `SystemSkipped` without loading.
    pub system_prefixes: Vec<String>,
}

impl Default for EngineOptions {
    fn default() -> Self {
        Self {
            system_prefixes: vec!["system.".to_string(), "runtime.".to_string()],
        }
    }
}

impl EngineOptions {
    fn match_system_prefix(&self, name: &str) -> Option<&str> {
        self.system_prefixes
            .iter()
            .find(|prefix| name.starts_with(prefix.as_str()))
            .map(String::as_str)
    }
}

/// Caller-supplied global exclusion predicate, consulted once per newly
/// discovered module before any reference walking.
pub trait ModuleFilter {
    fn is_globally_excluded(&self, module: &str) -> bool;
}

/// Filter that excludes nothing.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoExclusions;

impl ModuleFilter for NoExclusions {
    fn is_globally_excluded(&self, _module: &str) -> bool {
        false
    }
}

/// Filter over a fixed name set.
#[derive(Debug, Clone, Default)]
pub struct ExcludedNames(pub BTreeSet<String>);

impl ExcludedNames {
    pub fn new(names: impl IntoIterator<Item = impl Into<String>>) -> Self {
        Self(names.into_iter().map(Into::into).collect())
    }
}

impl ModuleFilter for ExcludedNames {
    fn is_globally_excluded(&self, module: &str) -> bool {
        self.0.contains(module)
    }
}

/// Adapter for closure-based filters.
#[derive(Debug, Clone, Copy)]
pub struct FilterFn<F>(pub F);

impl<F: Fn(&str) -> bool> ModuleFilter for FilterFn<F> {
    fn is_globally_excluded(&self, module: &str) -> bool {
        (self.0)(module)
    }
}

/// How one exclude-feature directive landed. Only `Applied` changes the
/// curated closure; every other outcome is a logged no-op.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExcludeOutcome {
    Applied,
    /// No module with that name is known.
    UnknownReference,
    /// The named module exists but is not a feature.
    TargetNotFeature,
    /// The named feature is absent from the module's full closure.
    NeverReferenced,
    /// An intermediate reference already removed the named feature.
    AlreadyExcluded,
}

pub struct ModuleGraphBuilder<'a> {
    cache: &'a mut ModuleCache,
    loader: &'a dyn ModuleLoader,
    filter: &'a dyn ModuleFilter,
    options: &'a EngineOptions,
    path: &'a Path,
    in_progress: HashSet<String>,
    discovered: Vec<ModuleId>,
}

impl<'a> ModuleGraphBuilder<'a> {
    pub fn new(
        cache: &'a mut ModuleCache,
        loader: &'a dyn ModuleLoader,
        filter: &'a dyn ModuleFilter,
        options: &'a EngineOptions,
        path: &'a Path,
    ) -> Self {
        Self {
            cache,
            loader,
            filter,
            options,
            path,
            in_progress: HashSet::new(),
            discovered: Vec::new(),
        }
    }

    pub fn cache(&self) -> &ModuleCache {
        self.cache
    }

    pub fn record(&self, id: ModuleId) -> &ModuleRecord {
        self.cache.get(id)
    }

    /// Records created by this builder, in discovery order.
    pub fn discovered(&self) -> &[ModuleId] {
        &self.discovered
    }

    /// Resolve a module by name, classifying it and everything it
    /// transitively references. Idempotent per name.
    pub fn resolve(&mut self, name: &str) -> Result<ModuleId, CoreError> {
        if let Some(id) = self.cache.lookup(name) {
            return Ok(id);
        }
        if !self.in_progress.insert(name.to_string()) {
            return Err(CoreError::CircularReference(name.to_string()));
        }
        let result = self.resolve_fresh(name);
        self.in_progress.remove(name);
        result
    }

    /// Record a tolerated load failure as an `AutoSkipped` wall so the
    /// module is never re-attempted.
    pub fn mark_load_failed(&mut self, name: &str, reason: &str) -> Result<ModuleId, CoreError> {
        if let Some(id) = self.cache.lookup(name) {
            return Ok(id);
        }
        debug!(module = name, reason, "caching load failure");
        let id = self.cache.insert(
            name.to_string(),
            DateTime::UNIX_EPOCH,
            Vec::new(),
            Vec::new(),
            Vec::new(),
            ModuleRole::AutoSkipped,
            None,
            Some(reason.to_string()),
        )?;
        self.discovered.push(id);
        Ok(id)
    }

    fn resolve_fresh(&mut self, name: &str) -> Result<ModuleId, CoreError> {
        if let Some(prefix) = self.options.match_system_prefix(name) {
            debug!(module = name, prefix, "system module skipped");
            let id = self.cache.insert(
                name.to_string(),
                DateTime::UNIX_EPOCH,
                Vec::new(),
                Vec::new(),
                Vec::new(),
                ModuleRole::SystemSkipped,
                None,
                None,
            )?;
            self.discovered.push(id);
            return Ok(id);
        }

        let source = self
            .loader
            .load(self.path, name)
            .map_err(|e| CoreError::LoadFailed {
                name: name.to_string(),
                reason: e.to_string(),
            })?;
        if source.name != name {
            return Err(CoreError::LoadFailed {
                name: name.to_string(),
                reason: format!("loader returned module '{}'", source.name),
            });
        }

        if self.filter.is_globally_excluded(name) {
            let must_analyze = source.markers.iter().any(|m| {
                matches!(
                    m,
                    DeclaredMarker::EngineDependency | DeclaredMarker::FeatureDefiner
                )
            });
            if must_analyze {
                warn!(
                    module = name,
                    "exclusion ignored: engine- and definer-marked modules must be analyzed"
                );
            } else {
                debug!(module = name, "module excluded by caller predicate");
                let id = self.cache.insert(
                    source.name,
                    source.last_modified,
                    source.markers,
                    Vec::new(),
                    source.exported_types,
                    ModuleRole::Excluded,
                    None,
                    None,
                )?;
                self.discovered.push(id);
                return Ok(id);
            }
        }

        let mut references = Vec::with_capacity(source.references.len());
        for reference in &source.references {
            references.push(self.resolve_reference(reference)?);
        }

        let declares = |marker: &DeclaredMarker| source.markers.contains(marker);
        let mut referenced_engine = false;
        let mut referenced_feature = false;
        for &id in &references {
            match self.cache.get(id).role() {
                ModuleRole::Engine => referenced_engine = true,
                ModuleRole::Feature | ModuleRole::FeatureDefiner => referenced_feature = true,
                _ => {}
            }
        }

        let declares_feature = declares(&DeclaredMarker::Feature);
        let role = if declares(&DeclaredMarker::EngineDependency) || referenced_engine {
            if declares_feature || referenced_feature {
                debug!(module = name, "engine side wins; feature status dropped");
            }
            ModuleRole::Engine
        } else if declares_feature {
            ModuleRole::Feature
        } else if declares(&DeclaredMarker::FeatureDefiner) {
            ModuleRole::FeatureDefiner
        } else if referenced_feature {
            ModuleRole::Feature
        } else {
            ModuleRole::None
        };

        let closure = if role.is_feature() {
            Some(self.build_closure(name, &source.markers, &references))
        } else {
            self.warn_ignored_directives(name, &source.markers);
            None
        };

        let id = self.cache.insert(
            source.name,
            source.last_modified,
            source.markers,
            references,
            source.exported_types,
            role,
            closure,
            None,
        )?;
        self.discovered.push(id);
        debug!(module = name, role = ?role, "module classified");
        Ok(id)
    }

    fn resolve_reference(&mut self, name: &str) -> Result<ModuleId, CoreError> {
        match self.resolve(name) {
            Ok(id) => Ok(id),
            Err(CoreError::LoadFailed { name, reason }) => {
                warn!(
                    module = %name,
                    reason = %reason,
                    "referenced module failed to load; skipping"
                );
                self.mark_load_failed(&name, &reason)
            }
            Err(other) => Err(other),
        }
    }

    /// Closure construction for a feature module, applying its own
    /// exclude-feature directives against the curated set.
    fn build_closure(
        &self,
        module: &str,
        markers: &[DeclaredMarker],
        references: &[ModuleId],
    ) -> FeatureClosure {
        let feature_refs: Vec<ModuleId> = references
            .iter()
            .copied()
            .filter(|&r| self.cache.get(r).role().is_feature())
            .collect();

        let mut all = BTreeSet::new();
        for &d in &feature_refs {
            all.insert(d);
            if let Some(closure) = self.cache.get(d).closure() {
                all.extend(closure.all.iter().copied());
            }
        }

        // Curated union before this module's own directives apply; exclusion
        // categorization compares against it.
        let mut curated_base = BTreeSet::new();
        for &d in &feature_refs {
            if self.cache.get(d).role() == ModuleRole::Excluded {
                continue;
            }
            curated_base.insert(d);
            if let Some(closure) = self.cache.get(d).closure() {
                curated_base.extend(closure.curated.iter().copied());
            }
        }

        let mut blocked: BTreeSet<&str> = BTreeSet::new();
        for marker in markers {
            let DeclaredMarker::ExcludeFeature { name: target } = marker else {
                continue;
            };
            match self.categorize_exclude(target, &all, &curated_base) {
                ExcludeOutcome::Applied => {
                    debug!(module, target = target.as_str(), "excluded referenced feature");
                    blocked.insert(target.as_str());
                }
                ExcludeOutcome::UnknownReference => warn!(
                    module,
                    target = target.as_str(),
                    "exclude-feature is a no-op: no module with that name is known"
                ),
                ExcludeOutcome::TargetNotFeature => warn!(
                    module,
                    target = target.as_str(),
                    "exclude-feature is a no-op: named module is not a feature"
                ),
                ExcludeOutcome::NeverReferenced => warn!(
                    module,
                    target = target.as_str(),
                    "exclude-feature is a no-op: named feature is never referenced"
                ),
                ExcludeOutcome::AlreadyExcluded => warn!(
                    module,
                    target = target.as_str(),
                    "exclude-feature is a no-op: already excluded by an intermediate reference"
                ),
            }
        }

        if blocked.is_empty() {
            return FeatureClosure {
                all,
                curated: curated_base,
            };
        }

        // Rebuild the curated union without the blocked contributions, then
        // drop blocked members that arrived transitively.
        let mut curated = BTreeSet::new();
        for &d in &feature_refs {
            let record = self.cache.get(d);
            if record.role() == ModuleRole::Excluded || blocked.contains(record.name()) {
                continue;
            }
            curated.insert(d);
            if let Some(closure) = record.closure() {
                curated.extend(closure.curated.iter().copied());
            }
        }
        curated.retain(|&id| !blocked.contains(self.cache.get(id).name()));

        FeatureClosure { all, curated }
    }

    fn categorize_exclude(
        &self,
        target: &str,
        all: &BTreeSet<ModuleId>,
        curated_base: &BTreeSet<ModuleId>,
    ) -> ExcludeOutcome {
        let Some(id) = self.cache.lookup(target) else {
            return ExcludeOutcome::UnknownReference;
        };
        if !self.cache.get(id).role().is_feature() {
            return ExcludeOutcome::TargetNotFeature;
        }
        if !all.contains(&id) {
            return ExcludeOutcome::NeverReferenced;
        }
        if !curated_base.contains(&id) {
            return ExcludeOutcome::AlreadyExcluded;
        }
        ExcludeOutcome::Applied
    }

    fn warn_ignored_directives(&self, module: &str, markers: &[DeclaredMarker]) {
        for marker in markers {
            match marker {
                DeclaredMarker::ExcludeFeature { name: target } => warn!(
                    module,
                    target = target.as_str(),
                    "exclude-feature is a no-op: module is not itself a feature"
                ),
                m if m.is_type_directive() => warn!(
                    module,
                    directive = %m,
                    "type directive ignored: module is not a feature"
                ),
                _ => {}
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::loader::{MemoryModuleLoader, ModuleSourceBuilder};

    fn resolve_all(loader: &MemoryModuleLoader, roots: &[&str]) -> ModuleCache {
        let options = EngineOptions::default();
        let mut cache = ModuleCache::new();
        let mut builder = ModuleGraphBuilder::new(
            &mut cache,
            loader,
            &NoExclusions,
            &options,
            Path::new("/modules"),
        );
        for root in roots {
            builder.resolve(root).unwrap();
        }
        cache
    }

    fn closure_names(cache: &ModuleCache, name: &str, curated: bool) -> Vec<String> {
        let id = cache.lookup(name).unwrap();
        let closure = cache.get(id).closure().unwrap();
        let set = if curated { &closure.curated } else { &closure.all };
        let mut names: Vec<String> = set
            .iter()
            .map(|&m| cache.get(m).name().to_string())
            .collect();
        names.sort();
        names
    }

    #[test]
    fn definer_reference_makes_referencer_a_feature() {
        let mut loader = MemoryModuleLoader::new();
        loader.insert(ModuleSourceBuilder::new("definer").feature_definer().build());
        loader.insert(
            ModuleSourceBuilder::new("app")
                .reference("definer")
                .build(),
        );

        let cache = resolve_all(&loader, &["app"]);
        assert_eq!(
            cache.get(cache.lookup("definer").unwrap()).role(),
            ModuleRole::FeatureDefiner
        );
        assert_eq!(
            cache.get(cache.lookup("app").unwrap()).role(),
            ModuleRole::Feature
        );
        // The definer is not itself a feature, so it is absent from the
        // feature closure.
        assert!(closure_names(&cache, "app", false).is_empty());
    }

    #[test]
    fn engine_wins_over_feature() {
        let mut loader = MemoryModuleLoader::new();
        loader.insert(ModuleSourceBuilder::new("engine.rt").engine_dependency().build());
        loader.insert(
            ModuleSourceBuilder::new("mixed")
                .feature()
                .reference("engine.rt")
                .build(),
        );

        let cache = resolve_all(&loader, &["mixed"]);
        assert_eq!(
            cache.get(cache.lookup("mixed").unwrap()).role(),
            ModuleRole::Engine
        );
        assert!(cache.get(cache.lookup("mixed").unwrap()).closure().is_none());
    }

    #[test]
    fn system_prefix_is_a_wall() {
        let mut loader = MemoryModuleLoader::new();
        loader.insert(
            ModuleSourceBuilder::new("app")
                .feature()
                .reference("system.io")
                .build(),
        );

        let cache = resolve_all(&loader, &["app"]);
        let sys = cache.get(cache.lookup("system.io").unwrap());
        assert_eq!(sys.role(), ModuleRole::SystemSkipped);
        assert!(sys.references().is_empty());
    }

    #[test]
    fn excluded_module_is_a_wall_unless_engine_or_definer_marked() {
        let mut loader = MemoryModuleLoader::new();
        loader.insert(
            ModuleSourceBuilder::new("dropped")
                .feature()
                .reference("deep")
                .build(),
        );
        loader.insert(ModuleSourceBuilder::new("deep").feature().build());
        loader.insert(ModuleSourceBuilder::new("kept.definer").feature_definer().build());

        let options = EngineOptions::default();
        let filter = ExcludedNames::new(["dropped", "kept.definer"]);
        let mut cache = ModuleCache::new();
        let mut builder = ModuleGraphBuilder::new(
            &mut cache,
            &loader,
            &filter,
            &options,
            Path::new("/modules"),
        );
        builder.resolve("dropped").unwrap();
        builder.resolve("kept.definer").unwrap();

        let dropped = cache.get(cache.lookup("dropped").unwrap());
        assert_eq!(dropped.role(), ModuleRole::Excluded);
        // Wall: the reference list is empty and 'deep' was never walked.
        assert!(dropped.references().is_empty());
        assert!(cache.lookup("deep").is_none());

        // Definer-marked exclusion is ignored and analysis proceeds.
        assert_eq!(
            cache.get(cache.lookup("kept.definer").unwrap()).role(),
            ModuleRole::FeatureDefiner
        );
    }

    #[test]
    fn reference_load_failure_becomes_auto_skipped() {
        let mut loader = MemoryModuleLoader::new();
        loader.insert(
            ModuleSourceBuilder::new("app")
                .feature()
                .reference("ghost")
                .build(),
        );

        let cache = resolve_all(&loader, &["app"]);
        let ghost = cache.get(cache.lookup("ghost").unwrap());
        assert_eq!(ghost.role(), ModuleRole::AutoSkipped);
        assert!(ghost.load_error().is_some());
        assert_eq!(
            cache.get(cache.lookup("app").unwrap()).role(),
            ModuleRole::Feature
        );
    }

    #[test]
    fn circular_reference_is_an_error() {
        let mut loader = MemoryModuleLoader::new();
        loader.insert(ModuleSourceBuilder::new("a").feature().reference("b").build());
        loader.insert(ModuleSourceBuilder::new("b").feature().reference("a").build());

        let options = EngineOptions::default();
        let mut cache = ModuleCache::new();
        let mut builder = ModuleGraphBuilder::new(
            &mut cache,
            &loader,
            &NoExclusions,
            &options,
            Path::new("/modules"),
        );
        let err = builder.resolve("a").unwrap_err();
        assert!(matches!(err, CoreError::CircularReference(_)));
    }

    #[test]
    fn closures_cover_transitive_features() {
        let mut loader = MemoryModuleLoader::new();
        loader.insert(ModuleSourceBuilder::new("f3").feature().build());
        loader.insert(ModuleSourceBuilder::new("f2").feature().reference("f3").build());
        loader.insert(ModuleSourceBuilder::new("f1").feature().reference("f2").build());

        let cache = resolve_all(&loader, &["f1"]);
        assert_eq!(closure_names(&cache, "f1", false), vec!["f2", "f3"]);
        assert_eq!(closure_names(&cache, "f1", true), vec!["f2", "f3"]);
    }

    #[test]
    fn exclude_feature_drops_contribution() {
        let mut loader = MemoryModuleLoader::new();
        loader.insert(ModuleSourceBuilder::new("f3").feature().build());
        loader.insert(ModuleSourceBuilder::new("f2").feature().reference("f3").build());
        loader.insert(
            ModuleSourceBuilder::new("f1")
                .feature()
                .reference("f2")
                .exclude_feature("f2")
                .build(),
        );

        let cache = resolve_all(&loader, &["f1"]);
        // All still validates further excludes; curated lost f2's subtree.
        assert_eq!(closure_names(&cache, "f1", false), vec!["f2", "f3"]);
        assert!(closure_names(&cache, "f1", true).is_empty());
    }

    #[test]
    fn exclude_feature_on_transitive_member_keeps_intermediate() {
        let mut loader = MemoryModuleLoader::new();
        loader.insert(ModuleSourceBuilder::new("f3").feature().build());
        loader.insert(ModuleSourceBuilder::new("f2").feature().reference("f3").build());
        loader.insert(
            ModuleSourceBuilder::new("f1")
                .feature()
                .reference("f2")
                .exclude_feature("f3")
                .build(),
        );

        let cache = resolve_all(&loader, &["f1"]);
        assert_eq!(closure_names(&cache, "f1", true), vec!["f2"]);
    }

    #[test]
    fn intermediate_exclusion_is_reported_upstream() {
        // f2 already excluded f3; f1's own exclude of f3 is a no-op but the
        // curated set stays clean either way.
        let mut loader = MemoryModuleLoader::new();
        loader.insert(ModuleSourceBuilder::new("f3").feature().build());
        loader.insert(
            ModuleSourceBuilder::new("f2")
                .feature()
                .reference("f3")
                .exclude_feature("f3")
                .build(),
        );
        loader.insert(
            ModuleSourceBuilder::new("f1")
                .feature()
                .reference("f2")
                .exclude_feature("f3")
                .build(),
        );

        let cache = resolve_all(&loader, &["f1"]);
        assert_eq!(closure_names(&cache, "f2", true), Vec::<String>::new());
        assert_eq!(closure_names(&cache, "f1", true), vec!["f2"]);
        assert_eq!(closure_names(&cache, "f1", false), vec!["f2", "f3"]);
    }

    #[test]
    fn resolution_is_idempotent() {
        let mut loader = MemoryModuleLoader::new();
        loader.insert(ModuleSourceBuilder::new("f1").feature().build());

        let options = EngineOptions::default();
        let mut cache = ModuleCache::new();
        let mut builder = ModuleGraphBuilder::new(
            &mut cache,
            &loader,
            &NoExclusions,
            &options,
            Path::new("/modules"),
        );
        let first = builder.resolve("f1").unwrap();
        let second = builder.resolve("f1").unwrap();
        assert_eq!(first, second);
        assert_eq!(builder.discovered().len(), 1);
    }
}
