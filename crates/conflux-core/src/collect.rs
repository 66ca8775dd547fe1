//! Configured type sets and the bottom-up collector
//!
//! Every feature module contributes a type set: the sets of its curated
//! sub-features, its own eligible exported types, then its declarative
//! register/exclude directives applied add-first, remove-second. The result
//! is memoized on the record, so a feature shared by several heads or
//! groups is collected once.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::cache::ModuleCache;
use crate::error::CoreError;
use crate::marker::DeclaredMarker;
use crate::record::{ModuleId, ModuleRole};
use crate::types::{check_eligibility, IntrinsicRole, ServiceKind};

/// One collected type with its configured kind and intrinsic role.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TypeEntry {
    pub kind: Option<ServiceKind>,
    pub role: Option<IntrinsicRole>,
    /// Name of the module that contributed the entry.
    pub source: String,
}

/// Mapping from type identity to its configured entry.
///
/// `add` is idempotent: re-adding with the same kind is a no-op, adding
/// with a different kind overwrites.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfiguredTypeSet {
    entries: BTreeMap<String, TypeEntry>,
}

impl ConfiguredTypeSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn contains(&self, fqn: &str) -> bool {
        self.entries.contains_key(fqn)
    }

    pub fn get(&self, fqn: &str) -> Option<&TypeEntry> {
        self.entries.get(fqn)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &TypeEntry)> {
        self.entries.iter().map(|(fqn, entry)| (fqn.as_str(), entry))
    }

    /// Returns true when the set changed.
    pub fn add(&mut self, fqn: String, entry: TypeEntry) -> bool {
        match self.entries.get_mut(&fqn) {
            Some(existing) if existing.kind == entry.kind => false,
            Some(existing) => {
                *existing = entry;
                true
            }
            None => {
                self.entries.insert(fqn, entry);
                true
            }
        }
    }

    /// Returns true when the type was present.
    pub fn remove(&mut self, fqn: &str) -> bool {
        self.entries.remove(fqn).is_some()
    }

    pub fn merge(&mut self, other: &ConfiguredTypeSet) {
        for (fqn, entry) in &other.entries {
            self.add(fqn.clone(), entry.clone());
        }
    }
}

/// Per-module register/exclude outcome, for logging.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TypeSetDelta {
    pub added: Vec<(String, Option<ServiceKind>)>,
    pub removed: Vec<String>,
}

/// Memoizing bottom-up collector over a classified cache.
pub struct TypeSetCollector<'a> {
    cache: &'a ModuleCache,
}

impl<'a> TypeSetCollector<'a> {
    pub fn new(cache: &'a ModuleCache) -> Self {
        Self { cache }
    }

    /// Collect the configured type set of a feature module.
    pub fn collect(&self, id: ModuleId) -> Result<Arc<ConfiguredTypeSet>, CoreError> {
        self.collect_with_delta(id).map(|(set, _)| set)
    }

    /// As [`collect`](Self::collect), also returning the module's own
    /// register/exclude delta. The delta is empty on a memo hit.
    pub fn collect_with_delta(
        &self,
        id: ModuleId,
    ) -> Result<(Arc<ConfiguredTypeSet>, TypeSetDelta), CoreError> {
        let record = self.cache.get(id);
        if record.role() != ModuleRole::Feature {
            return Err(CoreError::NotAFeature(record.name().to_string()));
        }
        if let Some(set) = record.collected_types() {
            return Ok((set, TypeSetDelta::default()));
        }

        let mut set = ConfiguredTypeSet::new();

        // 1. Curated sub-features, name-ordered for determinism.
        let closure = record.closure().cloned().unwrap_or_default();
        let mut subs: Vec<ModuleId> = closure.curated.iter().copied().collect();
        subs.sort_by(|&a, &b| self.cache.get(a).name().cmp(self.cache.get(b).name()));
        for sub in subs {
            let (sub_set, _) = self.collect_with_delta(sub)?;
            set.merge(&sub_set);
        }

        // 2. Own eligible exported types.
        for decl in record.exported_types() {
            if check_eligibility(decl, None).is_ok() {
                set.add(
                    decl.fqn.clone(),
                    TypeEntry {
                        kind: None,
                        role: decl.role,
                        source: record.name().to_string(),
                    },
                );
            } else {
                debug!(
                    module = record.name(),
                    type_name = decl.fqn.as_str(),
                    "exported type is not auto-registrable"
                );
            }
        }

        // 3. All register directives, before any exclude runs.
        let mut delta = TypeSetDelta::default();
        for marker in record.markers() {
            let DeclaredMarker::RegisterType { decl, kind } = marker else {
                continue;
            };
            check_eligibility(decl, *kind).map_err(|rejection| CoreError::TypeRejected {
                module: record.name().to_string(),
                type_name: if decl.fqn.is_empty() {
                    "<unresolved>".to_string()
                } else {
                    decl.fqn.clone()
                },
                rejection,
            })?;
            set.add(
                decl.fqn.clone(),
                TypeEntry {
                    kind: *kind,
                    role: decl.role,
                    source: record.name().to_string(),
                },
            );
            delta.added.push((decl.fqn.clone(), *kind));
        }

        // 4. Exclude directives.
        for marker in record.markers() {
            let DeclaredMarker::ExcludeType { fqn } = marker else {
                continue;
            };
            if set.remove(fqn) {
                debug!(
                    module = record.name(),
                    type_name = fqn.as_str(),
                    "type excluded by directive"
                );
                delta.removed.push(fqn.clone());
            } else {
                debug!(
                    module = record.name(),
                    type_name = fqn.as_str(),
                    "exclude-type found nothing to remove"
                );
            }
        }

        info!(
            feature = record.name(),
            types = set.len(),
            "collected feature type set"
        );
        let set = Arc::new(set);
        let _ = record.collected_cell().set(Arc::clone(&set));
        Ok((set, delta))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::{EngineOptions, ModuleGraphBuilder, NoExclusions};
    use crate::loader::{MemoryModuleLoader, ModuleSourceBuilder};
    use crate::types::{TypeDecl, TypeRejection, TypeShape};
    use pretty_assertions::assert_eq;
    use std::path::Path;

    fn entry(source: &str) -> TypeEntry {
        TypeEntry {
            kind: None,
            role: None,
            source: source.to_string(),
        }
    }

    #[test]
    fn add_is_idempotent_and_overwrites_on_kind_change() {
        let mut set = ConfiguredTypeSet::new();
        let mut scoped = entry("m");
        scoped.kind = Some(ServiceKind::Scoped);
        assert!(set.add("acme.T".into(), scoped.clone()));
        assert!(!set.add("acme.T".into(), scoped));

        assert!(set.remove("acme.T"));
        assert!(!set.remove("acme.T"));

        let mut singleton = entry("m");
        singleton.kind = Some(ServiceKind::Singleton);
        assert!(set.add("acme.T".into(), singleton));
        assert_eq!(set.len(), 1);
        assert_eq!(set.get("acme.T").unwrap().kind, Some(ServiceKind::Singleton));
    }

    fn classify(loader: &MemoryModuleLoader, roots: &[&str]) -> ModuleCache {
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

    #[test]
    fn excludes_apply_after_registers_regardless_of_marker_order() {
        let mut loader = MemoryModuleLoader::new();
        loader.insert(ModuleSourceBuilder::new("sub").feature().exports(TypeDecl::class("acme.T")).build());
        // Exclude is declared before the register; the remove phase still
        // runs last and wins.
        loader.insert(
            ModuleSourceBuilder::new("top")
                .feature()
                .reference("sub")
                .exclude_type("acme.T")
                .register_type(TypeDecl::class("acme.T"), Some(ServiceKind::Scoped))
                .build(),
        );

        let cache = classify(&loader, &["top"]);
        let collector = TypeSetCollector::new(&cache);
        let (set, delta) = collector
            .collect_with_delta(cache.lookup("top").unwrap())
            .unwrap();
        assert!(!set.contains("acme.T"));
        assert_eq!(delta.removed, vec!["acme.T".to_string()]);
    }

    #[test]
    fn inherited_type_can_be_retracted() {
        let mut loader = MemoryModuleLoader::new();
        loader.insert(
            ModuleSourceBuilder::new("sub")
                .feature()
                .exports(TypeDecl::class("acme.Kept"))
                .exports(TypeDecl::class("acme.Dropped"))
                .build(),
        );
        loader.insert(
            ModuleSourceBuilder::new("top")
                .feature()
                .reference("sub")
                .exclude_type("acme.Dropped")
                .build(),
        );

        let cache = classify(&loader, &["top"]);
        let collector = TypeSetCollector::new(&cache);
        let set = collector.collect(cache.lookup("top").unwrap()).unwrap();
        assert!(set.contains("acme.Kept"));
        assert!(!set.contains("acme.Dropped"));
    }

    #[test]
    fn ineligible_exports_are_silently_filtered() {
        let mut loader = MemoryModuleLoader::new();
        loader.insert(
            ModuleSourceBuilder::new("feat")
                .feature()
                .exports(TypeDecl::class("acme.Visible"))
                .exports(TypeDecl::class("acme.Hidden").internal())
                .exports(TypeDecl::new("acme.Open", TypeShape::OpenGeneric))
                .build(),
        );

        let cache = classify(&loader, &["feat"]);
        let collector = TypeSetCollector::new(&cache);
        let set = collector.collect(cache.lookup("feat").unwrap()).unwrap();
        assert_eq!(set.len(), 1);
        assert!(set.contains("acme.Visible"));
    }

    #[test]
    fn rejected_register_directive_is_a_typed_error() {
        let mut loader = MemoryModuleLoader::new();
        loader.insert(
            ModuleSourceBuilder::new("feat")
                .feature()
                .register_type(TypeDecl::class("acme.Hidden").internal(), None)
                .build(),
        );

        let cache = classify(&loader, &["feat"]);
        let collector = TypeSetCollector::new(&cache);
        let err = collector.collect(cache.lookup("feat").unwrap()).unwrap_err();
        assert_eq!(
            err,
            CoreError::TypeRejected {
                module: "feat".to_string(),
                type_name: "acme.Hidden".to_string(),
                rejection: TypeRejection::NotVisible("acme.Hidden".to_string()),
            }
        );
    }

    #[test]
    fn excluded_sub_feature_types_never_leak() {
        let mut loader = MemoryModuleLoader::new();
        loader.insert(
            ModuleSourceBuilder::new("f3")
                .feature()
                .exports(TypeDecl::class("acme.F3"))
                .build(),
        );
        loader.insert(
            ModuleSourceBuilder::new("f2")
                .feature()
                .reference("f3")
                .exports(TypeDecl::class("acme.F2"))
                .build(),
        );
        loader.insert(
            ModuleSourceBuilder::new("f1")
                .feature()
                .reference("f2")
                .exclude_feature("f2")
                .exports(TypeDecl::class("acme.F1"))
                .build(),
        );

        let cache = classify(&loader, &["f1"]);
        let collector = TypeSetCollector::new(&cache);
        let set = collector.collect(cache.lookup("f1").unwrap()).unwrap();
        assert!(set.contains("acme.F1"));
        assert!(!set.contains("acme.F2"));
        assert!(!set.contains("acme.F3"));
    }

    #[test]
    fn collection_is_memoized() {
        let mut loader = MemoryModuleLoader::new();
        loader.insert(
            ModuleSourceBuilder::new("feat")
                .feature()
                .exports(TypeDecl::class("acme.T"))
                .build(),
        );

        let cache = classify(&loader, &["feat"]);
        let collector = TypeSetCollector::new(&cache);
        let id = cache.lookup("feat").unwrap();
        let first = collector.collect(id).unwrap();
        let second = collector.collect(id).unwrap();
        assert!(Arc::ptr_eq(&first, &second));
    }

    #[test]
    fn collecting_a_non_feature_fails() {
        let mut loader = MemoryModuleLoader::new();
        loader.insert(ModuleSourceBuilder::new("plain").build());

        let cache = classify(&loader, &["plain"]);
        let collector = TypeSetCollector::new(&cache);
        let err = collector.collect(cache.lookup("plain").unwrap()).unwrap_err();
        assert_eq!(err, CoreError::NotAFeature("plain".to_string()));
    }
}
