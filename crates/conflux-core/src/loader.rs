//! Module loading seam
//!
//! The engine never reads module bytes itself: a [`ModuleLoader`] collaborator
//! turns (path, name) into a [`ModuleSource`] description and lists the
//! loadable modules under a path. [`MemoryModuleLoader`] is the in-process
//! implementation used by tests and embedders that already hold module
//! metadata.

use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::marker::DeclaredMarker;
use crate::types::{ServiceKind, TypeDecl};

/// Loader-produced description of one compiled module.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModuleSource {
    pub name: String,
    pub last_modified: DateTime<Utc>,
    #[serde(default)]
    pub markers: Vec<DeclaredMarker>,
    /// Referenced module names, in declaration order.
    #[serde(default)]
    pub references: Vec<String>,
    #[serde(default)]
    pub exported_types: Vec<TypeDecl>,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LoadError {
    #[error("module '{0}' not found")]
    NotFound(String),

    #[error("module '{name}' is unreadable: {reason}")]
    Unreadable { name: String, reason: String },

    #[error("path '{path}' cannot be scanned: {reason}")]
    ScanFailed { path: String, reason: String },
}

/// External module storage collaborator.
///
/// Calls are blocking; retries belong to the implementation, not to the
/// engine.
pub trait ModuleLoader {
    /// Load the named module from the given path root.
    fn load(&self, path: &Path, name: &str) -> Result<ModuleSource, LoadError>;

    /// List the names of every discoverable module under the given path
    /// root. Listing does not imply the module will load.
    fn scan(&self, path: &Path) -> Result<Vec<String>, LoadError>;
}

/// In-memory loader backed by pre-built [`ModuleSource`] descriptions.
#[derive(Debug, Default, Clone)]
pub struct MemoryModuleLoader {
    modules: BTreeMap<String, ModuleSource>,
    /// Names that scan reports but load refuses, like a present but
    /// unreadable file on disk.
    broken: BTreeSet<String>,
    /// Optional per-path scan lists; paths without an entry see every
    /// module.
    scopes: BTreeMap<PathBuf, Vec<String>>,
}

impl MemoryModuleLoader {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, source: ModuleSource) -> &mut Self {
        self.modules.insert(source.name.clone(), source);
        self
    }

    pub fn insert_broken(&mut self, name: impl Into<String>) -> &mut Self {
        self.broken.insert(name.into());
        self
    }

    /// Restrict what `scan` reports for one path.
    pub fn scope(&mut self, path: impl Into<PathBuf>, names: Vec<String>) -> &mut Self {
        self.scopes.insert(path.into(), names);
        self
    }
}

impl ModuleLoader for MemoryModuleLoader {
    fn load(&self, _path: &Path, name: &str) -> Result<ModuleSource, LoadError> {
        if self.broken.contains(name) {
            return Err(LoadError::Unreadable {
                name: name.to_string(),
                reason: "marked broken".to_string(),
            });
        }
        self.modules
            .get(name)
            .cloned()
            .ok_or_else(|| LoadError::NotFound(name.to_string()))
    }

    fn scan(&self, path: &Path) -> Result<Vec<String>, LoadError> {
        if let Some(names) = self.scopes.get(path) {
            return Ok(names.clone());
        }
        let mut names: Vec<String> = self.modules.keys().cloned().collect();
        names.extend(self.broken.iter().cloned());
        names.sort();
        names.dedup();
        Ok(names)
    }
}

/// Fluent fixture builder for [`ModuleSource`].
#[derive(Debug, Clone)]
pub struct ModuleSourceBuilder {
    source: ModuleSource,
}

impl ModuleSourceBuilder {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            source: ModuleSource {
                name: name.into(),
                last_modified: DateTime::UNIX_EPOCH,
                markers: Vec::new(),
                references: Vec::new(),
                exported_types: Vec::new(),
            },
        }
    }

    pub fn modified_at(mut self, at: DateTime<Utc>) -> Self {
        self.source.last_modified = at;
        self
    }

    pub fn feature(mut self) -> Self {
        self.source.markers.push(DeclaredMarker::Feature);
        self
    }

    pub fn feature_definer(mut self) -> Self {
        self.source.markers.push(DeclaredMarker::FeatureDefiner);
        self
    }

    pub fn engine_dependency(mut self) -> Self {
        self.source.markers.push(DeclaredMarker::EngineDependency);
        self
    }

    pub fn reference(mut self, name: impl Into<String>) -> Self {
        self.source.references.push(name.into());
        self
    }

    pub fn exports(mut self, decl: TypeDecl) -> Self {
        self.source.exported_types.push(decl);
        self
    }

    pub fn register_type(mut self, decl: TypeDecl, kind: Option<ServiceKind>) -> Self {
        self.source
            .markers
            .push(DeclaredMarker::RegisterType { decl, kind });
        self
    }

    pub fn exclude_type(mut self, fqn: impl Into<String>) -> Self {
        self.source
            .markers
            .push(DeclaredMarker::ExcludeType { fqn: fqn.into() });
        self
    }

    pub fn exclude_feature(mut self, name: impl Into<String>) -> Self {
        self.source
            .markers
            .push(DeclaredMarker::ExcludeFeature { name: name.into() });
        self
    }

    pub fn build(self) -> ModuleSource {
        self.source
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn memory_loader_scan_includes_broken_modules() {
        let mut loader = MemoryModuleLoader::new();
        loader.insert(ModuleSourceBuilder::new("alpha").build());
        loader.insert_broken("beta");

        let names = loader.scan(Path::new("/modules")).unwrap();
        assert_eq!(names, vec!["alpha".to_string(), "beta".to_string()]);
        assert!(loader.load(Path::new("/modules"), "alpha").is_ok());
        assert!(matches!(
            loader.load(Path::new("/modules"), "beta"),
            Err(LoadError::Unreadable { .. })
        ));
    }

    #[test]
    fn scoped_paths_restrict_scan() {
        let mut loader = MemoryModuleLoader::new();
        loader.insert(ModuleSourceBuilder::new("alpha").build());
        loader.insert(ModuleSourceBuilder::new("beta").build());
        loader.scope(PathBuf::from("/only-alpha"), vec!["alpha".to_string()]);

        assert_eq!(
            loader.scan(Path::new("/only-alpha")).unwrap(),
            vec!["alpha".to_string()]
        );
        assert_eq!(loader.scan(Path::new("/elsewhere")).unwrap().len(), 2);
    }

    #[test]
    fn descriptor_round_trips_through_json() {
        let source = ModuleSourceBuilder::new("acme.billing")
            .feature()
            .reference("acme.contracts")
            .exports(TypeDecl::class("acme.billing.Invoice"))
            .exclude_feature("acme.legacy")
            .build();

        let text = serde_json::to_string(&source).unwrap();
        let parsed: ModuleSource = serde_json::from_str(&text).unwrap();
        assert_eq!(parsed, source);
    }
}
