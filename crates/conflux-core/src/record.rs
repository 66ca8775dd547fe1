//! Cached module records
//!
//! Records live in an arena owned by [`crate::cache::ModuleCache`] and are
//! addressed by index-stable [`ModuleId`] handles, so closure sets are plain
//! id sets with trivial equality and no ownership cycles. A record is
//! immutable once constructed; the only late write is the set-once memo for
//! its collected type set.

use std::cell::OnceCell;
use std::collections::BTreeSet;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::collect::ConfiguredTypeSet;
use crate::marker::DeclaredMarker;
use crate::types::TypeDecl;

/// Arena handle of a cached module record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ModuleId(pub(crate) u32);

impl ModuleId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// Final classification of a module.
///
/// A record is constructed with its terminal role and never reclassified;
/// re-encountering the module through another graph path reuses the record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ModuleRole {
    /// Analyzed, carries no role.
    None,
    /// Matched a known system name pattern; never analyzed further.
    SystemSkipped,
    /// Tolerated load failure; never analyzed further.
    AutoSkipped,
    /// Ruled out by the caller's global exclusion predicate.
    Excluded,
    /// Engine side. Mutually exclusive with `Feature`: the engine consumes
    /// features, it is not one.
    Engine,
    /// Marks the start of feature-worthiness for referencers.
    FeatureDefiner,
    /// Visible types are registration candidates.
    Feature,
}

impl ModuleRole {
    /// Walls terminate graph analysis: their references are never walked.
    pub fn is_wall(self) -> bool {
        matches!(self, Self::SystemSkipped | Self::AutoSkipped | Self::Excluded)
    }

    pub fn is_feature(self) -> bool {
        matches!(self, Self::Feature)
    }
}

/// Transitive feature reachability of a feature module.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct FeatureClosure {
    /// Every transitively referenced feature; validates exclude directives.
    pub all: BTreeSet<ModuleId>,
    /// `all` minus this module's own exclude-feature directives; drives
    /// type propagation and head computation.
    pub curated: BTreeSet<ModuleId>,
}

/// Immutable description of one compiled module.
#[derive(Debug, Clone)]
pub struct ModuleRecord {
    id: ModuleId,
    name: String,
    last_modified: DateTime<Utc>,
    markers: Vec<DeclaredMarker>,
    references: Vec<ModuleId>,
    exported_types: Vec<TypeDecl>,
    role: ModuleRole,
    closure: Option<FeatureClosure>,
    load_error: Option<String>,
    collected: OnceCell<Arc<ConfiguredTypeSet>>,
}

impl ModuleRecord {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        id: ModuleId,
        name: String,
        last_modified: DateTime<Utc>,
        markers: Vec<DeclaredMarker>,
        references: Vec<ModuleId>,
        exported_types: Vec<TypeDecl>,
        role: ModuleRole,
        closure: Option<FeatureClosure>,
        load_error: Option<String>,
    ) -> Self {
        debug_assert!(closure.is_none() || role.is_feature());
        debug_assert!(!role.is_wall() || references.is_empty());
        Self {
            id,
            name,
            last_modified,
            markers,
            references,
            exported_types,
            role,
            closure,
            load_error,
            collected: OnceCell::new(),
        }
    }

    pub fn id(&self) -> ModuleId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn last_modified(&self) -> DateTime<Utc> {
        self.last_modified
    }

    pub fn markers(&self) -> &[DeclaredMarker] {
        &self.markers
    }

    pub fn references(&self) -> &[ModuleId] {
        &self.references
    }

    pub fn exported_types(&self) -> &[TypeDecl] {
        &self.exported_types
    }

    pub fn role(&self) -> ModuleRole {
        self.role
    }

    /// Present iff the module is a feature.
    pub fn closure(&self) -> Option<&FeatureClosure> {
        self.closure.as_ref()
    }

    /// Why the module could not be loaded, for `AutoSkipped` walls.
    pub fn load_error(&self) -> Option<&str> {
        self.load_error.as_deref()
    }

    /// The memoized collected type set, once a collector computed it.
    pub fn collected_types(&self) -> Option<Arc<ConfiguredTypeSet>> {
        self.collected.get().cloned()
    }

    pub(crate) fn collected_cell(&self) -> &OnceCell<Arc<ConfiguredTypeSet>> {
        &self.collected
    }
}
