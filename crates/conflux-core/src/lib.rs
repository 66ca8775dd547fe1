//! Module-graph classification and type-collection engine
//!
//! conflux-core walks compiled module graphs from their declared
//! references, classifies every module once in a process-scoped cache,
//! maintains the minimal head set per analyzed group, and collects the
//! configured type set each feature contributes to an object-composition
//! model. Grouping, signatures and unification live in
//! `conflux-registry`.

pub mod cache;
pub mod collect;
pub mod error;
pub mod graph;
pub mod heads;
pub mod loader;
pub mod marker;
pub mod record;
pub mod types;

pub use cache::{ModuleCache, ModuleCacheDebugData, ModuleDebugEntry};
pub use collect::{ConfiguredTypeSet, TypeEntry, TypeSetCollector, TypeSetDelta};
pub use error::CoreError;
pub use graph::{
    EngineOptions, ExcludeOutcome, ExcludedNames, FilterFn, ModuleFilter, ModuleGraphBuilder,
    NoExclusions,
};
pub use heads::{HeadEntry, HeadSet};
pub use loader::{LoadError, MemoryModuleLoader, ModuleLoader, ModuleSource, ModuleSourceBuilder};
pub use marker::DeclaredMarker;
pub use record::{FeatureClosure, ModuleId, ModuleRecord, ModuleRole};
pub use types::{
    check_eligibility, IntrinsicRole, ServiceKind, TypeDecl, TypeRejection, TypeShape,
};
