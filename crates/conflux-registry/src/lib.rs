//! Path-group registry, signatures and unification for conflux
//!
//! This crate drives `conflux-core` per configured path group: it
//! deduplicates equivalent configurations, runs graph analysis and type
//! collection once per distinct key, signs the closed groups, and decides
//! whether the finalized groups need a synthetic unified view.

pub mod error;
pub mod fs;
pub mod group;
pub mod registry;
pub mod signature;
pub mod unify;

pub use error::RegistryError;
pub use fs::JsonModuleLoader;
pub use group::{Group, GroupConfig};
pub use registry::{GroupId, GroupRegistry};
pub use signature::Signature;
pub use unify::Unification;
