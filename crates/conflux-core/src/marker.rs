//! Declarative markers attached to compiled modules

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::types::{ServiceKind, TypeDecl};

/// A compile-time directive carried by a module, in declaration order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum DeclaredMarker {
    /// The module's visible types are registration candidates.
    Feature,
    /// The module marks the start of feature-worthiness for its
    /// referencers without being a feature itself.
    FeatureDefiner,
    /// The module belongs to the engine side.
    EngineDependency,
    /// Register one type, optionally with a configured kind.
    RegisterType {
        decl: TypeDecl,
        #[serde(default)]
        kind: Option<ServiceKind>,
    },
    /// Retract one type from the collected set.
    ExcludeType { fqn: String },
    /// Drop a referenced feature from the curated closure.
    ExcludeFeature { name: String },
}

impl DeclaredMarker {
    /// True for the register/exclude-type directives that only feature
    /// modules may carry.
    pub fn is_type_directive(&self) -> bool {
        matches!(self, Self::RegisterType { .. } | Self::ExcludeType { .. })
    }
}

impl fmt::Display for DeclaredMarker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Feature => write!(f, "feature"),
            Self::FeatureDefiner => write!(f, "feature-definer"),
            Self::EngineDependency => write!(f, "engine-dependency"),
            Self::RegisterType { decl, kind } => match kind {
                Some(kind) => write!(f, "register-type {} as {:?}", decl.fqn, kind),
                None => write!(f, "register-type {}", decl.fqn),
            },
            Self::ExcludeType { fqn } => write!(f, "exclude-type {fqn}"),
            Self::ExcludeFeature { name } => write!(f, "exclude-feature {name}"),
        }
    }
}
