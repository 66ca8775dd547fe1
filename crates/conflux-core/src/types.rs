//! Type declarations and registration eligibility
//!
//! A module exports type declarations; a declaration is only registrable
//! when it is identified, visible, statically defined and of a supported
//! shape. The three intrinsic composition roles are never externally
//! configurable: a declaration carrying one rejects any configured kind.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Structural shape of an exported type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TypeShape {
    Class,
    Interface,
    ValueType,
    Enumeration,
    /// Open generic definition; cannot be registered as-is.
    OpenGeneric,
    Other,
}

impl TypeShape {
    /// Shapes that may enter a configured type set.
    pub fn is_registrable(self) -> bool {
        matches!(
            self,
            Self::Class | Self::Interface | Self::ValueType | Self::Enumeration
        )
    }
}

/// Intrinsic composition role carried by a type itself.
///
/// These roles are decided by the type's own definition and are never
/// overridden by configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum IntrinsicRole {
    /// Poco-like data contract.
    DataContract,
    /// Static real object.
    RealObject,
    /// Designated auto-service.
    AutoService,
}

/// Externally configurable service kind tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ServiceKind {
    Scoped,
    Singleton,
    Transient,
}

/// One exported type declaration as described by the module loader.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TypeDecl {
    /// Fully-qualified identity; empty when the loader could not resolve it.
    pub fqn: String,
    pub shape: TypeShape,
    /// Visible outside the defining module.
    pub public: bool,
    /// Defined by a runtime-only/dynamic module.
    #[serde(default)]
    pub dynamic: bool,
    /// Intrinsic composition role, if the type carries one.
    #[serde(default)]
    pub role: Option<IntrinsicRole>,
}

impl TypeDecl {
    pub fn new(fqn: impl Into<String>, shape: TypeShape) -> Self {
        Self {
            fqn: fqn.into(),
            shape,
            public: true,
            dynamic: false,
            role: None,
        }
    }

    pub fn class(fqn: impl Into<String>) -> Self {
        Self::new(fqn, TypeShape::Class)
    }

    pub fn interface(fqn: impl Into<String>) -> Self {
        Self::new(fqn, TypeShape::Interface)
    }

    pub fn with_role(mut self, role: IntrinsicRole) -> Self {
        self.role = Some(role);
        self
    }

    pub fn internal(mut self) -> Self {
        self.public = false;
        self
    }

    pub fn dynamic(mut self) -> Self {
        self.dynamic = true;
        self
    }
}

/// Why a declaration was refused by the eligibility check.
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum TypeRejection {
    #[error("unidentifiable type")]
    Unidentifiable,

    #[error("type '{0}' comes from a dynamic module")]
    FromDynamicModule(String),

    #[error("type '{0}' is not visible outside its module")]
    NotVisible(String),

    #[error("type '{fqn}' has unsupported shape {shape:?}")]
    UnsupportedShape { fqn: String, shape: TypeShape },

    #[error("kind {kind:?} cannot be configured for '{fqn}': intrinsic role {role:?} blocks it")]
    RoleConflict {
        fqn: String,
        role: IntrinsicRole,
        kind: ServiceKind,
    },
}

/// Validate a declaration against the registration rules.
///
/// `kind` is the configured service kind, when the declaration comes from
/// a register directive rather than plain module export.
pub fn check_eligibility(decl: &TypeDecl, kind: Option<ServiceKind>) -> Result<(), TypeRejection> {
    if decl.fqn.is_empty() {
        return Err(TypeRejection::Unidentifiable);
    }
    if decl.dynamic {
        return Err(TypeRejection::FromDynamicModule(decl.fqn.clone()));
    }
    if !decl.public {
        return Err(TypeRejection::NotVisible(decl.fqn.clone()));
    }
    if !decl.shape.is_registrable() {
        return Err(TypeRejection::UnsupportedShape {
            fqn: decl.fqn.clone(),
            shape: decl.shape,
        });
    }
    if let (Some(role), Some(kind)) = (decl.role, kind) {
        return Err(TypeRejection::RoleConflict {
            fqn: decl.fqn.clone(),
            role,
            kind,
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_public_class_is_eligible() {
        let decl = TypeDecl::class("acme.Widget");
        assert_eq!(check_eligibility(&decl, None), Ok(()));
        assert_eq!(check_eligibility(&decl, Some(ServiceKind::Scoped)), Ok(()));
    }

    #[test]
    fn rejection_order_checks_identity_first() {
        let decl = TypeDecl {
            fqn: String::new(),
            shape: TypeShape::OpenGeneric,
            public: false,
            dynamic: true,
            role: None,
        };
        assert_eq!(
            check_eligibility(&decl, None),
            Err(TypeRejection::Unidentifiable)
        );
    }

    #[test]
    fn rejection_table() {
        let cases = vec![
            (
                TypeDecl::class("acme.Dyn").dynamic(),
                Err(TypeRejection::FromDynamicModule("acme.Dyn".into())),
            ),
            (
                TypeDecl::class("acme.Hidden").internal(),
                Err(TypeRejection::NotVisible("acme.Hidden".into())),
            ),
            (
                TypeDecl::new("acme.List", TypeShape::OpenGeneric),
                Err(TypeRejection::UnsupportedShape {
                    fqn: "acme.List".into(),
                    shape: TypeShape::OpenGeneric,
                }),
            ),
            (TypeDecl::new("acme.Mode", TypeShape::Enumeration), Ok(())),
        ];
        for (decl, expected) in cases {
            assert_eq!(check_eligibility(&decl, None), expected, "for {}", decl.fqn);
        }
    }

    #[test]
    fn intrinsic_role_blocks_configured_kind() {
        let decl = TypeDecl::class("acme.AppState").with_role(IntrinsicRole::RealObject);
        // Without a configured kind the role is fine.
        assert_eq!(check_eligibility(&decl, None), Ok(()));
        let err = check_eligibility(&decl, Some(ServiceKind::Singleton)).unwrap_err();
        assert!(err.to_string().contains("RealObject"));
    }
}
