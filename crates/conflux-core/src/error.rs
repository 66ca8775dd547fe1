use thiserror::Error;

use crate::types::TypeRejection;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CoreError {
    #[error("duplicate module name '{0}' in cache")]
    DuplicateModule(String),

    #[error("circular module reference through '{0}'")]
    CircularReference(String),

    #[error("module '{name}' failed to load: {reason}")]
    LoadFailed { name: String, reason: String },

    #[error("module '{module}': type '{type_name}' rejected: {rejection}")]
    TypeRejected {
        module: String,
        type_name: String,
        rejection: TypeRejection,
    },

    #[error("module '{0}' is not a feature")]
    NotAFeature(String),

    #[error("module not found: {0}")]
    ModuleNotFound(String),
}
