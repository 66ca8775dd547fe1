use thiserror::Error;

use conflux_core::CoreError;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RegistryError {
    #[error("registrations are closed")]
    RegistrationsClosed,

    #[error("group '{group}': explicitly named module '{module}' is unavailable: {reason}")]
    ExplicitModuleMissing {
        group: String,
        module: String,
        reason: String,
    },

    #[error("group '{group}': explicitly named module '{module}' is engine-classified and cannot be included")]
    ExplicitEngineModule { group: String, module: String },

    #[error("group '{group}': {source}")]
    Analysis {
        group: String,
        #[source]
        source: CoreError,
    },
}
