use crate::mapping::ModuleId;
use thiserror::Error;

/// Step-local validation failures. The wizard stays on the current step.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("No modules found on the broker")]
    NoModulesFound,

    #[error("Module {0} is already configured")]
    AlreadyConfigured(ModuleId),

    #[error("Module id must not be empty")]
    EmptyModule,

    #[error("Module {0} was not discovered")]
    UnknownModule(String),

    #[error("Name must not be empty")]
    EmptyName,

    #[error("Invalid device class: {0}")]
    InvalidDeviceClass(String),

    #[error("Invalid yes/no value for {field}: {value}")]
    InvalidToggle { field: &'static str, value: String },

    #[error("Missing field: {0}")]
    MissingField(&'static str),
}

impl ValidationError {
    /// Stable key for translations and form error slots.
    pub fn key(&self) -> &'static str {
        match self {
            ValidationError::NoModulesFound => "no_modules_found",
            ValidationError::AlreadyConfigured(_) => "already_configured",
            ValidationError::EmptyModule => "empty_module",
            ValidationError::UnknownModule(_) => "unknown_module",
            ValidationError::EmptyName => "empty_name",
            ValidationError::InvalidDeviceClass(_) => "invalid_device_class",
            ValidationError::InvalidToggle { .. } => "invalid_toggle",
            ValidationError::MissingField(_) => "missing_field",
        }
    }
}
