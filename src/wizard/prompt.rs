//! Form description of one wizard step. Rendering is left to the host.

use super::ValidationError;
use std::collections::BTreeMap;
use std::fmt;

/// Submitted form values keyed by [`Field::key`].
pub type Answers = BTreeMap<String, String>;

pub const FIELD_MODULE: &str = "module";
pub const FIELD_ENABLE_OUTPUTS: &str = "enable_outputs";
pub const FIELD_ENABLED: &str = "enabled";
pub const FIELD_NAME: &str = "name";
pub const FIELD_DEVICE_CLASS: &str = "device_class";
pub const FIELD_RETRY: &str = "retry";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepId {
    SelectModule,
    ManualEntry,
    ConnectionFailed,
    ConfigureOutputs,
    NoZonesFound,
    ConfigureZone,
}

impl StepId {
    pub fn as_str(&self) -> &'static str {
        match self {
            StepId::SelectModule => "select_module",
            StepId::ManualEntry => "manual_entry",
            StepId::ConnectionFailed => "connection_failed",
            StepId::ConfigureOutputs => "output_config",
            StepId::NoZonesFound => "no_zones_found",
            StepId::ConfigureZone => "sensor_config",
        }
    }
}

impl fmt::Display for StepId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldKind {
    Text,
    Toggle,
    Choice(Vec<String>),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Field {
    pub key: &'static str,
    pub label: &'static str,
    pub kind: FieldKind,
    pub default: Option<String>,
}

impl Field {
    pub fn text(key: &'static str, label: &'static str, default: impl Into<String>) -> Self {
        Self {
            key,
            label,
            kind: FieldKind::Text,
            default: Some(default.into()),
        }
    }

    pub fn toggle(key: &'static str, label: &'static str, default: bool) -> Self {
        Self {
            key,
            label,
            kind: FieldKind::Toggle,
            default: Some(default.to_string()),
        }
    }

    pub fn choice(
        key: &'static str,
        label: &'static str,
        options: Vec<String>,
        default: Option<String>,
    ) -> Self {
        Self {
            key,
            label,
            kind: FieldKind::Choice(options),
            default,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Prompt {
    pub step: StepId,
    pub title: String,
    /// Values for the step description, e.g. `sensor_num`, `total_sensors`.
    pub placeholders: Vec<(&'static str, String)>,
    pub fields: Vec<Field>,
    pub errors: Vec<ValidationError>,
    pub last_step: bool,
}

impl Prompt {
    pub fn new(step: StepId, title: impl Into<String>) -> Self {
        Self {
            step,
            title: title.into(),
            placeholders: Vec::new(),
            fields: Vec::new(),
            errors: Vec::new(),
            last_step: false,
        }
    }

    pub fn placeholder(mut self, key: &'static str, value: impl ToString) -> Self {
        self.placeholders.push((key, value.to_string()));
        self
    }

    pub fn field(mut self, field: Field) -> Self {
        self.fields.push(field);
        self
    }

    pub fn placeholder_value(&self, key: &str) -> Option<&str> {
        self.placeholders
            .iter()
            .find(|(k, _)| *k == key)
            .map(|(_, v)| v.as_str())
    }

    /// Answers filled with every field default; what a user accepting all
    /// defaults would submit.
    pub fn defaults(&self) -> Answers {
        self.fields
            .iter()
            .filter_map(|field| {
                field
                    .default
                    .as_ref()
                    .map(|value| (field.key.to_string(), value.clone()))
            })
            .collect()
    }
}

/// Parses a toggle answer (`true`/`false`, `yes`/`no`, `y`/`n`, `1`/`0`).
pub fn parse_toggle(field: &'static str, value: &str) -> Result<bool, ValidationError> {
    match value.trim().to_ascii_lowercase().as_str() {
        "true" | "yes" | "y" | "1" | "on" => Ok(true),
        "false" | "no" | "n" | "0" | "off" => Ok(false),
        _ => Err(ValidationError::InvalidToggle {
            field,
            value: value.to_string(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_cover_fields_with_defaults_only() {
        let prompt = Prompt::new(StepId::ConfigureZone, "Zone 1")
            .field(Field::toggle(FIELD_ENABLED, "Enabled", true))
            .field(Field::text(FIELD_NAME, "Name", "Zone 1"))
            .field(Field::choice(FIELD_DEVICE_CLASS, "Class", vec![], None));

        let answers = prompt.defaults();
        assert_eq!(answers.len(), 2);
        assert_eq!(answers[FIELD_ENABLED], "true");
        assert_eq!(answers[FIELD_NAME], "Zone 1");
    }

    #[test]
    fn toggles_accept_common_spellings() {
        assert_eq!(parse_toggle(FIELD_RETRY, " Yes "), Ok(true));
        assert_eq!(parse_toggle(FIELD_RETRY, "0"), Ok(false));
        assert_eq!(
            parse_toggle(FIELD_RETRY, "maybe").unwrap_err().key(),
            "invalid_toggle"
        );
    }
}
