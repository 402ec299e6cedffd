//! Static mapping from topic paths to entity descriptors.

use super::topic::{Bus, Direction, KeypadLine, ModuleId, TopicAddress, TopicPath};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    /// on/off state decoded from a truthy or falsy payload
    BinarySensor,
    /// raw payload passthrough
    Sensor,
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EntityKind::BinarySensor => write!(f, "binary_sensor"),
            EntityKind::Sensor => write!(f, "sensor"),
        }
    }
}

/// Choice that leaves a zone input without a device class.
pub const NO_DEVICE_CLASS: &str = "none";

/// Device classes a zone input can be presented as.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeviceClass {
    Door,
    Motion,
    Smoke,
    Safety,
    Window,
    GarageDoor,
    Vibration,
    Tamper,
    Problem,
}

impl DeviceClass {
    pub const ALL: [DeviceClass; 9] = [
        DeviceClass::Door,
        DeviceClass::Motion,
        DeviceClass::Smoke,
        DeviceClass::Safety,
        DeviceClass::Window,
        DeviceClass::GarageDoor,
        DeviceClass::Vibration,
        DeviceClass::Tamper,
        DeviceClass::Problem,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            DeviceClass::Door => "door",
            DeviceClass::Motion => "motion",
            DeviceClass::Smoke => "smoke",
            DeviceClass::Safety => "safety",
            DeviceClass::Window => "window",
            DeviceClass::GarageDoor => "garage_door",
            DeviceClass::Vibration => "vibration",
            DeviceClass::Tamper => "tamper",
            DeviceClass::Problem => "problem",
        }
    }
}

impl DeviceClass {
    /// Parses a form choice; [`NO_DEVICE_CLASS`] yields `Ok(None)`.
    pub fn parse_choice(raw: &str) -> Result<Option<Self>, String> {
        if raw.trim().eq_ignore_ascii_case(NO_DEVICE_CLASS) {
            Ok(None)
        } else {
            raw.parse().map(Some)
        }
    }
}

impl fmt::Display for DeviceClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DeviceClass {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_ascii_lowercase();
        DeviceClass::ALL
            .into_iter()
            .find(|class| class.as_str() == wanted)
            .ok_or_else(|| format!("unknown device class: {}", s))
    }
}

/// Entities created for every configured module, independent of user choices.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlwaysOnEntity {
    Temperature,
    KeypadLine1,
    KeypadLine2,
    Version,
}

impl AlwaysOnEntity {
    pub const ALL: [AlwaysOnEntity; 4] = [
        AlwaysOnEntity::Temperature,
        AlwaysOnEntity::KeypadLine1,
        AlwaysOnEntity::KeypadLine2,
        AlwaysOnEntity::Version,
    ];

    pub fn path(&self) -> TopicPath {
        match self {
            AlwaysOnEntity::Temperature => TopicPath::Temperature,
            AlwaysOnEntity::KeypadLine1 => TopicPath::Keypad(KeypadLine::Line1),
            AlwaysOnEntity::KeypadLine2 => TopicPath::Keypad(KeypadLine::Line2),
            AlwaysOnEntity::Version => TopicPath::Version,
        }
    }

    pub fn descriptor(&self) -> EntityDescriptor {
        let (default_name, unique_suffix, sensor_class, unit, icon) = match self {
            AlwaysOnEntity::Temperature => (
                "Temperature Sensor",
                "temperature",
                Some("temperature"),
                Some("°C"),
                None,
            ),
            AlwaysOnEntity::KeypadLine1 => ("Keypad Line 1", "vkp_line1", None, None, None),
            AlwaysOnEntity::KeypadLine2 => ("Keypad Line 2", "vkp_line2", None, None, None),
            AlwaysOnEntity::Version => (
                "Module Version",
                "version",
                None,
                None,
                Some("mdi:information-outline"),
            ),
        };

        EntityDescriptor {
            kind: EntityKind::Sensor,
            path: self.path(),
            suggested_device_class: None,
            always_on: true,
            default_name: default_name.to_string(),
            unique_suffix: unique_suffix.to_string(),
            sensor_class,
            unit,
            icon,
        }
    }
}

/// Metadata for one entity derived from its topic path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntityDescriptor {
    pub kind: EntityKind,
    pub path: TopicPath,
    /// `None` for inputs means "let the user choose"; the prompt pre-selects door.
    pub suggested_device_class: Option<DeviceClass>,
    pub always_on: bool,
    pub default_name: String,
    /// Stable suffix for the host unique id, e.g. `prio_zone_3`.
    pub unique_suffix: String,
    pub sensor_class: Option<&'static str>,
    pub unit: Option<&'static str>,
    pub icon: Option<&'static str>,
}

impl EntityDescriptor {
    pub fn unique_id(&self, module_id: &ModuleId) -> String {
        format!("selfmon_{}_{}", module_id, self.unique_suffix)
    }

    pub fn topic(&self, module_id: &ModuleId) -> String {
        TopicAddress::new(module_id.clone(), self.path.clone()).render()
    }
}

/// Descriptor of a zone input or output channel.
pub fn channel_descriptor(bus: Bus, direction: Direction, index: u32) -> EntityDescriptor {
    let (kind, noun, suffix) = match direction {
        Direction::Input => (EntityKind::BinarySensor, "Zone", "zone"),
        Direction::Output => (EntityKind::Sensor, "Output", "output"),
    };
    let default_name = match bus {
        Bus::Prio => format!("{} {}", noun, index),
        Bus::Vrio => format!("Virtual {} {}", noun, index),
    };

    EntityDescriptor {
        kind,
        path: TopicPath::Channel {
            bus,
            direction,
            index: Some(index),
        },
        suggested_device_class: None,
        always_on: false,
        default_name,
        unique_suffix: format!("{}_{}_{}", bus, suffix, index),
        sensor_class: None,
        unit: None,
        icon: None,
    }
}

/// Resolves a topic path to its entity descriptor.
///
/// Returns `None` for shapes the table does not model, and for channels
/// without an index; both are dropped from candidate lists.
pub fn resolve(path: &TopicPath) -> Option<EntityDescriptor> {
    let descriptor = match path {
        TopicPath::Channel {
            bus,
            direction,
            index: Some(index),
        } => channel_descriptor(*bus, *direction, *index),
        TopicPath::Temperature => AlwaysOnEntity::Temperature.descriptor(),
        TopicPath::Keypad(KeypadLine::Line1) => AlwaysOnEntity::KeypadLine1.descriptor(),
        TopicPath::Keypad(KeypadLine::Line2) => AlwaysOnEntity::KeypadLine2.descriptor(),
        TopicPath::Version => AlwaysOnEntity::Version.descriptor(),
        TopicPath::Channel { index: None, .. } | TopicPath::Unsupported(_) => return None,
    };

    Some(descriptor)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mapping::topic::parse;

    #[test]
    fn inputs_resolve_to_binary_sensors_without_default_class() {
        let address = parse("selfmon/vmod.a/vrio/inputs/read/12").unwrap();
        let descriptor = resolve(&address.path).unwrap();
        assert_eq!(descriptor.kind, EntityKind::BinarySensor);
        assert_eq!(descriptor.suggested_device_class, None);
        assert!(!descriptor.always_on);
        assert_eq!(descriptor.default_name, "Virtual Zone 12");
        assert_eq!(descriptor.unique_id(&address.module_id), "selfmon_a_vrio_zone_12");
    }

    #[test]
    fn outputs_resolve_to_sensors() {
        let address = parse("selfmon/vmod.a/prio/outputs/2").unwrap();
        let descriptor = resolve(&address.path).unwrap();
        assert_eq!(descriptor.kind, EntityKind::Sensor);
        assert!(!descriptor.always_on);
        assert_eq!(descriptor.default_name, "Output 2");
    }

    #[test]
    fn always_on_entities_are_sensors() {
        for entity in AlwaysOnEntity::ALL {
            let descriptor = entity.descriptor();
            assert_eq!(descriptor.kind, EntityKind::Sensor);
            assert!(descriptor.always_on);
        }
        let temperature = AlwaysOnEntity::Temperature.descriptor();
        assert_eq!(temperature.unit, Some("°C"));
        assert_eq!(
            AlwaysOnEntity::KeypadLine2
                .descriptor()
                .topic(&ModuleId::from_user_input("010aa1").unwrap()),
            "selfmon/vmod.010aa1/vkp/display/line2"
        );
    }

    #[test]
    fn unsupported_and_indexless_paths_are_dropped() {
        assert!(resolve(&TopicPath::Unsupported("heartbeat".into())).is_none());
        let indexless = parse("selfmon/vmod.a/prio/outputs").unwrap();
        assert!(resolve(&indexless.path).is_none());
    }

    #[test]
    fn device_class_parses_case_insensitively() {
        assert_eq!("Garage_Door".parse::<DeviceClass>(), Ok(DeviceClass::GarageDoor));
        assert!("sprinkler".parse::<DeviceClass>().is_err());
    }

    #[test]
    fn none_choice_clears_the_device_class() {
        assert_eq!(DeviceClass::parse_choice("None"), Ok(None));
        assert_eq!(DeviceClass::parse_choice(" none "), Ok(None));
        assert_eq!(DeviceClass::parse_choice("smoke"), Ok(Some(DeviceClass::Smoke)));
        assert!(DeviceClass::parse_choice("").is_err());
    }
}
