//! # Persistence Module
//!
//! Data model of a configured integration instance and the store that keeps
//! one TOML file per module.
//!
//! An [`IntegrationConfig`] is produced by the setup wizard, written by the
//! [`store::IntegrationStore`] and handed unchanged to the runtime subscriber.
//! Constructing one always normalizes it: sensor keys are unique (last entry
//! wins) and output sensors are dropped while outputs are disabled.

pub mod store;

pub use store::IntegrationStore;

use crate::host::{DeviceInfo, EntityDefinition};
use crate::mapping::{AlwaysOnEntity, DeviceClass, EntityDescriptor, EntityKind, ModuleId, ZoneCandidate};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::debug;

/// User choices for one zone input or output.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SensorConfig {
    pub enabled: bool,
    pub name: String,
    /// Inputs only.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub device_class: Option<DeviceClass>,
    pub zone: ZoneCandidate,
}

impl SensorConfig {
    /// Defaults offered by the wizard: enabled, table name, door for inputs.
    pub fn with_defaults(zone: ZoneCandidate) -> Self {
        let descriptor = zone.descriptor();
        Self {
            enabled: true,
            name: descriptor.default_name,
            device_class: if zone.is_output() {
                None
            } else {
                Some(DeviceClass::Door)
            },
            zone,
        }
    }

    pub fn descriptor(&self) -> EntityDescriptor {
        self.zone.descriptor()
    }
}

/// One configured module.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IntegrationConfig {
    pub module_id: ModuleId,
    #[serde(default)]
    pub outputs_enabled: bool,
    #[serde(default)]
    sensors: Vec<SensorConfig>,
}

impl IntegrationConfig {
    pub fn new(module_id: ModuleId, outputs_enabled: bool, sensors: Vec<SensorConfig>) -> Self {
        let mut config = Self {
            module_id,
            outputs_enabled,
            sensors: Vec::new(),
        };
        for sensor in sensors {
            config.upsert(sensor);
        }
        config
    }

    /// Inserts or replaces the sensor with the same zone key.
    ///
    /// Replacing keeps the original position. Output sensors are ignored
    /// while outputs are disabled.
    pub fn upsert(&mut self, sensor: SensorConfig) {
        if sensor.zone.is_output() && !self.outputs_enabled {
            debug!("Dropping output {} while outputs are disabled", sensor.zone);
            return;
        }
        match self.sensors.iter_mut().find(|s| s.zone == sensor.zone) {
            Some(existing) => *existing = sensor,
            None => self.sensors.push(sensor),
        }
    }

    /// Re-applies the invariants after deserialization.
    pub fn normalized(self) -> Self {
        Self::new(self.module_id, self.outputs_enabled, self.sensors)
    }

    pub fn sensors(&self) -> &[SensorConfig] {
        &self.sensors
    }

    pub fn sensor(&self, zone: &ZoneCandidate) -> Option<&SensorConfig> {
        self.sensors.iter().find(|s| &s.zone == zone)
    }

    pub fn always_on(&self) -> &'static [AlwaysOnEntity] {
        &AlwaysOnEntity::ALL
    }

    pub fn title(&self) -> String {
        format!("{} ({})", crate::host::DEVICE_NAME, self.module_id)
    }

    /// Entities to create on the host: enabled sensors first, then the
    /// always-on set.
    pub fn entities(&self) -> Vec<EntityDefinition> {
        let device = DeviceInfo::for_module(&self.module_id);

        let sensors = self.sensors.iter().filter(|s| s.enabled).map(|sensor| {
            let descriptor = sensor.descriptor();
            let device_class = match descriptor.kind {
                EntityKind::BinarySensor => sensor.device_class,
                EntityKind::Sensor => None,
            };
            self.definition(&descriptor, sensor.name.clone(), device_class, &device)
        });
        let always_on = self.always_on().iter().map(|entity| {
            let descriptor = entity.descriptor();
            let name = descriptor.default_name.clone();
            self.definition(&descriptor, name, None, &device)
        });

        sensors.chain(always_on).collect()
    }

    /// Exact topics the runtime subscribes to, keyed to their entity.
    pub fn topic_bindings(&self) -> HashMap<String, EntityDefinition> {
        self.entities()
            .into_iter()
            .map(|definition| (definition.topic.clone(), definition))
            .collect()
    }

    fn definition(
        &self,
        descriptor: &EntityDescriptor,
        name: String,
        device_class: Option<DeviceClass>,
        device: &DeviceInfo,
    ) -> EntityDefinition {
        EntityDefinition {
            unique_id: descriptor.unique_id(&self.module_id),
            name,
            kind: descriptor.kind,
            device_class,
            sensor_class: descriptor.sensor_class,
            unit: descriptor.unit,
            icon: descriptor.icon,
            topic: descriptor.topic(&self.module_id),
            device: device.clone(),
        }
    }
}
