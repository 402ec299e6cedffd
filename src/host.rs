//! Host entity interface.
//!
//! The bridge only ever does two things to a host: create an entity once at
//! start-up and push state changes to it afterwards.

use crate::mapping::{DeviceClass, EntityKind, ModuleId};
use std::fmt;
use std::sync::{Arc, Mutex};
use tracing::info;

pub const DEVICE_NAME: &str = "Honeywell Galaxy Alarm";
pub const DEVICE_MANUFACTURER: &str = "SelfMon";

/// Device every entity of one module is grouped under.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceInfo {
    pub identifier: String,
    pub name: String,
    pub manufacturer: String,
    pub model: String,
}

impl DeviceInfo {
    pub fn for_module(module_id: &ModuleId) -> Self {
        Self {
            identifier: module_id.root_topic(),
            name: DEVICE_NAME.to_string(),
            manufacturer: DEVICE_MANUFACTURER.to_string(),
            model: format!("VMOD {}", module_id),
        }
    }
}

/// Everything a host needs to register one entity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntityDefinition {
    pub unique_id: String,
    pub name: String,
    pub kind: EntityKind,
    /// Binary sensors only.
    pub device_class: Option<DeviceClass>,
    /// Sensor device class, e.g. `temperature`.
    pub sensor_class: Option<&'static str>,
    pub unit: Option<&'static str>,
    pub icon: Option<&'static str>,
    pub topic: String,
    pub device: DeviceInfo,
}

#[derive(Debug, Clone, PartialEq)]
pub enum EntityState {
    On,
    Off,
    Unavailable,
    Number(f64),
    Text(String),
}

impl fmt::Display for EntityState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EntityState::On => write!(f, "on"),
            EntityState::Off => write!(f, "off"),
            EntityState::Unavailable => write!(f, "unavailable"),
            EntityState::Number(value) => write!(f, "{}", value),
            EntityState::Text(text) => write!(f, "{}", text),
        }
    }
}

pub trait EntityHost: Send {
    fn create_entity(&mut self, definition: &EntityDefinition);

    fn update_state(&mut self, entity_id: &str, state: &EntityState);
}

/// Host that only writes to the log.
#[derive(Debug, Default)]
pub struct LogHost;

impl EntityHost for LogHost {
    fn create_entity(&mut self, definition: &EntityDefinition) {
        info!(
            "Created {} {} ({}) on {}",
            definition.kind, definition.unique_id, definition.name, definition.topic
        );
    }

    fn update_state(&mut self, entity_id: &str, state: &EntityState) {
        info!("{} -> {}", entity_id, state);
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum HostEvent {
    Created(EntityDefinition),
    Updated(String, EntityState),
}

/// Host that records every call; clones share the same record.
#[derive(Debug, Clone, Default)]
pub struct RecordingHost {
    events: Arc<Mutex<Vec<HostEvent>>>,
}

impl RecordingHost {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<HostEvent> {
        self.events.lock().unwrap_or_else(|p| p.into_inner()).clone()
    }

    pub fn created(&self) -> Vec<EntityDefinition> {
        self.events()
            .into_iter()
            .filter_map(|event| match event {
                HostEvent::Created(definition) => Some(definition),
                HostEvent::Updated(..) => None,
            })
            .collect()
    }

    /// State updates pushed to `entity_id`, oldest first.
    pub fn updates_for(&self, entity_id: &str) -> Vec<EntityState> {
        self.events()
            .into_iter()
            .filter_map(|event| match event {
                HostEvent::Updated(id, state) if id == entity_id => Some(state),
                _ => None,
            })
            .collect()
    }

    fn push(&self, event: HostEvent) {
        self.events.lock().unwrap_or_else(|p| p.into_inner()).push(event);
    }
}

impl EntityHost for RecordingHost {
    fn create_entity(&mut self, definition: &EntityDefinition) {
        self.push(HostEvent::Created(definition.clone()));
    }

    fn update_state(&mut self, entity_id: &str, state: &EntityState) {
        self.push(HostEvent::Updated(entity_id.to_string(), state.clone()));
    }
}
