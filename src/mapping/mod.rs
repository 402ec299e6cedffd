//! Translation of VMOD topics into host entities.
//!
//! Two pieces live here: the topic grammar ([`topic`]) and the static
//! entity table ([`table`]). Both are pure and shared by discovery, the
//! setup wizard and the runtime subscriber.
//!
//! ```text
//! raw topic ──► topic::parse ──► TopicAddress ──► table::resolve ──► EntityDescriptor
//! ```

pub mod table;
pub mod topic;

pub use table::{resolve, AlwaysOnEntity, DeviceClass, EntityDescriptor, EntityKind, NO_DEVICE_CLASS};
pub use topic::{parse, topic_matches, Bus, Direction, KeypadLine, ModuleId, TopicAddress, TopicPath};

use serde::{Deserialize, Serialize};
use std::fmt;

/// A zone input or output channel observed on the bus.
///
/// Doubles as the key of a sensor configuration: two candidates are the same
/// channel when bus, direction and index agree.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ZoneCandidate {
    pub bus: Bus,
    pub direction: Direction,
    pub index: u32,
}

impl ZoneCandidate {
    pub fn input(bus: Bus, index: u32) -> Self {
        Self {
            bus,
            direction: Direction::Input,
            index,
        }
    }

    pub fn output(bus: Bus, index: u32) -> Self {
        Self {
            bus,
            direction: Direction::Output,
            index,
        }
    }

    /// Extracts a candidate from a parsed topic; indexless channels yield `None`.
    pub fn from_path(path: &TopicPath) -> Option<Self> {
        match path {
            TopicPath::Channel {
                bus,
                direction,
                index: Some(index),
            } => Some(Self {
                bus: *bus,
                direction: *direction,
                index: *index,
            }),
            _ => None,
        }
    }

    pub fn is_output(&self) -> bool {
        self.direction == Direction::Output
    }

    pub fn path(&self) -> TopicPath {
        TopicPath::Channel {
            bus: self.bus,
            direction: self.direction,
            index: Some(self.index),
        }
    }

    pub fn topic(&self, module_id: &ModuleId) -> String {
        TopicAddress::new(module_id.clone(), self.path()).render()
    }

    pub fn descriptor(&self) -> EntityDescriptor {
        table::channel_descriptor(self.bus, self.direction, self.index)
    }
}

impl fmt::Display for ZoneCandidate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.bus, self.direction.subcategory(), self.index)
    }
}
