//! # SelfMon VMOD bridge
//!
//! Bridges a SelfMon VMOD module (the MQTT face of a Honeywell Galaxy alarm
//! panel) to a host's entity model.
//!
//! ```text
//! broker ──► mqtt (BrokerLink) ──► discovery ──► wizard ──► IntegrationConfig
//!                      │                                        │
//!                      └──────────► runtime ◄───────────────────┘
//!                                      │
//!                                      ▼
//!                                 EntityHost
//! ```
//!
//! - [`mapping`]: topic grammar and entity table (pure)
//! - [`mqtt`]: broker link abstraction, rumqttc and in-memory implementations
//! - [`discovery`]: timed module discovery and zone enumeration
//! - [`wizard`]: setup state machine, prompts and the async driver
//! - [`persistence`]: integration data model and TOML store
//! - [`runtime`]: live subscriber pushing decoded states to the host
//! - [`host`]: host entity interface

pub mod config;
pub mod discovery;
pub mod error;
pub mod host;
pub mod mapping;
pub mod mqtt;
pub mod persistence;
pub mod runtime;
pub mod ui;
pub mod wizard;

pub use error::{BridgeError, Result};
