//! # Operator interface
//!
//! The bridge core only describes wizard steps as [`crate::wizard::Prompt`]
//! values; this module renders them for a terminal. Hosts with their own
//! forms implement [`crate::wizard::WizardUi`] instead.

pub mod console;

pub use console::ConsoleUi;
