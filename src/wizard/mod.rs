//! # Setup wizard
//!
//! Interactive configuration of one integration instance, modelled as an
//! explicit state machine:
//!
//! ```text
//!            create                                    reconfigure
//!              │                                            │
//!         Discovering ──0──► ManualEntry ──┐                │
//!              │ 1 (auto)                  │                │
//!              │ >1 ──► SelectModule ──────┤                │
//!              ▼                           ▼                ▼
//!        (module chosen) ─────────────► ConfigureOutputs ◄──┘
//!                                          │
//!                                      Enumerating ──empty──► NoZonesFound
//!                                          │                      │
//!                                   ConfigureZone[i] ◄────────────┘ (retry)
//!                                          │
//!                                      Finalized
//! ```
//!
//! `Discovering` and `Enumerating` are effect states: the wizard announces
//! the effect through [`Wizard::effect`] and the [`driver`] feeds the result
//! back in. Every other transition is a pure function of the current state
//! and one [`WizardInput`]; I/O never happens inside [`Wizard::apply`].
//! A broker failure in either effect state leads to `ConnectionFailed`, which
//! offers a retry. `Aborted` is reachable from every non-terminal state.

pub mod driver;
pub mod error;
pub mod prompt;

pub use driver::{run, SetupWindows, WizardUi};
pub use error::ValidationError;
pub use prompt::{Answers, Field, FieldKind, Prompt, StepId};

use crate::error::{BridgeError, Result};
use crate::mapping::{DeviceClass, ModuleId, ZoneCandidate, NO_DEVICE_CLASS};
use crate::persistence::{IntegrationConfig, SensorConfig};
use prompt::{
    parse_toggle, FIELD_DEVICE_CLASS, FIELD_ENABLED, FIELD_ENABLE_OUTPUTS, FIELD_MODULE,
    FIELD_NAME, FIELD_RETRY,
};
use std::collections::BTreeSet;
use std::fmt;
use tracing::{debug, info, warn};

const MANUAL_ENTRY_DEFAULT: &str = "selfmon/vmod.010aa1";

/// Which effect a `ConnectionFailed` retry goes back to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Discovery,
    Enumeration,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WizardState {
    Discovering,
    SelectModule { candidates: Vec<ModuleId> },
    ManualEntry,
    ConnectionFailed { message: String, phase: Phase },
    ConfigureOutputs,
    Enumerating,
    NoZonesFound,
    ConfigureZone { position: usize },
    Finalized(IntegrationConfig),
    Aborted(AbortReason),
}

impl WizardState {
    fn name(&self) -> &'static str {
        match self {
            WizardState::Discovering => "Discovering",
            WizardState::SelectModule { .. } => "SelectModule",
            WizardState::ManualEntry => "ManualEntry",
            WizardState::ConnectionFailed { .. } => "ConnectionFailed",
            WizardState::ConfigureOutputs => "ConfigureOutputs",
            WizardState::Enumerating => "Enumerating",
            WizardState::NoZonesFound => "NoZonesFound",
            WizardState::ConfigureZone { .. } => "ConfigureZone",
            WizardState::Finalized(_) => "Finalized",
            WizardState::Aborted(_) => "Aborted",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AbortReason {
    AlreadyConfigured(ModuleId),
    CannotConnect(String),
    Cancelled,
}

impl AbortReason {
    pub fn key(&self) -> &'static str {
        match self {
            AbortReason::AlreadyConfigured(_) => "already_configured",
            AbortReason::CannotConnect(_) => "cannot_connect",
            AbortReason::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for AbortReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AbortReason::AlreadyConfigured(module) => write!(f, "module {} is already configured", module),
            AbortReason::CannotConnect(message) => write!(f, "cannot connect to broker: {}", message),
            AbortReason::Cancelled => write!(f, "setup cancelled"),
        }
    }
}

/// Work the driver has to perform before the wizard can continue.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Effect {
    Discover,
    Enumerate {
        module_id: ModuleId,
        outputs_enabled: bool,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WizardInput {
    ModulesDiscovered(Vec<ModuleId>),
    ZonesEnumerated(Vec<ZoneCandidate>),
    BrokerUnreachable(String),
    Submit(Answers),
    Abort,
}

impl WizardInput {
    fn name(&self) -> &'static str {
        match self {
            WizardInput::ModulesDiscovered(_) => "ModulesDiscovered",
            WizardInput::ZonesEnumerated(_) => "ZonesEnumerated",
            WizardInput::BrokerUnreachable(_) => "BrokerUnreachable",
            WizardInput::Submit(_) => "Submit",
            WizardInput::Abort => "Abort",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WizardOutcome {
    Finished(IntegrationConfig),
    Aborted(AbortReason),
}

/// A validated form submission.
#[derive(Debug)]
enum Submission {
    Module(ModuleId),
    Outputs(bool),
    Retry(bool),
    Zone(SensorConfig),
}

#[derive(Debug, Clone)]
pub struct Wizard {
    state: WizardState,
    already_configured: BTreeSet<ModuleId>,
    module_id: Option<ModuleId>,
    outputs_enabled: bool,
    previous: Vec<SensorConfig>,
    drafts: Vec<SensorConfig>,
    errors: Vec<ValidationError>,
}

impl Wizard {
    /// New integration; modules in `already_configured` are refused.
    pub fn create(already_configured: BTreeSet<ModuleId>) -> Self {
        Self {
            state: WizardState::Discovering,
            already_configured,
            module_id: None,
            outputs_enabled: false,
            previous: Vec::new(),
            drafts: Vec::new(),
            errors: Vec::new(),
        }
    }

    /// Reconfiguration keeps the module and starts at the outputs toggle.
    pub fn reconfigure(existing: IntegrationConfig) -> Self {
        info!("Reconfiguring integration {}", existing.module_id);
        Self {
            state: WizardState::ConfigureOutputs,
            already_configured: BTreeSet::new(),
            outputs_enabled: existing.outputs_enabled,
            previous: existing.sensors().to_vec(),
            module_id: Some(existing.module_id),
            drafts: Vec::new(),
            errors: Vec::new(),
        }
    }

    pub fn state(&self) -> &WizardState {
        &self.state
    }

    pub fn module_id(&self) -> Option<&ModuleId> {
        self.module_id.as_ref()
    }

    pub fn outputs_enabled(&self) -> bool {
        self.outputs_enabled
    }

    /// Per-candidate choices collected so far, in presentation order.
    pub fn drafts(&self) -> &[SensorConfig] {
        &self.drafts
    }

    pub fn errors(&self) -> &[ValidationError] {
        &self.errors
    }

    pub fn effect(&self) -> Option<Effect> {
        match &self.state {
            WizardState::Discovering => Some(Effect::Discover),
            WizardState::Enumerating => self.module_id.as_ref().map(|module_id| Effect::Enumerate {
                module_id: module_id.clone(),
                outputs_enabled: self.outputs_enabled,
            }),
            _ => None,
        }
    }

    pub fn outcome(&self) -> Option<WizardOutcome> {
        match &self.state {
            WizardState::Finalized(config) => Some(WizardOutcome::Finished(config.clone())),
            WizardState::Aborted(reason) => Some(WizardOutcome::Aborted(reason.clone())),
            _ => None,
        }
    }

    pub fn is_finished(&self) -> bool {
        matches!(
            self.state,
            WizardState::Finalized(_) | WizardState::Aborted(_)
        )
    }

    /// Form for the current step; `None` in effect and terminal states.
    pub fn prompt(&self) -> Option<Prompt> {
        let prompt = match &self.state {
            WizardState::SelectModule { candidates } => {
                let options: Vec<String> = candidates.iter().map(|m| m.to_string()).collect();
                let default = options.first().cloned();
                Prompt::new(StepId::SelectModule, "Select SelfMon module")
                    .placeholder("count", candidates.len())
                    .field(Field::choice(FIELD_MODULE, "Module", options, default))
            }
            WizardState::ManualEntry => Prompt::new(StepId::ManualEntry, "Enter SelfMon module")
                .field(Field::text(FIELD_MODULE, "Module path or id", MANUAL_ENTRY_DEFAULT)),
            WizardState::ConnectionFailed { message, .. } => {
                Prompt::new(StepId::ConnectionFailed, "MQTT broker not reachable")
                    .placeholder("error", message)
                    .field(Field::toggle(FIELD_RETRY, "Retry", true))
            }
            WizardState::ConfigureOutputs => {
                let module_path = self
                    .module_id
                    .as_ref()
                    .map(|m| m.root_topic())
                    .unwrap_or_default();
                Prompt::new(StepId::ConfigureOutputs, "Configure outputs")
                    .placeholder("module_path", module_path)
                    .field(Field::toggle(
                        FIELD_ENABLE_OUTPUTS,
                        "Enable outputs",
                        self.outputs_enabled,
                    ))
            }
            WizardState::NoZonesFound => {
                let module_path = self
                    .module_id
                    .as_ref()
                    .map(|m| m.root_topic())
                    .unwrap_or_default();
                Prompt::new(StepId::NoZonesFound, "No zones found")
                    .placeholder("module_path", module_path)
                    .field(Field::toggle(FIELD_RETRY, "Search again", false))
            }
            WizardState::ConfigureZone { position } => self.zone_prompt(*position)?,
            WizardState::Discovering
            | WizardState::Enumerating
            | WizardState::Finalized(_)
            | WizardState::Aborted(_) => return None,
        };

        Some(Prompt {
            errors: self.errors.clone(),
            ..prompt
        })
    }

    fn zone_prompt(&self, position: usize) -> Option<Prompt> {
        let draft = self.drafts.get(position)?;
        let module_topic = self
            .module_id
            .as_ref()
            .map(|m| draft.zone.topic(m))
            .unwrap_or_default();
        let total = self.drafts.len();

        let mut prompt = Prompt::new(
            StepId::ConfigureZone,
            format!("Sensor {} of {}", position + 1, total),
        )
        .placeholder("sensor_id", draft.zone)
        .placeholder("sensor_num", position + 1)
        .placeholder("total_sensors", total)
        .placeholder("topic", module_topic)
        .field(Field::toggle(FIELD_ENABLED, "Enabled", draft.enabled))
        .field(Field::text(FIELD_NAME, "Name", draft.name.clone()));

        if !draft.zone.is_output() {
            let options = DeviceClass::ALL
                .iter()
                .map(|c| c.to_string())
                .chain(std::iter::once(NO_DEVICE_CLASS.to_string()))
                .collect();
            let default = draft
                .device_class
                .map_or_else(|| NO_DEVICE_CLASS.to_string(), |c| c.to_string());
            prompt = prompt.field(Field::choice(
                FIELD_DEVICE_CLASS,
                "Device class",
                options,
                Some(default),
            ));
        }
        prompt.last_step = position + 1 == total;
        Some(prompt)
    }

    /// Checks `answers` against the current step without changing state.
    pub fn validate(&self, answers: &Answers) -> std::result::Result<(), ValidationError> {
        self.submission(answers).map(|_| ())
    }

    fn submission(&self, answers: &Answers) -> std::result::Result<Submission, ValidationError> {
        match &self.state {
            WizardState::SelectModule { candidates } => {
                let raw = required(answers, FIELD_MODULE)?;
                let module_id = ModuleId::from_user_input(raw).ok_or(ValidationError::EmptyModule)?;
                if !candidates.contains(&module_id) {
                    return Err(ValidationError::UnknownModule(raw.trim().to_string()));
                }
                self.ensure_not_configured(&module_id)?;
                Ok(Submission::Module(module_id))
            }
            WizardState::ManualEntry => {
                let raw = required(answers, FIELD_MODULE)?;
                if raw.trim().trim_end_matches('/').is_empty() {
                    return Err(ValidationError::EmptyModule);
                }
                let module_id = ModuleId::from_user_input(raw)
                    .ok_or_else(|| ValidationError::UnknownModule(raw.trim().to_string()))?;
                self.ensure_not_configured(&module_id)?;
                Ok(Submission::Module(module_id))
            }
            WizardState::ConfigureOutputs => {
                let value = required(answers, FIELD_ENABLE_OUTPUTS)?;
                Ok(Submission::Outputs(parse_toggle(FIELD_ENABLE_OUTPUTS, value)?))
            }
            WizardState::ConnectionFailed { .. } | WizardState::NoZonesFound => {
                let value = required(answers, FIELD_RETRY)?;
                Ok(Submission::Retry(parse_toggle(FIELD_RETRY, value)?))
            }
            WizardState::ConfigureZone { position } => {
                let draft = self
                    .drafts
                    .get(*position)
                    .ok_or(ValidationError::MissingField(FIELD_ENABLED))?;
                zone_submission(draft, answers).map(Submission::Zone)
            }
            WizardState::Discovering
            | WizardState::Enumerating
            | WizardState::Finalized(_)
            | WizardState::Aborted(_) => Err(ValidationError::MissingField(FIELD_MODULE)),
        }
    }

    fn ensure_not_configured(&self, module_id: &ModuleId) -> std::result::Result<(), ValidationError> {
        if self.already_configured.contains(module_id) {
            Err(ValidationError::AlreadyConfigured(module_id.clone()))
        } else {
            Ok(())
        }
    }

    /// Advances the machine by one input.
    ///
    /// Validation failures keep the current step and show up in the next
    /// [`Wizard::prompt`]. An input the current state does not accept is
    /// rejected with [`BridgeError::InvalidStateTransition`] and changes
    /// nothing.
    pub fn apply(&mut self, input: WizardInput) -> Result<()> {
        if self.is_finished() {
            return Err(self.misuse(&input));
        }

        let next = match (self.state.clone(), input) {
            (_, WizardInput::Abort) => WizardState::Aborted(AbortReason::Cancelled),
            (WizardState::Discovering, WizardInput::ModulesDiscovered(modules)) => {
                self.on_modules_discovered(modules)
            }
            (WizardState::Enumerating, WizardInput::ZonesEnumerated(candidates)) => {
                self.on_zones_enumerated(candidates)
            }
            (WizardState::Discovering, WizardInput::BrokerUnreachable(message)) => {
                WizardState::ConnectionFailed {
                    message,
                    phase: Phase::Discovery,
                }
            }
            (WizardState::Enumerating, WizardInput::BrokerUnreachable(message)) => {
                WizardState::ConnectionFailed {
                    message,
                    phase: Phase::Enumeration,
                }
            }
            (state, WizardInput::Submit(answers))
                if !matches!(state, WizardState::Discovering | WizardState::Enumerating) =>
            {
                match self.submission(&answers) {
                    Ok(submission) => {
                        self.errors.clear();
                        self.on_submission(submission)?
                    }
                    Err(e) => {
                        debug!("Validation failed in {}: {}", state.name(), e);
                        self.errors = vec![e];
                        return Ok(());
                    }
                }
            }
            (_, input) => return Err(self.misuse(&input)),
        };

        debug!("Wizard {} -> {}", self.state.name(), next.name());
        self.state = next;
        Ok(())
    }

    fn misuse(&self, input: &WizardInput) -> BridgeError {
        BridgeError::InvalidStateTransition(format!(
            "{} is not accepted in state {}",
            input.name(),
            self.state.name()
        ))
    }

    fn on_modules_discovered(&mut self, mut modules: Vec<ModuleId>) -> WizardState {
        match modules.len() {
            0 => {
                info!("No modules discovered, asking for manual entry");
                self.errors = vec![ValidationError::NoModulesFound];
                WizardState::ManualEntry
            }
            1 => {
                let module_id = modules.remove(0);
                if self.already_configured.contains(&module_id) {
                    warn!("Only discovered module {} is already configured", module_id);
                    return WizardState::Aborted(AbortReason::AlreadyConfigured(module_id));
                }
                info!("Auto-selected module {}", module_id);
                self.module_id = Some(module_id);
                WizardState::ConfigureOutputs
            }
            _ => WizardState::SelectModule {
                candidates: modules,
            },
        }
    }

    fn on_zones_enumerated(&mut self, candidates: Vec<ZoneCandidate>) -> WizardState {
        let outputs_enabled = self.outputs_enabled;
        let mut drafts: Vec<SensorConfig> = self
            .previous
            .iter()
            .filter(|s| outputs_enabled || !s.zone.is_output())
            .cloned()
            .collect();

        for candidate in candidates {
            if candidate.is_output() && !outputs_enabled {
                continue;
            }
            if !drafts.iter().any(|d| d.zone == candidate) {
                drafts.push(SensorConfig::with_defaults(candidate));
            }
        }

        self.drafts = drafts;
        if self.drafts.is_empty() {
            WizardState::NoZonesFound
        } else {
            info!("Configuring {} zone(s)", self.drafts.len());
            WizardState::ConfigureZone { position: 0 }
        }
    }

    fn on_submission(&mut self, submission: Submission) -> Result<WizardState> {
        let next = match (self.state.clone(), submission) {
            (_, Submission::Module(module_id)) => {
                info!("Selected module {}", module_id);
                self.module_id = Some(module_id);
                WizardState::ConfigureOutputs
            }
            (_, Submission::Outputs(enabled)) => {
                self.outputs_enabled = enabled;
                WizardState::Enumerating
            }
            (WizardState::ConnectionFailed { phase, .. }, Submission::Retry(true)) => match phase {
                Phase::Discovery => WizardState::Discovering,
                Phase::Enumeration => WizardState::Enumerating,
            },
            (WizardState::ConnectionFailed { message, .. }, Submission::Retry(false)) => {
                WizardState::Aborted(AbortReason::CannotConnect(message))
            }
            (_, Submission::Retry(true)) => WizardState::Enumerating,
            (_, Submission::Retry(false)) => self.finalize()?,
            (WizardState::ConfigureZone { position }, Submission::Zone(sensor)) => {
                if let Some(draft) = self.drafts.get_mut(position) {
                    *draft = sensor;
                }
                if position + 1 < self.drafts.len() {
                    WizardState::ConfigureZone {
                        position: position + 1,
                    }
                } else {
                    self.finalize()?
                }
            }
            (state, Submission::Zone(_)) => {
                return Err(BridgeError::InvalidStateTransition(format!(
                    "zone answers in state {}",
                    state.name()
                )))
            }
        };
        Ok(next)
    }

    fn finalize(&self) -> Result<WizardState> {
        let module_id = self.module_id.clone().ok_or_else(|| {
            BridgeError::InvalidStateTransition("finalize without a module".to_string())
        })?;
        let sensors = self.drafts.iter().filter(|d| d.enabled).cloned().collect();
        let config = IntegrationConfig::new(module_id, self.outputs_enabled, sensors);

        info!(
            "Integration {} finalized with {} sensor(s), outputs {}",
            config.module_id,
            config.sensors().len(),
            if config.outputs_enabled { "enabled" } else { "disabled" }
        );
        Ok(WizardState::Finalized(config))
    }
}

fn required<'a>(answers: &'a Answers, field: &'static str) -> std::result::Result<&'a str, ValidationError> {
    answers
        .get(field)
        .map(String::as_str)
        .ok_or(ValidationError::MissingField(field))
}

fn zone_submission(
    draft: &SensorConfig,
    answers: &Answers,
) -> std::result::Result<SensorConfig, ValidationError> {
    let enabled = parse_toggle(FIELD_ENABLED, required(answers, FIELD_ENABLED)?)?;

    let name = required(answers, FIELD_NAME)?.trim();
    let name = if !name.is_empty() {
        name.to_string()
    } else if enabled {
        return Err(ValidationError::EmptyName);
    } else {
        draft.name.clone()
    };

    let device_class = if draft.zone.is_output() {
        None
    } else {
        match answers.get(FIELD_DEVICE_CLASS) {
            Some(raw) => DeviceClass::parse_choice(raw)
                .map_err(|_| ValidationError::InvalidDeviceClass(raw.clone()))?,
            None if enabled => return Err(ValidationError::MissingField(FIELD_DEVICE_CLASS)),
            None => draft.device_class,
        }
    };

    Ok(SensorConfig {
        enabled,
        name,
        device_class,
        zone: draft.zone,
    })
}
