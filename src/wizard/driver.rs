//! Runs a [`Wizard`] to completion against a broker link and a UI.

use super::{Effect, Prompt, Wizard, WizardInput, WizardOutcome};
use crate::discovery::{discover, enumerate, CollectWindow};
use crate::error::{BridgeError, Result};
use crate::mqtt::BrokerLink;
use crate::wizard::Answers;
use async_trait::async_trait;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Renders prompts and collects answers.
#[async_trait]
pub trait WizardUi: Send {
    /// Shows `prompt` and waits for the submission; `None` aborts setup.
    async fn ask(&mut self, prompt: &Prompt) -> Option<Answers>;

    /// Progress message while an effect runs.
    fn notify(&mut self, _message: &str) {}
}

/// Collection windows for the two effect states.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SetupWindows {
    pub modules: CollectWindow,
    pub zones: CollectWindow,
}

pub async fn run(
    mut wizard: Wizard,
    link: &dyn BrokerLink,
    ui: &mut dyn WizardUi,
    windows: &SetupWindows,
    cancel: &CancellationToken,
) -> Result<WizardOutcome> {
    loop {
        if let Some(outcome) = wizard.outcome() {
            info!("Setup finished: {:?}", outcome_label(&outcome));
            return Ok(outcome);
        }

        let input = match wizard.effect() {
            Some(Effect::Discover) => {
                ui.notify("Searching for SelfMon modules...");
                match discover(link, &windows.modules, cancel).await {
                    Ok(modules) => WizardInput::ModulesDiscovered(modules),
                    Err(e) => broker_failure(e)?,
                }
            }
            Some(Effect::Enumerate {
                module_id,
                outputs_enabled,
            }) => {
                ui.notify(&format!("Searching for zones of {}...", module_id.root_topic()));
                match enumerate(link, &module_id, outputs_enabled, &windows.zones, cancel).await {
                    Ok(candidates) => WizardInput::ZonesEnumerated(candidates),
                    Err(e) => broker_failure(e)?,
                }
            }
            None => {
                let prompt = wizard.prompt().ok_or_else(|| {
                    BridgeError::InvalidStateTransition(format!(
                        "no prompt in state {:?}",
                        wizard.state()
                    ))
                })?;
                tokio::select! {
                    _ = cancel.cancelled() => {
                        return Err(BridgeError::Cancelled("setup wizard".to_string()));
                    }
                    answers = ui.ask(&prompt) => match answers {
                        Some(answers) => WizardInput::Submit(answers),
                        None => WizardInput::Abort,
                    },
                }
            }
        };

        wizard.apply(input)?;
    }
}

/// Turns a failed effect into the wizard's retry path; cancellation ends the run.
fn broker_failure(error: BridgeError) -> Result<WizardInput> {
    match error {
        BridgeError::Cancelled(_) => Err(error),
        other => {
            warn!("Broker failure during setup: {}", other);
            Ok(WizardInput::BrokerUnreachable(other.to_string()))
        }
    }
}

fn outcome_label(outcome: &WizardOutcome) -> String {
    match outcome {
        WizardOutcome::Finished(config) => format!("finished {}", config.module_id),
        WizardOutcome::Aborted(reason) => format!("aborted ({})", reason.key()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mqtt::MemoryBroker;
    use crate::wizard::StepId;
    use std::collections::{BTreeSet, VecDeque};
    use std::time::Duration;

    /// Answers prompts from a script, falling back to the defaults.
    struct ScriptedUi {
        script: VecDeque<Option<Vec<(&'static str, &'static str)>>>,
        seen: Vec<StepId>,
    }

    impl ScriptedUi {
        fn new(script: Vec<Option<Vec<(&'static str, &'static str)>>>) -> Self {
            Self {
                script: script.into(),
                seen: Vec::new(),
            }
        }
    }

    #[async_trait]
    impl WizardUi for ScriptedUi {
        async fn ask(&mut self, prompt: &Prompt) -> Option<Answers> {
            self.seen.push(prompt.step);
            let overrides = self.script.pop_front().flatten()?;
            let mut answers = prompt.defaults();
            for (key, value) in overrides {
                answers.insert(key.to_string(), value.to_string());
            }
            Some(answers)
        }
    }

    fn windows() -> SetupWindows {
        SetupWindows {
            modules: CollectWindow::fixed(Duration::from_secs(8)),
            zones: CollectWindow::fixed(Duration::from_secs(10)),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn unreachable_broker_offers_retry_then_aborts() {
        let broker = MemoryBroker::unreachable();
        let mut ui = ScriptedUi::new(vec![Some(vec![("retry", "false")])]);

        let outcome = run(
            Wizard::create(BTreeSet::new()),
            &broker,
            &mut ui,
            &windows(),
            &CancellationToken::new(),
        )
        .await
        .unwrap();

        assert_eq!(ui.seen, vec![StepId::ConnectionFailed]);
        assert!(matches!(outcome, WizardOutcome::Aborted(reason) if reason.key() == "cannot_connect"));
    }

    #[tokio::test(start_paused = true)]
    async fn retry_succeeds_once_the_broker_is_back() {
        let broker = MemoryBroker::unreachable();
        broker.publish_retained("selfmon/vmod.abc/prio/inputs/read/1", "0");
        let link = broker.clone();

        struct ReconnectingUi {
            broker: MemoryBroker,
        }

        #[async_trait]
        impl WizardUi for ReconnectingUi {
            async fn ask(&mut self, prompt: &Prompt) -> Option<Answers> {
                if prompt.step == StepId::ConnectionFailed {
                    self.broker.set_connected(true);
                }
                Some(prompt.defaults())
            }
        }

        let mut ui = ReconnectingUi { broker };
        let outcome = run(
            Wizard::create(BTreeSet::new()),
            &link,
            &mut ui,
            &windows(),
            &CancellationToken::new(),
        )
        .await
        .unwrap();

        let WizardOutcome::Finished(config) = outcome else {
            panic!("expected a finished setup");
        };
        assert_eq!(config.module_id.as_str(), "abc");
        assert_eq!(config.sensors().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn closing_the_ui_aborts() {
        let broker = MemoryBroker::new();
        broker.publish_retained("selfmon/vmod.abc/version", "1");
        let mut ui = ScriptedUi::new(vec![None]);

        let outcome = run(
            Wizard::create(BTreeSet::new()),
            &broker,
            &mut ui,
            &windows(),
            &CancellationToken::new(),
        )
        .await
        .unwrap();
        assert_eq!(ui.seen, vec![StepId::ConfigureOutputs]);
        assert!(matches!(outcome, WizardOutcome::Aborted(_)));
    }

    #[tokio::test(start_paused = true)]
    async fn cancellation_stops_discovery() {
        let broker = MemoryBroker::new();
        let cancel = CancellationToken::new();
        cancel.cancel();
        let mut ui = ScriptedUi::new(vec![]);

        let result = run(
            Wizard::create(BTreeSet::new()),
            &broker,
            &mut ui,
            &windows(),
            &cancel,
        )
        .await;
        assert!(matches!(result, Err(BridgeError::Cancelled(_))));
        assert_eq!(broker.subscription_count(), 0);
    }
}
