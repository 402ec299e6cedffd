use color_eyre::{eyre::eyre, Result};
use selfmon_bridge::config::BridgeConfig;
use selfmon_bridge::host::LogHost;
use selfmon_bridge::mqtt::{BrokerLink, RumqttLink};
use selfmon_bridge::persistence::{IntegrationConfig, IntegrationStore};
use selfmon_bridge::runtime::RuntimeSubscriber;
use selfmon_bridge::ui::ConsoleUi;
use selfmon_bridge::wizard::{self, SetupWindows, Wizard, WizardOutcome, WizardUi};
use selfmon_bridge::BridgeError;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn, Level};
use tracing_subscriber::FmtSubscriber;

#[tokio::main]
async fn main() -> Result<()> {
    setup()?;

    let config_path = BridgeConfig::default_path();
    let config = BridgeConfig::ensure_default_config(&config_path).await?;
    info!("Using config {}", config_path.display());

    let store = IntegrationStore::new(&config.state_dir);

    let mut link = RumqttLink::start(&config.mqtt);
    let connect_timeout = Duration::from_secs(config.mqtt.connect_timeout_secs);
    if !link.wait_connected(connect_timeout).await {
        warn!(
            "Broker {}:{} not reachable after {:?}",
            config.mqtt.host, config.mqtt.port, connect_timeout
        );
    }

    let shutdown = CancellationToken::new();
    let mut ui = ConsoleUi::stdin();
    let integrations = setup_integrations(&store, &link, &mut ui, &config, &shutdown).await?;

    if integrations.is_empty() {
        warn!("No integration configured, exiting");
        link.shutdown().await;
        return Ok(());
    }

    let ctrl_c = shutdown.clone();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => info!("Ctrl+C received, shutting down"),
            Err(e) => error!("Failed to listen for Ctrl+C: {}", e),
        }
        ctrl_c.cancel();
    });

    let retry_delay = Duration::from_millis(config.mqtt.reconnect_delay_ms.max(1000));
    let mut running = Vec::new();
    for integration in integrations {
        let module_id = integration.module_id.clone();
        match RuntimeSubscriber::create(integration)
            .start_when_connected(&link, Box::new(LogHost), retry_delay, &shutdown)
            .await
        {
            Ok(runtime) => running.push(runtime),
            Err(BridgeError::Cancelled(_)) => break,
            Err(e) => error!("Failed to start runtime for {}: {}", module_id, e),
        }
    }

    if !shutdown.is_cancelled() {
        info!("Bridge running with {} integration(s), press Ctrl+C to stop", running.len());
        shutdown.cancelled().await;
    }

    for runtime in running {
        let stopped = runtime.stop().await;
        if let Some(report) = stopped.report() {
            info!(
                "{}: {} message(s), {} update(s), {} rejected",
                stopped.config().module_id,
                report.messages,
                report.updates,
                report.rejected
            );
        }
    }
    link.shutdown().await;
    Ok(())
}

fn setup() -> Result<()> {
    if std::env::var("RUST_LIB_BACKTRACE").is_err() {
        std::env::set_var("RUST_LIB_BACKTRACE", "0")
    }
    color_eyre::install()?;
    if std::env::var("RUST_LOG").is_err() {
        std::env::set_var("RUST_LOG", "info")
    }
    setup_logging_env();
    Ok(())
}

fn setup_logging_env() {
    FmtSubscriber::builder()
        .with_max_level(Level::INFO)
        .with_target(false)
        .with_thread_ids(true)
        .with_file(true)
        .with_line_number(true)
        .pretty()
        .init();
}

/// Stored integrations, after optional reconfiguration or addition.
async fn setup_integrations(
    store: &IntegrationStore,
    link: &dyn BrokerLink,
    ui: &mut ConsoleUi<tokio::io::BufReader<tokio::io::Stdin>>,
    config: &BridgeConfig,
    cancel: &CancellationToken,
) -> Result<Vec<IntegrationConfig>> {
    let windows = config.discovery.windows();
    let mut integrations = store.load_all().await?;

    if integrations.is_empty() {
        info!("No integration stored, starting setup");
        let wizard = Wizard::create(store.configured_modules().await?);
        if let Some(created) = run_setup(wizard, link, &mut *ui, &windows, cancel).await? {
            store.save(&created).await?;
            integrations.push(created);
        }
        return Ok(integrations);
    }

    if ui.confirm("Reconfigure stored integrations?", false).await {
        for existing in integrations.iter_mut() {
            println!("\nReconfiguring {}", existing.title());
            let wizard = Wizard::reconfigure(existing.clone());
            if let Some(updated) = run_setup(wizard, link, &mut *ui, &windows, cancel).await? {
                store.save(&updated).await?;
                *existing = updated;
            }
        }
    }

    if ui.confirm("Add another module?", false).await {
        let wizard = Wizard::create(store.configured_modules().await?);
        if let Some(created) = run_setup(wizard, link, &mut *ui, &windows, cancel).await? {
            store.save(&created).await?;
            integrations.push(created);
        }
    }

    Ok(integrations)
}

async fn run_setup(
    wizard: Wizard,
    link: &dyn BrokerLink,
    ui: &mut dyn WizardUi,
    windows: &SetupWindows,
    cancel: &CancellationToken,
) -> Result<Option<IntegrationConfig>> {
    let outcome = wizard::run(wizard, link, ui, windows, cancel)
        .await
        .map_err(|e| eyre!("Setup failed: {}", e))?;

    match outcome {
        WizardOutcome::Finished(config) => Ok(Some(config)),
        WizardOutcome::Aborted(reason) => {
            warn!("Setup aborted: {}", reason);
            Ok(None)
        }
    }
}
