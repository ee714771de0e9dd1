//! Telit Modem Agent
//!
//! Daemon that owns one Telit module behind a serial multiplexer.
//!
//! - Watches the multiplexer's device node and creates or removes the modem
//!   as it comes and goes
//! - Powers the module on and brings up every facility the model supports
//! - Logs property, SIM and lifecycle events, optionally as JSON lines
//! - In `--simulate` mode, drives the in-memory simulator instead of a tty

mod serial;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use crossbeam_channel::{bounded, select, tick, Receiver};
use tracing_subscriber::EnvFilter;

use telit_core::config::TelitConfig;
use telit_core::facility::Registries;
use telit_core::modem::{ModemModel, ModemPorts};
use telit_core::notify::{EventBus, ModemEvent};
use telit_core::presence::{
    ChannelSource, DeviceProbe, EventSource, FakeDevice, NotifySource, PathProbe, PresenceHandle,
    PresenceWatcher,
};
use telit_core::runtime::{ChannelFactory, Core, CoreHandle, CoreRuntime};
use telit_core::sim::SimulatedModem;
use telit_core::transport::AtChannel;

/// Telit modem agent daemon.
#[derive(Parser, Debug)]
#[command(name = "telit-agent", about = "Telit cellular modem agent")]
struct Cli {
    /// TOML configuration file.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Run against the in-memory simulator instead of a tty.
    #[arg(long, default_value_t = false)]
    simulate: bool,

    /// Directory holding the multiplexer device nodes.
    #[arg(long)]
    device_dir: Option<PathBuf>,

    /// Modem model override (`telit_serial`, `le910v2` or `ge910`).
    #[arg(long)]
    model: Option<String>,

    /// Print every modem event as a JSON line on stdout.
    #[arg(long, default_value_t = false)]
    json: bool,

    /// Seconds between status reports; 0 disables them.
    #[arg(long, default_value_t = 60)]
    report_interval: u64,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let config = resolve_config(&cli)?;

    tracing::info!(
        model = %config.modem.model,
        device = %config.presence.device_path().display(),
        simulate = cli.simulate,
        "telit-agent starting"
    );

    let registries = Arc::new(Registries::with_telit().context("registering Telit drivers")?);
    let (bus, events) = EventBus::channel();
    let presence = PresenceHandle::new();
    let (action_tx, action_rx) = bounded(16);

    // Kept alive for the whole run so the simulated source never closes.
    let mut _sim_events = None;
    let (probe, source, factory): (Arc<dyn DeviceProbe>, Box<dyn EventSource>, Box<dyn ChannelFactory>) =
        if cli.simulate {
            let (tx, source) = ChannelSource::new();
            _sim_events = Some(tx);
            (
                Arc::new(FakeDevice::new(true)),
                Box::new(source),
                Box::new(|_: &ModemPorts, _: &CoreHandle| -> std::io::Result<Arc<dyn AtChannel>> {
                    let channel: Arc<dyn AtChannel> = Arc::new(SimulatedModem::telit());
                    Ok(channel)
                }),
            )
        } else {
            let source = NotifySource::watch(&config.presence.device_dir, &config.presence.mux_device)
                .with_context(|| format!("watching {}", config.presence.device_dir.display()))?;
            (
                Arc::new(PathProbe::new(config.presence.device_path())),
                Box::new(source),
                Box::new(|ports: &ModemPorts, core: &CoreHandle| serial::open(&ports.aux, core.clone())),
            )
        };

    let core = Core::new(
        config.modem.model,
        config.presence.ports(),
        probe.clone(),
        presence.clone(),
        factory,
        registries,
        bus,
    );
    let mut runtime = CoreRuntime::start(core, action_rx).context("starting core runtime")?;
    let mut watcher = PresenceWatcher::start(&config.presence, probe, source, presence, action_tx)
        .context("starting presence watcher")?;

    let (stop_tx, stop_rx) = bounded(1);
    ctrlc::set_handler(move || {
        let _ = stop_tx.try_send(());
    })
    .context("installing Ctrl-C handler")?;

    run(&runtime.handle(), &events, &stop_rx, &cli);

    tracing::info!("shutting down");
    watcher.shutdown();
    runtime.shutdown();
    for event in events.try_iter() {
        log_event(&event, cli.json);
    }
    Ok(())
}

fn resolve_config(cli: &Cli) -> Result<TelitConfig> {
    let mut config = match &cli.config {
        Some(path) => TelitConfig::load(path).with_context(|| format!("loading {}", path.display()))?,
        None => TelitConfig::default(),
    };
    if let Some(dir) = &cli.device_dir {
        config.presence.device_dir = dir.clone();
    }
    if let Some(model) = &cli.model {
        config.modem.model = model
            .parse::<ModemModel>()
            .with_context(|| format!("--model {model}"))?;
    }
    Ok(config)
}

fn run(core: &CoreHandle, events: &Receiver<ModemEvent>, stop: &Receiver<()>, cli: &Cli) {
    let report = if cli.report_interval == 0 {
        crossbeam_channel::never()
    } else {
        tick(Duration::from_secs(cli.report_interval))
    };
    loop {
        select! {
            recv(events) -> event => match event {
                Ok(event) => log_event(&event, cli.json),
                Err(_) => break,
            },
            recv(report) -> _ => request_report(core),
            recv(stop) -> _ => break,
        }
    }
}

fn log_event(event: &ModemEvent, json: bool) {
    if json {
        match serde_json::to_string(event) {
            Ok(line) => println!("{line}"),
            Err(err) => tracing::warn!(error = %err, "cannot encode event"),
        }
    }
    match event {
        ModemEvent::ModemAdded { model } => tracing::info!(model = %model, "modem added"),
        ModemEvent::ModemRemoved => tracing::info!("modem removed"),
        ModemEvent::Powered { powered } => tracing::info!(powered, "modem power"),
        ModemEvent::SimInserted { inserted } => tracing::info!(inserted, "SIM presence"),
        ModemEvent::SimReady => tracing::info!("SIM ready"),
        ModemEvent::PropertyChanged {
            facility,
            property,
            value,
        } => tracing::info!(facility = %facility, property = %property, value = %value, "property changed"),
    }
}

/// Ask the live modem, if any, for the properties worth watching.
fn request_report(core: &CoreHandle) {
    core.invoke(|core| {
        let Some(modem) = core.modem() else {
            tracing::info!(presence = %core.presence(), "no modem");
            return;
        };
        let facilities = modem.facilities();
        tracing::info!(
            model = %modem.model(),
            powered = modem.is_powered(),
            sim = ?modem.sim(),
            "status report"
        );
        if let Some(radio) = &facilities.radio_settings {
            radio.query_rat_mode(|result| match result {
                Ok(mode) => tracing::info!(mode = ?mode, "radio access mode"),
                Err(err) => tracing::warn!(error = %err, "radio access mode unavailable"),
            });
        }
        if let Some(data) = &facilities.data_network {
            data.get_rf_status(|result| match result {
                Ok(status) => tracing::info!(status = ?status, "RF status"),
                Err(err) => tracing::warn!(error = %err, "RF status unavailable"),
            });
        }
    });
}
