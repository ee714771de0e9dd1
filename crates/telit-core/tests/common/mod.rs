#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use crossbeam_channel::{bounded, Receiver};
use telit_core::engine::CommandEngine;
use telit_core::facility::Registries;
use telit_core::notify::{EventBus, ModemEvent};
use telit_core::sim::SimulatedModem;
use telit_core::transport::AtChannel;
use telit_core::Result;

pub struct Rig {
    pub sim: Arc<SimulatedModem>,
    pub engine: CommandEngine,
    pub registries: Registries,
    pub bus: EventBus,
    pub events: Receiver<ModemEvent>,
}

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Telit drivers over a simulated LE910-class modem.
pub fn rig() -> Rig {
    init_tracing();
    let sim = Arc::new(SimulatedModem::telit());
    let channel: Arc<dyn AtChannel> = sim.clone();
    let (bus, events) = EventBus::channel();
    Rig {
        sim,
        engine: CommandEngine::new(channel),
        registries: Registries::with_telit().expect("Telit drivers register"),
        bus,
        events,
    }
}

/// Completion callback paired with the receiver that collects its reply.
pub fn reply<T: Send + 'static>() -> (impl FnOnce(Result<T>) + Send + 'static, Receiver<Result<T>>) {
    let (tx, rx) = bounded(1);
    (
        move |r: Result<T>| {
            let _ = tx.send(r);
        },
        rx,
    )
}

pub fn take<T>(rx: &Receiver<Result<T>>) -> Result<T> {
    rx.recv_timeout(Duration::from_secs(2)).expect("operation replied")
}
