//! # Core Runtime
//!
//! Every modem operation, transport completion and presence action runs on
//! one thread, `telit-core`. Other threads talk to it through a
//! [`CoreHandle`], which posts closures into a bounded inbox; presence
//! actions arrive on their own channel and are selected alongside it.
//!
//! The [`Core`] owns at most one [`Modem`]. It re-checks the device and the
//! presence state before creating or removing one, so a late action never
//! produces a second instance or removes a live one.

use std::io;
use std::sync::Arc;
use std::thread;

use crossbeam_channel::{bounded, select, Receiver, Sender};

use crate::facility::Registries;
use crate::modem::{Modem, ModemModel, ModemPorts};
use crate::notify::{EventBus, ModemEvent};
use crate::presence::{DeviceProbe, PresenceAction, PresenceHandle, PresenceState};
use crate::transport::AtChannel;

enum CoreMessage {
    Invoke(Box<dyn FnOnce(&mut Core) + Send>),
    Shutdown,
}

/// Cloneable way into the core thread.
#[derive(Clone)]
pub struct CoreHandle {
    tx: Sender<CoreMessage>,
}

impl CoreHandle {
    /// Run `f` on the core thread with access to the [`Core`]. Returns false
    /// once the core has stopped.
    pub fn invoke(&self, f: impl FnOnce(&mut Core) + Send + 'static) -> bool {
        self.tx.send(CoreMessage::Invoke(Box::new(f))).is_ok()
    }

    /// Run `f` on the core thread.
    pub fn post(&self, f: impl FnOnce() + Send + 'static) -> bool {
        self.invoke(move |_| f())
    }

    /// Queue a presence action behind everything already posted.
    pub fn presence(&self, action: PresenceAction) -> bool {
        let handle = self.clone();
        self.invoke(move |core| core.handle_presence(action, &handle))
    }
}

/// Opens the AT channel of a freshly attached modem.
pub trait ChannelFactory: Send {
    fn open(&self, ports: &ModemPorts, core: &CoreHandle) -> io::Result<Arc<dyn AtChannel>>;
}

impl<F> ChannelFactory for F
where
    F: Fn(&ModemPorts, &CoreHandle) -> io::Result<Arc<dyn AtChannel>> + Send,
{
    fn open(&self, ports: &ModemPorts, core: &CoreHandle) -> io::Result<Arc<dyn AtChannel>> {
        self(ports, core)
    }
}

pub struct Core {
    model: ModemModel,
    ports: ModemPorts,
    probe: Arc<dyn DeviceProbe>,
    presence: PresenceHandle,
    factory: Box<dyn ChannelFactory>,
    registries: Arc<Registries>,
    bus: EventBus,
    modem: Option<Modem>,
}

impl Core {
    pub fn new(
        model: ModemModel,
        ports: ModemPorts,
        probe: Arc<dyn DeviceProbe>,
        presence: PresenceHandle,
        factory: Box<dyn ChannelFactory>,
        registries: Arc<Registries>,
        bus: EventBus,
    ) -> Self {
        Self {
            model,
            ports,
            probe,
            presence,
            factory,
            registries,
            bus,
            modem: None,
        }
    }

    pub fn modem(&self) -> Option<&Modem> {
        self.modem.as_ref()
    }

    pub fn presence(&self) -> PresenceState {
        self.presence.get()
    }

    pub fn handle_presence(&mut self, action: PresenceAction, handle: &CoreHandle) {
        match action {
            PresenceAction::Create => self.create_modem(handle),
            PresenceAction::Remove => self.remove_modem(),
        }
    }

    /// A channel that cannot be opened leaves presence `Detached`, so the
    /// next device event tries again.
    fn create_modem(&mut self, handle: &CoreHandle) {
        let exists = self.probe.exists();
        let state = self.presence.get();
        if !exists || self.modem.is_some() || state != PresenceState::Attached {
            tracing::warn!(
                exists,
                modem = self.modem.is_some(),
                state = %state,
                "skipping modem creation"
            );
            if !exists {
                self.presence.set(PresenceState::Detached);
            }
            return;
        }

        let channel = match self.factory.open(&self.ports, handle) {
            Ok(channel) => channel,
            Err(err) => {
                tracing::error!(error = %err, aux = %self.ports.aux.display(), "cannot open modem channel");
                self.presence.set(PresenceState::Detached);
                return;
            }
        };
        let modem = Modem::new(
            self.model,
            self.ports.clone(),
            channel,
            Arc::clone(&self.registries),
            self.bus.clone(),
        );
        self.bus.emit(ModemEvent::ModemAdded {
            model: self.model.to_string(),
        });
        modem.bring_up(|result| {
            if let Err(err) = result {
                tracing::warn!(error = %err, "modem bring-up failed");
            }
        });
        self.modem = Some(modem);
    }

    fn remove_modem(&mut self) {
        let exists = self.probe.exists();
        let state = self.presence.get();
        if exists || self.modem.is_none() || state != PresenceState::Detached {
            tracing::warn!(
                exists,
                modem = self.modem.is_some(),
                state = %state,
                "skipping modem removal"
            );
            if exists {
                self.presence.set(PresenceState::Attached);
            }
            return;
        }
        self.drop_modem();
    }

    fn drop_modem(&mut self) {
        if let Some(modem) = self.modem.take() {
            modem.remove();
            self.bus.emit(ModemEvent::ModemRemoved);
        }
    }
}

/// Owns the `telit-core` thread. Dropping it removes the modem, if any, and
/// stops the thread.
pub struct CoreRuntime {
    handle: CoreHandle,
    join: Option<thread::JoinHandle<()>>,
}

impl CoreRuntime {
    pub fn start(core: Core, actions: Receiver<PresenceAction>) -> io::Result<Self> {
        let (tx, rx) = bounded(64);
        let handle = CoreHandle { tx };
        let worker_handle = handle.clone();
        let join = thread::Builder::new()
            .name("telit-core".into())
            .spawn(move || core_worker(core, rx, actions, worker_handle))?;
        Ok(Self {
            handle,
            join: Some(join),
        })
    }

    pub fn handle(&self) -> CoreHandle {
        self.handle.clone()
    }

    /// Stops the core thread. Idempotent.
    pub fn shutdown(&mut self) {
        let _ = self.handle.tx.send(CoreMessage::Shutdown);
        if let Some(join) = self.join.take() {
            let _ = join.join();
        }
    }
}

impl Drop for CoreRuntime {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn core_worker(
    mut core: Core,
    inbox: Receiver<CoreMessage>,
    actions: Receiver<PresenceAction>,
    handle: CoreHandle,
) {
    tracing::info!(model = %core.model, "core runtime started");
    let mut actions = actions;
    loop {
        let mut presence_closed = false;
        select! {
            recv(inbox) -> msg => match msg {
                Ok(CoreMessage::Invoke(f)) => f(&mut core),
                Ok(CoreMessage::Shutdown) | Err(_) => break,
            },
            recv(actions) -> action => match action {
                Ok(action) => core.handle_presence(action, &handle),
                Err(_) => presence_closed = true,
            },
        }
        // A closed presence channel only stops presence handling.
        if presence_closed {
            tracing::debug!("presence channel closed");
            actions = crossbeam_channel::never();
        }
    }
    core.drop_modem();
    tracing::info!("core runtime stopped");
}

// ─── Tests ──────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::presence::FakeDevice;
    use crate::sim::SimulatedModem;
    use std::time::Duration;

    struct Rig {
        device: Arc<FakeDevice>,
        presence: PresenceHandle,
        actions: Sender<PresenceAction>,
        events: Receiver<ModemEvent>,
        runtime: CoreRuntime,
    }

    fn rig() -> Rig {
        let sim = Arc::new(SimulatedModem::telit());
        rig_with(Box::new(move |_: &ModemPorts, _: &CoreHandle| -> io::Result<Arc<dyn AtChannel>> {
            let channel: Arc<dyn AtChannel> = sim.clone();
            Ok(channel)
        }))
    }

    fn rig_with(factory: Box<dyn ChannelFactory>) -> Rig {
        let device = Arc::new(FakeDevice::new(false));
        let presence = PresenceHandle::new();
        let (bus, events) = EventBus::channel();
        let core = Core::new(
            ModemModel::TelitSerial,
            ModemPorts::in_dir("/dev", "ttyMUX1", "ttyMUX2"),
            device.clone(),
            presence.clone(),
            factory,
            Arc::new(Registries::with_telit().unwrap()),
            bus,
        );
        let (actions, action_rx) = bounded(16);
        let runtime = CoreRuntime::start(core, action_rx).unwrap();
        Rig {
            device,
            presence,
            actions,
            events,
            runtime,
        }
    }

    fn has_modem(handle: &CoreHandle) -> bool {
        let (tx, rx) = bounded(1);
        handle.invoke(move |core| {
            let _ = tx.send(core.modem().is_some());
        });
        rx.recv_timeout(Duration::from_secs(2)).unwrap()
    }

    fn next_lifecycle(events: &Receiver<ModemEvent>) -> ModemEvent {
        loop {
            let event = events.recv_timeout(Duration::from_secs(2)).unwrap();
            if matches!(event, ModemEvent::ModemAdded { .. } | ModemEvent::ModemRemoved) {
                return event;
            }
        }
    }

    #[test]
    fn create_then_remove_one_modem() {
        let rig = rig();
        rig.device.set_present(true);
        rig.presence.set(PresenceState::Attached);
        rig.actions.send(PresenceAction::Create).unwrap();
        assert_eq!(
            next_lifecycle(&rig.events),
            ModemEvent::ModemAdded {
                model: "telit_serial".into()
            }
        );
        assert!(has_modem(&rig.runtime.handle()));

        rig.device.set_present(false);
        rig.presence.set(PresenceState::Detached);
        rig.actions.send(PresenceAction::Remove).unwrap();
        assert_eq!(next_lifecycle(&rig.events), ModemEvent::ModemRemoved);
        assert!(!has_modem(&rig.runtime.handle()));
    }

    #[test]
    fn create_for_a_vanished_device_resets_presence() {
        let rig = rig();
        let handle = rig.runtime.handle();
        rig.presence.set(PresenceState::Attached);
        handle.presence(PresenceAction::Create);
        assert!(!has_modem(&handle));
        assert_eq!(rig.presence.get(), PresenceState::Detached);
    }

    #[test]
    fn second_create_is_ignored() {
        let rig = rig();
        let handle = rig.runtime.handle();
        rig.device.set_present(true);
        rig.presence.set(PresenceState::Attached);
        handle.presence(PresenceAction::Create);
        handle.presence(PresenceAction::Create);
        assert!(has_modem(&handle));
        let added = rig
            .events
            .try_iter()
            .filter(|e| matches!(e, ModemEvent::ModemAdded { .. }))
            .count();
        assert_eq!(added, 1, "at most one modem instance");
    }

    #[test]
    fn remove_while_device_present_restores_attached() {
        let rig = rig();
        let handle = rig.runtime.handle();
        rig.device.set_present(true);
        rig.presence.set(PresenceState::Attached);
        handle.presence(PresenceAction::Create);
        assert!(has_modem(&handle));

        rig.presence.set(PresenceState::Detached);
        handle.presence(PresenceAction::Remove);
        assert!(has_modem(&handle), "device still exists");
        assert_eq!(rig.presence.get(), PresenceState::Attached);
    }

    #[test]
    fn failed_channel_open_allows_a_retry() {
        let opened = Arc::new(std::sync::atomic::AtomicUsize::new(0));
        let attempts = opened.clone();
        let rig = rig_with(Box::new(move |_: &ModemPorts, _: &CoreHandle| -> io::Result<Arc<dyn AtChannel>> {
            if attempts.fetch_add(1, std::sync::atomic::Ordering::SeqCst) == 0 {
                return Err(io::Error::new(io::ErrorKind::NotFound, "tty not ready"));
            }
            let channel: Arc<dyn AtChannel> = Arc::new(SimulatedModem::telit());
            Ok(channel)
        }));
        let handle = rig.runtime.handle();
        rig.device.set_present(true);
        rig.presence.set(PresenceState::Attached);

        handle.presence(PresenceAction::Create);
        assert!(!has_modem(&handle));
        assert_eq!(rig.presence.get(), PresenceState::Detached, "next event starts over");

        rig.presence.set(PresenceState::Attached);
        handle.presence(PresenceAction::Create);
        assert!(has_modem(&handle));
        assert_eq!(opened.load(std::sync::atomic::Ordering::SeqCst), 2);
    }

    #[test]
    fn post_runs_on_the_core_thread() {
        let rig = rig();
        let (tx, rx) = bounded(1);
        assert!(rig.runtime.handle().post(move || {
            let _ = tx.send(thread::current().name().map(str::to_string));
        }));
        assert_eq!(rx.recv_timeout(Duration::from_secs(2)).unwrap().as_deref(), Some("telit-core"));
    }

    #[test]
    fn shutdown_removes_the_modem() {
        let mut rig = rig();
        rig.device.set_present(true);
        rig.presence.set(PresenceState::Attached);
        rig.runtime.handle().presence(PresenceAction::Create);
        assert!(has_modem(&rig.runtime.handle()));
        rig.runtime.shutdown();
        rig.runtime.shutdown();
        assert!(rig.events.try_iter().any(|e| e == ModemEvent::ModemRemoved));
        assert!(!rig.runtime.handle().post(|| ()));
    }
}
