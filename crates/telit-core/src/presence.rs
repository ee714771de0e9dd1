//! # Device Presence
//!
//! Watches the multiplexer's device node and walks a four-state machine
//! around it:
//!
//! ```text
//! Detached ──appears──▶ Attaching ──open_delay──▶ Attached
//!    ▲                                               │
//!    └──close_delay── Detaching ◀──────vanishes──────┘
//! ```
//!
//! The watcher thread blocks on filesystem notifications for the device
//! directory ([`NotifySource`]). Every event first waits `detect_delay` and
//! is then judged against the current filesystem state, so bursts of events
//! collapse into one check. The watcher only decides; creating and removing
//! the modem happens on the core thread, which receives a
//! [`PresenceAction`] over a channel and re-checks before acting.
//!
//! ## Usage
//!
//! ```no_run
//! use std::sync::Arc;
//! use telit_core::config::PresenceConfig;
//! use telit_core::presence::{NotifySource, PathProbe, PresenceHandle, PresenceWatcher};
//!
//! let config = PresenceConfig::default();
//! let probe = Arc::new(PathProbe::new(config.device_path()));
//! let source = NotifySource::watch(&config.device_dir, &config.mux_device).unwrap();
//! let (tx, rx) = crossbeam_channel::bounded(16);
//! let watcher = PresenceWatcher::start(&config, probe, Box::new(source), PresenceHandle::new(), tx).unwrap();
//! # drop((watcher, rx));
//! ```

use std::ffi::{OsStr, OsString};
use std::fmt;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use crossbeam_channel::{bounded, select, Receiver, RecvTimeoutError, Sender};
use notify::event::{ModifyKind, RenameMode};
use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};

use crate::config::PresenceConfig;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PresenceState {
    #[default]
    Detached,
    Attaching,
    Attached,
    Detaching,
}

impl fmt::Display for PresenceState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            PresenceState::Detached => "detached",
            PresenceState::Attaching => "attaching",
            PresenceState::Attached => "attached",
            PresenceState::Detaching => "detaching",
        };
        f.write_str(s)
    }
}

/// What the core thread should do after a completed transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PresenceAction {
    Create,
    Remove,
}

/// Presence state shared between the watcher and the core thread.
#[derive(Debug, Clone, Default)]
pub struct PresenceHandle {
    state: Arc<Mutex<PresenceState>>,
}

impl PresenceHandle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self) -> PresenceState {
        *self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn set(&self, next: PresenceState) {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        if *state != next {
            tracing::debug!(from = %*state, to = %next, "presence transition");
            *state = next;
        }
    }
}

// ─── Device probes ──────────────────────────────────────────────────────────

pub trait DeviceProbe: Send + Sync {
    fn exists(&self) -> bool;
}

/// Existence of a path on the filesystem.
#[derive(Debug, Clone)]
pub struct PathProbe {
    path: PathBuf,
}

impl PathProbe {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl DeviceProbe for PathProbe {
    fn exists(&self) -> bool {
        std::fs::metadata(&self.path).is_ok()
    }
}

/// In-memory device for tests and the simulator.
#[derive(Debug, Default)]
pub struct FakeDevice {
    present: AtomicBool,
}

impl FakeDevice {
    pub fn new(present: bool) -> Self {
        Self {
            present: AtomicBool::new(present),
        }
    }

    pub fn set_present(&self, present: bool) {
        self.present.store(present, Ordering::SeqCst);
    }
}

impl DeviceProbe for FakeDevice {
    fn exists(&self) -> bool {
        self.present.load(Ordering::SeqCst)
    }
}

// ─── Event sources ──────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceEvent {
    Created,
    Deleted,
}

/// Supplier of device events. The watcher thread blocks on the receiver;
/// a disconnected receiver stops it.
pub trait EventSource: Send {
    fn events(&self) -> &Receiver<DeviceEvent>;
}

/// Filesystem notifications for one node of a directory.
///
/// The directory is watched non-recursively; create and remove events (and
/// renames onto or away from the name) of the node are reported in order.
pub struct NotifySource {
    rx: Receiver<DeviceEvent>,
    _watcher: RecommendedWatcher,
}

impl NotifySource {
    pub fn watch(dir: impl AsRef<Path>, node: &str) -> notify::Result<Self> {
        let dir = dir.as_ref();
        let (tx, rx) = crossbeam_channel::unbounded();
        let name = OsString::from(node);
        let mut watcher = notify::recommended_watcher(move |res: notify::Result<Event>| match res {
            Ok(event) => {
                if let Some(device_event) = device_event(&event, &name) {
                    let _ = tx.send(device_event);
                }
            }
            Err(err) => tracing::warn!(error = %err, "device directory watch error"),
        })?;
        watcher.watch(dir, RecursiveMode::NonRecursive)?;
        tracing::info!(dir = %dir.display(), node, "watching device directory");
        Ok(Self {
            rx,
            _watcher: watcher,
        })
    }
}

impl EventSource for NotifySource {
    fn events(&self) -> &Receiver<DeviceEvent> {
        &self.rx
    }
}

fn device_event(event: &Event, name: &OsStr) -> Option<DeviceEvent> {
    let kind = match event.kind {
        EventKind::Create(_) | EventKind::Modify(ModifyKind::Name(RenameMode::To)) => DeviceEvent::Created,
        EventKind::Remove(_) | EventKind::Modify(ModifyKind::Name(RenameMode::From)) => DeviceEvent::Deleted,
        _ => return None,
    };
    event
        .paths
        .iter()
        .any(|path| path.file_name() == Some(name))
        .then_some(kind)
}

/// Events pushed by hand through a channel.
pub struct ChannelSource {
    rx: Receiver<DeviceEvent>,
}

impl ChannelSource {
    pub fn new() -> (Sender<DeviceEvent>, Self) {
        let (tx, rx) = crossbeam_channel::unbounded();
        (tx, Self { rx })
    }
}

impl EventSource for ChannelSource {
    fn events(&self) -> &Receiver<DeviceEvent> {
        &self.rx
    }
}

// ─── Watcher ────────────────────────────────────────────────────────────────

enum ControlMessage {
    Shutdown,
}

#[derive(Debug, Clone, Copy)]
struct Delays {
    detect: Duration,
    open: Duration,
    close: Duration,
}

/// Owns the `telit-presence` thread. Dropping it stops the thread.
pub struct PresenceWatcher {
    control_tx: Sender<ControlMessage>,
    handle: Option<thread::JoinHandle<()>>,
}

impl PresenceWatcher {
    pub fn start(
        config: &PresenceConfig,
        probe: Arc<dyn DeviceProbe>,
        source: Box<dyn EventSource>,
        state: PresenceHandle,
        actions: Sender<PresenceAction>,
    ) -> io::Result<Self> {
        let (control_tx, control_rx) = bounded(64);
        let delays = Delays {
            detect: config.detect_delay,
            open: config.open_delay,
            close: config.close_delay,
        };
        let handle = thread::Builder::new()
            .name("telit-presence".into())
            .spawn(move || {
                let worker = Worker {
                    probe,
                    source,
                    state,
                    actions,
                    control_rx,
                    delays,
                };
                worker.run();
            })?;
        Ok(Self {
            control_tx,
            handle: Some(handle),
        })
    }

    /// Stops the watcher thread. Idempotent.
    pub fn shutdown(&mut self) {
        let _ = self.control_tx.send(ControlMessage::Shutdown);
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for PresenceWatcher {
    fn drop(&mut self) {
        self.shutdown();
    }
}

struct Worker {
    probe: Arc<dyn DeviceProbe>,
    source: Box<dyn EventSource>,
    state: PresenceHandle,
    actions: Sender<PresenceAction>,
    control_rx: Receiver<ControlMessage>,
    delays: Delays,
}

impl Worker {
    fn run(&self) {
        tracing::info!(state = %self.state.get(), "presence watcher started");
        if self.probe.exists() && !self.evaluate() {
            return;
        }
        let events = self.source.events().clone();
        loop {
            select! {
                recv(self.control_rx) -> _ => break,
                recv(events) -> event => match event {
                    Ok(event) => {
                        tracing::debug!(?event, "device event");
                        if !self.evaluate() {
                            break;
                        }
                    }
                    Err(_) => {
                        tracing::warn!("device event source closed");
                        break;
                    }
                },
            }
        }
        tracing::info!("presence watcher stopped");
    }

    /// Sleep for `delay` unless asked to stop; false means stop.
    fn pause(&self, delay: Duration) -> bool {
        match self.control_rx.recv_timeout(delay) {
            Ok(ControlMessage::Shutdown) | Err(RecvTimeoutError::Disconnected) => false,
            Err(RecvTimeoutError::Timeout) => true,
        }
    }

    fn drain_source(&self) {
        for event in self.source.events().try_iter() {
            tracing::debug!(?event, "device event coalesced");
        }
    }

    /// Judge the device after `detect_delay`; false means stop.
    fn evaluate(&self) -> bool {
        if !self.pause(self.delays.detect) {
            return false;
        }
        self.drain_source();

        let exists = self.probe.exists();
        match (exists, self.state.get()) {
            (true, PresenceState::Detached) => {
                self.state.set(PresenceState::Attaching);
                if !self.pause(self.delays.open) {
                    return false;
                }
                self.state.set(PresenceState::Attached);
                self.hand_off(PresenceAction::Create)
            }
            (false, PresenceState::Attached) => {
                self.state.set(PresenceState::Detaching);
                if !self.pause(self.delays.close) {
                    return false;
                }
                self.state.set(PresenceState::Detached);
                self.hand_off(PresenceAction::Remove)
            }
            (exists, state) => {
                tracing::debug!(exists, state = %state, "no presence transition");
                true
            }
        }
    }

    fn hand_off(&self, action: PresenceAction) -> bool {
        tracing::info!(?action, "device presence changed");
        if self.actions.send(action).is_err() {
            tracing::warn!(?action, "core is gone, stopping presence watcher");
            return false;
        }
        true
    }
}

// ─── Tests ──────────────────────────────────────────────────────────────────
