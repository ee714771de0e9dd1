//! # Modem Instance
//!
//! One Telit modem behind a CMUX multiplexer. The instance owns the command
//! engine for the AT (aux) channel and drives the model-specific bring-up:
//!
//! 1. [`Modem::enable`] powers the radio up and starts following the SIM
//!    through `#QSS` notifications;
//! 2. [`Modem::pre_sim`] creates the facilities usable without a SIM;
//! 3. [`Modem::post_online`] creates the network-facing facilities;
//! 4. [`Modem::remove`] tears everything down and powers the radio off.
//!
//! ## Usage
//!
//! ```no_run
//! use std::sync::Arc;
//! use telit_core::facility::Registries;
//! use telit_core::modem::{Modem, ModemModel, ModemPorts};
//! use telit_core::notify::EventBus;
//! use telit_core::sim::SimulatedModem;
//!
//! let registries = Arc::new(Registries::with_telit().unwrap());
//! let modem = Modem::new(
//!     ModemModel::Le910v2,
//!     ModemPorts::in_dir("/dev", "ttyMUX1", "ttyMUX2"),
//!     Arc::new(SimulatedModem::telit()),
//!     registries,
//!     EventBus::disconnected(),
//! );
//! modem.bring_up(|result| println!("bring-up: {result:?}"));
//! ```

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::{Arc, Mutex, MutexGuard};

use crate::decoder::decode_single;
use crate::engine::CommandEngine;
use crate::error::{Error, Result};
use crate::facility::data_network::DataNetwork;
use crate::facility::hw_management::HwManagement;
use crate::facility::me_control::MeControl;
use crate::facility::power_management::PowerManagement;
use crate::facility::provider::Provider;
use crate::facility::radio_settings::RadioSettings;
use crate::facility::survey::Survey;
use crate::facility::trace::Trace;
use crate::facility::urc::Urc;
use crate::facility::Registries;
use crate::notify::{EventBus, ModemEvent};
use crate::registry::Vendor;
use crate::telit::DRIVER_NAME;
use crate::transport::{AtChannel, AtResponse};
use crate::workflow::{Reply, Step};

// ─── Model ──────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ModemModel {
    /// Generic Telit module behind a serial multiplexer.
    #[default]
    TelitSerial,
    Le910v2,
    /// GE910: the serial power-on sequence, no provider facility.
    Ge910,
}

impl ModemModel {
    pub fn as_str(self) -> &'static str {
        match self {
            ModemModel::TelitSerial => "telit_serial",
            ModemModel::Le910v2 => "le910v2",
            ModemModel::Ge910 => "ge910",
        }
    }

    fn radio_vendor(self) -> Vendor {
        match self {
            ModemModel::TelitSerial | ModemModel::Ge910 => Vendor::Default,
            ModemModel::Le910v2 => Vendor::Le910v2,
        }
    }

    /// Vendor tag for the urc and provider facilities.
    fn serial_vendor(self) -> Vendor {
        match self {
            ModemModel::TelitSerial | ModemModel::Ge910 => Vendor::TelitSerial,
            ModemModel::Le910v2 => Vendor::Default,
        }
    }
}

impl fmt::Display for ModemModel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ModemModel {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "telit_serial" => Ok(ModemModel::TelitSerial),
            "le910v2" => Ok(ModemModel::Le910v2),
            "ge910" => Ok(ModemModel::Ge910),
            other => Err(Error::invalid(format!("unknown modem model {other:?}"))),
        }
    }
}

/// Device nodes of the two multiplexed channels. AT traffic uses `aux`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModemPorts {
    pub modem: PathBuf,
    pub aux: PathBuf,
}

impl ModemPorts {
    pub fn in_dir(dir: impl AsRef<Path>, modem: &str, aux: &str) -> Self {
        let dir = dir.as_ref();
        Self {
            modem: dir.join(modem),
            aux: dir.join(aux),
        }
    }
}

// ─── SIM tracking ───────────────────────────────────────────────────────────

/// SIM view derived from `#QSS` status codes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SimStatus {
    pub inserted: bool,
    /// SMS and phonebook storage are ready.
    pub ready: bool,
}

impl SimStatus {
    /// Apply one `#QSS` status and return the edge events it causes.
    pub fn apply(&mut self, status: i64) -> Vec<ModemEvent> {
        let mut events = Vec::new();
        match status {
            0 => {
                if self.inserted {
                    events.push(ModemEvent::SimInserted { inserted: false });
                }
                *self = SimStatus::default();
            }
            1 | 2 => {
                if !self.inserted {
                    self.inserted = true;
                    events.push(ModemEvent::SimInserted { inserted: true });
                }
            }
            3 => {
                if !self.ready {
                    if !self.inserted {
                        self.inserted = true;
                        events.push(ModemEvent::SimInserted { inserted: true });
                    }
                    self.ready = true;
                    events.push(ModemEvent::SimReady);
                }
            }
            other => tracing::warn!(status = other, "unknown SIM state received"),
        }
        events
    }
}

// ─── Facilities ─────────────────────────────────────────────────────────────

/// Facility instances created for one modem. A facility whose creation
/// failed stays `None`.
#[derive(Debug, Clone, Default)]
pub struct Facilities {
    pub power_management: Option<PowerManagement>,
    pub hw_management: Option<HwManagement>,
    pub me_control: Option<MeControl>,
    pub survey: Option<Survey>,
    pub radio_settings: Option<RadioSettings>,
    pub urc: Option<Urc>,
    pub provider: Option<Provider>,
    pub data_network: Option<DataNetwork>,
    pub trace: Option<Trace>,
}

impl Facilities {
    fn remove_all(self) {
        if let Some(f) = self.power_management {
            f.remove();
        }
        if let Some(f) = self.hw_management {
            f.remove();
        }
        if let Some(f) = self.me_control {
            f.remove();
        }
        if let Some(f) = self.survey {
            f.remove();
        }
        if let Some(f) = self.radio_settings {
            f.remove();
        }
        if let Some(f) = self.urc {
            f.remove();
        }
        if let Some(f) = self.provider {
            f.remove();
        }
        if let Some(f) = self.data_network {
            f.remove();
        }
        if let Some(f) = self.trace {
            f.remove();
        }
    }
}

fn created<T>(facility: &'static str, result: Result<T>) -> Option<T> {
    match result {
        Ok(instance) => Some(instance),
        Err(err) => {
            tracing::warn!(facility, error = %err, "facility not created");
            None
        }
    }
}

// ─── Multitech workaround ───────────────────────────────────────────────────

/// What the LE910V2 Multitech fix-up ended up doing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MultitechAction {
    /// `AT#FWSWITCH=?` is not understood: not a Multitech board.
    NotMultitech,
    Unchanged,
    /// Switched to the Verizon image; the switch reboots the module.
    ProviderSwitched,
    /// USB configuration changed and the module was rebooted.
    Rebooted,
}

fn read_int(engine: &CommandEngine, command: &'static str, prefix: &'static [&'static str]) -> Step<i64> {
    Step::transaction(engine, command, prefix, move |r| {
        decode_single(r, prefix[0], |f| f.next_integer())
    })
}

fn multitech_workaround(engine: &CommandEngine) -> Step<MultitechAction> {
    let engine = engine.clone();
    Step::new(move |reply: Reply<MultitechAction>| {
        let probe = Step::transaction(&engine, "AT#FWSWITCH=?", &["#FWSWITCH:"], |_| Ok(()));
        probe.run(move |supported| match supported {
            Ok(()) => multitech_fixup(engine).run(reply),
            Err(_) => reply(Ok(MultitechAction::NotMultitech)),
        });
    })
}

fn multitech_fixup(engine: CommandEngine) -> Step<MultitechAction> {
    let usb = engine.clone();
    let fw = engine.clone();
    read_int(&engine, "AT#USBCFG?", &["#USBCFG:"])
        .and_then(move |usbcfg| {
            if usbcfg == 2 {
                return Step::ready(Ok(false));
            }
            tracing::info!(usbcfg, "multitech: wrong USB configuration, setting 2");
            Step::command(&usb, "AT#USBCFG=2").map(|()| true)
        })
        .and_then(move |needs_reset| {
            let engine = fw.clone();
            read_int(&fw, "AT#FWSWITCH?", &["#FWSWITCH:"]).and_then(move |image| {
                if image != 1 {
                    tracing::info!(image, "multitech: switching provider image to Verizon");
                    Step::command(&engine, "AT#FWSWITCH=1,1").map(|()| MultitechAction::ProviderSwitched)
                } else if needs_reset {
                    Step::command(&engine, "AT#REBOOT").map(|()| MultitechAction::Rebooted)
                } else {
                    Step::ready(Ok(MultitechAction::Unchanged))
                }
            })
        })
}

// ─── Modem ──────────────────────────────────────────────────────────────────

#[derive(Debug, Default)]
struct ModemState {
    powered: bool,
    sim: SimStatus,
    multitech: Option<bool>,
    facilities: Facilities,
}

/// One modem instance. Cloning shares the instance.
#[derive(Clone)]
pub struct Modem {
    model: ModemModel,
    ports: ModemPorts,
    engine: CommandEngine,
    registries: Arc<Registries>,
    bus: EventBus,
    state: Arc<Mutex<ModemState>>,
}

impl fmt::Debug for Modem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Modem")
            .field("model", &self.model)
            .field("aux", &self.ports.aux)
            .finish_non_exhaustive()
    }
}

impl Modem {
    pub fn new(
        model: ModemModel,
        ports: ModemPorts,
        channel: Arc<dyn AtChannel>,
        registries: Arc<Registries>,
        bus: EventBus,
    ) -> Self {
        tracing::info!(model = %model, aux = %ports.aux.display(), "modem created");
        Self {
            model,
            ports,
            engine: CommandEngine::new(channel),
            registries,
            bus,
            state: Arc::new(Mutex::new(ModemState::default())),
        }
    }

    fn lock(&self) -> MutexGuard<'_, ModemState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn model(&self) -> ModemModel {
        self.model
    }

    pub fn ports(&self) -> &ModemPorts {
        &self.ports
    }

    pub fn engine(&self) -> &CommandEngine {
        &self.engine
    }

    pub fn is_powered(&self) -> bool {
        self.lock().powered
    }

    pub fn sim(&self) -> SimStatus {
        self.lock().sim
    }

    /// `None` until the LE910V2 workaround probe has answered.
    pub fn is_multitech(&self) -> Option<bool> {
        self.lock().multitech
    }

    /// Snapshot of the facility instances.
    pub fn facilities(&self) -> Facilities {
        self.lock().facilities.clone()
    }

    fn set_powered(&self, powered: bool) {
        let changed = {
            let mut state = self.lock();
            std::mem::replace(&mut state.powered, powered) != powered
        };
        if changed {
            tracing::info!(model = %self.model, powered, "modem power changed");
            self.bus.emit(ModemEvent::Powered { powered });
        }
    }

    fn apply_sim_status(&self, status: i64) {
        let events = self.lock().sim.apply(status);
        for event in events {
            tracing::info!(?event, "SIM state");
            self.bus.emit(event);
        }
    }

    fn cmd(&self, command: &'static str) -> Step<()> {
        Step::command(&self.engine, command)
    }

    fn power_on(&self) -> Step<()> {
        match self.model {
            ModemModel::TelitSerial | ModemModel::Ge910 => Step::sequence(vec![
                self.cmd("ATE0 +CMEE=1").best_effort("echo off"),
                self.cmd("AT#QSS=2").best_effort("SIM status reporting"),
                // Cycle through airplane mode so every notification repeats.
                self.cmd("AT+CFUN=4"),
                self.cmd("AT#ATDELAY=50").best_effort("CFUN delay"),
                self.cmd("AT+CFUN=1"),
            ])
            .map(|_| ()),
            ModemModel::Le910v2 => {
                let modem = self.clone();
                let tail = self.clone();
                self.cmd("ATE0 +CMEE=1")
                    .best_effort("echo off")
                    .and_then(move |()| read_int(&modem.engine, "AT+CFUN?", &["+CFUN:"]).and_then(move |level| {
                        if level == 4 {
                            modem.cmd("AT+CFUN=1")
                        } else {
                            Step::sequence(vec![
                                modem.cmd("AT+CFUN=4"),
                                modem.cmd("AT#ATDELAY=30").best_effort("CFUN delay"),
                                modem.cmd("AT+CFUN=1"),
                            ])
                            .map(|_| ())
                        }
                    }))
                    .and_then(move |()| tail.cmd("AT&C0").best_effort("DCD off"))
            }
        }
    }

    /// Steps run once the radio is on. Every one of them is best effort.
    fn after_power_on(&self) -> Step<()> {
        let modem = self.clone();
        let handler = self.clone();
        let id = self.engine.register_unsolicited(
            "#QSS:",
            Box::new(move |resp: &AtResponse| match decode_single(resp, "#QSS:", |f| f.next_integer()) {
                Ok(status) => handler.apply_sim_status(status),
                Err(err) => tracing::warn!(error = %err, "malformed #QSS notification"),
            }),
        );
        if id.is_none() {
            tracing::warn!("channel closed, SIM state will not be followed");
        }

        let survey_format = self.cmd("AT#CSURVNLF=1").best_effort("survey format");
        match self.model {
            ModemModel::TelitSerial => survey_format,
            ModemModel::Ge910 => survey_format.and_then(move |()| modem.initial_sim_status()),
            ModemModel::Le910v2 => survey_format
                .and_then(move |()| modem.cmd("AT#QSS=2").best_effort("SIM status reporting").map(move |()| modem))
                .and_then(|modem| modem.initial_sim_status()),
        }
    }

    /// One `#QSS?` read applied to the SIM view. Never fails.
    fn initial_sim_status(&self) -> Step<()> {
        let query = Step::transaction(&self.engine, "AT#QSS?", &["#QSS:"], |r| {
            decode_single(r, "#QSS:", |f| {
                f.skip_field()?;
                f.next_integer()
            })
        });
        let modem = self.clone();
        Step::new(move |reply: Reply<()>| {
            query.run(move |status| {
                match status {
                    Ok(status) => modem.apply_sim_status(status),
                    Err(err) => tracing::warn!(error = %err, "initial SIM status unknown"),
                }
                reply(Ok(()));
            })
        })
    }

    /// Power the radio up. On failure the modem stays unpowered.
    pub fn enable(&self, on_complete: impl FnOnce(Result<()>) + Send + 'static) {
        tracing::info!(model = %self.model, "enabling modem");
        let modem = self.clone();
        self.power_on().run(move |result| match result {
            Ok(()) => {
                {
                    let mut state = modem.lock();
                    state.sim = SimStatus::default();
                }
                modem.set_powered(true);
                modem.after_power_on().run(on_complete);
            }
            Err(err) => {
                tracing::warn!(model = %modem.model, error = %err, "power-on sequence failed");
                modem.set_powered(false);
                on_complete(Err(err));
            }
        });
    }

    /// Drop queued commands and handlers, then switch the radio off.
    pub fn disable(&self, on_complete: impl FnOnce(Result<()>) + Send + 'static) {
        self.engine.cancel_all();
        self.engine.unregister_all();
        let modem = self.clone();
        self.cmd("AT+CFUN=4").run(move |result| {
            match &result {
                Ok(()) => modem.set_powered(false),
                Err(err) => tracing::warn!(error = %err, "power-off failed"),
            }
            on_complete(result);
        });
    }

    /// Facilities usable before the SIM is ready.
    pub fn pre_sim(&self) {
        let r = &self.registries;
        let e = &self.engine;
        let mut f = Facilities {
            power_management: created(
                "power-management",
                PowerManagement::create(&r.power_management, Vendor::Default, Some(DRIVER_NAME), e, self.bus.clone()),
            ),
            hw_management: created(
                "hw-management",
                HwManagement::create(&r.hw_management, Vendor::Default, Some(DRIVER_NAME), e, self.bus.clone()),
            ),
            ..Facilities::default()
        };
        if self.model == ModemModel::Le910v2 {
            f.me_control = created(
                "me-control",
                MeControl::create(&r.me_control, Vendor::Default, Some(DRIVER_NAME), e, self.bus.clone()),
            );
            f.survey = created(
                "survey",
                Survey::create(&r.survey, Vendor::Default, Some(DRIVER_NAME), e, self.bus.clone()),
            );
        }
        {
            let mut state = self.lock();
            state.facilities.power_management = f.power_management;
            state.facilities.hw_management = f.hw_management;
            state.facilities.me_control = f.me_control;
            state.facilities.survey = f.survey;
        }

        if self.model == ModemModel::Le910v2 {
            let modem = self.clone();
            multitech_workaround(&self.engine).run(move |outcome| {
                let multitech = !matches!(outcome, Ok(MultitechAction::NotMultitech));
                modem.lock().multitech = Some(multitech);
                match outcome {
                    Ok(action) => tracing::info!(?action, "multitech workaround"),
                    Err(err) => tracing::warn!(error = %err, "multitech workaround failed"),
                }
            });
        }
    }

    /// Network-facing facilities, then automatic packet attach.
    pub fn post_online(&self) {
        let r = &self.registries;
        let e = &self.engine;
        let bus = &self.bus;
        let radio_settings = created(
            "radio-settings",
            RadioSettings::create(&r.radio_settings, self.model.radio_vendor(), Some(DRIVER_NAME), e, bus.clone()),
        );
        let urc = created(
            "urc",
            Urc::create(&r.urc, self.model.serial_vendor(), Some(DRIVER_NAME), e, bus.clone()),
        );
        let provider = match self.model {
            ModemModel::Ge910 => None,
            _ => created(
                "provider",
                Provider::create(&r.provider, self.model.serial_vendor(), Some(DRIVER_NAME), e, bus.clone()),
            ),
        };
        let data_network = created(
            "data-network",
            DataNetwork::create(&r.data_network, Vendor::Default, Some(DRIVER_NAME), e, bus.clone()),
        );
        let trace = match self.model {
            ModemModel::Le910v2 => created(
                "trace",
                Trace::create(&r.trace, Vendor::Le910v2, Some(DRIVER_NAME), e, bus.clone()),
            ),
            ModemModel::TelitSerial | ModemModel::Ge910 => None,
        };
        {
            let mut state = self.lock();
            state.facilities.radio_settings = radio_settings;
            state.facilities.urc = urc;
            state.facilities.provider = provider;
            state.facilities.data_network = data_network;
            state.facilities.trace = trace;
        }
        self.cmd("AT#AUTOATT=1")
            .best_effort("automatic attach")
            .run(|_| ());
    }

    /// Enable, then create every facility. There is no host bus to request
    /// the online transition, so the modem goes online right after power-on.
    pub fn bring_up(&self, on_complete: impl FnOnce(Result<()>) + Send + 'static) {
        let modem = self.clone();
        self.enable(move |result| {
            if result.is_ok() {
                modem.pre_sim();
                modem.post_online();
            }
            on_complete(result);
        });
    }

    /// Remove every facility, then power the radio off.
    pub fn remove(&self) {
        let facilities = std::mem::take(&mut self.lock().facilities);
        facilities.remove_all();
        let model = self.model;
        self.disable(move |_| tracing::info!(model = %model, "modem removed"));
    }
}

// ─── Tests ──────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sim::SimulatedModem;
    use crossbeam_channel::Receiver;

    fn modem(model: ModemModel, sim: &Arc<SimulatedModem>) -> (Modem, Receiver<ModemEvent>) {
        let (bus, rx) = EventBus::channel();
        let registries = Arc::new(Registries::with_telit().unwrap());
        let channel: Arc<dyn AtChannel> = sim.clone();
        let modem = Modem::new(model, ModemPorts::in_dir("/dev", "ttyMUX1", "ttyMUX2"), channel, registries, bus);
        (modem, rx)
    }

    fn enabled(modem: &Modem) -> Result<()> {
        let result = Arc::new(Mutex::new(None));
        let r = result.clone();
        modem.enable(move |res| *r.lock().unwrap() = Some(res));
        let out = result.lock().unwrap().take();
        out.expect("enable answered inline")
    }

    #[test]
    fn model_names_round_trip() {
        assert_eq!("le910v2".parse::<ModemModel>().unwrap(), ModemModel::Le910v2);
        assert_eq!(ModemModel::TelitSerial.to_string(), "telit_serial");
        assert_eq!("ge910".parse::<ModemModel>().unwrap(), ModemModel::Ge910);
        assert!("he910".parse::<ModemModel>().is_err());
    }

    #[test]
    fn sim_status_events_are_edge_triggered() {
        let mut sim = SimStatus::default();
        assert_eq!(sim.apply(1), vec![ModemEvent::SimInserted { inserted: true }]);
        assert!(sim.apply(2).is_empty(), "already inserted");
        assert_eq!(sim.apply(3), vec![ModemEvent::SimReady]);
        assert!(sim.apply(3).is_empty());
        assert_eq!(sim.apply(0), vec![ModemEvent::SimInserted { inserted: false }]);
        assert!(sim.apply(7).is_empty());
    }

    #[test]
    fn ready_without_insertion_reports_both() {
        let mut sim = SimStatus::default();
        assert_eq!(
            sim.apply(3),
            vec![ModemEvent::SimInserted { inserted: true }, ModemEvent::SimReady]
        );
    }

    #[test]
    fn serial_model_power_on_sequence() {
        let sim = Arc::new(SimulatedModem::telit());
        let (modem, rx) = modem(ModemModel::TelitSerial, &sim);
        enabled(&modem).unwrap();
        assert_eq!(
            sim.sent(),
            vec!["ATE0 +CMEE=1", "AT#QSS=2", "AT+CFUN=4", "AT#ATDELAY=50", "AT+CFUN=1", "AT#CSURVNLF=1"]
        );
        assert!(modem.is_powered());
        assert_eq!(rx.try_recv().unwrap(), ModemEvent::Powered { powered: true });
        assert_eq!(sim.unsolicited_prefixes(), vec!["#QSS:".to_string()]);
    }

    #[test]
    fn ge910_power_on_reads_the_sim_state() {
        let sim = Arc::new(SimulatedModem::telit());
        let (modem, _rx) = modem(ModemModel::Ge910, &sim);
        enabled(&modem).unwrap();
        assert_eq!(
            sim.sent(),
            vec![
                "ATE0 +CMEE=1",
                "AT#QSS=2",
                "AT+CFUN=4",
                "AT#ATDELAY=50",
                "AT+CFUN=1",
                "AT#CSURVNLF=1",
                "AT#QSS?",
            ]
        );
        assert!(modem.sim().inserted);
        assert_eq!(sim.unsolicited_prefixes(), vec!["#QSS:".to_string()]);
    }

    #[test]
    fn ge910_has_no_provider() {
        let sim = Arc::new(SimulatedModem::telit());
        let (modem, _rx) = modem(ModemModel::Ge910, &sim);
        modem.pre_sim();
        sim.clear_sent();
        modem.post_online();
        let f = modem.facilities();
        assert!(f.provider.is_none());
        assert!(f.me_control.is_none() && f.survey.is_none() && f.trace.is_none());
        assert!(f.power_management.is_some() && f.hw_management.is_some() && f.data_network.is_some());
        assert_eq!(f.radio_settings.as_ref().unwrap().atom().vendor(), Vendor::Default);
        assert_eq!(f.urc.as_ref().unwrap().atom().vendor(), Vendor::TelitSerial);
        assert_eq!(sim.sent().last().map(String::as_str), Some("AT#AUTOATT=1"));
    }

    #[test]
    fn le910v2_skips_cycle_when_already_in_airplane_mode() {
        let sim = Arc::new(SimulatedModem::telit());
        sim.respond("AT+CFUN?", AtResponse::ok(["+CFUN: 4"]));
        let (modem, _rx) = modem(ModemModel::Le910v2, &sim);
        enabled(&modem).unwrap();
        assert_eq!(
            sim.sent(),
            vec![
                "ATE0 +CMEE=1",
                "AT+CFUN?",
                "AT+CFUN=1",
                "AT&C0",
                "AT#CSURVNLF=1",
                "AT#QSS=2",
                "AT#QSS?",
            ]
        );
        assert!(modem.sim().inserted, "#QSS: 2,1 reports an inserted SIM");
    }

    #[test]
    fn le910v2_cycles_radio_when_on() {
        let sim = Arc::new(SimulatedModem::telit());
        let (modem, _rx) = modem(ModemModel::Le910v2, &sim);
        enabled(&modem).unwrap();
        let sent = sim.sent();
        assert_eq!(&sent[1..5], ["AT+CFUN?", "AT+CFUN=4", "AT#ATDELAY=30", "AT+CFUN=1"]);
    }

    #[test]
    fn failed_power_on_leaves_modem_unpowered() {
        let sim = Arc::new(SimulatedModem::telit());
        sim.respond("AT+CFUN=1", AtResponse::error("+CME ERROR: 10"));
        let (modem, rx) = modem(ModemModel::TelitSerial, &sim);
        assert!(matches!(enabled(&modem), Err(Error::Protocol { .. })));
        assert!(!modem.is_powered());
        assert!(rx.try_recv().is_err(), "no power event");
        assert!(sim.unsolicited_prefixes().is_empty());
    }

    #[test]
    fn qss_notifications_drive_sim_events() {
        let sim = Arc::new(SimulatedModem::telit());
        let (modem, rx) = modem(ModemModel::TelitSerial, &sim);
        enabled(&modem).unwrap();
        let _ = rx.try_recv();

        sim.push_unsolicited("#QSS: 1");
        sim.push_unsolicited("#QSS: 3");
        assert_eq!(rx.try_recv().unwrap(), ModemEvent::SimInserted { inserted: true });
        assert_eq!(rx.try_recv().unwrap(), ModemEvent::SimReady);
        assert!(modem.sim().ready);
    }

    #[test]
    fn facilities_follow_the_model() {
        let sim = Arc::new(SimulatedModem::telit());
        let (serial, _rx) = modem(ModemModel::TelitSerial, &sim);
        serial.pre_sim();
        serial.post_online();
        let f = serial.facilities();
        assert!(f.power_management.is_some() && f.hw_management.is_some());
        assert!(f.me_control.is_none() && f.survey.is_none() && f.trace.is_none());
        assert_eq!(f.urc.as_ref().unwrap().atom().vendor(), Vendor::TelitSerial);
        assert!(sim.sent().contains(&"AT#AUTOATT=1".to_string()));

        let (le910, _rx) = modem(ModemModel::Le910v2, &sim);
        le910.pre_sim();
        le910.post_online();
        let f = le910.facilities();
        assert!(f.me_control.is_some() && f.survey.is_some() && f.trace.is_some());
        assert_eq!(f.radio_settings.as_ref().unwrap().atom().vendor(), Vendor::Le910v2);
    }

    #[test]
    fn multitech_fixup_switches_provider() {
        let sim = Arc::new(SimulatedModem::telit());
        sim.respond("AT#FWSWITCH=?", AtResponse::ok(["#FWSWITCH: (0,1),(0,1)"]));
        sim.respond("AT#USBCFG?", AtResponse::ok(["#USBCFG: 0"]));
        sim.respond("AT#FWSWITCH?", AtResponse::ok(["#FWSWITCH: 0"]));
        let (modem, _rx) = modem(ModemModel::Le910v2, &sim);
        modem.pre_sim();
        assert_eq!(modem.is_multitech(), Some(true));
        let sent = sim.sent();
        assert!(sent.contains(&"AT#USBCFG=2".to_string()));
        assert!(sent.contains(&"AT#FWSWITCH=1,1".to_string()));
        assert!(!sent.contains(&"AT#REBOOT".to_string()));
    }

    #[test]
    fn multitech_reboots_after_usb_change_only() {
        let sim = Arc::new(SimulatedModem::telit());
        sim.respond("AT#FWSWITCH=?", AtResponse::ok(["#FWSWITCH: (0,1),(0,1)"]));
        sim.respond("AT#USBCFG?", AtResponse::ok(["#USBCFG: 0"]));
        let (modem, _rx) = modem(ModemModel::Le910v2, &sim);
        modem.pre_sim();
        assert_eq!(sim.sent().last().map(String::as_str), Some("AT#REBOOT"));
    }

    #[test]
    fn non_multitech_board_is_left_alone() {
        let sim = Arc::new(SimulatedModem::new());
        let (modem, _rx) = modem(ModemModel::Le910v2, &sim);
        modem.pre_sim();
        assert_eq!(modem.is_multitech(), Some(false));
        assert_eq!(sim.sent().last().map(String::as_str), Some("AT#FWSWITCH=?"));
    }

    #[test]
    fn remove_tears_down_facilities_and_powers_off() {
        let sim = Arc::new(SimulatedModem::telit());
        let (modem, rx) = modem(ModemModel::TelitSerial, &sim);
        let done = Arc::new(Mutex::new(None));
        let d = done.clone();
        modem.bring_up(move |r| *d.lock().unwrap() = Some(r));
        assert_eq!(done.lock().unwrap().take(), Some(Ok(())));
        let power = modem.facilities().power_management.unwrap();

        modem.remove();
        assert!(power.atom().is_removed());
        assert!(modem.facilities().power_management.is_none());
        assert!(!modem.is_powered());
        assert_eq!(sim.sent().last().map(String::as_str), Some("AT+CFUN=4"));
        assert!(sim.unsolicited_prefixes().is_empty());
        let events: Vec<_> = rx.try_iter().collect();
        assert_eq!(events.last(), Some(&ModemEvent::Powered { powered: false }));
    }
}
