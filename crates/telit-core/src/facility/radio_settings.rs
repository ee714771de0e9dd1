//! # Radio Settings
//!
//! Preferred radio access technology. The cached mode is announced as
//! `TechnologyPreference` once the modem acknowledges a change.

use std::fmt;
use std::str::FromStr;

use crate::engine::CommandEngine;
use crate::error::{Error, Result};
use crate::facility::Atom;
use crate::notify::EventBus;
use crate::registry::{DriverRegistry, Vendor};
use crate::workflow::Step;

pub const FACILITY: &str = "radio-settings";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RadioAccessMode {
    Any,
    Gsm,
    Umts,
    Lte,
    GsmUmts,
    GsmLte,
    UmtsLte,
}

impl RadioAccessMode {
    pub const ALL: [RadioAccessMode; 7] = [
        RadioAccessMode::Any,
        RadioAccessMode::Gsm,
        RadioAccessMode::Umts,
        RadioAccessMode::Lte,
        RadioAccessMode::GsmUmts,
        RadioAccessMode::GsmLte,
        RadioAccessMode::UmtsLte,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            RadioAccessMode::Any => "any",
            RadioAccessMode::Gsm => "gsm",
            RadioAccessMode::Umts => "umts",
            RadioAccessMode::Lte => "lte",
            RadioAccessMode::GsmUmts => "gsm-umts",
            RadioAccessMode::GsmLte => "gsm-lte",
            RadioAccessMode::UmtsLte => "umts-lte",
        }
    }
}

impl fmt::Display for RadioAccessMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RadioAccessMode {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::ALL
            .into_iter()
            .find(|mode| mode.as_str() == s)
            .ok_or_else(|| Error::invalid(format!("unknown radio access mode {s:?}")))
    }
}

/// Operations a radio-settings driver may provide.
pub trait RadioSettingsDriver: Send + Sync {
    fn query_rat_mode(&self) -> Option<Step<RadioAccessMode>> {
        None
    }

    fn set_rat_mode(&self, _mode: RadioAccessMode) -> Option<Step<()>> {
        None
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RadioSettingsState {
    pub mode: Option<RadioAccessMode>,
}

#[derive(Debug, Clone)]
pub struct RadioSettings {
    atom: Atom<dyn RadioSettingsDriver, RadioSettingsState>,
}

impl RadioSettings {
    pub fn create(
        registry: &DriverRegistry<dyn RadioSettingsDriver>,
        vendor: Vendor,
        driver: Option<&str>,
        engine: &CommandEngine,
        bus: EventBus,
    ) -> Result<Self> {
        Atom::create(registry, vendor, driver, engine, bus).map(|atom| Self { atom })
    }

    pub fn atom(&self) -> &Atom<dyn RadioSettingsDriver, RadioSettingsState> {
        &self.atom
    }

    pub fn remove(&self) {
        self.atom.remove();
    }

    pub fn query_rat_mode(&self, on_complete: impl FnOnce(Result<RadioAccessMode>) + Send + 'static) {
        self.atom.dispatch(
            on_complete,
            |driver| Ok(driver.query_rat_mode()),
            |state, mode| {
                state.mode = Some(*mode);
                None
            },
        );
    }

    pub fn set_rat_mode(&self, mode: RadioAccessMode, on_complete: impl FnOnce(Result<()>) + Send + 'static) {
        self.atom.dispatch(
            on_complete,
            move |driver| Ok(driver.set_rat_mode(mode)),
            move |state, ()| {
                state.mode = Some(mode);
                Some(("TechnologyPreference", mode.as_str().into()))
            },
        );
    }
}

// ─── Tests ──────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mode_names_round_trip() {
        for mode in RadioAccessMode::ALL {
            assert_eq!(mode.as_str().parse::<RadioAccessMode>().unwrap(), mode);
        }
    }

    #[test]
    fn unknown_mode_name_is_invalid_argument() {
        assert!(matches!(
            "wcdma".parse::<RadioAccessMode>(),
            Err(Error::InvalidArgument(_))
        ));
    }
}
