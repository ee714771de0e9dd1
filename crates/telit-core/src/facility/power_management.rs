//! Power management: the `PwMgmState` functionality level.

use std::fmt;
use std::str::FromStr;

use crate::engine::CommandEngine;
use crate::error::{Error, Result};
use crate::facility::Atom;
use crate::notify::{EventBus, Properties, PropertyValue};
use crate::registry::{DriverRegistry, Vendor};
use crate::workflow::Step;

pub const FACILITY: &str = "power-management";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PowerState {
    Full,
    Airplane,
    Saving,
}

impl PowerState {
    /// `+CFUN` functionality level.
    pub fn code(self) -> i64 {
        match self {
            PowerState::Full => 1,
            PowerState::Airplane => 4,
            PowerState::Saving => 5,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            PowerState::Full => "full",
            PowerState::Airplane => "airplane",
            PowerState::Saving => "saving",
        }
    }
}

impl fmt::Display for PowerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PowerState {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "full" => Ok(PowerState::Full),
            "airplane" => Ok(PowerState::Airplane),
            "saving" => Ok(PowerState::Saving),
            other => Err(Error::invalid(format!("unknown power state {other:?}"))),
        }
    }
}

pub trait PowerManagementDriver: Send + Sync {
    fn query_state(&self) -> Option<Step<PowerState>> {
        None
    }

    fn set_state(&self, _state: PowerState) -> Option<Step<()>> {
        None
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PowerManagementState {
    pub state: Option<PowerState>,
}

#[derive(Debug, Clone)]
pub struct PowerManagement {
    atom: Atom<dyn PowerManagementDriver, PowerManagementState>,
}

impl PowerManagement {
    pub fn create(
        registry: &DriverRegistry<dyn PowerManagementDriver>,
        vendor: Vendor,
        driver: Option<&str>,
        engine: &CommandEngine,
        bus: EventBus,
    ) -> Result<Self> {
        Atom::create(registry, vendor, driver, engine, bus).map(|atom| Self { atom })
    }

    pub fn atom(&self) -> &Atom<dyn PowerManagementDriver, PowerManagementState> {
        &self.atom
    }

    pub fn remove(&self) {
        self.atom.remove();
    }

    pub fn get_properties(&self, on_complete: impl FnOnce(Result<Properties>) + Send + 'static) {
        self.atom.dispatch(
            move |result: Result<PowerState>| {
                on_complete(result.map(|s| vec![("PwMgmState", s.as_str().into())]))
            },
            |driver| Ok(driver.query_state()),
            |cache, state| {
                cache.state = Some(*state);
                None
            },
        );
    }

    pub fn set_state(&self, state: PowerState, on_complete: impl FnOnce(Result<()>) + Send + 'static) {
        self.atom.dispatch(
            on_complete,
            move |driver| Ok(driver.set_state(state)),
            move |cache, ()| {
                cache.state = Some(state);
                Some(("PwMgmState", state.as_str().into()))
            },
        );
    }

    /// `PwMgmState` takes one of `full`, `airplane`, `saving`.
    pub fn set_property(
        &self,
        name: &str,
        value: PropertyValue,
        on_complete: impl FnOnce(Result<()>) + Send + 'static,
    ) {
        let parsed = match (name, &value) {
            ("PwMgmState", PropertyValue::Str(s)) => s.parse::<PowerState>(),
            _ => Err(Error::invalid(format!("cannot set {name} to {value}"))),
        };
        match parsed {
            Ok(state) => self.set_state(state, on_complete),
            Err(err) => self.atom.dispatch(on_complete, move |_| Err(err), |_, ()| None),
        }
    }
}

// ─── Tests ──────────────────────────────────────────────────────────────────
