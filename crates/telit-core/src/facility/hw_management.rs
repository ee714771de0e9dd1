//! Hardware management: GPIO configuration and the `SIMDetectionMode`
//! property.

use std::fmt;
use std::str::FromStr;

use crate::engine::CommandEngine;
use crate::error::{Error, Result};
use crate::facility::Atom;
use crate::notify::{EventBus, Properties, PropertyValue};
use crate::registry::{DriverRegistry, Vendor};
use crate::workflow::Step;

pub const FACILITY: &str = "hw-management";

/// Rows accepted from one `#GPIO?` answer.
pub const MAX_GPIOS: usize = 20;

/// One `#GPIO` row. Pins are numbered from 1 in answer order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GpioPin {
    pub pin: u32,
    pub mode: i64,
    pub dir: i64,
}

/// `AT#GPIO=<pin>,<mode>,<dir>,<save>` arguments.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GpioSetting {
    pub pin: u32,
    pub mode: u32,
    pub dir: u32,
    pub save: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SimDetectionMode {
    NotInserted,
    Inserted,
    Auto,
}

impl SimDetectionMode {
    pub fn code(self) -> i64 {
        match self {
            SimDetectionMode::NotInserted => 0,
            SimDetectionMode::Inserted => 1,
            SimDetectionMode::Auto => 2,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            SimDetectionMode::NotInserted => "not_inserted",
            SimDetectionMode::Inserted => "inserted",
            SimDetectionMode::Auto => "auto",
        }
    }
}

impl fmt::Display for SimDetectionMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SimDetectionMode {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "not_inserted" => Ok(SimDetectionMode::NotInserted),
            "inserted" => Ok(SimDetectionMode::Inserted),
            "auto" => Ok(SimDetectionMode::Auto),
            other => Err(Error::invalid(format!("unknown SIM detection mode {other:?}"))),
        }
    }
}

pub trait HwManagementDriver: Send + Sync {
    fn set_gpio(&self, _setting: GpioSetting) -> Option<Step<()>> {
        None
    }

    fn query_gpios(&self) -> Option<Step<Vec<GpioPin>>> {
        None
    }

    fn query_simdet(&self) -> Option<Step<SimDetectionMode>> {
        None
    }

    fn set_simdet(&self, _mode: SimDetectionMode) -> Option<Step<()>> {
        None
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HwManagementState {
    pub simdet: Option<SimDetectionMode>,
}

#[derive(Debug, Clone)]
pub struct HwManagement {
    atom: Atom<dyn HwManagementDriver, HwManagementState>,
}

impl HwManagement {
    pub fn create(
        registry: &DriverRegistry<dyn HwManagementDriver>,
        vendor: Vendor,
        driver: Option<&str>,
        engine: &CommandEngine,
        bus: EventBus,
    ) -> Result<Self> {
        Atom::create(registry, vendor, driver, engine, bus).map(|atom| Self { atom })
    }

    pub fn atom(&self) -> &Atom<dyn HwManagementDriver, HwManagementState> {
        &self.atom
    }

    pub fn remove(&self) {
        self.atom.remove();
    }

    pub fn set_gpio(&self, setting: GpioSetting, on_complete: impl FnOnce(Result<()>) + Send + 'static) {
        self.atom.dispatch(
            on_complete,
            move |driver| {
                if setting.pin == 0 {
                    return Err(Error::invalid("GPIO pins are numbered from 1"));
                }
                Ok(driver.set_gpio(setting))
            },
            |_, ()| None,
        );
    }

    pub fn get_gpios(&self, on_complete: impl FnOnce(Result<Vec<GpioPin>>) + Send + 'static) {
        self.atom
            .dispatch(on_complete, |driver| Ok(driver.query_gpios()), |_, _| None);
    }

    pub fn get_properties(&self, on_complete: impl FnOnce(Result<Properties>) + Send + 'static) {
        self.atom.dispatch(
            move |result: Result<SimDetectionMode>| {
                on_complete(result.map(|m| vec![("SIMDetectionMode", m.as_str().into())]))
            },
            |driver| Ok(driver.query_simdet()),
            |cache, mode| {
                cache.simdet = Some(*mode);
                None
            },
        );
    }

    pub fn set_sim_detection_mode(
        &self,
        mode: SimDetectionMode,
        on_complete: impl FnOnce(Result<()>) + Send + 'static,
    ) {
        self.atom.dispatch(
            on_complete,
            move |driver| Ok(driver.set_simdet(mode)),
            move |cache, ()| {
                cache.simdet = Some(mode);
                Some(("SIMDetectionMode", mode.as_str().into()))
            },
        );
    }

    pub fn set_property(
        &self,
        name: &str,
        value: PropertyValue,
        on_complete: impl FnOnce(Result<()>) + Send + 'static,
    ) {
        let parsed = match (name, &value) {
            ("SIMDetectionMode", PropertyValue::Str(s)) => s.parse::<SimDetectionMode>(),
            _ => Err(Error::invalid(format!("cannot set {name} to {value}"))),
        };
        match parsed {
            Ok(mode) => self.set_sim_detection_mode(mode, on_complete),
            Err(err) => self.atom.dispatch(on_complete, move |_| Err(err), |_, ()| None),
        }
    }
}
