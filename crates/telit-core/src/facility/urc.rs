//! # Unsolicited Reporting
//!
//! Boolean switches for the modem's unsolicited result codes. Each switch
//! is a host property; `get_properties` reads them all back in one chain.
//! On the serial-mux vendor the network type switch (`#PSNT`) is neither
//! queried nor reported.

use std::collections::BTreeMap;
use std::fmt;

use crate::engine::CommandEngine;
use crate::error::{Error, Result};
use crate::facility::Atom;
use crate::notify::{EventBus, Properties, PropertyValue};
use crate::registry::{DriverRegistry, Vendor};
use crate::workflow::Step;

pub const FACILITY: &str = "urc";

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum UrcSwitch {
    NetworkStatus,
    GprsStatus,
    GprsEvents,
    NetworkType,
    RssiControl,
    SimStatus,
}

impl UrcSwitch {
    /// Reporting order of `get_properties`.
    pub const ALL: [UrcSwitch; 6] = [
        UrcSwitch::NetworkStatus,
        UrcSwitch::GprsStatus,
        UrcSwitch::GprsEvents,
        UrcSwitch::NetworkType,
        UrcSwitch::RssiControl,
        UrcSwitch::SimStatus,
    ];

    /// Query order of `get_properties`.
    pub const QUERY_ORDER: [UrcSwitch; 6] = [
        UrcSwitch::SimStatus,
        UrcSwitch::RssiControl,
        UrcSwitch::NetworkType,
        UrcSwitch::GprsEvents,
        UrcSwitch::GprsStatus,
        UrcSwitch::NetworkStatus,
    ];

    pub fn property(self) -> &'static str {
        match self {
            UrcSwitch::NetworkStatus => "NetworkStatus",
            UrcSwitch::GprsStatus => "GPRSStatus",
            UrcSwitch::GprsEvents => "GPRSEvents",
            UrcSwitch::NetworkType => "NetworkType",
            UrcSwitch::RssiControl => "RSSIControl",
            UrcSwitch::SimStatus => "SIMStatus",
        }
    }

    pub fn from_property(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|s| s.property() == name)
    }

    fn applies_to(self, vendor: Vendor) -> bool {
        !(self == UrcSwitch::NetworkType && vendor == Vendor::TelitSerial)
    }
}

impl fmt::Display for UrcSwitch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.property())
    }
}

pub trait UrcDriver: Send + Sync {
    fn query(&self, _switch: UrcSwitch) -> Option<Step<bool>> {
        None
    }

    fn set(&self, _switch: UrcSwitch, _enabled: bool) -> Option<Step<()>> {
        None
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UrcState {
    pub switches: BTreeMap<UrcSwitch, bool>,
}

impl UrcState {
    pub fn properties(&self) -> Properties {
        UrcSwitch::ALL
            .into_iter()
            .filter_map(|s| self.switches.get(&s).map(|v| (s.property(), PropertyValue::Bool(*v))))
            .collect()
    }
}

#[derive(Debug, Clone)]
pub struct Urc {
    atom: Atom<dyn UrcDriver, UrcState>,
}

impl Urc {
    pub fn create(
        registry: &DriverRegistry<dyn UrcDriver>,
        vendor: Vendor,
        driver: Option<&str>,
        engine: &CommandEngine,
        bus: EventBus,
    ) -> Result<Self> {
        Atom::create(registry, vendor, driver, engine, bus).map(|atom| Self { atom })
    }

    pub fn atom(&self) -> &Atom<dyn UrcDriver, UrcState> {
        &self.atom
    }

    pub fn remove(&self) {
        self.atom.remove();
    }

    /// Every switch must be queryable; a driver missing any query answers
    /// `NotImplemented` before anything is sent.
    pub fn get_properties(&self, on_complete: impl FnOnce(Result<Properties>) + Send + 'static) {
        let vendor = self.atom.vendor();
        self.atom.dispatch(
            move |result: Result<UrcState>| on_complete(result.map(|s| s.properties())),
            move |driver| {
                if UrcSwitch::ALL.iter().any(|s| driver.query(*s).is_none()) {
                    return Ok(None);
                }
                let steps: Option<Vec<_>> = UrcSwitch::QUERY_ORDER
                    .into_iter()
                    .filter(|s| s.applies_to(vendor))
                    .map(|s| driver.query(s).map(|step| step.map(move |enabled| (s, enabled))))
                    .collect();
                let Some(steps) = steps else {
                    return Ok(None);
                };
                Ok(Some(Step::sequence(steps).map(|values| UrcState {
                    switches: values.into_iter().collect(),
                })))
            },
            |state, fresh| {
                *state = fresh.clone();
                None
            },
        );
    }

    pub fn set_switch(&self, switch: UrcSwitch, enabled: bool, on_complete: impl FnOnce(Result<()>) + Send + 'static) {
        self.atom.dispatch(
            on_complete,
            move |driver| Ok(driver.set(switch, enabled)),
            move |state, ()| {
                state.switches.insert(switch, enabled);
                Some((switch.property(), enabled.into()))
            },
        );
    }

    pub fn set_property(
        &self,
        name: &str,
        value: PropertyValue,
        on_complete: impl FnOnce(Result<()>) + Send + 'static,
    ) {
        match (UrcSwitch::from_property(name), value) {
            (Some(switch), PropertyValue::Bool(enabled)) => self.set_switch(switch, enabled, on_complete),
            (_, value) => {
                let err = Error::invalid(format!("cannot set {name} to {value}"));
                self.atom.dispatch(on_complete, move |_| Err(err), |_, ()| None);
            }
        }
    }
}

// ─── Tests ──────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn property_names_map_back_to_switches() {
        for switch in UrcSwitch::ALL {
            assert_eq!(UrcSwitch::from_property(switch.property()), Some(switch));
        }
        assert_eq!(UrcSwitch::from_property("Bogus"), None);
    }

    #[test]
    fn serial_vendor_skips_network_type() {
        assert!(!UrcSwitch::NetworkType.applies_to(Vendor::TelitSerial));
        assert!(UrcSwitch::NetworkType.applies_to(Vendor::Default));
        assert!(UrcSwitch::SimStatus.applies_to(Vendor::TelitSerial));
    }

    #[test]
    fn properties_follow_reporting_order() {
        let state = UrcState {
            switches: [(UrcSwitch::SimStatus, true), (UrcSwitch::NetworkStatus, false)]
                .into_iter()
                .collect(),
        };
        assert_eq!(
            state.properties(),
            vec![
                ("NetworkStatus", PropertyValue::Bool(false)),
                ("SIMStatus", PropertyValue::Bool(true)),
            ]
        );
    }
}
