//! # Trace
//!
//! Modem-side tracing: `TraceStatus` (on/off), `PortConfig` (USB port
//! layout) and `TraceConfig` (trace mask), plus a modem reboot.
//!
//! `get_properties` queries trace status, port configuration and trace
//! mask in that order.

use crate::engine::CommandEngine;
use crate::error::{Error, Result};
use crate::facility::{check_len, Atom};
use crate::notify::{EventBus, Properties, PropertyValue};
use crate::registry::{DriverRegistry, Vendor};
use crate::workflow::Step;

pub const FACILITY: &str = "trace";

/// Longest trace mask accepted by `set_config`.
pub const MAX_TRACE_MASK_LEN: usize = 64;

pub trait TraceDriver: Send + Sync {
    fn reboot(&self) -> Option<Step<()>> {
        None
    }

    fn query_status(&self) -> Option<Step<bool>> {
        None
    }

    fn set_status(&self, _enabled: bool) -> Option<Step<()>> {
        None
    }

    fn query_port_config(&self) -> Option<Step<u32>> {
        None
    }

    fn set_port_config(&self, _config: u32) -> Option<Step<()>> {
        None
    }

    fn query_config(&self) -> Option<Step<String>> {
        None
    }

    fn set_config(&self, _mask: &str) -> Option<Step<()>> {
        None
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TraceState {
    pub enabled: bool,
    pub port_config: u32,
    pub mask: String,
}

impl TraceState {
    pub fn properties(&self) -> Properties {
        vec![
            ("TraceStatus", self.enabled.into()),
            ("PortConfig", self.port_config.into()),
            ("TraceConfig", self.mask.as_str().into()),
        ]
    }
}

#[derive(Debug, Clone)]
pub struct Trace {
    atom: Atom<dyn TraceDriver, TraceState>,
}

impl Trace {
    pub fn create(
        registry: &DriverRegistry<dyn TraceDriver>,
        vendor: Vendor,
        driver: Option<&str>,
        engine: &CommandEngine,
        bus: EventBus,
    ) -> Result<Self> {
        Atom::create(registry, vendor, driver, engine, bus).map(|atom| Self { atom })
    }

    pub fn atom(&self) -> &Atom<dyn TraceDriver, TraceState> {
        &self.atom
    }

    pub fn remove(&self) {
        self.atom.remove();
    }

    pub fn reboot(&self, on_complete: impl FnOnce(Result<()>) + Send + 'static) {
        self.atom
            .dispatch(on_complete, |driver| Ok(driver.reboot()), |_, ()| None);
    }

    pub fn get_properties(&self, on_complete: impl FnOnce(Result<Properties>) + Send + 'static) {
        self.atom.dispatch(
            move |result: Result<TraceState>| on_complete(result.map(|s| s.properties())),
            |driver| {
                let (Some(status), Some(port), Some(config)) =
                    (driver.query_status(), driver.query_port_config(), driver.query_config())
                else {
                    return Ok(None);
                };
                Ok(Some(status.and_then(move |enabled| {
                    port.and_then(move |port_config| {
                        config.map(move |mask| TraceState {
                            enabled,
                            port_config,
                            mask,
                        })
                    })
                })))
            },
            |state, fresh| {
                *state = fresh.clone();
                None
            },
        );
    }

    pub fn set_status(&self, enabled: bool, on_complete: impl FnOnce(Result<()>) + Send + 'static) {
        self.atom.dispatch(
            on_complete,
            move |driver| Ok(driver.set_status(enabled)),
            move |state, ()| {
                state.enabled = enabled;
                Some(("TraceStatus", enabled.into()))
            },
        );
    }

    pub fn set_port_config(&self, config: u32, on_complete: impl FnOnce(Result<()>) + Send + 'static) {
        self.atom.dispatch(
            on_complete,
            move |driver| Ok(driver.set_port_config(config)),
            move |state, ()| {
                state.port_config = config;
                Some(("PortConfig", config.into()))
            },
        );
    }

    /// Masks longer than [`MAX_TRACE_MASK_LEN`] are refused, not cut.
    pub fn set_config(&self, mask: &str, on_complete: impl FnOnce(Result<()>) + Send + 'static) {
        let mask = mask.to_string();
        let settled = mask.clone();
        self.atom.dispatch(
            on_complete,
            move |driver| {
                check_len("trace mask", &mask, MAX_TRACE_MASK_LEN)?;
                Ok(driver.set_config(&mask))
            },
            move |state, ()| {
                state.mask = settled.clone();
                Some(("TraceConfig", settled.into()))
            },
        );
    }

    pub fn set_property(
        &self,
        name: &str,
        value: PropertyValue,
        on_complete: impl FnOnce(Result<()>) + Send + 'static,
    ) {
        match (name, value) {
            ("TraceStatus", PropertyValue::Bool(v)) => self.set_status(v, on_complete),
            ("PortConfig", PropertyValue::Uint(v)) => self.set_port_config(v, on_complete),
            ("TraceConfig", PropertyValue::Str(v)) => self.set_config(&v, on_complete),
            (name, value) => {
                let err = Error::invalid(format!("cannot set {name} to {value}"));
                self.atom.dispatch(on_complete, move |_| Err(err), |_, ()| None);
            }
        }
    }
}
