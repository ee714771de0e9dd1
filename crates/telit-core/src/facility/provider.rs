//! Provider firmware selection: the `VerizonMode` property.

use crate::engine::CommandEngine;
use crate::error::{Error, Result};
use crate::facility::Atom;
use crate::notify::{EventBus, Properties, PropertyValue};
use crate::registry::{DriverRegistry, Vendor};
use crate::workflow::Step;

pub const FACILITY: &str = "provider";

pub trait ProviderDriver: Send + Sync {
    fn query_verizon_mode(&self) -> Option<Step<bool>> {
        None
    }

    fn set_verizon_mode(&self, _enabled: bool) -> Option<Step<()>> {
        None
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProviderState {
    pub verizon: bool,
}

#[derive(Debug, Clone)]
pub struct Provider {
    atom: Atom<dyn ProviderDriver, ProviderState>,
}

impl Provider {
    pub fn create(
        registry: &DriverRegistry<dyn ProviderDriver>,
        vendor: Vendor,
        driver: Option<&str>,
        engine: &CommandEngine,
        bus: EventBus,
    ) -> Result<Self> {
        Atom::create(registry, vendor, driver, engine, bus).map(|atom| Self { atom })
    }

    pub fn atom(&self) -> &Atom<dyn ProviderDriver, ProviderState> {
        &self.atom
    }

    pub fn remove(&self) {
        self.atom.remove();
    }

    pub fn get_properties(&self, on_complete: impl FnOnce(Result<Properties>) + Send + 'static) {
        self.atom.dispatch(
            move |result: Result<bool>| on_complete(result.map(|v| vec![("VerizonMode", v.into())])),
            |driver| Ok(driver.query_verizon_mode()),
            |state, enabled| {
                state.verizon = *enabled;
                None
            },
        );
    }

    pub fn set_verizon_mode(&self, enabled: bool, on_complete: impl FnOnce(Result<()>) + Send + 'static) {
        self.atom.dispatch(
            on_complete,
            move |driver| Ok(driver.set_verizon_mode(enabled)),
            move |state, ()| {
                state.verizon = enabled;
                Some(("VerizonMode", enabled.into()))
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
            ("VerizonMode", PropertyValue::Bool(v)) => self.set_verizon_mode(v, on_complete),
            (name, value) => {
                let err = Error::invalid(format!("cannot set {name} to {value}"));
                self.atom.dispatch(on_complete, move |_| Err(err), |_, ()| None);
            }
        }
    }
}
