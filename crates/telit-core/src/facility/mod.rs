//! # Facilities
//!
//! Host-facing front ends, one per capability kind. Each facility owns an
//! [`Atom`]: the bound driver, the single pending-operation slot, the
//! lifecycle handle and a cache of the last known property values.
//!
//! Every operation follows the same discipline, in order:
//!
//! 1. instance removed: [`Error::InstanceGone`]
//! 2. another operation in flight: [`Error::Busy`]
//! 3. bad arguments: [`Error::InvalidArgument`]
//! 4. driver lacks the operation: [`Error::NotImplemented`]
//! 5. otherwise the driver's step runs; on completion the pending slot is
//!    cleared, the cache updated and the caller answered exactly once.
//!
//! Steps 1 to 4 answer synchronously and never touch the modem.

use std::sync::{Arc, Mutex, MutexGuard};

use crate::engine::CommandEngine;
use crate::error::{Error, Result};
use crate::notify::{EventBus, ModemEvent, PropertyValue};
use crate::registry::{AtomHandle, DriverRegistry, Vendor};
use crate::workflow::Step;

pub mod data_network;
pub mod hw_management;
pub mod me_control;
pub mod power_management;
pub mod provider;
pub mod radio_settings;
pub mod survey;
pub mod trace;
pub mod urc;

use data_network::DataNetworkDriver;
use hw_management::HwManagementDriver;
use me_control::MeControlDriver;
use power_management::PowerManagementDriver;
use provider::ProviderDriver;
use radio_settings::RadioSettingsDriver;
use survey::SurveyDriver;
use trace::TraceDriver;
use urc::UrcDriver;

// ─── Registries ─────────────────────────────────────────────────────────────

/// One driver registry per facility kind.
#[derive(Debug)]
pub struct Registries {
    pub radio_settings: DriverRegistry<dyn RadioSettingsDriver>,
    pub data_network: DriverRegistry<dyn DataNetworkDriver>,
    pub power_management: DriverRegistry<dyn PowerManagementDriver>,
    pub hw_management: DriverRegistry<dyn HwManagementDriver>,
    pub me_control: DriverRegistry<dyn MeControlDriver>,
    pub trace: DriverRegistry<dyn TraceDriver>,
    pub urc: DriverRegistry<dyn UrcDriver>,
    pub provider: DriverRegistry<dyn ProviderDriver>,
    pub survey: DriverRegistry<dyn SurveyDriver>,
}

impl Default for Registries {
    fn default() -> Self {
        Self::new()
    }
}

impl Registries {
    pub fn new() -> Self {
        Self {
            radio_settings: DriverRegistry::new(radio_settings::FACILITY),
            data_network: DriverRegistry::new(data_network::FACILITY),
            power_management: DriverRegistry::new(power_management::FACILITY),
            hw_management: DriverRegistry::new(hw_management::FACILITY),
            me_control: DriverRegistry::new(me_control::FACILITY),
            trace: DriverRegistry::new(trace::FACILITY),
            urc: DriverRegistry::new(urc::FACILITY),
            provider: DriverRegistry::new(provider::FACILITY),
            survey: DriverRegistry::new(survey::FACILITY),
        }
    }

    /// Registries preloaded with the Telit drivers.
    pub fn with_telit() -> Result<Self> {
        let mut registries = Self::new();
        crate::telit::register_drivers(&mut registries)?;
        Ok(registries)
    }
}

// ─── Atom ───────────────────────────────────────────────────────────────────

/// Property update produced when an operation settles.
pub(crate) type Change = Option<(&'static str, PropertyValue)>;

struct AtomState<D: ?Sized, S> {
    driver: Option<Arc<D>>,
    pending: bool,
    cache: S,
}

struct Shared<D: ?Sized, S> {
    facility: &'static str,
    vendor: Vendor,
    driver_name: String,
    handle: AtomHandle,
    bus: EventBus,
    state: Mutex<AtomState<D, S>>,
}

/// One facility instance bound to one driver.
pub struct Atom<D: ?Sized, S> {
    shared: Arc<Shared<D, S>>,
}

impl<D: ?Sized, S> Clone for Atom<D, S> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<D: ?Sized, S> std::fmt::Debug for Atom<D, S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Atom")
            .field("facility", &self.shared.facility)
            .field("driver", &self.shared.driver_name)
            .field("state", &self.shared.handle.state())
            .finish()
    }
}

impl<D, S> Atom<D, S>
where
    D: ?Sized + Send + Sync + 'static,
    S: Default + Clone + Send + 'static,
{
    /// Probe `registry` and bind the first driver that accepts.
    pub(crate) fn create(
        registry: &DriverRegistry<D>,
        vendor: Vendor,
        driver: Option<&str>,
        engine: &CommandEngine,
        bus: EventBus,
    ) -> Result<Self> {
        let binding = registry.create_instance(vendor, driver, engine)?;
        tracing::info!(
            facility = registry.facility(),
            driver = %binding.driver_name,
            vendor = %vendor,
            "facility instance created"
        );
        Ok(Self {
            shared: Arc::new(Shared {
                facility: registry.facility(),
                vendor,
                driver_name: binding.driver_name,
                handle: binding.atom,
                bus,
                state: Mutex::new(AtomState {
                    driver: Some(binding.driver),
                    pending: false,
                    cache: S::default(),
                }),
            }),
        })
    }

    fn lock(&self) -> MutexGuard<'_, AtomState<D, S>> {
        self.shared.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn facility(&self) -> &'static str {
        self.shared.facility
    }

    pub fn vendor(&self) -> Vendor {
        self.shared.vendor
    }

    pub fn driver_name(&self) -> &str {
        &self.shared.driver_name
    }

    pub fn handle(&self) -> &AtomHandle {
        &self.shared.handle
    }

    /// Host-visible: registered and not yet removed.
    pub fn is_registered(&self) -> bool {
        self.shared.handle.is_registered()
    }

    pub fn is_removed(&self) -> bool {
        self.shared.handle.is_removed()
    }

    pub fn is_busy(&self) -> bool {
        self.lock().pending
    }

    /// Last known property values.
    pub fn cached(&self) -> S {
        self.lock().cache.clone()
    }

    /// Unbind the driver. Later operations answer `InstanceGone`; an
    /// operation already in flight still gets its single reply.
    pub fn remove(&self) {
        self.lock().driver.take();
        self.shared.handle.remove();
    }

    /// Run one facility operation under the pending-slot discipline.
    ///
    /// `build` asks the driver for its step; it returns `Ok(None)` when the
    /// driver does not implement the operation and `Err` for argument
    /// errors detected once the driver is known. `settle` runs on success
    /// with the cache locked and may report one property change.
    pub(crate) fn dispatch<T, B, U, F>(&self, on_complete: F, build: B, settle: U)
    where
        T: Send + 'static,
        B: FnOnce(&Arc<D>) -> Result<Option<Step<T>>>,
        U: FnOnce(&mut S, &T) -> Change + Send + 'static,
        F: FnOnce(Result<T>) + Send + 'static,
    {
        let claimed = if self.shared.handle.is_removed() {
            Err(Error::InstanceGone)
        } else {
            let mut state = self.lock();
            if state.pending {
                Err(Error::Busy)
            } else if let Some(driver) = state.driver.clone() {
                state.pending = true;
                Ok(driver)
            } else {
                Err(Error::InstanceGone)
            }
        };

        let driver = match claimed {
            Ok(driver) => driver,
            Err(err) => {
                tracing::debug!(facility = self.shared.facility, error = %err, "operation refused");
                on_complete(Err(err));
                return;
            }
        };

        let step = match build(&driver) {
            Ok(Some(step)) => step,
            Ok(None) => {
                self.release();
                on_complete(Err(Error::NotImplemented));
                return;
            }
            Err(err) => {
                self.release();
                on_complete(Err(err));
                return;
            }
        };
        drop(driver);

        let atom = self.clone();
        step.run(move |result| {
            let change = {
                let mut state = atom.lock();
                state.pending = false;
                match &result {
                    Ok(value) => settle(&mut state.cache, value),
                    Err(_) => None,
                }
            };
            if let Some((property, value)) = change {
                atom.notify(property, value);
            }
            on_complete(result);
        });
    }

    fn release(&self) {
        self.lock().pending = false;
    }

    /// Emit `PropertyChanged`, but only for a registered instance.
    pub(crate) fn notify(&self, property: &'static str, value: PropertyValue) {
        if !self.is_registered() {
            return;
        }
        tracing::debug!(facility = self.shared.facility, property, %value, "property changed");
        self.shared.bus.emit(ModemEvent::PropertyChanged {
            facility: self.shared.facility,
            property,
            value,
        });
    }
}

/// Ensure `value` fits in `max` characters.
pub(crate) fn check_len(what: &str, value: &str, max: usize) -> Result<()> {
    if value.chars().count() > max {
        return Err(Error::invalid(format!("{what} longer than {max} characters")));
    }
    Ok(())
}

// ─── Tests ──────────────────────────────────────────────────────────────────
