//! # Telit Drivers
//!
//! AT implementations of every facility for Telit modules. All of them
//! register under [`DRIVER_NAME`] and share the modem's command engine;
//! vendor differences (LE910V2 tables, serial-mux quirks) are resolved per
//! instance from the probe context.

pub mod data_network;
pub mod hw_management;
pub mod me_control;
pub mod power_management;
pub mod provider;
pub mod radio_settings;
pub mod survey;
pub mod trace;
pub mod urc;

use std::sync::Arc;

use crate::error::Result;
use crate::facility::Registries;

pub const DRIVER_NAME: &str = "telitmodem";

/// Add the Telit driver for every facility to `registries`.
pub fn register_drivers(registries: &mut Registries) -> Result<()> {
    registries.radio_settings.register_driver(Arc::new(radio_settings::Descriptor))?;
    registries.data_network.register_driver(Arc::new(data_network::Descriptor))?;
    registries.power_management.register_driver(Arc::new(power_management::Descriptor))?;
    registries.hw_management.register_driver(Arc::new(hw_management::Descriptor))?;
    registries.me_control.register_driver(Arc::new(me_control::Descriptor))?;
    registries.trace.register_driver(Arc::new(trace::Descriptor))?;
    registries.urc.register_driver(Arc::new(urc::Descriptor))?;
    registries.provider.register_driver(Arc::new(provider::Descriptor))?;
    registries.survey.register_driver(Arc::new(survey::Descriptor))?;
    tracing::debug!(driver = DRIVER_NAME, "facility drivers registered");
    Ok(())
}

/// Remove every driver registered by [`register_drivers`].
pub fn unregister_drivers(registries: &mut Registries) {
    registries.radio_settings.unregister_driver(DRIVER_NAME);
    registries.data_network.unregister_driver(DRIVER_NAME);
    registries.power_management.unregister_driver(DRIVER_NAME);
    registries.hw_management.unregister_driver(DRIVER_NAME);
    registries.me_control.unregister_driver(DRIVER_NAME);
    registries.trace.unregister_driver(DRIVER_NAME);
    registries.urc.unregister_driver(DRIVER_NAME);
    registries.provider.unregister_driver(DRIVER_NAME);
    registries.survey.unregister_driver(DRIVER_NAME);
}
