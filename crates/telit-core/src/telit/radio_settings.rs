//! `+WS46` radio access mode selection.
//!
//! The probe asks the modem for its current mode and only registers the
//! facility when the command is understood.

use std::sync::Arc;

use crate::decoder::{decode_single, lookup_code};
use crate::engine::CommandEngine;
use crate::error::{DecodeError, Result};
use crate::facility::radio_settings::{RadioAccessMode, RadioSettingsDriver};
use crate::registry::{DriverDescriptor, ProbeContext, Vendor};
use crate::transport::AtResponse;
use crate::workflow::Step;

use super::DRIVER_NAME;

const WS46_PREFIX: &[&str] = &["+WS46:"];

const WS46_DEFAULT: &[(i64, RadioAccessMode)] = &[
    (25, RadioAccessMode::Any),
    (12, RadioAccessMode::Gsm),
    (22, RadioAccessMode::Umts),
];

const WS46_LE910V2: &[(i64, RadioAccessMode)] = &[
    (31, RadioAccessMode::Any),
    (12, RadioAccessMode::Gsm),
    (22, RadioAccessMode::Umts),
    (28, RadioAccessMode::Lte),
];

pub fn decode_ws46(resp: &AtResponse, vendor: Vendor) -> Result<RadioAccessMode, DecodeError> {
    let table = match vendor {
        Vendor::Le910v2 => WS46_LE910V2,
        _ => WS46_DEFAULT,
    };
    let code = decode_single(resp, "+WS46:", |f| f.next_integer())?;
    lookup_code(code, table)
}

/// `AT+WS46=<n>` argument for `mode`.
pub fn ws46_code(mode: RadioAccessMode) -> u32 {
    match mode {
        RadioAccessMode::Any => 25,
        RadioAccessMode::Gsm => 12,
        RadioAccessMode::Umts => 22,
        RadioAccessMode::Lte => 28,
        RadioAccessMode::GsmUmts => 29,
        RadioAccessMode::GsmLte => 30,
        RadioAccessMode::UmtsLte => 31,
    }
}

pub struct TelitRadioSettings {
    engine: CommandEngine,
    vendor: Vendor,
}

impl RadioSettingsDriver for TelitRadioSettings {
    fn query_rat_mode(&self) -> Option<Step<RadioAccessMode>> {
        let vendor = self.vendor;
        Some(Step::transaction(&self.engine, "AT+WS46?", WS46_PREFIX, move |r| {
            decode_ws46(r, vendor)
        }))
    }

    fn set_rat_mode(&self, mode: RadioAccessMode) -> Option<Step<()>> {
        Some(Step::command(&self.engine, format!("AT+WS46={}", ws46_code(mode))))
    }
}

pub struct Descriptor;

impl DriverDescriptor<dyn RadioSettingsDriver> for Descriptor {
    fn name(&self) -> &str {
        DRIVER_NAME
    }

    fn probe(&self, ctx: &ProbeContext) -> Result<Arc<dyn RadioSettingsDriver>> {
        let atom = ctx.atom.clone();
        Step::transaction(&ctx.engine, "AT+WS46?", WS46_PREFIX, |_| Ok(())).run(move |supported| {
            match supported {
                Ok(()) => atom.register(),
                Err(err) => {
                    tracing::warn!(error = %err, "+WS46 not supported, dropping radio settings");
                    atom.remove();
                }
            }
        });
        Ok(Arc::new(TelitRadioSettings {
            engine: ctx.engine.clone(),
            vendor: ctx.vendor,
        }))
    }
}

// ─── Tests ──────────────────────────────────────────────────────────────────
