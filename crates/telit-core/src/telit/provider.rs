//! `#FWSWITCH` firmware image selection.

use std::sync::Arc;

use crate::decoder::{decode_single, lookup_code};
use crate::engine::CommandEngine;
use crate::error::{DecodeError, Result};
use crate::facility::provider::ProviderDriver;
use crate::registry::{DriverDescriptor, ProbeContext};
use crate::transport::AtResponse;
use crate::workflow::Step;

use super::DRIVER_NAME;

const FWSWITCH: &[(i64, bool)] = &[(0, false), (1, true)];

/// Image 1 is the Verizon firmware.
pub fn decode_fwswitch(resp: &AtResponse) -> Result<bool, DecodeError> {
    let code = decode_single(resp, "#FWSWITCH:", |f| f.next_integer())?;
    lookup_code(code, FWSWITCH)
}

pub struct TelitProvider {
    engine: CommandEngine,
}

impl ProviderDriver for TelitProvider {
    fn query_verizon_mode(&self) -> Option<Step<bool>> {
        Some(Step::transaction(&self.engine, "AT#FWSWITCH?", &["#FWSWITCH:"], decode_fwswitch))
    }

    fn set_verizon_mode(&self, enabled: bool) -> Option<Step<()>> {
        // Second argument stores the choice across reboots.
        Some(Step::command(
            &self.engine,
            format!("AT#FWSWITCH={},1", u8::from(enabled)),
        ))
    }
}

pub struct Descriptor;

impl DriverDescriptor<dyn ProviderDriver> for Descriptor {
    fn name(&self) -> &str {
        DRIVER_NAME
    }

    fn probe(&self, ctx: &ProbeContext) -> Result<Arc<dyn ProviderDriver>> {
        ctx.atom.register();
        Ok(Arc::new(TelitProvider {
            engine: ctx.engine.clone(),
        }))
    }
}
