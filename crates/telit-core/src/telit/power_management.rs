//! `+CFUN` functionality level.

use std::sync::Arc;

use crate::decoder::{decode_single, lookup_code};
use crate::engine::CommandEngine;
use crate::error::{DecodeError, Result};
use crate::facility::power_management::{PowerManagementDriver, PowerState};
use crate::registry::{DriverDescriptor, ProbeContext};
use crate::transport::AtResponse;
use crate::workflow::Step;

use super::DRIVER_NAME;

const CFUN: &[(i64, PowerState)] = &[
    (1, PowerState::Full),
    (4, PowerState::Airplane),
    (5, PowerState::Saving),
];

pub fn decode_cfun(resp: &AtResponse) -> Result<PowerState, DecodeError> {
    let code = decode_single(resp, "+CFUN:", |f| f.next_integer())?;
    lookup_code(code, CFUN)
}

pub struct TelitPowerManagement {
    engine: CommandEngine,
}

impl PowerManagementDriver for TelitPowerManagement {
    fn query_state(&self) -> Option<Step<PowerState>> {
        Some(Step::transaction(&self.engine, "AT+CFUN?", &["+CFUN:"], decode_cfun))
    }

    fn set_state(&self, state: PowerState) -> Option<Step<()>> {
        Some(Step::command(&self.engine, format!("AT+CFUN={}", state.code())))
    }
}

pub struct Descriptor;

impl DriverDescriptor<dyn PowerManagementDriver> for Descriptor {
    fn name(&self) -> &str {
        DRIVER_NAME
    }

    fn probe(&self, ctx: &ProbeContext) -> Result<Arc<dyn PowerManagementDriver>> {
        ctx.atom.register();
        Ok(Arc::new(TelitPowerManagement {
            engine: ctx.engine.clone(),
        }))
    }
}

// ─── Tests ──────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cfun_levels() {
        assert_eq!(decode_cfun(&AtResponse::ok(["+CFUN: 4"])), Ok(PowerState::Airplane));
        assert_eq!(decode_cfun(&AtResponse::ok(["+CFUN: 5"])), Ok(PowerState::Saving));
        assert_eq!(
            decode_cfun(&AtResponse::ok(["+CFUN: 0"])),
            Err(DecodeError::UnknownCode { code: 0 })
        );
    }
}
