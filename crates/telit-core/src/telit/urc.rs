//! Unsolicited result code switches.
//!
//! Every switch is read back through the first field of its query answer:
//! `0` is off and any enabling level is on.

use std::sync::Arc;

use crate::decoder::{decode_single, lookup_code};
use crate::engine::CommandEngine;
use crate::error::{DecodeError, Result};
use crate::facility::urc::{UrcDriver, UrcSwitch};
use crate::registry::{DriverDescriptor, ProbeContext};
use crate::transport::AtResponse;
use crate::workflow::Step;

use super::DRIVER_NAME;

const LEVELS: &[(i64, bool)] = &[(0, false), (1, true), (2, true)];
const CMER_LEVELS: &[(i64, bool)] = &[(0, false), (1, true), (2, true), (3, true)];

/// Command, response prefix and decode table for one switch.
struct SwitchCommand {
    name: &'static str,
    prefix: &'static [&'static str],
    levels: &'static [(i64, bool)],
    on: &'static str,
    off: &'static str,
}

fn command_for(switch: UrcSwitch) -> SwitchCommand {
    match switch {
        UrcSwitch::NetworkStatus => SwitchCommand {
            name: "+CREG",
            prefix: &["+CREG:"],
            levels: LEVELS,
            on: "2",
            off: "0",
        },
        UrcSwitch::GprsStatus => SwitchCommand {
            name: "+CGREG",
            prefix: &["+CGREG:"],
            levels: LEVELS,
            on: "2",
            off: "0",
        },
        UrcSwitch::GprsEvents => SwitchCommand {
            name: "+CGEREP",
            prefix: &["+CGEREP:"],
            levels: LEVELS,
            on: "1",
            off: "0",
        },
        UrcSwitch::NetworkType => SwitchCommand {
            name: "#PSNT",
            prefix: &["#PSNT:"],
            levels: LEVELS,
            on: "1",
            off: "0",
        },
        UrcSwitch::RssiControl => SwitchCommand {
            name: "+CMER",
            prefix: &["+CMER:"],
            levels: CMER_LEVELS,
            on: "3,0,0,2",
            off: "0,0,0,0",
        },
        UrcSwitch::SimStatus => SwitchCommand {
            name: "#QSS",
            prefix: &["#QSS:"],
            levels: LEVELS,
            on: "1",
            off: "0",
        },
    }
}

pub fn decode_switch(switch: UrcSwitch, resp: &AtResponse) -> Result<bool, DecodeError> {
    let cmd = command_for(switch);
    let code = decode_single(resp, cmd.prefix[0], |f| f.next_integer())?;
    lookup_code(code, cmd.levels)
}

pub struct TelitUrc {
    engine: CommandEngine,
}

impl UrcDriver for TelitUrc {
    fn query(&self, switch: UrcSwitch) -> Option<Step<bool>> {
        let cmd = command_for(switch);
        Some(Step::transaction(
            &self.engine,
            format!("AT{}?", cmd.name),
            cmd.prefix,
            move |r| decode_switch(switch, r),
        ))
    }

    fn set(&self, switch: UrcSwitch, enabled: bool) -> Option<Step<()>> {
        let cmd = command_for(switch);
        let value = if enabled { cmd.on } else { cmd.off };
        Some(Step::command(&self.engine, format!("AT{}={value}", cmd.name)))
    }
}

pub struct Descriptor;

impl DriverDescriptor<dyn UrcDriver> for Descriptor {
    fn name(&self) -> &str {
        DRIVER_NAME
    }

    fn probe(&self, ctx: &ProbeContext) -> Result<Arc<dyn UrcDriver>> {
        ctx.atom.register();
        Ok(Arc::new(TelitUrc {
            engine: ctx.engine.clone(),
        }))
    }
}

// ─── Tests ──────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn enabling_levels_read_as_on() {
        let resp = AtResponse::ok(["+CREG: 2,1"]);
        assert_eq!(decode_switch(UrcSwitch::NetworkStatus, &resp), Ok(true));
        let resp = AtResponse::ok(["#QSS: 0,1"]);
        assert_eq!(decode_switch(UrcSwitch::SimStatus, &resp), Ok(false));
    }

    #[test]
    fn only_cmer_accepts_level_three() {
        let resp = AtResponse::ok(["+CMER: 3,0,0,2,0"]);
        assert_eq!(decode_switch(UrcSwitch::RssiControl, &resp), Ok(true));
        let resp = AtResponse::ok(["+CGEREP: 3,0"]);
        assert_eq!(
            decode_switch(UrcSwitch::GprsEvents, &resp),
            Err(DecodeError::UnknownCode { code: 3 })
        );
    }

    #[test]
    fn set_commands_use_vendor_levels() {
        assert_eq!(command_for(UrcSwitch::NetworkStatus).on, "2");
        assert_eq!(command_for(UrcSwitch::RssiControl).off, "0,0,0,0");
        assert_eq!(command_for(UrcSwitch::NetworkType).name, "#PSNT");
    }
}
