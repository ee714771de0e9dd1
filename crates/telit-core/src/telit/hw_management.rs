//! `#GPIO` pins and `#SIMDET` SIM detection.

use std::sync::Arc;

use crate::decoder::{decode_single, decode_table, lookup_code};
use crate::engine::CommandEngine;
use crate::error::{DecodeError, Result};
use crate::facility::hw_management::{
    GpioPin, GpioSetting, HwManagementDriver, SimDetectionMode, MAX_GPIOS,
};
use crate::registry::{DriverDescriptor, ProbeContext};
use crate::transport::AtResponse;
use crate::workflow::Step;

use super::DRIVER_NAME;

const SIMDET: &[(i64, SimDetectionMode)] = &[
    (0, SimDetectionMode::NotInserted),
    (1, SimDetectionMode::Inserted),
    (2, SimDetectionMode::Auto),
];

/// One `#GPIO: <mode>,<dir>` row per pin; the row position is the pin.
pub fn decode_gpios(resp: &AtResponse) -> Result<Vec<GpioPin>, DecodeError> {
    decode_table(resp, "#GPIO:", MAX_GPIOS, |idx, f| {
        Ok(GpioPin {
            pin: idx as u32 + 1,
            mode: f.next_integer()?,
            dir: f.next_integer()?,
        })
    })
}

pub fn decode_simdet(resp: &AtResponse) -> Result<SimDetectionMode, DecodeError> {
    let code = decode_single(resp, "#SIMDET:", |f| f.next_integer())?;
    lookup_code(code, SIMDET)
}

pub struct TelitHwManagement {
    engine: CommandEngine,
}

impl HwManagementDriver for TelitHwManagement {
    fn set_gpio(&self, setting: GpioSetting) -> Option<Step<()>> {
        Some(Step::command(
            &self.engine,
            format!(
                "AT#GPIO={},{},{},{}",
                setting.pin,
                setting.mode,
                setting.dir,
                u8::from(setting.save)
            ),
        ))
    }

    fn query_gpios(&self) -> Option<Step<Vec<GpioPin>>> {
        Some(Step::transaction(&self.engine, "AT#GPIO?", &["#GPIO:"], decode_gpios))
    }

    fn query_simdet(&self) -> Option<Step<SimDetectionMode>> {
        Some(Step::transaction(&self.engine, "AT#SIMDET?", &["#SIMDET:"], decode_simdet))
    }

    fn set_simdet(&self, mode: SimDetectionMode) -> Option<Step<()>> {
        Some(Step::command(&self.engine, format!("AT#SIMDET={}", mode.code())))
    }
}

pub struct Descriptor;

impl DriverDescriptor<dyn HwManagementDriver> for Descriptor {
    fn name(&self) -> &str {
        DRIVER_NAME
    }

    fn probe(&self, ctx: &ProbeContext) -> Result<Arc<dyn HwManagementDriver>> {
        ctx.atom.register();
        Ok(Arc::new(TelitHwManagement {
            engine: ctx.engine.clone(),
        }))
    }
}

// ─── Tests ──────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn gpio_rows_are_numbered_from_one() {
        let resp = AtResponse::ok(["#GPIO: 1,0", "#GPIO: 0,1", "#GPIO: 2,0"]);
        let pins = decode_gpios(&resp).unwrap();
        assert_eq!(pins.len(), 3);
        assert_eq!(pins[0], GpioPin { pin: 1, mode: 1, dir: 0 });
        assert_eq!(pins[2], GpioPin { pin: 3, mode: 2, dir: 0 });
    }

    #[test]
    fn gpio_table_over_cap_fails() {
        let rows: Vec<String> = (0..21).map(|_| "#GPIO: 0,0".to_string()).collect();
        assert_eq!(
            decode_gpios(&AtResponse::ok(rows)),
            Err(DecodeError::TooManyRows { cap: MAX_GPIOS })
        );
    }

    #[test]
    fn gpio_row_missing_direction_fails() {
        let resp = AtResponse::ok(["#GPIO: 1"]);
        assert_eq!(decode_gpios(&resp), Err(DecodeError::FieldMissing { index: 1 }));
    }

    #[test]
    fn simdet_codes() {
        assert_eq!(
            decode_simdet(&AtResponse::ok(["#SIMDET: 2,1"])),
            Ok(SimDetectionMode::Auto)
        );
        assert!(decode_simdet(&AtResponse::ok(["#SIMDET: 7"])).is_err());
    }
}
