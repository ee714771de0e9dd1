//! `#CSURV` network survey and the `+COPS` registration toggles around it.

use std::sync::Arc;

use crate::decoder::Decoder;
use crate::engine::CommandEngine;
use crate::error::{DecodeError, Result};
use crate::facility::survey::{CopsMode, SurveyDriver, MAX_CELLS, MAX_CELL_LEN};
use crate::registry::{DriverDescriptor, ProbeContext};
use crate::transport::AtResponse;
use crate::workflow::Step;

use super::DRIVER_NAME;

const CSURV_PREFIX: &[&str] = &["arfcn:", "uarfcn:", "earfcn:", "Network survey"];

/// Raw cell lines between the start banner and the end banner.
pub fn decode_csurv(resp: &AtResponse) -> Result<Vec<String>, DecodeError> {
    if resp.lines.len() > MAX_CELLS {
        return Err(DecodeError::TooManyRows { cap: MAX_CELLS });
    }
    let mut decoder = Decoder::new(resp);
    let mut cells = Vec::new();
    while let Some(line) = decoder.next_raw_line() {
        if line.contains("Network survey started") {
            continue;
        }
        if line.contains("Network survey ended") {
            break;
        }
        cells.push(line.chars().take(MAX_CELL_LEN).collect());
    }
    Ok(cells)
}

pub fn csurv_command(range: Option<(u32, u32)>) -> String {
    match range {
        Some((start, end)) if start > 0 || end > 0 => format!("AT#CSURV={start},{end}"),
        _ => "AT#CSURV".to_string(),
    }
}

pub struct TelitSurvey {
    engine: CommandEngine,
}

impl SurveyDriver for TelitSurvey {
    fn set_registration(&self, mode: CopsMode) -> Option<Step<()>> {
        Some(Step::command(&self.engine, format!("AT+COPS={}", mode.code())))
    }

    fn configure(&self) -> Option<Step<()>> {
        // Drops the blank line between #CSURV records.
        Some(Step::command(&self.engine, "AT#ATDELAY=50"))
    }

    fn scan(&self, range: Option<(u32, u32)>) -> Option<Step<Vec<String>>> {
        Some(Step::transaction(&self.engine, csurv_command(range), CSURV_PREFIX, decode_csurv))
    }
}

pub struct Descriptor;

impl DriverDescriptor<dyn SurveyDriver> for Descriptor {
    fn name(&self) -> &str {
        DRIVER_NAME
    }

    fn probe(&self, ctx: &ProbeContext) -> Result<Arc<dyn SurveyDriver>> {
        ctx.atom.register();
        Ok(Arc::new(TelitSurvey {
            engine: ctx.engine.clone(),
        }))
    }
}

// ─── Tests ──────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn banners_are_dropped_and_end_stops_the_scan() {
        let resp = AtResponse::ok([
            "Network survey started ...",
            "earfcn: 1300 rxLev: -68",
            "Network survey ended",
            "earfcn: 9999 rxLev: -1",
        ]);
        assert_eq!(decode_csurv(&resp).unwrap(), vec!["earfcn: 1300 rxLev: -68".to_string()]);
    }

    #[test]
    fn long_cells_are_cut() {
        let resp = AtResponse::ok([format!("arfcn: {}", "9".repeat(300))]);
        assert_eq!(decode_csurv(&resp).unwrap()[0].len(), MAX_CELL_LEN);
    }

    #[test]
    fn too_many_lines_fail() {
        let lines: Vec<String> = (0..101).map(|i| format!("arfcn: {i}")).collect();
        assert_eq!(
            decode_csurv(&AtResponse::ok(lines)),
            Err(DecodeError::TooManyRows { cap: MAX_CELLS })
        );
    }

    #[test]
    fn range_only_sent_when_non_zero() {
        assert_eq!(csurv_command(None), "AT#CSURV");
        assert_eq!(csurv_command(Some((0, 124))), "AT#CSURV=0,124");
        assert_eq!(csurv_command(Some((0, 0))), "AT#CSURV");
    }
}
