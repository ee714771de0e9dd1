//! # Trace Driver
//!
//! Modem-side tracing. The LE910V2 firmware has no `+TRACE`/`+XTRACECONFIG`
//! and is driven through `+XSYSTRACE` and `#RTDE` instead; `#PORTCFG` and
//! `#REBOOT` are common to both.

use std::sync::Arc;

use crate::decoder::{decode_single, lookup_code, Decoder};
use crate::engine::CommandEngine;
use crate::error::{DecodeError, Result};
use crate::facility::trace::{TraceDriver, MAX_TRACE_MASK_LEN};
use crate::registry::{DriverDescriptor, ProbeContext, Vendor};
use crate::transport::AtResponse;
use crate::workflow::Step;

use super::DRIVER_NAME;

/// Most lines a `+XSYSTRACE` status answer may carry.
const MAX_XSYSTRACE_LINES: usize = 10;

const XSYSTRACE_QUERY: &str = "AT+XSYSTRACE=1,,\"bb_sw=#\"";
const XSYSTRACE_PREFIX: &[&str] = &["Trace flags:", "tr:"];

const XSYSTRACE_ON: &str = concat!(
    "AT+XSYSTRACE=0,",
    "\"bb_sw=1;3g_sw=1;lte_l1_sw=1;digrfx=1;3g_dsp=1\",",
    "\"bb_sw=sdl:th,tr,st,pr,mo,lt,db,li,sy",
    "|fts:xllt(gprs,umts),mon(gprs,umts),sdl(gprs,umts),llt(gprs,umts)",
    "|egdci:0x00000001|lte_stk:0x02,0x83FFFFFF|ims:1",
    "|lte_stk:0x01,0xFFFFFFFF,0xFFFFFFFF,0xFFFFFFFF,0xFFFFFFFF",
    "|xllt:xllt_set_template(1,{basic});digrfx=0x0003;lte_l1_sw=(ALL,NORMAL,ALL,ALL)\",",
    "\"oct=4;oct_fcs=16\"",
);

const ON_OFF: &[(i64, bool)] = &[(0, false), (1, true)];

fn truncate_mask(mask: &str) -> String {
    mask.chars().take(MAX_TRACE_MASK_LEN).collect()
}

pub fn decode_trace(resp: &AtResponse) -> Result<bool, DecodeError> {
    let code = decode_single(resp, "+TRACE:", |f| f.next_integer())?;
    lookup_code(code, ON_OFF)
}

/// Scans the `+XSYSTRACE` listing for the first `tr:` flag. No flag at all
/// reads as disabled.
pub fn decode_xsystrace(resp: &AtResponse) -> Result<bool, DecodeError> {
    if resp.lines.len() > MAX_XSYSTRACE_LINES {
        return Err(DecodeError::TooManyRows {
            cap: MAX_XSYSTRACE_LINES,
        });
    }
    let mut decoder = Decoder::new(resp);
    while let Some(line) = decoder.next_raw_line() {
        if line.contains("Trace flags:") {
            tracing::trace!(line, "xsystrace header");
        } else if line.contains("tr:1") {
            return Ok(true);
        } else if line.contains("tr:0") {
            return Ok(false);
        }
    }
    Ok(false)
}

/// `#PORTCFG: <requested>,<active>`; the active configuration is reported.
pub fn decode_portcfg(resp: &AtResponse) -> Result<u32, DecodeError> {
    decode_single(resp, "#PORTCFG:", |f| {
        f.skip_field()?;
        let active = f.next_integer()?;
        u32::try_from(active).map_err(|_| DecodeError::OutOfRange {
            value: active,
            max: i64::from(u32::MAX),
        })
    })
}

pub fn decode_xtraceconfig(resp: &AtResponse) -> Result<String, DecodeError> {
    decode_single(resp, "+XTRACECONFIG:", |f| {
        f.next_integer()?;
        f.next_integer()?;
        f.next_quoted_string().map(truncate_mask)
    })
}

pub fn decode_rtde(resp: &AtResponse) -> Result<String, DecodeError> {
    decode_single(resp, "#RTDE:", |f| f.next_unquoted_token().map(truncate_mask))
}

pub struct TelitTrace {
    engine: CommandEngine,
    vendor: Vendor,
}

impl TelitTrace {
    fn is_le910v2(&self) -> bool {
        self.vendor == Vendor::Le910v2
    }
}

impl TraceDriver for TelitTrace {
    fn reboot(&self) -> Option<Step<()>> {
        Some(Step::command(&self.engine, "AT#REBOOT"))
    }

    fn query_status(&self) -> Option<Step<bool>> {
        Some(if self.is_le910v2() {
            Step::transaction(&self.engine, XSYSTRACE_QUERY, XSYSTRACE_PREFIX, decode_xsystrace)
        } else {
            Step::transaction(&self.engine, "AT+TRACE?", &["+TRACE:"], decode_trace)
        })
    }

    fn set_status(&self, enabled: bool) -> Option<Step<()>> {
        let command = match (self.is_le910v2(), enabled) {
            (true, true) => XSYSTRACE_ON.to_string(),
            (true, false) => "AT+XSYSTRACE=0".to_string(),
            (false, enabled) => format!("AT+TRACE={}", u8::from(enabled)),
        };
        Some(Step::command(&self.engine, command))
    }

    fn query_port_config(&self) -> Option<Step<u32>> {
        Some(Step::transaction(&self.engine, "AT#PORTCFG?", &["#PORTCFG:"], decode_portcfg))
    }

    fn set_port_config(&self, config: u32) -> Option<Step<()>> {
        Some(Step::command(&self.engine, format!("AT#PORTCFG={config}")))
    }

    fn query_config(&self) -> Option<Step<String>> {
        Some(if self.is_le910v2() {
            Step::transaction(&self.engine, "AT#RTDE?", &["#RTDE:"], decode_rtde)
        } else {
            Step::transaction(&self.engine, "AT+XTRACECONFIG?", &["+XTRACECONFIG:"], decode_xtraceconfig)
        })
    }

    fn set_config(&self, mask: &str) -> Option<Step<()>> {
        let command = if self.is_le910v2() {
            format!("AT#RTDE={mask}")
        } else {
            format!("AT+XTRACECONFIG=0,4,{mask}")
        };
        Some(Step::command(&self.engine, command))
    }
}

pub struct Descriptor;

impl DriverDescriptor<dyn TraceDriver> for Descriptor {
    fn name(&self) -> &str {
        DRIVER_NAME
    }

    fn probe(&self, ctx: &ProbeContext) -> Result<Arc<dyn TraceDriver>> {
        ctx.atom.register();
        Ok(Arc::new(TelitTrace {
            engine: ctx.engine.clone(),
            vendor: ctx.vendor,
        }))
    }
}

// ─── Tests ──────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn xsystrace_reads_first_flag() {
        let on = AtResponse::ok(["Trace flags:", "tr:1 st:0"]);
        assert_eq!(decode_xsystrace(&on), Ok(true));
        let off = AtResponse::ok(["Trace flags:", "tr:0", "tr:1"]);
        assert_eq!(decode_xsystrace(&off), Ok(false));
        let silent = AtResponse::ok(["Trace flags:"]);
        assert_eq!(decode_xsystrace(&silent), Ok(false));
    }

    #[test]
    fn xsystrace_line_cap() {
        let lines: Vec<String> = (0..11).map(|_| "Trace flags:".to_string()).collect();
        assert_eq!(
            decode_xsystrace(&AtResponse::ok(lines)),
            Err(DecodeError::TooManyRows { cap: 10 })
        );
    }

    #[test]
    fn portcfg_reports_active_configuration() {
        assert_eq!(decode_portcfg(&AtResponse::ok(["#PORTCFG: 8,3"])), Ok(3));
    }

    #[test]
    fn queried_masks_are_truncated() {
        let long = "f".repeat(80);
        let resp = AtResponse::ok([format!("+XTRACECONFIG: 0,4,\"{long}\"")]);
        assert_eq!(decode_xtraceconfig(&resp).unwrap().len(), MAX_TRACE_MASK_LEN);
        assert_eq!(decode_rtde(&AtResponse::ok(["#RTDE: 0x0003"])), Ok("0x0003".into()));
    }

    #[test]
    fn trace_flag_rejects_other_codes() {
        assert_eq!(decode_trace(&AtResponse::ok(["+TRACE: 1"])), Ok(true));
        assert_eq!(
            decode_trace(&AtResponse::ok(["+TRACE: 2"])),
            Err(DecodeError::UnknownCode { code: 2 })
        );
    }

    #[test]
    fn xsystrace_enable_command_is_complete() {
        assert!(XSYSTRACE_ON.starts_with("AT+XSYSTRACE=0,\"bb_sw=1;"));
        assert!(XSYSTRACE_ON.ends_with("\"oct=4;oct_fcs=16\""));
    }
}
