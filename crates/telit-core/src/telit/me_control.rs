//! `+CCHO`, `+CCHC` and `+CGLA` logical channel access.

use std::sync::Arc;

use crate::decoder::decode_single;
use crate::engine::CommandEngine;
use crate::error::{DecodeError, Result};
use crate::facility::me_control::{ChannelResponse, MeControlDriver, MAX_RESPONSE_LEN};
use crate::registry::{DriverDescriptor, ProbeContext};
use crate::transport::AtResponse;
use crate::workflow::Step;

use super::DRIVER_NAME;

pub fn decode_ccho(resp: &AtResponse) -> Result<i64, DecodeError> {
    decode_single(resp, "+CCHO:", |f| f.next_integer())
}

/// `+CGLA: <length>,"<response>"`
pub fn decode_cgla(resp: &AtResponse) -> Result<ChannelResponse, DecodeError> {
    decode_single(resp, "+CGLA:", |f| {
        let length = f.next_integer()?;
        let response = f.next_quoted_string()?;
        let actual = response.chars().count() as i64;
        if actual > MAX_RESPONSE_LEN {
            return Err(DecodeError::OutOfRange {
                value: actual,
                max: MAX_RESPONSE_LEN,
            });
        }
        Ok(ChannelResponse {
            length,
            response: response.to_string(),
        })
    })
}

pub struct TelitMeControl {
    engine: CommandEngine,
}

impl MeControlDriver for TelitMeControl {
    fn open_logical_channel(&self, dfname: &str) -> Option<Step<i64>> {
        Some(Step::transaction(
            &self.engine,
            format!("AT+CCHO={dfname}"),
            &["+CCHO:"],
            decode_ccho,
        ))
    }

    fn close_logical_channel(&self, session: i64) -> Option<Step<()>> {
        Some(Step::command(&self.engine, format!("AT+CCHC={session}")))
    }

    fn logical_channel_access(&self, session: i64, length: usize, command: &str) -> Option<Step<ChannelResponse>> {
        Some(Step::transaction(
            &self.engine,
            format!("AT+CGLA={session},{length},{command}"),
            &["+CGLA:"],
            decode_cgla,
        ))
    }
}

pub struct Descriptor;

impl DriverDescriptor<dyn MeControlDriver> for Descriptor {
    fn name(&self) -> &str {
        DRIVER_NAME
    }

    fn probe(&self, ctx: &ProbeContext) -> Result<Arc<dyn MeControlDriver>> {
        ctx.atom.register();
        Ok(Arc::new(TelitMeControl {
            engine: ctx.engine.clone(),
        }))
    }
}

// ─── Tests ──────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cgla_answer() {
        let resp = AtResponse::ok(["+CGLA: 4,\"9000\""]);
        assert_eq!(
            decode_cgla(&resp),
            Ok(ChannelResponse {
                length: 4,
                response: "9000".into()
            })
        );
    }

    #[test]
    fn oversized_cgla_answer_is_rejected() {
        let body = "A".repeat(1000);
        let resp = AtResponse::ok([format!("+CGLA: 1000,\"{body}\"")]);
        assert_eq!(
            decode_cgla(&resp),
            Err(DecodeError::OutOfRange {
                value: 1000,
                max: MAX_RESPONSE_LEN
            })
        );
    }

    #[test]
    fn ccho_session_id() {
        assert_eq!(decode_ccho(&AtResponse::ok(["+CCHO: 3"])), Ok(3));
        assert!(decode_ccho(&AtResponse::ok(Vec::<String>::new())).is_err());
    }
}
