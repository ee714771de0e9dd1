//! PDP profiles, `#CEER`/`#CEERNET`, `#RFSTS` and band selection.

use std::sync::Arc;

use crate::decoder::{decode_single, decode_table, lookup_code, Fields};
use crate::engine::CommandEngine;
use crate::error::{DecodeError, Result};
use crate::facility::data_network::{
    BandMasks, DataNetworkDriver, LteRfStatus, PdpProfile, UmtsRfStatus,
};
use crate::registry::{DriverDescriptor, ProbeContext};
use crate::transport::AtResponse;
use crate::workflow::Step;

use super::DRIVER_NAME;

/// Profiles accepted from one `+CGDCONT?` answer.
pub const MAX_PROFILES: usize = 16;

/// UMTS band of a downlink UARFCN; the first matching range wins.
const UARFCN_BANDS: &[(i64, i64, u32)] = &[
    (10562, 10838, 1),
    (9662, 9938, 2),
    (1162, 1513, 3),
    (1537, 1738, 4),
    (4357, 4458, 5),
    (4387, 4413, 6),
    (2237, 2563, 7),
    (2937, 3088, 8),
    (9237, 9387, 9),
    (3112, 3388, 10),
];

pub fn umts_band(uarfcn: i64) -> u32 {
    UARFCN_BANDS
        .iter()
        .find(|(lo, hi, _)| (*lo..=*hi).contains(&uarfcn))
        .map_or(0, |(_, _, band)| *band)
}

pub fn decode_profiles(resp: &AtResponse) -> Result<Vec<PdpProfile>, DecodeError> {
    decode_table(resp, "+CGDCONT:", MAX_PROFILES, |_, f| {
        let cid = f.next_integer()?;
        let cid = u32::try_from(cid).map_err(|_| DecodeError::OutOfRange {
            value: cid,
            max: i64::from(u32::MAX),
        })?;
        Ok(PdpProfile {
            cid,
            pdp_type: f.next_quoted_string()?.to_string(),
            apn: f.next_quoted_string()?.to_string(),
        })
    })
}

/// Access technology, the fourth `+COPS` field.
pub fn decode_cops_tech(resp: &AtResponse) -> Result<i64, DecodeError> {
    decode_single(resp, "+COPS:", |f| {
        f.skip_fields(3)?;
        f.next_integer()
    })
}

fn unsigned(value: i64) -> Result<u32, DecodeError> {
    u32::try_from(value).map_err(|_| DecodeError::OutOfRange {
        value,
        max: i64::from(u32::MAX),
    })
}

fn next_truncated(f: &mut Fields<'_>) -> Result<i32, DecodeError> {
    f.next_float().map(|v| v as i32)
}

/// `#RFSTS: <PLMN>,<UARFCN>,<PSC>,<Ec/Io>,<RSCP>,<RSSI>,...`
pub fn decode_rfsts_umts(resp: &AtResponse) -> Result<UmtsRfStatus, DecodeError> {
    decode_single(resp, "#RFSTS:", |f| {
        f.skip_field()?;
        let uarfcn = f.next_integer()?;
        f.skip_field()?;
        let ecio = f.next_float()?;
        let rscp = next_truncated(f)?;
        let rssi = next_truncated(f)?;
        Ok(UmtsRfStatus {
            uarfcn,
            ecio,
            rscp,
            rssi,
            band: umts_band(uarfcn),
        })
    })
}

/// `#RFSTS: <PLMN>,<EARFCN>,<RSRP>,<RSSI>,<RSRQ>,<TAC>,<RAC>,<TXPWR>,<DRX>,
/// <MM>,<RRC>,<CID>,<IMSI>,<NetNameAsc>,<SD>,<ABND>`
pub fn decode_rfsts_lte(resp: &AtResponse) -> Result<LteRfStatus, DecodeError> {
    decode_single(resp, "#RFSTS:", |f| {
        f.skip_field()?;
        let earfcn = f.next_integer()?;
        let rsrp = next_truncated(f)?;
        let rssi = next_truncated(f)?;
        let rsrq = f.next_float()?;
        f.skip_fields(10)?;
        let band = unsigned(f.next_integer()?)?;
        Ok(LteRfStatus {
            earfcn,
            rsrp,
            rssi,
            rsrq,
            band,
        })
    })
}

pub fn decode_bnd(resp: &AtResponse) -> Result<BandMasks, DecodeError> {
    decode_single(resp, "#BND:", |f| {
        f.skip_field()?;
        let umts = unsigned(f.next_integer()?)?;
        let lte = unsigned(f.next_integer()?)?;
        Ok(BandMasks { umts, lte })
    })
}

const ENS: &[(i64, bool)] = &[(0, false), (1, true)];
const AUTOBND: &[(i64, bool)] = &[(0, false), (2, true)];

pub struct TelitDataNetwork {
    engine: CommandEngine,
}

impl TelitDataNetwork {
    fn read_int(&self, command: &'static str, prefix: &'static [&'static str]) -> Step<i64> {
        Step::transaction(&self.engine, command, prefix, move |r| {
            decode_single(r, prefix[0], |f| f.next_integer())
        })
    }

    fn read_flag(
        &self,
        command: &'static str,
        prefix: &'static [&'static str],
        table: &'static [(i64, bool)],
    ) -> Step<bool> {
        Step::transaction(&self.engine, command, prefix, move |r| {
            let code = decode_single(r, prefix[0], |f| f.next_integer())?;
            lookup_code(code, table)
        })
    }
}

impl DataNetworkDriver for TelitDataNetwork {
    fn set_profile(&self, cid: u32, pdp_type: &str, apn: &str) -> Option<Step<()>> {
        Some(Step::command(
            &self.engine,
            format!("AT+CGDCONT={cid},\"{pdp_type}\",\"{apn}\""),
        ))
    }

    fn delete_profile(&self, cid: u32) -> Option<Step<()>> {
        Some(Step::command(&self.engine, format!("AT+CGDCONT={cid}")))
    }

    fn query_profiles(&self) -> Option<Step<Vec<PdpProfile>>> {
        Some(Step::transaction(&self.engine, "AT+CGDCONT?", &["+CGDCONT:"], decode_profiles))
    }

    fn query_ceer(&self) -> Option<Step<i64>> {
        Some(self.read_int("AT#CEER", &["#CEER:"]))
    }

    fn query_ceernet(&self) -> Option<Step<i64>> {
        Some(self.read_int("AT#CEERNET", &["#CEERNET:"]))
    }

    fn query_tech(&self) -> Option<Step<i64>> {
        Some(Step::transaction(&self.engine, "AT+COPS?", &["+COPS:"], decode_cops_tech))
    }

    fn query_rf_status_umts(&self) -> Option<Step<UmtsRfStatus>> {
        Some(Step::transaction(&self.engine, "AT#RFSTS", &["#RFSTS:"], decode_rfsts_umts))
    }

    fn query_rf_status_lte(&self) -> Option<Step<LteRfStatus>> {
        Some(Step::transaction(&self.engine, "AT#RFSTS", &["#RFSTS:"], decode_rfsts_lte))
    }

    fn query_ens(&self) -> Option<Step<bool>> {
        Some(self.read_flag("AT#ENS?", &["#ENS:"], ENS))
    }

    fn set_ens(&self, enabled: bool) -> Option<Step<()>> {
        Some(Step::command(&self.engine, format!("AT#ENS={}", u8::from(enabled))))
    }

    fn query_autobnd(&self) -> Option<Step<bool>> {
        Some(self.read_flag("AT#AUTOBND?", &["#AUTOBND:"], AUTOBND))
    }

    fn set_autobnd(&self, enabled: bool) -> Option<Step<()>> {
        let value = if enabled { 2 } else { 0 };
        Some(Step::command(&self.engine, format!("AT#AUTOBND={value}")))
    }

    fn query_bnd(&self) -> Option<Step<BandMasks>> {
        Some(Step::transaction(&self.engine, "AT#BND?", &["#BND:"], decode_bnd))
    }

    fn set_bnd(&self, bands: BandMasks) -> Option<Step<()>> {
        Some(Step::command(
            &self.engine,
            format!("AT#BND=0,{},{}", bands.umts, bands.lte),
        ))
    }
}

pub struct Descriptor;

impl DriverDescriptor<dyn DataNetworkDriver> for Descriptor {
    fn name(&self) -> &str {
        DRIVER_NAME
    }

    fn probe(&self, ctx: &ProbeContext) -> Result<Arc<dyn DataNetworkDriver>> {
        ctx.atom.register();
        Ok(Arc::new(TelitDataNetwork {
            engine: ctx.engine.clone(),
        }))
    }
}

// ─── Tests ──────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    const LTE_RFSTS: &str = "#RFSTS: \"262 01\",1300,-97,-68,-11.5,A1B2,FF,0,1280,19,2,0123ABC,\"262011234567890\",\"Operator\",3,3";
    const UMTS_RFSTS: &str = "#RFSTS: \"262 01\",10700,123,-7.5,-85.9,-70,A1B2,00,-60,64,19,0,0,0.0,1F2E3D,\"262011234567890\",\"Operator\",3,1";

    #[test]
    fn lte_rf_status_reads_band_after_ten_skipped_fields() {
        let status = decode_rfsts_lte(&AtResponse::ok([LTE_RFSTS])).unwrap();
        assert_eq!(status.earfcn, 1300);
        assert_eq!(status.rsrp, -97);
        assert_eq!(status.rssi, -68);
        assert_eq!(status.rsrq, -11.5);
        assert_eq!(status.band, 3);
    }

    #[test]
    fn negative_lte_band_is_out_of_range() {
        let line = format!("{},-3", LTE_RFSTS.strip_suffix(",3").unwrap());
        assert_eq!(
            decode_rfsts_lte(&AtResponse::ok([line])),
            Err(DecodeError::OutOfRange {
                value: -3,
                max: i64::from(u32::MAX),
            })
        );
    }

    #[test]
    fn umts_rf_status_derives_band_from_uarfcn() {
        let status = decode_rfsts_umts(&AtResponse::ok([UMTS_RFSTS])).unwrap();
        assert_eq!(status.uarfcn, 10700);
        assert_eq!(status.ecio, -7.5);
        assert_eq!(status.rscp, -85, "fractional RSCP is truncated");
        assert_eq!(status.rssi, -70);
        assert_eq!(status.band, 1);
    }

    #[test]
    fn uarfcn_table_prefers_first_match_and_defaults_to_zero() {
        assert_eq!(umts_band(4400), 5, "band 5 range is listed before band 6");
        assert_eq!(umts_band(3000), 8);
        assert_eq!(umts_band(50), 0);
    }

    #[test]
    fn cops_tech_is_the_fourth_field() {
        let resp = AtResponse::ok(["+COPS: 0,0,\"Operator\",7"]);
        assert_eq!(decode_cops_tech(&resp), Ok(7));
        let unregistered = AtResponse::ok(["+COPS: 0"]);
        assert_eq!(
            decode_cops_tech(&unregistered),
            Err(DecodeError::FieldMissing { index: 1 })
        );
    }

    #[test]
    fn profiles_decode_in_order_with_a_cap() {
        let resp = AtResponse::ok([
            "+CGDCONT: 1,\"IP\",\"internet\",\"0.0.0.0\",0,0",
            "+CGDCONT: 2,\"IPV4V6\",\"ims\"",
        ]);
        let profiles = decode_profiles(&resp).unwrap();
        assert_eq!(profiles.len(), 2);
        assert_eq!(profiles[1].pdp_type, "IPV4V6");
        assert_eq!(profiles[0].apn, "internet");

        let too_many: Vec<String> = (1..=17).map(|i| format!("+CGDCONT: {i},\"IP\",\"a\"")).collect();
        assert_eq!(
            decode_profiles(&AtResponse::ok(too_many)),
            Err(DecodeError::TooManyRows { cap: MAX_PROFILES })
        );
    }

    #[test]
    fn bnd_skips_gsm_mask() {
        let bands = decode_bnd(&AtResponse::ok(["#BND: 0,15,524420"])).unwrap();
        assert_eq!(bands, BandMasks { umts: 15, lte: 524420 });
    }
}
