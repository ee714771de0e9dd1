//! # Data Network
//!
//! PDP context profiles, extended error reports, RF status and the band
//! selection properties (`EnhancedNetworkSelection`,
//! `AutomaticBandSelection`, `LTEBandSelection`).
//!
//! Multi-step operations are composed here from the driver's single
//! transactions:
//!
//! - RF status: access technology first, then the LTE or UMTS `#RFSTS`
//!   decode depending on the answer.
//! - LTE band selection: the current UMTS mask is read back so that only
//!   the LTE mask changes.
//! - `get_properties`: ENS, then automatic band selection, then bands.

use std::sync::Arc;

use crate::engine::CommandEngine;
use crate::error::{Error, Result};
use crate::facility::{check_len, Atom};
use crate::notify::{EventBus, Properties, PropertyValue};
use crate::registry::{DriverRegistry, Vendor};
use crate::workflow::Step;

pub const FACILITY: &str = "data-network";

pub const MAX_CID_LEN: usize = 4;
pub const MAX_PDP_TYPE_LEN: usize = 8;
pub const MAX_APN_LEN: usize = 40;

/// `+COPS` access technology codes served by `#RFSTS`.
pub const TECH_UTRAN: i64 = 2;
pub const TECH_UTRAN_HSDPA: i64 = 4;
pub const TECH_UTRAN_HSUPA: i64 = 5;
pub const TECH_UTRAN_HSDPA_HSUPA: i64 = 6;
pub const TECH_E_UTRAN: i64 = 7;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PdpProfile {
    pub cid: u32,
    pub pdp_type: String,
    pub apn: String,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct UmtsRfStatus {
    pub uarfcn: i64,
    pub ecio: f32,
    pub rscp: i32,
    pub rssi: i32,
    /// 0 when the channel is outside every known band.
    pub band: u32,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LteRfStatus {
    pub earfcn: i64,
    pub rsrp: i32,
    pub rssi: i32,
    pub rsrq: f32,
    pub band: u32,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum RfStatus {
    Umts(UmtsRfStatus),
    Lte(LteRfStatus),
}

impl RfStatus {
    pub fn properties(&self) -> Properties {
        match self {
            RfStatus::Lte(s) => vec![
                ("Tech", "4G".into()),
                ("EARFCN", s.earfcn.into()),
                ("RSRP", i64::from(s.rsrp).into()),
                ("RSSI", i64::from(s.rssi).into()),
                ("RSRQ", s.rsrq.into()),
                ("band", s.band.into()),
            ],
            RfStatus::Umts(s) => vec![
                ("Tech", "3G".into()),
                ("UARFCN", s.uarfcn.into()),
                ("RSCP", i64::from(s.rscp).into()),
                ("RSSI", i64::from(s.rssi).into()),
                ("EcIo", s.ecio.into()),
                ("band", s.band.into()),
            ],
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BandMasks {
    pub umts: u32,
    pub lte: u32,
}

/// Operations a data-network driver may provide. Each is one transaction.
pub trait DataNetworkDriver: Send + Sync {
    fn set_profile(&self, _cid: u32, _pdp_type: &str, _apn: &str) -> Option<Step<()>> {
        None
    }

    fn delete_profile(&self, _cid: u32) -> Option<Step<()>> {
        None
    }

    fn query_profiles(&self) -> Option<Step<Vec<PdpProfile>>> {
        None
    }

    fn query_ceer(&self) -> Option<Step<i64>> {
        None
    }

    fn query_ceernet(&self) -> Option<Step<i64>> {
        None
    }

    /// Access technology code of the `+COPS` answer.
    fn query_tech(&self) -> Option<Step<i64>> {
        None
    }

    fn query_rf_status_umts(&self) -> Option<Step<UmtsRfStatus>> {
        None
    }

    fn query_rf_status_lte(&self) -> Option<Step<LteRfStatus>> {
        None
    }

    fn query_ens(&self) -> Option<Step<bool>> {
        None
    }

    fn set_ens(&self, _enabled: bool) -> Option<Step<()>> {
        None
    }

    fn query_autobnd(&self) -> Option<Step<bool>> {
        None
    }

    fn set_autobnd(&self, _enabled: bool) -> Option<Step<()>> {
        None
    }

    fn query_bnd(&self) -> Option<Step<BandMasks>> {
        None
    }

    fn set_bnd(&self, _bands: BandMasks) -> Option<Step<()>> {
        None
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DataNetworkState {
    pub ens: bool,
    pub autobnd: bool,
    pub bands: BandMasks,
}

impl DataNetworkState {
    pub fn properties(&self) -> Properties {
        vec![
            ("EnhancedNetworkSelection", self.ens.into()),
            ("AutomaticBandSelection", self.autobnd.into()),
            ("LTEBandSelection", self.bands.lte.into()),
        ]
    }
}

#[derive(Debug, Clone)]
pub struct DataNetwork {
    atom: Atom<dyn DataNetworkDriver, DataNetworkState>,
}

impl DataNetwork {
    pub fn create(
        registry: &DriverRegistry<dyn DataNetworkDriver>,
        vendor: Vendor,
        driver: Option<&str>,
        engine: &CommandEngine,
        bus: EventBus,
    ) -> Result<Self> {
        Atom::create(registry, vendor, driver, engine, bus).map(|atom| Self { atom })
    }

    pub fn atom(&self) -> &Atom<dyn DataNetworkDriver, DataNetworkState> {
        &self.atom
    }

    pub fn remove(&self) {
        self.atom.remove();
    }

    /// Define PDP context `cid`. `cid` is a decimal string of at most
    /// four digits.
    pub fn set_profile(
        &self,
        cid: &str,
        pdp_type: &str,
        apn: &str,
        on_complete: impl FnOnce(Result<()>) + Send + 'static,
    ) {
        let (pdp_type, apn) = (pdp_type.to_string(), apn.to_string());
        let cid = cid.to_string();
        self.atom.dispatch(
            on_complete,
            move |driver| {
                let cid = parse_cid(&cid)?;
                check_len("PDP type", &pdp_type, MAX_PDP_TYPE_LEN)?;
                check_len("APN", &apn, MAX_APN_LEN)?;
                check_unquoted("PDP type", &pdp_type)?;
                check_unquoted("APN", &apn)?;
                Ok(driver.set_profile(cid, &pdp_type, &apn))
            },
            |_, ()| None,
        );
    }

    pub fn delete_profile(&self, cid: &str, on_complete: impl FnOnce(Result<()>) + Send + 'static) {
        let cid = cid.to_string();
        self.atom.dispatch(
            on_complete,
            move |driver| {
                let cid = parse_cid(&cid)?;
                Ok(driver.delete_profile(cid))
            },
            |_, ()| None,
        );
    }

    pub fn get_profiles(&self, on_complete: impl FnOnce(Result<Vec<PdpProfile>>) + Send + 'static) {
        self.atom
            .dispatch(on_complete, |driver| Ok(driver.query_profiles()), |_, _| None);
    }

    pub fn get_error_report(&self, on_complete: impl FnOnce(Result<i64>) + Send + 'static) {
        self.atom
            .dispatch(on_complete, |driver| Ok(driver.query_ceer()), |_, _| None);
    }

    pub fn get_network_error_report(&self, on_complete: impl FnOnce(Result<i64>) + Send + 'static) {
        self.atom
            .dispatch(on_complete, |driver| Ok(driver.query_ceernet()), |_, _| None);
    }

    pub fn get_rf_status(&self, on_complete: impl FnOnce(Result<RfStatus>) + Send + 'static) {
        self.atom.dispatch(
            on_complete,
            |driver| {
                let (Some(tech), Some(umts), Some(lte)) = (
                    driver.query_tech(),
                    driver.query_rf_status_umts(),
                    driver.query_rf_status_lte(),
                ) else {
                    return Ok(None);
                };
                Ok(Some(tech.and_then(move |tech| match tech {
                    TECH_E_UTRAN => {
                        tracing::debug!(tech, "serving cell on LTE");
                        lte.map(RfStatus::Lte)
                    }
                    TECH_UTRAN | TECH_UTRAN_HSDPA | TECH_UTRAN_HSUPA | TECH_UTRAN_HSDPA_HSUPA => {
                        tracing::debug!(tech, "serving cell on UMTS");
                        umts.map(RfStatus::Umts)
                    }
                    other => Step::fail(Error::UnsupportedTechnology(other)),
                })))
            },
            |_, _| None,
        );
    }

    pub fn get_properties(&self, on_complete: impl FnOnce(Result<Properties>) + Send + 'static) {
        self.atom.dispatch(
            move |result: Result<DataNetworkState>| on_complete(result.map(|s| s.properties())),
            |driver| {
                let (Some(ens), Some(autobnd), Some(bnd)) =
                    (driver.query_ens(), driver.query_autobnd(), driver.query_bnd())
                else {
                    return Ok(None);
                };
                Ok(Some(ens.and_then(move |ens| {
                    autobnd.and_then(move |autobnd| {
                        bnd.map(move |bands| DataNetworkState { ens, autobnd, bands })
                    })
                })))
            },
            |state, fresh| {
                *state = fresh.clone();
                None
            },
        );
    }

    pub fn set_enhanced_network_selection(
        &self,
        enabled: bool,
        on_complete: impl FnOnce(Result<()>) + Send + 'static,
    ) {
        self.atom.dispatch(
            on_complete,
            move |driver| Ok(driver.set_ens(enabled)),
            move |state, ()| {
                state.ens = enabled;
                Some(("EnhancedNetworkSelection", enabled.into()))
            },
        );
    }

    pub fn set_automatic_band_selection(
        &self,
        enabled: bool,
        on_complete: impl FnOnce(Result<()>) + Send + 'static,
    ) {
        self.atom.dispatch(
            on_complete,
            move |driver| Ok(driver.set_autobnd(enabled)),
            move |state, ()| {
                state.autobnd = enabled;
                Some(("AutomaticBandSelection", enabled.into()))
            },
        );
    }

    /// Change the LTE band mask, keeping the modem's current UMTS mask.
    pub fn set_lte_band_selection(&self, lte: u32, on_complete: impl FnOnce(Result<()>) + Send + 'static) {
        self.atom.dispatch(
            move |result: Result<BandMasks>| on_complete(result.map(|_| ())),
            move |driver| {
                let Some(query) = driver.query_bnd() else {
                    return Ok(None);
                };
                if driver.set_bnd(BandMasks::default()).is_none() {
                    return Ok(None);
                }
                let driver = Arc::clone(driver);
                Ok(Some(query.and_then(move |current| {
                    let bands = BandMasks {
                        umts: current.umts,
                        lte,
                    };
                    match driver.set_bnd(bands) {
                        Some(step) => step.map(move |()| bands),
                        None => Step::fail(Error::NotImplemented),
                    }
                })))
            },
            |state, bands| {
                state.bands = *bands;
                Some(("LTEBandSelection", bands.lte.into()))
            },
        );
    }

    /// Generic property setter by name.
    pub fn set_property(
        &self,
        name: &str,
        value: PropertyValue,
        on_complete: impl FnOnce(Result<()>) + Send + 'static,
    ) {
        match (name, value) {
            ("EnhancedNetworkSelection", PropertyValue::Bool(v)) => {
                self.set_enhanced_network_selection(v, on_complete)
            }
            ("AutomaticBandSelection", PropertyValue::Bool(v)) => {
                self.set_automatic_band_selection(v, on_complete)
            }
            ("LTEBandSelection", PropertyValue::Uint(v)) => self.set_lte_band_selection(v, on_complete),
            (name, value) => {
                let err = Error::invalid(format!("cannot set {name} to {value}"));
                self.atom.dispatch(on_complete, move |_| Err(err), |_, ()| None);
            }
        }
    }
}

fn parse_cid(cid: &str) -> Result<u32> {
    check_len("cid", cid, MAX_CID_LEN)?;
    cid.parse()
        .map_err(|_| Error::invalid(format!("cid {cid:?} is not a number")))
}

fn check_unquoted(what: &str, value: &str) -> Result<()> {
    if value.contains('"') {
        return Err(Error::invalid(format!("{what} must not contain quotes")));
    }
    Ok(())
}

// ─── Tests ──────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cid_must_be_short_and_numeric() {
        assert_eq!(parse_cid("3"), Ok(3));
        assert!(matches!(parse_cid("12345"), Err(Error::InvalidArgument(_))));
        assert!(matches!(parse_cid("ab"), Err(Error::InvalidArgument(_))));
        assert!(matches!(parse_cid(""), Err(Error::InvalidArgument(_))));
    }

    #[test]
    fn rf_status_properties_name_the_technology() {
        let lte = RfStatus::Lte(LteRfStatus {
            earfcn: 1300,
            rsrp: -97,
            rssi: -68,
            rsrq: -11.5,
            band: 3,
        });
        let props = lte.properties();
        assert_eq!(props[0], ("Tech", PropertyValue::Str("4G".into())));
        assert_eq!(props.len(), 6);
        assert!(props.contains(&("RSRQ", PropertyValue::Float(-11.5))));
    }

    #[test]
    fn state_properties_report_only_the_lte_mask() {
        let state = DataNetworkState {
            ens: true,
            autobnd: false,
            bands: BandMasks { umts: 15, lte: 524420 },
        };
        assert_eq!(
            state.properties(),
            vec![
                ("EnhancedNetworkSelection", PropertyValue::Bool(true)),
                ("AutomaticBandSelection", PropertyValue::Bool(false)),
                ("LTEBandSelection", PropertyValue::Uint(524420)),
            ]
        );
    }
}
