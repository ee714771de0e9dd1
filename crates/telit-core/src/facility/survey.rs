//! # Network Survey
//!
//! Scans the neighbouring cells of one band. The modem must leave the
//! network for the scan, so the operation is a compensated chain:
//!
//! 1. deregister (`AT+COPS=2`);
//! 2. configure the survey output, then scan;
//! 3. re-enable automatic registration (`AT+COPS=0`), whatever step 2 did.
//!
//! Band names map onto a channel range; `FULL` scans without a range.

use crate::engine::CommandEngine;
use crate::error::{Error, Result};
use crate::facility::Atom;
use crate::notify::EventBus;
use crate::registry::{DriverRegistry, Vendor};
use crate::workflow::{self, Step};

pub const FACILITY: &str = "survey";

/// Most cells accepted from one scan.
pub const MAX_CELLS: usize = 100;
/// Longer cell descriptions are cut to this many characters.
pub const MAX_CELL_LEN: usize = 200;

/// `+COPS` registration modes used around a scan.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CopsMode {
    Automatic,
    Deregister,
}

impl CopsMode {
    pub fn code(self) -> u32 {
        match self {
            CopsMode::Automatic => 0,
            CopsMode::Deregister => 2,
        }
    }
}

const BANDS: &[(&str, Option<(u32, u32)>)] = &[
    ("FULL", None),
    ("P-GSM-900", Some((0, 124))),
    ("E-GSM-900", Some((975, 1023))),
    ("DCS-1800", Some((512, 885))),
    ("GSM-850", Some((128, 251))),
    ("PCS-1900", Some((512, 810))),
    ("GSM-ALL", Some((0, 1023))),
    ("UMTS-1", Some((10562, 10838))),
    ("UMTS-2", Some((9662, 9938))),
    ("UMTS-4", Some((1537, 1738))),
    ("UMTS-5", Some((4357, 4458))),
    ("UMTS-6", Some((4387, 4413))),
    ("UMTS-8", Some((2937, 3088))),
    ("UMTS-9", Some((712, 763))),
    ("UMTS-ALL", Some((0, 65535))),
    ("LTE-1", Some((0, 599))),
    ("LTE-2", Some((600, 1199))),
    ("LTE-3", Some((1200, 1949))),
    ("LTE-4", Some((1950, 2399))),
    ("LTE-5", Some((2400, 2649))),
    ("LTE-7", Some((2750, 3449))),
    ("LTE-8", Some((3450, 3799))),
    ("LTE-11", Some((4750, 4949))),
    ("LTE-12", Some((5010, 5179))),
    ("LTE-13", Some((5180, 5279))),
    ("LTE-17", Some((5730, 5849))),
    ("LTE-19", Some((6000, 6149))),
    ("LTE-20", Some((6150, 6449))),
    ("LTE-21", Some((6450, 6559))),
    ("LTE-26", Some((8690, 9039))),
    ("LTE-ALL", Some((0, 65534))),
];

/// Channel range scanned for band `name`; `Ok(None)` scans everything.
pub fn band_range(name: &str) -> Result<Option<(u32, u32)>> {
    BANDS
        .iter()
        .find(|(band, _)| *band == name)
        .map(|(_, range)| *range)
        .ok_or_else(|| Error::invalid(format!("unknown survey band {name:?}")))
}

pub fn band_names() -> impl Iterator<Item = &'static str> {
    BANDS.iter().map(|(name, _)| *name)
}

pub trait SurveyDriver: Send + Sync {
    fn set_registration(&self, _mode: CopsMode) -> Option<Step<()>> {
        None
    }

    /// Prepare the survey output format.
    fn configure(&self) -> Option<Step<()>> {
        None
    }

    fn scan(&self, _range: Option<(u32, u32)>) -> Option<Step<Vec<String>>> {
        None
    }
}

#[derive(Debug, Clone)]
pub struct Survey {
    atom: Atom<dyn SurveyDriver, ()>,
}

impl Survey {
    pub fn create(
        registry: &DriverRegistry<dyn SurveyDriver>,
        vendor: Vendor,
        driver: Option<&str>,
        engine: &CommandEngine,
        bus: EventBus,
    ) -> Result<Self> {
        Atom::create(registry, vendor, driver, engine, bus).map(|atom| Self { atom })
    }

    pub fn atom(&self) -> &Atom<dyn SurveyDriver, ()> {
        &self.atom
    }

    pub fn remove(&self) {
        self.atom.remove();
    }

    /// Scan `band` and return one raw description per cell found.
    pub fn network_survey(&self, band: &str, on_complete: impl FnOnce(Result<Vec<String>>) + Send + 'static) {
        let band = band.to_string();
        self.atom.dispatch(
            on_complete,
            move |driver| {
                let range = band_range(&band)?;
                let (Some(deregister), Some(configure), Some(scan), Some(restore)) = (
                    driver.set_registration(CopsMode::Deregister),
                    driver.configure(),
                    driver.scan(range),
                    driver.set_registration(CopsMode::Automatic),
                ) else {
                    return Ok(None);
                };
                tracing::info!(band = %band, ?range, "network survey");
                Ok(Some(workflow::compensated(
                    deregister,
                    move || configure.and_then(move |()| scan),
                    move || restore,
                )))
            },
            |_, _| None,
        );
    }
}

// ─── Tests ──────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn band_table_resolves_ranges() {
        assert_eq!(band_range("FULL").unwrap(), None);
        assert_eq!(band_range("LTE-20").unwrap(), Some((6150, 6449)));
        assert_eq!(band_range("UMTS-9").unwrap(), Some((712, 763)));
        assert_eq!(band_names().count(), 31);
    }

    #[test]
    fn unknown_band_is_invalid_argument() {
        assert!(matches!(band_range("LTE-99"), Err(Error::InvalidArgument(_))));
        assert!(matches!(band_range("lte-1"), Err(Error::InvalidArgument(_))));
    }
}
