//! ME control: logical channels to SIM applications (`+CCHO`, `+CCHC`,
//! `+CGLA`).

use crate::engine::CommandEngine;
use crate::error::Result;
use crate::facility::{check_len, Atom};
use crate::notify::EventBus;
use crate::registry::{DriverRegistry, Vendor};
use crate::workflow::Step;

pub const FACILITY: &str = "me-control";

pub const MAX_DFNAME_LEN: usize = 32;
/// Longest `+CGLA` answer accepted, in characters. Drivers reject longer
/// answers with `DecodeError::OutOfRange`.
pub const MAX_RESPONSE_LEN: i64 = 999;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelResponse {
    pub length: i64,
    pub response: String,
}

pub trait MeControlDriver: Send + Sync {
    fn open_logical_channel(&self, _dfname: &str) -> Option<Step<i64>> {
        None
    }

    fn close_logical_channel(&self, _session: i64) -> Option<Step<()>> {
        None
    }

    fn logical_channel_access(&self, _session: i64, _length: usize, _command: &str) -> Option<Step<ChannelResponse>> {
        None
    }
}

#[derive(Debug, Clone)]
pub struct MeControl {
    atom: Atom<dyn MeControlDriver, ()>,
}

impl MeControl {
    pub fn create(
        registry: &DriverRegistry<dyn MeControlDriver>,
        vendor: Vendor,
        driver: Option<&str>,
        engine: &CommandEngine,
        bus: EventBus,
    ) -> Result<Self> {
        Atom::create(registry, vendor, driver, engine, bus).map(|atom| Self { atom })
    }

    pub fn atom(&self) -> &Atom<dyn MeControlDriver, ()> {
        &self.atom
    }

    pub fn remove(&self) {
        self.atom.remove();
    }

    /// Returns the session id the modem assigned.
    pub fn open_logical_channel(&self, dfname: &str, on_complete: impl FnOnce(Result<i64>) + Send + 'static) {
        let dfname = dfname.to_string();
        self.atom.dispatch(
            on_complete,
            move |driver| {
                check_len("DF name", &dfname, MAX_DFNAME_LEN)?;
                Ok(driver.open_logical_channel(&dfname))
            },
            |_, _| None,
        );
    }

    pub fn close_logical_channel(&self, session: i64, on_complete: impl FnOnce(Result<()>) + Send + 'static) {
        self.atom.dispatch(
            on_complete,
            move |driver| Ok(driver.close_logical_channel(session)),
            |_, ()| None,
        );
    }

    /// Send an APDU on `session`. `length` is the character count of
    /// `command` as the modem expects it.
    pub fn logical_channel_access(
        &self,
        session: i64,
        length: usize,
        command: &str,
        on_complete: impl FnOnce(Result<ChannelResponse>) + Send + 'static,
    ) {
        let command = command.to_string();
        self.atom.dispatch(
            on_complete,
            move |driver| Ok(driver.logical_channel_access(session, length, &command)),
            |_, _| None,
        );
    }
}
