//! # Simulated Modem
//!
//! In-memory [`AtChannel`] driven by a script of canned responses. Used by
//! the unit and integration tests and by `telit-agent --simulate`.
//!
//! Completions run inline on the caller's thread unless deferred mode is on,
//! in which case they queue until [`SimulatedModem::flush`].

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;

use crate::transport::{AtChannel, AtResponse, Completion, UnsolicitedHandler};

/// Reply used for commands the script does not mention.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Unscripted {
    Ok,
    Error,
}

struct Registration {
    id: u32,
    prefix: String,
    handler: UnsolicitedHandler,
}

struct SimState {
    sticky: HashMap<String, AtResponse>,
    once: HashMap<String, VecDeque<AtResponse>>,
    unscripted: Unscripted,
    accepting: bool,
    deferred: bool,
    queued: VecDeque<(Completion, AtResponse)>,
    sent: Vec<String>,
    handlers: Vec<Registration>,
    next_id: u32,
}

pub struct SimulatedModem {
    state: Mutex<SimState>,
}

impl Default for SimulatedModem {
    fn default() -> Self {
        Self::new()
    }
}

impl SimulatedModem {
    /// Empty script; unscripted commands fail with `ERROR`.
    pub fn new() -> Self {
        Self {
            state: Mutex::new(SimState {
                sticky: HashMap::new(),
                once: HashMap::new(),
                unscripted: Unscripted::Error,
                accepting: true,
                deferred: false,
                queued: VecDeque::new(),
                sent: Vec::new(),
                handlers: Vec::new(),
                next_id: 1,
            }),
        }
    }

    /// A healthy LE910-class modem on LTE: every query the drivers issue has
    /// a plausible answer and unscripted setters succeed.
    pub fn telit() -> Self {
        let sim = Self::new();
        sim.set_unscripted(Unscripted::Ok);
        for (command, lines) in TELIT_SCRIPT {
            sim.respond(command, AtResponse::ok(lines.iter().copied()));
        }
        sim
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, SimState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Answer `command` with `response` every time.
    pub fn respond(&self, command: &str, response: AtResponse) {
        self.lock().sticky.insert(command.to_string(), response);
    }

    /// Answer the next `command` with `response`, ahead of any sticky reply.
    pub fn respond_once(&self, command: &str, response: AtResponse) {
        self.lock()
            .once
            .entry(command.to_string())
            .or_default()
            .push_back(response);
    }

    pub fn set_unscripted(&self, policy: Unscripted) {
        self.lock().unscripted = policy;
    }

    /// When `false`, [`AtChannel::send`] refuses every command.
    pub fn set_accepting(&self, accepting: bool) {
        self.lock().accepting = accepting;
    }

    /// When `true`, completions wait for [`flush`](Self::flush).
    pub fn set_deferred(&self, deferred: bool) {
        self.lock().deferred = deferred;
    }

    /// Commands accepted so far, in order.
    pub fn sent(&self) -> Vec<String> {
        self.lock().sent.clone()
    }

    pub fn clear_sent(&self) {
        self.lock().sent.clear();
    }

    pub fn pending(&self) -> usize {
        self.lock().queued.len()
    }

    /// Deliver the completions queued so far. Returns how many ran.
    pub fn flush(&self) -> usize {
        let batch: Vec<_> = self.lock().queued.drain(..).collect();
        let count = batch.len();
        for (complete, response) in batch {
            complete(response);
        }
        count
    }

    /// Flush until no completion is left, including ones queued by the
    /// completions themselves.
    pub fn run_until_idle(&self) -> usize {
        let mut total = 0;
        loop {
            let ran = self.flush();
            if ran == 0 {
                return total;
            }
            total += ran;
        }
    }

    /// Inject an out-of-band line, as if the modem pushed it.
    pub fn push_unsolicited(&self, line: &str) -> usize {
        let mut handlers = std::mem::take(&mut self.lock().handlers);
        let response = AtResponse::unsolicited(line);
        let mut delivered = 0;
        for reg in handlers.iter_mut() {
            if line.starts_with(&reg.prefix) {
                (reg.handler)(&response);
                delivered += 1;
            }
        }
        let mut state = self.lock();
        handlers.append(&mut state.handlers);
        state.handlers = handlers;
        delivered
    }

    pub fn unsolicited_prefixes(&self) -> Vec<String> {
        self.lock().handlers.iter().map(|r| r.prefix.clone()).collect()
    }

    fn reply_for(state: &mut SimState, command: &str) -> AtResponse {
        if let Some(resp) = state.once.get_mut(command).and_then(VecDeque::pop_front) {
            return resp;
        }
        if let Some(resp) = state.sticky.get(command) {
            return resp.clone();
        }
        match state.unscripted {
            Unscripted::Ok => AtResponse::ok(Vec::<String>::new()),
            Unscripted::Error => AtResponse::error("ERROR"),
        }
    }
}

impl AtChannel for SimulatedModem {
    fn send(&self, command: &str, prefixes: &[&str], on_complete: Completion) -> bool {
        let mut state = self.lock();
        if !state.accepting {
            return false;
        }
        state.sent.push(command.to_string());
        let response = Self::reply_for(&mut state, command).filtered(prefixes);
        if state.deferred {
            state.queued.push_back((on_complete, response));
            return true;
        }
        drop(state);
        on_complete(response);
        true
    }

    fn register_unsolicited(&self, prefix: &str, handler: UnsolicitedHandler) -> Option<u32> {
        let mut state = self.lock();
        if !state.accepting {
            return None;
        }
        let id = state.next_id;
        state.next_id += 1;
        state.handlers.push(Registration {
            id,
            prefix: prefix.to_string(),
            handler,
        });
        Some(id)
    }

    fn unregister_all(&self) {
        let dropped = std::mem::take(&mut self.lock().handlers);
        tracing::debug!(count = dropped.len(), ids = ?dropped.iter().map(|r| r.id).collect::<Vec<_>>(), "sim: unsolicited handlers dropped");
    }

    fn cancel_all(&self) {
        let dropped: Vec<_> = self.lock().queued.drain(..).collect();
        tracing::debug!(count = dropped.len(), "sim: queued commands cancelled");
    }
}

const TELIT_SCRIPT: &[(&str, &[&str])] = &[
    ("AT+WS46?", &["+WS46: 25"]),
    ("AT+CFUN?", &["+CFUN: 1"]),
    ("AT#SIMDET?", &["#SIMDET: 2"]),
    ("AT#GPIO?", &["#GPIO: 1,0", "#GPIO: 2,1"]),
    ("AT+CGDCONT?", &["+CGDCONT: 1,\"IP\",\"internet\""]),
    ("AT#CEER", &["#CEER: 0"]),
    ("AT#CEERNET", &["#CEERNET: 0"]),
    ("AT+COPS?", &["+COPS: 0,0,\"Operator\",7"]),
    (
        "AT#RFSTS",
        &["#RFSTS: \"262 01\",1300,-97,-68,-11.5,A1B2,FF,0,1280,19,2,0123ABC,\"262011234567890\",\"Operator\",3,3"],
    ),
    ("AT#ENS?", &["#ENS: 0"]),
    ("AT#AUTOBND?", &["#AUTOBND: 2"]),
    ("AT#BND?", &["#BND: 0,15,524420"]),
    ("AT+CREG?", &["+CREG: 2,1"]),
    ("AT+CGREG?", &["+CGREG: 2,1"]),
    ("AT+CGEREP?", &["+CGEREP: 1,0"]),
    ("AT#PSNT?", &["#PSNT: 1,4"]),
    ("AT+CMER?", &["+CMER: 3,0,0,2,0"]),
    ("AT#QSS?", &["#QSS: 2,1"]),
    ("AT#FWSWITCH?", &["#FWSWITCH: 1"]),
    ("AT+TRACE?", &["+TRACE: 0"]),
    ("AT+XTRACECONFIG?", &["+XTRACECONFIG: 0,4,\"bb_sw=1\""]),
    ("AT+XSYSTRACE=1,,\"bb_sw=#\"", &["Trace flags:", "tr:0"]),
    ("AT#RTDE?", &["#RTDE: 0x0000"]),
    ("AT#PORTCFG?", &["#PORTCFG: 8,8"]),
    (
        "AT#CSURV",
        &[
            "Network survey started ...",
            "earfcn: 1300 rxLev: -68 mcc: 262 mnc: 01 cellId: 1a2b tac: a1b2",
            "earfcn: 6300 rxLev: -91 mcc: 262 mnc: 02 cellId: 2c3d tac: 0041",
            "Network survey ended",
        ],
    ),
];

// ─── Tests ──────────────────────────────────────────────────────────────────
