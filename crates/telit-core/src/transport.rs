//! # Transport Boundary
//!
//! The serial framing layer is an external collaborator. It is consumed
//! through [`AtChannel`], which offers "send a command, later receive the
//! final status plus any intermediate lines" semantics, and a prefix-keyed
//! registration for unsolicited result codes.
//!
//! Implementations decide on which execution context completions run. The
//! agent's tty transport posts them onto the core runtime thread; the
//! in-memory simulator runs them inline.

use std::fmt;

/// Raw result of one AT transaction.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AtResponse {
    /// `true` when the final status was `OK`.
    pub ok: bool,
    /// Final result line, e.g. `OK`, `ERROR` or `+CME ERROR: 10`.
    pub final_status: String,
    /// Intermediate lines accepted by the transaction's prefix filter.
    pub lines: Vec<String>,
}

impl AtResponse {
    pub fn ok<I, S>(lines: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            ok: true,
            final_status: "OK".into(),
            lines: lines.into_iter().map(Into::into).collect(),
        }
    }

    pub fn error(status: impl Into<String>) -> Self {
        Self {
            ok: false,
            final_status: status.into(),
            lines: Vec::new(),
        }
    }

    /// Wrap a single unsolicited line so it can be decoded like a reply.
    pub fn unsolicited(line: impl Into<String>) -> Self {
        Self {
            ok: true,
            final_status: String::new(),
            lines: vec![line.into()],
        }
    }

    /// Keep only the lines that start with one of `prefixes`.
    ///
    /// An empty prefix set means no intermediate lines are expected, so
    /// every line is dropped.
    pub fn filtered(mut self, prefixes: &[&str]) -> Self {
        self.lines
            .retain(|line| prefixes.iter().any(|p| line.starts_with(p)));
        self
    }
}

impl fmt::Display for AtResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for line in &self.lines {
            writeln!(f, "{line}")?;
        }
        write!(f, "{}", self.final_status)
    }
}

/// Completion invoked once the transport has the final status.
pub type Completion = Box<dyn FnOnce(AtResponse) + Send>;

/// Handler for out-of-band lines. Receives the line wrapped as a response.
pub type UnsolicitedHandler = Box<dyn FnMut(&AtResponse) + Send>;

/// Framing-layer contract.
pub trait AtChannel: Send + Sync {
    /// Queue `command`. Returns `false` when the command could not be queued,
    /// in which case `on_complete` is dropped without being called.
    fn send(&self, command: &str, prefixes: &[&str], on_complete: Completion) -> bool;

    /// Route lines starting with `prefix` to `handler` whenever they are not
    /// part of a pending transaction. Returns a registration id, or `None`
    /// when the channel is closed.
    fn register_unsolicited(&self, prefix: &str, handler: UnsolicitedHandler) -> Option<u32>;

    /// Drop every registered unsolicited handler.
    fn unregister_all(&self);

    /// Drop every queued command without completing it.
    fn cancel_all(&self);
}

// ─── Tests ──────────────────────────────────────────────────────────────────
