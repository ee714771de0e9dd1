//! # Transaction Engine
//!
//! One AT command in, exactly one completion out. [`CommandEngine::send`]
//! adapts the transport's accept/complete protocol into a single
//! `FnOnce(Result<AtResponse>)` callback:
//!
//! - transport refuses the command: callback receives
//!   [`Error::TransportRejected`] before `send` returns;
//! - modem answers: callback receives the raw response, including non-OK
//!   final statuses, unmodified.
//!
//! Interpreting a non-OK status is the orchestrator's job, not this layer's.

use std::fmt;
use std::sync::{Arc, Mutex};

use crate::error::{Error, Result};
use crate::transport::{AtChannel, AtResponse, UnsolicitedHandler};

/// Shared, cloneable front end to one AT channel.
#[derive(Clone)]
pub struct CommandEngine {
    channel: Arc<dyn AtChannel>,
}

impl fmt::Debug for CommandEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CommandEngine").finish_non_exhaustive()
    }
}

impl CommandEngine {
    pub fn new(channel: Arc<dyn AtChannel>) -> Self {
        Self { channel }
    }

    /// Issue `command`, accepting intermediate lines that start with one of
    /// `prefixes`.
    pub fn send<F>(&self, command: &str, prefixes: &[&str], on_complete: F)
    where
        F: FnOnce(Result<AtResponse>) + Send + 'static,
    {
        // The transport consumes its completion even when it refuses the
        // command, so the caller's callback lives in a take-once slot.
        let slot = Arc::new(Mutex::new(Some(on_complete)));
        let reply_slot = Arc::clone(&slot);

        tracing::debug!(command, "AT send");
        let accepted = self.channel.send(
            command,
            prefixes,
            Box::new(move |response: AtResponse| {
                if let Some(cb) = take(&reply_slot) {
                    tracing::debug!(status = %response.final_status, lines = response.lines.len(), "AT done");
                    cb(Ok(response));
                }
            }),
        );

        if !accepted {
            tracing::warn!(command, "transport rejected command");
            if let Some(cb) = take(&slot) {
                cb(Err(Error::TransportRejected));
            }
        }
    }

    pub fn register_unsolicited(&self, prefix: &str, handler: UnsolicitedHandler) -> Option<u32> {
        self.channel.register_unsolicited(prefix, handler)
    }

    pub fn cancel_all(&self) {
        self.channel.cancel_all();
    }

    pub fn unregister_all(&self) {
        self.channel.unregister_all();
    }
}

fn take<F>(slot: &Mutex<Option<F>>) -> Option<F> {
    slot.lock().unwrap_or_else(|e| e.into_inner()).take()
}

// ─── Tests ──────────────────────────────────────────────────────────────────
