//! AT channel over a tty.
//!
//! Commands are written one at a time; the next leaves only after the
//! previous one saw its final result line. A reader thread splits incoming
//! bytes into lines and posts each line to the core thread, where it is
//! either folded into the command in flight (prefix match) or handed to the
//! unsolicited handler registered for its prefix.

use std::collections::VecDeque;
use std::io::{self, Read, Write};
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard, Weak};
use std::thread;
use std::time::Duration;

use bytes::{Buf, BytesMut};
use telit_core::runtime::CoreHandle;
use telit_core::transport::{AtChannel, AtResponse, Completion, UnsolicitedHandler};

const BAUD_RATE: u32 = 115_200;
const READ_TIMEOUT: Duration = Duration::from_millis(200);

/// Lines that end a transaction.
fn is_final(line: &str) -> bool {
    matches!(line, "OK" | "ERROR" | "NO CARRIER")
        || line.starts_with("+CME ERROR:")
        || line.starts_with("+CMS ERROR:")
}

// ─── Line framing ───────────────────────────────────────────────────────────

/// Splits a byte stream on CR/LF, dropping empty lines.
#[derive(Debug, Default)]
pub struct LineFramer {
    buf: BytesMut,
}

impl LineFramer {
    pub fn push(&mut self, data: &[u8]) -> Vec<String> {
        self.buf.extend_from_slice(data);
        let mut lines = Vec::new();
        while let Some(pos) = self.buf.iter().position(|b| *b == b'\r' || *b == b'\n') {
            let raw = self.buf.split_to(pos);
            self.buf.advance(1);
            let line = String::from_utf8_lossy(&raw);
            let line = line.trim();
            if !line.is_empty() {
                lines.push(line.to_string());
            }
        }
        lines
    }
}

// ─── Channel ────────────────────────────────────────────────────────────────

struct Pending {
    command: String,
    prefixes: Vec<String>,
    complete: Completion,
}

struct InFlight {
    pending: Pending,
    lines: Vec<String>,
}

struct Registration {
    prefix: String,
    handler: UnsolicitedHandler,
}

/// Unsolicited handlers. `generation` moves on every `unregister_all`.
#[derive(Default)]
struct Handlers {
    list: Vec<Registration>,
    generation: u64,
}

struct Inner<W> {
    writer: W,
    queue: VecDeque<Pending>,
    current: Option<InFlight>,
    closed: bool,
}

pub struct SerialChannel<W> {
    inner: Mutex<Inner<W>>,
    handlers: Mutex<Handlers>,
    next_id: Mutex<u32>,
}

impl<W: Write + Send> SerialChannel<W> {
    pub fn new(writer: W) -> Self {
        Self {
            inner: Mutex::new(Inner {
                writer,
                queue: VecDeque::new(),
                current: None,
                closed: false,
            }),
            handlers: Mutex::new(Handlers::default()),
            next_id: Mutex::new(1),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Inner<W>> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn handlers(&self) -> MutexGuard<'_, Handlers> {
        self.handlers.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Refuse further commands; the one in flight is abandoned.
    pub fn close(&self) {
        let mut inner = self.lock();
        inner.closed = true;
        inner.queue.clear();
        inner.current = None;
    }

    /// Start the next queued command if nothing is in flight. Returns the
    /// completions of commands that could not be written.
    fn advance(inner: &mut Inner<W>) -> Vec<Completion> {
        let mut failed = Vec::new();
        while inner.current.is_none() {
            let Some(pending) = inner.queue.pop_front() else {
                break;
            };
            let written = write!(inner.writer, "{}\r", pending.command).and_then(|()| inner.writer.flush());
            match written {
                Ok(()) => {
                    tracing::debug!(command = %pending.command, "tty write");
                    inner.current = Some(InFlight {
                        pending,
                        lines: Vec::new(),
                    });
                }
                Err(err) => {
                    tracing::warn!(command = %pending.command, error = %err, "tty write failed");
                    failed.push(pending.complete);
                }
            }
        }
        failed
    }

    /// Feed one received line. Runs completions and handlers on the calling
    /// thread, with no lock held.
    pub fn on_line(&self, line: &str) {
        let mut inner = self.lock();
        if inner.current.is_some() && is_final(line) {
            let Some(done) = inner.current.take() else {
                return;
            };
            let failed = Self::advance(&mut inner);
            drop(inner);
            let response = AtResponse {
                ok: line == "OK",
                final_status: line.to_string(),
                lines: done.lines,
            };
            (done.pending.complete)(response);
            for complete in failed {
                complete(AtResponse::error("ERROR"));
            }
            return;
        }
        if let Some(current) = inner.current.as_mut() {
            if current.pending.prefixes.iter().any(|p| line.starts_with(p.as_str())) {
                current.lines.push(line.to_string());
                return;
            }
        }
        drop(inner);
        self.dispatch_unsolicited(line);
    }

    fn dispatch_unsolicited(&self, line: &str) {
        let (mut handlers, generation) = {
            let mut slot = self.handlers();
            (std::mem::take(&mut slot.list), slot.generation)
        };
        let response = AtResponse::unsolicited(line);
        let mut delivered = false;
        for reg in handlers.iter_mut() {
            if line.starts_with(&reg.prefix) {
                (reg.handler)(&response);
                delivered = true;
            }
        }
        if !delivered {
            tracing::debug!(line, "unmatched line dropped");
        }
        let mut slot = self.handlers();
        if slot.generation != generation {
            // A handler cleared the table; the taken handlers stay dropped.
            return;
        }
        // Handlers registered while dispatching go after the existing ones.
        handlers.append(&mut slot.list);
        slot.list = handlers;
    }
}

impl<W: Write + Send> AtChannel for SerialChannel<W> {
    fn send(&self, command: &str, prefixes: &[&str], on_complete: Completion) -> bool {
        let mut inner = self.lock();
        if inner.closed {
            return false;
        }
        inner.queue.push_back(Pending {
            command: command.to_string(),
            prefixes: prefixes.iter().map(|p| p.to_string()).collect(),
            complete: on_complete,
        });
        let failed = Self::advance(&mut inner);
        drop(inner);
        for complete in failed {
            complete(AtResponse::error("ERROR"));
        }
        true
    }

    fn register_unsolicited(&self, prefix: &str, handler: UnsolicitedHandler) -> Option<u32> {
        if self.lock().closed {
            return None;
        }
        let mut next = self.next_id.lock().unwrap_or_else(|e| e.into_inner());
        let id = *next;
        *next += 1;
        self.handlers().list.push(Registration {
            prefix: prefix.to_string(),
            handler,
        });
        Some(id)
    }

    fn unregister_all(&self) {
        let mut handlers = self.handlers();
        handlers.list.clear();
        handlers.generation += 1;
    }

    fn cancel_all(&self) {
        let mut inner = self.lock();
        let dropped = inner.queue.len() + usize::from(inner.current.is_some());
        inner.queue.clear();
        inner.current = None;
        tracing::debug!(count = dropped, "tty commands cancelled");
    }
}

// ─── Opening a tty ──────────────────────────────────────────────────────────

/// Open `path` and start its reader thread. Lines are delivered on the core
/// thread through `core`.
pub fn open(path: &Path, core: CoreHandle) -> io::Result<Arc<dyn AtChannel>> {
    let name = path.to_string_lossy().into_owned();
    let port = serialport::new(&name, BAUD_RATE)
        .data_bits(serialport::DataBits::Eight)
        .stop_bits(serialport::StopBits::One)
        .parity(serialport::Parity::None)
        .timeout(READ_TIMEOUT)
        .open()?;
    let reader = port.try_clone()?;
    let channel = Arc::new(SerialChannel::new(port));
    let weak = Arc::downgrade(&channel);

    thread::Builder::new()
        .name("telit-tty".into())
        .spawn(move || {
            read_loop(reader, weak, |channel, line| core.post(move || channel.on_line(&line)))
        })?;
    tracing::info!(port = %name, baud = BAUD_RATE, "tty opened");
    Ok(channel)
}

/// Frame bytes from `reader` and hand each line to `deliver`, until the
/// channel is dropped, `deliver` refuses, or the tty fails or hits EOF. A
/// failed or vanished tty closes the channel.
fn read_loop<R, W, D>(mut reader: R, channel: Weak<SerialChannel<W>>, mut deliver: D)
where
    R: Read,
    W: Write + Send,
    D: FnMut(Arc<SerialChannel<W>>, String) -> bool,
{
    let mut framer = LineFramer::default();
    let mut buf = [0u8; 1024];
    loop {
        match reader.read(&mut buf) {
            Ok(0) => {
                tracing::warn!("tty reached end of file, closing channel");
                if let Some(channel) = channel.upgrade() {
                    channel.close();
                }
                return;
            }
            Ok(n) => {
                for line in framer.push(&buf[..n]) {
                    let Some(channel) = channel.upgrade() else {
                        return;
                    };
                    if !deliver(channel, line) {
                        return;
                    }
                }
            }
            Err(err) if err.kind() == io::ErrorKind::TimedOut => {
                if channel.strong_count() == 0 {
                    return;
                }
            }
            Err(err) => {
                tracing::warn!(error = %err, "tty read failed, closing channel");
                if let Some(channel) = channel.upgrade() {
                    channel.close();
                }
                return;
            }
        }
    }
}

// ─── Tests ──────────────────────────────────────────────────────────────────
