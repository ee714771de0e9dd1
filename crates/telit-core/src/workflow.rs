//! # Workflow Orchestrator
//!
//! A [`Step`] is a deferred asynchronous operation that yields exactly one
//! `Result<T>` when run. Steps are lazy: building one issues nothing, so a
//! facility can assemble a whole chain, reject it synchronously, or drop it
//! unused.
//!
//! Two composition shapes are provided:
//!
//! - **Linear chain** ([`Step::and_then`], [`Step::sequence`]): step K+1 is
//!   built and issued from step K's success callback. The first failure is
//!   the terminal reply and nothing after it runs.
//! - **Deregister / act / restore** ([`compensated`]): the restore step runs
//!   whether or not the act step succeeded; a restore failure after a failed
//!   act is logged and swallowed so the caller sees the act failure.
//!
//! ## Usage
//!
//! ```no_run
//! use std::sync::Arc;
//! use telit_core::engine::CommandEngine;
//! use telit_core::sim::SimulatedModem;
//! use telit_core::workflow::Step;
//!
//! let engine = CommandEngine::new(Arc::new(SimulatedModem::telit()));
//! Step::transaction(&engine, "AT+CFUN?", &["+CFUN:"], |resp| {
//!     telit_core::decoder::decode_single(resp, "+CFUN:", |f| f.next_integer())
//! })
//! .run(|result| println!("{result:?}"));
//! ```

use std::fmt;

use crate::engine::CommandEngine;
use crate::error::{DecodeError, Error, Result};
use crate::transport::AtResponse;

/// Terminal callback of an asynchronous operation.
pub type Reply<T> = Box<dyn FnOnce(Result<T>) + Send>;

/// Deferred asynchronous operation producing one `Result<T>`.
#[must_use = "a step does nothing until it is run"]
pub struct Step<T> {
    start: Box<dyn FnOnce(Reply<T>) + Send>,
}

impl<T> fmt::Debug for Step<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Step").finish_non_exhaustive()
    }
}

impl<T: Send + 'static> Step<T> {
    pub fn new(start: impl FnOnce(Reply<T>) + Send + 'static) -> Self {
        Self {
            start: Box::new(start),
        }
    }

    /// Already-decided outcome.
    pub fn ready(result: Result<T>) -> Self {
        Self::new(move |reply| reply(result))
    }

    pub fn fail(err: Error) -> Self {
        Self::ready(Err(err))
    }

    /// One AT transaction, decoded on success.
    ///
    /// A non-OK final status becomes [`Error::Protocol`]; the decoder only
    /// ever sees successful responses.
    pub fn transaction<D>(
        engine: &CommandEngine,
        command: impl Into<String>,
        prefixes: &'static [&'static str],
        decode: D,
    ) -> Self
    where
        D: FnOnce(&AtResponse) -> Result<T, DecodeError> + Send + 'static,
    {
        let engine = engine.clone();
        let command = command.into();
        Self::new(move |reply| {
            engine.send(&command, prefixes, move |outcome| {
                let result = outcome.and_then(|resp| {
                    if !resp.ok {
                        return Err(Error::Protocol {
                            status: resp.final_status,
                        });
                    }
                    decode(&resp).map_err(Error::from)
                });
                reply(result);
            });
        })
    }

    /// Start the operation. `on_complete` fires exactly once.
    pub fn run(self, on_complete: impl FnOnce(Result<T>) + Send + 'static) {
        (self.start)(Box::new(on_complete));
    }

    /// Linear chain: build and run `next` only after this step succeeds.
    pub fn and_then<U, F>(self, next: F) -> Step<U>
    where
        U: Send + 'static,
        F: FnOnce(T) -> Step<U> + Send + 'static,
    {
        Step::new(move |reply: Reply<U>| {
            self.run(move |result| match result {
                Ok(value) => next(value).run(reply),
                Err(err) => reply(Err(err)),
            });
        })
    }

    pub fn map<U, F>(self, f: F) -> Step<U>
    where
        U: Send + 'static,
        F: FnOnce(T) -> U + Send + 'static,
    {
        Step::new(move |reply: Reply<U>| self.run(move |result| reply(result.map(f))))
    }

    /// Run `steps` one after another, collecting every value in order.
    pub fn sequence(steps: Vec<Step<T>>) -> Step<Vec<T>> {
        let mut chain = Step::ready(Ok(Vec::with_capacity(steps.len())));
        for step in steps {
            chain = chain.and_then(move |mut acc: Vec<T>| {
                step.map(move |value| {
                    acc.push(value);
                    acc
                })
            });
        }
        chain
    }
}

impl Step<()> {
    /// Command with no intermediate lines expected.
    pub fn command(engine: &CommandEngine, command: impl Into<String>) -> Self {
        Self::transaction(engine, command, &[], |_| Ok(()))
    }

    /// Log a failure and carry on as if the step had succeeded.
    pub fn best_effort(self, what: &'static str) -> Self {
        Step::new(move |reply: Reply<()>| {
            self.run(move |result| {
                if let Err(err) = result {
                    tracing::warn!(step = what, error = %err, "best-effort step failed");
                }
                reply(Ok(()));
            });
        })
    }
}

/// Deregister, act, then restore regardless of the act outcome.
///
/// - `deregister` fails: that failure is the reply; nothing else runs.
/// - `act` fails: `restore` still runs; its own failure is logged and
///   swallowed, and the reply is the act failure.
/// - `act` succeeds: the reply waits for `restore` and carries its outcome.
pub fn compensated<T, A, R>(deregister: Step<()>, act: A, restore: R) -> Step<T>
where
    T: Send + 'static,
    A: FnOnce() -> Step<T> + Send + 'static,
    R: FnOnce() -> Step<()> + Send + 'static,
{
    Step::new(move |reply: Reply<T>| {
        deregister.run(move |registered| {
            if let Err(err) = registered {
                reply(Err(err));
                return;
            }
            act().run(move |acted| match acted {
                Ok(value) => restore().run(move |restored| reply(restored.map(|()| value))),
                Err(err) => restore().run(move |restored| {
                    if let Err(restore_err) = restored {
                        tracing::warn!(error = %restore_err, "compensation step failed");
                    }
                    reply(Err(err));
                }),
            });
        });
    })
}

// ─── Tests ──────────────────────────────────────────────────────────────────
