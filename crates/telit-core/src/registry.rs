//! # Capability Registry
//!
//! Named driver descriptors register against one facility kind. Creating a
//! facility instance probes the matching descriptors in registration order;
//! the first probe that succeeds binds its driver to the instance for good.
//!
//! The registry is an ordinary value owned by the runtime, not process-wide
//! state. Name collisions follow one explicit rule: registering the same
//! descriptor twice is a no-op, registering a *different* descriptor under a
//! taken name fails with [`Error::DuplicateDriver`].

use std::fmt;
use std::sync::{Arc, Mutex};

use crate::engine::CommandEngine;
use crate::error::{Error, Result};

/// Vendor flavour passed to probes; selects command-table variants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Vendor {
    #[default]
    Default,
    /// Generic Telit module behind a serial multiplexer.
    TelitSerial,
    Le910v2,
}

impl fmt::Display for Vendor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Vendor::Default => write!(f, "default"),
            Vendor::TelitSerial => write!(f, "telit-serial"),
            Vendor::Le910v2 => write!(f, "le910v2"),
        }
    }
}

// ─── Instance Lifecycle ─────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AtomState {
    /// Driver bound, host-visible registration not yet confirmed.
    Probing,
    Registered,
    Removed,
}

struct Lifecycle {
    state: AtomState,
    teardown: Option<Box<dyn FnOnce() + Send>>,
}

/// Shared lifecycle handle of one facility instance.
///
/// Drivers receive a clone at probe time and may confirm registration or
/// remove the instance later, e.g. after an asynchronous capability check.
#[derive(Clone)]
pub struct AtomHandle {
    facility: &'static str,
    lifecycle: Arc<Mutex<Lifecycle>>,
}

impl fmt::Debug for AtomHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AtomHandle")
            .field("facility", &self.facility)
            .field("state", &self.state())
            .finish()
    }
}

impl AtomHandle {
    fn new(facility: &'static str) -> Self {
        Self {
            facility,
            lifecycle: Arc::new(Mutex::new(Lifecycle {
                state: AtomState::Probing,
                teardown: None,
            })),
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Lifecycle> {
        self.lifecycle.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn facility(&self) -> &'static str {
        self.facility
    }

    pub fn state(&self) -> AtomState {
        self.lock().state
    }

    pub fn is_registered(&self) -> bool {
        self.state() == AtomState::Registered
    }

    pub fn is_removed(&self) -> bool {
        self.state() == AtomState::Removed
    }

    /// Make the instance host-visible. No effect once removed.
    pub fn register(&self) {
        let mut lc = self.lock();
        if lc.state == AtomState::Probing {
            lc.state = AtomState::Registered;
            tracing::info!(facility = self.facility, "facility registered");
        }
    }

    /// Tear the instance down. The bound descriptor's `remove` runs exactly
    /// once, however often this is called.
    pub fn remove(&self) {
        let teardown = {
            let mut lc = self.lock();
            if lc.state == AtomState::Removed {
                return;
            }
            lc.state = AtomState::Removed;
            lc.teardown.take()
        };
        tracing::info!(facility = self.facility, "facility removed");
        if let Some(teardown) = teardown {
            teardown();
        }
    }

    /// Attach the descriptor's teardown. Runs it at once if a driver already
    /// removed the instance during its probe.
    fn bind(&self, teardown: Box<dyn FnOnce() + Send>) {
        let run_now = {
            let mut lc = self.lock();
            if lc.state == AtomState::Removed {
                Some(teardown)
            } else {
                lc.teardown = Some(teardown);
                None
            }
        };
        if let Some(teardown) = run_now {
            teardown();
        }
    }
}

// ─── Descriptors ────────────────────────────────────────────────────────────

/// What a probe gets to look at.
#[derive(Debug, Clone)]
pub struct ProbeContext {
    pub vendor: Vendor,
    pub engine: CommandEngine,
    pub atom: AtomHandle,
}

/// A named driver for facility kind `D`.
///
/// `probe` returns the per-instance driver object on acceptance; its
/// operations are the methods of `D`. `remove` is called exactly once when
/// the instance goes away.
pub trait DriverDescriptor<D: ?Sized>: Send + Sync {
    fn name(&self) -> &str;

    fn probe(&self, ctx: &ProbeContext) -> Result<Arc<D>>;

    fn remove(&self, driver: Arc<D>) {
        drop(driver);
    }
}

/// Driver bound to a freshly created instance.
pub struct Binding<D: ?Sized> {
    pub driver: Arc<D>,
    pub atom: AtomHandle,
    pub driver_name: String,
}

/// Ordered set of descriptors for one facility kind.
pub struct DriverRegistry<D: ?Sized> {
    facility: &'static str,
    drivers: Vec<Arc<dyn DriverDescriptor<D>>>,
}

impl<D: ?Sized> fmt::Debug for DriverRegistry<D> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DriverRegistry")
            .field("facility", &self.facility)
            .field("drivers", &self.names())
            .finish()
    }
}

impl<D: ?Sized> DriverRegistry<D> {
    pub fn new(facility: &'static str) -> Self {
        Self {
            facility,
            drivers: Vec::new(),
        }
    }

    pub fn facility(&self) -> &'static str {
        self.facility
    }

    pub fn names(&self) -> Vec<&str> {
        self.drivers.iter().map(|d| d.name()).collect()
    }

    pub fn len(&self) -> usize {
        self.drivers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.drivers.is_empty()
    }

    pub fn register_driver(&mut self, descriptor: Arc<dyn DriverDescriptor<D>>) -> Result<()> {
        if let Some(existing) = self.drivers.iter().find(|d| d.name() == descriptor.name()) {
            if same_descriptor(existing, &descriptor) {
                return Ok(());
            }
            return Err(Error::DuplicateDriver(descriptor.name().to_string()));
        }
        tracing::debug!(facility = self.facility, driver = descriptor.name(), "driver registered");
        self.drivers.push(descriptor);
        Ok(())
    }

    /// Returns `true` if a descriptor with `name` was registered.
    pub fn unregister_driver(&mut self, name: &str) -> bool {
        let before = self.drivers.len();
        self.drivers.retain(|d| d.name() != name);
        before != self.drivers.len()
    }
}

impl<D: ?Sized + Send + Sync + 'static> DriverRegistry<D> {
    /// Probe descriptors named `driver` (all of them for `None`) in
    /// registration order; the first acceptance wins.
    pub fn create_instance(
        &self,
        vendor: Vendor,
        driver: Option<&str>,
        engine: &CommandEngine,
    ) -> Result<Binding<D>> {
        let candidates = self
            .drivers
            .iter()
            .filter(|d| driver.is_none_or(|name| d.name() == name));

        for descriptor in candidates {
            let atom = AtomHandle::new(self.facility);
            let ctx = ProbeContext {
                vendor,
                engine: engine.clone(),
                atom: atom.clone(),
            };
            match descriptor.probe(&ctx) {
                Ok(bound) => {
                    let owner = Arc::clone(descriptor);
                    let instance = Arc::clone(&bound);
                    atom.bind(Box::new(move || owner.remove(instance)));
                    return Ok(Binding {
                        driver: bound,
                        atom,
                        driver_name: descriptor.name().to_string(),
                    });
                }
                Err(err) => {
                    tracing::debug!(
                        facility = self.facility,
                        driver = descriptor.name(),
                        error = %err,
                        "probe declined"
                    );
                }
            }
        }

        Err(Error::NoDriver(self.facility.to_string()))
    }
}

fn same_descriptor<D: ?Sized>(
    a: &Arc<dyn DriverDescriptor<D>>,
    b: &Arc<dyn DriverDescriptor<D>>,
) -> bool {
    std::ptr::addr_eq(Arc::as_ptr(a), Arc::as_ptr(b))
}

// ─── Tests ──────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sim::SimulatedModem;
    use std::sync::atomic::{AtomicUsize, Ordering};

    trait Widget: Send + Sync {
        fn label(&self) -> &'static str;
    }

    struct Bound(&'static str);

    impl Widget for Bound {
        fn label(&self) -> &'static str {
            self.0
        }
    }

    struct Desc {
        name: &'static str,
        label: &'static str,
        accept: bool,
        probes: AtomicUsize,
        removes: AtomicUsize,
    }

    impl Desc {
        fn new(name: &'static str, label: &'static str, accept: bool) -> Arc<Self> {
            Arc::new(Self {
                name,
                label,
                accept,
                probes: AtomicUsize::new(0),
                removes: AtomicUsize::new(0),
            })
        }
    }

    impl DriverDescriptor<dyn Widget> for Desc {
        fn name(&self) -> &str {
            self.name
        }

        fn probe(&self, ctx: &ProbeContext) -> Result<Arc<dyn Widget>> {
            self.probes.fetch_add(1, Ordering::SeqCst);
            if !self.accept {
                return Err(Error::NotImplemented);
            }
            ctx.atom.register();
            Ok(Arc::new(Bound(self.label)))
        }

        fn remove(&self, _driver: Arc<dyn Widget>) {
            self.removes.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn engine() -> CommandEngine {
        CommandEngine::new(Arc::new(SimulatedModem::new()))
    }

    #[test]
    fn first_successful_probe_in_insertion_order_wins() {
        let mut reg: DriverRegistry<dyn Widget> = DriverRegistry::new("widget");
        let declines = Desc::new("a", "A", false);
        let accepts = Desc::new("b", "B", true);
        let never = Desc::new("c", "C", true);
        reg.register_driver(declines.clone()).unwrap();
        reg.register_driver(accepts.clone()).unwrap();
        reg.register_driver(never.clone()).unwrap();

        let binding = reg.create_instance(Vendor::Default, None, &engine()).unwrap();
        assert_eq!(binding.driver.label(), "B");
        assert_eq!(binding.driver_name, "b");
        assert_eq!(declines.probes.load(Ordering::SeqCst), 1);
        assert_eq!(never.probes.load(Ordering::SeqCst), 0, "later matches never tried");
    }

    #[test]
    fn named_lookup_only_probes_that_name() {
        let mut reg: DriverRegistry<dyn Widget> = DriverRegistry::new("widget");
        let a = Desc::new("a", "A", true);
        let b = Desc::new("b", "B", true);
        reg.register_driver(a.clone()).unwrap();
        reg.register_driver(b.clone()).unwrap();

        let binding = reg.create_instance(Vendor::Default, Some("b"), &engine()).unwrap();
        assert_eq!(binding.driver.label(), "B");
        assert_eq!(a.probes.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn no_acceptance_means_no_instance() {
        let mut reg: DriverRegistry<dyn Widget> = DriverRegistry::new("widget");
        reg.register_driver(Desc::new("a", "A", false)).unwrap();
        let err = reg.create_instance(Vendor::Default, Some("a"), &engine()).err();
        assert_eq!(err, Some(Error::NoDriver("widget".into())));

        let err = reg.create_instance(Vendor::Default, Some("missing"), &engine()).err();
        assert_eq!(err, Some(Error::NoDriver("widget".into())));
    }

    #[test]
    fn duplicate_names_are_rejected_but_reregistering_is_idempotent() {
        let mut reg: DriverRegistry<dyn Widget> = DriverRegistry::new("widget");
        let first = Desc::new("telitmodem", "first", true);
        reg.register_driver(first.clone()).unwrap();
        reg.register_driver(first.clone()).unwrap();
        assert_eq!(reg.len(), 1, "same descriptor twice is a no-op");

        let err = reg.register_driver(Desc::new("telitmodem", "second", true));
        assert_eq!(err, Err(Error::DuplicateDriver("telitmodem".into())));
        assert_eq!(reg.names(), vec!["telitmodem"]);

        let binding = reg.create_instance(Vendor::Default, Some("telitmodem"), &engine()).unwrap();
        assert_eq!(binding.driver.label(), "first", "first registration kept");
    }

    #[test]
    fn unregister_then_register_replaces() {
        let mut reg: DriverRegistry<dyn Widget> = DriverRegistry::new("widget");
        reg.register_driver(Desc::new("x", "old", true)).unwrap();
        assert!(reg.unregister_driver("x"));
        assert!(!reg.unregister_driver("x"));
        reg.register_driver(Desc::new("x", "new", true)).unwrap();
        let binding = reg.create_instance(Vendor::Default, Some("x"), &engine()).unwrap();
        assert_eq!(binding.driver.label(), "new");
    }

    #[test]
    fn remove_calls_descriptor_remove_exactly_once() {
        let mut reg: DriverRegistry<dyn Widget> = DriverRegistry::new("widget");
        let desc = Desc::new("a", "A", true);
        reg.register_driver(desc.clone()).unwrap();

        let binding = reg.create_instance(Vendor::Default, None, &engine()).unwrap();
        assert!(binding.atom.is_registered());
        binding.atom.remove();
        binding.atom.remove();
        assert!(binding.atom.is_removed());
        assert_eq!(desc.removes.load(Ordering::SeqCst), 1);
    }

    struct RemovesDuringProbe {
        removes: AtomicUsize,
    }

    impl DriverDescriptor<dyn Widget> for RemovesDuringProbe {
        fn name(&self) -> &str {
            "eager"
        }

        fn probe(&self, ctx: &ProbeContext) -> Result<Arc<dyn Widget>> {
            ctx.atom.remove();
            Ok(Arc::new(Bound("eager")))
        }

        fn remove(&self, _driver: Arc<dyn Widget>) {
            self.removes.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn removal_during_probe_still_tears_down_once() {
        let mut reg: DriverRegistry<dyn Widget> = DriverRegistry::new("widget");
        let desc = Arc::new(RemovesDuringProbe {
            removes: AtomicUsize::new(0),
        });
        reg.register_driver(desc.clone()).unwrap();

        let binding = reg.create_instance(Vendor::Default, None, &engine()).unwrap();
        assert!(binding.atom.is_removed());
        assert_eq!(desc.removes.load(Ordering::SeqCst), 1);
        binding.atom.remove();
        assert_eq!(desc.removes.load(Ordering::SeqCst), 1);
    }
}
