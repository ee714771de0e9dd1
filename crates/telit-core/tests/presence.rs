mod common;

use std::sync::Arc;
use std::time::Duration;

use crossbeam_channel::bounded;
use telit_core::config::PresenceConfig;
use telit_core::facility::Registries;
use telit_core::modem::{ModemModel, ModemPorts};
use telit_core::notify::{EventBus, ModemEvent};
use telit_core::presence::{ChannelSource, DeviceEvent, FakeDevice, PresenceHandle, PresenceState, PresenceWatcher};
use telit_core::runtime::{ChannelFactory, Core, CoreHandle, CoreRuntime};
use telit_core::sim::SimulatedModem;
use telit_core::transport::AtChannel;

fn sim_factory() -> Box<dyn ChannelFactory> {
    Box::new(|_: &ModemPorts, _: &CoreHandle| -> std::io::Result<Arc<dyn AtChannel>> {
        let channel: Arc<dyn AtChannel> = Arc::new(SimulatedModem::telit());
        Ok(channel)
    })
}

#[test]
fn rapid_device_flapping_never_overlaps_modems() {
    common::init_tracing();
    let config = PresenceConfig {
        detect_delay: Duration::from_millis(3),
        open_delay: Duration::from_millis(2),
        close_delay: Duration::from_millis(2),
        ..PresenceConfig::default()
    };
    let device = Arc::new(FakeDevice::new(false));
    let presence = PresenceHandle::new();
    let (bus, events) = EventBus::channel();
    let (action_tx, action_rx) = bounded(16);
    let (device_events, source) = ChannelSource::new();

    let core = Core::new(
        ModemModel::TelitSerial,
        config.ports(),
        device.clone(),
        presence.clone(),
        sim_factory(),
        Arc::new(Registries::with_telit().unwrap()),
        bus,
    );
    let mut runtime = CoreRuntime::start(core, action_rx).unwrap();
    let mut watcher = PresenceWatcher::start(&config, device.clone(), Box::new(source), presence.clone(), action_tx).unwrap();

    for round in 0..40u64 {
        let present = round % 2 == 0;
        device.set_present(present);
        let event = if present {
            DeviceEvent::Created
        } else {
            DeviceEvent::Deleted
        };
        device_events.send(event).unwrap();
        std::thread::sleep(Duration::from_millis(round % 7));
    }

    // One slow cycle after the burst: whatever the burst left behind, the
    // machine converges on a single live modem.
    std::thread::sleep(Duration::from_millis(100));
    device.set_present(false);
    device_events.send(DeviceEvent::Deleted).unwrap();
    std::thread::sleep(Duration::from_millis(100));
    device.set_present(true);
    device_events.send(DeviceEvent::Created).unwrap();
    std::thread::sleep(Duration::from_millis(200));
    watcher.shutdown();

    let (tx, rx) = bounded(1);
    runtime.handle().invoke(move |core| {
        let _ = tx.send((core.modem().is_some(), core.presence()));
    });
    let (has_modem, state) = rx.recv_timeout(Duration::from_secs(2)).unwrap();
    runtime.shutdown();

    assert!(has_modem, "device ends present");
    assert_eq!(state, PresenceState::Attached);

    let mut live = 0i32;
    for event in events.try_iter() {
        match event {
            ModemEvent::ModemAdded { .. } => live += 1,
            ModemEvent::ModemRemoved => live -= 1,
            _ => continue,
        }
        assert!((0..=1).contains(&live), "at most one modem at any time");
    }
    assert_eq!(live, 0, "shutdown removed the last modem");
}
