use crate::analog::AnalogAdapter;
use crate::button::ButtonAdapter;
use crate::config::{ConfigSection, DeviceSpec, Settings};
use crate::host::{EventSink, KeyRegistry};
use crate::protocol::{Connector, LinkState};
use crate::tracker::TrackerAdapter;
use crate::types::{ControllerPose, DeviceId, DeviceKind, Hand, TrackingStatus};
use crate::Result;

/// One configured VRPN device.
pub enum Device {
    Button(ButtonAdapter),
    Tracker(TrackerAdapter),
    Analog(AnalogAdapter),
}

impl Device {
    /// Build the adapter for `spec.kind` from its section. The device starts
    /// disconnected.
    pub fn configure(
        spec: &DeviceSpec,
        section: &ConfigSection,
        settings: &Settings,
    ) -> Result<Device> {
        let id = spec.id.clone();
        let device = match spec.kind {
            DeviceKind::Button => Device::Button(ButtonAdapter::configure(id, section)?),
            DeviceKind::Tracker => {
                Device::Tracker(TrackerAdapter::configure(id, section, settings.world_scale)?)
            }
            DeviceKind::Analog => Device::Analog(AnalogAdapter::configure(id, section)?),
        };
        log::info!("[{}] created {} device for {}", device.id(), spec.kind, spec.address);
        Ok(device)
    }

    pub fn id(&self) -> &DeviceId {
        match self {
            Device::Button(d) => d.id(),
            Device::Tracker(d) => d.id(),
            Device::Analog(d) => d.id(),
        }
    }

    pub fn kind(&self) -> DeviceKind {
        match self {
            Device::Button(_) => DeviceKind::Button,
            Device::Tracker(_) => DeviceKind::Tracker,
            Device::Analog(_) => DeviceKind::Analog,
        }
    }

    pub fn link_state(&self) -> LinkState {
        match self {
            Device::Button(d) => d.link_state(),
            Device::Tracker(d) => d.link_state(),
            Device::Analog(d) => d.link_state(),
        }
    }

    pub fn register_keys(&self, keys: &mut dyn KeyRegistry) {
        match self {
            Device::Button(d) => d.register_keys(keys),
            Device::Tracker(d) => d.register_keys(keys),
            Device::Analog(d) => d.register_keys(keys),
        }
    }

    pub fn connect(&self, address: &str, connector: &dyn Connector) -> Result<()> {
        match self {
            Device::Button(d) => d.connect(address, connector),
            Device::Tracker(d) => d.connect(address, connector),
            Device::Analog(d) => d.connect(address, connector),
        }
    }

    /// Pump the connection and emit this frame's events. A device that was
    /// never connected does nothing. When the pump fails, whatever was already
    /// buffered is still emitted and the error is returned afterwards.
    pub fn poll(&self, sink: &mut dyn EventSink) -> Result<()> {
        match self {
            Device::Button(d) => d.poll(sink),
            Device::Tracker(d) => d.poll(sink),
            Device::Analog(d) => d.poll(sink),
        }
    }

    pub fn close(&self) {
        match self {
            Device::Button(d) => d.close(),
            Device::Tracker(d) => d.close(),
            Device::Analog(d) => d.close(),
        }
    }

    pub fn as_tracker(&self) -> Option<&TrackerAdapter> {
        match self {
            Device::Tracker(d) => Some(d),
            _ => None,
        }
    }

    pub fn controller_pose(&self, player: u32, hand: Hand) -> Option<ControllerPose> {
        self.as_tracker()?.controller_pose(player, hand)
    }

    pub fn tracking_status(&self, player: u32, hand: Hand) -> TrackingStatus {
        match self.as_tracker() {
            Some(tracker) => tracker.tracking_status(player, hand),
            None => TrackingStatus::NotTracked,
        }
    }
}
