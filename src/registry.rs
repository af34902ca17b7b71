use crate::config::{ConfigSection, DeviceSpec, Settings};
use crate::device::Device;
use crate::host::{EventSink, KeyRegistry};
use crate::protocol::Connector;
use crate::types::{ControllerPose, DeviceId, Hand, TrackingStatus};

/// Outcome of one [`Registry::poll_all`] pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PollSummary {
    pub polled: usize,
    pub failed: usize,
}

/// All configured devices, in configuration order.
///
/// Dropping the registry drops every adapter, which closes its connection.
#[derive(Default)]
pub struct Registry {
    devices: Vec<Device>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build every device described by `sections`.
    ///
    /// Sections that fail to configure are logged and skipped. Each device's
    /// keys are registered before it connects. Only devices allowed by
    /// `settings.enabled` are connected; a failed connect leaves the device
    /// disconnected.
    pub fn from_sections<'a>(
        sections: impl IntoIterator<Item = &'a ConfigSection>,
        settings: &Settings,
        connector: &dyn Connector,
        keys: &mut dyn KeyRegistry,
    ) -> Registry {
        let mut registry = Registry::new();

        for section in sections {
            let spec = match DeviceSpec::parse(section) {
                Ok(spec) => spec,
                Err(e) => {
                    log::warn!("Skipping section: {}", e);
                    continue;
                }
            };
            let device = match Device::configure(&spec, section, settings) {
                Ok(device) => device,
                Err(e) => {
                    log::warn!("Could not create device: {}", e);
                    continue;
                }
            };

            device.register_keys(keys);

            if settings.enabled.allows(spec.id.as_str()) {
                if let Err(e) = device.connect(&spec.address, connector) {
                    log::warn!("[{}] {}", spec.id, e);
                }
            } else {
                log::info!("[{}] not in enabled devices, staying disconnected", spec.id);
            }

            registry.add(device);
        }

        log::info!("VRPN registry ready with {} device(s)", registry.len());
        registry
    }

    pub fn add(&mut self, device: Device) {
        self.devices.push(device);
    }

    /// Poll every device in order. A failing device is logged and counted
    /// without affecting the others.
    pub fn poll_all(&self, sink: &mut dyn EventSink) -> PollSummary {
        let mut summary = PollSummary::default();
        for device in &self.devices {
            summary.polled += 1;
            if let Err(e) = device.poll(sink) {
                summary.failed += 1;
                log::warn!("[{}] poll failed: {}", device.id(), e);
            }
        }
        summary
    }

    /// Pose from the first tracker with a binding for `player` and `hand`.
    pub fn controller_pose(&self, player: u32, hand: Hand) -> Option<ControllerPose> {
        self.devices
            .iter()
            .find_map(|device| device.controller_pose(player, hand))
    }

    pub fn tracking_status(&self, player: u32, hand: Hand) -> TrackingStatus {
        self.devices
            .iter()
            .map(|device| device.tracking_status(player, hand))
            .find(|status| *status == TrackingStatus::Tracked)
            .unwrap_or(TrackingStatus::NotTracked)
    }

    pub fn get(&self, id: &DeviceId) -> Option<&Device> {
        self.devices.iter().find(|device| device.id() == id)
    }

    pub fn devices(&self) -> &[Device] {
        &self.devices
    }

    pub fn len(&self) -> usize {
        self.devices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.devices.is_empty()
    }
}
