use crate::cell::StateCell;
use crate::config::{
    collect_bindings, index_by_id, parse_unknown_binding, BindingSpec, ConfigSection,
    UnknownBinding,
};
use crate::host::{EventSink, InputEvent, Key, KeyDetails, KeyKind, KeyRegistry};
use crate::protocol::{AnalogHandler, AnalogReport, Connector, Link, LinkState, CHANNEL_MAX};
use crate::types::{BindingId, DeviceId};
use crate::Result;
use std::collections::BTreeMap;
use std::sync::Arc;

/// Most recent channel values of an analog device.
#[derive(Debug, Clone, Copy)]
struct AnalogFrame {
    count: usize,
    values: [f64; CHANNEL_MAX],
}

impl Default for AnalogFrame {
    fn default() -> Self {
        Self {
            count: 0,
            values: [0.0; CHANNEL_MAX],
        }
    }
}

#[derive(Debug, Clone)]
struct ChannelBinding {
    key: Key,
    description: String,
}

/// Adapter for a VRPN analog device.
///
/// Every bound channel below the latest channel count is emitted on every poll,
/// whether or not it changed.
pub struct AnalogAdapter {
    id: DeviceId,
    bindings: BTreeMap<BindingId, ChannelBinding>,
    on_unknown: UnknownBinding,
    frame: StateCell<AnalogFrame>,
    link: Link,
}

impl AnalogAdapter {
    pub fn configure(id: DeviceId, section: &ConfigSection) -> Result<Self> {
        let specs = collect_bindings(section, "Channel", BindingSpec::parse)?;
        let bindings = index_by_id(
            section,
            specs.into_iter().map(|spec| {
                (
                    spec.id,
                    ChannelBinding {
                        key: Key::new(&spec.name),
                        description: spec.description,
                    },
                )
            }),
        );

        Ok(Self {
            id,
            bindings,
            on_unknown: parse_unknown_binding(section),
            frame: StateCell::new(AnalogFrame::default()),
            link: Link::disconnected(),
        })
    }

    pub fn id(&self) -> &DeviceId {
        &self.id
    }

    pub fn link_state(&self) -> LinkState {
        self.link.state()
    }

    pub fn register_keys(&self, keys: &mut dyn KeyRegistry) {
        for binding in self.bindings.values() {
            keys.add_key(KeyDetails {
                key: binding.key.clone(),
                description: binding.description.clone(),
                kind: KeyKind::FloatAxis,
            });
        }
    }

    pub fn connect(&self, address: &str, connector: &dyn Connector) -> Result<()> {
        if self.link.state() != LinkState::Disconnected {
            log::warn!("[{}] already {:?}, not reconnecting", self.id, self.link.state());
            return Ok(());
        }
        let frame = self.frame.clone();
        let device = self.id.clone();
        let handler: AnalogHandler = Arc::new(move |report: AnalogReport<'_>| {
            let received = report.channels.len();
            let count = received.min(CHANNEL_MAX);
            frame.with(|frame| {
                frame.count = count;
                frame.values[..count].copy_from_slice(&report.channels[..count]);
            });
            if received > CHANNEL_MAX {
                log::warn!(
                    "[{}] report carries {} channels, keeping the first {}",
                    device,
                    received,
                    CHANNEL_MAX
                );
            }
        });
        let remote = connector.open_analog(address, handler)?;
        self.link.attach(remote);
        log::info!("[{}] analog device connected to {}", self.id, address);
        Ok(())
    }

    /// Pump, then emit the current value of every reported channel.
    pub fn poll(&self, sink: &mut dyn EventSink) -> Result<()> {
        let (pumped, result) = self.link.pump_frame();
        if !pumped {
            return result;
        }

        let frame = self.frame.snapshot();
        for (channel, value) in frame.values[..frame.count].iter().enumerate() {
            let id = BindingId(channel as i32);
            let Some(binding) = self.bindings.get(&id) else {
                log::warn!("[{}] could not find analog channel with id {}", self.id, id);
                match self.on_unknown {
                    UnknownBinding::Skip => continue,
                    UnknownBinding::Abort => break,
                }
            };
            sink.emit(InputEvent::Analog {
                key: binding.key.clone(),
                value: *value,
            });
        }
        result
    }

    pub fn close(&self) {
        if self.link.state() == LinkState::Connected {
            log::info!("[{}] closing analog device", self.id);
        }
        self.link.close();
    }
}

impl Drop for AnalogAdapter {
    fn drop(&mut self) {
        self.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::loopback::{Delivery, LoopbackConnector, LoopbackFeed};
    use crate::protocol::FailingConnector;

    const ADDRESS: &str = "Stick@localhost";

    fn section() -> ConfigSection {
        ConfigSection::new("Stick")
            .with("Type", "Analog")
            .with("Address", ADDRESS)
            .with("Channel", r#"(Id=0,Name=StickX,Description="Stick X")"#)
            .with("Channel", "(Id=2,Name=Throttle,Description=Throttle)")
    }

    fn connected(section: &ConfigSection) -> (AnalogAdapter, LoopbackFeed, LoopbackConnector) {
        let connector = LoopbackConnector::new(Delivery::OnPump);
        let feed = connector.feed(ADDRESS);
        let adapter = AnalogAdapter::configure(DeviceId::new("Stick"), section).unwrap();
        adapter.connect(ADDRESS, &connector).unwrap();
        (adapter, feed, connector)
    }

    fn analog(name: &str, value: f64) -> InputEvent {
        InputEvent::Analog {
            key: Key::new(name),
            value,
        }
    }

    #[test]
    fn test_no_report_emits_nothing() {
        let (adapter, _feed, _connector) = connected(&section());
        let mut events: Vec<InputEvent> = Vec::new();
        adapter.poll(&mut events).unwrap();
        assert!(events.is_empty());
    }

    #[test]
    fn test_unbound_channel_skipped_and_values_repeat() {
        let (adapter, feed, _connector) = connected(&section());
        feed.analog(&[0.5, 0.1, -1.0]).unwrap();

        let mut events: Vec<InputEvent> = Vec::new();
        adapter.poll(&mut events).unwrap();
        assert_eq!(events, vec![analog("StickX", 0.5), analog("Throttle", -1.0)]);

        events.clear();
        adapter.poll(&mut events).unwrap();
        assert_eq!(events, vec![analog("StickX", 0.5), analog("Throttle", -1.0)]);
    }

    #[test]
    fn test_abort_stops_at_unbound_channel() {
        let (adapter, feed, _connector) = connected(&section().with("OnUnknownBinding", "Abort"));
        feed.analog(&[0.5, 0.1, -1.0]).unwrap();

        let mut events: Vec<InputEvent> = Vec::new();
        adapter.poll(&mut events).unwrap();
        assert_eq!(events, vec![analog("StickX", 0.5)]);
    }

    #[test]
    fn test_shorter_report_shrinks_count() {
        let (adapter, feed, _connector) = connected(&section());
        feed.analog(&[0.5, 0.1, -1.0]).unwrap();
        feed.analog(&[0.25]).unwrap();

        let mut events: Vec<InputEvent> = Vec::new();
        adapter.poll(&mut events).unwrap();
        assert_eq!(events, vec![analog("StickX", 0.25)]);
    }

    #[test]
    fn test_oversized_report_is_clamped() {
        let (adapter, feed, _connector) = connected(&section());
        let channels = vec![1.0; CHANNEL_MAX + 10];
        feed.analog(&channels).unwrap();

        let mut events: Vec<InputEvent> = Vec::new();
        adapter.poll(&mut events).unwrap();
        assert_eq!(events, vec![analog("StickX", 1.0), analog("Throttle", 1.0)]);
        assert_eq!(adapter.frame.with(|f| f.count), CHANNEL_MAX);
    }

    #[test]
    fn test_failed_pump_still_emits_channels() {
        let connector = FailingConnector::default();
        let adapter = AnalogAdapter::configure(DeviceId::new("Stick"), &section()).unwrap();
        adapter.connect(ADDRESS, &connector).unwrap();
        connector.analog_handler()(AnalogReport {
            channels: &[0.75, 0.0, 0.5],
        });

        let mut events: Vec<InputEvent> = Vec::new();
        assert!(adapter.poll(&mut events).is_err());
        assert_eq!(events, vec![analog("StickX", 0.75), analog("Throttle", 0.5)]);
    }

    #[test]
    fn test_registers_float_axes() {
        let adapter = AnalogAdapter::configure(DeviceId::new("Stick"), &section()).unwrap();
        let mut keys: Vec<KeyDetails> = Vec::new();
        adapter.register_keys(&mut keys);
        assert_eq!(keys.len(), 2);
        assert!(keys.iter().all(|k| k.kind == KeyKind::FloatAxis));
    }
}
