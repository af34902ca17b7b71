use crate::cell::StateCell;
use crate::config::{
    collect_bindings, index_by_id, parse_drain_order, parse_unknown_binding, BindingSpec,
    ConfigSection, DrainOrder, UnknownBinding,
};
use crate::host::{EventSink, InputEvent, Key, KeyDetails, KeyKind, KeyRegistry};
use crate::protocol::{ButtonHandler, ButtonReport, Connector, Link, LinkState};
use crate::types::{BindingId, DeviceId};
use crate::Result;
use std::collections::{BTreeMap, VecDeque};
use std::sync::Arc;

/// Initial capacity of the per-device event buffer.
const QUEUE_CAPACITY: usize = 16;

/// One press or release received from the protocol layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ButtonEvent {
    pub id: BindingId,
    pub pressed: bool,
}

impl From<ButtonReport> for ButtonEvent {
    fn from(report: ButtonReport) -> Self {
        Self {
            id: BindingId(report.button),
            pressed: report.state == 1,
        }
    }
}

#[derive(Debug, Clone)]
struct ButtonBinding {
    key: Key,
    description: String,
}

/// Adapter for a VRPN button device.
///
/// Callbacks only append to the event buffer. Binding lookup happens at poll
/// time on the polling thread.
pub struct ButtonAdapter {
    id: DeviceId,
    bindings: BTreeMap<BindingId, ButtonBinding>,
    order: DrainOrder,
    on_unknown: UnknownBinding,
    queue: StateCell<Vec<ButtonEvent>>,
    link: Link,
}

impl ButtonAdapter {
    /// Build a disconnected adapter from its config section.
    ///
    /// Fails when the section has no usable `Button` entry.
    pub fn configure(id: DeviceId, section: &ConfigSection) -> Result<Self> {
        let specs = collect_bindings(section, "Button", BindingSpec::parse)?;
        let bindings = index_by_id(
            section,
            specs.into_iter().map(|spec| {
                (
                    spec.id,
                    ButtonBinding {
                        key: Key::new(&spec.name),
                        description: spec.description,
                    },
                )
            }),
        );

        Ok(Self {
            id,
            bindings,
            order: parse_drain_order(section),
            on_unknown: parse_unknown_binding(section),
            queue: StateCell::new(Vec::with_capacity(QUEUE_CAPACITY)),
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
                kind: KeyKind::Gamepad,
            });
        }
    }

    /// Open the remote device and register the change handler.
    pub fn connect(&self, address: &str, connector: &dyn Connector) -> Result<()> {
        if self.link.state() != LinkState::Disconnected {
            log::warn!("[{}] already {:?}, not reconnecting", self.id, self.link.state());
            return Ok(());
        }
        let queue = self.queue.clone();
        let handler: ButtonHandler = Arc::new(move |report: ButtonReport| {
            queue.with(|events| events.push(ButtonEvent::from(report)));
        });
        let remote = connector.open_button(address, handler)?;
        self.link.attach(remote);
        log::info!("[{}] button device connected to {}", self.id, address);
        Ok(())
    }

    /// Pump the connection, then emit every event buffered since the last poll.
    pub fn poll(&self, sink: &mut dyn EventSink) -> Result<()> {
        let (pumped, result) = self.link.pump_frame();
        if !pumped {
            return result;
        }

        let mut pending: VecDeque<ButtonEvent> = self
            .queue
            .with(|events| std::mem::replace(events, Vec::with_capacity(QUEUE_CAPACITY)))
            .into();

        while let Some(event) = next_event(&mut pending, self.order) {
            let Some(binding) = self.bindings.get(&event.id) else {
                log::warn!("[{}] could not find button with id {}", self.id, event.id);
                match self.on_unknown {
                    UnknownBinding::Skip => continue,
                    UnknownBinding::Abort => {
                        self.requeue(std::mem::take(&mut pending));
                        break;
                    }
                }
            };

            let key = binding.key.clone();
            sink.emit(if event.pressed {
                InputEvent::KeyDown(key)
            } else {
                InputEvent::KeyUp(key)
            });
        }
        result
    }

    /// Events buffered and not yet emitted.
    pub fn pending(&self) -> usize {
        self.queue.with(|events| events.len())
    }

    pub fn close(&self) {
        if self.link.state() == LinkState::Connected {
            log::info!("[{}] closing button device", self.id);
        }
        self.link.close();
    }

    /// Put undelivered events back ahead of anything that arrived meanwhile.
    fn requeue(&self, pending: VecDeque<ButtonEvent>) {
        if pending.is_empty() {
            return;
        }
        self.queue.with(|events| {
            let newer = std::mem::take(events);
            events.extend(pending);
            events.extend(newer);
        });
    }
}

impl Drop for ButtonAdapter {
    fn drop(&mut self) {
        self.close();
    }
}

fn next_event(pending: &mut VecDeque<ButtonEvent>, order: DrainOrder) -> Option<ButtonEvent> {
    match order {
        DrainOrder::Fifo => pending.pop_front(),
        DrainOrder::Lifo => pending.pop_back(),
    }
}
