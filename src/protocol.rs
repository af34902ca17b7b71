//! Boundary to the device-protocol layer.
//!
//! The protocol layer owns the wire format and transport. It hands this crate
//! decoded reports through registered callbacks and exposes a `mainloop` pump.

use crate::Result;
use std::sync::{Arc, Mutex, PoisonError};

/// Maximum number of analog channels in one report.
pub const CHANNEL_MAX: usize = 128;

/// Button state change. `state == 1` means pressed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ButtonReport {
    pub button: i32,
    pub state: i32,
}

/// One tracker sensor update. `quat` is ordered `[x, y, z, w]`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TrackerReport {
    pub sensor: i32,
    pub pos: [f64; 3],
    pub quat: [f64; 4],
}

/// All channels of an analog device, delivered together.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AnalogReport<'a> {
    pub channels: &'a [f64],
}

/// Callbacks may run inside [`Remote::mainloop`] or on a protocol-owned thread.
pub type ButtonHandler = Arc<dyn Fn(ButtonReport) + Send + Sync>;
pub type TrackerHandler = Arc<dyn Fn(TrackerReport) + Send + Sync>;
pub type AnalogHandler = Arc<dyn for<'a> Fn(AnalogReport<'a>) + Send + Sync>;

/// An open connection to one remote device.
pub trait Remote: Send {
    /// Advance the connection's network and event processing by one step.
    /// Must not block indefinitely.
    fn mainloop(&mut self) -> Result<()>;
}

/// Opens remote device connections and registers their change handlers.
pub trait Connector {
    fn open_button(&self, address: &str, handler: ButtonHandler) -> Result<Box<dyn Remote>>;
    fn open_tracker(&self, address: &str, handler: TrackerHandler) -> Result<Box<dyn Remote>>;
    fn open_analog(&self, address: &str, handler: AnalogHandler) -> Result<Box<dyn Remote>>;
}

/// Connection lifecycle of an adapter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkState {
    Disconnected,
    Connected,
    Closed,
}

struct LinkInner {
    state: LinkState,
    remote: Option<Box<dyn Remote>>,
}

/// Per-device owner of the remote handle.
///
/// Pumping is serialized by the link's own lock, which is independent from the
/// device state lock, so the frame-poll path and the pose-query path can both
/// pump in the same frame.
pub struct Link {
    inner: Mutex<LinkInner>,
}

impl Link {
    pub fn disconnected() -> Self {
        Self {
            inner: Mutex::new(LinkInner {
                state: LinkState::Disconnected,
                remote: None,
            }),
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, LinkInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn state(&self) -> LinkState {
        self.lock().state
    }

    /// Install a freshly opened remote. Ignored once the link is closed.
    pub fn attach(&self, remote: Box<dyn Remote>) {
        let mut inner = self.lock();
        if inner.state == LinkState::Closed {
            log::warn!("Ignoring remote attached to a closed link");
            return;
        }
        inner.remote = Some(remote);
        inner.state = LinkState::Connected;
    }

    /// Pump the remote once. Returns `Ok(false)` when there is nothing to pump.
    pub fn pump(&self) -> Result<bool> {
        let mut inner = self.lock();
        match inner.remote.as_mut() {
            Some(remote) => remote.mainloop().map(|_| true),
            None => Ok(false),
        }
    }

    /// Pump the remote for one host frame. The flag is set whenever a remote
    /// was pumped, even if its mainloop failed, so state it already delivered
    /// can still be drained.
    pub fn pump_frame(&self) -> (bool, Result<()>) {
        let mut inner = self.lock();
        match inner.remote.as_mut() {
            Some(remote) => (true, remote.mainloop()),
            None => (false, Ok(())),
        }
    }

    /// Drop the remote. The link stays closed afterwards.
    pub fn close(&self) {
        let remote = {
            let mut inner = self.lock();
            inner.state = LinkState::Closed;
            inner.remote.take()
        };
        // Dropped outside the lock; a remote may join its own threads.
        drop(remote);
    }
}

/// Connector whose remotes fail every pump. It keeps the registered handlers
/// so tests can deliver reports from outside `mainloop`, as a protocol layer
/// with its own threads would.
#[cfg(test)]
#[derive(Default)]
pub(crate) struct FailingConnector {
    button: Mutex<Option<ButtonHandler>>,
    tracker: Mutex<Option<TrackerHandler>>,
    analog: Mutex<Option<AnalogHandler>>,
}

#[cfg(test)]
struct FailingRemote;

#[cfg(test)]
impl Remote for FailingRemote {
    fn mainloop(&mut self) -> Result<()> {
        Err(crate::VrpnError::Transport("connection reset".into()))
    }
}

#[cfg(test)]
impl FailingConnector {
    pub fn button_handler(&self) -> ButtonHandler {
        self.button.lock().unwrap().clone().expect("button device not opened")
    }

    pub fn tracker_handler(&self) -> TrackerHandler {
        self.tracker.lock().unwrap().clone().expect("tracker device not opened")
    }

    pub fn analog_handler(&self) -> AnalogHandler {
        self.analog.lock().unwrap().clone().expect("analog device not opened")
    }
}

#[cfg(test)]
impl Connector for FailingConnector {
    fn open_button(&self, _address: &str, handler: ButtonHandler) -> Result<Box<dyn Remote>> {
        *self.button.lock().unwrap() = Some(handler);
        Ok(Box::new(FailingRemote))
    }

    fn open_tracker(&self, _address: &str, handler: TrackerHandler) -> Result<Box<dyn Remote>> {
        *self.tracker.lock().unwrap() = Some(handler);
        Ok(Box::new(FailingRemote))
    }

    fn open_analog(&self, _address: &str, handler: AnalogHandler) -> Result<Box<dyn Remote>> {
        *self.analog.lock().unwrap() = Some(handler);
        Ok(Box::new(FailingRemote))
    }
}
