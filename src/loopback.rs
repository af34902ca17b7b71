//! In-process protocol backend.
//!
//! Reports are queued per address on bounded channels and delivered to the
//! registered handler either inside `mainloop` or from a dedicated delivery
//! thread, which mimics a protocol layer that calls back off-thread.

use crate::protocol::{
    AnalogHandler, AnalogReport, ButtonHandler, ButtonReport, Connector, Remote, TrackerHandler,
    TrackerReport,
};
use crate::{Result, VrpnError};
use crossbeam_channel::{Receiver, Sender};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

/// Reports buffered per address before new ones are rejected.
pub const QUEUE_DEPTH: usize = 256;

/// How often a delivery thread checks its stop flag.
const STOP_POLL_INTERVAL: Duration = Duration::from_millis(100);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    /// Handlers run synchronously inside `mainloop`.
    OnPump,
    /// Handlers run on one background thread per connection.
    Background,
}

#[derive(Debug, Clone)]
enum Report {
    Button(ButtonReport),
    Tracker(TrackerReport),
    Analog(Vec<f64>),
}

#[derive(Default)]
struct EndpointStats {
    pumps: AtomicUsize,
    opens: AtomicUsize,
}

struct Endpoint {
    sender: Sender<Report>,
    receiver: Receiver<Report>,
    stats: Arc<EndpointStats>,
}

impl Endpoint {
    fn new() -> Self {
        let (sender, receiver) = crossbeam_channel::bounded(QUEUE_DEPTH);
        Self {
            sender,
            receiver,
            stats: Arc::new(EndpointStats::default()),
        }
    }
}

enum Handler {
    Button(ButtonHandler),
    Tracker(TrackerHandler),
    Analog(AnalogHandler),
}

impl Handler {
    fn dispatch(&self, report: Report, address: &str) {
        match (self, report) {
            (Handler::Button(h), Report::Button(r)) => h(r),
            (Handler::Tracker(h), Report::Tracker(r)) => h(r),
            (Handler::Analog(h), Report::Analog(channels)) => h(AnalogReport {
                channels: &channels,
            }),
            (_, report) => {
                log::warn!("{}: dropping {:?}, no matching handler", address, report);
            }
        }
    }
}

/// [`Connector`] backed by in-process channels.
pub struct LoopbackConnector {
    delivery: Delivery,
    endpoints: Mutex<HashMap<String, Endpoint>>,
}

impl LoopbackConnector {
    pub fn new(delivery: Delivery) -> Self {
        Self {
            delivery,
            endpoints: Mutex::new(HashMap::new()),
        }
    }

    /// Sending side for `address`. Reports sent before the device connects are
    /// delivered once it does.
    pub fn feed(&self, address: &str) -> LoopbackFeed {
        let mut endpoints = self.endpoints.lock().unwrap_or_else(PoisonError::into_inner);
        let endpoint = endpoints
            .entry(address.to_string())
            .or_insert_with(Endpoint::new);
        LoopbackFeed {
            address: address.to_string(),
            sender: endpoint.sender.clone(),
            stats: endpoint.stats.clone(),
        }
    }

    fn open(&self, address: &str, handler: Handler) -> Result<Box<dyn Remote>> {
        let (receiver, stats) = {
            let mut endpoints = self.endpoints.lock().unwrap_or_else(PoisonError::into_inner);
            let endpoint = endpoints
                .entry(address.to_string())
                .or_insert_with(Endpoint::new);
            (endpoint.receiver.clone(), endpoint.stats.clone())
        };
        stats.opens.fetch_add(1, Ordering::SeqCst);
        log::info!("Loopback connection to {} ({:?})", address, self.delivery);

        match self.delivery {
            Delivery::OnPump => Ok(Box::new(PumpedRemote {
                address: address.to_string(),
                receiver,
                handler,
                stats,
            })),
            Delivery::Background => {
                let remote = ThreadedRemote::start(address, receiver, handler, stats)?;
                Ok(Box::new(remote))
            }
        }
    }
}

impl Connector for LoopbackConnector {
    fn open_button(&self, address: &str, handler: ButtonHandler) -> Result<Box<dyn Remote>> {
        self.open(address, Handler::Button(handler))
    }

    fn open_tracker(&self, address: &str, handler: TrackerHandler) -> Result<Box<dyn Remote>> {
        self.open(address, Handler::Tracker(handler))
    }

    fn open_analog(&self, address: &str, handler: AnalogHandler) -> Result<Box<dyn Remote>> {
        self.open(address, Handler::Analog(handler))
    }
}

/// Sends reports to one loopback address.
#[derive(Clone)]
pub struct LoopbackFeed {
    address: String,
    sender: Sender<Report>,
    stats: Arc<EndpointStats>,
}

impl LoopbackFeed {
    pub fn button(&self, button: i32, state: i32) -> Result<()> {
        self.send(Report::Button(ButtonReport { button, state }))
    }

    pub fn tracker(&self, sensor: i32, pos: [f64; 3], quat: [f64; 4]) -> Result<()> {
        self.send(Report::Tracker(TrackerReport { sensor, pos, quat }))
    }

    pub fn analog(&self, channels: &[f64]) -> Result<()> {
        self.send(Report::Analog(channels.to_vec()))
    }

    /// Number of `mainloop` calls made by connections to this address.
    pub fn pump_count(&self) -> usize {
        self.stats.pumps.load(Ordering::SeqCst)
    }

    /// Number of connections opened to this address.
    pub fn open_count(&self) -> usize {
        self.stats.opens.load(Ordering::SeqCst)
    }

    fn send(&self, report: Report) -> Result<()> {
        self.sender.try_send(report).map_err(|e| match e {
            crossbeam_channel::TrySendError::Full(_) => {
                log::trace!("{}: loopback queue full, dropping report", self.address);
                VrpnError::QueueFull(self.address.clone())
            }
            crossbeam_channel::TrySendError::Disconnected(_) => VrpnError::ChannelDisconnected,
        })
    }
}

struct PumpedRemote {
    address: String,
    receiver: Receiver<Report>,
    handler: Handler,
    stats: Arc<EndpointStats>,
}

impl Remote for PumpedRemote {
    fn mainloop(&mut self) -> Result<()> {
        self.stats.pumps.fetch_add(1, Ordering::SeqCst);
        // Bounded by what is queued now so a busy sender cannot stall the pump.
        for _ in 0..self.receiver.len() {
            match self.receiver.try_recv() {
                Ok(report) => self.handler.dispatch(report, &self.address),
                Err(_) => break,
            }
        }
        Ok(())
    }
}

struct ThreadedRemote {
    stats: Arc<EndpointStats>,
    stop_flag: Arc<AtomicBool>,
    thread: Option<std::thread::JoinHandle<()>>,
}

impl ThreadedRemote {
    fn start(
        address: &str,
        receiver: Receiver<Report>,
        handler: Handler,
        stats: Arc<EndpointStats>,
    ) -> Result<ThreadedRemote> {
        let stop_flag = Arc::new(AtomicBool::new(false));
        let stop_clone = stop_flag.clone();
        let thread_address = address.to_string();

        let thread = std::thread::Builder::new()
            .name(format!("vrpn-loopback-{}", address))
            .spawn(move || {
                delivery_loop(&thread_address, receiver, handler, stop_clone);
            })
            .map_err(|e| VrpnError::Connect {
                address: address.to_string(),
                reason: format!("Failed to spawn delivery thread: {}", e),
            })?;

        Ok(ThreadedRemote {
            stats,
            stop_flag,
            thread: Some(thread),
        })
    }

    fn shutdown(&mut self) {
        self.stop_flag.store(true, Ordering::Relaxed);
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
    }
}

impl Remote for ThreadedRemote {
    fn mainloop(&mut self) -> Result<()> {
        self.stats.pumps.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

impl Drop for ThreadedRemote {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn delivery_loop(
    address: &str,
    receiver: Receiver<Report>,
    handler: Handler,
    stop_flag: Arc<AtomicBool>,
) {
    log::info!("Loopback delivery for {} started", address);

    loop {
        if stop_flag.load(Ordering::Relaxed) {
            log::info!("Loopback delivery for {} stopping (stop flag set)", address);
            break;
        }

        match receiver.recv_timeout(STOP_POLL_INTERVAL) {
            Ok(report) => handler.dispatch(report, address),
            Err(crossbeam_channel::RecvTimeoutError::Timeout) => continue,
            Err(crossbeam_channel::RecvTimeoutError::Disconnected) => {
                log::info!("Loopback feed for {} disconnected, stopping", address);
                break;
            }
        }
    }
}
