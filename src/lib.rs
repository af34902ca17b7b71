//! # vrpn-input - VRPN devices as host input
//!
//! Bridges VRPN tracker, button and analog devices into a host input system.
//! Provides:
//! - Per-device adapters that buffer protocol callbacks and drain them once per frame
//! - Tracker calibration (offset, rotation, unit scale, Z flip) and pose queries
//! - Registry construction from named configuration sections
//! - An in-process loopback protocol backend for tests and demos
//!
//! ## Quick Start
//! ```no_run
//! use vrpn_input::{
//!     ConfigSection, Delivery, InputEvent, KeyDetails, LoopbackConnector, Registry, Settings,
//! };
//!
//! let sections = vec![ConfigSection::new("Pad")
//!     .with("Type", "Button")
//!     .with("Address", "Pad@localhost")
//!     .with("Button", r#"(Id=0,Name=Fire,Description="Fire button")"#)];
//!
//! let connector = LoopbackConnector::new(Delivery::OnPump);
//! let feed = connector.feed("Pad@localhost");
//! let mut keys: Vec<KeyDetails> = Vec::new();
//! let registry = Registry::from_sections(&sections, &Settings::from_env(), &connector, &mut keys);
//!
//! feed.button(0, 1).unwrap();
//! let mut events: Vec<InputEvent> = Vec::new();
//! registry.poll_all(&mut events);
//! println!("{:?}", events);
//! ```

pub mod error;
pub mod math;
pub mod types;
pub mod transform;
pub mod cell;
pub mod protocol;
pub mod loopback;
pub mod host;
pub mod config;
pub mod button;
pub mod tracker;
pub mod analog;
pub mod device;
pub mod registry;

pub use config::{ConfigSection, DeviceFilter, Settings};
pub use device::Device;
pub use error::VrpnError;
pub use host::{EventSink, InputEvent, Key, KeyDetails, KeyKind, KeyRegistry};
pub use loopback::{Delivery, LoopbackConnector, LoopbackFeed};
pub use protocol::{Connector, LinkState, Remote};
pub use registry::{PollSummary, Registry};
pub use types::*;

/// Result type alias for vrpn-input operations.
pub type Result<T> = std::result::Result<T, VrpnError>;
