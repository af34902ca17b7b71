/// Errors produced while configuring, connecting or pumping VRPN devices.
#[derive(Debug, thiserror::Error)]
pub enum VrpnError {
    #[error("section [{section}]: expected to find {key}")]
    MissingKey { section: String, key: &'static str },

    #[error("section [{section}]: Type should be Tracker, Button or Analog but found {found}")]
    UnknownDeviceType { section: String, found: String },

    #[error("section [{section}]: no usable {key} mappings")]
    NoBindings { section: String, key: &'static str },

    #[error("Failed to connect to {address}: {reason}")]
    Connect { address: String, reason: String },

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Report queue full for {0}")]
    QueueFull(String),

    #[error("Channel disconnected")]
    ChannelDisconnected,
}
