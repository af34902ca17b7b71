use crate::math::{DQuat, DVec3, Rotator};
use std::fmt;

/// Protocol-native button, sensor or channel index within one device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BindingId(pub i32);

impl fmt::Display for BindingId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Name of one configured device instance (its config section name).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DeviceId(String);

impl DeviceId {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DeviceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// The three supported VRPN device kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceKind {
    Tracker,
    Button,
    Analog,
}

impl DeviceKind {
    /// Exact, case-sensitive match of a config `Type` value.
    pub fn parse(value: &str) -> Option<DeviceKind> {
        match value {
            "Tracker" => Some(DeviceKind::Tracker),
            "Button" => Some(DeviceKind::Button),
            "Analog" => Some(DeviceKind::Analog),
            _ => None,
        }
    }
}

impl fmt::Display for DeviceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            DeviceKind::Tracker => "Tracker",
            DeviceKind::Button => "Button",
            DeviceKind::Analog => "Analog",
        })
    }
}

/// Which hand a motion-controller binding represents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Hand {
    #[default]
    Left,
    Right,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrackingStatus {
    NotTracked,
    Tracked,
}

/// Latest calibrated pose of one motion-controller binding.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ControllerPose {
    pub position: DVec3,
    pub orientation: DQuat,
    pub rotator: Rotator,
}
