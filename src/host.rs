//! Boundary to the host application's input system.

use std::fmt;
use std::sync::Arc;

/// Host-facing input key name, cheap to clone into events.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Key(Arc<str>);

impl Key {
    pub fn new(name: &str) -> Self {
        Self(Arc::from(name))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyKind {
    /// Digital press/release key.
    Gamepad,
    /// Scalar axis.
    FloatAxis,
}

/// Announcement of one output key, made before any event references it.
#[derive(Debug, Clone, PartialEq)]
pub struct KeyDetails {
    pub key: Key,
    pub description: String,
    pub kind: KeyKind,
}

#[derive(Debug, Clone, PartialEq)]
pub enum InputEvent {
    KeyDown(Key),
    KeyUp(Key),
    Analog { key: Key, value: f64 },
}

impl InputEvent {
    pub fn key(&self) -> &Key {
        match self {
            InputEvent::KeyDown(key) | InputEvent::KeyUp(key) => key,
            InputEvent::Analog { key, .. } => key,
        }
    }
}

/// Receives per-frame input events.
pub trait EventSink {
    fn emit(&mut self, event: InputEvent);
}

/// Receives key registrations at setup time.
pub trait KeyRegistry {
    fn add_key(&mut self, details: KeyDetails);
}

impl EventSink for Vec<InputEvent> {
    fn emit(&mut self, event: InputEvent) {
        self.push(event);
    }
}

impl KeyRegistry for Vec<KeyDetails> {
    fn add_key(&mut self, details: KeyDetails) {
        self.push(details);
    }
}
