//! Device configuration: parsed key/value sections and the values derived from them.
//!
//! Section syntax and file discovery belong to the host. This module consumes
//! already-split sections and interprets the structured values inside them,
//! e.g. `Button=(Id=3,Name=Trigger,Description="Main trigger")`.

use crate::math::{normalize_or_identity, DQuat, DVec3};
use crate::transform::{Calibration, Smoothing, SmoothingMode};
use crate::types::{BindingId, DeviceId, DeviceKind, Hand};
use crate::{Result, VrpnError};
use std::collections::BTreeMap;

/// One device section: a named, ordered multimap of key to raw value.
///
/// Key lookup ignores ASCII case; values are kept verbatim.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ConfigSection {
    name: String,
    entries: Vec<(String, String)>,
}

impl ConfigSection {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            entries: Vec::new(),
        }
    }

    pub fn from_pairs<K, V>(
        name: impl Into<String>,
        pairs: impl IntoIterator<Item = (K, V)>,
    ) -> Self
    where
        K: Into<String>,
        V: Into<String>,
    {
        let mut section = Self::new(name);
        for (key, value) in pairs {
            section.push(key, value);
        }
        section
    }

    /// Builder form of [`ConfigSection::push`].
    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.push(key, value);
        self
    }

    pub fn push(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.entries.push((key.into(), value.into()));
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// First value stored under `key`.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(key))
            .map(|(_, v)| v.as_str())
    }

    /// Every value stored under `key`, in insertion order.
    pub fn get_all<'a>(&'a self, key: &'a str) -> impl Iterator<Item = &'a str> + 'a {
        self.entries
            .iter()
            .filter(move |(k, _)| k.eq_ignore_ascii_case(key))
            .map(|(_, v)| v.as_str())
    }
}

/// Find `key=` in a structured value and return the token after it.
///
/// The key only matches at the start of the text or after `(`, `,` or
/// whitespace, and never inside a quoted value. Quoted values run to the
/// closing quote; bare values stop at whitespace, `,` or `)`.
pub fn find_value<'a>(text: &'a str, key: &str) -> Option<&'a str> {
    let pattern = format!("{}=", key);
    let mut in_quotes = false;
    let mut previous = None;
    for (start, c) in text.char_indices() {
        if c == '"' {
            in_quotes = !in_quotes;
        } else if !in_quotes
            && previous.map_or(true, |p: char| p == '(' || p == ',' || p.is_whitespace())
            && text
                .get(start..start + pattern.len())
                .is_some_and(|candidate| candidate.eq_ignore_ascii_case(&pattern))
        {
            return Some(read_token(&text[start + pattern.len()..]));
        }
        previous = Some(c);
    }
    None
}

fn read_token(rest: &str) -> &str {
    if let Some(quoted) = rest.strip_prefix('"') {
        return match quoted.find('"') {
            Some(end) => &quoted[..end],
            None => quoted,
        };
    }
    let end = rest
        .find(|c: char| c == ',' || c == ')' || c.is_whitespace())
        .unwrap_or(rest.len());
    &rest[..end]
}

fn find_i32(text: &str, key: &str) -> Option<i32> {
    find_value(text, key)?.parse().ok()
}

fn find_f64(text: &str, key: &str) -> Option<f64> {
    find_value(text, key)?.parse::<f64>().ok().filter(|v| v.is_finite())
}

/// Parse `X=.. Y=.. Z=..`; all three components are required.
pub fn parse_vector(text: &str) -> Option<DVec3> {
    Some(DVec3::new(
        find_f64(text, "X")?,
        find_f64(text, "Y")?,
        find_f64(text, "Z")?,
    ))
}

/// `true`, `yes` and `on` (any case) or a non-zero integer.
pub fn parse_bool(text: &str) -> bool {
    let v = text.trim();
    if ["true", "yes", "on"].iter().any(|t| v.eq_ignore_ascii_case(t)) {
        return true;
    }
    v.parse::<i64>().map_or(false, |n| n != 0)
}

/// Id, name and description of one button, sensor or channel.
#[derive(Debug, Clone, PartialEq)]
pub struct BindingSpec {
    pub id: BindingId,
    pub name: String,
    pub description: String,
}

impl BindingSpec {
    /// Parse `(Id=#,Name=String,Description=String)`.
    pub fn parse(value: &str) -> Option<BindingSpec> {
        Some(BindingSpec {
            id: BindingId(find_i32(value, "Id")?),
            name: find_value(value, "Name")?.to_string(),
            description: find_value(value, "Description")?.to_string(),
        })
    }
}

/// A tracker sensor binding, optionally exposed as a motion controller.
#[derive(Debug, Clone, PartialEq)]
pub struct TrackerBindingSpec {
    pub binding: BindingSpec,
    /// Player index when this sensor is a motion-controller pose source.
    pub player: Option<u32>,
    pub hand: Hand,
}

impl TrackerBindingSpec {
    /// Parse a binding with optional `PlayerId=#` and `Hand=Left|Right`.
    pub fn parse(value: &str) -> Option<TrackerBindingSpec> {
        let binding = BindingSpec::parse(value)?;
        let player = find_i32(value, "PlayerId").and_then(|p| u32::try_from(p).ok());
        let hand = match player {
            Some(_) if find_value(value, "Hand") == Some("Right") => Hand::Right,
            _ => Hand::Left,
        };
        Some(TrackerBindingSpec {
            binding,
            player,
            hand,
        })
    }
}

/// Collect the bindings stored under `key`, skipping malformed entries.
pub(crate) fn collect_bindings<T>(
    section: &ConfigSection,
    key: &'static str,
    parse: impl Fn(&str) -> Option<T>,
) -> Result<Vec<T>> {
    let mut found = 0usize;
    let mut bindings = Vec::new();
    for value in section.get_all(key) {
        found += 1;
        match parse(value) {
            Some(binding) => bindings.push(binding),
            None => log::warn!(
                "[{}] could not parse {} = {}. Expected: {} = (Id=#,Name=String,Description=String)",
                section.name(),
                key,
                value,
                key
            ),
        }
    }

    if found == 0 {
        log::warn!(
            "[{}] has no {} mappings specified. Expected field {}",
            section.name(),
            key,
            key
        );
    }
    if bindings.is_empty() {
        return Err(VrpnError::NoBindings {
            section: section.name().to_string(),
            key,
        });
    }
    Ok(bindings)
}

/// Key bindings by id. A repeated id replaces the earlier entry.
pub(crate) fn index_by_id<T>(
    section: &ConfigSection,
    items: impl IntoIterator<Item = (BindingId, T)>,
) -> BTreeMap<BindingId, T> {
    let mut map = BTreeMap::new();
    for (id, item) in items {
        if map.insert(id, item).is_some() {
            log::warn!("[{}] id {} bound twice, keeping the last one", section.name(), id);
        }
    }
    map
}

/// Order in which a poll emits the button events buffered since the last poll.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DrainOrder {
    /// Oldest first.
    #[default]
    Fifo,
    /// Newest first.
    Lifo,
}

/// What a poll does after meeting an id with no binding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum UnknownBinding {
    /// Drop that event and keep going.
    #[default]
    Skip,
    /// Drop that event and stop emitting for this poll.
    Abort,
}

fn parse_choice<T: Copy + Default>(
    section: &ConfigSection,
    key: &str,
    choices: &[(&str, T)],
) -> T {
    let Some(value) = section.get(key) else {
        return T::default();
    };
    let value = value.trim();
    match choices.iter().find(|(name, _)| value.eq_ignore_ascii_case(name)) {
        Some((_, choice)) => *choice,
        None => {
            log::warn!(
                "[{}] unknown {} value '{}', using {}",
                section.name(),
                key,
                value,
                choices[0].0
            );
            T::default()
        }
    }
}

pub fn parse_drain_order(section: &ConfigSection) -> DrainOrder {
    parse_choice(
        section,
        "DrainOrder",
        &[("Fifo", DrainOrder::Fifo), ("Lifo", DrainOrder::Lifo)],
    )
}

pub fn parse_unknown_binding(section: &ConfigSection) -> UnknownBinding {
    parse_choice(
        section,
        "OnUnknownBinding",
        &[("Skip", UnknownBinding::Skip), ("Abort", UnknownBinding::Abort)],
    )
}

pub fn parse_smoothing(section: &ConfigSection) -> Smoothing {
    let mode = parse_choice(
        section,
        "OrientationSmoothing",
        &[("Discard", SmoothingMode::Discard), ("Apply", SmoothingMode::Apply)],
    );
    let mut smoothing = Smoothing {
        mode,
        ..Smoothing::default()
    };
    if let Some(value) = section.get("SmoothingAlpha") {
        match value.trim().parse::<f64>() {
            Ok(alpha) if alpha.is_finite() => smoothing.alpha = alpha.clamp(0.0, 1.0),
            _ => log::warn!(
                "[{}] SmoothingAlpha '{}' is not a number, using {}",
                section.name(),
                value,
                smoothing.alpha
            ),
        }
    }
    smoothing
}

/// Tracker calibration with the defaults applied for absent or malformed keys.
pub fn parse_calibration(section: &ConfigSection) -> Calibration {
    let name = section.name();

    let rotation_offset = match section.get("RotationOffset") {
        Some(value) => {
            let axis = parse_vector(value).and_then(DVec3::try_normalize);
            match (axis, find_f64(value, "Angle")) {
                (Some(axis), Some(degrees)) => {
                    normalize_or_identity(DQuat::from_axis_angle(axis, degrees.to_radians()))
                }
                _ => {
                    log::info!(
                        "[{}] expected RotationOffset as X=,Y=,Z= axis and Angle= in degrees; using identity",
                        name
                    );
                    DQuat::IDENTITY
                }
            }
        }
        None => {
            log::info!("[{}] no RotationOffset, using identity", name);
            DQuat::IDENTITY
        }
    };

    let translation_offset = match section.get("PositionOffset").and_then(parse_vector) {
        Some(offset) => offset,
        None => {
            log::info!(
                "[{}] expected PositionOffset as X=,Y=,Z= (device coordinates); using (0,0,0)",
                name
            );
            DVec3::ZERO
        }
    };

    let unit_scale = match section.get("TrackerUnitsToUE4Units") {
        Some(value) => match value.trim().parse::<f64>() {
            Ok(scale) if scale.is_finite() && scale > 0.0 => scale,
            _ => {
                log::warn!(
                    "[{}] TrackerUnitsToUE4Units '{}' must be a positive number, using 1.0",
                    name,
                    value
                );
                1.0
            }
        },
        None => {
            log::warn!("[{}] no TrackerUnitsToUE4Units, using 1.0", name);
            1.0
        }
    };

    let flip_z = match section.get("FlipZAxis") {
        Some(value) => parse_bool(value),
        None => {
            log::warn!("[{}] no FlipZAxis, using false", name);
            false
        }
    };

    Calibration::new(translation_offset, rotation_offset, unit_scale, flip_z)
        .with_smoothing(parse_smoothing(section))
}

/// Identity of one configured device: section name, kind and address.
#[derive(Debug, Clone, PartialEq)]
pub struct DeviceSpec {
    pub id: DeviceId,
    pub kind: DeviceKind,
    pub address: String,
}

impl DeviceSpec {
    pub fn parse(section: &ConfigSection) -> Result<DeviceSpec> {
        let missing = |key| VrpnError::MissingKey {
            section: section.name().to_string(),
            key,
        };
        let kind_value = section.get("Type").ok_or_else(|| missing("Type"))?;
        let address = section.get("Address").ok_or_else(|| missing("Address"))?;
        let kind =
            DeviceKind::parse(kind_value).ok_or_else(|| VrpnError::UnknownDeviceType {
                section: section.name().to_string(),
                found: kind_value.to_string(),
            })?;
        Ok(DeviceSpec {
            id: DeviceId::new(section.name()),
            kind,
            address: address.trim().to_string(),
        })
    }
}

/// Which configured devices open a network connection.
///
/// An empty filter enables every device. Disabled devices are still configured
/// and still register their keys with the host.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DeviceFilter {
    names: Vec<String>,
}

impl DeviceFilter {
    pub fn all() -> Self {
        Self::default()
    }

    /// Parse a comma-separated list of section names.
    pub fn parse(list: &str) -> Self {
        Self {
            names: list
                .split(',')
                .map(str::trim)
                .filter(|name| !name.is_empty())
                .map(str::to_string)
                .collect(),
        }
    }

    pub fn allows(&self, device: &str) -> bool {
        self.names.is_empty() || self.names.iter().any(|n| n.eq_ignore_ascii_case(device))
    }
}

/// Process-level options supplied by the host.
#[derive(Debug, Clone, PartialEq)]
pub struct Settings {
    pub enabled: DeviceFilter,
    /// World-to-host scale folded into every tracker's unit scale.
    pub world_scale: f64,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            enabled: DeviceFilter::all(),
            world_scale: 1.0,
        }
    }
}

impl Settings {
    /// Read `VRPN_ENABLED_DEVICES` and `VRPN_WORLD_SCALE`.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        let enabled = read_env_string("VRPN_ENABLED_DEVICES")
            .map(|list| DeviceFilter::parse(&list))
            .unwrap_or(defaults.enabled);
        let world_scale = read_env_f64("VRPN_WORLD_SCALE")
            .filter(|s| *s > 0.0)
            .unwrap_or(defaults.world_scale);
        log::info!(
            "VRPN settings: enabledDevices={:?} worldScale={}",
            enabled.names,
            world_scale
        );
        Self {
            enabled,
            world_scale,
        }
    }
}

fn read_env_string(name: &str) -> Option<String> {
    std::env::var(name)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn read_env_f64(name: &str) -> Option<f64> {
    read_env_string(name)
        .and_then(|v| v.parse::<f64>().ok())
        .filter(|v| v.is_finite())
}
