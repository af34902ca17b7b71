use crate::cell::StateCell;
use crate::config::{
    collect_bindings, index_by_id, parse_calibration, ConfigSection, TrackerBindingSpec,
};
use crate::host::{EventSink, InputEvent, Key, KeyDetails, KeyKind, KeyRegistry};
use crate::math::{DQuat, DVec3, Rotator};
use crate::protocol::{Connector, Link, LinkState, TrackerHandler, TrackerReport};
use crate::transform::{transform, Calibration, SmoothingMode};
use crate::types::{BindingId, ControllerPose, DeviceId, Hand, TrackingStatus};
use crate::Result;
use std::collections::BTreeMap;
use std::sync::Arc;

/// Suffixes of the six axis keys, paired with their descriptions.
const AXES: [(&str, &str); 6] = [
    ("MotionX", "X position"),
    ("MotionY", "Y position"),
    ("MotionZ", "Z position"),
    ("RotationYaw", "Yaw"),
    ("RotationPitch", "Pitch"),
    ("RotationRoll", "Roll"),
];

#[derive(Debug, Clone)]
struct TrackerBinding {
    keys: [Key; 6],
    descriptions: [String; 6],
    player: Option<u32>,
    hand: Hand,
}

impl TrackerBinding {
    fn from_spec(spec: &TrackerBindingSpec) -> Self {
        let name = &spec.binding.name;
        Self {
            keys: AXES.map(|(suffix, _)| Key::new(&format!("{}{}", name, suffix))),
            descriptions: AXES.map(|(_, label)| format!("{} {}", name, label)),
            player: spec.player,
            hand: spec.hand,
        }
    }

    fn matches(&self, player: u32, hand: Hand) -> bool {
        self.player == Some(player) && self.hand == hand
    }
}

/// Latest raw sample for one sensor.
#[derive(Debug, Clone, Copy, PartialEq)]
struct TrackerSample {
    position: DVec3,
    /// Raw orientation, the value of record.
    orientation: DQuat,
    /// Only maintained under [`SmoothingMode::Apply`].
    smoothed: DQuat,
    /// Set by the callback, cleared by the next poll.
    dirty: bool,
}

impl Default for TrackerSample {
    fn default() -> Self {
        Self {
            position: DVec3::ZERO,
            orientation: DQuat::IDENTITY,
            smoothed: DQuat::IDENTITY,
            dirty: false,
        }
    }
}

impl TrackerSample {
    fn record(&mut self, report: &TrackerReport, calib: &Calibration) {
        self.position = DVec3::from_array(report.pos);
        self.orientation = DQuat::from_array(report.quat);
        if calib.smoothing.mode == SmoothingMode::Apply {
            self.smoothed = DQuat::slerp(self.smoothed, self.orientation, calib.smoothing.alpha);
        }
        self.dirty = true;
    }

    /// Orientation used for per-frame emission.
    fn emitted_orientation(&self, calib: &Calibration) -> DQuat {
        match calib.smoothing.mode {
            SmoothingMode::Discard => self.orientation,
            SmoothingMode::Apply => self.smoothed,
        }
    }
}

/// Adapter for a VRPN tracker device.
///
/// Each binding emits six float axes per fresh sample. Bindings with a
/// `PlayerId` also serve motion-controller pose queries.
pub struct TrackerAdapter {
    id: DeviceId,
    bindings: BTreeMap<BindingId, TrackerBinding>,
    calibration: Calibration,
    samples: StateCell<BTreeMap<BindingId, TrackerSample>>,
    link: Link,
}

impl TrackerAdapter {
    /// Build a disconnected adapter. `world_scale` is folded into the unit scale.
    pub fn configure(id: DeviceId, section: &ConfigSection, world_scale: f64) -> Result<Self> {
        let specs = collect_bindings(section, "Tracker", TrackerBindingSpec::parse)?;
        let bindings = index_by_id(
            section,
            specs
                .iter()
                .map(|spec| (spec.binding.id, TrackerBinding::from_spec(spec))),
        );
        for (sensor, binding) in &bindings {
            if let Some(player) = binding.player {
                log::info!(
                    "[{}] found motion controller: sensor {} player {} hand {:?}",
                    id,
                    sensor,
                    player,
                    binding.hand
                );
            }
        }

        let calibration = parse_calibration(section).with_world_scale(world_scale);
        let samples = bindings
            .keys()
            .map(|sensor| (*sensor, TrackerSample::default()))
            .collect();

        Ok(Self {
            id,
            bindings,
            calibration,
            samples: StateCell::new(samples),
            link: Link::disconnected(),
        })
    }

    pub fn id(&self) -> &DeviceId {
        &self.id
    }

    pub fn link_state(&self) -> LinkState {
        self.link.state()
    }

    pub fn calibration(&self) -> &Calibration {
        &self.calibration
    }

    pub fn has_motion_controllers(&self) -> bool {
        self.bindings.values().any(|b| b.player.is_some())
    }

    pub fn register_keys(&self, keys: &mut dyn KeyRegistry) {
        for binding in self.bindings.values() {
            for (key, description) in binding.keys.iter().zip(&binding.descriptions) {
                keys.add_key(KeyDetails {
                    key: key.clone(),
                    description: description.clone(),
                    kind: KeyKind::FloatAxis,
                });
            }
        }
    }

    pub fn connect(&self, address: &str, connector: &dyn Connector) -> Result<()> {
        if self.link.state() != LinkState::Disconnected {
            log::warn!("[{}] already {:?}, not reconnecting", self.id, self.link.state());
            return Ok(());
        }
        let samples = self.samples.clone();
        let calibration = self.calibration;
        let device = self.id.clone();
        let handler: TrackerHandler = Arc::new(move |report: TrackerReport| {
            let stored = samples.with(|samples| match samples.get_mut(&BindingId(report.sensor)) {
                Some(sample) => {
                    sample.record(&report, &calibration);
                    true
                }
                None => false,
            });
            if !stored {
                log::warn!("[{}] could not find tracker with id {}", device, report.sensor);
            }
        });
        let remote = connector.open_tracker(address, handler)?;
        self.link.attach(remote);
        log::info!("[{}] tracker device connected to {}", self.id, address);
        Ok(())
    }

    /// Pump, then emit the six axes of every sensor updated since the last poll.
    pub fn poll(&self, sink: &mut dyn EventSink) -> Result<()> {
        let (pumped, result) = self.link.pump_frame();
        if !pumped {
            return result;
        }

        let fresh: Vec<(BindingId, TrackerSample)> = self.samples.with(|samples| {
            samples
                .iter_mut()
                .filter(|(_, sample)| sample.dirty)
                .map(|(sensor, sample)| {
                    sample.dirty = false;
                    (*sensor, *sample)
                })
                .collect()
        });

        for (sensor, sample) in fresh {
            let Some(binding) = self.bindings.get(&sensor) else {
                continue;
            };
            let orientation = sample.emitted_orientation(&self.calibration);
            let (position, orientation) =
                transform(sample.position, orientation, &self.calibration);
            let rotator = Rotator::from_quat(orientation);
            let values = [
                position.x,
                position.y,
                position.z,
                rotator.yaw,
                rotator.pitch,
                rotator.roll,
            ];
            for (key, value) in binding.keys.iter().zip(values) {
                sink.emit(InputEvent::Analog {
                    key: key.clone(),
                    value,
                });
            }
        }
        result
    }

    /// Calibrated pose of the binding assigned to `player` and `hand`.
    ///
    /// Pumps the connection first so the answer is as fresh as possible. A
    /// failed pump is logged and the last known sample is used.
    pub fn controller_pose(&self, player: u32, hand: Hand) -> Option<ControllerPose> {
        let sensor = self.find_controller(player, hand)?;

        if let Err(e) = self.link.pump() {
            log::warn!("[{}] pump failed during pose query: {}", self.id, e);
        }

        // Pose queries read the raw orientation whatever the smoothing mode.
        let sample = self.samples.with(|samples| samples.get(&sensor).copied())?;
        let (position, orientation) =
            transform(sample.position, sample.orientation, &self.calibration);
        Some(ControllerPose {
            position,
            orientation,
            rotator: Rotator::from_quat(orientation),
        })
    }

    pub fn tracking_status(&self, player: u32, hand: Hand) -> TrackingStatus {
        match self.find_controller(player, hand) {
            Some(_) => TrackingStatus::Tracked,
            None => TrackingStatus::NotTracked,
        }
    }

    pub fn close(&self) {
        if self.link.state() == LinkState::Connected {
            log::info!("[{}] closing tracker device", self.id);
        }
        self.link.close();
    }

    fn find_controller(&self, player: u32, hand: Hand) -> Option<BindingId> {
        self.bindings
            .iter()
            .find(|(_, binding)| binding.matches(player, hand))
            .map(|(sensor, _)| *sensor)
    }
}

impl Drop for TrackerAdapter {
    fn drop(&mut self) {
        self.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::loopback::{Delivery, LoopbackConnector, LoopbackFeed};
    use crate::protocol::FailingConnector;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::time::{Duration, Instant};

    const ADDRESS: &str = "Head@localhost";
    const IDENTITY: [f64; 4] = [0.0, 0.0, 0.0, 1.0];

    fn section() -> ConfigSection {
        ConfigSection::new("Head")
            .with("Type", "Tracker")
            .with("Address", ADDRESS)
            .with("Tracker", r#"(Id=0,Name=Head,Description="Head tracker")"#)
            .with("Tracker", "(Id=1,Name=Wand,Description=Wand,PlayerId=0,Hand=Right)")
    }

    fn connected(section: &ConfigSection) -> (TrackerAdapter, LoopbackFeed, LoopbackConnector) {
        let connector = LoopbackConnector::new(Delivery::OnPump);
        let feed = connector.feed(ADDRESS);
        let adapter = TrackerAdapter::configure(DeviceId::new("Head"), section, 1.0).unwrap();
        adapter.connect(ADDRESS, &connector).unwrap();
        (adapter, feed, connector)
    }

    fn value_of(events: &[InputEvent], name: &str) -> f64 {
        events
            .iter()
            .find_map(|e| match e {
                InputEvent::Analog { key, value } if key.as_str() == name => Some(*value),
                _ => None,
            })
            .unwrap()
    }

    #[test]
    fn test_registers_six_axes_per_binding() {
        let adapter = TrackerAdapter::configure(DeviceId::new("Head"), &section(), 1.0).unwrap();
        let mut keys: Vec<KeyDetails> = Vec::new();
        adapter.register_keys(&mut keys);
        assert_eq!(keys.len(), 12);
        let names: Vec<&str> = keys[..6].iter().map(|k| k.key.as_str()).collect();
        assert_eq!(
            names,
            [
                "HeadMotionX",
                "HeadMotionY",
                "HeadMotionZ",
                "HeadRotationYaw",
                "HeadRotationPitch",
                "HeadRotationRoll"
            ]
        );
        assert_eq!(keys[0].description, "Head X position");
        assert_eq!(keys[5].description, "Head Roll");
        assert!(keys.iter().all(|k| k.kind == KeyKind::FloatAxis));
    }

    #[test]
    fn test_offset_then_scale() {
        let section = section()
            .with("PositionOffset", "X=1,Y=0,Z=0")
            .with("TrackerUnitsToUE4Units", "2");
        let (adapter, feed, _connector) = connected(&section);
        feed.tracker(0, [0.0, 0.0, 0.0], IDENTITY).unwrap();

        let mut events: Vec<InputEvent> = Vec::new();
        adapter.poll(&mut events).unwrap();
        assert_eq!(events.len(), 6);
        assert_eq!(value_of(&events, "HeadMotionX"), 2.0);
        assert_eq!(value_of(&events, "HeadMotionY"), 0.0);
        assert_eq!(value_of(&events, "HeadMotionZ"), 0.0);
    }

    #[test]
    fn test_world_scale_is_folded_in() {
        let connector = LoopbackConnector::new(Delivery::OnPump);
        let feed = connector.feed(ADDRESS);
        let adapter = TrackerAdapter::configure(
            DeviceId::new("Head"),
            &section().with("TrackerUnitsToUE4Units", "2"),
            0.5,
        )
        .unwrap();
        adapter.connect(ADDRESS, &connector).unwrap();
        assert_eq!(adapter.calibration().unit_scale, 1.0);

        feed.tracker(0, [3.0, 0.0, 0.0], IDENTITY).unwrap();
        let mut events: Vec<InputEvent> = Vec::new();
        adapter.poll(&mut events).unwrap();
        assert_eq!(value_of(&events, "HeadMotionX"), 3.0);
    }

    #[test]
    fn test_many_samples_one_emission() {
        let (adapter, feed, _connector) = connected(&section());
        for i in 0..5 {
            feed.tracker(0, [i as f64, 0.0, 0.0], IDENTITY).unwrap();
        }

        let mut events: Vec<InputEvent> = Vec::new();
        adapter.poll(&mut events).unwrap();
        assert_eq!(events.len(), 6);
        assert_eq!(value_of(&events, "HeadMotionX"), 4.0);

        events.clear();
        adapter.poll(&mut events).unwrap();
        assert!(events.is_empty());
    }

    #[test]
    fn test_unknown_sensor_dropped() {
        let (adapter, feed, _connector) = connected(&section());
        feed.tracker(7, [1.0, 1.0, 1.0], IDENTITY).unwrap();
        feed.tracker(1, [0.0, 5.0, 0.0], IDENTITY).unwrap();

        let mut events: Vec<InputEvent> = Vec::new();
        adapter.poll(&mut events).unwrap();
        assert_eq!(events.len(), 6);
        assert_eq!(value_of(&events, "WandMotionY"), 5.0);
    }

    #[test]
    fn test_controller_pose_pumps_and_matches_hand() {
        let (adapter, feed, _connector) = connected(&section());
        assert!(adapter.has_motion_controllers());
        assert!(adapter.controller_pose(0, Hand::Left).is_none());
        assert_eq!(adapter.tracking_status(0, Hand::Left), TrackingStatus::NotTracked);
        assert_eq!(adapter.tracking_status(0, Hand::Right), TrackingStatus::Tracked);
        let pumps = feed.pump_count();

        feed.tracker(1, [0.0, 0.0, 4.0], IDENTITY).unwrap();
        let pose = adapter.controller_pose(0, Hand::Right).unwrap();
        assert_eq!(feed.pump_count(), pumps + 1);
        assert_eq!(pose.position, DVec3::new(0.0, 0.0, 4.0));
        assert_eq!(pose.orientation, DQuat::IDENTITY);
    }

    #[test]
    fn test_apply_smoothing_affects_emission_only() {
        let section = section()
            .with("OrientationSmoothing", "Apply")
            .with("SmoothingAlpha", "0.5");
        let (adapter, feed, _connector) = connected(&section);
        let half = std::f64::consts::FRAC_1_SQRT_2;
        let yaw_90 = [0.0, 0.0, half, half];
        feed.tracker(1, [0.0, 0.0, 0.0], yaw_90).unwrap();

        let mut events: Vec<InputEvent> = Vec::new();
        adapter.poll(&mut events).unwrap();
        assert!((value_of(&events, "WandRotationYaw") - 45.0).abs() < 1e-9);

        let pose = adapter.controller_pose(0, Hand::Right).unwrap();
        assert!((pose.rotator.yaw - 90.0).abs() < 1e-9);
    }

    #[test]
    fn test_discard_smoothing_emits_raw() {
        let (adapter, feed, _connector) = connected(&section());
        let half = std::f64::consts::FRAC_1_SQRT_2;
        feed.tracker(0, [0.0, 0.0, 0.0], [0.0, 0.0, half, half]).unwrap();

        let mut events: Vec<InputEvent> = Vec::new();
        adapter.poll(&mut events).unwrap();
        assert!((value_of(&events, "HeadRotationYaw") - 90.0).abs() < 1e-9);
    }

    #[test]
    fn test_failed_pump_still_emits_fresh_samples() {
        let connector = FailingConnector::default();
        let adapter = TrackerAdapter::configure(DeviceId::new("Head"), &section(), 1.0).unwrap();
        adapter.connect(ADDRESS, &connector).unwrap();
        connector.tracker_handler()(TrackerReport {
            sensor: 0,
            pos: [1.5, 0.0, 0.0],
            quat: IDENTITY,
        });

        let mut events: Vec<InputEvent> = Vec::new();
        assert!(adapter.poll(&mut events).is_err());
        assert_eq!(events.len(), 6);
        assert_eq!(value_of(&events, "HeadMotionX"), 1.5);

        events.clear();
        assert!(adapter.poll(&mut events).is_err());
        assert!(events.is_empty());
    }

    /// Stops the query thread even when an assertion unwinds the test.
    struct StopOnDrop<'a>(&'a AtomicBool);

    impl Drop for StopOnDrop<'_> {
        fn drop(&mut self) {
            self.0.store(true, Ordering::SeqCst);
        }
    }

    #[test]
    fn test_concurrent_poll_and_pose_query() {
        const SAMPLES: usize = 50;
        let connector = LoopbackConnector::new(Delivery::Background);
        let feed = connector.feed(ADDRESS);
        let adapter = TrackerAdapter::configure(DeviceId::new("Head"), &section(), 1.0).unwrap();
        adapter.connect(ADDRESS, &connector).unwrap();

        let done = AtomicBool::new(false);
        let queries = AtomicUsize::new(0);
        std::thread::scope(|scope| {
            scope.spawn(|| {
                while !done.load(Ordering::SeqCst) {
                    let _ = adapter.controller_pose(0, Hand::Right);
                    queries.fetch_add(1, Ordering::SeqCst);
                }
            });

            let _stop = StopOnDrop(&done);
            let mut events: Vec<InputEvent> = Vec::new();
            for i in 1..=SAMPLES {
                feed.tracker(1, [i as f64, 0.0, 0.0], IDENTITY).unwrap();
                let deadline = Instant::now() + Duration::from_secs(5);
                events.clear();
                while events.is_empty() {
                    assert!(Instant::now() < deadline, "sample {} never delivered", i);
                    adapter.poll(&mut events).unwrap();
                }
                assert_eq!(events.len(), 6);
                assert_eq!(value_of(&events, "WandMotionX"), i as f64);

                events.clear();
                adapter.poll(&mut events).unwrap();
                assert!(events.is_empty());
            }
        });

        assert!(queries.load(Ordering::SeqCst) > 0);
        let pose = adapter.controller_pose(0, Hand::Right).unwrap();
        assert_eq!(pose.position, DVec3::new(SAMPLES as f64, 0.0, 0.0));
    }
}
