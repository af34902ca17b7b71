use crate::math::{normalize_or_identity, DQuat, DVec3};

/// Default slerp weight toward the newest orientation.
pub const DEFAULT_SMOOTHING_ALPHA: f64 = 0.2;

/// What a tracker does with its smoothed orientation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SmoothingMode {
    /// The raw orientation is the value of record; smoothing has no effect.
    #[default]
    Discard,
    /// Per-frame emission uses the smoothed orientation. Pose queries stay raw.
    Apply,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Smoothing {
    pub mode: SmoothingMode,
    /// Weight toward the new sample, in [0, 1].
    pub alpha: f64,
}

impl Default for Smoothing {
    fn default() -> Self {
        Self {
            mode: SmoothingMode::Discard,
            alpha: DEFAULT_SMOOTHING_ALPHA,
        }
    }
}

/// Calibration applied to every tracker sample of one device.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Calibration {
    /// Added to the raw position, in device coordinates.
    pub translation_offset: DVec3,
    /// Always unit length.
    pub rotation_offset: DQuat,
    /// Tracker units to host units, including any world scale.
    pub unit_scale: f64,
    pub flip_z: bool,
    pub smoothing: Smoothing,
}

impl Default for Calibration {
    fn default() -> Self {
        Self {
            translation_offset: DVec3::ZERO,
            rotation_offset: DQuat::IDENTITY,
            unit_scale: 1.0,
            flip_z: false,
            smoothing: Smoothing::default(),
        }
    }
}

impl Calibration {
    pub fn new(
        translation_offset: DVec3,
        rotation_offset: DQuat,
        unit_scale: f64,
        flip_z: bool,
    ) -> Self {
        Self {
            translation_offset,
            rotation_offset: normalize_or_identity(rotation_offset),
            unit_scale,
            flip_z,
            smoothing: Smoothing::default(),
        }
    }

    /// Fold a world-to-host scale factor into the unit scale.
    pub fn with_world_scale(mut self, world_scale: f64) -> Self {
        self.unit_scale *= world_scale;
        self
    }

    pub fn with_smoothing(mut self, smoothing: Smoothing) -> Self {
        self.smoothing = smoothing;
        self
    }
}

/// Map a raw tracker sample into host space.
///
/// With `flip_z` the Z components of the sample and the offset are negated and
/// the orientation is reflected by negating only its X and Y components.
pub fn transform(position: DVec3, orientation: DQuat, calib: &Calibration) -> (DVec3, DQuat) {
    let mut position = position;
    let mut offset = calib.translation_offset;
    let mut orientation = orientation;
    if calib.flip_z {
        position.z = -position.z;
        offset.z = -offset.z;
        orientation.x = -orientation.x;
        orientation.y = -orientation.y;
    }

    let scaled = (position + offset) * calib.unit_scale;
    (
        calib.rotation_offset * scaled,
        calib.rotation_offset * orientation,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f64::consts::FRAC_PI_2;

    fn inverse(position: DVec3, orientation: DQuat, calib: &Calibration) -> (DVec3, DQuat) {
        let inv = calib.rotation_offset.conjugate();
        let mut offset = calib.translation_offset;
        if calib.flip_z {
            offset.z = -offset.z;
        }
        let mut p = (inv * position) * (1.0 / calib.unit_scale) - offset;
        let mut q = inv * orientation;
        if calib.flip_z {
            p.z = -p.z;
            q.x = -q.x;
            q.y = -q.y;
        }
        (p, q)
    }

    fn assert_vec_close(a: DVec3, b: DVec3) {
        assert!((a - b).length_squared() < 1e-18, "{:?} != {:?}", a, b);
    }

    fn assert_quat_close(a: DQuat, b: DQuat) {
        let d = [a.x - b.x, a.y - b.y, a.z - b.z, a.w - b.w];
        assert!(d.iter().all(|c| c.abs() < 1e-9), "{:?} != {:?}", a, b);
    }

    #[test]
    fn test_identity_calibration_is_exact() {
        let calib = Calibration::default();
        let p = DVec3::new(0.25, -3.5, 12.0);
        let q = DQuat::from_xyzw(0.1, 0.2, 0.3, 0.927).normalize();
        let (out_p, out_q) = transform(p, q, &calib);
        assert_eq!(out_p, p);
        assert_eq!(out_q, q);
    }

    #[test]
    fn test_round_trip_through_inverse() {
        let axis = DVec3::new(1.0, 2.0, -0.5).normalize();
        let calib = Calibration::new(
            DVec3::new(0.3, -1.0, 2.0),
            DQuat::from_axis_angle(axis, 1.1),
            2.5,
            true,
        );
        let p = DVec3::new(4.0, 5.0, -6.0);
        let q = DQuat::from_axis_angle(DVec3::new(0.0, 0.0, 1.0), 0.7);

        let (raw_p, raw_q) = inverse(p, q, &calib);
        let (out_p, out_q) = transform(raw_p, raw_q, &calib);
        assert_vec_close(out_p, p);
        assert_quat_close(out_q, q);
    }

    #[test]
    fn test_flip_negates_z_and_reflects_xy() {
        let calib = Calibration {
            translation_offset: DVec3::new(1.0, 2.0, 3.0),
            flip_z: true,
            ..Calibration::default()
        };
        let q = DQuat::from_xyzw(0.1, 0.2, 0.3, 0.4);
        let (p, out_q) = transform(DVec3::new(1.0, 1.0, 1.0), q, &calib);
        assert_eq!(p, DVec3::new(2.0, 3.0, -4.0));
        assert_eq!(out_q, DQuat::from_xyzw(-0.1, -0.2, 0.3, 0.4));
    }

    #[test]
    fn test_flip_twice_restores_input() {
        let flip = Calibration {
            flip_z: true,
            ..Calibration::default()
        };
        let p = DVec3::new(1.0, -2.0, 3.0);
        let q = DQuat::from_xyzw(0.1, 0.2, 0.3, 0.4);
        let (p1, q1) = transform(p, q, &flip);
        let (p2, q2) = transform(p1, q1, &flip);
        assert_eq!(p2, p);
        assert_eq!(q2, q);
    }

    #[test]
    fn test_offset_then_scale() {
        let calib = Calibration::new(DVec3::new(1.0, 0.0, 0.0), DQuat::IDENTITY, 2.0, false);
        let (p, _) = transform(DVec3::ZERO, DQuat::IDENTITY, &calib);
        assert_eq!(p, DVec3::new(2.0, 0.0, 0.0));
    }

    #[test]
    fn test_rotation_offset_applies_to_position_and_orientation() {
        let yaw = DQuat::from_axis_angle(DVec3::new(0.0, 0.0, 1.0), FRAC_PI_2);
        let calib = Calibration::new(DVec3::ZERO, yaw, 1.0, false);
        let (p, q) = transform(DVec3::new(1.0, 0.0, 0.0), DQuat::IDENTITY, &calib);
        assert_vec_close(p, DVec3::new(0.0, 1.0, 0.0));
        assert_quat_close(q, yaw);
    }

    #[test]
    fn test_new_renormalizes_rotation() {
        let calib = Calibration::new(DVec3::ZERO, DQuat::from_xyzw(0.0, 0.0, 2.0, 2.0), 1.0, false);
        let q = calib.rotation_offset;
        assert!((q.dot(q) - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_world_scale_folds_into_unit_scale() {
        let calib =
            Calibration::new(DVec3::ZERO, DQuat::IDENTITY, 2.0, false).with_world_scale(0.5);
        assert_eq!(calib.unit_scale, 1.0);
    }
}
