//! Engine-convention helpers on top of `glam`'s double-precision types.
//!
//! Quaternions are stored `[x, y, z, w]`, `a * b` applies `b` first, and
//! rotators are pitch/yaw/roll in degrees.

pub use glam::{DQuat, DVec3};

/// Squared norm below which a quaternion is treated as degenerate.
const SMALL_NUMBER: f64 = 1e-8;

/// Pitch singularity threshold for quaternion to rotator conversion.
const SINGULARITY_THRESHOLD: f64 = 0.4999995;

/// Unit-length copy of `q`. Degenerate or non-finite quaternions collapse to
/// identity instead of producing NaNs.
pub fn normalize_or_identity(q: DQuat) -> DQuat {
    if !q.is_finite() || q.length_squared() < SMALL_NUMBER {
        return DQuat::IDENTITY;
    }
    q.normalize()
}

/// Euler angles in degrees.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Rotator {
    pub pitch: f64,
    pub yaw: f64,
    pub roll: f64,
}

impl Rotator {
    /// Convert using the host engine's convention.
    pub fn from_quat(q: DQuat) -> Rotator {
        let [x, y, z, w] = q.to_array();
        let singularity_test = z * x - w * y;
        let yaw_y = 2.0 * (w * z + x * y);
        let yaw_x = 1.0 - 2.0 * (y * y + z * z);
        let yaw = yaw_y.atan2(yaw_x).to_degrees();

        if singularity_test < -SINGULARITY_THRESHOLD {
            Rotator {
                pitch: -90.0,
                yaw,
                roll: normalize_axis(-yaw - 2.0 * x.atan2(w).to_degrees()),
            }
        } else if singularity_test > SINGULARITY_THRESHOLD {
            Rotator {
                pitch: 90.0,
                yaw,
                roll: normalize_axis(yaw - 2.0 * x.atan2(w).to_degrees()),
            }
        } else {
            Rotator {
                pitch: (2.0 * singularity_test).clamp(-1.0, 1.0).asin().to_degrees(),
                yaw,
                roll: (-2.0 * (w * x + y * z))
                    .atan2(1.0 - 2.0 * (x * x + y * y))
                    .to_degrees(),
            }
        }
    }
}

/// Wrap an angle in degrees into (-180, 180].
fn normalize_axis(angle: f64) -> f64 {
    let mut a = angle % 360.0;
    if a < 0.0 {
        a += 360.0;
    }
    if a > 180.0 {
        a -= 360.0;
    }
    a
}
