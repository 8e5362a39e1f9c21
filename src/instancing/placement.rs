//! Even distribution of instances along the curve.

use crate::geom::{Quaternion, Vec3};

use super::sampler::CurveProvider;

/// Axis of the reference object that is aligned with the curve tangent.
pub const FORWARD_AXIS: Vec3 = Vec3::Z;

/// Transform written onto one instance.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Placement {
    /// Translation in the instance's parent-relative space.
    pub translation: Vec3,
    pub rotation: Quaternion,
}

/// Arc-length fraction for the `ordinal`-th of `count` instances.
///
/// Instances sit at `k / count`, so the first is at the curve start and the
/// last stops one spacing short of the end.
#[must_use]
pub fn placement_fraction(ordinal: usize, count: usize) -> f64 {
    if count == 0 {
        return 0.0;
    }
    ordinal as f64 / count as f64
}

/// Placement of one instance at `fraction` along `curve`.
pub fn placement_at<C: CurveProvider + ?Sized>(curve: &C, fraction: f64) -> Placement {
    let frame = curve.frame_at_fraction(fraction);
    Placement {
        translation: frame.point.to_vec3(),
        rotation: Quaternion::rotation_arc(FORWARD_AXIS, frame.tangent),
    }
}

/// Placements for `count` instances in physical order.
pub fn compute_placements<C: CurveProvider + ?Sized>(curve: &C, count: usize) -> Vec<Placement> {
    (0..count)
        .map(|ordinal| placement_at(curve, placement_fraction(ordinal, count)))
        .collect()
}
