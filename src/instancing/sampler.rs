//! World-space curve sampling by arc-length fraction.

use crate::geom::{ArcLengthTable, Curve3, Point3, Transform, Vec3};

/// Point and tangent at some position along a curve, in world space.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CurveFrame {
    pub point: Point3,
    /// Unnormalized tangent. Zero when the curve is degenerate there.
    pub tangent: Vec3,
}

/// A curve the instancer can measure and sample.
pub trait CurveProvider {
    /// World-space length.
    fn length(&self) -> f64;

    /// Frame at `fraction` of the arc length, clamped to `[0, 1]`.
    fn frame_at_fraction(&self, fraction: f64) -> CurveFrame;
}

/// Curve geometry placed in the world by a transform.
struct Placed<'a, C: ?Sized> {
    curve: &'a C,
    world: Transform,
}

impl<C: Curve3 + ?Sized> Curve3 for Placed<'_, C> {
    fn point_at(&self, t: f64) -> Point3 {
        self.world.apply_point(self.curve.point_at(t))
    }

    fn domain(&self) -> (f64, f64) {
        self.curve.domain()
    }

    fn derivative_at(&self, t: f64) -> Vec3 {
        self.world.apply_vec(self.curve.derivative_at(t))
    }
}

/// Curve geometry with its world transform and a cached arc-length table.
///
/// Lengths are measured after the transform is applied, so a scaled curve
/// reports its scaled length.
#[derive(Debug, Clone)]
pub struct WorldCurve<C> {
    curve: C,
    world: Transform,
    table: ArcLengthTable,
}

impl<C: Curve3> WorldCurve<C> {
    pub fn new(curve: C, world: Transform) -> Self {
        Self::with_samples(curve, world, ArcLengthTable::DEFAULT_SAMPLES)
    }

    pub fn with_samples(curve: C, world: Transform, samples: usize) -> Self {
        let table = ArcLengthTable::build(
            &Placed {
                curve: &curve,
                world,
            },
            samples,
        );
        Self {
            curve,
            world,
            table,
        }
    }

    pub fn curve(&self) -> &C {
        &self.curve
    }

    pub fn world(&self) -> Transform {
        self.world
    }

    fn placed(&self) -> Placed<'_, C> {
        Placed {
            curve: &self.curve,
            world: self.world,
        }
    }
}

impl<C: Curve3> CurveProvider for WorldCurve<C> {
    fn length(&self) -> f64 {
        self.table.total_length()
    }

    fn frame_at_fraction(&self, fraction: f64) -> CurveFrame {
        let fraction = if fraction.is_finite() {
            fraction.clamp(0.0, 1.0)
        } else {
            0.0
        };
        let t = self.table.parameter_at_length(fraction * self.length());
        let placed = self.placed();
        CurveFrame {
            point: placed.point_at(t),
            tangent: placed.derivative_at(t),
        }
    }
}
