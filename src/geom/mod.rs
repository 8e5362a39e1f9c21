//! Geometry primitives used to sample curves and orient instances.

mod core;
mod curve;

pub use core::{Point3, Quaternion, Tolerance, Transform, Vec3};
pub use curve::{
    ArcLengthTable, CubicBezier3, Curve3, CurveGeometry, Line3, NurbsCurve3, Polyline3,
};

#[cfg(test)]
mod tests;
