use super::core::{Point3, Tolerance, Vec3};

pub trait Curve3 {
    fn point_at(&self, t: f64) -> Point3;

    #[must_use]
    fn domain(&self) -> (f64, f64) {
        (0.0, 1.0)
    }

    #[must_use]
    fn derivative_at(&self, t: f64) -> Vec3 {
        let (a, b) = self.domain();
        let span = b - a;
        if !span.is_finite() || span == 0.0 {
            return Vec3::ZERO;
        }

        let h = Tolerance::DERIVATIVE.relative_to(span);
        if !h.is_finite() || h == 0.0 {
            return Vec3::ZERO;
        }

        let t0 = (t - h).max(a);
        let t1 = (t + h).min(b);
        if t1 == t0 {
            return Vec3::ZERO;
        }

        let p0 = self.point_at(t0);
        let p1 = self.point_at(t1);
        p1.sub_point(p0).mul_scalar(1.0 / (t1 - t0))
    }

    /// Returns the unit tangent vector at parameter `t`.
    /// Returns `None` if the derivative is zero or degenerate.
    #[must_use]
    fn tangent_at(&self, t: f64) -> Option<Vec3> {
        self.derivative_at(t).normalized()
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Line3 {
    pub start: Point3,
    pub end: Point3,
}

impl Line3 {
    #[must_use]
    pub const fn new(start: Point3, end: Point3) -> Self {
        Self { start, end }
    }

    #[must_use]
    pub const fn direction(self) -> Vec3 {
        self.end.sub_point(self.start)
    }
}

impl Curve3 for Line3 {
    fn point_at(&self, t: f64) -> Point3 {
        self.start.add_vec(self.direction().mul_scalar(t))
    }

    fn derivative_at(&self, _t: f64) -> Vec3 {
        self.direction()
    }
}

/// Polyline parametrized by normalized arc length over `[0, 1]`.
#[derive(Debug, Clone, PartialEq)]
pub struct Polyline3 {
    points: Vec<Point3>,
    cumulative_lengths: Vec<f64>,
    total_length: f64,
}

impl Polyline3 {
    pub fn new(points: Vec<Point3>) -> Result<Self, String> {
        if points.len() < 2 {
            return Err("polyline requires at least 2 points".to_string());
        }

        let mut cumulative_lengths = Vec::with_capacity(points.len());
        cumulative_lengths.push(0.0);
        let mut total = 0.0;
        for window in points.windows(2) {
            total += window[1].sub_point(window[0]).length();
            cumulative_lengths.push(total);
        }

        Ok(Self {
            points,
            cumulative_lengths,
            total_length: total,
        })
    }

    #[must_use]
    pub fn points(&self) -> &[Point3] {
        &self.points
    }

    fn segment_index(&self, target: f64) -> usize {
        let idx = match self
            .cumulative_lengths
            .binary_search_by(|value| value.total_cmp(&target))
        {
            Ok(i) => i,
            Err(i) => i.max(1) - 1,
        };
        idx.min(self.points.len() - 2)
    }
}

impl Curve3 for Polyline3 {
    fn point_at(&self, t: f64) -> Point3 {
        if self.total_length <= 0.0 || !self.total_length.is_finite() {
            return self.points[0];
        }

        let target = t.clamp(0.0, 1.0) * self.total_length;
        let idx = self.segment_index(target);

        let seg_start = self.points[idx];
        let seg_end = self.points[idx + 1];
        let seg_len = seg_end.sub_point(seg_start).length();
        if seg_len == 0.0 {
            return seg_start;
        }
        let local = target - self.cumulative_lengths[idx];
        seg_start.lerp(seg_end, (local / seg_len).clamp(0.0, 1.0))
    }

    fn derivative_at(&self, t: f64) -> Vec3 {
        if self.total_length <= 0.0 || !self.total_length.is_finite() {
            return Vec3::ZERO;
        }

        let target = t.clamp(0.0, 1.0) * self.total_length;
        let mut idx = self.segment_index(target);
        // Zero-length segments carry no direction, step over them.
        while idx + 2 < self.points.len()
            && self.points[idx + 1].sub_point(self.points[idx]).length() == 0.0
        {
            idx += 1;
        }
        let dir = self.points[idx + 1].sub_point(self.points[idx]);
        let seg_len = dir.length();
        if seg_len == 0.0 {
            return Vec3::ZERO;
        }
        dir.mul_scalar(self.total_length / seg_len)
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CubicBezier3 {
    pub p0: Point3,
    pub p1: Point3,
    pub p2: Point3,
    pub p3: Point3,
}

impl CubicBezier3 {
    #[must_use]
    pub const fn new(p0: Point3, p1: Point3, p2: Point3, p3: Point3) -> Self {
        Self { p0, p1, p2, p3 }
    }
}

impl Curve3 for CubicBezier3 {
    fn point_at(&self, t: f64) -> Point3 {
        let t = t.clamp(0.0, 1.0);
        let u = 1.0 - t;
        let (b0, b1, b2, b3) = (u * u * u, 3.0 * u * u * t, 3.0 * u * t * t, t * t * t);
        Point3::new(
            self.p0.x * b0 + self.p1.x * b1 + self.p2.x * b2 + self.p3.x * b3,
            self.p0.y * b0 + self.p1.y * b1 + self.p2.y * b2 + self.p3.y * b3,
            self.p0.z * b0 + self.p1.z * b1 + self.p2.z * b2 + self.p3.z * b3,
        )
    }

    fn derivative_at(&self, t: f64) -> Vec3 {
        let t = t.clamp(0.0, 1.0);
        let u = 1.0 - t;
        let a = self.p1.sub_point(self.p0);
        let b = self.p2.sub_point(self.p1);
        let c = self.p3.sub_point(self.p2);
        a.mul_scalar(3.0 * u * u)
            .add(b.mul_scalar(6.0 * u * t))
            .add(c.mul_scalar(3.0 * t * t))
    }
}

/// Non-uniform rational B-spline, evaluated with de Boor's algorithm.
#[derive(Debug, Clone, PartialEq)]
pub struct NurbsCurve3 {
    degree: usize,
    control_points: Vec<Point3>,
    knots: Vec<f64>,
    weights: Option<Vec<f64>>,
}

impl NurbsCurve3 {
    pub fn new(
        degree: usize,
        control_points: Vec<Point3>,
        knots: Vec<f64>,
        weights: Option<Vec<f64>>,
    ) -> Result<Self, String> {
        if control_points.len() < 2 {
            return Err("nurbs curve requires at least 2 control points".to_string());
        }
        if degree == 0 {
            return Err("nurbs curve degree must be >= 1".to_string());
        }
        if degree >= control_points.len() {
            return Err("nurbs curve degree must be < control point count".to_string());
        }

        let expected_knot_len = control_points.len() + degree + 1;
        if knots.len() != expected_knot_len {
            return Err(format!(
                "nurbs curve knot length must be {}, got {}",
                expected_knot_len,
                knots.len()
            ));
        }
        if !knots.windows(2).all(|w| w[0] <= w[1]) {
            return Err("nurbs curve knots must be non-decreasing".to_string());
        }

        if let Some(ref weights) = weights {
            if weights.len() != control_points.len() {
                return Err("nurbs curve weights length must match control point count".to_string());
            }
            if weights.iter().any(|w| !w.is_finite() || *w <= 0.0) {
                return Err("nurbs curve weights must be finite and > 0".to_string());
            }
        }

        Ok(Self {
            degree,
            control_points,
            knots,
            weights,
        })
    }

    /// Clamped uniform knot vector for `count` control points.
    #[must_use]
    pub fn clamped_uniform_knots(degree: usize, count: usize) -> Vec<f64> {
        let interior = count.saturating_sub(degree + 1);
        let mut knots = vec![0.0; degree + 1];
        for i in 1..=interior {
            knots.push(i as f64 / (interior + 1) as f64);
        }
        knots.extend(std::iter::repeat(1.0).take(degree + 1));
        knots
    }

    #[must_use]
    pub const fn degree(&self) -> usize {
        self.degree
    }

    #[must_use]
    pub fn control_points(&self) -> &[Point3] {
        &self.control_points
    }

    #[must_use]
    pub fn knots(&self) -> &[f64] {
        &self.knots
    }

    #[must_use]
    pub fn weights(&self) -> Option<&[f64]> {
        self.weights.as_deref()
    }

    fn find_span(&self, u: f64) -> usize {
        let n = self.control_points.len() - 1;
        let p = self.degree;
        if u >= self.knots[n + 1] {
            return n;
        }
        if u <= self.knots[p] {
            return p;
        }

        let mut low = p;
        let mut high = n + 1;
        let mut mid = (low + high) / 2;
        while u < self.knots[mid] || u >= self.knots[mid + 1] {
            if u < self.knots[mid] {
                high = mid;
            } else {
                low = mid;
            }
            mid = (low + high) / 2;
        }
        mid
    }
}

impl Curve3 for NurbsCurve3 {
    fn point_at(&self, t: f64) -> Point3 {
        let p = self.degree;
        let (a, b) = self.domain();
        let u = t.clamp(a, b);
        let span = self.find_span(u);

        // Homogeneous coordinates, w = 1 for non-rational curves.
        let mut d: Vec<[f64; 4]> = (0..=p)
            .map(|j| {
                let index = span - p + j;
                let point = self.control_points[index];
                let w = self.weights.as_ref().map_or(1.0, |weights| weights[index]);
                [point.x * w, point.y * w, point.z * w, w]
            })
            .collect();

        for r in 1..=p {
            for j in (r..=p).rev() {
                let i = span - p + j;
                let denom = self.knots[i + p + 1 - r] - self.knots[i];
                let alpha = if denom == 0.0 { 0.0 } else { (u - self.knots[i]) / denom };
                for c in 0..4 {
                    d[j][c] = d[j - 1][c] * (1.0 - alpha) + d[j][c] * alpha;
                }
            }
        }

        let [x, y, z, w] = d[p];
        if w.is_finite() && w != 0.0 {
            Point3::new(x / w, y / w, z / w)
        } else {
            self.control_points[0]
        }
    }

    fn domain(&self) -> (f64, f64) {
        (self.knots[self.degree], self.knots[self.control_points.len()])
    }
}

/// Closed set of curve representations a curve shape can hold.
#[derive(Debug, Clone, PartialEq)]
pub enum CurveGeometry {
    Line(Line3),
    Polyline(Polyline3),
    CubicBezier(CubicBezier3),
    Nurbs(NurbsCurve3),
}

impl CurveGeometry {
    #[must_use]
    pub const fn kind_name(&self) -> &'static str {
        match self {
            Self::Line(_) => "line",
            Self::Polyline(_) => "polyline",
            Self::CubicBezier(_) => "bezier",
            Self::Nurbs(_) => "nurbs",
        }
    }
}

impl Curve3 for CurveGeometry {
    fn point_at(&self, t: f64) -> Point3 {
        match self {
            Self::Line(curve) => curve.point_at(t),
            Self::Polyline(curve) => curve.point_at(t),
            Self::CubicBezier(curve) => curve.point_at(t),
            Self::Nurbs(curve) => curve.point_at(t),
        }
    }

    fn domain(&self) -> (f64, f64) {
        match self {
            Self::Line(curve) => curve.domain(),
            Self::Polyline(curve) => curve.domain(),
            Self::CubicBezier(curve) => curve.domain(),
            Self::Nurbs(curve) => curve.domain(),
        }
    }

    fn derivative_at(&self, t: f64) -> Vec3 {
        match self {
            Self::Line(curve) => curve.derivative_at(t),
            Self::Polyline(curve) => curve.derivative_at(t),
            Self::CubicBezier(curve) => curve.derivative_at(t),
            Self::Nurbs(curve) => curve.derivative_at(t),
        }
    }
}

// ============================================================================
// Arc-length parametrization
// ============================================================================

#[derive(Debug, Clone, Copy)]
struct ArcLengthEntry {
    parameter: f64,
    arc_length: f64,
}

/// Lookup table from cumulative arc length to curve parameter.
///
/// Built once per curve evaluation; lookups are a binary search followed by
/// linear interpolation between neighbouring samples.
#[derive(Debug, Clone)]
pub struct ArcLengthTable {
    entries: Vec<ArcLengthEntry>,
    t0: f64,
    t1: f64,
}

impl ArcLengthTable {
    /// Default sample count used by curve samplers.
    pub const DEFAULT_SAMPLES: usize = 512;

    #[must_use]
    pub fn build<C: Curve3 + ?Sized>(curve: &C, samples: usize) -> Self {
        let samples = samples.max(2);
        let (t0, t1) = curve.domain();
        let span = t1 - t0;

        let mut entries = Vec::with_capacity(samples);
        let mut prev = curve.point_at(t0);
        let mut cumulative = 0.0;
        entries.push(ArcLengthEntry {
            parameter: t0,
            arc_length: 0.0,
        });

        for i in 1..samples {
            let t = t0 + span * (i as f64 / (samples - 1) as f64);
            let curr = curve.point_at(t);
            cumulative += curr.sub_point(prev).length();
            entries.push(ArcLengthEntry {
                parameter: t,
                arc_length: cumulative,
            });
            prev = curr;
        }

        Self { entries, t0, t1 }
    }

    #[must_use]
    pub fn total_length(&self) -> f64 {
        self.entries.last().map_or(0.0, |e| e.arc_length)
    }

    /// Parameter at which the arc length from the start equals `target_length`.
    #[must_use]
    pub fn parameter_at_length(&self, target_length: f64) -> f64 {
        let total = self.total_length();
        if target_length <= 0.0 || self.entries.len() < 2 {
            return self.t0;
        }
        if target_length >= total {
            return self.t1;
        }

        let idx = self
            .entries
            .binary_search_by(|entry| entry.arc_length.total_cmp(&target_length))
            .unwrap_or_else(|i| i.saturating_sub(1))
            .min(self.entries.len() - 2);
        let e0 = self.entries[idx];
        let e1 = self.entries[idx + 1];

        let segment_length = e1.arc_length - e0.arc_length;
        if segment_length.abs() < 1e-14 {
            return e0.parameter;
        }

        let ratio = (target_length - e0.arc_length) / segment_length;
        e0.parameter + (e1.parameter - e0.parameter) * ratio.clamp(0.0, 1.0)
    }
}
