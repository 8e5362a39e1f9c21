use crate::geom::{
    ArcLengthTable, CubicBezier3, Curve3, CurveGeometry, Line3, NurbsCurve3, Point3, Polyline3,
    Tolerance, Vec3,
};

#[test]
fn line_arc_length_matches_segment_length() {
    let line = Line3::new(Point3::new(0.0, 0.0, 0.0), Point3::new(3.0, 4.0, 0.0));
    let table = ArcLengthTable::build(&line, 64);
    assert!((table.total_length() - 5.0).abs() < 1e-9);
    assert!((table.parameter_at_length(2.5) - 0.5).abs() < 1e-9);
}

#[test]
fn parameter_at_length_clamps_to_domain() {
    let line = Line3::new(Point3::new(0.0, 0.0, 0.0), Point3::new(10.0, 0.0, 0.0));
    let table = ArcLengthTable::build(&line, 16);
    assert_eq!(table.parameter_at_length(-1.0), 0.0);
    assert_eq!(table.parameter_at_length(50.0), 1.0);
}

#[test]
fn polyline_is_parametrized_by_length() {
    let polyline = Polyline3::new(vec![
        Point3::new(0.0, 0.0, 0.0),
        Point3::new(1.0, 0.0, 0.0),
        Point3::new(1.0, 3.0, 0.0),
    ])
    .expect("valid polyline");

    let tol = Tolerance::new(1e-9);
    assert!(tol.approx_eq_point3(polyline.point_at(0.25), Point3::new(1.0, 0.0, 0.0)));
    assert!(tol.approx_eq_point3(polyline.point_at(1.0), Point3::new(1.0, 3.0, 0.0)));

    let tangent = polyline.tangent_at(0.5).expect("tangent on second leg");
    assert!(tol.approx_eq_vec3(tangent, Vec3::Y));
}

#[test]
fn polyline_requires_two_points() {
    assert!(Polyline3::new(vec![Point3::ORIGIN]).is_err());
}

#[test]
fn bezier_arc_length_reparametrization_is_even() {
    // Control points bunched at the start make the native parameter uneven.
    let curve = CubicBezier3::new(
        Point3::new(0.0, 0.0, 0.0),
        Point3::new(0.1, 0.0, 0.0),
        Point3::new(0.2, 0.0, 0.0),
        Point3::new(10.0, 0.0, 0.0),
    );
    let table = ArcLengthTable::build(&curve, ArcLengthTable::DEFAULT_SAMPLES);
    assert!((table.total_length() - 10.0).abs() < 1e-6);

    let half = curve.point_at(table.parameter_at_length(5.0));
    assert!((half.x - 5.0).abs() < 1e-2, "got {half:?}");
    assert!((curve.point_at(0.5).x - 5.0).abs() > 1.0);
}

#[test]
fn nurbs_rejects_bad_knot_vector() {
    let points = vec![Point3::ORIGIN, Point3::new(1.0, 0.0, 0.0), Point3::new(2.0, 0.0, 0.0)];
    assert!(NurbsCurve3::new(2, points.clone(), vec![0.0, 0.0, 1.0], None).is_err());
    assert!(NurbsCurve3::new(3, points, vec![0.0; 7], None).is_err());
}

#[test]
fn nurbs_degree_one_matches_polyline() {
    let points = vec![
        Point3::new(0.0, 0.0, 0.0),
        Point3::new(2.0, 0.0, 0.0),
        Point3::new(2.0, 2.0, 0.0),
    ];
    let knots = NurbsCurve3::clamped_uniform_knots(1, points.len());
    assert_eq!(knots, vec![0.0, 0.0, 0.5, 1.0, 1.0]);

    let curve = NurbsCurve3::new(1, points, knots, None).expect("valid nurbs");
    let tol = Tolerance::new(1e-9);
    assert!(tol.approx_eq_point3(curve.point_at(0.0), Point3::new(0.0, 0.0, 0.0)));
    assert!(tol.approx_eq_point3(curve.point_at(0.25), Point3::new(1.0, 0.0, 0.0)));
    assert!(tol.approx_eq_point3(curve.point_at(1.0), Point3::new(2.0, 2.0, 0.0)));
}

#[test]
fn nurbs_clamped_curve_interpolates_endpoints() {
    let points = vec![
        Point3::new(0.0, 0.0, 0.0),
        Point3::new(1.0, 2.0, 0.0),
        Point3::new(3.0, 2.0, 0.0),
        Point3::new(4.0, 0.0, 0.0),
    ];
    let knots = NurbsCurve3::clamped_uniform_knots(3, points.len());
    let curve = NurbsCurve3::new(3, points, knots, Some(vec![1.0, 2.0, 2.0, 1.0]))
        .expect("valid nurbs");

    let tol = Tolerance::new(1e-9);
    assert!(tol.approx_eq_point3(curve.point_at(0.0), Point3::new(0.0, 0.0, 0.0)));
    assert!(tol.approx_eq_point3(curve.point_at(1.0), Point3::new(4.0, 0.0, 0.0)));
    // Symmetric control polygon and weights put the midpoint on the axis of symmetry.
    assert!((curve.point_at(0.5).x - 2.0).abs() < 1e-9);
}

#[test]
fn curve_geometry_delegates() {
    let line = Line3::new(Point3::ORIGIN, Point3::new(0.0, 0.0, 2.0));
    let geometry = CurveGeometry::Line(line);
    assert_eq!(geometry.kind_name(), "line");
    assert_eq!(geometry.point_at(0.5), Point3::new(0.0, 0.0, 1.0));
    assert_eq!(geometry.tangent_at(0.5), Some(Vec3::Z));
}
