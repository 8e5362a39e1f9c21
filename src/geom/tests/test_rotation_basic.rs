use crate::geom::{Quaternion, Tolerance, Vec3};

#[test]
fn rotation_arc_parallel_is_identity() {
    let q = Quaternion::rotation_arc(Vec3::Z, Vec3::new(0.0, 0.0, 3.0));
    assert_eq!(q, Quaternion::IDENTITY);
}

#[test]
fn rotation_arc_antiparallel_is_half_turn_about_perpendicular_axis() {
    let q = Quaternion::rotation_arc(Vec3::Z, -Vec3::Z);

    assert!((q.angle() - std::f64::consts::PI).abs() < 1e-9);
    let axis = Vec3::new(q.x, q.y, q.z);
    assert!(axis.dot(Vec3::Z).abs() < 1e-12);

    let tol = Tolerance::new(1e-9);
    assert!(tol.approx_eq_vec3(q.rotate_vec(Vec3::Z), -Vec3::Z));
}

#[test]
fn rotation_arc_maps_from_onto_to() {
    let tol = Tolerance::new(1e-9);
    for to in [
        Vec3::X,
        Vec3::Y,
        Vec3::new(1.0, 1.0, 0.0),
        Vec3::new(-0.3, 0.2, -0.9),
        Vec3::new(0.0, 0.0, -1.0 + 1e-6),
    ] {
        let q = Quaternion::rotation_arc(Vec3::Z, to);
        let expected = to.normalized().expect("non-zero");
        assert!(tol.approx_eq_vec3(q.rotate_vec(Vec3::Z), expected), "to={to:?}");
    }
}

#[test]
fn rotation_arc_is_shortest() {
    let q = Quaternion::rotation_arc(Vec3::Z, Vec3::X);
    assert!((q.angle() - std::f64::consts::FRAC_PI_2).abs() < 1e-9);
    // The rotation axis is perpendicular to both directions.
    let axis = Vec3::new(q.x, q.y, q.z).normalized().expect("axis");
    assert!(Tolerance::new(1e-9).approx_eq_vec3(axis, Vec3::Y));
}

#[test]
fn rotation_arc_with_zero_tangent_is_identity() {
    assert_eq!(Quaternion::rotation_arc(Vec3::Z, Vec3::ZERO), Quaternion::IDENTITY);
}
