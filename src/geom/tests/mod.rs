mod test_curve_basic;
mod test_rotation_basic;
