//! Desired instance population for one evaluation.

use super::params::{InstancerParams, InstancingMode};

/// Resolve how many instances should exist.
///
/// `curve_length` is the world-space length of the connected curve, or
/// `None` when no curve is connected. Distance mode without a curve yields
/// zero.
#[must_use]
pub fn resolve_target_count(params: &InstancerParams, curve_length: Option<f64>) -> usize {
    match params.mode() {
        InstancingMode::Count => params.instance_count() as usize,
        InstancingMode::Distance => {
            let Some(length) = curve_length.filter(|len| len.is_finite() && *len > 0.0) else {
                return 0;
            };
            // Spacing is kept at or above `MIN_SPACING` by the setter.
            let by_length = (length / params.instance_spacing()).floor();
            let cap = params.max_instances_by_length() as usize;
            if by_length >= cap as f64 {
                cap
            } else {
                by_length as usize
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn distance_params(spacing: f64, max: i64) -> InstancerParams {
        let mut params = InstancerParams::default();
        params.set_mode(InstancingMode::Distance);
        params.set_instance_spacing(spacing).expect("valid spacing");
        params.set_max_instances_by_length(max);
        params
    }

    #[test]
    fn count_mode_uses_user_count() {
        let mut params = InstancerParams::default();
        params.set_instance_count(12);
        assert_eq!(resolve_target_count(&params, Some(3.0)), 12);
        assert_eq!(resolve_target_count(&params, None), 12);
    }

    #[test]
    fn distance_mode_floors_length_over_spacing() {
        let params = distance_params(1.0, 50);
        assert_eq!(resolve_target_count(&params, Some(10.0)), 10);
        assert_eq!(resolve_target_count(&params, Some(10.9)), 10);
    }

    #[test]
    fn distance_mode_is_capped() {
        let params = distance_params(1.0, 3);
        assert_eq!(resolve_target_count(&params, Some(10.0)), 3);
    }

    #[test]
    fn distance_mode_cap_applies_to_exact_multiples() {
        assert_eq!(resolve_target_count(&distance_params(5.0, 3), Some(25.0)), 3);
        assert_eq!(resolve_target_count(&distance_params(5.0, 10), Some(25.0)), 5);
    }

    #[test]
    fn distance_mode_without_curve_is_zero() {
        let params = distance_params(1.0, 50);
        assert_eq!(resolve_target_count(&params, None), 0);
        assert_eq!(resolve_target_count(&params, Some(0.0)), 0);
        assert_eq!(resolve_target_count(&params, Some(f64::NAN)), 0);
    }

    #[test]
    fn short_curve_yields_zero() {
        let params = distance_params(2.0, 50);
        assert_eq!(resolve_target_count(&params, Some(1.5)), 0);
    }
}
