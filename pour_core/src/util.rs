//! Small numeric and time helpers shared by the drivers and the pour loop.
use std::time::Duration;

/// Round to two decimal places (scale resolution).
#[inline]
pub fn round2(v: f32) -> f32 {
    (v * 100.0).round() / 100.0
}

/// Amount delivered for the current ingredient given the raw scale reading
/// and the cumulative target of everything poured before it. Overshoot is
/// kept: the result is not capped at the ingredient's target.
#[inline]
pub fn delivered_since(weight_g: f32, cumulative_before_g: f32) -> f32 {
    (weight_g - cumulative_before_g).round().max(0.0)
}

/// `Duration::from_millis` that maps 0 to `None` (feature disabled).
#[inline]
pub fn period(ms: u64) -> Option<Duration> {
    (ms > 0).then(|| Duration::from_millis(ms))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(12.345, 12.35)]
    #[case(-0.004, 0.0)]
    #[case(40.0, 40.0)]
    fn rounds_to_centigrams(#[case] input: f32, #[case] expected: f32) {
        assert!((round2(input) - expected).abs() < 1e-4);
    }

    #[rstest]
    #[case(41.0, 30.0, 11.0)]
    #[case(29.2, 30.0, 0.0)]
    #[case(30.6, 30.0, 1.0)]
    #[case(31.0, 0.0, 31.0)]
    fn delivered_is_delta_against_cumulative(
        #[case] w: f32,
        #[case] before: f32,
        #[case] expected: f32,
    ) {
        assert_eq!(delivered_since(w, before), expected);
    }

    #[test]
    fn zero_period_disables() {
        assert_eq!(period(0), None);
        assert_eq!(period(150), Some(Duration::from_millis(150)));
    }
}
