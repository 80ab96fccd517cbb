//! Distance/threshold → bounded confidence.
//!
//! The comparator decides a match by a hard threshold on distance. This maps
//! "how far below the threshold" onto [0, 1] without interpreting the
//! model-specific distance. Values are relative, not calibrated probabilities.

/// Decimal places kept in presented confidence values.
const CONFIDENCE_DECIMALS: i32 = 3;

/// `clamp(1 - distance / threshold, 0, 1)`.
///
/// `threshold` is a model constant and positive by the comparator contract.
/// Non-finite intermediates (e.g. a NaN distance) map to 0.
pub fn normalize(distance: f64, threshold: f64) -> f64 {
    let confidence = 1.0 - distance / threshold;
    if confidence.is_finite() {
        confidence.clamp(0.0, 1.0)
    } else {
        0.0
    }
}

/// Round to 3 decimal places for presentation stability.
pub fn round_confidence(confidence: f64) -> f64 {
    let scale = 10f64.powi(CONFIDENCE_DECIMALS);
    (confidence * scale).round() / scale
}

#[cfg(test)]
mod tests {
    use super::*;

    const THRESHOLDS: [f64; 4] = [0.1, 0.4, 0.68, 1.0954];

    #[test]
    fn test_zero_distance_is_full_confidence() {
        for t in THRESHOLDS {
            assert_eq!(normalize(0.0, t), 1.0);
        }
    }

    #[test]
    fn test_distance_at_threshold_is_zero() {
        for t in THRESHOLDS {
            assert_eq!(normalize(t, t), 0.0);
        }
    }

    #[test]
    fn test_distance_beyond_threshold_clamps_to_zero() {
        for t in THRESHOLDS {
            for factor in [1.0001, 1.5, 2.0, 100.0] {
                assert_eq!(normalize(t * factor, t), 0.0);
            }
        }
    }

    #[test]
    fn test_output_always_bounded() {
        for t in THRESHOLDS {
            for step in 0..=200 {
                let d = step as f64 * 0.01;
                let c = normalize(d, t);
                assert!((0.0..=1.0).contains(&c), "normalize({d}, {t}) = {c}");
            }
        }
    }

    #[test]
    fn test_monotonic_in_distance() {
        let t = 0.4;
        let mut prev = normalize(0.0, t);
        for step in 1..=100 {
            let c = normalize(step as f64 * 0.005, t);
            assert!(c <= prev);
            prev = c;
        }
    }

    #[test]
    fn test_reference_scenario() {
        // matched, distance 0.25, threshold 0.40
        let c = round_confidence(normalize(0.25, 0.40));
        assert_eq!(c, 0.375);
    }

    #[test]
    fn test_nan_distance_is_zero() {
        assert_eq!(normalize(f64::NAN, 0.4), 0.0);
    }

    #[test]
    fn test_round_confidence() {
        assert_eq!(round_confidence(0.12345), 0.123);
        assert_eq!(round_confidence(0.9996), 1.0);
        assert_eq!(round_confidence(0.0), 0.0);
        assert_eq!(round_confidence(0.5), 0.5);
    }
}
