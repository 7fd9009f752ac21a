//! Volume scaling

/// Scale every sample by `factor`, saturating at the i16 range.
///
/// Fractional results truncate toward zero.
pub fn apply_volume(samples: &mut [i16], factor: f64) {
    if (factor - 1.0).abs() < f64::EPSILON {
        return;
    }
    for sample in samples.iter_mut() {
        let scaled = *sample as f64 * factor;
        *sample = scaled.clamp(i16::MIN as f64, i16::MAX as f64) as i16;
    }
}

/// Interpret little-endian byte pairs as samples; a trailing odd byte is ignored
pub fn samples_from_le_bytes(bytes: &[u8]) -> Vec<i16> {
    bytes
        .chunks_exact(2)
        .map(|pair| i16::from_le_bytes([pair[0], pair[1]]))
        .collect()
}

/// Percent (0-200) to factor (0.0-2.0)
pub fn percent_to_factor(percent: u32) -> f64 {
    percent as f64 / 100.0
}

/// Factor to the nearest whole percent
pub fn factor_to_percent(factor: f64) -> u32 {
    (factor * 100.0).round().max(0.0) as u32
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scaling_and_clamping() {
        let mut samples = [20000i16, 30000, -30000, 0];
        apply_volume(&mut samples, 1.5);
        assert_eq!(samples, [30000, 32767, -32768, 0]);
    }

    #[test]
    fn test_fractions_truncate_toward_zero() {
        let mut samples = [3i16, -3, 5, -5, 32767];
        apply_volume(&mut samples, 0.5);
        assert_eq!(samples, [1, -1, 2, -2, 16383]);

        let mut samples = [3i16, -3];
        apply_volume(&mut samples, 1.3);
        assert_eq!(samples, [3, -3]);
    }

    #[test]
    fn test_unity_is_untouched() {
        let mut samples = [1i16, -1, i16::MAX, i16::MIN];
        apply_volume(&mut samples, 1.0);
        assert_eq!(samples, [1, -1, i16::MAX, i16::MIN]);
    }

    #[test]
    fn test_silence_at_zero() {
        let mut samples = [1234i16, -4321];
        apply_volume(&mut samples, 0.0);
        assert_eq!(samples, [0, 0]);
    }

    #[test]
    fn test_le_bytes() {
        assert_eq!(samples_from_le_bytes(&[0x01, 0x00, 0xff, 0xff, 0x07]), vec![1, -1]);
    }

    #[test]
    fn test_percent_conversions() {
        assert_eq!(percent_to_factor(150), 1.5);
        assert_eq!(factor_to_percent(0.75), 75);
        assert_eq!(factor_to_percent(2.0), 200);
    }
}
