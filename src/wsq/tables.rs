//! Table and header records carried by WSQ marker segments, plus the
//! decimal scale/mantissa encoding they use for real numbers.

use crate::constants::{BIN_CENTER, BLACK_LEVEL, MAX_SUBBANDS, WHITE_LEVEL};
use crate::error::WsqError;

/// Longest filter accepted from a transform table.
pub const MAX_FILTER_TAPS: usize = 16;

/// Synthesis filter pair used to invert the wavelet decomposition.
#[derive(Debug, Clone, PartialEq)]
pub struct TransformTable {
    pub lowpass: Vec<f32>,
    pub highpass: Vec<f32>,
}

impl TransformTable {
    /// Builds the synthesis pair from the upper halves of the analysis
    /// filters, as carried on the wire.
    ///
    /// The synthesis highpass is the analysis lowpass with alternating signs
    /// and the synthesis lowpass is the analysis highpass with alternating
    /// signs; both are mirrored about their centre.
    pub fn from_half_filters(
        analysis_lowpass_len: usize,
        lowpass_half: &[f32],
        analysis_highpass_len: usize,
        highpass_half: &[f32],
    ) -> Self {
        debug_assert_eq!(lowpass_half.len(), analysis_lowpass_len.div_ceil(2));
        debug_assert_eq!(highpass_half.len(), analysis_highpass_len.div_ceil(2));

        let mut highpass = vec![0.0f32; analysis_lowpass_len];
        let center = lowpass_half.len() - 1;
        for (cnt, &value) in lowpass_half.iter().enumerate() {
            if analysis_lowpass_len % 2 == 1 {
                highpass[cnt + center] = alternate_sign(cnt) * value;
                if cnt > 0 {
                    highpass[center - cnt] = highpass[cnt + center];
                }
            } else {
                highpass[cnt + center + 1] = alternate_sign(cnt) * value;
                highpass[center - cnt] = -highpass[cnt + center + 1];
            }
        }

        let mut lowpass = vec![0.0f32; analysis_highpass_len];
        let center = highpass_half.len() - 1;
        for (cnt, &value) in highpass_half.iter().enumerate() {
            if analysis_highpass_len % 2 == 1 {
                lowpass[cnt + center] = alternate_sign(cnt) * value;
                if cnt > 0 {
                    lowpass[center - cnt] = lowpass[cnt + center];
                }
            } else {
                lowpass[cnt + center + 1] = alternate_sign(cnt + 1) * value;
                lowpass[center - cnt] = lowpass[cnt + center + 1];
            }
        }

        Self { lowpass, highpass }
    }

    /// Checks that an analysis filter pair has a shape the transform can
    /// invert: both lengths in 2..=16 and of the same parity.
    pub fn check_filter_lengths(lowpass_len: usize, highpass_len: usize) -> Result<(), WsqError> {
        let taps = 2..=MAX_FILTER_TAPS;
        if !taps.contains(&lowpass_len)
            || !taps.contains(&highpass_len)
            || lowpass_len % 2 != highpass_len % 2
        {
            return Err(WsqError::InvalidTransformFilters {
                lowpass: lowpass_len,
                highpass: highpass_len,
            });
        }
        Ok(())
    }

    pub fn from_analysis(lowpass: &[f32], highpass: &[f32]) -> Self {
        Self::from_half_filters(
            lowpass.len(),
            &lowpass[lowpass.len() / 2..],
            highpass.len(),
            &highpass[highpass.len() / 2..],
        )
    }
}

fn alternate_sign(power: usize) -> f32 {
    if power % 2 == 0 { 1.0 } else { -1.0 }
}

/// Per-subband quantizer bins.
#[derive(Debug, Clone, PartialEq)]
pub struct QuantizationTable {
    pub bin_center: f32,
    pub q_bin: [f32; MAX_SUBBANDS],
    pub z_bin: [f32; MAX_SUBBANDS],
}

impl Default for QuantizationTable {
    fn default() -> Self {
        Self {
            bin_center: BIN_CENTER,
            q_bin: [0.0; MAX_SUBBANDS],
            z_bin: [0.0; MAX_SUBBANDS],
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FrameHeader {
    pub black: u8,
    pub white: u8,
    pub width: u16,
    pub height: u16,
    pub m_shift: f32,
    pub r_scale: f32,
    pub wsq_encoder: u8,
    pub software: u16,
}

impl FrameHeader {
    pub fn new(width: u16, height: u16, m_shift: f32, r_scale: f32) -> Self {
        Self {
            black: BLACK_LEVEL,
            white: WHITE_LEVEL,
            width,
            height,
            m_shift,
            r_scale,
            wsq_encoder: 0,
            software: 0,
        }
    }
}

/// Splits a non-negative value into `(scale, mantissa)` with
/// `value ~= mantissa / 10^scale` and as many digits as fit in 16 bits.
///
/// Zero maps to `(0, 0)`. Returns `None` for values that do not fit.
pub fn encode_scaled_u16(value: f32) -> Option<(u8, u16)> {
    let value = f64::from(value);
    if value == 0.0 {
        return Some((0, 0));
    }
    if !(value > 0.0 && value < 65535.0) {
        return None;
    }
    let (scale, mantissa) = scale_to(value, 65535.0);
    Some((scale, u16::try_from(mantissa).ok()?))
}

/// Splits a filter coefficient into `(sign, scale, mantissa)` with a 32-bit
/// mantissa. Returns `None` for magnitudes that do not fit.
pub fn encode_scaled_u32(value: f32) -> Option<(u8, u8, u32)> {
    let sign = u8::from(value < 0.0);
    let magnitude = f64::from(value).abs();
    if magnitude == 0.0 {
        return Some((sign, 0, 0));
    }
    if !(magnitude < 4294967295.0) {
        return None;
    }
    let (scale, mantissa) = scale_to(magnitude, 4294967295.0);
    Some((sign, scale, u32::try_from(mantissa).ok()?))
}

fn scale_to(mut value: f64, limit: f64) -> (u8, u64) {
    let mut scale: u8 = 0;
    while value < limit {
        scale += 1;
        value *= 10.0;
    }
    // One step back so the mantissa stays below the limit.
    (scale - 1, (value / 10.0).round() as u64)
}

pub fn decode_scaled(scale: u8, mantissa: u32) -> f32 {
    let mut value = f64::from(mantissa);
    for _ in 0..scale {
        value /= 10.0;
    }
    value as f32
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::wsq::dwt::{EVEN_HIGHPASS, EVEN_LOWPASS, ODD_HIGHPASS, ODD_LOWPASS};

    #[test]
    fn test_scaled_u16_values() {
        assert_eq!(encode_scaled_u16(0.0), Some((0, 0)));
        assert_eq!(encode_scaled_u16(128.0), Some((2, 12800)));
        assert_eq!(encode_scaled_u16(65535.0), None);
        assert_eq!(encode_scaled_u16(-1.0), None);

        let (scale, mantissa) = encode_scaled_u16(3.14159).unwrap();
        assert_eq!((scale, mantissa), (4, 31416));
        assert!((decode_scaled(scale, u32::from(mantissa)) - 3.1416).abs() < 1e-6);
    }

    #[test]
    fn test_scaled_u32_keeps_coefficient_precision() {
        for &coefficient in ODD_LOWPASS.iter().chain(ODD_HIGHPASS.iter()) {
            let (sign, scale, mantissa) = encode_scaled_u32(coefficient).unwrap();
            let mut decoded = decode_scaled(scale, mantissa);
            if sign != 0 {
                decoded = -decoded;
            }
            assert!((decoded - coefficient).abs() < 1e-7);
        }
    }

    #[test]
    fn test_synthesis_filters_odd_bank() {
        let table = TransformTable::from_analysis(&ODD_LOWPASS, &ODD_HIGHPASS);
        assert_eq!(table.highpass.len(), 9);
        assert_eq!(table.lowpass.len(), 7);

        // Synthesis filters are symmetric.
        for i in 0..9 {
            assert_eq!(table.highpass[i], table.highpass[8 - i]);
        }
        for i in 0..7 {
            assert_eq!(table.lowpass[i], table.lowpass[6 - i]);
        }

        assert_eq!(table.highpass[4], ODD_LOWPASS[4]);
        assert_eq!(table.highpass[5], -ODD_LOWPASS[5]);
        assert_eq!(table.lowpass[3], ODD_HIGHPASS[3]);
        assert_eq!(table.lowpass[4], -ODD_HIGHPASS[4]);
    }

    #[test]
    fn test_synthesis_filters_even_bank() {
        let table = TransformTable::from_analysis(&EVEN_LOWPASS, &EVEN_HIGHPASS);
        assert_eq!(table.highpass.len(), 8);
        assert_eq!(table.lowpass.len(), 8);
        assert_eq!(table.highpass[4], EVEN_LOWPASS[4]);
        assert_eq!(table.highpass[3], -EVEN_LOWPASS[4]);
        assert_eq!(table.lowpass[4], -EVEN_HIGHPASS[4]);
        assert_eq!(table.lowpass[3], -EVEN_HIGHPASS[4]);
    }

    #[test]
    fn test_filter_length_check() {
        assert_eq!(TransformTable::check_filter_lengths(9, 7), Ok(()));
        assert_eq!(TransformTable::check_filter_lengths(8, 8), Ok(()));
        assert_eq!(TransformTable::check_filter_lengths(2, 16), Ok(()));
        for (lowpass, highpass) in [(1, 1), (2, 3), (9, 8), (18, 16), (0, 7)] {
            assert_eq!(
                TransformTable::check_filter_lengths(lowpass, highpass),
                Err(WsqError::InvalidTransformFilters { lowpass, highpass })
            );
        }
    }
}
