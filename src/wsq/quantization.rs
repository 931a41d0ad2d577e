//! Subband statistics, adaptive bit allocation and scalar (de)quantization.

use crate::constants::{
    LOW_BAND_VARIANCE_SUM, MAX_QUANTIZED_MAGNITUDE, MAX_SUBBANDS, NUM_SUBBANDS,
    START_SIZE_REGION_2, START_SIZE_REGION_3, START_SUBBAND_2, START_SUBBAND_3, VARIANCE_THRESHOLD,
    ZERO_BIN_FACTOR,
};
use crate::error::{WsqError, try_alloc};
use crate::wsq::tables::QuantizationTable;
use crate::wsq::tree::{QuantNode, WsqTrees};
use log::debug;

/// Bit allocation outcome: per-subband variance, bin width and zero-bin
/// width. A bin width of zero marks a subband that is not coded.
#[derive(Debug, Clone, PartialEq)]
pub struct QuantizationParams {
    pub bitrate: f32,
    pub variances: [f32; MAX_SUBBANDS],
    pub qbss: [f32; MAX_SUBBANDS],
    pub qzbs: [f32; MAX_SUBBANDS],
}

impl QuantizationParams {
    pub fn is_live(&self, subband: usize) -> bool {
        self.qbss[subband] != 0.0
    }

    pub fn live_subbands(&self) -> usize {
        (0..NUM_SUBBANDS).filter(|&s| self.is_live(s)).count()
    }

    pub fn table(&self) -> QuantizationTable {
        QuantizationTable {
            q_bin: self.qbss,
            z_bin: self.qzbs,
            ..QuantizationTable::default()
        }
    }
}

/// Shifts and scales 8-bit pixels to roughly [-128, 128].
///
/// Returns the float plane with the mean (`m_shift`) and scale (`r_scale`)
/// used. A flat image has nothing to scale and uses `r_scale = 1`.
pub fn normalize_pixels(pixels: &[u8]) -> Result<(Vec<f32>, f32, f32), WsqError> {
    let mut plane: Vec<f32> = try_alloc(pixels.len())?;
    if pixels.is_empty() {
        return Ok((plane, 0.0, 1.0));
    }

    let sum: u64 = pixels.iter().map(|&p| u64::from(p)).sum();
    let low = pixels.iter().copied().min().unwrap_or(0);
    let high = pixels.iter().copied().max().unwrap_or(0);

    let m_shift = (sum as f64 / pixels.len() as f64) as f32;
    let low_diff = m_shift - f32::from(low);
    let high_diff = f32::from(high) - m_shift;
    let mut r_scale = low_diff.max(high_diff) / 128.0;
    if r_scale == 0.0 {
        r_scale = 1.0;
    }

    for (value, &pixel) in plane.iter_mut().zip(pixels) {
        *value = (f32::from(pixel) - m_shift) / r_scale;
    }
    Ok((plane, m_shift, r_scale))
}

/// Inverse of [`normalize_pixels`], rounding and clamping to 8 bits.
pub fn denormalize_pixels(plane: &[f32], m_shift: f32, r_scale: f32, pixels: &mut [u8]) {
    for (pixel, &value) in pixels.iter_mut().zip(plane) {
        let restored = value * r_scale + m_shift + 0.5;
        *pixel = restored.clamp(0.0, 255.0) as u8;
    }
}

/// Variance of each coded subband, measured over a central window that
/// avoids the boundary-extension artefacts at the subband edges.
///
/// When the four lowest subbands are nearly flat the window says little,
/// so every subband is measured over its full extent instead.
pub fn variances(plane: &[f32], width: usize, q_tree: &[QuantNode]) -> [f32; MAX_SUBBANDS] {
    let mut result = [0.0f32; MAX_SUBBANDS];
    for (subband, node) in q_tree.iter().take(NUM_SUBBANDS).enumerate() {
        result[subband] = window_variance(plane, width, node, true);
    }

    let low_sum: f32 = result[..4].iter().sum();
    if low_sum < LOW_BAND_VARIANCE_SUM {
        debug!("low-band variance sum {low_sum} below threshold, measuring full subbands");
        for (subband, node) in q_tree.iter().take(NUM_SUBBANDS).enumerate() {
            result[subband] = window_variance(plane, width, node, false);
        }
    }
    result
}

/// Sample variance of one subband, over its central window or its full
/// extent.
fn window_variance(plane: &[f32], width: usize, node: &QuantNode, central: bool) -> f32 {
    let (skipx, skipy, lenx, leny) = if central {
        (node.lenx / 8, (9 * node.leny) / 32, (3 * node.lenx) / 4, (7 * node.leny) / 16)
    } else {
        (0, 0, node.lenx, node.leny)
    };
    let count = lenx * leny;
    if count < 2 {
        return 0.0;
    }

    let mut sum = 0.0f32;
    let mut sum_squares = 0.0f32;
    for row in 0..leny {
        let start = (node.y + skipy + row) * width + node.x + skipx;
        for &value in &plane[start..start + lenx] {
            sum += value;
            sum_squares += value * value;
        }
    }
    let sum2 = (sum * sum) / count as f32;
    (sum_squares - sum2) / (count as f32 - 1.0)
}

fn subband_weight(subband: usize) -> f32 {
    const HIGH_BAND_WEIGHTS: [f32; 8] = [1.32, 1.08, 1.42, 1.08, 1.32, 1.42, 1.08, 1.08];
    if subband < START_SUBBAND_3 {
        1.0
    } else {
        HIGH_BAND_WEIGHTS[subband - START_SUBBAND_3]
    }
}

/// Fraction of the image area covered by a subband of the given region.
fn area_fraction(subband: usize) -> f64 {
    if subband < START_SIZE_REGION_2 {
        1.0 / 1024.0
    } else if subband < START_SIZE_REGION_3 {
        1.0 / 256.0
    } else {
        1.0 / 16.0
    }
}

/// Solves for the bin widths that hit `bitrate` bits per pixel.
///
/// Subbands whose variance is below threshold are dropped. Among the rest,
/// those that would receive a non-positive rate are removed from the
/// solve and the proportionality constant is recomputed until none remain.
pub fn allocate_bins(variances: &[f32; MAX_SUBBANDS], bitrate: f32) -> QuantizationParams {
    let mut params = QuantizationParams {
        bitrate,
        variances: *variances,
        qbss: [0.0; MAX_SUBBANDS],
        qzbs: [0.0; MAX_SUBBANDS],
    };

    let mut sigma = [0.0f64; NUM_SUBBANDS];
    let mut initial = Vec::with_capacity(NUM_SUBBANDS);
    for subband in 0..NUM_SUBBANDS {
        let variance = variances[subband];
        if variance < VARIANCE_THRESHOLD {
            continue;
        }
        params.qbss[subband] = if subband < START_SIZE_REGION_2 {
            1.0
        } else {
            10.0 / (subband_weight(subband) * variance.ln())
        };
        sigma[subband] = f64::from(variance).sqrt();
        initial.push(subband);
    }

    let mut active = initial.clone();
    let mut iterations = 0;
    let q = loop {
        if active.is_empty() {
            break f64::INFINITY;
        }
        let s: f64 = active.iter().map(|&k| area_fraction(k)).sum();
        let p: f64 = active
            .iter()
            .map(|&k| (sigma[k] / f64::from(params.qbss[k])).powf(area_fraction(k)))
            .product();
        let q = (2f64.powf(f64::from(bitrate) / s - 1.0) / 2.5) / p.powf(1.0 / s);

        let before = active.len();
        active.retain(|&k| f64::from(params.qbss[k]) / q < 5.0 * sigma[k]);
        if active.len() == before {
            break q;
        }
        iterations += 1;
    };
    debug!(
        "bit allocation: {} of {} subbands above threshold, q={q}, {iterations} refinement(s)",
        initial.len(),
        NUM_SUBBANDS
    );

    // Every subband that passed the variance threshold keeps a bin, even
    // one removed during refinement.
    for subband in 0..NUM_SUBBANDS {
        if initial.contains(&subband) {
            params.qbss[subband] = (f64::from(params.qbss[subband]) / q) as f32;
        } else {
            params.qbss[subband] = 0.0;
        }
        params.qzbs[subband] = ZERO_BIN_FACTOR * params.qbss[subband];
    }
    params
}

/// Computes the variances and bin widths for `plane` and quantizes every
/// live subband, in subband order and row-major within each subband.
pub fn quantize(
    plane: &[f32],
    width: usize,
    q_tree: &[QuantNode],
    bitrate: f32,
) -> Result<(QuantizationParams, Vec<i32>), WsqError> {
    let params = allocate_bins(&variances(plane, width, q_tree), bitrate);

    let live_area: usize = (0..NUM_SUBBANDS)
        .filter(|&s| params.is_live(s))
        .map(|s| q_tree[s].area())
        .sum();
    let mut coefficients = Vec::new();
    coefficients
        .try_reserve_exact(live_area)
        .map_err(|_| WsqError::NotEnoughMemory)?;

    for (subband, node) in q_tree.iter().take(NUM_SUBBANDS).enumerate() {
        if !params.is_live(subband) {
            continue;
        }
        let bin = params.qbss[subband];
        let zero_bin = params.qzbs[subband] / 2.0;
        for row in node.y..node.y + node.leny {
            let start = row * width + node.x;
            for &value in &plane[start..start + node.lenx] {
                coefficients.push(quantize_value(value, bin, zero_bin));
            }
        }
    }
    Ok((params, coefficients))
}

/// Dead-zone quantizer; magnitudes saturate at what a 16-bit escape holds.
fn quantize_value(value: f32, bin: f32, zero_bin: f32) -> i32 {
    let limit = MAX_QUANTIZED_MAGNITUDE as f32;
    if -zero_bin <= value && value <= zero_bin {
        0
    } else if value > 0.0 {
        ((value - zero_bin) / bin + 1.0).min(limit) as i32
    } else {
        ((value + zero_bin) / bin - 1.0).max(-limit) as i32
    }
}

/// Number of quantized coefficients in each of the three entropy-coded
/// blocks, from the tree geometry less the dead subbands.
pub fn block_sizes(params: &QuantizationParams, trees: &WsqTrees) -> [usize; 3] {
    let w = &trees.wavelet;
    let q = &trees.quant;

    let mut sizes = [
        w[14].lenx * w[14].leny,
        w[5].leny * w[1].lenx + w[4].lenx * w[4].leny,
        w[2].lenx * w[2].leny + w[3].lenx * w[3].leny,
    ];
    let ranges = [
        0..START_SUBBAND_2,
        START_SUBBAND_2..START_SUBBAND_3,
        START_SUBBAND_3..NUM_SUBBANDS,
    ];
    for (size, range) in sizes.iter_mut().zip(ranges) {
        for subband in range {
            if !params.is_live(subband) {
                *size -= q[subband].area();
            }
        }
    }
    sizes
}

/// Number of coefficients a decoder must find for the given table.
pub fn coded_coefficient_count(table: &QuantizationTable, q_tree: &[QuantNode]) -> usize {
    (0..NUM_SUBBANDS)
        .filter(|&s| table.q_bin[s] != 0.0)
        .map(|s| q_tree[s].area())
        .sum()
}

/// Rebuilds the subband plane from quantized coefficients.
pub fn unquantize(
    coefficients: &[i32],
    table: &QuantizationTable,
    q_tree: &[QuantNode],
    width: usize,
    height: usize,
) -> Result<Vec<f32>, WsqError> {
    let expected = coded_coefficient_count(table, q_tree);
    if coefficients.len() != expected {
        return Err(WsqError::CoefficientCountMismatch {
            expected,
            actual: coefficients.len(),
        });
    }

    let mut plane: Vec<f32> = try_alloc(width * height)?;
    let center = table.bin_center;
    let mut source = coefficients.iter();

    for (subband, node) in q_tree.iter().take(NUM_SUBBANDS).enumerate() {
        let bin = table.q_bin[subband];
        if bin == 0.0 {
            continue;
        }
        let half_zero_bin = table.z_bin[subband] / 2.0;
        for row in node.y..node.y + node.leny {
            let start = row * width + node.x;
            let line = plane[start..start + node.lenx].iter_mut();
            for (value, &coefficient) in line.zip(&mut source) {
                let coefficient = coefficient as f32;
                *value = if coefficient > 0.0 {
                    bin * (coefficient - center) + half_zero_bin
                } else if coefficient < 0.0 {
                    bin * (coefficient + center) - half_zero_bin
                } else {
                    0.0
                };
            }
        }
    }
    Ok(plane)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::wsq::dwt::{ODD_HIGHPASS, ODD_LOWPASS, decompose};

    fn decomposed_plane(width: usize, height: usize) -> (Vec<f32>, WsqTrees) {
        let mut state = 7u32;
        let pixels: Vec<u8> = (0..width * height)
            .map(|i| {
                state = state.wrapping_mul(1_664_525).wrapping_add(1_013_904_223);
                let (x, y) = ((i % width) as f32, (i / width) as f32);
                let ridge = ((x * 0.31 + y * 0.17).sin() * 70.0) as i32;
                (128 + ridge + ((state >> 24) % 16) as i32 - 8).clamp(0, 255) as u8
            })
            .collect();
        let (mut plane, _, _) = normalize_pixels(&pixels).unwrap();
        let trees = WsqTrees::build(width, height);
        decompose(&mut plane, width, height, &trees.wavelet, &ODD_LOWPASS, &ODD_HIGHPASS).unwrap();
        (plane, trees)
    }

    #[test]
    fn test_normalize_round_trip() {
        let pixels: Vec<u8> = (0..=255).collect();
        let (plane, m_shift, r_scale) = normalize_pixels(&pixels).unwrap();
        assert!((m_shift - 127.5).abs() < 1e-4);
        assert!((r_scale - 127.5 / 128.0).abs() < 1e-6);
        assert!(plane.iter().all(|v| v.abs() <= 128.0));

        let mut restored = vec![0u8; pixels.len()];
        denormalize_pixels(&plane, m_shift, r_scale, &mut restored);
        assert_eq!(restored, pixels);
    }

    #[test]
    fn test_normalize_flat_image() {
        let (plane, m_shift, r_scale) = normalize_pixels(&[128u8; 64]).unwrap();
        assert_eq!(m_shift, 128.0);
        assert_eq!(r_scale, 1.0);
        assert!(plane.iter().all(|&v| v == 0.0));
    }

    #[test]
    fn test_denormalize_clamps() {
        let mut pixels = [0u8; 3];
        denormalize_pixels(&[-500.0, 0.0, 500.0], 128.0, 1.0, &mut pixels);
        assert_eq!(pixels, [0, 128, 255]);
    }

    #[test]
    fn test_variance_of_flat_plane_is_zero() {
        let trees = WsqTrees::build(256, 256);
        let plane = vec![3.0f32; 256 * 256];
        let result = variances(&plane, 256, &trees.quant);
        assert!(result.iter().all(|&v| v.abs() < 1e-3));

        let params = allocate_bins(&result, 0.75);
        assert_eq!(params.live_subbands(), 0);
        assert_eq!(block_sizes(&params, &trees), [0, 0, 0]);
    }

    /// Writes `value` along the first row of a subband, outside its
    /// central window.
    fn mark_edge_row(plane: &mut [f32], width: usize, node: &QuantNode, value: f32) {
        let start = node.y * width + node.x;
        for (col, sample) in plane[start..start + node.lenx].iter_mut().enumerate() {
            *sample = if col % 2 == 0 { value } else { -value };
        }
    }

    fn full_variance(plane: &[f32], width: usize, node: &QuantNode) -> f32 {
        let values: Vec<f64> = (node.y..node.y + node.leny)
            .flat_map(|row| plane[row * width + node.x..row * width + node.x + node.lenx].iter())
            .map(|&v| f64::from(v))
            .collect();
        let mean = values.iter().sum::<f64>() / values.len() as f64;
        let squares: f64 = values.iter().map(|v| (v - mean) * (v - mean)).sum();
        (squares / (values.len() as f64 - 1.0)) as f32
    }

    #[test]
    fn test_flat_low_bands_use_full_subbands() {
        let trees = WsqTrees::build(256, 256);
        let mut plane = vec![0.0f32; 256 * 256];
        mark_edge_row(&mut plane, 256, &trees.quant[0], 4.0);
        mark_edge_row(&mut plane, 256, &trees.quant[20], 9.0);

        let result = variances(&plane, 256, &trees.quant);
        for subband in [0, 20] {
            let expected = full_variance(&plane, 256, &trees.quant[subband]);
            assert!(expected > 0.0);
            assert!((result[subband] - expected).abs() < 1e-3 * expected);
        }
        assert_eq!(result[1], 0.0);
    }

    #[test]
    fn test_busy_low_bands_keep_central_window() {
        let trees = WsqTrees::build(256, 256);
        let mut plane = vec![0.0f32; 256 * 256];
        for node in &trees.quant[..4] {
            for row in node.y..node.y + node.leny {
                for col in node.x..node.x + node.lenx {
                    plane[row * 256 + col] = if (row + col) % 2 == 0 { 150.0 } else { -150.0 };
                }
            }
        }
        mark_edge_row(&mut plane, 256, &trees.quant[20], 9.0);

        let result = variances(&plane, 256, &trees.quant);
        assert!(result[..4].iter().sum::<f32>() >= LOW_BAND_VARIANCE_SUM);
        assert_eq!(result[20], 0.0);
    }

    #[test]
    fn test_block_sizes_match_live_areas() {
        let (plane, trees) = decomposed_plane(320, 300);
        let (params, coefficients) = quantize(&plane, 320, &trees.quant, 0.75).unwrap();
        let sizes = block_sizes(&params, &trees);

        let live_area = |range: std::ops::Range<usize>| -> usize {
            range
                .filter(|&s| params.is_live(s))
                .map(|s| trees.quant[s].area())
                .sum()
        };
        assert_eq!(sizes[0], live_area(0..START_SUBBAND_2));
        assert_eq!(sizes[1], live_area(START_SUBBAND_2..START_SUBBAND_3));
        assert_eq!(sizes[2], live_area(START_SUBBAND_3..NUM_SUBBANDS));
        assert_eq!(sizes.iter().sum::<usize>(), coefficients.len());
    }

    #[test]
    fn test_higher_bitrate_never_loses_subbands() {
        let (plane, trees) = decomposed_plane(256, 256);
        let variances = variances(&plane, 256, &trees.quant);

        let mut previous_live = 0;
        for bitrate in [0.5, 0.75, 1.5, 2.25, 4.0] {
            let params = allocate_bins(&variances, bitrate);
            assert!(params.live_subbands() > 0);
            assert!(params.live_subbands() >= previous_live);
            for subband in 0..NUM_SUBBANDS {
                if params.is_live(subband) {
                    assert!(params.qbss[subband] > 0.0);
                    assert!((params.qzbs[subband] - 1.2 * params.qbss[subband]).abs() < 1e-4);
                } else {
                    assert_eq!(params.qzbs[subband], 0.0);
                }
            }
            previous_live = params.live_subbands();
        }
    }

    #[test]
    fn test_quantize_value_dead_zone() {
        assert_eq!(quantize_value(0.5, 1.0, 0.6), 0);
        assert_eq!(quantize_value(-0.6, 1.0, 0.6), 0);
        assert_eq!(quantize_value(0.61, 1.0, 0.6), 1);
        assert_eq!(quantize_value(2.7, 1.0, 0.6), 3);
        assert_eq!(quantize_value(-2.7, 1.0, 0.6), -3);
    }

    #[test]
    fn test_quantize_value_uses_full_escape_range() {
        assert_eq!(quantize_value(40_000.0, 1.0, 0.0), 40_001);
        assert_eq!(quantize_value(-40_000.0, 1.0, 0.0), -40_001);
        assert_eq!(quantize_value(1.0e9, 1.0e-3, 0.0), 65_535);
        assert_eq!(quantize_value(-1.0e9, 1.0e-3, 0.0), -65_535);
    }

    #[test]
    fn test_unquantize_error_is_bounded_by_bin_width() {
        let (plane, trees) = decomposed_plane(256, 256);
        let (params, coefficients) = quantize(&plane, 256, &trees.quant, 2.25).unwrap();
        let table = params.table();
        let restored = unquantize(&coefficients, &table, &trees.quant, 256, 256).unwrap();

        for (subband, node) in trees.quant.iter().take(NUM_SUBBANDS).enumerate() {
            if !params.is_live(subband) {
                continue;
            }
            let limit = params.qzbs[subband].max(params.qbss[subband]) + 1e-3;
            for row in node.y..node.y + node.leny {
                for col in node.x..node.x + node.lenx {
                    let index = row * 256 + col;
                    assert!(
                        (restored[index] - plane[index]).abs() <= limit,
                        "subband {subband} error exceeds bin width"
                    );
                }
            }
        }
    }

    #[test]
    fn test_unquantize_rejects_short_input() {
        let trees = WsqTrees::build(256, 256);
        let mut table = QuantizationTable::default();
        table.q_bin[0] = 1.0;
        table.z_bin[0] = 1.2;
        let result = unquantize(&[1, 2, 3], &table, &trees.quant, 256, 256);
        assert_eq!(
            result,
            Err(WsqError::CoefficientCountMismatch {
                expected: 64,
                actual: 3
            })
        );
    }
}
