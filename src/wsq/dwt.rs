//! Separable two-channel wavelet transform with symmetric boundary extension.
//!
//! `decompose` applies the analysis filters to every node of the wavelet tree
//! (rows first, then columns); `reconstruct` walks the tree backwards with
//! the synthesis filters. Both work in place on a row-major float plane and
//! use one scratch plane of the same size.
//!
//! Boundary handling never reads outside a line: a read cursor bounces off
//! the first and last sample, optionally repeating the edge sample once
//! (whole- vs half-sample symmetry) as selected by the filter and line parity.

use crate::error::{WsqError, try_alloc};
use crate::wsq::tables::TransformTable;
use crate::wsq::tree::WaveletNode;

/// 9-tap analysis lowpass filter.
pub const ODD_LOWPASS: [f32; 9] = [
    0.037_828_455_506_995_46,
    -0.023_849_465_019_380_00,
    -0.110_624_404_418_423_42,
    0.377_402_855_612_653_80,
    0.852_698_679_009_403_44,
    0.377_402_855_612_653_80,
    -0.110_624_404_418_423_42,
    -0.023_849_465_019_380_00,
    0.037_828_455_506_995_46,
];

/// 7-tap analysis highpass filter.
pub const ODD_HIGHPASS: [f32; 7] = [
    0.064_538_882_628_938_45,
    -0.040_689_417_609_558_44,
    -0.418_092_273_222_212_21,
    0.788_485_616_405_664_39,
    -0.418_092_273_222_212_21,
    -0.040_689_417_609_558_44,
    0.064_538_882_628_938_45,
];

pub const EVEN_LOWPASS: [f32; 8] = [
    0.075_656_911_013_990_93,
    -0.123_355_841_052_750_92,
    -0.097_892_967_784_095_87,
    0.852_698_679_009_403_44,
    0.852_698_679_009_403_44,
    -0.097_892_967_784_095_87,
    -0.123_355_841_052_750_92,
    0.075_656_911_013_990_93,
];

pub const EVEN_HIGHPASS: [f32; 8] = [
    0.032_269_441_314_469_22,
    -0.052_614_150_119_248_44,
    -0.188_701_427_806_326_93,
    0.603_288_944_813_938_47,
    -0.603_288_944_813_938_47,
    0.188_701_427_806_326_93,
    0.052_614_150_119_248_44,
    -0.032_269_441_314_469_22,
];

#[cfg(not(feature = "even-filter-bank"))]
pub const ANALYSIS_LOWPASS: &[f32] = &ODD_LOWPASS;
#[cfg(not(feature = "even-filter-bank"))]
pub const ANALYSIS_HIGHPASS: &[f32] = &ODD_HIGHPASS;

#[cfg(feature = "even-filter-bank")]
pub const ANALYSIS_LOWPASS: &[f32] = &EVEN_LOWPASS;
#[cfg(feature = "even-filter-bank")]
pub const ANALYSIS_HIGHPASS: &[f32] = &EVEN_HIGHPASS;

/// Decomposes `plane` into subbands in place.
pub fn decompose(
    plane: &mut [f32],
    width: usize,
    height: usize,
    tree: &[WaveletNode],
    lowpass: &[f32],
    highpass: &[f32],
) -> Result<(), WsqError> {
    let mut scratch: Vec<f32> = try_alloc(width * height)?;

    for node in tree {
        let base = node.y * width + node.x;
        split_lines(
            &mut scratch,
            0,
            plane,
            base,
            LineLayout::new(node.leny, node.lenx, width, 1),
            highpass,
            lowpass,
            node.inv_rw,
        )?;
        split_lines(
            plane,
            base,
            &scratch,
            0,
            LineLayout::new(node.lenx, node.leny, 1, width),
            highpass,
            lowpass,
            node.inv_cl,
        )?;
    }
    Ok(())
}

/// Rebuilds the pixel plane from its subbands in place.
pub fn reconstruct(
    plane: &mut [f32],
    width: usize,
    height: usize,
    tree: &[WaveletNode],
    table: &TransformTable,
) -> Result<(), WsqError> {
    let mut scratch: Vec<f32> = try_alloc(width * height)?;

    for node in tree.iter().rev() {
        let base = node.y * width + node.x;
        join_lines(
            &mut scratch,
            0,
            plane,
            base,
            LineLayout::new(node.lenx, node.leny, 1, width),
            &table.highpass,
            &table.lowpass,
            node.inv_cl,
        )?;
        join_lines(
            plane,
            base,
            &scratch,
            0,
            LineLayout::new(node.leny, node.lenx, width, 1),
            &table.highpass,
            &table.lowpass,
            node.inv_rw,
        )?;
    }
    Ok(())
}

/// `count` lines of `len` samples; lines start `pitch` apart and samples
/// within a line are `stride` apart.
#[derive(Debug, Clone, Copy)]
struct LineLayout {
    count: usize,
    len: usize,
    pitch: usize,
    stride: usize,
}

impl LineLayout {
    fn new(count: usize, len: usize, pitch: usize, stride: usize) -> Self {
        Self {
            count,
            len,
            pitch,
            stride,
        }
    }

    /// Lowpass and highpass half lengths; the lowpass half takes the extra
    /// sample of an odd line.
    fn halves(&self) -> (usize, usize) {
        if self.len % 2 == 1 {
            let low = self.len.div_ceil(2);
            (low, low - 1)
        } else {
            (self.len / 2, self.len / 2)
        }
    }
}

/// Read cursor that reflects at the ends of a line `[first, last]`.
#[derive(Debug, Clone, Copy)]
struct Cursor {
    at: isize,
    step: isize,
    repeat_first: bool,
    repeat_last: bool,
}

impl Cursor {
    fn new(at: isize, step: isize, repeat_first: bool, repeat_last: bool) -> Self {
        Self {
            at,
            step,
            repeat_first,
            repeat_last,
        }
    }

    /// Turns around at the line ends. The first arrival at an end with its
    /// repeat flag set stays on the edge sample for one more read.
    fn bounce(&mut self, first: isize, last: isize, forward: isize) {
        if self.at == first {
            if self.repeat_first {
                self.step = 0;
                self.repeat_first = false;
            } else {
                self.step = forward;
            }
        }
        if self.at == last {
            if self.repeat_last {
                self.step = 0;
                self.repeat_last = false;
            } else {
                self.step = -forward;
            }
        }
    }

    /// Moves a filter's start position, which only ever reflects at the
    /// first sample.
    fn advance(&mut self, first: isize, forward: isize) {
        if self.at == first {
            if self.repeat_first {
                self.step = 0;
                self.repeat_first = false;
            } else {
                self.step = forward;
            }
        }
        self.at += self.step;
    }
}

#[inline]
fn sample(data: &[f32], at: isize) -> Result<f32, WsqError> {
    usize::try_from(at)
        .ok()
        .and_then(|index| data.get(index).copied())
        .ok_or(WsqError::TransformIndexOutOfRange { index: at })
}

#[inline]
fn slot(data: &mut [f32], index: usize) -> Result<&mut f32, WsqError> {
    data.get_mut(index).ok_or(WsqError::TransformIndexOutOfRange {
        index: index as isize,
    })
}

/// Full convolution of `taps` starting at the cursor, as used by analysis.
fn analysis_tap(
    data: &[f32],
    start: Cursor,
    first: isize,
    last: isize,
    forward: isize,
    taps: &[f32],
) -> Result<f32, WsqError> {
    let mut cursor = start;
    let mut acc = 0.0f32;
    for (index, &tap) in taps.iter().enumerate() {
        if index > 0 {
            cursor.bounce(first, last, forward);
            cursor.at += cursor.step;
        }
        acc += sample(data, cursor.at)? * tap;
    }
    Ok(acc)
}

/// Splits each line of `old` into a lowpass and a highpass half in `new`.
/// With `inv` the highpass half is stored first.
#[allow(clippy::too_many_arguments)]
fn split_lines(
    new: &mut [f32],
    new_base: usize,
    old: &[f32],
    old_base: usize,
    layout: LineLayout,
    highpass: &[f32],
    lowpass: &[f32],
    inv: bool,
) -> Result<(), WsqError> {
    let lsz = lowpass.len() as isize;
    let hsz = highpass.len() as isize;
    let odd_filter = lsz % 2 == 1;
    let odd_data = layout.len % 2 == 1;

    let (mut loc, mut hoc, mut low_repeat_first, mut high_repeat_first, repeat_last);
    let sign: f32;
    if odd_filter {
        loc = (lsz - 1) / 2;
        hoc = (hsz - 1) / 2 - 1;
        low_repeat_first = false;
        high_repeat_first = false;
        repeat_last = false;
        sign = 1.0;
    } else {
        loc = lsz / 2 - 2;
        hoc = hsz / 2 - 2;
        low_repeat_first = true;
        high_repeat_first = true;
        repeat_last = true;
        if loc == -1 {
            loc = 0;
            low_repeat_first = false;
        }
        if hoc == -1 {
            hoc = 0;
            high_repeat_first = false;
        }
        // Even banks use the negated highpass.
        sign = -1.0;
    }

    let (llen, hlen) = layout.halves();
    let stride = layout.stride;
    let forward = stride as isize;

    for line in 0..layout.count {
        let start = new_base + line * layout.pitch;
        let (mut lopass, mut hipass) = if inv {
            (start + hlen * stride, start)
        } else {
            (start, start + llen * stride)
        };

        let first = (old_base + line * layout.pitch) as isize;
        let last = first + (layout.len as isize - 1) * forward;

        let mut low = Cursor::new(first + loc * forward, -forward, low_repeat_first, repeat_last);
        let mut high = Cursor::new(first + hoc * forward, -forward, high_repeat_first, repeat_last);

        for _ in 0..hlen {
            *slot(new, lopass)? = analysis_tap(old, low, first, last, forward, lowpass)?;
            lopass += stride;
            *slot(new, hipass)? = sign * analysis_tap(old, high, first, last, forward, highpass)?;
            hipass += stride;

            for _ in 0..2 {
                low.advance(first, forward);
                high.advance(first, forward);
            }
        }
        if odd_data {
            *slot(new, lopass)? = analysis_tap(old, low, first, last, forward, lowpass)?;
        }
    }
    Ok(())
}

/// Synthesis lowpass contribution: every other tap starting at `tap`.
fn synthesis_low(
    data: &[f32],
    start: Cursor,
    first: isize,
    last: isize,
    forward: isize,
    taps: &[f32],
    tap: usize,
) -> Result<f32, WsqError> {
    if tap >= taps.len() {
        return Err(WsqError::TransformIndexOutOfRange { index: tap as isize });
    }
    let mut cursor = start;
    let mut acc = 0.0f32;
    for (index, &value) in taps.iter().skip(tap).step_by(2).enumerate() {
        if index > 0 {
            cursor.bounce(first, last, forward);
            cursor.at += cursor.step;
        }
        acc += sample(data, cursor.at)? * value;
    }
    Ok(acc)
}

/// Highpass boundary state for asymmetric (even-length) filters: `factor`
/// scales samples read past an edge and `fold` counts the remaining
/// repeats at the last sample.
#[derive(Debug, Clone, Copy)]
struct HighBoundary {
    factor: f32,
    fold: i32,
}

/// Synthesis highpass contribution: every other tap starting at `tap`.
#[allow(clippy::too_many_arguments)]
fn synthesis_high(
    data: &[f32],
    start: Cursor,
    boundary: &mut HighBoundary,
    first: isize,
    last: isize,
    forward: isize,
    taps: &[f32],
    tap: usize,
    asymmetric: bool,
    odd_data: bool,
) -> Result<f32, WsqError> {
    let mut cursor = start;
    let mut acc = 0.0f32;
    for &value in taps.iter().skip(tap).step_by(2) {
        if cursor.at == first {
            if cursor.repeat_first {
                cursor.step = 0;
                cursor.repeat_first = false;
            } else {
                cursor.step = forward;
                boundary.factor = 1.0;
            }
        }
        if cursor.at == last {
            if cursor.repeat_last {
                cursor.step = 0;
                cursor.repeat_last = false;
                if asymmetric && odd_data {
                    cursor.repeat_last = true;
                    boundary.fold -= 1;
                    boundary.factor = boundary.fold as f32;
                    if boundary.fold == 0 {
                        cursor.repeat_last = false;
                    }
                }
            } else {
                cursor.step = -forward;
                if asymmetric {
                    boundary.factor = -1.0;
                }
            }
        }
        acc += sample(data, cursor.at)? * value * boundary.factor;
        cursor.at += cursor.step;
    }
    Ok(acc)
}

/// Interleaves the lowpass and highpass halves of each line of `old` back
/// into full lines in `new`.
#[allow(clippy::too_many_arguments)]
fn join_lines(
    new: &mut [f32],
    new_base: usize,
    old: &[f32],
    old_base: usize,
    layout: LineLayout,
    highpass: &[f32],
    lowpass: &[f32],
    inv: bool,
) -> Result<(), WsqError> {
    let lsz = lowpass.len() as isize;
    let hsz = highpass.len() as isize;
    let odd_filter = lsz % 2 == 1;
    let odd_data = layout.len % 2 == 1;

    let asymmetric;
    let start_factor: f32;
    let start_fold: i32;
    let (mut loc, mut hoc, lotap, hotap);
    let (mut olle, olre, mut ohle, ohre);
    let sign: f32;
    if odd_filter {
        asymmetric = false;
        start_factor = 1.0;
        start_fold = 0;
        loc = (lsz - 1) / 4;
        hoc = (hsz + 1) / 4 - 1;
        lotap = (((lsz - 1) / 2) % 2) as usize;
        hotap = (((hsz + 1) / 2) % 2) as usize;
        if odd_data {
            (olle, olre, ohle, ohre) = (false, false, true, true);
        } else {
            (olle, olre, ohle, ohre) = (false, true, true, false);
        }
        sign = 1.0;
    } else {
        asymmetric = true;
        start_factor = -1.0;
        start_fold = 2;
        loc = lsz / 4 - 1;
        hoc = hsz / 4 - 1;
        lotap = ((lsz / 2) % 2) as usize;
        hotap = ((hsz / 2) % 2) as usize;
        if odd_data {
            (olle, olre, ohle, ohre) = (true, false, true, true);
        } else {
            (olle, olre, ohle, ohre) = (true, true, true, true);
        }
        if loc == -1 {
            loc = 0;
            olle = false;
        }
        if hoc == -1 {
            hoc = 0;
            ohle = false;
        }
        sign = -1.0;
    }

    let (llen, hlen) = layout.halves();
    let stride = layout.stride;
    let forward = stride as isize;

    for line in 0..layout.count {
        let mut limg = new_base + line * layout.pitch;
        let mut himg = limg;
        *slot(new, himg)? = 0.0;
        if layout.len > 1 {
            *slot(new, himg + stride)? = 0.0;
        }

        let start = old_base + line * layout.pitch;
        let (lopass, hipass) = if inv {
            (start + hlen * stride, start)
        } else {
            (start, start + llen * stride)
        };

        let lp0 = lopass as isize;
        let lp1 = lp0 + (llen as isize - 1) * forward;
        let mut low = Cursor::new(lp0 + loc * forward, -forward, olle, olre);
        let mut lstap = lotap;

        let hp0 = hipass as isize;
        let hp1 = hp0 + (hlen as isize - 1) * forward;
        let mut high = Cursor::new(hp0 + hoc * forward, -forward, ohle, ohre);
        let mut hstap = hotap;
        let mut line_factor = start_factor;
        let mut boundary = HighBoundary {
            factor: start_factor,
            fold: start_fold,
        };

        for _ in 0..hlen {
            for tap in (0..=lstap).rev() {
                *slot(new, limg)? = synthesis_low(old, low, lp0, lp1, forward, lowpass, tap)?;
                limg += stride;
            }
            low.advance(lp0, forward);
            lstap = 1;

            for tap in (0..=hstap).rev() {
                boundary = HighBoundary {
                    factor: line_factor,
                    fold: start_fold,
                };
                let value = synthesis_high(
                    old,
                    high,
                    &mut boundary,
                    hp0,
                    hp1,
                    forward,
                    highpass,
                    tap,
                    asymmetric,
                    odd_data,
                )?;
                *slot(new, himg)? += sign * value;
                himg += stride;
            }
            if high.at == hp0 {
                if high.repeat_first {
                    high.step = 0;
                    high.repeat_first = false;
                } else {
                    high.step = forward;
                    line_factor = 1.0;
                }
            }
            high.at += high.step;
            hstap = 1;
        }

        let lstap = match (odd_data, lotap == 1) {
            (true, true) => 1,
            (true, false) => 0,
            (false, true) => 2,
            (false, false) => 1,
        };
        for tap in (lstap..=1).rev() {
            *slot(new, limg)? = synthesis_low(old, low, lp0, lp1, forward, lowpass, tap)?;
            limg += stride;
        }

        let hstap = if odd_data {
            if hsz == 2 {
                high.at -= high.step;
                boundary.fold = 1;
            }
            if hotap == 1 { 1 } else { 0 }
        } else if hotap == 1 {
            2
        } else {
            1
        };
        for tap in (hstap..=1).rev() {
            boundary.factor = line_factor;
            if hsz != 2 {
                boundary.fold = start_fold;
            }
            let value = synthesis_high(
                old,
                high,
                &mut boundary,
                hp0,
                hp1,
                forward,
                highpass,
                tap,
                asymmetric,
                odd_data,
            )?;
            *slot(new, himg)? += sign * value;
            himg += stride;
        }
    }
    Ok(())
}
