//! Decomposition geometry.
//!
//! The wavelet tree lists the 20 rectangles the transform filters, in
//! analysis order. The quantization tree lists the 64 rectangles that make
//! up the coded subbands (only the first 60 carry data).

use crate::constants::{QUANT_TREE_LEN, WAVELET_TREE_LEN};
use log::trace;

/// A rectangle to be split by one analysis step.
///
/// `inv_rw` / `inv_cl` swap the order of the low and high halves when
/// filtering rows / columns.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WaveletNode {
    pub x: usize,
    pub y: usize,
    pub lenx: usize,
    pub leny: usize,
    pub inv_rw: bool,
    pub inv_cl: bool,
}

/// A subband rectangle.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct QuantNode {
    pub x: usize,
    pub y: usize,
    pub lenx: usize,
    pub leny: usize,
}

impl QuantNode {
    pub fn area(&self) -> usize {
        self.lenx * self.leny
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WsqTrees {
    pub wavelet: [WaveletNode; WAVELET_TREE_LEN],
    pub quant: [QuantNode; QUANT_TREE_LEN],
}

impl WsqTrees {
    pub fn build(width: usize, height: usize) -> Self {
        let wavelet = build_wavelet_tree(width, height);
        let trees = Self {
            quant: build_quant_tree(&wavelet),
            wavelet,
        };
        for (index, node) in trees.wavelet.iter().enumerate() {
            trace!(
                "w_tree[{index}] x={} y={} {}x{} inv_rw={} inv_cl={}",
                node.x, node.y, node.lenx, node.leny, node.inv_rw, node.inv_cl
            );
        }
        trees
    }
}

/// Halves `len`; on odd lengths the first half gets the extra sample unless
/// `first_short` is set.
fn split(len: usize, first_short: bool) -> (usize, usize) {
    if len % 2 == 0 {
        (len / 2, len / 2)
    } else if first_short {
        ((len - 1) / 2, (len + 1) / 2)
    } else {
        ((len + 1) / 2, (len - 1) / 2)
    }
}

pub fn build_wavelet_tree(width: usize, height: usize) -> [WaveletNode; WAVELET_TREE_LEN] {
    let mut w = [WaveletNode::default(); WAVELET_TREE_LEN];

    for index in [2, 4, 7, 9, 11, 13, 16, 18] {
        w[index].inv_rw = true;
    }
    for index in [3, 5, 8, 9, 12, 13, 17, 18] {
        w[index].inv_cl = true;
    }

    wavelet_tree4(&mut w, 0, 1, width, height, 0, 0, true);

    let (lenx, lenx2) = split(w[1].lenx, false);
    let (leny, leny2) = split(w[1].leny, false);

    wavelet_tree4(&mut w, 4, 6, lenx2, leny, lenx, 0, false);
    wavelet_tree4(&mut w, 5, 10, lenx, leny2, 0, leny, false);
    wavelet_tree4(&mut w, 14, 15, lenx, leny, 0, 0, false);

    w[19].x = 0;
    w[19].y = 0;
    w[19].lenx = w[15].lenx.div_ceil(2);
    w[19].leny = w[15].leny.div_ceil(2);

    w
}

/// Places node `parent` and splits it into the four children starting at
/// `child`. With `stop` set the fourth child is left for a later call.
#[allow(clippy::too_many_arguments)]
fn wavelet_tree4(
    w: &mut [WaveletNode; WAVELET_TREE_LEN],
    parent: usize,
    child: usize,
    lenx: usize,
    leny: usize,
    x: usize,
    y: usize,
    stop: bool,
) {
    let p = child;
    w[parent].x = x;
    w[parent].y = y;
    w[parent].lenx = lenx;
    w[parent].leny = leny;

    w[p].x = x;
    w[p + 2].x = x;
    w[p].y = y;
    w[p + 1].y = y;

    let (first, second) = split(lenx, parent == 4);
    w[p].lenx = first;
    w[p + 1].lenx = second;
    w[p + 1].x = first + x;
    if !stop {
        w[p + 3].lenx = w[p + 1].lenx;
        w[p + 3].x = w[p + 1].x;
    }
    w[p + 2].lenx = w[p].lenx;

    let (first, second) = split(leny, parent == 5);
    w[p].leny = first;
    w[p + 2].leny = second;
    w[p + 2].y = first + y;
    if !stop {
        w[p + 3].leny = w[p + 2].leny;
        w[p + 3].y = w[p + 2].y;
    }
    w[p + 1].leny = w[p].leny;
}

pub fn build_quant_tree(w: &[WaveletNode; WAVELET_TREE_LEN]) -> [QuantNode; QUANT_TREE_LEN] {
    let mut q = [QuantNode::default(); QUANT_TREE_LEN];

    let node = |n: usize| (w[n].lenx, w[n].leny, w[n].x, w[n].y);

    let (lenx, leny, x, y) = node(14);
    quant_tree16(&mut q, 3, lenx, leny, x, y, false, false);
    let (lenx, leny, x, y) = node(4);
    quant_tree16(&mut q, 19, lenx, leny, x, y, false, true);
    let (lenx, leny, x, y) = node(0);
    quant_tree16(&mut q, 48, lenx, leny, x, y, false, false);
    let (lenx, leny, x, y) = node(5);
    quant_tree16(&mut q, 35, lenx, leny, x, y, true, false);
    let (lenx, leny, x, y) = node(19);
    quant_tree4(&mut q, 0, lenx, leny, x, y);

    q
}

/// Splits a rectangle into sixteen subbands starting at `start`. `rw` and
/// `cl` pick which half gets the extra row / column on odd lengths.
#[allow(clippy::too_many_arguments)]
fn quant_tree16(
    q: &mut [QuantNode; QUANT_TREE_LEN],
    start: usize,
    lenx: usize,
    leny: usize,
    x: usize,
    y: usize,
    rw: bool,
    cl: bool,
) {
    let p = start;
    let (tempx, temp2x) = split(lenx, cl);
    let (tempy, temp2y) = split(leny, rw);

    // Upper left quadrant.
    q[p].x = x;
    q[p + 2].x = x;
    q[p].y = y;
    q[p + 1].y = y;
    let (first, second) = split(tempx, false);
    q[p].lenx = first;
    q[p + 2].lenx = first;
    q[p + 1].lenx = second;
    q[p + 3].lenx = second;
    q[p + 1].x = x + q[p].lenx;
    q[p + 3].x = q[p + 1].x;
    let (first, second) = split(tempy, false);
    q[p].leny = first;
    q[p + 1].leny = first;
    q[p + 2].leny = second;
    q[p + 3].leny = second;
    q[p + 2].y = y + q[p].leny;
    q[p + 3].y = q[p + 2].y;

    // Upper right quadrant.
    q[p + 4].x = x + tempx;
    q[p + 6].x = q[p + 4].x;
    q[p + 4].y = y;
    q[p + 5].y = y;
    q[p + 6].y = q[p + 2].y;
    q[p + 7].y = q[p + 2].y;
    let (first, second) = split(temp2x, true);
    q[p + 4].lenx = first;
    q[p + 5].lenx = second;
    q[p + 6].lenx = first;
    q[p + 7].lenx = second;
    q[p + 5].x = q[p + 4].x + q[p + 4].lenx;
    q[p + 7].x = q[p + 5].x;
    q[p + 4].leny = q[p].leny;
    q[p + 5].leny = q[p].leny;
    q[p + 6].leny = q[p + 2].leny;
    q[p + 7].leny = q[p + 2].leny;

    // Lower left quadrant.
    q[p + 8].x = x;
    q[p + 10].x = x;
    q[p + 9].x = q[p + 1].x;
    q[p + 11].x = q[p + 1].x;
    q[p + 8].y = y + tempy;
    q[p + 9].y = q[p + 8].y;
    q[p + 8].lenx = q[p].lenx;
    q[p + 10].lenx = q[p].lenx;
    q[p + 9].lenx = q[p + 1].lenx;
    q[p + 11].lenx = q[p + 1].lenx;
    let (first, second) = split(temp2y, true);
    q[p + 8].leny = first;
    q[p + 9].leny = first;
    q[p + 10].leny = second;
    q[p + 11].leny = second;
    q[p + 10].y = q[p + 8].y + q[p + 8].leny;
    q[p + 11].y = q[p + 10].y;

    // Lower right quadrant.
    q[p + 12].x = q[p + 4].x;
    q[p + 14].x = q[p + 4].x;
    q[p + 13].x = q[p + 5].x;
    q[p + 15].x = q[p + 5].x;
    q[p + 12].y = q[p + 8].y;
    q[p + 13].y = q[p + 8].y;
    q[p + 14].y = q[p + 10].y;
    q[p + 15].y = q[p + 10].y;
    q[p + 12].lenx = q[p + 4].lenx;
    q[p + 14].lenx = q[p + 4].lenx;
    q[p + 13].lenx = q[p + 5].lenx;
    q[p + 15].lenx = q[p + 5].lenx;
    q[p + 12].leny = q[p + 8].leny;
    q[p + 13].leny = q[p + 8].leny;
    q[p + 14].leny = q[p + 10].leny;
    q[p + 15].leny = q[p + 10].leny;
}

fn quant_tree4(
    q: &mut [QuantNode; QUANT_TREE_LEN],
    start: usize,
    lenx: usize,
    leny: usize,
    x: usize,
    y: usize,
) {
    let p = start;
    q[p].x = x;
    q[p + 2].x = x;
    q[p].y = y;
    q[p + 1].y = y;

    let (first, second) = split(lenx, false);
    q[p].lenx = first;
    q[p + 2].lenx = first;
    q[p + 1].lenx = second;
    q[p + 3].lenx = second;
    q[p + 1].x = x + q[p].lenx;
    q[p + 3].x = q[p + 1].x;

    let (first, second) = split(leny, false);
    q[p].leny = first;
    q[p + 1].leny = first;
    q[p + 2].leny = second;
    q[p + 3].leny = second;
    q[p + 2].y = y + q[p].leny;
    q[p + 3].y = q[p + 2].y;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::NUM_SUBBANDS;

    #[test]
    fn test_trees_are_deterministic() {
        assert_eq!(WsqTrees::build(545, 622), WsqTrees::build(545, 622));
    }

    #[test]
    fn test_wavelet_tree_square_image() {
        let w = build_wavelet_tree(256, 256);
        assert_eq!((w[0].lenx, w[0].leny), (256, 256));
        assert_eq!((w[1].x, w[1].y, w[1].lenx, w[1].leny), (0, 0, 128, 128));
        assert_eq!((w[2].x, w[2].y), (128, 0));
        assert_eq!((w[3].x, w[3].y), (0, 128));
        assert_eq!((w[4].x, w[4].y, w[4].lenx, w[4].leny), (64, 0, 64, 64));
        assert_eq!((w[5].x, w[5].y, w[5].lenx, w[5].leny), (0, 64, 64, 64));
        assert_eq!((w[14].lenx, w[14].leny), (64, 64));
        assert_eq!((w[15].lenx, w[15].leny), (32, 32));
        assert_eq!((w[19].x, w[19].y, w[19].lenx, w[19].leny), (0, 0, 16, 16));
        assert!(w[9].inv_rw && w[9].inv_cl);
        assert!(!w[0].inv_rw && !w[0].inv_cl);
    }

    #[test]
    fn test_quant_tree_square_image() {
        let q = WsqTrees::build(256, 256).quant;
        for node in &q[0..4] {
            assert_eq!((node.lenx, node.leny), (8, 8));
        }
        assert_eq!((q[51].x, q[51].y, q[51].lenx, q[51].leny), (64, 64, 64, 64));
        assert_eq!((q[52].x, q[52].y, q[52].lenx, q[52].leny), (128, 0, 64, 64));
        assert_eq!((q[59].x, q[59].y, q[59].lenx, q[59].leny), (64, 192, 64, 64));
    }

    #[test]
    fn test_quant_tree_tiles_image() {
        for (width, height) in [(256, 256), (257, 301), (500, 500), (545, 622), (799, 263)] {
            let q = WsqTrees::build(width, height).quant;
            let mut covered = vec![0u8; width * height];
            for node in &q {
                for row in node.y..node.y + node.leny {
                    for col in node.x..node.x + node.lenx {
                        covered[row * width + col] += 1;
                    }
                }
            }
            assert!(
                covered.iter().all(|&c| c == 1),
                "subbands must tile {width}x{height} exactly once"
            );
            assert!(q[..NUM_SUBBANDS].iter().all(|node| node.area() > 0));
        }
    }
}
