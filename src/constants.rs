// Decomposition geometry.
pub const WAVELET_TREE_LEN: usize = 20;
pub const QUANT_TREE_LEN: usize = 64;
pub const MAX_SUBBANDS: usize = 64;
pub const NUM_SUBBANDS: usize = 60;

// First subband of each of the three entropy-coded blocks.
pub const START_SUBBAND_2: usize = 19;
pub const START_SUBBAND_3: usize = 52;

// First subband of each area region used by the bit allocation.
pub const START_SIZE_REGION_2: usize = 4;
pub const START_SIZE_REGION_3: usize = 51;

pub const MINIMUM_IMAGE_DIMENSION: u32 = 256;
pub const MAXIMUM_IMAGE_DIMENSION: u32 = 65535;

pub const DEFAULT_BITRATE: f32 = 0.75;

// Bit allocation.
pub const VARIANCE_THRESHOLD: f32 = 1.01;
/// Below this summed variance of subbands 0..4 the central window is
/// abandoned for full-subband statistics.
pub const LOW_BAND_VARIANCE_SUM: f32 = 20000.0;
pub const ZERO_BIN_FACTOR: f32 = 1.2;
pub const BIN_CENTER: f32 = 0.44;

// Frame header sample range.
pub const BLACK_LEVEL: u8 = 0;
pub const WHITE_LEVEL: u8 = 255;

// Segment lengths, counting the length field itself.
pub const FRAME_HEADER_LENGTH: u16 = 17;
pub const BLOCK_HEADER_LENGTH: u16 = 3;
pub const QUANTIZATION_TABLE_LENGTH: u16 = 389;
pub const SEGMENT_LENGTH_SIZE: usize = 2;
pub const MAXIMUM_SEGMENT_LENGTH: usize = 65535;

// Entropy coding.
pub const MAX_HUFFMAN_TABLES: usize = 8;
pub const MAX_HUFFMAN_BITS: usize = 16;
pub const MAX_HUFFMAN_COUNTS: usize = 256;
pub const MAX_HUFFMAN_COEFFICIENT: i32 = 74;
pub const MIN_HUFFMAN_COEFFICIENT: i32 = 1 - MAX_HUFFMAN_COEFFICIENT;
pub const MAX_HUFFMAN_ZERO_RUN: u32 = 100;
pub const MAX_ZERO_RUN_16: u32 = 0xFFFF;
/// Largest quantized magnitude a 16-bit escape can carry.
pub const MAX_QUANTIZED_MAGNITUDE: i32 = 0xFFFF;

// Entropy symbol alphabet.
pub const SYMBOL_POSITIVE_8: u8 = 101;
pub const SYMBOL_NEGATIVE_8: u8 = 102;
pub const SYMBOL_POSITIVE_16: u8 = 103;
pub const SYMBOL_NEGATIVE_16: u8 = 104;
pub const SYMBOL_ZERO_RUN_8: u8 = 105;
pub const SYMBOL_ZERO_RUN_16: u8 = 106;
pub const SYMBOL_LITERAL_FIRST: u8 = 107;
pub const SYMBOL_LITERAL_LAST: u8 = 254;
pub const LITERAL_OFFSET: i32 = 180;
