//! WSQ (Wavelet Scalar Quantization) grayscale fingerprint image codec.
//!
//! Pipeline:
//! - 8-bit samples are shifted and scaled to floats, then split into 64
//!   subbands by a five-level separable wavelet decomposition (9/7-tap
//!   biorthogonal filters, or 8/8-tap with the `even-filter-bank` feature).
//! - Each subband gets a uniform dead-zone quantizer whose bin width comes
//!   from an adaptive bit allocation driven by the subband variances.
//! - Quantized coefficients are run-length coded into a 254-symbol alphabet
//!   and Huffman coded in three blocks with two image-specific tables.

pub mod bit_io;
pub mod comment;
pub mod decoder;
pub mod dwt;
pub mod encoder;
pub mod huffman;
pub mod quantization;
pub mod tables;
pub mod tree;

pub use comment::{add_comment, read_comments, read_nistcom};
pub use decoder::WsqDecoder;
pub use encoder::WsqEncoder;
