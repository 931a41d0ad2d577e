//! WSQ grayscale image compression.
//!
//! The codec is driven through [`WsqEncoder`] and [`WsqDecoder`], or the
//! one-call [`encode`] and [`decode`] helpers.

pub mod constants;
pub mod error;
pub mod nistcom;
pub mod wsq;
pub mod wsq_marker_code;
pub mod wsq_stream_reader;
pub mod wsq_stream_writer;

pub use error::{ErrorKind, WsqError};
pub use nistcom::NistCom;
pub use wsq::{WsqDecoder, WsqEncoder};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FrameInfo {
    pub width: u32,
    pub height: u32,
    pub bits_per_sample: i32,
}

impl FrameInfo {
    pub fn grayscale(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            bits_per_sample: 8,
        }
    }
}

/// A decoded image with the attributes recovered from the stream.
#[derive(Debug, Clone, PartialEq)]
pub struct DecodedImage {
    pub pixels: Vec<u8>,
    pub width: u32,
    pub height: u32,
    pub depth: u8,
    /// Resolution from the NISTCOM record; `None` when absent or unknown.
    pub ppi: Option<u32>,
    pub lossy: bool,
    pub metadata: Option<NistCom>,
    pub comments: Vec<Vec<u8>>,
}

/// Encodes 8-bit grayscale pixels at `bitrate` bits per pixel.
pub fn encode(
    pixels: &[u8],
    width: u32,
    height: u32,
    bitrate: f32,
    ppi: Option<u32>,
    metadata: Option<&NistCom>,
) -> Result<Vec<u8>, WsqError> {
    let mut encoder = WsqEncoder::new();
    encoder.set_bitrate(bitrate);
    if let Some(ppi) = ppi {
        encoder.set_ppi(ppi);
    }
    if let Some(metadata) = metadata {
        encoder.set_metadata(metadata.clone());
    }
    encoder.encode_to_vec(pixels, &FrameInfo::grayscale(width, height))
}

pub fn decode(data: &[u8]) -> Result<DecodedImage, WsqError> {
    WsqDecoder::new(data).decode()
}
