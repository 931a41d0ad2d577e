//! WSQ encoder orchestration.

use crate::FrameInfo;
use crate::constants::{
    DEFAULT_BITRATE, MAXIMUM_IMAGE_DIMENSION, MAXIMUM_SEGMENT_LENGTH, MINIMUM_IMAGE_DIMENSION,
    SEGMENT_LENGTH_SIZE,
};
use crate::error::WsqError;
use crate::nistcom::NistCom;
use crate::wsq::bit_io::WsqBitWriter;
use crate::wsq::dwt::{ANALYSIS_HIGHPASS, ANALYSIS_LOWPASS, decompose};
use crate::wsq::huffman::{HuffmanTable, block_counts, encode_block, encoded_bit_count};
use crate::wsq::quantization::{QuantizationParams, block_sizes, normalize_pixels, quantize};
use crate::wsq::tables::FrameHeader;
use crate::wsq::tree::WsqTrees;
use crate::wsq_stream_writer::WsqStreamWriter;
use log::debug;

/// Bytes taken by SOI, DQT, SOF, two DHT headers, three SOB segments and
/// EOI, excluding the transform table, comments and Huffman values.
const FIXED_OVERHEAD: usize = 2 + (2 + 389) + (2 + 17) + 2 * (2 + 19) + 3 * (2 + 3) + 2;

pub struct WsqEncoder {
    bitrate: f32,
    ppi: Option<u32>,
    metadata: Option<NistCom>,
    comments: Vec<Vec<u8>>,
}

/// Everything needed to write a codestream once the image is quantized.
struct PreparedImage {
    frame_header: FrameHeader,
    params: QuantizationParams,
    coefficients: Vec<i32>,
    sizes: [usize; 3],
    tables: [HuffmanTable; 2],
    nistcom: String,
}

impl PreparedImage {
    fn blocks(&self) -> [&[i32]; 3] {
        split_blocks(&self.coefficients, &self.sizes)
    }
}

fn split_blocks<'a>(coefficients: &'a [i32], sizes: &[usize; 3]) -> [&'a [i32]; 3] {
    let (first, rest) = coefficients.split_at(sizes[0]);
    let (second, third) = rest.split_at(sizes[1]);
    [first, second, third]
}

fn transform_table_size() -> usize {
    let halves = ANALYSIS_LOWPASS.len().div_ceil(2) + ANALYSIS_HIGHPASS.len().div_ceil(2);
    2 + 4 + 6 * halves
}

impl Default for WsqEncoder {
    fn default() -> Self {
        Self::new()
    }
}

impl WsqEncoder {
    pub fn new() -> Self {
        Self {
            bitrate: DEFAULT_BITRATE,
            ppi: None,
            metadata: None,
            comments: Vec::new(),
        }
    }

    /// Target bits per pixel; typical values are 0.75 and 2.25.
    pub fn set_bitrate(&mut self, bitrate: f32) {
        self.bitrate = bitrate;
    }

    pub fn set_ppi(&mut self, ppi: u32) {
        self.ppi = Some(ppi);
    }

    /// Attributes merged into the NISTCOM comment segment.
    pub fn set_metadata(&mut self, metadata: NistCom) {
        self.metadata = Some(metadata);
    }

    /// Adds a comment segment written after the NISTCOM segment.
    pub fn add_comment(&mut self, text: impl Into<Vec<u8>>) {
        self.comments.push(text.into());
    }

    /// Encodes 8-bit grayscale `source` into `destination`, returning the
    /// number of bytes written.
    pub fn encode(
        &self,
        source: &[u8],
        frame_info: &FrameInfo,
        destination: &mut [u8],
    ) -> Result<usize, WsqError> {
        let prepared = self.prepare(source, frame_info)?;
        self.write(&prepared, destination)
    }

    pub fn encode_to_vec(
        &self,
        source: &[u8],
        frame_info: &FrameInfo,
    ) -> Result<Vec<u8>, WsqError> {
        let prepared = self.prepare(source, frame_info)?;

        let mut capacity = FIXED_OVERHEAD
            + transform_table_size()
            + prepared.nistcom.len()
            + SEGMENT_LENGTH_SIZE
            + 2
            + prepared.tables[0].values.len()
            + prepared.tables[1].values.len();
        capacity += self
            .comments
            .iter()
            .map(|c| c.len() + SEGMENT_LENGTH_SIZE + 2)
            .sum::<usize>();
        for (block, table_index) in prepared.blocks().into_iter().zip([0, 1, 1]) {
            let bytes = encoded_bit_count(block, &prepared.tables[table_index]).div_ceil(8);
            // Every byte may need a stuffed zero.
            capacity += 2 * bytes as usize + 2;
        }

        let mut destination = Vec::new();
        destination
            .try_reserve_exact(capacity)
            .map_err(|_| WsqError::NotEnoughMemory)?;
        destination.resize(capacity, 0);
        let len = self.write(&prepared, &mut destination)?;
        destination.truncate(len);
        Ok(destination)
    }

    fn validate(&self, source: &[u8], frame_info: &FrameInfo) -> Result<(), WsqError> {
        if frame_info.bits_per_sample != 8 {
            return Err(WsqError::InvalidParameterBitsPerSample);
        }
        let dimensions = MINIMUM_IMAGE_DIMENSION..=MAXIMUM_IMAGE_DIMENSION;
        if !dimensions.contains(&frame_info.width) {
            return Err(WsqError::InvalidParameterWidth {
                width: frame_info.width,
            });
        }
        if !dimensions.contains(&frame_info.height) {
            return Err(WsqError::InvalidParameterHeight {
                height: frame_info.height,
            });
        }
        let expected = frame_info.width as usize * frame_info.height as usize;
        if source.len() != expected {
            return Err(WsqError::InvalidParameterSourceSize {
                expected,
                actual: source.len(),
            });
        }
        if !(self.bitrate.is_finite() && self.bitrate > 0.0) {
            return Err(WsqError::InvalidParameterBitrate);
        }
        for comment in &self.comments {
            if comment.len() + SEGMENT_LENGTH_SIZE > MAXIMUM_SEGMENT_LENGTH {
                return Err(WsqError::InvalidParameterComment {
                    length: comment.len(),
                });
            }
        }
        Ok(())
    }

    fn prepare(&self, source: &[u8], frame_info: &FrameInfo) -> Result<PreparedImage, WsqError> {
        self.validate(source, frame_info)?;
        let width = frame_info.width as usize;
        let height = frame_info.height as usize;

        let (mut plane, m_shift, r_scale) = normalize_pixels(source)?;
        let trees = WsqTrees::build(width, height);
        decompose(
            &mut plane,
            width,
            height,
            &trees.wavelet,
            ANALYSIS_LOWPASS,
            ANALYSIS_HIGHPASS,
        )?;

        let (params, coefficients) = quantize(&plane, width, &trees.quant, self.bitrate)?;
        let sizes = block_sizes(&params, &trees);
        debug!(
            "quantized {} live subbands, block sizes {:?}",
            params.live_subbands(),
            sizes
        );

        let [first, second, third] = split_blocks(&coefficients, &sizes);
        let tables = [
            HuffmanTable::from_frequencies(&block_counts(&[first]))?,
            HuffmanTable::from_frequencies(&block_counts(&[second, third]))?,
        ];

        let mut nistcom = self.metadata.clone().unwrap_or_default();
        let ppi = self.ppi.or_else(|| nistcom.ppi());
        nistcom.combine_wsq(
            frame_info.width,
            frame_info.height,
            8,
            ppi,
            true,
            self.bitrate,
        );

        Ok(PreparedImage {
            frame_header: FrameHeader::new(width as u16, height as u16, m_shift, r_scale),
            params,
            coefficients,
            sizes,
            tables,
            nistcom: nistcom.serialize(),
        })
    }

    fn write(&self, prepared: &PreparedImage, destination: &mut [u8]) -> Result<usize, WsqError> {
        let mut writer = WsqStreamWriter::new(destination);

        writer.write_start_of_image()?;
        writer.write_comment(prepared.nistcom.as_bytes())?;
        for comment in &self.comments {
            writer.write_comment(comment)?;
        }
        writer.write_transform_table(ANALYSIS_LOWPASS, ANALYSIS_HIGHPASS)?;
        writer.write_quantization_table(&prepared.params.table())?;
        writer.write_frame_header(&prepared.frame_header)?;

        let [first, second, third] = prepared.blocks();
        writer.write_huffman_table(0, &prepared.tables[0])?;
        Self::write_block(&mut writer, 0, &prepared.tables[0], first, 1)?;
        writer.write_huffman_table(1, &prepared.tables[1])?;
        Self::write_block(&mut writer, 1, &prepared.tables[1], second, 2)?;
        Self::write_block(&mut writer, 1, &prepared.tables[1], third, 3)?;

        writer.write_end_of_image()?;
        debug!(
            "encoded {}x{} at {} bpp into {} bytes",
            prepared.frame_header.width,
            prepared.frame_header.height,
            self.bitrate,
            writer.len()
        );
        Ok(writer.len())
    }

    fn write_block(
        writer: &mut WsqStreamWriter,
        table_id: u8,
        table: &HuffmanTable,
        coefficients: &[i32],
        block: usize,
    ) -> Result<(), WsqError> {
        writer.write_block_header(table_id)?;
        let mut bit_writer = WsqBitWriter::new(writer.remaining_slice());
        encode_block(coefficients, table, &mut bit_writer, block)?;
        bit_writer.flush()?;
        let encoded_len = bit_writer.len();
        writer.advance(encoded_len);
        debug!(
            "block {block}: {} coefficients in {encoded_len} bytes",
            coefficients.len()
        );
        Ok(())
    }
}
