//! WSQ decoder implementation.

use crate::DecodedImage;
use crate::error::{WsqError, try_alloc};
use crate::nistcom::NistCom;
use crate::wsq::bit_io::WsqBitReader;
use crate::wsq::dwt::reconstruct;
use crate::wsq::huffman::decode_block;
use crate::wsq::quantization::{coded_coefficient_count, denormalize_pixels, unquantize};
use crate::wsq::tables::FrameHeader;
use crate::wsq::tree::WsqTrees;
use crate::wsq_stream_reader::WsqStreamReader;
use log::debug;

pub struct WsqDecoder<'a> {
    reader: WsqStreamReader<'a>,
    header_read: bool,
}

impl<'a> WsqDecoder<'a> {
    pub fn new(source: &'a [u8]) -> Self {
        Self {
            reader: WsqStreamReader::new(source),
            header_read: false,
        }
    }

    /// Parses the stream up to the frame header without decoding any block.
    pub fn read_header(&mut self) -> Result<(), WsqError> {
        if !self.header_read {
            self.reader.read_header()?;
            self.header_read = true;
        }
        Ok(())
    }

    pub fn frame_header(&self) -> Option<&FrameHeader> {
        self.reader.frame_header()
    }

    /// NISTCOM attributes embedded by the encoder, if any.
    pub fn metadata(&self) -> Option<&NistCom> {
        self.reader.nistcom()
    }

    pub fn ppi(&self) -> Option<u32> {
        self.metadata().and_then(NistCom::ppi)
    }

    pub fn comments(&self) -> &[Vec<u8>] {
        self.reader.comments()
    }

    pub fn reader(&self) -> &WsqStreamReader<'a> {
        &self.reader
    }

    pub fn decode(&mut self) -> Result<DecodedImage, WsqError> {
        self.read_header()?;
        let header = *self
            .reader
            .frame_header()
            .ok_or(WsqError::FrameHeaderNotFound)?;
        let width = usize::from(header.width);
        let height = usize::from(header.height);
        let trees = WsqTrees::build(width, height);

        let coefficients = self.decode_blocks(&trees)?;

        let quantization = self
            .reader
            .quantization_table()
            .ok_or(WsqError::QuantizationTableUndefined)?;
        let transform = self
            .reader
            .transform_table()
            .ok_or(WsqError::TransformTableUndefined)?;

        let mut plane = unquantize(&coefficients, quantization, &trees.quant, width, height)?;
        reconstruct(&mut plane, width, height, &trees.wavelet, transform)?;

        let mut pixels: Vec<u8> = try_alloc(width * height)?;
        denormalize_pixels(&plane, header.m_shift, header.r_scale, &mut pixels);
        debug!("decoded {width}x{height} image");

        Ok(DecodedImage {
            pixels,
            width: u32::from(header.width),
            height: u32::from(header.height),
            depth: 8,
            ppi: self.ppi(),
            lossy: true,
            metadata: self.metadata().cloned(),
            comments: self.comments().to_vec(),
        })
    }

    /// Entropy-decodes every block up to EOI into one coefficient stream.
    fn decode_blocks(&mut self, trees: &WsqTrees) -> Result<Vec<i32>, WsqError> {
        let mut coefficients: Vec<i32> = Vec::new();
        let mut block = 0;

        while let Some(table_id) = self.reader.read_block_header()? {
            block += 1;
            let quantization = self
                .reader
                .quantization_table()
                .ok_or(WsqError::QuantizationTableUndefined)?;
            let limit = coded_coefficient_count(quantization, &trees.quant);
            if coefficients.capacity() < limit {
                coefficients
                    .try_reserve_exact(limit - coefficients.len())
                    .map_err(|_| WsqError::NotEnoughMemory)?;
            }

            let table = self.reader.huffman_table(table_id)?;
            let mut bit_reader = WsqBitReader::new(self.reader.remaining_data());
            let before = coefficients.len();
            decode_block(&mut bit_reader, table, &mut coefficients, limit, block)?;
            let consumed = bit_reader.position();
            self.reader.advance(consumed);

            debug!(
                "block {block}: table {table_id}, {} coefficients in {consumed} bytes",
                coefficients.len() - before
            );
        }
        Ok(coefficients)
    }
}
