//! WSQ codestream reader.
//!
//! Walks the marker structure `SOI {table|COM}* SOF ({table|COM}* SOB data)+ EOI`,
//! keeping the tables defined so far. Entropy-coded block data is left to the
//! caller via [`WsqStreamReader::remaining_data`] and [`WsqStreamReader::advance`].

use crate::constants::{
    BLOCK_HEADER_LENGTH, FRAME_HEADER_LENGTH, MAX_HUFFMAN_BITS, MAX_HUFFMAN_COUNTS,
    MAX_HUFFMAN_TABLES, MAX_SUBBANDS, MINIMUM_IMAGE_DIMENSION, QUANTIZATION_TABLE_LENGTH,
    SEGMENT_LENGTH_SIZE,
};
use crate::error::WsqError;
use crate::nistcom::NistCom;
use crate::wsq::huffman::HuffmanTable;
use crate::wsq::tables::{FrameHeader, QuantizationTable, TransformTable, decode_scaled};
use crate::wsq_marker_code::{WSQ_MARKER_START_BYTE, WsqMarkerCode};
use log::{debug, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WsqStreamReaderState {
    BeforeStartOfImage,
    HeaderSection,
    FrameSection,
    BlockSection,
    EndOfImage,
}

pub struct WsqStreamReader<'a> {
    source: &'a [u8],
    position: usize,
    state: WsqStreamReaderState,
    frame_header: Option<FrameHeader>,
    transform_table: Option<TransformTable>,
    quantization_table: Option<QuantizationTable>,
    huffman_tables: [Option<HuffmanTable>; MAX_HUFFMAN_TABLES],
    nistcom: Option<NistCom>,
    comments: Vec<Vec<u8>>,
    blocks_read: usize,
}

impl<'a> WsqStreamReader<'a> {
    pub fn new(source: &'a [u8]) -> Self {
        Self {
            source,
            position: 0,
            state: WsqStreamReaderState::BeforeStartOfImage,
            frame_header: None,
            transform_table: None,
            quantization_table: None,
            huffman_tables: [const { None }; MAX_HUFFMAN_TABLES],
            nistcom: None,
            comments: Vec::new(),
            blocks_read: 0,
        }
    }

    pub fn state(&self) -> WsqStreamReaderState {
        self.state
    }

    pub fn position(&self) -> usize {
        self.position
    }

    pub fn remaining_data(&self) -> &'a [u8] {
        &self.source[self.position..]
    }

    pub fn advance(&mut self, count: usize) {
        self.position = (self.position + count).min(self.source.len());
    }

    pub fn frame_header(&self) -> Option<&FrameHeader> {
        self.frame_header.as_ref()
    }

    pub fn transform_table(&self) -> Option<&TransformTable> {
        self.transform_table.as_ref()
    }

    pub fn quantization_table(&self) -> Option<&QuantizationTable> {
        self.quantization_table.as_ref()
    }

    pub fn huffman_table(&self, table_id: u8) -> Result<&HuffmanTable, WsqError> {
        self.huffman_tables
            .get(usize::from(table_id))
            .and_then(Option::as_ref)
            .ok_or(WsqError::HuffmanTableUndefined { table_id })
    }

    /// The first NISTCOM record found before the first block.
    pub fn nistcom(&self) -> Option<&NistCom> {
        self.nistcom.as_ref()
    }

    /// Payloads of every comment segment read so far, in stream order.
    pub fn comments(&self) -> &[Vec<u8>] {
        &self.comments
    }

    pub fn into_comments(self) -> Vec<Vec<u8>> {
        self.comments
    }

    pub fn read_u8(&mut self) -> Result<u8, WsqError> {
        let value = *self
            .source
            .get(self.position)
            .ok_or(WsqError::NeedMoreData {
                position: self.position,
                requested: 1,
            })?;
        self.position += 1;
        Ok(value)
    }

    pub fn read_u16(&mut self) -> Result<u16, WsqError> {
        let bytes = self.read_bytes(2)?;
        Ok(u16::from_be_bytes([bytes[0], bytes[1]]))
    }

    pub fn read_u32(&mut self) -> Result<u32, WsqError> {
        let bytes = self.read_bytes(4)?;
        Ok(u32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
    }

    pub fn read_bytes(&mut self, count: usize) -> Result<&'a [u8], WsqError> {
        let source = self.source;
        let bytes = source
            .get(self.position..self.position + count)
            .ok_or(WsqError::NeedMoreData {
                position: self.position,
                requested: count,
            })?;
        self.position += count;
        Ok(bytes)
    }

    pub fn read_marker(&mut self) -> Result<WsqMarkerCode, WsqError> {
        let start = self.position;
        if self.read_u8()? != WSQ_MARKER_START_BYTE {
            return Err(WsqError::MarkerStartByteNotFound { position: start });
        }
        let code = u16::from_be_bytes([WSQ_MARKER_START_BYTE, self.read_u8()?]);
        WsqMarkerCode::from_u16(code)
    }

    /// Reads from SOI up to and including the frame header.
    pub fn read_header(&mut self) -> Result<(), WsqError> {
        self.read_start_of_image()?;

        loop {
            let marker = self.read_marker()?;
            match marker {
                WsqMarkerCode::StartOfFrame => {
                    self.read_frame_header()?;
                    self.state = WsqStreamReaderState::FrameSection;
                    return Ok(());
                }
                marker if marker.is_table() => self.read_table_segment(marker)?,
                marker => {
                    return Err(WsqError::UnexpectedMarker {
                        marker: marker.into(),
                        expected: "table, comment or SOF",
                    });
                }
            }
        }
    }

    /// Reads any table or comment segments up to the next block header.
    ///
    /// Returns the block's Huffman table id, or `None` at EOI. EOI is only
    /// accepted once at least one block has been read.
    pub fn read_block_header(&mut self) -> Result<Option<u8>, WsqError> {
        if self.frame_header.is_none() {
            return Err(WsqError::FrameHeaderNotFound);
        }

        loop {
            let marker = self.read_marker()?;
            match marker {
                WsqMarkerCode::StartOfBlock => {
                    let table_id = self.read_start_of_block_segment()?;
                    self.blocks_read += 1;
                    self.state = WsqStreamReaderState::BlockSection;
                    return Ok(Some(table_id));
                }
                WsqMarkerCode::EndOfImage if self.blocks_read > 0 => {
                    self.state = WsqStreamReaderState::EndOfImage;
                    return Ok(None);
                }
                marker if marker.is_table() => self.read_table_segment(marker)?,
                marker => {
                    return Err(WsqError::UnexpectedMarker {
                        marker: marker.into(),
                        expected: if self.blocks_read > 0 {
                            "table, comment, SOB or EOI"
                        } else {
                            "table, comment or SOB"
                        },
                    });
                }
            }
        }
    }

    /// Skips over a segment whose marker has just been read.
    pub fn skip_segment(&mut self, marker: WsqMarkerCode) -> Result<(), WsqError> {
        let (_, end) = self.read_segment_length(marker)?;
        self.position = end;
        Ok(())
    }

    pub fn read_start_of_image(&mut self) -> Result<(), WsqError> {
        let found = self.read_u16()?;
        if found != u16::from(WsqMarkerCode::StartOfImage) {
            return Err(WsqError::StartOfImageMarkerNotFound { found });
        }
        self.state = WsqStreamReaderState::HeaderSection;
        Ok(())
    }

    fn read_table_segment(&mut self, marker: WsqMarkerCode) -> Result<(), WsqError> {
        match marker {
            WsqMarkerCode::DefineTransformTable => self.read_transform_table_segment(),
            WsqMarkerCode::DefineQuantizationTable => self.read_quantization_table_segment(),
            WsqMarkerCode::DefineHuffmanTable => self.read_huffman_table_segment(),
            WsqMarkerCode::Comment => self.read_comment_segment(),
            marker => Err(WsqError::UnexpectedMarker {
                marker: marker.into(),
                expected: "table or comment",
            }),
        }
    }

    /// Reads a segment length and returns the offset where the segment ends.
    fn read_segment_length(&mut self, marker: WsqMarkerCode) -> Result<(u16, usize), WsqError> {
        let start = self.position;
        let length = self.read_u16()?;
        if usize::from(length) < SEGMENT_LENGTH_SIZE {
            return Err(WsqError::InvalidMarkerSegmentSize {
                marker: marker.into(),
                length,
            });
        }
        let end = start + usize::from(length);
        if end > self.source.len() {
            return Err(WsqError::NeedMoreData {
                position: start,
                requested: usize::from(length),
            });
        }
        Ok((length, end))
    }

    /// Checks the segment did not overrun its declared length and skips any
    /// surplus bytes.
    fn finish_segment(
        &mut self,
        marker: WsqMarkerCode,
        length: u16,
        end: usize,
    ) -> Result<(), WsqError> {
        if self.position > end {
            return Err(WsqError::InvalidMarkerSegmentSize {
                marker: marker.into(),
                length,
            });
        }
        if self.position < end {
            debug!(
                "skipping {} surplus byte(s) in {} segment",
                end - self.position,
                marker.short_name()
            );
        }
        self.position = end;
        Ok(())
    }

    fn read_frame_header(&mut self) -> Result<(), WsqError> {
        let marker = WsqMarkerCode::StartOfFrame;
        let (length, end) = self.read_segment_length(marker)?;
        if length < FRAME_HEADER_LENGTH {
            return Err(WsqError::InvalidMarkerSegmentSize {
                marker: marker.into(),
                length,
            });
        }

        let black = self.read_u8()?;
        let white = self.read_u8()?;
        let height = self.read_u16()?;
        let width = self.read_u16()?;
        let m_shift = self.read_scaled_u16()?;
        let r_scale = self.read_scaled_u16()?;
        let wsq_encoder = self.read_u8()?;
        let software = self.read_u16()?;
        self.finish_segment(marker, length, end)?;

        if u32::from(width) < MINIMUM_IMAGE_DIMENSION {
            return Err(WsqError::InvalidParameterWidth {
                width: u32::from(width),
            });
        }
        if u32::from(height) < MINIMUM_IMAGE_DIMENSION {
            return Err(WsqError::InvalidParameterHeight {
                height: u32::from(height),
            });
        }

        debug!(
            "SOF: {width}x{height}, black={black}, white={white}, \
             m_shift={m_shift}, r_scale={r_scale}"
        );
        self.frame_header = Some(FrameHeader {
            black,
            white,
            width,
            height,
            m_shift,
            r_scale,
            wsq_encoder,
            software,
        });
        Ok(())
    }

    fn read_start_of_block_segment(&mut self) -> Result<u8, WsqError> {
        let marker = WsqMarkerCode::StartOfBlock;
        let (length, end) = self.read_segment_length(marker)?;
        if length < BLOCK_HEADER_LENGTH {
            return Err(WsqError::InvalidMarkerSegmentSize {
                marker: marker.into(),
                length,
            });
        }
        let table_id = self.read_u8()?;
        self.finish_segment(marker, length, end)?;
        if usize::from(table_id) >= MAX_HUFFMAN_TABLES {
            return Err(WsqError::InvalidHuffmanTableId { table_id });
        }
        debug!("SOB: block {}, table {table_id}", self.blocks_read + 1);
        Ok(table_id)
    }

    fn read_transform_table_segment(&mut self) -> Result<(), WsqError> {
        let marker = WsqMarkerCode::DefineTransformTable;
        let (length, end) = self.read_segment_length(marker)?;

        let lowpass_len = usize::from(self.read_u8()?);
        let highpass_len = usize::from(self.read_u8()?);
        TransformTable::check_filter_lengths(lowpass_len, highpass_len)?;

        let lowpass_half = self.read_filter_half(lowpass_len.div_ceil(2))?;
        let highpass_half = self.read_filter_half(highpass_len.div_ceil(2))?;
        self.finish_segment(marker, length, end)?;

        debug!("DTT: {lowpass_len}/{highpass_len} taps");
        self.transform_table = Some(TransformTable::from_half_filters(
            lowpass_len,
            &lowpass_half,
            highpass_len,
            &highpass_half,
        ));
        Ok(())
    }

    fn read_filter_half(&mut self, count: usize) -> Result<Vec<f32>, WsqError> {
        let mut half = Vec::with_capacity(count);
        for _ in 0..count {
            let sign = self.read_u8()?;
            let scale = self.read_u8()?;
            let mantissa = self.read_u32()?;
            let value = decode_scaled(scale, mantissa);
            half.push(if sign != 0 { -value } else { value });
        }
        Ok(half)
    }

    fn read_quantization_table_segment(&mut self) -> Result<(), WsqError> {
        let marker = WsqMarkerCode::DefineQuantizationTable;
        let (length, end) = self.read_segment_length(marker)?;
        if length < QUANTIZATION_TABLE_LENGTH {
            return Err(WsqError::InvalidMarkerSegmentSize {
                marker: marker.into(),
                length,
            });
        }

        let mut table = QuantizationTable {
            bin_center: self.read_scaled_u16()?,
            ..QuantizationTable::default()
        };
        for subband in 0..MAX_SUBBANDS {
            table.q_bin[subband] = self.read_scaled_u16()?;
            table.z_bin[subband] = self.read_scaled_u16()?;
        }
        self.finish_segment(marker, length, end)?;

        debug!("DQT: bin center {}", table.bin_center);
        self.quantization_table = Some(table);
        Ok(())
    }

    fn read_huffman_table_segment(&mut self) -> Result<(), WsqError> {
        let marker = WsqMarkerCode::DefineHuffmanTable;
        let (length, end) = self.read_segment_length(marker)?;

        let mut first = true;
        while self.position < end {
            let table_id = self.read_u8()?;
            if usize::from(table_id) >= MAX_HUFFMAN_TABLES {
                return Err(WsqError::InvalidHuffmanTableId { table_id });
            }
            if !first && self.huffman_tables[usize::from(table_id)].is_some() {
                return Err(WsqError::DuplicateHuffmanTable { table_id });
            }

            let mut bits = [0u8; MAX_HUFFMAN_BITS];
            bits.copy_from_slice(self.read_bytes(MAX_HUFFMAN_BITS)?);
            let count: usize = bits.iter().map(|&n| usize::from(n)).sum();
            if count > MAX_HUFFMAN_COUNTS {
                return Err(WsqError::TooManyHuffmanValues { count });
            }
            if self.position + count > end {
                return Err(WsqError::InvalidMarkerSegmentSize {
                    marker: marker.into(),
                    length,
                });
            }
            let values = self.read_bytes(count)?;

            let table = HuffmanTable::build_from_dht(&bits, values)?;
            if let Some(code_length) = table.all_ones_code() {
                warn!("Huffman table {table_id} assigns an all-ones code of length {code_length}");
            }
            debug!("DHT: table {table_id}, {count} values");
            self.huffman_tables[usize::from(table_id)] = Some(table);
            first = false;
        }
        self.finish_segment(marker, length, end)
    }

    fn read_comment_segment(&mut self) -> Result<(), WsqError> {
        let marker = WsqMarkerCode::Comment;
        let (length, end) = self.read_segment_length(marker)?;
        let payload = self.read_bytes(usize::from(length) - SEGMENT_LENGTH_SIZE)?;
        self.finish_segment(marker, length, end)?;

        if self.blocks_read == 0 && self.nistcom.is_none() && NistCom::is_nistcom(payload) {
            debug!("COM: NISTCOM record, {} bytes", payload.len());
            self.nistcom = Some(NistCom::parse(&String::from_utf8_lossy(payload)));
        } else {
            debug!("COM: {} bytes", payload.len());
        }
        self.comments.push(payload.to_vec());
        Ok(())
    }

    fn read_scaled_u16(&mut self) -> Result<f32, WsqError> {
        let scale = self.read_u8()?;
        let mantissa = self.read_u16()?;
        Ok(decode_scaled(scale, u32::from(mantissa)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::wsq_stream_writer::WsqStreamWriter;

    fn header_stream(extra: impl FnOnce(&mut WsqStreamWriter)) -> Vec<u8> {
        let mut buffer = vec![0u8; 1024];
        let mut writer = WsqStreamWriter::new(&mut buffer);
        writer.write_start_of_image().unwrap();
        writer.write_comment(b"NIST_COM 2\nPPI 500").unwrap();
        extra(&mut writer);
        writer
            .write_frame_header(&FrameHeader::new(256, 300, 127.5, 0.75))
            .unwrap();
        let len = writer.len();
        buffer.truncate(len);
        buffer
    }

    #[test]
    fn test_read_header() {
        let data = header_stream(|_| {});
        let mut reader = WsqStreamReader::new(&data);
        reader.read_header().unwrap();
        assert_eq!(reader.state(), WsqStreamReaderState::FrameSection);

        let header = reader.frame_header().unwrap();
        assert_eq!((header.width, header.height), (256, 300));
        assert!((header.m_shift - 127.5).abs() < 1e-4);
        assert!((header.r_scale - 0.75).abs() < 1e-6);
        assert_eq!(reader.nistcom().unwrap().ppi(), Some(500));
        assert_eq!(reader.comments().len(), 1);
        assert_eq!(reader.position(), data.len());
    }

    #[test]
    fn test_missing_start_of_image() {
        let mut reader = WsqStreamReader::new(&[0xFF, 0xD8, 0xFF, 0xA1]);
        assert_eq!(
            reader.read_header(),
            Err(WsqError::StartOfImageMarkerNotFound { found: 0xFFD8 })
        );
    }

    #[test]
    fn test_eoi_before_first_block_rejected() {
        let mut data = header_stream(|_| {});
        data.extend_from_slice(&[0xFF, 0xA1]);
        let mut reader = WsqStreamReader::new(&data);
        reader.read_header().unwrap();
        assert_eq!(
            reader.read_block_header(),
            Err(WsqError::UnexpectedMarker {
                marker: 0xFFA1,
                expected: "table, comment or SOB"
            })
        );
    }

    #[test]
    fn test_restart_interval_marker_rejected() {
        let data = [0xFF, 0xA0, 0xFF, 0xA7, 0x00, 0x04, 0x00, 0x00];
        let mut reader = WsqStreamReader::new(&data);
        assert_eq!(
            reader.read_header(),
            Err(WsqError::UnexpectedMarker {
                marker: 0xFFA7,
                expected: "table, comment or SOF"
            })
        );
    }

    #[test]
    fn test_unknown_marker() {
        let data = [0xFF, 0xA0, 0xFF, 0xB0];
        let mut reader = WsqStreamReader::new(&data);
        assert_eq!(
            reader.read_header(),
            Err(WsqError::UnknownMarker { marker: 0xFFB0 })
        );
    }

    #[test]
    fn test_surplus_segment_bytes_skipped() {
        // A comment declaring 6 bytes of payload holds them all; a frame
        // header declaring 19 bytes carries two trailing bytes.
        let mut data = vec![0xFF, 0xA0, 0xFF, 0xA8, 0x00, 0x08, 1, 2, 3, 4, 5, 6];
        data.extend_from_slice(&[0xFF, 0xA2, 0x00, 19, 0, 255, 0x01, 0x00, 0x01, 0x00]);
        data.extend_from_slice(&[2, 0x32, 0x00, 4, 0x27, 0x10, 0, 0x00, 0x00, 0xEE, 0xEE]);
        let mut reader = WsqStreamReader::new(&data);
        reader.read_header().unwrap();
        assert_eq!(reader.position(), data.len());
        assert_eq!(reader.comments()[0], vec![1, 2, 3, 4, 5, 6]);
        assert!(reader.nistcom().is_none());
    }

    #[test]
    fn test_short_frame_header_rejected() {
        let data = [0xFF, 0xA0, 0xFF, 0xA2, 0x00, 0x05, 0, 255, 0x01];
        let mut reader = WsqStreamReader::new(&data);
        assert_eq!(
            reader.read_header(),
            Err(WsqError::InvalidMarkerSegmentSize {
                marker: 0xFFA2,
                length: 5
            })
        );
    }

    #[test]
    fn test_small_frame_rejected() {
        let mut buffer = vec![0u8; 64];
        let mut writer = WsqStreamWriter::new(&mut buffer);
        writer.write_start_of_image().unwrap();
        writer
            .write_frame_header(&FrameHeader::new(255, 300, 128.0, 1.0))
            .unwrap();
        let len = writer.len();
        let mut reader = WsqStreamReader::new(&buffer[..len]);
        assert_eq!(
            reader.read_header(),
            Err(WsqError::InvalidParameterWidth { width: 255 })
        );
    }

    #[test]
    fn test_tables_read_back() {
        use crate::wsq::dwt::{ODD_HIGHPASS, ODD_LOWPASS};

        let mut quantization = QuantizationTable::default();
        quantization.q_bin[0] = 1.5;
        quantization.z_bin[0] = 1.8;
        let mut bits = [0u8; MAX_HUFFMAN_BITS];
        bits[1] = 2;
        let huffman = HuffmanTable::build_from_dht(&bits, &[7, 9]).unwrap();

        let data = header_stream(|writer| {
            writer.write_transform_table(&ODD_LOWPASS, &ODD_HIGHPASS).unwrap();
            writer.write_quantization_table(&quantization).unwrap();
            writer.write_huffman_table(3, &huffman).unwrap();
        });
        let mut reader = WsqStreamReader::new(&data);
        reader.read_header().unwrap();

        let expected = TransformTable::from_analysis(&ODD_LOWPASS, &ODD_HIGHPASS);
        let transform = reader.transform_table().unwrap();
        for (a, b) in transform.lowpass.iter().zip(&expected.lowpass) {
            assert!((a - b).abs() < 1e-7);
        }
        for (a, b) in transform.highpass.iter().zip(&expected.highpass) {
            assert!((a - b).abs() < 1e-7);
        }

        let table = reader.quantization_table().unwrap();
        assert!((table.bin_center - 0.44).abs() < 1e-6);
        assert!((table.q_bin[0] - 1.5).abs() < 1e-6);
        assert!((table.z_bin[0] - 1.8).abs() < 1e-6);
        assert_eq!(table.q_bin[1], 0.0);

        assert_eq!(reader.huffman_table(3).unwrap(), &huffman);
        assert_eq!(
            reader.huffman_table(0),
            Err(WsqError::HuffmanTableUndefined { table_id: 0 })
        );
    }

    #[test]
    fn test_duplicate_table_in_segment_rejected() {
        let mut table = vec![0u8; 1 + MAX_HUFFMAN_BITS + 1];
        table[1] = 1;
        table[1 + MAX_HUFFMAN_BITS] = 5;
        let mut data = vec![0xFF, 0xA0, 0xFF, 0xA6];
        data.extend_from_slice(&((2 + 2 * table.len()) as u16).to_be_bytes());
        data.extend_from_slice(&table);
        data.extend_from_slice(&table);

        let mut reader = WsqStreamReader::new(&data);
        assert_eq!(
            reader.read_header(),
            Err(WsqError::DuplicateHuffmanTable { table_id: 0 })
        );
    }
}
