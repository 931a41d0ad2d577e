//! WSQ codestream writer.
//!
//! `WsqStreamWriter` emits markers and table segments (SOI, DTT, DQT, SOF,
//! DHT, SOB, COM, EOI) into a caller-provided buffer.

use crate::constants::{
    BLOCK_HEADER_LENGTH, FRAME_HEADER_LENGTH, MAX_HUFFMAN_TABLES, MAXIMUM_SEGMENT_LENGTH,
    NUM_SUBBANDS, QUANTIZATION_TABLE_LENGTH, SEGMENT_LENGTH_SIZE,
};
use crate::error::WsqError;
use crate::wsq::huffman::HuffmanTable;
use crate::wsq::tables::{FrameHeader, QuantizationTable, encode_scaled_u16, encode_scaled_u32};
use crate::wsq_marker_code::{WSQ_MARKER_START_BYTE, WsqMarkerCode};
use log::debug;

/// Bin center as stored on the wire: 44 / 10^2.
const BIN_CENTER_SCALE: u8 = 2;
const BIN_CENTER_MANTISSA: u16 = 44;

pub struct WsqStreamWriter<'a> {
    destination: &'a mut [u8],
    position: usize,
}

impl<'a> WsqStreamWriter<'a> {
    pub fn new(destination: &'a mut [u8]) -> Self {
        Self {
            destination,
            position: 0,
        }
    }

    pub fn len(&self) -> usize {
        self.position
    }

    pub fn is_empty(&self) -> bool {
        self.position == 0
    }

    /// Unwritten tail of the destination, for entropy-coded data.
    pub fn remaining_slice(&mut self) -> &mut [u8] {
        &mut self.destination[self.position..]
    }

    /// Accounts for bytes written directly into [`remaining_slice`](Self::remaining_slice).
    pub fn advance(&mut self, count: usize) {
        self.position += count;
    }

    pub fn write_byte(&mut self, value: u8) -> Result<(), WsqError> {
        if self.position >= self.destination.len() {
            return Err(WsqError::DestinationTooSmall);
        }
        self.destination[self.position] = value;
        self.position += 1;
        Ok(())
    }

    pub fn write_u16(&mut self, value: u16) -> Result<(), WsqError> {
        self.write_bytes(&value.to_be_bytes())
    }

    pub fn write_u32(&mut self, value: u32) -> Result<(), WsqError> {
        self.write_bytes(&value.to_be_bytes())
    }

    pub fn write_bytes(&mut self, bytes: &[u8]) -> Result<(), WsqError> {
        let end = self.position + bytes.len();
        if end > self.destination.len() {
            return Err(WsqError::DestinationTooSmall);
        }
        self.destination[self.position..end].copy_from_slice(bytes);
        self.position = end;
        Ok(())
    }

    pub fn write_marker(&mut self, marker: WsqMarkerCode) -> Result<(), WsqError> {
        let code = u16::from(marker);
        debug_assert_eq!((code >> 8) as u8, WSQ_MARKER_START_BYTE);
        self.write_u16(code)
    }

    pub fn write_start_of_image(&mut self) -> Result<(), WsqError> {
        self.write_marker(WsqMarkerCode::StartOfImage)
    }

    pub fn write_end_of_image(&mut self) -> Result<(), WsqError> {
        self.write_marker(WsqMarkerCode::EndOfImage)
    }

    pub fn write_comment(&mut self, payload: &[u8]) -> Result<(), WsqError> {
        if payload.len() + SEGMENT_LENGTH_SIZE > MAXIMUM_SEGMENT_LENGTH {
            return Err(WsqError::InvalidParameterComment {
                length: payload.len(),
            });
        }
        debug!("writing COM segment, {} bytes", payload.len());
        self.write_marker(WsqMarkerCode::Comment)?;
        self.write_u16((payload.len() + SEGMENT_LENGTH_SIZE) as u16)?;
        self.write_bytes(payload)
    }

    /// Writes the analysis filter pair. Only the upper half of each
    /// symmetric filter is stored.
    pub fn write_transform_table(
        &mut self,
        lowpass: &[f32],
        highpass: &[f32],
    ) -> Result<(), WsqError> {
        let lowpass_half = &lowpass[lowpass.len() / 2..];
        let highpass_half = &highpass[highpass.len() / 2..];
        let length = 4 + 6 * (lowpass_half.len() + highpass_half.len());
        debug!(
            "writing DTT segment, {}/{} taps",
            lowpass.len(),
            highpass.len()
        );

        self.write_marker(WsqMarkerCode::DefineTransformTable)?;
        self.write_u16(length as u16)?;
        self.write_byte(lowpass.len() as u8)?;
        self.write_byte(highpass.len() as u8)?;

        for (index, &coefficient) in lowpass_half.iter().chain(highpass_half).enumerate() {
            let (sign, scale, mantissa) =
                encode_scaled_u32(coefficient).ok_or(WsqError::ScaledValueOutOfRange {
                    field: "filter coefficient",
                    index,
                    value: coefficient.abs() as u32,
                })?;
            self.write_byte(sign)?;
            self.write_byte(scale)?;
            self.write_u32(mantissa)?;
        }
        Ok(())
    }

    pub fn write_quantization_table(&mut self, table: &QuantizationTable) -> Result<(), WsqError> {
        debug!("writing DQT segment");
        self.write_marker(WsqMarkerCode::DefineQuantizationTable)?;
        self.write_u16(QUANTIZATION_TABLE_LENGTH)?;
        self.write_byte(BIN_CENTER_SCALE)?;
        self.write_u16(BIN_CENTER_MANTISSA)?;

        for subband in 0..table.q_bin.len() {
            if subband >= NUM_SUBBANDS {
                self.write_bytes(&[0; 6])?;
                continue;
            }
            self.write_scaled_u16("bin width", subband, table.q_bin[subband])?;
            self.write_scaled_u16("zero-bin width", subband, table.z_bin[subband])?;
        }
        Ok(())
    }

    pub fn write_frame_header(&mut self, header: &FrameHeader) -> Result<(), WsqError> {
        debug!(
            "writing SOF segment, {}x{}, m_shift={}, r_scale={}",
            header.width, header.height, header.m_shift, header.r_scale
        );
        self.write_marker(WsqMarkerCode::StartOfFrame)?;
        self.write_u16(FRAME_HEADER_LENGTH)?;
        self.write_byte(header.black)?;
        self.write_byte(header.white)?;
        self.write_u16(header.height)?;
        self.write_u16(header.width)?;
        self.write_scaled_u16("m_shift", 0, header.m_shift)?;
        self.write_scaled_u16("r_scale", 0, header.r_scale)?;
        self.write_byte(header.wsq_encoder)?;
        self.write_u16(header.software)
    }

    pub fn write_huffman_table(
        &mut self,
        table_id: u8,
        table: &HuffmanTable,
    ) -> Result<(), WsqError> {
        if usize::from(table_id) >= MAX_HUFFMAN_TABLES {
            return Err(WsqError::InvalidHuffmanTableId { table_id });
        }
        debug!(
            "writing DHT segment, table {table_id}, {} values",
            table.values.len()
        );
        self.write_marker(WsqMarkerCode::DefineHuffmanTable)?;
        self.write_u16((3 + table.bits.len() + table.values.len()) as u16)?;
        self.write_byte(table_id)?;
        self.write_bytes(&table.bits)?;
        self.write_bytes(&table.values)
    }

    pub fn write_block_header(&mut self, table_id: u8) -> Result<(), WsqError> {
        self.write_marker(WsqMarkerCode::StartOfBlock)?;
        self.write_u16(BLOCK_HEADER_LENGTH)?;
        self.write_byte(table_id)
    }

    fn write_scaled_u16(
        &mut self,
        field: &'static str,
        index: usize,
        value: f32,
    ) -> Result<(), WsqError> {
        let (scale, mantissa) =
            encode_scaled_u16(value).ok_or(WsqError::ScaledValueOutOfRange {
                field,
                index,
                value: value.max(0.0) as u32,
            })?;
        self.write_byte(scale)?;
        self.write_u16(mantissa)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::wsq::dwt::{ODD_HIGHPASS, ODD_LOWPASS};

    #[test]
    fn test_write_markers_and_comment() {
        let mut buffer = [0u8; 16];
        let mut writer = WsqStreamWriter::new(&mut buffer);
        writer.write_start_of_image().unwrap();
        writer.write_comment(b"hi").unwrap();
        writer.write_end_of_image().unwrap();
        let len = writer.len();
        assert_eq!(
            &buffer[..len],
            &[0xFF, 0xA0, 0xFF, 0xA8, 0x00, 0x04, b'h', b'i', 0xFF, 0xA1]
        );
    }

    #[test]
    fn test_frame_header_layout() {
        let mut buffer = [0u8; 32];
        let mut writer = WsqStreamWriter::new(&mut buffer);
        writer
            .write_frame_header(&FrameHeader::new(300, 256, 128.0, 1.0))
            .unwrap();
        let len = writer.len();
        assert_eq!(len, 2 + 17);
        assert_eq!(&buffer[..4], &[0xFF, 0xA2, 0x00, 17]);
        assert_eq!(&buffer[4..6], &[0, 255]);
        assert_eq!(&buffer[6..10], &[0x01, 0x00, 0x01, 0x2C]);
        // 128 -> 12800 / 10^2, 1 -> 10000 / 10^4
        assert_eq!(&buffer[10..13], &[2, 0x32, 0x00]);
        assert_eq!(&buffer[13..16], &[4, 0x27, 0x10]);
    }

    #[test]
    fn test_transform_table_length() {
        let mut buffer = [0u8; 64];
        let mut writer = WsqStreamWriter::new(&mut buffer);
        writer
            .write_transform_table(&ODD_LOWPASS, &ODD_HIGHPASS)
            .unwrap();
        assert_eq!(writer.len(), 2 + 58);
        assert_eq!(&buffer[2..6], &[0x00, 58, 9, 7]);
    }

    #[test]
    fn test_quantization_table_rejects_large_bins() {
        let mut buffer = [0u8; 512];
        let mut table = QuantizationTable::default();
        table.q_bin[3] = 70000.0;
        let mut writer = WsqStreamWriter::new(&mut buffer);
        assert_eq!(
            writer.write_quantization_table(&table),
            Err(WsqError::ScaledValueOutOfRange {
                field: "bin width",
                index: 3,
                value: 70000
            })
        );
    }

    #[test]
    fn test_destination_too_small() {
        let mut buffer = [0u8; 3];
        let mut writer = WsqStreamWriter::new(&mut buffer);
        writer.write_start_of_image().unwrap();
        assert_eq!(writer.write_u16(1), Err(WsqError::DestinationTooSmall));
    }
}
