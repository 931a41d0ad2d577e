//! Bit-level access to entropy-coded block data.
//! A 0xFF data byte is always followed by a stuffed 0x00.

use crate::error::WsqError;
use crate::wsq_marker_code::WSQ_MARKER_START_BYTE;

/// Reads MSB-first bits from block data, removing stuffed zeros.
///
/// A marker met while fetching the first bit of a Huffman code ends the
/// block: [`read_bit`](Self::read_bit) then returns `None` and the reader
/// stays positioned on the marker's 0xFF byte.
pub struct WsqBitReader<'a> {
    source: &'a [u8],
    position: usize,
    current: u8,
    bits_left: u8,
    marker: Option<u16>,
}

impl<'a> WsqBitReader<'a> {
    pub fn new(source: &'a [u8]) -> Self {
        Self {
            source,
            position: 0,
            current: 0,
            bits_left: 0,
            marker: None,
        }
    }

    /// Bytes consumed so far, excluding a pending marker.
    pub fn position(&self) -> usize {
        self.position
    }

    /// The marker that ended the block data, once one has been seen.
    pub fn marker(&self) -> Option<u16> {
        self.marker
    }

    pub fn read_bit(&mut self) -> Result<Option<u8>, WsqError> {
        if self.bits_left == 0 && !self.fetch_byte()? {
            return Ok(None);
        }
        self.bits_left -= 1;
        Ok(Some((self.current >> self.bits_left) & 1))
    }

    /// Reads an `count`-bit raw value following an escape symbol. Running
    /// into a marker here means the stuffing was broken.
    pub fn read_bits(&mut self, count: u8) -> Result<u16, WsqError> {
        debug_assert!(count <= 16);
        let mut value = 0u16;
        for _ in 0..count {
            let bit = self.read_bit()?.ok_or(WsqError::MissingStuffedZero {
                position: self.position,
            })?;
            value = (value << 1) | u16::from(bit);
        }
        Ok(value)
    }

    fn fetch_byte(&mut self) -> Result<bool, WsqError> {
        if self.marker.is_some() {
            return Ok(false);
        }
        let byte = self.byte_at(self.position)?;
        if byte == WSQ_MARKER_START_BYTE {
            let next = self.byte_at(self.position + 1)?;
            if next != 0 {
                self.marker = Some(u16::from_be_bytes([byte, next]));
                return Ok(false);
            }
            self.position += 2;
        } else {
            self.position += 1;
        }
        self.current = byte;
        self.bits_left = 8;
        Ok(true)
    }

    fn byte_at(&self, position: usize) -> Result<u8, WsqError> {
        self.source
            .get(position)
            .copied()
            .ok_or(WsqError::NeedMoreData {
                position,
                requested: 1,
            })
    }
}

/// Packs MSB-first bits into a byte slice, stuffing a zero after every 0xFF.
pub struct WsqBitWriter<'a> {
    destination: &'a mut [u8],
    position: usize,
    bit_buffer: u32,
    bits_in_buffer: u32,
}

impl<'a> WsqBitWriter<'a> {
    pub fn new(destination: &'a mut [u8]) -> Self {
        Self {
            destination,
            position: 0,
            bit_buffer: 0,
            bits_in_buffer: 0,
        }
    }

    pub fn write_bits(&mut self, value: u16, length: u8) -> Result<(), WsqError> {
        if length == 0 {
            return Ok(());
        }
        let length = u32::from(length);
        let mask = (1u32 << length) - 1;
        self.bit_buffer = (self.bit_buffer << length) | (u32::from(value) & mask);
        self.bits_in_buffer += length;

        while self.bits_in_buffer >= 8 {
            let shift = self.bits_in_buffer - 8;
            let byte = ((self.bit_buffer >> shift) & 0xFF) as u8;
            self.emit_byte(byte)?;
            self.bits_in_buffer = shift;
            self.bit_buffer &= (1u32 << shift) - 1;
        }
        Ok(())
    }

    /// Completes the last byte with 1-bits.
    pub fn flush(&mut self) -> Result<(), WsqError> {
        if self.bits_in_buffer > 0 {
            let pad_bits = 8 - self.bits_in_buffer;
            let value = (1u32 << pad_bits) - 1;
            self.write_bits(value as u16, pad_bits as u8)?;
        }
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.position
    }

    pub fn is_empty(&self) -> bool {
        self.position == 0
    }

    fn emit_byte(&mut self, byte: u8) -> Result<(), WsqError> {
        let needed = if byte == WSQ_MARKER_START_BYTE { 2 } else { 1 };
        if self.position + needed > self.destination.len() {
            return Err(WsqError::DestinationTooSmall);
        }
        self.destination[self.position] = byte;
        if needed == 2 {
            self.destination[self.position + 1] = 0x00;
        }
        self.position += needed;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bit_writer_reader_roundtrip() {
        let mut buffer = [0u8; 16];
        let written = {
            let mut writer = WsqBitWriter::new(&mut buffer);
            writer.write_bits(0x01, 2).unwrap();
            writer.write_bits(0xFF, 8).unwrap();
            writer.write_bits(0x0A, 4).unwrap();
            writer.flush().unwrap();
            writer.len()
        };
        // 01111111 11101011 -> 0x7F 0xEB, no stuffing needed.
        assert_eq!(&buffer[..written], &[0x7F, 0xEB]);

        let mut reader = WsqBitReader::new(&buffer[..written]);
        assert_eq!(reader.read_bits(2).unwrap(), 0x01);
        assert_eq!(reader.read_bits(8).unwrap(), 0xFF);
        assert_eq!(reader.read_bits(4).unwrap(), 0x0A);
    }

    #[test]
    fn test_writer_stuffs_zero_after_ff() {
        let mut buffer = [0u8; 4];
        let mut writer = WsqBitWriter::new(&mut buffer);
        writer.write_bits(0xFF, 8).unwrap();
        writer.write_bits(0x2, 2).unwrap();
        writer.flush().unwrap();
        assert_eq!(writer.len(), 3);
        assert_eq!(buffer[..3], [0xFF, 0x00, 0xBF]);
    }

    #[test]
    fn test_writer_reports_full_destination() {
        let mut buffer = [0u8; 1];
        let mut writer = WsqBitWriter::new(&mut buffer);
        assert_eq!(writer.write_bits(0xFF, 8), Err(WsqError::DestinationTooSmall));
    }

    #[test]
    fn test_reader_skips_stuffing_and_stops_at_marker() {
        let data = [0xFF, 0x00, 0x80, 0xFF, 0xA1];
        let mut reader = WsqBitReader::new(&data);
        assert_eq!(reader.read_bits(8).unwrap(), 0xFF);
        assert_eq!(reader.read_bit().unwrap(), Some(1));
        for _ in 0..7 {
            assert_eq!(reader.read_bit().unwrap(), Some(0));
        }
        assert_eq!(reader.read_bit().unwrap(), None);
        assert_eq!(reader.marker(), Some(0xFFA1));
        assert_eq!(reader.position(), 3);
        assert_eq!(reader.read_bit().unwrap(), None);
    }

    #[test]
    fn test_marker_inside_raw_bits_is_an_error() {
        let data = [0xAB, 0xFF, 0xA1];
        let mut reader = WsqBitReader::new(&data);
        assert_eq!(reader.read_bits(4).unwrap(), 0xA);
        assert_eq!(
            reader.read_bits(8),
            Err(WsqError::MissingStuffedZero { position: 1 })
        );
    }

    #[test]
    fn test_reader_needs_more_data() {
        let mut reader = WsqBitReader::new(&[0xFF]);
        assert_eq!(
            reader.read_bit(),
            Err(WsqError::NeedMoreData {
                position: 1,
                requested: 1
            })
        );
    }
}
