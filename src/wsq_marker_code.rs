use crate::error::WsqError;
use num_enum::{IntoPrimitive, TryFromPrimitive};

pub const WSQ_MARKER_START_BYTE: u8 = 0xFF;

#[derive(Debug, Clone, Copy, PartialEq, Eq, IntoPrimitive, TryFromPrimitive)]
#[repr(u16)]
pub enum WsqMarkerCode {
    /// SOI: Marks the start of an image.
    StartOfImage = 0xFFA0,

    /// EOI: Marks the end of an image.
    EndOfImage = 0xFFA1,

    /// SOF: Frame header with dimensions and pixel normalization.
    StartOfFrame = 0xFFA2,

    /// SOB: Block header, followed by entropy-coded data.
    StartOfBlock = 0xFFA3,

    /// DTT: Defines the wavelet transform filters.
    DefineTransformTable = 0xFFA4,

    /// DQT: Defines the per-subband quantization bins.
    DefineQuantizationTable = 0xFFA5,

    /// DHT: Defines one or more Huffman tables.
    DefineHuffmanTable = 0xFFA6,

    /// DRT: Defines a restart interval. Reserved, never produced.
    DefineRestartInterval = 0xFFA7,

    /// COM: Comment block.
    Comment = 0xFFA8,
}

impl WsqMarkerCode {
    pub fn from_u16(value: u16) -> Result<Self, WsqError> {
        Self::try_from(value).map_err(|_| WsqError::UnknownMarker { marker: value })
    }

    pub fn is_table(self) -> bool {
        matches!(
            self,
            Self::DefineTransformTable
                | Self::DefineQuantizationTable
                | Self::DefineHuffmanTable
                | Self::Comment
        )
    }

    pub fn short_name(self) -> &'static str {
        match self {
            Self::StartOfImage => "SOI",
            Self::EndOfImage => "EOI",
            Self::StartOfFrame => "SOF",
            Self::StartOfBlock => "SOB",
            Self::DefineTransformTable => "DTT",
            Self::DefineQuantizationTable => "DQT",
            Self::DefineHuffmanTable => "DHT",
            Self::DefineRestartInterval => "DRT",
            Self::Comment => "COM",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_marker_values() {
        assert_eq!(u16::from(WsqMarkerCode::StartOfImage), 0xFFA0);
        assert_eq!(u16::from(WsqMarkerCode::Comment), 0xFFA8);
        assert_eq!(
            WsqMarkerCode::from_u16(0xFFA5).unwrap(),
            WsqMarkerCode::DefineQuantizationTable
        );
    }

    #[test]
    fn test_unknown_marker() {
        assert_eq!(
            WsqMarkerCode::from_u16(0xFFD8),
            Err(WsqError::UnknownMarker { marker: 0xFFD8 })
        );
    }

    #[test]
    fn test_table_markers() {
        assert!(WsqMarkerCode::DefineHuffmanTable.is_table());
        assert!(WsqMarkerCode::Comment.is_table());
        assert!(!WsqMarkerCode::StartOfFrame.is_table());
        assert!(!WsqMarkerCode::DefineRestartInterval.is_table());
    }
}
