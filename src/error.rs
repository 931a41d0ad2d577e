use thiserror::Error;

/// Broad classification of a [`WsqError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// A read or write ran past the end of its buffer.
    BufferBounds,
    /// The codestream does not follow the WSQ container or entropy rules.
    FormatViolation,
    /// A working buffer could not be allocated.
    Allocation,
    /// The caller passed an unusable parameter.
    InvalidArgument,
}

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum WsqError {
    #[error("Not enough memory")]
    NotEnoughMemory,
    #[error("Destination too small")]
    DestinationTooSmall,
    #[error("Need more data: {requested} byte(s) requested at offset {position}")]
    NeedMoreData { position: usize, requested: usize },
    #[error("WSQ marker start byte not found at offset {position}")]
    MarkerStartByteNotFound { position: usize },
    #[error("Start of image marker not found (found 0x{found:04X})")]
    StartOfImageMarkerNotFound { found: u16 },
    #[error("Unknown WSQ marker 0x{marker:04X}")]
    UnknownMarker { marker: u16 },
    #[error("Unexpected marker 0x{marker:04X}, expected {expected}")]
    UnexpectedMarker { marker: u16, expected: &'static str },
    #[error("Invalid size {length} for segment with marker 0x{marker:04X}")]
    InvalidMarkerSegmentSize { marker: u16, length: u16 },
    #[error("Invalid Huffman table ID {table_id}")]
    InvalidHuffmanTableId { table_id: u8 },
    #[error("Huffman table {table_id} already defined in this segment")]
    DuplicateHuffmanTable { table_id: u8 },
    #[error("Huffman table {table_id} referenced before it was defined")]
    HuffmanTableUndefined { table_id: u8 },
    #[error("Huffman table declares {count} values, more than allowed")]
    TooManyHuffmanValues { count: usize },
    #[error("Huffman code lengths overflow the code space at length {length}")]
    InvalidHuffmanCodeLengths { length: usize },
    #[error("No Huffman code matched at byte {position}")]
    InvalidHuffmanCode { position: usize },
    #[error("Invalid Huffman symbol {symbol} in block {block}")]
    InvalidHuffmanSymbol { symbol: u8, block: usize },
    #[error("No stuffed zero after 0xFF in entropy-coded data at byte {position}")]
    MissingStuffedZero { position: usize },
    #[error("Unsupported transform filter lengths {lowpass}/{highpass}")]
    InvalidTransformFilters { lowpass: usize, highpass: usize },
    #[error("Wavelet filter reached outside its line at index {index}")]
    TransformIndexOutOfRange { index: isize },
    #[error("Transform table not defined")]
    TransformTableUndefined,
    #[error("Quantization table not defined")]
    QuantizationTableUndefined,
    #[error("Frame header not found")]
    FrameHeaderNotFound,
    #[error("Decoded coefficients exceed the image size in block {block}")]
    CoefficientOverflow { block: usize },
    #[error("Expected {expected} quantized coefficients, decoded {actual}")]
    CoefficientCountMismatch { expected: usize, actual: usize },
    #[error("Scaled value {value} out of range for {field} (subband {index})")]
    ScaledValueOutOfRange {
        field: &'static str,
        index: usize,
        value: u32,
    },
    #[error("Invalid parameter width {width}")]
    InvalidParameterWidth { width: u32 },
    #[error("Invalid parameter height {height}")]
    InvalidParameterHeight { height: u32 },
    #[error("Invalid parameter bits per sample")]
    InvalidParameterBitsPerSample,
    #[error("Invalid parameter bitrate")]
    InvalidParameterBitrate,
    #[error("Source holds {actual} bytes, expected {expected}")]
    InvalidParameterSourceSize { expected: usize, actual: usize },
    #[error("Comment of {length} bytes does not fit in a segment")]
    InvalidParameterComment { length: usize },
}

impl WsqError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            WsqError::NotEnoughMemory => ErrorKind::Allocation,
            WsqError::DestinationTooSmall | WsqError::NeedMoreData { .. } => {
                ErrorKind::BufferBounds
            }
            WsqError::InvalidParameterWidth { .. }
            | WsqError::InvalidParameterHeight { .. }
            | WsqError::InvalidParameterBitsPerSample
            | WsqError::InvalidParameterBitrate
            | WsqError::InvalidParameterSourceSize { .. }
            | WsqError::InvalidParameterComment { .. } => ErrorKind::InvalidArgument,
            _ => ErrorKind::FormatViolation,
        }
    }
}

/// Reserves a zeroed working buffer, mapping allocation failure to an error.
pub(crate) fn try_alloc<T: Clone + Default>(len: usize) -> Result<Vec<T>, WsqError> {
    let mut buffer = Vec::new();
    buffer
        .try_reserve_exact(len)
        .map_err(|_| WsqError::NotEnoughMemory)?;
    buffer.resize(len, T::default());
    Ok(buffer)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_kinds() {
        assert_eq!(WsqError::NotEnoughMemory.kind(), ErrorKind::Allocation);
        assert_eq!(
            WsqError::NeedMoreData {
                position: 4,
                requested: 2
            }
            .kind(),
            ErrorKind::BufferBounds
        );
        assert_eq!(
            WsqError::HuffmanTableUndefined { table_id: 1 }.kind(),
            ErrorKind::FormatViolation
        );
        assert_eq!(
            WsqError::InvalidParameterBitrate.kind(),
            ErrorKind::InvalidArgument
        );
    }

    #[test]
    fn test_error_messages_carry_context() {
        let message = WsqError::UnexpectedMarker {
            marker: 0xFFA3,
            expected: "SOF",
        }
        .to_string();
        assert!(message.contains("0xFFA3"));
        assert!(message.contains("SOF"));
    }

    #[test]
    fn test_try_alloc() {
        let buffer: Vec<f32> = try_alloc(16).unwrap();
        assert_eq!(buffer.len(), 16);
        assert!(buffer.iter().all(|&v| v == 0.0));
        assert_eq!(try_alloc::<f32>(usize::MAX), Err(WsqError::NotEnoughMemory));
    }
}
