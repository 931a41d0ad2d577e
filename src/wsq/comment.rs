//! Comment segment utilities that work on an encoded stream without
//! decoding the image.

use crate::constants::{MAXIMUM_SEGMENT_LENGTH, SEGMENT_LENGTH_SIZE};
use crate::error::WsqError;
use crate::nistcom::NistCom;
use crate::wsq_marker_code::WsqMarkerCode;
use crate::wsq_stream_reader::WsqStreamReader;
use crate::wsq_stream_writer::WsqStreamWriter;
use log::debug;

/// Returns a copy of `data` with a comment segment inserted after SOI and
/// any comment segments that directly follow it.
pub fn add_comment(data: &[u8], text: &[u8]) -> Result<Vec<u8>, WsqError> {
    if text.is_empty() || text.len() + SEGMENT_LENGTH_SIZE > MAXIMUM_SEGMENT_LENGTH {
        return Err(WsqError::InvalidParameterComment { length: text.len() });
    }

    let mut reader = WsqStreamReader::new(data);
    reader.read_start_of_image()?;
    let insert_at = loop {
        let position = reader.position();
        match reader.read_marker()? {
            WsqMarkerCode::Comment => reader.skip_segment(WsqMarkerCode::Comment)?,
            _ => break position,
        }
    };
    debug!("inserting {} byte comment at offset {insert_at}", text.len());

    let segment_len = 2 + SEGMENT_LENGTH_SIZE + text.len();
    let mut output = Vec::new();
    output
        .try_reserve_exact(data.len() + segment_len)
        .map_err(|_| WsqError::NotEnoughMemory)?;
    output.extend_from_slice(&data[..insert_at]);
    output.resize(insert_at + segment_len, 0);
    let mut writer = WsqStreamWriter::new(&mut output[insert_at..]);
    writer.write_comment(text)?;
    output.extend_from_slice(&data[insert_at..]);
    Ok(output)
}

/// Payloads of every comment segment before the first block.
pub fn read_comments(data: &[u8]) -> Result<Vec<Vec<u8>>, WsqError> {
    Ok(read_to_first_block(data)?.into_comments())
}

/// The first NISTCOM record before the first block, parsed.
pub fn read_nistcom(data: &[u8]) -> Result<Option<NistCom>, WsqError> {
    Ok(read_to_first_block(data)?.nistcom().cloned())
}

fn read_to_first_block(data: &[u8]) -> Result<WsqStreamReader<'_>, WsqError> {
    let mut reader = WsqStreamReader::new(data);
    reader.read_header()?;
    reader.read_block_header()?;
    Ok(reader)
}
