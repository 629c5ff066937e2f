use std::io::{Read, Write};

use byteorder::{LittleEndian, ReadBytesExt};
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;

use crate::error::Result;
use crate::Error;

/// Compresses a packed little-endian u32 run into an opaque byte run.
pub fn compress(data: &[u8], level: u32) -> Result<Vec<u8>> {
    let mut encoder = GzEncoder::new(Vec::new(), Compression::new(level));
    encoder.write_all(data)?;
    encoder
        .finish()
        .map_err(|e| Error::IO(format!("compress run: {e}")))
}

/// Inverts compress(), yielding the block numbers stored in the run.
///
/// A run that fails to decompress is a fatal corruption: finalized runs are
/// immutable once published, so the bytes on disk are wrong.
pub fn decompress(data: &[u8]) -> Result<Vec<u32>> {
    let mut decoder = GzDecoder::new(data);
    let mut raw = Vec::new();
    decoder
        .read_to_end(&mut raw)
        .map_err(|e| Error::Corruption(format!("failed to decompress finalized run: {e}")))?;
    unpack_blocks(&raw)
}

/// Decodes a packed little-endian u32 sequence.
pub(crate) fn unpack_blocks(mut data: &[u8]) -> Result<Vec<u32>> {
    if data.len() % 4 != 0 {
        return Err(Error::Corruption(format!(
            "block run length {} is not a multiple of 4",
            data.len()
        )));
    }
    let mut blocks = Vec::with_capacity(data.len() / 4);
    while !data.is_empty() {
        blocks.push(data.read_u32::<LittleEndian>()?);
    }
    Ok(blocks)
}

/// Encodes block numbers as a packed little-endian u32 sequence.
#[cfg(test)]
pub(crate) fn pack_blocks(blocks: &[u32]) -> Vec<u8> {
    use byteorder::WriteBytesExt;

    let mut data = Vec::with_capacity(blocks.len() * 4);
    for block in blocks {
        data.write_u32::<LittleEndian>(*block).unwrap();
    }
    data
}
