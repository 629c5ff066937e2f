use std::io;

use byteorder::{BigEndian, LittleEndian, ReadBytesExt, WriteBytesExt};

use crate::error::Result;
use crate::{errcorrupt, Error};

/// Serialized descriptor size: kind + offset + length + last_block.
pub const DESCRIPTOR_LEN: usize = 17;

const KIND_TEMP: u8 = 0x01;
const KIND_FINAL: u8 = 0x02;

/// Where a segment's block numbers live.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Kind {
    /// An open buffer page in the temp file, raw little-endian entries.
    Temp,
    /// A compressed run in the finalized file.
    Final,
}

/// The value of one index row: where one segment's blocks are stored.
///
/// `length` counts 4-byte entries for temp segments and compressed bytes for
/// finalized ones.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Descriptor {
    pub kind: Kind,
    pub offset: u64,
    pub length: u32,
    pub last_block: u32,
}

impl Descriptor {
    pub fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(DESCRIPTOR_LEN);
        buf.push(match self.kind {
            Kind::Temp => KIND_TEMP,
            Kind::Final => KIND_FINAL,
        });
        buf.write_u64::<LittleEndian>(self.offset).unwrap();
        buf.write_u32::<LittleEndian>(self.length).unwrap();
        buf.write_u32::<LittleEndian>(self.last_block).unwrap();
        buf
    }

    pub fn decode(bytes: &[u8]) -> Result<Self> {
        if bytes.len() != DESCRIPTOR_LEN {
            return Err(Error::Corruption(format!(
                "descriptor is {} bytes, expected {DESCRIPTOR_LEN}",
                bytes.len()
            )));
        }
        let kind = match bytes[0] {
            KIND_TEMP => Kind::Temp,
            KIND_FINAL => Kind::Final,
            other => return errcorrupt!("unknown segment kind 0x{other:02x}"),
        };
        let mut cursor = io::Cursor::new(&bytes[1..]);
        Ok(Self {
            kind,
            offset: cursor.read_u64::<LittleEndian>()?,
            length: cursor.read_u32::<LittleEndian>()?,
            last_block: cursor.read_u32::<LittleEndian>()?,
        })
    }
}

/// Builds the composite row key `user_key || first_block`. The suffix is
/// big-endian so that lexicographic iteration order equals numeric block
/// order for a fixed user key.
pub fn segment_key(user_key: &[u8], first_block: u32) -> Vec<u8> {
    let mut key = Vec::with_capacity(user_key.len() + 4);
    key.extend_from_slice(user_key);
    key.write_u32::<BigEndian>(first_block).unwrap();
    key
}

/// Extracts the `first_block` suffix from a composite row key.
pub fn first_block_of(row_key: &[u8], key_width: usize) -> Result<u32> {
    if row_key.len() != key_width + 4 {
        return Err(Error::Corruption(format!(
            "index row key is {} bytes, expected {}",
            row_key.len(),
            key_width + 4
        )));
    }
    Ok((&row_key[key_width..]).read_u32::<BigEndian>()?)
}
