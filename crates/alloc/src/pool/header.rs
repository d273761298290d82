//! On-disk pool and object headers
//!
//! Pool header (little-endian, 256 bytes reserved at offset 0):
//!
//! | offset | size | field          |
//! |--------|------|----------------|
//! | 0      | 8    | magic          |
//! | 8      | 4    | format version |
//! | 12     | 4    | reserved       |
//! | 16     | 128  | layout tag     |
//! | 144    | 8    | pool size      |
//! | 152    | 8    | heap offset    |
//! | 160    | 8    | heap cursor    |
//! | 168    | 8    | object count   |
//! | 176    | 4    | CRC32 of 0..176|
//!
//! Object header (16 bytes, in front of every object's data):
//! `size: u64`, `type_tag: u32`, `magic: u32`.

use crc32fast::Hasher;

use super::{PoolError, PoolResult};

pub const POOL_MAGIC: [u8; 8] = *b"PMBOBJ\0\x01";
pub const FORMAT_VERSION: u32 = 1;

/// Bytes reserved for the pool header
pub const POOL_HEADER_SIZE: usize = 256;
/// Bytes in front of every object
pub const OBJECT_HEADER_SIZE: usize = 16;
/// Tag bytes reserved in the header; one is kept for the terminating NUL
pub const LAYOUT_FIELD_SIZE: usize = 128;
/// Longest accepted layout tag
pub const MAX_LAYOUT_LEN: usize = LAYOUT_FIELD_SIZE - 1;

pub const OBJECT_MAGIC: u32 = 0x4F42_4A31; // "OBJ1"

const LAYOUT_OFFSET: usize = 16;
const POOL_SIZE_OFFSET: usize = LAYOUT_OFFSET + LAYOUT_FIELD_SIZE;
const HEAP_OFFSET_OFFSET: usize = POOL_SIZE_OFFSET + 8;
const CURSOR_OFFSET: usize = HEAP_OFFSET_OFFSET + 8;
const COUNT_OFFSET: usize = CURSOR_OFFSET + 8;
const CHECKSUM_OFFSET: usize = COUNT_OFFSET + 8;

/// Decoded pool header
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PoolHeader {
    pub layout: String,
    pub pool_size: u64,
    pub heap_offset: u64,
    pub heap_cursor: u64,
    pub object_count: u64,
}

impl PoolHeader {
    /// Header of a freshly created, empty pool
    pub fn new(layout: &str, pool_size: u64) -> Self {
        Self {
            layout: layout.to_string(),
            pool_size,
            heap_offset: POOL_HEADER_SIZE as u64,
            heap_cursor: POOL_HEADER_SIZE as u64,
            object_count: 0,
        }
    }

    /// Serializes the header, including its checksum, into `buf`
    pub fn encode(&self, buf: &mut [u8]) {
        let buf = &mut buf[..POOL_HEADER_SIZE];
        buf.fill(0);

        buf[..8].copy_from_slice(&POOL_MAGIC);
        buf[8..12].copy_from_slice(&FORMAT_VERSION.to_le_bytes());
        buf[LAYOUT_OFFSET..LAYOUT_OFFSET + self.layout.len()].copy_from_slice(self.layout.as_bytes());
        put_u64(buf, POOL_SIZE_OFFSET, self.pool_size);
        put_u64(buf, HEAP_OFFSET_OFFSET, self.heap_offset);
        put_u64(buf, CURSOR_OFFSET, self.heap_cursor);
        put_u64(buf, COUNT_OFFSET, self.object_count);

        let crc = checksum(buf);
        buf[CHECKSUM_OFFSET..CHECKSUM_OFFSET + 4].copy_from_slice(&crc.to_le_bytes());
    }

    /// Parses and authenticates a header
    ///
    /// Fails with [`PoolError::Corrupted`] on a short buffer, wrong magic or
    /// version, checksum mismatch, or an unterminated layout tag.
    pub fn decode(buf: &[u8]) -> PoolResult<Self> {
        if buf.len() < POOL_HEADER_SIZE {
            return Err(PoolError::corrupted(format!(
                "header truncated to {} bytes",
                buf.len()
            )));
        }
        let buf = &buf[..POOL_HEADER_SIZE];

        if buf[..8] != POOL_MAGIC {
            return Err(PoolError::corrupted("bad pool magic"));
        }
        let version = get_u32(buf, 8);
        if version != FORMAT_VERSION {
            return Err(PoolError::corrupted(format!(
                "unsupported format version {version}"
            )));
        }
        let stored = get_u32(buf, CHECKSUM_OFFSET);
        let computed = checksum(buf);
        if stored != computed {
            return Err(PoolError::corrupted(format!(
                "header checksum mismatch (stored {stored:#010x}, computed {computed:#010x})"
            )));
        }

        let field = &buf[LAYOUT_OFFSET..LAYOUT_OFFSET + LAYOUT_FIELD_SIZE];
        let len = field
            .iter()
            .position(|b| *b == 0)
            .ok_or_else(|| PoolError::corrupted("layout tag is not terminated"))?;
        let layout = std::str::from_utf8(&field[..len])
            .map_err(|_| PoolError::corrupted("layout tag is not UTF-8"))?
            .to_string();

        Ok(Self {
            layout,
            pool_size: get_u64(buf, POOL_SIZE_OFFSET),
            heap_offset: get_u64(buf, HEAP_OFFSET_OFFSET),
            heap_cursor: get_u64(buf, CURSOR_OFFSET),
            object_count: get_u64(buf, COUNT_OFFSET),
        })
    }
}

/// Header in front of an allocated object
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ObjectHeader {
    pub size: u64,
    pub type_tag: u32,
}

impl ObjectHeader {
    pub fn encode(&self, buf: &mut [u8]) {
        put_u64(buf, 0, self.size);
        buf[8..12].copy_from_slice(&self.type_tag.to_le_bytes());
        buf[12..16].copy_from_slice(&OBJECT_MAGIC.to_le_bytes());
    }

    /// Returns `None` when the magic does not match
    pub fn decode(buf: &[u8]) -> Option<Self> {
        if buf.len() < OBJECT_HEADER_SIZE || get_u32(buf, 12) != OBJECT_MAGIC {
            return None;
        }
        Some(Self {
            size: get_u64(buf, 0),
            type_tag: get_u32(buf, 8),
        })
    }
}

/// Rejects layout tags that cannot be stored in the header
pub fn validate_layout(layout: &str) -> PoolResult<()> {
    if layout.len() > MAX_LAYOUT_LEN {
        return Err(PoolError::InvalidLayout {
            reason: format!("{} bytes exceeds the limit of {MAX_LAYOUT_LEN}", layout.len()),
        });
    }
    if layout.as_bytes().contains(&0) {
        return Err(PoolError::InvalidLayout {
            reason: "contains a NUL byte".to_string(),
        });
    }
    Ok(())
}

fn checksum(header: &[u8]) -> u32 {
    let mut hasher = Hasher::new();
    hasher.update(&header[..CHECKSUM_OFFSET]);
    hasher.finalize()
}

#[inline]
fn put_u64(buf: &mut [u8], at: usize, value: u64) {
    buf[at..at + 8].copy_from_slice(&value.to_le_bytes());
}

#[inline]
fn get_u64(buf: &[u8], at: usize) -> u64 {
    let mut bytes = [0u8; 8];
    bytes.copy_from_slice(&buf[at..at + 8]);
    u64::from_le_bytes(bytes)
}

#[inline]
fn get_u32(buf: &[u8], at: usize) -> u32 {
    let mut bytes = [0u8; 4];
    bytes.copy_from_slice(&buf[at..at + 4]);
    u32::from_le_bytes(bytes)
}
