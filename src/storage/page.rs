//! The slotted page: a fixed 4096-byte buffer holding a page header, a slot
//! directory that grows forward from byte 20, and a record heap that grows
//! backward from byte 4096, the two meeting in the page's free space.

use byteorder::{ByteOrder, LittleEndian};

use crate::schema::{Record, Schema};
use crate::storage::codec::{self, decode_record, encode_record};

/// The fixed size, in bytes, of every page in a database file.
pub const PAGE_SIZE: usize = 4096;

/// The fixed size, in bytes, of the page header (5 `INT32` fields).
const PAGE_HEADER_SIZE: usize = 20;

/// The size, in bytes, of one slot directory entry.
const SLOT_SIZE: usize = 8;

/// An error that can occur while building, encoding, or decoding a [`Page`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// The record does not fit in the page's remaining free space.
    NotEnoughSpace {
        /// Bytes the record (plus its slot entry) would need.
        needed: i32,
        /// Bytes currently free in the page.
        free: i32,
    },
    /// A page buffer was not exactly [`PAGE_SIZE`] bytes.
    WrongBufferSize(usize),
    /// The record codec failed while encoding or decoding a record on this page.
    Codec(codec::Error),
    /// The page header's offsets were inconsistent with its own invariants.
    CorruptHeader,
}

impl From<codec::Error> for Error {
    fn from(e: codec::Error) -> Error {
        Error::Codec(e)
    }
}

impl ::std::fmt::Display for Error {
    fn fmt(&self, f: &mut ::std::fmt::Formatter) -> ::std::fmt::Result {
        match self {
            Error::NotEnoughSpace { needed, free } => {
                write!(f, "record needs {} bytes but only {} are free", needed, free)
            }
            Error::WrongBufferSize(n) => write!(f, "page buffer is {} bytes, expected {}", n, PAGE_SIZE),
            Error::Codec(e) => write!(f, "{}", e),
            Error::CorruptHeader => write!(f, "page header offsets violate slotted-page invariants"),
        }
    }
}

impl ::std::error::Error for Error {}

/// A single in-memory page. The page owns a full [`PAGE_SIZE`]-byte buffer
/// that is kept consistent with its header/slot-directory fields after every
/// mutation, so [`Page::to_bytes`] is always a cheap clone of that buffer.
#[derive(Debug, Clone)]
pub struct Page {
    min_id: i32,
    max_id: i32,
    slot_end_offset: i32,
    free_space_low_offset: i32,
    slots: Vec<(i32, i32)>,
    buf: Vec<u8>,
}

impl Page {
    /// Build a fresh, empty page.
    pub fn empty() -> Page {
        let mut page = Page {
            min_id: 0,
            max_id: 0,
            slot_end_offset: PAGE_HEADER_SIZE as i32,
            free_space_low_offset: PAGE_SIZE as i32,
            slots: Vec::new(),
            buf: vec![0u8; PAGE_SIZE],
        };
        page.write_header();
        page
    }

    fn write_header(&mut self) {
        LittleEndian::write_i32(&mut self.buf[0..4], self.min_id);
        LittleEndian::write_i32(&mut self.buf[4..8], self.max_id);
        LittleEndian::write_i32(&mut self.buf[8..12], self.slots.len() as i32);
        LittleEndian::write_i32(&mut self.buf[12..16], self.slot_end_offset);
        LittleEndian::write_i32(&mut self.buf[16..20], self.free_space_low_offset);
    }

    /// The number of bytes available for a new slot entry plus its record.
    pub fn free_space(&self) -> i32 {
        self.free_space_low_offset - self.slot_end_offset
    }

    /// Would a record of `encoded_size` bytes fit on this page, including the
    /// 8 bytes its slot entry would consume?
    pub fn fits(&self, encoded_size: i32) -> bool {
        self.free_space_low_offset - encoded_size >= self.slot_end_offset + 8
    }

    /// How many records are currently stored on this page.
    pub fn slot_count(&self) -> usize {
        self.slots.len()
    }

    /// Encode `record` against `schema` and append it to the page's slot
    /// directory and record heap.
    ///
    /// # Errors
    /// Fails with [`Error::NotEnoughSpace`] if the record does not fit, per
    /// the free-space test in the storage design (the new slot's 8 bytes are
    /// included in the check).
    pub fn append_record(&mut self, schema: &Schema, record: &Record) -> Result<(), Error> {
        let bytes = encode_record(schema, record)?;
        let size = bytes.len() as i32;

        if !self.fits(size) {
            return Err(Error::NotEnoughSpace {
                needed: size + 8,
                free: self.free_space(),
            });
        }

        let record_start = self.free_space_low_offset - size;
        let record_end = self.free_space_low_offset;
        self.buf[(record_start as usize)..(record_end as usize)].copy_from_slice(&bytes);

        self.slots.push((record_end, size));
        self.free_space_low_offset = record_start;
        self.slot_end_offset = PAGE_HEADER_SIZE as i32 + SLOT_SIZE as i32 * self.slots.len() as i32;

        if self.slots.len() == 1 {
            self.min_id = self.max_id + 1;
        }
        self.max_id += 1;

        let slot_index = self.slots.len() - 1;
        let slot_offset = PAGE_HEADER_SIZE + SLOT_SIZE * slot_index;
        LittleEndian::write_i32(&mut self.buf[slot_offset..slot_offset + 4], record_end);
        LittleEndian::write_i32(&mut self.buf[slot_offset + 4..slot_offset + 8], size);

        self.write_header();

        debug!(
            "appended {}-byte record to page (slot {}, {} bytes free)",
            size,
            slot_index,
            self.free_space()
        );

        Ok(())
    }

    /// Decode every record on the page, in slot (insertion) order.
    pub fn records(&self, schema: &Schema) -> Result<Vec<Record>, Error> {
        self.slots
            .iter()
            .map(|&(record_end, record_size)| {
                let start = (record_end - record_size) as usize;
                let end = record_end as usize;
                Ok(decode_record(schema, &self.buf[start..end])?)
            })
            .collect()
    }

    /// The raw 4096-byte on-disk representation of this page.
    pub fn to_bytes(&self) -> &[u8] {
        &self.buf
    }

    /// Decode a page from a raw [`PAGE_SIZE`]-byte buffer.
    ///
    /// # Errors
    /// Fails with [`Error::WrongBufferSize`] if `bytes` is not exactly
    /// [`PAGE_SIZE`] long, or [`Error::CorruptHeader`] if the header's
    /// offsets violate the slotted-page invariants.
    pub fn decode(bytes: &[u8]) -> Result<Page, Error> {
        if bytes.len() != PAGE_SIZE {
            return Err(Error::WrongBufferSize(bytes.len()));
        }

        let min_id = LittleEndian::read_i32(&bytes[0..4]);
        let max_id = LittleEndian::read_i32(&bytes[4..8]);
        let slot_count = LittleEndian::read_i32(&bytes[8..12]);
        let slot_end_offset = LittleEndian::read_i32(&bytes[12..16]);
        let free_space_low_offset = LittleEndian::read_i32(&bytes[16..20]);

        if slot_count < 0
            || slot_end_offset != PAGE_HEADER_SIZE as i32 + SLOT_SIZE as i32 * slot_count
            || free_space_low_offset > PAGE_SIZE as i32
            || slot_end_offset > free_space_low_offset
        {
            return Err(Error::CorruptHeader);
        }

        let mut slots = Vec::with_capacity(slot_count as usize);
        for i in 0..slot_count as usize {
            let offset = PAGE_HEADER_SIZE + SLOT_SIZE * i;
            let record_end = LittleEndian::read_i32(&bytes[offset..offset + 4]);
            let record_size = LittleEndian::read_i32(&bytes[offset + 4..offset + 8]);
            slots.push((record_end, record_size));
        }

        Ok(Page {
            min_id,
            max_id,
            slot_end_offset,
            free_space_low_offset,
            slots,
            buf: bytes.to_vec(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{ColumnType, Value};

    fn schema() -> Schema {
        Schema::new(vec![ColumnType::Int32, ColumnType::Str]).unwrap()
    }

    #[test]
    fn page_round_trip_preserves_insertion_order() {
        let schema = schema();
        let mut page = Page::empty();
        for i in 0..5 {
            page.append_record(&schema, &vec![Value::Int32(i), Value::Str(format!("row{}", i))])
                .unwrap();
        }

        let decoded = Page::decode(page.to_bytes()).unwrap();
        let records = decoded.records(&schema).unwrap();
        assert_eq!(records.len(), 5);
        for (i, record) in records.iter().enumerate() {
            assert_eq!(record[0], Value::Int32(i as i32));
            assert_eq!(record[1], Value::Str(format!("row{}", i)));
        }
    }

    #[test]
    fn free_space_strictly_decreases_on_append() {
        let schema = schema();
        let mut page = Page::empty();
        let mut previous = page.free_space();
        for i in 0..10 {
            page.append_record(&schema, &vec![Value::Int32(i), Value::Str("x".into())])
                .unwrap();
            let current = page.free_space();
            assert!(current < previous);
            previous = current;
        }
    }

    #[test]
    fn overflow_reports_not_enough_space() {
        let schema = Schema::new(vec![ColumnType::Str]).unwrap();
        let mut page = Page::empty();
        let big = Value::Str("x".repeat(255));
        loop {
            match page.append_record(&schema, &vec![big.clone()]) {
                Ok(()) => continue,
                Err(Error::NotEnoughSpace { .. }) => break,
                Err(e) => panic!("unexpected error: {}", e),
            }
        }
    }

    #[test]
    fn empty_page_has_no_records() {
        let schema = schema();
        let page = Page::empty();
        assert_eq!(page.records(&schema).unwrap().len(), 0);
        assert_eq!(page.free_space(), PAGE_SIZE as i32 - PAGE_HEADER_SIZE as i32);
    }
}
