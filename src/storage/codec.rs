//! Encodes and decodes a single [`Record`] against a [`Schema`], per the
//! on-disk record format: `INT32`/`FLOAT32` are 4-byte little-endian, `STRING`
//! is a one-byte length prefix followed by that many UTF-8 bytes.

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use std::io::{self, Cursor, Read};

use crate::schema::{ColumnType, Record, Schema, Value};

/// The largest UTF-8 byte length a `STRING` column can hold (the length
/// prefix is a single unsigned byte).
pub const MAX_STRING_LEN: usize = 255;

/// An error that can occur while encoding or decoding a [`Record`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// An I/O error occurred while reading/writing the backing buffer.
    Io(String),
    /// The input buffer ended before a record could be fully decoded.
    Truncated,
    /// A decoded record left unconsumed bytes behind (the provided length
    /// did not match the number of bytes the schema says the record needs).
    TrailingBytes(usize),
    /// A `STRING` value's UTF-8 byte length exceeds [`MAX_STRING_LEN`].
    StringTooLong(usize),
    /// A `STRING` column's bytes were not valid UTF-8.
    InvalidUtf8,
    /// The record's arity does not match the schema's.
    WrongArity {
        /// Number of values in the record.
        record_len: usize,
        /// Number of columns in the schema.
        schema_len: usize,
    },
    /// The value at the given column index does not match the schema's
    /// declared type for that column.
    TypeMismatch {
        /// The column index at which the mismatch occurred.
        index: usize,
        /// The type the schema declares for this column.
        expected: ColumnType,
        /// The type of the value actually provided.
        found: ColumnType,
    },
}

impl From<io::Error> for Error {
    fn from(e: io::Error) -> Error {
        Error::Io(e.to_string())
    }
}

impl ::std::fmt::Display for Error {
    fn fmt(&self, f: &mut ::std::fmt::Formatter) -> ::std::fmt::Result {
        match self {
            Error::Io(e) => write!(f, "an I/O error occurred: {}", e),
            Error::Truncated => write!(f, "record buffer ended before decoding finished"),
            Error::TrailingBytes(n) => write!(f, "{} unconsumed bytes left after decoding record", n),
            Error::StringTooLong(n) => {
                write!(f, "string of {} bytes exceeds the {}-byte limit", n, MAX_STRING_LEN)
            }
            Error::InvalidUtf8 => write!(f, "string column bytes were not valid UTF-8"),
            Error::WrongArity { record_len, schema_len } => write!(
                f,
                "record has {} values but schema has {} columns",
                record_len, schema_len
            ),
            Error::TypeMismatch { index, expected, found } => write!(
                f,
                "column {}: schema expects {:?} but value is {:?}",
                index, expected, found
            ),
        }
    }
}

impl ::std::error::Error for Error {}

/// Encode `record` against `schema`, producing the exact on-disk byte
/// sequence described in the record encoding table.
///
/// # Errors
/// Fails with [`Error::WrongArity`] or [`Error::TypeMismatch`] if `record`
/// does not conform to `schema`, or [`Error::StringTooLong`] if a `STRING`
/// value's UTF-8 length exceeds [`MAX_STRING_LEN`].
pub fn encode_record(schema: &Schema, record: &Record) -> Result<Vec<u8>, Error> {
    if record.len() != schema.num_columns() {
        return Err(Error::WrongArity {
            record_len: record.len(),
            schema_len: schema.num_columns(),
        });
    }

    let mut buf = Vec::new();
    for (index, (value, col_type)) in record.iter().zip(schema.columns()).enumerate() {
        if value.column_type() != *col_type {
            return Err(Error::TypeMismatch {
                index,
                expected: *col_type,
                found: value.column_type(),
            });
        }
        match value {
            Value::Int32(i) => buf.write_i32::<LittleEndian>(*i)?,
            Value::Float32(f) => buf.write_f32::<LittleEndian>(f.into_inner())?,
            Value::Str(s) => {
                let bytes = s.as_bytes();
                if bytes.len() > MAX_STRING_LEN {
                    return Err(Error::StringTooLong(bytes.len()));
                }
                buf.write_u8(bytes.len() as u8)?;
                buf.write_all(bytes)?;
            }
        }
    }

    Ok(buf)
}

/// Decode a single record out of `bytes`, which must contain exactly one
/// record's worth of data for `schema` (as delimited by a page's slot
/// directory). Trailing or missing bytes are both errors.
///
/// # Errors
/// Fails with [`Error::Truncated`] if `bytes` ends before the schema is fully
/// consumed, [`Error::InvalidUtf8`] if a string's bytes are not valid UTF-8,
/// or [`Error::TrailingBytes`] if bytes remain after the last column.
pub fn decode_record(schema: &Schema, bytes: &[u8]) -> Result<Record, Error> {
    let mut cursor = Cursor::new(bytes);
    let mut record = Vec::with_capacity(schema.num_columns());

    for col_type in schema.columns() {
        let value = match col_type {
            ColumnType::Int32 => {
                let i = cursor.read_i32::<LittleEndian>().map_err(|_| Error::Truncated)?;
                Value::Int32(i)
            }
            ColumnType::Float32 => {
                let f = cursor.read_f32::<LittleEndian>().map_err(|_| Error::Truncated)?;
                Value::float(f)
            }
            ColumnType::Str => {
                let len = cursor.read_u8().map_err(|_| Error::Truncated)? as usize;
                let mut string_bytes = vec![0u8; len];
                cursor.read_exact(&mut string_bytes).map_err(|_| Error::Truncated)?;
                Value::Str(String::from_utf8(string_bytes).map_err(|_| Error::InvalidUtf8)?)
            }
        };
        record.push(value);
    }

    let consumed = cursor.position() as usize;
    if consumed != bytes.len() {
        return Err(Error::TrailingBytes(bytes.len() - consumed));
    }

    Ok(record)
}
