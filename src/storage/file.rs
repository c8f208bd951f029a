//! The on-disk database file: a 400-byte file header followed by a
//! contiguous sequence of 4096-byte pages. The engine is single-threaded and
//! single-writer; there is no buffer pool, only the current tail page held
//! resident for appends and scans.

use byteorder::{ByteOrder, LittleEndian};
use std::fs::{File, OpenOptions};
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use crate::schema::{Record, Schema, SchemaError};
use crate::storage::page::{self, Page, PAGE_SIZE};

/// The fixed size, in bytes, of the file header.
pub const HEADER_SIZE: usize = 400;

const NAME_FIELD_SIZE: usize = 64;
const SCHEMA_FIELD_SIZE: usize = 256;

/// An error that can occur while opening, reading, or writing a [`DatabaseFile`].
#[derive(Debug)]
pub enum Error {
    /// An I/O error occurred.
    Io(io::Error),
    /// The path given to [`DatabaseFile::open`] names an existing directory.
    NotAFile(PathBuf),
    /// The file header could not be decoded (truncated, or not valid UTF-8
    /// in one of its name/schema fields).
    DecodeHeader(String),
    /// The file header's embedded schema descriptor did not parse.
    Schema(SchemaError),
    /// A database/table name exceeds the 64-byte field width.
    NameTooLong(String),
    /// A page-level error occurred while encoding/decoding a record or page.
    Page(page::Error),
    /// `read_next_page` found a page-sized region truncated partway through.
    TruncatedPage(usize),
}

impl From<io::Error> for Error {
    fn from(e: io::Error) -> Error {
        Error::Io(e)
    }
}

impl From<page::Error> for Error {
    fn from(e: page::Error) -> Error {
        Error::Page(e)
    }
}

impl From<SchemaError> for Error {
    fn from(e: SchemaError) -> Error {
        Error::Schema(e)
    }
}

impl ::std::fmt::Display for Error {
    fn fmt(&self, f: &mut ::std::fmt::Formatter) -> ::std::fmt::Result {
        match self {
            Error::Io(e) => write!(f, "an I/O error occurred: {}", e),
            Error::NotAFile(p) => write!(f, "{} is a directory, not a database file", p.display()),
            Error::DecodeHeader(e) => write!(f, "could not decode file header: {}", e),
            Error::Schema(e) => write!(f, "{}", e),
            Error::NameTooLong(name) => write!(f, "name '{}' exceeds the {}-byte field width", name, NAME_FIELD_SIZE),
            Error::Page(e) => write!(f, "{}", e),
            Error::TruncatedPage(n) => write!(f, "page read truncated after {} of {} bytes", n, PAGE_SIZE),
        }
    }
}

impl ::std::error::Error for Error {}

struct FileHeader {
    db_name: String,
    table_name: String,
    schema: Schema,
    table_size: i32,
    start_offset: i32,
    end_offset: i64,
}

fn write_padded_field(buf: &mut [u8], s: &str) -> Result<(), Error> {
    let bytes = s.as_bytes();
    if bytes.len() > buf.len() {
        return Err(Error::NameTooLong(s.to_string()));
    }
    buf[..bytes.len()].copy_from_slice(bytes);
    for b in &mut buf[bytes.len()..] {
        *b = 0;
    }
    Ok(())
}

fn read_padded_field(buf: &[u8]) -> Result<String, Error> {
    let end = buf.iter().position(|&b| b == 0).unwrap_or(buf.len());
    String::from_utf8(buf[..end].to_vec()).map_err(|e| Error::DecodeHeader(e.to_string()))
}

impl FileHeader {
    fn encode(&self) -> Result<[u8; HEADER_SIZE], Error> {
        let mut buf = [0u8; HEADER_SIZE];
        write_padded_field(&mut buf[0..64], &self.db_name)?;
        write_padded_field(&mut buf[64..128], &self.table_name)?;
        write_padded_field(&mut buf[128..384], &self.schema.to_descriptor())?;
        LittleEndian::write_i32(&mut buf[384..388], self.table_size);
        LittleEndian::write_i32(&mut buf[388..392], self.start_offset);
        LittleEndian::write_i64(&mut buf[392..400], self.end_offset);
        Ok(buf)
    }

    fn decode(buf: &[u8]) -> Result<FileHeader, Error> {
        if buf.len() != HEADER_SIZE {
            return Err(Error::DecodeHeader(format!("expected {} bytes, got {}", HEADER_SIZE, buf.len())));
        }
        let db_name = read_padded_field(&buf[0..64])?;
        let table_name = read_padded_field(&buf[64..128])?;
        let schema_descriptor = read_padded_field(&buf[128..384])?;
        let schema = Schema::parse(&schema_descriptor)?;
        let table_size = LittleEndian::read_i32(&buf[384..388]);
        let start_offset = LittleEndian::read_i32(&buf[388..392]);
        let end_offset = LittleEndian::read_i64(&buf[392..400]);
        Ok(FileHeader {
            db_name,
            table_name,
            schema,
            table_size,
            start_offset,
            end_offset,
        })
    }
}

/// A paged database file: file header plus an ordered sequence of pages,
/// accessed through `append`/`FileScan`-style sequential reads.
pub struct DatabaseFile {
    file: File,
    header: FileHeader,
    tail: Option<Page>,
}

impl DatabaseFile {
    /// Open `path` as a database file, creating it if it does not exist.
    ///
    /// If the file exists, its header is read and its embedded schema is
    /// trusted over `schema` (the caller-supplied schema is only used to
    /// create a new file). If it does not exist, a fresh file is created
    /// with a single empty page.
    ///
    /// # Errors
    /// Fails with [`Error::NotAFile`] if `path` names a directory, or
    /// [`Error::DecodeHeader`]/[`Error::Schema`] if an existing file's header
    /// cannot be decoded.
    pub fn open<P: AsRef<Path>>(path: P, db_name: &str, table_name: &str, schema: Schema) -> Result<DatabaseFile, Error> {
        let path = path.as_ref();
        if path.is_dir() {
            return Err(Error::NotAFile(path.to_path_buf()));
        }

        if path.exists() {
            let mut file = OpenOptions::new().read(true).write(true).open(path)?;
            let mut header_bytes = [0u8; HEADER_SIZE];
            file.read_exact(&mut header_bytes)?;
            let header = FileHeader::decode(&header_bytes)?;

            let tail = if header.end_offset > header.start_offset as i64 {
                file.seek(SeekFrom::Start((header.end_offset - PAGE_SIZE as i64) as u64))?;
                let mut page_bytes = [0u8; PAGE_SIZE];
                file.read_exact(&mut page_bytes)?;
                Some(Page::decode(&page_bytes)?)
            } else {
                None
            };

            info!("opened existing database file {}", path.display());
            Ok(DatabaseFile { file, header, tail })
        } else {
            let mut file = OpenOptions::new().read(true).write(true).create(true).open(path)?;
            let start_offset = HEADER_SIZE as i32;
            let header = FileHeader {
                db_name: db_name.to_string(),
                table_name: table_name.to_string(),
                schema,
                table_size: start_offset + PAGE_SIZE as i32,
                start_offset,
                end_offset: start_offset as i64 + PAGE_SIZE as i64,
            };
            file.write_all(&header.encode()?)?;
            let tail = Page::empty();
            file.write_all(tail.to_bytes())?;
            file.flush()?;

            info!("created database file {} ({})", path.display(), header.schema.to_descriptor());
            Ok(DatabaseFile {
                file,
                header,
                tail: Some(tail),
            })
        }
    }

    /// The schema this file was created (or opened) with.
    pub fn schema(&self) -> &Schema {
        &self.header.schema
    }

    /// The byte offset of the first page (always [`HEADER_SIZE`]).
    pub fn start_offset(&self) -> i64 {
        self.header.start_offset as i64
    }

    /// The byte offset one past the last page.
    pub fn end_offset(&self) -> i64 {
        self.header.end_offset
    }

    /// Append `record` to the table, allocating a new page if the current
    /// tail page has no room for it.
    ///
    /// # Errors
    /// Fails if the record cannot be encoded against the file's schema, or
    /// if flushing a full tail page to disk fails.
    pub fn append(&mut self, record: &Record) -> Result<(), Error> {
        let schema = self.header.schema.clone();
        let tail = self.tail.get_or_insert_with(Page::empty);

        match tail.append_record(&schema, record) {
            Ok(()) => Ok(()),
            Err(page::Error::NotEnoughSpace { .. }) => {
                self.write_dirty()?;
                self.header.end_offset += PAGE_SIZE as i64;
                self.header.table_size = self.header.start_offset + (self.header.end_offset - self.header.start_offset as i64) as i32;

                info!("page full, allocated new page at offset {}", self.header.end_offset - PAGE_SIZE as i64);

                let mut fresh = Page::empty();
                fresh.append_record(&schema, record)?;
                self.tail = Some(fresh);
                Ok(())
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Write the in-memory tail page back to disk at its computed offset
    /// (`end_offset - PAGE_SIZE`), and persist the updated file header.
    pub fn write_dirty(&mut self) -> Result<(), Error> {
        if let Some(tail) = &self.tail {
            let offset = self.header.end_offset - PAGE_SIZE as i64;
            self.file.seek(SeekFrom::Start(offset as u64))?;
            self.file.write_all(tail.to_bytes())?;
        }
        self.file.seek(SeekFrom::Start(0))?;
        self.file.write_all(&self.header.encode()?)?;
        self.file.flush()?;
        debug!("flushed tail page and header to disk");
        Ok(())
    }

    /// Seek the file's read cursor to the first page, for a fresh
    /// [`DatabaseFile::read_next_page`] sweep.
    pub fn reset_scan(&mut self) -> Result<(), Error> {
        self.file.seek(SeekFrom::Start(self.header.start_offset as u64))?;
        Ok(())
    }

    /// Read and decode the next page from the current file cursor.
    ///
    /// Returns `Ok(None)` at a clean end-of-file. Must be called after
    /// [`DatabaseFile::reset_scan`] to read from the beginning.
    pub fn read_next_page(&mut self) -> Result<Option<Page>, Error> {
        let mut buf = [0u8; PAGE_SIZE];
        let mut read = 0;
        loop {
            let n = self.file.read(&mut buf[read..])?;
            if n == 0 {
                break;
            }
            read += n;
            if read == PAGE_SIZE {
                break;
            }
        }

        if read == 0 {
            return Ok(None);
        }
        if read != PAGE_SIZE {
            return Err(Error::TruncatedPage(read));
        }

        Ok(Some(Page::decode(&buf)?))
    }

    /// Flush any dirty tail page and release the file handle.
    pub fn close(mut self) -> Result<(), Error> {
        self.write_dirty()
    }
}

impl Drop for DatabaseFile {
    fn drop(&mut self) {
        if let Err(e) = self.write_dirty() {
            warn!("failed to flush tail page on drop: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{ColumnType, Value};

    fn schema() -> Schema {
        Schema::new(vec![ColumnType::Int32, ColumnType::Str, ColumnType::Str]).unwrap()
    }

    #[test]
    fn file_round_trip_200_records() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("t.db");

        {
            let mut db = DatabaseFile::open(&path, "mydb", "movies", schema()).unwrap();
            for i in 0..200 {
                db.append(&vec![
                    Value::Int32(i),
                    Value::Str(format!("title-{}", i)),
                    Value::Str("genre".repeat(6)),
                ])
                .unwrap();
            }
            db.write_dirty().unwrap();
        }

        let mut db = DatabaseFile::open(&path, "mydb", "movies", schema()).unwrap();
        db.reset_scan().unwrap();
        let mut records = Vec::new();
        while let Some(page) = db.read_next_page().unwrap() {
            records.extend(page.records(db.schema()).unwrap());
        }

        assert_eq!(records.len(), 200);
        for (i, record) in records.iter().enumerate() {
            assert_eq!(record[0], Value::Int32(i as i32));
            assert_eq!(record[1], Value::Str(format!("title-{}", i)));
        }
    }

    #[test]
    fn end_offset_grows_by_exactly_one_page_on_overflow() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("t.db");
        let mut db = DatabaseFile::open(&path, "mydb", "t", Schema::new(vec![ColumnType::Str]).unwrap()).unwrap();

        let before = db.end_offset();
        let big = Value::Str("x".repeat(255));
        loop {
            let after = db.end_offset();
            if after != before {
                assert_eq!(after, before + PAGE_SIZE as i64);
                break;
            }
            db.append(&vec![big.clone()]).unwrap();
        }
    }

    #[test]
    fn open_rejects_directory_path() {
        let dir = tempfile::tempdir().unwrap();
        let err = DatabaseFile::open(dir.path(), "mydb", "t", schema()).unwrap_err();
        assert!(matches!(err, Error::NotAFile(_)));
    }

    #[test]
    fn reopen_preserves_schema() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("t.db");
        {
            let mut db = DatabaseFile::open(&path, "mydb", "t", schema()).unwrap();
            db.append(&vec![Value::Int32(1), Value::Str("a".into()), Value::Str("b".into())])
                .unwrap();
        }
        let db = DatabaseFile::open(&path, "mydb", "t", schema()).unwrap();
        assert_eq!(db.schema(), &schema());
    }
}
