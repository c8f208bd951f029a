//! Leaf operators: everything that produces records rather than consuming
//! them. A scan never has a child.

use std::collections::VecDeque;
use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};

use crate::query::{Error, PlanNode};
use crate::schema::{Record, Value};
use crate::storage::DatabaseFile;

/// Yields records from an in-memory, caller-supplied table.
pub struct MemoryScan {
    table: Vec<Record>,
    index: usize,
}

impl MemoryScan {
    /// Wrap `table` for sequential, repeatable scanning.
    pub fn new(table: Vec<Record>) -> MemoryScan {
        MemoryScan { table, index: 0 }
    }
}

impl PlanNode for MemoryScan {
    fn next(&mut self) -> Result<Option<Record>, Error> {
        if self.index >= self.table.len() {
            return Ok(None);
        }
        let record = self.table[self.index].clone();
        self.index += 1;
        Ok(Some(record))
    }

    fn has_next(&self) -> bool {
        self.index < self.table.len()
    }

    fn reset(&mut self) -> Result<(), Error> {
        self.index = 0;
        Ok(())
    }
}

/// Streams a CSV file line by line, treating every cell as a string.
///
/// The header line is discarded on open. Lines are read with their trailing
/// `\n` intact and are not trimmed before splitting on `,`, so the last cell
/// of the last line carries the newline byte exactly as it appears on disk.
pub struct CSVFileScan {
    path: PathBuf,
    chunk: usize,
    reader: BufReader<File>,
    finished: bool,
}

impl CSVFileScan {
    /// Open `path` for scanning, buffering up to `chunk` bytes per read.
    pub fn open<P: AsRef<Path>>(path: P, chunk: usize) -> Result<CSVFileScan, Error> {
        let path = path.as_ref().to_path_buf();
        let mut reader = BufReader::with_capacity(chunk.max(1), File::open(&path)?);
        skip_header(&mut reader)?;
        Ok(CSVFileScan {
            path,
            chunk,
            reader,
            finished: false,
        })
    }
}

fn skip_header(reader: &mut BufReader<File>) -> Result<(), Error> {
    let mut header = Vec::new();
    read_raw_line(reader, &mut header)?;
    Ok(())
}

fn read_raw_line(reader: &mut BufReader<File>, buf: &mut Vec<u8>) -> Result<usize, Error> {
    use std::io::BufRead;
    Ok(reader.read_until(b'\n', buf)?)
}

impl PlanNode for CSVFileScan {
    fn next(&mut self) -> Result<Option<Record>, Error> {
        if self.finished {
            return Ok(None);
        }

        let mut line = Vec::new();
        let n = read_raw_line(&mut self.reader, &mut line)?;
        if n == 0 {
            self.finished = true;
            return Ok(None);
        }

        let text = String::from_utf8_lossy(&line).into_owned();
        let record = text.split(',').map(|cell| Value::Str(cell.to_string())).collect();
        Ok(Some(record))
    }

    fn has_next(&self) -> bool {
        !self.finished
    }

    fn reset(&mut self) -> Result<(), Error> {
        self.reader = BufReader::with_capacity(self.chunk.max(1), File::open(&self.path)?);
        skip_header(&mut self.reader)?;
        self.finished = false;
        Ok(())
    }
}

/// Pulls records out of a [`DatabaseFile`] one page at a time.
pub struct FileScan {
    file: DatabaseFile,
    pending: VecDeque<Record>,
    finished: bool,
}

impl FileScan {
    /// Scan `file` from its first page.
    pub fn new(file: DatabaseFile) -> FileScan {
        FileScan {
            file,
            pending: VecDeque::new(),
            finished: false,
        }
    }
}

impl PlanNode for FileScan {
    fn next(&mut self) -> Result<Option<Record>, Error> {
        loop {
            if let Some(record) = self.pending.pop_front() {
                return Ok(Some(record));
            }
            if self.finished {
                return Ok(None);
            }
            match self.file.read_next_page()? {
                Some(page) => {
                    let records = page.records(self.file.schema())?;
                    self.pending.extend(records);
                }
                None => {
                    self.finished = true;
                    return Ok(None);
                }
            }
        }
    }

    fn has_next(&self) -> bool {
        !self.pending.is_empty() || !self.finished
    }

    fn reset(&mut self) -> Result<(), Error> {
        self.file.reset_scan()?;
        self.pending.clear();
        self.finished = false;
        Ok(())
    }
}
