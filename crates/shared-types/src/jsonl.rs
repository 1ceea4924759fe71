//! # Line-Delimited Export Data
//!
//! Export data is exchanged with the controller as a sequence of JSON arrays
//! (`[key, value]` or `[key]`), each terminated by a newline. This is not
//! strictly JSON Lines since every line, including the last, ends with `\n`;
//! blank lines are tolerated on read.

use std::fs::File;
use std::io::{BufRead, BufReader, Write};
use std::path::Path;

use crate::entities::KVEntry;
use crate::errors::KVEntryError;
use crate::reader::KVEntryReader;

/// Reader decoding one `KVEntry` per line.
pub struct JsonlKVEntryReader<R: BufRead + Send> {
    source: Option<R>,
    line: usize,
    buf: String,
    exhausted: bool,
}

impl<R: BufRead + Send> JsonlKVEntryReader<R> {
    /// Decode entries from `source`.
    pub fn new(source: R) -> Self {
        Self {
            source: Some(source),
            line: 0,
            buf: String::new(),
            exhausted: false,
        }
    }
}

impl JsonlKVEntryReader<BufReader<File>> {
    /// Open a file of line-delimited export data.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, KVEntryError> {
        let file = File::open(path)?;
        Ok(Self::new(BufReader::new(file)))
    }
}

impl<R: BufRead + Send> KVEntryReader for JsonlKVEntryReader<R> {
    fn read(&mut self) -> Result<Option<KVEntry>, KVEntryError> {
        let source = self.source.as_mut().ok_or(KVEntryError::Closed)?;
        if self.exhausted {
            return Err(KVEntryError::ReadPastEnd);
        }
        loop {
            self.buf.clear();
            if source.read_line(&mut self.buf)? == 0 {
                self.exhausted = true;
                return Ok(None);
            }
            self.line += 1;
            let text = self.buf.trim();
            if text.is_empty() {
                continue;
            }
            return serde_json::from_str(text)
                .map(Some)
                .map_err(|e| KVEntryError::Decode {
                    line: self.line,
                    message: e.to_string(),
                });
        }
    }

    fn close(&mut self) -> Result<(), KVEntryError> {
        self.source = None;
        Ok(())
    }
}

/// Drain `reader` into `writer`, one newline-terminated JSON array per entry.
///
/// The reader is not closed.
pub fn encode_kv_entry_reader_to_jsonl<R, W>(reader: &mut R, writer: &mut W) -> Result<(), KVEntryError>
where
    R: KVEntryReader + ?Sized,
    W: Write + ?Sized,
{
    while let Some(entry) = reader.read()? {
        serde_json::to_writer(&mut *writer, &entry).map_err(|e| KVEntryError::Encode(e.to_string()))?;
        writer.write_all(b"\n")?;
    }
    Ok(())
}
