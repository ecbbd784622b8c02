//! Reverse log reading - reads files backwards for efficient tail operations

use std::fs::File;
use std::io::{Read, Seek, SeekFrom};

/// Reads lines from a file in reverse order (last line first).
///
/// Line boundaries match what a forward reader would produce: a single
/// trailing newline does not start an extra line, empty lines are kept, a
/// trailing `\r` is dropped and invalid UTF-8 is replaced.
pub struct ReverseLineReader {
    file: File,
    /// Current position in file (we read backwards from here)
    pos: u64,
    chunk_size: usize,
    /// Start of a line whose beginning lies in an earlier chunk
    carry: Vec<u8>,
    /// Lines from the current chunk, earliest first
    pending: Vec<String>,
    /// Whether the chunk holding the end of file has been read
    started: bool,
    finished: bool,
}

impl ReverseLineReader {
    const DEFAULT_CHUNK_SIZE: usize = 64 * 1024; // 64KB chunks

    pub fn new(file: File) -> std::io::Result<Self> {
        let file_size = file.metadata()?.len();
        Ok(Self {
            file,
            pos: file_size,
            chunk_size: Self::DEFAULT_CHUNK_SIZE,
            carry: Vec::new(),
            pending: Vec::new(),
            started: false,
            finished: file_size == 0,
        })
    }

    #[cfg(test)]
    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size.max(1);
        self
    }

    /// Read the next line (going backwards through the file)
    pub fn next_line(&mut self) -> std::io::Result<Option<String>> {
        loop {
            if let Some(line) = self.pending.pop() {
                return Ok(Some(line));
            }
            if self.finished {
                return Ok(None);
            }
            self.read_chunk_backwards()?;
        }
    }

    fn read_chunk_backwards(&mut self) -> std::io::Result<()> {
        let read_size = std::cmp::min(self.pos, self.chunk_size as u64) as usize;
        let new_pos = self.pos - read_size as u64;
        self.file.seek(SeekFrom::Start(new_pos))?;

        let mut buf = vec![0u8; read_size];
        self.file.read_exact(&mut buf)?;
        self.pos = new_pos;
        buf.append(&mut self.carry);

        let mut end = buf.len();
        if !self.started {
            self.started = true;
            if buf.last() == Some(&b'\n') {
                end -= 1;
            }
        }

        let mut lines = Vec::new();
        while let Some(newline_pos) = memchr::memrchr(b'\n', &buf[..end]) {
            lines.push(decode_line(&buf[newline_pos + 1..end]));
            end = newline_pos;
        }

        if self.pos == 0 {
            lines.push(decode_line(&buf[..end]));
            self.finished = true;
        } else {
            buf.truncate(end);
            self.carry = buf;
        }

        // Collected last-first; pop() must yield the last line first
        lines.reverse();
        self.pending = lines;
        Ok(())
    }
}

fn decode_line(bytes: &[u8]) -> String {
    let bytes = bytes.strip_suffix(b"\r").unwrap_or(bytes);
    String::from_utf8_lossy(bytes).into_owned()
}

/// The last `count` lines of `file`, in file order
pub fn tail_lines(file: File, count: usize) -> std::io::Result<Vec<String>> {
    let mut reader = ReverseLineReader::new(file)?;
    let mut lines = Vec::with_capacity(count.min(1024));
    while lines.len() < count {
        match reader.next_line()? {
            Some(line) => lines.push(line),
            None => break,
        }
    }
    lines.reverse();
    Ok(lines)
}
