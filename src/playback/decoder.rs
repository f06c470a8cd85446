//! Protocol decoder
//!
//! Reads the byte stream two bytes at a time. A trailing odd byte is not a
//! word and is ignored.

use std::io::{self, ErrorKind, Read};

use crate::protocol::Command;

/// Iterator over the big-endian words of a stream
pub struct WordReader<R> {
    inner: R,
    done: bool,
}

impl<R: Read> WordReader<R> {
    pub fn new(inner: R) -> Self {
        Self { inner, done: false }
    }

    /// Decoded commands instead of raw words
    pub fn commands(self) -> impl Iterator<Item = io::Result<Command>> {
        self.map(|word| word.map(Command::decode))
    }

    fn read_word(&mut self) -> io::Result<Option<u16>> {
        let mut buf = [0u8; 2];
        let mut filled = 0;
        while filled < buf.len() {
            match self.inner.read(&mut buf[filled..]) {
                Ok(0) => return Ok(None),
                Ok(n) => filled += n,
                Err(e) if e.kind() == ErrorKind::Interrupted => {}
                Err(e) => return Err(e),
            }
        }
        Ok(Some(u16::from_be_bytes(buf)))
    }
}

impl<R: Read> Iterator for WordReader<R> {
    type Item = io::Result<u16>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        match self.read_word() {
            Ok(Some(word)) => Some(Ok(word)),
            Ok(None) => {
                self.done = true;
                None
            }
            Err(e) => {
                self.done = true;
                Some(Err(e))
            }
        }
    }
}

/// Decode an in-memory stream
pub fn decode_bytes(bytes: &[u8]) -> Vec<Command> {
    bytes
        .chunks_exact(2)
        .map(|pair| Command::decode(u16::from_be_bytes([pair[0], pair[1]])))
        .collect()
}
