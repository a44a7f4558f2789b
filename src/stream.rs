//! Byte-oriented sequential streams with a sticky error state.
//!
//! Every encoded-data primitive in the crate is stream-typed.  The first
//! error observed on a stream is recorded and every later operation
//! returns that same error without touching the underlying buffer, so
//! callers may elide per-step checks and still detect failure at the end
//! of a parse.  Write streams may be backed by a caller buffer or by a
//! null sink that only counts bytes, which makes length prediction a
//! dry-run of the real encoder.

use crate::{CryptError, CryptResult};

/// Sequential reader over a borrowed byte buffer.
#[derive(Debug)]
pub struct ReadStream<'a> {
    buf: &'a [u8],
    pos: usize,
    error: Option<CryptError>,
}

impl<'a> ReadStream<'a> {
    /// Connect a read stream to a memory buffer.
    #[must_use]
    pub fn new(buf: &'a [u8]) -> Self {
        ReadStream { buf, pos: 0, error: None }
    }

    /// Record `err` as the stream's sticky error (first error wins) and
    /// return the error that is now in effect.
    pub fn set_error(&mut self, err: CryptError) -> CryptError {
        let eff = *self.error.get_or_insert(err);
        eff
    }

    /// The sticky error, if any operation has failed.
    #[must_use]
    pub fn error(&self) -> Option<CryptError> {
        self.error
    }

    fn check(&self) -> CryptResult<()> {
        match self.error {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    /// Current read position.
    #[must_use]
    pub fn tell(&self) -> usize {
        self.pos
    }

    /// Number of unread bytes.
    #[must_use]
    pub fn data_left(&self) -> usize {
        self.buf.len() - self.pos
    }

    /// Read one byte.
    pub fn getc(&mut self) -> CryptResult<u8> {
        self.check()?;
        match self.buf.get(self.pos) {
            Some(&b) => {
                self.pos += 1;
                Ok(b)
            }
            None => Err(self.set_error(CryptError::Underflow)),
        }
    }

    /// Return the next byte without consuming it.
    pub fn peek(&mut self) -> CryptResult<u8> {
        self.check()?;
        match self.buf.get(self.pos) {
            Some(&b) => Ok(b),
            None => Err(self.set_error(CryptError::Underflow)),
        }
    }

    /// Fill `out` from the stream.
    pub fn read(&mut self, out: &mut [u8]) -> CryptResult<()> {
        let data = self.read_slice(out.len())?;
        out.copy_from_slice(data);
        Ok(())
    }

    /// Consume `count` bytes and return them as a slice of the backing
    /// buffer.
    pub fn read_slice(&mut self, count: usize) -> CryptResult<&'a [u8]> {
        self.check()?;
        if self.data_left() < count {
            return Err(self.set_error(CryptError::Underflow));
        }
        let data = &self.buf[self.pos..self.pos + count];
        self.pos += count;
        Ok(data)
    }

    /// Skip `count` bytes.  `count` larger than `max` (the caller's
    /// plausibility bound) or than the remaining data is refused.
    pub fn skip(&mut self, count: usize, max: usize) -> CryptResult<()> {
        self.check()?;
        if count > max {
            return Err(self.set_error(CryptError::BadData));
        }
        if self.data_left() < count {
            return Err(self.set_error(CryptError::Underflow));
        }
        self.pos += count;
        Ok(())
    }
}

#[derive(Debug)]
enum Sink<'a> {
    Memory(&'a mut [u8]),
    Null,
}

/// Sequential writer over a caller buffer or a length-counting null sink.
#[derive(Debug)]
pub struct WriteStream<'a> {
    sink: Sink<'a>,
    pos: usize,
    error: Option<CryptError>,
}

impl<'a> WriteStream<'a> {
    /// Open a write stream over a memory buffer.
    #[must_use]
    pub fn new(buf: &'a mut [u8]) -> Self {
        WriteStream { sink: Sink::Memory(buf), pos: 0, error: None }
    }

    /// Open a null write stream that discards data and only counts it.
    #[must_use]
    pub fn null() -> WriteStream<'static> {
        WriteStream { sink: Sink::Null, pos: 0, error: None }
    }

    /// Whether this stream discards its output.
    #[must_use]
    pub fn is_null(&self) -> bool {
        matches!(self.sink, Sink::Null)
    }

    /// Record `err` as the stream's sticky error (first error wins) and
    /// return the error that is now in effect.
    pub fn set_error(&mut self, err: CryptError) -> CryptError {
        let eff = *self.error.get_or_insert(err);
        eff
    }

    /// The sticky error, if any operation has failed.
    #[must_use]
    pub fn error(&self) -> Option<CryptError> {
        self.error
    }

    fn check(&self) -> CryptResult<()> {
        match self.error {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    /// Number of bytes written (or counted) so far.
    #[must_use]
    pub fn tell(&self) -> usize {
        self.pos
    }

    /// Write one byte.
    pub fn putc(&mut self, byte: u8) -> CryptResult<()> {
        self.write(&[byte])
    }

    /// Write a buffer.
    pub fn write(&mut self, data: &[u8]) -> CryptResult<()> {
        self.check()?;
        match self.sink {
            Sink::Memory(ref mut buf) => {
                if buf.len() - self.pos < data.len() {
                    return Err(self.set_error(CryptError::Overflow));
                }
                buf[self.pos..self.pos + data.len()].copy_from_slice(data);
            }
            Sink::Null => {}
        }
        self.pos += data.len();
        Ok(())
    }

    /// Advance the position without writing, used by dummy-write length
    /// prediction.  On a memory sink the skipped bytes are left as-is.
    pub fn skip(&mut self, count: usize) -> CryptResult<()> {
        self.check()?;
        if let Sink::Memory(ref buf) = self.sink {
            if buf.len() - self.pos < count {
                return Err(self.set_error(CryptError::Overflow));
            }
        }
        self.pos += count;
        Ok(())
    }
}
