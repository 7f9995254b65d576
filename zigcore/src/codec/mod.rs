//! Attribute and command payload codec.
//!
//! A [`PayloadCodec`] walks a fixed-size buffer with a cursor, reading or
//! writing little-endian integers, length-prefixed short strings and raw
//! byte runs. The first failure poisons the context: every later call
//! returns the same error and leaves the buffer untouched, so callers can
//! chain a sequence of operations and check once.
//!
//! ```
//! use zigcore::codec::PayloadCodec;
//!
//! let mut buf = [0u8; 8];
//! let mut writer = PayloadCodec::writer(&mut buf);
//! writer.put_u16(0x0102).unwrap();
//! writer.put_string("hi").unwrap();
//! let written = writer.finish().unwrap();
//!
//! let mut reader = PayloadCodec::reader(&buf[..written]);
//! assert_eq!(reader.get_u16().unwrap(), 0x0102);
//! assert_eq!(reader.get_string().unwrap(), "hi");
//! ```

use thiserror::Error;
use tracing::warn;

/// Longest string a one-byte length prefix can describe.
pub const MAX_SHORT_STRING_LEN: usize = 255;

/// Errors raised while marshalling a payload.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CodecError {
    /// The operation would run past the end of the buffer.
    #[error("buffer overrun at offset {offset}: need {needed} bytes, {available} available")]
    OutOfRange {
        offset: usize,
        needed: usize,
        available: usize,
    },

    /// A read was attempted on a write context or vice versa.
    #[error("wrong codec mode: context is in {expected} mode")]
    WrongMode { expected: CodecMode },

    /// The string does not fit a one-byte length prefix.
    #[error("string of {length} bytes exceeds the 255 byte limit")]
    TooLong { length: usize },
}

/// Direction a codec context was created for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CodecMode {
    Read,
    Write,
}

impl std::fmt::Display for CodecMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CodecMode::Read => write!(f, "read"),
            CodecMode::Write => write!(f, "write"),
        }
    }
}

enum Storage<'a> {
    Read(&'a [u8]),
    Write(&'a mut [u8]),
}

impl Storage<'_> {
    fn len(&self) -> usize {
        match self {
            Storage::Read(b) => b.len(),
            Storage::Write(b) => b.len(),
        }
    }

    fn mode(&self) -> CodecMode {
        match self {
            Storage::Read(_) => CodecMode::Read,
            Storage::Write(_) => CodecMode::Write,
        }
    }
}

/// Sequential marshal/unmarshal context over a fixed buffer.
pub struct PayloadCodec<'a> {
    storage: Storage<'a>,
    cursor: usize,
    error: Option<CodecError>,
}

impl<'a> PayloadCodec<'a> {
    /// Creates a read-mode context over `buf`.
    pub fn reader(buf: &'a [u8]) -> Self {
        Self {
            storage: Storage::Read(buf),
            cursor: 0,
            error: None,
        }
    }

    /// Creates a write-mode context over `buf`.
    pub fn writer(buf: &'a mut [u8]) -> Self {
        Self {
            storage: Storage::Write(buf),
            cursor: 0,
            error: None,
        }
    }

    /// Returns the mode this context was created with.
    pub fn mode(&self) -> CodecMode {
        self.storage.mode()
    }

    /// Current cursor offset.
    #[inline]
    pub fn position(&self) -> usize {
        self.cursor
    }

    /// Bytes left between the cursor and the buffer end.
    #[inline]
    pub fn remaining(&self) -> usize {
        self.storage.len() - self.cursor
    }

    /// The error that poisoned this context, if any.
    pub fn error(&self) -> Option<&CodecError> {
        self.error.as_ref()
    }

    /// Validates the next operation and reserves `needed` bytes.
    ///
    /// Returns the offset the operation starts at.
    fn reserve(&mut self, mode: CodecMode, needed: usize) -> Result<usize, CodecError> {
        if let Some(err) = &self.error {
            return Err(err.clone());
        }

        let err = if self.storage.mode() != mode {
            Some(CodecError::WrongMode {
                expected: self.storage.mode(),
            })
        } else if needed > self.remaining() {
            Some(CodecError::OutOfRange {
                offset: self.cursor,
                needed,
                available: self.remaining(),
            })
        } else {
            None
        };

        match err {
            Some(err) => Err(self.poison(err)),
            None => {
                let start = self.cursor;
                self.cursor += needed;
                Ok(start)
            }
        }
    }

    fn poison(&mut self, err: CodecError) -> CodecError {
        self.error = Some(err.clone());
        err
    }

    fn read_array<const N: usize>(&mut self) -> Result<[u8; N], CodecError> {
        let start = self.reserve(CodecMode::Read, N)?;
        let mut out = [0u8; N];
        if let Storage::Read(buf) = &self.storage {
            out.copy_from_slice(&buf[start..start + N]);
        }
        Ok(out)
    }

    fn write_slice(&mut self, bytes: &[u8]) -> Result<(), CodecError> {
        let start = self.reserve(CodecMode::Write, bytes.len())?;
        if let Storage::Write(buf) = &mut self.storage {
            buf[start..start + bytes.len()].copy_from_slice(bytes);
        }
        Ok(())
    }

    pub fn get_u8(&mut self) -> Result<u8, CodecError> {
        self.read_array::<1>().map(|b| b[0])
    }

    pub fn get_u16(&mut self) -> Result<u16, CodecError> {
        self.read_array().map(u16::from_le_bytes)
    }

    pub fn get_u32(&mut self) -> Result<u32, CodecError> {
        self.read_array().map(u32::from_le_bytes)
    }

    pub fn get_u64(&mut self) -> Result<u64, CodecError> {
        self.read_array().map(u64::from_le_bytes)
    }

    pub fn get_i8(&mut self) -> Result<i8, CodecError> {
        self.read_array().map(i8::from_le_bytes)
    }

    pub fn get_i16(&mut self) -> Result<i16, CodecError> {
        self.read_array().map(i16::from_le_bytes)
    }

    pub fn get_i32(&mut self) -> Result<i32, CodecError> {
        self.read_array().map(i32::from_le_bytes)
    }

    /// Reads a one-byte length prefix followed by that many bytes.
    ///
    /// Invalid UTF-8 is replaced rather than rejected; device firmware is
    /// not always careful about what it puts in string attributes.
    pub fn get_string(&mut self) -> Result<String, CodecError> {
        let len = self.get_u8()? as usize;
        let bytes = self.get_bytes(len)?;
        Ok(String::from_utf8_lossy(&bytes).into_owned())
    }

    /// Reads `len` raw bytes.
    pub fn get_bytes(&mut self, len: usize) -> Result<Vec<u8>, CodecError> {
        let start = self.reserve(CodecMode::Read, len)?;
        match &self.storage {
            Storage::Read(buf) => Ok(buf[start..start + len].to_vec()),
            Storage::Write(_) => Ok(Vec::new()),
        }
    }

    pub fn put_u8(&mut self, value: u8) -> Result<(), CodecError> {
        self.write_slice(&[value])
    }

    pub fn put_u16(&mut self, value: u16) -> Result<(), CodecError> {
        self.write_slice(&value.to_le_bytes())
    }

    pub fn put_u32(&mut self, value: u32) -> Result<(), CodecError> {
        self.write_slice(&value.to_le_bytes())
    }

    pub fn put_u64(&mut self, value: u64) -> Result<(), CodecError> {
        self.write_slice(&value.to_le_bytes())
    }

    pub fn put_i8(&mut self, value: i8) -> Result<(), CodecError> {
        self.write_slice(&value.to_le_bytes())
    }

    pub fn put_i16(&mut self, value: i16) -> Result<(), CodecError> {
        self.write_slice(&value.to_le_bytes())
    }

    pub fn put_i32(&mut self, value: i32) -> Result<(), CodecError> {
        self.write_slice(&value.to_le_bytes())
    }

    /// Writes a one-byte length prefix followed by the string bytes.
    pub fn put_string(&mut self, value: &str) -> Result<(), CodecError> {
        if let Some(err) = &self.error {
            return Err(err.clone());
        }
        if value.len() > MAX_SHORT_STRING_LEN {
            return Err(self.poison(CodecError::TooLong {
                length: value.len(),
            }));
        }
        self.put_u8(value.len() as u8)?;
        self.write_slice(value.as_bytes())
    }

    /// Writes raw bytes with no prefix.
    pub fn put_bytes(&mut self, bytes: &[u8]) -> Result<(), CodecError> {
        self.write_slice(bytes)
    }

    /// Completes the session and returns the number of bytes consumed.
    ///
    /// Stopping short of the buffer end is legal (trailing fields may be
    /// variable length) but is logged as a partial marshal.
    pub fn finish(self) -> Result<usize, CodecError> {
        if let Some(err) = self.error {
            return Err(err);
        }

        let len = self.storage.len();
        if self.cursor != len {
            warn!(
                mode = %self.storage.mode(),
                consumed = self.cursor,
                buffer_len = len,
                "Partial payload marshal"
            );
        }

        Ok(self.cursor)
    }
}
