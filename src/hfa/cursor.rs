//! Positioned, bounds-checked primitive reads over the HFA file.
//!
//! Every multi-byte read honours the configured [`Endianness`]. Reads past the
//! end of the source fail with [`HfaError::TruncatedFile`] and seeks outside it
//! with [`HfaError::InvalidOffset`], both carrying the offending offset.

use std::io::{Read, Seek, SeekFrom};

use byteorder::{BigEndian, LittleEndian, ReadBytesExt};
use encoding_rs::Encoding;
use log::trace;

use super::types::error::{HfaError, Result};
use super::types::models::Endianness;
use super::utils;

const CSTRING_CHUNK: usize = 256;

macro_rules! read_scalar {
    ($(#[$doc:meta])* $name:ident, $ty:ty, $width:expr, $method:ident) => {
        $(#[$doc])*
        pub fn $name(&mut self) -> Result<$ty> {
            self.ensure($width)?;
            let value = match self.endianness {
                Endianness::Big => self.inner.$method::<BigEndian>()?,
                Endianness::Little => self.inner.$method::<LittleEndian>()?,
            };
            self.pos += $width;
            Ok(value)
        }
    };
}

macro_rules! read_counted {
    ($name:ident, $single:ident, $ty:ty) => {
        pub fn $name(&mut self, count: usize) -> Result<Vec<$ty>> {
            (0..count).map(|_| self.$single()).collect()
        }
    };
}

/// Reader over a seekable byte source with a known length.
#[derive(Debug)]
pub struct ByteCursor<R> {
    inner: R,
    len: u64,
    pos: u64,
    endianness: Endianness,
}

impl<R: Read + Seek> ByteCursor<R> {
    /// Wraps `inner`, measuring its length and rewinding to the start.
    pub fn new(mut inner: R, endianness: Endianness) -> Result<Self> {
        let len = inner.seek(SeekFrom::End(0))?;
        inner.seek(SeekFrom::Start(0))?;
        Ok(Self {
            inner,
            len,
            pos: 0,
            endianness,
        })
    }

    pub fn len(&self) -> u64 {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn position(&self) -> u64 {
        self.pos
    }

    pub fn endianness(&self) -> Endianness {
        self.endianness
    }

    /// Moves to an absolute offset. Seeking to the very end is allowed.
    pub fn seek(&mut self, offset: u64) -> Result<()> {
        if offset > self.len {
            return Err(HfaError::InvalidOffset { offset });
        }
        self.inner.seek(SeekFrom::Start(offset))?;
        self.pos = offset;
        Ok(())
    }

    fn ensure(&self, wanted: u64) -> Result<()> {
        match self.pos.checked_add(wanted) {
            Some(end) if end <= self.len => Ok(()),
            _ => Err(HfaError::TruncatedFile {
                offset: self.pos,
                wanted,
            }),
        }
    }

    pub fn read_u8(&mut self) -> Result<u8> {
        self.ensure(1)?;
        let value = self.inner.read_u8()?;
        self.pos += 1;
        Ok(value)
    }

    read_scalar!(read_u16, u16, 2, read_u16);
    read_scalar!(read_i16, i16, 2, read_i16);
    read_scalar!(read_u32, u32, 4, read_u32);
    read_scalar!(read_i32, i32, 4, read_i32);
    read_scalar!(read_f32, f32, 4, read_f32);
    read_scalar!(read_f64, f64, 8, read_f64);

    read_counted!(read_u16s, read_u16, u16);
    read_counted!(read_u32s, read_u32, u32);
    read_counted!(read_i32s, read_i32, i32);
    read_counted!(read_f32s, read_f32, f32);
    read_counted!(read_f64s, read_f64, f64);

    /// Reads exactly `n` raw bytes.
    pub fn read_bytes(&mut self, n: usize) -> Result<Vec<u8>> {
        self.ensure(n as u64)?;
        let mut buf = vec![0u8; n];
        self.inner.read_exact(&mut buf)?;
        self.pos += n as u64;
        Ok(buf)
    }

    /// Reads a fixed-width text field, keeping only the part before the first NUL.
    pub fn read_fixed_string(&mut self, n: usize, encoding: &'static Encoding) -> Result<String> {
        let bytes = self.read_bytes(n)?;
        Ok(utils::decode_text(&bytes, encoding))
    }

    /// Reads a NUL-terminated string and leaves the cursor after the terminator.
    pub fn read_cstring(&mut self, encoding: &'static Encoding) -> Result<String> {
        let bytes = self.read_until_nul()?;
        Ok(utils::decode_text(&bytes, encoding))
    }

    /// Reads bytes up to (not including) the next NUL, consuming the NUL.
    ///
    /// Reads in chunks so large dictionaries do not cost one syscall per byte.
    pub fn read_until_nul(&mut self) -> Result<Vec<u8>> {
        let start = self.pos;
        let mut out = Vec::new();
        loop {
            let remaining = self.len - self.pos;
            if remaining == 0 {
                return Err(HfaError::TruncatedFile {
                    offset: start,
                    wanted: out.len() as u64 + 1,
                });
            }
            let chunk_len = remaining.min(CSTRING_CHUNK as u64) as usize;
            let mut chunk = vec![0u8; chunk_len];
            self.inner.read_exact(&mut chunk)?;
            if let Some(nul) = chunk.iter().position(|&b| b == 0) {
                out.extend_from_slice(&chunk[..nul]);
                self.seek(self.pos + nul as u64 + 1)?;
                trace!("Read {} byte string at {:#x}", out.len(), start);
                return Ok(out);
            }
            out.extend_from_slice(&chunk);
            self.pos += chunk_len as u64;
        }
    }
}
