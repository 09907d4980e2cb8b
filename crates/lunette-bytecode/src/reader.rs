//! Sequential cursor over a chunk image.
//!
//! Sizes and counts use the chunk format's own varuint: 7 bits per byte,
//! most significant group first, and the *last* byte carries the high bit.
//! This is the reverse of LEB128 and must not be "fixed".

use crate::error::UndumpError;

/// Fixed-width values that can be read little-endian from a byte slice.
pub trait FromLeBytes: Sized {
    const SIZE: usize;

    /// Decode from exactly `SIZE` bytes.
    fn from_le(bytes: &[u8]) -> Self;
}

macro_rules! impl_from_le {
    ($($t:ty),*) => {
        $(
            impl FromLeBytes for $t {
                const SIZE: usize = std::mem::size_of::<$t>();

                fn from_le(bytes: &[u8]) -> Self {
                    let mut buf = [0u8; std::mem::size_of::<$t>()];
                    buf.copy_from_slice(bytes);
                    <$t>::from_le_bytes(buf)
                }
            }
        )*
    };
}

impl_from_le!(u8, u16, u32, i32, u64, i64, f32, f64);

pub struct Reader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Reader { data, pos: 0 }
    }

    /// Current offset into the buffer.
    pub fn position(&self) -> usize {
        self.pos
    }

    pub fn remaining(&self) -> usize {
        self.data.len() - self.pos
    }

    fn truncated(&self, wanted: usize) -> UndumpError {
        UndumpError::Truncated {
            offset: self.pos,
            wanted,
            available: self.remaining(),
        }
    }

    pub fn read_byte(&mut self) -> Result<u8, UndumpError> {
        let b = *self.data.get(self.pos).ok_or_else(|| self.truncated(1))?;
        self.pos += 1;
        Ok(b)
    }

    /// Borrow the next `n` raw bytes.
    pub fn read_slice(&mut self, n: usize) -> Result<&'a [u8], UndumpError> {
        let end = self
            .pos
            .checked_add(n)
            .filter(|&end| end <= self.data.len())
            .ok_or_else(|| self.truncated(n))?;
        let slice = &self.data[self.pos..end];
        self.pos = end;
        Ok(slice)
    }

    pub fn read_fixed<T: FromLeBytes>(&mut self) -> Result<T, UndumpError> {
        self.read_slice(T::SIZE).map(T::from_le)
    }

    /// Read `count` consecutive fixed-width values.
    pub fn read_array<T: FromLeBytes>(&mut self, count: usize) -> Result<Vec<T>, UndumpError> {
        let total = count
            .checked_mul(T::SIZE)
            .ok_or_else(|| self.truncated(usize::MAX))?;
        let bytes = self.read_slice(total)?;
        Ok(bytes.chunks_exact(T::SIZE).map(T::from_le).collect())
    }

    pub fn read_varuint(&mut self) -> Result<u64, UndumpError> {
        let mut acc: u64 = 0;
        loop {
            let b = self.read_byte()?;
            acc = (acc << 7) | u64::from(b & 0x7f);
            if b & 0x80 != 0 {
                return Ok(acc);
            }
        }
    }

    /// Read an element count. Every element occupies at least one byte, so a
    /// count larger than what is left can only mean a truncated chunk.
    pub fn read_count(&mut self) -> Result<usize, UndumpError> {
        let n = self.read_varuint()?;
        match usize::try_from(n) {
            Ok(n) if n <= self.remaining() => Ok(n),
            _ => Err(self.truncated(usize::try_from(n).unwrap_or(usize::MAX))),
        }
    }

    /// Read a length-prefixed string. Prefixes 0 and 1 both mean "absent".
    pub fn read_string(&mut self) -> Result<Option<String>, UndumpError> {
        let size = self.read_varuint()?;
        if size <= 1 {
            return Ok(None);
        }
        let len = usize::try_from(size - 1).map_err(|_| self.truncated(usize::MAX))?;
        let offset = self.pos;
        let bytes = self.read_slice(len)?;
        let s = std::str::from_utf8(bytes).map_err(|_| UndumpError::InvalidUtf8 { offset })?;
        Ok(Some(s.to_owned()))
    }
}

/// Append `v` in the chunk varuint encoding.
pub fn write_varuint(out: &mut Vec<u8>, mut v: u64) {
    let mut buf = [0u8; 10];
    let mut i = 0;
    loop {
        buf[i] = (v & 0x7f) as u8;
        v >>= 7;
        i += 1;
        if v == 0 {
            break;
        }
    }
    for j in (1..i).rev() {
        out.push(buf[j]);
    }
    out.push(buf[0] | 0x80);
}

/// Append a length-prefixed string; `None` is written as prefix 0.
pub fn write_string(out: &mut Vec<u8>, s: Option<&str>) {
    match s {
        None => write_varuint(out, 0),
        Some(s) => {
            write_varuint(out, s.len() as u64 + 1);
            out.extend_from_slice(s.as_bytes());
        }
    }
}
