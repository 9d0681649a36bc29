use crate::convert::{extract_bits, get_bit, min_bits, reverse_uint, set_bit};
use bitloom_base::{err, fail, ErrorKind, Result};
use memchr::memmem;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Whence {
    Set,
    Cur,
    End,
}

/// A mutable byte buffer addressed at the bit level. The cursor is a bit
/// position in `[0, 8 * len]`; bit `i` of the buffer is bit `7 - (i % 8)` of
/// byte `i / 8` (MSB-first). Every operation either moves the cursor to a
/// well-defined new position or leaves it alone.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct BitBuf {
    bytes: Vec<u8>,
    pos: u64,
}

impl BitBuf {
    pub fn new(bytes: Vec<u8>) -> Self {
        BitBuf { bytes, pos: 0 }
    }

    pub fn empty() -> Self {
        BitBuf::default()
    }

    pub fn bit_len(&self) -> u64 {
        self.bytes.len() as u64 * 8
    }

    pub fn tell(&self) -> u64 {
        self.pos
    }

    pub fn at_eof(&self) -> bool {
        self.pos >= self.bit_len()
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.bytes
    }

    /// Move the cursor. Negative offsets are fine; landing before bit zero is
    /// not. Seeking past the end is allowed (a later write zero-extends).
    pub fn seek(&mut self, off: i64, whence: Whence) -> Result<u64> {
        let base = match whence {
            Whence::Set => 0,
            Whence::Cur => self.pos as i64,
            Whence::End => self.bit_len() as i64,
        };
        let target = base + off;
        if target < 0 {
            return Err(err(format!("seek to bit {} before start of buffer", target)));
        }
        self.pos = target as u64;
        Ok(self.pos)
    }

    /// Read `n` bits at the cursor as a big-endian unsigned integer,
    /// advancing the cursor by `n`. Negative `n` reads backward and returns
    /// the bits reversed (as if read forward then bit-reversed); zero reads
    /// nothing. A read past the end returns a short count.
    pub fn read(&mut self, n: i64) -> Result<(u128, u64)> {
        if n == 0 {
            return Ok((0, 0));
        }
        if n > 0 {
            let avail = self.bit_len().saturating_sub(self.pos);
            let take = (n as u64).min(avail);
            if take > 128 {
                return Err(err(format!("read of {} bits exceeds the 128-bit value limit", take)));
            }
            let v = extract_bits(&self.bytes, self.pos, take);
            self.pos += take;
            Ok((v, take))
        } else {
            let take = n.unsigned_abs().min(self.pos);
            if take > 128 {
                return Err(err(format!("read of {} bits exceeds the 128-bit value limit", take)));
            }
            let start = self.pos - take;
            let v = extract_bits(&self.bytes, start, take);
            self.pos = start;
            Ok((reverse_uint(v, take)?, take))
        }
    }

    /// Same as [`BitBuf::read`] but the cursor stays put.
    pub fn peek(&mut self, n: i64) -> Result<(u128, u64)> {
        let pos = self.pos;
        let out = self.read(n);
        self.pos = pos;
        out
    }

    /// Write the low `n` bits of `v` at the cursor, advancing by `n`.
    /// Surrounding bits in the first and last touched bytes are preserved.
    /// Negative `n` writes bit-reversed backward; the buffer zero-extends as
    /// needed.
    pub fn write(&mut self, v: u128, n: i64) -> Result<()> {
        if n == 0 {
            return Ok(());
        }
        let (start, width) = if n > 0 {
            (self.pos, n as u64)
        } else {
            let width = n.unsigned_abs();
            if self.pos < width {
                return Err(err("backward write runs past the start of the buffer"));
            }
            (self.pos - width, width)
        };
        if width > 128 {
            return Err(err(format!("write of {} bits exceeds the 128-bit value limit", width)));
        }
        if min_bits(v) > width {
            return Err(err(format!(
                "value needs {} bits but the write is {} bits wide",
                min_bits(v),
                width
            )));
        }
        let w = if n > 0 { v } else { reverse_uint(v, width)? };
        let end = start + width;
        let need = end.div_ceil(8) as usize;
        if self.bytes.len() < need {
            self.bytes.resize(need, 0);
        }
        for i in 0..width {
            let bit = ((w >> (width - 1 - i)) & 1) as u8;
            set_bit(&mut self.bytes, start + i, bit);
        }
        self.pos = if n > 0 { end } else { start };
        Ok(())
    }

    fn span(&self, n: Option<u64>) -> Result<(u64, u64)> {
        let len = self.bit_len();
        if self.pos > len {
            return Err(err("cursor is past the end of the buffer"));
        }
        let n = n.unwrap_or(len - self.pos);
        if self.pos + n > len {
            return Err(err(format!(
                "range of {} bits at {} runs past the {}-bit buffer",
                n, self.pos, len
            )));
        }
        Ok((self.pos, n))
    }

    /// Reverse the next `n` bits in place; `None` means to the end. The
    /// cursor does not move.
    pub fn reverse(&mut self, n: Option<u64>) -> Result<()> {
        let (start, n) = self.span(n)?;
        if start % 8 == 0 && n % 8 == 0 {
            let lo = (start / 8) as usize;
            let hi = lo + (n / 8) as usize;
            self.bytes[lo..hi].reverse();
            for b in &mut self.bytes[lo..hi] {
                *b = b.reverse_bits();
            }
            return Ok(());
        }
        let mut i = 0;
        while i < n / 2 {
            let a = get_bit(&self.bytes, start + i);
            let b = get_bit(&self.bytes, start + n - 1 - i);
            set_bit(&mut self.bytes, start + i, b);
            set_bit(&mut self.bytes, start + n - 1 - i, a);
            i += 1;
        }
        Ok(())
    }

    /// Invert the next `n` bits in place; `None` means to the end. The
    /// cursor does not move.
    pub fn invert(&mut self, n: Option<u64>) -> Result<()> {
        let (start, n) = self.span(n)?;
        if start % 8 == 0 && n % 8 == 0 {
            let lo = (start / 8) as usize;
            let hi = lo + (n / 8) as usize;
            for b in &mut self.bytes[lo..hi] {
                *b = !*b;
            }
            return Ok(());
        }
        for i in 0..n {
            let bit = get_bit(&self.bytes, start + i);
            set_bit(&mut self.bytes, start + i, 1 - bit);
        }
        Ok(())
    }

    /// Search forward from the cursor for a literal byte substring. The
    /// cursor must sit on a byte boundary; the returned offset is in bits
    /// from the cursor to the start of the match.
    pub fn find(&self, needle: &[u8]) -> Result<Option<u64>> {
        if self.pos % 8 != 0 {
            return Err(fail(
                ErrorKind::Alignment,
                "find requires the cursor to sit on a byte boundary",
            ));
        }
        let from = (self.pos / 8) as usize;
        if from > self.bytes.len() {
            return Ok(None);
        }
        Ok(memmem::find(&self.bytes[from..], needle).map(|off| off as u64 * 8))
    }

    /// Read whole bytes from the cursor to the end. When the cursor sits
    /// mid-byte the leading partial byte comes back as a
    /// `(tail_value, tail_width)` pair ahead of the remaining bytes, so the
    /// partial byte is addressable as data; aligned reads return `(0, 0)`.
    pub fn read_bytes(&mut self) -> Result<(u8, u8, Vec<u8>)> {
        let len = self.bit_len();
        if self.pos > len {
            return Err(err("cursor is past the end of the buffer"));
        }
        let tail_width = ((8 - self.pos % 8) % 8) as u8;
        let (v, got) = self.read(tail_width as i64)?;
        if got != tail_width as u64 {
            return Err(err("buffer ended inside its final byte"));
        }
        let rest = self.bytes[(self.pos / 8) as usize..].to_vec();
        self.pos = len;
        Ok((v as u8, tail_width, rest))
    }

    /// Inverse of [`BitBuf::read_bytes`]: write a leading partial byte (its
    /// width must match the cursor's distance to the next byte boundary),
    /// then the byte data.
    pub fn write_bytes(&mut self, tail_value: u8, tail_width: u8, data: &[u8]) -> Result<()> {
        let expect = ((8 - self.pos % 8) % 8) as u8;
        if tail_width != expect {
            return Err(fail(
                ErrorKind::Alignment,
                format!(
                    "partial byte of {} bits does not finish the current byte ({} bits left)",
                    tail_width, expect
                ),
            ));
        }
        self.write(tail_value as u128, tail_width as i64)?;
        self.write_span(data)
    }

    /// Bulk read of `n` bits (a multiple of 8) into a byte vector. Works at
    /// any cursor position.
    pub fn read_span(&mut self, n: u64) -> Result<Vec<u8>> {
        if n % 8 != 0 {
            return Err(err("span reads must be a whole number of bytes"));
        }
        let mut out = Vec::with_capacity((n / 8) as usize);
        for _ in 0..n / 8 {
            let (v, got) = self.read(8)?;
            if got != 8 {
                return Err(fail(ErrorKind::IncompleteData, "span read ran past the end"));
            }
            out.push(v as u8);
        }
        Ok(out)
    }

    /// Bulk write of whole bytes at the cursor (any bit position).
    pub fn write_span(&mut self, data: &[u8]) -> Result<()> {
        for b in data {
            self.write(*b as u128, 8)?;
        }
        Ok(())
    }

    /// Shrink to `bits`, rounded up to a whole byte; slack bits in the final
    /// byte are zeroed. The cursor does not move.
    pub fn truncate(&mut self, bits: u64) -> Result<()> {
        let keep_bytes = bits.div_ceil(8) as usize;
        if keep_bytes > self.bytes.len() {
            return Err(err("truncate beyond the end of the buffer"));
        }
        self.bytes.truncate(keep_bytes);
        let rem = bits % 8;
        if rem > 0 {
            let last = self.bytes.len() - 1;
            self.bytes[last] &= !(0xffu8 >> rem);
        }
        Ok(())
    }
}
