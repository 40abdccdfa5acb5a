//! Bounded big-endian reader over a byte slice.
//!
//! Every read checks the remaining length first and fails with
//! [`Truncated`] instead of reading past the end; the position only advances
//! on success.

/// A read ran past the end of the buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[error("need {needed} bytes at offset {offset}, {available} left")]
pub struct Truncated {
    /// Position of the failed read.
    pub offset: usize,
    /// Bytes the read wanted.
    pub needed: usize,
    /// Bytes that were left.
    pub available: usize,
}

/// Forward-only reader.
#[derive(Debug, Clone)]
pub struct Cursor<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> Cursor<'a> {
    /// Start reading at the first byte of `data`.
    pub fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    /// Bytes consumed so far.
    pub fn position(&self) -> usize {
        self.pos
    }

    /// Bytes left.
    pub fn remaining(&self) -> usize {
        self.data.len().saturating_sub(self.pos)
    }

    /// True once every byte was consumed.
    pub fn is_empty(&self) -> bool {
        self.remaining() == 0
    }

    /// Borrow the next `n` bytes and advance past them.
    pub fn take(&mut self, n: usize) -> Result<&'a [u8], Truncated> {
        let bytes = self
            .pos
            .checked_add(n)
            .and_then(|end| self.data.get(self.pos..end))
            .ok_or(Truncated {
                offset: self.pos,
                needed: n,
                available: self.remaining(),
            })?;
        self.pos = self.pos.saturating_add(n);
        Ok(bytes)
    }

    /// Copy the next `N` bytes into an array.
    pub fn read_array<const N: usize>(&mut self) -> Result<[u8; N], Truncated> {
        let mut out = [0u8; N];
        out.copy_from_slice(self.take(N)?);
        Ok(out)
    }

    /// Skip `n` bytes.
    pub fn skip(&mut self, n: usize) -> Result<(), Truncated> {
        self.take(n).map(|_| ())
    }

    /// One byte.
    pub fn read_u8(&mut self) -> Result<u8, Truncated> {
        let [b] = self.read_array::<1>()?;
        Ok(b)
    }

    /// Big-endian u16.
    pub fn read_be16(&mut self) -> Result<u16, Truncated> {
        self.read_array::<2>().map(u16::from_be_bytes)
    }

    /// Big-endian u32.
    pub fn read_be32(&mut self) -> Result<u32, Truncated> {
        self.read_array::<4>().map(u32::from_be_bytes)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn reads_big_endian_fields_in_order() {
        let mut cur = Cursor::new(&[0x01, 0x02, 0x03, 0x04, 0x05, 0x06, 0x07]);
        assert_eq!(cur.read_u8().unwrap(), 0x01);
        assert_eq!(cur.read_be16().unwrap(), 0x0203);
        assert_eq!(cur.read_be32().unwrap(), 0x0405_0607);
        assert!(cur.is_empty());
    }

    #[test]
    fn short_read_reports_and_does_not_advance() {
        let mut cur = Cursor::new(&[0xAA, 0xBB, 0xCC]);
        cur.skip(1).unwrap();
        let err = cur.read_be32().unwrap_err();
        assert_eq!(
            err,
            Truncated {
                offset: 1,
                needed: 4,
                available: 2
            }
        );
        assert_eq!(cur.position(), 1);
        assert_eq!(cur.read_be16().unwrap(), 0xBBCC);
    }

    #[test]
    fn take_with_overflowing_length_fails() {
        let mut cur = Cursor::new(&[0u8; 4]);
        cur.skip(2).unwrap();
        assert!(cur.take(usize::MAX).is_err());
        assert_eq!(cur.remaining(), 2);
    }
}
