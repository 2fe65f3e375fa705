use crate::EncodeError;

#[derive(Debug)]
pub struct Writer<'a> {
    buf: &'a mut [u8],
    pos: usize,
}

impl<'a> Writer<'a> {
    pub fn new(buf: &'a mut [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    pub const fn position(&self) -> usize {
        self.pos
    }

    pub fn remaining(&self) -> usize {
        self.buf.len().saturating_sub(self.pos)
    }

    pub fn as_written(&self) -> &[u8] {
        &self.buf[..self.pos]
    }

    pub fn write_u8(&mut self, value: u8) -> Result<(), EncodeError> {
        if self.remaining() < 1 {
            return Err(EncodeError::BufferTooSmall);
        }
        self.buf[self.pos] = value;
        self.pos += 1;
        Ok(())
    }

    pub fn write_all(&mut self, data: &[u8]) -> Result<(), EncodeError> {
        if self.remaining() < data.len() {
            return Err(EncodeError::BufferTooSmall);
        }
        let end = self.pos + data.len();
        self.buf[self.pos..end].copy_from_slice(data);
        self.pos = end;
        Ok(())
    }

    pub fn write_le_u16(&mut self, value: u16) -> Result<(), EncodeError> {
        self.write_all(&value.to_le_bytes())
    }

    pub fn write_le_u32(&mut self, value: u32) -> Result<(), EncodeError> {
        self.write_all(&value.to_le_bytes())
    }

    pub fn write_le_u64(&mut self, value: u64) -> Result<(), EncodeError> {
        self.write_all(&value.to_le_bytes())
    }

    /// Overwrites a little-endian `u16` already emitted at `at`.
    ///
    /// Used for length prefixes that are only known once the body is written.
    pub fn patch_le_u16(&mut self, at: usize, value: u16) -> Result<(), EncodeError> {
        if at + 2 > self.pos {
            return Err(EncodeError::InvalidLength);
        }
        self.buf[at..at + 2].copy_from_slice(&value.to_le_bytes());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::Writer;
    use crate::EncodeError;

    #[test]
    fn writer_writes_values() {
        let mut buf = [0u8; 8];
        let mut w = Writer::new(&mut buf);
        w.write_u8(1).unwrap();
        w.write_all(&[2, 3]).unwrap();
        w.write_le_u16(0x0504).unwrap();
        assert_eq!(w.as_written(), &[1, 2, 3, 4, 5]);
    }

    #[test]
    fn writer_patches_length_prefix() {
        let mut buf = [0u8; 6];
        let mut w = Writer::new(&mut buf);
        w.write_le_u16(0).unwrap();
        w.write_all(&[9, 9, 9]).unwrap();
        w.patch_le_u16(0, 3).unwrap();
        assert_eq!(w.as_written(), &[3, 0, 9, 9, 9]);
        assert_eq!(w.patch_le_u16(4, 1).unwrap_err(), EncodeError::InvalidLength);
    }

    #[test]
    fn writer_bounds() {
        let mut buf = [0u8; 1];
        let mut w = Writer::new(&mut buf);
        w.write_u8(1).unwrap();
        assert_eq!(w.write_u8(2).unwrap_err(), EncodeError::BufferTooSmall);
    }
}
