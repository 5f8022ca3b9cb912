use {
    crate::{Error, ErrorKind},
    byteorder::{ByteOrder, BE, LE},
    std::str::from_utf8,
};

/// A bounds-checked cursor over a fully loaded file buffer.
///
/// Every read fails with `UnexpectedEof` when fewer bytes remain than
/// requested; no read ever touches memory beyond the buffer. Primitive reads
/// are little-endian unless the `_be` variant is used.
pub struct ByteReader<'a> {
    buf: &'a [u8],
    end: usize,
    pos: usize,
}

impl<'a> ByteReader<'a> {
    pub fn new(buf: &'a [u8]) -> Self {
        Self {
            buf,
            end: buf.len(),
            pos: 0,
        }
    }

    fn eof(&self, wanted: usize) -> Error {
        Error::new(
            ErrorKind::UnexpectedEof,
            format!("read of {} bytes exceeds the buffer", wanted),
        )
        .with_offset(self.pos)
    }

    /// Current cursor position, relative to the start of the whole buffer.
    pub fn tell(&self) -> usize {
        self.pos
    }

    pub fn remaining(&self) -> usize {
        self.end - self.pos
    }

    /// Moves the cursor to an absolute position within the readable range.
    pub fn seek(&mut self, pos: usize) -> Result<(), Error> {
        if pos > self.end {
            return Err(self.eof(pos - self.pos));
        }

        self.pos = pos;

        Ok(())
    }

    pub fn skip(&mut self, len: usize) -> Result<(), Error> {
        if len > self.remaining() {
            return Err(self.eof(len));
        }

        self.pos += len;

        Ok(())
    }

    /// Reads the byte at `offset` bytes past the cursor without advancing.
    pub fn peek(&self, offset: usize) -> Option<u8> {
        if offset < self.remaining() {
            Some(self.buf[self.pos + offset])
        } else {
            None
        }
    }

    pub fn read_bytes(&mut self, len: usize) -> Result<&'a [u8], Error> {
        if len > self.remaining() {
            return Err(self.eof(len));
        }

        let res = &self.buf[self.pos..self.pos + len];
        self.pos += len;

        Ok(res)
    }

    pub fn read_u8(&mut self) -> Result<u8, Error> {
        Ok(self.read_bytes(1)?[0])
    }

    pub fn read_u16(&mut self) -> Result<u16, Error> {
        Ok(LE::read_u16(self.read_bytes(2)?))
    }

    pub fn read_u16_be(&mut self) -> Result<u16, Error> {
        Ok(BE::read_u16(self.read_bytes(2)?))
    }

    pub fn read_i16(&mut self) -> Result<i16, Error> {
        Ok(LE::read_i16(self.read_bytes(2)?))
    }

    pub fn read_i16_be(&mut self) -> Result<i16, Error> {
        Ok(BE::read_i16(self.read_bytes(2)?))
    }

    pub fn read_u32(&mut self) -> Result<u32, Error> {
        Ok(LE::read_u32(self.read_bytes(4)?))
    }

    pub fn read_u32_be(&mut self) -> Result<u32, Error> {
        Ok(BE::read_u32(self.read_bytes(4)?))
    }

    pub fn read_i32(&mut self) -> Result<i32, Error> {
        Ok(LE::read_i32(self.read_bytes(4)?))
    }

    pub fn read_f32(&mut self) -> Result<f32, Error> {
        Ok(LE::read_f32(self.read_bytes(4)?))
    }

    pub fn read_f32_be(&mut self) -> Result<f32, Error> {
        Ok(BE::read_f32(self.read_bytes(4)?))
    }

    pub fn read_f64(&mut self) -> Result<f64, Error> {
        Ok(LE::read_f64(self.read_bytes(8)?))
    }

    /// Reads a string until a NUL byte or until `limit` bytes have been
    /// consumed, whichever comes first.
    ///
    /// The NUL byte itself is consumed when present. The flag in the result
    /// reports whether one was found; callers decide whether a truncated
    /// string is an error. Invalid UTF-8 is replaced lossily.
    pub fn read_cstr_bounded(&mut self, limit: usize) -> Result<(String, bool), Error> {
        let limit = limit.min(self.remaining());
        let mut len = 0;
        let mut found_nul = false;
        while len < limit {
            if self.buf[self.pos + len] == 0 {
                found_nul = true;
                break;
            }

            len += 1;
        }

        let bytes = self.read_bytes(len)?;
        let res = from_utf8(bytes)
            .map(|s| s.to_owned())
            .unwrap_or_else(|_| String::from_utf8_lossy(bytes).into_owned());
        if found_nul {
            self.pos += 1;
        }

        Ok((res, found_nul))
    }

    /// Runs `f` against a sub-reader bounded to the next `len` bytes.
    ///
    /// When the scope exits the parent cursor sits exactly `len` bytes past
    /// where it was, on success and on error alike. An inner scope that
    /// overran or underran its budget therefore cannot disturb the alignment
    /// of whatever follows it. A `len` reaching past the readable range is
    /// clamped.
    pub fn with_limit<T>(
        &mut self,
        len: usize,
        f: impl FnOnce(&mut ByteReader<'_>) -> Result<T, Error>,
    ) -> Result<T, Error> {
        let len = len.min(self.remaining());
        let mut inner = ByteReader {
            buf: self.buf,
            end: self.pos + len,
            pos: self.pos,
        };
        let res = f(&mut inner);
        self.pos += len;

        res
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    pub fn primitive_reads() {
        let buf = [0x01u8, 0x02, 0x03, 0x04, 0x00, 0x00, 0x80, 0x3f];
        let mut reader = ByteReader::new(&buf);

        assert_eq!(reader.read_u16().unwrap(), 0x0201);
        assert_eq!(reader.read_u16_be().unwrap(), 0x0304);
        assert_eq!(reader.read_f32().unwrap(), 1.0);
        assert_eq!(reader.remaining(), 0);
        assert!(reader.read_u8().is_err());
    }

    #[test]
    pub fn reads_never_pass_the_end() {
        let buf = [0u8; 3];
        let mut reader = ByteReader::new(&buf);

        assert!(reader.read_u32().is_err());

        // a failed read must not move the cursor
        assert_eq!(reader.tell(), 0);
        assert_eq!(reader.read_u16().unwrap(), 0);
    }

    #[test]
    pub fn cstr_bounded() {
        let buf = b"Cube\0tail";
        let mut reader = ByteReader::new(buf);

        let (s, found) = reader.read_cstr_bounded(64).unwrap();
        assert_eq!(s, "Cube");
        assert!(found);
        assert_eq!(reader.tell(), 5);

        let (s, found) = reader.read_cstr_bounded(2).unwrap();
        assert_eq!(s, "ta");
        assert!(!found);
    }

    #[test]
    pub fn limit_scope_realigns_parent() {
        let buf = [1u8, 2, 3, 4, 5, 6];
        let mut reader = ByteReader::new(&buf);

        // inner scope reads less than its budget
        reader
            .with_limit(4, |inner| {
                assert_eq!(inner.read_u8().unwrap(), 1);
                assert_eq!(inner.remaining(), 3);
                Ok(())
            })
            .unwrap();
        assert_eq!(reader.tell(), 4);

        // inner scope overruns and errors; parent still lands on the boundary
        let res: Result<(), Error> = reader.with_limit(1, |inner| {
            inner.read_u32()?;
            Ok(())
        });
        assert!(res.is_err());
        assert_eq!(reader.tell(), 5);
        assert_eq!(reader.read_u8().unwrap(), 6);
    }

    #[test]
    pub fn limit_scope_clamps_to_buffer() {
        let buf = [1u8, 2];
        let mut reader = ByteReader::new(&buf);

        reader
            .with_limit(100, |inner| {
                assert_eq!(inner.remaining(), 2);
                Ok(())
            })
            .unwrap();
        assert_eq!(reader.remaining(), 0);
    }
}
