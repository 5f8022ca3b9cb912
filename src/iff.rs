//! Length-prefixed chunk records, as used by the 3DS and LWO families.
//!
//! A chunk is a tag (two or four bytes) and a length, followed by `length`
//! payload bytes which may themselves contain sub-chunks. All cursor
//! bookkeeping lives here: handlers receive a reader bounded to the payload
//! and cannot corrupt the alignment of sibling chunks.

use crate::{ByteReader, Error};

/// Big-endian packing of a four character code, the form LWO tags take.
pub const fn fourcc(tag: &[u8; 4]) -> u32 {
    (tag[0] as u32) << 24 | (tag[1] as u32) << 16 | (tag[2] as u32) << 8 | tag[3] as u32
}

/// How a format lays out its chunk headers.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum ChunkLayout {
    /// `{tag: u16 LE, size: u32 LE}` where `size` covers header and payload
    /// (3DS).
    TagU16SizeTotal,
    /// `{tag: u32 BE, length: u32 BE}` where `length` covers the payload only
    /// (IFF top-level chunks).
    TagU32LenU32,
    /// `{tag: u32 BE, length: u16 BE}` payload-only (IFF surface sub-chunks).
    TagU32LenU16,
}

impl ChunkLayout {
    pub fn header_len(self) -> usize {
        match self {
            Self::TagU16SizeTotal => 6,
            Self::TagU32LenU32 => 8,
            Self::TagU32LenU16 => 6,
        }
    }

    /// Reads one chunk header, returning the tag and the payload length.
    pub fn read_header(self, reader: &mut ByteReader<'_>) -> Result<(u32, usize), Error> {
        Ok(match self {
            Self::TagU16SizeTotal => {
                let tag = reader.read_u16()? as u32;
                let size = reader.read_u32()? as usize;

                // the declared size covers the header itself
                (tag, size.saturating_sub(self.header_len()))
            }
            Self::TagU32LenU32 => {
                let tag = reader.read_u32_be()?;
                let len = reader.read_u32_be()? as usize;

                (tag, len)
            }
            Self::TagU32LenU16 => {
                let tag = reader.read_u32_be()?;
                let len = reader.read_u16_be()? as usize;

                (tag, len)
            }
        })
    }
}

/// Walks every chunk within the next `container_len` bytes of `reader`,
/// handing each `(tag, payload)` to `handler`.
///
/// A sub-chunk whose declared length reaches past the container is clamped to
/// the available bytes after a warning; decoding then continues with the next
/// sibling, so one bad length cannot cascade. Unknown tags are skipped by
/// handlers simply not reading from the payload. When the container is
/// exhausted the parent cursor sits exactly on its end boundary.
pub fn for_each_chunk_within(
    reader: &mut ByteReader<'_>,
    container_len: usize,
    layout: ChunkLayout,
    mut handler: impl FnMut(u32, &mut ByteReader<'_>) -> Result<(), Error>,
) -> Result<(), Error> {
    reader.with_limit(container_len, |container| {
        while container.remaining() >= layout.header_len() {
            let (tag, mut len) = layout.read_header(container)?;
            if len > container.remaining() {
                warn!(
                    "chunk 0x{:x} declares {} payload bytes but only {} remain; clamping",
                    tag,
                    len,
                    container.remaining()
                );
                len = container.remaining();
            }

            container.with_limit(len, |payload| handler(tag, payload))?;
        }

        Ok(())
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tds_chunk(tag: u16, payload: &[u8]) -> Vec<u8> {
        let mut res = tag.to_le_bytes().to_vec();
        res.extend_from_slice(&(payload.len() as u32 + 6).to_le_bytes());
        res.extend_from_slice(payload);
        res
    }

    #[test]
    pub fn walks_sibling_chunks() {
        let mut buf = tds_chunk(0x0100, &[1, 2, 3, 4]);
        buf.extend(tds_chunk(0x0200, &[9]));

        let mut reader = ByteReader::new(&buf);
        let mut seen = vec![];
        for_each_chunk_within(
            &mut reader,
            buf.len(),
            ChunkLayout::TagU16SizeTotal,
            |tag, payload| {
                seen.push((tag, payload.remaining()));
                Ok(())
            },
        )
        .unwrap();

        assert_eq!(seen, vec![(0x0100, 4), (0x0200, 1)]);
        assert_eq!(reader.remaining(), 0);
    }

    #[test]
    pub fn clamps_overflowing_chunk() {
        // declares 100 payload bytes, provides 2
        let mut buf = 0x4100u16.to_le_bytes().to_vec();
        buf.extend_from_slice(&106u32.to_le_bytes());
        buf.extend_from_slice(&[7, 7]);

        let mut reader = ByteReader::new(&buf);
        let mut lens = vec![];
        for_each_chunk_within(
            &mut reader,
            buf.len(),
            ChunkLayout::TagU16SizeTotal,
            |_, payload| {
                lens.push(payload.remaining());
                Ok(())
            },
        )
        .unwrap();

        assert_eq!(lens, vec![2]);
    }

    #[test]
    pub fn iff_layout_is_big_endian() {
        let mut buf = fourcc(b"PNTS").to_be_bytes().to_vec();
        buf.extend_from_slice(&4u32.to_be_bytes());
        buf.extend_from_slice(&1.0f32.to_be_bytes());

        let mut reader = ByteReader::new(&buf);
        for_each_chunk_within(
            &mut reader,
            buf.len(),
            ChunkLayout::TagU32LenU32,
            |tag, payload| {
                assert_eq!(tag, fourcc(b"PNTS"));
                assert_eq!(payload.read_f32_be().unwrap(), 1.0);
                Ok(())
            },
        )
        .unwrap();
    }

    #[test]
    pub fn handler_underrun_does_not_misalign_siblings() {
        let mut buf = tds_chunk(0x0001, &[0xAA; 8]);
        buf.extend(tds_chunk(0x0002, &[0xBB]));

        let mut reader = ByteReader::new(&buf);
        let mut tags = vec![];
        for_each_chunk_within(
            &mut reader,
            buf.len(),
            ChunkLayout::TagU16SizeTotal,
            |tag, _| {
                // never touches the payload
                tags.push(tag);
                Ok(())
            },
        )
        .unwrap();

        assert_eq!(tags, vec![1, 2]);
    }
}
