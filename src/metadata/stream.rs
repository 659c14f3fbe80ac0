//! Seekable byte input with mark/reset, shared by the container readers.
//!
//! Fixed-width reads fail with `UnexpectedEof` when the stream runs out in
//! the middle of a field. Skips are seeks: skipping past the end succeeds and
//! the next read fails.

use std::io::{self, Read, Seek, SeekFrom};

#[derive(Debug)]
pub struct ByteStream<R> {
    inner: R,
    marks: Vec<u64>,
}

impl<R: Read + Seek> ByteStream<R> {
    pub fn new(inner: R) -> Self {
        Self {
            inner,
            marks: Vec::new(),
        }
    }

    pub fn into_inner(self) -> R {
        self.inner
    }

    pub fn position(&mut self) -> io::Result<u64> {
        self.inner.stream_position()
    }

    /// Total stream length. The read position is preserved.
    pub fn length(&mut self) -> io::Result<u64> {
        let here = self.inner.stream_position()?;
        let end = self.inner.seek(SeekFrom::End(0))?;
        if here != end {
            self.inner.seek(SeekFrom::Start(here))?;
        }
        Ok(end)
    }

    /// Remember the current position. Marks nest.
    pub fn mark(&mut self) -> io::Result<()> {
        let pos = self.inner.stream_position()?;
        self.marks.push(pos);
        Ok(())
    }

    /// Return to the most recent mark and forget it.
    pub fn reset(&mut self) -> io::Result<()> {
        let pos = self
            .marks
            .pop()
            .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidInput, "reset without mark"))?;
        self.inner.seek(SeekFrom::Start(pos))?;
        Ok(())
    }

    pub fn skip(&mut self, n: u64) -> io::Result<()> {
        let n = i64::try_from(n)
            .map_err(|_| io::Error::new(io::ErrorKind::InvalidInput, "skip length overflows"))?;
        self.inner.seek(SeekFrom::Current(n))?;
        Ok(())
    }

    pub fn read_u8(&mut self) -> io::Result<u8> {
        Ok(self.read_array::<1>()?[0])
    }

    pub fn read_array<const N: usize>(&mut self) -> io::Result<[u8; N]> {
        let mut buf = [0u8; N];
        self.inner.read_exact(&mut buf)?;
        Ok(buf)
    }

    pub fn read_vec(&mut self, len: usize) -> io::Result<Vec<u8>> {
        // Grow as data arrives rather than trusting a declared length.
        let mut buf = Vec::new();
        let read = (&mut self.inner).take(len as u64).read_to_end(&mut buf)?;
        if read < len {
            return Err(io::ErrorKind::UnexpectedEof.into());
        }
        Ok(buf)
    }

    pub fn read_u16_le(&mut self) -> io::Result<u16> {
        Ok(u16::from_le_bytes(self.read_array()?))
    }

    pub fn read_u16_be(&mut self) -> io::Result<u16> {
        Ok(u16::from_be_bytes(self.read_array()?))
    }

    pub fn read_u32_be(&mut self) -> io::Result<u32> {
        Ok(u32::from_be_bytes(self.read_array()?))
    }

    pub fn read_u64_be(&mut self) -> io::Result<u64> {
        Ok(u64::from_be_bytes(self.read_array()?))
    }
}
