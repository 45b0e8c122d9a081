use crate::error::Result;
use bytes::{Buf, Bytes, BytesMut};
use std::io::SeekFrom;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncSeek, AsyncSeekExt};

const READ_CHUNK: usize = 64 * 1024;

/// Anything the demuxer can read from: files, cursors, pipes with seek.
pub trait Source: AsyncRead + AsyncSeek + Unpin + Send {}

impl<T: AsyncRead + AsyncSeek + Unpin + Send> Source for T {}

/// Buffered reader over a [`Source`] that tracks the absolute file offset
/// of the next unconsumed byte.
#[derive(Debug)]
pub struct SourceReader<R> {
    inner: R,
    buf: BytesMut,
    pos: u64,
    size: u64,
    eof: bool,
}

impl<R: Source> SourceReader<R> {
    pub async fn new(mut inner: R) -> Result<Self> {
        let size = inner.seek(SeekFrom::End(0)).await?;
        inner.seek(SeekFrom::Start(0)).await?;
        Ok(Self {
            inner,
            buf: BytesMut::with_capacity(READ_CHUNK),
            pos: 0,
            size,
            eof: false,
        })
    }

    /// Absolute offset of the first byte returned by [`peek`](Self::peek).
    pub fn position(&self) -> u64 {
        self.pos
    }

    pub fn size(&self) -> u64 {
        self.size
    }

    /// Reads until at least `n` bytes are buffered or the source ends.
    /// Returns the number of buffered bytes.
    pub async fn fill(&mut self, n: usize) -> Result<usize> {
        while self.buf.len() < n && !self.eof {
            self.buf.reserve(READ_CHUNK.max(n - self.buf.len()));
            if self.inner.read_buf(&mut self.buf).await? == 0 {
                self.eof = true;
            }
        }
        Ok(self.buf.len())
    }

    pub fn peek(&self) -> &[u8] {
        &self.buf
    }

    pub fn consume(&mut self, n: usize) {
        let n = n.min(self.buf.len());
        self.buf.advance(n);
        self.pos += n as u64;
    }

    /// Takes exactly `n` bytes, or `None` once fewer remain.
    pub async fn read_exact_or_eof(&mut self, n: usize) -> Result<Option<Bytes>> {
        if self.fill(n).await? < n {
            return Ok(None);
        }
        self.pos += n as u64;
        Ok(Some(self.buf.split_to(n).freeze()))
    }

    pub async fn seek(&mut self, offset: u64) -> Result<()> {
        let offset = offset.min(self.size);
        self.inner.seek(SeekFrom::Start(offset)).await?;
        self.buf.clear();
        self.pos = offset;
        self.eof = false;
        Ok(())
    }

    /// Seeks to `offset` and buffers up to `n` bytes from there.
    pub async fn window(&mut self, offset: u64, n: usize) -> Result<&[u8]> {
        self.seek(offset).await?;
        let len = self.fill(n).await?.min(n);
        Ok(&self.buf[..len])
    }

    /// Hands the source back, rewound to the start.
    pub async fn into_inner(mut self) -> Result<R> {
        self.inner.seek(SeekFrom::Start(0)).await?;
        Ok(self.inner)
    }

    /// Source exhausted and nothing left buffered.
    pub fn is_exhausted(&self) -> bool {
        self.eof && self.buf.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::io::Cursor;

    #[tokio::test]
    async fn test_reads_and_tracks_position() {
        let data: Vec<u8> = (0..=255u8).collect();
        let mut reader = SourceReader::new(Cursor::new(data)).await.unwrap();
        assert_eq!(reader.size(), 256);

        let head = reader.read_exact_or_eof(16).await.unwrap().unwrap();
        assert_eq!(head[15], 15);
        assert_eq!(reader.position(), 16);

        reader.fill(4).await.unwrap();
        assert_eq!(reader.peek()[0], 16);
        reader.consume(4);
        assert_eq!(reader.position(), 20);

        reader.seek(250).await.unwrap();
        assert!(reader.read_exact_or_eof(16).await.unwrap().is_none());
        assert_eq!(reader.peek().len(), 6);
        reader.consume(6);
        assert!(reader.is_exhausted());

        let window = reader.window(100, 8).await.unwrap();
        assert_eq!(window, &[100, 101, 102, 103, 104, 105, 106, 107]);
        assert_eq!(reader.position(), 100);
    }
}
