//! Bulk data streaming for `COPY`.
//!
//! [`CopyIn`] pulls chunks lazily from any iterator and hands them to the
//! driver, holding at most one chunk at a time. [`CopyOut`] drains `COPY TO`
//! data into a closure or writer.

use std::io;

use crate::error::Result;

/// Source of bulk-load data, pulled by the driver.
pub trait CopySource {
    /// Next piece of data of any length; `None` at end of stream.
    fn read(&mut self) -> Result<Option<&[u8]>>;

    /// Copy at most `buf.len()` bytes into `buf`; `0` at end of stream.
    fn read_into(&mut self, buf: &mut [u8]) -> Result<usize>;
}

/// Drain for `COPY TO` data.
pub trait CopySink {
    fn write(&mut self, data: &[u8]) -> Result<()>;
}

/// Adapts an iterator of byte chunks into a [`CopySource`].
pub struct CopyIn<I: Iterator> {
    chunks: I,
    pending: Option<I::Item>,
    offset: usize,
}

impl<I> CopyIn<I>
where
    I: Iterator,
    I::Item: AsRef<[u8]>,
{
    pub fn new<T>(chunks: T) -> Self
    where
        T: IntoIterator<IntoIter = I>,
    {
        Self {
            chunks: chunks.into_iter(),
            pending: None,
            offset: 0,
        }
    }

    /// Make sure a chunk with unread bytes is pending. Returns false at end of stream.
    fn fill(&mut self) -> bool {
        loop {
            if let Some(chunk) = &self.pending
                && self.offset < chunk.as_ref().len()
            {
                return true;
            }
            match self.chunks.next() {
                Some(chunk) => {
                    self.pending = Some(chunk);
                    self.offset = 0;
                }
                None => {
                    self.pending = None;
                    return false;
                }
            }
        }
    }
}

impl<I> CopySource for CopyIn<I>
where
    I: Iterator,
    I::Item: AsRef<[u8]>,
{
    fn read(&mut self) -> Result<Option<&[u8]>> {
        if !self.fill() {
            return Ok(None);
        }
        let offset = self.offset;
        let Some(chunk) = &self.pending else {
            return Ok(None);
        };
        let data = &chunk.as_ref()[offset..];
        self.offset += data.len();
        Ok(Some(data))
    }

    fn read_into(&mut self, buf: &mut [u8]) -> Result<usize> {
        if buf.is_empty() || !self.fill() {
            return Ok(0);
        }
        let Some(chunk) = &self.pending else {
            return Ok(0);
        };
        let rest = &chunk.as_ref()[self.offset..];
        let n = rest.len().min(buf.len());
        buf[..n].copy_from_slice(&rest[..n]);
        self.offset += n;
        Ok(n)
    }
}

impl<I> io::Read for CopyIn<I>
where
    I: Iterator,
    I::Item: AsRef<[u8]>,
{
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.read_into(buf).map_err(io::Error::other)
    }
}

/// Adapts a closure into a [`CopySink`].
pub struct CopyOut<F> {
    write: F,
}

impl<F> CopyOut<F>
where
    F: FnMut(&[u8]) -> Result<()>,
{
    pub fn new(write: F) -> Self {
        Self { write }
    }
}

impl<F> CopySink for CopyOut<F>
where
    F: FnMut(&[u8]) -> Result<()>,
{
    fn write(&mut self, data: &[u8]) -> Result<()> {
        (self.write)(data)
    }
}

impl CopyOut<()> {
    /// Sink that writes everything into `writer`.
    pub fn writer<W: io::Write>(writer: W) -> WriterSink<W> {
        WriterSink(writer)
    }
}

/// [`CopySink`] over an [`io::Write`].
pub struct WriterSink<W>(W);

impl<W: io::Write> WriterSink<W> {
    pub fn into_inner(self) -> W {
        self.0
    }
}

impl<W: io::Write> CopySink for WriterSink<W> {
    fn write(&mut self, data: &[u8]) -> Result<()> {
        self.0.write_all(data)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_read_skips_empty_chunks() {
        let mut src = CopyIn::new(vec!["1\tApple\n", "", "2\tBanana\n"]);
        assert_eq!(src.read().unwrap(), Some(&b"1\tApple\n"[..]));
        assert_eq!(src.read().unwrap(), Some(&b"2\tBanana\n"[..]));
        assert_eq!(src.read().unwrap(), None);
        assert_eq!(src.read().unwrap(), None);
    }

    #[test]
    fn test_read_into_is_bounded() {
        let mut src = CopyIn::new(vec![b"abcdefghij".to_vec(), b"kl".to_vec()]);
        let mut buf = [0u8; 4];
        let mut out = Vec::new();
        loop {
            let n = src.read_into(&mut buf).unwrap();
            if n == 0 {
                break;
            }
            assert!(n <= buf.len());
            out.extend_from_slice(&buf[..n]);
        }
        assert_eq!(out, b"abcdefghijkl");
    }

    #[test]
    fn test_mixed_reads_resume_chunk() {
        let mut src = CopyIn::new(["hello world"]);
        let mut buf = [0u8; 5];
        assert_eq!(src.read_into(&mut buf).unwrap(), 5);
        assert_eq!(&buf, b"hello");
        assert_eq!(src.read().unwrap(), Some(&b" world"[..]));
        assert_eq!(src.read_into(&mut buf).unwrap(), 0);
    }

    #[test]
    fn test_pulls_lazily() {
        let mut pulled = 0;
        let chunks = std::iter::from_fn(|| {
            pulled += 1;
            (pulled <= 3).then(|| vec![b'x'; 2])
        });
        let mut src = CopyIn::new(chunks);
        let mut buf = [0u8; 1];
        assert_eq!(src.read_into(&mut buf).unwrap(), 1);
        drop(src);
        assert_eq!(pulled, 1);
    }

    #[test]
    fn test_io_read() {
        use std::io::Read;
        let mut src = CopyIn::new(vec!["a", "bc", "def"]);
        let mut s = String::new();
        src.read_to_string(&mut s).unwrap();
        assert_eq!(s, "abcdef");
    }

    #[test]
    fn test_sinks() {
        let mut got = Vec::new();
        let mut sink = CopyOut::new(|data: &[u8]| {
            got.extend_from_slice(data);
            Ok(())
        });
        sink.write(b"1\n").unwrap();
        sink.write(b"2\n").unwrap();
        drop(sink);
        assert_eq!(got, b"1\n2\n");

        let mut sink = CopyOut::writer(Vec::new());
        sink.write(b"abc").unwrap();
        assert_eq!(sink.into_inner(), b"abc");
    }
}
