//! Non-blocking byte sources consumed by decoders.
//!
//! A [`DecoderInput`] is pull-based: [`read`](DecoderInput::read) and
//! [`skip`](DecoderInput::skip) report how many bytes they actually supplied, which may
//! be zero when the source is momentarily empty. Decoders treat a short read as "need
//! more input" and answer [`DecodeState::Processing`](crate::DecodeState::Processing);
//! nothing read so far is lost.
//!
//! | Source | Behaviour |
//! |--------|-----------|
//! | `&[u8]` | Consumed from the front; the slice shrinks as bytes are read. |
//! | `bytes::BytesMut` | Consumed from the front (feature `bytes`). Append new socket data at the back. |
//! | [`ReaderInput`] | Wraps any [`std::io::Read`]; `WouldBlock` counts as "nothing available". |

use std::io;

/// Pull-based, non-blocking byte source.
pub trait DecoderInput {
    /// Copy up to `buf.len()` bytes into `buf`, returning how many were written.
    fn read(&mut self, buf: &mut [u8]) -> usize;

    /// Discard up to `n` bytes, returning how many were discarded.
    fn skip(&mut self, n: usize) -> usize {
        let mut scratch = [0u8; 256];
        let mut skipped = 0;
        while skipped < n {
            let want = (n - skipped).min(scratch.len());
            let got = self.read(&mut scratch[..want]);
            if got == 0 {
                break;
            }
            skipped += got;
        }
        skipped
    }

    /// Read a single byte, if one is available.
    fn read_byte(&mut self) -> Option<u8> {
        let mut byte = [0u8; 1];
        (self.read(&mut byte) == 1).then_some(byte[0])
    }
}

impl DecoderInput for &[u8] {
    fn read(&mut self, buf: &mut [u8]) -> usize {
        let n = buf.len().min(self.len());
        let (head, tail) = self.split_at(n);
        buf[..n].copy_from_slice(head);
        *self = tail;
        n
    }

    fn skip(&mut self, n: usize) -> usize {
        let n = n.min(self.len());
        *self = &self[n..];
        n
    }
}

impl<T: DecoderInput + ?Sized> DecoderInput for &mut T {
    fn read(&mut self, buf: &mut [u8]) -> usize {
        (**self).read(buf)
    }

    fn skip(&mut self, n: usize) -> usize {
        (**self).skip(n)
    }
}

#[cfg(feature = "bytes")]
impl DecoderInput for bytes::BytesMut {
    fn read(&mut self, buf: &mut [u8]) -> usize {
        use bytes::Buf;

        let n = buf.len().min(self.len());
        buf[..n].copy_from_slice(&self[..n]);
        self.advance(n);
        n
    }

    fn skip(&mut self, n: usize) -> usize {
        use bytes::Buf;

        let n = n.min(self.len());
        self.advance(n);
        n
    }
}

/// Adapter turning an [`io::Read`] implementation into a [`DecoderInput`].
///
/// End of stream and `WouldBlock` both surface as short reads. Other I/O errors stop the
/// current read and are kept until [`take_error`](ReaderInput::take_error) is called.
#[derive(Debug)]
pub struct ReaderInput<R> {
    inner: R,
    eof: bool,
    error: Option<io::Error>,
}

impl<R: io::Read> ReaderInput<R> {
    pub fn new(inner: R) -> Self {
        ReaderInput {
            inner,
            eof: false,
            error: None,
        }
    }

    /// Whether the underlying reader has reported end of stream.
    pub fn is_eof(&self) -> bool {
        self.eof
    }

    /// Take the last I/O error raised by the underlying reader, if any.
    pub fn take_error(&mut self) -> Option<io::Error> {
        self.error.take()
    }

    pub fn into_inner(self) -> R {
        self.inner
    }
}

impl<R: io::Read> DecoderInput for ReaderInput<R> {
    fn read(&mut self, buf: &mut [u8]) -> usize {
        let mut filled = 0;
        while filled < buf.len() {
            match self.inner.read(&mut buf[filled..]) {
                Ok(0) => {
                    self.eof = true;
                    break;
                }
                Ok(n) => filled += n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => break,
                Err(e) => {
                    self.error = Some(e);
                    break;
                }
            }
        }
        filled
    }
}
