//! Transport framing over any async byte stream.
//!
//! Two framings are supported:
//!
//! * **Abridged** — init byte `0xef`; each frame prefixed with its length in
//!   4-byte words (1 byte below 0x7f, else `0x7f` + 3 LE bytes).
//! * **Intermediate** — init bytes `0xee 0xee 0xee 0xee`; each frame prefixed
//!   with its 4-byte LE byte length. More proxy-friendly than Abridged.

use std::io;

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

/// Which framing to put on the wire.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub enum Framing {
    /// Word-length prefixed frames, init byte `0xef`.
    #[default]
    Abridged,
    /// Byte-length prefixed frames, init bytes `0xee * 4`.
    Intermediate,
}

/// Write half: frames outgoing payloads over any [`AsyncWrite`].
///
/// Each call composes the whole frame (init bytes on the first call, length
/// header, payload) into one buffer sized to the exact frame length and
/// issues a single write.
pub struct FrameStream<W> {
    stream: W,
    framing: Framing,
    init_sent: bool,
}

impl<W: AsyncWrite + Unpin> FrameStream<W> {
    /// Wrap a stream; init bytes go out with the first frame.
    pub fn new(stream: W, framing: Framing) -> Self {
        Self { stream, framing, init_sent: false }
    }

    /// Frame and write one payload.
    pub async fn send(&mut self, data: &[u8]) -> io::Result<()> {
        let mut buf = Vec::with_capacity(8 + data.len());
        if !self.init_sent {
            match self.framing {
                Framing::Abridged => buf.push(0xef),
                Framing::Intermediate => buf.extend_from_slice(&[0xee; 4]),
            }
            self.init_sent = true;
        }
        match self.framing {
            Framing::Abridged => {
                let words = data.len() / 4;
                if words < 0x7f {
                    buf.push(words as u8);
                } else {
                    buf.push(0x7f);
                    buf.push((words & 0xff) as u8);
                    buf.push(((words >> 8) & 0xff) as u8);
                    buf.push(((words >> 16) & 0xff) as u8);
                }
            }
            Framing::Intermediate => {
                buf.extend_from_slice(&(data.len() as u32).to_le_bytes());
            }
        }
        buf.extend_from_slice(data);
        self.stream.write_all(&buf).await?;
        self.stream.flush().await
    }

    /// Unwrap the underlying stream.
    pub fn into_inner(self) -> W {
        self.stream
    }
}

/// Read half: parses the same framings (used by the read path and tests).
pub struct FrameReader<R> {
    stream: R,
    framing: Framing,
    init_seen: bool,
}

impl<R: AsyncRead + Unpin> FrameReader<R> {
    /// Wrap a stream; init bytes are consumed before the first frame.
    pub fn new(stream: R, framing: Framing) -> Self {
        Self { stream, framing, init_seen: false }
    }

    /// Read the next frame.
    pub async fn recv(&mut self) -> io::Result<Vec<u8>> {
        if !self.init_seen {
            match self.framing {
                Framing::Abridged => {
                    let mut b = [0u8; 1];
                    self.stream.read_exact(&mut b).await?;
                    if b[0] != 0xef {
                        return Err(io::Error::new(io::ErrorKind::InvalidData, "bad init byte"));
                    }
                }
                Framing::Intermediate => {
                    let mut b = [0u8; 4];
                    self.stream.read_exact(&mut b).await?;
                    if b != [0xee; 4] {
                        return Err(io::Error::new(io::ErrorKind::InvalidData, "bad init bytes"));
                    }
                }
            }
            self.init_seen = true;
        }
        let len = match self.framing {
            Framing::Abridged => {
                let mut h = [0u8; 1];
                self.stream.read_exact(&mut h).await?;
                let words = if h[0] < 0x7f {
                    h[0] as usize
                } else {
                    let mut b = [0u8; 3];
                    self.stream.read_exact(&mut b).await?;
                    b[0] as usize | (b[1] as usize) << 8 | (b[2] as usize) << 16
                };
                words * 4
            }
            Framing::Intermediate => {
                let mut b = [0u8; 4];
                self.stream.read_exact(&mut b).await?;
                u32::from_le_bytes(b) as usize
            }
        };
        let mut buf = vec![0u8; len];
        self.stream.read_exact(&mut buf).await?;
        Ok(buf)
    }
}
