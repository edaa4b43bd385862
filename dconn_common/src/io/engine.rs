//! Buffered I/O engine attached to a peer's raw transport descriptor.
//!
//! Software-progress backends keep one engine per peer. The engine exists
//! for the whole job; a socket descriptor is attached when the connection is
//! established (by either side) and detached again on disconnect. Messages
//! sent while no descriptor is attached are queued and flushed on attach.
//! The queue belongs to one connection: detaching discards whatever is left.

use crate::consts::MAX_MESSAGE_SIZE;
use crate::transport::DirectHeader;
use std::collections::VecDeque;
use std::io::{self, Read, Write};
use std::net::TcpStream;
use std::os::fd::{AsRawFd, OwnedFd, RawFd};
use tracing::{debug, trace, warn};

/// Read/write buffering wrapper around one peer's transport descriptor.
pub trait IoEngine: Send {
    /// Attach a connected descriptor and flush the queue into it.
    /// Replaces (and closes) any previous one.
    ///
    /// # Errors
    /// The flush failed; the descriptor is closed and the queue discarded.
    fn attach(&mut self, fd: OwnedFd) -> io::Result<()>;

    /// Detach the descriptor, handing ownership back to the caller.
    fn detach(&mut self) -> Option<OwnedFd>;

    /// True while a descriptor is attached.
    fn is_attached(&self) -> bool;

    /// Raw value of the attached descriptor.
    fn raw_fd(&self) -> Option<RawFd>;

    /// Queue `msg` and push out everything queued if attached.
    fn send_enqueue(&mut self, msg: &[u8]) -> io::Result<()>;

    /// Queue `msg` ahead of every message not yet started on the wire.
    fn send_urgent(&mut self, msg: &[u8]) -> io::Result<()>;

    /// Receive one complete framed message. `Ok(None)` when detached.
    fn recv_message(&mut self) -> io::Result<Option<Vec<u8>>>;
}

/// Socket-backed [`IoEngine`] framing messages with a [`DirectHeader`].
pub struct BufferedIo {
    header: DirectHeader,
    stream: Option<TcpStream>,
    pending: VecDeque<Vec<u8>>,
    /// Bytes of the front message already written.
    written: usize,
}

impl BufferedIo {
    /// Create a detached engine.
    pub fn new(header: DirectHeader) -> Self {
        Self {
            header,
            stream: None,
            pending: VecDeque::new(),
            written: 0,
        }
    }

    /// Number of messages waiting for a descriptor.
    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    fn flush_pending(&mut self) -> io::Result<()> {
        let Some(stream) = self.stream.as_mut() else {
            return Ok(());
        };
        match write_queued(stream, &mut self.pending, &mut self.written) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => Ok(()),
            Err(e) => {
                warn!(
                    "Write failed with {} messages queued, closing stream: {}",
                    self.pending.len(),
                    e
                );
                drop(self.take_stream());
                Err(e)
            }
        }
    }

    fn take_stream(&mut self) -> Option<TcpStream> {
        if !self.pending.is_empty() {
            debug!("Discarding {} unsent messages", self.pending.len());
        }
        self.pending.clear();
        self.written = 0;
        self.stream.take()
    }
}

/// Write queued messages in order, resuming the front one at `written`.
///
/// Fully written messages are popped. On error the partial offset is kept so
/// a retry continues mid-frame instead of resending it.
fn write_queued<W: Write>(
    out: &mut W,
    pending: &mut VecDeque<Vec<u8>>,
    written: &mut usize,
) -> io::Result<()> {
    while let Some(msg) = pending.front() {
        match out.write(&msg[*written..]) {
            Ok(0) => return Err(io::ErrorKind::WriteZero.into()),
            Ok(n) => {
                *written += n;
                if *written == msg.len() {
                    pending.pop_front();
                    *written = 0;
                }
            }
            Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
            Err(e) => return Err(e),
        }
    }
    out.flush()
}

impl IoEngine for BufferedIo {
    fn attach(&mut self, fd: OwnedFd) -> io::Result<()> {
        let stream = TcpStream::from(fd);
        trace!("Attaching fd {} to I/O engine", stream.as_raw_fd());
        self.written = 0;
        self.stream = Some(stream);
        self.flush_pending()
    }

    fn detach(&mut self) -> Option<OwnedFd> {
        self.take_stream().map(OwnedFd::from)
    }

    fn is_attached(&self) -> bool {
        self.stream.is_some()
    }

    fn raw_fd(&self) -> Option<RawFd> {
        self.stream.as_ref().map(|s| s.as_raw_fd())
    }

    fn send_enqueue(&mut self, msg: &[u8]) -> io::Result<()> {
        self.pending.push_back(msg.to_vec());
        self.flush_pending()
    }

    fn send_urgent(&mut self, msg: &[u8]) -> io::Result<()> {
        // A partly written front message must stay first.
        let at = usize::from(self.written > 0);
        self.pending.insert(at, msg.to_vec());
        self.flush_pending()
    }

    fn recv_message(&mut self) -> io::Result<Option<Vec<u8>>> {
        let header = self.header;
        let Some(stream) = self.stream.as_mut() else {
            return Ok(None);
        };

        let mut msg = vec![0u8; header.recv_padding + header.net_size];
        stream.read_exact(&mut msg[header.recv_padding..])?;

        let body_len = (header.payload_len)(&msg[header.recv_padding..]).ok_or_else(|| {
            io::Error::new(io::ErrorKind::InvalidData, "malformed message header")
        })?;
        if body_len > MAX_MESSAGE_SIZE {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!("message body of {body_len} bytes exceeds {MAX_MESSAGE_SIZE}"),
            ));
        }

        let body_start = msg.len();
        msg.resize(body_start + body_len, 0);
        stream.read_exact(&mut msg[body_start..])?;
        Ok(Some(msg))
    }
}
