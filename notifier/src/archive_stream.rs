//! Single-use byte pipe between an archiver thread and an upload request.
//!
//! The write end is a blocking [`std::io::Write`] meant to run on a blocking
//! thread. The read end is a [`Stream`] of chunks that reqwest consumes as a
//! request body. The channel is bounded, so a slow upload stalls the archiver
//! instead of buffering the whole archive.

use bytes::Bytes;
use futures::Stream;
use std::io::{self, Write};
use std::pin::Pin;
use std::task::{Context, Poll};
use tokio::sync::mpsc;

const CHUNK_SIZE: usize = 64 * 1024;

type Chunk = io::Result<Bytes>;

/// Create a connected writer/stream pair holding at most `capacity` chunks in flight.
pub fn archive_stream(capacity: usize) -> (ArchiveWriter, ArchiveStream) {
    let (tx, rx) = mpsc::channel(capacity.max(1));
    (
        ArchiveWriter {
            tx: Some(tx),
            buf: Vec::with_capacity(CHUNK_SIZE),
        },
        ArchiveStream { rx },
    )
}

/// Producer end. Must be closed through [`ArchiveWriter::finish`] or
/// [`ArchiveWriter::abort`]; dropping it unfinished aborts the stream.
pub struct ArchiveWriter {
    tx: Option<mpsc::Sender<Chunk>>,
    buf: Vec<u8>,
}

impl ArchiveWriter {
    /// Flush what is buffered and signal end of stream.
    pub fn finish(mut self) -> io::Result<()> {
        self.send_buffered()?;
        self.tx.take();
        Ok(())
    }

    /// Close the stream with an error so the reader fails instead of seeing
    /// a truncated but well-formed body. Blocking, like every other write.
    pub fn abort(mut self, reason: &dyn std::error::Error) {
        if let Some(tx) = self.tx.take() {
            let _ = tx.blocking_send(Err(io::Error::other(reason.to_string())));
        }
    }

    fn send_buffered(&mut self) -> io::Result<()> {
        if self.buf.is_empty() {
            return Ok(());
        }
        let tx = self.tx.as_ref().ok_or_else(closed)?;
        let chunk = Bytes::from(std::mem::replace(
            &mut self.buf,
            Vec::with_capacity(CHUNK_SIZE),
        ));
        tx.blocking_send(Ok(chunk)).map_err(|_| closed())
    }
}

fn closed() -> io::Error {
    io::Error::new(io::ErrorKind::BrokenPipe, "archive stream closed by reader")
}

impl Write for ArchiveWriter {
    fn write(&mut self, data: &[u8]) -> io::Result<usize> {
        if self.tx.as_ref().is_none_or(|tx| tx.is_closed()) {
            return Err(closed());
        }
        self.buf.extend_from_slice(data);
        if self.buf.len() >= CHUNK_SIZE {
            self.send_buffered()?;
        }
        Ok(data.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        self.send_buffered()
    }
}

impl Drop for ArchiveWriter {
    fn drop(&mut self) {
        // Reached only when neither finish nor abort ran, e.g. on panic.
        if let Some(tx) = self.tx.take() {
            let _ = tx.try_send(Err(io::Error::other(
                "archive writer dropped before completion",
            )));
        }
    }
}

/// Consumer end, used as an HTTP request body.
pub struct ArchiveStream {
    rx: mpsc::Receiver<Chunk>,
}

impl Stream for ArchiveStream {
    type Item = Chunk;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.rx.poll_recv(cx)
    }
}
