//! Ties stdin to the engine.
//!
//! Reads from `StdinReader` suspend the task while nothing is buffered, and writes to `Input`
//! resume it, unless the harness is paused.
use std::{
    io::{self, BufRead, BufReader, Read, Write},
    sync::Arc,
};

use log::trace;
use tty_pipe::{ReadAvailable, UnixPipeReader, UnixPipeWriter};

use crate::{engine::Engine, HarnessError, Result};

/// The program's end of stdin.
///
/// Every read which would block suspends the task instead, and retries once the driver resumes
/// it.  Use it through `Read` and `BufRead`: `read_line`, `lines`, `read_to_string`, `bytes` and
/// friends all suspend the same way.
pub struct StdinReader {
    inner: BufReader<UnixPipeReader>,
    engine: Arc<Engine>,
}

impl StdinReader {
    pub(crate) fn new(reader: UnixPipeReader, engine: Arc<Engine>) -> Self {
        Self {
            inner: BufReader::new(reader),
            engine,
        }
    }

    /// True if a read would not block: input is buffered, or stdin was closed.
    pub fn is_ready(&self) -> io::Result<bool> {
        if !self.inner.buffer().is_empty() {
            return Ok(true);
        }

        self.inner.get_ref().is_readable()
    }

    /// Suspends the task until input is available, or stdin is closed.
    pub fn wait_readable(&mut self) -> io::Result<()> {
        while !self.is_ready()? {
            if !self.engine.suspend() {
                break;
            }
        }

        Ok(())
    }
}

impl Read for StdinReader {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }

        self.wait_readable()?;
        self.inner.read(buf)
    }
}

impl BufRead for StdinReader {
    fn fill_buf(&mut self) -> io::Result<&[u8]> {
        self.wait_readable()?;
        self.inner.fill_buf()
    }

    fn consume(&mut self, amt: usize) {
        self.inner.consume(amt)
    }
}

/// The driver's end of stdin.
///
/// Each completed write resumes the task, unless the harness is paused.  If the resumed
/// program fails, `Write::write` reports it as an `io::Error` wrapping the `HarnessError`.
pub struct Input {
    writer: Option<UnixPipeWriter>,
    engine: Arc<Engine>,
}

impl Input {
    pub(crate) fn new(writer: UnixPipeWriter, engine: Arc<Engine>) -> Self {
        Self {
            writer: Some(writer),
            engine,
        }
    }

    /// Writes a line of input, adding the trailing newline if it is missing, then resumes the
    /// task unless the harness is paused.
    pub fn puts<T: AsRef<str>>(&mut self, line: T) -> Result<()> {
        let mut data = line.as_ref().as_bytes().to_vec();
        if data.last() != Some(&b'\n') {
            data.push(b'\n');
        }

        self.write_raw(&data)?;
        self.engine.resume_unless_paused()
    }

    /// Closes stdin.  The program reads EOF once the buffered input is consumed.
    ///
    /// Like a write, this resumes the task unless the harness is paused.
    pub fn close(&mut self) -> Result<()> {
        if self.writer.take().is_some() {
            trace!("stdin closed");
        }

        self.engine.resume_unless_paused()
    }

    pub fn is_closed(&self) -> bool {
        self.writer.is_none()
    }

    /// Drops the writer without resuming.
    pub(crate) fn shutdown(&mut self) {
        self.writer.take();
    }

    fn write_raw(&mut self, data: &[u8]) -> io::Result<()> {
        let writer = self.writer_mut()?;
        writer.write_all(data)?;
        trace!(
            "stdin <- {}",
            snailquote::escape(&String::from_utf8_lossy(data))
        );

        Ok(())
    }

    fn writer_mut(&mut self) -> io::Result<&mut UnixPipeWriter> {
        self.writer
            .as_mut()
            .ok_or_else(|| io::Error::new(io::ErrorKind::BrokenPipe, "stdin is closed"))
    }
}

impl Write for Input {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let written = self.writer_mut()?.write(buf)?;
        trace!(
            "stdin <- {}",
            snailquote::escape(&String::from_utf8_lossy(&buf[..written]))
        );

        self.engine.resume_unless_paused().map_err(io::Error::from)?;
        Ok(written)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.writer_mut()?.flush()
    }
}

impl From<HarnessError> for io::Error {
    fn from(err: HarnessError) -> Self {
        match err {
            HarnessError::IoError(e) => e,
            err => io::Error::new(io::ErrorKind::Other, err),
        }
    }
}
