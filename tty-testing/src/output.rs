use std::{
    io::{self, BufRead, BufReader, Read, Write},
    os::unix::prelude::{AsRawFd, RawFd},
    process::Stdio,
};

use log::trace;
use tty_pipe::{ReadAvailable, UnixPipeReader, UnixPipeWriter};

/// The program's end of stdout or stderr.
///
/// Clone it into a `std::process::Command` to capture the output of a child process.
#[derive(Debug)]
pub struct OutputWriter(UnixPipeWriter);

impl OutputWriter {
    pub(crate) fn new(writer: UnixPipeWriter) -> Self {
        Self(writer)
    }

    pub fn try_clone(&self) -> io::Result<Self> {
        Ok(Self(self.0.try_clone()?))
    }
}

impl Write for OutputWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.0.flush()
    }
}

impl AsRawFd for OutputWriter {
    fn as_raw_fd(&self) -> RawFd {
        self.0.as_raw_fd()
    }
}

impl From<OutputWriter> for Stdio {
    fn from(writer: OutputWriter) -> Self {
        writer.0.into()
    }
}

/// The driver's end of stdout or stderr.
///
/// Bytes read here are consumed, and will not be seen by the harness output accessors.
/// Blocking reads return EOF once the program and every clone of its writer are gone.
#[derive(Debug)]
pub struct OutputReader {
    inner: BufReader<UnixPipeReader>,
}

impl OutputReader {
    pub(crate) fn new(reader: UnixPipeReader) -> Self {
        Self {
            inner: BufReader::new(reader),
        }
    }

    /// Reads everything written so far, without blocking.
    pub fn read_available(&mut self) -> io::Result<Vec<u8>> {
        let mut drained = self.inner.buffer().to_vec();
        let buffered = drained.len();
        self.inner.consume(buffered);

        drained.extend(self.inner.get_mut().read_available()?);
        Ok(drained)
    }
}

impl Read for OutputReader {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.inner.read(buf)
    }
}

impl BufRead for OutputReader {
    fn fill_buf(&mut self) -> io::Result<&[u8]> {
        self.inner.fill_buf()
    }

    fn consume(&mut self, amt: usize) {
        self.inner.consume(amt)
    }
}

/// Accumulates everything drained from one output channel.
///
/// The running total only grows, so the entire output is independent of how often, or
/// whether, the driver polled in between.
#[derive(Debug)]
pub(crate) struct OutputAccumulator {
    name: &'static str,
    reader: OutputReader,
    entire: Vec<u8>,
}

impl OutputAccumulator {
    pub fn new(name: &'static str, reader: OutputReader) -> Self {
        Self {
            name,
            reader,
            entire: Vec::new(),
        }
    }

    /// Drains the channel, and returns only the new chunk.
    pub fn read(&mut self) -> io::Result<Vec<u8>> {
        let chunk = self.reader.read_available()?;

        if !chunk.is_empty() {
            trace!("{} drained {} bytes", self.name, chunk.len());
            self.entire.extend_from_slice(&chunk);
        }

        Ok(chunk)
    }

    /// Drains the channel, and returns everything accumulated so far.
    pub fn entire(&mut self) -> io::Result<&[u8]> {
        self.read()?;
        Ok(&self.entire)
    }

    pub fn stream(&mut self) -> &mut OutputReader {
        &mut self.reader
    }
}
