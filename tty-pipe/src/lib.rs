//! Anonymous pipes with a non-blocking view of their buffered contents.
//!
//! The harness uses one pipe per standard stream.  Each pipe has a reader end and a writer end,
//! and the reader end can report how much data is buffered, or drain it, without blocking.

pub mod unix;

use std::io::{self, Read, Write};

use thiserror::Error;

pub use unix::{UnixPipeReader, UnixPipeSystem, UnixPipeWriter};

#[derive(Error, Debug)]
pub enum PipeError {
    #[error("io error: {0}")]
    IoError(#[from] io::Error),
}

#[derive(Debug, Clone)]
pub struct PipeOptions {
    /// Requested buffer capacity in bytes.  Only honored on Linux.
    pub capacity: Option<usize>,
}

impl Default for PipeOptions {
    fn default() -> Self {
        Self { capacity: None }
    }
}

/// Non-blocking inspection of the data buffered in a reader.
pub trait ReadAvailable: Read {
    /// The number of bytes which can be read without blocking.
    fn available(&self) -> io::Result<usize>;

    /// True if a read would return immediately, either with data or with EOF.
    fn is_readable(&self) -> io::Result<bool>;

    /// Reads everything which is buffered at the moment.  Never blocks.
    fn read_available(&mut self) -> io::Result<Vec<u8>> {
        let mut drained = Vec::new();

        loop {
            let len = self.available()?;
            if len == 0 {
                return Ok(drained);
            }

            let start = drained.len();
            drained.resize(start + len, 0);
            self.read_exact(&mut drained[start..])?;
        }
    }
}

pub trait PipeSystem {
    type Reader: ReadAvailable + Send;
    type Writer: Write + Send;

    fn open(options: &PipeOptions) -> Result<PipeInstance<Self>, PipeError>;
}

pub struct PipeInstance<P>
where
    P: PipeSystem + ?Sized,
{
    pub reader: P::Reader,
    pub writer: P::Writer,
}

/// Opens a pipe with the default system for this platform.
pub fn pipe(options: &PipeOptions) -> Result<(UnixPipeReader, UnixPipeWriter), PipeError> {
    let instance = UnixPipeSystem::open(options)?;
    Ok((instance.reader, instance.writer))
}
