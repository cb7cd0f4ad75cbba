mod internal;

use std::{
    fs::File,
    io::{self, Read, Write},
    os::unix::prelude::{AsRawFd, RawFd},
    process::Stdio,
};

use log::debug;

use crate::{PipeError, PipeInstance, PipeOptions, PipeSystem, ReadAvailable};

pub struct UnixPipeSystem {}

impl PipeSystem for UnixPipeSystem {
    type Reader = UnixPipeReader;
    type Writer = UnixPipeWriter;

    fn open(options: &PipeOptions) -> Result<PipeInstance<Self>, PipeError> {
        let (read, write) = internal::open_pipe()?;

        if let Some(capacity) = options.capacity {
            match internal::set_capacity(write.as_raw_fd(), capacity) {
                Ok(granted) => debug!("pipe capacity set to {} bytes", granted),
                Err(e) => debug!("pipe capacity of {} bytes not applied: {}", capacity, e),
            }
        }

        Ok(PipeInstance {
            reader: UnixPipeReader(read),
            writer: UnixPipeWriter(write),
        })
    }
}

/// The read end of a pipe.  Reads block until data arrives or every writer is closed.
#[derive(Debug)]
pub struct UnixPipeReader(File);

impl ReadAvailable for UnixPipeReader {
    fn available(&self) -> io::Result<usize> {
        internal::bytes_available(self.0.as_raw_fd())
    }

    fn is_readable(&self) -> io::Result<bool> {
        internal::poll_readable(self.0.as_raw_fd())
    }
}

impl Read for UnixPipeReader {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.0.read(buf)
    }
}

impl AsRawFd for UnixPipeReader {
    fn as_raw_fd(&self) -> RawFd {
        self.0.as_raw_fd()
    }
}

impl From<UnixPipeReader> for Stdio {
    fn from(reader: UnixPipeReader) -> Self {
        Stdio::from(reader.0)
    }
}

/// The write end of a pipe.  The pipe reports EOF once every clone of the writer is dropped.
#[derive(Debug)]
pub struct UnixPipeWriter(File);

impl UnixPipeWriter {
    /// Duplicates the descriptor, so the same pipe can be handed to a child process.
    pub fn try_clone(&self) -> io::Result<Self> {
        Ok(Self(self.0.try_clone()?))
    }
}

impl Write for UnixPipeWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.0.flush()
    }
}

impl AsRawFd for UnixPipeWriter {
    fn as_raw_fd(&self) -> RawFd {
        self.0.as_raw_fd()
    }
}

impl From<UnixPipeWriter> for Stdio {
    fn from(writer: UnixPipeWriter) -> Self {
        Stdio::from(writer.0)
    }
}

#[cfg(test)]
mod tests {
    use super::UnixPipeSystem;
    use crate::{PipeOptions, PipeSystem, ReadAvailable};
    use pretty_assertions::assert_eq;
    use std::io::{BufRead, BufReader, Write};
    use std::process::Command;

    #[test]
    fn empty_pipe_drains_nothing() {
        let mut pipe = UnixPipeSystem::open(&PipeOptions::default()).unwrap();

        assert_eq!(0, pipe.reader.available().unwrap());
        assert!(!pipe.reader.is_readable().unwrap());
        assert_eq!(Vec::<u8>::new(), pipe.reader.read_available().unwrap());
    }

    #[test]
    fn drain_returns_buffered_bytes_once() {
        let mut pipe = UnixPipeSystem::open(&PipeOptions::default()).unwrap();

        pipe.writer.write_all(b"first\n").unwrap();
        pipe.writer.write_all(b"second").unwrap();

        assert_eq!(12, pipe.reader.available().unwrap());
        assert!(pipe.reader.is_readable().unwrap());
        assert_eq!(b"first\nsecond".to_vec(), pipe.reader.read_available().unwrap());
        assert_eq!(Vec::<u8>::new(), pipe.reader.read_available().unwrap());
    }

    #[test]
    fn closed_writer_is_readable() {
        let pipe = UnixPipeSystem::open(&PipeOptions::default()).unwrap();
        let mut reader = pipe.reader;
        drop(pipe.writer);

        assert!(reader.is_readable().unwrap());
        assert_eq!(Vec::<u8>::new(), reader.read_available().unwrap());
    }

    #[test]
    fn blocking_line_read() {
        let mut pipe = UnixPipeSystem::open(&PipeOptions::default()).unwrap();
        pipe.writer.write_all(b"one\ntwo\n").unwrap();

        let mut reader = BufReader::new(pipe.reader);
        let mut line = String::new();
        reader.read_line(&mut line).unwrap();

        assert_eq!("one\n", line);
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn capacity_is_applied() {
        let options = PipeOptions {
            capacity: Some(1 << 19),
        };
        let mut pipe = UnixPipeSystem::open(&options).unwrap();

        let chunk = vec![b'x'; 128 * 1024];
        pipe.writer.write_all(&chunk).unwrap();

        assert_eq!(chunk.len(), pipe.reader.available().unwrap());
    }

    #[test]
    fn writer_redirects_child_output() {
        let pipe = UnixPipeSystem::open(&PipeOptions::default()).unwrap();
        let mut reader = pipe.reader;

        let status = Command::new("sh")
            .arg("-c")
            .arg("echo 'Hello from subprocess!'")
            .stdout(pipe.writer.try_clone().unwrap())
            .status()
            .unwrap();
        drop(pipe.writer);

        assert!(status.success());
        assert_eq!(
            b"Hello from subprocess!\n".to_vec(),
            reader.read_available().unwrap()
        );
    }
}
