use std::{fmt, sync::Arc};

use log::debug;
use tty_pipe::PipeOptions;

use crate::{
    engine::{Engine, TaskState},
    entangle::{Input, StdinReader},
    output::{OutputAccumulator, OutputReader, OutputWriter},
    HarnessOptions, Result,
};

/// Drives an interactive program body: start it, feed it input, and read what it printed.
///
/// The body runs until it reads from stdin and finds nothing buffered.  Control then returns to
/// the caller of `run`, `resume` or the stdin write which resumed it.
///
/// ```
/// use std::io::{BufRead, Write};
/// use tty_testing::Harness;
///
/// let mut app = Harness::new(|mut stdin, mut stdout, _stderr| {
///     writeln!(stdout, "What is your name?")?;
///     let mut name = String::new();
///     stdin.read_line(&mut name)?;
///     writeln!(stdout, "Hello, {}!", name.trim())?;
///     Ok(())
/// })?;
///
/// app.run()?;
/// assert_eq!(b"What is your name?\n".to_vec(), app.read_stdout()?);
///
/// app.input().puts("Motaro")?;
/// assert_eq!(b"Hello, Motaro!\n".to_vec(), app.read_stdout()?);
/// assert!(app.exited());
/// # Ok::<(), tty_testing::HarnessError>(())
/// ```
///
/// A suspended body has no timeout.  If no input ever arrives it stays suspended; dropping the
/// harness closes stdin and lets it run to completion on its own thread.
pub struct Harness {
    engine: Arc<Engine>,
    input: Input,
    stdout: OutputAccumulator,
    stderr: Option<OutputAccumulator>,
}

impl Harness {
    /// Wraps a body which receives separate stdin, stdout and stderr channels.
    pub fn new<F>(body: F) -> Result<Self>
    where
        F: FnOnce(StdinReader, OutputWriter, OutputWriter) -> anyhow::Result<()> + Send + 'static,
    {
        Self::with_options(HarnessOptions::default(), body)
    }

    pub fn with_options<F>(options: HarnessOptions, body: F) -> Result<Self>
    where
        F: FnOnce(StdinReader, OutputWriter, OutputWriter) -> anyhow::Result<()> + Send + 'static,
    {
        let pipe_options = options.pipe_options();
        let (stderr_reader, stderr_writer) = output_channel(&pipe_options)?;

        let mut harness = Self::build(&options, move |stdin, stdout| {
            body(stdin, stdout, stderr_writer)
        })?;
        harness.stderr = Some(OutputAccumulator::new("stderr", stderr_reader));

        Ok(harness)
    }

    /// Wraps a body which receives stdin, and a single output channel for stdout and stderr.
    pub fn merged<F>(body: F) -> Result<Self>
    where
        F: FnOnce(StdinReader, OutputWriter) -> anyhow::Result<()> + Send + 'static,
    {
        Self::merged_with_options(HarnessOptions::default(), body)
    }

    pub fn merged_with_options<F>(options: HarnessOptions, body: F) -> Result<Self>
    where
        F: FnOnce(StdinReader, OutputWriter) -> anyhow::Result<()> + Send + 'static,
    {
        Self::build(&options, body)
    }

    fn build<F>(options: &HarnessOptions, body: F) -> Result<Self>
    where
        F: FnOnce(StdinReader, OutputWriter) -> anyhow::Result<()> + Send + 'static,
    {
        let pipe_options = options.pipe_options();
        let (stdin_reader, stdin_writer) = tty_pipe::pipe(&pipe_options)?;
        let (stdout_reader, stdout_writer) = output_channel(&pipe_options)?;

        let engine = Engine::new(options);
        let stdin = StdinReader::new(stdin_reader, engine.clone());
        engine.load(Box::new(move || body(stdin, stdout_writer)));

        debug!("harness created");

        Ok(Self {
            input: Input::new(stdin_writer, engine.clone()),
            engine,
            stdout: OutputAccumulator::new("stdout", stdout_reader),
            stderr: None,
        })
    }

    /// Starts the program, or resumes it.  Clears the pause.
    pub fn run(&mut self) -> Result<()> {
        self.resume()
    }

    /// Clears the pause, and hands control to the program until it suspends or exits.
    /// A no-op once the program has exited.
    pub fn resume(&mut self) -> Result<()> {
        self.engine.set_paused(false);
        self.engine.resume()
    }

    /// Stops writes to `input()` from resuming the program.
    pub fn pause(&mut self) {
        self.engine.set_paused(true);
    }

    pub fn is_paused(&self) -> bool {
        self.engine.is_paused()
    }

    /// The driver's end of stdin.
    pub fn input(&mut self) -> &mut Input {
        &mut self.input
    }

    /// Stdout written since the last read.
    pub fn read_stdout(&mut self) -> Result<Vec<u8>> {
        Ok(self.stdout.read()?)
    }

    /// Stderr written since the last read.  Always empty for a merged harness.
    pub fn read_stderr(&mut self) -> Result<Vec<u8>> {
        match self.stderr.as_mut() {
            Some(stderr) => Ok(stderr.read()?),
            None => Ok(Vec::new()),
        }
    }

    /// Output written since the last read.  The same as `read_stdout`.
    pub fn output(&mut self) -> Result<Vec<u8>> {
        self.read_stdout()
    }

    /// Everything written to stdout since the harness was created.
    pub fn entire_stdout(&mut self) -> Result<&[u8]> {
        Ok(self.stdout.entire()?)
    }

    /// Everything written to stderr since the harness was created.  Always empty for a merged
    /// harness.
    pub fn entire_stderr(&mut self) -> Result<&[u8]> {
        match self.stderr.as_mut() {
            Some(stderr) => Ok(stderr.entire()?),
            None => Ok(&[]),
        }
    }

    pub fn entire_output(&mut self) -> Result<&[u8]> {
        self.entire_stdout()
    }

    /// The raw stdout reader.  Bytes read from it are not accumulated.
    pub fn stdout_stream(&mut self) -> &mut OutputReader {
        self.stdout.stream()
    }

    /// The raw stderr reader, if the harness has a separate stderr channel.
    pub fn stderr_stream(&mut self) -> Option<&mut OutputReader> {
        self.stderr.as_mut().map(OutputAccumulator::stream)
    }

    pub fn output_stream(&mut self) -> &mut OutputReader {
        self.stdout_stream()
    }

    /// True once the program body has returned.  Never reverts.
    pub fn exited(&self) -> bool {
        self.engine.exited()
    }

    pub fn state(&self) -> TaskState {
        self.engine.state()
    }
}

impl fmt::Debug for Harness {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Harness")
            .field("state", &self.state())
            .field("paused", &self.is_paused())
            .field("merged", &self.stderr.is_none())
            .finish()
    }
}

impl Drop for Harness {
    fn drop(&mut self) {
        self.input.shutdown();
        self.engine.abandon();
    }
}

fn output_channel(options: &PipeOptions) -> Result<(OutputReader, OutputWriter)> {
    let (reader, writer) = tty_pipe::pipe(options)?;
    Ok((OutputReader::new(reader), OutputWriter::new(writer)))
}
