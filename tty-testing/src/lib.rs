//! Test harness for interactive, line-oriented console programs.
//!
//! The program is a closure which receives stdin, stdout and stderr channels.  It runs as a
//! cooperative task: whenever it reads from stdin and nothing is buffered, it suspends, and
//! control returns to the test.  Writing a line to `Harness::input` resumes it, unless the
//! harness is paused.
//!
//! ```
//! use std::io::{BufRead, Write};
//! use tty_testing::Harness;
//!
//! let mut app = Harness::merged(|mut input, mut output| {
//!     writeln!(output, "What is your name?")?;
//!     let mut name = String::new();
//!     input.read_line(&mut name)?;
//!     writeln!(output, "Hello, {}!", name.trim())?;
//!     Ok(())
//! })?;
//!
//! app.input().puts("Motaro")?;
//! app.run()?;
//!
//! assert_eq!(b"What is your name?\nHello, Motaro!\n".to_vec(), app.output()?);
//! # Ok::<(), tty_testing::HarnessError>(())
//! ```

pub mod log;

mod engine;
mod entangle;
mod harness;
mod options;
mod output;

use std::io;

use thiserror::Error;

pub use engine::TaskState;
pub use entangle::{Input, StdinReader};
pub use harness::Harness;
pub use options::HarnessOptions;
pub use output::{OutputReader, OutputWriter};

#[derive(Error, Debug)]
pub enum HarnessError {
    #[error("io error: {0}")]
    IoError(#[from] io::Error),
    #[error("pipe error: {0}")]
    PipeError(#[from] tty_pipe::PipeError),
    #[error("failed to start the program thread: {0}")]
    SpawnError(io::Error),
    #[error("program failed: {0:#}")]
    ProgramError(anyhow::Error),
}

pub type Result<T> = std::result::Result<T, HarnessError>;
