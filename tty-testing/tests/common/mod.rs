#![allow(dead_code)]

use std::io::{BufRead, Write};
use std::sync::{Arc, Mutex};

use tty_testing::Harness;

/// Installs the stderr logger once per test binary.  Set TTY_TESTING_LOG=debug for handoff logs.
pub fn setup() {
    tty_testing::log::init_test_logger();
}

/// Asks for a name on stdout, logs to stderr, and greets on stdout.
pub fn greeter() -> Harness {
    setup();

    Harness::new(|mut stdin, mut stdout, mut stderr| {
        writeln!(stderr, "[LOG] Program started")?;
        writeln!(stdout, "What is your name?")?;
        writeln!(stderr, "[LOG] Expecting input now...")?;

        let mut name = String::new();
        stdin.read_line(&mut name)?;

        writeln!(stdout, "Hello, {}!", name.trim())?;
        writeln!(stderr, "[LOG] Exiting")?;
        Ok(())
    })
    .expect("harness")
}

/// Writes "Q?", reads a line, then answers with "A: " and the line.
pub fn question() -> Harness {
    setup();

    Harness::new(|mut stdin, mut stdout, _| {
        writeln!(stdout, "Q?")?;

        let mut line = String::new();
        stdin.read_line(&mut line)?;

        write!(stdout, "A: {}", line)?;
        Ok(())
    })
    .expect("harness")
}

/// A shared, ordered log of what the program body reached.
#[derive(Clone, Default)]
pub struct Trace(Arc<Mutex<Vec<String>>>);

impl Trace {
    pub fn push<T: ToString>(&self, entry: T) {
        self.0.lock().unwrap().push(entry.to_string());
    }

    pub fn entries(&self) -> Vec<String> {
        self.0.lock().unwrap().clone()
    }
}

pub fn utf8(bytes: &[u8]) -> &str {
    std::str::from_utf8(bytes).expect("utf8 output")
}
