use tty_pipe::PipeOptions;
use typed_builder::TypedBuilder;

/// Construction options for a harness.
///
/// ```
/// use tty_testing::HarnessOptions;
///
/// let options = HarnessOptions::builder()
///     .thread_name("greeter")
///     .pipe_capacity(1 << 20)
///     .build();
///
/// assert_eq!("greeter", options.thread_name);
/// ```
#[derive(TypedBuilder, Debug, Clone, Eq, PartialEq)]
pub struct HarnessOptions {
    /// Name of the thread which hosts the program body
    #[builder(default = String::from("tty-testing-task"), setter(into))]
    pub thread_name: String,
    #[builder(default, setter(strip_option))]
    pub stack_size: Option<usize>,
    /// Requested capacity of each stdio pipe, in bytes.  Linux only.
    #[builder(default, setter(strip_option))]
    pub pipe_capacity: Option<usize>,
}

impl HarnessOptions {
    pub(crate) fn pipe_options(&self) -> PipeOptions {
        PipeOptions {
            capacity: self.pipe_capacity,
        }
    }
}

impl Default for HarnessOptions {
    fn default() -> Self {
        Self::builder().build()
    }
}

#[cfg(test)]
mod tests {
    use super::HarnessOptions;

    #[test]
    fn defaults() {
        let options = HarnessOptions::default();

        assert_eq!("tty-testing-task", options.thread_name);
        assert_eq!(None, options.stack_size);
        assert_eq!(None, options.pipe_options().capacity);
    }

    #[test]
    fn builder_overrides() {
        let options = HarnessOptions::builder()
            .thread_name("custom")
            .stack_size(256 * 1024)
            .pipe_capacity(4096)
            .build();

        assert_eq!("custom", options.thread_name);
        assert_eq!(Some(256 * 1024), options.stack_size);
        assert_eq!(Some(4096), options.pipe_options().capacity);
    }
}
