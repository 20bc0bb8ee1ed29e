//! Console progress output.
//!
//! Progress lines and matrix grids are user-facing output, kept apart from
//! `tracing` diagnostics. Silent mode suppresses all of it.

use std::io::Write;
use std::time::Duration;

use crate::environment::Flags;

pub struct Logger {
    progress: usize,
    total: usize,
    show_commands: bool,
    silent: bool,
    benchmark: bool,
    sink: Box<dyn Write + Send>,
}

impl Logger {
    /// Logger writing to stdout.
    pub fn stdout(flags: &Flags) -> Self {
        Self::with_sink(flags, Box::new(std::io::stdout()))
    }

    pub fn with_sink(flags: &Flags, sink: Box<dyn Write + Send>) -> Self {
        Self {
            progress: 0,
            total: 0,
            show_commands: flags.shows_commands(),
            silent: flags.silent,
            benchmark: flags.benchmark,
            sink,
        }
    }

    /// Start a new operation over `total` repositories.
    pub fn reset(&mut self, total: usize) {
        self.progress = 0;
        self.total = total;
    }

    /// Advance to the next repository.
    pub fn advance(&mut self) {
        self.progress += 1;
    }

    pub fn shows_commands(&self) -> bool {
        self.show_commands
    }

    /// `[03/12] Action repo message: command`. The command is only shown in
    /// verbose or dry-run mode.
    pub fn log(&mut self, repo: &str, action: &str, message: Option<&str>, command: Option<&str>) {
        let mut line = format!("{} {action} {repo}", self.counter());
        if let Some(message) = message {
            line.push(' ');
            line.push_str(message);
        }
        if self.show_commands {
            if let Some(command) = command {
                line.push_str(": ");
                line.push_str(command);
            }
        }
        self.line(&line);
    }

    pub fn log_duration(&mut self, repo: &str, elapsed: Duration) {
        if self.benchmark {
            let line = format!("{} Took {:.3}s for {repo}", self.counter(), elapsed.as_secs_f64());
            self.line(&line);
        }
    }

    /// Raw line, e.g. a grid row.
    pub fn line(&mut self, text: &str) {
        if self.silent {
            return;
        }
        writeln!(self.sink, "{text}").ok();
        self.sink.flush().ok();
    }

    fn counter(&self) -> String {
        let width = self.total.to_string().len().max(2);
        format!("[{:0width$}/{:0width$}]", self.progress, self.total)
    }
}
