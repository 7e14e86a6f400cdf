//! A small console reporter.
//!
//! External environments are expected to bring their own presentation; this
//! reporter is the built-in one for plain terminal use. It prints a rendered
//! result tree and derives the process exit status from the aggregate
//! statistics.

use crate::render::{Format, RenderOptions};
use crate::result::{ResultNode, Stats};

/// Prints result trees to stdout, choosing rich output only on a terminal.
#[derive(Debug, Clone)]
pub struct ConsoleReporter {
    options: RenderOptions,
}

impl ConsoleReporter {
    /// Rich output when stdout is a terminal, plain otherwise.
    pub fn new() -> Self {
        let format = if atty::is(atty::Stream::Stdout) {
            Format::Rich
        } else {
            Format::Plain
        };
        Self {
            options: RenderOptions {
                format,
                verbose: false,
            },
        }
    }

    pub fn with_format(format: Format) -> Self {
        Self {
            options: RenderOptions {
                format,
                verbose: false,
            },
        }
    }

    pub fn verbose(mut self, verbose: bool) -> Self {
        self.options.verbose = verbose;
        self
    }

    /// Print the rendered tree for a (typically settled) run.
    pub fn print(&self, result: &ResultNode) {
        print!("{}", result.render(&self.options));
    }

    /// The exit status a CLI should report for these statistics.
    pub fn exit_code(stats: &Stats) -> i32 {
        if stats.is_success() {
            0
        } else {
            1
        }
    }
}

impl Default for ConsoleReporter {
    fn default() -> Self {
        Self::new()
    }
}
