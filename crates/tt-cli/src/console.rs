//! Terminal prompter for the AFK resolver.

use std::io::{self, BufRead, BufReader, IsTerminal, Stdin, Write};

use tt_core::{PromptError, Prompter};

/// Prompts on stderr and reads answers from stdin.
#[derive(Debug)]
pub struct Console<R = BufReader<Stdin>, E = io::Stderr> {
    input: R,
    output: E,
    interactive: bool,
}

impl Console {
    /// Console on the process's stdin and stderr.
    ///
    /// Interactive only when stdout is a terminal and `TERM` is not `dumb`.
    pub fn stdio() -> Self {
        let dumb = std::env::var("TERM").is_ok_and(|term| term == "dumb");
        let interactive = !dumb && io::stdout().is_terminal();
        Self::new(BufReader::new(io::stdin()), io::stderr(), interactive)
    }
}

impl<R: BufRead, E: Write> Console<R, E> {
    pub const fn new(input: R, output: E, interactive: bool) -> Self {
        Self {
            input,
            output,
            interactive,
        }
    }

    pub fn into_output(self) -> E {
        self.output
    }
}

impl<R: BufRead, E: Write> Prompter for Console<R, E> {
    fn is_interactive(&self) -> bool {
        self.interactive
    }

    fn notice(&mut self, message: &str) {
        if let Err(err) = writeln!(self.output, "{message}") {
            tracing::warn!(error = %err, "failed to write notice");
        }
    }

    fn read_line(&mut self, prompt: &str) -> Result<Option<String>, PromptError> {
        write!(self.output, "{prompt} ")?;
        self.output.flush()?;
        let mut line = String::new();
        if self.input.read_line(&mut line)? == 0 {
            return Ok(None);
        }
        let trimmed = line.trim_end_matches(['\n', '\r']).len();
        line.truncate(trimmed);
        Ok(Some(line))
    }
}
