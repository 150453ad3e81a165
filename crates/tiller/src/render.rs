use colored::Colorize;
use std::io::{self, Write};
use tiller_core::AgentEvent;

/// Writes agent events and system notices as terminal lines.
pub struct Renderer<W: Write> {
    out: W,
}

impl Renderer<io::Stdout> {
    pub fn stdout() -> Self {
        Self::new(io::stdout())
    }
}

impl<W: Write> Renderer<W> {
    pub fn new(out: W) -> Self {
        Self { out }
    }

    pub fn into_inner(self) -> W {
        self.out
    }

    pub fn event(&mut self, event: &AgentEvent) -> io::Result<()> {
        match event {
            AgentEvent::ToolCall { name, arguments } => {
                writeln!(self.out, "{}", format!("{name}({arguments})").cyan())?;
            }
            AgentEvent::Reasoning { text } => {
                writeln!(self.out, "{}", format!("💭 {text}").dimmed().italic())?;
            }
            AgentEvent::MessageOutput { text } => writeln!(self.out, "{text}")?,
            AgentEvent::Error { message } => self.error(message)?,
        }
        self.out.flush()
    }

    pub fn prompt_echo(&mut self, prompt: &str) -> io::Result<()> {
        writeln!(self.out, "{} {prompt}", "Prompt:".bold().cyan())?;
        self.out.flush()
    }

    pub fn system(&mut self, text: &str) -> io::Result<()> {
        writeln!(self.out, "{}", text.yellow())?;
        self.out.flush()
    }

    pub fn error(&mut self, message: &str) -> io::Result<()> {
        writeln!(self.out, "{}", format!("Error: {message}").red())?;
        self.out.flush()
    }

    pub fn input_prompt(&mut self) -> io::Result<()> {
        write!(self.out, "{} ", "›".bold().blue())?;
        self.out.flush()
    }

    pub fn clear_screen(&mut self) -> io::Result<()> {
        write!(self.out, "\x1B[2J\x1B[1;1H")?;
        self.out.flush()
    }
}
