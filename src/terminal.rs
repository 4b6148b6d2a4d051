use picnam_core::StimulusItem;
use picnam_experiment::UiSink;
use std::fmt;
use std::io::{self, Stdout, Write};
use tracing::debug;

/// Line-oriented presentation for running a session from a terminal.
pub struct TerminalSink<W: Write> {
    out: W,
}

impl TerminalSink<Stdout> {
    pub fn stdout() -> Self {
        Self::new(io::stdout())
    }
}

impl<W: Write> TerminalSink<W> {
    pub fn new(out: W) -> Self {
        Self { out }
    }

    #[cfg(test)]
    pub fn into_inner(self) -> W {
        self.out
    }

    fn emit(&mut self, args: fmt::Arguments<'_>) {
        let written = self
            .out
            .write_fmt(args)
            .and_then(|()| self.out.write_all(b"\n"))
            .and_then(|()| self.out.flush());
        if let Err(e) = written {
            debug!(error = %e, "terminal write failed");
        }
    }
}

impl<W: Write> UiSink for TerminalSink<W> {
    fn show_fixation(&mut self) {
        self.emit(format_args!("{:^40}", "+"));
    }

    fn show_stimulus(&mut self, item: &StimulusItem) {
        self.emit(format_args!(
            ">>> {} [{}, list {}, {}]",
            item.word.to_uppercase(),
            item.word_id,
            item.list_tag,
            item.image_file
        ));
    }

    fn show_message(&mut self, text: &str) {
        self.emit(format_args!("{text}"));
    }

    fn set_status(&mut self, text: &str) {
        self.emit(format_args!("   ({text})"));
    }
}
