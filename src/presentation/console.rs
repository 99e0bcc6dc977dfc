//! Line-oriented console rendering

use std::fmt;
use std::io::Write;

use tracing::warn;

use super::{Controls, DisplayMode, Presenter, Reading};

const BAR_WIDTH: usize = 20;

/// Renders session feedback to a writer, usually stdout
pub struct ConsolePresenter<W> {
    out: W,
    mode: DisplayMode,
    /// Column width for label names
    label_width: usize,
}

impl<W: Write + Send> ConsolePresenter<W> {
    pub fn new(out: W, mode: DisplayMode) -> Self {
        Self {
            out,
            mode,
            label_width: 0,
        }
    }

    #[cfg(test)]
    pub fn into_inner(self) -> W {
        self.out
    }

    fn emit(&mut self, line: fmt::Arguments<'_>) {
        if let Err(e) = self.out.write_fmt(line).and_then(|_| self.out.flush()) {
            warn!(?e, "failed to write to console");
        }
    }

    fn render(&self, reading: &Reading) -> String {
        let width = self.label_width;
        match self.mode {
            DisplayMode::Text => format!("{}: {:.1}%", reading.label, reading.percent),
            DisplayMode::Bars => {
                let filled = ((reading.percent / 100.0) * BAR_WIDTH as f32)
                    .round()
                    .clamp(0.0, BAR_WIDTH as f32) as usize;
                format!(
                    "{:<width$} |{}{}| {:>5.1}%",
                    reading.label,
                    "#".repeat(filled),
                    ".".repeat(BAR_WIDTH - filled),
                    reading.percent,
                )
            }
        }
    }
}

impl<W: Write + Send> Presenter for ConsolePresenter<W> {
    fn reset_labels(&mut self, labels: &[String]) {
        self.label_width = labels.iter().map(|l| l.chars().count()).max().unwrap_or(0);
        self.emit(format_args!("labels: {}\n", labels.join(", ")));
    }

    fn show_readings(&mut self, readings: &[Reading]) {
        let frame: Vec<String> = readings.iter().map(|r| self.render(r)).collect();
        self.emit(format_args!("{}\n", frame.join("\n")));
    }

    fn show_command(&mut self, label: &str) {
        match self.mode {
            DisplayMode::Text => self.emit(format_args!(">> command: {label}\n")),
            DisplayMode::Bars => {
                let style = command_style(label);
                self.emit(format_args!(">> command [{style}]: {label}\n"));
            }
        }
    }

    fn show_banner(&mut self, text: &str) {
        self.emit(format_args!("-- {text}\n"));
    }

    fn show_error(&mut self, message: &str) {
        self.emit(format_args!("!! {message}\n"));
    }

    fn set_controls(&mut self, controls: Controls) {
        let state = |enabled: bool| if enabled { "enabled" } else { "disabled" };
        self.emit(format_args!(
            "   start {} / stop {}\n",
            state(controls.start_enabled),
            state(controls.stop_enabled)
        ));
    }
}

/// Per-command marker: the label lowercased, whitespace as dashes
fn command_style(label: &str) -> String {
    label
        .split_whitespace()
        .map(str::to_lowercase)
        .collect::<Vec<_>>()
        .join("-")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn labels() -> Vec<String> {
        vec!["Yes".to_string(), "Noise".to_string()]
    }

    fn output(presenter: ConsolePresenter<Vec<u8>>) -> String {
        String::from_utf8(presenter.into_inner()).unwrap()
    }

    #[test]
    fn test_text_mode() {
        let mut presenter = ConsolePresenter::new(Vec::new(), DisplayMode::Text);
        presenter.reset_labels(&labels());
        presenter.show_readings(&[Reading::new("Yes", 0.9), Reading::new("Noise", 0.1)]);

        let out = output(presenter);
        assert!(out.contains("labels: Yes, Noise"));
        assert!(out.contains("Yes: 90.0%"));
        assert!(out.contains("Noise: 10.0%"));
    }

    #[test]
    fn test_bars_mode() {
        let mut presenter = ConsolePresenter::new(Vec::new(), DisplayMode::Bars);
        presenter.reset_labels(&labels());
        presenter.show_readings(&[Reading::new("Yes", 0.5), Reading::new("Noise", 1.0)]);

        let out = output(presenter);
        assert!(out.contains("Yes   |##########..........|  50.0%"));
        assert!(out.contains("Noise |####################| 100.0%"));
    }

    #[test]
    fn test_controls_and_banner() {
        let mut presenter = ConsolePresenter::new(Vec::new(), DisplayMode::Text);
        presenter.set_controls(Controls::LISTENING);

        presenter.show_banner("Listening...");
        presenter.show_command("Yes");

        let out = output(presenter);
        assert!(out.contains("start disabled / stop enabled"));
        assert!(out.contains("-- Listening..."));
        assert!(out.contains(">> command: Yes"));
    }

    #[test]
    fn test_bars_mode_marks_each_command() {
        let mut presenter = ConsolePresenter::new(Vec::new(), DisplayMode::Bars);
        presenter.show_command("Yes");
        presenter.show_command("No");
        presenter.show_command("Background Noise");

        let out = output(presenter);
        assert!(out.contains(">> command [yes]: Yes"));
        assert!(out.contains(">> command [no]: No"));
        assert!(out.contains(">> command [background-noise]: Background Noise"));
    }
}
