// Copyright 2025 Cornell University
// released under MIT License

use std::io::Write;

use clap::ColorChoice;
use codespan_reporting::diagnostic::{Diagnostic as CodespanDiagnostic, Label as CodespanLabel, LabelStyle, Severity};
use codespan_reporting::files::SimpleFiles;
use codespan_reporting::term;
use codespan_reporting::term::termcolor::{Buffer, Color, ColorSpec, WriteColor};
use log::warn;

use crate::errors::IaError;

/// Severity of diagnostic
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Level {
    Error,
    Warning,
}

impl Level {
    fn title(self) -> &'static str {
        match self {
            Level::Error => "error",
            Level::Warning => "warning",
        }
    }
}

/// A label representing a part of the source code
#[derive(Debug, Clone, PartialEq, Eq)]
struct Label {
    message: Option<String>,
    range: (usize, usize),
}

impl Label {
    fn to_codespan_label(&self, fileid: usize) -> CodespanLabel<usize> {
        CodespanLabel::new(LabelStyle::Primary, fileid, self.range.0..self.range.1)
            .with_message(self.message.clone().unwrap_or_default())
    }
}

struct Diagnostic {
    message: String,
    level: Level,
    location: Option<(usize, Label)>,
}

impl Diagnostic {
    fn emit(&self, buffer: &mut Buffer, files: &SimpleFiles<String, String>) -> std::io::Result<()> {
        if let Some((fileid, label)) = &self.location {
            let severity = match self.level {
                Level::Error => Severity::Error,
                Level::Warning => Severity::Warning,
            };
            let diagnostic = CodespanDiagnostic::new(severity)
                .with_message(&self.message)
                .with_labels(vec![label.to_codespan_label(*fileid)]);
            let config = term::Config::default();
            term::emit(buffer, &config, files, &diagnostic)
                .map_err(|e| std::io::Error::other(e.to_string()))
        } else {
            let color = match self.level {
                Level::Error => Color::Red,
                Level::Warning => Color::Yellow,
            };
            buffer.set_color(ColorSpec::new().set_bold(true).set_fg(Some(color)))?;
            write!(buffer, "{}", self.level.title())?;
            buffer.set_color(ColorSpec::new().set_bold(true))?;
            writeln!(buffer, ": {}", self.message)?;
            buffer.set_color(&ColorSpec::new())
        }
    }
}

/// Collects source files and renders errors against them on stderr.
pub struct DiagnosticHandler {
    files: SimpleFiles<String, String>,
    error_string: String,
    /// `color_choice` indicates whether to emit error messages w/ ANSI colors
    color_choice: ColorChoice,
}

impl Default for DiagnosticHandler {
    /// Default `DiagnosticHandler` does not emit colored error messages
    fn default() -> Self {
        Self::new(ColorChoice::Never)
    }
}

impl DiagnosticHandler {
    pub fn new(color_choice: ColorChoice) -> Self {
        Self {
            files: SimpleFiles::new(),
            error_string: String::new(),
            color_choice,
        }
    }

    fn create_buffer(&self) -> Buffer {
        if self.color_choice == ColorChoice::Never {
            Buffer::no_color()
        } else {
            Buffer::ansi()
        }
    }

    pub fn add_file(&mut self, name: String, content: String) -> usize {
        self.files.add(name, content)
    }

    /// Everything emitted so far.
    pub fn error_string(&self) -> &str {
        &self.error_string
    }

    fn emit(&mut self, diagnostic: Diagnostic) {
        let mut buffer = self.create_buffer();
        if let Err(e) = diagnostic.emit(&mut buffer, &self.files) {
            warn!("failed to render diagnostic: {e}");
        }
        let error_msg = String::from_utf8_lossy(buffer.as_slice());
        self.error_string.push_str(&error_msg);
        eprint!("{}", error_msg);
    }

    /// Parse errors are shown against `fileid` when one is given; every
    /// other error becomes a general message.
    pub fn emit_error(&mut self, error: &IaError, fileid: Option<usize>) {
        let diagnostic = match (error, fileid) {
            (IaError::Parse { message, range }, Some(fileid)) => Diagnostic {
                message: message.clone(),
                level: Level::Error,
                location: Some((
                    fileid,
                    Label {
                        message: Some(message.clone()),
                        range: *range,
                    },
                )),
            },
            _ => Diagnostic {
                message: error.to_string(),
                level: Level::Error,
                location: None,
            },
        };
        self.emit(diagnostic);
    }

    pub fn emit_general_message(&mut self, message: &str, level: Level) {
        self.emit(Diagnostic {
            message: message.to_string(),
            level,
            location: None,
        });
    }
}

#[cfg(test)]
mod tests {
    use strip_ansi_escapes::strip_str;

    use super::*;
    use crate::parser::{parse_guard, parse_statement, Scope};

    #[test]
    fn test_parse_error_points_into_source() {
        let mut handler = DiagnosticHandler::new(ColorChoice::Always);
        let text = "y > 1";
        let fileid = handler.add_file("guard".to_string(), text.to_string());
        let err = parse_guard(text, &Scope::new()).unwrap_err();
        handler.emit_error(&err, Some(fileid));

        let content = strip_str(handler.error_string());
        assert!(content.starts_with("error: referencing undefined symbol: y"));
        assert!(content.contains("guard:1:1"));
        assert!(content.contains("y > 1"));
    }

    #[test]
    fn test_general_messages() {
        let mut handler = DiagnosticHandler::default();
        handler.emit_error(&IaError::UndefinedSystem("X".to_string()), None);
        handler.emit_general_message("2 error states in 'C'", Level::Warning);

        // statement errors without a registered file
        let err = parse_statement("product(P Q)").unwrap_err();
        handler.emit_error(&err, None);

        let content = handler.error_string();
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(lines[0], "error: undefined system `X`");
        assert_eq!(lines[1], "warning: 2 error states in 'C'");
        assert!(lines[2].starts_with("error: "));
    }
}
