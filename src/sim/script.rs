//! Script scanning: whitespace-separated commands with rest-of-line
//! arguments.
//!
//! The script stream mixes two token styles: plain whitespace-separated
//! tokens that may continue across lines, and rest-of-current-line string
//! arguments (WKT geometry, plot titles, labels). The scanner supports
//! both; the command parser produces typed commands for the runner.

use std::io::BufRead;

use thiserror::Error;

/// Errors produced while reading the simulation script.
#[derive(Debug, Error)]
pub enum ScriptError {
    #[error("unknown script command \"{0}\"")]
    UnknownCommand(String),
    #[error("command \"{command}\" is missing its {what} argument")]
    MissingArgument {
        command: &'static str,
        what: &'static str,
    },
    #[error("command \"{command}\": invalid {what} \"{token}\"")]
    InvalidArgument {
        command: &'static str,
        what: &'static str,
        token: String,
    },
    #[error("failed to read script: {0}")]
    Io(#[from] std::io::Error),
}

/// A parsed script command.
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    PlaceAgent { x: f64, y: f64, heading: f64 },
    Goto { x: f64, y: f64 },
    TriggerReward { name: String },
    SeekReward { name: String, timestep_limit: i64 },
    SetArena { wkt: String },
    SetFence { name: String, wkt: String },
    SetTrialPhase { color: String, title: String },
    SetTitle { title: String },
    SetOrigin,
    SetArenaSize { size: f64 },
    SetScaleBars { count: i64 },
    AddLabel { x: f64, y: f64, text: String },
}

/// Pull scanner over a script stream.
pub struct ScriptScanner<R: BufRead> {
    reader: R,
    line: String,
}

impl<R: BufRead> ScriptScanner<R> {
    pub fn new(reader: R) -> Self {
        Self {
            reader,
            line: String::new(),
        }
    }

    /// The next whitespace-separated token, crossing line boundaries.
    fn next_token(&mut self) -> Result<Option<String>, ScriptError> {
        loop {
            let trimmed = self.line.trim_start();
            if trimmed.is_empty() {
                self.line.clear();
                if self.reader.read_line(&mut self.line)? == 0 {
                    return Ok(None);
                }
                continue;
            }
            let token_length = trimmed
                .find(char::is_whitespace)
                .unwrap_or(trimmed.len());
            let token = trimmed[..token_length].to_string();
            self.line = trimmed[token_length..].to_string();
            return Ok(Some(token));
        }
    }

    /// The remainder of the current line, leading/trailing whitespace
    /// stripped. Empty if the line is exhausted.
    fn rest_of_line(&mut self) -> String {
        let rest = self.line.trim().to_string();
        self.line.clear();
        rest
    }

    fn string_arg(
        &mut self,
        command: &'static str,
        what: &'static str,
    ) -> Result<String, ScriptError> {
        self.next_token()?
            .ok_or(ScriptError::MissingArgument { command, what })
    }

    fn number_arg<T: std::str::FromStr>(
        &mut self,
        command: &'static str,
        what: &'static str,
    ) -> Result<T, ScriptError> {
        let token = self.string_arg(command, what)?;
        token.parse().map_err(|_| ScriptError::InvalidArgument {
            command,
            what,
            token,
        })
    }

    /// Parses the next command, or `None` at the end of the script.
    pub fn next_command(&mut self) -> Result<Option<Command>, ScriptError> {
        let Some(command) = self.next_token()? else {
            return Ok(None);
        };
        let parsed = match command.as_str() {
            "place-agent" => Command::PlaceAgent {
                x: self.number_arg("place-agent", "x")?,
                y: self.number_arg("place-agent", "y")?,
                heading: self.number_arg("place-agent", "heading")?,
            },
            "goto" => Command::Goto {
                x: self.number_arg("goto", "x")?,
                y: self.number_arg("goto", "y")?,
            },
            "trigger-reward" => Command::TriggerReward {
                name: self.string_arg("trigger-reward", "name")?,
            },
            "seek-reward" => Command::SeekReward {
                name: self.string_arg("seek-reward", "name")?,
                timestep_limit: self.number_arg("seek-reward", "timestep limit")?,
            },
            "set-arena" => Command::SetArena {
                wkt: self.rest_of_line(),
            },
            "set-fence" => Command::SetFence {
                name: self.string_arg("set-fence", "name")?,
                wkt: self.rest_of_line(),
            },
            "set-trial-phase" => Command::SetTrialPhase {
                color: self.string_arg("set-trial-phase", "color")?,
                title: self.rest_of_line(),
            },
            "set-title" => Command::SetTitle {
                title: self.rest_of_line(),
            },
            "set-origin" => Command::SetOrigin,
            "set-arena-size" => Command::SetArenaSize {
                size: self.number_arg("set-arena-size", "size")?,
            },
            "set-scale-bars" => Command::SetScaleBars {
                count: self.number_arg("set-scale-bars", "count")?,
            },
            "add-label" => Command::AddLabel {
                x: self.number_arg("add-label", "x")?,
                y: self.number_arg("add-label", "y")?,
                text: self.rest_of_line(),
            },
            _ => return Err(ScriptError::UnknownCommand(command)),
        };
        Ok(Some(parsed))
    }
}
