//! Operator commands

use std::path::PathBuf;
use stride_control::{Mode, UnknownMode};
use thiserror::Error;

/// Commands typed by the operator
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    SetMode(Mode),
    Load(PathBuf),
    Play,
    Stop,
    Status,
    Help,
    Quit,
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum CommandError {
    #[error("empty command")]
    Empty,
    #[error("unknown command: {0}")]
    Unknown(String),
    #[error("{0} needs an argument")]
    MissingArgument(&'static str),
    #[error(transparent)]
    Mode(#[from] UnknownMode),
}

pub const HELP: &str = "\
Commands:
  mode <resting|warmup|workout|slowdown>  switch training mode
  load <path>                             decode a track and measure its tempo
  play                                    play the loaded track from the start
  stop                                    stop playback
  status                                  show mode, speed, cadence and heart rate
  help                                    show this help
  quit                                    exit";

impl Command {
    /// Parse one line of operator input
    pub fn parse(input: &str) -> Result<Self, CommandError> {
        let input = input.trim();
        if input.is_empty() {
            return Err(CommandError::Empty);
        }

        let (word, rest) = match input.split_once(char::is_whitespace) {
            Some((word, rest)) => (word, rest.trim()),
            None => (input, ""),
        };

        match word.to_ascii_lowercase().as_str() {
            "q" | "quit" | "exit" => Ok(Command::Quit),
            "play" => Ok(Command::Play),
            "stop" => Ok(Command::Stop),
            "status" => Ok(Command::Status),
            "help" | "?" => Ok(Command::Help),
            "mode" => {
                if rest.is_empty() {
                    return Err(CommandError::MissingArgument("mode"));
                }
                Ok(Command::SetMode(rest.parse()?))
            }
            "load" => {
                let path = strip_quotes(rest);
                if path.is_empty() {
                    return Err(CommandError::MissingArgument("load"));
                }
                Ok(Command::Load(path.into()))
            }
            // Mode names on their own switch mode too
            _ => input
                .parse::<Mode>()
                .map(Command::SetMode)
                .map_err(|_| CommandError::Unknown(input.to_string())),
        }
    }
}

/// Remove one pair of surrounding quotes, if present
fn strip_quotes(path: &str) -> &str {
    let path = path.trim();
    if path.len() >= 2
        && ((path.starts_with('\'') && path.ends_with('\''))
            || (path.starts_with('"') && path.ends_with('"')))
    {
        &path[1..path.len() - 1]
    } else {
        path
    }
}
