//! Console and batch-script command parsing.
//!
//! Console lines starting with `/` are tool commands; everything else is
//! forwarded to the device. Batch files follow the same rule, with `//`
//! marking a comment.

use std::fmt;
use std::str::FromStr;

use thiserror::Error;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum ScriptError {
    #[error("Unknown command: {0}")]
    UnknownCommand(String),
    #[error("Command /{command} needs a {argument} argument")]
    MissingArgument {
        command: &'static str,
        argument: &'static str,
    },
    #[error("Empty command")]
    Empty,
}

/// A tool command, as typed after the leading `/`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConsoleCommand {
    Help,
    Exit,
    Send(String),
    Upload(String),
    Exploit(Option<String>),
    Batch(String),
    AutoBoot,
}

impl FromStr for ConsoleCommand {
    type Err = ScriptError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut words = s.split_whitespace();
        let action = words.next().ok_or(ScriptError::Empty)?;
        let argument = words.next().map(str::to_string);

        let required = |command: &'static str| {
            argument.clone().ok_or(ScriptError::MissingArgument {
                command,
                argument: "file",
            })
        };

        match action {
            "help" => Ok(ConsoleCommand::Help),
            "exit" => Ok(ConsoleCommand::Exit),
            "send" => required("send").map(ConsoleCommand::Send),
            "upload" => required("upload").map(ConsoleCommand::Upload),
            "exploit" => Ok(ConsoleCommand::Exploit(argument.clone())),
            "batch" => required("batch").map(ConsoleCommand::Batch),
            "auto-boot" => Ok(ConsoleCommand::AutoBoot),
            other => Err(ScriptError::UnknownCommand(other.to_string())),
        }
    }
}

impl fmt::Display for ConsoleCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConsoleCommand::Help => write!(f, "/help"),
            ConsoleCommand::Exit => write!(f, "/exit"),
            ConsoleCommand::Send(path) => write!(f, "/send {}", path),
            ConsoleCommand::Upload(path) => write!(f, "/upload {}", path),
            ConsoleCommand::Exploit(Some(path)) => write!(f, "/exploit {}", path),
            ConsoleCommand::Exploit(None) => write!(f, "/exploit"),
            ConsoleCommand::Batch(path) => write!(f, "/batch {}", path),
            ConsoleCommand::AutoBoot => write!(f, "/auto-boot"),
        }
    }
}

/// Help text listing the console commands.
pub const CONSOLE_HELP: &str = "\
Commands:
\t/exit\t\t\texit from recovery console.
\t/send <file>\t\tsend file to device.
\t/upload <file>\t\tupload file to device.
\t/exploit [payload]\tsend usb exploit packet.
\t/batch <file>\t\texecute commands from a batch file.
\t/auto-boot\t\tenable auto-boot (exit recovery loop).";

/// One line of console input or a batch file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScriptLine {
    Comment,
    Console(ConsoleCommand),
    Device(String),
}

impl ScriptLine {
    /// Classify one line.
    ///
    /// Trailing CR/LF is stripped from every line, so a device line carries
    /// the text without its terminator; the command channel appends the NUL.
    pub fn parse(line: &str) -> Result<Self, ScriptError> {
        let line = line.trim_end_matches(['\r', '\n']);
        if line.starts_with("//") {
            Ok(ScriptLine::Comment)
        } else if let Some(command) = line.strip_prefix('/') {
            command.parse().map(ScriptLine::Console)
        } else {
            Ok(ScriptLine::Device(line.to_string()))
        }
    }
}

/// Parse a batch file body, one result per line.
pub fn parse_script(text: &str) -> Vec<Result<ScriptLine, ScriptError>> {
    text.lines().map(ScriptLine::parse).collect()
}
