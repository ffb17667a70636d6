//! Recovery console and batch runner.

use std::fs::File;
use std::io::{self, BufRead, Write};
use std::path::Path;

use anyhow::{Context, Result, bail};
use irecv_core::protocol::AUTOBOOT_SEQUENCE;
use irecv_core::script::{CONSOLE_HELP, parse_script};
use irecv_core::{ConsoleCommand, DeviceSession, Finalize, IrecvObserver, ScriptLine, UsbTransport};
use tracing::{error, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Flow {
    Continue,
    Exit,
}

/// Enable auto-boot, failing if any of the commands did not go out.
pub fn autoboot<T: UsbTransport, O: IrecvObserver>(session: &DeviceSession<T, O>) -> Result<()> {
    let failures = session.enable_autoboot();
    if !failures.is_empty() {
        bail!(
            "{} of {} auto-boot commands failed",
            failures.len(),
            AUTOBOOT_SEQUENCE.len()
        );
    }
    Ok(())
}

/// Attach to the console and run it until `/exit`, `reboot` or end of input.
pub fn run_console<T: UsbTransport, O: IrecvObserver>(
    session: &mut DeviceSession<T, O>,
    logfile: Option<&Path>,
) -> Result<()> {
    session
        .claim_console_interface()
        .context("Unable to attach to the recovery console")?;

    let mut log = logfile
        .map(|path| {
            File::create(path)
                .with_context(|| format!("Unable to open log file {}", path.display()))
        })
        .transpose()?;
    if let Some(path) = logfile {
        info!(path = %path.display(), "Console output being logged");
    }

    let stdin = io::stdin();
    let mut stdout = io::stdout();
    let mut line = String::new();

    loop {
        let output = session.console_read()?;
        if !output.is_empty() {
            stdout.write_all(&output)?;
            if let Some(log) = log.as_mut() {
                log.write_all(&output)?;
            }
        }

        write!(stdout, "iRecovery> ")?;
        stdout.flush()?;

        line.clear();
        if stdin.lock().read_line(&mut line)? == 0 {
            break;
        }
        let input = line.trim_end_matches(['\r', '\n']);
        if let Some(log) = log.as_mut() {
            writeln!(log, ">{}", input)?;
        }

        if handle_input(session, input)? == Flow::Exit {
            break;
        }
    }

    Ok(())
}

fn handle_input<T: UsbTransport, O: IrecvObserver>(
    session: &mut DeviceSession<T, O>,
    input: &str,
) -> Result<Flow> {
    if input.trim().is_empty() {
        return Ok(Flow::Continue);
    }

    match ScriptLine::parse(input) {
        Ok(ScriptLine::Comment) => Ok(Flow::Continue),
        Ok(ScriptLine::Console(command)) => Ok(execute_reported(session, &command)),
        Ok(ScriptLine::Device(text)) => device_command(session, &text),
        Err(e) => {
            warn!("{}", e);
            Ok(Flow::Continue)
        }
    }
}

/// Send a console line to the device, printing the reply to `getenv`.
fn device_command<T: UsbTransport, O: IrecvObserver>(
    session: &DeviceSession<T, O>,
    text: &str,
) -> Result<Flow> {
    if let Err(e) = session.send_command(text) {
        error!("Command failed: {}", e);
        return Ok(Flow::Continue);
    }

    match text.split_whitespace().next() {
        Some("getenv") => {
            match session.read_env_response() {
                Ok(value) => println!("Env: {}", value),
                Err(e) => warn!("No environment reply: {}", e),
            }
            Ok(Flow::Continue)
        }
        Some("reboot") => Ok(Flow::Exit),
        _ => Ok(Flow::Continue),
    }
}

fn execute_reported<T: UsbTransport, O: IrecvObserver>(
    session: &mut DeviceSession<T, O>,
    command: &ConsoleCommand,
) -> Flow {
    execute(session, command).unwrap_or_else(|e| {
        error!("{} failed: {:#}", command, e);
        Flow::Continue
    })
}

fn execute<T: UsbTransport, O: IrecvObserver>(
    session: &mut DeviceSession<T, O>,
    command: &ConsoleCommand,
) -> Result<Flow> {
    match command {
        ConsoleCommand::Help => println!("{}", CONSOLE_HELP),
        ConsoleCommand::Exit => return Ok(Flow::Exit),
        ConsoleCommand::Send(path) => session.send(path, Finalize::None)?,
        ConsoleCommand::Upload(path) => session.upload(path)?,
        ConsoleCommand::Exploit(payload) => session.exploit(payload.as_deref())?,
        ConsoleCommand::Batch(path) => run_batch(session, Path::new(path))?,
        ConsoleCommand::AutoBoot => autoboot(session)?,
    }
    Ok(Flow::Continue)
}

/// Run every line of a batch file. `/exit` stops the batch early.
pub fn run_batch<T: UsbTransport, O: IrecvObserver>(
    session: &mut DeviceSession<T, O>,
    path: &Path,
) -> Result<()> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("Unable to find batch file {}", path.display()))?;

    for (number, line) in parse_script(&text).into_iter().enumerate() {
        match line {
            Ok(ScriptLine::Comment) => {}
            Ok(ScriptLine::Console(command)) => {
                info!("Running command: {}", command);
                if execute_reported(session, &command) == Flow::Exit {
                    break;
                }
            }
            Ok(ScriptLine::Device(text)) => {
                if let Err(e) = session.send_command(&text) {
                    error!(line = number + 1, "Command failed: {}", e);
                }
            }
            Err(e) => warn!(line = number + 1, "{}", e),
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use irecv_core::protocol::{ControlSetup, DeviceMode, REQ_COMMAND};
    use irecv_core::{MockTransport, NullObserver, SessionConfig};

    use super::*;

    fn session() -> (DeviceSession<MockTransport, NullObserver>, MockTransport) {
        let mock = MockTransport::new();
        let session = DeviceSession::from_transport(
            mock.clone(),
            DeviceMode::Recovery,
            SessionConfig::default(),
            Arc::new(NullObserver),
        );
        (session, mock)
    }

    fn sent_commands(mock: &MockTransport) -> Vec<Vec<u8>> {
        mock.control_outs()
            .into_iter()
            .filter(|(setup, _)| *setup == ControlSetup::command())
            .map(|(_, data)| data)
            .collect()
    }

    #[test]
    fn test_batch_file() {
        let (mut session, mock) = session();
        let path = std::env::temp_dir().join(format!("irecv-batch-{}.txt", std::process::id()));
        std::fs::write(
            &path,
            "// prepare\r\nsetenv auto-boot false\r\n/bogus\n/auto-boot\n/exit\nsaveenv\n",
        )
        .unwrap();

        run_batch(&mut session, &path).unwrap();
        std::fs::remove_file(&path).unwrap();

        assert_eq!(
            sent_commands(&mock),
            vec![
                b"setenv auto-boot false\0".to_vec(),
                b"setenv auto-boot true\0".to_vec(),
                b"saveenv\0".to_vec(),
                b"reboot\0".to_vec(),
            ]
        );
    }

    #[test]
    fn test_missing_batch_file() {
        let (mut session, mock) = session();
        assert!(run_batch(&mut session, Path::new("/nonexistent/run.txt")).is_err());
        assert!(mock.calls().is_empty());
    }

    #[test]
    fn test_getenv_reads_reply() {
        let (mut session, mock) = session();
        mock.queue_control_in(REQ_COMMAND, b"n88ap\0\0\0");
        assert_eq!(handle_input(&mut session, "getenv build-style").unwrap(), Flow::Continue);
        assert_eq!(mock.control_in_count(REQ_COMMAND), 1);
    }

    #[test]
    fn test_missing_env_reply_keeps_console() {
        let (mut session, mock) = session();
        let flow = handle_input(&mut session, "getenv nonexistent-var").unwrap();
        assert_eq!(flow, Flow::Continue);
        assert_eq!(sent_commands(&mock), vec![b"getenv nonexistent-var\0".to_vec()]);
        assert!(session.is_open());
    }

    #[test]
    fn test_reboot_and_exit_end_console() {
        let (mut session, _mock) = session();
        assert_eq!(handle_input(&mut session, "reboot").unwrap(), Flow::Exit);
        assert_eq!(handle_input(&mut session, "/exit").unwrap(), Flow::Exit);
        assert_eq!(handle_input(&mut session, "/help").unwrap(), Flow::Continue);
        assert_eq!(handle_input(&mut session, "").unwrap(), Flow::Continue);
    }

    #[test]
    fn test_failed_console_command_keeps_console() {
        let (mut session, mock) = session();
        let flow = handle_input(&mut session, "/upload /nonexistent/payload.bin").unwrap();
        assert_eq!(flow, Flow::Continue);
        assert!(mock.calls().is_empty());
    }
}
