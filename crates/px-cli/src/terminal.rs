//! Local terminal: raw mode, size and key input

use std::io::{self, Write};
use std::time::Duration;

use anyhow::Result;
use crossterm::event::{self, Event, KeyCode, KeyEvent, KeyEventKind, KeyModifiers};
use crossterm::terminal::{disable_raw_mode, enable_raw_mode};
use tokio::sync::mpsc;

use px_core::traits::TerminalSizeSource;
use px_protocol::TerminalSize;
use px_relay::Session;

/// Terminal events buffered between the input thread and the console loop
const EVENT_CHANNEL_CAPACITY: usize = 256;

/// How often the input thread checks whether the console loop is gone
const EVENT_POLL_INTERVAL: Duration = Duration::from_millis(10);

/// Keeps the terminal in raw mode until dropped
pub struct RawModeGuard(());

impl RawModeGuard {
    pub fn enable() -> io::Result<Self> {
        enable_raw_mode()?;
        Ok(Self(()))
    }
}

impl Drop for RawModeGuard {
    fn drop(&mut self) {
        let _ = disable_raw_mode();
    }
}

/// Size of the controlling terminal, or 24x80 when it cannot be queried
#[derive(Debug, Clone, Copy, Default)]
pub struct CrosstermSize;

impl TerminalSizeSource for CrosstermSize {
    fn current_size(&self) -> TerminalSize {
        match crossterm::terminal::size() {
            Ok((cols, rows)) if cols > 0 && rows > 0 => TerminalSize::new(rows, cols),
            _ => TerminalSize::default(),
        }
    }
}

/// What a key press means for the console
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KeyAction {
    /// Bytes to send to the remote terminal
    Send(Vec<u8>),
    /// Leave the console (Ctrl+])
    Detach,
    Ignore,
}

/// Why the console loop ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitReason {
    Detached,
    ConsoleClosed,
    InputClosed,
}

/// Relay the local terminal through `session` until the user detaches or
/// the console ends, then close the session.
pub async fn run_console(mut session: Session) -> Result<ExitReason> {
    let mut inbound = session
        .inbound()
        .ok_or_else(|| anyhow::anyhow!("console output already taken"))?;
    let mut errors = session.errors();

    let guard = RawModeGuard::enable()?;
    let mut stdout = io::stdout();

    let (event_tx, mut event_rx) = mpsc::channel::<Event>(EVENT_CHANNEL_CAPACITY);
    let input = tokio::task::spawn_blocking(move || {
        while !event_tx.is_closed() {
            if event::poll(EVENT_POLL_INTERVAL).unwrap_or(false) {
                match event::read() {
                    Ok(evt) => {
                        if event_tx.blocking_send(evt).is_err() {
                            break;
                        }
                    }
                    Err(_) => break,
                }
            }
        }
    });

    let reason = loop {
        tokio::select! {
            evt = event_rx.recv() => {
                let Some(evt) = evt else {
                    break ExitReason::InputClosed;
                };
                let bytes = match evt {
                    Event::Key(key) => match key_action(key) {
                        KeyAction::Send(bytes) => bytes,
                        KeyAction::Detach => break ExitReason::Detached,
                        KeyAction::Ignore => continue,
                    },
                    Event::Paste(text) => text.into_bytes(),
                    // Size changes are picked up by the session's watcher
                    _ => continue,
                };
                if session.send(bytes).is_err() {
                    break ExitReason::ConsoleClosed;
                }
            }

            output = inbound.recv() => {
                let Some(output) = output else {
                    break ExitReason::ConsoleClosed;
                };
                stdout.write_all(&output)?;
                stdout.flush()?;
            }

            Some(error) = next_error(&mut errors) => {
                tracing::warn!("{}", error);
            }
        }
    };

    drop(event_rx);
    let _ = input.await;
    drop(guard);

    session.close().await?;
    Ok(reason)
}

/// Next reported error, ending when the error sequence is exhausted
async fn next_error(errors: &mut Option<px_relay::ErrorStream>) -> Option<px_core::RelayError> {
    let stream = errors.as_mut()?;
    let error = stream.recv().await;
    if error.is_none() {
        *errors = None;
    }
    error
}

/// Translate a key event into what the console should do with it
pub fn key_action(key: KeyEvent) -> KeyAction {
    if key.kind == KeyEventKind::Release {
        return KeyAction::Ignore;
    }
    let KeyEvent {
        code, modifiers, ..
    } = key;

    if modifiers.contains(KeyModifiers::CONTROL) && code == KeyCode::Char(']') {
        return KeyAction::Detach;
    }

    let bytes = key_to_bytes(code, modifiers);
    if bytes.is_empty() {
        KeyAction::Ignore
    } else {
        KeyAction::Send(bytes)
    }
}

/// Convert a key to the bytes a terminal would send for it
fn key_to_bytes(code: KeyCode, modifiers: KeyModifiers) -> Vec<u8> {
    use KeyCode::*;

    match code {
        Char(c) => {
            if modifiers.contains(KeyModifiers::CONTROL) {
                match c.to_ascii_lowercase() {
                    // Ctrl+A = 0x01 through Ctrl+Z = 0x1a
                    l @ 'a'..='z' => vec![l as u8 - b'a' + 1],
                    '@' | ' ' => vec![0x00],
                    '[' => vec![0x1b],
                    '\\' => vec![0x1c],
                    '^' => vec![0x1e],
                    '_' => vec![0x1f],
                    _ => c.to_string().into_bytes(),
                }
            } else if modifiers.contains(KeyModifiers::ALT) {
                let mut bytes = vec![0x1b];
                bytes.extend_from_slice(c.to_string().as_bytes());
                bytes
            } else {
                c.to_string().into_bytes()
            }
        }
        Enter => vec![b'\r'],
        Tab => vec![b'\t'],
        BackTab => b"\x1b[Z".to_vec(),
        Backspace => vec![0x7f],
        Esc => vec![0x1b],
        Up => b"\x1b[A".to_vec(),
        Down => b"\x1b[B".to_vec(),
        Right => b"\x1b[C".to_vec(),
        Left => b"\x1b[D".to_vec(),
        Home => b"\x1b[H".to_vec(),
        End => b"\x1b[F".to_vec(),
        PageUp => b"\x1b[5~".to_vec(),
        PageDown => b"\x1b[6~".to_vec(),
        Delete => b"\x1b[3~".to_vec(),
        Insert => b"\x1b[2~".to_vec(),
        F(n) => match n {
            1 => b"\x1bOP".to_vec(),
            2 => b"\x1bOQ".to_vec(),
            3 => b"\x1bOR".to_vec(),
            4 => b"\x1bOS".to_vec(),
            5 => b"\x1b[15~".to_vec(),
            6 => b"\x1b[17~".to_vec(),
            7 => b"\x1b[18~".to_vec(),
            8 => b"\x1b[19~".to_vec(),
            9 => b"\x1b[20~".to_vec(),
            10 => b"\x1b[21~".to_vec(),
            11 => b"\x1b[23~".to_vec(),
            12 => b"\x1b[24~".to_vec(),
            _ => vec![],
        },
        _ => vec![],
    }
}
