use crate::service::driver::Command;
use crossterm::{
    event::{self, Event, KeyCode, KeyEvent, KeyEventKind, KeyModifiers},
    terminal,
};
use std::io::{self, Write};
use std::time::Duration;

pub const KEY_HELP: &str = "[s] start camera  [a] authenticate  [r] register photo  [x] stop camera  [q] quit";

#[derive(Debug, Clone, PartialEq)]
pub enum KeyAction {
    Send(Command),
    Quit,
}

/// Raw terminal mode for the lifetime of the guard.
pub struct RawMode;

impl RawMode {
    pub fn enable() -> io::Result<Self> {
        terminal::enable_raw_mode()?;
        Ok(Self)
    }
}

impl Drop for RawMode {
    fn drop(&mut self) {
        let _ = terminal::disable_raw_mode();
    }
}

pub fn action_for(key: KeyEvent) -> Option<KeyAction> {
    if key.kind == KeyEventKind::Release {
        return None;
    }
    if key.modifiers.contains(KeyModifiers::CONTROL) && key.code == KeyCode::Char('c') {
        return Some(KeyAction::Quit);
    }
    match key.code {
        KeyCode::Char('s') | KeyCode::Char('S') => Some(KeyAction::Send(Command::StartCamera)),
        KeyCode::Char('a') | KeyCode::Char('A') | KeyCode::Enter => Some(KeyAction::Send(Command::Authenticate)),
        KeyCode::Char('r') | KeyCode::Char('R') => Some(KeyAction::Send(Command::Register)),
        KeyCode::Char('x') | KeyCode::Char('X') => Some(KeyAction::Send(Command::StopCamera)),
        KeyCode::Char('q') | KeyCode::Char('Q') | KeyCode::Esc => Some(KeyAction::Quit),
        _ => None,
    }
}

/// Wait up to `timeout` for a mapped key press.
pub fn poll_action(timeout: Duration) -> io::Result<Option<KeyAction>> {
    if event::poll(timeout)? {
        if let Event::Key(key) = event::read()? {
            return Ok(action_for(key));
        }
    }
    Ok(None)
}

/// Print one line; raw mode needs the explicit carriage return.
pub fn print_line(text: &str) {
    let mut out = io::stdout();
    let _ = write!(out, "{}\r\n", text);
    let _ = out.flush();
}

#[cfg(test)]
mod tests {
    use super::*;

    fn press(code: KeyCode) -> KeyEvent {
        KeyEvent::new(code, KeyModifiers::NONE)
    }

    #[test]
    fn maps_session_keys() {
        assert_eq!(action_for(press(KeyCode::Char('a'))), Some(KeyAction::Send(Command::Authenticate)));
        assert_eq!(action_for(press(KeyCode::Char('X'))), Some(KeyAction::Send(Command::StopCamera)));
        assert_eq!(action_for(press(KeyCode::Esc)), Some(KeyAction::Quit));
        assert_eq!(action_for(press(KeyCode::Char('z'))), None);
    }

    #[test]
    fn ctrl_c_quits() {
        let key = KeyEvent::new(KeyCode::Char('c'), KeyModifiers::CONTROL);
        assert_eq!(action_for(key), Some(KeyAction::Quit));
    }
}
