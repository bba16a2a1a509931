//! Keyboard input decoding for the interactive frontend.
//!
//! Crossterm events collapse into the small key space the controller
//! dispatches on. Alt-modified characters become [`Key::Meta`], matching
//! the flag-toggle prefix; CTRL-letters become [`Key::Ctrl`] with the
//! lowercase letter.

use std::io;
use std::time::Duration;

use crossterm::event::{self, Event, KeyCode, KeyEventKind, KeyModifiers};

/// One decoded keystroke.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Key {
    /// Printable character, unmodified or shifted.
    Char(char),
    /// CTRL plus a lowercase letter or symbol.
    Ctrl(char),
    /// Alt (meta) plus a character.
    Meta(char),
    /// Alt plus an arrow key.
    MetaArrow(Arrow),
    Esc,
    Enter,
    Backspace,
    Delete,
    Tab,
    BackTab,
    Arrow(Arrow),
    PageUp,
    PageDown,
    Home,
    End,
    Fn(u8),
    /// The terminal reported a resize.
    Resize,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Arrow {
    Up,
    Down,
    Left,
    Right,
}

/// Polls for a key, returning `None` when `timeout` elapses first.
pub fn poll_key(timeout: Duration) -> io::Result<Option<Key>> {
    if !event::poll(timeout)? {
        return Ok(None);
    }
    read_key()
}

/// Reads one pending event; key releases and unmapped events yield `None`.
pub fn read_key() -> io::Result<Option<Key>> {
    match event::read()? {
        Event::Key(key) if key.kind != KeyEventKind::Release => Ok(decode(key.code, key.modifiers)),
        Event::Resize(..) => Ok(Some(Key::Resize)),
        _ => Ok(None),
    }
}

/// Blocks until a key arrives.
pub fn wait_key() -> io::Result<Key> {
    loop {
        if let Some(key) = read_key()? {
            return Ok(key);
        }
    }
}

/// True when a key is already pending (zero-timeout poll).
pub fn key_pending() -> bool {
    event::poll(Duration::ZERO).unwrap_or(false)
}

fn decode(code: KeyCode, mods: KeyModifiers) -> Option<Key> {
    let alt = mods.contains(KeyModifiers::ALT);
    let ctrl = mods.contains(KeyModifiers::CONTROL);
    let arrow = |a: Arrow| {
        if alt {
            Key::MetaArrow(a)
        } else {
            Key::Arrow(a)
        }
    };
    Some(match code {
        KeyCode::Char(c) if ctrl => Key::Ctrl(c.to_ascii_lowercase()),
        KeyCode::Char(c) if alt => Key::Meta(c),
        KeyCode::Char(c) => Key::Char(c),
        KeyCode::Esc => Key::Esc,
        KeyCode::Enter => Key::Enter,
        KeyCode::Backspace => Key::Backspace,
        KeyCode::Delete => Key::Delete,
        KeyCode::Tab => Key::Tab,
        KeyCode::BackTab => Key::BackTab,
        KeyCode::Up => arrow(Arrow::Up),
        KeyCode::Down => arrow(Arrow::Down),
        KeyCode::Left => arrow(Arrow::Left),
        KeyCode::Right => arrow(Arrow::Right),
        KeyCode::PageUp => Key::PageUp,
        KeyCode::PageDown => Key::PageDown,
        KeyCode::Home => Key::Home,
        KeyCode::End => Key::End,
        KeyCode::F(n) => Key::Fn(n),
        _ => return None,
    })
}
