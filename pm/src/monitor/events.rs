//! Terminal event handling
//!
//! Keyboard and resize events are polled on a blocking thread and forwarded over a
//! tokio channel, so the session loop can `select!` on them.

use std::time::Duration;

use crossterm::event::{self, KeyCode, KeyEvent, KeyEventKind, KeyModifiers};
use tokio::sync::mpsc;
use tracing::{debug, trace};

use super::Command;
use crate::quantity::Mode;

/// Terminal events
#[derive(Debug)]
pub enum Event {
    /// Key press
    Key(KeyEvent),
    /// Terminal resize
    Resize(u16, u16),
}

/// Event handler for the terminal view
pub struct EventHandler {
    rx: mpsc::UnboundedReceiver<Event>,
}

impl EventHandler {
    /// Start polling; `poll_rate` bounds how long the thread takes to notice shutdown
    pub fn new(poll_rate: Duration) -> Self {
        debug!(?poll_rate, "EventHandler::new: called");
        let (tx, rx) = mpsc::unbounded_channel();

        std::thread::spawn(move || {
            debug!("EventHandler: event polling thread started");
            loop {
                if tx.is_closed() {
                    break;
                }
                if !event::poll(poll_rate).unwrap_or(false) {
                    continue;
                }
                let event = match event::read() {
                    Ok(event::Event::Key(key)) => {
                        trace!(?key, "EventHandler: key event received");
                        Event::Key(key)
                    }
                    Ok(event::Event::Resize(w, h)) => Event::Resize(w, h),
                    Ok(_) => continue,
                    Err(e) => {
                        debug!(error = %e, "EventHandler: read failed, exiting loop");
                        break;
                    }
                };
                if tx.send(event).is_err() {
                    break;
                }
            }
            debug!("EventHandler: event polling thread exiting");
        });

        Self { rx }
    }

    /// Next event; `None` once the polling thread has gone
    pub async fn next(&mut self) -> Option<Event> {
        self.rx.recv().await
    }
}

/// Map a key press to a command. Letters are case-insensitive; Ctrl-C quits.
pub fn command_for_key(key: KeyEvent) -> Option<Command> {
    if key.kind != KeyEventKind::Press {
        return None;
    }
    let KeyCode::Char(c) = key.code else {
        return None;
    };
    if key.modifiers.contains(KeyModifiers::CONTROL) {
        return matches!(c, 'c' | 'C').then_some(Command::Quit);
    }
    match c.to_ascii_lowercase() {
        'q' => Some(Command::Quit),
        'c' => Some(Command::SetMode(Mode::Count)),
        'f' => Some(Command::SetMode(Mode::FitTest)),
        'x' => Some(Command::Reset),
        _ => None,
    }
}
