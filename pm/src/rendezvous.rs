//! Leaderless rendezvous barrier
//!
//! Every participant raises its own signal, then waits until each peer has raised the
//! same signal. Nobody coordinates; whoever arrives last passes straight through.

use std::thread;
use std::time::{Duration, Instant};

use tracing::{debug, info, warn};

use crate::error::ShmError;
use crate::instance::Instance;

/// The two points every instance passes together
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Signal {
    /// Own slot and semaphore are ready for peers
    Initialized,
    /// Own slot is invalidated and will not be touched again
    Quit,
}

impl Signal {
    pub fn name(self) -> &'static str {
        match self {
            Signal::Initialized => "initialized",
            Signal::Quit => "quit",
        }
    }
}

/// Where participants post and observe signals
pub trait SignalBoard {
    /// Identity of the participant using this board
    fn instance(&self) -> Instance;

    /// Raise our own signal. Raising one that is already up is an error.
    fn raise(&self, signal: Signal) -> Result<(), ShmError>;

    /// Whether `peer` has raised `signal`
    fn is_raised(&self, peer: usize, signal: Signal) -> bool;
}

/// Polling schedule for barrier waits
#[derive(Debug, Clone, Copy)]
pub struct Rendezvous {
    initial: Duration,
    max: Duration,
    warn_every: Duration,
}

impl Default for Rendezvous {
    fn default() -> Self {
        Self::new(Duration::from_millis(100))
    }
}

impl Rendezvous {
    /// Back off from 1ms up to `max_poll` between checks
    pub fn new(max_poll: Duration) -> Self {
        Self {
            initial: Duration::from_millis(1).min(max_poll),
            max: max_poll,
            warn_every: Duration::from_secs(5),
        }
    }

    /// Change how often a slow peer is reported
    pub fn with_warn_every(mut self, warn_every: Duration) -> Self {
        self.warn_every = warn_every;
        self
    }

    /// Raise `signal` and block until every peer has raised it too
    pub fn arrive<B: SignalBoard + ?Sized>(&self, board: &B, signal: Signal) -> Result<(), ShmError> {
        let instance = board.instance();
        debug!(%instance, signal = signal.name(), "Rendezvous::arrive: called");
        board.raise(signal)?;
        for peer in instance.peers() {
            self.wait_for(board, peer, signal);
        }
        info!(%instance, signal = signal.name(), "All instances reached barrier");
        Ok(())
    }

    /// Block until `peer` has raised `signal`. There is no timeout: a peer that never
    /// arrives is reported periodically and waited on forever.
    pub fn wait_for<B: SignalBoard + ?Sized>(&self, board: &B, peer: usize, signal: Signal) {
        let started = Instant::now();
        let mut next_warning = self.warn_every;
        let mut delay = self.initial;

        while !board.is_raised(peer, signal) {
            thread::sleep(delay);
            delay = (delay * 2).min(self.max);

            let waited = started.elapsed();
            if waited >= next_warning {
                warn!(
                    peer,
                    signal = signal.name(),
                    waited_secs = waited.as_secs(),
                    "Still waiting for peer instance"
                );
                next_warning += self.warn_every;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryBoard;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicBool, Ordering};

    #[test]
    fn test_single_instance_passes_immediately() {
        let boards = MemoryBoard::cluster(1);
        let rendezvous = Rendezvous::new(Duration::from_millis(5));
        rendezvous.arrive(&boards[0], Signal::Initialized).unwrap();
        assert!(boards[0].is_raised(0, Signal::Initialized));
    }

    #[test]
    fn test_raising_twice_is_an_error() {
        let boards = MemoryBoard::cluster(1);
        let rendezvous = Rendezvous::new(Duration::from_millis(5));
        rendezvous.arrive(&boards[0], Signal::Quit).unwrap();
        assert!(matches!(
            rendezvous.arrive(&boards[0], Signal::Quit),
            Err(ShmError::FlagState { flag: "quit", state: true })
        ));
    }

    #[test]
    fn test_nobody_passes_until_everyone_arrives() {
        let boards = MemoryBoard::cluster(3);
        let rendezvous = Rendezvous::new(Duration::from_millis(2));
        let passed = Arc::new(AtomicBool::new(false));

        let mut handles = Vec::new();
        for board in boards.iter().take(2).cloned() {
            let passed = Arc::clone(&passed);
            handles.push(thread::spawn(move || {
                rendezvous.arrive(&board, Signal::Initialized).unwrap();
                passed.store(true, Ordering::SeqCst);
            }));
        }

        thread::sleep(Duration::from_millis(50));
        assert!(!passed.load(Ordering::SeqCst));

        rendezvous.arrive(&boards[2], Signal::Initialized).unwrap();
        for handle in handles {
            handle.join().unwrap();
        }
        assert!(passed.load(Ordering::SeqCst));
    }

    #[test]
    fn test_signals_are_independent() {
        let boards = MemoryBoard::cluster(2);
        boards[1].raise(Signal::Initialized).unwrap();
        assert!(boards[0].is_raised(1, Signal::Initialized));
        assert!(!boards[0].is_raised(1, Signal::Quit));
    }
}
