//! # Audio Module
//!
//! Per-guild playback engine for the bot.
//!
//! Every guild with something to play owns exactly one
//! [`session::PlaybackSession`]: a FIFO of pending requests, the voice
//! connection, and a single consumer task that pulls from the queue,
//! resolves each request and streams it until the track ends.
//!
//! ## Architecture
//!
//! ### [`registry`] - Session Registry
//! - One session per guild, created lazily on the first enqueue
//! - Concurrent first enqueues share a single connect
//! - Entries are removed by the consumer when it finishes teardown
//!
//! ### [`consumer`] - Consumer Loop
//! - `Idle -> Resolving -> Playing <-> Paused -> Cleaning`
//! - The only writer of the session state
//! - Idle sessions close themselves after [`PlayerSettings::idle_timeout`]
//!
//! ### [`controls`] - Control Surface
//! - `enqueue`, `pause`, `resume`, `skip`, `stop`, `queue`, `now_playing`
//! - Controls never touch the state directly, they send commands to the consumer
//!
//! ### [`transport`] / [`voice`] - Voice Transport
//! - [`transport::Transport`] is the seam, [`voice::SongbirdTransport`] the real one
//! - Track completion arrives through a one-shot [`transport::CompletionSignal`]
//!
//! ## Failure Policy
//!
//! | Failure | Effect |
//! |---------|--------|
//! | resolver error | announce, skip to the next request |
//! | `play` error | announce, skip; `ConnectionDenied` ends the session |
//! | connect error | the enqueue fails, no session is registered |

pub mod consumer;
pub mod controls;
pub mod error;
pub mod events;
pub mod queue;
pub mod registry;
pub mod session;
pub mod transport;
pub mod voice;

#[cfg(test)]
pub(crate) mod test_support;

use std::time::Duration;

pub use controls::{EnqueueReceipt, PlayerControls};
pub use error::{ControlAction, ControlError, FailureKind, MediaError};
pub use events::{EventSink, Notice, SessionEvent, SessionExit};
pub use queue::PlaybackRequest;
pub use registry::SessionRegistry;
pub use session::{NowPlaying, PlaybackSession, PlaybackState, SessionState};
pub use transport::{CompletionSignal, TrackOutcome, Transport, VoiceConnection};
pub use voice::SongbirdTransport;

/// Parámetros del motor de reproducción
#[derive(Debug, Clone)]
pub struct PlayerSettings {
    /// Tiempo que una sesión puede quedar inactiva antes de cerrarse
    pub idle_timeout: Duration,
    /// Órdenes de control que pueden esperar al consumidor
    pub command_capacity: usize,
}

impl Default for PlayerSettings {
    fn default() -> Self {
        Self {
            idle_timeout: Duration::from_secs(300),
            command_capacity: 16,
        }
    }
}
