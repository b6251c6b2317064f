use serenity::model::id::{ChannelId, GuildId};

use super::{
    error::MediaError,
    queue::PlaybackRequest,
    session::NowPlaying,
    transport::TrackOutcome,
};
use crate::sources::ResolvedTrack;

/// Por qué terminó una sesión
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionExit {
    IdleTimeout,
    Stopped,
    Aborted(String),
}

/// Eventos que publica el consumidor de una sesión
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    TrackStarted(NowPlaying),
    TrackFailed {
        request: PlaybackRequest,
        error: MediaError,
    },
    TrackFinished {
        track: ResolvedTrack,
        outcome: TrackOutcome,
    },
    SessionEnded {
        exit: SessionExit,
        dropped: usize,
    },
}

/// Aviso dirigido a un canal de texto de un servidor
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notice {
    pub guild_id: GuildId,
    pub channel_id: Option<ChannelId>,
    pub event: SessionEvent,
}

/// Receptor de avisos. `publish` no debe bloquear al consumidor.
pub trait EventSink: Send + Sync {
    fn publish(&self, notice: Notice);
}
