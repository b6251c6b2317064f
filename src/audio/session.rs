use chrono::{DateTime, Utc};
use serenity::model::id::{ChannelId, GuildId};
use std::fmt;
use tokio::sync::{mpsc, oneshot, watch};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use super::{
    error::{ControlAction, ControlError},
    queue::{PlaybackRequest, RequestQueue},
};
use crate::sources::ResolvedTrack;

/// Estado del consumidor, sin datos asociados
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    Resolving,
    Playing,
    Paused,
    Cleaning,
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            SessionState::Idle => "inactivo",
            SessionState::Resolving => "buscando",
            SessionState::Playing => "reproduciendo",
            SessionState::Paused => "en pausa",
            SessionState::Cleaning => "cerrándose",
        };
        f.write_str(label)
    }
}

/// Lo que suena ahora mismo y quién lo pidió
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NowPlaying {
    pub track: ResolvedTrack,
    pub request: PlaybackRequest,
    pub started_at: DateTime<Utc>,
}

/// Estado publicado por el consumidor.
///
/// El track actual solo existe dentro de `Playing` y `Paused`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlaybackState {
    Idle { since: DateTime<Utc> },
    Resolving { request: PlaybackRequest },
    Playing(NowPlaying),
    Paused(NowPlaying),
    Cleaning,
}

impl PlaybackState {
    pub fn idle() -> Self {
        PlaybackState::Idle { since: Utc::now() }
    }

    pub fn kind(&self) -> SessionState {
        match self {
            PlaybackState::Idle { .. } => SessionState::Idle,
            PlaybackState::Resolving { .. } => SessionState::Resolving,
            PlaybackState::Playing(_) => SessionState::Playing,
            PlaybackState::Paused(_) => SessionState::Paused,
            PlaybackState::Cleaning => SessionState::Cleaning,
        }
    }

    pub fn now_playing(&self) -> Option<&NowPlaying> {
        match self {
            PlaybackState::Playing(now) | PlaybackState::Paused(now) => Some(now),
            _ => None,
        }
    }
}

/// Orden de control enviada al consumidor, con su canal de respuesta
#[derive(Debug)]
pub(crate) struct ControlCommand {
    pub action: ControlAction,
    pub reply: oneshot::Sender<Result<(), ControlError>>,
}

/// Sesión de reproducción de un servidor.
///
/// Los productores solo encolan o mandan órdenes; el estado lo escribe
/// únicamente la tarea consumidora.
#[derive(Debug)]
pub struct PlaybackSession {
    guild_id: GuildId,
    home_channel: Option<ChannelId>,
    created_at: DateTime<Utc>,
    pub(crate) queue: RequestQueue,
    state: watch::Receiver<PlaybackState>,
    commands: mpsc::Sender<ControlCommand>,
    cancel: CancellationToken,
    terminated: CancellationToken,
}

/// Extremos que se quedan con la tarea consumidora
pub(crate) struct ConsumerEnds {
    pub state: watch::Sender<PlaybackState>,
    pub commands: mpsc::Receiver<ControlCommand>,
}

impl PlaybackSession {
    pub(crate) fn new(
        guild_id: GuildId,
        home_channel: Option<ChannelId>,
        command_capacity: usize,
    ) -> (Self, ConsumerEnds) {
        let (state_tx, state_rx) = watch::channel(PlaybackState::idle());
        let (command_tx, command_rx) = mpsc::channel(command_capacity.max(1));

        let session = Self {
            guild_id,
            home_channel,
            created_at: Utc::now(),
            queue: RequestQueue::new(),
            state: state_rx,
            commands: command_tx,
            cancel: CancellationToken::new(),
            terminated: CancellationToken::new(),
        };

        (
            session,
            ConsumerEnds {
                state: state_tx,
                commands: command_rx,
            },
        )
    }

    pub fn guild_id(&self) -> GuildId {
        self.guild_id
    }

    pub fn home_channel(&self) -> Option<ChannelId> {
        self.home_channel
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn state(&self) -> PlaybackState {
        self.state.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<PlaybackState> {
        self.state.clone()
    }

    pub fn pending(&self) -> Vec<PlaybackRequest> {
        self.queue.snapshot()
    }

    pub(crate) fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub(crate) fn mark_terminated(&self) {
        self.terminated.cancel();
    }

    pub fn is_terminated(&self) -> bool {
        self.terminated.is_cancelled()
    }

    /// Espera a que la tarea consumidora termine y la sesión salga del registro
    pub async fn closed(&self) {
        self.terminated.cancelled().await;
    }

    /// Manda una orden al consumidor y espera su respuesta
    pub(crate) async fn request(&self, action: ControlAction) -> Result<(), ControlError> {
        if self.cancel.is_cancelled() {
            return Err(ControlError::invalid(action, SessionState::Cleaning));
        }

        let (reply, response) = oneshot::channel();
        self.commands
            .send(ControlCommand { action, reply })
            .await
            .map_err(|_| ControlError::invalid(action, SessionState::Cleaning))?;

        // Si el consumidor se cerró sin responder, la sesión ya se está limpiando
        response
            .await
            .unwrap_or_else(|_| Err(ControlError::invalid(action, SessionState::Cleaning)))
    }

    /// Detención cooperativa: marca la cancelación y espera el desmontaje completo
    pub(crate) async fn stop(&self) -> Result<(), ControlError> {
        if self.cancel.is_cancelled() {
            return Err(ControlError::invalid(ControlAction::Stop, SessionState::Cleaning));
        }

        debug!("⏹️ Cancelación solicitada en guild {}", self.guild_id);
        self.cancel.cancel();
        self.closed().await;
        Ok(())
    }
}
