//! Contrato del transporte de audio.
//!
//! El transporte abre la conexión de voz, transmite un stream y avisa
//! cuando el track termina. Ese aviso puede llegar desde otro hilo o
//! runtime: nunca toca el estado de la sesión, solo dispara un
//! [`CompletionSignal`] que el consumidor recibe en su propio bucle.

use async_trait::async_trait;
use serenity::model::id::{ChannelId, GuildId};
use tokio::sync::oneshot;
use tracing::debug;

use super::error::MediaError;
use crate::sources::ResolvedTrack;

/// Cómo terminó un track
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TrackOutcome {
    /// Terminó normalmente o lo detuvo un `stop`
    Finished,
    /// El transporte reportó un error durante la reproducción
    Failed(String),
}

/// Señal de fin de track de un solo uso.
///
/// Cada `play` recibe una señal nueva, así un aviso tardío de un track
/// anterior nunca se confunde con el actual.
#[derive(Debug)]
pub struct CompletionSignal {
    sender: oneshot::Sender<TrackOutcome>,
}

impl CompletionSignal {
    pub fn channel() -> (Self, oneshot::Receiver<TrackOutcome>) {
        let (sender, receiver) = oneshot::channel();
        (Self { sender }, receiver)
    }

    /// Dispara la señal; falso si nadie la espera ya (aviso obsoleto)
    pub fn finish(self, outcome: TrackOutcome) -> bool {
        match self.sender.send(outcome) {
            Ok(()) => true,
            Err(_) => {
                debug!("🔕 Señal de fin de track descartada: la sesión ya no la espera");
                false
            }
        }
    }

    pub fn is_stale(&self) -> bool {
        self.sender.is_closed()
    }
}

/// Fábrica de conexiones de voz
#[async_trait]
pub trait Transport: Send + Sync {
    async fn connect(
        &self,
        guild_id: GuildId,
        channel_id: ChannelId,
    ) -> Result<Box<dyn VoiceConnection>, MediaError>;
}

/// Conexión de voz de un servidor, propiedad exclusiva de su sesión
#[async_trait]
pub trait VoiceConnection: Send {
    /// Empieza a transmitir el track; `on_complete` se dispara al terminar
    async fn play(&mut self, track: &ResolvedTrack, on_complete: CompletionSignal) -> Result<(), MediaError>;

    async fn pause(&mut self) -> Result<(), MediaError>;

    async fn resume(&mut self) -> Result<(), MediaError>;

    /// Fuerza el fin del track actual; dispara su señal de fin
    async fn stop(&mut self) -> Result<(), MediaError>;

    /// Libera la conexión. Consume el valor: solo puede ocurrir una vez.
    async fn disconnect(self: Box<Self>) -> Result<(), MediaError>;
}
