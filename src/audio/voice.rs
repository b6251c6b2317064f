//! Transporte sobre Songbird.
//!
//! Cada sesión recibe su propia [`SongbirdConnection`]. Los eventos de fin
//! y de error de Songbird llegan en tareas del driver; lo único que hacen es
//! disparar la [`CompletionSignal`] del `play` que los registró.

use async_trait::async_trait;
use parking_lot::Mutex;
use serenity::model::id::{ChannelId, GuildId};
use songbird::{
    error::JoinError,
    input::{HttpRequest, Input},
    tracks::{PlayMode, TrackHandle},
    Call, Event, EventContext, EventHandler as VoiceEventHandler, Songbird, TrackEvent,
};
use std::sync::Arc;
use tracing::{debug, info, warn};

use super::{
    error::MediaError,
    transport::{CompletionSignal, TrackOutcome, Transport, VoiceConnection},
};
use crate::sources::ResolvedTrack;

pub struct SongbirdTransport {
    songbird: Arc<Songbird>,
    http: reqwest::Client,
    volume: f32,
}

impl SongbirdTransport {
    pub fn new(songbird: Arc<Songbird>, volume: f32) -> Self {
        Self {
            songbird,
            http: reqwest::Client::new(),
            volume: volume.clamp(0.0, 2.0),
        }
    }
}

#[async_trait]
impl Transport for SongbirdTransport {
    async fn connect(
        &self,
        guild_id: GuildId,
        channel_id: ChannelId,
    ) -> Result<Box<dyn VoiceConnection>, MediaError> {
        info!("🔗 Conectando al canal {} en guild {}", channel_id, guild_id);

        let call = self
            .songbird
            .join(guild_id, channel_id)
            .await
            .map_err(join_error)?;

        info!("✅ Conectado al canal {} en guild {}", channel_id, guild_id);
        Ok(Box::new(SongbirdConnection {
            songbird: self.songbird.clone(),
            call,
            guild_id,
            http: self.http.clone(),
            volume: self.volume,
            current: None,
        }))
    }
}

fn join_error(e: JoinError) -> MediaError {
    match e {
        JoinError::TimedOut => MediaError::Network(e.to_string()),
        other => MediaError::ConnectionDenied(other.to_string()),
    }
}

fn control_error(e: songbird::tracks::ControlError) -> MediaError {
    MediaError::Unsupported(e.to_string())
}

pub struct SongbirdConnection {
    songbird: Arc<Songbird>,
    call: Arc<tokio::sync::Mutex<Call>>,
    guild_id: GuildId,
    http: reqwest::Client,
    volume: f32,
    current: Option<TrackHandle>,
}

#[async_trait]
impl VoiceConnection for SongbirdConnection {
    async fn play(&mut self, track: &ResolvedTrack, on_complete: CompletionSignal) -> Result<(), MediaError> {
        let input: Input = HttpRequest::new(self.http.clone(), track.stream_url.clone()).into();

        let handle = {
            let mut call = self.call.lock().await;
            call.play_input(input)
        };
        let _ = handle.set_volume(self.volume);

        // Fin y error comparten la misma señal; el primero que llegue la consume
        let notifier = TrackEndNotifier {
            guild_id: self.guild_id,
            signal: Arc::new(Mutex::new(Some(on_complete))),
        };
        let registered = handle
            .add_event(Event::Track(TrackEvent::End), notifier.clone())
            .and_then(|()| handle.add_event(Event::Track(TrackEvent::Error), notifier));

        // Sin aviso de fin el track no se podría seguir: se corta antes de fallar
        stop_on_error(registered, || {
            warn!("❌ No se pudo seguir el track en guild {}", self.guild_id);
            let _ = handle.stop();
        })
        .map_err(control_error)?;

        self.current = Some(handle);
        Ok(())
    }

    async fn pause(&mut self) -> Result<(), MediaError> {
        match &self.current {
            Some(handle) => handle.pause().map_err(control_error),
            None => Err(MediaError::Unsupported("no hay track en curso".to_string())),
        }
    }

    async fn resume(&mut self) -> Result<(), MediaError> {
        match &self.current {
            Some(handle) => handle.play().map_err(control_error),
            None => Err(MediaError::Unsupported("no hay track en curso".to_string())),
        }
    }

    async fn stop(&mut self) -> Result<(), MediaError> {
        if let Some(handle) = self.current.take() {
            // Un track ya finalizado no acepta órdenes; su señal ya se disparó
            if let Err(e) = handle.stop() {
                debug!("Stop sobre track finalizado en guild {}: {}", self.guild_id, e);
            }
        }
        Ok(())
    }

    async fn disconnect(self: Box<Self>) -> Result<(), MediaError> {
        match self.songbird.remove(self.guild_id).await {
            Ok(()) => {
                info!("👋 Desconectado del canal de voz en guild {}", self.guild_id);
                Ok(())
            }
            // Desconectado desde afuera: no queda nada que liberar
            Err(JoinError::NoCall) => Ok(()),
            Err(e) => Err(MediaError::Network(e.to_string())),
        }
    }
}

fn stop_on_error<T, E>(result: Result<T, E>, stop: impl FnOnce()) -> Result<T, E> {
    if result.is_err() {
        stop();
    }
    result
}

/// Traduce los eventos de Songbird a la señal de fin del track
#[derive(Clone)]
struct TrackEndNotifier {
    guild_id: GuildId,
    signal: Arc<Mutex<Option<CompletionSignal>>>,
}

#[async_trait]
impl VoiceEventHandler for TrackEndNotifier {
    async fn act(&self, ctx: &EventContext<'_>) -> Option<Event> {
        let outcome = match ctx {
            EventContext::Track(tracks) => tracks
                .iter()
                .find_map(|(state, _)| match &state.playing {
                    PlayMode::Errored(e) => Some(TrackOutcome::Failed(format!("{:?}", e))),
                    _ => None,
                })
                .unwrap_or(TrackOutcome::Finished),
            _ => TrackOutcome::Finished,
        };

        if let TrackOutcome::Failed(ref reason) = outcome {
            warn!("❌ Error de reproducción en guild {}: {}", self.guild_id, reason);
        }

        if let Some(signal) = self.signal.lock().take() {
            signal.finish(outcome);
        }

        Some(Event::Cancel)
    }
}
