//! Bucle consumidor de una sesión.
//!
//! Una sola tarea por servidor: saca la siguiente solicitud, la resuelve,
//! la reproduce y espera la señal de fin. Sus únicos puntos de espera son
//! la cola (acotada por el tiempo de inactividad), la resolución y la señal
//! de fin; en los tres se observa la cancelación y se atienden órdenes.

use chrono::Utc;
use futures::FutureExt;
use std::{panic::AssertUnwindSafe, sync::Arc, time::Duration};
use tokio::{
    sync::{mpsc, oneshot, watch},
    task::JoinHandle,
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::{
    error::{ControlAction, ControlError, MediaError},
    events::{EventSink, Notice, SessionEvent, SessionExit},
    queue::PlaybackRequest,
    session::{ConsumerEnds, ControlCommand, NowPlaying, PlaybackSession, PlaybackState, SessionState},
    transport::{CompletionSignal, TrackOutcome, VoiceConnection},
};
use crate::sources::{ResolvedTrack, Resolver};

/// Resultado de un paso del bucle: seguir con un valor o salir
enum Step<T> {
    Continue(T),
    Exit(SessionExit),
}

pub(crate) struct SessionConsumer {
    session: Arc<PlaybackSession>,
    state: watch::Sender<PlaybackState>,
    commands: mpsc::Receiver<ControlCommand>,
    cancel: CancellationToken,
    resolver: Arc<dyn Resolver>,
    events: Arc<dyn EventSink>,
    idle_timeout: Duration,
}

impl SessionConsumer {
    pub(crate) fn new(
        session: Arc<PlaybackSession>,
        ends: ConsumerEnds,
        resolver: Arc<dyn Resolver>,
        events: Arc<dyn EventSink>,
        idle_timeout: Duration,
    ) -> Self {
        let cancel = session.cancel_token();
        Self {
            session,
            state: ends.state,
            commands: ends.commands,
            cancel,
            resolver,
            events,
            idle_timeout,
        }
    }

    /// Lanza la tarea consumidora. `on_exit` corre después del desmontaje y
    /// antes de marcar la sesión como terminada.
    pub(crate) fn spawn<F>(mut self, connection: Box<dyn VoiceConnection>, on_exit: F) -> JoinHandle<()>
    where
        F: FnOnce(&Arc<PlaybackSession>) + Send + 'static,
    {
        tokio::spawn(async move {
            let guild_id = self.session.guild_id();
            let mut connection = connection;
            info!("▶️ Consumidor iniciado para guild {}", guild_id);

            let exit = match AssertUnwindSafe(self.run(connection.as_mut())).catch_unwind().await {
                Ok(exit) => exit,
                Err(_) => {
                    error!("💥 El consumidor de guild {} falló inesperadamente", guild_id);
                    SessionExit::Aborted("error inesperado en el reproductor".to_string())
                }
            };

            let dropped = self.teardown(connection).await;
            on_exit(&self.session);

            info!("👋 Sesión de guild {} cerrada: {:?}", guild_id, exit);
            self.publish(self.session.home_channel(), SessionEvent::SessionEnded { exit, dropped });
            self.session.mark_terminated();
        })
    }

    /// Máquina de estados: Idle -> Resolving -> Playing <-> Paused, hasta salir
    async fn run(&mut self, connection: &mut dyn VoiceConnection) -> SessionExit {
        loop {
            self.set_state(PlaybackState::idle());
            let request = match self.next_request().await {
                Step::Continue(request) => request,
                Step::Exit(exit) => return exit,
            };

            self.set_state(PlaybackState::Resolving {
                request: request.clone(),
            });
            let track = match self.resolve(&request).await {
                Step::Continue(Ok(track)) => track,
                Step::Continue(Err(error)) => {
                    warn!("⏭️ No se pudo resolver '{}': {}", request.query, error);
                    self.publish_failure(request, error);
                    continue;
                }
                Step::Exit(exit) => return exit,
            };

            let (signal, completion) = CompletionSignal::channel();
            if let Err(error) = connection.play(&track, signal).await {
                error!("❌ El transporte no pudo reproducir '{}': {}", track.title, error);
                let fatal = error.is_fatal_for_session();
                let reason = error.to_string();
                self.publish_failure(request, error);
                if fatal {
                    return SessionExit::Aborted(reason);
                }
                continue;
            }

            let now = NowPlaying {
                track,
                request,
                started_at: Utc::now(),
            };
            info!("🎵 Reproduciendo en guild {}: {}", self.session.guild_id(), now.track.title);
            self.set_state(PlaybackState::Playing(now.clone()));
            self.publish(
                self.channel_for(&now.request),
                SessionEvent::TrackStarted(now.clone()),
            );

            match self.await_completion(connection, completion).await {
                Step::Continue(outcome) => {
                    let channel = self.channel_for(&now.request);
                    self.publish(
                        channel,
                        SessionEvent::TrackFinished {
                            track: now.track,
                            outcome,
                        },
                    );
                }
                Step::Exit(exit) => return exit,
            }
        }
    }

    /// Idle: espera la siguiente solicitud, como mucho `idle_timeout`
    async fn next_request(&mut self) -> Step<PlaybackRequest> {
        let idle = tokio::time::sleep(self.idle_timeout);
        tokio::pin!(idle);

        loop {
            tokio::select! {
                biased;
                _ = self.cancel.cancelled() => return Step::Exit(SessionExit::Stopped),
                request = self.session.queue.pop() => return Step::Continue(request),
                Some(command) = self.commands.recv() => self.reject(command, SessionState::Idle),
                _ = &mut idle => {
                    // Cerrar solo si sigue vacía: una solicitud que llegó justo ahora gana
                    if self.session.queue.close_if_empty() {
                        info!("🕒 Guild {} inactiva por {:?}, cerrando sesión", self.session.guild_id(), self.idle_timeout);
                        return Step::Exit(SessionExit::IdleTimeout);
                    }
                }
            }
        }
    }

    /// Resolving: la resolución corre en su propia tarea y se aborta si llega la cancelación
    async fn resolve(&mut self, request: &PlaybackRequest) -> Step<Result<ResolvedTrack, MediaError>> {
        let resolver = self.resolver.clone();
        let query = request.query.clone();
        let mut task = tokio::spawn(async move { resolver.resolve(&query).await });

        loop {
            tokio::select! {
                biased;
                _ = self.cancel.cancelled() => {
                    task.abort();
                    debug!("🛑 Resolución de '{}' cancelada", request.query);
                    return Step::Exit(SessionExit::Stopped);
                }
                joined = &mut task => {
                    let result = joined.unwrap_or_else(|e| {
                        Err(MediaError::Unsupported(format!("el resolvedor falló inesperadamente: {}", e)))
                    });
                    return Step::Continue(result);
                }
                Some(command) = self.commands.recv() => self.reject(command, SessionState::Resolving),
            }
        }
    }

    /// Playing/Paused: espera la señal de fin y atiende pausa, reanudación y salto
    async fn await_completion(
        &mut self,
        connection: &mut dyn VoiceConnection,
        mut completion: oneshot::Receiver<TrackOutcome>,
    ) -> Step<TrackOutcome> {
        loop {
            tokio::select! {
                biased;
                _ = self.cancel.cancelled() => return Step::Exit(SessionExit::Stopped),
                outcome = &mut completion => {
                    // Si el transporte soltó la señal sin dispararla, el track ya no suena
                    return Step::Continue(outcome.unwrap_or(TrackOutcome::Finished));
                }
                Some(command) = self.commands.recv() => self.apply(command, connection).await,
            }
        }
    }

    async fn apply(&mut self, command: ControlCommand, connection: &mut dyn VoiceConnection) {
        let current = self.state.borrow().kind();
        let guild_id = self.session.guild_id();

        let result = match (command.action, current) {
            (ControlAction::Pause, SessionState::Playing) => match connection.pause().await {
                Ok(()) => {
                    info!("⏸️ Reproducción pausada en guild {}", guild_id);
                    self.set_paused(true);
                    Ok(())
                }
                Err(e) => Err(ControlError::Transport(e)),
            },
            (ControlAction::Resume, SessionState::Paused) => match connection.resume().await {
                Ok(()) => {
                    info!("▶️ Reproducción reanudada en guild {}", guild_id);
                    self.set_paused(false);
                    Ok(())
                }
                Err(e) => Err(ControlError::Transport(e)),
            },
            // El stop del transporte dispara la señal de fin; se maneja como un fin normal
            (ControlAction::Skip, SessionState::Playing) => {
                info!("⏭️ Saltando track en guild {}", guild_id);
                connection.stop().await.map_err(ControlError::Transport)
            }
            (action, state) => Err(ControlError::invalid(action, state)),
        };

        let _ = command.reply.send(result);
    }

    /// Fuera de Playing/Paused ninguna orden tiene sentido; `stop` va por la cancelación
    fn reject(&self, command: ControlCommand, state: SessionState) {
        let _ = command
            .reply
            .send(Err(ControlError::invalid(command.action, state)));
    }

    /// Cleaning: libera todo exactamente una vez; no se interrumpe
    async fn teardown(&mut self, connection: Box<dyn VoiceConnection>) -> usize {
        let guild_id = self.session.guild_id();
        self.state.send_replace(PlaybackState::Cleaning);
        self.cancel.cancel();

        let dropped = self.session.queue.close();

        // Las órdenes que quedaron en el canal reciben su rechazo
        self.commands.close();
        while let Ok(command) = self.commands.try_recv() {
            let _ = command
                .reply
                .send(Err(ControlError::invalid(command.action, SessionState::Cleaning)));
        }

        let mut connection = connection;
        if let Err(e) = connection.stop().await {
            debug!("Stop durante el cierre de guild {} falló: {}", guild_id, e);
        }
        if let Err(e) = connection.disconnect().await {
            warn!("⚠️ Error al desconectar la voz en guild {}: {}", guild_id, e);
        }

        dropped
    }

    fn set_state(&self, state: PlaybackState) {
        self.state.send_replace(state);
    }

    fn set_paused(&self, paused: bool) {
        self.state.send_modify(|state| {
            let current = std::mem::replace(state, PlaybackState::Cleaning);
            *state = match current {
                PlaybackState::Playing(now) | PlaybackState::Paused(now) => {
                    if paused {
                        PlaybackState::Paused(now)
                    } else {
                        PlaybackState::Playing(now)
                    }
                }
                other => other,
            };
        });
    }

    fn channel_for(&self, request: &PlaybackRequest) -> Option<serenity::model::id::ChannelId> {
        request.text_channel.or(self.session.home_channel())
    }

    fn publish_failure(&self, request: PlaybackRequest, error: MediaError) {
        let channel = self.channel_for(&request);
        self.publish(channel, SessionEvent::TrackFailed { request, error });
    }

    fn publish(&self, channel_id: Option<serenity::model::id::ChannelId>, event: SessionEvent) {
        self.events.publish(Notice {
            guild_id: self.session.guild_id(),
            channel_id,
            event,
        });
    }
}
