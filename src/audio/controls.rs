//! Superficie de control que usan los comandos del bot.

use serenity::model::id::{ChannelId, GuildId};
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{debug, info};

use super::{
    error::{ControlAction, ControlError},
    queue::PlaybackRequest,
    registry::SessionRegistry,
    session::{NowPlaying, PlaybackSession, PlaybackState},
};

/// Resultado de encolar
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EnqueueReceipt {
    /// Posición en la cola de pendientes, desde 1
    pub position: usize,
    /// Si esta solicitud abrió la sesión
    pub created: bool,
}

#[derive(Clone)]
pub struct PlayerControls {
    registry: SessionRegistry,
}

impl PlayerControls {
    pub fn new(registry: SessionRegistry) -> Self {
        Self { registry }
    }

    pub fn registry(&self) -> &SessionRegistry {
        &self.registry
    }

    /// Encola una solicitud, creando la sesión si hace falta.
    ///
    /// Si la sesión encontrada ya se está cerrando, espera a que termine y
    /// abre una nueva; la solicitud nunca cae en una cola muerta.
    pub async fn enqueue(
        &self,
        guild_id: GuildId,
        voice_channel: ChannelId,
        request: PlaybackRequest,
    ) -> Result<EnqueueReceipt, ControlError> {
        let mut request = request;
        loop {
            let (session, created) = self
                .registry
                .get_or_create(guild_id, voice_channel, request.text_channel)
                .await?;

            match session.queue.push(request) {
                Ok(position) => {
                    debug!("Solicitud encolada en guild {} (posición {})", guild_id, position);
                    return Ok(EnqueueReceipt { position, created });
                }
                Err(rejected) => {
                    info!("⏳ Sesión de guild {} cerrándose, esperando para abrir otra", guild_id);
                    request = rejected;
                    session.closed().await;
                }
            }
        }
    }

    pub async fn pause(&self, guild_id: GuildId) -> Result<(), ControlError> {
        self.session(guild_id)?.request(ControlAction::Pause).await
    }

    pub async fn resume(&self, guild_id: GuildId) -> Result<(), ControlError> {
        self.session(guild_id)?.request(ControlAction::Resume).await
    }

    /// Termina el track actual; el consumidor pasa solo al siguiente
    pub async fn skip(&self, guild_id: GuildId) -> Result<(), ControlError> {
        self.session(guild_id)?.request(ControlAction::Skip).await
    }

    /// Detiene la sesión y espera a que termine de desmontarse
    pub async fn stop(&self, guild_id: GuildId) -> Result<(), ControlError> {
        let session = self.session(guild_id)?;
        info!("⏹️ Deteniendo sesión de guild {}", guild_id);
        session.stop().await
    }

    /// Solicitudes pendientes, en orden de reproducción
    pub fn queue(&self, guild_id: GuildId) -> Result<Vec<PlaybackRequest>, ControlError> {
        Ok(self.session(guild_id)?.pending())
    }

    pub fn now_playing(&self, guild_id: GuildId) -> Result<Option<NowPlaying>, ControlError> {
        Ok(self.session(guild_id)?.state().now_playing().cloned())
    }

    pub fn state(&self, guild_id: GuildId) -> Result<PlaybackState, ControlError> {
        Ok(self.session(guild_id)?.state())
    }

    /// Observa los cambios de estado de la sesión actual del servidor
    pub fn subscribe(&self, guild_id: GuildId) -> Result<watch::Receiver<PlaybackState>, ControlError> {
        Ok(self.session(guild_id)?.subscribe())
    }

    pub fn active_sessions(&self) -> Vec<GuildId> {
        self.registry.guilds()
    }

    /// Detiene todas las sesiones; usado al apagar el bot
    pub async fn shutdown(&self) {
        let sessions: Vec<Arc<PlaybackSession>> = self
            .registry
            .guilds()
            .into_iter()
            .filter_map(|guild_id| self.registry.get(guild_id))
            .collect();

        if sessions.is_empty() {
            return;
        }

        info!("🛑 Cerrando {} sesiones activas", sessions.len());
        let stops = sessions.iter().map(|session| async move {
            // Una sesión que ya se estaba cerrando solo hay que esperarla
            if session.stop().await.is_err() {
                session.closed().await;
            }
        });
        futures::future::join_all(stops).await;
    }

    fn session(&self, guild_id: GuildId) -> Result<Arc<PlaybackSession>, ControlError> {
        self.registry.get(guild_id).ok_or(ControlError::NoSession)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::{
        error::MediaError,
        events::{SessionEvent, SessionExit},
        session::SessionState,
        test_support::{request, Harness, Script, TEXT, VOICE},
        transport::TrackOutcome,
    };
    use pretty_assertions::assert_eq;
    use std::time::Duration;

    const GUILD: GuildId = GuildId::new(42);

    fn queries(requests: Vec<PlaybackRequest>) -> Vec<String> {
        requests.into_iter().map(|r| r.query).collect()
    }

    #[tokio::test]
    async fn plays_requests_in_fifo_order() {
        let h = Harness::new();

        let first = h.controls.enqueue(GUILD, VOICE, request("a")).await.unwrap();
        assert_eq!(first, EnqueueReceipt { position: 1, created: true });
        assert!(!h.controls.enqueue(GUILD, VOICE, request("b")).await.unwrap().created);
        h.controls.enqueue(GUILD, VOICE, request("c")).await.unwrap();

        for title in ["a", "b", "c"] {
            h.wait_playing(GUILD, title).await;
            assert!(h.transport.finish_current(TrackOutcome::Finished));
        }

        assert_eq!(h.transport.played(), vec!["a", "b", "c"]);
        assert_eq!(h.resolver.calls(), vec!["a", "b", "c"]);
    }

    #[tokio::test]
    async fn skip_moves_on_without_touching_the_rest_of_the_queue() {
        let h = Harness::new();
        h.controls.enqueue(GUILD, VOICE, request("a")).await.unwrap();
        h.wait_playing(GUILD, "a").await;

        h.controls.enqueue(GUILD, VOICE, request("b")).await.unwrap();
        h.controls.enqueue(GUILD, VOICE, request("c")).await.unwrap();

        h.controls.skip(GUILD).await.unwrap();
        h.wait_playing(GUILD, "b").await;

        assert_eq!(queries(h.controls.queue(GUILD).unwrap()), vec!["c"]);
        assert_eq!(h.transport.stops(), 1);
        assert!(h.sink.events().iter().any(|event| matches!(
            event,
            SessionEvent::TrackFinished { track, outcome: TrackOutcome::Finished } if track.title == "a"
        )));
    }

    #[tokio::test]
    async fn controls_without_session_are_rejected() {
        let h = Harness::new();

        assert_eq!(h.controls.pause(GUILD).await, Err(ControlError::NoSession));
        assert_eq!(h.controls.resume(GUILD).await, Err(ControlError::NoSession));
        assert_eq!(h.controls.skip(GUILD).await, Err(ControlError::NoSession));
        assert_eq!(h.controls.stop(GUILD).await, Err(ControlError::NoSession));
        assert_eq!(h.controls.queue(GUILD), Err(ControlError::NoSession));
        assert_eq!(h.controls.now_playing(GUILD), Err(ControlError::NoSession));
        assert_eq!(h.transport.connects(), 0);
    }

    #[tokio::test]
    async fn controls_in_the_wrong_state_leave_it_unchanged() {
        let h = Harness::new();
        h.controls.enqueue(GUILD, VOICE, request("a")).await.unwrap();
        h.wait_playing(GUILD, "a").await;

        assert_eq!(
            h.controls.resume(GUILD).await,
            Err(ControlError::invalid(ControlAction::Resume, SessionState::Playing))
        );
        assert_eq!(h.controls.state(GUILD).unwrap().kind(), SessionState::Playing);

        h.controls.pause(GUILD).await.unwrap();
        assert_eq!(h.controls.state(GUILD).unwrap().kind(), SessionState::Paused);
        assert_eq!(
            h.controls.pause(GUILD).await,
            Err(ControlError::invalid(ControlAction::Pause, SessionState::Paused))
        );
        assert_eq!(
            h.controls.skip(GUILD).await,
            Err(ControlError::invalid(ControlAction::Skip, SessionState::Paused))
        );

        h.controls.resume(GUILD).await.unwrap();
        assert_eq!(h.controls.now_playing(GUILD).unwrap().unwrap().track.title, "a");

        h.transport.finish_current(TrackOutcome::Finished);
        h.wait_state(GUILD, SessionState::Idle).await;
        assert_eq!(
            h.controls.pause(GUILD).await,
            Err(ControlError::invalid(ControlAction::Pause, SessionState::Idle))
        );
        assert_eq!(h.controls.now_playing(GUILD), Ok(None));
    }

    #[tokio::test]
    async fn resolver_failure_is_announced_and_skipped() {
        let h = Harness::new();
        h.resolver
            .script("bad", Script::Fail(MediaError::NotFound("sin resultados".into())));

        h.controls.enqueue(GUILD, VOICE, request("bad")).await.unwrap();
        h.controls.enqueue(GUILD, VOICE, request("good")).await.unwrap();
        h.wait_playing(GUILD, "good").await;

        assert_eq!(h.transport.played(), vec!["good"]);
        let failed = h
            .sink
            .notices()
            .into_iter()
            .find(|n| matches!(n.event, SessionEvent::TrackFailed { .. }))
            .expect("falta el aviso de fallo");
        assert_eq!(failed.channel_id, Some(TEXT));
        match failed.event {
            SessionEvent::TrackFailed { request, error } => {
                assert_eq!(request.query, "bad");
                assert_eq!(error, MediaError::NotFound("sin resultados".into()));
            }
            other => panic!("evento inesperado: {:?}", other),
        }
    }

    #[tokio::test]
    async fn play_failure_skips_but_denied_connection_ends_the_session() {
        let h = Harness::new();
        h.transport.fail_play("flaky", MediaError::Network("timeout".into()));
        h.transport
            .fail_play("denied", MediaError::ConnectionDenied("expulsado".into()));

        h.controls.enqueue(GUILD, VOICE, request("flaky")).await.unwrap();
        h.controls.enqueue(GUILD, VOICE, request("ok")).await.unwrap();
        h.wait_playing(GUILD, "ok").await;

        let session = h.controls.registry().get(GUILD).unwrap();
        h.controls.enqueue(GUILD, VOICE, request("denied")).await.unwrap();
        h.controls.enqueue(GUILD, VOICE, request("never")).await.unwrap();
        h.transport.finish_current(TrackOutcome::Finished);

        tokio::time::timeout(Duration::from_secs(5), session.closed())
            .await
            .unwrap();

        assert_eq!(h.transport.played(), vec!["flaky", "ok", "denied"]);
        assert_eq!(h.transport.disconnects(), 1);
        assert_eq!(h.controls.queue(GUILD), Err(ControlError::NoSession));
        assert!(matches!(
            h.sink.events().last(),
            Some(SessionEvent::SessionEnded { exit: SessionExit::Aborted(_), dropped: 1 })
        ));
    }

    #[tokio::test]
    async fn stop_during_resolve_tears_down_without_playing() {
        let h = Harness::new();
        h.resolver.script("slow", Script::Hang);

        h.controls.enqueue(GUILD, VOICE, request("slow")).await.unwrap();
        h.controls.enqueue(GUILD, VOICE, request("next")).await.unwrap();
        h.wait_state(GUILD, SessionState::Resolving).await;

        let session = h.controls.registry().get(GUILD).unwrap();
        h.controls.stop(GUILD).await.unwrap();

        assert!(session.is_terminated());
        assert_eq!(session.state(), PlaybackState::Cleaning);
        assert!(h.transport.played().is_empty());
        assert_eq!(h.transport.disconnects(), 1);
        assert_eq!(
            h.sink.events().last(),
            Some(&SessionEvent::SessionEnded {
                exit: SessionExit::Stopped,
                dropped: 1
            })
        );
    }

    #[tokio::test]
    async fn stop_while_idle_tears_down_without_waiting_for_the_timer() {
        let h = Harness::new();
        h.controls.enqueue(GUILD, VOICE, request("a")).await.unwrap();
        h.wait_playing(GUILD, "a").await;
        h.transport.finish_current(TrackOutcome::Finished);
        h.wait_state(GUILD, SessionState::Idle).await;

        let session = h.controls.registry().get(GUILD).unwrap();
        tokio::time::timeout(Duration::from_secs(5), h.controls.stop(GUILD))
            .await
            .unwrap()
            .unwrap();

        assert!(session.is_terminated());
        assert!(h.controls.registry().get(GUILD).is_none());
        assert_eq!(h.transport.disconnects(), 1);
        assert_eq!(
            h.sink.events().last(),
            Some(&SessionEvent::SessionEnded {
                exit: SessionExit::Stopped,
                dropped: 0
            })
        );
    }

    #[tokio::test]
    async fn stop_while_paused_drops_the_rest_of_the_queue() {
        let h = Harness::new();
        h.controls.enqueue(GUILD, VOICE, request("a")).await.unwrap();
        h.controls.enqueue(GUILD, VOICE, request("b")).await.unwrap();
        h.wait_playing(GUILD, "a").await;

        h.controls.pause(GUILD).await.unwrap();
        assert_eq!(h.controls.state(GUILD).unwrap().kind(), SessionState::Paused);
        h.controls.stop(GUILD).await.unwrap();

        assert_eq!(h.transport.played(), vec!["a"]);
        assert_eq!(h.transport.disconnects(), 1);
        assert!(h.controls.active_sessions().is_empty());
        assert_eq!(h.controls.queue(GUILD), Err(ControlError::NoSession));
        assert_eq!(
            h.sink.events().last(),
            Some(&SessionEvent::SessionEnded {
                exit: SessionExit::Stopped,
                dropped: 1
            })
        );
    }

    #[tokio::test]
    async fn stop_disconnects_exactly_once() {
        let h = Harness::new();
        h.controls.enqueue(GUILD, VOICE, request("a")).await.unwrap();
        h.wait_playing(GUILD, "a").await;

        h.controls.stop(GUILD).await.unwrap();
        assert_eq!(h.controls.stop(GUILD).await, Err(ControlError::NoSession));
        assert_eq!(h.controls.pause(GUILD).await, Err(ControlError::NoSession));

        assert_eq!(h.transport.disconnects(), 1);
        assert!(h.controls.active_sessions().is_empty());
    }

    #[tokio::test]
    async fn late_completion_after_stop_is_discarded() {
        let h = Harness::new();
        h.controls.enqueue(GUILD, VOICE, request("a")).await.unwrap();
        h.wait_playing(GUILD, "a").await;

        let late = h.transport.take_current().unwrap();
        let session = h.controls.registry().get(GUILD).unwrap();
        h.controls.stop(GUILD).await.unwrap();

        assert!(!late.finish(TrackOutcome::Finished));
        assert_eq!(session.state(), PlaybackState::Cleaning);
        assert!(h.controls.registry().get(GUILD).is_none());
        assert!(!h
            .sink
            .events()
            .iter()
            .any(|e| matches!(e, SessionEvent::TrackFinished { .. })));
    }

    #[tokio::test]
    async fn enqueue_during_teardown_opens_a_new_session() {
        let h = Harness::new();
        h.transport.set_disconnect_delay(Duration::from_millis(50));
        h.controls.enqueue(GUILD, VOICE, request("a")).await.unwrap();
        h.wait_playing(GUILD, "a").await;

        let old = h.controls.registry().get(GUILD).unwrap();
        let stopper = {
            let controls = h.controls.clone();
            tokio::spawn(async move { controls.stop(GUILD).await })
        };
        while !old.queue.is_closed() {
            tokio::time::sleep(Duration::from_millis(1)).await;
        }

        let receipt = h.controls.enqueue(GUILD, VOICE, request("b")).await.unwrap();
        assert_eq!(receipt, EnqueueReceipt { position: 1, created: true });
        stopper.await.unwrap().unwrap();

        h.wait_playing(GUILD, "b").await;
        assert!(old.is_terminated());
        assert_eq!(h.transport.connects(), 2);
    }

    #[tokio::test]
    async fn shutdown_stops_every_guild() {
        let h = Harness::new();
        for guild in [GuildId::new(1), GuildId::new(2), GuildId::new(3)] {
            h.controls.enqueue(guild, VOICE, request("a")).await.unwrap();
        }
        assert_eq!(h.controls.active_sessions().len(), 3);

        h.controls.shutdown().await;

        assert!(h.controls.active_sessions().is_empty());
        assert_eq!(h.transport.disconnects(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn song_scenario_for_guild_42() {
        let h = Harness::new();

        let receipt = h.controls.enqueue(GUILD, VOICE, request("song1")).await.unwrap();
        assert!(receipt.created);
        h.wait_playing(GUILD, "song1").await;
        assert_eq!(h.resolver.calls(), vec!["song1"]);
        assert_eq!(h.transport.played(), vec!["song1"]);

        h.controls.enqueue(GUILD, VOICE, request("song2")).await.unwrap();
        assert_eq!(queries(h.controls.queue(GUILD).unwrap()), vec!["song2"]);

        h.controls.skip(GUILD).await.unwrap();
        h.wait_playing(GUILD, "song2").await;
        assert!(h.controls.queue(GUILD).unwrap().is_empty());

        let session = h.controls.registry().get(GUILD).unwrap();
        h.transport.finish_current(TrackOutcome::Finished);
        h.wait_state(GUILD, SessionState::Idle).await;

        let idle_since = tokio::time::Instant::now();
        session.closed().await;
        assert!(idle_since.elapsed() >= Duration::from_secs(300));

        assert_eq!(h.controls.queue(GUILD), Err(ControlError::NoSession));
        assert_eq!(h.transport.disconnects(), 1);
        assert_eq!(
            h.sink.events().last(),
            Some(&SessionEvent::SessionEnded {
                exit: SessionExit::IdleTimeout,
                dropped: 0
            })
        );
    }
}
