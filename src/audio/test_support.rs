//! Dobles de prueba del motor: resolvedor con guion, transporte falso y
//! receptor de avisos que los guarda.

use async_trait::async_trait;
use parking_lot::Mutex;
use serenity::model::id::{ChannelId, GuildId, UserId};
use std::{
    collections::{HashMap, HashSet},
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    },
    time::Duration,
};
use tokio::sync::watch;

use super::{
    controls::PlayerControls,
    error::MediaError,
    events::{EventSink, Notice, SessionEvent},
    queue::PlaybackRequest,
    registry::SessionRegistry,
    session::{PlaybackState, SessionState},
    transport::{CompletionSignal, TrackOutcome, Transport, VoiceConnection},
    PlayerSettings,
};
use crate::sources::{ResolvedTrack, Resolver};

pub(crate) const VOICE: ChannelId = ChannelId::new(500);
pub(crate) const TEXT: ChannelId = ChannelId::new(600);

pub(crate) fn request(query: &str) -> PlaybackRequest {
    PlaybackRequest::new(UserId::new(1), query).with_text_channel(TEXT)
}

pub(crate) fn track(query: &str) -> ResolvedTrack {
    ResolvedTrack::new(
        query,
        format!("https://cdn.test/{}.webm", query),
        format!("https://video.test/{}", query),
    )
}

#[derive(Clone)]
pub(crate) enum Script {
    Fail(MediaError),
    Hang,
    Panic,
}

/// Resuelve cada consulta a un track con ese título, salvo las que tienen guion
#[derive(Default)]
pub(crate) struct ScriptedResolver {
    scripts: Mutex<HashMap<String, Script>>,
    calls: Mutex<Vec<String>>,
}

impl ScriptedResolver {
    pub fn script(&self, query: &str, script: Script) {
        self.scripts.lock().insert(query.to_string(), script);
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().clone()
    }
}

#[async_trait]
impl Resolver for ScriptedResolver {
    async fn resolve(&self, query: &str) -> Result<ResolvedTrack, MediaError> {
        self.calls.lock().push(query.to_string());
        let script = self.scripts.lock().get(query).cloned();
        match script {
            None => Ok(track(query)),
            Some(Script::Fail(e)) => Err(e),
            Some(Script::Hang) => futures::future::pending().await,
            Some(Script::Panic) => panic!("el resolvedor explotó con '{}'", query),
        }
    }
}

#[derive(Default)]
pub(crate) struct FakeVoice {
    connects: AtomicUsize,
    disconnects: AtomicUsize,
    stops: AtomicUsize,
    plays: Mutex<Vec<String>>,
    connect_delay: Mutex<Duration>,
    disconnect_delay: Mutex<Duration>,
    fail_next_connect: Mutex<Option<MediaError>>,
    fail_play: Mutex<HashMap<String, MediaError>>,
    panic_play: Mutex<HashSet<String>>,
    current: Mutex<HashMap<GuildId, CompletionSignal>>,
}

/// Transporte en memoria: registra todo y deja que la prueba decida cuándo termina un track
#[derive(Clone, Default)]
pub(crate) struct FakeTransport {
    voice: Arc<FakeVoice>,
}

impl FakeTransport {
    pub fn connects(&self) -> usize {
        self.voice.connects.load(Ordering::SeqCst)
    }

    pub fn disconnects(&self) -> usize {
        self.voice.disconnects.load(Ordering::SeqCst)
    }

    pub fn stops(&self) -> usize {
        self.voice.stops.load(Ordering::SeqCst)
    }

    pub fn played(&self) -> Vec<String> {
        self.voice.plays.lock().clone()
    }

    pub fn set_connect_delay(&self, delay: Duration) {
        *self.voice.connect_delay.lock() = delay;
    }

    pub fn set_disconnect_delay(&self, delay: Duration) {
        *self.voice.disconnect_delay.lock() = delay;
    }

    pub fn fail_next_connect(&self, error: MediaError) {
        *self.voice.fail_next_connect.lock() = Some(error);
    }

    pub fn fail_play(&self, title: &str, error: MediaError) {
        self.voice.fail_play.lock().insert(title.to_string(), error);
    }

    /// `play` de ese título entra en pánico dentro de la tarea consumidora
    pub fn panic_on_play(&self, title: &str) {
        self.voice.panic_play.lock().insert(title.to_string());
    }

    /// Termina el track en curso como lo haría el driver
    pub fn finish_current(&self, outcome: TrackOutcome) -> bool {
        match self.take_current() {
            Some(signal) => signal.finish(outcome),
            None => false,
        }
    }

    /// Se queda con la señal del track en curso sin dispararla
    pub fn take_current(&self) -> Option<CompletionSignal> {
        let mut current = self.voice.current.lock();
        let guild_id = current.keys().next().copied()?;
        current.remove(&guild_id)
    }
}

#[async_trait]
impl Transport for FakeTransport {
    async fn connect(&self, guild_id: GuildId, _channel_id: ChannelId) -> Result<Box<dyn VoiceConnection>, MediaError> {
        let delay = *self.voice.connect_delay.lock();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        self.voice.connects.fetch_add(1, Ordering::SeqCst);

        if let Some(error) = self.voice.fail_next_connect.lock().take() {
            return Err(error);
        }
        Ok(Box::new(FakeConnection {
            guild_id,
            voice: self.voice.clone(),
        }))
    }
}

struct FakeConnection {
    guild_id: GuildId,
    voice: Arc<FakeVoice>,
}

#[async_trait]
impl VoiceConnection for FakeConnection {
    async fn play(&mut self, track: &ResolvedTrack, on_complete: CompletionSignal) -> Result<(), MediaError> {
        self.voice.plays.lock().push(track.title.clone());
        let explode = self.voice.panic_play.lock().contains(&track.title);
        if explode {
            panic!("el driver explotó con '{}'", track.title);
        }
        if let Some(error) = self.voice.fail_play.lock().get(&track.title).cloned() {
            return Err(error);
        }
        self.voice.current.lock().insert(self.guild_id, on_complete);
        Ok(())
    }

    async fn pause(&mut self) -> Result<(), MediaError> {
        Ok(())
    }

    async fn resume(&mut self) -> Result<(), MediaError> {
        Ok(())
    }

    async fn stop(&mut self) -> Result<(), MediaError> {
        self.voice.stops.fetch_add(1, Ordering::SeqCst);
        let signal = self.voice.current.lock().remove(&self.guild_id);
        if let Some(signal) = signal {
            signal.finish(TrackOutcome::Finished);
        }
        Ok(())
    }

    async fn disconnect(self: Box<Self>) -> Result<(), MediaError> {
        let delay = *self.voice.disconnect_delay.lock();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        self.voice.disconnects.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

#[derive(Default)]
pub(crate) struct CollectingSink {
    notices: Mutex<Vec<Notice>>,
}

impl CollectingSink {
    pub fn notices(&self) -> Vec<Notice> {
        self.notices.lock().clone()
    }

    pub fn events(&self) -> Vec<SessionEvent> {
        self.notices().into_iter().map(|n| n.event).collect()
    }
}

impl EventSink for CollectingSink {
    fn publish(&self, notice: Notice) {
        self.notices.lock().push(notice);
    }
}

/// Motor completo sobre los dobles
pub(crate) struct Harness {
    pub controls: PlayerControls,
    pub resolver: Arc<ScriptedResolver>,
    pub transport: FakeTransport,
    pub sink: Arc<CollectingSink>,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_settings(PlayerSettings::default())
    }

    pub fn with_settings(settings: PlayerSettings) -> Self {
        let resolver = Arc::new(ScriptedResolver::default());
        let transport = FakeTransport::default();
        let sink = Arc::new(CollectingSink::default());
        let registry = SessionRegistry::new(
            resolver.clone(),
            Arc::new(transport.clone()),
            sink.clone(),
            settings,
        );

        Self {
            controls: PlayerControls::new(registry),
            resolver,
            transport,
            sink,
        }
    }

    pub fn watch(&self, guild_id: GuildId) -> watch::Receiver<PlaybackState> {
        self.controls
            .subscribe(guild_id)
            .expect("la sesión debería existir")
    }

    /// Espera a que la sesión esté reproduciendo `title`
    pub async fn wait_playing(&self, guild_id: GuildId, title: &str) {
        let mut rx = self.watch(guild_id);
        tokio::time::timeout(
            Duration::from_secs(5),
            rx.wait_for(|state| matches!(state, PlaybackState::Playing(now) if now.track.title == title)),
        )
        .await
        .unwrap_or_else(|_| panic!("'{}' nunca empezó a sonar", title))
        .expect("el consumidor se fue");
    }

    pub async fn wait_state(&self, guild_id: GuildId, wanted: SessionState) {
        let mut rx = self.watch(guild_id);
        tokio::time::timeout(Duration::from_secs(5), rx.wait_for(|state| state.kind() == wanted))
            .await
            .unwrap_or_else(|_| panic!("la sesión nunca llegó a {:?}", wanted))
            .expect("el consumidor se fue");
    }
}
