//! Registro de sesiones por servidor.
//!
//! Cada servidor tiene una celda que se inicializa una sola vez: la primera
//! solicitud conecta la voz y lanza el consumidor, las concurrentes esperan
//! ese mismo resultado. Así nunca hay dos consumidores para un servidor.

use dashmap::DashMap;
use serenity::model::id::{ChannelId, GuildId};
use std::sync::{
    atomic::{AtomicBool, AtomicU64, Ordering},
    Arc,
};
use tokio::sync::OnceCell;
use tracing::{debug, info};

use super::{
    consumer::SessionConsumer,
    error::{ControlError, MediaError},
    events::EventSink,
    session::PlaybackSession,
    transport::Transport,
    PlayerSettings,
};
use crate::sources::Resolver;

type SessionSlot = Arc<OnceCell<Arc<PlaybackSession>>>;

#[derive(Clone)]
pub struct SessionRegistry {
    sessions: Arc<DashMap<GuildId, SessionSlot>>,
    resolver: Arc<dyn Resolver>,
    transport: Arc<dyn Transport>,
    events: Arc<dyn EventSink>,
    settings: PlayerSettings,
    started: Arc<AtomicU64>,
}

impl SessionRegistry {
    pub fn new(
        resolver: Arc<dyn Resolver>,
        transport: Arc<dyn Transport>,
        events: Arc<dyn EventSink>,
        settings: PlayerSettings,
    ) -> Self {
        Self {
            sessions: Arc::new(DashMap::new()),
            resolver,
            transport,
            events,
            settings,
            started: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Sesión viva del servidor, si existe
    pub fn get(&self, guild_id: GuildId) -> Option<Arc<PlaybackSession>> {
        let slot = self.sessions.get(&guild_id)?.value().clone();
        slot.get().filter(|session| !session.is_terminated()).cloned()
    }

    /// Devuelve la sesión del servidor o la crea conectando a `voice_channel`.
    ///
    /// El booleano indica si esta llamada fue la que creó la sesión. Si la
    /// conexión falla no queda sesión registrada y el siguiente intento
    /// vuelve a conectar.
    pub async fn get_or_create(
        &self,
        guild_id: GuildId,
        voice_channel: ChannelId,
        home_channel: Option<ChannelId>,
    ) -> Result<(Arc<PlaybackSession>, bool), ControlError> {
        let slot = loop {
            let slot = self
                .sessions
                .entry(guild_id)
                .or_insert_with(|| Arc::new(OnceCell::new()))
                .value()
                .clone();

            match slot.get() {
                // El consumidor terminó antes de que la celda quedara publicada
                Some(session) if session.is_terminated() => remove_if_current(&self.sessions, session),
                Some(session) => return Ok((session.clone(), false)),
                None => break slot,
            }
        };

        let created = AtomicBool::new(false);
        let result = slot
            .get_or_try_init(|| async {
                created.store(true, Ordering::Relaxed);
                self.start(guild_id, voice_channel, home_channel).await
            })
            .await
            .cloned();

        match result {
            Ok(session) => Ok((session, created.load(Ordering::Relaxed))),
            Err(e) => {
                self.discard_empty_slot(guild_id, &slot);
                Err(ControlError::ConnectionSetup(e))
            }
        }
    }

    /// Tras un connect fallido, quita la celda vacía si nadie más la está usando
    fn discard_empty_slot(&self, guild_id: GuildId, slot: &SessionSlot) {
        // Con el shard bloqueado nadie puede clonar la celda: solo la del mapa y la nuestra
        let removed = self.sessions.remove_if(&guild_id, |_, current| {
            Arc::ptr_eq(current, slot) && !current.initialized() && Arc::strong_count(current) == 2
        });
        if removed.is_some() {
            debug!("Celda vacía de guild {} eliminada tras fallar la conexión", guild_id);
        }
    }

    async fn start(
        &self,
        guild_id: GuildId,
        voice_channel: ChannelId,
        home_channel: Option<ChannelId>,
    ) -> Result<Arc<PlaybackSession>, MediaError> {
        let connection = self.transport.connect(guild_id, voice_channel).await?;

        let (session, ends) = PlaybackSession::new(guild_id, home_channel, self.settings.command_capacity);
        let session = Arc::new(session);

        let consumer = SessionConsumer::new(
            session.clone(),
            ends,
            self.resolver.clone(),
            self.events.clone(),
            self.settings.idle_timeout,
        );

        let sessions = self.sessions.clone();
        consumer.spawn(connection, move |ended| {
            remove_if_current(&sessions, ended);
        });

        self.started.fetch_add(1, Ordering::Relaxed);
        info!("🆕 Sesión creada para guild {} en canal {}", guild_id, voice_channel);
        Ok(session)
    }

    /// Quita la entrada del servidor; no hace nada si no existe
    pub fn remove(&self, guild_id: GuildId) {
        if self.sessions.remove(&guild_id).is_some() {
            debug!("Entrada de guild {} eliminada del registro", guild_id);
        }
    }

    /// Servidores con sesión viva
    pub fn guilds(&self) -> Vec<GuildId> {
        self.sessions
            .iter()
            .filter(|entry| entry.value().initialized())
            .map(|entry| *entry.key())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.guilds().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Sesiones creadas desde el arranque
    pub fn sessions_started(&self) -> u64 {
        self.started.load(Ordering::Relaxed)
    }
}

/// Solo borra la entrada si todavía apunta a la sesión que terminó
fn remove_if_current(sessions: &DashMap<GuildId, SessionSlot>, ended: &Arc<PlaybackSession>) {
    let guild_id = ended.guild_id();
    let removed = sessions.remove_if(&guild_id, |_, slot| {
        slot.get().map_or(false, |current| Arc::ptr_eq(current, ended))
    });
    if removed.is_some() {
        debug!("Sesión de guild {} retirada del registro", guild_id);
    }
}
