//! # Bot Module
//!
//! Discord front end for the playback engine.
//!
//! This module contains the gateway-facing logic:
//! - Slash command registration and dispatch
//! - Button handling for the "now playing" message
//! - Delivery of playback notices to text channels
//! - Background maintenance of the resolver cache
//!
//! ## Architecture
//!
//! [`GuildMusicBot`] implements Serenity's [`EventHandler`]. It owns no
//! playback state of its own: every command is translated into a call on
//! [`PlayerControls`], which routes it to the guild's session. Notices flow
//! the other way through [`announcer::DiscordAnnouncer`].
//!
//! ## Example
//!
//! ```rust,ignore
//! let controls = PlayerControls::new(registry);
//! let bot = GuildMusicBot::new(config, controls, resolver.cache());
//! ```

use anyhow::Result;
use serenity::{
    all::{Context, EventHandler, GuildId, Interaction, Ready, VoiceState},
    async_trait,
};
use std::{sync::Arc, time::Duration};
use tracing::{debug, error, info, warn};

pub mod announcer;
pub mod commands;
pub mod handlers;

use crate::{
    audio::{ControlError, PlayerControls},
    cache::ResolverCache,
    config::Config,
};

/// Intervalo de las tareas de mantenimiento
const MAINTENANCE_INTERVAL: Duration = Duration::from_secs(3600);

/// Handler de eventos de Discord.
///
/// ## Fields
///
/// - `config`: configuración cargada del entorno
/// - `controls`: fachada del motor de reproducción
/// - `resolver_cache`: caché de resoluciones, limpiada periódicamente
pub struct GuildMusicBot {
    pub(crate) config: Arc<Config>,
    pub(crate) controls: PlayerControls,
    resolver_cache: Arc<ResolverCache>,
}

impl GuildMusicBot {
    pub fn new(config: Arc<Config>, controls: PlayerControls, resolver_cache: Arc<ResolverCache>) -> Self {
        Self {
            config,
            controls,
            resolver_cache,
        }
    }

    /// Registers slash commands with Discord.
    ///
    /// With `GUILD_ID` set the commands are registered on that guild only
    /// (near-instant propagation, meant for development); otherwise globally.
    async fn register_commands(&self, ctx: &Context) -> Result<()> {
        info!("📝 Registrando comandos slash...");
        info!("🔧 Application ID: {}", self.config.application_id);

        match self.config.guild_id {
            Some(guild_id) => {
                let guild_id = GuildId::new(guild_id);

                if !ctx.cache.guilds().contains(&guild_id) {
                    warn!("⚠️ El bot no está en la guild especificada: {}", guild_id);
                    return Ok(());
                }

                commands::register_guild_commands(ctx, guild_id).await.map_err(|e| {
                    error!("❌ Error registrando comandos de guild: {:?}", e);
                    anyhow::anyhow!(
                        "No se pudieron registrar comandos de guild. Verifica que el bot tenga permisos de 'applications.commands' en la guild."
                    )
                })?;
            }
            None => {
                commands::register_global_commands(ctx).await.map_err(|e| {
                    error!("❌ Error registrando comandos globales: {:?}", e);
                    anyhow::anyhow!(
                        "No se pudieron registrar comandos globales. Verifica que el bot tenga permisos de 'applications.commands'."
                    )
                })?;
            }
        }

        Ok(())
    }
}

#[async_trait]
impl EventHandler for GuildMusicBot {
    /// Registra comandos e inicia el mantenimiento
    async fn ready(&self, ctx: Context, ready: Ready) {
        info!("🤖 {} está en línea!", ready.user.name);
        info!("📊 Conectado a {} servidores", ready.guilds.len());

        if let Err(e) = self.register_commands(&ctx).await {
            error!("Error al registrar comandos: {:?}", e);
        }

        let cache = self.resolver_cache.clone();
        let controls = self.controls.clone();
        tokio::spawn(async move {
            maintenance_tasks(cache, controls).await;
        });
    }

    async fn interaction_create(&self, ctx: Context, interaction: Interaction) {
        match interaction {
            Interaction::Command(command_interaction) => {
                if let Err(e) = handlers::handle_command(&ctx, command_interaction, self).await {
                    error!("Error manejando comando: {:?}", e);
                }
            }
            Interaction::Component(component_interaction) => {
                if let Err(e) = handlers::handle_component(&ctx, component_interaction, self).await {
                    error!("Error manejando componente: {:?}", e);
                }
            }
            _ => {}
        }
    }

    /// Si alguien desconecta al bot del canal, la sesión se desmonta
    async fn voice_state_update(&self, ctx: Context, old: Option<VoiceState>, new: VoiceState) {
        let current_user_id = ctx.cache.current_user().id;
        if new.user_id != current_user_id || old.is_none() || new.channel_id.is_some() {
            return;
        }

        let Some(guild_id) = new.guild_id else {
            return;
        };

        info!("🔌 Bot desconectado en guild {}", guild_id);
        match self.controls.stop(guild_id).await {
            Ok(()) => {}
            // La sesión ya se estaba cerrando o nunca existió
            Err(e @ (ControlError::NoSession | ControlError::InvalidState { .. })) => {
                debug!("Sin sesión que detener en guild {}: {}", guild_id, e);
            }
            Err(e) => error!("Error al detener reproducción: {:?}", e),
        }
    }
}

/// Runs periodic maintenance tasks in the background.
///
/// Every hour expired resolutions are purged from the cache and the cache and
/// session counters are logged.
async fn maintenance_tasks(cache: Arc<ResolverCache>, controls: PlayerControls) {
    let mut interval = tokio::time::interval(MAINTENANCE_INTERVAL);
    // El primer tick es inmediato
    interval.tick().await;

    loop {
        interval.tick().await;

        let expired = cache.cleanup_expired();
        let metrics = cache.metrics();
        info!(
            "🧹 Mantenimiento: {} resoluciones expiradas, {} en caché, hit ratio {:.1}%, {} sesiones activas, {} iniciadas",
            expired,
            cache.len(),
            metrics.hit_ratio() * 100.0,
            controls.active_sessions().len(),
            controls.registry().sessions_started()
        );
    }
}
