use anyhow::Result;
use serenity::{
    builder::{
        CreateEmbed, CreateInteractionResponse, CreateInteractionResponseMessage,
        EditInteractionResponse,
    },
    model::{
        application::{CommandInteraction, ComponentInteraction},
        id::{ChannelId, GuildId, UserId},
    },
    prelude::Context,
};
use tracing::{debug, info, warn};

use crate::{
    audio::{ControlError, NowPlaying, PlaybackRequest, PlaybackState},
    bot::GuildMusicBot,
    ui::{
        buttons::{self, ButtonAction},
        embeds,
    },
};

/// Maneja comandos slash
pub async fn handle_command(
    ctx: &Context,
    command: CommandInteraction,
    bot: &GuildMusicBot,
) -> Result<()> {
    let Some(guild_id) = command.guild_id else {
        return reply_error(ctx, &command, "Este comando solo funciona dentro de un servidor").await;
    };

    info!(
        "📝 Comando /{} usado por {} en guild {}",
        command.data.name, command.user.name, guild_id
    );

    match command.data.name.as_str() {
        "play" => handle_play(ctx, &command, bot, guild_id).await?,
        "pause" => {
            let result = bot.controls.pause(guild_id).await;
            reply_control(ctx, &command, result, "⏸️ Reproducción pausada").await?
        }
        "resume" => {
            let result = bot.controls.resume(guild_id).await;
            reply_control(ctx, &command, result, "▶️ Reproducción reanudada").await?
        }
        "skip" => {
            let result = bot.controls.skip(guild_id).await;
            reply_control(ctx, &command, result, "⏭️ Canción saltada").await?
        }
        "stop" => handle_stop(ctx, &command, bot, guild_id).await?,
        "queue" => handle_queue(ctx, &command, bot, guild_id).await?,
        "nowplaying" => handle_nowplaying(ctx, &command, bot, guild_id).await?,
        _ => reply_error(ctx, &command, "Comando no reconocido").await?,
    }

    Ok(())
}

/// Maneja los botones del mensaje de "reproduciendo ahora"
pub async fn handle_component(
    ctx: &Context,
    component: ComponentInteraction,
    bot: &GuildMusicBot,
) -> Result<()> {
    let Some(guild_id) = component.guild_id else {
        return Ok(());
    };

    info!(
        "🔘 Botón {} presionado por {} en guild {}",
        component.data.custom_id, component.user.name, guild_id
    );

    let Some(action) = ButtonAction::from_custom_id(&component.data.custom_id) else {
        debug!("Botón desconocido: {}", component.data.custom_id);
        return respond_ephemeral(ctx, &component, "❌ Acción no reconocida").await;
    };

    if action.requires_same_channel() {
        let user_channel = user_voice_channel(ctx, guild_id, component.user.id);
        let bot_channel = user_voice_channel(ctx, guild_id, ctx.cache.current_user().id);
        if !same_voice_channel(user_channel, bot_channel) {
            return respond_ephemeral(
                ctx,
                &component,
                "🔇 Tienes que estar en el mismo canal de voz que el bot para usar los controles",
            )
            .await;
        }
    }

    match action {
        ButtonAction::PlayPause => {
            let paused = matches!(bot.controls.state(guild_id), Ok(PlaybackState::Paused(_)));
            let result = if paused {
                bot.controls.resume(guild_id).await
            } else {
                bot.controls.pause(guild_id).await
            };

            match (result, bot.controls.now_playing(guild_id)) {
                (Ok(()), Ok(Some(now))) => {
                    let message = CreateInteractionResponseMessage::new()
                        .embed(embeds::create_now_playing_embed(&now, !paused))
                        .components(buttons::create_player_buttons(!paused));
                    component
                        .create_response(&ctx.http, CreateInteractionResponse::UpdateMessage(message))
                        .await?;
                }
                (Ok(()), _) => respond_ephemeral(ctx, &component, "✅ Listo").await?,
                (Err(e), _) => respond_ephemeral(ctx, &component, &format!("❌ {}", e)).await?,
            }
        }
        ButtonAction::Skip => match bot.controls.skip(guild_id).await {
            Ok(()) => {
                let content = format!("⏭️ <@{}> saltó la canción", component.user.id);
                component
                    .create_response(
                        &ctx.http,
                        CreateInteractionResponse::Message(CreateInteractionResponseMessage::new().content(content)),
                    )
                    .await?;
            }
            Err(e) => respond_ephemeral(ctx, &component, &format!("❌ {}", e)).await?,
        },
        ButtonAction::Stop => {
            // El aviso de cierre lo publica la sesión al terminar
            component
                .create_response(&ctx.http, CreateInteractionResponse::Acknowledge)
                .await?;
            if let Err(e) = bot.controls.stop(guild_id).await {
                debug!("Stop desde botón en guild {} rechazado: {}", guild_id, e);
            }
        }
        ButtonAction::Queue => {
            let embed = queue_embed(bot, guild_id);
            component
                .create_response(
                    &ctx.http,
                    CreateInteractionResponse::Message(
                        CreateInteractionResponseMessage::new().embed(embed).ephemeral(true),
                    ),
                )
                .await?;
        }
    }

    Ok(())
}

// Handlers específicos para cada comando

async fn handle_play(
    ctx: &Context,
    command: &CommandInteraction,
    bot: &GuildMusicBot,
    guild_id: GuildId,
) -> Result<()> {
    let query = command
        .data
        .options
        .iter()
        .find(|opt| opt.name == "query")
        .and_then(|opt| opt.value.as_str())
        .map(str::trim)
        .unwrap_or_default()
        .to_string();

    if query.is_empty() {
        return reply_error(ctx, command, "Indica una canción o una URL").await;
    }

    // Verificar que el usuario esté en un canal de voz
    let Some(voice_channel) = user_voice_channel(ctx, guild_id, command.user.id) else {
        return reply_error(ctx, command, "Debes estar en un canal de voz").await;
    };

    // Defer la respuesta ya que conectar puede tomar tiempo
    command
        .create_response(
            &ctx.http,
            CreateInteractionResponse::Defer(CreateInteractionResponseMessage::new()),
        )
        .await?;

    let request = PlaybackRequest::new(command.user.id, query.clone()).with_text_channel(command.channel_id);

    let embed = match bot.controls.enqueue(guild_id, voice_channel, request).await {
        Ok(receipt) => embeds::create_track_queued_embed(&query, receipt.position, receipt.created),
        Err(e) => {
            warn!("❌ No se pudo encolar '{}' en guild {}: {}", query, guild_id, e);
            embeds::create_error_embed("No se pudo reproducir", &e.to_string())
        }
    };

    command
        .edit_response(&ctx.http, EditInteractionResponse::new().embed(embed))
        .await?;

    Ok(())
}

async fn handle_stop(
    ctx: &Context,
    command: &CommandInteraction,
    bot: &GuildMusicBot,
    guild_id: GuildId,
) -> Result<()> {
    // El desmontaje espera a que se libere la conexión de voz
    command
        .create_response(
            &ctx.http,
            CreateInteractionResponse::Defer(CreateInteractionResponseMessage::new()),
        )
        .await?;

    let embed = match bot.controls.stop(guild_id).await {
        Ok(()) => embeds::create_success_embed("Detenido", "⏹️ Reproducción detenida y cola limpiada"),
        Err(e) => embeds::create_error_embed("No se pudo detener", &e.to_string()),
    };

    command
        .edit_response(&ctx.http, EditInteractionResponse::new().embed(embed))
        .await?;

    Ok(())
}

async fn handle_queue(
    ctx: &Context,
    command: &CommandInteraction,
    bot: &GuildMusicBot,
    guild_id: GuildId,
) -> Result<()> {
    let embed = queue_embed(bot, guild_id);
    command
        .create_response(
            &ctx.http,
            CreateInteractionResponse::Message(CreateInteractionResponseMessage::new().embed(embed)),
        )
        .await?;

    Ok(())
}

async fn handle_nowplaying(
    ctx: &Context,
    command: &CommandInteraction,
    bot: &GuildMusicBot,
    guild_id: GuildId,
) -> Result<()> {
    match now_playing_view(bot.controls.state(guild_id).ok()) {
        Some((now, paused)) => {
            command
                .create_response(
                    &ctx.http,
                    CreateInteractionResponse::Message(
                        CreateInteractionResponseMessage::new()
                            .embed(embeds::create_now_playing_embed(&now, paused))
                            .components(buttons::create_player_buttons(paused)),
                    ),
                )
                .await?;
        }
        None => {
            command
                .create_response(
                    &ctx.http,
                    CreateInteractionResponse::Message(
                        CreateInteractionResponseMessage::new()
                            .content("❌ No hay nada reproduciéndose actualmente")
                            .ephemeral(true),
                    ),
                )
                .await?;
        }
    }

    Ok(())
}

// Funciones auxiliares

fn queue_embed(bot: &GuildMusicBot, guild_id: GuildId) -> CreateEmbed {
    let page_size = bot.config.queue_page_size;
    match (bot.controls.now_playing(guild_id), bot.controls.queue(guild_id)) {
        (Ok(now), Ok(pending)) => embeds::create_queue_embed(now.as_ref(), &pending, page_size),
        _ => embeds::create_queue_embed(None, &[], page_size),
    }
}

async fn reply_control(
    ctx: &Context,
    command: &CommandInteraction,
    result: Result<(), ControlError>,
    success: &str,
) -> Result<()> {
    let message = match result {
        Ok(()) => CreateInteractionResponseMessage::new().content(success),
        Err(e) => CreateInteractionResponseMessage::new()
            .embed(embeds::create_error_embed("No se pudo completar", &e.to_string()))
            .ephemeral(true),
    };

    command
        .create_response(&ctx.http, CreateInteractionResponse::Message(message))
        .await?;
    Ok(())
}

async fn reply_error(ctx: &Context, command: &CommandInteraction, description: &str) -> Result<()> {
    command
        .create_response(
            &ctx.http,
            CreateInteractionResponse::Message(
                CreateInteractionResponseMessage::new()
                    .embed(embeds::create_error_embed("Error", description))
                    .ephemeral(true),
            ),
        )
        .await?;
    Ok(())
}

async fn respond_ephemeral(ctx: &Context, component: &ComponentInteraction, content: &str) -> Result<()> {
    component
        .create_response(
            &ctx.http,
            CreateInteractionResponse::Message(
                CreateInteractionResponseMessage::new()
                    .content(content)
                    .ephemeral(true),
            ),
        )
        .await?;
    Ok(())
}

/// Canal de voz de un usuario según la caché; no retiene la guild entre awaits
fn user_voice_channel(ctx: &Context, guild_id: GuildId, user_id: UserId) -> Option<ChannelId> {
    let guild = guild_id.to_guild_cached(&ctx.cache)?;
    guild
        .voice_states
        .get(&user_id)
        .and_then(|voice_state| voice_state.channel_id)
}

/// Track actual y si está en pausa; `None` si no suena nada
fn now_playing_view(state: Option<PlaybackState>) -> Option<(NowPlaying, bool)> {
    match state? {
        PlaybackState::Playing(now) => Some((now, false)),
        PlaybackState::Paused(now) => Some((now, true)),
        _ => None,
    }
}

fn same_voice_channel(user: Option<ChannelId>, bot: Option<ChannelId>) -> bool {
    matches!((user, bot), (Some(user), Some(bot)) if user == bot)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sources::ResolvedTrack;
    use chrono::Utc;

    fn now_playing() -> NowPlaying {
        NowPlaying {
            track: ResolvedTrack::new("Song", "https://cdn.test/s", "https://video.test/s"),
            request: PlaybackRequest::new(UserId::new(3), "song"),
            started_at: Utc::now(),
        }
    }

    #[test]
    fn nowplaying_reports_the_track_and_its_pause_state() {
        assert_eq!(
            now_playing_view(Some(PlaybackState::Playing(now_playing()))).map(|(now, paused)| (now.track.title, paused)),
            Some(("Song".to_string(), false))
        );
        assert_eq!(
            now_playing_view(Some(PlaybackState::Paused(now_playing()))).map(|(_, paused)| paused),
            Some(true)
        );
        assert!(now_playing_view(Some(PlaybackState::idle())).is_none());
        assert!(now_playing_view(Some(PlaybackState::Cleaning)).is_none());
        assert!(now_playing_view(None).is_none());
    }

    #[test]
    fn buttons_need_both_in_the_same_channel() {
        let a = Some(ChannelId::new(1));
        let b = Some(ChannelId::new(2));

        assert!(same_voice_channel(a, a));
        assert!(!same_voice_channel(a, b));
        assert!(!same_voice_channel(None, a));
        assert!(!same_voice_channel(a, None));
        assert!(!same_voice_channel(None, None));
    }
}
